use std::collections::HashSet;

use crate::common::UserId;

pub fn render(online: &HashSet<UserId>) -> String {
    if online.is_empty() {
        return "Nobody online".to_string();
    }
    let mut users: Vec<&str> = online.iter().map(String::as_str).collect();
    users.sort_unstable();
    format!("Online ({}): {}", users.len(), users.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_users_sorted() {
        let online: HashSet<UserId> = ["zoe", "amy"].iter().map(|id| id.to_string()).collect();
        assert_eq!(render(&online), "Online (2): amy, zoe");
        assert_eq!(render(&HashSet::new()), "Nobody online");
    }
}
