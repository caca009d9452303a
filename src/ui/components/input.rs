/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Send(String),
    ListChats,
    Reload,
    Open { chat_id: String, peer_id: String },
    Close,
    Retry,
    Online,
    Events,
    Help,
    Quit,
    Invalid(String),
    Empty,
}

pub const HELP: &str = "\
/chats                 show conversations
/reload                fetch conversations again
/open <chat> <peer>    open a conversation
/close                 close the open conversation
/retry                 retry a failed peer lookup
/online                show who is online
/events                show recent activity
/quit                  exit
anything else          send to the open conversation";

pub fn parse(line: &str) -> InputAction {
    let line = line.trim();
    if line.is_empty() {
        return InputAction::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return InputAction::Send(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("chats"), None, ..) => InputAction::ListChats,
        (Some("reload"), None, ..) => InputAction::Reload,
        (Some("open"), Some(chat_id), Some(peer_id), None) => InputAction::Open {
            chat_id: chat_id.to_string(),
            peer_id: peer_id.to_string(),
        },
        (Some("open"), ..) => InputAction::Invalid("usage: /open <chat> <peer>".to_string()),
        (Some("close"), None, ..) => InputAction::Close,
        (Some("retry"), None, ..) => InputAction::Retry,
        (Some("online"), None, ..) => InputAction::Online,
        (Some("events"), None, ..) => InputAction::Events,
        (Some("help"), None, ..) => InputAction::Help,
        (Some("quit" | "exit"), None, ..) => InputAction::Quit,
        _ => InputAction::Invalid(format!("unknown command `{line}`, try /help")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(parse("  hello there "), InputAction::Send("hello there".into()));
        assert_eq!(parse("   "), InputAction::Empty);
    }

    #[test]
    fn open_needs_chat_and_peer() {
        assert_eq!(
            parse("/open c1 u2"),
            InputAction::Open {
                chat_id: "c1".into(),
                peer_id: "u2".into()
            }
        );
        assert!(matches!(parse("/open c1"), InputAction::Invalid(_)));
        assert!(matches!(parse("/open c1 u2 extra"), InputAction::Invalid(_)));
    }

    #[test]
    fn commands_reject_trailing_arguments() {
        assert_eq!(parse("/chats"), InputAction::ListChats);
        assert_eq!(parse("/exit"), InputAction::Quit);
        assert!(matches!(parse("/chats now"), InputAction::Invalid(_)));
        assert!(matches!(parse("/dance"), InputAction::Invalid(_)));
    }
}
