use std::fmt::Write;

use crate::common::ConversationSummary;

pub fn render(conversations: &[ConversationSummary]) -> String {
    if conversations.is_empty() {
        return "No conversations yet".to_string();
    }

    let mut out = String::new();
    for conversation in conversations {
        let participant = &conversation.participant;
        let _ = write!(
            out,
            "[{}] {} ({})",
            conversation.chat_id, participant.full_name, participant.username
        );
        // Bold in the web client; an asterisk here.
        match &conversation.last_message {
            Some(last) if last.read => {
                let _ = write!(out, " - *{}*", last.text);
            }
            Some(last) => {
                let _ = write!(out, " - {}", last.text);
            }
            None => {}
        }
        out.push('\n');
    }
    out.pop();
    out
}
