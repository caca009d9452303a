use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::store::{ChatEntry, ChatPhase, ChatView, DeliveryStatus};

pub fn render(view: &ChatView, me: &str, peer_online: bool) -> String {
    let Some(conversation) = &view.conversation else {
        return "No conversation open".to_string();
    };

    let peer = match &conversation.peer {
        Some(profile) => format!("{} ({})", profile.full_name, profile.username),
        None => conversation.peer_id.clone(),
    };
    let status = match view.phase {
        ChatPhase::Opening => " [looking up peer...]",
        ChatPhase::Failed => " [peer lookup failed, /retry]",
        ChatPhase::Open if peer_online => " [online]",
        ChatPhase::Open | ChatPhase::Closed => "",
    };

    let mut out = format!("== {} with {peer}{status} ==", conversation.chat_id);
    for entry in &conversation.messages {
        out.push('\n');
        render_entry(&mut out, entry, me);
    }
    out
}

pub fn render_entry(out: &mut String, entry: &ChatEntry, me: &str) {
    let time = DateTime::<Utc>::from_timestamp_millis(entry.message.sent_at)
        .map(|at| at.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let who = if entry.message.sender_id == me {
        "me"
    } else {
        entry.message.sender_id.as_str()
    };
    let marker = match entry.status {
        DeliveryStatus::Pending => " …",
        DeliveryStatus::Confirmed => "",
        DeliveryStatus::Failed => " (not delivered)",
    };
    let _ = write!(out, "[{time}] {who}: {}{marker}", entry.message.text);
}
