use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::common::{
    ChatId, ChatMessage, ClientEvent, EventKind, PeerInfo, ServerEvent, UserId, UserProfile,
};
use crate::error::{ClientError, Result};
use crate::network::{Emitter, EventRouter, Subscription};

const SUBSCRIBER: &str = "active-chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatPhase {
    #[default]
    Closed,
    /// Peer lookup in flight.
    Opening,
    Open,
    /// Peer lookup timed out; `retry_lookup` starts a new one.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// Set for messages sent from this client.
    pub local_id: Option<Uuid>,
    pub message: ChatMessage,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub chat_id: ChatId,
    pub peer_id: UserId,
    pub peer: Option<UserProfile>,
    pub messages: Vec<ChatEntry>,
    lookup_started_at: DateTime<Utc>,
}

#[cfg(test)]
impl Conversation {
    pub fn for_tests(chat_id: &str, peer_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            peer_id: peer_id.to_string(),
            peer: None,
            messages: Vec::new(),
            lookup_started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatView {
    pub phase: ChatPhase,
    pub conversation: Option<Conversation>,
}

/// The one conversation currently open.
///
/// Messages are kept in arrival order and deduplicated on sender, timestamp and
/// text. Opening another chat, or closing, drops the previous conversation together
/// with the channel handlers registered for it.
pub struct ActiveChatSession {
    view: Arc<watch::Sender<ChatView>>,
    subscriptions: Vec<Subscription>,
    lookup_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
}

impl ActiveChatSession {
    pub fn new(lookup_timeout: Option<Duration>, send_timeout: Option<Duration>) -> Self {
        Self {
            view: Arc::new(watch::Sender::new(ChatView::default())),
            subscriptions: Vec::new(),
            lookup_timeout,
            send_timeout,
        }
    }

    pub fn open(
        &mut self,
        chat_id: impl Into<ChatId>,
        peer_id: impl Into<UserId>,
        router: &EventRouter,
        emitter: &dyn Emitter,
    ) {
        self.close();

        let chat_id = chat_id.into();
        let peer_id = peer_id.into();
        log::info!("Opening chat {chat_id} with {peer_id}");

        self.view.send_replace(ChatView {
            phase: ChatPhase::Opening,
            conversation: Some(Conversation {
                chat_id,
                peer_id: peer_id.clone(),
                peer: None,
                messages: Vec::new(),
                lookup_started_at: Utc::now(),
            }),
        });

        let view = Arc::clone(&self.view);
        self.subscriptions.push(router.on(EventKind::NewMessage, SUBSCRIBER, move |event| {
            if let ServerEvent::NewMessage(incoming) = event {
                receive(&view, &incoming.chat_id, incoming.message.clone());
            }
        }));
        let view = Arc::clone(&self.view);
        self.subscriptions.push(router.on(EventKind::PeerInfo, SUBSCRIBER, move |event| {
            if let ServerEvent::PeerInfo(info) = event {
                resolve_peer(&view, info);
            }
        }));

        emitter.emit(ClientEvent::GetUserId(peer_id));
    }

    pub fn close(&mut self) {
        self.subscriptions.clear();
        self.view.send_if_modified(|view| {
            if view.phase == ChatPhase::Closed {
                return false;
            }
            *view = ChatView::default();
            true
        });
    }

    /// Appends the message as pending and emits it. There is no acknowledgement on the
    /// wire: the entry is confirmed if the server echoes it back. `text` is kept as given.
    pub fn send_message(&self, sender_id: &str, text: &str, emitter: &dyn Emitter) -> Result<Uuid> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let local_id = Uuid::new_v4();
        let message = ChatMessage {
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            sent_at: Utc::now().timestamp_millis(),
            read: false,
        };

        let mut chat_id = None;
        self.view.send_if_modified(|view| {
            let Some(conversation) = view.conversation.as_mut() else {
                return false;
            };
            conversation.messages.push(ChatEntry {
                local_id: Some(local_id),
                message: message.clone(),
                status: DeliveryStatus::Pending,
            });
            chat_id = Some(conversation.chat_id.clone());
            true
        });

        let chat_id = chat_id.ok_or(ClientError::NoActiveChat)?;
        emitter.emit(ClientEvent::SendMessage { chat_id, message });
        Ok(local_id)
    }

    /// Returns true when the message was appended.
    pub fn on_incoming_message(&self, chat_id: &str, message: ChatMessage) -> bool {
        receive(&self.view, chat_id, message)
    }

    /// Appends history delivered by the backend, skipping anything already shown.
    pub fn seed_history(&self, messages: impl IntoIterator<Item = ChatMessage>) -> usize {
        let mut appended = 0;
        self.view.send_if_modified(|view| {
            let Some(conversation) = view.conversation.as_mut() else {
                return false;
            };
            let mut changed = false;
            for message in messages {
                match merge(conversation, message) {
                    Merge::Appended => {
                        appended += 1;
                        changed = true;
                    }
                    Merge::Updated => changed = true,
                    Merge::Duplicate => {}
                }
            }
            changed
        });
        appended
    }

    /// Applies the optional lookup and send timeouts.
    pub fn check_timeouts(&self, now: DateTime<Utc>) {
        let lookup_timeout = self.lookup_timeout;
        let send_timeout = self.send_timeout;

        self.view.send_if_modified(|view| {
            let Some(conversation) = view.conversation.as_mut() else {
                return false;
            };
            let mut changed = false;

            if let Some(timeout) = lookup_timeout {
                if view.phase == ChatPhase::Opening
                    && now - conversation.lookup_started_at >= timeout
                {
                    log::warn!("Peer lookup for chat {} timed out", conversation.chat_id);
                    view.phase = ChatPhase::Failed;
                    changed = true;
                }
            }

            if let Some(timeout) = send_timeout {
                let cutoff = (now - timeout).timestamp_millis();
                for entry in &mut conversation.messages {
                    if entry.status == DeliveryStatus::Pending && entry.message.sent_at <= cutoff {
                        entry.status = DeliveryStatus::Failed;
                        changed = true;
                    }
                }
            }

            changed
        });
    }

    pub fn retry_lookup(&self, emitter: &dyn Emitter) -> Result<()> {
        let mut peer_id = None;
        self.view.send_if_modified(|view| {
            let Some(conversation) = view.conversation.as_mut() else {
                return false;
            };
            if view.phase != ChatPhase::Failed {
                return false;
            }
            view.phase = ChatPhase::Opening;
            conversation.lookup_started_at = Utc::now();
            peer_id = Some(conversation.peer_id.clone());
            true
        });

        match peer_id {
            Some(peer_id) => {
                emitter.emit(ClientEvent::GetUserId(peer_id));
                Ok(())
            }
            None if self.view.borrow().conversation.is_some() => Ok(()),
            None => Err(ClientError::NoActiveChat),
        }
    }

    pub fn phase(&self) -> ChatPhase {
        self.view.borrow().phase
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.view
            .borrow()
            .conversation
            .as_ref()
            .map(|conversation| conversation.chat_id.clone())
    }

    pub fn snapshot(&self) -> ChatView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ChatView> {
        self.view.subscribe()
    }
}

fn receive(view: &watch::Sender<ChatView>, chat_id: &str, message: ChatMessage) -> bool {
    let mut appended = false;
    view.send_if_modified(|view| {
        let Some(conversation) = view.conversation.as_mut() else {
            return false;
        };
        if conversation.chat_id != chat_id {
            return false;
        }
        let outcome = merge(conversation, message);
        appended = outcome == Merge::Appended;
        outcome != Merge::Duplicate
    });
    appended
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Appended,
    /// Already present; status or read flag changed.
    Updated,
    Duplicate,
}

/// Appends `message` unless an equal one is already present. A duplicate may still
/// confirm a pending or failed send or set the read flag.
fn merge(conversation: &mut Conversation, message: ChatMessage) -> Merge {
    let Some(existing) = conversation
        .messages
        .iter_mut()
        .find(|entry| entry.message.same_as(&message))
    else {
        conversation.messages.push(ChatEntry {
            local_id: None,
            message,
            status: DeliveryStatus::Confirmed,
        });
        return Merge::Appended;
    };

    let mut outcome = Merge::Duplicate;
    // A late echo still proves delivery of a send that already timed out.
    if existing.status != DeliveryStatus::Confirmed {
        existing.status = DeliveryStatus::Confirmed;
        outcome = Merge::Updated;
    }
    if message.read && !existing.message.read {
        existing.message.read = true;
        outcome = Merge::Updated;
    }
    outcome
}

fn resolve_peer(view: &watch::Sender<ChatView>, info: &PeerInfo) {
    view.send_if_modified(|view| {
        let Some(conversation) = view.conversation.as_mut() else {
            return false;
        };
        if conversation.peer_id != info.user_id {
            return false;
        }
        conversation.peer = Some(info.profile());
        view.phase = ChatPhase::Open;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::IncomingMessage;
    use crate::network::channel::testing::RecordingEmitter;

    fn incoming(sender: &str, text: &str, sent_at: i64) -> ChatMessage {
        ChatMessage {
            sender_id: sender.into(),
            text: text.into(),
            sent_at,
            read: false,
        }
    }

    fn peer_info(user_id: &str) -> ServerEvent {
        ServerEvent::PeerInfo(PeerInfo {
            user_id: user_id.into(),
            full_name: "Bob Builder".into(),
            username: "bob".into(),
            profile_photo: None,
        })
    }

    fn texts(session: &ActiveChatSession) -> Vec<String> {
        session
            .snapshot()
            .conversation
            .map(|conversation| {
                conversation
                    .messages
                    .into_iter()
                    .map(|entry| entry.message.text)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn opened(router: &EventRouter, emitter: &RecordingEmitter) -> ActiveChatSession {
        let mut session = ActiveChatSession::new(None, None);
        session.open("c1", "u2", router, emitter);
        session
    }

    #[test]
    fn open_requests_the_peer_and_starts_empty() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        assert_eq!(session.phase(), ChatPhase::Opening);
        assert_eq!(session.chat_id().as_deref(), Some("c1"));
        assert!(texts(&session).is_empty());
        assert_eq!(emitter.events(), vec![ClientEvent::GetUserId("u2".into())]);
    }

    #[test]
    fn peer_info_moves_the_chat_to_open() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        router.dispatch(&peer_info("someone-else"));
        assert_eq!(session.phase(), ChatPhase::Opening);

        router.dispatch(&peer_info("u2"));
        let view = session.snapshot();
        assert_eq!(view.phase, ChatPhase::Open);
        assert_eq!(view.conversation.unwrap().peer.unwrap().username, "bob");
    }

    #[test]
    fn duplicate_incoming_message_is_kept_once() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        assert!(session.on_incoming_message("c1", incoming("u2", "yo", 5)));
        assert!(!session.on_incoming_message("c1", incoming("u2", "yo", 5)));
        assert_eq!(texts(&session), ["yo"]);
    }

    #[test]
    fn arrival_order_wins_over_timestamps() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        session.on_incoming_message("c1", incoming("u2", "late", 300));
        session.on_incoming_message("c1", incoming("u2", "early", 100));
        session.on_incoming_message("c1", incoming("u2", "middle", 200));

        assert_eq!(texts(&session), ["late", "early", "middle"]);
    }

    #[test]
    fn messages_for_other_chats_are_ignored() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        assert!(!session.on_incoming_message("c2", incoming("u3", "elsewhere", 1)));
        assert!(texts(&session).is_empty());
    }

    #[test]
    fn sent_message_is_pending_and_confirmed_by_its_echo() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        let local_id = session.send_message("me", "hello", &emitter).unwrap();
        let view = session.snapshot();
        let entry = &view.conversation.as_ref().unwrap().messages[0];
        assert_eq!(entry.message.text, "hello");
        assert!(!entry.message.read);
        assert_eq!(entry.status, DeliveryStatus::Pending);
        assert_eq!(entry.local_id, Some(local_id));

        let ClientEvent::SendMessage { chat_id, message } = emitter.events()[1].clone() else {
            panic!("expected the send to be emitted");
        };
        assert_eq!(chat_id, "c1");

        router.dispatch(&ServerEvent::NewMessage(IncomingMessage {
            chat_id: "c1".into(),
            message,
        }));

        let view = session.snapshot();
        let messages = &view.conversation.unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, DeliveryStatus::Confirmed);
    }

    #[test]
    fn send_rejects_empty_text_and_closed_chats() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let mut session = opened(&router, &emitter);

        assert!(matches!(
            session.send_message("me", "   ", &emitter),
            Err(ClientError::EmptyMessage)
        ));

        session.close();
        assert!(matches!(
            session.send_message("me", "hi", &emitter),
            Err(ClientError::NoActiveChat)
        ));
        assert_eq!(emitter.events().len(), 1);
    }

    #[test]
    fn echo_with_read_flag_marks_message_read() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        session.on_incoming_message("c1", incoming("u2", "seen?", 9));
        let mut read = incoming("u2", "seen?", 9);
        read.read = true;
        assert!(!session.on_incoming_message("c1", read));

        let view = session.snapshot();
        assert!(view.conversation.unwrap().messages[0].message.read);
    }

    #[test]
    fn closing_unsubscribes_the_view() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let mut session = opened(&router, &emitter);
        assert_eq!(router.handler_count(EventKind::NewMessage), 1);

        session.close();
        assert_eq!(router.handler_count(EventKind::NewMessage), 0);
        assert_eq!(router.handler_count(EventKind::PeerInfo), 0);

        let mut watcher = session.watch();
        watcher.mark_unchanged();
        let delivered = router.dispatch(&ServerEvent::NewMessage(IncomingMessage {
            chat_id: "c1".into(),
            message: incoming("u2", "after close", 1),
        }));
        assert_eq!(delivered, 0);
        assert!(!watcher.has_changed().unwrap());
        assert_eq!(session.phase(), ChatPhase::Closed);
    }

    #[test]
    fn opening_another_chat_discards_the_previous_one() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let mut session = opened(&router, &emitter);
        session.on_incoming_message("c1", incoming("u2", "old", 1));

        session.open("c2", "u3", &router, &emitter);

        assert_eq!(session.chat_id().as_deref(), Some("c2"));
        assert!(texts(&session).is_empty());
        assert_eq!(router.handler_count(EventKind::NewMessage), 1);

        router.dispatch(&ServerEvent::NewMessage(IncomingMessage {
            chat_id: "c2".into(),
            message: incoming("u3", "new", 2),
        }));
        assert_eq!(texts(&session), ["new"]);
    }

    #[test]
    fn lookup_timeout_fails_and_retry_reopens() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let mut session = ActiveChatSession::new(Some(Duration::seconds(5)), None);
        session.open("c1", "u2", &router, &emitter);

        session.check_timeouts(Utc::now());
        assert_eq!(session.phase(), ChatPhase::Opening);

        session.check_timeouts(Utc::now() + Duration::seconds(6));
        assert_eq!(session.phase(), ChatPhase::Failed);

        session.retry_lookup(&emitter).unwrap();
        assert_eq!(session.phase(), ChatPhase::Opening);
        assert_eq!(
            emitter.events(),
            vec![
                ClientEvent::GetUserId("u2".into()),
                ClientEvent::GetUserId("u2".into())
            ]
        );
    }

    #[test]
    fn without_timeouts_nothing_ever_fails() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);
        session.send_message("me", "hi", &emitter).unwrap();

        session.check_timeouts(Utc::now() + Duration::days(1));

        let view = session.snapshot();
        assert_eq!(view.phase, ChatPhase::Opening);
        assert_eq!(
            view.conversation.unwrap().messages[0].status,
            DeliveryStatus::Pending
        );
    }

    #[test]
    fn unacknowledged_send_fails_after_timeout() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let mut session = ActiveChatSession::new(None, Some(Duration::seconds(10)));
        session.open("c1", "u2", &router, &emitter);
        session.send_message("me", "hi", &emitter).unwrap();

        session.check_timeouts(Utc::now() + Duration::seconds(11));

        let view = session.snapshot();
        assert_eq!(
            view.conversation.unwrap().messages[0].status,
            DeliveryStatus::Failed
        );
    }

    #[test]
    fn late_echo_confirms_a_send_that_timed_out() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let mut session = ActiveChatSession::new(None, Some(Duration::seconds(1)));
        session.open("c1", "u2", &router, &emitter);
        session.send_message("me", "hello", &emitter).unwrap();

        session.check_timeouts(Utc::now() + Duration::seconds(2));
        let ClientEvent::SendMessage { message, .. } = emitter.events()[1].clone() else {
            panic!("expected the send to be emitted");
        };

        assert!(!session.on_incoming_message("c1", message));
        let view = session.snapshot();
        let messages = &view.conversation.unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, DeliveryStatus::Confirmed);
    }

    #[test]
    fn send_keeps_the_text_as_typed() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);

        session.send_message("me", "  hi ", &emitter).unwrap();

        assert_eq!(texts(&session), ["  hi "]);
        let ClientEvent::SendMessage { message, .. } = emitter.events()[1].clone() else {
            panic!("expected the send to be emitted");
        };
        assert_eq!(message.text, "  hi ");
    }

    #[test]
    fn seeded_history_is_deduplicated_against_live_messages() {
        let router = EventRouter::new();
        let emitter = RecordingEmitter::default();
        let session = opened(&router, &emitter);
        session.on_incoming_message("c1", incoming("u2", "live", 3));

        let appended = session.seed_history([
            incoming("u2", "first", 1),
            incoming("u2", "live", 3),
            incoming("me", "second", 2),
        ]);

        assert_eq!(appended, 2);
        assert_eq!(texts(&session), ["live", "first", "second"]);
    }
}
