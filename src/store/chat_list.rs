use std::sync::Arc;

use tokio::sync::watch;

use crate::common::{ChatMessage, ConversationSummary, EventKind, ServerEvent};
use crate::error::Result;
use crate::network::{ChatApi, EventRouter, Subscription};

const SUBSCRIBER: &str = "chat-list";

/// The user's conversations in backend order, with a last-message preview per chat.
///
/// The store is attached once for the whole process so pushes update previews even
/// while no chat list is on screen. A push for a chat the store does not know is
/// dropped; only [`ChatListStore::load`] discovers new conversations. A reload
/// replaces the list as returned, including any preview applied by a push that
/// landed while the request was in flight.
pub struct ChatListStore {
    conversations: Arc<watch::Sender<Vec<ConversationSummary>>>,
    subscription: Option<Subscription>,
}

impl ChatListStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(watch::Sender::new(Vec::new())),
            subscription: None,
        }
    }

    pub fn attach(&mut self, router: &EventRouter) {
        if self.subscription.is_some() {
            log::debug!("Chat list already attached");
            return;
        }

        let conversations = Arc::clone(&self.conversations);
        self.subscription = Some(router.on(EventKind::NewMessage, SUBSCRIBER, move |event| {
            if let ServerEvent::NewMessage(incoming) = event {
                apply_incoming(&conversations, &incoming.chat_id, &incoming.message);
            }
        }));
    }

    /// Fetches the list. On failure the error is logged and the current list is kept.
    pub async fn load(&self, api: &dyn ChatApi) -> Result<usize> {
        match api.fetch_chats().await {
            Ok(entries) => {
                let count = entries.len();
                self.replace(entries.into_iter().map(ConversationSummary::from).collect());
                log::info!("Loaded {count} conversations");
                Ok(count)
            }
            Err(err) => {
                log::error!("Failed to load chat list: {err}");
                Err(err)
            }
        }
    }

    pub fn replace(&self, conversations: Vec<ConversationSummary>) {
        self.conversations.send_replace(conversations);
    }

    /// Updates the preview of `chat_id` in place. Returns false, leaving the list
    /// untouched, when no such conversation is loaded.
    pub fn apply_incoming_message(&self, chat_id: &str, message: &ChatMessage) -> bool {
        apply_incoming(&self.conversations, chat_id, message)
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.conversations
            .borrow()
            .iter()
            .any(|conversation| conversation.chat_id == chat_id)
    }

    pub fn get(&self, chat_id: &str) -> Option<ConversationSummary> {
        self.conversations
            .borrow()
            .iter()
            .find(|conversation| conversation.chat_id == chat_id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<ConversationSummary> {
        self.conversations.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.conversations.borrow().len()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.conversations.subscribe()
    }
}

impl Default for ChatListStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_incoming(
    conversations: &watch::Sender<Vec<ConversationSummary>>,
    chat_id: &str,
    message: &ChatMessage,
) -> bool {
    let applied = conversations.send_if_modified(|conversations| {
        match conversations
            .iter_mut()
            .find(|conversation| conversation.chat_id == chat_id)
        {
            Some(conversation) => {
                conversation.last_message = Some(message.preview());
                true
            }
            None => false,
        }
    });
    if !applied {
        log::debug!("Dropping message push for unknown chat {chat_id}");
    }
    applied
}
