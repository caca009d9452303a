use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use crate::common::{EventKind, ServerEvent, UserId};
use crate::network::{EventRouter, Subscription};

const SUBSCRIBER: &str = "presence";

/// Process-wide set of online users, replaced wholesale by every
/// `users connected` push.
pub struct PresenceTracker {
    online: Arc<watch::Sender<HashSet<UserId>>>,
    subscription: Option<Subscription>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            online: Arc::new(watch::Sender::new(HashSet::new())),
            subscription: None,
        }
    }

    /// Subscribes to presence pushes. Calling it again is a no-op.
    pub fn attach(&mut self, router: &EventRouter) {
        if self.subscription.is_some() {
            log::debug!("Presence tracker already attached");
            return;
        }

        let online = Arc::clone(&self.online);
        self.subscription = Some(router.on(EventKind::UsersConnected, SUBSCRIBER, move |event| {
            if let ServerEvent::UsersConnected(users) = event {
                replace(&online, users.0.iter().cloned());
            }
        }));
    }

    pub fn replace(&self, users: impl IntoIterator<Item = UserId>) {
        replace(&self.online, users);
    }

    /// Drops the set, used when the channel goes down so stale presence is not shown.
    pub fn clear(&self) {
        self.online.send_if_modified(|online| {
            let changed = !online.is_empty();
            online.clear();
            changed
        });
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.borrow().contains(user_id)
    }

    pub fn snapshot(&self) -> HashSet<UserId> {
        self.online.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<HashSet<UserId>> {
        self.online.subscribe()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn replace(online: &watch::Sender<HashSet<UserId>>, users: impl IntoIterator<Item = UserId>) {
    let users: HashSet<UserId> = users.into_iter().collect();
    log::debug!("{} users online", users.len());
    online.send_replace(users);
}
