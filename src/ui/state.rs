use chrono::{DateTime, Utc};
use std::collections::VecDeque;

const MAX_EVENTS: usize = 100;

/// Something worth showing in `/events`.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: &'static str,
    pub message: String,
}

/// Recent activity, oldest first, capped at the last 100 entries.
#[derive(Debug, Default)]
pub struct ActivityLog {
    events: VecDeque<ActivityEvent>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event_type: &'static str, message: impl Into<String>) {
        let message = message.into();
        log::debug!("[{event_type}] {message}");
        self.events.push_back(ActivityEvent {
            timestamp: Utc::now(),
            event_type,
            message,
        });

        if self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActivityEvent> {
        self.events.iter().skip(self.events.len().saturating_sub(count))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
