use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-team-member broadcast of committed appointment changes
/// (reminder senders, calendar sync and the like subscribe here).
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a team member's changes. Creates the channel if needed.
    pub fn subscribe(&self, team_member_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(team_member_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, team_member_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&team_member_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
