//! Per-user snapshot channels for live list subscriptions.
//!
//! Every mutation re-delivers the full current list to subscribers — there
//! is no diffing. `tokio::sync::watch` gives exactly that shape: the channel
//! holds one value, each send replaces it wholesale, and a late subscriber
//! immediately observes the latest snapshot.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::watch;

/// Fan-out hub mapping each user to a watch channel of full-list snapshots.
pub struct SnapshotHub<T> {
    senders: Mutex<HashMap<String, watch::Sender<Vec<T>>>>,
}

impl<T: Clone> SnapshotHub<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to a user's snapshots. The receiver starts on the last
    /// published snapshot (empty if nothing was ever published).
    pub fn subscribe(&self, user_id: &str) -> watch::Receiver<Vec<T>> {
        let mut senders = self.senders.lock().expect("snapshot hub lock poisoned");
        senders
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe()
    }

    /// Replace a user's snapshot. Kept even with zero subscribers so a
    /// later subscriber starts from current state.
    pub fn publish(&self, user_id: &str, snapshot: Vec<T>) {
        let mut senders = self.senders.lock().expect("snapshot hub lock poisoned");
        senders
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .send_replace(snapshot);
    }
}
