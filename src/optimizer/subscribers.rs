use std::sync::Arc;

use parking_lot::Mutex;

use super::OptimizerSnapshot;

/// A registered observer.
pub type Callback = Arc<dyn Fn(&OptimizerSnapshot) + Send + Sync>;

/// Handle returned on subscription, used to unsubscribe later on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Ordered list of observers of one event kind.
///
/// The list is never borrowed while callbacks run: each notification round works on a
/// copy taken up front, so a callback may subscribe or unsubscribe freely and the
/// change only shows up on the next round.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl Subscribers {
    pub fn push(&self, id: SubscriptionId, callback: Callback) {
        self.entries.lock().push((id, callback));
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(other, _)| *other != id);
        entries.len() != before
    }

    /// Returns the callbacks in registration order.
    pub fn snapshot(&self) -> Vec<Callback> {
        self.entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}
