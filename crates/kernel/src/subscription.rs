use hoard_common::{FieldName, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Which fields a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPattern {
    /// A single named field.
    Field(FieldName),
    /// Every field.
    Any,
}

impl FieldPattern {
    pub fn matches(&self, field: &str) -> bool {
        match self {
            Self::Field(name) => name == field,
            Self::Any => true,
        }
    }
}

impl From<&str> for FieldPattern {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<FieldName> for FieldPattern {
    fn from(name: FieldName) -> Self {
        Self::Field(name)
    }
}

/// Delivered to subscribers once per changed field per write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: FieldName,
    pub previous: Value,
    pub current: Value,
}

pub(crate) type Callback = Arc<dyn Fn(&FieldChange) + Send + Sync>;

struct Subscriber {
    id: u64,
    pattern: FieldPattern,
    callback: Callback,
}

/// Live subscriptions, in registration order.
#[derive(Default)]
pub(crate) struct SubscriberList {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl SubscriberList {
    pub(crate) fn add(&mut self, pattern: FieldPattern, callback: Callback) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.push(Subscriber {
            id,
            pattern,
            callback,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    /// Callbacks interested in `field`, cloned out so dispatch runs without the lock held.
    pub(crate) fn matching(&self, field: &str) -> Vec<Callback> {
        self.subscribers
            .iter()
            .filter(|s| s.pattern.matches(field))
            .map(|s| Arc::clone(&s.callback))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

/// Handle to a registered callback.
///
/// Dropping the handle unsubscribes, so a subscription lives exactly as long
/// as the scope that owns it. Call [`Subscription::detach`] to keep it for the
/// lifetime of the store instead.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<SubscriberList>>,
}

impl Subscription {
    pub(crate) fn new(id: u64, list: &Arc<Mutex<SubscriberList>>) -> Self {
        Self {
            id,
            list: Arc::downgrade(list),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the callback registered until the store itself is dropped.
    pub fn detach(mut self) {
        self.list = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            if lock(&list).remove(self.id) {
                tracing::trace!(id = self.id, "unsubscribed");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Arc::new(|_: &FieldChange| {})
    }

    #[test]
    fn pattern_matching() {
        assert!(FieldPattern::from("xp").matches("xp"));
        assert!(!FieldPattern::from("xp").matches("coins"));
        assert!(FieldPattern::Any.matches("anything"));
    }

    #[test]
    fn drop_unsubscribes() {
        let list = Arc::new(Mutex::new(SubscriberList::default()));
        let id = lock(&list).add(FieldPattern::Any, noop());
        let sub = Subscription::new(id, &list);
        assert_eq!(lock(&list).len(), 1);
        drop(sub);
        assert_eq!(lock(&list).len(), 0);
    }

    #[test]
    fn detach_keeps_callback() {
        let list = Arc::new(Mutex::new(SubscriberList::default()));
        let id = lock(&list).add(FieldPattern::Any, noop());
        Subscription::new(id, &list).detach();
        assert_eq!(lock(&list).len(), 1);
    }

    #[test]
    fn matching_preserves_registration_order() {
        let mut list = SubscriberList::default();
        let first = list.add(FieldPattern::from("xp"), noop());
        let _other = list.add(FieldPattern::from("coins"), noop());
        let third = list.add(FieldPattern::Any, noop());
        assert!(first < third);
        assert_eq!(list.matching("xp").len(), 2);
        assert_eq!(list.matching("coins").len(), 2);
        assert_eq!(list.matching("loadout").len(), 1);
    }

    #[test]
    fn handle_outliving_list_is_harmless() {
        let list = Arc::new(Mutex::new(SubscriberList::default()));
        let id = lock(&list).add(FieldPattern::Any, noop());
        let sub = Subscription::new(id, &list);
        drop(list);
        sub.unsubscribe();
    }
}
