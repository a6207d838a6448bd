//! Listener list for one named event of one source

use std::any::Any;

use super::action::{BoundAction, ListenerId, WeakAction};

/// A named event and its weakly held listeners, in registration order
#[derive(Debug, Clone)]
pub struct WeakEvent {
    name: String,
    listeners: Vec<WeakAction>,
}

impl WeakEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a listener.
    ///
    /// A live entry for the same listener is kept and the new action comes
    /// back as `Err`. A dead entry with the same id (a freed address reused by
    /// a new listener) is evicted and returned as `Ok(Some(..))`.
    pub fn add(&mut self, action: WeakAction) -> Result<Option<WeakAction>, WeakAction> {
        let id = action.listener_id();
        let evicted = match self.listeners.iter().position(|a| a.listener_id() == id) {
            Some(idx) if self.listeners[idx].is_alive() => return Err(action),
            Some(idx) => Some(self.listeners.remove(idx)),
            None => None,
        };
        self.listeners.push(action);
        Ok(evicted)
    }

    /// Remove the entry for `listener` and hand it back
    pub fn remove(&mut self, listener: ListenerId) -> Option<WeakAction> {
        let idx = self
            .listeners
            .iter()
            .position(|a| a.listener_id() == listener)?;
        Some(self.listeners.remove(idx))
    }

    /// Whether a live entry exists for the listener
    pub fn contains(&self, listener: ListenerId) -> bool {
        self.listeners
            .iter()
            .any(|a| a.listener_id() == listener && a.is_alive())
    }

    /// Take out dead entries
    pub fn cleanup(&mut self) -> Vec<WeakAction> {
        let (live, dead) = std::mem::take(&mut self.listeners)
            .into_iter()
            .partition(WeakAction::is_alive);
        self.listeners = live;
        dead
    }

    /// Every entry, live or dead
    pub fn into_actions(self) -> Vec<WeakAction> {
        self.listeners
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.listeners.iter().filter(|a| a.is_alive()).count()
    }

    /// Upgrade every live listener, skipping dead ones
    pub fn bind_all(&self) -> Vec<BoundAction> {
        self.listeners.iter().filter_map(WeakAction::bind).collect()
    }

    /// Invoke every live listener in order; returns how many ran
    pub fn raise(&self, sender: &dyn Any, args: &dyn Any) -> usize {
        self.bind_all()
            .iter()
            .filter(|action| action.invoke(sender, args))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        entries: Mutex<Vec<&'static str>>,
    }

    fn log_action(listener: &Arc<Log>, tag: &'static str) -> WeakAction {
        WeakAction::new(listener, move |log: &Log, _sender, _: &()| {
            log.entries.lock().push(tag);
        })
    }

    #[test]
    fn test_add_is_idempotent_per_listener() {
        let listener = Arc::new(Log::default());
        let mut event = WeakEvent::new("Saved");

        assert!(matches!(event.add(log_action(&listener, "first")), Ok(None)));
        assert!(event.add(log_action(&listener, "second")).is_err());
        assert_eq!(event.len(), 1);

        assert_eq!(event.raise(&(), &()), 1);
        assert_eq!(*listener.entries.lock(), vec!["first"]);
    }

    #[test]
    fn test_raise_in_registration_order() {
        let shared = Arc::new(Log::default());
        let a = Arc::new(Log::default());
        let b = Arc::new(Log::default());
        let mut event = WeakEvent::new("Saved");

        let s1 = Arc::clone(&shared);
        event
            .add(WeakAction::new(&a, move |_: &Log, _sender, _: &()| {
                s1.entries.lock().push("a")
            }))
            .unwrap();
        let s2 = Arc::clone(&shared);
        event
            .add(WeakAction::new(&b, move |_: &Log, _sender, _: &()| {
                s2.entries.lock().push("b")
            }))
            .unwrap();

        event.raise(&(), &());
        assert_eq!(*shared.entries.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_dead_listeners_skipped_then_cleaned() {
        let alive = Arc::new(Log::default());
        let doomed = Arc::new(Log::default());
        let mut event = WeakEvent::new("Saved");
        event.add(log_action(&doomed, "doomed")).unwrap();
        event.add(log_action(&alive, "alive")).unwrap();

        let doomed_id = ListenerId::of(&doomed);
        drop(doomed);

        assert_eq!(event.raise(&(), &()), 1);
        assert_eq!(event.len(), 2);
        assert!(!event.contains(doomed_id));

        assert_eq!(event.cleanup().len(), 1);
        assert_eq!(event.len(), 1);
        assert_eq!(event.live_count(), 1);
    }

    #[test]
    fn test_remove() {
        let listener = Arc::new(Log::default());
        let mut event = WeakEvent::new("Saved");
        event.add(log_action(&listener, "x")).unwrap();

        assert!(event.remove(ListenerId::of(&listener)).is_some());
        assert!(event.remove(ListenerId::of(&listener)).is_none());
        assert!(event.is_empty());
    }

    #[test]
    fn test_dead_entry_with_reused_id_is_replaced() {
        let mut event = WeakEvent::new("Saved");
        let first = Arc::new(Log::default());
        event.add(log_action(&first, "first")).unwrap();
        let id = ListenerId::of(&first);
        drop(first);

        // Same id as the dead entry, as when the allocator hands the address out again
        let second = Arc::new(Log::default());
        let action = log_action(&second, "second");
        let reused = WeakAction::with_listener_id(action, id);
        let evicted = event.add(reused).unwrap();

        assert!(evicted.is_some_and(|dead| !dead.is_alive()));
        assert_eq!(event.len(), 1);
        assert_eq!(event.raise(&(), &()), 1);
        assert_eq!(*second.entries.lock(), vec!["second"]);
    }
}
