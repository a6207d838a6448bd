//! Process-wide registry of weak event subscriptions
//!
//! Sources never hold their listeners. Instead every `raise_event` goes
//! through a [`WeakEventManager`], which maps a source (weakly, by identity)
//! to its named events and their weakly held listeners.
//!
//! # Example
//!
//! ```ignore
//! use bindery::weak::{WeakEventManager, PropertyChangedArgs, PROPERTY_CHANGED};
//!
//! let events = WeakEventManager::new();
//! let customer = Arc::new(Customer::default());
//! let view = Arc::new(CustomerView::default());
//!
//! events.add_event_handler(&customer, PROPERTY_CHANGED, &view, |view: &CustomerView, _sender, args: &PropertyChangedArgs| {
//!     view.refresh(&args.property);
//! });
//!
//! events.raise_event(&*customer, PROPERTY_CHANGED, &PropertyChangedArgs::new("name"));
//!
//! // Dropping the view is enough; the next cleanup pass forgets it.
//! drop(view);
//! events.cleanup();
//! ```

use std::any::{type_name, Any, TypeId};
use std::sync::{Arc, LazyLock, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::action::{ListenerId, WeakAction};
use super::event::WeakEvent;
use crate::config::EventManagerConfig;

/// Identity of an event source in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// One object, identified by address
    Instance(usize),
    /// Every object of a type
    Type(TypeId),
}

impl SourceKey {
    /// Key for a source object. Pass the object itself, not the `Arc` holding it.
    pub fn of<S: Any>(source: &S) -> Self {
        Self::Instance((source as *const S).cast::<()>() as usize)
    }

    pub fn of_type<S: Any>() -> Self {
        Self::Type(TypeId::of::<S>())
    }
}

enum SourceRef {
    Instance(Weak<dyn Any + Send + Sync>),
    Type(&'static str),
}

struct SourceEntry {
    source: SourceRef,
    events: Vec<WeakEvent>,
}

impl SourceEntry {
    fn new(source: SourceRef) -> Self {
        Self {
            source,
            events: Vec::new(),
        }
    }

    fn is_alive(&self) -> bool {
        match &self.source {
            SourceRef::Instance(weak) => weak.strong_count() > 0,
            SourceRef::Type(_) => true,
        }
    }

    fn event(&self, name: &str) -> Option<&WeakEvent> {
        self.events.iter().find(|e| e.name() == name)
    }

    fn event_mut(&mut self, name: &str) -> &mut WeakEvent {
        let idx = match self.events.iter().position(|e| e.name() == name) {
            Some(idx) => idx,
            None => {
                self.events.push(WeakEvent::new(name));
                self.events.len() - 1
            }
        };
        &mut self.events[idx]
    }

    fn remove_listener(&mut self, listener: ListenerId, event: Option<&str>) -> Vec<WeakAction> {
        self.events
            .iter_mut()
            .filter(|e| event.is_none_or(|name| e.name() == name))
            .filter_map(|e| e.remove(listener))
            .collect()
    }

    fn into_actions(self) -> Vec<WeakAction> {
        self.events
            .into_iter()
            .flat_map(WeakEvent::into_actions)
            .collect()
    }

    fn listener_count(&self) -> usize {
        self.events.iter().map(WeakEvent::len).sum()
    }
}

/// Token identifying one registration
///
/// Hand it back to [`WeakEventManager::unsubscribe`], or turn it into a
/// [`SubscriptionGuard`] that unsubscribes on drop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    source: SourceKey,
    event: String,
    listener: ListenerId,
}

impl Subscription {
    pub fn source(&self) -> SourceKey {
        self.source
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    /// Tie this registration to a guard's lifetime
    pub fn guard(self, manager: &Arc<WeakEventManager>) -> SubscriptionGuard {
        SubscriptionGuard {
            manager: Arc::downgrade(manager),
            subscription: Some(self),
        }
    }
}

/// Removes its subscription when dropped
#[derive(Debug)]
pub struct SubscriptionGuard {
    manager: Weak<WeakEventManager>,
    subscription: Option<Subscription>,
}

impl SubscriptionGuard {
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Keep the registration alive beyond the guard
    pub fn detach(mut self) -> Option<Subscription> {
        self.subscription.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let (Some(subscription), Some(manager)) =
            (self.subscription.take(), self.manager.upgrade())
        {
            manager.unsubscribe(&subscription);
        }
    }
}

/// What a cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sources_removed: usize,
    pub events_removed: usize,
    pub listeners_removed: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

static SHARED: LazyLock<ArcSwap<WeakEventManager>> =
    LazyLock::new(|| ArcSwap::from_pointee(WeakEventManager::new()));

/// Registry mapping weak sources to their events and weak listeners
///
/// Structural changes lock one shard of the map at a time. Handlers run
/// after all locks are released, so a handler may register or remove
/// subscriptions itself. Removed handlers are also dropped outside the
/// locks, so state captured by a handler may touch the registry when it
/// is dropped.
#[derive(Default)]
pub struct WeakEventManager {
    sources: DashMap<SourceKey, SourceEntry>,
}

impl std::fmt::Debug for WeakEventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakEventManager")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl WeakEventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry, created on first use
    pub fn shared() -> Arc<Self> {
        SHARED.load_full()
    }

    /// Replace the process-wide registry with an empty one.
    ///
    /// Handles obtained from [`shared`](Self::shared) before the reset keep
    /// pointing at the old registry.
    pub fn reset_shared() {
        SHARED.store(Arc::new(Self::new()));
        debug!("Shared weak event registry reset");
    }

    /// Register `listener` for `event` raised by `source`.
    ///
    /// Registering the same listener twice for the same source and event is
    /// absorbed; the first handler stays in place.
    pub fn add_event_handler<S, L, A, F>(
        &self,
        source: &Arc<S>,
        event: &str,
        listener: &Arc<L>,
        handler: F,
    ) -> Subscription
    where
        S: Any + Send + Sync,
        L: Any + Send + Sync,
        A: Any,
        F: Fn(&L, &dyn Any, &A) + Send + Sync + 'static,
    {
        let key = SourceKey::of::<S>(source);
        let erased: Arc<dyn Any + Send + Sync> = source.clone();
        let source_ref = || SourceRef::Instance(Arc::downgrade(&erased));
        self.add_action(key, source_ref, event, WeakAction::new(listener, handler))
    }

    /// Register `listener` for `event` raised by any source of type `S`,
    /// existing or future
    pub fn add_type_handler<S, L, A, F>(&self, event: &str, listener: &Arc<L>, handler: F) -> Subscription
    where
        S: Any,
        L: Any + Send + Sync,
        A: Any,
        F: Fn(&L, &dyn Any, &A) + Send + Sync + 'static,
    {
        let source_ref = || SourceRef::Type(type_name::<S>());
        self.add_action(
            SourceKey::of_type::<S>(),
            source_ref,
            event,
            WeakAction::new(listener, handler),
        )
    }

    fn add_action(
        &self,
        key: SourceKey,
        source_ref: impl Fn() -> SourceRef,
        event: &str,
        action: WeakAction,
    ) -> Subscription {
        let listener = action.listener_id();
        let mut released = Vec::new();
        {
            let mut entry = self
                .sources
                .entry(key)
                .or_insert_with(|| SourceEntry::new(source_ref()));
            if !entry.is_alive() {
                let stale = std::mem::replace(&mut *entry, SourceEntry::new(source_ref()));
                released.extend(stale.into_actions());
            }

            match entry.event_mut(event).add(action) {
                Ok(evicted) => {
                    debug!(?key, event, ?listener, "Listener registered");
                    released.extend(evicted);
                }
                Err(duplicate) => {
                    trace!(?key, event, ?listener, "Duplicate listener registration ignored");
                    released.push(duplicate);
                }
            }
        }
        drop(released);

        Subscription {
            source: key,
            event: event.to_string(),
            listener,
        }
    }

    /// Remove `listener` from `event` of `source`; no-op if absent
    pub fn remove_event_handler<S: Any, L: ?Sized>(
        &self,
        source: &S,
        event: &str,
        listener: &Arc<L>,
    ) -> bool {
        self.remove_from(SourceKey::of(source), event, ListenerId::of(listener))
    }

    /// Remove a type-wide registration
    pub fn remove_type_handler<S: Any, L: ?Sized>(&self, event: &str, listener: &Arc<L>) -> bool {
        self.remove_from(SourceKey::of_type::<S>(), event, ListenerId::of(listener))
    }

    /// Remove the registration a token refers to
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.remove_from(
            subscription.source,
            &subscription.event,
            subscription.listener,
        )
    }

    fn remove_from(&self, key: SourceKey, event: &str, listener: ListenerId) -> bool {
        let removed = self.sources.get_mut(&key).and_then(|mut entry| {
            entry
                .events
                .iter_mut()
                .find(|e| e.name() == event)
                .and_then(|e| e.remove(listener))
        });
        match removed {
            Some(action) => {
                debug!(?key, event, ?listener, "Listener removed");
                drop(action);
                true
            }
            None => false,
        }
    }

    /// Forget every event and listener of `source`
    pub fn remove_source<S: Any>(&self, source: &S) -> bool {
        let removed = self.sources.remove(&SourceKey::of(source));
        if removed.is_some() {
            debug!(source = type_name::<S>(), "Source removed");
        }
        removed.is_some()
    }

    /// Forget every type-wide registration for `S`
    pub fn remove_type_source<S: Any>(&self) -> bool {
        let removed = self.sources.remove(&SourceKey::of_type::<S>());
        removed.is_some()
    }

    /// Unsubscribe `listener` from everything; returns the number of events
    /// it was removed from
    pub fn remove_listener<L: ?Sized>(&self, listener: &Arc<L>) -> usize {
        self.remove_listener_matching(ListenerId::of(listener), None)
    }

    /// Unsubscribe `listener` from one event name across all sources
    pub fn remove_listener_from_event<L: ?Sized>(&self, listener: &Arc<L>, event: &str) -> usize {
        self.remove_listener_matching(ListenerId::of(listener), Some(event))
    }

    fn remove_listener_matching(&self, listener: ListenerId, event: Option<&str>) -> usize {
        let removed: Vec<WeakAction> = self
            .sources
            .iter_mut()
            .flat_map(|mut entry| entry.remove_listener(listener, event))
            .collect();
        debug!(?listener, event, removed = removed.len(), "Listener removed from all sources");
        removed.len()
    }

    /// Invoke every live listener of `event` for `sender`.
    ///
    /// Listeners registered on the instance run first, then type-wide
    /// listeners, each group in registration order. Dead listeners are
    /// skipped here and only removed by [`cleanup`](Self::cleanup). Returns
    /// the number of handlers that ran.
    ///
    /// `sender` is the object itself. For a source held in an `Arc`, pass
    /// `&*source` or use [`raise_for`](Self::raise_for).
    pub fn raise_event<S, A>(&self, sender: &S, event: &str, args: &A) -> usize
    where
        S: Any + Send + Sync,
        A: Any,
    {
        let mut bound = Vec::new();
        for key in [SourceKey::of(sender), SourceKey::of_type::<S>()] {
            if let Some(entry) = self.sources.get(&key) {
                if !entry.is_alive() {
                    continue;
                }
                if let Some(weak_event) = entry.event(event) {
                    bound.extend(weak_event.bind_all());
                }
            }
        }

        if bound.is_empty() {
            return 0;
        }

        let sender: &dyn Any = sender;
        let invoked = bound
            .iter()
            .filter(|action| action.invoke(sender, args))
            .count();
        trace!(event, invoked, "Event raised");
        invoked
    }

    /// [`raise_event`](Self::raise_event) for a source held in an `Arc`
    pub fn raise_for<S, A>(&self, source: &Arc<S>, event: &str, args: &A) -> usize
    where
        S: Any + Send + Sync,
        A: Any,
    {
        self.raise_event(&**source, event, args)
    }

    /// Remove dead listeners, empty events, and dead or empty sources
    pub fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut released: Vec<WeakAction> = Vec::new();

        self.sources.retain(|_, entry| {
            if !entry.is_alive() {
                report.sources_removed += 1;
                report.events_removed += entry.events.len();
                report.listeners_removed += entry.listener_count();
                released.extend(
                    std::mem::take(&mut entry.events)
                        .into_iter()
                        .flat_map(WeakEvent::into_actions),
                );
                return false;
            }

            entry.events.retain_mut(|event| {
                let dead = event.cleanup();
                report.listeners_removed += dead.len();
                released.extend(dead);
                if event.is_empty() {
                    report.events_removed += 1;
                    false
                } else {
                    true
                }
            });

            if entry.events.is_empty() {
                report.sources_removed += 1;
                false
            } else {
                true
            }
        });

        drop(released);
        if !report.is_empty() {
            debug!(?report, "Weak event cleanup");
        }
        report
    }

    /// Run [`cleanup`](Self::cleanup) on the blocking pool
    pub fn cleanup_in_background(self: &Arc<Self>) -> JoinHandle<CleanupReport> {
        let manager = Arc::clone(self);
        tokio::task::spawn_blocking(move || manager.cleanup())
    }

    /// Whether `listener` has a live registration anywhere
    pub fn contains_listener<L: ?Sized>(&self, listener: &Arc<L>) -> bool {
        self.contains_listener_id(ListenerId::of(listener))
    }

    /// [`contains_listener`](Self::contains_listener) by id, usable after
    /// the listener itself is gone
    pub fn contains_listener_id(&self, listener: ListenerId) -> bool {
        self.sources.iter().any(|entry| {
            entry.is_alive() && entry.events.iter().any(|e| e.contains(listener))
        })
    }

    /// Whether `source` is registered and still alive
    pub fn contains_source<S: Any>(&self, source: &S) -> bool {
        self.sources
            .get(&SourceKey::of(source))
            .is_some_and(|entry| entry.is_alive())
    }

    /// Number of registered sources, including type-wide entries
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of listener entries (live or dead) for `event` of `source`
    pub fn listener_count<S: Any>(&self, source: &S, event: &str) -> usize {
        self.sources
            .get(&SourceKey::of(source))
            .and_then(|entry| entry.event(event).map(WeakEvent::len))
            .unwrap_or(0)
    }

    /// Start the periodic reaper if the configuration asks for one
    pub fn start_reaper(
        self: &Arc<Self>,
        config: &EventManagerConfig,
        cancel_token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        config
            .reaper_interval()
            .map(|interval| spawn_reaper(Arc::clone(self), interval, cancel_token))
    }
}

/// Spawn a task that runs `cleanup` every `interval` until cancelled
pub fn spawn_reaper(
    manager: Arc<WeakEventManager>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Weak event reaper started");
        let mut ticker = tokio::time::interval(interval);
        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Weak event reaper cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    manager.cleanup();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weak::args::{PropertyChangedArgs, PROPERTY_CHANGED};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Source;

    #[derive(Default)]
    struct OtherSource;

    #[derive(Default)]
    struct Listener {
        seen: Mutex<Vec<String>>,
        hits: AtomicUsize,
    }

    fn on_changed(listener: &Listener, _sender: &dyn Any, args: &PropertyChangedArgs) {
        listener.hits.fetch_add(1, Ordering::SeqCst);
        listener.seen.lock().push(args.property.clone());
    }

    fn changed(name: &str) -> PropertyChangedArgs {
        PropertyChangedArgs::new(name)
    }

    #[test]
    fn test_raise_invokes_once_per_raise() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());

        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);

        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("a")), 1);
        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("b")), 1);
        assert_eq!(*listener.seen.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());

        let first = events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);
        let second = events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);
        assert_eq!(first, second);

        events.raise_event(&*source, PROPERTY_CHANGED, &changed("x"));
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
        assert_eq!(events.listener_count(&*source, PROPERTY_CHANGED), 1);
    }

    #[test]
    fn test_raise_without_listeners_is_noop() {
        let events = WeakEventManager::new();
        let source = Source;
        assert_eq!(events.raise_event(&source, PROPERTY_CHANGED, &changed("x")), 0);
    }

    #[test]
    fn test_event_names_are_separate() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, "Saved", &listener, on_changed);

        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("x")), 0);
        assert_eq!(events.raise_event(&*source, "Saved", &changed("x")), 1);
    }

    #[test]
    fn test_mismatched_args_skip_handler() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);

        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &42u32), 0);
        assert_eq!(listener.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_source() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);
        assert!(events.contains_source(&*source));

        assert!(events.remove_source(&*source));
        assert!(!events.contains_source(&*source));
        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("x")), 0);
    }

    #[test]
    fn test_remove_event_handler_and_unsubscribe() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let a = Arc::new(Listener::default());
        let b = Arc::new(Listener::default());

        events.add_event_handler(&source, PROPERTY_CHANGED, &a, on_changed);
        let token = events.add_event_handler(&source, PROPERTY_CHANGED, &b, on_changed);

        assert!(events.remove_event_handler(&*source, PROPERTY_CHANGED, &a));
        assert!(!events.remove_event_handler(&*source, PROPERTY_CHANGED, &a));
        assert!(events.unsubscribe(&token));

        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("x")), 0);
    }

    #[test]
    fn test_remove_listener_everywhere() {
        let events = WeakEventManager::new();
        let s1 = Arc::new(Source);
        let s2 = Arc::new(OtherSource);
        let listener = Arc::new(Listener::default());

        events.add_event_handler(&s1, PROPERTY_CHANGED, &listener, on_changed);
        events.add_event_handler(&s1, "Saved", &listener, on_changed);
        events.add_event_handler(&s2, PROPERTY_CHANGED, &listener, on_changed);

        assert_eq!(events.remove_listener_from_event(&listener, "Saved"), 1);
        assert!(events.contains_listener(&listener));
        assert_eq!(events.remove_listener(&listener), 2);
        assert!(!events.contains_listener(&listener));
    }

    #[test]
    fn test_type_wide_subscription() {
        let events = WeakEventManager::new();
        let listener = Arc::new(Listener::default());
        events.add_type_handler::<Source, _, _, _>(PROPERTY_CHANGED, &listener, on_changed);

        // Sources that never registered anything still reach type-wide listeners
        let first = Source;
        let second = Arc::new(Source);
        assert_eq!(events.raise_event(&first, PROPERTY_CHANGED, &changed("a")), 1);
        assert_eq!(events.raise_event(&*second, PROPERTY_CHANGED, &changed("b")), 1);
        assert_eq!(events.raise_event(&OtherSource, PROPERTY_CHANGED, &changed("c")), 0);

        assert!(events.remove_type_handler::<Source, _>(PROPERTY_CHANGED, &listener));
        assert_eq!(events.raise_event(&first, PROPERTY_CHANGED, &changed("d")), 0);
    }

    #[test]
    fn test_instance_listeners_run_before_type_wide() {
        let events = WeakEventManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let source = Arc::new(Source);
        let wide = Arc::new(Listener::default());
        let local = Arc::new(Listener::default());

        let o = Arc::clone(&order);
        events.add_type_handler::<Source, _, _, _>(
            PROPERTY_CHANGED,
            &wide,
            move |_: &Listener, _sender, _: &PropertyChangedArgs| o.lock().push("type"),
        );
        let o = Arc::clone(&order);
        events.add_event_handler(
            &source,
            PROPERTY_CHANGED,
            &local,
            move |_: &Listener, _sender, _: &PropertyChangedArgs| o.lock().push("instance"),
        );

        events.raise_event(&*source, PROPERTY_CHANGED, &changed("x"));
        assert_eq!(*order.lock(), vec!["instance", "type"]);
    }

    #[test]
    fn test_collected_listener_is_cleaned_up() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);
        let id = ListenerId::of(&listener);
        assert!(events.contains_listener_id(id));

        let weak = Arc::downgrade(&listener);
        drop(listener);
        assert!(weak.upgrade().is_none());

        // Dead listener is skipped but not yet removed
        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("x")), 0);
        assert_eq!(events.listener_count(&*source, PROPERTY_CHANGED), 1);

        let report = events.cleanup();
        assert_eq!(report.listeners_removed, 1);
        assert_eq!(report.sources_removed, 1);
        assert_eq!(events.source_count(), 0);
        assert!(!events.contains_listener_id(id));
    }

    #[test]
    fn test_raise_for_arc_source() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);

        assert_eq!(events.raise_for(&source, PROPERTY_CHANGED, &changed("x")), 1);
        assert_eq!(*listener.seen.lock(), vec!["x"]);
    }

    /// Reads the registry when dropped
    struct Tripwire {
        events: Arc<WeakEventManager>,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tripwire {
        fn drop(&mut self) {
            let _ = self.events.source_count();
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wired_handler(
        events: &Arc<WeakEventManager>,
        drops: &Arc<AtomicUsize>,
    ) -> impl Fn(&Listener, &dyn Any, &PropertyChangedArgs) + Send + Sync + 'static {
        let wire = Tripwire {
            events: Arc::clone(events),
            drops: Arc::clone(drops),
        };
        move |_, _, _| {
            let _ = wire.drops.load(Ordering::SeqCst);
        }
    }

    #[test]
    fn test_released_handlers_drop_outside_locks() {
        let events = Arc::new(WeakEventManager::new());
        let drops = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());

        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, wired_handler(&events, &drops));
        // Rejected duplicate
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, wired_handler(&events, &drops));
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        assert!(events.remove_event_handler(&*source, PROPERTY_CHANGED, &listener));
        assert_eq!(drops.load(Ordering::SeqCst), 2);

        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, wired_handler(&events, &drops));
        assert_eq!(events.remove_listener(&listener), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 3);

        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, wired_handler(&events, &drops));
        drop(listener);
        assert_eq!(events.cleanup().listeners_removed, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cleanup_runs_alongside_dispatch() {
        const ROUNDS: usize = 200;
        let events = Arc::new(WeakEventManager::new());
        let keeper = Arc::new(Listener::default());
        let sources: Vec<Arc<Source>> = (0..8).map(|_| Arc::new(Source)).collect();
        for source in &sources {
            events.add_event_handler(source, PROPERTY_CHANGED, &keeper, on_changed);
        }

        let stop = CancellationToken::new();
        let sweeper = {
            let events = Arc::clone(&events);
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut sweeps = 0usize;
                loop {
                    events.cleanup_in_background().await.expect("cleanup task");
                    sweeps += 1;
                    if stop.is_cancelled() {
                        break sweeps;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let workers: Vec<_> = sources
            .iter()
            .map(|source| {
                let events = Arc::clone(&events);
                let source = Arc::clone(source);
                tokio::spawn(async move {
                    for _ in 0..ROUNDS {
                        let transient = Arc::new(Listener::default());
                        events.add_event_handler(&source, PROPERTY_CHANGED, &transient, on_changed);
                        assert_eq!(events.raise_for(&source, PROPERTY_CHANGED, &changed("tick")), 2);
                        drop(transient);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.expect("worker");
        }
        stop.cancel();
        assert!(sweeper.await.expect("sweeper") > 0);

        events.cleanup();
        assert_eq!(keeper.hits.load(Ordering::SeqCst), sources.len() * ROUNDS);
        assert_eq!(events.source_count(), sources.len());
        for source in &sources {
            assert_eq!(events.listener_count(&**source, PROPERTY_CHANGED), 1);
        }
        assert!(events.contains_listener(&keeper));
    }

    #[test]
    fn test_dead_source_is_cleaned_up() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);

        drop(source);
        assert!(!events.contains_listener(&listener));
        let report = events.cleanup();
        assert_eq!(
            report,
            CleanupReport {
                sources_removed: 1,
                events_removed: 1,
                listeners_removed: 1,
            }
        );
    }

    #[test]
    fn test_handler_may_reenter_registry() {
        let events = Arc::new(WeakEventManager::new());
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());

        let registry = Arc::clone(&events);
        let src = Arc::clone(&source);
        events.add_event_handler(
            &source,
            PROPERTY_CHANGED,
            &listener,
            move |l: &Listener, _sender, _: &PropertyChangedArgs| {
                l.hits.fetch_add(1, Ordering::SeqCst);
                registry.remove_source(&*src);
            },
        );

        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("x")), 1);
        assert!(!events.contains_source(&*source));
    }

    #[test]
    fn test_subscription_guard() {
        let events = Arc::new(WeakEventManager::new());
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());

        {
            let _guard = events
                .add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed)
                .guard(&events);
            assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("x")), 1);
        }
        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("y")), 0);

        let kept = events
            .add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed)
            .guard(&events)
            .detach()
            .expect("guard not yet detached");
        assert_eq!(events.raise_event(&*source, PROPERTY_CHANGED, &changed("z")), 1);
        assert!(events.unsubscribe(&kept));
    }

    #[tokio::test]
    async fn test_cleanup_in_background() {
        let events = Arc::new(WeakEventManager::new());
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);
        drop(listener);

        let report = events.cleanup_in_background().await.expect("cleanup task");
        assert_eq!(report.listeners_removed, 1);
        assert_eq!(events.source_count(), 0);
    }

    #[tokio::test]
    async fn test_reaper_sweeps_and_cancels() {
        let events = Arc::new(WeakEventManager::new());
        let source = Arc::new(Source);
        let listener = Arc::new(Listener::default());
        events.add_event_handler(&source, PROPERTY_CHANGED, &listener, on_changed);
        drop(listener);

        let token = CancellationToken::new();
        let config = EventManagerConfig {
            reaper_interval_ms: Some(10),
        };
        let handle = events
            .start_reaper(&config, token.clone())
            .expect("reaper configured");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(events.source_count(), 0);

        token.cancel();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("reaper stops")
            .expect("reaper task");
    }

    #[test]
    fn test_no_reaper_without_interval() {
        let events = Arc::new(WeakEventManager::new());
        assert!(events
            .start_reaper(&EventManagerConfig::default(), CancellationToken::new())
            .is_none());
    }
}
