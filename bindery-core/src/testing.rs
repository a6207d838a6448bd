//! Test utilities for bindery objects
//!
//! - [`EventRecorder`]: a weakly registered listener that records the
//!   `PropertyChanged` and `ErrorsChanged` notifications it receives
//! - Assertion macros for verifying recorded notifications
//!
//! # Example
//!
//! ```ignore
//! use bindery::testing::{EventRecorder, Notification};
//! use bindery::assert_raised;
//!
//! let events = Arc::new(WeakEventManager::new());
//! let customer = Arc::new(ValidableObject::with_events(Customer::default(), events.clone()));
//! let recorder = EventRecorder::new();
//! recorder.attach(&events, &customer);
//!
//! customer.set("name", |c| c.name = None).await??;
//!
//! let notes = recorder.drain();
//! assert_raised!(notes, Notification::ErrorsChanged(p) if p == "name");
//! ```

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::weak::{
    ErrorsChangedArgs, PropertyChangedArgs, Subscription, WeakEventManager, ERRORS_CHANGED,
    PROPERTY_CHANGED,
};

/// A notification captured by [`EventRecorder`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Notification {
    PropertyChanged(String),
    ErrorsChanged(String),
}

impl Notification {
    pub fn property(&self) -> &str {
        match self {
            Notification::PropertyChanged(p) | Notification::ErrorsChanged(p) => p,
        }
    }
}

/// Listener that records notifications into a channel
///
/// The registry only holds the recorder weakly, so keep the returned `Arc`
/// alive for as long as notifications should be captured.
pub struct EventRecorder {
    tx: mpsc::UnboundedSender<Notification>,
    rx: Mutex<mpsc::UnboundedReceiver<Notification>>,
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder").finish_non_exhaustive()
    }
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    fn record(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    /// Record both notifications raised by `source`
    pub fn attach<S: Any + Send + Sync>(
        self: &Arc<Self>,
        events: &WeakEventManager,
        source: &Arc<S>,
    ) -> Vec<Subscription> {
        vec![
            events.add_event_handler(source, PROPERTY_CHANGED, self, on_property_changed),
            events.add_event_handler(source, ERRORS_CHANGED, self, on_errors_changed),
        ]
    }

    /// Record both notifications raised by any instance of `S`
    pub fn attach_type<S: Any>(self: &Arc<Self>, events: &WeakEventManager) -> Vec<Subscription> {
        vec![
            events.add_type_handler::<S, _, _, _>(PROPERTY_CHANGED, self, on_property_changed),
            events.add_type_handler::<S, _, _, _>(ERRORS_CHANGED, self, on_errors_changed),
        ]
    }

    /// Take every notification recorded so far, in order
    pub fn drain(&self) -> Vec<Notification> {
        let mut rx = self.rx.lock();
        let mut notes = Vec::new();
        while let Ok(note) = rx.try_recv() {
            notes.push(note);
        }
        notes
    }

    /// Check if anything was recorded (drains the recorder)
    pub fn has_recorded(&self) -> bool {
        !self.drain().is_empty()
    }

    /// Drain and keep only the properties of `PropertyChanged` notifications
    pub fn property_changes(&self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::PropertyChanged(p) => Some(p),
                Notification::ErrorsChanged(_) => None,
            })
            .collect()
    }

    /// Drain and keep only the properties of `ErrorsChanged` notifications
    pub fn error_changes(&self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::ErrorsChanged(p) => Some(p),
                Notification::PropertyChanged(_) => None,
            })
            .collect()
    }
}

fn on_property_changed(recorder: &EventRecorder, _sender: &dyn Any, args: &PropertyChangedArgs) {
    recorder.record(Notification::PropertyChanged(args.property.clone()));
}

fn on_errors_changed(recorder: &EventRecorder, _sender: &dyn Any, args: &ErrorsChangedArgs) {
    recorder.record(Notification::ErrorsChanged(args.property.clone()));
}

/// Assert that a matching notification was recorded.
///
/// # Example
///
/// ```ignore
/// use bindery::assert_raised;
///
/// let notes = recorder.drain();
/// assert_raised!(notes, Notification::PropertyChanged(_));
/// assert_raised!(notes, Notification::ErrorsChanged(p) if p == "name");
/// ```
#[macro_export]
macro_rules! assert_raised {
    ($notes:expr, $pattern:pat $(if $guard:expr)?) => {{
        let notes = &$notes;
        assert!(
            notes.iter().any(|n| matches!(n, $pattern $(if $guard)?)),
            "Expected notification matching `{}` to be raised, but got: {:?}",
            stringify!($pattern),
            notes
        );
    }};
}

/// Assert that no matching notification was recorded.
///
/// # Example
///
/// ```ignore
/// use bindery::assert_not_raised;
///
/// assert_not_raised!(recorder.drain(), Notification::ErrorsChanged(_));
/// ```
#[macro_export]
macro_rules! assert_not_raised {
    ($notes:expr, $pattern:pat $(if $guard:expr)?) => {{
        let notes = &$notes;
        assert!(
            !notes.iter().any(|n| matches!(n, $pattern $(if $guard)?)),
            "Expected no notification matching `{}`, but got: {:?}",
            stringify!($pattern),
            notes
        );
    }};
}

/// Count how many notifications match a pattern.
///
/// # Example
///
/// ```ignore
/// use bindery::count_raised;
///
/// assert_eq!(count_raised!(notes, Notification::PropertyChanged(_)), 3);
/// ```
#[macro_export]
macro_rules! count_raised {
    ($notes:expr, $pattern:pat $(if $guard:expr)?) => {
        $notes.iter().filter(|n| matches!(n, $pattern $(if $guard)?)).count()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Source;

    #[test]
    fn test_records_in_order() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let recorder = EventRecorder::new();
        recorder.attach(&events, &source);

        events.raise_event(&*source, PROPERTY_CHANGED, &PropertyChangedArgs::new("a"));
        events.raise_event(&*source, ERRORS_CHANGED, &ErrorsChangedArgs::new("a"));

        let notes = recorder.drain();
        assert_eq!(notes.len(), 2);
        assert_raised!(notes, Notification::PropertyChanged(p) if p == "a");
        assert_raised!(notes, Notification::ErrorsChanged(_));
        assert_not_raised!(notes, Notification::PropertyChanged(p) if p == "b");
        assert_eq!(count_raised!(notes, Notification::ErrorsChanged(_)), 1);
        assert!(!recorder.has_recorded());
    }

    #[test]
    fn test_filtered_drains() {
        let events = WeakEventManager::new();
        let recorder = EventRecorder::new();
        recorder.attach_type::<Source>(&events);

        events.raise_event(&Source, PROPERTY_CHANGED, &PropertyChangedArgs::new("x"));
        assert_eq!(recorder.property_changes(), vec!["x"]);

        events.raise_event(&Source, ERRORS_CHANGED, &ErrorsChangedArgs::new("y"));
        assert_eq!(recorder.error_changes(), vec!["y"]);
    }

    #[test]
    fn test_dropped_recorder_stops_listening() {
        let events = WeakEventManager::new();
        let source = Arc::new(Source);
        let recorder = EventRecorder::new();
        recorder.attach(&events, &source);
        drop(recorder);

        let reached = events.raise_event(&*source, PROPERTY_CHANGED, &PropertyChangedArgs::new("a"));
        assert_eq!(reached, 0);
    }

    #[test]
    fn test_notification_property() {
        assert_eq!(Notification::ErrorsChanged("age".into()).property(), "age");
    }
}
