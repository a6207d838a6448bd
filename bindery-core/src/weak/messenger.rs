//! Message bus for decoupled view-model communication
//!
//! Recipients register for a message type (optionally on a named channel
//! token) and are held weakly; senders never learn who received a message.

use std::any::{type_name, Any};
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use tracing::{debug, trace};

use super::manager::{CleanupReport, Subscription, WeakEventManager};

/// Channel used when no token is given
const DEFAULT_CHANNEL: &str = "";

static SHARED: LazyLock<ArcSwap<Messenger>> =
    LazyLock::new(|| ArcSwap::from_pointee(Messenger::new()));

/// Weak publish/subscribe bus keyed by message type and channel token
#[derive(Debug, Default)]
pub struct Messenger {
    events: WeakEventManager,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default messenger
    pub fn shared() -> Arc<Self> {
        SHARED.load_full()
    }

    /// Replace the process-wide messenger with an empty one
    pub fn reset_shared() {
        SHARED.store(Arc::new(Self::new()));
        debug!("Shared messenger reset");
    }

    /// Subscribe `recipient` to every `M` sent without a token
    pub fn register<M, R, F>(&self, recipient: &Arc<R>, handler: F) -> Subscription
    where
        M: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&R, &M) + Send + Sync + 'static,
    {
        self.register_with_token(recipient, DEFAULT_CHANNEL, handler)
    }

    /// Subscribe `recipient` to every `M` sent on channel `token`
    pub fn register_with_token<M, R, F>(&self, recipient: &Arc<R>, token: &str, handler: F) -> Subscription
    where
        M: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&R, &M) + Send + Sync + 'static,
    {
        trace!(message = type_name::<M>(), token, "Recipient registered");
        self.events
            .add_type_handler::<M, R, M, _>(token, recipient, move |recipient, _sender, message| {
                handler(recipient, message)
            })
    }

    /// Deliver `message` to its live recipients; returns how many received it
    pub fn send<M: Any + Send + Sync>(&self, message: &M) -> usize {
        self.send_with_token(message, DEFAULT_CHANNEL)
    }

    /// Deliver `message` to recipients registered on channel `token`
    pub fn send_with_token<M: Any + Send + Sync>(&self, message: &M, token: &str) -> usize {
        let delivered = self.events.raise_event(message, token, message);
        trace!(message = type_name::<M>(), token, delivered, "Message sent");
        delivered
    }

    /// Remove `recipient` from every message type and channel
    pub fn unregister<R: ?Sized>(&self, recipient: &Arc<R>) -> usize {
        self.events.remove_listener(recipient)
    }

    /// Remove `recipient` from the default channel of message type `M`
    pub fn unregister_message<M: Any, R: ?Sized>(&self, recipient: &Arc<R>) -> bool {
        self.events
            .remove_type_handler::<M, R>(DEFAULT_CHANNEL, recipient)
    }

    /// Remove `recipient` from channel `token` of message type `M`
    pub fn unregister_with_token<M: Any, R: ?Sized>(&self, recipient: &Arc<R>, token: &str) -> bool {
        self.events.remove_type_handler::<M, R>(token, recipient)
    }

    /// Whether `recipient` still has a live registration
    pub fn is_registered<R: ?Sized>(&self, recipient: &Arc<R>) -> bool {
        self.events.contains_listener(recipient)
    }

    /// Forget recipients that have been dropped
    pub fn cleanup(&self) -> CleanupReport {
        self.events.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct CustomerSaved {
        id: u32,
    }

    #[derive(Debug)]
    struct Refresh;

    #[derive(Default)]
    struct Inbox {
        received: Mutex<Vec<u32>>,
    }

    fn on_saved(inbox: &Inbox, message: &CustomerSaved) {
        inbox.received.lock().push(message.id);
    }

    #[test]
    fn test_send_reaches_registered_recipients() {
        let messenger = Messenger::new();
        let a = Arc::new(Inbox::default());
        let b = Arc::new(Inbox::default());
        messenger.register(&a, on_saved);
        messenger.register(&b, on_saved);

        assert_eq!(messenger.send(&CustomerSaved { id: 7 }), 2);
        assert_eq!(*a.received.lock(), vec![7]);
        assert_eq!(*b.received.lock(), vec![7]);
    }

    #[test]
    fn test_message_types_are_separate() {
        let messenger = Messenger::new();
        let inbox = Arc::new(Inbox::default());
        messenger.register(&inbox, on_saved);

        assert_eq!(messenger.send(&Refresh), 0);
        assert!(inbox.received.lock().is_empty());
    }

    #[test]
    fn test_tokens_select_channel() {
        let messenger = Messenger::new();
        let detail = Arc::new(Inbox::default());
        let list = Arc::new(Inbox::default());
        messenger.register_with_token(&detail, "detail", on_saved);
        messenger.register(&list, on_saved);

        assert_eq!(messenger.send_with_token(&CustomerSaved { id: 1 }, "detail"), 1);
        assert_eq!(messenger.send(&CustomerSaved { id: 2 }), 1);
        assert_eq!(*detail.received.lock(), vec![1]);
        assert_eq!(*list.received.lock(), vec![2]);

        assert!(messenger.unregister_with_token::<CustomerSaved, _>(&detail, "detail"));
        assert_eq!(messenger.send_with_token(&CustomerSaved { id: 3 }, "detail"), 0);
    }

    #[test]
    fn test_unregister() {
        let messenger = Messenger::new();
        let inbox = Arc::new(Inbox::default());
        messenger.register(&inbox, on_saved);
        messenger.register(&inbox, |inbox: &Inbox, _: &Refresh| {
            inbox.received.lock().push(0);
        });

        assert!(messenger.unregister_message::<Refresh, _>(&inbox));
        assert_eq!(messenger.send(&Refresh), 0);
        assert!(messenger.is_registered(&inbox));

        assert_eq!(messenger.unregister(&inbox), 1);
        assert!(!messenger.is_registered(&inbox));
        assert_eq!(messenger.send(&CustomerSaved { id: 1 }), 0);
    }

    #[test]
    fn test_dropped_recipient_is_not_invoked() {
        let messenger = Messenger::new();
        let inbox = Arc::new(Inbox::default());
        messenger.register(&inbox, on_saved);
        drop(inbox);

        assert_eq!(messenger.send(&CustomerSaved { id: 1 }), 0);
        assert_eq!(messenger.cleanup().listeners_removed, 1);
    }

    #[test]
    fn test_shared_reset() {
        let inbox = Arc::new(Inbox::default());
        Messenger::shared().register(&inbox, |inbox: &Inbox, _: &Refresh| {
            inbox.received.lock().push(99);
        });
        let before = Messenger::shared();
        Messenger::reset_shared();

        assert_eq!(Messenger::shared().send(&Refresh), 0);
        assert_eq!(before.send(&Refresh), 1);
    }
}
