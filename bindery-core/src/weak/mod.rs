//! Weak-reference events and messaging
//!
//! Producers raise named events through a [`WeakEventManager`] instead of
//! holding handler lists. The manager keeps only weak references to sources
//! and listeners, so registering never extends anyone's lifetime.

mod action;
mod args;
mod event;
mod manager;
mod messenger;

pub use action::{BoundAction, ListenerId, WeakAction};
pub use args::{ErrorsChangedArgs, PropertyChangedArgs, ERRORS_CHANGED, PROPERTY_CHANGED};
pub use event::WeakEvent;
pub use manager::{
    spawn_reaper, CleanupReport, SourceKey, Subscription, SubscriptionGuard, WeakEventManager,
};
pub use messenger::Messenger;
