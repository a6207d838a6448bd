//! Weakly bound event handlers

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

type Invoker = dyn Fn(&(dyn Any + Send + Sync), &dyn Any, &dyn Any) -> bool + Send + Sync;

/// Identity of a listener: the address of its `Arc` allocation
///
/// The registry keeps a `Weak` to every listener it knows, so the allocation
/// (and therefore the address) cannot be reused while the id is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl ListenerId {
    pub fn of<L: ?Sized>(listener: &Arc<L>) -> Self {
        Self(Arc::as_ptr(listener).cast::<()>() as usize)
    }
}

/// A handler bound to a listener through a weak reference
///
/// The action never keeps its listener alive. Call [`WeakAction::bind`] to
/// get a callable [`BoundAction`]; it returns `None` once the listener is
/// gone.
#[derive(Clone)]
pub struct WeakAction {
    target: Weak<dyn Any + Send + Sync>,
    listener: ListenerId,
    handler: &'static str,
    invoke: Arc<Invoker>,
}

impl WeakAction {
    /// Bind `handler` to `listener`.
    ///
    /// The handler receives the listener, the sender and the event args. It
    /// only runs for args of type `A`; raising other arg types skips it.
    /// Capturing the listener itself inside `handler` would keep it alive.
    pub fn new<L, A, F>(listener: &Arc<L>, handler: F) -> Self
    where
        L: Any + Send + Sync,
        A: Any,
        F: Fn(&L, &dyn Any, &A) + Send + Sync + 'static,
    {
        let erased: Arc<dyn Any + Send + Sync> = listener.clone();
        let invoke = move |target: &(dyn Any + Send + Sync), sender: &dyn Any, args: &dyn Any| {
            match (target.downcast_ref::<L>(), args.downcast_ref::<A>()) {
                (Some(target), Some(args)) => {
                    handler(target, sender, args);
                    true
                }
                _ => false,
            }
        };

        Self {
            target: Arc::downgrade(&erased),
            listener: ListenerId::of(listener),
            handler: type_name::<F>(),
            invoke: Arc::new(invoke),
        }
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Type name of the bound handler, for diagnostics
    pub fn handler_name(&self) -> &'static str {
        self.handler
    }

    /// False once every strong reference to the listener is gone
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Reconstitute a callable handler, if the listener is still alive
    pub fn bind(&self) -> Option<BoundAction> {
        self.target.upgrade().map(|target| BoundAction {
            target,
            invoke: Arc::clone(&self.invoke),
        })
    }
}

#[cfg(test)]
impl WeakAction {
    pub(crate) fn with_listener_id(mut action: WeakAction, listener: ListenerId) -> Self {
        action.listener = listener;
        action
    }
}

impl fmt::Debug for WeakAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAction")
            .field("listener", &self.listener)
            .field("handler", &self.handler)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A handler holding a strong reference to its listener for one dispatch
pub struct BoundAction {
    target: Arc<dyn Any + Send + Sync>,
    invoke: Arc<Invoker>,
}

impl BoundAction {
    /// Run the handler. Returns false if `args` is not the handler's arg type.
    pub fn invoke(&self, sender: &dyn Any, args: &dyn Any) -> bool {
        (self.invoke)(&*self.target, sender, args)
    }
}
