//! Per-registry observer list with change notification.
//!
//! # Design
//!
//! Observers are explicit, per-registry state rather than ambient dispatch:
//! a [`DockObservers`] handle is owned by the registry and cloned (shared)
//! into open transactions. Callbacks are stored as weak references; the
//! returned [`Subscription`] guard holds the strong reference, so dropping
//! the guard unsubscribes. Dead entries are pruned lazily at notify time.
//!
//! Three notification kinds exist, all synchronous and fire-and-forget:
//!
//! - `change` — registry content replaced; trigger persistence.
//! - `render` — registry content replaced; trigger redraw.
//! - `created` — a brand-new item definition was inserted inside a still
//!   open transaction. Cancelable: observers may also mutate the item's
//!   label/custom before the insertion returns.
//!
//! # Failure Modes
//!
//! - **Re-entrant notify**: subscribing from inside a callback is allowed
//!   (strong references are collected before invocation); notifying from
//!   inside a callback is not meaningful for this model and unreachable
//!   through the public API.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::node::Item;

/// Why an item came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateReason {
    #[default]
    Api,
    Dnd,
    User,
}

/// Payload for the `change` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Registry revision after the commit that fired this event.
    pub revision: u64,
}

/// Payload for the `render` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderEvent {
    /// Registry revision after the commit that fired this event.
    pub revision: u64,
}

/// Payload for the cancelable `created` notification.
///
/// `item` is a working copy; whitelisted fields mutated by observers are
/// written back into the transaction before the triggering call returns.
/// The key is identity and is never written back.
#[derive(Debug)]
pub struct ItemCreated {
    pub item: Item,
    pub reason: CreateReason,
    canceled: bool,
}

impl ItemCreated {
    pub(crate) fn new(item: Item, reason: CreateReason) -> Self {
        Self {
            item,
            reason,
            canceled: false,
        }
    }

    /// Mark the creation as canceled.
    ///
    /// The definition already exists in the working transaction; the caller
    /// is expected to treat the triggering gesture as canceled.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// True if any observer canceled the creation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

type ChangeRc = Rc<dyn Fn(&ChangeEvent)>;
type RenderRc = Rc<dyn Fn(&RenderEvent)>;
type CreatedRc = Rc<dyn Fn(&mut ItemCreated)>;

#[derive(Default)]
struct ObserverLists {
    change: Vec<Weak<dyn Fn(&ChangeEvent)>>,
    render: Vec<Weak<dyn Fn(&RenderEvent)>>,
    created: Vec<Weak<dyn Fn(&mut ItemCreated)>>,
}

/// Shared observer registry for one dock state.
///
/// Cloning shares the same inner lists, so a transaction holding a clone
/// notifies the registry's subscribers.
pub struct DockObservers {
    inner: Rc<RefCell<ObserverLists>>,
}

impl Clone for DockObservers {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for DockObservers {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObserverLists::default())),
        }
    }
}

impl std::fmt::Debug for DockObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DockObservers")
            .field("change", &inner.change.len())
            .field("render", &inner.render.len())
            .field("created", &inner.created.len())
            .finish()
    }
}

impl DockObservers {
    /// Subscribe to `change` notifications.
    pub fn on_change(&self, callback: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        let strong: ChangeRc = Rc::new(callback);
        self.inner.borrow_mut().change.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Subscribe to `render` notifications.
    pub fn on_render(&self, callback: impl Fn(&RenderEvent) + 'static) -> Subscription {
        let strong: RenderRc = Rc::new(callback);
        self.inner.borrow_mut().render.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Subscribe to `created` notifications.
    pub fn on_created(&self, callback: impl Fn(&mut ItemCreated) + 'static) -> Subscription {
        let strong: CreatedRc = Rc::new(callback);
        self.inner.borrow_mut().created.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    pub(crate) fn notify_change(&self, event: &ChangeEvent) {
        let callbacks: Vec<ChangeRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.change.retain(|weak| weak.strong_count() > 0);
            inner.change.iter().filter_map(Weak::upgrade).collect()
        };
        tracing::trace!(revision = event.revision, subscribers = callbacks.len(), "change");
        for callback in callbacks {
            callback(event);
        }
    }

    pub(crate) fn notify_render(&self, event: &RenderEvent) {
        let callbacks: Vec<RenderRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.render.retain(|weak| weak.strong_count() > 0);
            inner.render.iter().filter_map(Weak::upgrade).collect()
        };
        tracing::trace!(revision = event.revision, subscribers = callbacks.len(), "render");
        for callback in callbacks {
            callback(event);
        }
    }

    pub(crate) fn notify_created(&self, event: &mut ItemCreated) {
        let callbacks: Vec<CreatedRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.created.retain(|weak| weak.strong_count() > 0);
            inner.created.iter().filter_map(Weak::upgrade).collect()
        };
        tracing::trace!(key = %event.item.key, subscribers = callbacks.len(), "created");
        for callback in callbacks {
            callback(event);
        }
    }
}

/// RAII guard for one observer registration.
///
/// Dropping the guard releases the strong callback reference; the dead weak
/// entry is pruned on the next notification.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn change_subscribers_fire_in_registration_order() {
        let observers = DockObservers::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let log = Rc::clone(&log);
            observers.on_change(move |event| log.borrow_mut().push(("first", event.revision)))
        };
        let second = {
            let log = Rc::clone(&log);
            observers.on_change(move |event| log.borrow_mut().push(("second", event.revision)))
        };

        observers.notify_change(&ChangeEvent { revision: 7 });
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
        drop((first, second));
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let observers = DockObservers::default();
        let hits = Rc::new(Cell::new(0u32));

        let subscription = {
            let hits = Rc::clone(&hits);
            observers.on_render(move |_| hits.set(hits.get() + 1))
        };
        observers.notify_render(&RenderEvent { revision: 1 });
        drop(subscription);
        observers.notify_render(&RenderEvent { revision: 2 });

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn created_event_is_cancelable_and_mutable() {
        let observers = DockObservers::default();
        let subscription = observers.on_created(|event| {
            event.item.label = "renamed".to_string();
            event.cancel();
        });

        let mut event = ItemCreated::new(Item::new("i"), CreateReason::User);
        observers.notify_created(&mut event);
        assert!(event.is_canceled());
        assert_eq!(event.item.label, "renamed");
        drop(subscription);
    }
}
