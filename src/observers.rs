// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Subscriber registries for state change notifications.
//!
//! Every registry hands out a [Subscription] on subscribe. The handler stays registered until
//! the subscription is explicitly unsubscribed or the registry is cleared.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Handler<T> = Box<dyn FnMut(&T) + Send>;

struct Handlers<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
    /// Nesting depth of running notifications. Their handlers are out of `handlers`.
    notifying: usize,
    /// Handlers unsubscribed while they were out for a notification.
    removed: Vec<u64>,
    /// Bumped on every clear, so handlers out for a notification know not to come back.
    epoch: u64,
}

/// A set of handlers notified in subscription order.
///
/// Handlers run without the registry locked. A handler may unsubscribe itself or others,
/// subscribe new handlers or clear the registry. Handlers subscribed during a notification
/// are first called by the next one.
pub struct Observers<T> {
    inner: Arc<Mutex<Handlers<T>>>,
}

impl<T: 'static> Observers<T> {
    /// Creates an empty registry.
    pub fn new() -> Observers<T> {
        Observers {
            inner: Arc::new(Mutex::new(Handlers {
                next_id: 0,
                handlers: Vec::new(),
                notifying: 0,
                removed: Vec::new(),
                epoch: 0,
            })),
        }
    }

    /// Registers a handler. The returned subscription removes it again.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Box::new(handler)));

        let weak: Weak<Mutex<Handlers<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.lock();
                    let before = inner.handlers.len();
                    inner.handlers.retain(|(handler_id, _)| *handler_id != id);
                    if inner.handlers.len() == before && inner.notifying > 0 {
                        inner.removed.push(id);
                    }
                }
            })),
        }
    }

    /// Calls every registered handler with the value.
    pub fn notify(&self, value: &T) {
        let (mut running, epoch) = {
            let mut inner = self.inner.lock();
            inner.notifying += 1;
            (std::mem::take(&mut inner.handlers), inner.epoch)
        };

        for (id, handler) in running.iter_mut() {
            let skip = {
                let inner = self.inner.lock();
                inner.epoch != epoch || inner.removed.contains(id)
            };
            if !skip {
                handler(value);
            }
        }

        let mut inner = self.inner.lock();
        inner.notifying -= 1;
        if inner.epoch == epoch {
            let removed = &inner.removed;
            running.retain(|(id, _)| !removed.contains(id));
            running.append(&mut inner.handlers);
            inner.handlers = running;
        }
        if inner.notifying == 0 {
            inner.removed.clear();
        }
    }

    /// Removes all handlers.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.handlers.clear();
        inner.epoch += 1;
    }

    /// The number of registered handlers, not counting any out for a running notification.
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Returns true if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("handlers", &self.inner.lock().handlers.len())
            .finish()
    }
}

/// The capability to remove a previously registered handler.
///
/// Dropping a subscription without calling [Subscription::unsubscribe] leaves the handler
/// registered.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Removes the handler. Does nothing if the registry no longer exists.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
