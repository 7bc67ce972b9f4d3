//! In-process publish/subscribe dispatcher.
//!
//! Handlers are registered under a string event name and invoked
//! synchronously, in registration order, by [`EventBus::publish`].
//!
//! # Dispatch rules
//!
//! - A handler registered while an event is being dispatched is not invoked
//!   for that dispatch.  The handler list is snapshotted before dispatch.
//! - A handler removed while an event is being dispatched is not invoked
//!   after its removal.  Each snapshot entry is re-checked before the call.
//! - A `publish` issued from inside a handler is queued and dispatched after
//!   the current dispatch finishes, in FIFO order.  No handler is ever
//!   re-entered by the bus.
//!
//! # Ownership tags (for beginners)
//!
//! A component that subscribes to several events can tag each subscription
//! with its own [`OwnerTag`].  On teardown it calls
//! [`EventBus::unsubscribe_all`] with that tag and every tagged subscription
//! is removed, without the component having to remember each token.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

/// A registered event handler.
type Handler<E> = Arc<Mutex<dyn FnMut(&E) + Send>>;

/// Opaque handle returned by every subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

/// Identifies the component that owns a group of subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerTag(Uuid);

impl OwnerTag {
    /// Mints a fresh, globally unique owner tag.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerTag {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscription<E> {
    token: SubscriptionToken,
    owner: Option<OwnerTag>,
    handler: Handler<E>,
}

struct Registry<E> {
    next_token: u64,
    by_name: HashMap<String, Vec<Subscription<E>>>,
    name_by_token: HashMap<SubscriptionToken, String>,
    tokens_by_owner: HashMap<OwnerTag, Vec<SubscriptionToken>>,
    last_payload: HashMap<String, E>,
    pending: VecDeque<(String, E)>,
    dispatching: bool,
}

impl<E> Registry<E> {
    fn new() -> Self {
        Self {
            next_token: 0,
            by_name: HashMap::new(),
            name_by_token: HashMap::new(),
            tokens_by_owner: HashMap::new(),
            last_payload: HashMap::new(),
            pending: VecDeque::new(),
            dispatching: false,
        }
    }

    fn register(&mut self, owner: Option<OwnerTag>, name: &str, handler: Handler<E>) -> SubscriptionToken {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.by_name
            .entry(name.to_string())
            .or_default()
            .push(Subscription { token, owner, handler });
        self.name_by_token.insert(token, name.to_string());
        if let Some(owner) = owner {
            self.tokens_by_owner.entry(owner).or_default().push(token);
        }
        token
    }

    fn remove(&mut self, token: SubscriptionToken) -> bool {
        let Some(name) = self.name_by_token.remove(&token) else {
            return false;
        };
        let mut owner = None;
        if let Some(subs) = self.by_name.get_mut(&name) {
            if let Some(pos) = subs.iter().position(|s| s.token == token) {
                owner = subs.remove(pos).owner;
            }
            if subs.is_empty() {
                self.by_name.remove(&name);
            }
        }
        if let Some(owner) = owner {
            if let Some(tokens) = self.tokens_by_owner.get_mut(&owner) {
                tokens.retain(|t| *t != token);
                if tokens.is_empty() {
                    self.tokens_by_owner.remove(&owner);
                }
            }
        }
        true
    }
}

/// Clears the dispatching flag even if a handler panics.
struct DispatchGuard<'a, E> {
    registry: &'a Mutex<Registry<E>>,
}

impl<E> Drop for DispatchGuard<'_, E> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatching = false;
    }
}

/// A cheap-to-clone handle to a shared publish/subscribe registry.
///
/// Clones share the same registry, so a component can hold its own handle by
/// composition and publish or subscribe without borrowing from anyone.
pub struct EventBus<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    /// Registers `handler` for events published under `name`.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> SubscriptionToken
    where
        F: FnMut(&E) + Send + 'static,
    {
        let handler: Handler<E> = Arc::new(Mutex::new(handler));
        self.lock().register(None, name, handler)
    }

    /// Registers `handler` for `name` and tags the subscription with `owner`.
    pub fn subscribe_as<F>(&self, owner: OwnerTag, name: &str, handler: F) -> SubscriptionToken
    where
        F: FnMut(&E) + Send + 'static,
    {
        let handler: Handler<E> = Arc::new(Mutex::new(handler));
        self.lock().register(Some(owner), name, handler)
    }

    /// Registers `handler` for `name`, first replaying the most recent payload
    /// published under `name` if there has been one.
    pub fn subscribe_always<F>(
        &self,
        owner: Option<OwnerTag>,
        name: &str,
        mut handler: F,
    ) -> SubscriptionToken
    where
        F: FnMut(&E) + Send + 'static,
    {
        let last = self.lock().last_payload.get(name).cloned();
        if let Some(payload) = last {
            handler(&payload);
        }
        let handler: Handler<E> = Arc::new(Mutex::new(handler));
        self.lock().register(owner, name, handler)
    }

    /// Removes one subscription.  Returns `false` if the token was unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.lock().remove(token)
    }

    /// Removes every subscription tagged with `owner` and returns how many
    /// were removed.
    pub fn unsubscribe_all(&self, owner: OwnerTag) -> usize {
        let mut registry = self.lock();
        let tokens = registry.tokens_by_owner.remove(&owner).unwrap_or_default();
        tokens
            .into_iter()
            .filter(|token| registry.remove(*token))
            .count()
    }

    /// Invokes every handler registered for `name` with `data`.
    ///
    /// Publishing to a name with no subscribers is a no-op.  When called from
    /// inside a handler the event is queued behind the current dispatch.
    pub fn publish(&self, name: &str, data: E) {
        {
            let mut registry = self.lock();
            registry.last_payload.insert(name.to_string(), data.clone());
            registry.pending.push_back((name.to_string(), data));
            if registry.dispatching {
                return;
            }
            registry.dispatching = true;
        }

        let _guard = DispatchGuard {
            registry: &self.registry,
        };
        loop {
            let next = self.lock().pending.pop_front();
            let Some((name, data)) = next else {
                break;
            };
            self.dispatch(&name, &data);
        }
    }

    /// Returns `true` if at least one handler is registered for `name`.
    pub fn has_subscribers(&self, name: &str) -> bool {
        self.subscriber_count(name) > 0
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.lock().by_name.get(name).map_or(0, Vec::len)
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn dispatch(&self, name: &str, data: &E) {
        let snapshot: Vec<(SubscriptionToken, Handler<E>)> = self
            .lock()
            .by_name
            .get(name)
            .map(|subs| {
                subs.iter()
                    .map(|s| (s.token, Arc::clone(&s.handler)))
                    .collect()
            })
            .unwrap_or_default();

        for (token, handler) in snapshot {
            if !self.lock().name_by_token.contains_key(&token) {
                continue;
            }
            let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *handler)(data);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
