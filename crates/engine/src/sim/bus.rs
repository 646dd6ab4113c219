use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use super::scene::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type BusHandler<C, E> = Rc<RefCell<dyn FnMut(&mut C, &E)>>;

struct BusSubscription<C, E> {
    id: SubscriptionId,
    event: String,
    owner: EntityId,
    handler: BusHandler<C, E>,
}

/// Synchronous publish/subscribe registry. Generic over the mutable context
/// `C` handed to every handler and the payload type `E`.
///
/// Subscription lifetime is bound to the owning entity: destruction code is
/// expected to call [`EventBus::unsubscribe_owner`] for every destroyed id.
pub struct EventBus<C, E> {
    next_id: u64,
    subscriptions: Vec<BusSubscription<C, E>>,
}

impl<C, E> Default for EventBus<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> EventBus<C, E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            subscriptions: Vec::new(),
        }
    }

    pub fn subscribe(
        &mut self,
        event: &str,
        owner: EntityId,
        handler: impl FnMut(&mut C, &E) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.subscriptions.push(BusSubscription {
            id,
            event: event.to_string(),
            owner,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|entry| entry.id != id);
        self.subscriptions.len() != before
    }

    /// Removes every subscription belonging to `owner`; returns how many.
    pub fn unsubscribe_owner(&mut self, owner: EntityId) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|entry| entry.owner != owner);
        before - self.subscriptions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn subscription_count_for(&self, event: &str) -> usize {
        self.subscriptions
            .iter()
            .filter(|entry| entry.event == event)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Publish-time snapshot, in registration order. Dispatch iterates the
    /// snapshot, so a handler that subscribes or unsubscribes during
    /// dispatch cannot corrupt the in-progress iteration.
    pub fn handlers_for(&self, event: &str) -> Vec<BusHandler<C, E>> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| Rc::clone(&entry.handler))
            .collect()
    }
}

/// Invokes a snapshot of handlers in order against `ctx`. A handler that is
/// re-entered by a nested publish of the same event is skipped instead of
/// panicking on its `RefCell`. Returns how many handlers ran.
pub fn dispatch<C, E>(
    handlers: Vec<BusHandler<C, E>>,
    event_name: &str,
    ctx: &mut C,
    event: &E,
) -> usize {
    let mut delivered = 0usize;
    for handler in handlers {
        match handler.try_borrow_mut() {
            Ok(mut callback) => {
                (*callback)(ctx, event);
                delivered = delivered.saturating_add(1);
            }
            Err(_) => {
                warn!(event = event_name, "re_entrant_bus_handler_skipped");
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCtx {
        bus: EventBus<TestCtx, u32>,
        log: Vec<(String, u32)>,
    }

    impl TestCtx {
        fn new() -> Self {
            Self {
                bus: EventBus::new(),
                log: Vec::new(),
            }
        }

        fn publish(&mut self, event: &str, value: u32) -> usize {
            let handlers = self.bus.handlers_for(event);
            dispatch(handlers, event, self, &value)
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut ctx = TestCtx::new();
        ctx.bus.subscribe("hit", EntityId(1), |ctx: &mut TestCtx, value| {
            ctx.log.push(("first".to_string(), *value));
        });
        ctx.bus.subscribe("hit", EntityId(2), |ctx: &mut TestCtx, value| {
            ctx.log.push(("second".to_string(), *value));
        });

        let delivered = ctx.publish("hit", 7);

        assert_eq!(delivered, 2);
        assert_eq!(
            ctx.log,
            vec![("first".to_string(), 7), ("second".to_string(), 7)]
        );
    }

    #[test]
    fn publish_only_reaches_matching_event_name() {
        let mut ctx = TestCtx::new();
        ctx.bus.subscribe("hit", EntityId(1), |ctx: &mut TestCtx, value| {
            ctx.log.push(("hit".to_string(), *value));
        });
        ctx.bus.subscribe("miss", EntityId(1), |ctx: &mut TestCtx, value| {
            ctx.log.push(("miss".to_string(), *value));
        });

        assert_eq!(ctx.publish("hit", 1), 1);
        assert_eq!(ctx.log, vec![("hit".to_string(), 1)]);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_subscription() {
        let mut ctx = TestCtx::new();
        let keep = ctx
            .bus
            .subscribe("hit", EntityId(1), |_: &mut TestCtx, _| {});
        let drop = ctx
            .bus
            .subscribe("hit", EntityId(1), |_: &mut TestCtx, _| {});

        assert!(ctx.bus.unsubscribe(drop));
        assert!(!ctx.bus.unsubscribe(drop));
        assert_eq!(ctx.bus.subscription_count(), 1);
        assert!(ctx.bus.unsubscribe(keep));
    }

    #[test]
    fn unsubscribe_owner_removes_every_subscription_of_that_owner() {
        let mut ctx = TestCtx::new();
        ctx.bus.subscribe("a", EntityId(1), |_: &mut TestCtx, _| {});
        ctx.bus.subscribe("b", EntityId(1), |_: &mut TestCtx, _| {});
        ctx.bus.subscribe("a", EntityId(2), |_: &mut TestCtx, _| {});

        assert_eq!(ctx.bus.unsubscribe_owner(EntityId(1)), 2);
        assert_eq!(ctx.bus.subscription_count(), 1);
        assert_eq!(ctx.bus.subscription_count_for("a"), 1);
    }

    #[test]
    fn handler_subscribing_during_dispatch_is_not_invoked_this_publish() {
        let mut ctx = TestCtx::new();
        ctx.bus.subscribe("hit", EntityId(1), |ctx: &mut TestCtx, _| {
            ctx.log.push(("outer".to_string(), 0));
            ctx.bus.subscribe("hit", EntityId(3), |ctx: &mut TestCtx, _| {
                ctx.log.push(("late".to_string(), 0));
            });
        });

        assert_eq!(ctx.publish("hit", 0), 1);
        assert_eq!(ctx.log, vec![("outer".to_string(), 0)]);

        // The late subscription participates in the next publish.
        assert_eq!(ctx.publish("hit", 0), 2);
    }

    #[test]
    fn handler_unsubscribing_a_peer_does_not_corrupt_the_iteration() {
        let mut ctx = TestCtx::new();
        let victim = ctx.bus.subscribe("hit", EntityId(2), |ctx: &mut TestCtx, _| {
            ctx.log.push(("victim".to_string(), 0));
        });
        ctx.bus.subscribe("hit", EntityId(1), move |ctx: &mut TestCtx, _| {
            ctx.log.push(("saboteur".to_string(), 0));
            ctx.bus.unsubscribe(victim);
        });

        // Snapshot semantics: the victim was subscribed at publish time, so
        // it already ran before the saboteur removed it.
        assert_eq!(ctx.publish("hit", 0), 2);
        assert_eq!(ctx.bus.subscription_count_for("hit"), 1);

        ctx.log.clear();
        assert_eq!(ctx.publish("hit", 0), 1);
        assert_eq!(ctx.log, vec![("saboteur".to_string(), 0)]);
    }

    #[test]
    fn re_entrant_publish_skips_the_busy_handler() {
        let mut ctx = TestCtx::new();
        ctx.bus.subscribe("hit", EntityId(1), |ctx: &mut TestCtx, value| {
            ctx.log.push(("outer".to_string(), *value));
            if *value == 0 {
                // Nested publish of the same event: this handler is busy and
                // must be skipped, the sibling below still runs.
                ctx.publish("hit", 1);
            }
        });
        ctx.bus.subscribe("hit", EntityId(2), |ctx: &mut TestCtx, value| {
            ctx.log.push(("sibling".to_string(), *value));
        });

        ctx.publish("hit", 0);

        assert_eq!(
            ctx.log,
            vec![
                ("outer".to_string(), 0),
                ("sibling".to_string(), 1),
                ("sibling".to_string(), 0),
            ]
        );
    }
}
