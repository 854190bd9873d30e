// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Behavior module
//!
//! A [`Behavior`] is a named dispatch table from concrete message types to handlers, built once
//! when the behavior is registered. The actor's own default behavior comes from
//! [`Actor::receive`](crate::Actor::receive); other behaviors are pushed on top of it with
//! [`ActorContext::become_behavior`](crate::ActorContext::become_behavior).
//!
//! ```ignore
//! fn receive() -> Behavior<Self> {
//!     Behavior::new("counting")
//!         .handle::<Increment>()
//!         .handle::<Report>()
//! }
//!
//! let multiplying = Behavior::new("multiplying")
//!     .receive::<Op, _>(Multiplication)
//!     .otherwise(LogUnknown);
//! ctx.become_behavior(multiplying, false);
//! ```
//!

use crate::{
    Error,
    actor::Actor,
    handler::{
        AnyMessage, BoxedMessage, Dispatch, Handler, Message, OwnFallback,
        OwnHandler, Receive, ReceiveFallback, ReceiveHandler,
    },
};

use std::{any::TypeId, collections::HashMap, sync::Arc};

/// Named set of message handlers an actor can be switched to.
pub struct Behavior<A: Actor> {
    name: String,
    handlers: HashMap<TypeId, Arc<dyn Dispatch<A>>>,
    fallback: Option<Arc<dyn Dispatch<A>>>,
}

impl<A: Actor> Behavior<A> {
    /// Creates an empty behavior. Every message is unhandled until handlers are registered.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    /// Name of the behavior.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routes messages of type `M` to the actor's own `Handler<M>`.
    pub fn handle<M>(mut self) -> Self
    where
        M: Message,
        A: Handler<M>,
    {
        self.handlers
            .insert(TypeId::of::<M>(), Arc::new(OwnHandler::<M>::new()));
        self
    }

    /// Routes messages of type `M` to a behavior object.
    pub fn receive<M, R>(mut self, receiver: R) -> Self
    where
        M: Message,
        R: Receive<A, M>,
    {
        self.handlers.insert(
            TypeId::of::<M>(),
            Arc::new(ReceiveHandler::<R, M>::new(receiver)),
        );
        self
    }

    /// Routes every message without a more specific handler to the actor's own
    /// `Handler<BoxedMessage>`.
    pub fn handle_any(mut self) -> Self
    where
        A: Handler<BoxedMessage>,
    {
        self.fallback = Some(Arc::new(OwnFallback));
        self
    }

    /// Routes every message without a more specific handler to a behavior object.
    pub fn otherwise<R>(mut self, receiver: R) -> Self
    where
        R: Receive<A, BoxedMessage>,
    {
        self.fallback = Some(Arc::new(ReceiveFallback(receiver)));
        self
    }

    /// True when a handler, specific or catch-all, accepts `message`.
    pub fn accepts(&self, message: &dyn AnyMessage) -> bool {
        self.handlers.contains_key(&message.message_type_id())
            || self.fallback.is_some()
    }

    /// Resolves the most specific handler for `message`: the handler declared for its concrete
    /// type, then the catch-all. No match is an [`Error::Unhandled`] failure.
    pub(crate) fn resolve(
        &self,
        message: &dyn AnyMessage,
    ) -> Result<Arc<dyn Dispatch<A>>, Error> {
        self.handlers
            .get(&message.message_type_id())
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| Error::Unhandled {
                behavior: self.name.clone(),
                message: format!("{:?}", message),
            })
    }
}

impl<A: Actor> std::fmt::Debug for Behavior<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Stack of behaviors; the topmost entry is active. The bottom entry is the actor's default
/// behavior and can never be popped.
pub(crate) struct BehaviorStack<A: Actor> {
    stack: Vec<Behavior<A>>,
}

impl<A: Actor> BehaviorStack<A> {
    pub(crate) fn new(default: Behavior<A>) -> Self {
        Self {
            stack: vec![default],
        }
    }

    /// Makes `behavior` active. With `discard_old` the current top is popped first, unless it
    /// is the default behavior.
    pub(crate) fn push(&mut self, behavior: Behavior<A>, discard_old: bool) {
        if discard_old {
            self.pop();
        }
        self.stack.push(behavior);
    }

    /// Returns to the previous behavior. Returns false when only the default remains.
    pub(crate) fn pop(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    /// Drops every behavior and seeds the stack with `default` again.
    pub(crate) fn reset(&mut self, default: Behavior<A>) {
        self.stack.clear();
        self.stack.push(default);
    }

    pub(crate) fn active(&self) -> &Behavior<A> {
        // The stack is never empty.
        &self.stack[self.stack.len() - 1]
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::ActorContext;

    use async_trait::async_trait;

    #[derive(Debug, Clone)]
    struct Add(u32);

    #[derive(Debug, Clone)]
    struct Reset;

    struct Counter {
        total: u32,
    }

    #[async_trait]
    impl Actor for Counter {
        type Args = ();

        fn create(_args: &()) -> Result<Self, Error> {
            Ok(Counter { total: 0 })
        }

        fn receive() -> Behavior<Self> {
            Behavior::new("counter").handle::<Add>()
        }
    }

    #[async_trait]
    impl Handler<Add> for Counter {
        async fn handle(
            &mut self,
            msg: Add,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            self.total += msg.0;
            Ok(())
        }
    }

    struct Resetting;

    #[async_trait]
    impl Receive<Counter, Reset> for Resetting {
        async fn receive(
            &self,
            actor: &mut Counter,
            _msg: Reset,
            _ctx: &mut ActorContext<Counter>,
        ) -> Result<(), Error> {
            actor.total = 0;
            Ok(())
        }
    }

    struct Swallow;

    #[async_trait]
    impl Receive<Counter, BoxedMessage> for Swallow {
        async fn receive(
            &self,
            _actor: &mut Counter,
            _msg: BoxedMessage,
            _ctx: &mut ActorContext<Counter>,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_resolution() {
        let behavior = Counter::receive();
        assert!(behavior.resolve(&Add(1)).is_ok());
        let error = behavior.resolve(&Reset).err().unwrap();
        assert_eq!(
            error,
            Error::Unhandled {
                behavior: "counter".to_owned(),
                message: "Reset".to_owned()
            }
        );

        let behavior = Behavior::<Counter>::new("resetting")
            .receive::<Reset, _>(Resetting)
            .otherwise(Swallow);
        assert!(behavior.accepts(&Reset));
        assert!(behavior.accepts(&Add(2)));
        assert!(behavior.resolve(&"anything".to_owned()).is_ok());
    }

    #[test]
    fn test_stack_keeps_default() {
        let mut stack = BehaviorStack::new(Counter::receive());
        assert!(!stack.pop());
        assert_eq!(stack.depth(), 1);

        stack.push(Behavior::new("a"), true);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.active().name(), "a");

        stack.push(Behavior::new("b"), true);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.active().name(), "b");

        stack.push(Behavior::new("c"), false);
        assert_eq!(stack.depth(), 3);
        assert!(stack.pop());
        assert_eq!(stack.active().name(), "b");
        assert!(stack.pop());
        assert_eq!(stack.active().name(), "counter");
        assert!(!stack.pop());
        assert_eq!(stack.active().name(), "counter");

        stack.push(Behavior::new("d"), false);
        stack.reset(Counter::receive());
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.active().name(), "counter");
    }
}
