// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Handler module
//!
//! Messages, envelopes and mailboxes, plus the two handler traits behaviors are built from.
//!
//! Any `Clone + Debug + Send + 'static` value is a [`Message`]. On the way to a mailbox it is
//! erased into a [`BoxedMessage`] and paired with its sender in an [`Envelope`]. Dispatch
//! recovers the concrete type through the dispatch table of the active
//! [`Behavior`](crate::Behavior), which calls either the actor's own [`Handler`] or a behavior
//! sub-object's [`Receive`] implementation.
//!

use crate::{
    Error,
    actor::{Actor, ActorContext, ActorRef},
};

use async_trait::async_trait;

use tokio::sync::mpsc;

use std::{
    any::{Any, TypeId},
    fmt::Debug,
    marker::PhantomData,
};

/// Values that can be sent to actors.
///
/// Implemented for every `Clone + Debug + Send + 'static` type. `Clone` lets the scheduler
/// deliver the same message repeatedly and lets dispatch keep the failing message for
/// `pre_restart`. `Debug` is what dead letters and failure logs print.
pub trait Message: Clone + Debug + Send + 'static {}

impl<T> Message for T where T: Clone + Debug + Send + 'static {}

/// Type erased message as stored in a mailbox.
pub trait AnyMessage: Debug + Send + 'static {
    /// Borrows the concrete message.
    fn as_any(&self) -> &dyn Any;

    /// Takes ownership of the concrete message.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    /// Clones the message behind the box.
    fn clone_box(&self) -> BoxedMessage;

    /// Name of the concrete type, for logs.
    fn type_name(&self) -> &'static str;

    /// Identifier of the concrete type used by dispatch tables.
    fn message_type_id(&self) -> TypeId;
}

impl<M: Message> AnyMessage for M {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn clone_box(&self) -> BoxedMessage {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn message_type_id(&self) -> TypeId {
        TypeId::of::<M>()
    }
}

/// Boxed type erased message.
pub type BoxedMessage = Box<dyn AnyMessage>;

impl Clone for BoxedMessage {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

impl dyn AnyMessage {
    /// True when the boxed message is an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.message_type_id() == TypeId::of::<M>()
    }

    /// Borrows the message as an `M`, if it is one.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

/// Recovers the concrete message from a box, handing the box back on a type mismatch.
pub fn downcast<M: Message>(message: BoxedMessage) -> Result<M, BoxedMessage> {
    if !message.is::<M>() {
        return Err(message);
    }
    match message.into_any().downcast::<M>() {
        Ok(msg) => Ok(*msg),
        Err(_) => Err(Box::new(Error::InvalidOperation(format!(
            "can not downcast to {}",
            std::any::type_name::<M>()
        )))),
    }
}

/// Erases a message. A message that is already boxed is not boxed twice, so forwarding a
/// [`BoxedMessage`] keeps its concrete type visible to dispatch.
pub fn into_boxed<M: Message>(message: M) -> BoxedMessage {
    let boxed: BoxedMessage = Box::new(message);
    downcast::<BoxedMessage>(boxed).unwrap_or_else(|boxed| boxed)
}

/// A message paired with the reference that sent it.
#[derive(Debug)]
pub struct Envelope {
    /// The message.
    pub message: BoxedMessage,
    /// The sending reference, if any.
    pub sender: Option<ActorRef>,
}

impl Envelope {
    /// Creates a new envelope.
    pub fn new(message: BoxedMessage, sender: Option<ActorRef>) -> Self {
        Self { message, sender }
    }
}

/// Mailbox receiver.
pub type MailboxReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Mailbox sender.
pub type MailboxSender = mpsc::UnboundedSender<Envelope>;

/// Mailbox.
pub type Mailbox = (MailboxSender, MailboxReceiver);

/// Mailbox factory. Mailboxes are unbounded and FIFO.
pub fn mailbox() -> Mailbox {
    mpsc::unbounded_channel()
}

/// Handles messages of type `M` with the actor's own state.
///
/// Register the implementation in the actor's default behavior with
/// [`Behavior::handle`](crate::Behavior::handle).
///
/// ```ignore
/// #[async_trait]
/// impl Handler<Increment> for Counter {
///     async fn handle(
///         &mut self,
///         msg: Increment,
///         _ctx: &mut ActorContext<Self>,
///     ) -> Result<(), Error> {
///         self.value += msg.0;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<M: Message>: Actor {
    /// Handles one message. An `Err` is a failure reported to the supervisor.
    async fn handle(
        &mut self,
        msg: M,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error>;
}

/// Handles messages of type `M` on behalf of actor `A`.
///
/// Implemented by behavior objects an actor switches to with
/// [`ActorContext::become_behavior`]. The behavior object is shared and immutable; all
/// mutable state lives in the actor it receives.
#[async_trait]
pub trait Receive<A: Actor, M: Message>: Send + Sync + 'static {
    /// Handles one message. An `Err` is a failure reported to the supervisor.
    async fn receive(
        &self,
        actor: &mut A,
        msg: M,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error>;
}

/// Erased entry of a dispatch table.
#[async_trait]
pub(crate) trait Dispatch<A: Actor>: Send + Sync {
    async fn dispatch(
        &self,
        actor: &mut A,
        msg: BoxedMessage,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error>;
}

/// Entry calling the actor's own `Handler<M>`.
pub(crate) struct OwnHandler<M>(PhantomData<fn() -> M>);

impl<M> OwnHandler<M> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<A, M> Dispatch<A> for OwnHandler<M>
where
    A: Handler<M>,
    M: Message,
{
    async fn dispatch(
        &self,
        actor: &mut A,
        msg: BoxedMessage,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error> {
        let msg = downcast::<M>(msg).map_err(|msg| mismatch::<M>(&msg))?;
        actor.handle(msg, ctx).await
    }
}

/// Entry calling the actor's own catch-all `Handler<BoxedMessage>`.
pub(crate) struct OwnFallback;

#[async_trait]
impl<A> Dispatch<A> for OwnFallback
where
    A: Handler<BoxedMessage>,
{
    async fn dispatch(
        &self,
        actor: &mut A,
        msg: BoxedMessage,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error> {
        actor.handle(msg, ctx).await
    }
}

/// Entry calling a behavior object's `Receive<A, M>`.
pub(crate) struct ReceiveHandler<R, M> {
    receiver: R,
    _message: PhantomData<fn() -> M>,
}

impl<R, M> ReceiveHandler<R, M> {
    pub(crate) fn new(receiver: R) -> Self {
        Self {
            receiver,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<A, M, R> Dispatch<A> for ReceiveHandler<R, M>
where
    A: Actor,
    M: Message,
    R: Receive<A, M>,
{
    async fn dispatch(
        &self,
        actor: &mut A,
        msg: BoxedMessage,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error> {
        let msg = downcast::<M>(msg).map_err(|msg| mismatch::<M>(&msg))?;
        self.receiver.receive(actor, msg, ctx).await
    }
}

/// Entry calling a behavior object's catch-all `Receive<A, BoxedMessage>`.
pub(crate) struct ReceiveFallback<R>(pub(crate) R);

#[async_trait]
impl<A, R> Dispatch<A> for ReceiveFallback<R>
where
    A: Actor,
    R: Receive<A, BoxedMessage>,
{
    async fn dispatch(
        &self,
        actor: &mut A,
        msg: BoxedMessage,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error> {
        self.0.receive(actor, msg, ctx).await
    }
}

fn mismatch<M>(msg: &BoxedMessage) -> Error {
    Error::InvalidOperation(format!(
        "expected {} but got {}",
        std::any::type_name::<M>(),
        AnyMessage::type_name(&**msg)
    ))
}
