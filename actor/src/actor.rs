// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait, the `ActorRef` handle and the `ActorContext`
//! every handler runs with. The `Actor` trait is the main trait that actors must implement: it
//! declares how an instance is built from its typed arguments, which behavior it starts with
//! and which lifecycle hooks run around it. The `ActorRef` type is the only way to reach an
//! actor; it is bound to one execution context for its whole life.
//!

use crate::{
    ActorPath, Error,
    behavior::{Behavior, BehaviorStack},
    handler::{
        AnyMessage, BoxedMessage, Dispatch, Envelope, MailboxSender, Message,
        into_boxed,
    },
    runner::{SystemMessage, SystemSender},
    selection::ActorSelection,
    supervision::{OneForOneStrategy, SupervisorStrategy},
    system::SystemRef,
};

use async_trait::async_trait;

use futures::future::join_all;

use tokio::sync::{RwLock, oneshot, watch};

use tracing::{debug, warn};

use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// The `Actor` trait is the main trait that actors must implement.
///
/// An actor is built by the runtime from its typed construction arguments, both when it is
/// first created and every time its supervisor restarts it. Messages are routed through the
/// behavior returned by [`Actor::receive`], which stays at the bottom of the behavior stack for
/// the whole life of the actor.
///
/// # Lifecycle
///
/// 1. `create` builds the instance from `Args`.
/// 2. `pre_start` runs before the first message is dispatched. A failure here is reported to
///    the supervisor as [`Error::ActorInitialization`].
/// 3. Messages are dispatched one at a time.
/// 4. On a Restart directive `pre_restart` runs on the failed instance, a new instance is
///    built with `create` and `post_restart` runs on it.
/// 5. `post_stop` runs once the actor and all its children are stopped.
///
/// # Examples
///
/// ```ignore
/// use actor::*;
/// use async_trait::async_trait;
///
/// #[derive(Debug, Clone)]
/// struct Increment(u64);
///
/// struct Counter {
///     value: u64,
/// }
///
/// #[async_trait]
/// impl Actor for Counter {
///     type Args = u64;
///
///     fn create(start: &u64) -> Result<Self, Error> {
///         Ok(Counter { value: *start })
///     }
///
///     fn receive() -> Behavior<Self> {
///         Behavior::new("counting").handle::<Increment>()
///     }
/// }
///
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
pub trait Actor: Send + Sized + 'static {
    /// Typed construction arguments, kept by the runtime to rebuild the actor on restart.
    type Args: Clone + Send + Sync + 'static;

    /// Builds a new instance. A failure here is returned to the caller of `actor_of` as
    /// [`Error::Create`], or reported to the supervisor when it happens during a restart.
    fn create(args: &Self::Args) -> Result<Self, Error>;

    /// Default behavior of the actor. It is the bottom of the behavior stack and can never be
    /// popped by [`ActorContext::unbecome`].
    fn receive() -> Behavior<Self>;

    /// Strategy used to supervise the children of this actor.
    fn supervisor_strategy(&self) -> Box<dyn SupervisorStrategy> {
        Box::new(OneForOneStrategy::default())
    }

    /// Called before the first message is dispatched.
    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the actor and its children are stopped.
    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called on the failed instance before it is replaced.
    ///
    /// # Arguments
    ///
    /// * `reason` - The failure that triggered the restart.
    /// * `message` - The message being handled when the failure happened, if any.
    ///
    /// The default implementation stops every child and then calls `post_stop`.
    async fn pre_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _reason: &Error,
        _message: Option<BoxedMessage>,
    ) -> Result<(), Error> {
        ctx.stop_children().await;
        self.post_stop(ctx).await
    }

    /// Called on the new instance once it has replaced the failed one. The default
    /// implementation calls `pre_start`.
    async fn post_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _reason: &Error,
    ) -> Result<(), Error> {
        self.pre_start(ctx).await
    }
}

/// Typed construction arguments of an actor.
pub struct Props<A: Actor> {
    args: A::Args,
}

impl<A: Actor> Props<A> {
    /// Creates the props from the arguments `A::create` is called with.
    pub fn new(args: A::Args) -> Self {
        Self { args }
    }

    /// Construction arguments.
    pub fn args(&self) -> &A::Args {
        &self.args
    }

    pub(crate) fn into_args(self) -> A::Args {
        self.args
    }
}

impl<A: Actor> Clone for Props<A> {
    fn clone(&self) -> Self {
        Self {
            args: self.args.clone(),
        }
    }
}

/// Opaque identifier of an execution context in the system arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

/// Shared state of one execution context.
pub(crate) struct ActorCell {
    pub(crate) id: ActorId,
    pub(crate) path: ActorPath,
    pub(crate) parent: Option<ActorId>,
    pub(crate) mailbox: MailboxSender,
    pub(crate) system_sender: SystemSender,
    pub(crate) terminated: AtomicBool,
    pub(crate) suspended: watch::Sender<bool>,
    pub(crate) children: RwLock<Vec<ActorRef>>,
    pub(crate) system: SystemRef,
}

/// Undeliverable message as recorded by the dead-letter actor.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The message that could not be delivered.
    pub message: BoxedMessage,
    /// Who sent it.
    pub sender: Option<ActorRef>,
    /// Address it was sent to.
    pub recipient: ActorPath,
}

/// Handle to an actor.
///
/// An `ActorRef` is bound to exactly one execution context. It stays valid across restarts
/// of the actor (same path, same mailbox) and becomes a route to dead letters once the actor
/// is stopped. Two references are equal when they point at the same context.
#[derive(Clone)]
pub struct ActorRef {
    cell: Arc<ActorCell>,
}

impl ActorRef {
    pub(crate) fn new(cell: ActorCell) -> Self {
        Self {
            cell: Arc::new(cell),
        }
    }

    /// Identifier of the execution context.
    pub fn id(&self) -> ActorId {
        self.cell.id
    }

    /// Path of the actor.
    pub fn path(&self) -> &ActorPath {
        &self.cell.path
    }

    /// Name of the actor, the last segment of its path.
    pub fn name(&self) -> &str {
        self.cell.path.name()
    }

    /// True once the actor is stopped. A terminated reference is never reused.
    pub fn is_terminated(&self) -> bool {
        self.cell.terminated.load(Ordering::SeqCst)
    }

    /// True while mailbox delivery is paused.
    pub fn is_suspended(&self) -> bool {
        *self.cell.suspended.borrow()
    }

    /// Sends a message without waiting for it to be handled.
    ///
    /// Messages from one sender are handled in the order they were told. A message told to a
    /// stopped actor is rerouted to dead letters. Handler failures are never reported back to
    /// the caller.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to send.
    /// * `sender` - Reference the receiver sees as the sender, if any.
    ///
    pub fn tell<M: Message>(&self, message: M, sender: Option<&ActorRef>) {
        self.send(Envelope::new(into_boxed(message), sender.cloned()));
    }

    /// Sends a message keeping the sender of the envelope `ctx` is dispatching.
    pub fn forward<M, A>(&self, message: M, ctx: &ActorContext<A>)
    where
        M: Message,
        A: Actor,
    {
        self.send(Envelope::new(into_boxed(message), ctx.sender()));
    }

    pub(crate) fn parent_id(&self) -> Option<ActorId> {
        self.cell.parent
    }

    pub(crate) fn send(&self, envelope: Envelope) {
        if self.is_terminated() {
            self.dead_letter(envelope);
            return;
        }
        if let Err(error) = self.cell.mailbox.send(envelope) {
            self.dead_letter(error.0);
        }
    }

    /// Reroutes an envelope this actor can no longer accept.
    pub(crate) fn dead_letter(&self, envelope: Envelope) {
        let Envelope { message, sender } = envelope;
        match self.cell.system.dead_letters() {
            Some(dead_letters)
                if dead_letters != *self && !dead_letters.is_terminated() =>
            {
                let letter = DeadLetter {
                    message,
                    sender: sender.clone(),
                    recipient: self.path().clone(),
                };
                if let Err(error) = dead_letters
                    .cell
                    .mailbox
                    .send(Envelope::new(Box::new(letter), sender))
                {
                    warn!(
                        "Dead letters are closed, dropping {:?}.",
                        error.0.message
                    );
                }
            }
            _ => warn!(
                "Dropping message {:?} sent to {}.",
                message,
                self.path()
            ),
        }
    }

    pub(crate) fn send_system(&self, message: SystemMessage) -> bool {
        self.cell.system_sender.send(message).is_ok()
    }

    /// Asks the actor to run its stop sequence. The receiver resolves once it is done, or
    /// immediately if the actor is already gone.
    pub(crate) fn request_stop(&self) -> oneshot::Receiver<()> {
        let (ack, done) = oneshot::channel();
        self.send_system(SystemMessage::Stop { ack: Some(ack) });
        done
    }

    pub(crate) fn set_suspended(&self, suspended: bool) {
        self.cell.suspended.send_replace(suspended);
    }

    pub(crate) fn terminate(&self) {
        self.cell.terminated.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the current children.
    pub(crate) async fn children(&self) -> Vec<ActorRef> {
        self.cell.children.read().await.clone()
    }

    pub(crate) fn children_lock(&self) -> &RwLock<Vec<ActorRef>> {
        &self.cell.children
    }

    pub(crate) async fn has_child(&self, child: &ActorRef) -> bool {
        self.cell.children.read().await.contains(child)
    }

    /// Removes `child` from the children of this actor. Returns false if it was not there.
    pub(crate) async fn remove_child(&self, child: &ActorRef) -> bool {
        let mut children = self.cell.children.write().await;
        match children.iter().position(|c| c == child) {
            Some(index) => {
                children.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn take_children(&self) -> Vec<ActorRef> {
        std::mem::take(&mut *self.cell.children.write().await)
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell.id.hash(state);
    }
}

impl Debug for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActorRef({})", self.cell.path)
    }
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.cell.path, f)
    }
}

/// Actor execution context providing access to system services and actor lifecycle management.
///
/// The `ActorContext` is the interface through which an actor interacts with the actor system
/// while one of its handlers or lifecycle hooks runs. It gives access to the sender of the
/// message being dispatched, to the actor's own reference and parent, and to the operations
/// that change the supervision tree: creating children, stopping actors and switching the
/// active behavior.
///
/// # Type Parameters
///
/// * `A` - The actor type that owns this context.
///
/// # Examples
///
/// ```ignore
/// #[async_trait]
/// impl Handler<Spawn> for Manager {
///     async fn handle(
///         &mut self,
///         msg: Spawn,
///         ctx: &mut ActorContext<Self>,
///     ) -> Result<(), Error> {
///         let worker = ctx
///             .actor_of_named(Props::<Worker>::new(msg.size), &msg.name)
///             .await?;
///         worker.tell(Work::Start, Some(&ctx.myself()));
///         Ok(())
///     }
/// }
/// ```
pub struct ActorContext<A: Actor> {
    /// Reference to the actor owning this context.
    myself: ActorRef,
    /// Actor system the actor lives in.
    system: SystemRef,
    /// Sender of the envelope being dispatched.
    sender: Option<ActorRef>,
    /// Behavior stack; the top is active.
    behaviors: BehaviorStack<A>,
}

impl<A: Actor> ActorContext<A> {
    pub(crate) fn new(myself: ActorRef, system: SystemRef) -> Self {
        Self {
            myself,
            system,
            sender: None,
            behaviors: BehaviorStack::new(A::receive()),
        }
    }

    /// Reference to this actor.
    pub fn myself(&self) -> ActorRef {
        self.myself.clone()
    }

    /// Sender of the message being handled. Outside of message dispatch there is no sender.
    pub fn sender(&self) -> Option<ActorRef> {
        self.sender.clone()
    }

    /// Path of this actor.
    pub fn path(&self) -> &ActorPath {
        self.myself.path()
    }

    /// Supervisor of this actor. Guardians have none.
    pub fn parent(&self) -> Option<ActorRef> {
        self.myself
            .parent_id()
            .and_then(|id| self.system.lookup(id))
    }

    /// Snapshot of the children of this actor.
    pub async fn children(&self) -> Vec<ActorRef> {
        self.myself.children().await
    }

    /// The actor system.
    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// Creates a child actor with a generated name.
    pub async fn actor_of<B: Actor>(
        &self,
        props: Props<B>,
    ) -> Result<ActorRef, Error> {
        self.system.spawn_child(&self.myself, props, None).await
    }

    /// Creates a child actor named `name`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidName`] if the name is blank or contains reserved characters.
    /// * [`Error::NameNotUnique`] if a sibling already has that name.
    /// * [`Error::Create`] if the actor could not be built.
    ///
    /// On error no context is created.
    pub async fn actor_of_named<B: Actor>(
        &self,
        props: Props<B>,
        name: &str,
    ) -> Result<ActorRef, Error> {
        self.system.spawn_child(&self.myself, props, Some(name)).await
    }

    /// Resolves `path` to an actor. Absolute paths start at the guardians, relative paths at
    /// the children of this actor. A miss resolves to dead letters.
    pub async fn actor_selection(&self, path: &str) -> ActorSelection {
        ActorSelection::resolve(&self.system, &self.myself, path).await
    }

    /// Stops an actor.
    ///
    /// - Stopping this actor asks its parent to do it once the current message is handled.
    /// - A direct child is removed from the children and stopped; the call returns once it
    ///   and its subtree are stopped.
    /// - Any other actor is stopped by its own parent, asynchronously.
    pub async fn stop(&self, target: &ActorRef) {
        if *target == self.myself {
            match self.parent() {
                Some(parent) => {
                    parent.send_system(SystemMessage::StopChild {
                        child: target.clone(),
                        ack: None,
                    });
                }
                None => warn!("Actor {} has no parent to stop it.", self.path()),
            }
            return;
        }

        if self.myself.remove_child(target).await {
            let _ = target.request_stop().await;
            return;
        }

        match target.parent_id().and_then(|id| self.system.lookup(id)) {
            Some(owner) => {
                owner.send_system(SystemMessage::StopChild {
                    child: target.clone(),
                    ack: None,
                });
            }
            None => debug!("Actor {} is already stopped.", target.path()),
        }
    }

    /// Stops every child of this actor and waits for their subtrees to stop.
    pub async fn stop_children(&self) {
        let children = self.myself.take_children().await;
        join_all(children.iter().map(ActorRef::request_stop)).await;
    }

    /// Makes `behavior` handle the next messages. With `discard_old` the current behavior is
    /// dropped first and can not be returned to, unless it is the default behavior.
    pub fn become_behavior(&mut self, behavior: Behavior<A>, discard_old: bool) {
        debug!(
            "Actor {} becomes '{}'.",
            self.myself.path(),
            behavior.name()
        );
        self.behaviors.push(behavior, discard_old);
    }

    /// Returns to the previous behavior. The default behavior is never popped; returns false
    /// when there was nothing to pop.
    pub fn unbecome(&mut self) -> bool {
        self.behaviors.pop()
    }

    /// Name of the active behavior.
    pub fn behavior(&self) -> &str {
        self.behaviors.active().name()
    }

    /// Pauses mailbox delivery of a child. System messages are still processed.
    pub async fn suspend(&self, child: &ActorRef) -> Result<(), Error> {
        self.check_child(child).await?;
        child.set_suspended(true);
        Ok(())
    }

    /// Resumes mailbox delivery of a suspended child.
    pub async fn resume(&self, child: &ActorRef) -> Result<(), Error> {
        self.check_child(child).await?;
        child.set_suspended(false);
        Ok(())
    }

    async fn check_child(&self, child: &ActorRef) -> Result<(), Error> {
        if self.myself.has_child(child).await {
            Ok(())
        } else {
            Err(Error::NotChild(child.path().clone(), self.path().clone()))
        }
    }

    pub(crate) fn set_sender(&mut self, sender: Option<ActorRef>) {
        self.sender = sender;
    }

    pub(crate) fn resolve(
        &self,
        message: &dyn AnyMessage,
    ) -> Result<Arc<dyn Dispatch<A>>, Error> {
        self.behaviors.active().resolve(message)
    }

    pub(crate) fn reset_behaviors(&mut self) {
        self.behaviors.reset(A::receive());
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{ActorSystem, Handler, SystemConfig};

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Note(&'static str);

    #[derive(Debug, Clone)]
    struct Quiet;

    struct Recorder {
        probe: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Actor for Recorder {
        type Args = mpsc::UnboundedSender<String>;

        fn create(probe: &Self::Args) -> Result<Self, Error> {
            Ok(Recorder {
                probe: probe.clone(),
            })
        }

        fn receive() -> Behavior<Self> {
            Behavior::new("loud").handle::<Note>().handle::<Quiet>()
        }
    }

    #[async_trait]
    impl Handler<Note> for Recorder {
        async fn handle(
            &mut self,
            msg: Note,
            ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            let sender = ctx
                .sender()
                .map(|s| s.path().to_string())
                .unwrap_or_default();
            let _ = self
                .probe
                .send(format!("{}:{}:{}", ctx.behavior(), msg.0, sender));
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Quiet> for Recorder {
        async fn handle(
            &mut self,
            _msg: Quiet,
            ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            ctx.become_behavior(
                Behavior::new("quiet").handle::<Note>(),
                false,
            );
            Ok(())
        }
    }

    async fn next(receiver: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reference_identity() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let (probe, _receiver) = mpsc::unbounded_channel();
        let first = system
            .actor_of_named(Props::<Recorder>::new(probe.clone()), "first")
            .await
            .unwrap();
        let second = system
            .actor_of_named(Props::<Recorder>::new(probe), "second")
            .await
            .unwrap();

        assert_eq!(first, first.clone());
        assert_ne!(first, second);
        assert_eq!(first.path().to_string(), "/user/first");
        assert_eq!(first.name(), "first");
        assert_eq!(format!("{:?}", second), "ActorRef(/user/second)");
        assert!(!first.is_terminated());
        assert!(!first.is_suspended());
    }

    #[tokio::test]
    async fn test_sender_and_behavior() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let (probe, mut receiver) = mpsc::unbounded_channel();
        let recorder = system
            .actor_of_named(Props::<Recorder>::new(probe.clone()), "recorder")
            .await
            .unwrap();
        let other = system
            .actor_of_named(Props::<Recorder>::new(probe), "other")
            .await
            .unwrap();

        recorder.tell(Note("a"), Some(&other));
        assert_eq!(next(&mut receiver).await, "loud:a:/user/other");
        recorder.tell(Note("b"), None);
        assert_eq!(next(&mut receiver).await, "loud:b:");
        recorder.tell(Quiet, None);
        recorder.tell(Note("c"), None);
        assert_eq!(next(&mut receiver).await, "quiet:c:");
    }

    #[tokio::test]
    async fn test_stop_routes_to_dead_letters() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let mut events = system.subscribe_dead_letters();
        let (probe, _receiver) = mpsc::unbounded_channel();
        let recorder = system
            .actor_of_named(Props::<Recorder>::new(probe), "gone")
            .await
            .unwrap();

        system.stop(&recorder).await;
        assert!(recorder.is_terminated());

        recorder.tell(Note("late"), None);
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.recipient, ActorPath::from("/user/gone"));
        assert!(event.message.contains("late"));
    }
}
