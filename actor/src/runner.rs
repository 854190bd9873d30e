// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! The runner is the task that drives one execution context. It owns the actor instance and
//! both receiving ends of the context: the mailbox of user envelopes and the channel of system
//! messages used for supervision and stopping. A single task per context is what guarantees
//! that an actor never handles two envelopes at once, while different actors run in parallel
//! on the tokio worker pool.
//!

use crate::{
    Error,
    actor::{Actor, ActorCell, ActorContext, ActorId, ActorRef},
    handler::{BoxedMessage, Envelope, MailboxReceiver, mailbox},
    path::ActorPath,
    supervision::{Directive, SupervisionScope},
    system::SystemRef,
};

use futures::FutureExt;

use tokio::{
    select,
    sync::{RwLock, mpsc, oneshot, watch},
};

use tracing::{debug, error};

use std::{
    any::Any,
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::atomic::AtomicBool,
};

tokio::task_local! {
    /// Path of the actor whose runner owns the current task.
    static RUNNING: ActorPath;
}

/// Path of the actor whose handler or hook is running on the current task, if any.
pub(crate) fn running_actor() -> Option<ActorPath> {
    RUNNING.try_with(ActorPath::clone).ok()
}

/// Supervision and lifecycle traffic between contexts. System messages are always handled
/// before user envelopes.
#[derive(Debug)]
pub(crate) enum SystemMessage {
    /// A child failed and waits for its supervisor's directive.
    Failed {
        child: ActorRef,
        error: Error,
        reply: oneshot::Sender<Directive>,
    },
    /// Run the stop sequence, then acknowledge.
    Stop { ack: Option<oneshot::Sender<()>> },
    /// Remove `child` from the children and stop it.
    StopChild {
        child: ActorRef,
        ack: Option<oneshot::Sender<()>>,
    },
    /// Restart because a sibling failed under an all-for-one strategy.
    Restart { reason: Error },
}

/// System message sender.
pub(crate) type SystemSender = mpsc::UnboundedSender<SystemMessage>;

/// System message receiver.
pub(crate) type SystemReceiver = mpsc::UnboundedReceiver<SystemMessage>;

/// Whether the runner keeps going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Per-context dispatch task.
pub(crate) struct ActorRunner<A: Actor> {
    /// The live instance. Replaced wholesale on restart.
    actor: A,
    /// Construction arguments, kept for restarts.
    args: A::Args,
    /// User envelopes.
    mailbox: MailboxReceiver,
    /// Supervision and lifecycle messages.
    system_receiver: SystemReceiver,
    /// Suspension flag of the context.
    suspension: watch::Receiver<bool>,
    /// System messages received while waiting for a directive.
    pending: VecDeque<SystemMessage>,
    /// Set once `pre_restart` ran on the live instance, which then must not see `post_stop`.
    retired: bool,
}

impl<A: Actor> ActorRunner<A> {
    /// Creates the runner of a new context together with the context handed to the actor.
    pub(crate) fn create(
        system: &SystemRef,
        id: ActorId,
        path: ActorPath,
        parent: Option<ActorId>,
        actor: A,
        args: A::Args,
        children: Vec<ActorRef>,
    ) -> (Self, ActorContext<A>) {
        debug!("Creating new actor runner for {}.", path);
        let (mailbox_sender, mailbox_receiver) = mailbox();
        let (system_sender, system_receiver) = mpsc::unbounded_channel();
        let (suspended, suspension) = watch::channel(false);

        let myself = ActorRef::new(ActorCell {
            id,
            path,
            parent,
            mailbox: mailbox_sender,
            system_sender,
            terminated: AtomicBool::new(false),
            suspended,
            children: RwLock::new(children),
            system: system.clone(),
        });
        let ctx = ActorContext::new(myself, system.clone());

        (
            Self {
                actor,
                args,
                mailbox: mailbox_receiver,
                system_receiver,
                suspension,
                pending: VecDeque::new(),
                retired: false,
            },
            ctx,
        )
    }

    /// Starts the actor and drives it until it is stopped.
    pub(crate) async fn init(self, ctx: ActorContext<A>) {
        let path = ctx.path().clone();
        RUNNING.scope(path, self.drive(ctx)).await;
    }

    async fn drive(mut self, mut ctx: ActorContext<A>) {
        let path = ctx.path().clone();
        debug!("Initializing actor {} runner.", path);

        match self.actor.pre_start(&mut ctx).await {
            Ok(()) => debug!("Actor {} is started.", path),
            Err(error) => {
                error!("Actor {} failed to start: {}", path, error);
                let error = initialization(error);
                if self.fail(&mut ctx, error, None).await == Flow::Stop {
                    debug!("Actor {} is terminated.", path);
                    return;
                }
            }
        }

        self.run(&mut ctx).await;
        debug!("Actor {} is terminated.", path);
    }

    /// Main loop. System messages take priority; envelopes are taken only while the context
    /// is not suspended.
    async fn run(&mut self, ctx: &mut ActorContext<A>) {
        debug!("Running actor {}.", ctx.path());

        loop {
            if let Some(message) = self.pending.pop_front() {
                if self.handle_system(ctx, message).await == Flow::Stop {
                    break;
                }
                continue;
            }

            let suspended = *self.suspension.borrow_and_update();
            select! {
                biased;
                message = self.system_receiver.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if self.handle_system(ctx, message).await == Flow::Stop {
                        break;
                    }
                }
                _ = self.suspension.changed(), if suspended => {}
                envelope = self.mailbox.recv(), if !suspended => {
                    let Some(envelope) = envelope else {
                        break;
                    };
                    if self.dispatch(ctx, envelope).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
    }

    /// Handles one envelope with the active behavior.
    async fn dispatch(
        &mut self,
        ctx: &mut ActorContext<A>,
        envelope: Envelope,
    ) -> Flow {
        let Envelope { message, sender } = envelope;
        ctx.set_sender(sender);

        let result = match ctx.resolve(&*message) {
            Ok(handler) => {
                let retained = message.clone();
                AssertUnwindSafe(handler.dispatch(&mut self.actor, message, ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(panicked(panic)))
                    .map_err(|error| (error, retained))
            }
            Err(error) => Err((error, message)),
        };

        ctx.set_sender(None);

        match result {
            Ok(()) => Flow::Continue,
            Err((error, message)) => {
                error!(
                    "Actor {} failed handling {:?}: {}",
                    ctx.path(),
                    message,
                    error
                );
                self.fail(ctx, error, Some(message)).await
            }
        }
    }

    async fn handle_system(
        &mut self,
        ctx: &mut ActorContext<A>,
        message: SystemMessage,
    ) -> Flow {
        match message {
            SystemMessage::Stop { ack } => {
                self.stop(ctx).await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                Flow::Stop
            }
            SystemMessage::StopChild { child, ack } => {
                if ctx.myself().remove_child(&child).await {
                    child.send_system(SystemMessage::Stop { ack });
                }
                Flow::Continue
            }
            SystemMessage::Failed {
                child,
                error,
                reply,
            } => self.supervise(ctx, child, error, reply).await,
            SystemMessage::Restart { reason } => {
                match self.restart(ctx, &reason, None).await {
                    Ok(()) => Flow::Continue,
                    Err(error) => self.fail(ctx, error, None).await,
                }
            }
        }
    }

    /// Failure protocol of this context: report to the supervisor, then apply its directive.
    /// A failure while restarting is reported again.
    async fn fail(
        &mut self,
        ctx: &mut ActorContext<A>,
        error: Error,
        message: Option<BoxedMessage>,
    ) -> Flow {
        let mut error = error;
        let mut message = message;
        loop {
            let Some(directive) = self.report(ctx, &error).await else {
                return Flow::Stop;
            };
            debug!("Actor {} received directive {:?}.", ctx.path(), directive);

            match directive {
                Directive::Resume => return Flow::Continue,
                Directive::Restart => {
                    match self.restart(ctx, &error, message.take()).await {
                        Ok(()) => return Flow::Continue,
                        Err(restart_error) => error = restart_error,
                    }
                }
                Directive::Stop | Directive::Escalate => {
                    self.stop(ctx).await;
                    return Flow::Stop;
                }
            }
        }
    }

    /// Sends the failure to the parent and waits for its directive. A stop request received
    /// meanwhile is honoured, in which case `None` is returned. Other system messages are kept
    /// for later.
    async fn report(
        &mut self,
        ctx: &mut ActorContext<A>,
        error: &Error,
    ) -> Option<Directive> {
        let Some(parent) = ctx.parent() else {
            error!(
                "Unrecoverable failure in actor {} with no supervisor: {}",
                ctx.path(),
                error
            );
            return Some(Directive::Stop);
        };

        let (reply, mut directive) = oneshot::channel();
        parent.send_system(SystemMessage::Failed {
            child: ctx.myself(),
            error: error.clone(),
            reply,
        });

        loop {
            select! {
                biased;
                message = self.system_receiver.recv() => match message {
                    Some(SystemMessage::Stop { ack }) => {
                        self.stop(ctx).await;
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                        return None;
                    }
                    Some(message) => self.pending.push_back(message),
                    None => return Some(Directive::Stop),
                },
                reply = &mut directive => {
                    return Some(reply.unwrap_or(Directive::Stop));
                }
            }
        }
    }

    /// Decides what a failed child does, using this actor's strategy.
    async fn supervise(
        &mut self,
        ctx: &mut ActorContext<A>,
        child: ActorRef,
        error: Error,
        reply: oneshot::Sender<Directive>,
    ) -> Flow {
        let myself = ctx.myself();
        if !myself.has_child(&child).await {
            debug!("Ignoring failure of former child {}.", child.path());
            return Flow::Continue;
        }

        let strategy = self.actor.supervisor_strategy();
        let directive = strategy.decide(&error);
        debug!(
            "Actor {} decided {:?} for child {}: {}",
            ctx.path(),
            directive,
            child.path(),
            error
        );

        match directive {
            Directive::Resume => {
                let _ = reply.send(Directive::Resume);
            }
            Directive::Restart => {
                if strategy.scope() == SupervisionScope::AllForOne {
                    for sibling in myself.children().await {
                        if sibling != child {
                            sibling.send_system(SystemMessage::Restart {
                                reason: error.clone(),
                            });
                        }
                    }
                }
                let _ = reply.send(Directive::Restart);
            }
            Directive::Stop => {
                myself.remove_child(&child).await;
                if strategy.scope() == SupervisionScope::AllForOne {
                    for sibling in myself.take_children().await {
                        sibling.send_system(SystemMessage::Stop { ack: None });
                    }
                }
                let _ = reply.send(Directive::Stop);
            }
            Directive::Escalate => {
                if myself.parent_id().is_none() {
                    error!(
                        "Failure of {} escalated past {}, stopping it: {}",
                        child.path(),
                        ctx.path(),
                        error
                    );
                    myself.remove_child(&child).await;
                    let _ = reply.send(Directive::Stop);
                    return Flow::Continue;
                }

                let flow = self.fail(ctx, error, None).await;
                if flow == Flow::Continue && myself.has_child(&child).await {
                    let _ = reply.send(Directive::Resume);
                }
                return flow;
            }
        }
        Flow::Continue
    }

    /// Replaces the actor instance. Path, mailbox and pending envelopes are kept.
    async fn restart(
        &mut self,
        ctx: &mut ActorContext<A>,
        reason: &Error,
        message: Option<BoxedMessage>,
    ) -> Result<(), Error> {
        debug!("Restarting actor {}.", ctx.path());
        let myself = ctx.myself();
        myself.set_suspended(true);

        if !self.retired {
            if let Err(error) =
                self.actor.pre_restart(ctx, reason, message).await
            {
                error!("Actor {} failed before restart: {}", ctx.path(), error);
            }
            self.retired = true;
        }

        let actor = match A::create(&self.args) {
            Ok(actor) => actor,
            Err(error) => {
                myself.set_suspended(false);
                return Err(initialization(error));
            }
        };
        self.actor = actor;
        self.retired = false;
        ctx.reset_behaviors();
        myself.set_suspended(false);

        self.actor
            .post_restart(ctx, reason)
            .await
            .map_err(initialization)?;
        debug!("Actor {} is restarted.", ctx.path());
        Ok(())
    }

    /// Stop sequence: children first, then the mailbox is closed and drained to dead letters,
    /// `post_stop` runs and the context leaves the system.
    async fn stop(&mut self, ctx: &mut ActorContext<A>) {
        debug!("Stopping actor {}.", ctx.path());
        let myself = ctx.myself();
        myself.set_suspended(true);
        myself.terminate();
        ctx.stop_children().await;

        self.mailbox.close();
        while let Ok(envelope) = self.mailbox.try_recv() {
            myself.dead_letter(envelope);
        }

        if self.retired {
            debug!("Actor {} already ran its stop hook.", ctx.path());
        } else if let Err(error) = self.actor.post_stop(ctx).await {
            error!("Actor {} failed to stop: {}", ctx.path(), error);
        }
        ctx.system().unregister(myself.id());
        debug!("Actor {} is stopped.", ctx.path());
    }
}

/// A panicking handler fails like one returning an error.
fn panicked(panic: Box<dyn Any + Send>) -> Error {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|reason| reason.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_owned());
    Error::Functional(format!("handler panicked: {}", reason))
}

/// Failures of `pre_start`, `create` and `post_restart` are initialization failures.
fn initialization(error: Error) -> Error {
    match error {
        Error::ActorInitialization(_) => error,
        other => Error::ActorInitialization(other.to_string()),
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{ActorSystem, Behavior, Handler, Props, SystemConfig};

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    #[derive(Debug, Clone)]
    struct Crash;

    #[derive(Debug, Clone)]
    struct Explode;

    struct Fragile {
        start: bool,
    }

    #[async_trait]
    impl Actor for Fragile {
        type Args = bool;

        fn create(start: &bool) -> Result<Self, Error> {
            Ok(Fragile { start: *start })
        }

        fn receive() -> Behavior<Self> {
            Behavior::new("fragile")
                .handle::<Crash>()
                .handle::<Explode>()
        }

        async fn pre_start(
            &mut self,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            if self.start {
                Ok(())
            } else {
                Err(Error::Functional("no start".to_owned()))
            }
        }
    }

    #[async_trait]
    impl Handler<Crash> for Fragile {
        async fn handle(
            &mut self,
            _msg: Crash,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            Err(Error::InvalidOperation("crash".to_owned()))
        }
    }

    #[async_trait]
    impl Handler<Explode> for Fragile {
        async fn handle(
            &mut self,
            _msg: Explode,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            panic!("exploded");
        }
    }

    /// Can only be built once; every rebuild fails.
    struct Phoenix {
        stops: mpsc::UnboundedSender<usize>,
        generation: usize,
    }

    #[async_trait]
    impl Actor for Phoenix {
        type Args = (Arc<AtomicUsize>, mpsc::UnboundedSender<usize>);

        fn create(args: &Self::Args) -> Result<Self, Error> {
            let generation = args.0.fetch_add(1, Ordering::SeqCst) + 1;
            if generation > 1 {
                return Err(Error::Functional("ashes".to_owned()));
            }
            Ok(Phoenix {
                stops: args.1.clone(),
                generation,
            })
        }

        fn receive() -> Behavior<Self> {
            Behavior::new("phoenix").handle::<Crash>()
        }

        async fn post_stop(
            &mut self,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            let _ = self.stops.send(self.generation);
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Crash> for Phoenix {
        async fn handle(
            &mut self,
            _msg: Crash,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            Err(Error::Functional("burn".to_owned()))
        }
    }

    #[test]
    fn test_panicked() {
        assert_eq!(
            panicked(Box::new("boom")),
            Error::Functional("handler panicked: boom".to_owned())
        );
        assert_eq!(
            panicked(Box::new("bang".to_owned())),
            Error::Functional("handler panicked: bang".to_owned())
        );
        assert_eq!(
            panicked(Box::new(3u8)),
            Error::Functional("handler panicked: unknown cause".to_owned())
        );
    }

    #[test]
    fn test_initialization_error() {
        assert_eq!(
            initialization(Error::Functional("x".to_owned())),
            Error::ActorInitialization("Error: x".to_owned())
        );
        assert_eq!(
            initialization(Error::ActorInitialization("y".to_owned())),
            Error::ActorInitialization("y".to_owned())
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_start_is_stopped() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let actor = system
            .actor_of_named(Props::<Fragile>::new(false), "test")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(actor.is_terminated());
        assert!(logs_contain("Initializing actor /user/test runner."));
        assert!(logs_contain("Actor /user/test failed to start"));
        assert!(logs_contain("Actor /user/test received directive Stop."));
        assert!(logs_contain("Actor /user/test is stopped."));
        assert!(logs_contain("Actor /user/test is terminated."));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_handler_failure_restarts() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let actor = system
            .actor_of_named(Props::<Fragile>::new(true), "test")
            .await
            .unwrap();
        actor.tell(Crash, None);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!actor.is_terminated());
        assert!(logs_contain("Actor /user/test is started."));
        assert!(logs_contain("Actor /user/test failed handling Crash"));
        assert!(logs_contain("Actor /user decided Restart for child /user/test"));
        assert!(logs_contain("Actor /user/test is restarted."));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unhandled_message_escalates_past_guardian() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let actor = system
            .actor_of_named(Props::<Fragile>::new(true), "test")
            .await
            .unwrap();
        actor.tell(42u8, None);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(actor.is_terminated());
        assert!(logs_contain("Behavior 'fragile' can not handle message 42."));
        assert!(logs_contain("Failure of /user/test escalated past /user"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_handler_panic_is_supervised() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let actor = system
            .actor_of_named(Props::<Fragile>::new(true), "test")
            .await
            .unwrap();
        actor.tell(Explode, None);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!actor.is_terminated());
        assert!(logs_contain("handler panicked: exploded"));
        assert!(logs_contain("Actor /user decided Restart for child /user/test"));
        assert!(logs_contain("Actor /user/test is restarted."));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_rebuild_stops_once() {
        let (system, _runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let (stops, mut observed) = mpsc::unbounded_channel();
        let actor = system
            .actor_of_named(
                Props::<Phoenix>::new((Arc::new(AtomicUsize::new(0)), stops)),
                "phoenix",
            )
            .await
            .unwrap();
        actor.tell(Crash, None);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(actor.is_terminated());
        assert!(logs_contain("Actor /user/phoenix already ran its stop hook."));
        assert_eq!(observed.try_recv(), Ok(1));
        assert!(observed.try_recv().is_err());
    }
}
