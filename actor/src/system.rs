// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type. The `ActorSystem` is responsible for
//! creating the root of the supervision tree and the runtime services shared by every actor:
//!
//! - the user guardian `/user`, parent of every actor created through [`SystemRef`];
//! - the system guardian `/sys`, parent of the runtime's own actors;
//! - the dead-letter actor `/sys/deadLetters`, which records undeliverable messages and
//!   publishes them as [`DeadLetterEvent`]s;
//! - the [`Scheduler`].
//!
//! Every execution context is registered in an arena keyed by [`ActorId`]. Parent links are
//! lookups into that arena, and a context leaves it when it terminates.
//!

use crate::{
    Actor, ActorContext, ActorPath, ActorRef, Behavior, Error, Handler, Props,
    actor::{ActorId, DeadLetter},
    handler::BoxedMessage,
    path::{
        DEAD_LETTERS_SEGMENT, SYSTEM_SEGMENT, USER_SEGMENT, generate_name,
        init_name_counter, validate_name,
    },
    runner::{ActorRunner, running_actor},
    scheduler::Scheduler,
    selection::ActorSelection,
    sink::{Event, Sink},
};

use async_trait::async_trait;

use serde::{Deserialize, Serialize};

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use tracing::debug;

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Actor system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Name of the system, used in logs.
    pub name: String,
    /// Number of dead-letter events buffered for slow subscribers.
    pub dead_letter_capacity: usize,
}

impl SystemConfig {
    /// Default configuration with a custom name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            dead_letter_capacity: 1024,
        }
    }
}

/// Actor system.
///
pub struct ActorSystem {}

impl ActorSystem {
    /// Creates a new actor system and starts its guardians.
    ///
    /// Cancelling `token` shuts the system down, as does [`SystemRef::shutdown`].
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    ///
    pub fn create(
        config: SystemConfig,
        token: CancellationToken,
    ) -> (SystemRef, SystemRunner) {
        init_name_counter();
        let (event_sender, event_receiver) = mpsc::channel(4);
        let system = SystemRef::new(&config, event_sender, token.child_token());
        system.start_guardians();

        let listener = system.clone();
        tokio::spawn(async move {
            listener.token.cancelled().await;
            listener.shutdown().await;
        });

        debug!("Actor system '{}' is created.", config.name);
        (system, SystemRunner::new(event_receiver))
    }
}

/// System event.
///
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// The actor system is stopped.
    StopSystem,
}

/// A message that could not be delivered, as published to dead-letter subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    /// Debug rendering of the message.
    pub message: String,
    /// Path of the sender, if there was one.
    pub sender: Option<ActorPath>,
    /// Path the message was sent to.
    pub recipient: ActorPath,
}

impl Event for DeadLetterEvent {}

#[derive(Default)]
struct Guardians {
    user: Option<ActorRef>,
    system: Option<ActorRef>,
    dead_letters: Option<ActorRef>,
}

/// System reference.
///
/// Cheap to clone; every clone addresses the same system.
#[derive(Clone)]
pub struct SystemRef {
    /// Name of the system.
    name: Arc<str>,
    /// Creation instant.
    started: Instant,
    /// Arena of live execution contexts.
    actors: Arc<RwLock<HashMap<ActorId, ActorRef>>>,
    /// Guardians and dead letters, cleared on shutdown.
    guardians: Arc<RwLock<Guardians>>,
    /// Next context identifier.
    next_id: Arc<AtomicU64>,
    /// Dead-letter event channel.
    dead_letter_events: broadcast::Sender<DeadLetterEvent>,
    /// Timer service.
    scheduler: Scheduler,
    /// Notifies the system runner.
    event_sender: mpsc::Sender<SystemEvent>,
    /// Set once shutdown starts.
    stopped: Arc<AtomicBool>,
    token: CancellationToken,
}

impl SystemRef {
    fn new(
        config: &SystemConfig,
        event_sender: mpsc::Sender<SystemEvent>,
        token: CancellationToken,
    ) -> Self {
        let (dead_letter_events, _) =
            broadcast::channel(config.dead_letter_capacity.max(1));
        SystemRef {
            name: Arc::from(config.name.as_str()),
            started: Instant::now(),
            actors: Arc::new(RwLock::new(HashMap::new())),
            guardians: Arc::new(RwLock::new(Guardians::default())),
            next_id: Arc::new(AtomicU64::new(0)),
            dead_letter_events,
            scheduler: Scheduler::new(token.child_token()),
            event_sender,
            stopped: Arc::new(AtomicBool::new(false)),
            token,
        }
    }

    fn start_guardians(&self) {
        let root = ActorPath::root_path();
        let system_path = root.with_name(SYSTEM_SEGMENT);
        let system_id = self.next_id();

        let dead_letters = self.launch(
            self.next_id(),
            system_path.with_name(DEAD_LETTERS_SEGMENT),
            Some(system_id),
            DeadLetters {
                events: self.dead_letter_events.clone(),
            },
            self.dead_letter_events.clone(),
            Vec::new(),
        );
        let system = self.launch(
            system_id,
            system_path,
            None,
            Guardian,
            (),
            vec![dead_letters.clone()],
        );
        let user = self.launch(
            self.next_id(),
            root.with_name(USER_SEGMENT),
            None,
            Guardian,
            (),
            Vec::new(),
        );

        if let Ok(mut guardians) = self.guardians.write() {
            *guardians = Guardians {
                user: Some(user),
                system: Some(system),
                dead_letters: Some(dead_letters),
            };
        }
    }

    /// Name of the system.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time elapsed since the system was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once shutdown has started.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Creates a top-level actor with a generated name under `/user`.
    pub async fn actor_of<A: Actor>(
        &self,
        props: Props<A>,
    ) -> Result<ActorRef, Error> {
        let user = self.user_guardian().ok_or(Error::SystemStopped)?;
        self.spawn_child(&user, props, None).await
    }

    /// Creates a top-level actor named `name` under `/user`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidName`] or [`Error::NameNotUnique`] for a rejected name.
    /// * [`Error::Create`] if the actor could not be built.
    /// * [`Error::SystemStopped`] once the system is shut down.
    pub async fn actor_of_named<A: Actor>(
        &self,
        props: Props<A>,
        name: &str,
    ) -> Result<ActorRef, Error> {
        let user = self.user_guardian().ok_or(Error::SystemStopped)?;
        self.spawn_child(&user, props, Some(name)).await
    }

    /// Resolves `path`. Relative paths are resolved under `/user`.
    pub async fn actor_selection(&self, path: &str) -> ActorSelection {
        match self.user_guardian() {
            Some(user) => ActorSelection::resolve(self, &user, path).await,
            None => ActorSelection::default(),
        }
    }

    /// Stops `target` and its subtree, returning once they are stopped.
    ///
    /// The target leaves its parent's children at once. Called from a handler of the target
    /// or of one of its descendants, the stop is only requested: it runs once that handler
    /// returns.
    pub async fn stop(&self, target: &ActorRef) {
        if target.is_terminated() {
            return;
        }
        if let Some(owner) = target.parent_id().and_then(|id| self.lookup(id)) {
            if !owner.remove_child(target).await {
                debug!("Actor {} is already being stopped.", target.path());
                return;
            }
        }

        let done = target.request_stop();
        if within(target.path()) {
            debug!(
                "Stop of {} requested from inside its subtree.",
                target.path()
            );
            return;
        }
        let _ = done.await;
    }

    /// Stops the user guardian subtree, then the system guardian subtree, and notifies the
    /// system runner. Calling it again has no effect.
    ///
    /// Called from an actor, the shutdown runs on its own task and this returns at once.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if running_actor().is_some() {
            let system = self.clone();
            tokio::spawn(async move { system.stop_all().await });
            return;
        }
        self.stop_all().await;
    }

    async fn stop_all(&self) {
        debug!("Stopping actor system '{}'...", self.name);
        self.scheduler.cancel_all();

        let (user, system) = self
            .guardians
            .read()
            .map(|guardians| (guardians.user.clone(), guardians.system.clone()))
            .unwrap_or_default();
        if let Some(user) = user {
            let _ = user.request_stop().await;
        }
        if let Some(system) = system {
            let _ = system.request_stop().await;
        }

        if let Ok(mut guardians) = self.guardians.write() {
            *guardians = Guardians::default();
        }
        if let Ok(mut actors) = self.actors.write() {
            actors.clear();
        }
        self.token.cancel();
        let _ = self.event_sender.send(SystemEvent::StopSystem).await;
    }

    /// The user guardian, `/user`.
    pub fn user_guardian(&self) -> Option<ActorRef> {
        self.guardians
            .read()
            .ok()
            .and_then(|guardians| guardians.user.clone())
    }

    /// The system guardian, `/sys`.
    pub fn system_guardian(&self) -> Option<ActorRef> {
        self.guardians
            .read()
            .ok()
            .and_then(|guardians| guardians.system.clone())
    }

    /// The dead-letter actor, `/sys/deadLetters`.
    pub fn dead_letters(&self) -> Option<ActorRef> {
        self.guardians
            .read()
            .ok()
            .and_then(|guardians| guardians.dead_letters.clone())
    }

    /// Subscribes to the dead letters recorded from now on.
    pub fn subscribe_dead_letters(&self) -> broadcast::Receiver<DeadLetterEvent> {
        self.dead_letter_events.subscribe()
    }

    /// Timer service of this system.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run a sink. The sink will be run in a separate task.
    ///
    pub async fn run_sink<E>(&self, mut sink: Sink<E>)
    where
        E: Event,
    {
        tokio::spawn(async move {
            sink.run().await;
        });
    }

    /// Live context with identifier `id`.
    pub(crate) fn lookup(&self, id: ActorId) -> Option<ActorRef> {
        self.actors
            .read()
            .ok()
            .and_then(|actors| actors.get(&id).cloned())
    }

    pub(crate) fn unregister(&self, id: ActorId) {
        if let Ok(mut actors) = self.actors.write() {
            actors.remove(&id);
        }
    }

    fn next_id(&self) -> ActorId {
        ActorId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Creates a child of `parent`. The name is validated and reserved under the children
    /// lock of the parent, so on any error no context is created.
    pub(crate) async fn spawn_child<A: Actor>(
        &self,
        parent: &ActorRef,
        props: Props<A>,
        name: Option<&str>,
    ) -> Result<ActorRef, Error> {
        let name = match name {
            Some(name) => validate_name(name)?,
            None => generate_name(),
        };

        let mut children = parent.children_lock().write().await;
        if parent.is_terminated() {
            return Err(Error::Create(format!(
                "the parent {} is stopped",
                parent.path()
            )));
        }
        if children.iter().any(|child| child.name() == name) {
            return Err(Error::NameNotUnique(name, parent.path().clone()));
        }

        let args = props.into_args();
        let actor = A::create(&args).map_err(creation)?;
        let child = self.launch(
            self.next_id(),
            parent.path().with_name(&name),
            Some(parent.id()),
            actor,
            args,
            Vec::new(),
        );
        children.push(child.clone());
        Ok(child)
    }

    /// Builds the context of `actor`, registers it and spawns its runner.
    fn launch<A: Actor>(
        &self,
        id: ActorId,
        path: ActorPath,
        parent: Option<ActorId>,
        actor: A,
        args: A::Args,
        children: Vec<ActorRef>,
    ) -> ActorRef {
        let (runner, ctx) =
            ActorRunner::create(self, id, path, parent, actor, args, children);
        let actor = ctx.myself();
        if let Ok(mut actors) = self.actors.write() {
            actors.insert(id, actor.clone());
        }
        tokio::spawn(runner.init(ctx));
        actor
    }
}

/// True when the current task runs `path` or one of its descendants.
fn within(path: &ActorPath) -> bool {
    running_actor().is_some_and(|running| {
        running == *path || path.is_ancestor_of(&running)
    })
}

fn creation(error: Error) -> Error {
    if error.is_configuration() {
        error
    } else {
        Error::Create(error.to_string())
    }
}

/// System runner.
pub struct SystemRunner {
    /// The event receiver.
    event_receiver: mpsc::Receiver<SystemEvent>,
}

impl SystemRunner {
    pub(crate) fn new(event_receiver: mpsc::Receiver<SystemEvent>) -> Self {
        Self { event_receiver }
    }

    /// Runs until the actor system is stopped.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        while let Some(event) = self.event_receiver.recv().await {
            match event {
                SystemEvent::StopSystem => {
                    debug!("Actor system stopped.");
                    break;
                }
            }
        }
    }
}

/// Top of the `/user` and `/sys` subtrees.
struct Guardian;

#[async_trait]
impl Actor for Guardian {
    type Args = ();

    fn create(_args: &()) -> Result<Self, Error> {
        Ok(Guardian)
    }

    fn receive() -> Behavior<Self> {
        Behavior::new("guardian").handle_any()
    }
}

#[async_trait]
impl Handler<BoxedMessage> for Guardian {
    async fn handle(
        &mut self,
        msg: BoxedMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        debug!(
            "Guardian {} received {:?} from {:?}.",
            ctx.path(),
            msg,
            ctx.sender()
        );
        Ok(())
    }
}

/// Records undeliverable messages.
struct DeadLetters {
    events: broadcast::Sender<DeadLetterEvent>,
}

impl DeadLetters {
    fn record(&self, event: DeadLetterEvent) {
        debug!(
            "Dead letter to {} from {:?}: {}",
            event.recipient, event.sender, event.message
        );
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Actor for DeadLetters {
    type Args = broadcast::Sender<DeadLetterEvent>;

    fn create(events: &Self::Args) -> Result<Self, Error> {
        Ok(DeadLetters {
            events: events.clone(),
        })
    }

    fn receive() -> Behavior<Self> {
        Behavior::new("deadLetters")
            .handle::<DeadLetter>()
            .handle_any()
    }
}

#[async_trait]
impl Handler<DeadLetter> for DeadLetters {
    async fn handle(
        &mut self,
        msg: DeadLetter,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.record(DeadLetterEvent {
            message: format!("{:?}", msg.message),
            sender: msg.sender.map(|sender| sender.path().clone()),
            recipient: msg.recipient,
        });
        Ok(())
    }
}

#[async_trait]
impl Handler<BoxedMessage> for DeadLetters {
    async fn handle(
        &mut self,
        msg: BoxedMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.record(DeadLetterEvent {
            message: format!("{:?}", msg),
            sender: ctx.sender().map(|sender| sender.path().clone()),
            recipient: ctx.path().clone(),
        });
        Ok(())
    }
}
