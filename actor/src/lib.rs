// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! A lightweight actor-model runtime on top of tokio. Actors are isolated units of state that
//! communicate exclusively through asynchronous messages, organized into a supervision tree
//! that contains and recovers from failures.
//!
//! ## Overview
//!
//! In response to a message, an actor can:
//! - Update its private state
//! - Create child actors it supervises
//! - Send messages to any actor it holds a reference to
//! - Switch the behavior that handles its next messages
//! - Fail, leaving the decision of what happens next to its supervisor
//!
//! ## Core Architecture
//!
//! ### Execution contexts
//!
//! Every actor is backed by an execution context: a mailbox, a behavior stack, a list of
//! children and a lifecycle state. One tokio task drives each context, so an actor handles
//! exactly one envelope at a time while different actors run in parallel on the worker pool.
//! Mailboxes are unbounded and FIFO.
//!
//! ### Addressing
//!
//! Actors are addressed by [`ActorRef`]s and named by hierarchical [`ActorPath`]s:
//!
//! - `/user/...` holds every actor created by the application;
//! - `/sys/...` holds the runtime's own actors, such as `/sys/deadLetters`;
//! - names of anonymous actors are generated and start with `$`.
//!
//! An [`ActorSelection`] resolves a path string to a reference. A path that does not match any
//! actor resolves to dead letters, as does any message told to a stopped actor.
//!
//! ### Supervision
//!
//! A failing handler never reports its error to the sender of the message. The failure is
//! sent to the actor's parent, whose [`SupervisorStrategy`] picks a [`Directive`]:
//!
//! - **Resume**: keep the instance and continue with the next message;
//! - **Restart**: replace the instance with a fresh one, keeping path and mailbox;
//! - **Stop**: stop the actor and its subtree;
//! - **Escalate**: the parent fails with the same error and asks its own parent.
//!
//! An escalation that reaches a guardian stops the failing top-level actor.
//!
//! ## Getting Started
//!
//! ```ignore
//! use actor::{
//!     Actor, ActorContext, ActorSystem, Behavior, Error, Handler, Props,
//!     SystemConfig,
//! };
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone)]
//! struct Increment(u64);
//!
//! struct Counter {
//!     value: u64,
//! }
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     type Args = ();
//!
//!     fn create(_args: &()) -> Result<Self, Error> {
//!         Ok(Counter { value: 0 })
//!     }
//!
//!     fn receive() -> Behavior<Self> {
//!         Behavior::new("counting").handle::<Increment>()
//!     }
//! }
//!
//! #[async_trait]
//! impl Handler<Increment> for Counter {
//!     async fn handle(
//!         &mut self,
//!         msg: Increment,
//!         _ctx: &mut ActorContext<Self>,
//!     ) -> Result<(), Error> {
//!         self.value += msg.0;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let token = CancellationToken::new();
//!     let (system, mut runner) =
//!         ActorSystem::create(SystemConfig::new("example"), token.clone());
//!     let running = tokio::spawn(async move { runner.run().await });
//!
//!     let counter = system
//!         .actor_of_named(Props::<Counter>::new(()), "counter")
//!         .await?;
//!     counter.tell(Increment(5), None);
//!
//!     token.cancel();
//!     let _ = running.await;
//!     Ok(())
//! }
//! ```
//!
//! ## API Organization
//!
//! - **Actors**: [`Actor`], [`Props`], [`ActorContext`], [`ActorRef`]
//! - **Messages**: [`Message`], [`Handler`], [`Receive`], [`Behavior`], [`Envelope`]
//! - **Supervision**: [`SupervisorStrategy`], [`OneForOneStrategy`], [`AllForOneStrategy`],
//!   [`Directive`]
//! - **System**: [`ActorSystem`], [`SystemConfig`], [`SystemRef`], [`SystemRunner`]
//! - **Addressing**: [`ActorPath`], [`ActorSelection`]
//! - **Services**: [`Scheduler`], [`Cancellable`], dead letters through [`Sink`] and
//!   [`Subscriber`]
//!

mod actor;
mod behavior;
mod error;
mod handler;
mod path;
mod runner;
mod scheduler;
mod selection;
mod sink;
mod supervision;
mod system;

pub use actor::{
    Actor, ActorContext, ActorId, ActorRef, DeadLetter, Props,
};

pub use behavior::Behavior;

pub use error::Error;

pub use handler::{
    AnyMessage, BoxedMessage, Envelope, Handler, Message, Receive, downcast,
    into_boxed,
};

pub use path::{ActorPath, generate_name, validate_name};

pub use scheduler::{Cancellable, MIN_INTERVAL, Scheduler};

pub use selection::ActorSelection;

pub use sink::{Event, Sink, Subscriber};

pub use supervision::{
    AllForOneStrategy, Decider, Directive, OneForOneStrategy,
    SupervisionScope, SupervisorStrategy, default_decider,
};

pub use system::{
    ActorSystem, DeadLetterEvent, SystemConfig, SystemEvent, SystemRef,
    SystemRunner,
};
