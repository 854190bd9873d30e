// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the troupe actor runtime.
//! Re-exports the actor model: actors and their contexts, supervision, addressing and the
//! runtime services of the actor system.

pub use actor::{
    Actor, ActorContext, ActorId, ActorPath, ActorRef, ActorSelection,
    ActorSystem, AllForOneStrategy, AnyMessage, Behavior, BoxedMessage,
    Cancellable, DeadLetter, DeadLetterEvent, Decider, Directive, Envelope,
    Error as ActorError, Event, Handler, Message, OneForOneStrategy, Props,
    Receive, Scheduler, Sink, Subscriber, SupervisionScope,
    SupervisorStrategy, SystemConfig, SystemEvent, SystemRef, SystemRunner,
    default_decider,
};
