// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! A single error type covers the whole runtime. Variants fall into three families:
//!
//! - **Configuration failures** (`InvalidName`, `NameNotUnique`, `NotChild`, `Scheduler`,
//!   `Create`) are returned synchronously to the caller of the mutating operation and are never
//!   routed through supervision.
//! - **Failure kinds** (`ActorInitialization`, `ActorKilled`, `InvalidOperation`,
//!   `NotSupported`, `Functional`, `Unhandled`, `Unrecoverable`) are what handlers and lifecycle
//!   hooks return. They are consumed by the supervisor of the failing actor, never by the sender
//!   of the message that triggered them.
//! - **Runtime state** (`SystemStopped`), returned once the actor system is shut down.
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The proposed actor name is blank or contains reserved characters.
    #[error("Invalid actor name '{0}': {1}.")]
    InvalidName(String, String),
    /// A sibling with the same name already exists.
    #[error("The actor name '{0}' is not unique under {1}.")]
    NameNotUnique(String, ActorPath),
    /// The target is not a child of the calling context.
    #[error("Actor {0} is not a child of {1}.")]
    NotChild(ActorPath, ActorPath),
    /// Invalid arguments were given to the scheduler.
    #[error("Invalid schedule: {0}.")]
    Scheduler(String),
    /// The actor factory could not build an instance.
    #[error("An error occurred while creating an actor: {0}.")]
    Create(String),
    /// The actor failed while starting or restarting.
    #[error("Actor initialization failed: {0}.")]
    ActorInitialization(String),
    /// The actor was explicitly killed.
    #[error("Actor killed.")]
    ActorKilled,
    /// The actor attempted an operation that is invalid in its current state.
    #[error("Invalid operation: {0}.")]
    InvalidOperation(String),
    /// The actor attempted an operation it does not support.
    #[error("Operation not supported: {0}.")]
    NotSupported(String),
    /// The active behavior declares no handler for the message.
    #[error("Behavior '{behavior}' can not handle message {message}.")]
    Unhandled {
        /// Name of the active behavior.
        behavior: String,
        /// Debug rendering of the message.
        message: String,
    },
    /// A failure the default supervisor does not know how to recover from.
    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
    /// The actor system has been shut down.
    #[error("The actor system is stopped.")]
    SystemStopped,
}

impl Error {
    /// True for the configuration failures raised synchronously to callers.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidName(..)
                | Error::NameNotUnique(..)
                | Error::NotChild(..)
                | Error::Scheduler(_)
                | Error::Create(_)
        )
    }
}
