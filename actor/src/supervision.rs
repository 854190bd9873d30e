// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Supervision strategies
//!
//! A supervisor strategy is a pure decision function from a child's failure to a
//! [`Directive`]. It is owned by the supervising actor and consulted every time one of its
//! children fails; no strategy keeps a history of previous decisions.
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::fmt::Debug;

/// Recovery action chosen for a failed child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Directive {
    /// Treat the failure as the supervisor's own and report it one level up.
    Escalate,
    /// Replace the failed instance with a fresh one; mailbox and address survive.
    Restart,
    /// Keep the instance and continue with the next message.
    Resume,
    /// Terminate the child permanently.
    Stop,
}

/// Which children a directive applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisionScope {
    /// Only the failing child.
    OneForOne,
    /// Every child of the supervisor.
    AllForOne,
}

/// Decision function signature used by the built-in strategies.
pub type Decider = fn(&Error) -> Directive;

/// Default decision table.
///
/// | failure kind                           | directive |
/// |----------------------------------------|-----------|
/// | `ActorInitialization`, `ActorKilled`   | Stop      |
/// | `InvalidOperation`, `NotSupported`     | Restart   |
/// | `Functional` (ordinary failure)        | Restart   |
/// | anything else                          | Escalate  |
pub fn default_decider(error: &Error) -> Directive {
    match error {
        Error::ActorInitialization(_) | Error::ActorKilled => Directive::Stop,
        Error::InvalidOperation(_) | Error::NotSupported(_) => {
            Directive::Restart
        }
        Error::Functional(_) => Directive::Restart,
        _ => Directive::Escalate,
    }
}

/// Policy mapping a child's failure to a recovery directive.
pub trait SupervisorStrategy: Debug + Send + Sync {
    /// Chooses the directive for `error`.
    fn decide(&self, error: &Error) -> Directive {
        default_decider(error)
    }

    /// Children affected by Restart and Stop directives.
    fn scope(&self) -> SupervisionScope {
        SupervisionScope::OneForOne
    }
}

/// Applies the directive to the failing child only. This is the default strategy.
#[derive(Clone, Copy)]
pub struct OneForOneStrategy {
    decider: Decider,
}

impl OneForOneStrategy {
    /// Strategy using a custom decision function.
    pub fn new(decider: Decider) -> Self {
        Self { decider }
    }
}

impl Default for OneForOneStrategy {
    fn default() -> Self {
        Self::new(default_decider)
    }
}

impl Debug for OneForOneStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OneForOneStrategy")
    }
}

impl SupervisorStrategy for OneForOneStrategy {
    fn decide(&self, error: &Error) -> Directive {
        (self.decider)(error)
    }
}

/// Applies Restart and Stop to every child of the supervisor, not only the failing one.
#[derive(Clone, Copy)]
pub struct AllForOneStrategy {
    decider: Decider,
}

impl AllForOneStrategy {
    /// Strategy using a custom decision function.
    pub fn new(decider: Decider) -> Self {
        Self { decider }
    }
}

impl Default for AllForOneStrategy {
    fn default() -> Self {
        Self::new(default_decider)
    }
}

impl Debug for AllForOneStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AllForOneStrategy")
    }
}

impl SupervisorStrategy for AllForOneStrategy {
    fn decide(&self, error: &Error) -> Directive {
        (self.decider)(error)
    }

    fn scope(&self) -> SupervisionScope {
        SupervisionScope::AllForOne
    }
}
