// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor selection
//!
//! Resolution of a path string to an actor reference. Paths starting with the separator are
//! absolute and resolved from the guardians; other paths are relative to the children of the
//! selecting actor. Each level is matched against a snapshot of the current children, so a
//! selection never blocks structural changes of the tree. Wildcards are not supported.
//!

use crate::{
    actor::ActorRef,
    handler::Message,
    path::{SEPARATOR, SYSTEM_SEGMENT, USER_SEGMENT},
    system::SystemRef,
};

use tracing::debug;

/// Result of resolving a path: zero or one reference.
///
/// A path that does not match any actor resolves to the dead-letter actor, so telling a
/// selection always ends somewhere observable while the system runs.
#[derive(Debug, Clone, Default)]
pub struct ActorSelection {
    targets: Vec<ActorRef>,
}

impl ActorSelection {
    /// Resolves `path` from `anchor`. Relative paths are looked up among the children of
    /// `anchor`.
    pub(crate) async fn resolve(
        system: &SystemRef,
        anchor: &ActorRef,
        path: &str,
    ) -> Self {
        let absolute = path.trim_start().starts_with(SEPARATOR);
        let segments: Vec<&str> = path
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();

        let (start, segments) = if absolute {
            match segments.first() {
                Some(&USER_SEGMENT) => (system.user_guardian(), &segments[1..]),
                Some(&SYSTEM_SEGMENT) => {
                    (system.system_guardian(), &segments[1..])
                }
                _ => (system.user_guardian(), &segments[..]),
            }
        } else {
            (Some(anchor.clone()), &segments[..])
        };

        let Some(mut current) = start else {
            return Self::default();
        };

        for segment in segments {
            let children = current.children().await;
            match children.into_iter().find(|child| child.name() == *segment) {
                Some(child) => current = child,
                None => {
                    debug!("Selection {} resolved to dead letters.", path);
                    return Self {
                        targets: system.dead_letters().into_iter().collect(),
                    };
                }
            }
        }

        Self {
            targets: vec![current],
        }
    }

    /// The resolved reference, if any.
    pub fn reference(&self) -> Option<ActorRef> {
        self.targets.first().cloned()
    }

    /// True when nothing was resolved, which only happens once the system is shut down.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Tells `message` to every resolved reference, keeping `sender`.
    pub fn tell<M: Message>(&self, message: M, sender: Option<&ActorRef>) {
        for target in &self.targets {
            target.tell(message.clone(), sender);
        }
    }
}
