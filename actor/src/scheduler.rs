// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Scheduler
//!
//! Delayed and periodic delivery of messages. Every schedule runs in its own task and tells
//! its message to the target with no sender. Schedules are cancelled individually through the
//! returned [`Cancellable`] and all at once when the actor system shuts down.
//!

use crate::{Error, actor::ActorRef, handler::Message};

use tokio::{
    select,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use tracing::debug;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Shortest interval accepted by [`Scheduler::schedule_repeating`].
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle of a scheduled delivery.
///
/// Once [`Cancellable::cancel`] returns, the schedule never delivers again, even if a
/// delivery was due at the same instant.
#[derive(Debug, Clone)]
pub struct Cancellable {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl Cancellable {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Cancels the schedule.
    pub fn cancel(&self) {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.token.cancel();
    }

    /// True once the schedule is cancelled, explicitly or by system shutdown.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Tells `message` to `target` unless the schedule was cancelled. Returns whether the
    /// message was told.
    fn deliver<M: Message>(&self, target: &ActorRef, message: M) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.token.is_cancelled() {
            return false;
        }
        target.tell(message, None);
        true
    }
}

/// Timer service of an actor system.
#[derive(Debug, Clone)]
pub struct Scheduler {
    token: CancellationToken,
}

impl Scheduler {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Delivers `message` to `target` once, after `delay`.
    ///
    /// # Errors
    ///
    /// [`Error::SystemStopped`] once the actor system is shut down.
    pub fn schedule_once<M: Message>(
        &self,
        delay: Duration,
        target: &ActorRef,
        message: M,
    ) -> Result<Cancellable, Error> {
        let schedule = self.cancellable()?;
        let task = schedule.clone();
        let target = target.clone();

        tokio::spawn(async move {
            select! {
                _ = task.token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    task.deliver(&target, message);
                }
            }
        });
        Ok(schedule)
    }

    /// Delivers `message` to `target` after `initial_delay` and then every `interval`, until
    /// cancelled or until the target is stopped.
    ///
    /// Ticks missed because the runtime was busy are not delivered in a burst; the next
    /// delivery is pushed back instead.
    ///
    /// # Errors
    ///
    /// * [`Error::Scheduler`] if `interval` is shorter than [`MIN_INTERVAL`].
    /// * [`Error::SystemStopped`] once the actor system is shut down.
    pub fn schedule_repeating<M: Message>(
        &self,
        initial_delay: Duration,
        interval: Duration,
        target: &ActorRef,
        message: M,
    ) -> Result<Cancellable, Error> {
        if interval < MIN_INTERVAL {
            return Err(Error::Scheduler(format!(
                "the interval must be at least {:?}, got {:?}",
                MIN_INTERVAL, interval
            )));
        }
        let schedule = self.cancellable()?;
        let task = schedule.clone();
        let target = target.clone();

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + initial_delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                select! {
                    _ = task.token.cancelled() => break,
                    _ = ticker.tick() => {
                        if target.is_terminated() {
                            debug!("Schedule for stopped actor {} ends.", target.path());
                            break;
                        }
                        if !task.deliver(&target, message.clone()) {
                            break;
                        }
                    }
                }
            }
        });
        Ok(schedule)
    }

    fn cancellable(&self) -> Result<Cancellable, Error> {
        if self.token.is_cancelled() {
            return Err(Error::SystemStopped);
        }
        Ok(Cancellable::new(self.token.child_token()))
    }

    /// Cancels every schedule.
    pub(crate) fn cancel_all(&self) {
        self.token.cancel();
    }
}
