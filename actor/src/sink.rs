// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event sinks
//!
//! Runtime events, such as the dead letters recorded by the system, are published on
//! broadcast channels. A [`Sink`] drains one of those channels into a [`Subscriber`] from its
//! own task, so observers never run inside an actor.
//!

use async_trait::async_trait;

use serde::{Serialize, de::DeserializeOwned};

use tokio::sync::broadcast::{Receiver as EventReceiver, error::RecvError};

use tracing::{debug, warn};

use std::fmt::Debug;

/// Events published by the runtime.
pub trait Event:
    Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static
{
}

/// Drains a broadcast receiver into a subscriber.
///
/// # Type Parameters
///
/// * `E` - The event type this sink forwards.
///
/// ```ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Subscriber<DeadLetterEvent> for Audit {
///     async fn notify(&self, event: DeadLetterEvent) {
///         println!("undeliverable: {}", event.message);
///     }
/// }
///
/// let sink = Sink::new(system.subscribe_dead_letters(), Audit);
/// system.run_sink(sink).await;
/// ```
pub struct Sink<E: Event> {
    subscriber: Box<dyn Subscriber<E>>,
    event_receiver: EventReceiver<E>,
}

impl<E: Event> Sink<E> {
    /// Creates a sink feeding `subscriber` from `event_receiver`.
    pub fn new(
        event_receiver: EventReceiver<E>,
        subscriber: impl Subscriber<E>,
    ) -> Self {
        Sink {
            subscriber: Box::new(subscriber),
            event_receiver,
        }
    }

    /// Forwards events until the channel closes. A lagging sink skips the events it missed
    /// and carries on with the oldest one still buffered.
    pub async fn run(&mut self) {
        loop {
            match self.event_receiver.recv().await {
                Ok(event) => {
                    debug!("Received event: {:?}. Notify to the subscriber.", event);
                    self.subscriber.notify(event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Sink lagged, {} events skipped.", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Sink stopped, the event channel is closed.");
    }
}

/// Receives the events of a [`Sink`].
#[async_trait]
pub trait Subscriber<E: Event>: Send + Sync + 'static {
    /// Called once per event, in publication order.
    async fn notify(&self, event: E);
}

#[cfg(test)]
mod tests {

    use super::*;

    use serde::Deserialize;
    use tokio::sync::{broadcast, mpsc};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Tick(u32);

    impl Event for Tick {}

    struct Forward(mpsc::UnboundedSender<Tick>);

    #[async_trait]
    impl Subscriber<Tick> for Forward {
        async fn notify(&self, event: Tick) {
            let _ = self.0.send(event);
        }
    }

    #[tokio::test]
    async fn test_sink_forwards_until_closed() {
        let (sender, receiver) = broadcast::channel(8);
        let (probe, mut observed) = mpsc::unbounded_channel();
        let mut sink = Sink::new(receiver, Forward(probe));

        sender.send(Tick(1)).unwrap();
        sender.send(Tick(2)).unwrap();
        drop(sender);
        sink.run().await;
        drop(sink);

        assert_eq!(observed.recv().await, Some(Tick(1)));
        assert_eq!(observed.recv().await, Some(Tick(2)));
        assert_eq!(observed.recv().await, None);
    }

    #[tokio::test]
    async fn test_sink_survives_lag() {
        let (sender, receiver) = broadcast::channel(2);
        let (probe, mut observed) = mpsc::unbounded_channel();
        let mut sink = Sink::new(receiver, Forward(probe));

        for tick in 0..5 {
            sender.send(Tick(tick)).unwrap();
        }
        drop(sender);
        sink.run().await;

        assert_eq!(observed.recv().await, Some(Tick(3)));
        assert_eq!(observed.recv().await, Some(Tick(4)));
    }
}
