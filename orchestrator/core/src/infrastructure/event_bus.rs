// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Control Plane Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Lets tests, the CLI, and plugins observe what the background loops do
// without the loops knowing about their observers.

use crate::domain::events::ControlPlaneEvent;
use crate::domain::operation::OperationId;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to control plane events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ControlPlaneEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers. Never fails; events published
    /// with no subscribers are dropped.
    pub fn publish(&self, event: ControlPlaneEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all control plane events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single operation
    pub fn subscribe_operation(&self, operation_id: OperationId) -> OperationEventReceiver {
        OperationEventReceiver {
            receiver: self.sender.subscribe(),
            operation_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all control plane events
pub struct EventReceiver {
    receiver: broadcast::Receiver<ControlPlaneEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<ControlPlaneEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<ControlPlaneEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Adapt into a stream that skips over lag and ends when the bus closes.
    pub fn into_stream(self) -> BoxStream<'static, ControlPlaneEvent> {
        stream::unfold(self, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => return None,
                }
            }
        })
        .boxed()
    }

    /// Drain every event currently buffered.
    pub fn drain(&mut self) -> Vec<ControlPlaneEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

/// Receiver for operation-specific events (filtered)
pub struct OperationEventReceiver {
    receiver: broadcast::Receiver<ControlPlaneEvent>,
    operation_id: OperationId,
}

impl OperationEventReceiver {
    /// Receive the next event for the subscribed operation
    pub async fn recv(&mut self) -> Result<ControlPlaneEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.operation_id() == Some(self.operation_id) {
                return Ok(event);
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
