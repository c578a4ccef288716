//! Socket.IO event handlers for live runner output
//!
//! The push half of the boundary: a client subscribes to a runner and
//! receives its replay buffer followed by live output and lifecycle events.
//! Subscriptions are leases held per socket; disconnecting releases them.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{Data, SocketRef, State};
use socketioxide::{SocketIo, TransportType};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use runner_supervisor::{Subscription, Supervisor};

/// Shared state for Socket.IO handlers
#[derive(Clone)]
pub struct SocketState {
    supervisor: Arc<Supervisor>,
    /// Active delivery leases keyed by socket id
    leases: Arc<Mutex<HashMap<String, Vec<Lease>>>>,
}

struct Lease {
    subscription: Subscription,
    forwarder: tokio::task::JoinHandle<()>,
}

impl SocketState {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn add_lease(&self, socket_id: String, lease: Lease) {
        let mut leases = self.leases.lock().await;
        leases.entry(socket_id).or_default().push(lease);
    }

    async fn take_lease(&self, socket_id: &str, subscription_id: Uuid) -> Option<Subscription> {
        let mut leases = self.leases.lock().await;
        let socket_leases = leases.get_mut(socket_id)?;
        let index = socket_leases
            .iter()
            .position(|lease| lease.subscription.id == subscription_id)?;
        let lease = socket_leases.swap_remove(index);
        lease.forwarder.abort();
        Some(lease.subscription)
    }

    async fn take_all(&self, socket_id: &str) -> Vec<Subscription> {
        let mut leases = self.leases.lock().await;
        leases
            .remove(socket_id)
            .unwrap_or_default()
            .into_iter()
            .map(|lease| {
                lease.forwarder.abort();
                lease.subscription
            })
            .collect()
    }
}

// ============ Event Payloads ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    pub runner_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribePayload {
    pub subscription_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedPayload {
    pub subscription_id: Uuid,
    pub runner_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamClosedPayload {
    pub runner_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}

// ============ Event Handlers ============

/// Handle new socket connection
pub async fn on_connect(socket: SocketRef, State(_state): State<SocketState>) {
    info!("Client connected: {}", socket.id);

    socket.on(
        "runner:subscribe",
        |socket: SocketRef, State(state): State<SocketState>, Data(data): Data<SubscribePayload>| async move {
            handle_subscribe(socket, state, data).await;
        },
    );

    socket.on(
        "runner:unsubscribe",
        |socket: SocketRef, State(state): State<SocketState>, Data(data): Data<UnsubscribePayload>| async move {
            handle_unsubscribe(socket, state, data).await;
        },
    );

    socket.on_disconnect(|socket: SocketRef, State(state): State<SocketState>| async move {
        info!("Client disconnected: {}", socket.id);
        for subscription in state.take_all(&socket.id.to_string()).await {
            state.supervisor.unsubscribe(&subscription).await;
        }
    });
}

async fn handle_subscribe(socket: SocketRef, state: SocketState, data: SubscribePayload) {
    match state.supervisor.subscribe(data.runner_id).await {
        Ok((subscription, mut rx)) => {
            info!(
                "Client {} subscribed to runner {}",
                socket.id, data.runner_id
            );
            let _ = socket.emit(
                "runner:subscribed",
                &SubscribedPayload {
                    subscription_id: subscription.id,
                    runner_id: data.runner_id,
                },
            );

            let forward_socket = socket.clone();
            let runner_id = data.runner_id;
            let forwarder = tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    if forward_socket.emit("runner:output", &message).is_err() {
                        break;
                    }
                }
                // End-of-stream: the runner was killed or the buffer cleared.
                let _ = forward_socket.emit(
                    "runner:closed",
                    &StreamClosedPayload { runner_id },
                );
            });

            state
                .add_lease(socket.id.to_string(), Lease { subscription, forwarder })
                .await;
        }
        Err(e) => {
            warn!(
                "Subscribe to {} from {} failed: {}",
                data.runner_id, socket.id, e
            );
            let _ = socket.emit(
                "runner:error",
                &ErrorPayload {
                    message: e.to_string(),
                },
            );
        }
    }
}

async fn handle_unsubscribe(socket: SocketRef, state: SocketState, data: UnsubscribePayload) {
    if let Some(subscription) = state
        .take_lease(&socket.id.to_string(), data.subscription_id)
        .await
    {
        state.supervisor.unsubscribe(&subscription).await;
        info!(
            "Client {} unsubscribed ({})",
            socket.id, data.subscription_id
        );
    }
}

/// Create and configure the Socket.IO layer
pub fn create_socket_layer(state: SocketState) -> (socketioxide::layer::SocketIoLayer, SocketIo) {
    let (layer, io) = SocketIo::builder()
        .with_state(state)
        // Only allow WebSocket transport to avoid CORS issues with polling
        .transports([TransportType::Websocket])
        .build_layer();

    io.ns("/", on_connect);

    (layer, io)
}
