// ============================
// munch-backend-lib/src/gateway.rs
// ============================
//! Per-connection session handling.
//!
//! A [`Connection`] is instantiated per WebSocket and translates inbound
//! client messages into registry/room calls. Room-wide state changes reach
//! the connection through its broadcast subscription, forwarded to the
//! outbound channel by a relay task. Errors raised here are answered on
//! this connection only; they never mutate room state or reach other
//! members.

use std::sync::Arc;

use metrics::counter;
use munch_common::{ClientToServer, GeoPoint, Restaurant, ServerToClient, SwipeDirection};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::ledger::MemberId;
use crate::metrics::ROOM_JOINED;
use crate::registry::RoomId;
use crate::room_actor::{RoomEvent, RoomHandle};
use crate::AppState;

struct JoinedRoom {
    room_id: RoomId,
    handle: RoomHandle,
    relay_task: JoinHandle<()>,
}

/// Session state for one WebSocket connection.
pub struct Connection {
    state: Arc<AppState>,
    member_id: MemberId,
    outbound: mpsc::Sender<ServerToClient>,
    room: Option<JoinedRoom>,
}

impl Connection {
    pub fn new(state: Arc<AppState>, outbound: mpsc::Sender<ServerToClient>) -> Self {
        Connection {
            state,
            member_id: Uuid::new_v4(),
            outbound,
            room: None,
        }
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Handle one inbound message, returning the direct reply when the
    /// operation has one (swipe/undo/enrichment answer through the room
    /// broadcast instead).
    pub async fn handle_message(
        &mut self,
        msg: ClientToServer,
    ) -> Result<Option<ServerToClient>, AppError> {
        match msg {
            ClientToServer::JoinRoom {
                room_id,
                latitude,
                longitude,
                radius,
            } => {
                let reply = self.handle_join(&room_id, latitude, longitude, radius).await?;
                Ok(Some(reply))
            },
            ClientToServer::Swipe { index, direction } => {
                self.handle_swipe(index, direction).await?;
                Ok(None)
            },
            ClientToServer::Undo { index } => {
                self.handle_undo(index).await?;
                Ok(None)
            },
            ClientToServer::RestaurantsReady {
                room_id,
                restaurants,
            } => {
                self.handle_enriched(&room_id, restaurants).await?;
                Ok(None)
            },
        }
    }

    async fn handle_join(
        &mut self,
        room_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
        radius: Option<f64>,
    ) -> Result<ServerToClient, AppError> {
        if self.room.is_some() {
            return Err(AppError::InvalidOperation(
                "connection already joined a room".to_string(),
            ));
        }

        let room_id = self.state.registry.normalize_id(room_id)?;
        let location = latitude
            .zip(longitude)
            .map(|(latitude, longitude)| GeoPoint { latitude, longitude });

        let (handle, mut relay_rx, created) =
            self.state.registry.resolve_or_create(&room_id, location, radius);

        // forward room events to this connection for as long as it stays in
        // the room; the subscription itself is what marks the connection
        // live for reclamation purposes
        let outbound = self.outbound.clone();
        let relay_task = tokio::spawn(async move {
            loop {
                match relay_rx.recv().await {
                    Ok(event) => {
                        if outbound.send(event_to_message(event)).await.is_err() {
                            break;
                        }
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connection lagged behind room events");
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let snapshot = match handle.join(self.member_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // wait for the task to be torn down so its broadcast
                // subscription is gone before reconciling
                relay_task.abort();
                let _ = relay_task.await;
                self.state.registry.reconcile();
                return Err(err);
            },
        };

        info!(
            room_id = %room_id,
            member_id = %self.member_id,
            created,
            "member joined room"
        );
        counter!(ROOM_JOINED).increment(1);

        self.room = Some(JoinedRoom {
            room_id: room_id.clone(),
            handle,
            relay_task,
        });

        Ok(ServerToClient::RoomJoined {
            room_id,
            created,
            restaurants: snapshot.restaurants,
            counts: snapshot.counts,
            details_ready: snapshot.details_ready,
            upstream_unavailable: snapshot.upstream_unavailable,
        })
    }

    async fn handle_swipe(&mut self, index: usize, direction: SwipeDirection) -> Result<(), AppError> {
        let joined = self.joined()?;
        joined.handle.swipe(self.member_id, index, direction).await?;
        Ok(())
    }

    async fn handle_undo(&mut self, index: usize) -> Result<(), AppError> {
        let joined = self.joined()?;
        joined.handle.undo(self.member_id, index).await?;
        Ok(())
    }

    async fn handle_enriched(
        &mut self,
        room_id: &str,
        restaurants: Vec<Restaurant>,
    ) -> Result<(), AppError> {
        let room_id = self.state.registry.normalize_id(room_id)?;
        let joined = self.joined()?;
        if joined.room_id != room_id {
            return Err(AppError::InvalidOperation(
                "enriched list targets a different room".to_string(),
            ));
        }

        joined.handle.upgrade(restaurants).await?;
        info!(room_id = %room_id, "restaurant details applied");
        Ok(())
    }

    /// Tear down this connection's room membership. Called when the socket
    /// closes, whether or not the client said goodbye.
    pub async fn disconnect(&mut self) {
        if let Some(joined) = self.room.take() {
            match joined.handle.leave(self.member_id).await {
                Ok(remaining) => {
                    info!(
                        room_id = %joined.room_id,
                        member_id = %self.member_id,
                        remaining,
                        "member left room"
                    );
                },
                Err(err) => {
                    warn!(
                        room_id = %joined.room_id,
                        error = %err,
                        "failed to remove member on disconnect"
                    );
                },
            }
            // the broadcast subscription must be gone before reconciling,
            // or the room still counts this connection as live
            joined.relay_task.abort();
            let _ = joined.relay_task.await;
        }

        self.state.registry.reconcile();
    }

    fn joined(&self) -> Result<&JoinedRoom, AppError> {
        self.room
            .as_ref()
            .ok_or_else(|| AppError::InvalidOperation("connection has not joined a room".to_string()))
    }
}

fn event_to_message(event: RoomEvent) -> ServerToClient {
    match event {
        RoomEvent::TallyUpdated { counts } => ServerToClient::TallyUpdated { counts },
        RoomEvent::MatchFound { restaurant } => ServerToClient::MatchFound { restaurant },
    }
}
