// ============================
// munch-backend-lib/src/room_actor.rs
// ============================
//! One actor task per room.
//!
//! All room commands flow through a single mpsc channel and are processed
//! serially, so vote mutation and match evaluation form one atomic unit
//! without locks. The catalog fetch that seeds a new room runs outside the
//! actor; joins arriving before the seed are parked and answered when the
//! restaurant list lands, which keeps concurrent creators behind exactly
//! one fetch and one shuffle.

use metrics::counter;
use munch_common::{Restaurant, SwipeDirection, VoteCounts};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::ledger::MemberId;
use crate::metrics::{MATCH_FOUND, SWIPE_RECORDED, SWIPE_UNDONE};
use crate::registry::RoomId;
use crate::room::{Room, RoomSnapshot, SwipeOutcome};

/// Message sent *into* the actor
#[derive(Debug)]
pub enum RoomCmd {
    Join {
        member: MemberId,
        resp_tx: mpsc::UnboundedSender<Result<RoomSnapshot, AppError>>,
    },
    /// Delivered once by the registry's fetch task; carries the restaurant
    /// list the room is created from.
    Seed {
        restaurants: Vec<Restaurant>,
        upstream_unavailable: bool,
    },
    Swipe {
        member: MemberId,
        index: usize,
        direction: SwipeDirection,
        resp_tx: mpsc::UnboundedSender<Result<SwipeOutcome, AppError>>,
    },
    Undo {
        member: MemberId,
        index: usize,
        resp_tx: mpsc::UnboundedSender<Result<Vec<VoteCounts>, AppError>>,
    },
    Upgrade {
        restaurants: Vec<Restaurant>,
        resp_tx: mpsc::UnboundedSender<Result<(), AppError>>,
    },
    Leave {
        member: MemberId,
        resp_tx: mpsc::UnboundedSender<usize>,
    },
}

/// State change fanned out to every connection in the room.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    TallyUpdated { counts: Vec<VoteCounts> },
    MatchFound { restaurant: Restaurant },
}

/// Handle that other components keep: command channel + broadcast sender.
#[derive(Clone)]
pub struct RoomHandle {
    pub cmd_tx: mpsc::UnboundedSender<RoomCmd>,
    pub relay_tx: broadcast::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.relay_tx.subscribe()
    }

    /// Number of live connections attached to this room. Broadcast
    /// subscriptions are held for exactly as long as a connection is in the
    /// room, so this is the transport's ground truth for reconciliation.
    pub fn live_connections(&self) -> usize {
        self.relay_tx.receiver_count()
    }

    pub async fn join(&self, member: MemberId) -> Result<RoomSnapshot, AppError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(RoomCmd::Join { member, resp_tx })?;
        resp_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("room actor dropped join response".to_string()))?
    }

    pub fn seed(&self, restaurants: Vec<Restaurant>, upstream_unavailable: bool) {
        let _ = self.cmd_tx.send(RoomCmd::Seed {
            restaurants,
            upstream_unavailable,
        });
    }

    pub async fn swipe(
        &self,
        member: MemberId,
        index: usize,
        direction: SwipeDirection,
    ) -> Result<SwipeOutcome, AppError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(RoomCmd::Swipe {
            member,
            index,
            direction,
            resp_tx,
        })?;
        resp_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("room actor dropped swipe response".to_string()))?
    }

    pub async fn undo(&self, member: MemberId, index: usize) -> Result<Vec<VoteCounts>, AppError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(RoomCmd::Undo {
            member,
            index,
            resp_tx,
        })?;
        resp_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("room actor dropped undo response".to_string()))?
    }

    pub async fn upgrade(&self, restaurants: Vec<Restaurant>) -> Result<(), AppError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(RoomCmd::Upgrade {
            restaurants,
            resp_tx,
        })?;
        resp_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("room actor dropped upgrade response".to_string()))?
    }

    /// Remove `member` from the room, returning the remaining member count.
    pub async fn leave(&self, member: MemberId) -> Result<usize, AppError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(RoomCmd::Leave { member, resp_tx })?;
        resp_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("room actor dropped leave response".to_string()))
    }
}

type JoinReply = mpsc::UnboundedSender<Result<RoomSnapshot, AppError>>;

enum ActorState {
    /// Catalog fetch in flight; joins are parked until the seed arrives.
    Pending { queued: Vec<(MemberId, JoinReply)> },
    Ready(Room),
}

pub struct RoomActor {
    room_id: RoomId,
    state: ActorState,
    relay_tx: broadcast::Sender<RoomEvent>,
}

impl RoomActor {
    pub fn new(room_id: RoomId, relay_tx: broadcast::Sender<RoomEvent>) -> Self {
        RoomActor {
            room_id,
            state: ActorState::Pending { queued: Vec::new() },
            relay_tx,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCmd>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        debug!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle(&mut self, cmd: RoomCmd) {
        match cmd {
            RoomCmd::Join { member, resp_tx } => match &mut self.state {
                ActorState::Pending { queued } => queued.push((member, resp_tx)),
                ActorState::Ready(room) => {
                    room.join(member);
                    let _ = resp_tx.send(Ok(room.snapshot()));
                },
            },
            RoomCmd::Seed {
                restaurants,
                upstream_unavailable,
            } => self.handle_seed(restaurants, upstream_unavailable),
            RoomCmd::Swipe {
                member,
                index,
                direction,
                resp_tx,
            } => {
                let result = match &mut self.state {
                    ActorState::Pending { .. } => Err(AppError::RoomNotReady),
                    ActorState::Ready(room) => room.swipe(&member, index, direction),
                };

                if let Ok(outcome) = &result {
                    counter!(SWIPE_RECORDED).increment(1);
                    let _ = self.relay_tx.send(RoomEvent::TallyUpdated {
                        counts: outcome.counts.clone(),
                    });
                    if let Some(restaurant) = &outcome.matched {
                        counter!(MATCH_FOUND).increment(1);
                        let _ = self.relay_tx.send(RoomEvent::MatchFound {
                            restaurant: restaurant.clone(),
                        });
                    }
                }

                let _ = resp_tx.send(result);
            },
            RoomCmd::Undo {
                member,
                index,
                resp_tx,
            } => {
                let result = match &mut self.state {
                    ActorState::Pending { .. } => Err(AppError::RoomNotReady),
                    ActorState::Ready(room) => room.undo(&member, index),
                };

                if let Ok(counts) = &result {
                    counter!(SWIPE_UNDONE).increment(1);
                    let _ = self.relay_tx.send(RoomEvent::TallyUpdated {
                        counts: counts.clone(),
                    });
                }

                let _ = resp_tx.send(result);
            },
            RoomCmd::Upgrade {
                restaurants,
                resp_tx,
            } => {
                let result = match &mut self.state {
                    ActorState::Pending { .. } => Err(AppError::RoomNotReady),
                    ActorState::Ready(room) => room.upgrade_restaurants(restaurants),
                };
                let _ = resp_tx.send(result);
            },
            RoomCmd::Leave { member, resp_tx } => {
                let remaining = match &mut self.state {
                    ActorState::Pending { queued } => {
                        queued.retain(|(queued_member, _)| *queued_member != member);
                        queued.len()
                    },
                    ActorState::Ready(room) => room.leave(&member),
                };
                let _ = resp_tx.send(remaining);
            },
        }
    }

    fn handle_seed(&mut self, restaurants: Vec<Restaurant>, upstream_unavailable: bool) {
        let ActorState::Pending { queued } = &mut self.state else {
            warn!(room_id = %self.room_id, "duplicate seed ignored");
            return;
        };

        let mut room = Room::create(self.room_id.clone(), restaurants, upstream_unavailable);
        for (member, resp_tx) in queued.drain(..) {
            room.join(member);
            let _ = resp_tx.send(Ok(room.snapshot()));
        }

        self.state = ActorState::Ready(room);
    }
}

/// Spawn a new room actor and return its handle.
pub fn spawn_room_actor(room_id: &str) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (relay_tx, _) = broadcast::channel(32);
    let actor = RoomActor::new(room_id.to_string(), relay_tx.clone());

    tokio::spawn(actor.run(cmd_rx));

    RoomHandle { cmd_tx, relay_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn restaurants(count: usize) -> Vec<Restaurant> {
        (0..count)
            .map(|i| Restaurant {
                place_id: format!("place-{i}"),
                name: format!("Restaurant {i}"),
                rating: None,
                price_level: None,
                user_ratings_total: None,
                details: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_join_parks_until_seed() {
        let handle = spawn_room_actor("AB12");
        let member = Uuid::new_v4();

        let join_handle = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.join(member).await })
        };

        // the join is parked; seeding releases it with the shuffled list
        handle.seed(restaurants(3), false);
        let snapshot = join_handle.await.unwrap().unwrap();
        assert_eq!(snapshot.restaurants.len(), 3);
        assert_eq!(snapshot.counts.len(), 3);
        assert!(!snapshot.details_ready);
        assert!(!snapshot.upstream_unavailable);
    }

    #[tokio::test]
    async fn test_swipe_before_seed_is_rejected() {
        let handle = spawn_room_actor("AB12");
        let member = Uuid::new_v4();

        let err = handle.swipe(member, 0, SwipeDirection::Like).await.unwrap_err();
        assert!(matches!(err, AppError::RoomNotReady));
    }

    #[tokio::test]
    async fn test_swipe_broadcasts_tally_and_match() {
        let handle = spawn_room_actor("AB12");
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let mut rx = handle.subscribe();

        handle.seed(restaurants(2), false);
        handle.join(m1).await.unwrap();
        handle.join(m2).await.unwrap();

        handle.swipe(m1, 0, SwipeDirection::Like).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RoomEvent::TallyUpdated { .. }));

        let outcome = handle.swipe(m2, 0, SwipeDirection::Like).await.unwrap();
        assert!(outcome.matched.is_some());

        assert!(matches!(rx.recv().await.unwrap(), RoomEvent::TallyUpdated { .. }));
        assert!(matches!(rx.recv().await.unwrap(), RoomEvent::MatchFound { .. }));
    }

    #[tokio::test]
    async fn test_rejected_swipe_broadcasts_nothing() {
        let handle = spawn_room_actor("AB12");
        let m1 = Uuid::new_v4();
        let mut rx = handle.subscribe();

        handle.seed(restaurants(2), false);
        handle.join(m1).await.unwrap();

        let err = handle.swipe(m1, 9, SwipeDirection::Like).await.unwrap_err();
        assert!(matches!(err, AppError::IndexOutOfRange { .. }));

        let err = handle
            .swipe(Uuid::new_v4(), 0, SwipeDirection::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownMember));

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_leave_before_seed_drops_queued_join() {
        let handle = spawn_room_actor("AB12");
        let member = Uuid::new_v4();

        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        handle.cmd_tx.send(RoomCmd::Join { member, resp_tx }).unwrap();

        assert_eq!(handle.leave(member).await.unwrap(), 0);
        handle.seed(restaurants(1), false);

        // the parked join was dropped along with its reply channel
        assert!(resp_rx.recv().await.is_none());
    }
}
