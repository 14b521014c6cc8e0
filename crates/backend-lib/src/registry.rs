// ============================
// munch-backend-lib/src/registry.rs
// ============================
//! Process-wide room directory: id allocation, create-or-join resolution,
//! and reclamation of empty rooms.
//!
//! Reclamation is reconciled against transport ground truth (the number of
//! live broadcast subscriptions per room) rather than trusting local
//! bookkeeping, because disconnect notifications can be missed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::{counter, gauge};
use munch_common::GeoPoint;
use rand::Rng;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::catalog::{fetch_restaurants, RestaurantCatalog};
use crate::config::RoomSettings;
use crate::error::AppError;
use crate::metrics::{CATALOG_RATE_LIMITED, ROOM_ACTIVE, ROOM_CREATED, ROOM_RECLAIMED};
use crate::room_actor::{spawn_room_actor, RoomEvent, RoomHandle};

pub type RoomId = String;

/// Room codes use the full uppercase alphanumeric alphabet; ids are
/// case-insensitive on the way in.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_ROOM_ID_LENGTH: usize = 16;
const MAX_ALLOCATE_ATTEMPTS: usize = 64;

/// Directory of all live rooms.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomHandle>,
    /// Codes handed out by [`allocate_id`](Self::allocate_id) that have not
    /// turned into rooms yet. Entries expire after `reservation_ttl`.
    reserved: DashMap<RoomId, Instant>,
    catalog: Arc<dyn RestaurantCatalog>,
    id_length: usize,
    reservation_ttl: Duration,
}

impl RoomRegistry {
    pub fn new(catalog: Arc<dyn RestaurantCatalog>, settings: &RoomSettings) -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
            reserved: DashMap::new(),
            catalog,
            id_length: settings.id_length,
            reservation_ttl: Duration::from_secs(settings.reservation_ttl_secs),
        }
    }

    /// Uppercase and validate a client-supplied room id.
    pub fn normalize_id(&self, raw: &str) -> Result<RoomId, AppError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(AppError::InvalidRoomId("room id is empty".to_string()));
        }
        if id.len() > MAX_ROOM_ID_LENGTH {
            return Err(AppError::InvalidRoomId(format!(
                "room id longer than {MAX_ROOM_ID_LENGTH} characters"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidRoomId(
                "room id must be alphanumeric".to_string(),
            ));
        }
        Ok(id.to_ascii_uppercase())
    }

    /// Produce a fresh room code that collides with no live room.
    ///
    /// The code is reserved atomically (check-then-reserve through the map
    /// entry) so two simultaneous allocations cannot hand out the same id.
    /// Reservations expire after the configured TTL if never joined.
    pub fn allocate_id(&self) -> Result<RoomId, AppError> {
        for _ in 0..MAX_ALLOCATE_ATTEMPTS {
            let code = self.generate_code();
            if self.rooms.contains_key(&code) {
                continue;
            }

            match self.reserved.entry(code.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(Instant::now());
                    return Ok(code);
                },
                Entry::Occupied(mut entry) => {
                    if entry.get().elapsed() >= self.reservation_ttl {
                        entry.insert(Instant::now());
                        return Ok(code);
                    }
                },
            }
        }

        Err(AppError::Internal(
            "could not allocate an unused room id".to_string(),
        ))
    }

    /// True iff the room is tracked *and* the transport still reports at
    /// least one live connection for it.
    pub fn exists(&self, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|entry| entry.value().live_connections() > 0)
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Join the room, creating it if the id is not live.
    ///
    /// The caller's broadcast subscription is taken inside the map-entry
    /// critical section, so a just-created room is never observed with zero
    /// connections, and a second join racing the creation lands on the same
    /// actor instead of spawning a second fetch. The catalog fetch runs on
    /// its own task; the actor parks joins until the seed arrives.
    pub fn resolve_or_create(
        &self,
        room_id: &RoomId,
        location: Option<GeoPoint>,
        radius_miles: Option<f64>,
    ) -> (RoomHandle, broadcast::Receiver<RoomEvent>, bool) {
        let (handle, rx, created) = match self.rooms.entry(room_id.clone()) {
            Entry::Occupied(entry) => {
                let handle = entry.get().clone();
                let rx = handle.subscribe();
                (handle, rx, false)
            },
            Entry::Vacant(entry) => {
                let handle = spawn_room_actor(room_id);
                let rx = handle.subscribe();
                entry.insert(handle.clone());
                (handle, rx, true)
            },
        };

        if created {
            self.reserved.remove(room_id);
            counter!(ROOM_CREATED).increment(1);
            gauge!(ROOM_ACTIVE).set(self.rooms.len() as f64);

            let catalog = Arc::clone(&self.catalog);
            let seed_handle = handle.clone();
            let room_id = room_id.clone();
            tokio::spawn(async move {
                match fetch_restaurants(catalog.as_ref(), location, radius_miles).await {
                    Ok(fetch) => {
                        if fetch.rate_limited {
                            counter!(CATALOG_RATE_LIMITED).increment(1);
                        }
                        info!(
                            room_id = %room_id,
                            restaurants = fetch.restaurants.len(),
                            rate_limited = fetch.rate_limited,
                            "seeding room"
                        );
                        seed_handle.seed(fetch.restaurants, fetch.rate_limited);
                    },
                    Err(err) => {
                        warn!(
                            room_id = %room_id,
                            error = %err,
                            "restaurant fetch failed; seeding room degraded"
                        );
                        seed_handle.seed(Vec::new(), true);
                    },
                }
            });
        }

        (handle, rx, created)
    }

    /// Drop rooms with no live connections and prune expired reservations.
    /// Driven by disconnects; safe to call at any time.
    pub fn reconcile(&self) {
        self.rooms.retain(|room_id, handle| {
            let live = handle.live_connections() > 0;
            if !live {
                info!(room_id = %room_id, "reclaiming empty room");
                counter!(ROOM_RECLAIMED).increment(1);
            }
            live
        });
        gauge!(ROOM_ACTIVE).set(self.rooms.len() as f64);

        let ttl = self.reservation_ttl;
        self.reserved.retain(|_, reserved_at| reserved_at.elapsed() < ttl);
    }

    fn generate_code(&self) -> RoomId {
        let mut rng = rand::rng();
        (0..self.id_length)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}
