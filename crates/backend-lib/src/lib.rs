// ============================
// munch-backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the `munch` group-swipe server.

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod room;
pub mod room_actor;
pub mod ws_router;

use std::sync::Arc;

use crate::catalog::RestaurantCatalog;
use crate::config::Settings;
use crate::registry::RoomRegistry;

/// Application state shared across all handlers
pub struct AppState {
    /// Directory of live rooms
    pub registry: RoomRegistry,
    /// Settings manager
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create a new application state
    pub fn new(catalog: Arc<dyn RestaurantCatalog>, settings: Settings) -> Self {
        let registry = RoomRegistry::new(catalog, &settings.room);
        Self {
            registry,
            settings: Arc::new(settings),
        }
    }
}
