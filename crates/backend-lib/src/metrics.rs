// ==============
// munch-backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_RECLAIMED: &str = "room.reclaimed";
pub const ROOM_ACTIVE: &str = "room.active";
pub const SWIPE_RECORDED: &str = "swipe.recorded";
pub const SWIPE_UNDONE: &str = "swipe.undone";
pub const MATCH_FOUND: &str = "match.found";
pub const CATALOG_RATE_LIMITED: &str = "catalog.rate_limited";
