// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between the `munch` client and server.
//! This module defines the WebSocket protocol messages and supporting types.

use serde::{Deserialize, Serialize};

/// A candidate restaurant being voted on.
///
/// Identity is the external `place_id`; the room-scoped positional index is
/// what all vote operations key on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Restaurant {
    /// Stable external reference id
    pub place_id: String,
    /// Display name
    pub name: String,
    /// Average rating, if the upstream listing carries one
    pub rating: Option<f64>,
    /// Price tier (0-4)
    pub price_level: Option<u8>,
    /// Total review count
    pub user_ratings_total: Option<u64>,
    /// Enrichment payload; arrives after the list is first published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<RestaurantDetails>,
}

/// Enrichment payload filled in once detail fetching completes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RestaurantDetails {
    pub address: Option<String>,
    #[serde(default)]
    pub hours: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub reviews: Vec<String>,
}

/// A latitude/longitude pair used as the room's location hint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Aggregate like/dislike totals for one restaurant index.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteCounts {
    pub likes: u32,
    pub dislikes: u32,
}

/// Direction of a swipe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Like,
    Dislike,
}

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "msgType")]
pub enum ClientToServer {
    /// Join a room, creating it if the id is not live yet
    /// # Fields
    /// * `room_id` - Short room code (case-insensitive)
    /// * `latitude`/`longitude`/`radius` - Location hint used only when this
    ///   join creates the room; radius is in miles
    JoinRoom {
        room_id: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
        radius: Option<f64>,
    },
    /// Vote on the restaurant at `index`
    Swipe {
        index: usize,
        direction: SwipeDirection,
    },
    /// Retract this member's vote at `index`
    Undo { index: usize },
    /// Replace the room's restaurant list with its enriched counterpart.
    /// Sent by the creating client once detail fetching completes; must keep
    /// the original order and length.
    RestaurantsReady {
        room_id: String,
        restaurants: Vec<Restaurant>,
    },
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "msgType")]
pub enum ServerToClient {
    /// Response to a successful join
    RoomJoined {
        /// Normalized room code
        room_id: String,
        /// Whether this join created the room
        created: bool,
        /// Current restaurant order (possibly pre-enrichment)
        restaurants: Vec<Restaurant>,
        /// Current aggregate tallies, one entry per restaurant
        counts: Vec<VoteCounts>,
        /// Whether the enriched list has been applied
        details_ready: bool,
        /// The restaurant lookup failed or was rate-limited; the list above
        /// may be empty or partial for that reason rather than because
        /// nothing is nearby
        upstream_unavailable: bool,
    },
    /// Room-wide fan-out after every accepted swipe or undo
    TallyUpdated { counts: Vec<VoteCounts> },
    /// Room-wide fan-out when every current member has liked one restaurant
    MatchFound { restaurant: Restaurant },
    /// Error response for unparseable frames
    MalformedMessage { err_msg: String },
    /// Rejected operation; sent only to the offending connection
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let join = ClientToServer::JoinRoom {
            room_id: "AB12".to_string(),
            latitude: Some(40.7),
            longitude: Some(-74.0),
            radius: Some(5.0),
        };

        let json = serde_json::to_string(&join).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["msgType"], "JoinRoom");
        assert_eq!(parsed["room_id"], "AB12");
        assert_eq!(parsed["radius"], 5.0);

        let roundtrip: ClientToServer = serde_json::from_str(&json).unwrap();
        match roundtrip {
            ClientToServer::JoinRoom { room_id, .. } => assert_eq!(room_id, "AB12"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_swipe_direction_wire_format() {
        let swipe = ClientToServer::Swipe {
            index: 2,
            direction: SwipeDirection::Like,
        };

        let json = serde_json::to_string(&swipe).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["direction"], "like");

        let undo: ClientToServer = serde_json::from_str(r#"{"msgType":"Undo","index":0}"#).unwrap();
        assert!(matches!(undo, ClientToServer::Undo { index: 0 }));
    }

    #[test]
    fn test_restaurant_details_optional() {
        let bare = r#"{"place_id":"p1","name":"Amici","rating":4.5,"price_level":2,"user_ratings_total":120}"#;
        let restaurant: Restaurant = serde_json::from_str(bare).unwrap();
        assert!(restaurant.details.is_none());

        // details are omitted from the wire until enrichment fills them in
        let json = serde_json::to_string(&restaurant).unwrap();
        assert!(!json.contains("details"));
    }
}
