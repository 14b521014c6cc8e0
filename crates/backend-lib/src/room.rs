// ============================
// munch-backend-lib/src/room.rs
// ============================
//! A single voting session: restaurant order, membership, and the match
//! rule. Owned exclusively by its room actor, so every method here runs
//! inside one serialization domain and no operation does I/O.

use munch_common::{Restaurant, SwipeDirection, VoteCounts};
use rand::seq::SliceRandom;
use tracing::error;

use crate::error::AppError;
use crate::ledger::{MemberId, VoteLedger};
use crate::registry::RoomId;

/// Result of a swipe: the room-wide tallies to fan out, plus the matched
/// restaurant when this swipe completed a unanimous like.
#[derive(Debug, Clone)]
pub struct SwipeOutcome {
    pub counts: Vec<VoteCounts>,
    pub matched: Option<Restaurant>,
}

/// State sent to a member on join.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub restaurants: Vec<Restaurant>,
    pub counts: Vec<VoteCounts>,
    pub details_ready: bool,
    pub upstream_unavailable: bool,
}

pub struct Room {
    room_id: RoomId,
    restaurants: Vec<Restaurant>,
    details_ready: bool,
    upstream_unavailable: bool,
    ledger: VoteLedger,
    /// Set when an aggregate/ledger divergence is detected; the room keeps
    /// serving votes but stops firing matches.
    match_disabled: bool,
}

impl Room {
    /// Snapshot the restaurant list as this room's immutable order. The list
    /// is shuffled exactly once, here; it is never reordered afterwards.
    pub fn create(
        room_id: RoomId,
        mut restaurants: Vec<Restaurant>,
        upstream_unavailable: bool,
    ) -> Self {
        restaurants.shuffle(&mut rand::rng());
        let ledger = VoteLedger::new(restaurants.len());

        Room {
            room_id,
            restaurants,
            details_ready: false,
            upstream_unavailable,
            ledger,
            match_disabled: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn member_count(&self) -> usize {
        self.ledger.member_count()
    }

    pub fn counts(&self) -> &[VoteCounts] {
        self.ledger.counts()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            restaurants: self.restaurants.clone(),
            counts: self.ledger.counts().to_vec(),
            details_ready: self.details_ready,
            upstream_unavailable: self.upstream_unavailable,
        }
    }

    /// Add a member. Late joiners see the current order and current
    /// tallies; nothing is replayed for them.
    pub fn join(&mut self, member: MemberId) {
        self.ledger.add_member(member);
    }

    /// Remove a member, keeping their aggregate contribution (the member
    /// count used by match detection drops, the tallies do not).
    /// Returns the remaining member count.
    pub fn leave(&mut self, member: &MemberId) -> usize {
        self.ledger.remove_member(member);
        self.ledger.member_count()
    }

    /// Record a vote and evaluate the match rule in the same step.
    ///
    /// A match fires when a state-changing like pushes the like count to
    /// exactly the current member count, with at least two members present.
    /// Duplicate swipes change nothing and never re-fire a match.
    pub fn swipe(
        &mut self,
        member: &MemberId,
        index: usize,
        direction: SwipeDirection,
    ) -> Result<SwipeOutcome, AppError> {
        let (counts, changed) = self.ledger.record_swipe(member, index, direction)?;
        self.check_consistency(index);

        let members = self.ledger.member_count();
        let matched = if changed
            && direction == SwipeDirection::Like
            && !self.match_disabled
            && members >= 2
            && counts.likes as usize == members
        {
            Some(self.restaurants[index].clone())
        } else {
            None
        };

        Ok(SwipeOutcome {
            counts: self.ledger.counts().to_vec(),
            matched,
        })
    }

    /// Retract a vote. Undo only moves counts downward, so it never
    /// triggers match detection.
    pub fn undo(&mut self, member: &MemberId, index: usize) -> Result<Vec<VoteCounts>, AppError> {
        self.ledger.undo_swipe(member, index)?;
        self.check_consistency(index);
        Ok(self.ledger.counts().to_vec())
    }

    /// One-shot replacement of the restaurant list with its enriched
    /// counterpart. Index alignment is load-bearing: every in-flight vote
    /// is keyed by position, so the upgrade must keep order and length.
    pub fn upgrade_restaurants(&mut self, restaurants: Vec<Restaurant>) -> Result<(), AppError> {
        if self.details_ready {
            return Err(AppError::InvalidOperation(
                "restaurant details were already applied".to_string(),
            ));
        }

        if restaurants.len() != self.restaurants.len() {
            return Err(AppError::InvalidOperation(format!(
                "enriched list has {} restaurants, room has {}",
                restaurants.len(),
                self.restaurants.len()
            )));
        }

        for (current, enriched) in self.restaurants.iter().zip(&restaurants) {
            if current.place_id != enriched.place_id {
                return Err(AppError::InvalidOperation(
                    "enriched list is not aligned with the room's order".to_string(),
                ));
            }
        }

        self.restaurants = restaurants;
        self.details_ready = true;
        Ok(())
    }

    /// Aggregate/ledger divergence must never pass silently: assert in
    /// development, degrade to no-match-detection in production.
    fn check_consistency(&mut self, index: usize) {
        if self.ledger.verify(index) {
            return;
        }

        debug_assert!(false, "vote tally diverged from ledger at index {index}");
        error!(
            room_id = %self.room_id,
            index,
            "vote tally diverged from ledger; disabling match detection for this room"
        );
        self.match_disabled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn restaurants(names: &[&str]) -> Vec<Restaurant> {
        names
            .iter()
            .map(|name| Restaurant {
                place_id: format!("place-{name}"),
                name: (*name).to_string(),
                rating: Some(4.0),
                price_level: Some(2),
                user_ratings_total: Some(100),
                details: None,
            })
            .collect()
    }

    #[test]
    fn test_create_shuffles_once_and_keeps_every_restaurant() {
        let source = restaurants(&["a", "b", "c", "d", "e"]);
        let room = Room::create("AB12".to_string(), source.clone(), false);

        let snapshot = room.snapshot();
        assert_eq!(snapshot.restaurants.len(), source.len());
        for restaurant in &source {
            assert!(snapshot.restaurants.contains(restaurant));
        }

        // the order is frozen at creation: every later snapshot agrees
        assert_eq!(room.snapshot().restaurants, snapshot.restaurants);
    }

    #[test]
    fn test_match_requires_every_member() {
        let mut room = Room::create("AB12".to_string(), restaurants(&["x", "y", "z"]), false);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        room.join(m1);
        room.join(m2);

        let outcome = room.swipe(&m1, 1, SwipeDirection::Like).unwrap();
        assert!(outcome.matched.is_none());

        let outcome = room.swipe(&m2, 1, SwipeDirection::Like).unwrap();
        let matched = outcome.matched.expect("second like completes the match");
        assert_eq!(matched, room.snapshot().restaurants[1]);
        assert_eq!(outcome.counts[1].likes, 2);
    }

    #[test]
    fn test_lone_member_never_matches() {
        let mut room = Room::create("AB12".to_string(), restaurants(&["x", "y"]), false);
        let m1 = Uuid::new_v4();
        room.join(m1);

        for index in 0..2 {
            let outcome = room.swipe(&m1, index, SwipeDirection::Like).unwrap();
            assert!(outcome.matched.is_none());
        }
    }

    #[test]
    fn test_duplicate_like_does_not_refire_match() {
        let mut room = Room::create("AB12".to_string(), restaurants(&["x", "y"]), false);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        room.join(m1);
        room.join(m2);

        room.swipe(&m1, 0, SwipeDirection::Like).unwrap();
        assert!(room.swipe(&m2, 0, SwipeDirection::Like).unwrap().matched.is_some());

        // a replayed like is idempotent: no tally change, no second match
        let outcome = room.swipe(&m2, 0, SwipeDirection::Like).unwrap();
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.counts[0].likes, 2);
    }

    #[test]
    fn test_undo_lowers_tally_without_match() {
        let mut room = Room::create("AB12".to_string(), restaurants(&["x", "y"]), false);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        room.join(m1);
        room.join(m2);

        room.swipe(&m1, 0, SwipeDirection::Like).unwrap();
        room.swipe(&m2, 0, SwipeDirection::Like).unwrap();

        let counts = room.undo(&m1, 0).unwrap();
        assert_eq!(counts[0].likes, 1);
    }

    #[test]
    fn test_leave_keeps_tallies_but_shrinks_denominator() {
        let mut room = Room::create("AB12".to_string(), restaurants(&["x", "y"]), false);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let m3 = Uuid::new_v4();
        room.join(m1);
        room.join(m2);
        room.join(m3);

        room.swipe(&m1, 0, SwipeDirection::Like).unwrap();
        room.swipe(&m2, 0, SwipeDirection::Like).unwrap();

        // m2 leaves; their like stays in the tally
        assert_eq!(room.leave(&m2), 2);
        assert_eq!(room.counts()[0].likes, 2);

        // the departure alone fires nothing; m3's like overshoots the
        // member count, so no match fires for this index anymore
        let outcome = room.swipe(&m3, 0, SwipeDirection::Like).unwrap();
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.counts[0].likes, 3);
    }

    #[test]
    fn test_upgrade_is_one_shot_and_alignment_checked() {
        let mut room = Room::create("AB12".to_string(), restaurants(&["x", "y"]), false);
        let m1 = Uuid::new_v4();
        room.join(m1);

        let order = room.snapshot().restaurants;
        let mut enriched = order.clone();
        for restaurant in &mut enriched {
            restaurant.details = Some(munch_common::RestaurantDetails {
                address: Some("1 Main St".to_string()),
                ..Default::default()
            });
        }

        // wrong length is rejected before anything changes
        let err = room.upgrade_restaurants(enriched[..1].to_vec()).unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));
        assert!(!room.snapshot().details_ready);

        // misaligned ids are rejected too
        let mut reversed = enriched.clone();
        reversed.reverse();
        let err = room.upgrade_restaurants(reversed).unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));

        room.upgrade_restaurants(enriched.clone()).unwrap();
        let snapshot = room.snapshot();
        assert!(snapshot.details_ready);
        assert!(snapshot.restaurants[0].details.is_some());

        // second application is rejected
        let err = room.upgrade_restaurants(enriched).unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));
    }
}
