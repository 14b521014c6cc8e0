// ============================
// munch-backend-lib/src/ledger.rs
// ============================
//! Per-room vote bookkeeping.
//!
//! The ledger tracks one [`VoteState`] per (member, restaurant index) pair
//! and the aggregate like/dislike tallies derived from them. All mutation
//! goes through [`record_swipe`](VoteLedger::record_swipe) /
//! [`undo_swipe`](VoteLedger::undo_swipe), which update the member vector
//! and the aggregates together so the two views cannot drift.
//!
//! When a member is removed their vector is dropped but their aggregate
//! contribution stays in the tallies; the retained portion is tracked in
//! `retired` so [`verify`](VoteLedger::verify) stays exact.

use std::collections::HashMap;

use munch_common::{SwipeDirection, VoteCounts};
use uuid::Uuid;

use crate::error::AppError;

/// Opaque per-connection member handle.
pub type MemberId = Uuid;

/// One member's vote on one restaurant index.
///
/// Legal transitions: `Unvoted -> Liked`, `Unvoted -> Disliked`, and
/// `{Liked,Disliked} -> Unvoted` (undo). A direct flip between `Liked` and
/// `Disliked` never happens without an intervening undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteState {
    #[default]
    Unvoted,
    Liked,
    Disliked,
}

/// Vote state for all members of one room.
pub struct VoteLedger {
    item_count: usize,
    members: HashMap<MemberId, Box<[VoteState]>>,
    tallies: Vec<VoteCounts>,
    /// Aggregate contributions of members who have left.
    retired: Vec<VoteCounts>,
}

impl VoteLedger {
    pub fn new(item_count: usize) -> Self {
        VoteLedger {
            item_count,
            members: HashMap::new(),
            tallies: vec![VoteCounts::default(); item_count],
            retired: vec![VoteCounts::default(); item_count],
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains_key(member)
    }

    /// Insert a fresh all-`Unvoted` vector for `member`. Rejoining after a
    /// leave starts from scratch; any earlier contribution stays retired.
    pub fn add_member(&mut self, member: MemberId) {
        self.members
            .insert(member, vec![VoteState::Unvoted; self.item_count].into_boxed_slice());
    }

    /// Drop `member`'s vote vector, retiring their aggregate contribution.
    /// Returns whether the member was present.
    pub fn remove_member(&mut self, member: &MemberId) -> bool {
        let Some(votes) = self.members.remove(member) else {
            return false;
        };

        for (index, state) in votes.iter().enumerate() {
            match state {
                VoteState::Liked => self.retired[index].likes += 1,
                VoteState::Disliked => self.retired[index].dislikes += 1,
                VoteState::Unvoted => {},
            }
        }

        true
    }

    /// Record a vote. Duplicate events for an already-voted index are
    /// ignored rather than double-counted, since clients may retry.
    ///
    /// Returns the updated tally for `index` and whether any state changed.
    pub fn record_swipe(
        &mut self,
        member: &MemberId,
        index: usize,
        direction: SwipeDirection,
    ) -> Result<(VoteCounts, bool), AppError> {
        self.check_index(index)?;
        let votes = self.members.get_mut(member).ok_or(AppError::UnknownMember)?;

        if votes[index] != VoteState::Unvoted {
            return Ok((self.tallies[index], false));
        }

        match direction {
            SwipeDirection::Like => {
                votes[index] = VoteState::Liked;
                self.tallies[index].likes += 1;
            },
            SwipeDirection::Dislike => {
                votes[index] = VoteState::Disliked;
                self.tallies[index].dislikes += 1;
            },
        }

        Ok((self.tallies[index], true))
    }

    /// Retract a vote. A no-op when the member has not voted on `index`.
    ///
    /// Returns the updated tally for `index` and whether any state changed.
    pub fn undo_swipe(
        &mut self,
        member: &MemberId,
        index: usize,
    ) -> Result<(VoteCounts, bool), AppError> {
        self.check_index(index)?;
        let votes = self.members.get_mut(member).ok_or(AppError::UnknownMember)?;

        let changed = match votes[index] {
            VoteState::Liked => {
                self.tallies[index].likes -= 1;
                true
            },
            VoteState::Disliked => {
                self.tallies[index].dislikes -= 1;
                true
            },
            VoteState::Unvoted => false,
        };

        if changed {
            votes[index] = VoteState::Unvoted;
        }

        Ok((self.tallies[index], changed))
    }

    pub fn counts(&self) -> &[VoteCounts] {
        &self.tallies
    }

    pub fn counts_at(&self, index: usize) -> Result<VoteCounts, AppError> {
        self.check_index(index)?;
        Ok(self.tallies[index])
    }

    /// Check that the tally at `index` equals the recount over current
    /// member vectors plus the retired contribution.
    pub fn verify(&self, index: usize) -> bool {
        let mut recount = self.retired[index];
        for votes in self.members.values() {
            match votes[index] {
                VoteState::Liked => recount.likes += 1,
                VoteState::Disliked => recount.dislikes += 1,
                VoteState::Unvoted => {},
            }
        }
        recount == self.tallies[index]
    }

    fn check_index(&self, index: usize) -> Result<(), AppError> {
        if index >= self.item_count {
            return Err(AppError::IndexOutOfRange {
                index,
                count: self.item_count,
            });
        }
        Ok(())
    }
}
