// src/planning/update.rs

//! The keyed, re-entrant update protocol.
//!
//! An update round recomputes `{valid, messages}` of the object it starts
//! from and of every neighbour that object's refresh step reaches. The round
//! key is recorded on each object before its refresh runs, so an object is
//! refreshed at most once per round and cyclic topologies terminate.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::planning::session::{PlanningSession, RoundKey};

/// Cached outcome of the last refresh of one object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// `None` until the object took part in a round.
    pub valid: Option<bool>,
    pub messages: Vec<String>,
    pub last_round: Option<RoundKey>,
}

impl UpdateStatus {
    pub fn is_valid(&self) -> bool {
        self.valid == Some(true)
    }

    pub(crate) fn set(&mut self, valid: bool, messages: Vec<String>) {
        self.valid = Some(valid);
        self.messages = messages;
    }
}

/// A container of updateable objects addressed by `Item`.
///
/// Implementors supply the per-object refresh step and the bookkeeping
/// accessors; [`Updateable::update`] drives the protocol.
pub trait Updateable {
    type Item: Copy + Debug;

    fn session(&self) -> Arc<PlanningSession>;

    /// Global suspend switch; while `false` every update is a no-op.
    fn updating_enabled(&self) -> bool;

    fn active_round(&self) -> Option<RoundKey>;

    fn set_active_round(&mut self, key: Option<RoundKey>);

    fn status(&self, item: Self::Item) -> Option<&UpdateStatus>;

    fn status_mut(&mut self, item: Self::Item) -> Option<&mut UpdateStatus>;

    /// Recompute the status of `item` and update its neighbours with the
    /// same key.
    fn refresh(&mut self, item: Self::Item, key: RoundKey, forward: bool, backward: bool);

    /// Run (or join) an update round for `item`.
    ///
    /// Without a key a new round is started: a fresh key is minted and the
    /// session's round lock is held until the round is complete. A keyless
    /// call made while a round is already running on this container joins
    /// that round. Returns the key used, or `None` when updating is
    /// suspended or `item` no longer exists.
    fn update(
        &mut self,
        item: Self::Item,
        key: Option<RoundKey>,
        forward: bool,
        backward: bool,
    ) -> Option<RoundKey> {
        if !self.updating_enabled() || self.status(item).is_none() {
            return None;
        }

        let session = self.session();
        let mut _round_guard = None;
        let mut owner = false;

        let key = match key.or_else(|| self.active_round()) {
            Some(key) => key,
            None => {
                _round_guard = Some(session.lock_round());
                let key = RoundKey::new();
                self.set_active_round(Some(key));
                owner = true;
                debug!(round = %key, ?item, "starting update round");
                key
            }
        };

        let status = self.status_mut(item)?;
        if status.last_round == Some(key) {
            trace!(round = %key, ?item, "already visited in this round");
            return Some(key);
        }
        status.last_round = Some(key);

        self.refresh(item, key, forward, backward);

        if owner {
            self.set_active_round(None);
            debug!(round = %key, "update round finished");
        }

        Some(key)
    }
}
