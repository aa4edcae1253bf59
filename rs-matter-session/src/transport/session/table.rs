/*
 *
 *    Copyright (c) 2020-2024 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use core::fmt;

use log::{debug, info, warn};

use crate::error::*;
use crate::fabric::{FabricIndex, ScopedNodeId};
use crate::transport::mrp::ReliableMessageConfig;
use crate::utils::epoch::Epoch;

use super::eviction::{self, EvictionCandidate, EvictionCandidates};
use super::holder::{HolderRegistry, SessionDelegate, SessionHolder};
use super::{NocCatIds, SecureSessionType, Session, SessionHandle, MAX_SESSIONS};

struct SessionSlot {
    /// Bumped every time the slot is freed, so that handles to
    /// the previous occupant stop resolving
    generation: u32,
    session: Option<Session>,
}

/// A fixed-capacity table of secure sessions.
///
/// The table owns all session storage. When it is full, creating a new session evicts
/// an existing one (see the `eviction` module for how the victim is chosen), and every
/// holder bound to the evicted session is notified through its [`SessionDelegate`].
///
/// All mutation goes through `&mut self`: the table is meant to be owned by the single
/// task driving the transport, and it does no locking of its own.
pub struct SecureSessionTable<'d> {
    slots: heapless::Vec<SessionSlot, MAX_SESSIONS>,
    holders: HolderRegistry<'d>,
    max_sessions: usize,
    next_sess_id: u16,
    epoch: Epoch,
}

impl<'d> SecureSessionTable<'d> {
    /// Create a new session table.
    ///
    /// The table has no capacity until [`Self::init`] is called.
    #[inline(always)]
    pub const fn new(epoch: Epoch) -> Self {
        Self {
            slots: heapless::Vec::new(),
            holders: HolderRegistry::new(),
            max_sessions: 0,
            next_sess_id: 1,
            epoch,
        }
    }

    /// Configure the maximum number of concurrent sessions.
    ///
    /// Any existing session is released (notifying its holders), so no sessions exist
    /// after this call.
    pub fn init(&mut self, capacity: usize) -> Result<(), Error> {
        if capacity > MAX_SESSIONS {
            Err(ErrorCode::InvalidArgument)?;
        }

        self.release_where(|_| true);

        self.max_sessions = capacity;
        self.next_sess_id = 1;

        info!("Session table initialized with capacity {}", capacity);

        Ok(())
    }

    /// Change the maximum number of concurrent sessions without touching the existing ones.
    ///
    /// Fails with `InvalidState` if more sessions than `size` are currently live.
    pub fn set_max_session_table_size(&mut self, size: usize) -> Result<(), Error> {
        if size > MAX_SESSIONS {
            Err(ErrorCode::InvalidArgument)?;
        }

        if size < self.len() {
            Err(ErrorCode::InvalidState)?;
        }

        debug!(
            "Session table capacity changed from {} to {}",
            self.max_sessions, size
        );

        self.max_sessions = size;

        Ok(())
    }

    pub const fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_sessions
    }

    /// Allocate a new session in the `Establishing` state.
    ///
    /// If the table is full, one existing session is evicted first. `eviction_hint` is
    /// the peer the new session is going to be established with (or
    /// [`ScopedNodeId::undefined`] if not known yet) and is used to bias the choice of
    /// the evicted session.
    ///
    /// Return `None` if the table has no capacity at all.
    pub fn create_new_secure_session(
        &mut self,
        session_type: SecureSessionType,
        eviction_hint: ScopedNodeId,
    ) -> Option<SessionHandle> {
        if self.max_sessions == 0 {
            warn!(
                "Session table has no capacity; cannot create a {:?} session",
                session_type
            );
            return None;
        }

        if self.is_full() {
            let victim = self.eviction_candidate(&eviction_hint)?;

            if let Some(sess) = self.get(victim) {
                info!(
                    "Evicting session {{ {} }} to make room for a new {:?} session (hint: {})",
                    sess, session_type, eviction_hint
                );
            }

            self.release(victim);
        }

        assert!(
            self.len() < self.max_sessions,
            "Session table over capacity"
        );

        self.allocate(session_type)
    }

    /// The session which would be evicted if a session were created now with `hint`
    pub fn eviction_candidate(&self, hint: &ScopedNodeId) -> Option<SessionHandle> {
        let mut candidates = EvictionCandidates::new();
        candidates.extend(self.iter().map(EvictionCandidate::from));

        let index = eviction::select_eviction_candidate(&mut candidates, hint)?;

        self.slots[index].session.as_ref().map(Session::handle)
    }

    /// Complete the establishment of a session.
    ///
    /// Once a CASE session is active, the holders of older CASE sessions to the same peer
    /// which asked for it (see [`super::NewSessionHandlingPolicy`]) are moved to it.
    pub fn activate(
        &mut self,
        handle: SessionHandle,
        local: ScopedNodeId,
        peer: ScopedNodeId,
        peer_cat_ids: NocCatIds,
        peer_sess_id: u16,
        mrp_config: ReliableMessageConfig,
    ) -> Result<(), Error> {
        let now = (self.epoch)();

        let session = self.get_mut(handle).ok_or(ErrorCode::NoSession)?;
        session.activate(local, peer, peer_cat_ids, peer_sess_id, mrp_config, now)?;

        let session_type = session.session_type();

        debug!(
            "Session {}: activated {:?} session with peer {}",
            handle, session_type, peer
        );

        if session_type == SecureSessionType::Case {
            self.newer_session_available(handle, &peer);
        }

        Ok(())
    }

    fn newer_session_available(&mut self, newer: SessionHandle, peer: &ScopedNodeId) {
        let Self { slots, holders, .. } = self;

        for older in slots
            .iter()
            .filter_map(|slot| slot.session.as_ref())
            .filter(|sess| {
                sess.handle() != newer
                    && sess.session_type() == SecureSessionType::Case
                    && sess.is_for_node(peer)
            })
        {
            let shifted = holders.shift(older.handle(), newer);

            if shifted > 0 {
                debug!(
                    "Shifted {} holder(s) from session {} to newer session {}",
                    shifted,
                    older.handle(),
                    newer
                );
            }
        }
    }

    pub fn get(&self, handle: SessionHandle) -> Option<&Session> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut Session> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_mut())
    }

    pub fn find_by_local_session_id(&self, local_sess_id: u16) -> Option<SessionHandle> {
        self.iter()
            .find(|sess| sess.get_local_sess_id() == local_sess_id)
            .map(Session::handle)
    }

    /// Find the most recently used active session to `peer`, optionally restricted
    /// to one session type.
    pub fn find_session_for_node(
        &self,
        peer: &ScopedNodeId,
        session_type: Option<SecureSessionType>,
    ) -> Option<SessionHandle> {
        self.iter()
            .filter(|sess| {
                sess.is_active()
                    && sess.get_peer() == *peer
                    && session_type.map_or(true, |ty| sess.session_type() == ty)
            })
            .max_by_key(|sess| sess.last_activity_time())
            .map(Session::handle)
    }

    /// Refresh the activity of a session after receiving a message on it
    pub fn mark_active_rx(&mut self, handle: SessionHandle) -> Result<(), Error> {
        let now = (self.epoch)();

        self.get_mut(handle)
            .ok_or(ErrorCode::NoSession)?
            .mark_active_rx(now);

        Ok(())
    }

    pub fn mark_as_defunct(&mut self, handle: SessionHandle) -> Result<(), Error> {
        self.get_mut(handle)
            .ok_or(ErrorCode::NoSession)?
            .mark_as_defunct()
    }

    /// Mark all active sessions to `peer` as defunct.
    ///
    /// Return the number of sessions which changed state.
    pub fn mark_sessions_as_defunct(&mut self, peer: &ScopedNodeId) -> usize {
        let mut marked = 0;

        for sess in self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.session.as_mut())
            .filter(|sess| sess.is_active() && sess.get_peer() == *peer)
        {
            // Cannot fail for an active session
            if sess.mark_as_defunct().is_ok() {
                marked += 1;
            }
        }

        marked
    }

    /// Release a session, notifying all of its holders.
    ///
    /// Return `false` if the handle does not refer to a live session.
    pub fn release(&mut self, handle: SessionHandle) -> bool {
        if self.get(handle).is_none() {
            return false;
        }

        let notified = self.holders.notify_released(handle);

        let slot = &mut self.slots[handle.index];
        slot.session = None;
        slot.generation = slot.generation.wrapping_add(1);

        debug!(
            "Session {} released, {} holder(s) notified",
            handle, notified
        );

        true
    }

    /// Release all established sessions to `peer`.
    pub fn expire_all_sessions(&mut self, peer: &ScopedNodeId) -> usize {
        let expired = self.release_where(|sess| sess.is_for_node(peer));

        info!("Expired {} session(s) to peer {}", expired, peer);

        expired
    }

    /// Release all established sessions on a fabric, e.g. because the fabric was removed.
    pub fn expire_all_sessions_for_fabric(&mut self, fab_idx: FabricIndex) -> usize {
        let expired = self
            .release_where(|sess| !sess.is_establishing() && sess.get_fabric_idx() == fab_idx);

        info!(
            "Expired {} session(s) for fabric index {}",
            expired, fab_idx
        );

        expired
    }

    pub fn expire_all_pase_sessions(&mut self) -> usize {
        let expired = self.release_where(|sess| sess.session_type() == SecureSessionType::Pase);

        info!("Expired {} PASE session(s)", expired);

        expired
    }

    /// Iterate over the live sessions
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().filter_map(|slot| slot.session.as_ref())
    }

    /// Register a new holder, optionally with a delegate to be notified when
    /// the session it is bound to goes away. The holder starts unbound.
    pub fn register_holder(
        &mut self,
        delegate: Option<&'d dyn SessionDelegate>,
    ) -> Result<SessionHolder, Error> {
        self.holders.register(delegate).inspect_err(|_| {
            warn!("No space for a new session holder");
        })
    }

    pub fn unregister_holder(&mut self, holder: SessionHolder) -> Result<(), Error> {
        self.holders.unregister(holder)
    }

    /// Bind the holder to a live session, replacing any previous binding
    /// (the previous session is not notified).
    pub fn grab(&mut self, holder: &SessionHolder, handle: SessionHandle) -> Result<(), Error> {
        if self.get(handle).is_none() {
            Err(ErrorCode::NoSession)?;
        }

        self.holders.bind(holder, Some(handle))?;

        Ok(())
    }

    /// Unbind the holder without any notification.
    pub fn release_holder(&mut self, holder: &SessionHolder) -> Result<(), Error> {
        self.holders.bind(holder, None)?;

        Ok(())
    }

    /// The session the holder is currently bound to, if any
    pub fn holder_session(&self, holder: &SessionHolder) -> Result<Option<SessionHandle>, Error> {
        Ok(self
            .holders
            .session(holder)?
            .filter(|handle| self.get(*handle).is_some()))
    }

    /// Number of holders currently bound to the session
    pub fn holders_of(&self, handle: SessionHandle) -> usize {
        self.holders.bound_to(handle)
    }

    fn allocate(&mut self, session_type: SecureSessionType) -> Option<SessionHandle> {
        let index = if let Some(index) = self.slots.iter().position(|slot| slot.session.is_none())
        {
            index
        } else {
            self.slots
                .push(SessionSlot {
                    generation: 0,
                    session: None,
                })
                .ok()?;

            self.slots.len() - 1
        };

        let local_sess_id = self.get_next_sess_id();
        let now = (self.epoch)();

        let slot = &mut self.slots[index];
        let handle = SessionHandle::new(index, slot.generation);

        slot.session = Some(Session::new(handle, session_type, local_sess_id, now));

        debug!(
            "New {:?} session {} [SID:{:x}]",
            session_type, handle, local_sess_id
        );

        Some(handle)
    }

    fn release_where<F>(&mut self, f: F) -> usize
    where
        F: Fn(&Session) -> bool,
    {
        let victims: heapless::Vec<SessionHandle, MAX_SESSIONS> = self
            .iter()
            .filter(|sess| f(sess))
            .map(Session::handle)
            .collect();

        victims
            .into_iter()
            .filter(|handle| self.release(*handle))
            .count()
    }

    /// Return a non-zero local session ID not used by any live session
    pub fn get_next_sess_id(&mut self) -> u16 {
        let mut next_sess_id: u16;
        loop {
            next_sess_id = self.next_sess_id;

            // Increment next sess id
            self.next_sess_id = self.next_sess_id.overflowing_add(1).0;
            if self.next_sess_id == 0 {
                self.next_sess_id = 1;
            }

            // Ensure the currently selected id doesn't match any existing session
            if self
                .iter()
                .all(|sess| sess.get_local_sess_id() != next_sess_id)
            {
                break;
            }
        }
        next_sess_id
    }
}

impl fmt::Display for SecureSessionTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{[")?;
        for s in self.iter() {
            writeln!(f, "{{ {}, }},", s)?;
        }
        write!(
            f,
            "], capacity: {}, next_sess_id: {}",
            self.max_sessions, self.next_sess_id
        )?;
        write!(f, "}}")
    }
}
