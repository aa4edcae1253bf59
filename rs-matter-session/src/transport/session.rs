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
use core::time::Duration;

use cfg_if::cfg_if;

use log::debug;

use crate::error::*;
use crate::fabric::{FabricIndex, ScopedNodeId};

use super::mrp::ReliableMessageConfig;

pub use eviction::*;
pub use holder::*;
pub use table::*;

mod eviction;
mod holder;
mod table;

pub const MAX_CAT_IDS_PER_NOC: usize = 3;
pub type NocCatIds = [u32; MAX_CAT_IDS_PER_NOC];

cfg_if! {
    if #[cfg(feature = "max-sessions-64")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 64;
    } else if #[cfg(feature = "max-sessions-32")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 32;
    } else if #[cfg(feature = "max-sessions-16")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 16;
    } else if #[cfg(feature = "max-sessions-8")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 8;
    } else if #[cfg(feature = "max-sessions-7")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 7;
    } else if #[cfg(feature = "max-sessions-6")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 6;
    } else if #[cfg(feature = "max-sessions-5")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 5;
    } else if #[cfg(feature = "max-sessions-4")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 4;
    } else if #[cfg(feature = "max-sessions-3")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 3;
    } else {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 16;
    }
}

/// Max number of session holders that can be registered with a session table
pub const MAX_SESSION_HOLDERS: usize = MAX_SESSIONS * 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SecureSessionType {
    Pase,
    Case,
}

/// The lifecycle state of a secure session.
///
/// Only `Active` sessions are considered "stable". `Establishing` and `Defunct`
/// sessions are the first ones to go when the session table needs room.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The slot is reserved and the handshake is in progress
    Establishing,
    /// The session was activated and can carry traffic
    Active,
    /// The peer stopped responding; the session is kept only until
    /// it either hears from the peer again or gets evicted
    Defunct,
}

/// A weak, generation-counted reference to a slot in a [`SecureSessionTable`].
///
/// A handle outlives the session it refers to: once the session is released
/// and its slot is reused, the generation no longer matches and the table
/// resolves the handle to nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl SessionHandle {
    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot index of the session in its table
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.generation)
    }
}

pub struct Session {
    handle: SessionHandle,
    session_type: SecureSessionType,
    state: SessionState,
    local: ScopedNodeId,
    peer: ScopedNodeId,
    peer_cat_ids: NocCatIds,
    local_sess_id: u16,
    peer_sess_id: u16,
    mrp_config: ReliableMessageConfig,
    last_activity: Duration,
    last_peer_activity: Duration,
}

impl Session {
    pub(crate) fn new(
        handle: SessionHandle,
        session_type: SecureSessionType,
        local_sess_id: u16,
        now: Duration,
    ) -> Self {
        Self {
            handle,
            session_type,
            state: SessionState::Establishing,
            local: ScopedNodeId::undefined(),
            peer: ScopedNodeId::undefined(),
            peer_cat_ids: [0; MAX_CAT_IDS_PER_NOC],
            local_sess_id,
            peer_sess_id: 0,
            mrp_config: ReliableMessageConfig::new(),
            last_activity: now,
            last_peer_activity: now,
        }
    }

    pub const fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub const fn session_type(&self) -> SecureSessionType {
        self.session_type
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn is_establishing(&self) -> bool {
        self.state == SessionState::Establishing
    }

    pub fn is_defunct(&self) -> bool {
        self.state == SessionState::Defunct
    }

    pub const fn get_local_sess_id(&self) -> u16 {
        self.local_sess_id
    }

    pub const fn get_peer_sess_id(&self) -> u16 {
        self.peer_sess_id
    }

    pub const fn get_local(&self) -> ScopedNodeId {
        self.local
    }

    pub const fn get_peer(&self) -> ScopedNodeId {
        self.peer
    }

    pub const fn get_fabric_idx(&self) -> FabricIndex {
        self.peer.fab_idx()
    }

    pub fn get_peer_cat_ids(&self) -> Option<&NocCatIds> {
        match self.session_type {
            SecureSessionType::Case => Some(&self.peer_cat_ids),
            SecureSessionType::Pase => None,
        }
    }

    pub const fn mrp_config(&self) -> &ReliableMessageConfig {
        &self.mrp_config
    }

    /// The retransmission interval to use on this session at time `now`, depending on
    /// whether the peer was recently active
    pub fn retrans_timeout(&self, now: Duration) -> Duration {
        self.mrp_config.retrans_timeout(now.saturating_sub(self.last_peer_activity))
    }

    pub const fn last_activity_time(&self) -> Duration {
        self.last_activity
    }

    pub const fn last_peer_activity_time(&self) -> Duration {
        self.last_peer_activity
    }

    /// Override the last activity timestamp.
    ///
    /// The transport normally does this through [`SecureSessionTable::mark_active_rx`];
    /// the direct setter exists for setting up deterministic table contents.
    pub fn set_last_activity_time(&mut self, ts: Duration) {
        self.last_activity = ts;
    }

    /// Mark the session as having just received a message from the peer.
    ///
    /// A defunct session which hears from its peer becomes active again.
    pub fn mark_active_rx(&mut self, now: Duration) {
        self.last_activity = now;
        self.last_peer_activity = now;

        self.mark_active();
    }

    /// Move a defunct session back to the active state; no-op in any other state.
    pub fn mark_active(&mut self) {
        if self.state == SessionState::Defunct {
            debug!("Session {}: Defunct -> Active", self.handle);
            self.state = SessionState::Active;
        }
    }

    /// Mark the session as defunct, i.e. the peer is believed to be gone.
    ///
    /// Only sessions which completed their establishment can become defunct.
    pub fn mark_as_defunct(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Establishing => Err(ErrorCode::InvalidState)?,
            SessionState::Active => {
                debug!("Session {}: Active -> Defunct", self.handle);
                self.state = SessionState::Defunct;
            }
            SessionState::Defunct => (),
        }

        Ok(())
    }

    pub(crate) fn activate(
        &mut self,
        local: ScopedNodeId,
        peer: ScopedNodeId,
        peer_cat_ids: NocCatIds,
        peer_sess_id: u16,
        mrp_config: ReliableMessageConfig,
        now: Duration,
    ) -> Result<(), Error> {
        if self.state != SessionState::Establishing {
            // The peer identity of a session is immutable once set
            Err(ErrorCode::InvalidState)?;
        }

        self.local = local;
        self.peer = peer;
        self.peer_cat_ids = peer_cat_ids;
        self.peer_sess_id = peer_sess_id;
        self.mrp_config = mrp_config;
        self.last_activity = now;
        self.last_peer_activity = now;
        self.state = SessionState::Active;

        Ok(())
    }

    /// Whether the session is an established session to `peer`
    /// (excluding sessions that are still being established).
    pub(crate) fn is_for_node(&self, peer: &ScopedNodeId) -> bool {
        self.state != SessionState::Establishing && self.peer == *peer
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handle: {}, type: {:?}, state: {:?}, peer: {}, local: {}, remote: {}, ts: {:?}",
            self.handle,
            self.session_type,
            self.state,
            self.peer,
            self.local_sess_id,
            self.peer_sess_id,
            self.last_activity,
        )
    }
}
