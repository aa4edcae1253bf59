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

#![allow(dead_code)]

use core::cell::Cell;
use core::time::Duration;

use rs_matter_session::fabric::ScopedNodeId;
use rs_matter_session::transport::mrp::ReliableMessageConfig;
use rs_matter_session::transport::session::{
    NewSessionHandlingPolicy, SecureSessionTable, SecureSessionType, SessionDelegate,
    SessionHandle, SessionState,
};

pub const LOCAL_NODE_ID: u64 = 0x1000;

pub fn init_env_logger() {
    let _ = env_logger::try_init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
}

/// A delegate counting the release notifications it got
pub struct ReleaseCounter {
    released: Cell<usize>,
    policy: NewSessionHandlingPolicy,
}

impl ReleaseCounter {
    pub const fn new() -> Self {
        Self::with_policy(NewSessionHandlingPolicy::ShiftToNewSession)
    }

    pub const fn with_policy(policy: NewSessionHandlingPolicy) -> Self {
        Self {
            released: Cell::new(0),
            policy,
        }
    }

    pub fn released(&self) -> usize {
        self.released.get()
    }
}

impl SessionDelegate for ReleaseCounter {
    fn on_session_released(&self) {
        self.released.set(self.released.get() + 1);
    }

    fn new_session_handling_policy(&self) -> NewSessionHandlingPolicy {
        self.policy
    }
}

/// Add an activated CASE session to `peer` with the given state and last activity (in ms).
///
/// The table must have room, so that no eviction happens.
pub fn add_session(
    table: &mut SecureSessionTable<'_>,
    peer: ScopedNodeId,
    state: SessionState,
    ts: u64,
) -> SessionHandle {
    assert!(!table.is_full(), "Test setup would evict a session");

    let handle = table
        .create_new_secure_session(SecureSessionType::Case, ScopedNodeId::undefined())
        .unwrap();

    if state != SessionState::Establishing {
        let local_sess_id = table.get(handle).unwrap().get_local_sess_id();

        table
            .activate(
                handle,
                ScopedNodeId::new(LOCAL_NODE_ID, peer.fab_idx()),
                peer,
                [0; 3],
                local_sess_id + 0x100,
                ReliableMessageConfig::new(),
            )
            .unwrap();
    }

    if state == SessionState::Defunct {
        table.mark_as_defunct(handle).unwrap();
    }

    table
        .get_mut(handle)
        .unwrap()
        .set_last_activity_time(Duration::from_millis(ts));

    handle
}

/// Fill a table with sessions described as `(node_id, fab_idx, state, ts)`
pub fn fill(
    table: &mut SecureSessionTable<'_>,
    sessions: &[(u64, u8, SessionState, u64)],
) -> Vec<SessionHandle> {
    sessions
        .iter()
        .map(|(node_id, fab_idx, state, ts)| {
            add_session(table, ScopedNodeId::new(*node_id, *fab_idx), *state, *ts)
        })
        .collect()
}

/// Return the handles (out of `handles`) which no longer refer to a live session
pub fn evicted(table: &SecureSessionTable<'_>, handles: &[SessionHandle]) -> Vec<usize> {
    handles
        .iter()
        .enumerate()
        .filter(|(_, handle)| table.get(**handle).is_none())
        .map(|(index, _)| index)
        .collect()
}
