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

use core::time::Duration;

const MRP_DEFAULT_IDLE_INTERVAL_MS: u64 = 500;
const MRP_DEFAULT_ACTIVE_INTERVAL_MS: u64 = 300;
const MRP_DEFAULT_ACTIVE_THRESHOLD_MS: u64 = 4000;

/// Upper bound for the retransmission intervals a peer may advertise (1 hour)
const MRP_MAX_INTERVAL_MS: u64 = 3_600_000;

/// The reliable messaging parameters negotiated with a peer during session establishment
/// and carried by the session for the rest of its life.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReliableMessageConfig {
    pub idle_retrans_timeout: Duration,
    pub active_retrans_timeout: Duration,
    pub active_threshold: Duration,
}

impl ReliableMessageConfig {
    pub const fn new() -> Self {
        Self {
            idle_retrans_timeout: Duration::from_millis(MRP_DEFAULT_IDLE_INTERVAL_MS),
            active_retrans_timeout: Duration::from_millis(MRP_DEFAULT_ACTIVE_INTERVAL_MS),
            active_threshold: Duration::from_millis(MRP_DEFAULT_ACTIVE_THRESHOLD_MS),
        }
    }

    /// Build a config from the optional session parameters the peer sent,
    /// falling back to the defaults and clamping out-of-range values.
    pub fn from_peer(
        session_idle_interval_ms: Option<u32>,
        session_active_interval_ms: Option<u32>,
        session_active_threshold_ms: Option<u16>,
    ) -> Self {
        let clamp = |ms: u32| Duration::from_millis((ms as u64).min(MRP_MAX_INTERVAL_MS));

        let mut config = Self::new();

        if let Some(idle) = session_idle_interval_ms {
            config.idle_retrans_timeout = clamp(idle);
        }

        if let Some(active) = session_active_interval_ms {
            config.active_retrans_timeout = clamp(active);
        }

        if let Some(threshold) = session_active_threshold_ms {
            config.active_threshold = Duration::from_millis(threshold as u64);
        }

        config
    }

    /// Return the retransmission interval to use towards the peer, given the time
    /// elapsed since we last heard from it.
    pub fn retrans_timeout(&self, since_peer_activity: Duration) -> Duration {
        if since_peer_activity < self.active_threshold {
            self.active_retrans_timeout
        } else {
            self.idle_retrans_timeout
        }
    }
}

impl Default for ReliableMessageConfig {
    fn default() -> Self {
        Self::new()
    }
}
