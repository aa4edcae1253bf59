/*
 *
 *    Copyright (c) 2024 Project CHIP Authors
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

//! Selection of the session to evict when the session table is full.
//!
//! The selection is a pipeline of four stages, each one narrowing the set of
//! candidates that survived the previous one:
//! 1. Fabric load: keep only the sessions on the most loaded fabric(s); if more
//!    than one fabric is left and the eviction hint's fabric is among them, keep
//!    only the sessions on the hint's fabric
//! 2. Peer load: keep only the sessions to the most loaded peer(s); if all peers
//!    are equally loaded, keep the sessions to the eviction hint peer, provided
//!    that peer has more than one session
//! 3. State: prefer defunct, then establishing sessions over active ones
//! 4. Recency: pick the session with the oldest activity
//!
//! All stages are pure functions over [`EvictionCandidate`]s.

use core::time::Duration;

use crate::fabric::{ScopedNodeId, UNDEFINED_FABRIC_INDEX};

use super::{Session, SessionState, MAX_SESSIONS};

/// The subset of a session's state relevant for eviction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    /// Slot index of the session in the session table
    pub index: usize,
    pub peer: ScopedNodeId,
    pub state: SessionState,
    pub last_activity: Duration,
}

impl EvictionCandidate {
    pub const fn new(
        index: usize,
        peer: ScopedNodeId,
        state: SessionState,
        last_activity: Duration,
    ) -> Self {
        Self {
            index,
            peer,
            state,
            last_activity,
        }
    }
}

impl From<&Session> for EvictionCandidate {
    fn from(session: &Session) -> Self {
        Self::new(
            session.handle().index(),
            session.get_peer(),
            session.state(),
            session.last_activity_time(),
        )
    }
}

pub type EvictionCandidates = heapless::Vec<EvictionCandidate, MAX_SESSIONS>;

/// Run all eviction stages over `candidates` and return the slot index
/// of the session to evict, or `None` if there are no candidates at all.
///
/// `candidates` is left containing the survivors of the last narrowing stage.
pub fn select_eviction_candidate(
    candidates: &mut EvictionCandidates,
    hint: &ScopedNodeId,
) -> Option<usize> {
    narrow_by_fabric_load(candidates);
    narrow_by_hinted_fabric(candidates, hint);
    narrow_by_peer_load(candidates, hint);
    narrow_by_state(candidates);

    oldest(candidates).map(|candidate| candidate.index)
}

/// Stage 1: if fabrics are unequally loaded, keep only the sessions on the fabric(s)
/// with the most sessions.
///
/// Return `true` if the candidates were narrowed.
pub fn narrow_by_fabric_load(candidates: &mut EvictionCandidates) -> bool {
    retain_most_loaded(candidates, |candidate| candidate.peer.fab_idx())
}

/// Stage 1, continued: if the candidates still span several (equally loaded) fabrics,
/// keep only the sessions on the fabric of the eviction hint, if it has any.
///
/// Return `true` if the candidates were narrowed.
pub fn narrow_by_hinted_fabric(
    candidates: &mut EvictionCandidates,
    hint: &ScopedNodeId,
) -> bool {
    if hint.fab_idx() == UNDEFINED_FABRIC_INDEX {
        return false;
    }

    let hinted = candidates
        .iter()
        .filter(|candidate| candidate.peer.fab_idx() == hint.fab_idx())
        .count();

    if hinted > 0 && hinted < candidates.len() {
        candidates.retain(|candidate| candidate.peer.fab_idx() == hint.fab_idx());
        true
    } else {
        false
    }
}

/// Stage 2: if peers are unequally loaded, keep only the sessions to the peer(s)
/// with the most sessions.
///
/// If all peers are equally loaded, the eviction hint is used to narrow down to the
/// hinted peer, but only if that peer has more than one session. A unique session
/// to the hinted peer is never singled out by the hint alone.
///
/// Return `true` if the candidates were narrowed.
pub fn narrow_by_peer_load(candidates: &mut EvictionCandidates, hint: &ScopedNodeId) -> bool {
    if retain_most_loaded(candidates, |candidate| candidate.peer) {
        return true;
    }

    if !hint.is_operational() {
        return false;
    }

    let hinted = candidates
        .iter()
        .filter(|candidate| candidate.peer == *hint)
        .count();

    if hinted > 1 && hinted < candidates.len() {
        candidates.retain(|candidate| candidate.peer == *hint);
        true
    } else {
        false
    }
}

/// Stage 3: if some candidates are not active, keep only the most evictable ones.
///
/// Return `true` if the candidates were narrowed.
pub fn narrow_by_state(candidates: &mut EvictionCandidates) -> bool {
    let Some(most) = candidates
        .iter()
        .map(|candidate| evictability(candidate.state))
        .max()
    else {
        return false;
    };

    if candidates
        .iter()
        .all(|candidate| evictability(candidate.state) == most)
    {
        return false;
    }

    candidates.retain(|candidate| evictability(candidate.state) == most);

    true
}

/// Stage 4: the candidate with the oldest activity; ties go to the lowest slot index.
pub fn oldest(candidates: &[EvictionCandidate]) -> Option<&EvictionCandidate> {
    candidates
        .iter()
        .min_by_key(|candidate| (candidate.last_activity, candidate.index))
}

/// Higher is evicted first
const fn evictability(state: SessionState) -> u8 {
    match state {
        SessionState::Defunct => 2,
        SessionState::Establishing => 1,
        SessionState::Active => 0,
    }
}

/// Group the candidates by `key` and keep only the groups of maximum size.
///
/// Does nothing (and returns `false`) if all groups have the same size.
fn retain_most_loaded<K, F>(candidates: &mut EvictionCandidates, key: F) -> bool
where
    K: Ord,
    F: Fn(&EvictionCandidate) -> K,
{
    if candidates.is_empty() {
        return false;
    }

    // Sorting makes the groups contiguous
    candidates.sort_unstable_by(|a, b| key(a).cmp(&key(b)).then(a.index.cmp(&b.index)));

    let mut min_len = usize::MAX;
    let mut max_len = 0;

    let mut start = 0;
    while start < candidates.len() {
        let end = group_end(candidates, start, &key);

        min_len = min_len.min(end - start);
        max_len = max_len.max(end - start);

        start = end;
    }

    if min_len == max_len {
        return false;
    }

    let mut kept = 0;

    let mut start = 0;
    while start < candidates.len() {
        let end = group_end(candidates, start, &key);

        if end - start == max_len {
            candidates.copy_within(start..end, kept);
            kept += end - start;
        }

        start = end;
    }

    candidates.truncate(kept);

    true
}

fn group_end<K, F>(candidates: &[EvictionCandidate], start: usize, key: &F) -> usize
where
    K: Ord,
    F: Fn(&EvictionCandidate) -> K,
{
    let group = key(&candidates[start]);

    candidates[start..]
        .iter()
        .position(|candidate| key(candidate) != group)
        .map(|len| start + len)
        .unwrap_or(candidates.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    use SessionState::*;

    fn candidates(list: &[(u64, u8, SessionState, u64)]) -> EvictionCandidates {
        list.iter()
            .enumerate()
            .map(|(index, (node_id, fab_idx, state, ts))| {
                EvictionCandidate::new(
                    index,
                    ScopedNodeId::new(*node_id, *fab_idx),
                    *state,
                    Duration::from_millis(*ts),
                )
            })
            .collect()
    }

    fn indexes(candidates: &EvictionCandidates) -> heapless::Vec<usize, MAX_SESSIONS> {
        let mut indexes: heapless::Vec<usize, MAX_SESSIONS> =
            candidates.iter().map(|candidate| candidate.index).collect();
        indexes.sort_unstable();
        indexes
    }

    #[test]
    fn fabric_stage_keeps_most_loaded_fabric() {
        let mut c = candidates(&[
            (1, 1, Active, 1),
            (2, 1, Active, 2),
            (2, 2, Active, 3),
            (2, 2, Active, 4),
            (3, 2, Active, 5),
            (4, 2, Active, 6),
        ]);

        assert!(narrow_by_fabric_load(&mut c));
        assert_eq!(indexes(&c).as_slice(), &[2, 3, 4, 5]);
    }

    #[test]
    fn fabric_stage_keeps_all_tied_fabrics() {
        let mut c = candidates(&[
            (1, 1, Active, 1),
            (2, 1, Active, 2),
            (1, 2, Active, 3),
            (2, 2, Active, 4),
            (1, 3, Active, 5),
        ]);

        assert!(narrow_by_fabric_load(&mut c));
        assert_eq!(indexes(&c).as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn fabric_stage_noop_when_balanced() {
        let mut c = candidates(&[(1, 1, Active, 1), (1, 2, Active, 2), (1, 3, Active, 3)]);

        assert!(!narrow_by_fabric_load(&mut c));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn hinted_fabric_preferred_among_balanced() {
        let mut c = candidates(&[
            (1, 1, Active, 5),
            (2, 1, Active, 6),
            (3, 2, Active, 1),
            (4, 2, Active, 2),
        ]);

        assert!(!narrow_by_fabric_load(&mut c));
        assert!(narrow_by_hinted_fabric(&mut c, &ScopedNodeId::new(9, 1)));
        assert_eq!(indexes(&c).as_slice(), &[0, 1]);
    }

    #[test]
    fn hinted_fabric_ignored_when_absent_or_undefined() {
        let mut c = candidates(&[
            (1, 1, Active, 1),
            (1, 2, Active, 2),
            (0, 0, Establishing, 3),
        ]);

        assert!(!narrow_by_hinted_fabric(&mut c, &ScopedNodeId::new(1, 3)));
        assert!(!narrow_by_hinted_fabric(&mut c, &ScopedNodeId::undefined()));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn peer_stage_keeps_most_loaded_peer() {
        let mut c = candidates(&[
            (2, 2, Active, 3),
            (2, 2, Active, 4),
            (3, 2, Active, 1),
            (4, 2, Active, 2),
        ]);

        assert!(narrow_by_peer_load(&mut c, &ScopedNodeId::new(3, 2)));
        assert_eq!(indexes(&c).as_slice(), &[0, 1]);
    }

    #[test]
    fn peer_stage_hint_disambiguates_equal_load() {
        let mut c = candidates(&[
            (1, 1, Active, 1),
            (1, 1, Active, 2),
            (2, 1, Active, 3),
            (2, 1, Active, 4),
        ]);

        assert!(narrow_by_peer_load(&mut c, &ScopedNodeId::new(2, 1)));
        assert_eq!(indexes(&c).as_slice(), &[2, 3]);
    }

    #[test]
    fn peer_stage_ignores_hint_for_unique_sessions() {
        let mut c = candidates(&[(1, 1, Active, 1), (2, 1, Active, 2), (3, 1, Active, 3)]);

        assert!(!narrow_by_peer_load(&mut c, &ScopedNodeId::new(2, 1)));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn peer_stage_ignores_undefined_hint() {
        let mut c = candidates(&[
            (0, 0, Establishing, 1),
            (0, 0, Establishing, 2),
            (1, 1, Active, 3),
            (1, 1, Active, 4),
        ]);

        assert!(!narrow_by_peer_load(&mut c, &ScopedNodeId::undefined()));
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn state_stage_prefers_defunct_then_establishing() {
        let mut c = candidates(&[
            (1, 1, Active, 1),
            (2, 1, Establishing, 2),
            (3, 1, Defunct, 9),
        ]);

        assert!(narrow_by_state(&mut c));
        assert_eq!(indexes(&c).as_slice(), &[2]);

        let mut c = candidates(&[(1, 1, Active, 1), (2, 1, Establishing, 7)]);

        assert!(narrow_by_state(&mut c));
        assert_eq!(indexes(&c).as_slice(), &[1]);
    }

    #[test]
    fn state_stage_noop_when_all_same() {
        let mut c = candidates(&[(1, 1, Active, 1), (2, 1, Active, 2)]);

        assert!(!narrow_by_state(&mut c));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn oldest_breaks_ties_by_index() {
        let c = candidates(&[(1, 1, Active, 5), (2, 1, Active, 2), (3, 1, Active, 2)]);

        assert_eq!(oldest(&c).map(|candidate| candidate.index), Some(1));
    }

    #[test]
    fn fabric_load_beats_hint_and_age() {
        // Fabric 1 has the oldest session and is hinted, yet fabric 2 is more loaded
        let mut c = candidates(&[
            (1, 1, Active, 0),
            (2, 1, Defunct, 1),
            (2, 2, Active, 5),
            (2, 2, Active, 6),
            (3, 2, Active, 3),
            (4, 2, Active, 4),
        ]);

        assert_eq!(
            select_eviction_candidate(&mut c, &ScopedNodeId::new(2, 1)),
            Some(2)
        );
    }

    #[test]
    fn unique_peers_evict_oldest() {
        let mut c = candidates(&[
            (1, 1, Active, 9),
            (2, 1, Active, 3),
            (3, 1, Active, 2),
            (4, 1, Active, 7),
            (5, 1, Active, 1),
            (6, 1, Active, 2),
        ]);

        assert_eq!(
            select_eviction_candidate(&mut c, &ScopedNodeId::new(4, 1)),
            Some(4)
        );
    }

    #[test]
    fn non_active_evicted_even_if_newest() {
        let mut c = candidates(&[
            (1, 1, Active, 1),
            (2, 1, Active, 2),
            (3, 1, Defunct, 100),
            (4, 1, Active, 3),
        ]);

        assert_eq!(
            select_eviction_candidate(&mut c, &ScopedNodeId::undefined()),
            Some(2)
        );
    }

    #[test]
    fn hinted_fabric_among_tied_maximum() {
        let mut c = candidates(&[
            (1, 1, Active, 7),
            (2, 1, Active, 8),
            (3, 2, Active, 2),
            (4, 2, Active, 3),
            (5, 3, Active, 1),
        ]);

        assert_eq!(
            select_eviction_candidate(&mut c, &ScopedNodeId::new(6, 1)),
            Some(0)
        );
    }

    #[test]
    fn empty_has_no_candidate() {
        let mut c = EvictionCandidates::new();

        assert_eq!(
            select_eviction_candidate(&mut c, &ScopedNodeId::new(1, 1)),
            None
        );
    }
}
