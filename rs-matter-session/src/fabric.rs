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

/// Index of a fabric on this node. `0` means "no fabric"
/// (i.e. a PASE session before AddNOC, or an unset eviction hint).
pub type FabricIndex = u8;

pub type NodeId = u64;

pub const UNDEFINED_FABRIC_INDEX: FabricIndex = 0;
pub const MIN_FABRIC_INDEX: FabricIndex = 1;
pub const MAX_FABRIC_INDEX: FabricIndex = 254;

pub const UNSPECIFIED_NODE_ID: NodeId = 0;
pub const MIN_OPERATIONAL_NODE_ID: NodeId = 0x0000_0000_0000_0001;
pub const MAX_OPERATIONAL_NODE_ID: NodeId = 0xFFFF_FFEF_FFFF_FFFF;

pub const fn is_operational_node_id(node_id: NodeId) -> bool {
    node_id >= MIN_OPERATIONAL_NODE_ID && node_id <= MAX_OPERATIONAL_NODE_ID
}

/// A node id scoped by the local fabric on which it lives.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopedNodeId {
    node_id: NodeId,
    fab_idx: FabricIndex,
}

impl ScopedNodeId {
    pub const fn new(node_id: NodeId, fab_idx: FabricIndex) -> Self {
        Self { node_id, fab_idx }
    }

    /// The "no node" value, used among others as an empty eviction hint.
    pub const fn undefined() -> Self {
        Self::new(UNSPECIFIED_NODE_ID, UNDEFINED_FABRIC_INDEX)
    }

    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub const fn fab_idx(&self) -> FabricIndex {
        self.fab_idx
    }

    /// `true` if this is an operational node on a real fabric.
    pub const fn is_operational(&self) -> bool {
        self.fab_idx >= MIN_FABRIC_INDEX
            && self.fab_idx <= MAX_FABRIC_INDEX
            && is_operational_node_id(self.node_id)
    }
}

impl fmt::Display for ScopedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:016X}, {}>", self.node_id, self.fab_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operational() {
        assert!(ScopedNodeId::new(2, 1).is_operational());
        assert!(!ScopedNodeId::new(2, UNDEFINED_FABRIC_INDEX).is_operational());
        assert!(!ScopedNodeId::new(UNSPECIFIED_NODE_ID, 1).is_operational());
        // Group and temporary local ids are outside of the operational range
        assert!(!ScopedNodeId::new(0xFFFF_FFFF_FFFF_0001, 1).is_operational());
        assert!(!ScopedNodeId::undefined().is_operational());
        assert!(!ScopedNodeId::new(2, 255).is_operational());
    }

    #[test]
    fn undefined_is_default() {
        assert_eq!(ScopedNodeId::undefined(), ScopedNodeId::default());
    }
}
