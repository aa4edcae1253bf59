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

//! The secure session table of a Matter (Smart-Home) node.
//!
//! A Matter node can only keep a bounded number of secure (PASE and CASE) sessions,
//! and it is typically shared by several fabrics (administrative domains) at once.
//! This crate keeps those sessions in a fixed-capacity [`SecureSessionTable`] and,
//! when the table is full, evicts the "least valuable" one in a way that is fair
//! across fabrics and across peers:
//! - Sessions of the most loaded fabric go first, and the fabric of the peer we are
//!   about to talk to (the "eviction hint") is used to break ties between fabrics;
//! - Within it, sessions of the most loaded peer go first, and the hinted peer is
//!   used to break ties between peers;
//! - Defunct and still-establishing sessions go before active ones;
//! - Finally, the least recently used session goes.
//!
//! Code interested in a session registers a [`SessionHolder`] with the table and binds
//! it to the session; the holder's [`SessionDelegate`] is notified when the session is
//! evicted or released.
//!
//! # Example
//! ```
//! use core::cell::Cell;
//!
//! use rs_matter_session::fabric::ScopedNodeId;
//! use rs_matter_session::transport::mrp::ReliableMessageConfig;
//! use rs_matter_session::transport::session::{SecureSessionTable, SecureSessionType, SessionDelegate};
//! use rs_matter_session::utils::epoch::dummy_epoch;
//!
//! struct Released(Cell<bool>);
//!
//! impl SessionDelegate for Released {
//!     fn on_session_released(&self) {
//!         self.0.set(true);
//!     }
//! }
//!
//! let released = Released(Cell::new(false));
//!
//! let mut table = SecureSessionTable::new(dummy_epoch);
//! table.init(1).unwrap();
//!
//! let peer = ScopedNodeId::new(2, 1);
//!
//! let session = table
//!     .create_new_secure_session(SecureSessionType::Case, peer)
//!     .unwrap();
//! table
//!     .activate(session, ScopedNodeId::new(1, 1), peer, [0; 3], 10, ReliableMessageConfig::new())
//!     .unwrap();
//!
//! let holder = table.register_holder(Some(&released)).unwrap();
//! table.grab(&holder, session).unwrap();
//!
//! // The table is full, so this evicts the first session
//! table
//!     .create_new_secure_session(SecureSessionType::Case, ScopedNodeId::new(3, 1))
//!     .unwrap();
//!
//! assert!(released.0.get());
//! assert_eq!(table.holder_session(&holder).unwrap(), None);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub use crate::transport::session::{
    NewSessionHandlingPolicy, SecureSessionTable, SecureSessionType, Session, SessionDelegate,
    SessionHandle, SessionHolder, SessionState,
};

pub mod error;
pub mod fabric;
pub mod transport;
pub mod utils;
