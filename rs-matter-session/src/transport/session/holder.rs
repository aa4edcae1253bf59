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

use log::trace;

use crate::error::*;

use super::{SessionHandle, MAX_SESSION_HOLDERS};

/// What a holder wants to happen when a newer session to the same peer
/// becomes active.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NewSessionHandlingPolicy {
    #[default]
    ShiftToNewSession,
    StayAtOldSession,
}

/// Callbacks for the owner of a [`SessionHolder`].
///
/// Delegates are called synchronously from within the session table, hence they only
/// get `&self` and cannot call back into the table.
pub trait SessionDelegate {
    /// The session the holder was bound to was evicted or released.
    /// The holder is already unbound when this is called.
    fn on_session_released(&self);

    fn new_session_handling_policy(&self) -> NewSessionHandlingPolicy {
        NewSessionHandlingPolicy::ShiftToNewSession
    }
}

impl<T> SessionDelegate for &T
where
    T: SessionDelegate + ?Sized,
{
    fn on_session_released(&self) {
        (**self).on_session_released()
    }

    fn new_session_handling_policy(&self) -> NewSessionHandlingPolicy {
        (**self).new_session_handling_policy()
    }
}

/// A token identifying a holder registered with a session table.
///
/// The token is owned by whoever registered the holder; the table only keeps the
/// bookkeeping needed to dispatch release notifications. The token is deliberately
/// not `Clone`: unregistering consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHolder {
    index: usize,
    generation: u32,
}

struct HolderSlot<'d> {
    generation: u32,
    registered: bool,
    session: Option<SessionHandle>,
    delegate: Option<&'d dyn SessionDelegate>,
}

impl HolderSlot<'_> {
    fn is_bound_to(&self, handle: SessionHandle) -> bool {
        self.registered && self.session == Some(handle)
    }
}

/// Side table mapping holders to the sessions they reference
pub(crate) struct HolderRegistry<'d> {
    slots: heapless::Vec<HolderSlot<'d>, MAX_SESSION_HOLDERS>,
}

impl<'d> HolderRegistry<'d> {
    pub const fn new() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        delegate: Option<&'d dyn SessionDelegate>,
    ) -> Result<SessionHolder, Error> {
        let index = if let Some(index) = self.slots.iter().position(|slot| !slot.registered) {
            index
        } else {
            self.slots
                .push(HolderSlot {
                    generation: 0,
                    registered: false,
                    session: None,
                    delegate: None,
                })
                .map_err(|_| ErrorCode::NoSpaceHolders)?;

            self.slots.len() - 1
        };

        let slot = &mut self.slots[index];
        slot.registered = true;
        slot.session = None;
        slot.delegate = delegate;

        Ok(SessionHolder {
            index,
            generation: slot.generation,
        })
    }

    pub fn unregister(&mut self, holder: SessionHolder) -> Result<(), Error> {
        let slot = self.slot_mut(&holder)?;

        slot.registered = false;
        slot.session = None;
        slot.delegate = None;
        // Invalidate any stale copy of the token
        slot.generation = slot.generation.wrapping_add(1);

        Ok(())
    }

    pub fn session(&self, holder: &SessionHolder) -> Result<Option<SessionHandle>, Error> {
        Ok(self.slot(holder)?.session)
    }

    /// Bind (or unbind with `None`) the holder, returning its previous binding.
    pub fn bind(
        &mut self,
        holder: &SessionHolder,
        session: Option<SessionHandle>,
    ) -> Result<Option<SessionHandle>, Error> {
        let slot = self.slot_mut(holder)?;

        Ok(core::mem::replace(&mut slot.session, session))
    }

    pub fn bound_to(&self, handle: SessionHandle) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.is_bound_to(handle))
            .count()
    }

    /// Unbind every holder bound to `handle` and notify its delegate.
    ///
    /// Return the number of holders that were unbound.
    pub fn notify_released(&mut self, handle: SessionHandle) -> usize {
        let mut released = 0;

        for (index, slot) in self
            .slots
            .iter_mut()
            .enumerate()
            .filter(|(_, slot)| slot.is_bound_to(handle))
        {
            slot.session = None;
            released += 1;

            if let Some(delegate) = slot.delegate {
                trace!("Holder {}: session {} released", index, handle);
                delegate.on_session_released();
            }
        }

        released
    }

    /// Move the holders of `from` whose delegate asks for it over to `to`.
    ///
    /// Return the number of holders moved.
    pub fn shift(&mut self, from: SessionHandle, to: SessionHandle) -> usize {
        let mut shifted = 0;

        for slot in self.slots.iter_mut().filter(|slot| slot.is_bound_to(from)) {
            let shift = slot.delegate.is_some_and(|delegate| {
                delegate.new_session_handling_policy()
                    == NewSessionHandlingPolicy::ShiftToNewSession
            });

            if shift {
                slot.session = Some(to);
                shifted += 1;
            }
        }

        shifted
    }

    fn slot(&self, holder: &SessionHolder) -> Result<&HolderSlot<'d>, Error> {
        self.slots
            .get(holder.index)
            .filter(|slot| slot.registered && slot.generation == holder.generation)
            .ok_or_else(|| ErrorCode::NoHolder.into())
    }

    fn slot_mut(&mut self, holder: &SessionHolder) -> Result<&mut HolderSlot<'d>, Error> {
        self.slots
            .get_mut(holder.index)
            .filter(|slot| slot.registered && slot.generation == holder.generation)
            .ok_or_else(|| ErrorCode::NoHolder.into())
    }
}
