// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::auth::Authenticator;
use crate::log::KeyValueLog;
use crate::message::AdvertisementRecord;
use crate::state::SharedState;
use crate::store::PersistentStore;
use crate::Error;

/// What became of one received command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Dropped unverified, the receiver is cooling down after a bad digest.
    Throttled,
    /// Digest check failed; reception is suspended for a while.
    BadDigest,
    /// Sequence advanced and the relay hold was armed.
    Accepted,
    /// Sequence not newer than the last accepted one.
    Replayed { stored: u32 },
    /// Unknown transmitter registered during the learn window.
    Enrolled,
    /// Learn window open but the transmitter could not be stored.
    EnrollFailed(Error),
    /// Unknown transmitter outside the learn window.
    UnknownTransmitter,
}

impl Outcome {
    /// The relay has to be energized.
    pub fn activates_relay(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }
}

/// Authenticates commands and enforces strictly increasing sequence numbers.
pub struct CommandProcessor<'a> {
    auth: Authenticator<'a>,
    state: &'a SharedState,
}

impl<'a> CommandProcessor<'a> {
    pub fn new(auth: Authenticator<'a>, state: &'a SharedState) -> Self {
        Self { auth, state }
    }

    /// Runs one command through authentication and replay protection.
    ///
    /// Each command has at most one effect: the relay hold is armed, the store
    /// is written, the rx-disable window is armed, or nothing happens. Errors
    /// are storage or crypto failures; enrollment running out of room is
    /// reported as [`Outcome::EnrollFailed`] instead.
    pub async fn process<L: KeyValueLog>(
        &self,
        store: &mut PersistentStore<L>,
        record: &AdvertisementRecord,
    ) -> Result<Outcome, Error> {
        let identity = &record.identity;
        let seq_no = record.message.seq_no();

        if self.state.is_rx_disabled() {
            trace!("rx disabled, dropping command from {:?}", identity);
            return Ok(Outcome::Throttled);
        }

        if !self.auth.verify(identity, &record.message)? {
            warn!("bad digest from {:?}, rssi {}", identity, record.rssi);
            self.state.arm_rx_disable();
            return Ok(Outcome::BadDigest);
        }

        match store.get_sequence(identity) {
            Some(stored) if seq_no > stored => {
                store.set_sequence(identity, seq_no).await?;
                self.state.arm_relay();
                info!("command {} accepted from {:?}, seq {}", record.message.command, identity, seq_no);
                Ok(Outcome::Accepted)
            }
            Some(stored) => {
                info!("replay from {:?}: seq {} <= {}", identity, seq_no, stored);
                Ok(Outcome::Replayed { stored })
            }
            None if self.state.is_learning() => match store.enroll(identity, seq_no).await {
                Ok(()) => {
                    info!("enrolled {:?} at seq {}", identity, seq_no);
                    Ok(Outcome::Enrolled)
                }
                Err(e @ (Error::LogFull | Error::IndexFull | Error::RegistryFull)) => {
                    warn!("cannot enroll {:?}: {:?}", identity, e);
                    Ok(Outcome::EnrollFailed(e))
                }
                Err(e) => Err(e),
            },
            None => {
                trace!("ignoring unknown transmitter {:?}", identity);
                Ok(Outcome::UnknownTransmitter)
            }
        }
    }
}
