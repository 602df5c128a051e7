// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-transmitter keys and truncated HMAC digests.
//!
//! key(tx) = HMAC-SHA256(master, uuid_be)
//! digest  = HMAC-SHA256(key(tx), cmd || seq)[..4]

use crate::message::{Message, TransmitterIdentity};
use crate::Error;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of a derived transmitter key.
pub const TX_KEY_SIZE: usize = 32;

/// Verifies commands against keys derived from the receiver master key.
pub struct Authenticator<'a> {
    master: &'a [u8],
}

impl<'a> Authenticator<'a> {
    pub const fn new(master: &'a [u8]) -> Self {
        Self { master }
    }

    /// Derives the key a transmitter was provisioned with.
    pub fn derive_key(&self, identity: &TransmitterIdentity) -> Result<[u8; TX_KEY_SIZE], Error> {
        let mut mac = HmacSha256::new_from_slice(self.master).map_err(|_| Error::Crypto)?;
        mac.update(&identity.to_be_bytes());
        Ok(mac.finalize().into_bytes().into())
    }

    fn digest(&self, identity: &TransmitterIdentity, header: &[u8; 4]) -> Result<[u8; 4], Error> {
        let key = self.derive_key(identity)?;
        let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| Error::Crypto)?;
        mac.update(header);
        let full = mac.finalize().into_bytes();
        Ok([full[0], full[1], full[2], full[3]])
    }

    /// Checks the truncated digest of `message`.
    /// Plain comparison: the broadcast transport gives an attacker nothing to time.
    pub fn verify(&self, identity: &TransmitterIdentity, message: &Message) -> Result<bool, Error> {
        Ok(self.digest(identity, &message.header())? == message.digest)
    }

    /// Transmitter side: builds the signed message for `seq_no`.
    pub fn seal(&self, identity: &TransmitterIdentity, command: u8, seq_no: u32) -> Result<Message, Error> {
        let unsigned = Message::new(command, seq_no, [0; 4]).ok_or(Error::SequenceOutOfRange)?;
        let digest = self.digest(identity, &unsigned.header())?;
        Message::new(command, seq_no, digest).ok_or(Error::SequenceOutOfRange)
    }
}
