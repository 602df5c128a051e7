// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Over-the-air command format and advertising data parsing.
//!
//! A transmitter broadcasts one "Service Data - 128-bit UUID" AD structure:
//!
//! ```text
//! len | 0x21 | UUID (16, little endian) | cmd | seq (3, big endian) | digest (4)
//! ```

use consts::{AD_TYPE_SERVICE_DATA_128, SERVICE_DATA_AD_LEN};

/// Largest sequence number representable on the wire.
pub const MAX_SEQUENCE: u32 = 0x00FF_FFFF;

/// 128-bit transmitter UUID in over-the-air (little endian) byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransmitterIdentity(pub [u8; 16]);

impl TransmitterIdentity {
    pub const fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Canonical UUID byte order, as printed and as hashed for key derivation.
    pub fn to_be_bytes(&self) -> [u8; 16] {
        let mut be = self.0;
        be.reverse();
        be
    }

    pub fn from_be_bytes(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    pub fn as_le_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl core::fmt::Debug for TransmitterIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        for b in self.to_be_bytes() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransmitterIdentity {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:02x}", &self.to_be_bytes()[..])
    }
}

/// Signed command as carried in the service data.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message {
    pub command: u8,
    seq_no: [u8; 3],
    pub digest: [u8; 4],
}

impl Message {
    pub const SIZE: usize = 8;

    pub const EMPTY: Self = Self {
        command: 0,
        seq_no: [0; 3],
        digest: [0; 4],
    };

    /// Builds a message, `None` if `seq_no` does not fit in 24 bits.
    pub fn new(command: u8, seq_no: u32, digest: [u8; 4]) -> Option<Self> {
        if seq_no > MAX_SEQUENCE {
            return None;
        }
        let [_, a, b, c] = seq_no.to_be_bytes();
        Some(Self {
            command,
            seq_no: [a, b, c],
            digest,
        })
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            command: bytes[0],
            seq_no: [bytes[1], bytes[2], bytes[3]],
            digest: [bytes[4], bytes[5], bytes[6], bytes[7]],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let h = self.header();
        let d = self.digest;
        [h[0], h[1], h[2], h[3], d[0], d[1], d[2], d[3]]
    }

    /// The authenticated part: command byte followed by the sequence number.
    pub fn header(&self) -> [u8; 4] {
        [self.command, self.seq_no[0], self.seq_no[1], self.seq_no[2]]
    }

    pub fn seq_no(&self) -> u32 {
        u32::from_be_bytes([0, self.seq_no[0], self.seq_no[1], self.seq_no[2]])
    }
}

/// One captured command, handed from the scanner to the main loop.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisementRecord {
    pub identity: TransmitterIdentity,
    pub message: Message,
    pub rssi: i8,
}

/// An AD structure whose length field runs past the end of the report.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MalformedAd {
    pub offset: usize,
    pub len: usize,
}

/// Iterator over the `(ad_type, payload)` pairs of an advertising report.
/// See the Core Specification Supplement, part A.
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = Result<(u8, &'a [u8]), MalformedAd>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos;
        let len = *self.data.get(offset)? as usize;
        if len == 0 {
            // Zero length ends the significant part, the rest is padding
            self.pos = self.data.len();
            return None;
        }
        let start = offset + 1;
        let end = start + len;
        if end > self.data.len() {
            self.pos = self.data.len();
            return Some(Err(MalformedAd { offset, len }));
        }
        self.pos = end;
        Some(Ok((self.data[start], &self.data[start + 1..end])))
    }
}

/// Extracts every command carried by an advertising report.
///
/// `f` is called once per well formed service data structure. Parsing stops at
/// the first structure with an inconsistent length field; records found before
/// it have already been delivered.
pub fn parse_report(data: &[u8], rssi: i8, mut f: impl FnMut(AdvertisementRecord)) -> Result<(), MalformedAd> {
    for ad in AdStructures::new(data) {
        let (ad_type, payload) = ad?;
        if ad_type != AD_TYPE_SERVICE_DATA_128 || payload.len() + 1 != SERVICE_DATA_AD_LEN {
            continue;
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&payload[..16]);
        let mut msg = [0u8; Message::SIZE];
        msg.copy_from_slice(&payload[16..]);
        f(AdvertisementRecord {
            identity: TransmitterIdentity(uuid),
            message: Message::from_bytes(&msg),
            rssi,
        });
    }
    Ok(())
}

/// Builds the AD structure a transmitter broadcasts for `message`.
pub fn service_data_ad(identity: &TransmitterIdentity, message: &Message) -> [u8; SERVICE_DATA_AD_LEN + 1] {
    let mut ad = [0u8; SERVICE_DATA_AD_LEN + 1];
    ad[0] = SERVICE_DATA_AD_LEN as u8;
    ad[1] = AD_TYPE_SERVICE_DATA_128;
    ad[2..18].copy_from_slice(identity.as_le_bytes());
    ad[18..].copy_from_slice(&message.to_bytes());
    ad
}
