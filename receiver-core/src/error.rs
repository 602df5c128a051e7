// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

/// Errors reported by the receiver core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The flash driver failed a read, write or erase.
    Flash(NorFlashErrorKind),
    /// The flash geometry cannot host the record log.
    Geometry,
    /// The log region holds data that cannot be recovered.
    Corrupted,
    /// No room left in the log for another record.
    LogFull,
    /// The in-memory record index is full.
    IndexFull,
    /// The transmitter registry is full.
    RegistryFull,
    /// A record payload is larger than the log supports.
    PayloadTooLarge,
    /// The record id does not name a live record.
    NoSuchRecord,
    /// The transmitter is not enrolled.
    UnknownTransmitter,
    /// Sequence numbers are 24 bits on the wire.
    SequenceOutOfRange,
    /// The HMAC primitive refused its key.
    Crypto,
}

impl Error {
    /// Errors after which the device must stop doing productive work and
    /// wait for the watchdog to reset it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Flash(_) | Error::Geometry | Error::Corrupted | Error::Crypto
        )
    }

    pub(crate) fn flash<E: NorFlashError>(e: E) -> Self {
        Error::Flash(e.kind())
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Error::Flash(kind) => write!(f, "flash operation failed: {kind:?}"),
            Error::Geometry => write!(f, "flash geometry unsuitable for the record log"),
            Error::Corrupted => write!(f, "record log is corrupted"),
            Error::LogFull => write!(f, "record log is full"),
            Error::IndexFull => write!(f, "record index is full"),
            Error::RegistryFull => write!(f, "transmitter registry is full"),
            Error::PayloadTooLarge => write!(f, "record payload too large"),
            Error::NoSuchRecord => write!(f, "no such record"),
            Error::UnknownTransmitter => write!(f, "unknown transmitter"),
            Error::SequenceOutOfRange => write!(f, "sequence number exceeds 24 bits"),
            Error::Crypto => write!(f, "HMAC key rejected"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Flash(NorFlashErrorKind::NotAligned) => defmt::write!(f, "Flash(NotAligned)"),
            Error::Flash(NorFlashErrorKind::OutOfBounds) => defmt::write!(f, "Flash(OutOfBounds)"),
            Error::Flash(_) => defmt::write!(f, "Flash(Other)"),
            Error::Geometry => defmt::write!(f, "Geometry"),
            Error::Corrupted => defmt::write!(f, "Corrupted"),
            Error::LogFull => defmt::write!(f, "LogFull"),
            Error::IndexFull => defmt::write!(f, "IndexFull"),
            Error::RegistryFull => defmt::write!(f, "RegistryFull"),
            Error::PayloadTooLarge => defmt::write!(f, "PayloadTooLarge"),
            Error::NoSuchRecord => defmt::write!(f, "NoSuchRecord"),
            Error::UnknownTransmitter => defmt::write!(f, "UnknownTransmitter"),
            Error::SequenceOutOfRange => defmt::write!(f, "SequenceOutOfRange"),
            Error::Crypto => defmt::write!(f, "Crypto"),
        }
    }
}
