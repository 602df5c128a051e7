// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Core of the garage door receiver: command authentication, replay
//! protection, persistent transmitter records and tick-driven timing.
//! Free of any hardware dependency so it can be tested on the host.

#![cfg_attr(not(test), no_std)]

// This must go first so the macros are visible in the other modules
#[macro_use]
mod fmt;

pub mod auth;
mod error;
pub mod log;
pub mod message;
pub mod processor;
pub mod queue;
pub mod state;
pub mod store;

pub use auth::Authenticator;
pub use error::Error;
pub use log::{FlashLog, KeyValueLog, LogStat, Record, RecordId};
pub use message::{AdvertisementRecord, Message, TransmitterIdentity};
pub use processor::{CommandProcessor, Outcome};
pub use queue::AdvertisementQueue;
pub use state::{ButtonCommand, DeviceState, SharedState, TickOutput};
pub use store::PersistentStore;
