// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Period of the scheduler tick driving every timed counter.
pub const TICK_MS: u32 = 100;

/// How long the relay stays energized after an accepted command.
pub const RELAY_HOLD_MS: u32 = 1000;

/// Length of the enrollment window opened by a short button press.
pub const LEARN_WINDOW_MS: u32 = 10 * 1000;

/// Receiver cooldown after a digest mismatch.
/// Throttles brute force guessing of the truncated digest.
pub const RX_DISABLE_MS: u32 = 1000;

/// Minimum press duration recognized as a `Learn` request on release.
pub const BUTTON_SHORT_MS: u32 = 100;

/// Hold duration that triggers a factory clear.
pub const BUTTON_LONG_MS: u32 = 5000;

/// Half period of the LED blink pattern while learning.
pub const LEARN_BLINK_MS: u32 = 500;

/// Number of on/off cycles shown before a factory clear is performed.
pub const CLEAR_BLINK_CYCLES: usize = 30;

/// On (and off) time of a single factory clear blink.
pub const CLEAR_BLINK_MS: u64 = 100;

/// Number of advertisements buffered between the scanner and the main loop.
/// Transmitters repeat their broadcast, so dropping on overflow is fine.
pub const ADV_QUEUE_LEN: usize = 2;

/// AD type "Service Data - 128-bit UUID" from the GAP assigned numbers.
pub const AD_TYPE_SERVICE_DATA_128: u8 = 0x21;

/// Exact AD structure length carrying a command:
/// 1 type octet, 16 octets UUID, 8 octets message.
pub const SERVICE_DATA_AD_LEN: usize = 25;

/// Length in bytes of the receiver master key.
/// 20 bytes (160 bits) base32 encode without padding.
pub const RXM_KEY_SIZE: usize = 20;

/// Starting address in UICR (User Information Configuration Registers) where
/// the receiver master key is provisioned at flash time.
pub const UICR_SECRET_START: u32 = 0x10001080;

/// Namespace (file id) of every record owned by the transmitter store.
pub const STORAGE_FILE_ID: u16 = 0x1000;

/// Record key of a transmitter registry record.
pub const REGISTRY_RECORD_KEY: u16 = 0x0001;

/// Record key of a sequence number record.
pub const SEQUENCE_RECORD_KEY: u16 = 0x0002;

/// Size of a flash page on the nRF52832.
pub const FLASH_PAGE_SIZE: u32 = 4096;

/// Total internal flash of the nRF52832.
pub const FLASH_SIZE: u32 = 0x80000;

/// Pages reserved for the record log.
/// Garbage collection needs at least 3 to always make progress.
pub const STORAGE_PAGES: u32 = 3;

/// The record log occupies the last pages of the internal flash.
pub const STORAGE_BASE_ADDR: u32 = FLASH_SIZE - STORAGE_PAGES * FLASH_PAGE_SIZE;

/// First address after the S132 v7 SoftDevice.
pub const BASE_APP_ADDR: u32 = 0x26000;

/// Maximum number of enrolled transmitters.
pub const MAX_TRANSMITTERS: usize = 16;

/// Maximum number of live records tracked by the log index.
pub const MAX_LOG_RECORDS: usize = 64;
