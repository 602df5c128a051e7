// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Radio and watchdog settings that only the firmware needs.

/// Scan interval in 0.625 ms units (50 ms).
pub const SCAN_INTERVAL: u32 = 80;

/// Scan window in 0.625 ms units (30 ms).
pub const SCAN_WINDOW: u32 = 48;

/// Watchdog reload value in 32.768 kHz ticks (2 s).
pub const WDT_TIMEOUT_TICKS: u32 = 2 * 32768;
