// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::{SCAN_INTERVAL, SCAN_WINDOW};
use crate::{halt, QUEUE, WAKE};
use core::slice;
use defmt::info;
use nrf_softdevice::ble::central::{self, ScanConfig};
use nrf_softdevice::{raw, Softdevice};
use receiver_core::message::parse_report;

/// Passive scan feeding the advertisement queue.
///
/// The report callback runs from the softdevice event dispatch, it only
/// parses and queues. Scanning resumes on its own once it returns.
#[embassy_executor::task]
pub async fn scanner_task(sd: &'static Softdevice) {
    let config = ScanConfig {
        active: false,
        interval: SCAN_INTERVAL,
        window: SCAN_WINDOW,
        timeout: raw::BLE_GAP_SCAN_TIMEOUT_UNLIMITED as u16,
        ..Default::default()
    };

    info!("Scanning started");
    let res = central::scan::<_, ()>(sd, &config, |report| {
        // SAFETY: the softdevice keeps the report buffer alive for the callback
        let data = unsafe { slice::from_raw_parts(report.data.p_data, report.data.len as usize) };

        let parsed = parse_report(data, report.rssi, |record| match QUEUE.try_push(record) {
            Ok(()) => WAKE.signal(()),
            Err(dropped) => info!("Queue full, dropping {}", dropped.identity),
        });
        if let Err(e) = parsed {
            info!("Malformed advertisement: {}", e);
        }
        None
    })
    .await;

    match res {
        Ok(()) => halt("Scan stopped"),
        Err(e) => {
            defmt::error!("Scan failed: {}", e);
            halt("Scan failed")
        }
    }
}
