// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::flash::SdFlash;
use crate::{halt, set_relay, QUEUE, STATE, WAKE};
use consts::{CLEAR_BLINK_CYCLES, CLEAR_BLINK_MS, TICK_MS};
use defmt::{debug, info, warn};
use embassy_nrf::gpio::{Level, Output};
use embassy_nrf::wdt::WatchdogHandle;
use receiver_core::{AdvertisementRecord, ButtonCommand, CommandProcessor, Error, FlashLog, Outcome, PersistentStore};

type Store = PersistentStore<FlashLog<SdFlash>>;

/// The cooperative main loop.
pub struct Controller<'a> {
    store: Store,
    processor: CommandProcessor<'a>,
    led: Output<'a>,
    wdt: WatchdogHandle,
    dropped: u32,
}

impl<'a> Controller<'a> {
    pub fn new(store: Store, processor: CommandProcessor<'a>, led: Output<'a>, wdt: WatchdogHandle) -> Self {
        Self {
            store,
            processor,
            led,
            wdt,
            dropped: 0,
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            if let Some(record) = QUEUE.try_pop() {
                self.handle_advertisement(record).await;
            }
            self.report_drops();

            self.led.set_level(Level::from(STATE.led()));

            match STATE.take_button_command() {
                Some(ButtonCommand::Learn) => {
                    debug!("Button command Learn");
                    STATE.arm_learn();
                }
                Some(ButtonCommand::Clear) => {
                    debug!("Button command Clear");
                    self.clear().await;
                }
                None => {}
            }

            if let Err(e) = self.store.run_maintenance().await {
                halt(e);
            }

            self.wdt.pet();
            if QUEUE.is_empty() {
                WAKE.wait().await;
            }
        }
    }

    async fn handle_advertisement(&mut self, record: AdvertisementRecord) {
        let outcome = match self.processor.process(&mut self.store, &record).await {
            Ok(outcome) => outcome,
            Err(e) => return self.storage_error(e),
        };

        match outcome {
            Outcome::Accepted => info!("Accepted {} seq {}", record.identity, record.message.seq_no()),
            Outcome::Enrolled => info!("Enrolled {} at seq {}", record.identity, record.message.seq_no()),
            Outcome::EnrollFailed(e) => warn!("Enrolling {} failed: {}", record.identity, e),
            Outcome::Replayed { stored } => info!(
                "Rejected {} seq {}, last accepted {}",
                record.identity,
                record.message.seq_no(),
                stored
            ),
            Outcome::BadDigest => warn!("Bad digest from {}, reception paused", record.identity),
            Outcome::Throttled | Outcome::UnknownTransmitter => {}
        }

        if outcome.activates_relay() {
            set_relay(true);
        }
    }

    fn report_drops(&mut self) {
        let dropped = QUEUE.dropped();
        if dropped != self.dropped {
            warn!(
                "Queue dropped {} advertisements ({} total) at uptime {} ticks",
                dropped.wrapping_sub(self.dropped),
                dropped,
                STATE.uptime_ticks()
            );
            self.dropped = dropped;
        }
    }

    fn storage_error(&self, e: Error) {
        if e.is_fatal() {
            halt(e);
        }
        warn!("Storage: {}", e);
    }

    /// Blinks the LED for a while, then forgets every transmitter. The
    /// countdown runs on uptime ticks, woken by the tick task.
    async fn clear(&mut self) {
        let blink_ticks = (CLEAR_BLINK_MS as u32 / TICK_MS).max(1);
        let countdown = 2 * CLEAR_BLINK_CYCLES as u32 * blink_ticks;
        let start = STATE.uptime_ticks();
        info!("Clearing all transmitters in {} ticks", countdown);
        loop {
            let elapsed = STATE.uptime_ticks().wrapping_sub(start);
            if elapsed >= countdown {
                break;
            }
            self.led.set_level(Level::from((elapsed / blink_ticks) & 0x01 == 0));
            self.wdt.pet();
            WAKE.wait().await;
        }
        self.led.set_low();

        match self.store.clear_all().await {
            Ok(()) => info!("All transmitters cleared"),
            Err(e) => halt(e),
        }
    }
}
