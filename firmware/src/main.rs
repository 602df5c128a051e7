// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

mod config;
mod controller;
mod flash;
mod scanner;

use core::cell::RefCell;
#[cfg(feature = "debug")]
use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use consts::{RXM_KEY_SIZE, STORAGE_BASE_ADDR, STORAGE_PAGES, TICK_MS, UICR_SECRET_START};
use controller::Controller;
use defmt::{debug, error, info, unwrap, warn};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_nrf::wdt::{self, Watchdog};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use flash::SdFlash;
use nrf_softdevice::{raw, Softdevice};
use receiver_core::{AdvertisementQueue, Authenticator, CommandProcessor, FlashLog, PersistentStore, SharedState};
use scanner::scanner_task;

#[cfg(not(feature = "debug"))]
mod dummy_logging {
    #[defmt::global_logger]
    struct Logger;

    unsafe impl defmt::Logger for Logger {
        fn acquire() {}

        unsafe fn flush() {}

        unsafe fn release() {}

        unsafe fn write(_bytes: &[u8]) {}
    }
}

/// Timers and button state, shared by the tick and the main loop
static STATE: SharedState = SharedState::new();

/// Advertisements waiting for the main loop
static QUEUE: AdvertisementQueue<{ consts::ADV_QUEUE_LEN }> = AdvertisementQueue::new();

/// Wakes the main loop after a tick or a queued advertisement
static WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Relay output, switched on by the main loop and off by the tick
static RELAY: Mutex<CriticalSectionRawMutex, RefCell<Option<Output<'static>>>> = Mutex::new(RefCell::new(None));

static EXECUTOR_TICK: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI0_EGU0() {
    EXECUTOR_TICK.on_interrupt()
}

pub fn set_relay(on: bool) {
    RELAY.lock(|relay| {
        if let Some(pin) = relay.borrow_mut().as_mut() {
            pin.set_level(Level::from(on));
        }
    });
}

/// Stops all productive work. The watchdog is no longer fed, so the device
/// resets shortly after.
pub fn halt(reason: impl defmt::Format) -> ! {
    error!("Fatal error: {}", reason);
    error!("Waiting for WDT reset...");
    loop {
        cortex_m::asm::wfe();
    }
}

fn initialize_sd() -> &'static Softdevice {
    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    };

    Softdevice::enable(&config)
}

/// Master key provisioned into the UICR customer registers.
fn master_key() -> &'static [u8] {
    // SAFETY: UICR is memory mapped flash, never written while the application runs
    let key = unsafe { core::slice::from_raw_parts(UICR_SECRET_START as *const u8, RXM_KEY_SIZE) };
    if key.iter().all(|b| *b == 0xFF) {
        warn!("Master key not provisioned");
    }
    key
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    info!("SD is running");
    sd.run().await
}

#[embassy_executor::task]
async fn tick_task(button: Input<'static>) {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS as u64));
    loop {
        ticker.next().await;
        let out = STATE.tick(button.is_high());
        if out.relay_released {
            set_relay(false);
            debug!("Relay released");
        }
        WAKE.signal(());
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut conf = embassy_nrf::config::Config::default();
    conf.hfclk_source = embassy_nrf::config::HfclkSource::ExternalXtal;
    conf.lfclk_source = embassy_nrf::config::LfclkSource::ExternalXtal;

    // P0, P1 and P4 belong to the softdevice
    conf.gpiote_interrupt_priority = Priority::P2;
    conf.time_interrupt_priority = Priority::P2;

    let p = embassy_nrf::init(conf);

    let mut wdt_config = wdt::Config::default();
    wdt_config.timeout_ticks = config::WDT_TIMEOUT_TICKS;
    wdt_config.run_during_debug_halt = false;
    let (_wdt, [wdt_handle]) = match Watchdog::try_new(p.WDT, wdt_config) {
        Ok(x) => x,
        Err(_) => halt("Watchdog already running with another configuration"),
    };

    let led = Output::new(p.P0_16, Level::Low, OutputDrive::Standard);
    let button = Input::new(p.P0_20, Pull::Down);
    RELAY.lock(|relay| {
        relay
            .borrow_mut()
            .replace(Output::new(p.P0_19, Level::Low, OutputDrive::Standard))
    });

    let sd = initialize_sd();
    unwrap!(spawner.spawn(softdevice_task(sd)), "Spawning the softdevice failed");

    let log = match FlashLog::mount(SdFlash::take(sd), STORAGE_BASE_ADDR, STORAGE_PAGES as usize).await {
        Ok(log) => log,
        Err(e) => halt(e),
    };
    let mut store = match PersistentStore::init(log).await {
        Ok(store) => store,
        Err(e) => halt(e),
    };
    if let Err(e) = store.dump_diagnostics().await {
        halt(e);
    }

    unwrap!(spawner.spawn(scanner_task(sd)), "Spawning the scanner failed");

    interrupt::SWI0_EGU0.set_priority(Priority::P3);
    let tick_spawner = EXECUTOR_TICK.start(interrupt::SWI0_EGU0);
    unwrap!(tick_spawner.spawn(tick_task(button)), "Spawning the tick failed");

    info!("Initialized");

    let processor = CommandProcessor::new(Authenticator::new(master_key()), &STATE);
    Controller::new(store, processor, led, wdt_handle).run().await
}
