// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Timed counters and the button state machine, advanced by the 100 ms tick.

use consts::{
    BUTTON_LONG_MS, BUTTON_SHORT_MS, LEARN_BLINK_MS, LEARN_WINDOW_MS, RELAY_HOLD_MS, RX_DISABLE_MS, TICK_MS,
};
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Converts a duration to scheduler ticks.
pub const fn ticks(ms: u32) -> u16 {
    (ms / TICK_MS) as u16
}

const RELAY_TICKS: u16 = ticks(RELAY_HOLD_MS);
const LEARN_TICKS: u16 = ticks(LEARN_WINDOW_MS);
const RX_DISABLE_TICKS: u16 = ticks(RX_DISABLE_MS);
const SHORT_PRESS_TICKS: u16 = ticks(BUTTON_SHORT_MS);
const LONG_PRESS_TICKS: u16 = ticks(BUTTON_LONG_MS);
const BLINK_TICKS: u16 = ticks(LEARN_BLINK_MS);

/// Command decoded from the button press duration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonCommand {
    /// Short press: open the enrollment window.
    Learn,
    /// Long hold: forget every transmitter.
    Clear,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Button {
    Idle,
    /// Decoded, waiting for the main loop.
    Pending(ButtonCommand),
    /// Taken by the main loop, waiting for the button to be released.
    Consumed,
}

/// What the tick handler must do on the pins.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct TickOutput {
    /// The relay hold time just ran out; de-energize the relay.
    pub relay_released: bool,
}

/// Every piece of state shared between the tick and the main loop.
#[derive(Debug)]
pub struct DeviceState {
    uptime: u32,
    relay: u16,
    learn: u16,
    rx_disable: u16,
    pressed: u16,
    button: Button,
}

impl DeviceState {
    pub const fn new() -> Self {
        Self {
            uptime: 0,
            relay: 0,
            learn: 0,
            rx_disable: 0,
            pressed: 0,
            button: Button::Idle,
        }
    }

    /// Advances all counters by one tick and samples the button.
    pub fn tick(&mut self, button_pressed: bool) -> TickOutput {
        let mut out = TickOutput::default();
        self.uptime = self.uptime.wrapping_add(1);

        if self.relay > 0 {
            self.relay -= 1;
            out.relay_released = self.relay == 0;
        }
        self.learn = self.learn.saturating_sub(1);
        self.rx_disable = self.rx_disable.saturating_sub(1);

        match self.button {
            Button::Idle if button_pressed => {
                self.pressed = self.pressed.saturating_add(1);
                if self.pressed >= LONG_PRESS_TICKS {
                    self.button = Button::Pending(ButtonCommand::Clear);
                }
            }
            Button::Idle => {
                if self.pressed >= SHORT_PRESS_TICKS {
                    self.button = Button::Pending(ButtonCommand::Learn);
                }
                self.pressed = 0;
            }
            Button::Consumed if !button_pressed => {
                self.pressed = 0;
                self.button = Button::Idle;
            }
            Button::Consumed | Button::Pending(_) => {}
        }
        out
    }

    /// Takes the decoded button command, if any. Once taken, the command
    /// cannot fire again until the button has been released.
    pub fn take_button_command(&mut self) -> Option<ButtonCommand> {
        match self.button {
            Button::Pending(cmd) => {
                self.button = Button::Consumed;
                Some(cmd)
            }
            Button::Idle | Button::Consumed => None,
        }
    }

    pub fn arm_relay(&mut self) {
        self.relay = RELAY_TICKS;
    }

    pub fn arm_learn(&mut self) {
        self.learn = LEARN_TICKS;
    }

    pub fn arm_rx_disable(&mut self) {
        self.rx_disable = RX_DISABLE_TICKS;
    }

    pub fn is_relay_active(&self) -> bool {
        self.relay > 0
    }

    pub fn is_learning(&self) -> bool {
        self.learn > 0
    }

    pub fn is_rx_disabled(&self) -> bool {
        self.rx_disable > 0
    }

    /// LED level: blinking while learning, on while the relay is held.
    pub fn led(&self) -> bool {
        if self.is_learning() {
            (self.learn / BLINK_TICKS) & 0x01 != 0
        } else {
            self.is_relay_active()
        }
    }

    pub fn uptime_ticks(&self) -> u32 {
        self.uptime
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

/// [`DeviceState`] behind a critical section, shared by the tick interrupt and
/// the main loop. Accessors keep the critical section to a few loads and stores.
pub struct SharedState {
    inner: Mutex<CriticalSectionRawMutex, RefCell<DeviceState>>,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(DeviceState::new())),
        }
    }

    pub fn lock<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        self.inner.lock(|state| f(&mut state.borrow_mut()))
    }

    pub fn tick(&self, button_pressed: bool) -> TickOutput {
        self.lock(|s| s.tick(button_pressed))
    }

    pub fn take_button_command(&self) -> Option<ButtonCommand> {
        self.lock(|s| s.take_button_command())
    }

    pub fn arm_relay(&self) {
        self.lock(|s| s.arm_relay())
    }

    pub fn arm_learn(&self) {
        self.lock(|s| s.arm_learn())
    }

    pub fn arm_rx_disable(&self) {
        self.lock(|s| s.arm_rx_disable())
    }

    pub fn is_relay_active(&self) -> bool {
        self.lock(|s| s.is_relay_active())
    }

    pub fn is_learning(&self) -> bool {
        self.lock(|s| s.is_learning())
    }

    pub fn is_rx_disabled(&self) -> bool {
        self.lock(|s| s.is_rx_disabled())
    }

    pub fn led(&self) -> bool {
        self.lock(|s| s.led())
    }

    pub fn uptime_ticks(&self) -> u32 {
        self.lock(|s| s.uptime_ticks())
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
