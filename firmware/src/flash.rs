// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use cortex_m::peripheral::scb::VectActive;
use cortex_m::peripheral::SCB;
use embedded_storage_async::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
use nrf_softdevice::{Flash, FlashError, Softdevice};

/// Softdevice flash, usable from thread mode only.
///
/// The softdevice reports flash completion through a SoC event that is
/// dispatched by `Softdevice::run`, so waiting on it from an interrupt would
/// never finish.
pub struct SdFlash {
    inner: Flash,
}

impl SdFlash {
    pub fn take(sd: &Softdevice) -> Self {
        Self { inner: Flash::take(sd) }
    }
}

fn assert_thread_mode() {
    defmt::assert!(
        SCB::vect_active() == VectActive::ThreadMode,
        "flash accessed from interrupt context"
    );
}

impl ErrorType for SdFlash {
    type Error = FlashError;
}

impl ReadNorFlash for SdFlash {
    const READ_SIZE: usize = <Flash as ReadNorFlash>::READ_SIZE;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert_thread_mode();
        self.inner.read(offset, bytes).await
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl NorFlash for SdFlash {
    const WRITE_SIZE: usize = <Flash as NorFlash>::WRITE_SIZE;
    const ERASE_SIZE: usize = <Flash as NorFlash>::ERASE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert_thread_mode();
        self.inner.erase(from, to).await
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert_thread_mode();
        self.inner.write(offset, bytes).await
    }
}
