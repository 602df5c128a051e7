// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use embedded_storage::nor_flash::{ErrorType, NorFlashErrorKind};
use embedded_storage_async::nor_flash::{NorFlash, ReadNorFlash};
use futures::executor::block_on;
use receiver_core::{
    Authenticator, Error, FlashLog, KeyValueLog, LogStat, PersistentStore, Record, RecordId, TransmitterIdentity,
};

pub const PAGE_SIZE: usize = 4096;
pub const LOG_PAGES: usize = 3;
/// The log does not start at the bottom of the device.
pub const LOG_BASE: u32 = 2 * PAGE_SIZE as u32;

pub static MASTER_KEY: [u8; 20] = *b"garage-door-master!!";

/// NOR flash in RAM. Programming can only clear bits, like the real thing.
/// A power cut can be scheduled after a number of program/erase operations.
#[derive(Clone)]
pub struct RamFlash {
    pub mem: Vec<u8>,
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
    budget: Option<usize>,
}

impl RamFlash {
    pub fn new() -> Self {
        Self {
            mem: vec![0xFF; LOG_BASE as usize + LOG_PAGES * PAGE_SIZE],
            reads: 0,
            writes: 0,
            erases: 0,
            budget: None,
        }
    }

    /// Let `ops` more writes or erases through, then fail everything.
    pub fn cut_power_after(&mut self, ops: usize) {
        self.budget = Some(ops);
    }

    pub fn restore_power(&mut self) {
        self.budget = None;
    }

    pub fn io(&self) -> usize {
        self.reads + self.writes + self.erases
    }

    pub fn page(&self, page: usize) -> &[u8] {
        let start = LOG_BASE as usize + page * PAGE_SIZE;
        &self.mem[start..start + PAGE_SIZE]
    }

    pub fn page_mut(&mut self, page: usize) -> &mut [u8] {
        let start = LOG_BASE as usize + page * PAGE_SIZE;
        &mut self.mem[start..start + PAGE_SIZE]
    }

    fn spend(&mut self) -> Result<(), NorFlashErrorKind> {
        match self.budget.as_mut() {
            Some(0) => Err(NorFlashErrorKind::Other),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, NorFlashErrorKind> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(start..end),
            _ => Err(NorFlashErrorKind::OutOfBounds),
        }
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.mem[range]);
        self.reads += 1;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.mem.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from as usize % PAGE_SIZE != 0 || to as usize % PAGE_SIZE != 0 || to < from {
            return Err(NorFlashErrorKind::NotAligned);
        }
        let range = self.range(from, (to - from) as usize)?;
        self.spend()?;
        self.mem[range].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if offset % 4 != 0 || bytes.len() % 4 != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        let range = self.range(offset, bytes.len())?;
        self.spend()?;
        for (cell, b) in self.mem[range].iter_mut().zip(bytes) {
            *cell &= *b;
        }
        self.writes += 1;
        Ok(())
    }
}

/// A log that runs out of room after a number of appends. Updates and
/// deletes still go through.
pub struct CrampedLog {
    pub inner: FlashLog<RamFlash>,
    appends_left: usize,
}

impl CrampedLog {
    pub fn new(inner: FlashLog<RamFlash>, appends: usize) -> Self {
        Self {
            inner,
            appends_left: appends,
        }
    }
}

impl KeyValueLog for CrampedLog {
    async fn append(&mut self, file_id: u16, key: u16, data: &[u8]) -> Result<RecordId, Error> {
        if self.appends_left == 0 {
            return Err(Error::LogFull);
        }
        self.appends_left -= 1;
        self.inner.append(file_id, key, data).await
    }

    async fn update(&mut self, id: RecordId, data: &[u8]) -> Result<(), Error> {
        self.inner.update(id, data).await
    }

    async fn delete(&mut self, id: RecordId) -> Result<(), Error> {
        self.inner.delete(id).await
    }

    async fn scan(&mut self, visit: impl FnMut(Record<'_>)) -> Result<(), Error> {
        self.inner.scan(visit).await
    }

    fn stat(&self) -> LogStat {
        self.inner.stat()
    }

    async fn reclaim(&mut self) -> Result<(), Error> {
        self.inner.reclaim().await
    }
}

/// Records kept in a plain vector, with no capacity limit.
#[derive(Default)]
pub struct VecLog {
    pub records: Vec<(RecordId, u16, u16, Vec<u8>)>,
    next_id: RecordId,
}

impl KeyValueLog for VecLog {
    async fn append(&mut self, file_id: u16, key: u16, data: &[u8]) -> Result<RecordId, Error> {
        self.next_id += 1;
        self.records.push((self.next_id, file_id, key, data.to_vec()));
        Ok(self.next_id)
    }

    async fn update(&mut self, id: RecordId, data: &[u8]) -> Result<(), Error> {
        let record = self.records.iter_mut().find(|r| r.0 == id).ok_or(Error::NoSuchRecord)?;
        record.3 = data.to_vec();
        Ok(())
    }

    async fn delete(&mut self, id: RecordId) -> Result<(), Error> {
        let n = self.records.iter().position(|r| r.0 == id).ok_or(Error::NoSuchRecord)?;
        self.records.remove(n);
        Ok(())
    }

    async fn scan(&mut self, mut visit: impl FnMut(Record<'_>)) -> Result<(), Error> {
        for (id, file_id, key, data) in self.records.iter() {
            visit(Record {
                id: *id,
                file_id: *file_id,
                key: *key,
                data,
            });
        }
        Ok(())
    }

    fn stat(&self) -> LogStat {
        LogStat::default()
    }

    async fn reclaim(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

pub fn mount(flash: RamFlash) -> FlashLog<RamFlash> {
    block_on(FlashLog::mount(flash, LOG_BASE, LOG_PAGES)).unwrap()
}

pub fn open_store(flash: RamFlash) -> PersistentStore<FlashLog<RamFlash>> {
    block_on(PersistentStore::init(mount(flash))).unwrap()
}

/// Simulates a reboot: the RAM state goes, the flash stays.
pub fn power_cycle(store: PersistentStore<FlashLog<RamFlash>>) -> PersistentStore<FlashLog<RamFlash>> {
    open_store(store.into_log().release())
}

/// Live records as `(id, file_id, key, data)`, sorted by id.
pub fn contents<L: KeyValueLog>(log: &mut L) -> Vec<(u32, u16, u16, Vec<u8>)> {
    let mut out = Vec::new();
    block_on(log.scan(|rec| out.push((rec.id, rec.file_id, rec.key, rec.data.to_vec())))).unwrap();
    out.sort();
    out
}

pub fn identity(n: u8) -> TransmitterIdentity {
    let mut uuid = [0u8; 16];
    uuid[0] = n;
    uuid[15] = 0xA0;
    TransmitterIdentity::from_le_bytes(uuid)
}

pub fn authenticator() -> Authenticator<'static> {
    Authenticator::new(&MASTER_KEY)
}
