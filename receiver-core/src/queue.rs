// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Lock-free single producer / single consumer queue of advertisements.

use crate::message::{AdvertisementRecord, Message, TransmitterIdentity};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Bounded queue carrying captured advertisements from the radio handler to
/// the main loop. Holds records by value and never blocks.
///
/// `head` and `tail` count pops and pushes; they only ever increase (wrapping),
/// so `tail - head` is the fill level and all `N` slots are usable.
pub struct AdvertisementQueue<const N: usize> {
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicU32,
    slots: [Slot; N],
}

struct Slot {
    record: UnsafeCell<AdvertisementRecord>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            record: UnsafeCell::new(AdvertisementRecord {
                identity: TransmitterIdentity([0; 16]),
                message: Message::EMPTY,
                rssi: 0,
            }),
        }
    }
}

impl<const N: usize> AdvertisementQueue<N> {
    pub const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
            slots: [const { Slot::new() }; N],
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.tail
            .load(Ordering::Acquire)
            .wrapping_sub(self.head.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    /// Advertisements rejected because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Producer side. Hands the record back when no slot is free.
    pub fn try_push(&self, record: AdvertisementRecord) -> Result<(), AdvertisementRecord> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= N {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(record);
        }
        let slot = &self.slots[tail % N];
        // SAFETY: the slot is outside [head, tail), only the producer touches it
        unsafe { slot.record.get().write(record) };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer side.
    pub fn try_pop(&self) -> Option<AdvertisementRecord> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let slot = &self.slots[head % N];
        // SAFETY: the producer published this slot with the Release store of tail
        // and will not reuse it until head moves past it
        let record = unsafe { slot.record.get().read() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(record)
    }
}

impl<const N: usize> Default for AdvertisementQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: SPSC only, one producer context and one consumer context.
unsafe impl<const N: usize> Sync for AdvertisementQueue<N> {}
