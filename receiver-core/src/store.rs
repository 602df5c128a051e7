// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Enrolled transmitters and their last accepted sequence numbers.
//!
//! Two record types share the receiver's namespace in the log. A registry
//! record holds the 16-byte identity; its record id is referenced by the
//! transmitter's sequence record (`registry id u32 | sequence u32`), so the
//! identity is stored once and the frequently rewritten record stays small.

use crate::log::{KeyValueLog, LogStat, RecordId};
use crate::message::TransmitterIdentity;
use crate::Error;
use consts::{MAX_LOG_RECORDS, MAX_TRANSMITTERS, REGISTRY_RECORD_KEY, SEQUENCE_RECORD_KEY, STORAGE_FILE_ID};
use heapless::{LinearMap, Vec};

const SEQUENCE_RECORD_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    registry: RecordId,
    sequence: Option<(RecordId, u32)>,
}

fn decode_sequence(data: &[u8]) -> Option<(RecordId, u32)> {
    if data.len() != SEQUENCE_RECORD_SIZE {
        return None;
    }
    Some((
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
    ))
}

fn encode_sequence(registry: RecordId, value: u32) -> [u8; SEQUENCE_RECORD_SIZE] {
    let mut out = [0u8; SEQUENCE_RECORD_SIZE];
    out[..4].copy_from_slice(&registry.to_le_bytes());
    out[4..].copy_from_slice(&value.to_le_bytes());
    out
}

/// Deletes `id`, collecting garbage once if the log has no room for the
/// tombstone.
async fn delete_reclaiming<L: KeyValueLog>(log: &mut L, id: RecordId) -> Result<(), Error> {
    match log.delete(id).await {
        Err(Error::LogFull) => {
            log.reclaim().await?;
            log.delete(id).await
        }
        result => result,
    }
}

/// Persistent per-transmitter state on top of a [`KeyValueLog`].
///
/// Lookups are served from RAM; every mutation is durable when it returns.
pub struct PersistentStore<L> {
    log: L,
    slots: LinearMap<TransmitterIdentity, Slot, MAX_TRANSMITTERS>,
}

impl<L: KeyValueLog> PersistentStore<L> {
    /// Loads the registry from `log`. Records without their counterpart,
    /// left behind by an interrupted enrollment, and duplicated sequence
    /// records are deleted.
    pub async fn init(mut log: L) -> Result<Self, Error> {
        let mut registry: Vec<(RecordId, TransmitterIdentity), MAX_TRANSMITTERS> = Vec::new();
        let mut sequences: Vec<(RecordId, RecordId, u32), MAX_LOG_RECORDS> = Vec::new();
        let mut duplicates: Vec<RecordId, MAX_LOG_RECORDS> = Vec::new();
        let mut registry_overflow = false;
        let mut index_overflow = false;

        log.scan(|rec| {
            if rec.file_id != STORAGE_FILE_ID {
                return;
            }
            match rec.key {
                REGISTRY_RECORD_KEY if rec.data.len() == 16 => {
                    let mut uuid = [0u8; 16];
                    uuid.copy_from_slice(rec.data);
                    let identity = TransmitterIdentity(uuid);
                    if registry.iter().any(|(_, known)| *known == identity) {
                        index_overflow |= duplicates.push(rec.id).is_err();
                    } else {
                        registry_overflow |= registry.push((rec.id, identity)).is_err();
                    }
                }
                SEQUENCE_RECORD_KEY => match decode_sequence(rec.data) {
                    Some((owner, value)) => index_overflow |= sequences.push((rec.id, owner, value)).is_err(),
                    None => warn!("malformed sequence record {}", rec.id),
                },
                _ => warn!("unexpected record {} with key {}", rec.id, rec.key),
            }
        })
        .await?;

        if registry_overflow {
            error!("more transmitters stored than the registry holds");
            return Err(Error::RegistryFull);
        }
        if index_overflow {
            error!("more records stored than the log holds");
            return Err(Error::IndexFull);
        }

        let mut slots: LinearMap<TransmitterIdentity, Slot, MAX_TRANSMITTERS> = LinearMap::new();
        for (registry_id, identity) in registry {
            let slot = Slot {
                registry: registry_id,
                sequence: None,
            };
            slots.insert(identity, slot).map_err(|_| Error::RegistryFull)?;
        }

        let mut orphans = duplicates;
        for (record, owner, value) in sequences {
            let slot = slots.values_mut().find(|s: &&mut Slot| s.registry == owner);
            match slot {
                Some(slot) if slot.sequence.is_none() => slot.sequence = Some((record, value)),
                _ => orphans.push(record).map_err(|_| Error::IndexFull)?,
            }
        }

        let mut unfinished: Vec<TransmitterIdentity, MAX_TRANSMITTERS> = Vec::new();
        for (identity, slot) in slots.iter() {
            if slot.sequence.is_none() {
                orphans.push(slot.registry).map_err(|_| Error::IndexFull)?;
                unfinished.push(*identity).map_err(|_| Error::RegistryFull)?;
            }
        }
        for identity in unfinished.iter() {
            warn!("dropping unfinished enrollment of {:?}", identity);
            slots.remove(identity);
        }

        for record in orphans {
            warn!("deleting orphaned record {}", record);
            delete_reclaiming(&mut log, record).await?;
        }

        info!("storage ready, {} transmitters", slots.len());
        Ok(Self { log, slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_enrolled(&self, identity: &TransmitterIdentity) -> bool {
        self.slots.contains_key(identity)
    }

    /// Returns the registry record of `identity`, writing one if needed.
    pub async fn find_or_create_registry(&mut self, identity: &TransmitterIdentity) -> Result<RecordId, Error> {
        if let Some(slot) = self.slots.get(identity) {
            return Ok(slot.registry);
        }
        if self.slots.len() == self.slots.capacity() {
            return Err(Error::RegistryFull);
        }
        let registry = self
            .log
            .append(STORAGE_FILE_ID, REGISTRY_RECORD_KEY, identity.as_le_bytes())
            .await?;
        let slot = Slot {
            registry,
            sequence: None,
        };
        self.slots.insert(*identity, slot).map_err(|_| Error::RegistryFull)?;
        debug!("registered {:?} as record {}", identity, registry);
        Ok(registry)
    }

    /// Last accepted sequence number, `None` for unknown transmitters.
    pub fn get_sequence(&self, identity: &TransmitterIdentity) -> Option<u32> {
        self.slots
            .get(identity)
            .and_then(|slot| slot.sequence)
            .map(|(_, value)| value)
    }

    pub async fn set_sequence(&mut self, identity: &TransmitterIdentity, value: u32) -> Result<(), Error> {
        let slot = *self.slots.get(identity).ok_or(Error::UnknownTransmitter)?;
        let payload = encode_sequence(slot.registry, value);
        let record = match slot.sequence {
            Some((record, _)) => {
                self.log.update(record, &payload).await?;
                record
            }
            None => {
                self.log
                    .append(STORAGE_FILE_ID, SEQUENCE_RECORD_KEY, &payload)
                    .await?
            }
        };
        if let Some(slot) = self.slots.get_mut(identity) {
            slot.sequence = Some((record, value));
        }
        Ok(())
    }

    /// Registers `identity` with `seq_no` as its last accepted sequence.
    ///
    /// On failure a registry record written by this call is deleted again,
    /// leaving `identity` unknown.
    pub async fn enroll(&mut self, identity: &TransmitterIdentity, seq_no: u32) -> Result<(), Error> {
        let created = !self.is_enrolled(identity);
        let registry = self.find_or_create_registry(identity).await?;
        match self.set_sequence(identity, seq_no).await {
            Err(e) if created => {
                self.slots.remove(identity);
                // init() finishes the job if this fails too
                if let Err(undo) = delete_reclaiming(&mut self.log, registry).await {
                    warn!("cannot delete registry record {}: {:?}", registry, undo);
                }
                Err(e)
            }
            result => result,
        }
    }

    /// Deletes every record of the receiver's namespace.
    pub async fn clear_all(&mut self) -> Result<(), Error> {
        let mut records: Vec<RecordId, MAX_LOG_RECORDS> = Vec::new();
        let mut overflow = false;
        self.log
            .scan(|rec| {
                if rec.file_id == STORAGE_FILE_ID {
                    overflow |= records.push(rec.id).is_err();
                }
            })
            .await?;
        if overflow {
            return Err(Error::IndexFull);
        }

        for record in records {
            delete_reclaiming(&mut self.log, record).await?;
        }
        self.slots.clear();
        info!("storage cleared");
        Ok(())
    }

    /// Reclaims stale log space once enough has piled up. Returns whether a
    /// collection ran; below the threshold this does no flash I/O.
    pub async fn run_maintenance(&mut self) -> Result<bool, Error> {
        let stat = self.log.stat();
        if !stat.needs_gc() {
            return Ok(false);
        }
        info!(
            "collecting garbage: {} words freeable, threshold {}",
            stat.freeable_words,
            stat.gc_threshold()
        );
        self.log.reclaim().await?;
        Ok(true)
    }

    pub fn stat(&self) -> LogStat {
        self.log.stat()
    }

    /// Logs usage figures and every record of the namespace.
    pub async fn dump_diagnostics(&mut self) -> Result<(), Error> {
        let stat = self.log.stat();
        info!("pages:          {}", stat.pages);
        info!("free pages:     {}", stat.free_pages);
        info!("valid records:  {}", stat.valid_records);
        info!("dirty records:  {}", stat.dirty_records);
        info!("words used:     {}", stat.words_used);
        info!("largest contig: {}", stat.largest_contig);
        info!("freeable words: {}", stat.freeable_words);
        info!("gc threshold:   {}", stat.gc_threshold());

        self.log
            .scan(|rec| {
                if rec.file_id != STORAGE_FILE_ID {
                    return;
                }
                match rec.key {
                    REGISTRY_RECORD_KEY if rec.data.len() == 16 => {
                        let mut uuid = [0u8; 16];
                        uuid.copy_from_slice(rec.data);
                        info!("record {}: transmitter {:?}", rec.id, TransmitterIdentity(uuid));
                    }
                    SEQUENCE_RECORD_KEY => {
                        if let Some((owner, value)) = decode_sequence(rec.data) {
                            info!("record {}: sequence {} of record {}", rec.id, value, owner);
                        }
                    }
                    _ => info!("record {}: key {}, {} bytes", rec.id, rec.key, rec.data.len()),
                }
            })
            .await
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Hands the log back, for a remount.
    pub fn into_log(self) -> L {
        self.log
    }
}
