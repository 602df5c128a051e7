// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Append-only record log on NOR flash.
//!
//! The region is split into erase pages. Each page in use starts with a
//! header, followed by records packed back to back:
//!
//! ```text
//! page header (12):  magic u32 | generation u32 | source page u32
//! record (16 + n):   file_id u16 | key u16 | id u32 | seq u32 | len u8 | kind u8 | crc16 | payload, padded to 4
//! ```
//!
//! Updates write a new version of a record and deletes write a tombstone; the
//! version with the highest write sequence wins. One erased page is always
//! held back so that a page full of stale versions can be compacted into it.
//! A compacted page names its source in the header, which lets a reboot
//! finish an interrupted compaction.
//!
//! All integers are little endian.

use crate::Error;
use consts::MAX_LOG_RECORDS;
use crc::{Crc, CRC_16_IBM_3740};
use embedded_storage_async::nor_flash::NorFlash;
use heapless::{LinearMap, Vec};

/// Log-assigned record handle, stable for the life of the record.
pub type RecordId = u32;

/// Largest record payload in bytes.
pub const MAX_PAYLOAD: usize = 16;
/// Most erase pages a log can span.
pub const MAX_PAGES: usize = 8;
/// Fewest erase pages a log can span: one for data, one held in reserve and
/// one to absorb the stale versions between two compactions.
pub const MIN_PAGES: usize = 3;

const PAGE_MAGIC: u32 = 0x4758_4C52;
const ERASED_WORD: u32 = 0xFFFF_FFFF;
const NO_SOURCE: u32 = 0xFFFF_FFFF;
const PAGE_HEADER_SIZE: u32 = 12;
const RECORD_HEADER_SIZE: usize = 16;
const MAX_RECORD_SIZE: usize = RECORD_HEADER_SIZE + MAX_PAYLOAD;
const MIN_PAGE_SIZE: usize = 256;

const KIND_DATA: u8 = 0x01;
const KIND_TOMBSTONE: u8 = 0x02;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// A live record, as handed out by [`KeyValueLog::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub id: RecordId,
    pub file_id: u16,
    pub key: u16,
    pub data: &'a [u8],
}

/// Usage figures, all in 32-bit words unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogStat {
    pub pages: usize,
    pub page_words: u32,
    /// Erased pages, the compaction reserve included.
    pub free_pages: usize,
    pub valid_records: usize,
    /// Stale versions and tombstones that compaction would drop.
    pub dirty_records: usize,
    pub words_used: u32,
    pub freeable_words: u32,
    pub largest_contig: u32,
}

impl LogStat {
    /// Reclaim once this many words are freeable.
    pub fn gc_threshold(&self) -> u32 {
        (self.pages.saturating_sub(2) as u32) * self.page_words
    }

    pub fn needs_gc(&self) -> bool {
        self.freeable_words > self.gc_threshold()
    }
}

/// Flash-backed key/value record store.
///
/// Operations that return `Ok` are durable. Records are grouped by `file_id`
/// and typed by `key`; neither needs to be unique.
#[allow(async_fn_in_trait)]
pub trait KeyValueLog {
    /// Writes a new record and returns its id.
    async fn append(&mut self, file_id: u16, key: u16, data: &[u8]) -> Result<RecordId, Error>;

    /// Replaces the payload of a live record.
    async fn update(&mut self, id: RecordId, data: &[u8]) -> Result<(), Error>;

    async fn delete(&mut self, id: RecordId) -> Result<(), Error>;

    /// Calls `visit` for every live record.
    async fn scan(&mut self, visit: impl FnMut(Record<'_>)) -> Result<(), Error>;

    /// Usage figures, without touching the flash.
    fn stat(&self) -> LogStat;

    /// Compacts every page holding stale data.
    async fn reclaim(&mut self) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHeader {
    file_id: u16,
    key: u16,
    id: RecordId,
    seq: u32,
    len: u8,
    kind: u8,
}

impl RecordHeader {
    fn size(&self) -> u32 {
        (RECORD_HEADER_SIZE + padded(self.len as usize)) as u32
    }

    fn encode(&self, payload: &[u8], out: &mut [u8; MAX_RECORD_SIZE]) -> usize {
        let size = self.size() as usize;
        let end = RECORD_HEADER_SIZE + payload.len();
        out[0..2].copy_from_slice(&self.file_id.to_le_bytes());
        out[2..4].copy_from_slice(&self.key.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..12].copy_from_slice(&self.seq.to_le_bytes());
        out[12] = self.len;
        out[13] = self.kind;
        out[RECORD_HEADER_SIZE..end].copy_from_slice(payload);
        out[end..size].fill(0xFF);
        let crc = record_crc(&out[..14], &out[RECORD_HEADER_SIZE..size]);
        out[14..16].copy_from_slice(&crc.to_le_bytes());
        size
    }

    /// Parses and checks the record at the start of `bytes`. `None` for
    /// anything short of a complete record with a matching checksum.
    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return None;
        }
        let header = Self {
            file_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            key: u16::from_le_bytes([bytes[2], bytes[3]]),
            id: le32(&bytes[4..8]),
            seq: le32(&bytes[8..12]),
            len: bytes[12],
            kind: bytes[13],
        };
        let valid_len = match header.kind {
            KIND_DATA => header.len as usize <= MAX_PAYLOAD,
            KIND_TOMBSTONE => header.len == 0,
            _ => false,
        };
        let size = header.size() as usize;
        if !valid_len || header.id == ERASED_WORD || size > bytes.len() {
            return None;
        }
        let stored = u16::from_le_bytes([bytes[14], bytes[15]]);
        (record_crc(&bytes[..14], &bytes[RECORD_HEADER_SIZE..size]) == stored).then_some(header)
    }
}

fn record_crc(header: &[u8], payload: &[u8]) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(header);
    digest.update(payload);
    digest.finalize()
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn is_erased(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0xFF)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageHeader {
    Erased,
    Valid { generation: u32, source: Option<usize> },
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Free,
    Data { generation: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Page {
    state: PageState,
    /// Write cursor, in bytes from the page start.
    used: u32,
    /// Records written to the page, stale versions included.
    records: usize,
}

impl Page {
    const FREE: Self = Self {
        state: PageState::Free,
        used: 0,
        records: 0,
    };

    fn is_data(&self) -> bool {
        matches!(self.state, PageState::Data { .. })
    }
}

/// Where the newest version of a record lives.
#[derive(Debug, Clone, Copy)]
struct Entry {
    file_id: u16,
    key: u16,
    seq: u32,
    len: u8,
    tombstone: bool,
    page: u8,
    offset: u32,
    /// Pages holding any version of the record, stale ones included.
    pages: u8,
}

impl Entry {
    fn new(header: &RecordHeader, page: usize, offset: u32) -> Self {
        let mut entry = Self {
            file_id: header.file_id,
            key: header.key,
            seq: 0,
            len: 0,
            tombstone: false,
            page: 0,
            offset: 0,
            pages: 0,
        };
        entry.place(header, page, offset);
        entry
    }

    fn place(&mut self, header: &RecordHeader, page: usize, offset: u32) {
        self.seq = header.seq;
        self.len = header.len;
        self.tombstone = header.kind == KIND_TOMBSTONE;
        self.page = page as u8;
        self.offset = offset;
        self.pages |= 1 << page;
    }

    fn size(&self) -> u32 {
        (RECORD_HEADER_SIZE + padded(self.len as usize)) as u32
    }

    /// A tombstone only matters while an older version could resurface.
    fn keep(&self) -> bool {
        !self.tombstone || self.pages & !(1 << self.page) != 0
    }
}

/// [`KeyValueLog`] over a range of erase pages of a [`NorFlash`].
///
/// `F` must write in units of at most 4 bytes. The index of live records is
/// kept in RAM and rebuilt by [`FlashLog::mount`].
pub struct FlashLog<F> {
    flash: F,
    base: u32,
    pages: Vec<Page, MAX_PAGES>,
    index: LinearMap<RecordId, Entry, MAX_LOG_RECORDS>,
    next_id: RecordId,
    next_seq: u32,
    generation: u32,
}

impl<F: NorFlash> FlashLog<F> {
    const PAGE_SIZE: u32 = F::ERASE_SIZE as u32;

    /// Opens the log stored in `page_count` erase pages starting at `base`,
    /// formatting blank pages and repairing whatever a power loss left
    /// behind.
    pub async fn mount(flash: F, base: u32, page_count: usize) -> Result<Self, Error> {
        let fits = (base as usize)
            .checked_add(page_count * F::ERASE_SIZE)
            .is_some_and(|end| end <= flash.capacity());
        if !(MIN_PAGES..=MAX_PAGES).contains(&page_count)
            || F::ERASE_SIZE < MIN_PAGE_SIZE
            || F::ERASE_SIZE % 4 != 0
            || 4 % F::WRITE_SIZE != 0
            || 4 % F::READ_SIZE != 0
            || base % Self::PAGE_SIZE != 0
            || !fits
        {
            error!("log geometry rejected: base {} pages {}", base, page_count);
            return Err(Error::Geometry);
        }

        let mut log = Self {
            flash,
            base,
            pages: Vec::new(),
            index: LinearMap::new(),
            next_id: 1,
            next_seq: 1,
            generation: 0,
        };
        for _ in 0..page_count {
            log.pages.push(Page::FREE).map_err(|_| Error::Geometry)?;
        }
        log.recover().await?;
        Ok(log)
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Gives the flash back, dropping the in-RAM index.
    pub fn release(self) -> F {
        self.flash
    }

    fn page_addr(&self, page: usize) -> u32 {
        self.base + page as u32 * Self::PAGE_SIZE
    }

    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.flash.read(addr, buf).await.map_err(Error::flash)
    }

    async fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), Error> {
        self.flash.write(addr, buf).await.map_err(Error::flash)
    }

    async fn erase_page(&mut self, page: usize) -> Result<(), Error> {
        let addr = self.page_addr(page);
        self.flash
            .erase(addr, addr + Self::PAGE_SIZE)
            .await
            .map_err(Error::flash)?;
        self.pages[page] = Page::FREE;
        Ok(())
    }

    async fn read_page_header(&mut self, page: usize) -> Result<PageHeader, Error> {
        let mut buf = [0u8; PAGE_HEADER_SIZE as usize];
        self.read(self.page_addr(page), &mut buf).await?;
        let source = le32(&buf[8..12]);
        Ok(match le32(&buf[0..4]) {
            ERASED_WORD => PageHeader::Erased,
            PAGE_MAGIC if source == NO_SOURCE => PageHeader::Valid {
                generation: le32(&buf[4..8]),
                source: None,
            },
            PAGE_MAGIC if (source as usize) < self.pages.len() && source as usize != page => PageHeader::Valid {
                generation: le32(&buf[4..8]),
                source: Some(source as usize),
            },
            _ => PageHeader::Invalid,
        })
    }

    /// Writes the header that turns `page` into a data page. The magic goes
    /// last so a torn header reads as an unfinished page.
    async fn write_page_header(&mut self, page: usize, source: Option<usize>) -> Result<u32, Error> {
        let generation = self.generation.wrapping_add(1);
        let addr = self.page_addr(page);
        let mut tail = [0u8; 8];
        tail[..4].copy_from_slice(&generation.to_le_bytes());
        tail[4..].copy_from_slice(&source.map_or(NO_SOURCE, |s| s as u32).to_le_bytes());
        self.write(addr + 4, &tail).await?;
        self.write(addr, &PAGE_MAGIC.to_le_bytes()).await?;
        self.generation = generation;
        Ok(generation)
    }

    async fn page_is_blank(&mut self, page: usize) -> Result<bool, Error> {
        let addr = self.page_addr(page);
        let mut buf = [0u8; 64];
        let mut offset = 0;
        while offset < Self::PAGE_SIZE {
            let n = buf.len().min((Self::PAGE_SIZE - offset) as usize);
            self.read(addr + offset, &mut buf[..n]).await?;
            if !is_erased(&buf[..n]) {
                return Ok(false);
            }
            offset += n as u32;
        }
        Ok(true)
    }

    async fn recover(&mut self) -> Result<(), Error> {
        let count = self.pages.len();
        let mut headers: Vec<PageHeader, MAX_PAGES> = Vec::new();
        for page in 0..count {
            let header = self.read_page_header(page).await?;
            headers.push(header).map_err(|_| Error::Geometry)?;
        }

        // A committed compaction whose source was not erased yet
        let mut stale = 0u8;
        for header in headers.iter() {
            if let PageHeader::Valid {
                generation,
                source: Some(source),
            } = *header
            {
                match headers[source] {
                    PageHeader::Valid { generation: older, .. } if older < generation => stale |= 1 << source,
                    PageHeader::Invalid => stale |= 1 << source,
                    _ => {}
                }
            }
        }

        for (page, header) in headers.iter().enumerate() {
            match *header {
                PageHeader::Valid { generation, .. } => {
                    self.generation = self.generation.max(generation);
                    if stale & (1 << page) != 0 {
                        warn!("log page {} already compacted, erasing", page);
                        self.erase_page(page).await?;
                    } else {
                        self.pages[page].state = PageState::Data { generation };
                    }
                }
                PageHeader::Invalid => {
                    warn!("log page {} has no valid header, erasing", page);
                    self.erase_page(page).await?;
                }
                PageHeader::Erased => {
                    if !self.page_is_blank(page).await? {
                        warn!("log page {} was left half written, erasing", page);
                        self.erase_page(page).await?;
                    }
                }
            }
        }

        if self.free_pages() == 0 {
            error!("log has no reserve page");
            return Err(Error::Corrupted);
        }

        let mut last_id = 0;
        let mut last_seq = 0;
        for page in 0..count {
            if self.pages[page].is_data() {
                self.scan_page(page, &mut last_id, &mut last_seq).await?;
            }
        }
        self.forget_tombstones();
        self.next_id = last_id + 1;
        self.next_seq = last_seq + 1;

        info!(
            "log mounted: {} records, next id {}, generation {}",
            self.index.len(),
            self.next_id,
            self.generation
        );
        Ok(())
    }

    async fn scan_page(&mut self, page: usize, last_id: &mut RecordId, last_seq: &mut u32) -> Result<(), Error> {
        let addr = self.page_addr(page);
        let mut offset = PAGE_HEADER_SIZE;
        let mut records = 0;
        while Self::PAGE_SIZE - offset >= RECORD_HEADER_SIZE as u32 {
            let mut buf = [0u8; MAX_RECORD_SIZE];
            let span = MAX_RECORD_SIZE.min((Self::PAGE_SIZE - offset) as usize);
            self.read(addr + offset, &mut buf[..span]).await?;
            if is_erased(&buf[..span]) {
                break;
            }
            let Some(header) = RecordHeader::decode(&buf[..span]) else {
                warn!("torn record on log page {} at {}, closing page", page, offset);
                offset = Self::PAGE_SIZE;
                break;
            };
            self.index_version(&header, page, offset)?;
            *last_id = (*last_id).max(header.id);
            *last_seq = (*last_seq).max(header.seq);
            offset += header.size();
            records += 1;
        }
        self.pages[page].used = offset;
        self.pages[page].records = records;
        Ok(())
    }

    fn index_version(&mut self, header: &RecordHeader, page: usize, offset: u32) -> Result<(), Error> {
        if let Some(entry) = self.index.get_mut(&header.id) {
            if header.seq > entry.seq {
                entry.place(header, page, offset);
            } else {
                entry.pages |= 1 << page;
            }
            return Ok(());
        }
        self.index
            .insert(header.id, Entry::new(header, page, offset))
            .map_err(|_| Error::IndexFull)?;
        Ok(())
    }

    fn forget_tombstones(&mut self) {
        let mut dead: Vec<RecordId, MAX_LOG_RECORDS> = Vec::new();
        for (id, entry) in self.index.iter() {
            if !entry.keep() && dead.push(*id).is_err() {
                break;
            }
        }
        for id in dead {
            self.index.remove(&id);
        }
    }

    fn free_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_data()).count()
    }

    /// Bytes and record count that compacting `page` would carry over.
    fn kept_on(&self, page: usize) -> (u32, usize) {
        self.index
            .values()
            .filter(|e| e.page as usize == page && e.keep())
            .fold((0, 0), |(bytes, n), e| (bytes + e.size(), n + 1))
    }

    fn freeable_on(&self, page: usize) -> u32 {
        let (kept, _) = self.kept_on(page);
        self.pages[page].used.saturating_sub(PAGE_HEADER_SIZE + kept) / 4
    }

    /// Picks the page for a record of `size` bytes, opening a fresh page if
    /// that still leaves the reserve untouched.
    async fn page_with_room(&mut self, size: u32) -> Result<usize, Error> {
        let newest = self
            .pages
            .iter()
            .enumerate()
            .filter_map(|(n, page)| match page.state {
                PageState::Data { generation } if page.used + size <= Self::PAGE_SIZE => Some((generation, n)),
                _ => None,
            })
            .max();
        if let Some((_, page)) = newest {
            return Ok(page);
        }
        if self.free_pages() < 2 {
            return Err(Error::LogFull);
        }
        let page = self.pages.iter().position(|p| !p.is_data()).ok_or(Error::LogFull)?;
        let generation = self.write_page_header(page, None).await?;
        self.pages[page] = Page {
            state: PageState::Data { generation },
            used: PAGE_HEADER_SIZE,
            records: 0,
        };
        debug!("log page {} opened, generation {}", page, generation);
        Ok(page)
    }

    async fn write_record(&mut self, header: &RecordHeader, payload: &[u8]) -> Result<(usize, u32), Error> {
        let size = header.size();
        let page = self.page_with_room(size).await?;
        let offset = self.pages[page].used;
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let n = header.encode(payload, &mut buf);
        if let Err(e) = self.write(self.page_addr(page) + offset, &buf[..n]).await {
            // The slot may be partially programmed, never write there again
            self.pages[page].used = Self::PAGE_SIZE;
            return Err(e);
        }
        self.pages[page].used += size;
        self.pages[page].records += 1;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok((page, offset))
    }

    fn live_entry(&self, id: RecordId) -> Result<Entry, Error> {
        match self.index.get(&id) {
            Some(entry) if !entry.tombstone => Ok(*entry),
            _ => Err(Error::NoSuchRecord),
        }
    }

    /// Moves the records worth keeping from `victim` to the reserve page,
    /// then erases `victim`, which becomes the new reserve.
    async fn compact(&mut self, victim: usize) -> Result<usize, Error> {
        let swap = (0..self.pages.len())
            .find(|&p| p != victim && !self.pages[p].is_data())
            .ok_or(Error::Corrupted)?;
        let victim_addr = self.page_addr(victim);
        let swap_addr = self.page_addr(swap);

        let mut moved: Vec<(RecordId, u32), MAX_LOG_RECORDS> = Vec::new();
        let mut cursor = PAGE_HEADER_SIZE;
        for (id, entry) in self.index.iter() {
            if entry.page as usize != victim || !entry.keep() {
                continue;
            }
            let size = entry.size() as usize;
            let mut buf = [0u8; MAX_RECORD_SIZE];
            self.flash
                .read(victim_addr + entry.offset, &mut buf[..size])
                .await
                .map_err(Error::flash)?;
            if RecordHeader::decode(&buf[..size]).map(|h| h.id) != Some(*id) {
                error!("log record {} unreadable on page {}", *id, victim);
                return Err(Error::Corrupted);
            }
            self.flash
                .write(swap_addr + cursor, &buf[..size])
                .await
                .map_err(Error::flash)?;
            moved.push((*id, cursor)).map_err(|_| Error::IndexFull)?;
            cursor += size as u32;
        }

        let generation = self.write_page_header(swap, Some(victim)).await?;
        self.pages[swap] = Page {
            state: PageState::Data { generation },
            used: cursor,
            records: moved.len(),
        };
        for (id, offset) in moved {
            if let Some(entry) = self.index.get_mut(&id) {
                entry.page = swap as u8;
                entry.offset = offset;
                entry.pages |= 1 << swap;
            }
        }

        self.erase_page(victim).await?;
        for entry in self.index.values_mut() {
            entry.pages &= !(1 << victim);
        }
        self.forget_tombstones();
        debug!("log page {} compacted into page {}", victim, swap);
        Ok(swap)
    }
}

impl<F: NorFlash> KeyValueLog for FlashLog<F> {
    async fn append(&mut self, file_id: u16, key: u16, data: &[u8]) -> Result<RecordId, Error> {
        if data.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge);
        }
        if self.index.len() == self.index.capacity() {
            return Err(Error::IndexFull);
        }
        let header = RecordHeader {
            file_id,
            key,
            id: self.next_id,
            seq: self.next_seq,
            len: data.len() as u8,
            kind: KIND_DATA,
        };
        let (page, offset) = self.write_record(&header, data).await?;
        self.next_id += 1;
        self.index
            .insert(header.id, Entry::new(&header, page, offset))
            .map_err(|_| Error::IndexFull)?;
        trace!("log append {} on page {} at {}", header.id, page, offset);
        Ok(header.id)
    }

    async fn update(&mut self, id: RecordId, data: &[u8]) -> Result<(), Error> {
        if data.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge);
        }
        let entry = self.live_entry(id)?;
        let header = RecordHeader {
            file_id: entry.file_id,
            key: entry.key,
            id,
            seq: self.next_seq,
            len: data.len() as u8,
            kind: KIND_DATA,
        };
        let (page, offset) = self.write_record(&header, data).await?;
        if let Some(entry) = self.index.get_mut(&id) {
            entry.place(&header, page, offset);
        }
        Ok(())
    }

    async fn delete(&mut self, id: RecordId) -> Result<(), Error> {
        let entry = self.live_entry(id)?;
        let header = RecordHeader {
            file_id: entry.file_id,
            key: entry.key,
            id,
            seq: self.next_seq,
            len: 0,
            kind: KIND_TOMBSTONE,
        };
        let (page, offset) = self.write_record(&header, &[]).await?;
        if let Some(entry) = self.index.get_mut(&id) {
            entry.place(&header, page, offset);
            if !entry.keep() {
                self.index.remove(&id);
            }
        }
        Ok(())
    }

    async fn scan(&mut self, mut visit: impl FnMut(Record<'_>)) -> Result<(), Error> {
        for (id, entry) in self.index.iter() {
            if entry.tombstone {
                continue;
            }
            let size = entry.size() as usize;
            let addr = self.base + entry.page as u32 * Self::PAGE_SIZE + entry.offset;
            let mut buf = [0u8; MAX_RECORD_SIZE];
            self.flash.read(addr, &mut buf[..size]).await.map_err(Error::flash)?;
            let header = match RecordHeader::decode(&buf[..size]) {
                Some(h) if h.id == *id => h,
                _ => {
                    error!("log record {} unreadable", *id);
                    return Err(Error::Corrupted);
                }
            };
            visit(Record {
                id: *id,
                file_id: header.file_id,
                key: header.key,
                data: &buf[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + header.len as usize],
            });
        }
        Ok(())
    }

    fn stat(&self) -> LogStat {
        let page_words = Self::PAGE_SIZE / 4;
        let mut stat = LogStat {
            pages: self.pages.len(),
            page_words,
            ..Default::default()
        };
        for (n, page) in self.pages.iter().enumerate() {
            if !page.is_data() {
                stat.free_pages += 1;
                continue;
            }
            let (_, kept) = self.kept_on(n);
            stat.words_used += page.used / 4;
            stat.freeable_words += self.freeable_on(n);
            stat.dirty_records += page.records.saturating_sub(kept);
            stat.largest_contig = stat.largest_contig.max((Self::PAGE_SIZE - page.used) / 4);
        }
        if stat.free_pages >= 2 {
            stat.largest_contig = stat.largest_contig.max(page_words - PAGE_HEADER_SIZE / 4);
        }
        stat.valid_records = self.index.values().filter(|e| !e.tombstone).count();
        stat
    }

    async fn reclaim(&mut self) -> Result<(), Error> {
        let mut done = 0u8;
        loop {
            let victim = (0..self.pages.len())
                .filter(|&p| done & (1 << p) == 0 && self.pages[p].is_data())
                .map(|p| (self.freeable_on(p), p))
                .filter(|(words, _)| *words > 0)
                .max();
            let Some((words, victim)) = victim else {
                break;
            };
            debug!("compacting log page {}, {} words freeable", victim, words);
            let swap = self.compact(victim).await?;
            done |= (1 << victim) | (1 << swap);
        }
        Ok(())
    }
}
