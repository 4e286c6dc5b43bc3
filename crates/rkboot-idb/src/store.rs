//! The replicated ID-block store: where the copies live on flash and how
//! they are read back, reconciled and rewritten.

use rkboot_proto::{
    BadBlockMap, BulkPipe, FlashInfo, Transport, MAX_TRANSFER_SECTORS, PHYS_SECTOR_LEN,
    SECTOR_LEN,
};

use crate::codec::{IdbSectors, IDB_SECTORS};
use crate::error::IdbError;

/// Replication factor: the ID block is mirrored across up to five blocks.
pub const IDB_MAX_COPIES: usize = 5;

/// Discovered copy locations plus the decoded sector records.
#[derive(Debug, Default)]
pub struct IdbStore {
    offsets: [u32; IDB_MAX_COPIES],
    count: usize,
    sectors: Option<IdbSectors>,
}

impl IdbStore {
    /// Scans the first fifty blocks for ID block copies, skipping bad
    /// blocks, and records up to five hits. A block qualifies when its
    /// descrambled first sector carries the sector-0 magic and its second
    /// sector the expected chip tag. Unreadable blocks are skipped, not
    /// fatal.
    pub fn discover<P: BulkPipe>(
        transport: &mut Transport<P>,
        flash: &FlashInfo,
        bad_blocks: &BadBlockMap,
    ) -> Result<IdbStore, IdbError> {
        let mut store = IdbStore::default();
        let mut from = 0usize;
        while store.count < IDB_MAX_COPIES {
            let Some(block) = bad_blocks.next_good_block(from) else {
                break;
            };
            from = block + 1;

            let address = (block as u32 * flash.sectors_per_block) << 8;
            let data = match transport.read_sectors(address, IDB_SECTORS as u16) {
                Ok(data) => data,
                Err(err) => {
                    tracing::debug!(block, error = %err, "skipping unreadable block");
                    continue;
                }
            };
            if IdbSectors::probe(&data) {
                tracing::debug!(block, "found id block copy");
                store.offsets[store.count] = block as u32;
                store.count += 1;
            }
        }
        tracing::debug!(copies = store.count, "id block discovery finished");
        Ok(store)
    }

    pub fn copy_count(&self) -> usize {
        self.count
    }

    pub fn copy_offsets(&self) -> &[u32] {
        &self.offsets[..self.count]
    }

    pub fn sectors(&self) -> Option<&IdbSectors> {
        self.sectors.as_ref()
    }

    pub fn sectors_mut(&mut self) -> Result<&mut IdbSectors, IdbError> {
        self.sectors.as_mut().ok_or(IdbError::NoIdb)
    }

    /// Reads and reconciles the replicated copies, then decodes the winner
    /// into sector records. Requires at least one discovered copy.
    pub fn read<P: BulkPipe>(
        &mut self,
        transport: &mut Transport<P>,
        flash: &FlashInfo,
    ) -> Result<(), IdbError> {
        if self.count == 0 {
            return Err(IdbError::NoIdb);
        }
        let data = self.reconciled_copy(transport, flash)?;
        self.sectors = Some(IdbSectors::decode(&data)?);
        Ok(())
    }

    /// Last-differing-copy reconciliation, deliberately not a majority
    /// vote: hold the first readable copy; a later copy that matches the
    /// held data region byte for byte settles the read, a later copy that
    /// differs replaces the held content. Ties therefore favor the earliest
    /// copy and disagreements the most recent one, which is what promotes a
    /// newer half-written generation after an interrupted rewrite.
    fn reconciled_copy<P: BulkPipe>(
        &self,
        transport: &mut Transport<P>,
        flash: &FlashInfo,
    ) -> Result<Vec<u8>, IdbError> {
        let mut held: Option<Vec<u8>> = None;
        for &block in self.copy_offsets() {
            let pos = block * flash.sectors_per_block;
            let data = match self.read_multi(transport, flash, pos, IDB_SECTORS as u32) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(block, error = %err, "skipping unreadable id block copy");
                    continue;
                }
            };
            match held.take() {
                Some(current) if data_regions_equal(&current, &data) => return Ok(current),
                _ => held = Some(data),
            }
        }
        held.ok_or(IdbError::NoReadableCopy(self.count))
    }

    /// Multi-sector read confined to the valid-sector window of each
    /// block: at most 16 sectors per transfer, rolling into the next block
    /// once the window is exhausted.
    fn read_multi<P: BulkPipe>(
        &self,
        transport: &mut Transport<P>,
        flash: &FlashInfo,
        pos: u32,
        count: u32,
    ) -> Result<Vec<u8>, IdbError> {
        let per_block = flash.sectors_per_block;
        let valid = flash.valid_sectors_per_block;

        let mut block = pos / per_block;
        let used = pos - block * per_block;
        let mut valid_left = valid.saturating_sub(used);
        if valid_left == 0 {
            block += 1;
            valid_left = valid;
        }

        let mut remaining = count;
        let mut out = Vec::with_capacity(count as usize * PHYS_SECTOR_LEN);
        while remaining > 0 {
            let batch = remaining
                .min(u32::from(MAX_TRANSFER_SECTORS))
                .min(valid_left);
            let sector = block * per_block + (valid - valid_left);
            let data = transport.read_sectors(sector << 8, batch as u16)?;
            let want = batch as usize * PHYS_SECTOR_LEN;
            if data.len() < want {
                return Err(IdbError::ShortRead {
                    want,
                    got: data.len(),
                });
            }
            out.extend_from_slice(&data[..want]);

            remaining -= batch;
            valid_left -= batch;
            if valid_left == 0 {
                block += 1;
                valid_left = valid;
            }
        }
        Ok(out)
    }

    /// Rewrites every discovered copy with the current records.
    ///
    /// The boot region of a copy spans `boot_code_size + boot_data_size -
    /// boot_code1_offset` physical sectors; erasing a block wipes all of
    /// it, so the whole region is backed up from copy 0 first. The first
    /// four sectors are then re-encoded from the records (with the backup's
    /// OOB carry bytes) and the remainder of the region is restored from
    /// backup verbatim. Each copy is erased, written in 16-sector batches,
    /// and every batch is read back and compared over its 512-byte data
    /// regions before the next copy is touched.
    ///
    /// A copy recorded at block offset 0 is reserved and skipped entirely.
    /// `read_write_times` is incremented once per call.
    pub fn write<P: BulkPipe>(
        &mut self,
        transport: &mut Transport<P>,
        flash: &FlashInfo,
    ) -> Result<(), IdbError> {
        if self.count == 0 {
            return Err(IdbError::NoIdb);
        }
        let records = self.sectors.as_mut().ok_or(IdbError::NoIdb)?;

        let total =
            u32::from(records.sec0.boot_code_size) + u32::from(records.sec0.boot_data_size);
        let region = total.saturating_sub(u32::from(records.sec0.boot_code1_offset));
        // The region must at least cover the four ID sectors and cannot
        // extend past the block the rewrite erases.
        if region < IDB_SECTORS as u32 || region > flash.sectors_per_block {
            return Err(IdbError::BadBootRegion(region));
        }

        let base = self.offsets[0] * flash.sectors_per_block;
        let mut backup = Vec::with_capacity(region as usize * PHYS_SECTOR_LEN);
        let mut done = 0u32;
        while done < region {
            let batch = (region - done).min(u32::from(MAX_TRANSFER_SECTORS));
            let data = transport.read_sectors((base + done) << 8, batch as u16)?;
            let want = batch as usize * PHYS_SECTOR_LEN;
            if data.len() < want {
                return Err(IdbError::ShortRead {
                    want,
                    got: data.len(),
                });
            }
            backup.extend_from_slice(&data[..want]);
            done += batch;
        }

        records.sec1.read_write_times = records.sec1.read_write_times.wrapping_add(1);
        let encoded = records.encode(&backup)?;

        let mut image = Vec::with_capacity(backup.len());
        for sector in &encoded {
            image.extend_from_slice(sector);
        }
        image.extend_from_slice(&backup[IDB_SECTORS * PHYS_SECTOR_LEN..]);

        for &block in self.copy_offsets() {
            if block == 0 {
                tracing::debug!("skipping reserved id block copy at block 0");
                continue;
            }
            tracing::debug!(block, sectors = region, "rewriting id block copy");
            transport.erase_blocks(block, 1)?;

            let base = block * flash.sectors_per_block;
            let mut done = 0u32;
            while done < region {
                let batch = (region - done).min(u32::from(MAX_TRANSFER_SECTORS));
                let start = done as usize * PHYS_SECTOR_LEN;
                let end = start + batch as usize * PHYS_SECTOR_LEN;
                let address = (base + done) << 8;

                transport.write_sectors(address, &image[start..end])?;

                let readback = transport.read_sectors(address, batch as u16)?;
                if readback.len() < end - start {
                    return Err(IdbError::ShortRead {
                        want: end - start,
                        got: readback.len(),
                    });
                }
                for sector in 0..batch as usize {
                    let offset = sector * PHYS_SECTOR_LEN;
                    let written = &image[start + offset..start + offset + SECTOR_LEN];
                    let read = &readback[offset..offset + SECTOR_LEN];
                    if written != read {
                        return Err(IdbError::VerifyMismatch((base + done + sector as u32) << 8));
                    }
                }
                done += batch;
            }
        }
        Ok(())
    }
}

/// Byte-for-byte comparison of the 512-byte data region of each physical
/// sector in two equally sized reads.
fn data_regions_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.chunks(PHYS_SECTOR_LEN)
        .zip(b.chunks(PHYS_SECTOR_LEN))
        .all(|(sa, sb)| {
            let len = sa.len().min(SECTOR_LEN);
            sa[..len] == sb[..len]
        })
}
