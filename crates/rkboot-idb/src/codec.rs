//! Conversion between decoded sector records and the 528-byte physical
//! sectors stored on NAND.

use rkboot_codec::{bch_encode, crc16, rc4_xor, BCH_DATA_LEN};
use rkboot_proto::{PHYS_SECTOR_LEN, SECTOR_LEN};

use crate::error::IdbError;
use crate::sector::{Sec0, Sec1, Sec2, Sec3, CHIP_TAG_RK28, SEC0_TAG};

/// Logical sectors per ID block.
pub const IDB_SECTORS: usize = 4;

/// The four decoded logical sectors of one ID block copy.
#[derive(Clone, Debug, Default)]
pub struct IdbSectors {
    pub sec0: Sec0,
    pub sec1: Sec1,
    pub sec2: Sec2,
    pub sec3: Sec3,
}

/// Copies the 512-byte data region of physical sector `index` out of a raw
/// multi-sector read.
fn sector_body(phys: &[u8], index: usize) -> [u8; SECTOR_LEN] {
    let start = index * PHYS_SECTOR_LEN;
    let mut body = [0u8; SECTOR_LEN];
    body.copy_from_slice(&phys[start..start + SECTOR_LEN]);
    body
}

impl IdbSectors {
    /// Decodes four physical sectors as read from the device. The device
    /// already applied BCH correction, so the OOB bytes are ignored here;
    /// sectors 0, 2 and 3 are descrambled, sector 1 is cleartext.
    ///
    /// Tags are not validated at this point; the discovery scan already
    /// checked them.
    pub fn decode(phys: &[u8]) -> Result<IdbSectors, IdbError> {
        let want = IDB_SECTORS * PHYS_SECTOR_LEN;
        if phys.len() < want {
            return Err(IdbError::ShortRead {
                want,
                got: phys.len(),
            });
        }

        let mut body0 = sector_body(phys, 0);
        rc4_xor(&mut body0, 0, SECTOR_LEN);
        let body1 = sector_body(phys, 1);
        let mut body2 = sector_body(phys, 2);
        rc4_xor(&mut body2, 0, SECTOR_LEN);
        let mut body3 = sector_body(phys, 3);
        rc4_xor(&mut body3, 0, SECTOR_LEN);

        Ok(IdbSectors {
            sec0: Sec0::parse(&body0),
            sec1: Sec1::parse(&body1),
            sec2: Sec2::parse(&body2),
            sec3: Sec3::parse(&body3),
        })
    }

    /// Discovery probe: does this raw read look like an ID block? Checks
    /// the sector 0 magic under RC4 and the cleartext sector 1 chip tag.
    pub fn probe(phys: &[u8]) -> bool {
        if phys.len() < 2 * PHYS_SECTOR_LEN {
            return false;
        }
        let mut body0 = sector_body(phys, 0);
        rc4_xor(&mut body0, 0, SECTOR_LEN);
        if Sec0::parse(&body0).tag != SEC0_TAG {
            return false;
        }
        let body1 = sector_body(phys, 1);
        Sec1::parse(&body1).chip_tag == CHIP_TAG_RK28
    }

    /// Encodes the records into four BCH-wrapped physical sectors.
    ///
    /// `backup` must hold the four original physical sectors of this ID
    /// block: bytes 512..515 of each are OOB content that carries boot-code
    /// fragments and is preserved verbatim; the remaining OOB bytes are the
    /// parity region, regenerated here.
    ///
    /// Sector 2's `sec0_crc`/`sec1_crc`/`sec3_crc` are stamped from the
    /// plain sector bodies; `boot_code_crc` is left untouched because the
    /// boot code itself is never rewritten.
    pub fn encode(
        &self,
        backup: &[u8],
    ) -> Result<[[u8; rkboot_codec::BCH_CODE_LEN]; IDB_SECTORS], IdbError> {
        let want = IDB_SECTORS * PHYS_SECTOR_LEN;
        if backup.len() < want {
            return Err(IdbError::ShortRead {
                want,
                got: backup.len(),
            });
        }

        let body0 = self.sec0.to_bytes();
        let body1 = self.sec1.to_bytes();
        let body3 = self.sec3.to_bytes();

        let mut sec2 = self.sec2.clone();
        sec2.sec0_crc = crc16(&body0);
        sec2.sec1_crc = crc16(&body1);
        sec2.sec3_crc = crc16(&body3);
        let body2 = sec2.to_bytes();

        let bodies = [body0, body1, body2, body3];
        let mut out = [[0u8; rkboot_codec::BCH_CODE_LEN]; IDB_SECTORS];
        for (index, body) in bodies.iter().enumerate() {
            let mut payload = [0u8; BCH_DATA_LEN];
            payload[..SECTOR_LEN].copy_from_slice(body);
            if index != 1 {
                rc4_xor(&mut payload, 0, SECTOR_LEN);
            }
            let oob = index * PHYS_SECTOR_LEN + SECTOR_LEN;
            payload[SECTOR_LEN..].copy_from_slice(&backup[oob..oob + 3]);
            out[index] = bch_encode(&payload);
        }
        Ok(out)
    }
}
