//! Fixed-layout logical sector records.
//!
//! Every record is exactly 512 bytes on NAND, little-endian throughout,
//! and is (de)serialized field by field rather than through struct layout;
//! padding and endianness never depend on the compiler.

use rkboot_proto::SECTOR_LEN;

use crate::error::IdbError;

/// Sector 0 magic; little-endian `0F F0 AA 55` on NAND.
pub const SEC0_TAG: u32 = 0x55AA_F00F;
/// Sector 1 chip tag for the supported generation, "RK28".
pub const CHIP_TAG_RK28: u32 = 0x524B_3238;

pub const SN_LEN: usize = 30;
pub const IMEI_LEN: usize = 15;
pub const UID_LEN: usize = 30;
pub const MAC_LEN: usize = 6;
pub const BT_LEN: usize = 6;

const MACHINE_INFO_LEN: usize = 30;
const CHIP_INFO_LEN: usize = 16;
const SEC0_RESERVED1_LEN: usize = 490;
const SEC1_RESERVED_LEN: usize = 384;
const SEC2_RESERVED_LEN: usize = 473;
const SEC3_RESERVED_LEN: usize = 419;

/// Printable range accepted in identity strings.
fn is_printable(byte: u8) -> bool {
    (0x21..=0x7F).contains(&byte)
}

/// Little-endian field reader over one 512-byte sector body.
struct Reader<'a> {
    buf: &'a [u8; SECTOR_LEN],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8; SECTOR_LEN]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos += 4;
        v
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn finish(self) {
        debug_assert_eq!(self.pos, SECTOR_LEN);
    }
}

/// Little-endian field writer producing one 512-byte sector body.
struct Writer {
    buf: [u8; SECTOR_LEN],
    pos: usize,
}

impl Writer {
    fn new() -> Self {
        Writer {
            buf: [0u8; SECTOR_LEN],
            pos: 0,
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn u16(&mut self, v: u16) {
        self.buf[self.pos..self.pos + 2].copy_from_slice(&v.to_le_bytes());
        self.pos += 2;
    }

    fn u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
    }

    fn finish(self) -> [u8; SECTOR_LEN] {
        debug_assert_eq!(self.pos, SECTOR_LEN);
        self.buf
    }
}

/// Sector 0: boot-code layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sec0 {
    pub tag: u32,
    pub reserved: [u8; 4],
    pub rc4_flag: u32,
    pub boot_code1_offset: u16,
    pub boot_code2_offset: u16,
    pub reserved1: [u8; SEC0_RESERVED1_LEN],
    pub boot_data_size: u16,
    pub boot_code_size: u16,
    pub crc: u16,
}

impl Default for Sec0 {
    fn default() -> Self {
        Sec0 {
            tag: 0,
            reserved: [0; 4],
            rc4_flag: 0,
            boot_code1_offset: 0,
            boot_code2_offset: 0,
            reserved1: [0; SEC0_RESERVED1_LEN],
            boot_data_size: 0,
            boot_code_size: 0,
            crc: 0,
        }
    }
}

impl Sec0 {
    pub fn parse(body: &[u8; SECTOR_LEN]) -> Sec0 {
        let mut r = Reader::new(body);
        let sec = Sec0 {
            tag: r.u32(),
            reserved: r.bytes(),
            rc4_flag: r.u32(),
            boot_code1_offset: r.u16(),
            boot_code2_offset: r.u16(),
            reserved1: r.bytes(),
            boot_data_size: r.u16(),
            boot_code_size: r.u16(),
            crc: r.u16(),
        };
        r.finish();
        sec
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_LEN] {
        let mut w = Writer::new();
        w.u32(self.tag);
        w.bytes(&self.reserved);
        w.u32(self.rc4_flag);
        w.u16(self.boot_code1_offset);
        w.u16(self.boot_code2_offset);
        w.bytes(&self.reserved1);
        w.u16(self.boot_data_size);
        w.u16(self.boot_code_size);
        w.u16(self.crc);
        w.finish()
    }
}

/// Sector 1: flash and chip descriptors. Stored in cleartext, unlike the
/// other three sectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sec1 {
    pub sys_reserved_block: u16,
    pub disk0_size: u16,
    pub disk1_size: u16,
    pub disk2_size: u16,
    pub disk3_size: u16,
    pub chip_tag: u32,
    pub machine_id: u32,
    pub loader_year: u16,
    pub loader_date: u16,
    pub loader_ver: u16,
    pub last_loader_ver: u16,
    pub read_write_times: u16,
    pub fw_ver: u32,
    pub machine_info_len: u16,
    pub machine_info: [u8; MACHINE_INFO_LEN],
    pub manufacturer_info_len: u16,
    pub manufacturer_info: [u8; MACHINE_INFO_LEN],
    pub flash_info_offset: u16,
    pub flash_info_len: u16,
    pub reserved: [u8; SEC1_RESERVED_LEN],
    pub flash_size: u32,
    pub reserved1: u8,
    pub access_time: u8,
    pub block_size: u16,
    pub page_size: u8,
    pub ecc_bits: u8,
    pub reserved2: [u8; 8],
    pub id_block0: u16,
    pub id_block1: u16,
    pub id_block2: u16,
    pub id_block3: u16,
    pub id_block4: u16,
}

impl Default for Sec1 {
    fn default() -> Self {
        Sec1 {
            sys_reserved_block: 0,
            disk0_size: 0,
            disk1_size: 0,
            disk2_size: 0,
            disk3_size: 0,
            chip_tag: 0,
            machine_id: 0,
            loader_year: 0,
            loader_date: 0,
            loader_ver: 0,
            last_loader_ver: 0,
            read_write_times: 0,
            fw_ver: 0,
            machine_info_len: 0,
            machine_info: [0; MACHINE_INFO_LEN],
            manufacturer_info_len: 0,
            manufacturer_info: [0; MACHINE_INFO_LEN],
            flash_info_offset: 0,
            flash_info_len: 0,
            reserved: [0; SEC1_RESERVED_LEN],
            flash_size: 0,
            reserved1: 0,
            access_time: 0,
            block_size: 0,
            page_size: 0,
            ecc_bits: 0,
            reserved2: [0; 8],
            id_block0: 0,
            id_block1: 0,
            id_block2: 0,
            id_block3: 0,
            id_block4: 0,
        }
    }
}

impl Sec1 {
    pub fn parse(body: &[u8; SECTOR_LEN]) -> Sec1 {
        let mut r = Reader::new(body);
        let sec = Sec1 {
            sys_reserved_block: r.u16(),
            disk0_size: r.u16(),
            disk1_size: r.u16(),
            disk2_size: r.u16(),
            disk3_size: r.u16(),
            chip_tag: r.u32(),
            machine_id: r.u32(),
            loader_year: r.u16(),
            loader_date: r.u16(),
            loader_ver: r.u16(),
            last_loader_ver: r.u16(),
            read_write_times: r.u16(),
            fw_ver: r.u32(),
            machine_info_len: r.u16(),
            machine_info: r.bytes(),
            manufacturer_info_len: r.u16(),
            manufacturer_info: r.bytes(),
            flash_info_offset: r.u16(),
            flash_info_len: r.u16(),
            reserved: r.bytes(),
            flash_size: r.u32(),
            reserved1: r.u8(),
            access_time: r.u8(),
            block_size: r.u16(),
            page_size: r.u8(),
            ecc_bits: r.u8(),
            reserved2: r.bytes(),
            id_block0: r.u16(),
            id_block1: r.u16(),
            id_block2: r.u16(),
            id_block3: r.u16(),
            id_block4: r.u16(),
        };
        r.finish();
        sec
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_LEN] {
        let mut w = Writer::new();
        w.u16(self.sys_reserved_block);
        w.u16(self.disk0_size);
        w.u16(self.disk1_size);
        w.u16(self.disk2_size);
        w.u16(self.disk3_size);
        w.u32(self.chip_tag);
        w.u32(self.machine_id);
        w.u16(self.loader_year);
        w.u16(self.loader_date);
        w.u16(self.loader_ver);
        w.u16(self.last_loader_ver);
        w.u16(self.read_write_times);
        w.u32(self.fw_ver);
        w.u16(self.machine_info_len);
        w.bytes(&self.machine_info);
        w.u16(self.manufacturer_info_len);
        w.bytes(&self.manufacturer_info);
        w.u16(self.flash_info_offset);
        w.u16(self.flash_info_len);
        w.bytes(&self.reserved);
        w.u32(self.flash_size);
        w.u8(self.reserved1);
        w.u8(self.access_time);
        w.u16(self.block_size);
        w.u8(self.page_size);
        w.u8(self.ecc_bits);
        w.bytes(&self.reserved2);
        w.u16(self.id_block0);
        w.u16(self.id_block1);
        w.u16(self.id_block2);
        w.u16(self.id_block3);
        w.u16(self.id_block4);
        w.finish()
    }
}

/// Sector 2: integrity fields over the other three sectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sec2 {
    pub info_size: u16,
    pub chip_info: [u8; CHIP_INFO_LEN],
    pub reserved: [u8; SEC2_RESERVED_LEN],
    pub vc_tag: [u8; 3],
    pub sec0_crc: u16,
    pub sec1_crc: u16,
    pub boot_code_crc: u32,
    pub sec3_custom_data_offset: u16,
    pub sec3_custom_data_size: u16,
    pub crc_tag: [u8; 4],
    pub sec3_crc: u16,
}

impl Default for Sec2 {
    fn default() -> Self {
        Sec2 {
            info_size: 0,
            chip_info: [0; CHIP_INFO_LEN],
            reserved: [0; SEC2_RESERVED_LEN],
            vc_tag: [0; 3],
            sec0_crc: 0,
            sec1_crc: 0,
            boot_code_crc: 0,
            sec3_custom_data_offset: 0,
            sec3_custom_data_size: 0,
            crc_tag: [0; 4],
            sec3_crc: 0,
        }
    }
}

impl Sec2 {
    pub fn parse(body: &[u8; SECTOR_LEN]) -> Sec2 {
        let mut r = Reader::new(body);
        let sec = Sec2 {
            info_size: r.u16(),
            chip_info: r.bytes(),
            reserved: r.bytes(),
            vc_tag: r.bytes(),
            sec0_crc: r.u16(),
            sec1_crc: r.u16(),
            boot_code_crc: r.u32(),
            sec3_custom_data_offset: r.u16(),
            sec3_custom_data_size: r.u16(),
            crc_tag: r.bytes(),
            sec3_crc: r.u16(),
        };
        r.finish();
        sec
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_LEN] {
        let mut w = Writer::new();
        w.u16(self.info_size);
        w.bytes(&self.chip_info);
        w.bytes(&self.reserved);
        w.bytes(&self.vc_tag);
        w.u16(self.sec0_crc);
        w.u16(self.sec1_crc);
        w.u32(self.boot_code_crc);
        w.u16(self.sec3_custom_data_offset);
        w.u16(self.sec3_custom_data_size);
        w.bytes(&self.crc_tag);
        w.u16(self.sec3_crc);
        w.finish()
    }
}

/// Sector 3: device identity. All fields are length-prefixed; bytes past
/// each length are stale content from earlier writes and are preserved,
/// never surfaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sec3 {
    pub sn_size: u16,
    pub sn: [u8; SN_LEN],
    pub reserved: [u8; SEC3_RESERVED_LEN],
    pub imei_size: u8,
    pub imei: [u8; IMEI_LEN],
    pub uid_size: u8,
    pub uid: [u8; UID_LEN],
    pub bt_size: u8,
    pub bt_addr: [u8; BT_LEN],
    pub mac_size: u8,
    pub mac_addr: [u8; MAC_LEN],
}

impl Default for Sec3 {
    fn default() -> Self {
        Sec3 {
            sn_size: 0,
            sn: [0; SN_LEN],
            reserved: [0; SEC3_RESERVED_LEN],
            imei_size: 0,
            imei: [0; IMEI_LEN],
            uid_size: 0,
            uid: [0; UID_LEN],
            bt_size: 0,
            bt_addr: [0; BT_LEN],
            mac_size: 0,
            mac_addr: [0; MAC_LEN],
        }
    }
}

impl Sec3 {
    pub fn parse(body: &[u8; SECTOR_LEN]) -> Sec3 {
        let mut r = Reader::new(body);
        let sec = Sec3 {
            sn_size: r.u16(),
            sn: r.bytes(),
            reserved: r.bytes(),
            imei_size: r.u8(),
            imei: r.bytes(),
            uid_size: r.u8(),
            uid: r.bytes(),
            bt_size: r.u8(),
            bt_addr: r.bytes(),
            mac_size: r.u8(),
            mac_addr: r.bytes(),
        };
        r.finish();
        sec
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_LEN] {
        let mut w = Writer::new();
        w.u16(self.sn_size);
        w.bytes(&self.sn);
        w.bytes(&self.reserved);
        w.u8(self.imei_size);
        w.bytes(&self.imei);
        w.u8(self.uid_size);
        w.bytes(&self.uid);
        w.u8(self.bt_size);
        w.bytes(&self.bt_addr);
        w.u8(self.mac_size);
        w.bytes(&self.mac_addr);
        w.finish()
    }

    /// Serial number, or `None` when the size prefix is out of range.
    pub fn serial(&self) -> Option<String> {
        let size = usize::from(self.sn_size);
        if size > SN_LEN {
            return None;
        }
        Some(String::from_utf8_lossy(&self.sn[..size]).into_owned())
    }

    /// IMEI digits; non-printable bytes are skipped over.
    pub fn imei(&self) -> Option<String> {
        let size = usize::from(self.imei_size).min(IMEI_LEN);
        let s: String = self.imei[..size]
            .iter()
            .copied()
            .filter(|&b| is_printable(b))
            .map(char::from)
            .collect();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    /// UID up to the first non-printable byte.
    pub fn uid(&self) -> Option<String> {
        let size = usize::from(self.uid_size).min(UID_LEN);
        let s: String = self.uid[..size]
            .iter()
            .copied()
            .take_while(|&b| is_printable(b))
            .map(char::from)
            .collect();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn mac(&self) -> String {
        format_addr(&self.mac_addr)
    }

    pub fn bt(&self) -> String {
        format_addr(&self.bt_addr)
    }

    pub fn set_serial(&mut self, sn: &str) -> Result<(), IdbError> {
        if sn.len() > SN_LEN {
            return Err(IdbError::FieldTooLong {
                field: "serial number",
                max: SN_LEN,
            });
        }
        self.sn_size = sn.len() as u16;
        self.sn[..sn.len()].copy_from_slice(sn.as_bytes());
        Ok(())
    }

    pub fn set_imei(&mut self, imei: &str) -> Result<(), IdbError> {
        if imei.len() > IMEI_LEN {
            return Err(IdbError::FieldTooLong {
                field: "IMEI",
                max: IMEI_LEN,
            });
        }
        self.imei_size = imei.len() as u8;
        self.imei[..imei.len()].copy_from_slice(imei.as_bytes());
        Ok(())
    }

    pub fn set_uid(&mut self, uid: &str) -> Result<(), IdbError> {
        if uid.len() > UID_LEN {
            return Err(IdbError::FieldTooLong {
                field: "UID",
                max: UID_LEN,
            });
        }
        self.uid_size = uid.len() as u8;
        self.uid[..uid.len()].copy_from_slice(uid.as_bytes());
        Ok(())
    }

    pub fn set_mac(&mut self, mac: &str) -> Result<(), IdbError> {
        let decoded = decode_addr(mac, "MAC address")?;
        self.mac_size = MAC_LEN as u8;
        self.mac_addr = decoded;
        Ok(())
    }

    pub fn set_bt(&mut self, bt: &str) -> Result<(), IdbError> {
        let decoded = decode_addr(bt, "bluetooth address")?;
        self.bt_size = BT_LEN as u8;
        self.bt_addr = decoded;
        Ok(())
    }
}

fn format_addr(addr: &[u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        addr[0], addr[1], addr[2], addr[3], addr[4], addr[5]
    )
}

fn decode_addr(text: &str, field: &'static str) -> Result<[u8; 6], IdbError> {
    if text.len() != MAC_LEN * 2 {
        return Err(IdbError::BadAddressLength {
            field,
            expected: MAC_LEN * 2,
        });
    }
    let bytes = hex::decode(text)?;
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip_through_512_bytes() {
        let mut sec1 = Sec1::default();
        sec1.chip_tag = CHIP_TAG_RK28;
        sec1.read_write_times = 7;
        sec1.machine_info[..4].copy_from_slice(b"rk28");
        let body = sec1.to_bytes();
        assert_eq!(Sec1::parse(&body), sec1);

        let mut sec0 = Sec0::default();
        sec0.tag = SEC0_TAG;
        sec0.boot_code_size = 0x40;
        let body = sec0.to_bytes();
        assert_eq!(body.len(), SECTOR_LEN);
        assert_eq!(&body[..4], &[0x0F, 0xF0, 0xAA, 0x55]);
        assert_eq!(Sec0::parse(&body), sec0);

        let sec2 = Sec2::default();
        assert_eq!(Sec2::parse(&sec2.to_bytes()), sec2);

        let sec3 = Sec3::default();
        assert_eq!(Sec3::parse(&sec3.to_bytes()), sec3);
    }

    #[test]
    fn sec2_crc_fields_sit_at_the_tail_of_the_layout() {
        let mut sec2 = Sec2::default();
        sec2.sec0_crc = 0x1122;
        sec2.sec1_crc = 0x3344;
        sec2.boot_code_crc = 0x5566_7788;
        sec2.sec3_crc = 0x99AA;
        let body = sec2.to_bytes();
        // 2 + 16 + 473 + 3 = 494
        assert_eq!(&body[494..496], &0x1122u16.to_le_bytes());
        assert_eq!(&body[496..498], &0x3344u16.to_le_bytes());
        assert_eq!(&body[498..502], &0x5566_7788u32.to_le_bytes());
        assert_eq!(&body[510..512], &0x99AAu16.to_le_bytes());
    }

    #[test]
    fn identity_strings_honor_their_length_prefix() {
        let mut sec3 = Sec3::default();
        sec3.set_serial("ABC123").unwrap();
        // Stale bytes past the prefix must never leak into the value.
        sec3.sn[6..10].copy_from_slice(b"JUNK");
        assert_eq!(sec3.serial().as_deref(), Some("ABC123"));
        assert_eq!(sec3.sn_size, 6);
    }

    #[test]
    fn oversized_values_error_and_leave_the_record_unchanged() {
        let mut sec3 = Sec3::default();
        sec3.set_serial("ORIGINAL").unwrap();
        let before = sec3.clone();

        let long = "X".repeat(SN_LEN + 1);
        assert!(matches!(
            sec3.set_serial(&long),
            Err(IdbError::FieldTooLong { max: 30, .. })
        ));
        assert_eq!(sec3, before);

        let long = "9".repeat(IMEI_LEN + 1);
        assert!(matches!(
            sec3.set_imei(&long),
            Err(IdbError::FieldTooLong { max: 15, .. })
        ));
        assert_eq!(sec3, before);
    }

    #[test]
    fn mac_and_bt_take_exactly_twelve_hex_digits() {
        let mut sec3 = Sec3::default();
        sec3.set_mac("0123456789AB").unwrap();
        assert_eq!(sec3.mac_addr, [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]);
        assert_eq!(sec3.mac_size, 6);
        assert_eq!(sec3.mac(), "01:23:45:67:89:AB");

        assert!(matches!(
            sec3.set_mac("0123456789"),
            Err(IdbError::BadAddressLength { expected: 12, .. })
        ));
        assert!(matches!(
            sec3.set_bt("0123456789XY"),
            Err(IdbError::BadHex(_))
        ));
    }

    #[test]
    fn imei_skips_unprintable_bytes_while_uid_stops_at_them() {
        let mut sec3 = Sec3::default();
        sec3.imei_size = 5;
        sec3.imei[..5].copy_from_slice(&[b'1', 0x00, b'2', b'3', 0x10]);
        assert_eq!(sec3.imei().as_deref(), Some("123"));

        sec3.uid_size = 5;
        sec3.uid[..5].copy_from_slice(&[b'A', b'B', 0x00, b'C', b'D']);
        assert_eq!(sec3.uid().as_deref(), Some("AB"));
    }

    #[test]
    fn out_of_range_serial_size_reads_as_absent() {
        let mut sec3 = Sec3::default();
        sec3.sn_size = 31;
        assert_eq!(sec3.serial(), None);
    }
}
