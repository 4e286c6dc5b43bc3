//! LBA image flasher: writes every `.img` partition of a firmware image,
//! then verifies the whole thing by reading it back.

use rkboot_image::{ImagePart, RkImage};
use rkboot_proto::{BulkPipe, SECTOR_LEN};

use crate::error::DeviceError;
use crate::progress::Progress;
use crate::session::RkDevice;

/// Bytes per LBA transfer: 2048 sectors.
const CHUNK_LEN: u32 = 0x10_0000;
const CHUNK_SECTORS: u32 = CHUNK_LEN / SECTOR_LEN as u32;

/// The parameter partition is written redundantly to eight fixed LBAs.
const PARAMETER_ADDRS: [u32; 8] = [
    0x0000, 0x0400, 0x0800, 0x0C00, 0x1000, 0x1400, 0x1800, 0x1C00,
];

/// The system partition alone is addressed through selector 1.
fn selector_for(part: &ImagePart) -> u8 {
    u8::from(part.name == "system")
}

fn pad_to_sector(mut data: Vec<u8>) -> Vec<u8> {
    let rem = data.len() % SECTOR_LEN;
    if rem != 0 {
        data.resize(data.len() + SECTOR_LEN - rem, 0);
    }
    data
}

impl<P: BulkPipe> RkDevice<P> {
    /// Flashes `image`: the parameter partition to its eight redundant
    /// addresses, every `.img` partition to its NAND address in 1 MiB
    /// chunks, then a full read-back verify of both. Progress is reported
    /// per partition for the write and the validate pass.
    pub fn write_image(
        &mut self,
        image: &mut RkImage,
        progress: &mut dyn Progress,
    ) -> Result<(), DeviceError> {
        self.warm_up();

        let parameter = image
            .parts
            .iter()
            .find(|part| part.is_parameter())
            .cloned()
            .ok_or(DeviceError::NoParameterPartition)?;
        let parts: Vec<ImagePart> = image
            .parts
            .iter()
            .filter(|part| part.is_image())
            .cloned()
            .collect();

        let parameter_bytes = pad_to_sector(read_part_bytes(image, &parameter)?);

        progress.begin("   write:  parameter", PARAMETER_ADDRS.len() as u64);
        for (index, &addr) in PARAMETER_ADDRS.iter().enumerate() {
            self.transport().write_lba(addr, &parameter_bytes, 0)?;
            progress.advance(index as u64 + 1);
        }
        progress.finish();

        for part in &parts {
            tracing::debug!(name = %part.name, size = part.size, "writing partition");
            self.stream_partition(image, part, progress, Pass::Write)?;
        }

        progress.begin("validate:  parameter", PARAMETER_ADDRS.len() as u64);
        for (index, &addr) in PARAMETER_ADDRS.iter().enumerate() {
            let readback = self.transport().read_lba(addr, parameter_bytes.len(), 0)?;
            if readback != parameter_bytes {
                return Err(DeviceError::ImageVerifyMismatch(parameter.name.clone()));
            }
            progress.advance(index as u64 + 1);
        }
        progress.finish();

        for part in &parts {
            tracing::debug!(name = %part.name, "validating partition");
            self.stream_partition(image, part, progress, Pass::Verify)?;
        }
        Ok(())
    }

    /// Walks one partition in LBA chunks, either writing the image bytes
    /// out or reading them back for comparison.
    fn stream_partition(
        &mut self,
        image: &mut RkImage,
        part: &ImagePart,
        progress: &mut dyn Progress,
        pass: Pass,
    ) -> Result<(), DeviceError> {
        let label = match pass {
            Pass::Write => format!("   write: {:>10}", part.name),
            Pass::Verify => format!("validate: {:>10}", part.name),
        };
        progress.begin(&label, u64::from(part.size));

        let selector = selector_for(part);
        let total_lbas = part.size / SECTOR_LEN as u32;
        let mut lba = 0u32;
        let mut done = 0u64;
        while lba < total_lbas {
            let chunk = if (u64::from(lba) + u64::from(CHUNK_SECTORS)) * SECTOR_LEN as u64
                > u64::from(part.size)
            {
                part.size - lba * SECTOR_LEN as u32
            } else {
                CHUNK_LEN
            };

            let mut data = vec![0u8; chunk as usize];
            image.read_exact_at(part.pos + u64::from(lba) * SECTOR_LEN as u64, &mut data)?;
            let data = pad_to_sector(data);

            match pass {
                Pass::Write => {
                    self.transport()
                        .write_lba(part.nand_addr + lba, &data, selector)?;
                }
                Pass::Verify => {
                    let readback =
                        self.transport()
                            .read_lba(part.nand_addr + lba, data.len(), selector)?;
                    if readback != data {
                        return Err(DeviceError::ImageVerifyMismatch(part.name.clone()));
                    }
                }
            }

            done += data.len() as u64;
            progress.advance(done.min(u64::from(part.size)));
            lba += CHUNK_SECTORS;
        }
        progress.finish();
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Pass {
    Write,
    Verify,
}

fn read_part_bytes(image: &mut RkImage, part: &ImagePart) -> Result<Vec<u8>, DeviceError> {
    let mut data = vec![0u8; part.size as usize];
    image.read_exact_at(part.pos, &mut data)?;
    Ok(data)
}
