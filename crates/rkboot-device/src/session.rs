//! One open device session.

use rkboot_idb::IdbStore;
use rkboot_proto::{BadBlockMap, BulkPipe, FlashInfo, Transport};

use crate::error::DeviceError;

/// An open bootloader session: the claimed bulk pipe pair plus everything
/// read from the device. Move-only; dropping it releases the pipe.
pub struct RkDevice<P: BulkPipe> {
    transport: Transport<P>,
    chip_info: Option<Vec<u8>>,
    flash: Option<FlashInfo>,
    bad_blocks: Option<BadBlockMap>,
    store: IdbStore,
}

impl<P: BulkPipe> RkDevice<P> {
    pub fn new(pipe: P) -> Self {
        RkDevice {
            transport: Transport::new(pipe),
            chip_info: None,
            flash: None,
            bad_blocks: None,
            store: IdbStore::default(),
        }
    }

    /// Post-reset probe ritual: the stock flash tool sends TestUnitReady
    /// exactly twice before doing anything, so we do too. Errors from the
    /// two probes are discarded; every later command surfaces its own.
    pub(crate) fn warm_up(&mut self) {
        for _ in 0..2 {
            if let Err(err) = self.transport.test_unit_ready() {
                tracing::debug!(error = %err, "warm-up probe failed");
            }
        }
    }

    /// Reads everything the session needs: chip info, flash geometry, the
    /// bad-block map, then ID-block discovery and the reconciled read.
    ///
    /// A device without any ID block leaves the store empty; identity
    /// getters then report nothing and a rewrite fails.
    pub fn read_device_data(&mut self) -> Result<(), DeviceError> {
        self.warm_up();

        let chip_info = self.transport.read_chip_info()?;
        tracing::debug!(chip_info = ?chip_info, "chip info");
        self.chip_info = Some(chip_info);

        let flash = self.transport.read_flash_info()?;
        tracing::debug!(
            manufacturer = %flash.manufacturer,
            size_mib = flash.flash_size_mib,
            sectors_per_block = flash.sectors_per_block,
            "flash info"
        );
        let bad_blocks = self.transport.read_bad_block_map()?;

        let mut store = IdbStore::discover(&mut self.transport, &flash, &bad_blocks)?;
        if store.copy_count() > 0 {
            store.read(&mut self.transport, &flash)?;
        } else {
            tracing::warn!("no id block copies found on this device");
        }

        self.flash = Some(flash);
        self.bad_blocks = Some(bad_blocks);
        self.store = store;
        Ok(())
    }

    /// Rewrites every ID-block copy from the current records.
    pub fn write_device_data(&mut self) -> Result<(), DeviceError> {
        let flash = self.flash.clone().ok_or(DeviceError::NotRead)?;
        self.store.write(&mut self.transport, &flash)?;
        Ok(())
    }

    /// Sends the reset command; the session is done afterwards.
    pub fn reset_device(mut self) -> Result<(), DeviceError> {
        self.transport.device_reset()?;
        Ok(())
    }

    pub fn flash_info(&self) -> Option<&FlashInfo> {
        self.flash.as_ref()
    }

    pub fn bad_block_map(&self) -> Option<&BadBlockMap> {
        self.bad_blocks.as_ref()
    }

    pub fn chip_info(&self) -> Option<&[u8]> {
        self.chip_info.as_deref()
    }

    pub fn idb_copy_count(&self) -> usize {
        self.store.copy_count()
    }

    pub fn serial(&self) -> Option<String> {
        self.store.sectors().and_then(|s| s.sec3.serial())
    }

    pub fn imei(&self) -> Option<String> {
        self.store.sectors().and_then(|s| s.sec3.imei())
    }

    pub fn uid(&self) -> Option<String> {
        self.store.sectors().and_then(|s| s.sec3.uid())
    }

    pub fn mac(&self) -> Option<String> {
        self.store.sectors().map(|s| s.sec3.mac())
    }

    pub fn bt(&self) -> Option<String> {
        self.store.sectors().map(|s| s.sec3.bt())
    }

    pub fn set_serial(&mut self, value: &str) -> Result<(), DeviceError> {
        self.store.sectors_mut()?.sec3.set_serial(value)?;
        Ok(())
    }

    pub fn set_imei(&mut self, value: &str) -> Result<(), DeviceError> {
        self.store.sectors_mut()?.sec3.set_imei(value)?;
        Ok(())
    }

    pub fn set_uid(&mut self, value: &str) -> Result<(), DeviceError> {
        self.store.sectors_mut()?.sec3.set_uid(value)?;
        Ok(())
    }

    pub fn set_mac(&mut self, value: &str) -> Result<(), DeviceError> {
        self.store.sectors_mut()?.sec3.set_mac(value)?;
        Ok(())
    }

    pub fn set_bt(&mut self, value: &str) -> Result<(), DeviceError> {
        self.store.sectors_mut()?.sec3.set_bt(value)?;
        Ok(())
    }

    pub(crate) fn transport(&mut self) -> &mut Transport<P> {
        &mut self.transport
    }
}
