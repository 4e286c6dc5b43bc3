//! rusb-backed [`BulkPipe`]: device lookup, interface claim, and the raw
//! bulk transfers. Everything above this module is USB-agnostic.

use std::io;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rkboot_proto::BulkPipe;
use rusb::{DeviceHandle, GlobalContext};

/// Zero means no timeout; the bootloader can stall for a long time while
/// erasing.
const TIMEOUT: Duration = Duration::ZERO;

pub struct UsbPipe {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    endpoint_in: u8,
    endpoint_out: u8,
}

impl UsbPipe {
    /// Opens the first device matching `vendor_id:product_id` and claims
    /// the first interface exposing a bulk IN/OUT endpoint pair.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<UsbPipe> {
        let devices = rusb::devices().context("enumerating USB devices")?;
        for device in devices.iter() {
            let descriptor = device
                .device_descriptor()
                .context("reading device descriptor")?;
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }

            let handle = device.open().context("opening USB device")?;
            let config = device
                .active_config_descriptor()
                .context("reading active configuration")?;
            for interface in config.interfaces() {
                for descriptor in interface.descriptors() {
                    let mut endpoint_in = None;
                    let mut endpoint_out = None;
                    for endpoint in descriptor.endpoint_descriptors() {
                        if endpoint.transfer_type() != rusb::TransferType::Bulk {
                            continue;
                        }
                        match endpoint.direction() {
                            rusb::Direction::In => {
                                endpoint_in.get_or_insert(endpoint.address());
                            }
                            rusb::Direction::Out => {
                                endpoint_out.get_or_insert(endpoint.address());
                            }
                        }
                    }
                    if let (Some(endpoint_in), Some(endpoint_out)) = (endpoint_in, endpoint_out)
                    {
                        let interface = interface.number();
                        handle
                            .claim_interface(interface)
                            .context("claiming USB interface")?;
                        return Ok(UsbPipe {
                            handle,
                            interface,
                            endpoint_in,
                            endpoint_out,
                        });
                    }
                }
            }
            bail!("device {vendor_id:04x}:{product_id:04x} has no bulk endpoint pair");
        }
        bail!("no device {vendor_id:04x}:{product_id:04x} found");
    }
}

impl BulkPipe for UsbPipe {
    fn bulk_out(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle
            .write_bulk(self.endpoint_out, buf, TIMEOUT)
            .map_err(io::Error::other)
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle
            .read_bulk(self.endpoint_in, buf, TIMEOUT)
            .map_err(io::Error::other)
    }
}

impl Drop for UsbPipe {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(self.interface);
    }
}
