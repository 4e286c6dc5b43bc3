//! `rkboot`: read and rewrite the ID block of a Rockchip device in USB
//! bootloader mode, and optionally flash a firmware image.

mod pipe;
mod progress;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rkboot_device::RkDevice;
use rkboot_image::RkImage;

use crate::pipe::UsbPipe;

#[derive(Parser, Debug)]
#[command(
    name = "rkboot",
    about = "Read and rewrite the ID block of a Rockchip USB bootloader device",
    version
)]
struct Args {
    /// Vendor ID of the USB device
    #[arg(short = 'v', long, value_parser = parse_id, default_value = "0x2207")]
    vendor_id: u16,

    /// Product ID of the USB device
    #[arg(short = 'p', long, value_parser = parse_id, default_value = "0x310C")]
    product_id: u16,

    /// Firmware image to flash
    #[arg(short = 'f', long = "rk-image")]
    rk_image: Option<PathBuf>,

    /// Serial number to set
    #[arg(short = 's', long)]
    sn: Option<String>,

    /// IMEI to set
    #[arg(short = 'i', long)]
    imei: Option<String>,

    /// UID to set
    #[arg(short = 'u', long)]
    uid: Option<String>,

    /// Bluetooth address to set, 12 hex digits
    #[arg(short = 'b', long)]
    bt: Option<String>,

    /// MAC address to set, 12 hex digits
    #[arg(short = 'm', long)]
    mac: Option<String>,

    /// Reset the device after all other operations
    #[arg(short = 'r', long)]
    reset: bool,
}

/// Accepts `0x`-prefixed hex or plain decimal.
fn parse_id(text: &str) -> Result<u16, std::num::ParseIntError> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut image = match &args.rk_image {
        Some(path) => {
            let image = RkImage::open(path)
                .with_context(|| format!("opening image {}", path.display()))?;
            println!("md5 checksum: OK");
            Some(image)
        }
        None => None,
    };

    let pipe = UsbPipe::open(args.vendor_id, args.product_id)?;
    let mut device = RkDevice::new(pipe);
    device.read_device_data().context("reading device data")?;

    println!("Found device");
    println!("  SN: {}", na(device.serial()));
    println!(" UID: {}", na(device.uid()));
    println!("IMEI: {}", na(device.imei()));
    println!(" MAC: {}", na(device.mac()));
    println!("  BT: {}", na(device.bt()));

    let mut changed = false;
    if let Some(sn) = &args.sn {
        device.set_serial(sn)?;
        changed = true;
    }
    if let Some(imei) = &args.imei {
        device.set_imei(imei)?;
        changed = true;
    }
    if let Some(uid) = &args.uid {
        device.set_uid(uid)?;
        changed = true;
    }
    if let Some(mac) = &args.mac {
        device.set_mac(mac)?;
        changed = true;
    }
    if let Some(bt) = &args.bt {
        device.set_bt(bt)?;
        changed = true;
    }

    if changed {
        device
            .write_device_data()
            .context("rewriting the id block")?;
    }

    if let Some(image) = image.as_mut() {
        device
            .write_image(image, &mut progress::Bars::new())
            .context("flashing image")?;
    }

    if args.reset {
        device.reset_device().context("resetting device")?;
    }

    Ok(())
}
