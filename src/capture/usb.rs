//! USB bulk transport for the endoscope camera (requires the `usb` feature)

use super::transport::{PacketSource, TransportError};
use super::CaptureError;
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, info};

/// Supported (vendor id, product id) pairs
pub const SUPPORTED_DEVICES: [(u16, u16); 2] = [(0x2ce3, 0x3828), (0x0329, 0x2022)];

const INTERFACE_A: u8 = 0;
const INTERFACE_B: u8 = 1;
const INTERFACE_B_ALT_SETTING: u8 = 1;

const ENDPOINT_1: u8 = 1;
const ENDPOINT_2: u8 = 2;
const ENDPOINT_IN: u8 = 0x80;

const WAKE_SEQUENCE: [u8; 6] = [0xFF, 0x55, 0xFF, 0x55, 0xEE, 0x10];
const START_STREAM: [u8; 5] = [0xBB, 0xAA, 5, 0, 0];

/// Settings for an opened camera
#[derive(Debug, Clone)]
pub struct UsbSettings {
    pub read_timeout: Duration,
    pub packet_size: usize,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            packet_size: 0x400,
        }
    }
}

/// One opened and streaming USB camera
pub struct UsbCamera {
    handle: DeviceHandle<Context>,
    settings: UsbSettings,
    index: u16,
}

impl UsbCamera {
    /// Opens the `index`-th supported camera and runs the start sequence
    pub fn open(index: u16, settings: UsbSettings) -> Result<Self, CaptureError> {
        let context = Context::new().map_err(|e| setup("usb init", e))?;
        let available = count_supported(&context);

        let device = supported_devices(&context)
            .map_err(|e| setup("device list", e))?
            .into_iter()
            .nth(index as usize)
            .ok_or(CaptureError::DeviceNotFound { index, available })?;

        let mut handle = device.open().map_err(|e| setup("open", e))?;
        handle
            .claim_interface(INTERFACE_A)
            .map_err(|e| setup("claim interface A", e))?;
        handle
            .claim_interface(INTERFACE_B)
            .map_err(|e| setup("claim interface B", e))?;
        handle
            .set_alternate_setting(INTERFACE_B, INTERFACE_B_ALT_SETTING)
            .map_err(|e| setup("set alternate setting", e))?;
        handle
            .clear_halt(ENDPOINT_1)
            .map_err(|e| setup("clear halt EP1", e))?;

        let camera = Self {
            handle,
            settings,
            index,
        };
        camera.write_all(ENDPOINT_2, &WAKE_SEQUENCE, "start sequence EP2")?;
        camera.write_all(ENDPOINT_1, &START_STREAM, "start stream command")?;

        info!(
            index = %index,
            bus = %device.bus_number(),
            address = %device.address(),
            "USB camera opened"
        );

        Ok(camera)
    }

    fn write_all(&self, endpoint: u8, data: &[u8], stage: &'static str) -> Result<(), CaptureError> {
        let written = self
            .handle
            .write_bulk(endpoint, data, self.settings.read_timeout)
            .map_err(|e| setup(stage, e))?;
        if written != data.len() {
            return Err(setup(stage, rusb::Error::Io));
        }
        debug!(endpoint = %endpoint, bytes = %written, stage, "Bulk write");
        Ok(())
    }
}

impl PacketSource for UsbCamera {
    fn read_packet(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        buf.resize(self.settings.packet_size, 0);
        match self
            .handle
            .read_bulk(ENDPOINT_IN | ENDPOINT_1, buf, self.settings.read_timeout)
        {
            Ok(n) => {
                buf.truncate(n);
                Ok(n)
            }
            Err(e) => {
                buf.clear();
                Err(match e {
                    rusb::Error::Timeout => TransportError::Timeout,
                    rusb::Error::NoDevice => TransportError::DeviceGone,
                    other => TransportError::Other(other.to_string()),
                })
            }
        }
    }

    fn describe(&self) -> String {
        format!("usb camera #{}", self.index)
    }
}

/// Number of supported cameras currently attached
pub fn available_devices() -> usize {
    match Context::new() {
        Ok(context) => count_supported(&context),
        Err(_) => 0,
    }
}

fn count_supported(context: &Context) -> usize {
    supported_devices(context).map(|d| d.len()).unwrap_or(0)
}

fn supported_devices(context: &Context) -> rusb::Result<Vec<Device<Context>>> {
    let devices = context.devices()?;
    Ok(devices
        .iter()
        .filter(|device| {
            device
                .device_descriptor()
                .map(|desc| is_supported(desc.vendor_id(), desc.product_id()))
                .unwrap_or(false)
        })
        .collect())
}

fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    SUPPORTED_DEVICES.contains(&(vendor_id, product_id))
}

fn setup(stage: &'static str, source: rusb::Error) -> CaptureError {
    CaptureError::Setup {
        stage,
        reason: source.to_string(),
    }
}
