use rusb::{Device, DeviceHandle, UsbContext};

/// Summary of one attached device, for `--list-all` output.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceSummary {
    fn new(device: &Device<rusb::Context>) -> Result<Self, rusb::Error> {
        let descriptor = device.device_descriptor()?;
        let handle = device.open()?;
        Ok(DeviceSummary {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number: device.bus_number(),
            device_address: device.address(),
            manufacturer: read_string(&handle, descriptor.manufacturer_string_index()),
            product: read_string(&handle, descriptor.product_string_index()),
            serial_number: read_string(&handle, descriptor.serial_number_string_index()),
        })
    }
}

impl std::fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} bus {:03} addr {:03} {} / {} (serial {})",
            self.vendor_id,
            self.product_id,
            self.bus_number,
            self.device_address,
            self.manufacturer.as_deref().unwrap_or("-"),
            self.product.as_deref().unwrap_or("-"),
            self.serial_number.as_deref().unwrap_or("-"),
        )
    }
}

fn read_string(handle: &DeviceHandle<rusb::Context>, index: Option<u8>) -> Option<String> {
    index.and_then(|idx| handle.read_string_descriptor_ascii(idx).ok())
}

/// Lists every device visible to libusb. Devices that cannot be opened
/// (permissions, detached drivers) are skipped.
pub fn list_devices() -> Result<Vec<DeviceSummary>, rusb::Error> {
    let context = rusb::Context::new()?;
    let mut summaries = Vec::new();
    for device in context.devices()?.iter() {
        match DeviceSummary::new(&device) {
            Ok(summary) => summaries.push(summary),
            Err(err) => {
                log::debug!(
                    "skipping device at bus {} address {}: {err}",
                    device.bus_number(),
                    device.address()
                );
            }
        }
    }
    Ok(summaries)
}
