use std::time::Duration;

use rusb::{TransferType, UsbContext};

use crate::session::{EndpointInfo, SessionError};

/// Device discovery side of the native USB layer.
pub trait UsbStack {
    type Port: UsbPort;

    /// Opens the first device matching the id pair, `None` if no such
    /// device is attached.
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Option<Self::Port>, SessionError>;
}

/// Transfer side of the native USB layer, one open device.
pub trait UsbPort {
    fn claim_interface(&mut self, interface: u8) -> Result<(), SessionError>;

    /// Endpoints of the interface's first alternate setting in the active
    /// configuration.
    fn endpoints(&self, interface: u8) -> Result<Vec<EndpointInfo>, SessionError>;

    fn write(
        &self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, SessionError>;

    fn read(
        &self,
        endpoint: &EndpointInfo,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, SessionError>;
}

pub struct RusbStack {
    context: rusb::Context,
}

impl RusbStack {
    pub fn new() -> Result<Self, SessionError> {
        Ok(Self {
            context: rusb::Context::new()?,
        })
    }
}

impl UsbStack for RusbStack {
    type Port = RusbPort;

    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Option<RusbPort>, SessionError> {
        for device in self.context.devices()?.iter() {
            let descriptor = device.device_descriptor()?;
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }
            log::debug!(
                "opening {vendor_id:04x}:{product_id:04x} at bus {} address {}",
                device.bus_number(),
                device.address()
            );
            let handle = device.open()?;
            return Ok(Some(RusbPort { device, handle }));
        }
        Ok(None)
    }
}

pub struct RusbPort {
    device: rusb::Device<rusb::Context>,
    handle: rusb::DeviceHandle<rusb::Context>,
}

impl UsbPort for RusbPort {
    fn claim_interface(&mut self, interface: u8) -> Result<(), SessionError> {
        self.handle.claim_interface(interface)?;
        Ok(())
    }

    fn endpoints(&self, interface: u8) -> Result<Vec<EndpointInfo>, SessionError> {
        let config = self.device.active_config_descriptor()?;
        let mut endpoints = Vec::new();
        for intf in config.interfaces() {
            if intf.number() != interface {
                continue;
            }
            // First alternate setting only, matching the session's
            // single-interface view of the device.
            if let Some(descriptor) = intf.descriptors().next() {
                for endpoint in descriptor.endpoint_descriptors() {
                    endpoints.push(EndpointInfo {
                        address: endpoint.address(),
                        direction: endpoint.direction(),
                        transfer_type: endpoint.transfer_type(),
                        max_packet_size: endpoint.max_packet_size(),
                    });
                }
            }
        }
        Ok(endpoints)
    }

    fn write(
        &self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, SessionError> {
        let n = match transfer_kind(endpoint)? {
            TransferKind::Bulk => self.handle.write_bulk(endpoint.address, data, timeout)?,
            TransferKind::Interrupt => {
                self.handle.write_interrupt(endpoint.address, data, timeout)?
            }
        };
        Ok(n)
    }

    fn read(
        &self,
        endpoint: &EndpointInfo,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, SessionError> {
        let n = match transfer_kind(endpoint)? {
            TransferKind::Bulk => self.handle.read_bulk(endpoint.address, buffer, timeout)?,
            TransferKind::Interrupt => {
                self.handle.read_interrupt(endpoint.address, buffer, timeout)?
            }
        };
        Ok(n)
    }
}

/// Transfer call family an endpoint maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Bulk,
    Interrupt,
}

fn transfer_kind(endpoint: &EndpointInfo) -> Result<TransferKind, SessionError> {
    match endpoint.transfer_type {
        TransferType::Bulk => Ok(TransferKind::Bulk),
        TransferType::Interrupt => Ok(TransferKind::Interrupt),
        transfer_type => Err(SessionError::UnsupportedTransfer {
            address: endpoint.address,
            transfer_type,
        }),
    }
}

#[cfg(test)]
mod tests {
    use rusb::Direction;

    use super::*;

    fn endpoint(transfer_type: TransferType) -> EndpointInfo {
        EndpointInfo {
            address: 0x02,
            direction: Direction::Out,
            transfer_type,
            max_packet_size: 64,
        }
    }

    #[test]
    fn bulk_and_interrupt_endpoints_are_dispatchable() {
        assert_eq!(
            transfer_kind(&endpoint(TransferType::Bulk)).unwrap(),
            TransferKind::Bulk
        );
        assert_eq!(
            transfer_kind(&endpoint(TransferType::Interrupt)).unwrap(),
            TransferKind::Interrupt
        );
    }

    #[test]
    fn control_and_isochronous_endpoints_are_rejected() {
        for transfer_type in [TransferType::Control, TransferType::Isochronous] {
            let err = transfer_kind(&endpoint(transfer_type)).unwrap_err();
            assert!(matches!(
                err,
                SessionError::UnsupportedTransfer {
                    address: 0x02,
                    transfer_type: t,
                } if t == transfer_type
            ));
        }
    }
}
