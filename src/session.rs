use std::time::Duration;

use rusb::{Direction, TransferType};

use crate::backend::{UsbPort, UsbStack};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no device matching {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },
    #[error("no {direction:?} endpoint on interface {interface}")]
    EndpointNotFound { interface: u8, direction: Direction },
    #[error("endpoints have not been selected yet")]
    EndpointsNotSelected,
    #[error("endpoint 0x{address:02X} has unsupported transfer type {transfer_type:?}")]
    UnsupportedTransfer {
        address: u8,
        transfer_type: TransferType,
    },
    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

/// One endpoint of the target interface, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub address: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

impl std::fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:02X} {:?} {:?} (max packet {})",
            self.address, self.direction, self.transfer_type, self.max_packet_size
        )
    }
}

/// A write-then-read exchange with one device.
///
/// Lifecycle is `locate` -> `select_endpoints` -> `exchange`; every failure
/// is fatal to the session.
#[derive(Debug)]
pub struct DeviceSession<P> {
    port: P,
    out_endpoint: Option<EndpointInfo>,
    in_endpoint: Option<EndpointInfo>,
    timeout: Duration,
}

impl<P: UsbPort> DeviceSession<P> {
    /// Opens the first device matching the id pair.
    pub fn locate<S>(
        stack: &S,
        vendor_id: u16,
        product_id: u16,
        timeout: Duration,
    ) -> Result<Self, SessionError>
    where
        S: UsbStack<Port = P>,
    {
        let port = stack
            .open(vendor_id, product_id)?
            .ok_or(SessionError::DeviceNotFound {
                vendor_id,
                product_id,
            })?;
        Ok(Self {
            port,
            out_endpoint: None,
            in_endpoint: None,
            timeout,
        })
    }

    /// Picks the first OUT and first IN endpoint of `interface` in the
    /// active configuration, then claims the interface. Direction is the
    /// only match criterion.
    pub fn select_endpoints(&mut self, interface: u8) -> Result<(), SessionError> {
        let endpoints = self.port.endpoints(interface)?;
        let out = first_by_direction(&endpoints, Direction::Out).ok_or(
            SessionError::EndpointNotFound {
                interface,
                direction: Direction::Out,
            },
        )?;
        let inp = first_by_direction(&endpoints, Direction::In).ok_or(
            SessionError::EndpointNotFound {
                interface,
                direction: Direction::In,
            },
        )?;
        self.port.claim_interface(interface)?;
        log::debug!("selected endpoints out={out} in={inp}");
        self.out_endpoint = Some(out);
        self.in_endpoint = Some(inp);
        Ok(())
    }

    /// Writes `payload`, then reads back `payload.len()` bytes. The result
    /// holds as many bytes as the device actually delivered.
    pub fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, SessionError> {
        let out = self
            .out_endpoint
            .clone()
            .ok_or(SessionError::EndpointsNotSelected)?;
        let inp = self
            .in_endpoint
            .clone()
            .ok_or(SessionError::EndpointsNotSelected)?;

        let written = self.port.write(&out, payload, self.timeout)?;
        log::debug!("wrote {written} bytes to 0x{:02X}", out.address);

        let mut buffer = vec![0u8; payload.len()];
        let read = self.port.read(&inp, &mut buffer, self.timeout)?;
        log::debug!("read {read} bytes from 0x{:02X}", inp.address);
        buffer.truncate(read);
        Ok(buffer)
    }

    pub fn out_endpoint(&self) -> Option<&EndpointInfo> {
        self.out_endpoint.as_ref()
    }

    pub fn in_endpoint(&self) -> Option<&EndpointInfo> {
        self.in_endpoint.as_ref()
    }
}

fn first_by_direction(endpoints: &[EndpointInfo], direction: Direction) -> Option<EndpointInfo> {
    endpoints
        .iter()
        .find(|ep| ep.direction == direction)
        .cloned()
}
