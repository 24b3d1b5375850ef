mod backend;
mod device;
mod session;

use std::time::Duration;

use clap::{Args, Parser};

use crate::backend::RusbStack;
use crate::session::DeviceSession;

#[derive(Parser, Debug)]
#[command(name = "usb-echo")]
#[command(version)]
#[command(about = "Write a payload to a USB device and read back its echo", long_about = None)]
struct Cli {
    #[command(flatten)]
    target: Target,

    /// List all visible USB devices and exit
    #[arg(long = "list-all")]
    list_all: bool,

    /// Payload to send to the device
    #[arg(long, default_value = "Hello World!")]
    payload: String,

    /// Transfer timeout in seconds
    #[arg(long, default_value_t = 1, value_name = "SECONDS")]
    timeout: u64,

    /// Interface number within the active configuration
    #[arg(long, default_value_t = 0)]
    interface: u8,
}

#[derive(Args, Debug)]
struct Target {
    /// Vendor ID in hex format (e.g. 0x0069)
    #[arg(short = 'v', long = "vendor", value_parser = parse_hex_u16, default_value = "0x0069")]
    vendor_id: u16,

    /// Product ID in hex format (e.g. 0x0042)
    #[arg(short = 'p', long = "product", value_parser = parse_hex_u16, default_value = "0x0042")]
    product_id: u16,
}

fn parse_hex_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u16::from_str_radix(s, 16)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_all {
        for summary in device::list_devices()? {
            println!("{summary}");
        }
        return Ok(());
    }

    let Target {
        vendor_id,
        product_id,
    } = cli.target;

    let stack = RusbStack::new()?;
    let mut session = DeviceSession::locate(
        &stack,
        vendor_id,
        product_id,
        Duration::from_secs(cli.timeout),
    )?;
    println!("Found device {vendor_id:04x}:{product_id:04x}");

    session.select_endpoints(cli.interface)?;
    if let (Some(out), Some(inp)) = (session.out_endpoint(), session.in_endpoint()) {
        println!("OUT endpoint: {out}");
        println!("IN  endpoint: {inp}");
    }

    let response = session.exchange(cli.payload.as_bytes())?;
    println!("Device says: {}", decode_bytes(&response));
    Ok(())
}

// One char per byte, whatever the byte is.
fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_ids_with_and_without_prefix() {
        assert_eq!(parse_hex_u16("0x0069").unwrap(), 0x0069);
        assert_eq!(parse_hex_u16("0042").unwrap(), 0x0042);
        assert_eq!(parse_hex_u16("2e8a").unwrap(), 0x2e8a);
        assert!(parse_hex_u16("0xzz").is_err());
    }

    #[test]
    fn decodes_one_char_per_byte() {
        assert_eq!(decode_bytes(b"Hello World!"), "Hello World!");
        assert_eq!(decode_bytes(&[0xff, 0x41]), "\u{ff}A");
    }

    #[test]
    fn cli_defaults_to_echo_device() {
        let cli = Cli::parse_from(["usb-echo"]);
        assert_eq!(cli.target.vendor_id, 0x0069);
        assert_eq!(cli.target.product_id, 0x0042);
        assert_eq!(cli.payload, "Hello World!");
        assert_eq!(cli.timeout, 1);
        assert_eq!(cli.interface, 0);
    }

    #[test]
    fn cli_accepts_hex_overrides() {
        let cli = Cli::parse_from(["usb-echo", "-v", "0x2e8a", "-p", "000c", "--payload", "ping"]);
        assert_eq!(cli.target.vendor_id, 0x2e8a);
        assert_eq!(cli.target.product_id, 0x000c);
        assert_eq!(cli.payload, "ping");
    }
}
