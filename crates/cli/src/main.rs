//! USB-IO command line tool
//!
//! Reads the input pins and drives the output pins of a USB-IO 2.0 (AKI)
//! board attached to the local machine.

mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use common::{DeviceIdentity, setup_logging};
use tracing::{debug, info};
use usbio::{DeviceIo, InputPins, RusbTransport, Session, SessionOptions};

#[derive(Parser, Debug)]
#[command(name = "usbio")]
#[command(author, version, about = "USB-IO 2.0 digital I/O tool")]
#[command(long_about = "
Reads and writes the digital I/O pins of a USB-IO 2.0 (AKI) board.

Port 1 (J1[0:7]) is driven as output, port 2 (J2[0:3]) is read as input.
Byte arguments accept decimal, 0x-prefixed hex or 0b-prefixed binary.

EXAMPLES:
    # Read the input pins
    usbio read

    # Turn on output pin 0, leave the other pins alone
    usbio write --data 0x01 --mask 0x01

    # Drive all output pins and read the inputs in one exchange
    usbio read-write --data 0b10100000

    # List USB devices
    usbio list

CONFIGURATION:
    The tool looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbio/usbio.toml
    3. /etc/usbio/usbio.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Reset the device before opening it
    #[arg(long)]
    reset: bool,

    /// Close the device on exit instead of resetting it
    ///
    /// The device will not respond again until it is reset or re-plugged.
    #[arg(long)]
    graceful_close: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Read the input pins (default)
    Read,
    /// Drive the output pins selected by the mask
    Write {
        /// Output pin values
        #[arg(short, long, value_parser = parse_byte)]
        data: u8,
        /// Output pins to change
        #[arg(short, long, value_parser = parse_byte, default_value = "0xff")]
        mask: u8,
    },
    /// Drive the output pins and read the input pins in one exchange
    ReadWrite {
        /// Output pin values
        #[arg(short, long, value_parser = parse_byte)]
        data: u8,
        /// Output pins to change
        #[arg(short, long, value_parser = parse_byte, default_value = "0xff")]
        mask: u8,
    },
    /// List USB devices and exit
    List,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::CliConfig::default();
        let path = config::CliConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        config::CliConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    debug!("usbio v{}", env!("CARGO_PKG_VERSION"));

    let command = args.command.unwrap_or(Command::Read);
    if command == Command::List {
        return list_devices_mode();
    }

    let options = SessionOptions {
        identity: DeviceIdentity::usbio(),
        reset_first: args.reset || config.device.reset_on_init,
        exchange: config.exchange.clone(),
    };
    let reset_on_close = config.device.reset_on_close && !args.graceful_close;

    let mut session =
        usbio::initialize_with_options(&options).context("Failed to open USB-IO device")?;

    let result = run_command(&mut session, command);

    info!("Releasing device (reset: {})", reset_on_close);
    usbio::shutdown(session, reset_on_close);

    result
}

fn run_command<H: DeviceIo>(session: &mut Session<H>, command: Command) -> Result<()> {
    match command {
        Command::Read => {
            let input = session.read().context("Failed to read input pins")?;
            print_input(InputPins(input));
        }
        Command::Write { data, mask } => {
            session
                .write(data, mask)
                .context("Failed to write output pins")?;
            println!("Output: {}", session.output_status());
        }
        Command::ReadWrite { data, mask } => {
            let input = session
                .read_write(data, mask)
                .context("Failed to exchange with device")?;
            println!("Output: {}", session.output_status());
            print_input(InputPins(input));
        }
        Command::List => bail!("list does not run against an open session"),
    }
    Ok(())
}

fn print_input(input: InputPins) {
    println!("Input:  {}", input);
    for (pin, open) in input.pins() {
        println!("  J2[{}]: {}", pin, if open { "open" } else { "closed" });
    }
}

/// List USB devices and exit
fn list_devices_mode() -> Result<()> {
    let transport = RusbTransport::new().context("Failed to create USB context")?;
    let devices =
        usbio::list(&transport, DeviceIdentity::usbio()).context("Failed to enumerate devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for (device, is_target) in devices {
        println!(
            "  {}{}",
            device,
            if is_target { "  <- USB-IO" } else { "" }
        );
        println!(
            "      Configuration {} Interface {}",
            device.config_value, device.interface_number
        );
    }

    Ok(())
}

/// Parse a byte given as decimal, 0x hex or 0b binary
fn parse_byte(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"));
    let bin = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B"));
    let (digits, radix) = if let Some(hex) = hex {
        (hex, 16)
    } else if let Some(bin) = bin {
        (bin, 2)
    } else {
        (s, 10)
    };

    u8::from_str_radix(digits, radix).map_err(|e| format!("invalid byte '{}': {}", s, e))
}
