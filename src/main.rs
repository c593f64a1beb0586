// insteon-plm -- command line front end for a PowerLinc Modem.
//
// Usage:
//   insteon-plm --device /dev/ttyUSB0 info
//   insteon-plm --device /dev/ttyUSB0 links 1a2b3c
//   insteon-plm --device /dev/ttyUSB0 link --responder
//   insteon-plm --device /dev/ttyUSB0 turn-on 1a2b3c 50 --duration 2

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use insteon_plm::{Address, Hub, LinkOptions, Links, TurnOff, TurnOn, list_ports};

/// Links to a button press take a while to walk over to the device.
const BUTTON_PRESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote link requests answer quickly.
const REMOTE_LINK_TIMEOUT: Duration = Duration::from_secs(3);

/// Drive a PowerLinc Modem and the INSTEON devices linked to it.
#[derive(Parser)]
#[command(name = "insteon-plm", version, about)]
struct Cli {
    /// Serial device path, e.g. /dev/ttyUSB0.
    #[arg(short, long)]
    device: String,

    /// Log protocol traffic. `RUST_LOG` takes precedence.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show modem information.
    Info,

    /// Show a device's link database, or the modem's when address is omitted.
    Links { address: Option<Address> },

    /// Show incoming messages until interrupted.
    Monitor,

    /// Link a device. Without an address, press the set button on the device.
    Link {
        address: Option<Address>,

        /// Link the modem as a responder.
        #[arg(short, long, conflicts_with = "controller")]
        responder: bool,

        /// Link the modem as the controller (default).
        #[arg(short, long)]
        controller: bool,

        /// All-link group.
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..))]
        group: u8,
    },

    /// Remove a link. Without an address, press the set button on the device.
    Unlink {
        address: Option<Address>,

        /// All-link group.
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..))]
        group: u8,
    },

    /// Factory reset the modem, erasing its link database.
    Reset,

    /// Request the current level of a device.
    Status { address: Address },

    /// Ping a device.
    Ping { address: Address },

    /// Show a device's category, subcategory and firmware.
    Identify { address: Address },

    /// Turn a device on.
    #[command(alias = "turnOn")]
    TurnOn {
        address: Address,

        /// Level in percent.
        #[arg(default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,

        /// Skip the ramp.
        #[arg(short, long)]
        fast: bool,

        /// Ramp time in seconds.
        #[arg(long, value_parser = parse_seconds)]
        duration: Option<Duration>,
    },

    /// Turn a device off.
    #[command(alias = "turnOff")]
    TurnOff {
        address: Address,

        /// Skip the ramp.
        #[arg(short, long)]
        fast: bool,

        /// Ramp time in seconds.
        #[arg(long, value_parser = parse_seconds)]
        duration: Option<Duration>,
    },
}

/// Parse a positive number of seconds, e.g. "2" or "0.5".
fn parse_seconds(s: &str) -> std::result::Result<Duration, String> {
    let seconds: f64 = s.parse().map_err(|e| format!("invalid seconds: {e}"))?;
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(format!("duration must be greater than 0, got {s}")),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let device = cli.device;
    let hub = Hub::open(&device)
        .await
        .with_context(|| {
            let ports = list_ports().unwrap_or_default();
            format!("failed to open modem on {device}{}", port_hint(&ports))
        })?;
    hub.bridge()
        .cancel_all_linking()
        .await
        .context("failed to cancel linking")?;

    let result = execute(&hub, cli.command).await;

    let cancelled = hub.bridge().cancel_all_linking().await;
    let closed = hub.close().await;
    result?;
    cancelled.context("failed to cancel linking")?;
    closed.context("failed to close modem")
}

async fn execute(hub: &Hub, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let info = hub.bridge().get_info().await?;
            let config = hub.bridge().get_config().await?;
            println!("{info:#?}");
            println!("{config:#?}");
        }
        Command::Links { address } => cmd_links(hub, address).await?,
        Command::Monitor => cmd_monitor(hub).await?,
        Command::Link {
            address,
            responder,
            controller: _,
            group,
        } => {
            let options = LinkOptions::default()
                .controller(!responder)
                .group(group)
                .timeout(link_timeout(address));
            let result = hub.link(address, options).await.context("linking failed")?;
            println!("Linking complete");
            println!("{result:#?}");
        }
        Command::Unlink { address, group } => {
            let options = LinkOptions::default()
                .group(group)
                .timeout(link_timeout(address));
            let link = hub
                .unlink(address, options)
                .await
                .context("unlinking failed")?;
            println!("Unlinking complete");
            println!("{link:#?}");
        }
        Command::Reset => {
            hub.bridge().factory_reset().await?;
            println!("Modem reset");
        }
        Command::Status { address } => {
            let level = hub.status(address, 0).await?;
            println!("{level}");
        }
        Command::Ping { address } => {
            hub.ping(address).await?;
            println!("{address} answered");
        }
        Command::Identify { address } => {
            let identity = hub
                .product_info(address, insteon_plm::hub::DEFAULT_TIMEOUT)
                .await?;
            println!("{identity:#?}");
        }
        Command::TurnOn {
            address,
            level,
            fast,
            duration,
        } => {
            let options = TurnOn {
                level,
                fast,
                duration,
            };
            hub.turn_on(address, options).await?;
        }
        Command::TurnOff {
            address,
            fast,
            duration,
        } => {
            hub.turn_off(address, TurnOff { fast, duration }).await?;
        }
    }
    Ok(())
}

/// Lists the serial ports that do exist, for open failures.
fn port_hint(ports: &[String]) -> String {
    if ports.is_empty() {
        String::new()
    } else {
        format!(" (available ports: {})", ports.join(", "))
    }
}

const fn link_timeout(address: Option<Address>) -> Duration {
    if address.is_some() {
        REMOTE_LINK_TIMEOUT
    } else {
        BUTTON_PRESS_TIMEOUT
    }
}

async fn cmd_links(hub: &Hub, address: Option<Address>) -> Result<()> {
    match hub.links(address, insteon_plm::hub::DEFAULT_TIMEOUT).await? {
        Links::Bridge(records) => {
            for record in &records {
                let role = if record.controller { "controller" } else { "responder" };
                println!(
                    "{} group {:3} {role} data {}",
                    record.address,
                    record.group,
                    hex::encode(record.link_data)
                );
            }
            println!("{} records", records.len());
        }
        Links::Device(records) => {
            for record in &records {
                let role = if record.controller { "controller" } else { "responder" };
                println!(
                    "{:04x} {} group {:3} {role}",
                    record.at, record.address, record.group
                );
            }
            println!("{} records", records.len());
        }
    }
    Ok(())
}

async fn cmd_monitor(hub: &Hub) -> Result<()> {
    let mut messages = hub.subscribe();
    tracing::info!("monitoring messages, press Ctrl-C to stop");

    loop {
        tokio::select! {
            message = messages.recv() => {
                let Some(message) = message else {
                    bail!("modem connection closed");
                };
                println!("{message:?}");
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_hint() {
        assert_eq!(port_hint(&[]), "");
        let ports = vec!["/dev/ttyUSB0".to_owned(), "/dev/ttyUSB1".to_owned()];
        assert_eq!(
            port_hint(&ports),
            " (available ports: /dev/ttyUSB0, /dev/ttyUSB1)"
        );
    }

    #[test]
    fn test_cli_parses_turn_on() {
        let cli = Cli::try_parse_from([
            "insteon-plm",
            "--device",
            "/dev/ttyUSB0",
            "turnOn",
            "112233",
            "50",
            "--duration",
            "2",
        ])
        .unwrap();
        match cli.command {
            Command::TurnOn {
                address,
                level,
                fast,
                duration,
            } => {
                assert_eq!(address.to_string(), "112233");
                assert_eq!(level, 50);
                assert!(!fast);
                assert_eq!(duration, Some(Duration::from_secs(2)));
            }
            _ => panic!("expected turn-on"),
        }
    }
}
