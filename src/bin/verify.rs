// Validate or invalidate the public key stored in an ATECC508A slot, signed
// off by the private key in another slot.
//
// $ RUST_LOG=info verify validate 10 0
use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use linux_embedded_hal::{Delay, I2cdev};
use log::error;
use secure96::device::Device;
use secure96::error::Error;
use secure96::memory::{Slot, Variant};
use secure96::verify::{validate_public_key, Action, Outcome};
use secure96::{AtCaClient, Nonce};
use std::process;

const I2C_PATH: &str = "/dev/i2c-1";

#[derive(Parser)]
#[command(name = "verify", about = "Validate or invalidate a stored public key")]
struct Cli {
    /// `validate` or `invalidate`.
    #[arg(value_parser = parse_action)]
    action: Action,

    /// Slot holding the public key, 8 to 15.
    #[arg(value_parser = parse_pub_slot)]
    slot_pub: Slot,

    /// Slot holding the authorizing private key.
    #[arg(value_parser = parse_slot)]
    slot_parent_priv: Slot,

    /// I2C bus device.
    #[arg(long, default_value = I2C_PATH)]
    bus: std::path::PathBuf,
}

fn parse_action(arg: &str) -> Result<Action, String> {
    arg.parse().map_err(|_| format!("unknown action '{}'", arg))
}

fn parse_slot(arg: &str) -> Result<Slot, String> {
    let index = arg.parse::<u8>().map_err(|e| e.to_string())?;
    Slot::new(index).map_err(|e| e.to_string())
}

fn parse_pub_slot(arg: &str) -> Result<Slot, String> {
    let slot = parse_slot(arg)?;
    if !(8..=15).contains(&slot.index()) {
        return Err("public keys live in slots 8 to 15".into());
    }
    Ok(slot)
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            process::exit(-1);
        }
    };

    let i2c = match I2cdev::new(&cli.bus) {
        Ok(i2c) => i2c,
        Err(e) => {
            error!("{}: {}", cli.bus.display(), e);
            process::exit(-1);
        }
    };
    let mut atca = AtCaClient::new(i2c, Delay, Variant::Atecc508a);

    match run(&mut atca, cli.action, cli.slot_pub, cli.slot_parent_priv) {
        Ok(Outcome::Validated) => println!("slot {}: public key validated", cli.slot_pub.index()),
        Ok(Outcome::Invalidated) => {
            println!("slot {}: public key invalidated", cli.slot_pub.index())
        }
        Err(e) => {
            error!("{:?} of slot {} failed: {}", cli.action, cli.slot_pub.index(), e);
            process::exit(i32::from(e.code()));
        }
    }
}

fn run(
    atca: &mut AtCaClient<I2cdev, Delay>,
    action: Action,
    pub_slot: Slot,
    auth_slot: Slot,
) -> Result<Outcome, Error> {
    let config = atca.read_config()?;
    let mut bytes = [0x00; 32];
    atca.random().fill(&mut bytes)?;
    validate_public_key(atca, &config, action, pub_slot, auth_slot, Nonce::new(bytes))
}
