// Write a P-256 private key into an ATECC508A slot over an encrypted
// PrivWrite session.
//
// $ RUST_LOG=info privwrite 2 key.pem
// $ privwrite 2 key.pem --parent-key 0404...04
use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use linux_embedded_hal::{Delay, I2cdev};
use log::{error, info};
use secure96::device::Device;
use secure96::error::Error;
use secure96::keyfile::private_key_from_pem;
use secure96::memory::{Slot, Variant};
use secure96::privwrite::write_private_key;
use secure96::tempkey::{ParentKey, SerialFragment};
use secure96::{AtCaClient, Nonce};
use std::process;

const I2C_PATH: &str = "/dev/i2c-1";

#[derive(Parser)]
#[command(name = "privwrite", about = "Write a private key into a secure element slot")]
struct Cli {
    /// Target slot.
    #[arg(value_parser = parse_slot)]
    slot: Slot,

    /// PEM encoded P-256 private key (SEC1 or PKCS#8).
    key: std::path::PathBuf,

    /// Contents of the write-key slot as 64 hex digits. Defaults to a slot
    /// filled with its own index.
    #[arg(long, value_parser = parse_parent_key)]
    parent_key: Option<ParentKey>,

    /// I2C bus device.
    #[arg(long, default_value = I2C_PATH)]
    bus: std::path::PathBuf,
}

fn parse_slot(arg: &str) -> Result<Slot, String> {
    let index = arg.parse::<u8>().map_err(|e| e.to_string())?;
    Slot::new(index).map_err(|e| e.to_string())
}

fn parse_parent_key(arg: &str) -> Result<ParentKey, String> {
    arg.parse().map_err(|_| String::from("expected 64 hex digits"))
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

    let pem = match std::fs::read(&cli.key) {
        Ok(pem) => pem,
        Err(e) => {
            error!("{}: {}", cli.key.display(), e);
            process::exit(-1);
        }
    };
    let mut der = [0x00; 512];
    let private_key = match private_key_from_pem(&pem, &mut der) {
        Ok(key) => key,
        Err(e) => {
            error!("{}: {}", cli.key.display(), e);
            process::exit(i32::from(e.code()));
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
    let parent_key = cli.parent_key.unwrap_or_default();

    if let Err(e) = run(&mut atca, cli.slot, &private_key, &parent_key) {
        error!("privwrite to slot {} failed: {}", cli.slot.index(), e);
        process::exit(i32::from(e.code()));
    }
}

fn run(
    atca: &mut AtCaClient<I2cdev, Delay>,
    slot: Slot,
    private_key: &secure96::Block,
    parent_key: &ParentKey,
) -> Result<(), Error> {
    let config = atca.read_config()?;
    let mut bytes = [0x00; 32];
    atca.random().fill(&mut bytes)?;

    write_private_key(
        atca,
        &config,
        slot,
        private_key,
        Nonce::new(bytes),
        parent_key,
        &SerialFragment::default(),
    )?;
    info!("slot {} provisioned", slot.index());
    Ok(())
}
