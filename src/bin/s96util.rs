// Inspect and personalize ATECC508A / ATSHA204A devices.
//
// $ s96util --info
// $ s96util --variant b --dump-config
// $ RUST_LOG=info s96util --personalize --slot-config slots.bin \
//   --key-config keys.bin --data data.bin --otp otp.bin
use clap::error::ErrorKind as ClapErrorKind;
use clap::{ArgGroup, Parser, ValueEnum};
use linux_embedded_hal::{Delay, I2cdev};
use log::{error, warn};
use secure96::error::Error;
use secure96::memory::{ConfigZone, Variant};
use secure96::personalize::{personalize, LockOutcome, Profile};
use secure96::{AtCaClient, Block};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

const I2C_PATH: &str = "/dev/i2c-1";

#[derive(Copy, Clone, ValueEnum)]
enum Chip {
    /// ATECC508A
    A,
    /// ATSHA204A
    B,
}

impl From<Chip> for Variant {
    fn from(chip: Chip) -> Self {
        match chip {
            Chip::A => Variant::Atecc508a,
            Chip::B => Variant::Atsha204a,
        }
    }
}

#[derive(Parser)]
#[command(name = "s96util", about = "Secure element inspection and personalization")]
#[command(group(ArgGroup::new("mode").required(true).args(["info", "dump_config", "personalize"])))]
struct Cli {
    #[arg(long, value_enum, default_value = "a")]
    variant: Chip,

    /// Print revision, serial number, OTP mode and lock status.
    #[arg(long)]
    info: bool,

    /// Hex dump of the config zone.
    #[arg(long)]
    dump_config: bool,

    /// Write the images below and lock every zone.
    #[arg(long, requires_all = ["slot_config", "data", "otp"])]
    personalize: bool,

    /// SlotConfig table, 32 bytes.
    #[arg(long)]
    slot_config: Option<PathBuf>,

    /// KeyConfig table, 32 bytes. ATECC508A only.
    #[arg(long)]
    key_config: Option<PathBuf>,

    /// Data zone image covering every slot.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Raw 32 byte keys, one per private slot in slot order.
    #[arg(long)]
    private_keys: Option<PathBuf>,

    /// OTP zone image, 64 bytes.
    #[arg(long)]
    otp: Option<PathBuf>,

    /// Do not ask for confirmation before locking.
    #[arg(long)]
    yes: bool,

    /// I2C bus device.
    #[arg(long, default_value = I2C_PATH)]
    bus: PathBuf,
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
    let mut atca = AtCaClient::new(i2c, Delay, cli.variant.into());

    let result = if cli.info {
        info(&mut atca)
    } else if cli.dump_config {
        dump_config(&mut atca);
        Ok(())
    } else {
        match Images::load(&cli) {
            Ok(images) => run_personalize(&mut atca, &cli, &images),
            Err(e) => {
                error!("{}", e);
                process::exit(-1);
            }
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(i32::from(e.code()));
    }
}

fn info(atca: &mut AtCaClient<I2cdev, Delay>) -> Result<(), Error> {
    let revision = atca.info()?;
    let serial = atca.memory().serial_number()?;
    let otp_mode = atca.memory().otp_mode()?;
    let lock = atca.memory().lock_status()?;

    println!("Revision:     {}", hex::encode(revision));
    println!("Serial:       {}", hex::encode(serial));
    println!("OTP mode:     {}", otp_mode.as_str());
    println!("Config zone:  {}", if lock.config { "locked" } else { "unlocked" });
    println!("Data zone:    {}", if lock.data { "locked" } else { "unlocked" });
    Ok(())
}

fn dump_config(atca: &mut AtCaClient<I2cdev, Delay>) {
    let (config, failures) = atca.memory().dump_config();
    print_config(&config);
    if failures > 0 {
        warn!("{} config reads failed, shown as zeros", failures);
    }
}

fn print_config(config: &ConfigZone) {
    for (row, line) in config.as_ref().chunks(16).enumerate() {
        println!("{:02x}: {}", row * 16, hex::encode(line));
    }
}

/// Personalization images read from disk.
struct Images {
    slot_configs: Vec<u8>,
    key_configs: Option<Vec<u8>>,
    data: Vec<u8>,
    private_keys: Vec<Block>,
    otp: Vec<u8>,
}

impl Images {
    fn load(cli: &Cli) -> Result<Self, String> {
        let required = |path: &Option<PathBuf>, name: &str| -> Result<Vec<u8>, String> {
            path.as_deref()
                .ok_or_else(|| format!("--{} is required", name))
                .and_then(read)
        };

        let private_keys = match cli.private_keys.as_deref() {
            Some(path) => {
                let raw = read(path)?;
                if raw.len() % 32 != 0 {
                    return Err(format!("{}: not a sequence of 32 byte keys", path.display()));
                }
                raw.chunks(32)
                    .map(Block::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("{}: {}", path.display(), e))?
            }
            None => Vec::new(),
        };

        Ok(Self {
            slot_configs: required(&cli.slot_config, "slot-config")?,
            key_configs: cli.key_config.as_deref().map(read).transpose()?,
            data: required(&cli.data, "data")?,
            private_keys,
            otp: required(&cli.otp, "otp")?,
        })
    }

    fn profile(&self, variant: Variant) -> Result<Profile<'_>, Error> {
        Profile::new(
            variant,
            &self.slot_configs,
            self.key_configs.as_deref(),
            &self.data,
            &self.private_keys,
            &self.otp,
        )
    }
}

fn read(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))
}

fn confirm(variant: Variant) -> bool {
    print!(
        "Personalizing locks the {:?} permanently. Type 'yes' to continue: ",
        variant
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => answer.trim() == "yes",
        Err(_) => false,
    }
}

fn run_personalize(
    atca: &mut AtCaClient<I2cdev, Delay>,
    cli: &Cli,
    images: &Images,
) -> Result<(), Error> {
    let variant = Variant::from(cli.variant);
    let profile = images.profile(variant)?;
    if !cli.yes && !confirm(variant) {
        println!("Aborted.");
        return Ok(());
    }

    let report = personalize(atca, &profile)?;
    let describe = |outcome: LockOutcome| match outcome {
        LockOutcome::Locked => "locked",
        LockOutcome::AlreadyLocked => "already locked, left untouched",
    };
    println!("Config zone:      {}", describe(report.config));
    println!("Data / OTP zones: {}", describe(report.data));
    Ok(())
}
