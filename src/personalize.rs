//! One-time personalization: write the config, data and OTP zones and lock
//! them under the checksum the chip expects.

use crate::command::{Block, Word};
use crate::device::Device;
use crate::error::{Error, ErrorKind, Status, Step};
use crate::memory::{ConfigZone, KeyConfig, Size, Slot, Variant, Zone, OTP_LEN, SLOT_COUNT};
use crate::packet::CRC16;
use log::{debug, info, warn};

/// First config word of the SlotConfig table.
const SLOT_CONFIG_START_WORD: u8 = 5;
/// First config word of the KeyConfig table.
const KEY_CONFIG_START_WORD: u8 = 24;
/// Both tables span 8 words.
const CONFIG_TABLE_WORDS: u8 = 8;
/// Number of slots written between two forced idle/wake cycles.
const WAKE_CYCLE_SLOTS: u8 = 4;

/// Running CRC-16 over the bytes a zone lock covers.
pub struct ZoneChecksum {
    digest: crc::Digest<'static, u16>,
}

impl ZoneChecksum {
    pub fn new() -> Self {
        Self {
            digest: CRC16.digest(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

impl Default for ZoneChecksum {
    fn default() -> Self {
        Self::new()
    }
}

/// Content to personalize a device with.
#[derive(Clone, Copy, Debug)]
pub struct Profile<'a> {
    variant: Variant,
    slot_configs: &'a [u8],
    key_configs: Option<&'a [u8]>,
    data: &'a [u8],
    private_keys: &'a [Block],
    otp: &'a [u8],
}

impl<'a> Profile<'a> {
    /// `key_configs` is required on the ATECC508A and refused on the
    /// ATSHA204A. `private_keys` is either empty or holds one key per slot
    /// whose KeyConfig marks it private, in slot order.
    pub fn new(
        variant: Variant,
        slot_configs: &'a [u8],
        key_configs: Option<&'a [u8]>,
        data: &'a [u8],
        private_keys: &'a [Block],
        otp: &'a [u8],
    ) -> Result<Self, Error> {
        let table_len = 2 * SLOT_COUNT as usize;
        if slot_configs.len() != table_len {
            return Err(ErrorKind::InvalidLength.into());
        }
        match (variant.has_ecc(), key_configs) {
            (true, Some(table)) if table.len() == table_len => {}
            (true, _) => return Err(ErrorKind::InvalidLength.into()),
            (false, Some(_)) => return Err(ErrorKind::Unsupported.into()),
            (false, None) => {}
        }
        if data.len() != variant.data_len() || otp.len() != OTP_LEN {
            return Err(ErrorKind::InvalidLength.into());
        }

        let profile = Self {
            variant,
            slot_configs,
            key_configs,
            data,
            private_keys,
            otp,
        };
        if !private_keys.is_empty() && private_keys.len() != profile.private_slots().count() {
            return Err(ErrorKind::InvalidLength.into());
        }
        Ok(profile)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// KeyConfig.Private as set by this profile.
    pub fn is_private(&self, slot: Slot) -> bool {
        self.key_configs.map_or(false, |table| {
            let index = 2 * slot.index() as usize;
            KeyConfig::from_bits(u16::from_le_bytes([table[index], table[index + 1]])).private()
        })
    }

    pub fn private_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::all().filter(move |slot| self.is_private(*slot))
    }

    pub fn slot_data(&self, slot: Slot) -> &'a [u8] {
        &self.data[self.variant.slot_range(slot)]
    }

    /// Current config zone with this profile's tables laid over it.
    pub fn apply(&self, config: &mut ConfigZone) -> Result<(), Error> {
        config.set_slot_configs(self.slot_configs)?;
        if let Some(key_configs) = self.key_configs {
            config.set_key_configs(key_configs)?;
        }
        Ok(())
    }

    /// Checksum the data/OTP lock expects: every slot not holding a private
    /// key, then the OTP zone.
    pub fn data_checksum(&self) -> u16 {
        let mut checksum = ZoneChecksum::new();
        Slot::all()
            .filter(|slot| !self.is_private(*slot))
            .for_each(|slot| checksum.update(self.slot_data(slot)));
        checksum.update(self.otp);
        checksum.finalize()
    }
}

/// The config lock covers the whole config zone.
pub fn config_checksum(config: &ConfigZone) -> u16 {
    let mut checksum = ZoneChecksum::new();
    checksum.update(config.as_ref());
    checksum.finalize()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockOutcome {
    Locked,
    AlreadyLocked,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub config: LockOutcome,
    pub data: LockOutcome,
}

/// Personalize the config zone, then the data and OTP zones.
pub fn personalize<D: Device>(device: &mut D, profile: &Profile<'_>) -> Result<Report, Error> {
    if device.variant() != profile.variant() {
        return Err(ErrorKind::BadParam.into());
    }
    let config = personalize_config(device, profile)?;
    let data = personalize_data(device, profile)?;
    Ok(Report { config, data })
}

pub fn personalize_config<D: Device>(
    device: &mut D,
    profile: &Profile<'_>,
) -> Result<LockOutcome, Error> {
    if device.lock_status()?.config {
        info!("config zone already locked, skipping");
        return Ok(LockOutcome::AlreadyLocked);
    }

    // The checksum covers the config as it will be once written.
    let mut config = device.read_config()?;
    profile.apply(&mut config)?;
    let crc = config_checksum(&config);

    let result = write_config_zone(device, &config).and_then(|()| lock_zone(device, Zone::Config, crc));
    if let Err(error) = result {
        warn!("config zone left unlocked: {}", error);
        return Err(error);
    }
    info!("config zone locked, crc {:04x}", crc);
    Ok(LockOutcome::Locked)
}

fn write_config_zone<D: Device>(device: &mut D, config: &ConfigZone) -> Result<(), Error> {
    let slot_words = SLOT_CONFIG_START_WORD..SLOT_CONFIG_START_WORD + CONFIG_TABLE_WORDS;
    let key_words = (KEY_CONFIG_START_WORD..KEY_CONFIG_START_WORD + CONFIG_TABLE_WORDS)
        .filter(|_| config.variant().has_ecc());

    for word in slot_words.chain(key_words) {
        let index = word as usize * Size::Word.len();
        let data = Word::try_from(&config.as_ref()[index..index + Size::Word.len()])?;
        debug!("config word {}: {:02x?}", word, data.as_ref());
        device.write_config_word(word, &data)?;
    }
    Ok(())
}

pub fn personalize_data<D: Device>(
    device: &mut D,
    profile: &Profile<'_>,
) -> Result<LockOutcome, Error> {
    if device.lock_status()?.data {
        info!("data / OTP zones already locked, skipping");
        return Ok(LockOutcome::AlreadyLocked);
    }

    let crc = profile.data_checksum();
    let result = write_data_zone(device, profile).and_then(|()| lock_zone(device, Zone::Data, crc));
    if let Err(error) = result {
        warn!("data / OTP zones left unlocked: {}", error);
        return Err(error);
    }
    info!("data / OTP zones locked, crc {:04x}", crc);
    Ok(LockOutcome::Locked)
}

fn write_data_zone<D: Device>(device: &mut D, profile: &Profile<'_>) -> Result<(), Error> {
    let variant = profile.variant();
    for slot in Slot::all() {
        let data = profile.slot_data(slot);
        for (block, chunk) in data.chunks(Size::Block.len()).enumerate() {
            // The tail of the last block is zero padded.
            let mut padded = Block::default();
            padded.as_mut()[..chunk.len()].copy_from_slice(chunk);
            debug!("slot {} block {}", slot.index(), block);
            device.write_data_block(slot, block as u8, &padded)?;
        }

        // Keep the watchdog from expiring during the long ATECC508A burst.
        if variant.has_ecc() && (slot.index() + 1) % WAKE_CYCLE_SLOTS == 0 {
            device.idle()?;
            device.wake()?;
        }
    }

    for (slot, key) in profile.private_slots().zip(profile.private_keys.iter()) {
        debug!("private key into slot {}", slot.index());
        device.privwrite_plain(slot, key)?;
    }
    if profile.private_keys.is_empty() && profile.private_slots().next().is_some() {
        warn!("no private keys supplied, private slots keep their data image");
    }

    for (block, chunk) in profile.otp.chunks(Size::Block.len()).enumerate() {
        let data = Block::try_from(chunk)?;
        device.write_otp_block(block as u8, &data)?;
    }
    info!("data / OTP zones written");
    Ok(())
}

/// A lock refused with an execution error means the checksum did not match:
/// the zone is known to be unlocked at this point.
fn lock_zone<D: Device>(device: &mut D, zone: Zone, crc: u16) -> Result<(), Error> {
    let step = match zone {
        Zone::Config => Step::LockConfig,
        Zone::Data | Zone::Otp => Step::LockData,
    };
    device.lock(zone, crc).map_err(|error| {
        if error.status() == Some(Status::Execution) {
            Error::from(ErrorKind::ChecksumMismatch).at(step)
        } else {
            error.at(step)
        }
    })
}
