//! Zone and slot layout of the supported secure elements.
//!
//! Everything in here is a pure table or bit accessor. The two chip families
//! differ in config zone size and in the shape of their data slots, so every
//! table is keyed by [`Variant`].

use super::error::{Error, ErrorKind};
use bitfield_struct::bitfield;
use core::ops::Range;

/// Zone bit 7 set: Access 32 bytes, otherwise 4 bytes.
const ZONE_READWRITE_32: u8 = 0x80;

/// Largest config zone among the variants.
pub const CONFIG_ZONE_MAX: usize = 128;
/// Both variants carry 16 data slots.
pub const SLOT_COUNT: u8 = 16;
/// OTP zone length, written as two 32-byte blocks.
pub const OTP_LEN: usize = 64;

/// Chip family.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// ATECC508A: ECC capable, 128-byte config zone, slots of 36/416/72 bytes.
    Atecc508a,
    /// ATSHA204A: symmetric only, 88-byte config zone, 16 slots of 32 bytes.
    Atsha204a,
}

impl Variant {
    pub const fn config_len(&self) -> usize {
        match self {
            Self::Atecc508a => 128,
            Self::Atsha204a => 88,
        }
    }

    /// Size of the unit the config zone is read in.
    pub const fn config_read_size(&self) -> Size {
        match self {
            Self::Atecc508a => Size::Block,
            Self::Atsha204a => Size::Word,
        }
    }

    /// ECC commands (GenKey, Sign, Verify, PrivWrite) and KeyConfig exist.
    pub const fn has_ecc(&self) -> bool {
        matches!(self, Self::Atecc508a)
    }

    pub fn slot_length(&self, slot: Slot) -> usize {
        match self {
            Self::Atecc508a => match slot.index() {
                0..=7 => 36,
                8 => 416,
                _ => 72,
            },
            Self::Atsha204a => 32,
        }
    }

    pub fn slot_block_count(&self, slot: Slot) -> u8 {
        match self {
            Self::Atecc508a => match slot.index() {
                0..=7 => 2,
                8 => 13,
                _ => 3,
            },
            Self::Atsha204a => 1,
        }
    }

    /// Sum of all slot lengths.
    pub fn data_len(&self) -> usize {
        Slot::all().map(|slot| self.slot_length(slot)).sum()
    }

    /// Byte range a slot occupies within a contiguous data zone image.
    pub fn slot_range(&self, slot: Slot) -> Range<usize> {
        let start = Slot::all()
            .take_while(|s| s.index() < slot.index())
            .map(|s| self.slot_length(s))
            .sum::<usize>();
        start..start + self.slot_length(slot)
    }
}

/// A unit of data exchange is either 4 or 32 bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Size {
    Word = 0x04,
    Block = 0x20,
}

impl Size {
    pub const fn len(&self) -> usize {
        *self as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Zone {
    Config = 0x00,
    Otp = 0x01,
    Data = 0x02,
}

impl Zone {
    pub(crate) fn get_slot_addr(&self, variant: Variant, slot: Slot, block: u8) -> Result<u16, Error> {
        match self {
            Self::Data if block < variant.slot_block_count(slot) => {
                Ok((slot.index() as u16) << 3 | (block as u16) << 8)
            }
            _ => Err(ErrorKind::BadParam.into()),
        }
    }

    pub(crate) fn get_addr(&self, block: u8, offset: u8) -> Result<u16, Error> {
        if block.leading_zeros() < 3 || offset.leading_zeros() < 4 {
            return Err(ErrorKind::BadParam.into());
        }
        let block = (block as u16) << 3;
        let offset = (offset & 0b0000_0111u8) as u16;
        let addr = block | offset;
        match self {
            Self::Config | Self::Otp => Ok(addr),
            // Use get_slot_addr instead.
            Self::Data => Err(ErrorKind::BadParam.into()),
        }
    }

    pub(crate) fn encode(&self, size: Size) -> u8 {
        match size {
            Size::Word => *self as u8,
            Size::Block => *self as u8 | ZONE_READWRITE_32,
        }
    }

    /// Split a byte index into (block, word offset within block, byte within word).
    pub(crate) fn locate_index(index: usize) -> (u8, u8, u8) {
        let block = (index / Size::Block.len()) as u8;
        let offset = ((index % Size::Block.len()) / Size::Word.len()) as u8;
        let pos = (index % Size::Word.len()) as u8;
        (block, offset, pos)
    }
}

/// Data zone slot index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Slot(u8);

impl Slot {
    pub fn new(index: u8) -> Result<Self, Error> {
        if index >= SLOT_COUNT {
            return Err(ErrorKind::InvalidSlot.into());
        }
        Ok(Self(index))
    }

    pub const fn index(&self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Slot> + Clone {
        (0..SLOT_COUNT).map(Slot)
    }
}

impl TryFrom<u8> for Slot {
    type Error = Error;
    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

/// SlotConfig, stored little endian at config byte 20 + 2 * slot.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct SlotConfig {
    #[bits(4)]
    pub read_key: u8,
    pub no_mac: bool,
    pub limited_use: bool,
    pub encrypt_read: bool,
    pub is_secret: bool,
    /// Slot holding the key that authorizes writes (the GenDig parent).
    #[bits(4)]
    pub write_key: u8,
    #[bits(4)]
    pub write_config: u8,
}

impl SlotConfig {
    /// WriteConfig bit 2 (bit 6 of the second byte).
    pub const WRITE_CONFIG_PRIV_WRITE: u8 = 0b0100;

    pub fn privwrite_allowed(&self) -> bool {
        self.write_config() & Self::WRITE_CONFIG_PRIV_WRITE != 0
    }

    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.into_bits().to_le_bytes()
    }
}

/// KeyConfig, stored little endian at config byte 96 + 2 * slot. ATECC508A only.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct KeyConfig {
    pub private: bool,
    pub pub_info: bool,
    #[bits(3)]
    pub key_type: u8,
    pub lockable: bool,
    pub req_random: bool,
    pub req_auth: bool,
    #[bits(4)]
    pub auth_key: u8,
    pub intrusion_disable: bool,
    #[bits(1)]
    __: u8,
    #[bits(2)]
    pub x509_id: u8,
}

impl KeyConfig {
    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.into_bits().to_le_bytes()
    }
}

/// A full copy of the config zone.
#[derive(Clone, Debug)]
pub struct ConfigZone {
    variant: Variant,
    bytes: [u8; CONFIG_ZONE_MAX],
}

impl ConfigZone {
    pub const SERIAL_HEAD: Range<usize> = 0..4;
    pub const SERIAL_TAIL: Range<usize> = 8..13;
    pub const OTP_MODE_INDEX: usize = 18;
    pub const SLOT_CONFIG_INDEX: usize = 20;
    pub const LOCK_VALUE_INDEX: usize = 86;
    pub const LOCK_CONFIG_INDEX: usize = 87;
    pub const SLOT_LOCKED_INDEX: usize = 88;
    pub const KEY_CONFIG_INDEX: usize = 96;
    /// Lock bytes read 0x55 while the zone is still writable.
    pub const UNLOCKED: u8 = 0x55;

    /// Zero filled config zone.
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            bytes: [0x00; CONFIG_ZONE_MAX],
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    fn u16_at(&self, index: usize) -> u16 {
        u16::from_le_bytes([self.bytes[index], self.bytes[index + 1]])
    }

    pub fn slot_config(&self, slot: Slot) -> SlotConfig {
        SlotConfig::from_bits(self.u16_at(Self::SLOT_CONFIG_INDEX + 2 * slot.index() as usize))
    }

    /// KeyConfig of the slot. Always zero on variants without KeyConfig.
    pub fn key_config(&self, slot: Slot) -> KeyConfig {
        if !self.variant.has_ecc() {
            return KeyConfig::new();
        }
        KeyConfig::from_bits(self.u16_at(Self::KEY_CONFIG_INDEX + 2 * slot.index() as usize))
    }

    pub fn is_secret(&self, slot: Slot) -> bool {
        self.slot_config(slot).is_secret()
    }

    pub fn privwrite_allowed(&self, slot: Slot) -> bool {
        self.slot_config(slot).privwrite_allowed()
    }

    pub fn is_private(&self, slot: Slot) -> bool {
        self.key_config(slot).private()
    }

    /// Raw SlotLocked bit of the slot: 1 while the slot can still be locked
    /// individually, 0 once it is locked.
    pub fn slot_locked_bit(&self, slot: Slot) -> u8 {
        if !self.variant.has_ecc() {
            return 0x01;
        }
        ((self.u16_at(Self::SLOT_LOCKED_INDEX) >> slot.index()) & 0x01) as u8
    }

    pub fn is_config_locked(&self) -> bool {
        self.bytes[Self::LOCK_CONFIG_INDEX] != Self::UNLOCKED
    }

    pub fn is_data_locked(&self) -> bool {
        self.bytes[Self::LOCK_VALUE_INDEX] != Self::UNLOCKED
    }

    pub fn otp_mode(&self) -> OtpMode {
        OtpMode::from(self.bytes[Self::OTP_MODE_INDEX])
    }

    /// Overwrite the SlotConfig table with 32 bytes.
    pub fn set_slot_configs(&mut self, slot_configs: &[u8]) -> Result<(), Error> {
        self.overlay(Self::SLOT_CONFIG_INDEX, slot_configs)
    }

    /// Overwrite the KeyConfig table with 32 bytes.
    pub fn set_key_configs(&mut self, key_configs: &[u8]) -> Result<(), Error> {
        if !self.variant.has_ecc() {
            return Err(ErrorKind::Unsupported.into());
        }
        self.overlay(Self::KEY_CONFIG_INDEX, key_configs)
    }

    fn overlay(&mut self, index: usize, table: &[u8]) -> Result<(), Error> {
        if table.len() != 2 * SLOT_COUNT as usize {
            return Err(ErrorKind::InvalidLength.into());
        }
        self.bytes[index..index + table.len()].copy_from_slice(table);
        Ok(())
    }
}

impl AsRef<[u8]> for ConfigZone {
    fn as_ref(&self) -> &[u8] {
        &self.bytes[..self.variant.config_len()]
    }
}

impl AsMut<[u8]> for ConfigZone {
    fn as_mut(&mut self) -> &mut [u8] {
        let len = self.variant.config_len();
        &mut self.bytes[..len]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OtpMode {
    Legacy,
    Consumption,
    ReadOnly,
    Unknown(u8),
}

impl From<u8> for OtpMode {
    fn from(mode: u8) -> Self {
        match mode {
            0x00 => Self::Legacy,
            0x55 => Self::Consumption,
            0xAA => Self::ReadOnly,
            other => Self::Unknown(other),
        }
    }
}

impl OtpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "Legacy",
            Self::Consumption => "Consumption",
            Self::ReadOnly => "Readonly",
            Self::Unknown(_) => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: u8) -> Slot {
        Slot::new(index).unwrap()
    }

    #[test]
    fn atecc508a_slot_table() {
        let variant = Variant::Atecc508a;
        for i in 0..=7 {
            assert_eq!(variant.slot_length(slot(i)), 36);
            assert_eq!(variant.slot_block_count(slot(i)), 2);
        }
        assert_eq!(variant.slot_length(slot(8)), 416);
        assert_eq!(variant.slot_block_count(slot(8)), 13);
        for i in 9..=15 {
            assert_eq!(variant.slot_length(slot(i)), 72);
            assert_eq!(variant.slot_block_count(slot(i)), 3);
        }
        assert_eq!(variant.data_len(), 1208);
        assert_eq!(variant.slot_range(slot(9)), 704..776);
    }

    #[test]
    fn atsha204a_slot_table() {
        let variant = Variant::Atsha204a;
        for s in Slot::all() {
            assert_eq!(variant.slot_length(s), 32);
            assert_eq!(variant.slot_block_count(s), 1);
        }
        assert_eq!(variant.data_len(), 512);
        assert_eq!(variant.slot_range(slot(3)), 96..128);
    }

    #[test]
    fn slot_out_of_range() {
        assert!(Slot::new(16).is_err());
        assert_eq!(Slot::try_from(15).unwrap().index(), 15);
    }

    #[test]
    fn slot_addresses() {
        let variant = Variant::Atecc508a;
        assert_eq!(Zone::Data.get_slot_addr(variant, slot(8), 12).unwrap(), 0x0c40);
        assert!(Zone::Data.get_slot_addr(variant, slot(0), 2).is_err());
        assert_eq!(Zone::Otp.get_addr(1, 0).unwrap(), 0x0008);
        assert_eq!(Zone::locate_index(87), (2, 5, 3));
    }

    #[test]
    fn slot_config_bits() {
        // IsSecret, WriteKey = 3, WriteConfig = PrivWrite
        let config = SlotConfig::from_bits(u16::from_le_bytes([0x80, 0x43]));
        assert!(config.is_secret());
        assert!(config.privwrite_allowed());
        assert_eq!(config.write_key(), 3);
        assert_eq!(config.to_le_bytes(), [0x80, 0x43]);

        let config = SlotConfig::from_bits(u16::from_le_bytes([0x0f, 0x0f]));
        assert!(!config.is_secret());
        assert!(!config.privwrite_allowed());
    }

    #[test]
    fn config_zone_accessors() {
        let mut config = ConfigZone::new(Variant::Atecc508a);
        config.as_mut()[20 + 2 * 1..20 + 2 * 1 + 2].copy_from_slice(&[0x87, 0x40]);
        config.as_mut()[96 + 2 * 1] = 0x33;
        config.as_mut()[86] = 0x55;
        config.as_mut()[87] = 0x00;
        config.as_mut()[88..90].copy_from_slice(&[0xfd, 0xff]);
        assert!(config.is_secret(slot(1)));
        assert!(config.privwrite_allowed(slot(1)));
        assert!(config.is_private(slot(1)));
        assert!(!config.is_private(slot(2)));
        assert!(config.is_config_locked());
        assert!(!config.is_data_locked());
        assert_eq!(config.slot_locked_bit(slot(1)), 0);
        assert_eq!(config.slot_locked_bit(slot(9)), 1);
    }

    #[test]
    fn atsha204a_has_no_key_config() {
        let mut config = ConfigZone::new(Variant::Atsha204a);
        assert_eq!(config.as_ref().len(), 88);
        assert!(!config.is_private(slot(0)));
        assert!(config.set_key_configs(&[0x01; 32]).is_err());
        assert!(config.set_slot_configs(&[0x01; 31]).is_err());
    }
}
