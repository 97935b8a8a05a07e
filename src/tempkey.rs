//! Off-chip reproduction of the TempKey the chip holds after
//! `Nonce(passthrough)` followed by `GenDig(Data, slot)`.

use crate::command::{Nonce, OpCode};
use crate::error::{Error, ErrorKind};
use crate::memory::{Slot, Zone};
use core::fmt;
use core::str::FromStr;
use generic_array::typenum::U32;
use generic_array::GenericArray;
use sha2::{Digest as _, Sha256};

/// How the contents of the GenDig parent slot are known off-chip.
#[derive(Clone, PartialEq, Eq)]
pub enum ParentKey {
    /// Every byte equals the parent slot index. Matches data images that
    /// fill each slot with its own number.
    SlotFill,
    /// The key actually provisioned into the parent slot.
    Provisioned([u8; 32]),
}

impl Default for ParentKey {
    fn default() -> Self {
        Self::SlotFill
    }
}

impl fmt::Debug for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotFill => f.write_str("SlotFill"),
            Self::Provisioned(_) => f.write_str("Provisioned(..)"),
        }
    }
}

/// 64 hex digits of provisioned key material.
impl FromStr for ParentKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut key = [0x00; 32];
        hex::decode_to_slice(s, &mut key).map_err(|_| Error::from(ErrorKind::KeyDecode))?;
        Ok(Self::Provisioned(key))
    }
}

impl ParentKey {
    pub fn material(&self, parent_slot: Slot) -> [u8; 32] {
        match self {
            Self::SlotFill => [parent_slot.index(); 32],
            Self::Provisioned(key) => *key,
        }
    }
}

/// Serial number bytes the chip mixes into its digests: SN[8] and SN[0:1].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialFragment {
    pub sn8: u8,
    pub sn01: [u8; 2],
}

impl Default for SerialFragment {
    /// Factory constants shared by every ATECC508A and ATSHA204A.
    fn default() -> Self {
        Self {
            sn8: 0xEE,
            sn01: [0x01, 0x23],
        }
    }
}

/// 32 byte session key. Not `Copy`: it authorizes a single command.
#[derive(Clone, PartialEq, Eq)]
pub struct TempKey {
    value: GenericArray<u8, U32>,
}

impl TempKey {
    pub fn from_array(bytes: [u8; 32]) -> Self {
        Self {
            value: bytes.into(),
        }
    }
}

impl fmt::Debug for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TempKey(..)")
    }
}

impl AsRef<[u8]> for TempKey {
    fn as_ref(&self) -> &[u8] {
        self.value.as_ref()
    }
}

/// SHA-256 input of the GenDig command.
pub struct GenDigInput {
    bytes: [u8; Self::LEN],
}

impl GenDigInput {
    pub const LEN: usize = 96;
    pub const KEY: usize = 0;
    pub const OPCODE: usize = 32;
    pub const PARAM1: usize = 33;
    pub const PARAM2: usize = 34;
    pub const SN8: usize = 36;
    pub const SN01: usize = 37;
    /// 25 zero bytes
    pub const PADDING: usize = 39;
    pub const TEMPKEY: usize = 64;

    pub fn new(
        nonce: &Nonce,
        parent_slot: Slot,
        parent_key: &ParentKey,
        serial: &SerialFragment,
    ) -> Self {
        let mut bytes = [0x00; Self::LEN];
        bytes[Self::KEY..Self::OPCODE].copy_from_slice(&parent_key.material(parent_slot));
        bytes[Self::OPCODE] = OpCode::GenDig as u8;
        bytes[Self::PARAM1] = Zone::Data as u8;
        bytes[Self::PARAM2] = parent_slot.index();
        bytes[Self::PARAM2 + 1] = 0x00;
        bytes[Self::SN8] = serial.sn8;
        bytes[Self::SN01..Self::PADDING].copy_from_slice(&serial.sn01);
        bytes[Self::TEMPKEY..].copy_from_slice(nonce.as_ref());
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.bytes
    }
}

/// TempKey after a passthrough nonce and a GenDig over `parent_slot`.
pub fn derive_tempkey(
    nonce: &Nonce,
    parent_slot: Slot,
    parent_key: &ParentKey,
    serial: &SerialFragment,
) -> TempKey {
    let input = GenDigInput::new(nonce, parent_slot, parent_key, serial);
    TempKey {
        value: Sha256::digest(input.as_bytes()),
    }
}

/// Mirror of the chip's TempKey register across one command sequence.
///
/// A loaded nonce is consumed by the derivation it feeds and the derived key
/// by the command it authorizes.
#[derive(Debug, Default)]
pub struct SessionState {
    nonce: Option<Nonce>,
    tempkey: Option<TempKey>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a nonce sent to the chip. Any derived key is stale from now on.
    pub fn load_nonce(&mut self, nonce: Nonce) {
        self.tempkey = None;
        self.nonce = Some(nonce);
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }

    /// Mirror a GenDig over `parent_slot`.
    pub fn gendig(
        &mut self,
        parent_slot: Slot,
        parent_key: &ParentKey,
        serial: &SerialFragment,
    ) -> Result<&TempKey, Error> {
        let nonce = self.nonce.take().ok_or(Error::from(ErrorKind::NoNonce))?;
        let tempkey = derive_tempkey(&nonce, parent_slot, parent_key, serial);
        Ok(self.tempkey.insert(tempkey))
    }

    pub fn take_tempkey(&mut self) -> Result<TempKey, Error> {
        self.tempkey
            .take()
            .ok_or_else(|| ErrorKind::NoTempKey.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn slot(index: u8) -> Slot {
        Slot::new(index).unwrap()
    }

    #[test]
    fn record_layout() {
        let nonce = Nonce::new([0x77; 32]);
        let input = GenDigInput::new(&nonce, slot(3), &ParentKey::SlotFill, &SerialFragment::default());
        let bytes = input.as_bytes();
        assert_eq!(bytes.len(), 96);
        assert_eq!(bytes[GenDigInput::KEY..GenDigInput::OPCODE], [0x03; 32]);
        assert_eq!(bytes[GenDigInput::OPCODE], 0x15);
        assert_eq!(bytes[GenDigInput::PARAM1], 0x02);
        assert_eq!(bytes[GenDigInput::PARAM2..GenDigInput::SN8], [0x03, 0x00]);
        assert_eq!(bytes[GenDigInput::SN8], 0xEE);
        assert_eq!(bytes[GenDigInput::SN01..GenDigInput::PADDING], [0x01, 0x23]);
        assert_eq!(bytes[GenDigInput::PADDING..GenDigInput::TEMPKEY], [0x00; 25]);
        assert_eq!(bytes[GenDigInput::TEMPKEY..], [0x77; 32]);
    }

    #[test]
    fn zero_nonce_slot_zero() {
        let nonce = Nonce::new([0x00; 32]);
        let tempkey = derive_tempkey(&nonce, slot(0), &ParentKey::SlotFill, &SerialFragment::default());
        assert_eq!(
            tempkey.as_ref(),
            hex!("e75d165781d010f45a4c7fd63c90f0db3634d4bcb33a032557fb9aeb5678d7c8")
        );
    }

    #[test]
    fn counting_nonce_slot_three() {
        let mut bytes = [0x00; 32];
        bytes.iter_mut().enumerate().for_each(|(i, v)| *v = i as u8);
        let nonce = Nonce::new(bytes);
        let serial = SerialFragment::default();
        let first = derive_tempkey(&nonce, slot(3), &ParentKey::SlotFill, &serial);
        let second = derive_tempkey(&nonce, slot(3), &ParentKey::SlotFill, &serial);
        assert_eq!(first, second);
        assert_eq!(
            first.as_ref(),
            hex!("92bc7269a4077ba0e9d1a5f32fefe5aadfd69ee26059fa066fc62ba085ab0511")
        );
        // A provisioned key equal to the fill pattern derives the same key.
        let provisioned = derive_tempkey(&nonce, slot(3), &ParentKey::Provisioned([0x03; 32]), &serial);
        assert_eq!(first, provisioned);
    }

    #[test]
    fn session_consumes_nonce() {
        let mut session = SessionState::new();
        let parent = ParentKey::default();
        let serial = SerialFragment::default();
        assert_eq!(
            session.gendig(slot(0), &parent, &serial).unwrap_err().kind(),
            Some(ErrorKind::NoNonce)
        );

        session.load_nonce(Nonce::new([0x00; 32]));
        session.gendig(slot(0), &parent, &serial).unwrap();
        assert!(session.nonce().is_none());
        assert!(session.take_tempkey().is_ok());
        assert_eq!(
            session.take_tempkey().unwrap_err().kind(),
            Some(ErrorKind::NoTempKey)
        );
    }

    #[test]
    fn parent_key_from_hex() {
        let key: ParentKey = "04".repeat(32).parse().unwrap();
        assert_eq!(key, ParentKey::Provisioned([0x04; 32]));
        let key: ParentKey = "A5".repeat(32).parse().unwrap();
        assert_eq!(key, ParentKey::Provisioned([0xa5; 32]));

        // Sign prefixes, non-hex digits and wrong lengths are all refused.
        for bad in ["+f".repeat(32), "-1".repeat(32), "zz".repeat(32), "04".repeat(31), "04".repeat(33)] {
            assert_eq!(
                bad.parse::<ParentKey>().unwrap_err().kind(),
                Some(ErrorKind::KeyDecode),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn key_material_is_not_printed() {
        let parent = ParentKey::Provisioned([0xab; 32]);
        assert_eq!(format!("{:?}", parent), "Provisioned(..)");
        assert_eq!(format!("{:?}", ParentKey::SlotFill), "SlotFill");

        let nonce = Nonce::new([0x00; 32]);
        let tempkey = derive_tempkey(&nonce, slot(0), &parent, &SerialFragment::default());
        assert_eq!(format!("{:?}", tempkey), "TempKey(..)");
    }
}
