//! Encrypted PrivWrite: a private key is sent XORed with the session key and
//! authenticated by a MAC over the plaintext.

use crate::command::{Block, Digest, Nonce, OpCode, PrivWrite};
use crate::device::Device;
use crate::error::{Error, ErrorKind};
use crate::memory::{ConfigZone, Slot, Zone};
use crate::tempkey::{ParentKey, SerialFragment, SessionState, TempKey};
use log::{debug, info};
use sha2::{Digest as _, Sha256};

/// Length of the private key as the chip stores it: 4 zero bytes and the
/// 32 byte scalar.
pub const PADDED_KEY_LEN: usize = 36;

/// Payload of an authenticated PrivWrite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedKey {
    pub ciphertext: [u8; PADDED_KEY_LEN],
    pub mac: Digest,
}

/// SHA-256 input of the PrivWrite authorizing MAC.
pub struct MacInput {
    bytes: [u8; Self::LEN],
}

impl MacInput {
    pub const LEN: usize = 96;
    pub const TEMPKEY: usize = 0;
    pub const OPCODE: usize = 32;
    pub const PARAM1: usize = 33;
    pub const PARAM2: usize = 34;
    pub const SN8: usize = 36;
    pub const SN01: usize = 37;
    /// 21 zero bytes
    pub const PADDING: usize = 39;
    pub const PADDED_KEY: usize = 60;

    /// The MAC covers the padded plaintext, never the ciphertext.
    pub fn new(
        tempkey: &TempKey,
        target: Slot,
        padded_key: &[u8; PADDED_KEY_LEN],
        serial: &SerialFragment,
    ) -> Self {
        let mut bytes = [0x00; Self::LEN];
        bytes[Self::TEMPKEY..Self::OPCODE].copy_from_slice(tempkey.as_ref());
        bytes[Self::OPCODE] = OpCode::PrivWrite as u8;
        bytes[Self::PARAM1] = PrivWrite::MODE_ENCRYPT;
        bytes[Self::PARAM2] = target.index();
        bytes[Self::PARAM2 + 1] = 0x00;
        bytes[Self::SN8] = serial.sn8;
        bytes[Self::SN01..Self::PADDING].copy_from_slice(&serial.sn01);
        bytes[Self::PADDED_KEY..].copy_from_slice(padded_key);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.bytes
    }
}

/// A slot accepts PrivWrite only if it is secret, allows PrivWrite and holds
/// a private key.
pub fn check_policy(config: &ConfigZone, target: Slot) -> Result<(), Error> {
    if !config.variant().has_ecc() {
        return Err(ErrorKind::Unsupported.into());
    }
    if !config.is_secret(target) {
        return Err(ErrorKind::NotSecret.into());
    }
    if !config.privwrite_allowed(target) {
        return Err(ErrorKind::PrivWriteForbidden.into());
    }
    if !config.is_private(target) {
        return Err(ErrorKind::NotPrivateKey.into());
    }
    Ok(())
}

/// Slot whose key authorizes writes to `target` (SlotConfig.WriteKey).
pub fn parent_slot(config: &ConfigZone, target: Slot) -> Result<Slot, Error> {
    Slot::new(config.slot_config(target).write_key())
}

/// Pad the key to 36 bytes.
pub fn pad_key(private_key: &Block) -> [u8; PADDED_KEY_LEN] {
    let mut padded = [0x00; PADDED_KEY_LEN];
    padded[4..].copy_from_slice(private_key.as_ref());
    padded
}

/// Encrypt and authenticate `private_key` for `target` under `tempkey`.
///
/// The first 32 bytes are XORed with TempKey, the last 4 with the head of
/// SHA-256(TempKey).
pub fn build_privwrite(
    tempkey: &TempKey,
    private_key: &Block,
    target: Slot,
    serial: &SerialFragment,
) -> EncryptedKey {
    let padded = pad_key(private_key);
    let keystream = Sha256::digest(tempkey.as_ref());

    let mut ciphertext = [0x00; PADDED_KEY_LEN];
    ciphertext
        .iter_mut()
        .zip(padded.iter())
        .zip(tempkey.as_ref().iter().chain(keystream.iter()))
        .for_each(|((c, p), k)| *c = p ^ k);

    let mac_input = MacInput::new(tempkey, target, &padded, serial);
    let mac = Digest {
        value: Sha256::digest(mac_input.as_bytes()),
    };
    EncryptedKey { ciphertext, mac }
}

/// Policy check followed by [`build_privwrite`]. Nothing is built for a slot
/// that cannot take the key.
pub fn build_checked(
    config: &ConfigZone,
    tempkey: &TempKey,
    private_key: &Block,
    target: Slot,
    serial: &SerialFragment,
) -> Result<EncryptedKey, Error> {
    check_policy(config, target)?;
    Ok(build_privwrite(tempkey, private_key, target, serial))
}

/// Write `private_key` into `target` over an authenticated session.
///
/// `config` must be the device's current config zone. The sequence is
/// Nonce(passthrough) -> GenDig(parent) -> PrivWrite(encrypted). No command is
/// issued when the target slot's policy forbids the write.
pub fn write_private_key<D: Device>(
    device: &mut D,
    config: &ConfigZone,
    target: Slot,
    private_key: &Block,
    nonce: Nonce,
    parent_key: &ParentKey,
    serial: &SerialFragment,
) -> Result<(), Error> {
    check_policy(config, target)?;
    let parent = parent_slot(config, target)?;
    debug!("privwrite: slot {} authorized by slot {}", target.index(), parent.index());

    let mut session = SessionState::new();
    device.nonce(&nonce)?;
    session.load_nonce(nonce);
    device.gendig(Zone::Data, parent)?;
    session.gendig(parent, parent_key, serial)?;

    let tempkey = session.take_tempkey()?;
    let encrypted = build_privwrite(&tempkey, private_key, target, serial);
    device.privwrite_encrypted(target, &encrypted)?;
    info!("private key written to slot {}", target.index());
    Ok(())
}
