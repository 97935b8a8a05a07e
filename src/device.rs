//! The command surface the provisioning flows are written against.
//!
//! [`AtCaClient`](crate::client::AtCaClient) implements it over I2C. Every
//! method issues exactly one chip command (or one bus action for
//! [`Device::idle`] and [`Device::wake`]) and tags a failure with the
//! [`Step`](crate::error::Step) it belongs to.

use crate::command::{Block, Nonce, Word};
use crate::error::Error;
use crate::memory::{ConfigZone, Slot, Variant, Zone};
use crate::privwrite::EncryptedKey;
use crate::verify::{Action, OtherData};
use p256::ecdsa::Signature;

/// Lock state of the two lockable zone groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockStatus {
    pub config: bool,
    /// Data and OTP are locked together.
    pub data: bool,
}

pub trait Device {
    fn variant(&self) -> Variant;

    /// Load TempKey with `nonce` in passthrough mode.
    fn nonce(&mut self, nonce: &Nonce) -> Result<(), Error>;

    /// Fold the contents of `slot` in `zone` into TempKey.
    fn gendig(&mut self, zone: Zone, slot: Slot) -> Result<(), Error>;

    /// Fold a digest of the public key held in `slot` into TempKey.
    fn pubkey_digest(&mut self, slot: Slot) -> Result<(), Error>;

    /// Sign TempKey with the private key in `slot`.
    fn sign_internal(&mut self, slot: Slot, invalidate: bool) -> Result<Signature, Error>;

    /// Info(State): the first byte carries the TempKey flags.
    fn state(&mut self) -> Result<Word, Error>;

    fn verify(
        &mut self,
        action: Action,
        pub_slot: Slot,
        signature: &Signature,
        other_data: &OtherData,
    ) -> Result<(), Error>;

    fn privwrite_encrypted(&mut self, slot: Slot, key: &EncryptedKey) -> Result<(), Error>;

    /// Unauthenticated PrivWrite, accepted while the data zone is unlocked.
    fn privwrite_plain(&mut self, slot: Slot, private_key: &Block) -> Result<(), Error>;

    /// Read the whole config zone. Any failed read aborts.
    fn read_config(&mut self) -> Result<ConfigZone, Error>;

    fn write_config_word(&mut self, word: u8, data: &Word) -> Result<(), Error>;

    fn write_data_block(&mut self, slot: Slot, block: u8, data: &Block) -> Result<(), Error>;

    fn write_otp_block(&mut self, block: u8, data: &Block) -> Result<(), Error>;

    /// Lock `zone` under `crc`. Data and OTP share one lock.
    fn lock(&mut self, zone: Zone, crc: u16) -> Result<(), Error>;

    fn lock_status(&mut self) -> Result<LockStatus, Error>;

    fn idle(&mut self) -> Result<(), Error>;

    /// Poll the device awake with a bounded number of attempts.
    fn wake(&mut self) -> Result<(), Error>;
}
