//! Validation challenge: mark the public key in a slot valid or invalid.
//!
//! Both rounds run Nonce(passthrough) -> GenKey(digest) over the public key
//! slot with the same nonce. The first round is signed internally by the
//! authorizing private key, the second feeds Verify(validate|invalidate)
//! together with an [`OtherData`] record describing the public slot.

use crate::command::{Nonce, Verify};
use crate::device::Device;
use crate::error::{Error, ErrorKind};
use crate::memory::{ConfigZone, Slot};
use core::str::FromStr;
use log::{debug, info};
use p256::ecdsa::Signature;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Validate,
    Invalidate,
}

impl Action {
    /// Mode byte of the OtherData record.
    pub fn other_data_mode(&self) -> u8 {
        match self {
            Self::Validate => 0x00,
            Self::Invalidate => 0x01,
        }
    }

    /// Mode byte of the Verify command.
    pub fn verify_mode(&self) -> u8 {
        match self {
            Self::Validate => Verify::MODE_VALIDATE,
            Self::Invalidate => Verify::MODE_INVALIDATE,
        }
    }

    /// Sign sets its invalidate bit when the signature authorizes an
    /// invalidation.
    pub fn invalidate(&self) -> bool {
        matches!(self, Self::Invalidate)
    }

    /// Validity the key currently has, as the chip expects it in OtherData.
    fn current_validity(&self) -> u8 {
        match self {
            Self::Validate => 0x00,
            Self::Invalidate => 0x01,
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validate" => Ok(Self::Validate),
            "invalidate" => Ok(Self::Invalidate),
            _ => Err(ErrorKind::BadParam.into()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Validated,
    Invalidated,
}

/// 19 byte OtherData consumed by Verify(validate|invalidate).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OtherData {
    bytes: [u8; Self::LEN],
}

impl OtherData {
    pub const LEN: usize = 19;
    pub const MODE: usize = 0;
    /// Authorizing private key slot, little endian.
    pub const KEY_ID: usize = 1;
    pub const SLOT_CONFIG: usize = 3;
    pub const KEY_CONFIG: usize = 5;
    pub const TEMPKEY_FLAGS: usize = 7;
    /// 2 zero bytes
    pub const ZEROS: usize = 8;
    /// SN[4:7], zero when not mixed in
    pub const SN4: usize = 10;
    /// SN[2:3], zero when not mixed in
    pub const SN2: usize = 14;
    pub const SLOT_LOCKED: usize = 16;
    pub const PUB_KEY_VALID: usize = 17;
    pub const TRAILING: usize = 18;

    pub fn new(
        action: Action,
        auth_slot: Slot,
        config: &ConfigZone,
        pub_slot: Slot,
        tempkey_flags: u8,
    ) -> Self {
        let mut bytes = [0x00; Self::LEN];
        bytes[Self::MODE] = action.other_data_mode();
        bytes[Self::KEY_ID..Self::SLOT_CONFIG]
            .copy_from_slice(&(auth_slot.index() as u16).to_le_bytes());
        bytes[Self::SLOT_CONFIG..Self::KEY_CONFIG]
            .copy_from_slice(&config.slot_config(pub_slot).to_le_bytes());
        bytes[Self::KEY_CONFIG..Self::TEMPKEY_FLAGS]
            .copy_from_slice(&config.key_config(pub_slot).to_le_bytes());
        bytes[Self::TEMPKEY_FLAGS] = tempkey_flags;
        bytes[Self::SLOT_LOCKED] = config.slot_locked_bit(pub_slot);
        bytes[Self::PUB_KEY_VALID] = action.current_validity();
        Self { bytes }
    }

    pub fn mode(&self) -> u8 {
        self.bytes[Self::MODE]
    }

    pub fn pub_key_valid(&self) -> u8 {
        self.bytes[Self::PUB_KEY_VALID]
    }
}

impl AsRef<[u8]> for OtherData {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// One validation challenge. The nonce is kept so the verify round can
/// replay exactly what the sign round used.
#[derive(Debug)]
pub struct Challenge {
    action: Action,
    pub_slot: Slot,
    auth_slot: Slot,
    nonce: Nonce,
}

impl Challenge {
    /// Fails before any command is issued when `pub_slot` holds a private
    /// key or `auth_slot` does not.
    pub fn new(
        config: &ConfigZone,
        action: Action,
        pub_slot: Slot,
        auth_slot: Slot,
        nonce: Nonce,
    ) -> Result<Self, Error> {
        if !config.variant().has_ecc() {
            return Err(ErrorKind::Unsupported.into());
        }
        if config.is_private(pub_slot) {
            return Err(ErrorKind::NotPublicKey.into());
        }
        if !config.is_private(auth_slot) {
            return Err(ErrorKind::NotPrivateKey.into());
        }
        Ok(Self {
            action,
            pub_slot,
            auth_slot,
            nonce,
        })
    }

    fn digest_round<D: Device>(&self, device: &mut D) -> Result<(), Error> {
        device.nonce(&self.nonce)?;
        device.pubkey_digest(self.pub_slot)
    }

    /// Round 1: signature over the public key digest.
    pub fn sign<D: Device>(&self, device: &mut D) -> Result<Signature, Error> {
        self.digest_round(device)?;
        device.sign_internal(self.auth_slot, self.action.invalidate())
    }

    /// Round 2: rebuild the digest and describe the public slot.
    pub fn other_data<D: Device>(
        &self,
        device: &mut D,
        config: &ConfigZone,
    ) -> Result<OtherData, Error> {
        self.digest_round(device)?;
        let state = device.state()?;
        Ok(OtherData::new(
            self.action,
            self.auth_slot,
            config,
            self.pub_slot,
            state.as_ref()[0],
        ))
    }

    pub fn run<D: Device>(self, device: &mut D, config: &ConfigZone) -> Result<Outcome, Error> {
        let signature = self.sign(device)?;
        debug!("verify: signed by slot {}", self.auth_slot.index());
        let other_data = self.other_data(device, config)?;
        device.verify(self.action, self.pub_slot, &signature, &other_data)?;

        let outcome = match self.action {
            Action::Validate => Outcome::Validated,
            Action::Invalidate => Outcome::Invalidated,
        };
        info!("public key in slot {}: {:?}", self.pub_slot.index(), outcome);
        Ok(outcome)
    }
}

/// Validate or invalidate the public key in `pub_slot` on the authority of
/// the private key in `auth_slot`.
pub fn validate_public_key<D: Device>(
    device: &mut D,
    config: &ConfigZone,
    action: Action,
    pub_slot: Slot,
    auth_slot: Slot,
    nonce: Nonce,
) -> Result<Outcome, Error> {
    Challenge::new(config, action, pub_slot, auth_slot, nonce)?.run(device, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Word;
    use crate::device::mock::{Call, MockDevice};
    use crate::error::{ErrorClass, Status, Step};
    use crate::memory::{KeyConfig, SlotConfig, Variant};

    fn slot(index: u8) -> Slot {
        Slot::new(index).unwrap()
    }

    // Slot 0 holds the authorizing private key, slot 10 a public key that
    // requires validation. Slot 10 is not locked.
    fn challenge_config() -> ConfigZone {
        let mut config = ConfigZone::new(Variant::Atecc508a);
        let private = KeyConfig::new().with_private(true).with_key_type(4);
        let public = KeyConfig::new()
            .with_key_type(4)
            .with_pub_info(true)
            .with_req_auth(true);
        let pub_slot_config = SlotConfig::new().with_read_key(0).with_write_key(10);
        let bytes = config.as_mut();
        bytes[ConfigZone::KEY_CONFIG_INDEX..ConfigZone::KEY_CONFIG_INDEX + 2]
            .copy_from_slice(&private.to_le_bytes());
        bytes[ConfigZone::KEY_CONFIG_INDEX + 20..ConfigZone::KEY_CONFIG_INDEX + 22]
            .copy_from_slice(&public.to_le_bytes());
        bytes[ConfigZone::SLOT_CONFIG_INDEX + 20..ConfigZone::SLOT_CONFIG_INDEX + 22]
            .copy_from_slice(&pub_slot_config.to_le_bytes());
        bytes[ConfigZone::SLOT_LOCKED_INDEX..ConfigZone::SLOT_LOCKED_INDEX + 2]
            .copy_from_slice(&[0xff, 0xff]);
        config
    }

    #[test]
    fn other_data_layout() {
        let config = challenge_config();
        let other_data = OtherData::new(Action::Invalidate, slot(0), &config, slot(10), 0x8a);
        let bytes = other_data.as_ref();
        assert_eq!(bytes.len(), 19);
        assert_eq!(bytes[OtherData::MODE], 0x01);
        assert_eq!(bytes[OtherData::KEY_ID..OtherData::SLOT_CONFIG], [0x00, 0x00]);
        assert_eq!(bytes[OtherData::SLOT_CONFIG..OtherData::KEY_CONFIG], [0x00, 0x0a]);
        assert_eq!(bytes[OtherData::KEY_CONFIG..OtherData::TEMPKEY_FLAGS], [0x92, 0x00]);
        assert_eq!(bytes[OtherData::TEMPKEY_FLAGS], 0x8a);
        assert_eq!(bytes[OtherData::ZEROS..OtherData::SN4], [0x00; 2]);
        assert_eq!(bytes[OtherData::SN4..OtherData::SLOT_LOCKED], [0x00; 6]);
        assert_eq!(bytes[OtherData::SLOT_LOCKED], 0x01);
        assert_eq!(bytes[OtherData::PUB_KEY_VALID], 0x01);
        assert_eq!(bytes[OtherData::TRAILING], 0x00);
    }

    #[test]
    fn validate_replays_nonce() {
        let config = challenge_config();
        let mut device = MockDevice::new(Variant::Atecc508a);
        device.state = Word::try_from(&[0x9cu8, 0x00, 0x00, 0x00][..]).unwrap();
        let nonce = Nonce::new([0x31; 32]);
        let outcome = validate_public_key(
            &mut device,
            &config,
            Action::Validate,
            slot(10),
            slot(0),
            nonce.clone(),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Validated);

        let expected = OtherData::new(Action::Validate, slot(0), &config, slot(10), 0x9c);
        assert_eq!(expected.mode(), 0x00);
        assert_eq!(expected.pub_key_valid(), 0x00);
        assert_eq!(
            device.calls,
            vec![
                Call::Nonce(nonce.clone()),
                Call::GenKey(slot(10)),
                Call::Sign(slot(0), false),
                Call::Nonce(nonce),
                Call::GenKey(slot(10)),
                Call::State,
                Call::Verify(Action::Validate, slot(10), device.signature, expected),
            ]
        );
    }

    #[test]
    fn invalidate_marks_key_valid() {
        let config = challenge_config();
        let mut device = MockDevice::new(Variant::Atecc508a);
        let outcome = validate_public_key(
            &mut device,
            &config,
            Action::Invalidate,
            slot(10),
            slot(0),
            Nonce::new([0x00; 32]),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Invalidated);
        assert!(device.calls.contains(&Call::Sign(slot(0), true)));
        match device.calls.last() {
            Some(Call::Verify(Action::Invalidate, _, _, other_data)) => {
                assert_eq!(other_data.mode(), 0x01);
                assert_eq!(other_data.pub_key_valid(), 0x01);
            }
            call => panic!("unexpected last call {:?}", call),
        }
    }

    #[test]
    fn preconditions_issue_nothing() {
        let config = challenge_config();
        let mut device = MockDevice::new(Variant::Atecc508a);

        // Private key where a public one is expected.
        let error = validate_public_key(
            &mut device,
            &config,
            Action::Validate,
            slot(0),
            slot(0),
            Nonce::new([0x00; 32]),
        )
        .unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::NotPublicKey));

        // Public key where the authorizing private key is expected.
        let error = validate_public_key(
            &mut device,
            &config,
            Action::Validate,
            slot(10),
            slot(11),
            Nonce::new([0x00; 32]),
        )
        .unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::NotPrivateKey));
        assert_eq!(error.class(), ErrorClass::Precondition);
        assert!(device.calls.is_empty());
    }

    #[test]
    fn verify_failure_is_reported() {
        let config = challenge_config();
        let mut device = MockDevice::new(Variant::Atecc508a);
        device.fail_at(Step::Verify, Status::CheckmacVerifyFailed);
        let error = validate_public_key(
            &mut device,
            &config,
            Action::Validate,
            slot(10),
            slot(0),
            Nonce::new([0x00; 32]),
        )
        .unwrap_err();
        assert_eq!(error.step(), Some(Step::Verify));
        assert_eq!(error.status(), Some(Status::CheckmacVerifyFailed));
    }

    #[test]
    fn action_keywords() {
        assert_eq!("validate".parse::<Action>().unwrap(), Action::Validate);
        assert_eq!("invalidate".parse::<Action>().unwrap(), Action::Invalidate);
        assert!("revoke".parse::<Action>().is_err());
        assert_eq!(Action::Invalidate.verify_mode(), 0x07);
    }
}
