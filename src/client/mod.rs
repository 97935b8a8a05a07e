//! Client module for ATECC508A / ATSHA204A communication.
//!
//! The [`AtCaClient`] owns the I2C datalink and implements
//! [`Device`](crate::device::Device), the command surface the provisioning
//! flows run on.
//!
//! ## Sub-modules
//!
//! - [`Memory`]: config, data and OTP access and zone locking via [`AtCaClient::memory`]
//! - [`Random`]: the chip RNG as a `rand_core::RngCore` via [`AtCaClient::random`]

mod memory;
mod random;

pub use memory::Memory;
pub use random::Random;

use crate::command::{self, Block, Nonce, Word};
use crate::datalink::{I2c, I2cConfig};
use crate::device::{Device, LockStatus};
use crate::error::{Error, ErrorKind, Step};
use crate::memory::{ConfigZone, Slot, Variant, Zone};
use crate::packet::{Packet, PacketBuilder, Response};
use crate::privwrite::EncryptedKey;
use crate::verify::{Action, OtherData};
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use p256::ecdsa::Signature;

pub struct AtCaClient<PHY, D> {
    i2c: I2c<PHY, D>,
    buffer: Vec<u8, 192>,
    variant: Variant,
}

impl<PHY, D> AtCaClient<PHY, D> {
    /// Create a new client with default I2C configuration
    pub fn new(phy: PHY, delay: D, variant: Variant) -> Self {
        Self::with_config(phy, delay, variant, I2cConfig::default())
    }

    /// Create a new client with custom I2C configuration
    pub fn with_config(phy: PHY, delay: D, variant: Variant, config: I2cConfig) -> Self {
        let i2c = I2c::with_config(phy, delay, config);
        let buffer = Vec::new();

        Self {
            i2c,
            buffer,
            variant,
        }
    }

    /// Give the bus and the delay back.
    pub fn release(self) -> (PHY, D) {
        self.i2c.release()
    }

    pub fn memory(&mut self) -> Memory<'_, PHY, D> {
        Memory { atca: self }
    }

    pub fn random(&mut self) -> Random<'_, PHY, D> {
        Random::new(self)
    }

    pub(crate) fn packet_builder(&mut self) -> PacketBuilder<'_> {
        let capacity = self.buffer.capacity();
        self.buffer.clear();
        self.buffer
            .resize(capacity, 0x00u8)
            .unwrap_or_else(|()| unreachable!("Input length equals to the current capacity."));
        PacketBuilder::new(&mut self.buffer)
    }
}

impl<PHY, D> AtCaClient<PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
    /// Commands the variant lacks are refused without touching the bus.
    pub(crate) fn execute(&mut self, packet: Packet) -> Result<Response<'_>, Error> {
        let exec_time = self
            .variant
            .execution_time(packet.opcode())
            .ok_or(Error::from(ErrorKind::Unsupported))?;
        self.i2c.execute(&mut self.buffer, packet, Some(exec_time))
    }

    pub fn sleep(&mut self) -> Result<(), Error> {
        self.i2c.sleep()
    }

    /// Device revision (Info mode 0).
    pub fn info(&mut self) -> Result<Word, Error> {
        let packet = command::Info::new(self.packet_builder()).revision()?;
        self.execute(packet)
            .and_then(|resp| Word::try_from(resp.as_ref()))
            .map_err(|e| e.at(Step::Revision))
    }
}

impl<PHY, D> Device for AtCaClient<PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
    fn variant(&self) -> Variant {
        self.variant
    }

    fn nonce(&mut self, nonce: &Nonce) -> Result<(), Error> {
        let packet = command::NonceCtx::new(self.packet_builder()).passthrough(nonce)?;
        self.execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::Nonce))
    }

    fn gendig(&mut self, zone: Zone, slot: Slot) -> Result<(), Error> {
        let packet = command::GenDig::new(self.packet_builder()).gendig(zone, slot)?;
        self.execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::GenDig))
    }

    fn pubkey_digest(&mut self, slot: Slot) -> Result<(), Error> {
        let packet = command::GenKey::new(self.packet_builder()).pubkey_digest(slot)?;
        self.execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::GenKey))
    }

    fn sign_internal(&mut self, slot: Slot, invalidate: bool) -> Result<Signature, Error> {
        let packet = command::Sign::new(self.packet_builder()).internal(slot, invalidate)?;
        self.execute(packet)
            .and_then(|resp| {
                Signature::from_slice(resp.as_ref()).map_err(|_| ErrorKind::RxFail.into())
            })
            .map_err(|e| e.at(Step::Sign))
    }

    fn state(&mut self) -> Result<Word, Error> {
        let packet = command::Info::new(self.packet_builder()).state()?;
        self.execute(packet)
            .and_then(|resp| Word::try_from(resp.as_ref()))
            .map_err(|e| e.at(Step::State))
    }

    fn verify(
        &mut self,
        action: Action,
        pub_slot: Slot,
        signature: &Signature,
        other_data: &OtherData,
    ) -> Result<(), Error> {
        let packet = command::Verify::new(self.packet_builder()).key(
            action.verify_mode(),
            pub_slot,
            signature,
            other_data.as_ref(),
        )?;
        self.execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::Verify))
    }

    fn privwrite_encrypted(&mut self, slot: Slot, key: &EncryptedKey) -> Result<(), Error> {
        let packet = command::PrivWrite::new(self.packet_builder()).encrypted(
            slot,
            &key.ciphertext,
            &key.mac,
        )?;
        self.execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::PrivWrite))
    }

    fn privwrite_plain(&mut self, slot: Slot, private_key: &Block) -> Result<(), Error> {
        let packet = command::PrivWrite::new(self.packet_builder()).plain(slot, private_key)?;
        self.execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::PrivWrite))
    }

    fn read_config(&mut self) -> Result<ConfigZone, Error> {
        self.memory().read_config()
    }

    fn write_config_word(&mut self, word: u8, data: &Word) -> Result<(), Error> {
        self.memory().write_config_word(word, data)
    }

    fn write_data_block(&mut self, slot: Slot, block: u8, data: &Block) -> Result<(), Error> {
        self.memory().write_slot_block(slot, block, data)
    }

    fn write_otp_block(&mut self, block: u8, data: &Block) -> Result<(), Error> {
        self.memory().write_otp_block(block, data)
    }

    fn lock(&mut self, zone: Zone, crc: u16) -> Result<(), Error> {
        self.memory().lock(zone, crc)
    }

    fn lock_status(&mut self) -> Result<LockStatus, Error> {
        self.memory().lock_status()
    }

    fn idle(&mut self) -> Result<(), Error> {
        self.i2c.idle().map_err(|e| e.at(Step::Idle))
    }

    fn wake(&mut self) -> Result<(), Error> {
        self.i2c.wake().map_err(|e| e.at(Step::Wake))
    }
}
