//! Memory and configuration operations

use crate::command::{self, Block, Lock, Serial, Word};
use crate::device::LockStatus;
use crate::error::{Error, ErrorKind, Status, Step};
use crate::memory::{ConfigZone, OtpMode, Size, Slot, Zone};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use super::AtCaClient;

/// Number of config words in a 32 byte block.
const WORDS_PER_BLOCK: u8 = 8;

pub struct Memory<'a, PHY, D> {
    pub(crate) atca: &'a mut AtCaClient<PHY, D>,
}

impl<'a, PHY, D> Memory<'a, PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
    pub fn serial_number(&mut self) -> Result<Serial, Error> {
        // Words 0..4 cover the 13 bytes holding the serial on both variants.
        let mut head = [0x00; 16];
        for (word, chunk) in head.chunks_mut(Size::Word.len()).enumerate() {
            let data = self.read_word(word as u8).map_err(|e| e.at(Step::Serial))?;
            chunk.copy_from_slice(data.as_ref());
        }
        Serial::from_config(&head)
    }

    pub fn otp_mode(&mut self) -> Result<OtpMode, Error> {
        let (block, offset, pos) = Zone::locate_index(ConfigZone::OTP_MODE_INDEX);
        let word = self
            .read(Size::Word, block, offset)
            .and_then(|bytes| Word::try_from(bytes.as_slice()))
            .map_err(|e| e.at(Step::ReadConfig))?;
        Ok(OtpMode::from(word.as_ref()[pos as usize]))
    }

    pub fn lock_status(&mut self) -> Result<LockStatus, Error> {
        let (block, offset, _) = Zone::locate_index(ConfigZone::LOCK_VALUE_INDEX);
        let word = self
            .read(Size::Word, block, offset)
            .and_then(|bytes| Word::try_from(bytes.as_slice()))
            .map_err(|e| e.at(Step::LockStatus))?;
        // LockValue and LockConfig are the last two bytes of the word.
        Ok(LockStatus {
            data: word.as_ref()[2] != ConfigZone::UNLOCKED,
            config: word.as_ref()[3] != ConfigZone::UNLOCKED,
        })
    }

    /// Read the whole config zone. Any failed read aborts.
    pub fn read_config(&mut self) -> Result<ConfigZone, Error> {
        let variant = self.atca.variant;
        let mut config = ConfigZone::new(variant);
        let size = variant.config_read_size();
        for (i, chunk) in config.as_mut().chunks_mut(size.len()).enumerate() {
            let bytes = self
                .read_config_chunk(size, i as u8)
                .map_err(|e| e.at(Step::ReadConfig))?;
            chunk.copy_from_slice(&bytes);
        }
        Ok(config)
    }

    /// Read the whole config zone, skipping unreadable blocks or words. Also
    /// returns how many reads failed.
    pub fn dump_config(&mut self) -> (ConfigZone, usize) {
        let variant = self.atca.variant;
        let mut config = ConfigZone::new(variant);
        let size = variant.config_read_size();
        let mut failures = 0;
        for (i, chunk) in config.as_mut().chunks_mut(size.len()).enumerate() {
            match self.read_config_chunk(size, i as u8) {
                Ok(bytes) => chunk.copy_from_slice(&bytes),
                Err(e) => {
                    warn!("failed to read config {:?} {}: {}", size, i, e);
                    failures += 1;
                }
            }
        }
        (config, failures)
    }

    pub fn write_config_word(&mut self, word: u8, data: &Word) -> Result<(), Error> {
        let packet = command::Write::new(self.atca.packet_builder()).write(
            Zone::Config,
            Size::Word,
            word / WORDS_PER_BLOCK,
            word % WORDS_PER_BLOCK,
            data,
        )?;
        self.atca
            .execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::WriteConfig))
    }

    pub fn write_slot_block(&mut self, slot: Slot, block: u8, data: &Block) -> Result<(), Error> {
        let variant = self.atca.variant;
        let packet = command::Write::new(self.atca.packet_builder()).slot(variant, slot, block, data)?;
        debug!("write slot {} block {}", slot.index(), block);
        self.atca
            .execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::WriteData))
    }

    pub fn write_otp_block(&mut self, block: u8, data: &Block) -> Result<(), Error> {
        let packet = command::Write::new(self.atca.packet_builder()).write(
            Zone::Otp,
            Size::Block,
            block,
            0,
            data,
        )?;
        self.atca
            .execute(packet)
            .map(drop)
            .map_err(|e| e.at(Step::WriteOtp))
    }

    /// Lock `zone` under `crc`. Not retried: a lock is permanent once applied.
    pub fn lock(&mut self, zone: Zone, crc: u16) -> Result<(), Error> {
        let step = match zone {
            Zone::Config => Step::LockConfig,
            Zone::Data | Zone::Otp => Step::LockData,
        };
        let packet = Lock::new(self.atca.packet_builder()).zone(zone, crc)?;
        self.atca
            .execute(packet)
            .map(drop)
            .map_err(|e| e.at(step))
    }

    fn read_word(&mut self, word: u8) -> Result<Word, Error> {
        let bytes = self.read(Size::Word, word / WORDS_PER_BLOCK, word % WORDS_PER_BLOCK)?;
        Word::try_from(bytes.as_slice())
    }

    fn read_config_chunk(
        &mut self,
        size: Size,
        index: u8,
    ) -> Result<heapless::Vec<u8, { Size::Block.len() }>, Error> {
        match size {
            Size::Block => self.read(size, index, 0),
            Size::Word => self.read(size, index / WORDS_PER_BLOCK, index % WORDS_PER_BLOCK),
        }
    }

    fn read(
        &mut self,
        size: Size,
        block: u8,
        offset: u8,
    ) -> Result<heapless::Vec<u8, { Size::Block.len() }>, Error> {
        let packet =
            command::Read::new(self.atca.packet_builder()).read(Zone::Config, size, block, offset)?;
        let response = self.atca.execute(packet)?;
        if response.as_ref().len() != size.len() {
            // A one byte status in place of the data.
            return match response.as_ref().first().copied().and_then(Status::from_u8) {
                Some(status) => Err(status.into()),
                None => Err(ErrorKind::RxFail.into()),
            };
        }
        heapless::Vec::from_slice(response.as_ref()).map_err(|_| ErrorKind::SmallBuffer.into())
    }
}
