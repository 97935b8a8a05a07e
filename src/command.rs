// Command definitions
// Overall structure is modeled after https://github.com/tokio-rs/mini-redis/blob/master/src/cmd/mod.rs
use super::error::{Error, ErrorKind};
use super::memory::{ConfigZone, Size, Slot, Variant, Zone};
use super::packet::{Packet, PacketBuilder};
use generic_array::typenum::{U32, U4, U9};
use generic_array::GenericArray;
use signature::rand_core::{CryptoRng, RngCore};

// Encapsulates raw 4 bytes. When it is a return value of `info`, it contains
// the device's revision number or its state bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Word {
    value: GenericArray<u8, U4>,
}

impl TryFrom<&[u8]> for Word {
    type Error = Error;
    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        if buffer.len() != Size::Word.len() {
            return Err(ErrorKind::BadParam.into());
        }

        let mut value = Self::default();
        value.as_mut().copy_from_slice(buffer);
        Ok(value)
    }
}

impl AsRef<[u8]> for Word {
    fn as_ref(&self) -> &[u8] {
        self.value.as_ref()
    }
}

impl AsMut<[u8]> for Word {
    fn as_mut(&mut self) -> &mut [u8] {
        self.value.as_mut()
    }
}

// Encapsulates raw 32 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Block {
    value: GenericArray<u8, U32>,
}

impl Block {
    pub fn from_array(bytes: [u8; 32]) -> Self {
        Self {
            value: bytes.into(),
        }
    }
}

impl TryFrom<&[u8]> for Block {
    type Error = Error;
    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        if buffer.len() != Size::Block.len() {
            return Err(ErrorKind::BadParam.into());
        }

        let mut value = Self::default();
        value.as_mut().copy_from_slice(buffer);
        Ok(value)
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        self.value.as_ref()
    }
}

impl AsMut<[u8]> for Block {
    fn as_mut(&mut self) -> &mut [u8] {
        self.value.as_mut()
    }
}

// Represents a serial number consisting of 9 bytes. Its uniqueness is
// guaranteed. Taken from config bytes 0..4 and 8..13.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Serial {
    value: GenericArray<u8, U9>,
}

impl Serial {
    /// Assemble the serial number from the first config block.
    pub(crate) fn from_config(buffer: &[u8]) -> Result<Self, Error> {
        let (head, tail) = (ConfigZone::SERIAL_HEAD, ConfigZone::SERIAL_TAIL);
        if buffer.len() < tail.end {
            return Err(ErrorKind::BadParam.into());
        }

        let mut value = [0x00; 9];
        value[..head.len()].copy_from_slice(&buffer[head.clone()]);
        value[head.len()..].copy_from_slice(&buffer[tail]);
        Ok(Self {
            value: value.into(),
        })
    }
}

impl AsRef<[u8]> for Serial {
    fn as_ref(&self) -> &[u8] {
        self.value.as_ref()
    }
}

// A digest yielded from cryptographic hash functions. Merely a wrapper around
// `GenericArray<u8, 32>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Digest {
    pub(crate) value: GenericArray<u8, U32>,
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self {
            value: bytes.into(),
        }
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        self.value.as_ref()
    }
}

impl AsMut<[u8]> for Digest {
    fn as_mut(&mut self) -> &mut [u8] {
        self.value.as_mut()
    }
}

/// 32-byte value loaded into TempKey by a passthrough Nonce command.
///
/// Deliberately not `Copy`: a nonce is meant to be used for one derivation
/// (the validation challenge replays it explicitly).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    value: GenericArray<u8, U32>,
}

impl Nonce {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self {
            value: bytes.into(),
        }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0x00; 32];
        rng.fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        self.value.as_ref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpCode {
    /// Info command op-code
    Info = 0x30,
    /// GenDig command op-code
    GenDig = 0x15,
    /// GenKey command op-code
    GenKey = 0x40,
    /// Lock command op-code
    Lock = 0x17,
    /// Nonce command op-code
    Nonce = 0x16,
    /// PrivWrite command op-code
    PrivWrite = 0x46,
    /// Random command op-code
    Random = 0x1B,
    /// Read command op-code
    Read = 0x02,
    /// Sign command op-code
    Sign = 0x41,
    /// Verify command op-code
    Verify = 0x45,
    /// Write command op-code
    Write = 0x12,
}

pub(crate) struct GenDig<'a>(PacketBuilder<'a>);
pub(crate) struct GenKey<'a>(PacketBuilder<'a>);
pub(crate) struct Info<'a>(PacketBuilder<'a>);
pub(crate) struct Lock<'a>(PacketBuilder<'a>);
pub(crate) struct NonceCtx<'a>(PacketBuilder<'a>);
pub(crate) struct PrivWrite<'a>(PacketBuilder<'a>);
pub(crate) struct Random<'a>(PacketBuilder<'a>);
pub(crate) struct Read<'a>(PacketBuilder<'a>);
pub(crate) struct Sign<'a>(PacketBuilder<'a>);
pub(crate) struct Verify<'a>(PacketBuilder<'a>);
pub(crate) struct Write<'a>(PacketBuilder<'a>);

// The GenDig command uses SHA-256 to combine a stored value with the contents
// of TempKey, which must have been valid prior to the execution of this
// command.
impl<'a> GenDig<'a> {
    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn gendig(&mut self, zone: Zone, key_id: Slot) -> Result<Packet, Error> {
        let packet = self
            .0
            .opcode(OpCode::GenDig)
            .mode(zone as u8)
            .param2(key_id.index() as u16)
            .build()?;
        Ok(packet)
    }
}

/// GenKey
impl<'a> GenKey<'a> {
    /// Calculate a digest on the public key stored in KeyId
    const MODE_PUBKEY_DIGEST: u8 = 0x10;
    /// OtherData accompanying a public key digest
    const OTHER_DATA: [u8; 3] = [0x00; 3];

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn pubkey_digest(&mut self, key_id: Slot) -> Result<Packet, Error> {
        let packet = self
            .0
            .opcode(OpCode::GenKey)
            .mode(Self::MODE_PUBKEY_DIGEST)
            .param2(key_id.index() as u16)
            .pdu_data(Self::OTHER_DATA)
            .build()?;
        Ok(packet)
    }
}

impl<'a> Info<'a> {
    const MODE_REVISION: u8 = 0x00;
    const MODE_STATE: u8 = 0x02;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    /// Command execution will return a word containing the revision.
    pub(crate) fn revision(&mut self) -> Result<Packet, Error> {
        let packet = self
            .0
            .opcode(OpCode::Info)
            .mode(Self::MODE_REVISION)
            .build()?;
        Ok(packet)
    }

    /// Command execution will return a word whose first byte carries the
    /// TempKey flags.
    pub(crate) fn state(&mut self) -> Result<Packet, Error> {
        let packet = self
            .0
            .opcode(OpCode::Info)
            .mode(Self::MODE_STATE)
            .build()?;
        Ok(packet)
    }
}

impl<'a> Lock<'a> {
    const MODE_CONFIG: u8 = 0x00;
    const MODE_DATA_OTP: u8 = 0x01;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    /// Data and OTP are locked together, with a checksum over both.
    pub(crate) fn zone(&mut self, zone: Zone, crc: u16) -> Result<Packet, Error> {
        let mode = match zone {
            Zone::Config => Self::MODE_CONFIG,
            Zone::Data | Zone::Otp => Self::MODE_DATA_OTP,
        };
        let packet = self
            .0
            .opcode(OpCode::Lock)
            .mode(mode)
            .param2(crc)
            .build()?;
        Ok(packet)
    }
}

/// Nonce
impl<'a> NonceCtx<'a> {
    /// Nonce mode: pass-through, target TempKey, 32 byte input
    const MODE_PASSTHROUGH: u8 = 0x03;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn passthrough(&mut self, nonce: &Nonce) -> Result<Packet, Error> {
        let packet = self
            .0
            .opcode(OpCode::Nonce)
            .mode(Self::MODE_PASSTHROUGH)
            .pdu_data(nonce)
            .build()?;
        Ok(packet)
    }
}

/// PrivWrite
impl<'a> PrivWrite<'a> {
    /// Input data is encrypted with TempKey and authenticated by a MAC.
    pub(crate) const MODE_ENCRYPT: u8 = 0x40;
    const MODE_PLAIN: u8 = 0x00;
    const KEY_LENGTH: usize = 36;
    const MAC_LENGTH: usize = 32;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn encrypted(
        &mut self,
        key_id: Slot,
        ciphertext: &[u8; 36],
        mac: &Digest,
    ) -> Result<Packet, Error> {
        let pdu = self.0.pdu_buffer();
        pdu[..Self::KEY_LENGTH].copy_from_slice(ciphertext);
        pdu[Self::KEY_LENGTH..Self::KEY_LENGTH + Self::MAC_LENGTH].copy_from_slice(mac.as_ref());
        let packet = self
            .0
            .pdu_length(Self::KEY_LENGTH + Self::MAC_LENGTH)
            .opcode(OpCode::PrivWrite)
            .mode(Self::MODE_ENCRYPT)
            .param2(key_id.index() as u16)
            .build()?;
        Ok(packet)
    }

    // Only accepted while the data zone is unlocked. The MAC field is sent
    // but ignored by the device.
    pub(crate) fn plain(&mut self, key_id: Slot, private_key: &Block) -> Result<Packet, Error> {
        let pdu = self.0.pdu_buffer();
        pdu[..Self::KEY_LENGTH + Self::MAC_LENGTH].fill(0x00);
        pdu[4..Self::KEY_LENGTH].copy_from_slice(private_key.as_ref());
        let packet = self
            .0
            .pdu_length(Self::KEY_LENGTH + Self::MAC_LENGTH)
            .opcode(OpCode::PrivWrite)
            .mode(Self::MODE_PLAIN)
            .param2(key_id.index() as u16)
            .build()?;
        Ok(packet)
    }
}

/// Random
impl<'a> Random<'a> {
    const MODE_SEED_UPDATE: u8 = 0x00;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn random(&mut self) -> Result<Packet, Error> {
        let packet = self
            .0
            .opcode(OpCode::Random)
            .mode(Self::MODE_SEED_UPDATE)
            .build()?;
        Ok(packet)
    }
}

/// Read
impl<'a> Read<'a> {
    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn read(
        &mut self,
        zone: Zone,
        size: Size,
        block: u8,
        offset: u8,
    ) -> Result<Packet, Error> {
        let addr = zone.get_addr(block, offset)?;
        let mode = zone.encode(size);
        let packet = self
            .0
            .opcode(OpCode::Read)
            .mode(mode)
            .param2(addr)
            .build()?;
        Ok(packet)
    }
}

/// Sign
impl<'a> Sign<'a> {
    /// Sign mode bit 7 clear: internal message (TempKey)
    const MODE_INTERNAL: u8 = 0x00;
    /// Sign mode bit 0: Signature will be used for Verify(Invalidate)
    const MODE_INVALIDATE: u8 = 0x01;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    // Sign the digest held in TempKey using the private key in the specified
    // slot.
    pub(crate) fn internal(&mut self, key_id: Slot, invalidate: bool) -> Result<Packet, Error> {
        let mut mode = Self::MODE_INTERNAL;
        if invalidate {
            mode |= Self::MODE_INVALIDATE;
        }
        let packet = self
            .0
            .opcode(OpCode::Sign)
            .mode(mode)
            .param2(key_id.index() as u16)
            .build()?;
        Ok(packet)
    }
}

/// Verify
impl<'a> Verify<'a> {
    pub(crate) const MODE_VALIDATE: u8 = 0x03;
    pub(crate) const MODE_INVALIDATE: u8 = 0x07;

    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    // Validate or invalidate the public key stored in `key_id`.
    pub(crate) fn key(
        &mut self,
        mode: u8,
        key_id: Slot,
        signature: &p256::ecdsa::Signature,
        other_data: &[u8],
    ) -> Result<Packet, Error> {
        // Load PDU data
        let sig_bytes = signature.to_bytes();
        let sig_length = sig_bytes.len();
        let (sig_buf, pdu_buffer) = self.0.pdu_buffer().split_at_mut(sig_length);
        sig_buf.copy_from_slice(sig_bytes.as_slice());
        let other_length = other_data.len();
        pdu_buffer[..other_length].copy_from_slice(other_data);

        let packet = self
            .0
            .opcode(OpCode::Verify)
            .mode(mode)
            .param2(key_id.index() as u16)
            .pdu_length(sig_length + other_length)
            .build()?;
        Ok(packet)
    }
}

/// Write
impl<'a> Write<'a> {
    pub(crate) fn new(builder: PacketBuilder<'a>) -> Self {
        Self(builder)
    }

    pub(crate) fn slot(
        &mut self,
        variant: Variant,
        slot: Slot,
        block: u8,
        data: &Block,
    ) -> Result<Packet, Error> {
        let addr = Zone::Data.get_slot_addr(variant, slot, block)?;
        let mode = Zone::Data.encode(Size::Block);
        let packet = self
            .0
            .opcode(OpCode::Write)
            .mode(mode)
            .param2(addr)
            .pdu_data(data)
            .build()?;
        Ok(packet)
    }

    pub(crate) fn write(
        &mut self,
        zone: Zone,
        size: Size,
        block: u8,
        offset: u8,
        data: impl AsRef<[u8]>,
    ) -> Result<Packet, Error> {
        if size.len() != data.as_ref().len() {
            return Err(ErrorKind::BadParam.into());
        }

        let addr = zone.get_addr(block, offset)?;
        let mode = zone.encode(size);
        let packet = self
            .0
            .opcode(OpCode::Write)
            .mode(mode)
            .param2(addr)
            .pdu_data(data)
            .build()?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: u8) -> Slot {
        Slot::new(index).unwrap()
    }

    #[test]
    fn serial_from_config() {
        let mut head = [0x00u8; 16];
        head.iter_mut().enumerate().for_each(|(i, v)| *v = i as u8);
        let serial = Serial::from_config(&head).unwrap();
        assert_eq!(serial.as_ref(), [0, 1, 2, 3, 8, 9, 10, 11, 12]);
        assert_eq!(
            Serial::from_config(&head[..12]).unwrap_err().kind(),
            Some(ErrorKind::BadParam)
        );
    }

    #[test]
    fn nonce_passthrough() {
        let buf = &mut [0x00u8; 0xff];
        let nonce = Nonce::new([0x5a; 32]);
        let packet = NonceCtx::new(PacketBuilder::new(buf.as_mut()))
            .passthrough(&nonce)
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x27);
        assert_eq!(packet[0x02], OpCode::Nonce as u8);
        assert_eq!(packet[0x03], 0x03);
        assert_eq!(packet[0x04..0x06], [0x00, 0x00]);
        assert_eq!(packet[0x06..0x26], [0x5a; 32]);
    }

    #[test]
    fn gendig() {
        let buf = &mut [0x00u8; 0xff];
        let packet = GenDig::new(PacketBuilder::new(buf.as_mut()))
            .gendig(Zone::Data, slot(3))
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x07);
        assert_eq!(packet[0x02], OpCode::GenDig as u8);
        assert_eq!(packet[0x03], 0x02);
        assert_eq!(packet[0x04..0x06], [0x03, 0x00]);
    }

    #[test]
    fn genkey_digest() {
        let buf = &mut [0x00u8; 0xff];
        let packet = GenKey::new(PacketBuilder::new(buf.as_mut()))
            .pubkey_digest(slot(9))
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x0a);
        assert_eq!(packet[0x02], OpCode::GenKey as u8);
        assert_eq!(packet[0x03], 0x10);
        assert_eq!(packet[0x04..0x06], [0x09, 0x00]);
        assert_eq!(packet[0x06..0x09], [0x00; 3]);
    }

    #[test]
    fn lock_crc() {
        let buf = &mut [0x00u8; 0xff];
        let crc = 0xDEAD;
        let packet = Lock::new(PacketBuilder::new(buf.as_mut()))
            .zone(Zone::Data, crc)
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x07);
        assert_eq!(packet[0x02], OpCode::Lock as u8);
        assert_eq!(packet[0x03], 0x01);
        assert_eq!(packet[0x04..0x06], crc.to_le_bytes());
    }

    #[test]
    fn privwrite_encrypted() {
        let buf = &mut [0x00u8; 0xff];
        let ciphertext = [0xbb; 36];
        let mac = Digest::from([0xcc; 32]);
        let packet = PrivWrite::new(PacketBuilder::new(buf.as_mut()))
            .encrypted(slot(1), &ciphertext, &mac)
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x4b);
        assert_eq!(packet[0x02], OpCode::PrivWrite as u8);
        assert_eq!(packet[0x03], 0x40);
        assert_eq!(packet[0x04..0x06], [0x01, 0x00]);
        assert_eq!(packet[0x06..0x2a], [0xbb; 36]);
        assert_eq!(packet[0x2a..0x4a], [0xcc; 32]);
    }

    #[test]
    fn privwrite_plain() {
        let buf = &mut [0xffu8; 0xff];
        let mut data = Block::default();
        data.as_mut()
            .iter_mut()
            .enumerate()
            .for_each(|(i, v)| *v = i as u8);
        let packet = PrivWrite::new(PacketBuilder::new(buf.as_mut()))
            .plain(slot(2), &data)
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x4b);
        assert_eq!(packet[0x03], 0x00);
        assert_eq!(packet[0x04..0x06], [0x02, 0x00]);
        assert_eq!(packet[0x06..0x0a], [0x00; 0x04]);
        assert_eq!(packet[0x0a..0x2a].as_ref(), data.as_ref());
        assert_eq!(packet[0x2a..0x4a], [0x00; 32]);
    }

    #[test]
    fn sign_invalidate() {
        let buf = &mut [0x00u8; 0xff];
        let packet = Sign::new(PacketBuilder::new(buf.as_mut()))
            .internal(slot(0), true)
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x02], OpCode::Sign as u8);
        assert_eq!(packet[0x03], 0x01);
    }

    #[test]
    fn verify_key() {
        let buf = &mut [0x00u8; 0xff];
        let mut sig_bytes = [0x00u8; 64];
        sig_bytes[..32].fill(b'r');
        sig_bytes[32..].fill(b's');
        let signature = p256::ecdsa::Signature::from_slice(&sig_bytes).unwrap();
        let other_data = [0x07u8; 19];
        let packet = Verify::new(PacketBuilder::new(buf.as_mut()))
            .key(Verify::MODE_INVALIDATE, slot(10), &signature, &other_data)
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x5a);
        assert_eq!(packet[0x02], OpCode::Verify as u8);
        assert_eq!(packet[0x03], 0x07);
        assert_eq!(packet[0x04..0x06], [0x0a, 0x00]);
        assert_eq!(packet[0x06..0x46], sig_bytes);
        assert_eq!(packet[0x46..0x59], other_data);
    }

    #[test]
    fn write_config_word() {
        let buf = &mut [0x00u8; 0xff];
        let packet = Write::new(PacketBuilder::new(buf.as_mut()))
            .write(Zone::Config, Size::Word, 0, 5, [0x01, 0x02, 0x03, 0x04])
            .unwrap()
            .buffer(buf.as_ref());
        assert_eq!(packet[0x01], 0x0b);
        assert_eq!(packet[0x03], 0x00);
        assert_eq!(packet[0x04..0x06], [0x05, 0x00]);
        assert!(Write::new(PacketBuilder::new(buf.as_mut()))
            .write(Zone::Config, Size::Word, 0, 5, [0x01, 0x02])
            .is_err());
    }
}
