//! Blocking I2C datalink. Every frame written to the device starts with a
//! word address selecting the transaction type.

use super::error::{Error, ErrorKind};
use super::packet::{Packet, Response};
use core::slice::from_ref;
use embedded_hal::delay::DelayNs;
use log::{debug, trace};

const WAKE_RESPONSE_EXPECTED: &[u8] = &[0x04, 0x11, 0x33, 0x43];
const WAKE_SELFTEST_FAILED: &[u8] = &[0x04, 0x07, 0xC4, 0x40];

/// Default I2C address of ATECC508A and ATSHA204A
const ADDRESS: u8 = 0xc0 >> 1;
/// Time in us that takes for the device to wake up (tWHI).
const DELAY_US: u32 = 1500;

// By default, wake up sequence is repeated up to 20 times until it succeeds.
// Linux I2C drivers need far more attempts before the first read goes
// through.
#[cfg(target_os = "none")]
const RETRY: usize = 20;
#[cfg(not(target_os = "none"))]
const RETRY: usize = 20 * 15;

/// So-called "word address".
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Transaction {
    Reset = 0x00,
    Sleep = 0x01,
    Idle = 0x02,
    Command = 0x03,
}

/// Bus parameters of the datalink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I2cConfig {
    /// 7-bit I2C address.
    pub address: u8,
    /// Upper bound on polling attempts while waking and receiving.
    pub retries: usize,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            address: ADDRESS,
            retries: RETRY,
        }
    }
}

pub(crate) struct I2c<PHY, D> {
    phy: PHY,
    delay: D,
    config: I2cConfig,
}

impl<PHY, D> I2c<PHY, D> {
    pub(crate) fn with_config(phy: PHY, delay: D, config: I2cConfig) -> Self {
        Self { phy, delay, config }
    }

    pub(crate) fn release(self) -> (PHY, D) {
        (self.phy, self.delay)
    }
}

impl<PHY, D> I2c<PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
    /// Wakes up device, sends the packet, waits for command completion,
    /// receives response, and puts the device into the idle state. Idle is
    /// issued even when sending or receiving failed.
    pub(crate) fn execute<'a>(
        &mut self,
        buffer: &'a mut [u8],
        packet: Packet,
        exec_time: Option<u32>,
    ) -> Result<Response<'a>, Error> {
        debug!("command {:?}", packet.opcode());
        self.wake()?;
        let received = match self.send(&packet.buffer(buffer)) {
            Ok(()) => {
                // Wait for the device to finish its job.
                self.delay.delay_ms(exec_time.unwrap_or(1));
                self.receive(buffer)
            }
            Err(e) => Err(e),
        };
        // The device goes back to idle whether or not the exchange worked.
        let idle = self.idle();
        let response_buffer = received?;
        idle?;
        Response::new(response_buffer)
    }

    fn send<T>(&mut self, bytes: &T) -> Result<(), Error>
    where
        T: AsRef<[u8]>,
    {
        trace!("tx {:02x?}", bytes.as_ref());
        self.phy
            .write(self.config.address, bytes.as_ref())
            .map_err(|_| ErrorKind::TxFail.into())
    }

    /// Returns response buffer for later processing.
    fn receive<'a>(&mut self, buffer: &'a mut [u8]) -> Result<&'a mut [u8], Error> {
        // Reset indicates the beginning of transaction.
        let word_address = Transaction::Reset as u8;

        let mut count = 0;
        loop {
            let result = self.phy.write(self.config.address, from_ref(&word_address));

            if result.is_ok() {
                break;
            } else {
                if count > self.config.retries {
                    return Err(Error::from(ErrorKind::TxFail));
                }
                count += 1;
            }
        }

        let min_resp_size = 4;
        self.phy
            .read(self.config.address, &mut buffer[0..2])
            .map_err(|_| Error::from(ErrorKind::RxFail))?;

        let length_to_read = match buffer[0] {
            // A single byte has already read.
            length if length == 1 => return Ok(buffer[0..1].as_mut()),
            // Buffer cannot contain the response to come. Abort.
            length if buffer.len() < length as usize => return Err(ErrorKind::SmallBuffer.into()),
            // The coming response is malformed. Abort.
            length if length < min_resp_size => return Err(ErrorKind::CommFail.into()),
            length => length as usize,
        };

        self.phy
            .read(self.config.address, buffer[2..length_to_read].as_mut())
            .map_err(|_| Error::from(ErrorKind::RxFail))?;
        trace!("rx {:02x?}", &buffer[..length_to_read]);
        Ok(buffer[..length_to_read].as_mut())
    }

    /// Bring the device out of sleep or idle. Polls a bounded number of times
    /// before giving up with `RxFail`.
    pub(crate) fn wake(&mut self) -> Result<(), Error> {
        // A null write holds SDA low long enough to wake the device. It is
        // not acknowledged while the device sleeps.
        self.phy.write(self.config.address, from_ref(&0x00)).ok();

        // Wait for the device to wake up.
        self.delay.delay_us(DELAY_US);

        let buffer = &mut [0x00, 0x00, 0x00, 0x00];

        let mut count = 0;
        loop {
            let result = self.phy.read(self.config.address, buffer.as_mut());

            if result.is_ok() {
                break;
            } else {
                if count > self.config.retries {
                    return Err(Error::from(ErrorKind::RxFail));
                }
                count += 1;
            }
        }

        match buffer.as_ref() {
            WAKE_RESPONSE_EXPECTED => Ok(()),
            WAKE_SELFTEST_FAILED => {
                debug!("wake: self test failed");
                Err(ErrorKind::WakeFailed.into())
            }
            _ => Err(ErrorKind::WakeFailed.into()),
        }
    }

    pub(crate) fn idle(&mut self) -> Result<(), Error> {
        let word_address = Transaction::Idle as u8;
        self.phy
            .write(self.config.address, from_ref(&word_address))
            .map_err(|_| ErrorKind::TxFail.into())
    }

    pub(crate) fn sleep(&mut self) -> Result<(), Error> {
        let word_address = Transaction::Sleep as u8;
        // Wait for the I2C bus to be ready.
        self.delay.delay_us(30);

        self.phy
            .write(self.config.address, from_ref(&word_address))
            .map_err(|_| ErrorKind::TxFail.into())
    }
}
