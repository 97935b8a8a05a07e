//! Random number generation

use crate::command;
use crate::error::{Error, ErrorKind, Step};
use core::num::NonZeroU32;
use embedded_hal::delay::DelayNs;
use signature::rand_core;

use super::AtCaClient;

pub struct Random<'a, PHY, D> {
    pub(crate) atca: &'a mut AtCaClient<PHY, D>,
}

impl<'a, PHY, D> Random<'a, PHY, D> {
    pub fn new(atca: &'a mut AtCaClient<PHY, D>) -> Self {
        Self { atca }
    }
}

impl<'a, PHY, D> Random<'a, PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
    /// Fill `dest` with 32 byte draws from the chip RNG. A short draw is an
    /// `RxFail`.
    pub fn fill(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        for c in dest.chunks_mut(32) {
            let packet = command::Random::new(self.atca.packet_builder()).random()?;
            self.atca
                .execute(packet)
                .and_then(|resp| {
                    let bytes = resp.as_ref().get(..c.len()).ok_or(ErrorKind::RxFail)?;
                    c.copy_from_slice(bytes);
                    Ok(())
                })
                .map_err(|e| e.at(Step::Random))?;
        }
        Ok(())
    }
}

fn rng_error(error: Error) -> rand_core::Error {
    let code = rand_core::Error::CUSTOM_START | u32::from(error.code());
    NonZeroU32::new(code).map_or_else(|| unreachable!(), rand_core::Error::from)
}

impl<'a, PHY, D> rand_core::RngCore for Random<'a, PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    /// Panics when the chip fails to deliver. Use `try_fill_bytes` or
    /// [`Random::fill`] to handle the error instead.
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(e) = self.fill(dest) {
            panic!("chip RNG failed: {}", e);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill(dest).map_err(rng_error)
    }
}

impl<'a, PHY, D> rand_core::CryptoRng for Random<'a, PHY, D>
where
    PHY: embedded_hal::i2c::I2c,
    D: DelayNs,
{
}

#[cfg(test)]
mod tests {
    use crate::datalink::fake::{FakeBus, NoDelay};
    use crate::error::{ErrorKind, Step};
    use crate::memory::Variant;
    use crate::AtCaClient;
    use signature::rand_core::RngCore;

    #[test]
    fn fill_across_draws() {
        let mut phy = FakeBus::new();
        phy.random = (0..32).collect();
        let mut atca = AtCaClient::new(phy, NoDelay, Variant::Atecc508a);
        let mut dest = [0x00; 40];
        atca.random().fill(&mut dest).unwrap();
        assert_eq!(dest[..32], (0..32).collect::<Vec<u8>>()[..]);
        assert_eq!(dest[32..], [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn short_draw_is_an_error() {
        let mut phy = FakeBus::new();
        phy.random = vec![0x11; 8];
        let mut atca = AtCaClient::new(phy, NoDelay, Variant::Atecc508a);
        let mut dest = [0x00; 32];
        let error = atca.random().fill(&mut dest).unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::RxFail));
        assert_eq!(error.step(), Some(Step::Random));
        assert!(atca.random().try_fill_bytes(&mut dest).is_err());
    }
}
