/// A running Fletcher-16 checksum, as the live protocol exchanges it.
///
/// Both sums are kept modulo 255, so a finished checksum never has either
/// byte set to `0xFF`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Fletcher16 {
    low: u16,
    high: u16,
}

impl Fletcher16 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn finish(&self) -> u16 {
        (self.high << 8) | self.low
    }

    /// Feeds `len` zero bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn pad(&mut self, len: usize) -> &mut Self {
        let rounds = (len % 255) as u16;
        self.high = ((u32::from(self.high) + u32::from(self.low) * u32::from(rounds)) % 255) as u16;
        self
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        for &byte in bytes {
            self.low = (self.low + u16::from(byte)) % 255;
            self.high = (self.high + self.low) % 255;
        }
        self
    }
}

#[must_use]
pub fn fletcher16(bytes: &[u8]) -> u16 {
    Fletcher16::new().update(bytes).finish()
}
