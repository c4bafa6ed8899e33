//! The two-variant additive checksum protecting the header, directories and
//! block maps.

/// Size of a single checksum in bytes.
pub const CHECKSUM_SIZE: usize = 2;

/// Reserved for unformatted records, never a valid checksum.
const UNFORMATTED: [u8; CHECKSUM_SIZE] = [0xFF, 0xFF];

/// Running 16-bit word sum over a byte stream.
///
/// Bytes alternate between the high and low half of the accumulated word,
/// starting with the high half. The inverted variant complements every byte
/// before adding it.
#[derive(Debug, Clone, Copy)]
struct Digest {
    inverted: bool,
    sum: u16,
    high: bool,
}

impl Digest {
    fn new(inverted: bool) -> Self {
        Self {
            inverted,
            sum: 0,
            high: true,
        }
    }

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let byte = if self.inverted { byte ^ 0xFF } else { byte };
            let shift = if self.high { 8 } else { 0 };
            self.sum = self.sum.wrapping_add((byte as u16) << shift);
            self.high = !self.high;
        }
    }

    fn finalize(self) -> [u8; CHECKSUM_SIZE] {
        let sum = self.sum.to_be_bytes();
        if sum == UNFORMATTED { [0x00, 0x00] } else { sum }
    }
}

/// Computes the normal and inverted checksums of `data` in a single pass.
pub fn checksum(data: &[u8]) -> ([u8; CHECKSUM_SIZE], [u8; CHECKSUM_SIZE]) {
    let mut normal = Digest::new(false);
    let mut inverted = Digest::new(true);

    for chunk in data.chunks(512) {
        normal.update(chunk);
        inverted.update(chunk);
    }

    (normal.finalize(), inverted.finalize())
}
