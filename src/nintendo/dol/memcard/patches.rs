//! Save data fixups for titles that bind their saves to the card serial.
//!
//! These titles refuse to load a save copied from another card unless the
//! serial numbers embedded in the save data match the card, so the data is
//! re-stamped and its internal checksum recomputed before it is committed.

use crate::nintendo::dol::memcard::error::{MemcardError, MemcardResult};
use byteorder::{BigEndian, ByteOrder};
use crc::{Algorithm, CRC_16_IBM_SDLC, Crc};
use log::debug;

const F_ZERO_MIN_LENGTH: usize = 0x8000;
const F_ZERO_CHECKSUM_OFFSET: usize = 0x0000;
const F_ZERO_CHECKSUM_START: usize = 0x0002;

const PSO_MIN_LENGTH: usize = 0x6000;
const PSO_SERIAL_OFFSET: usize = 0x2158;
const PSO_CHECKSUM_OFFSET: usize = 0x2048;
const PSO_CHECKSUM_START: usize = 0x204C;
const PSO_CHECKSUM_END: usize = 0x2164;

/// X.25: reflected 0x8408, register seeded with 0xFFFF, complemented on output.
const F_ZERO_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Reflected 0xEDB88320 with the register seeded with 0xDEBB20E3 and the
/// result complemented. The crc crate expects reflected seeds in unreflected form.
const PSO_CRC_ALGORITHM: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0xDEBB_20E3u32.reverse_bits(),
    refin: true,
    refout: true,
    xorout: 0xFFFF_FFFF,
    check: 0,
    residue: 0,
};

const PSO_CRC: Crc<u32> = Crc::<u32>::new(&PSO_CRC_ALGORITHM);

/// Phantasy Star Online release, selecting how far the checksummed range extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsoVersion {
    /// Episode I & II
    Episodes12,
    /// Episode III
    Episode3,
}

impl PsoVersion {
    fn checksum_extension(&self) -> usize {
        match self {
            Self::Episodes12 => 0x00,
            Self::Episode3 => 0x10,
        }
    }
}

/// The closed set of titles whose saves are patched on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlePatch {
    FZero,
    PhantasyStarOnline(PsoVersion),
}

impl TitlePatch {
    /// Looks up the patch for an exact stored file name.
    pub fn for_filename(filename: &[u8]) -> Option<Self> {
        match filename {
            b"f_zero.dat" => Some(Self::FZero),
            b"PSO_SYSTEM" => Some(Self::PhantasyStarOnline(PsoVersion::Episodes12)),
            b"PSO3_SYSTEM" => Some(Self::PhantasyStarOnline(PsoVersion::Episode3)),
            _ => None,
        }
    }

    /// Minimum save data length the patch touches.
    pub fn min_length(&self) -> usize {
        match self {
            Self::FZero => F_ZERO_MIN_LENGTH,
            Self::PhantasyStarOnline(_) => PSO_MIN_LENGTH,
        }
    }

    /// Stamps `serials` into `data` and refreshes the embedded checksum.
    pub fn apply(&self, data: &mut [u8], serials: (u32, u32)) -> MemcardResult<()> {
        if data.len() < self.min_length() {
            return Err(MemcardError::InvalidLength);
        }

        debug!("Applying {self:?} save patch");

        match self {
            Self::FZero => patch_f_zero(data, serials),
            Self::PhantasyStarOnline(version) => patch_pso(data, serials, *version),
        }

        Ok(())
    }
}

fn patch_f_zero(data: &mut [u8], (serial1, serial2): (u32, u32)) {
    // Each serial is split into its upper and lower half-words
    let serial1 = serial1.to_be_bytes();
    let serial2 = serial2.to_be_bytes();

    data[0x2066..0x2068].copy_from_slice(&serial1[..2]);
    data[0x7580..0x7582].copy_from_slice(&serial2[..2]);
    data[0x2060..0x2062].copy_from_slice(&serial1[2..]);
    data[0x2200..0x2202].copy_from_slice(&serial2[2..]);

    let checksum = F_ZERO_CRC.checksum(&data[F_ZERO_CHECKSUM_START..F_ZERO_MIN_LENGTH]);
    BigEndian::write_u16(
        &mut data[F_ZERO_CHECKSUM_OFFSET..F_ZERO_CHECKSUM_OFFSET + 2],
        checksum,
    );
}

fn patch_pso(data: &mut [u8], (serial1, serial2): (u32, u32), version: PsoVersion) {
    BigEndian::write_u32(&mut data[PSO_SERIAL_OFFSET..PSO_SERIAL_OFFSET + 4], serial1);
    BigEndian::write_u32(
        &mut data[PSO_SERIAL_OFFSET + 4..PSO_SERIAL_OFFSET + 8],
        serial2,
    );

    let end = PSO_CHECKSUM_END + version.checksum_extension();
    let checksum = PSO_CRC.checksum(&data[PSO_CHECKSUM_START..end]);
    BigEndian::write_u32(
        &mut data[PSO_CHECKSUM_OFFSET..PSO_CHECKSUM_OFFSET + 4],
        checksum,
    );
}
