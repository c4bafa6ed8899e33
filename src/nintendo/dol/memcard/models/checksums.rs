use crate::nintendo::dol::memcard::checksum::{CHECKSUM_SIZE, checksum};
use crate::nintendo::dol::memcard::error::MemcardResult;
use binrw::{BinRead, BinWrite, Endian};
use std::io::Cursor;
use std::ops::Range;

/// The normal and inverted checksum pair stored in every system record.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[brw(big)]
pub struct Checksums {
    pub normal: [u8; CHECKSUM_SIZE],
    pub inverted: [u8; CHECKSUM_SIZE],
}

impl Checksums {
    pub fn of(data: &[u8]) -> Self {
        let (normal, inverted) = checksum(data);
        Self { normal, inverted }
    }
}

/// A fixed-size system record that carries its own checksums.
pub trait ChecksummedRecord: for<'a> BinWrite<Args<'a> = ()> {
    /// Serialized byte range the checksums are computed over.
    const CHECKSUM_SPAN: Range<usize>;

    fn checksums(&self) -> &Checksums;

    fn checksums_mut(&mut self) -> &mut Checksums;

    fn to_bytes(&self) -> MemcardResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_options(&mut cursor, Endian::Big, ())?;
        Ok(cursor.into_inner())
    }

    fn compute_checksums(&self) -> MemcardResult<Checksums> {
        let bytes = self.to_bytes()?;
        Ok(Checksums::of(&bytes[Self::CHECKSUM_SPAN]))
    }

    fn update_checksums(&mut self) -> MemcardResult<()> {
        let computed = self.compute_checksums()?;
        *self.checksums_mut() = computed;
        Ok(())
    }

    fn has_valid_checksums(&self) -> MemcardResult<bool> {
        Ok(self.compute_checksums()? == *self.checksums())
    }
}
