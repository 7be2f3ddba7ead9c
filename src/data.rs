// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! File data blocks.
//!
//! OFS blocks carry a 24 byte header (owning file header, sequence number,
//! payload size, next block, checksum) and chain to each other. FFS blocks
//! are pure payload; their order is the file header's block list.

use log::trace;

use crate::checksum::{self, ChecksumDomain};
use crate::consts::*;
use crate::disk::{DiskType, ADF};
use crate::entry::FileHeaderBlock;
use crate::error::{AdfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataBlock {
    Ofs(u32),
    Ffs(u32),
}

/// Payload bytes per data block for a filesystem flavour.
pub fn bytes_per_data_block(disk_type: DiskType) -> usize {
    match disk_type {
        DiskType::OFS => OFS_DATA_BYTES,
        DiskType::FFS => FFS_DATA_BYTES,
    }
}

impl DataBlock {
    pub fn new(disk_type: DiskType, number: u32) -> Self {
        match disk_type {
            DiskType::OFS => DataBlock::Ofs(number),
            DiskType::FFS => DataBlock::Ffs(number),
        }
    }

    pub fn number(&self) -> u32 {
        match self {
            DataBlock::Ofs(number) | DataBlock::Ffs(number) => *number,
        }
    }

    pub fn max_data_bytes(&self) -> usize {
        match self {
            DataBlock::Ofs(_) => OFS_DATA_BYTES,
            DataBlock::Ffs(_) => FFS_DATA_BYTES,
        }
    }

    fn payload_offset(&self) -> usize {
        match self {
            DataBlock::Ofs(_) => OFS_HEADER_SIZE,
            DataBlock::Ffs(_) => 0,
        }
    }

    fn payload<'a>(&self, disk: &'a ADF) -> &'a [u8] {
        let start = self.payload_offset();
        disk.block_bytes(self.number(), start..start + self.max_data_bytes())
    }

    fn payload_mut<'a>(&self, disk: &'a mut ADF) -> &'a mut [u8] {
        let start = self.payload_offset();
        disk.block_bytes_mut(self.number(), start..start + self.max_data_bytes())
    }

    pub fn read_byte(&self, disk: &ADF, index: usize) -> Option<u8> {
        self.payload(disk).get(index).copied()
    }

    /// Stores one payload byte. OFS blocks need [`DataBlock::finalize`]
    /// afterwards. Returns false when `index` is past the payload.
    pub fn write_byte(&self, disk: &mut ADF, index: usize, value: u8) -> bool {
        match self.payload_mut(disk).get_mut(index) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }

    /// Valid payload: the declared size for OFS, the whole block for FFS.
    pub fn data_bytes<'a>(&self, disk: &'a ADF) -> &'a [u8] {
        match self {
            DataBlock::Ofs(number) => {
                let size = (disk.read_u32(*number, DATA_SIZE) as usize).min(OFS_DATA_BYTES);
                &self.payload(disk)[..size]
            }
            DataBlock::Ffs(_) => self.payload(disk),
        }
    }

    pub fn header_key(&self, disk: &ADF) -> Option<u32> {
        match self {
            DataBlock::Ofs(number) => Some(disk.read_u32(*number, DATA_HEADER_KEY)),
            DataBlock::Ffs(_) => None,
        }
    }

    pub fn sequence_number(&self, disk: &ADF) -> Option<u32> {
        match self {
            DataBlock::Ofs(number) => Some(disk.read_u32(*number, DATA_SEQ_NUM)),
            DataBlock::Ffs(_) => None,
        }
    }

    pub fn next_block(&self, disk: &ADF) -> Option<u32> {
        match self {
            DataBlock::Ofs(number) => Some(disk.read_u32(*number, DATA_NEXT)),
            DataBlock::Ffs(_) => None,
        }
    }

    /// Fills the block with `payload`. For OFS the header fields and the
    /// checksum are written as well.
    pub(crate) fn write(&self, disk: &mut ADF, header: u32, sequence: u32, payload: &[u8], next: u32) {
        disk.clear_block(self.number());
        self.payload_mut(disk)[..payload.len()].copy_from_slice(payload);
        if let DataBlock::Ofs(number) = *self {
            disk.write_u32(number, BLK_TYPE, T_DATA);
            disk.write_u32(number, DATA_HEADER_KEY, header);
            disk.write_u32(number, DATA_SEQ_NUM, sequence);
            disk.write_u32(number, DATA_SIZE, payload.len() as u32);
            disk.write_u32(number, DATA_NEXT, next);
        }
        self.finalize(disk);
        trace!(
            "Wrote data block #{} at block {} ({} bytes, next {})",
            sequence,
            self.number(),
            payload.len(),
            next
        );
    }

    pub fn finalize(&self, disk: &mut ADF) {
        if let DataBlock::Ofs(number) = self {
            checksum::recompute(disk, ChecksumDomain::Block(*number));
        }
    }

    pub fn verify(&self, disk: &ADF) -> Result<()> {
        match self {
            DataBlock::Ofs(number) => {
                checksum::ensure_valid(disk, ChecksumDomain::Block(*number))?;
                let block_type = disk.read_u32(*number, BLK_TYPE);
                if block_type != T_DATA {
                    return Err(AdfError::UnexpectedBlockType {
                        block: *number,
                        block_type,
                        sec_type: 0,
                    });
                }
                Ok(())
            }
            DataBlock::Ffs(_) => Ok(()),
        }
    }
}

/// Number of data blocks needed for `size` bytes.
pub fn data_blocks_for(disk_type: DiskType, size: usize) -> usize {
    size.div_ceil(bytes_per_data_block(disk_type))
}

/// Number of extension blocks needed to list `data_blocks` pointers.
pub fn extension_blocks_for(data_blocks: usize) -> usize {
    data_blocks.saturating_sub(MAX_DATABLOCK).div_ceil(MAX_DATABLOCK)
}

/// Reads the contents of a file, following the OFS chain or the FFS block
/// list.
pub fn read_file_data(disk: &ADF, disk_type: DiskType, header: FileHeaderBlock) -> Result<Vec<u8>> {
    let size = header.file_size(disk) as usize;
    let declared = header.data_block_numbers(disk)?;
    let contents = match disk_type {
        DiskType::OFS => read_ofs_chain(disk, header, size)?,
        DiskType::FFS => read_ffs_list(disk, header, size, &declared)?,
    };
    if contents.1 != declared.len() {
        return Err(AdfError::InconsistentBlockCount(header.number()));
    }
    Ok(contents.0)
}

fn truncated(header: FileHeaderBlock, expected: usize, actual: usize) -> AdfError {
    AdfError::TruncatedFile {
        header: header.number(),
        expected,
        actual,
    }
}

fn read_ofs_chain(disk: &ADF, header: FileHeaderBlock, size: usize) -> Result<(Vec<u8>, usize)> {
    let mut contents = Vec::with_capacity(size);
    let mut current = header.first_data_block_number(disk);
    let mut consumed = 0;

    while contents.len() < size {
        if current == 0 {
            return Err(truncated(header, size, contents.len()));
        }
        let block = DataBlock::Ofs(disk.check_block(current)?);
        block.verify(disk)?;
        let data = block.data_bytes(disk);
        let wanted = (size - contents.len()).min(data.len());
        contents.extend_from_slice(&data[..wanted]);
        consumed += 1;
        if consumed > ADF_NUM_SECTORS as usize {
            return Err(AdfError::ChainLoop(header.number()));
        }
        current = block.next_block(disk).unwrap_or(0);
    }

    if current != 0 {
        return Err(AdfError::InconsistentBlockCount(header.number()));
    }
    Ok((contents, consumed))
}

fn read_ffs_list(
    disk: &ADF,
    header: FileHeaderBlock,
    size: usize,
    declared: &[u32],
) -> Result<(Vec<u8>, usize)> {
    let mut contents = Vec::with_capacity(size);
    let mut blocks = declared.iter();
    let mut consumed = 0;

    while contents.len() < size {
        let Some(&number) = blocks.next() else {
            return Err(truncated(header, size, contents.len()));
        };
        let data = DataBlock::Ffs(number).data_bytes(disk);
        let wanted = (size - contents.len()).min(data.len());
        contents.extend_from_slice(&data[..wanted]);
        consumed += 1;
    }
    Ok((contents, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datestamp::DateStamp;
    use crate::entry::Entry;

    #[test]
    fn block_sizes() {
        assert_eq!(DataBlock::Ofs(2).max_data_bytes(), 488);
        assert_eq!(DataBlock::Ffs(2).max_data_bytes(), 512);
        assert_eq!(data_blocks_for(DiskType::OFS, 0), 0);
        assert_eq!(data_blocks_for(DiskType::OFS, 488), 1);
        assert_eq!(data_blocks_for(DiskType::OFS, 489), 2);
        assert_eq!(data_blocks_for(DiskType::FFS, 1024), 2);
        assert_eq!(extension_blocks_for(72), 0);
        assert_eq!(extension_blocks_for(73), 1);
        assert_eq!(extension_blocks_for(144), 1);
        assert_eq!(extension_blocks_for(145), 2);
    }

    #[test]
    fn ofs_block_header() {
        let mut disk = ADF::blank();
        let block = DataBlock::Ofs(950);
        block.write(&mut disk, 900, 3, b"hello", 951);

        assert_eq!(disk.read_u32(950, BLK_TYPE), T_DATA);
        assert_eq!(block.header_key(&disk), Some(900));
        assert_eq!(block.sequence_number(&disk), Some(3));
        assert_eq!(block.next_block(&disk), Some(951));
        assert_eq!(block.data_bytes(&disk), b"hello");
        assert!(block.verify(&disk).is_ok());

        assert!(block.write_byte(&mut disk, 0, b'j'));
        assert!(block.verify(&disk).is_err());
        block.finalize(&mut disk);
        assert!(block.verify(&disk).is_ok());
        assert_eq!(block.read_byte(&disk, 0), Some(b'j'));
        assert_eq!(block.read_byte(&disk, 488), None);
        assert!(!block.write_byte(&mut disk, 488, 0));
    }

    #[test]
    fn ffs_block_is_pure_payload() {
        let mut disk = ADF::blank();
        let block = DataBlock::Ffs(950);
        block.write(&mut disk, 900, 1, &[7u8; 512], 0);
        assert_eq!(disk.read_u8(950, 0), 7);
        assert_eq!(disk.read_u8(950, 511), 7);
        assert_eq!(block.data_bytes(&disk).len(), 512);
        assert_eq!(block.next_block(&disk), None);
        assert!(block.verify(&disk).is_ok());
    }

    fn header_with(disk: &mut ADF, size: u32, blocks: &[u32]) -> FileHeaderBlock {
        let header = FileHeaderBlock::new(900);
        header.initialize(disk, ROOT_BLOCK, "f", DateStamp::default()).unwrap();
        header.set_file_size(disk, size);
        header.set_block_count(disk, blocks.len() as u32);
        for (i, &block) in blocks.iter().enumerate() {
            header.set_data_block(disk, i, block);
        }
        header.set_first_data_block_number(disk, blocks.first().copied().unwrap_or(0));
        Entry::File(header).recompute_checksum(disk);
        header
    }

    #[test]
    fn ofs_truncated_chain() {
        let mut disk = ADF::blank();
        let header = header_with(&mut disk, 600, &[950, 951]);
        DataBlock::Ofs(950).write(&mut disk, 900, 1, &[1u8; 488], 0);
        assert!(matches!(
            read_file_data(&disk, DiskType::OFS, header),
            Err(AdfError::TruncatedFile {
                expected: 600,
                actual: 488,
                ..
            })
        ));
    }

    #[test]
    fn ofs_trailing_blocks() {
        let mut disk = ADF::blank();
        let header = header_with(&mut disk, 10, &[950]);
        DataBlock::Ofs(950).write(&mut disk, 900, 1, &[1u8; 10], 951);
        DataBlock::Ofs(951).write(&mut disk, 900, 2, &[2u8; 10], 0);
        assert!(matches!(
            read_file_data(&disk, DiskType::OFS, header),
            Err(AdfError::InconsistentBlockCount(900))
        ));
    }

    #[test]
    fn ffs_list_mismatches() {
        let mut disk = ADF::blank();
        let header = header_with(&mut disk, 1000, &[950]);
        assert!(matches!(
            read_file_data(&disk, DiskType::FFS, header),
            Err(AdfError::TruncatedFile { actual: 512, .. })
        ));

        let header = header_with(&mut disk, 100, &[950, 951]);
        assert!(matches!(
            read_file_data(&disk, DiskType::FFS, header),
            Err(AdfError::InconsistentBlockCount(900))
        ));

        let header = header_with(&mut disk, 520, &[950, 951]);
        DataBlock::Ffs(950).write(&mut disk, 900, 1, &[3u8; 512], 0);
        DataBlock::Ffs(951).write(&mut disk, 900, 2, &[4u8; 8], 0);
        let data = read_file_data(&disk, DiskType::FFS, header).unwrap();
        assert_eq!(data.len(), 520);
        assert_eq!(&data[510..514], &[3, 3, 4, 4]);
    }
}
