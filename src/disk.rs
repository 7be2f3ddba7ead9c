// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Raw image access: a flat array of 512 byte sectors with big endian
//! accessors, plus reading and writing whole images.

use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::consts::{ADF_NUM_SECTORS, ADF_SECTOR_SIZE, ADF_SIZE};
use crate::error::{AdfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskType {
    OFS,
    FFS,
}

impl DiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskType::OFS => "OFS",
            DiskType::FFS => "FFS",
        }
    }
}

impl std::fmt::Display for DiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OFS" => Ok(DiskType::OFS),
            "FFS" => Ok(DiskType::FFS),
            other => Err(format!("invalid disk type '{}' (expected OFS or FFS)", other)),
        }
    }
}

/// Encodes `text` as ISO-8859-1, the character set of AmigaDOS names and
/// comments. Returns `None` when a character has no single byte form.
pub fn encode_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(c).ok()).collect()
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// An in-memory 880 KB disk image. Every block view in the crate is a block
/// number into this buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ADF {
    data: Vec<u8>,
}

impl Debug for ADF {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ADF").field("size", &self.data.len()).finish()
    }
}

impl Default for ADF {
    fn default() -> Self {
        Self::blank()
    }
}

pub fn load_adf_from_zip(zip_data: &[u8], adf_filename: &str) -> Result<ADF> {
    let reader = std::io::Cursor::new(zip_data);
    let mut archive = ZipArchive::new(reader)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.name() == adf_filename {
            let mut adf_data = Vec::new();
            file.read_to_end(&mut adf_data)?;
            debug!("Loaded '{}' from ZIP archive ({} bytes)", adf_filename, adf_data.len());
            return ADF::from_bytes(&adf_data);
        }
    }

    Err(AdfError::NotFoundInArchive(adf_filename.to_string()))
}

impl ADF {
    /// A zero-filled image.
    pub fn blank() -> Self {
        ADF {
            data: vec![0; ADF_SIZE],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != ADF_SIZE {
            return Err(AdfError::InvalidImageSize {
                expected: ADF_SIZE,
                actual: data.len(),
            });
        }
        Ok(ADF {
            data: data.to_vec(),
        })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::with_capacity(ADF_SIZE);
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.data)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_per_sector(&self) -> usize {
        ADF_SECTOR_SIZE
    }

    pub fn num_sectors(&self) -> u32 {
        ADF_NUM_SECTORS
    }

    /// Validates a block number read from disk before it is followed.
    pub fn check_block(&self, sector: u32) -> Result<u32> {
        if sector < ADF_NUM_SECTORS {
            Ok(sector)
        } else {
            Err(AdfError::InvalidBlockNumber(sector))
        }
    }

    pub fn sector(&self, sector: u32) -> Result<&[u8]> {
        let sector = self.check_block(sector)?;
        Ok(&self.data[Self::sector_range(sector)])
    }

    pub fn sector_mut(&mut self, sector: u32) -> Result<&mut [u8]> {
        let sector = self.check_block(sector)?;
        Ok(&mut self.data[Self::sector_range(sector)])
    }

    pub fn write_sector(&mut self, sector: u32, data: &[u8]) -> Result<()> {
        if data.len() != ADF_SECTOR_SIZE {
            return Err(AdfError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Invalid sector data size",
            )));
        }
        self.sector_mut(sector)?.copy_from_slice(data);
        Ok(())
    }

    pub fn byte(&self, sector: u32, offset: usize) -> Result<u8> {
        self.sector(sector)?
            .get(offset)
            .copied()
            .ok_or(AdfError::InvalidBlockNumber(sector))
    }

    pub fn set_byte(&mut self, sector: u32, offset: usize, value: u8) -> Result<()> {
        let slot = self
            .sector_mut(sector)?
            .get_mut(offset)
            .ok_or(AdfError::InvalidBlockNumber(sector))?;
        *slot = value;
        Ok(())
    }

    pub fn int32_at(&self, sector: u32, offset: usize) -> Result<u32> {
        let bytes = self.sector(sector)?;
        bytes
            .get(offset..offset + 4)
            .map(BigEndian::read_u32)
            .ok_or(AdfError::InvalidBlockNumber(sector))
    }

    fn sector_range(sector: u32) -> Range<usize> {
        let offset = sector as usize * ADF_SECTOR_SIZE;
        offset..offset + ADF_SECTOR_SIZE
    }

    // Unchecked accessors for blocks whose numbers were validated when they
    // were allocated or followed. An out of range access is a bug.

    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    pub(crate) fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.data[range]
    }

    pub(crate) fn block_bytes(&self, block: u32, range: Range<usize>) -> &[u8] {
        let base = block as usize * ADF_SECTOR_SIZE;
        &self.data[base + range.start..base + range.end]
    }

    pub(crate) fn block_bytes_mut(&mut self, block: u32, range: Range<usize>) -> &mut [u8] {
        let base = block as usize * ADF_SECTOR_SIZE;
        &mut self.data[base + range.start..base + range.end]
    }

    pub(crate) fn read_u32(&self, block: u32, offset: usize) -> u32 {
        BigEndian::read_u32(self.block_bytes(block, offset..offset + 4))
    }

    pub(crate) fn write_u32(&mut self, block: u32, offset: usize, value: u32) {
        BigEndian::write_u32(self.block_bytes_mut(block, offset..offset + 4), value);
    }

    pub(crate) fn read_u8(&self, block: u32, offset: usize) -> u8 {
        self.data[block as usize * ADF_SECTOR_SIZE + offset]
    }

    pub(crate) fn write_u8(&mut self, block: u32, offset: usize, value: u8) {
        self.data[block as usize * ADF_SECTOR_SIZE + offset] = value;
    }

    pub(crate) fn clear_block(&mut self, block: u32) {
        self.block_bytes_mut(block, 0..ADF_SECTOR_SIZE).fill(0);
    }

    /// Raw bytes of a length prefixed string (BCPL style) at `offset`.
    pub(crate) fn bstr_bytes(&self, block: u32, offset: usize, max: usize) -> &[u8] {
        let len = (self.read_u8(block, offset) as usize).min(max);
        self.block_bytes(block, offset + 1..offset + 1 + len)
    }

    pub(crate) fn read_bstr(&self, block: u32, offset: usize, max: usize) -> String {
        decode_latin1(self.bstr_bytes(block, offset, max))
    }

    /// Writes a length prefixed string, zeroing the unused tail of the field.
    /// The caller encodes and validates the length.
    pub(crate) fn write_bstr(&mut self, block: u32, offset: usize, max: usize, bytes: &[u8]) {
        self.write_u8(block, offset, bytes.len() as u8);
        let field = self.block_bytes_mut(block, offset + 1..offset + 1 + max);
        field.fill(0);
        field[..bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_image_size() {
        let err = ADF::from_bytes(&[0u8; 1024]).unwrap_err();
        assert!(matches!(
            err,
            AdfError::InvalidImageSize {
                expected: ADF_SIZE,
                actual: 1024
            }
        ));
    }

    #[test]
    fn sector_access_is_bounds_checked() {
        let mut adf = ADF::blank();
        assert!(adf.sector(ADF_NUM_SECTORS - 1).is_ok());
        assert!(matches!(
            adf.sector(ADF_NUM_SECTORS),
            Err(AdfError::InvalidBlockNumber(1760))
        ));
        assert!(adf.byte(3, ADF_SECTOR_SIZE).is_err());
        assert!(adf.int32_at(3, ADF_SECTOR_SIZE - 2).is_err());
        adf.set_byte(3, 7, 0x2a).unwrap();
        assert_eq!(adf.byte(3, 7).unwrap(), 0x2a);
        assert_eq!(adf.int32_at(3, 4).unwrap(), 0x2a);
    }

    #[test]
    fn read_write_sector() {
        let mut adf = ADF::blank();
        let test_data = [42u8; ADF_SECTOR_SIZE];
        adf.write_sector(10, &test_data).unwrap();
        assert_eq!(adf.sector(10).unwrap(), &test_data[..]);
        assert!(adf.write_sector(10, &test_data[..100]).is_err());
    }

    #[test]
    fn stream_round_trip() {
        let mut adf = ADF::blank();
        adf.write_u32(100, 8, 0xdead_beef);
        let mut out = Vec::new();
        adf.write_to(&mut out).unwrap();
        assert_eq!(out.len(), ADF_SIZE);
        let back = ADF::from_reader(std::io::Cursor::new(out)).unwrap();
        assert_eq!(back, adf);
    }

    #[test]
    fn bstr_fields() {
        let mut adf = ADF::blank();
        adf.write_bstr(5, 432, 30, b"Workbench");
        assert_eq!(adf.read_u8(5, 432), 9);
        assert_eq!(adf.read_bstr(5, 432, 30), "Workbench");
        adf.write_bstr(5, 432, 30, b"WB");
        assert_eq!(adf.read_bstr(5, 432, 30), "WB");
        assert_eq!(adf.read_u8(5, 435), 0);
    }

    #[test]
    fn names_are_latin1() {
        assert_eq!(encode_latin1("Über"), Some(vec![0xDC, b'b', b'e', b'r']));
        assert_eq!(encode_latin1("\u{20ac}"), None);
        assert_eq!(decode_latin1(&[0xE9, b't', 0xE9]), "été");

        let mut adf = ADF::blank();
        adf.write_bstr(5, 432, 30, &[0xE9]);
        assert_eq!(adf.bstr_bytes(5, 432, 30), &[0xE9]);
        assert_eq!(adf.read_bstr(5, 432, 30), "é");
    }

    #[test]
    fn disk_type_parsing() {
        assert_eq!("ffs".parse::<DiskType>().unwrap(), DiskType::FFS);
        assert_eq!("OFS".parse::<DiskType>().unwrap(), DiskType::OFS);
        assert!("PFS".parse::<DiskType>().is_err());
    }
}
