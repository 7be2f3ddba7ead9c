// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Free space tracking in the single bitmap block of a DD floppy.
//!
//! Bit `n - 2` (LSB first inside each big endian long) describes block `n`;
//! a set bit means the block is free.

use log::debug;

use crate::checksum::{self, ChecksumDomain};
use crate::consts::{ADF_NUM_SECTORS, BM_MAP, RESERVED_BLOCKS, ROOT_BLOCK};
use crate::disk::ADF;
use crate::error::{AdfError, Result};

/// Number of blocks tracked by the bitmap.
pub const BITMAP_BITS: u32 = ADF_NUM_SECTORS - RESERVED_BLOCKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapBlock {
    number: u32,
}

impl BitmapBlock {
    pub fn new(number: u32) -> Self {
        BitmapBlock { number }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Clears the block and marks every tracked block free.
    pub fn initialize(&self, disk: &mut ADF) {
        disk.clear_block(self.number);
        for bit in 0..BITMAP_BITS {
            let (offset, mask) = Self::locate_bit(bit);
            let word = disk.read_u32(self.number, offset);
            disk.write_u32(self.number, offset, word | mask);
        }
        checksum::recompute(disk, ChecksumDomain::Bitmap(self.number));
    }

    pub fn verify(&self, disk: &ADF) -> Result<()> {
        checksum::ensure_valid(disk, ChecksumDomain::Bitmap(self.number))
    }

    fn locate_bit(bit: u32) -> (usize, u32) {
        (BM_MAP + (bit / 32) as usize * 4, 1 << (bit % 32))
    }

    fn locate(block: u32) -> Result<(usize, u32)> {
        if !(RESERVED_BLOCKS..ADF_NUM_SECTORS).contains(&block) {
            return Err(AdfError::InvalidBlockNumber(block));
        }
        Ok(Self::locate_bit(block - RESERVED_BLOCKS))
    }

    fn is_free_unchecked(&self, disk: &ADF, block: u32) -> bool {
        let (offset, mask) = Self::locate_bit(block - RESERVED_BLOCKS);
        disk.read_u32(self.number, offset) & mask != 0
    }

    pub fn is_allocated(&self, disk: &ADF, block: u32) -> Result<bool> {
        let (offset, mask) = Self::locate(block)?;
        Ok(disk.read_u32(self.number, offset) & mask == 0)
    }

    pub fn allocate(&self, disk: &mut ADF, block: u32) -> Result<()> {
        let (offset, mask) = Self::locate(block)?;
        let word = disk.read_u32(self.number, offset);
        if word & mask == 0 {
            return Err(AdfError::AlreadyAllocated(block));
        }
        disk.write_u32(self.number, offset, word & !mask);
        checksum::recompute(disk, ChecksumDomain::Bitmap(self.number));
        debug!("Allocated block {}", block);
        Ok(())
    }

    pub fn free(&self, disk: &mut ADF, block: u32) -> Result<()> {
        let (offset, mask) = Self::locate(block)?;
        let word = disk.read_u32(self.number, offset);
        disk.write_u32(self.number, offset, word | mask);
        checksum::recompute(disk, ChecksumDomain::Bitmap(self.number));
        debug!("Freed block {}", block);
        Ok(())
    }

    /// First free block above the root block, falling back to the range
    /// below it.
    pub fn next_free(&self, disk: &ADF) -> Result<u32> {
        (ROOT_BLOCK + 1..ADF_NUM_SECTORS)
            .chain(RESERVED_BLOCKS..ROOT_BLOCK)
            .find(|&block| self.is_free_unchecked(disk, block))
            .ok_or(AdfError::DeviceFull { needed: 1, free: 0 })
    }

    pub fn free_block_numbers(&self, disk: &ADF) -> Vec<u32> {
        (RESERVED_BLOCKS..ADF_NUM_SECTORS)
            .filter(|&block| self.is_free_unchecked(disk, block))
            .collect()
    }

    pub fn used_block_numbers(&self, disk: &ADF) -> Vec<u32> {
        (RESERVED_BLOCKS..ADF_NUM_SECTORS)
            .filter(|&block| !self.is_free_unchecked(disk, block))
            .collect()
    }

    pub fn num_free(&self, disk: &ADF) -> usize {
        (RESERVED_BLOCKS..ADF_NUM_SECTORS)
            .filter(|&block| self.is_free_unchecked(disk, block))
            .count()
    }
}
