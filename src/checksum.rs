// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Additive complement checksum shared by boot, root, bitmap, header,
//! extension and OFS data blocks.

use byteorder::{BigEndian, ByteOrder};
use log::{trace, warn};

use crate::consts::{
    ADF_SECTOR_SIZE, BLK_CHECKSUM, BM_CHECKSUM, BOOT_BLOCK_SIZE, BOOT_CHECKSUM,
};
use crate::disk::ADF;
use crate::error::{AdfError, Result};

/// Which bytes a checksum covers and where it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumDomain {
    /// Sectors 0 and 1, checksum at byte 4.
    Boot,
    /// A bitmap block, checksum at byte 0.
    Bitmap(u32),
    /// Root, directory, file header, extension or OFS data block, checksum
    /// at byte 20.
    Block(u32),
}

impl ChecksumDomain {
    pub fn block(&self) -> u32 {
        match self {
            ChecksumDomain::Boot => 0,
            ChecksumDomain::Bitmap(block) | ChecksumDomain::Block(block) => *block,
        }
    }

    fn range(&self) -> std::ops::Range<usize> {
        match self {
            ChecksumDomain::Boot => 0..BOOT_BLOCK_SIZE,
            ChecksumDomain::Bitmap(block) | ChecksumDomain::Block(block) => {
                let base = *block as usize * ADF_SECTOR_SIZE;
                base..base + ADF_SECTOR_SIZE
            }
        }
    }

    fn field(&self) -> usize {
        match self {
            ChecksumDomain::Boot => BOOT_CHECKSUM,
            ChecksumDomain::Bitmap(_) => BM_CHECKSUM,
            ChecksumDomain::Block(_) => BLK_CHECKSUM,
        }
    }
}

/// Wrapping add reporting whether the sum carried out of 32 bits.
fn add(a: u32, b: u32) -> (u32, bool) {
    let sum = a.wrapping_add(b);
    (sum, sum < a.max(b))
}

/// Folds every big endian word of `data` except the one at `field` with
/// end-around carry, and returns the complement.
pub fn compute(data: &[u8], field: usize) -> u32 {
    let mut sum = 0u32;
    for (i, word) in data.chunks_exact(4).enumerate() {
        if i * 4 == field {
            continue;
        }
        let (next, carry) = add(sum, BigEndian::read_u32(word));
        sum = if carry { next.wrapping_add(1) } else { next };
    }
    !sum
}

pub fn stored(disk: &ADF, domain: ChecksumDomain) -> u32 {
    let field = domain.range().start + domain.field();
    BigEndian::read_u32(disk.bytes(field..field + 4))
}

pub fn calculate(disk: &ADF, domain: ChecksumDomain) -> u32 {
    compute(disk.bytes(domain.range()), domain.field())
}

pub fn recompute(disk: &mut ADF, domain: ChecksumDomain) {
    let checksum = calculate(disk, domain);
    let field = domain.range().start + domain.field();
    BigEndian::write_u32(disk.bytes_mut(field..field + 4), checksum);
    trace!("Checksum of block {} set to {:#010x}", domain.block(), checksum);
}

pub fn verify(disk: &ADF, domain: ChecksumDomain) -> bool {
    stored(disk, domain) == calculate(disk, domain)
}

/// Like [`verify`] but reports a mismatch as an error.
pub fn ensure_valid(disk: &ADF, domain: ChecksumDomain) -> Result<()> {
    let stored = stored(disk, domain);
    let computed = calculate(disk, domain);
    if stored == computed {
        return Ok(());
    }
    warn!(
        "Checksum mismatch in block {}: stored {:#010x}, computed {:#010x}",
        domain.block(),
        stored,
        computed
    );
    Err(AdfError::ChecksumMismatch {
        block: domain.block(),
        stored,
        computed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_reports_carry() {
        assert_eq!(add(1, 2), (3, false));
        assert_eq!(add(0xFFFF_FFFF, 1), (0, true));
        assert_eq!(add(0x8000_0000, 0x8000_0001), (1, true));
        assert_eq!(add(0, 0), (0, false));
    }

    #[test]
    fn end_around_carry() {
        // 0xFFFFFFFF + 0x00000002 = 0x1_00000001 -> 0x00000002 after carry
        let mut data = [0u8; 12];
        data[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        data[8..12].copy_from_slice(&2u32.to_be_bytes());
        assert_eq!(compute(&data, 0), !2u32);
    }

    #[test]
    fn checksum_field_is_skipped() {
        let mut data = [0u8; 16];
        data[0..4].copy_from_slice(&7u32.to_be_bytes());
        data[4..8].copy_from_slice(&0xABCD_0000u32.to_be_bytes());
        let first = compute(&data, 4);
        data[4..8].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        assert_eq!(compute(&data, 4), first);
        assert_eq!(first, !7u32);
    }

    #[test]
    fn recompute_then_verify() {
        let mut adf = ADF::blank();
        adf.write_u32(0, 0, u32::from_be_bytes(*b"DOS\0"));
        adf.write_u32(0, 8, 880);
        adf.write_u32(1, 100, 0xFFFF_0000);
        adf.write_u32(881, 4, 0xFFFF_FFFE);
        adf.write_u32(900, 0, 2);
        adf.write_u32(900, 300, 0x8000_0000);

        for domain in [
            ChecksumDomain::Boot,
            ChecksumDomain::Bitmap(881),
            ChecksumDomain::Block(900),
        ] {
            assert!(!verify(&adf, domain));
            recompute(&mut adf, domain);
            assert!(verify(&adf, domain));
            assert!(ensure_valid(&adf, domain).is_ok());
        }
    }

    #[test]
    fn corruption_is_reported() {
        let mut adf = ADF::blank();
        adf.write_u32(900, 0, 2);
        recompute(&mut adf, ChecksumDomain::Block(900));
        adf.write_u8(900, 100, 1);
        assert!(matches!(
            ensure_valid(&adf, ChecksumDomain::Block(900)),
            Err(AdfError::ChecksumMismatch { block: 900, .. })
        ));
    }
}
