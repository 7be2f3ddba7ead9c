// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Geometry and on-disk layout of a double density AmigaDOS floppy.

// disk geometry
pub const ADF_SECTOR_SIZE: usize = 512;
pub const ADF_SECTORS_PER_TRACK: usize = 11;
pub const ADF_TRACK_SIZE: usize = ADF_SECTORS_PER_TRACK * ADF_SECTOR_SIZE;
pub const ADF_NUM_CYLINDERS: usize = 80;
pub const ADF_NUM_HEADS: usize = 2;
pub const ADF_NUM_TRACKS: usize = ADF_NUM_CYLINDERS * ADF_NUM_HEADS;
pub const ADF_NUM_SECTORS: u32 = (ADF_NUM_TRACKS * ADF_SECTORS_PER_TRACK) as u32;
pub const ADF_SIZE: usize = ADF_TRACK_SIZE * ADF_NUM_TRACKS;

pub const BOOT_BLOCK_SIZE: usize = 2 * ADF_SECTOR_SIZE;
pub const ROOT_BLOCK: u32 = 880;
pub const BITMAP_BLOCK: u32 = ROOT_BLOCK + 1;
/// Blocks 0 and 1 hold the boot block and are not tracked by the bitmap.
pub const RESERVED_BLOCKS: u32 = 2;

// file system flags, stored in the fourth byte of the boot block
pub const FSMASK_FFS: u8 = 1;
pub const FSMASK_INTL: u8 = 2;
pub const FSMASK_DIRCACHE: u8 = 4;

pub const MAXNAMELENGTH: usize = 30;
pub const MAXCOMMENTLENGTH: usize = 79;
pub const HT_SIZE: usize = 72;
pub const BM_SIZE: usize = 25;
pub const MAX_DATABLOCK: usize = 72;
pub const BM_VALID: u32 = 0xFFFF_FFFF;

// block types
pub const T_HEADER: u32 = 2;
pub const T_DATA: u32 = 8;
pub const T_LIST: u32 = 16;

// secondary types
pub const ST_ROOT: u32 = 1;
pub const ST_DIR: u32 = 2;
pub const ST_FILE: u32 = -3i32 as u32;

// boot block
pub const BOOT_DOSTYPE: usize = 0;
pub const BOOT_FLAGS: usize = 3;
pub const BOOT_CHECKSUM: usize = 4;
pub const BOOT_ROOTBLOCK: usize = 8;

// header, directory and file header blocks
pub const BLK_TYPE: usize = 0;
pub const BLK_HEADER_KEY: usize = 4;
pub const BLK_HIGH_SEQ: usize = 8;
pub const BLK_HT_SIZE: usize = 12;
pub const BLK_FIRST_DATA: usize = 16;
pub const BLK_CHECKSUM: usize = 20;
pub const BLK_TABLE: usize = 24;
pub const BLK_PROTECT: usize = 320;
pub const BLK_BYTE_SIZE: usize = 324;
pub const BLK_COMMENT: usize = 328;
pub const BLK_DATE: usize = 420;
pub const BLK_NAME: usize = 432;
pub const BLK_HASH_CHAIN: usize = 496;
pub const BLK_PARENT: usize = 500;
pub const BLK_EXTENSION: usize = 504;
pub const BLK_SEC_TYPE: usize = 508;

// root block only
pub const ROOT_BM_FLAG: usize = 312;
pub const ROOT_BM_PAGES: usize = 316;
pub const ROOT_DISK_DATE: usize = 472;
pub const ROOT_CREATION_DATE: usize = 484;

// OFS data blocks
pub const DATA_HEADER_KEY: usize = 4;
pub const DATA_SEQ_NUM: usize = 8;
pub const DATA_SIZE: usize = 12;
pub const DATA_NEXT: usize = 16;
pub const OFS_HEADER_SIZE: usize = 24;
pub const OFS_DATA_BYTES: usize = ADF_SECTOR_SIZE - OFS_HEADER_SIZE;
pub const FFS_DATA_BYTES: usize = ADF_SECTOR_SIZE;

// bitmap block
pub const BM_CHECKSUM: usize = 0;
pub const BM_MAP: usize = 4;

pub fn is_ffs(c: u8) -> bool {
    (c & FSMASK_FFS) != 0
}

pub fn is_intl(c: u8) -> bool {
    (c & FSMASK_INTL) != 0
}

pub fn is_dircache(c: u8) -> bool {
    (c & FSMASK_DIRCACHE) != 0
}
