// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use thiserror::Error;

use crate::consts::{MAXCOMMENTLENGTH, MAXNAMELENGTH};

pub type Result<T> = std::result::Result<T, AdfError>;

#[derive(Debug, Error)]
pub enum AdfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("'{0}' not found in ZIP archive")]
    NotFoundInArchive(String),

    #[error("Invalid ADF size: expected {expected} bytes, got {actual} bytes")]
    InvalidImageSize { expected: usize, actual: usize },

    #[error("Unsupported filesystem (dostype {0:02x?})")]
    UnsupportedFilesystem([u8; 4]),

    #[error("Checksum mismatch in block {block}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        block: u32,
        stored: u32,
        computed: u32,
    },

    #[error("Unexpected block type in block {block}: type {block_type}, secondary type {sec_type:#x}")]
    UnexpectedBlockType {
        block: u32,
        block_type: u32,
        sec_type: u32,
    },

    #[error("Invalid block number: {0}")]
    InvalidBlockNumber(u32),

    #[error("Block {0} is already allocated")]
    AlreadyAllocated(u32),

    #[error("Bitmap disagrees with the directory tree for block {block} (marked allocated: {allocated})")]
    BitmapMismatch { block: u32, allocated: bool },

    #[error("Block {block} names block {found} as its parent, but is listed in directory {expected}")]
    ParentMismatch { block: u32, found: u32, expected: u32 },

    #[error("Device is full: {needed} blocks needed, {free} free")]
    DeviceFull { needed: usize, free: usize },

    #[error("Directory entry '{0}' not found")]
    DirectoryEntryNotFound(String),

    #[error("Directory entry '{0}' already exists")]
    EntryExists(String),

    #[error("Name '{0}' is longer than {MAXNAMELENGTH} bytes")]
    NameTooLong(String),

    #[error("Comment is longer than {MAXCOMMENTLENGTH} bytes")]
    CommentTooLong,

    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    #[error("'{0}' contains characters outside ISO-8859-1")]
    NotLatin1(String),

    #[error("Hash table size {0} in the root block is not supported")]
    InvalidHashTableSize(u32),

    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    #[error("'{0}' is not a file")]
    NotAFile(String),

    #[error("Operation '{0}' is not supported on the root block")]
    RootEntry(&'static str),

    #[error("Cannot move a directory into itself or one of its subdirectories")]
    InvalidMove,

    #[error("Hash chain starting in block {0} loops")]
    ChainLoop(u32),

    #[error("File in block {header} is truncated: {expected} bytes declared, {actual} available")]
    TruncatedFile {
        header: u32,
        expected: usize,
        actual: usize,
    },

    #[error("File in block {0} has data blocks beyond its declared size")]
    InconsistentBlockCount(u32),
}
