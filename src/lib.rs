// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Read and modify Amiga Disk Files (880 KB double density, OFS and FFS).
//!
//! ```no_run
//! use adflib::{DiskType, FormatOptions, Volume};
//!
//! let mut volume = Volume::format(DiskType::FFS, "Work", FormatOptions::default())?;
//! let root = volume.root();
//! let docs = volume.create_directory(root, "Docs")?;
//! volume.create_file(docs, "readme", b"hello amiga")?;
//! volume.write_to_file("work.adf")?;
//! # Ok::<(), adflib::AdfError>(())
//! ```

pub mod bitmap;
pub mod checksum;
pub mod consts;
pub mod data;
pub mod datestamp;
pub mod disk;
pub mod entry;
pub mod error;
pub mod hash;
pub mod volume;

pub use datestamp::{Clock, DateStamp};
pub use disk::{load_adf_from_zip, DiskType, ADF};
pub use entry::Entry;
pub use error::{AdfError, Result};
pub use volume::{format_protection_flags, BitmapInfo, DiskInfo, FileInfo, FormatOptions, Volume};
