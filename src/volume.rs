// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! The logical volume: the only place where the image is mutated. Every
//! operation validates its preconditions first and leaves each touched block
//! with a correct checksum.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::Serialize;

use crate::bitmap::{BitmapBlock, BITMAP_BITS};
use crate::checksum::{self, ChecksumDomain};
use crate::consts::*;
use crate::data::{self, DataBlock};
use crate::datestamp::{Clock, DateStamp};
use crate::disk::{DiskType, ADF};
use crate::entry::{
    validate_name, Entry, FileExtensionBlock, FileHeaderBlock, RootBlock, UserDirectoryBlock,
};
use crate::error::{AdfError, Result};
use crate::hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatOptions {
    /// Sets the international flag in the boot block.
    pub international: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub block: u32,
    pub size: u32,
    pub is_dir: bool,
    pub protection: u32,
    pub comment: String,
    pub modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub filesystem: String,
    pub international: bool,
    pub disk_name: String,
    pub creation_date: Option<NaiveDateTime>,
    pub last_modification: Option<NaiveDateTime>,
    pub disk_size: u32,
    pub heads: u8,
    pub tracks: u8,
    pub sectors_per_track: u8,
    pub bytes_per_sector: u16,
    pub hash_table_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub used_blocks: u32,
}

impl std::fmt::Display for DiskInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let date = |d: &Option<NaiveDateTime>| {
            d.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Invalid date".to_string())
        };
        writeln!(f, "Filesystem: {}{}", self.filesystem, if self.international { " (INTL)" } else { "" })?;
        writeln!(f, "Disk Name: {}", self.disk_name)?;
        writeln!(f, "Creation Date: {}", date(&self.creation_date))?;
        writeln!(f, "Last Modification: {}", date(&self.last_modification))?;
        writeln!(f, "Disk Size: {} bytes", self.disk_size)?;
        writeln!(f, "Heads: {}", self.heads)?;
        writeln!(f, "Tracks: {}", self.tracks)?;
        writeln!(f, "Sectors per Track: {}", self.sectors_per_track)?;
        writeln!(f, "Bytes per Sector: {}", self.bytes_per_sector)?;
        writeln!(f, "Hash Table Size: {}", self.hash_table_size)?;
        write!(
            f,
            "Blocks: {} total, {} free, {} used",
            self.total_blocks, self.free_blocks, self.used_blocks
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BitmapInfo {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub used_blocks: u32,
    pub disk_usage_percentage: f32,
}

impl std::fmt::Display for BitmapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} blocks, {} free, {} used ({:.1}% full)",
            self.total_blocks, self.free_blocks, self.used_blocks, self.disk_usage_percentage
        )
    }
}

/// Renders protection bits as `hsparwed`. The upper four bits are set when
/// the flag applies, the lower four are set when the access is denied.
pub fn format_protection_flags(flags: u32) -> String {
    let mut result = String::with_capacity(8);
    result.push(if flags & 0x80 != 0 { 'h' } else { '-' });
    result.push(if flags & 0x40 != 0 { 's' } else { '-' });
    result.push(if flags & 0x20 != 0 { 'p' } else { '-' });
    result.push(if flags & 0x10 != 0 { 'a' } else { '-' });
    result.push(if flags & 0x08 == 0 { 'r' } else { '-' });
    result.push(if flags & 0x04 == 0 { 'w' } else { '-' });
    result.push(if flags & 0x02 == 0 { 'e' } else { '-' });
    result.push(if flags & 0x01 == 0 { 'd' } else { '-' });
    result
}

#[derive(Debug, Clone)]
pub struct Volume {
    disk: ADF,
    disk_type: DiskType,
    flags: u8,
    root: RootBlock,
    bitmap: BitmapBlock,
    clock: Clock,
}

impl Volume {
    /// Formats a blank image.
    pub fn format(disk_type: DiskType, name: &str, options: FormatOptions) -> Result<Self> {
        Self::format_with_clock(disk_type, name, options, Clock::System)
    }

    pub fn format_with_clock(
        disk_type: DiskType,
        name: &str,
        options: FormatOptions,
        clock: Clock,
    ) -> Result<Self> {
        validate_name(name)?;
        let mut flags = 0;
        if disk_type == DiskType::FFS {
            flags |= FSMASK_FFS;
        }
        if options.international {
            flags |= FSMASK_INTL;
        }

        let mut disk = ADF::blank();
        disk.bytes_mut(0..3).copy_from_slice(b"DOS");
        disk.write_u8(0, BOOT_FLAGS, flags);
        disk.write_u32(0, BOOT_ROOTBLOCK, ROOT_BLOCK);
        checksum::recompute(&mut disk, ChecksumDomain::Boot);

        let mut volume = Volume {
            disk,
            disk_type,
            flags,
            root: RootBlock::new(ROOT_BLOCK),
            bitmap: BitmapBlock::new(BITMAP_BLOCK),
            clock,
        };
        volume.bitmap.initialize(&mut volume.disk);
        let now = volume.clock.now();
        volume.root.initialize(&mut volume.disk, name, BITMAP_BLOCK, now)?;
        volume.allocate_at(ROOT_BLOCK)?;
        volume.allocate_at(BITMAP_BLOCK)?;
        info!("Formatted {} volume '{}'", disk_type, name);
        Ok(volume)
    }

    /// Mounts an existing image after checking its boot, root and bitmap
    /// blocks.
    pub fn open(disk: ADF) -> Result<Self> {
        let mut dostype = [0u8; 4];
        dostype.copy_from_slice(disk.bytes(BOOT_DOSTYPE..BOOT_DOSTYPE + 4));
        let flags = dostype[3];
        if &dostype[..3] != b"DOS" || flags > 7 || is_dircache(flags) {
            return Err(AdfError::UnsupportedFilesystem(dostype));
        }
        let disk_type = if is_ffs(flags) {
            DiskType::FFS
        } else {
            DiskType::OFS
        };
        checksum::ensure_valid(&disk, ChecksumDomain::Boot)?;

        let root = RootBlock::new(ROOT_BLOCK);
        root.verify(&disk)?;
        let table_size = root.hash_table_size(&disk);
        if table_size != HT_SIZE as u32 {
            return Err(AdfError::InvalidHashTableSize(table_size));
        }
        if !root.bitmap_valid(&disk) {
            warn!(
                "Bitmap of volume '{}' is not marked valid, free block counts may be wrong",
                root.name(&disk)
            );
        }
        let bitmap_blocks = root.bitmap_blocks(&disk);
        let bitmap = match bitmap_blocks.as_slice() {
            [block] => BitmapBlock::new(disk.check_block(*block)?),
            _ => return Err(AdfError::UnsupportedFilesystem(dostype)),
        };
        bitmap.verify(&disk)?;

        debug!("Opened {} volume '{}'", disk_type, root.name(&disk));
        Ok(Volume {
            disk,
            disk_type,
            flags,
            root,
            bitmap,
            clock: Clock::System,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(ADF::from_file(path)?)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn disk(&self) -> &ADF {
        &self.disk
    }

    pub fn into_disk(self) -> ADF {
        self.disk
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        self.disk.write_to(writer)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.disk.write_to_file(path)
    }

    // volume level information

    pub fn disk_type(&self) -> DiskType {
        self.disk_type
    }

    pub fn filesystem_type(&self) -> &'static str {
        self.disk_type.as_str()
    }

    pub fn is_international(&self) -> bool {
        is_intl(self.flags)
    }

    pub fn num_blocks_total(&self) -> u32 {
        ADF_NUM_SECTORS
    }

    pub fn num_free_blocks(&self) -> usize {
        self.bitmap.num_free(&self.disk)
    }

    pub fn num_used_blocks(&self) -> usize {
        BITMAP_BITS as usize - self.num_free_blocks()
    }

    pub fn bytes_per_data_block(&self) -> usize {
        data::bytes_per_data_block(self.disk_type)
    }

    pub fn name(&self) -> String {
        self.root.name(&self.disk)
    }

    pub fn creation_time(&self) -> DateStamp {
        self.root.creation_time(&self.disk)
    }

    pub fn last_modification_time(&self) -> DateStamp {
        self.root.disk_last_modification_time(&self.disk)
    }

    pub fn root_block(&self) -> RootBlock {
        self.root
    }

    pub fn bitmap_block(&self) -> BitmapBlock {
        self.bitmap
    }

    pub fn information(&self) -> DiskInfo {
        let free = self.num_free_blocks() as u32;
        DiskInfo {
            filesystem: self.filesystem_type().to_string(),
            international: self.is_international(),
            disk_name: self.name(),
            creation_date: self.creation_time().to_datetime(),
            last_modification: self.last_modification_time().to_datetime(),
            disk_size: ADF_SIZE as u32,
            heads: ADF_NUM_HEADS as u8,
            tracks: ADF_NUM_CYLINDERS as u8,
            sectors_per_track: ADF_SECTORS_PER_TRACK as u8,
            bytes_per_sector: ADF_SECTOR_SIZE as u16,
            hash_table_size: self.root.hash_table_size(&self.disk),
            total_blocks: ADF_NUM_SECTORS,
            free_blocks: free,
            used_blocks: BITMAP_BITS - free,
        }
    }

    pub fn bitmap_info(&self) -> BitmapInfo {
        let free = self.num_free_blocks() as u32;
        let used = BITMAP_BITS - free;
        BitmapInfo {
            total_blocks: BITMAP_BITS,
            free_blocks: free,
            used_blocks: used,
            disk_usage_percentage: (used as f64 / BITMAP_BITS as f64 * 100.0) as f32,
        }
    }

    // directory tree

    pub fn root(&self) -> Entry {
        Entry::Root(self.root)
    }

    pub fn list(&self, dir: Entry) -> Result<Vec<Entry>> {
        dir.entries(&self.disk)
    }

    pub fn find(&self, dir: Entry, name: &str) -> Result<Option<Entry>> {
        dir.find(&self.disk, name)
    }

    pub fn lookup(&self, dir: Entry, name: &str) -> Result<Entry> {
        self.find(dir, name)?
            .ok_or_else(|| AdfError::DirectoryEntryNotFound(name.to_string()))
    }

    /// Resolves a `/` separated path starting at the root directory.
    pub fn resolve(&self, path: &str) -> Result<Entry> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self.root(), |dir, part| self.lookup(dir, part))
    }

    pub fn entry_name(&self, entry: Entry) -> String {
        entry.name(&self.disk)
    }

    pub fn file_info(&self, entry: Entry) -> FileInfo {
        FileInfo {
            name: entry.name(&self.disk),
            block: entry.block(),
            size: entry.size(&self.disk),
            is_dir: entry.is_directory(),
            protection: entry.protection(&self.disk),
            comment: entry.comment(&self.disk),
            modified: entry.modification_time(&self.disk).to_datetime(),
        }
    }

    pub fn list_info(&self, dir: Entry) -> Result<Vec<FileInfo>> {
        Ok(self
            .list(dir)?
            .into_iter()
            .map(|entry| self.file_info(entry))
            .collect())
    }

    pub fn read_file(&self, entry: Entry) -> Result<Vec<u8>> {
        let header = entry
            .as_file()
            .ok_or_else(|| AdfError::NotAFile(entry.name(&self.disk)))?;
        data::read_file_data(&self.disk, self.disk_type, header)
    }

    pub fn write_file_to<W: Write>(&self, entry: Entry, mut writer: W) -> Result<()> {
        let contents = self.read_file(entry)?;
        writer.write_all(&contents)?;
        Ok(())
    }

    // allocation

    /// Claims the next free block in AmigaDOS search order.
    pub fn allocate(&mut self) -> Result<u32> {
        let block = self.bitmap.next_free(&self.disk)?;
        self.bitmap.allocate(&mut self.disk, block)?;
        Ok(block)
    }

    pub fn allocate_at(&mut self, block: u32) -> Result<()> {
        self.bitmap.allocate(&mut self.disk, block)
    }

    fn ensure_free(&self, needed: usize) -> Result<()> {
        let free = self.num_free_blocks();
        if needed > free {
            return Err(AdfError::DeviceFull { needed, free });
        }
        Ok(())
    }

    fn ensure_directory(&self, dir: Entry) -> Result<()> {
        if dir.is_file() {
            return Err(AdfError::NotADirectory(dir.name(&self.disk)));
        }
        Ok(())
    }

    /// Checks that `name` may be added to `parent`.
    fn ensure_insertable(&self, parent: Entry, name: &str) -> Result<()> {
        self.ensure_directory(parent)?;
        validate_name(name)?;
        if self.find(parent, name)?.is_some() {
            return Err(AdfError::EntryExists(name.to_string()));
        }
        Ok(())
    }

    /// Stamps a directory whose contents changed, and the disk as a whole.
    fn touch(&mut self, dir: Entry, now: DateStamp) {
        dir.update_last_access_time(&mut self.disk, now);
        self.root.update_disk_last_modification_time(&mut self.disk, now);
    }

    // mutation

    pub fn create_directory(&mut self, parent: Entry, name: &str) -> Result<Entry> {
        self.ensure_insertable(parent, name)?;
        self.ensure_free(1)?;

        let now = self.clock.now();
        let dir = UserDirectoryBlock::new(self.allocate()?);
        dir.initialize(&mut self.disk, parent.block(), name, now)?;
        hash::insert(&mut self.disk, parent.block(), dir.number())?;
        self.touch(parent, now);
        debug!("Created directory '{}' in block {}", name, dir.number());
        Ok(Entry::Directory(dir))
    }

    pub fn create_file(&mut self, parent: Entry, name: &str, contents: &[u8]) -> Result<Entry> {
        self.ensure_insertable(parent, name)?;
        let data_count = data::data_blocks_for(self.disk_type, contents.len());
        let extension_count = data::extension_blocks_for(data_count);
        self.ensure_free(1 + data_count + extension_count)?;
        // bounded by the disk size once the space check passed
        let size = contents.len() as u32;

        let now = self.clock.now();
        let header = FileHeaderBlock::new(self.allocate()?);
        let data_blocks = (0..data_count)
            .map(|_| self.allocate())
            .collect::<Result<Vec<_>>>()?;
        let extensions = (0..extension_count)
            .map(|_| self.allocate())
            .collect::<Result<Vec<_>>>()?;

        header.initialize(&mut self.disk, parent.block(), name, now)?;
        let chunks = contents.chunks(self.bytes_per_data_block());
        for (i, (chunk, &number)) in chunks.zip(&data_blocks).enumerate() {
            let next = data_blocks.get(i + 1).copied().unwrap_or(0);
            DataBlock::new(self.disk_type, number).write(
                &mut self.disk,
                header.number(),
                i as u32 + 1,
                chunk,
                next,
            );
        }
        self.write_block_table(header, &data_blocks, &extensions);
        header.set_file_size(&mut self.disk, size);
        header.set_first_data_block_number(&mut self.disk, data_blocks.first().copied().unwrap_or(0));
        Entry::File(header).recompute_checksum(&mut self.disk);

        hash::insert(&mut self.disk, parent.block(), header.number())?;
        self.touch(parent, now);
        debug!(
            "Created file '{}' in block {} ({} bytes, {} data blocks, {} extension blocks)",
            name,
            header.number(),
            size,
            data_count,
            extension_count
        );
        Ok(Entry::File(header))
    }

    /// Spreads the data block list over the header and its extension blocks.
    fn write_block_table(&mut self, header: FileHeaderBlock, data_blocks: &[u32], extensions: &[u32]) {
        let mut tables = data_blocks.chunks(MAX_DATABLOCK);
        if let Some(first) = tables.next() {
            for (i, &block) in first.iter().enumerate() {
                header.set_data_block(&mut self.disk, i, block);
            }
            header.set_block_count(&mut self.disk, first.len() as u32);
        }
        header.set_extension(&mut self.disk, extensions.first().copied().unwrap_or(0));

        for (i, (table, &number)) in tables.zip(extensions).enumerate() {
            let extension = FileExtensionBlock::new(number);
            extension.initialize(&mut self.disk, header.number());
            for (j, &block) in table.iter().enumerate() {
                extension.set_data_block(&mut self.disk, j, block);
            }
            extension.set_block_count(&mut self.disk, table.len() as u32);
            extension.set_extension(&mut self.disk, extensions.get(i + 1).copied().unwrap_or(0));
            checksum::recompute(&mut self.disk, ChecksumDomain::Block(number));
        }
    }

    /// Blocks owned by `entry`, children before their directory. Every entry
    /// may be reached once, and only from the directory its parent field
    /// names.
    fn owned_blocks(
        &self,
        entry: Entry,
        visited: &mut BTreeSet<u32>,
        blocks: &mut Vec<u32>,
    ) -> Result<()> {
        if !visited.insert(entry.block()) {
            return Err(AdfError::ChainLoop(entry.block()));
        }
        match entry {
            Entry::Root(_) => return Err(AdfError::RootEntry("remove")),
            Entry::File(header) => {
                blocks.extend(header.data_block_numbers(&self.disk)?);
                blocks.extend(
                    header
                        .extension_blocks(&self.disk)?
                        .iter()
                        .map(FileExtensionBlock::number),
                );
            }
            Entry::Directory(_) => {
                for child in entry.entries(&self.disk)? {
                    let parent = child.parent(&self.disk);
                    if parent != entry.block() {
                        return Err(AdfError::ParentMismatch {
                            block: child.block(),
                            found: parent,
                            expected: entry.block(),
                        });
                    }
                    self.owned_blocks(child, visited, blocks)?;
                }
            }
        }
        blocks.push(entry.block());
        Ok(())
    }

    pub fn remove_entry(&mut self, parent: Entry, name: &str) -> Result<()> {
        let entry = self.lookup(parent, name)?;
        let mut blocks = Vec::new();
        self.owned_blocks(entry, &mut BTreeSet::new(), &mut blocks)?;
        for &block in &blocks {
            if !(RESERVED_BLOCKS..ADF_NUM_SECTORS).contains(&block) {
                return Err(AdfError::InvalidBlockNumber(block));
            }
        }

        let now = self.clock.now();
        hash::unlink(&mut self.disk, parent.block(), entry.block())?;
        for &block in &blocks {
            self.bitmap.free(&mut self.disk, block)?;
        }
        self.touch(parent, now);
        debug!("Removed '{}' ({} blocks freed)", name, blocks.len());
        Ok(())
    }

    pub fn rename_entry(&mut self, parent: Entry, old_name: &str, new_name: &str) -> Result<()> {
        let entry = self.lookup(parent, old_name)?;
        validate_name(new_name)?;
        if old_name != new_name && self.find(parent, new_name)?.is_some() {
            return Err(AdfError::EntryExists(new_name.to_string()));
        }

        let now = self.clock.now();
        hash::unlink(&mut self.disk, parent.block(), entry.block())?;
        entry.set_name(&mut self.disk, new_name)?;
        hash::insert(&mut self.disk, parent.block(), entry.block())?;
        self.touch(parent, now);
        debug!("Renamed '{}' to '{}'", old_name, new_name);
        Ok(())
    }

    /// Moves `entry` from the directory its parent field names into `dest`.
    /// The parent field is rewritten to `dest`.
    pub fn move_entry(&mut self, entry: Entry, dest: Entry) -> Result<()> {
        if let Entry::Root(_) = entry {
            return Err(AdfError::RootEntry("move"));
        }
        self.ensure_directory(dest)?;
        let source = Entry::load(&self.disk, entry.parent(&self.disk))?;
        self.ensure_directory(source)?;

        let mut ancestor = dest;
        let mut depth = 0;
        while !matches!(ancestor, Entry::Root(_)) {
            if ancestor.block() == entry.block() {
                return Err(AdfError::InvalidMove);
            }
            depth += 1;
            if depth > ADF_NUM_SECTORS {
                return Err(AdfError::ChainLoop(dest.block()));
            }
            ancestor = Entry::load(&self.disk, ancestor.parent(&self.disk))?;
        }

        let name = entry.name(&self.disk);
        if let Some(existing) = self.find(dest, &name)? {
            if existing.block() == entry.block() {
                return Ok(());
            }
            return Err(AdfError::EntryExists(name));
        }

        let now = self.clock.now();
        hash::unlink(&mut self.disk, source.block(), entry.block())?;
        entry.set_parent(&mut self.disk, dest.block());
        hash::insert(&mut self.disk, dest.block(), entry.block())?;
        self.touch(source, now);
        self.touch(dest, now);
        debug!(
            "Moved '{}' from block {} to block {}",
            name,
            source.block(),
            dest.block()
        );
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.root.rename(&mut self.disk, name)?;
        let now = self.clock.now();
        self.root.update_disk_last_modification_time(&mut self.disk, now);
        Ok(())
    }

    pub fn set_comment(&mut self, entry: Entry, comment: &str) -> Result<()> {
        entry.set_comment(&mut self.disk, comment)?;
        let now = self.clock.now();
        self.root.update_disk_last_modification_time(&mut self.disk, now);
        Ok(())
    }

    pub fn set_protection(&mut self, entry: Entry, protection: u32) -> Result<()> {
        entry.set_protection(&mut self.disk, protection)?;
        let now = self.clock.now();
        self.root.update_disk_last_modification_time(&mut self.disk, now);
        Ok(())
    }

    /// Verifies every checksum reachable from the root, the parent field of
    /// every entry and that the bitmap marks exactly the reachable blocks.
    pub fn check(&self) -> Result<()> {
        checksum::ensure_valid(&self.disk, ChecksumDomain::Boot)?;
        self.root.verify(&self.disk)?;
        self.bitmap.verify(&self.disk)?;

        let mut reachable = BTreeSet::from([self.root.number(), self.bitmap.number()]);
        let mut pending = vec![self.root()];
        while let Some(dir) = pending.pop() {
            for child in dir.entries(&self.disk)? {
                let parent = child.parent(&self.disk);
                if parent != dir.block() {
                    return Err(AdfError::ParentMismatch {
                        block: child.block(),
                        found: parent,
                        expected: dir.block(),
                    });
                }
                if !reachable.insert(child.block()) {
                    return Err(AdfError::ChainLoop(child.block()));
                }
                match child {
                    Entry::File(header) => {
                        self.read_file(child)?;
                        reachable.extend(header.data_block_numbers(&self.disk)?);
                        reachable.extend(
                            header
                                .extension_blocks(&self.disk)?
                                .iter()
                                .map(FileExtensionBlock::number),
                        );
                    }
                    _ => pending.push(child),
                }
            }
        }

        for block in RESERVED_BLOCKS..ADF_NUM_SECTORS {
            let allocated = self.bitmap.is_allocated(&self.disk, block)?;
            if allocated != reachable.contains(&block) {
                return Err(AdfError::BitmapMismatch { block, allocated });
            }
        }
        Ok(())
    }
}
