// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Header blocks: the root block, user directories, file headers and file
//! extension blocks. Every type here is a block number into an [`ADF`];
//! accessors borrow the image for the duration of the call.

use log::trace;

use crate::checksum::{self, ChecksumDomain};
use crate::consts::*;
use crate::datestamp::DateStamp;
use crate::disk::{encode_latin1, ADF};
use crate::error::{AdfError, Result};
use crate::hash;

/// Checks a name and returns its on-disk (ISO-8859-1) bytes.
pub fn validate_name(name: &str) -> Result<Vec<u8>> {
    let bytes = encode_latin1(name).ok_or_else(|| AdfError::NotLatin1(name.to_string()))?;
    if bytes.len() > MAXNAMELENGTH {
        return Err(AdfError::NameTooLong(name.to_string()));
    }
    if bytes.is_empty() || bytes.contains(&b'/') || bytes.contains(&b':') {
        return Err(AdfError::InvalidName(name.to_string()));
    }
    Ok(bytes)
}

pub fn validate_comment(comment: &str) -> Result<Vec<u8>> {
    let bytes = encode_latin1(comment).ok_or_else(|| AdfError::NotLatin1(comment.to_string()))?;
    if bytes.len() > MAXCOMMENTLENGTH {
        return Err(AdfError::CommentTooLong);
    }
    Ok(bytes)
}

/// Writes the fields every header block starts and ends with.
fn write_header(disk: &mut ADF, block: u32, block_type: u32, header_key: u32, sec_type: u32) {
    disk.clear_block(block);
    disk.write_u32(block, BLK_TYPE, block_type);
    disk.write_u32(block, BLK_HEADER_KEY, header_key);
    disk.write_u32(block, BLK_SEC_TYPE, sec_type);
}

// data block table shared by file headers and extension blocks; the first
// pointer lives in the last slot
fn table_offset(index: usize) -> usize {
    BLK_TABLE + (MAX_DATABLOCK - 1 - index) * 4
}

fn table_entries(disk: &ADF, block: u32) -> Vec<u32> {
    let count = (disk.read_u32(block, BLK_HIGH_SEQ) as usize).min(MAX_DATABLOCK);
    (0..count)
        .map(|i| disk.read_u32(block, table_offset(i)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootBlock {
    number: u32,
}

impl RootBlock {
    pub fn new(number: u32) -> Self {
        RootBlock { number }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn initialize(&self, disk: &mut ADF, name: &str, bitmap: u32, now: DateStamp) -> Result<()> {
        let name = validate_name(name)?;
        write_header(disk, self.number, T_HEADER, 0, ST_ROOT);
        disk.write_u32(self.number, BLK_HT_SIZE, HT_SIZE as u32);
        disk.write_u32(self.number, ROOT_BM_FLAG, BM_VALID);
        disk.write_u32(self.number, ROOT_BM_PAGES, bitmap);
        now.write(disk, self.number, BLK_DATE);
        now.write(disk, self.number, ROOT_DISK_DATE);
        now.write(disk, self.number, ROOT_CREATION_DATE);
        disk.write_bstr(self.number, BLK_NAME, MAXNAMELENGTH, &name);
        checksum::recompute(disk, ChecksumDomain::Block(self.number));
        Ok(())
    }

    pub fn verify(&self, disk: &ADF) -> Result<()> {
        checksum::ensure_valid(disk, ChecksumDomain::Block(self.number))?;
        let block_type = disk.read_u32(self.number, BLK_TYPE);
        let sec_type = disk.read_u32(self.number, BLK_SEC_TYPE);
        if block_type != T_HEADER || sec_type != ST_ROOT {
            return Err(AdfError::UnexpectedBlockType {
                block: self.number,
                block_type,
                sec_type,
            });
        }
        Ok(())
    }

    pub fn name(&self, disk: &ADF) -> String {
        disk.read_bstr(self.number, BLK_NAME, MAXNAMELENGTH)
    }

    pub fn rename(&self, disk: &mut ADF, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        disk.write_bstr(self.number, BLK_NAME, MAXNAMELENGTH, &name);
        checksum::recompute(disk, ChecksumDomain::Block(self.number));
        Ok(())
    }

    pub fn hash_table_size(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_HT_SIZE)
    }

    pub fn hashtable_entries(&self, disk: &ADF) -> Result<Vec<u32>> {
        hash::entries(disk, self.number)
    }

    pub fn block_number_for_name(&self, disk: &ADF, name: &str) -> Result<Option<u32>> {
        hash::find(disk, self.number, name)
    }

    pub fn block_for_name(&self, disk: &ADF, name: &str) -> Result<Option<Entry>> {
        self.block_number_for_name(disk, name)?
            .map(|block| Entry::load(disk, block))
            .transpose()
    }

    pub fn bitmap_valid(&self, disk: &ADF) -> bool {
        disk.read_u32(self.number, ROOT_BM_FLAG) == BM_VALID
    }

    pub fn bitmap_blocks(&self, disk: &ADF) -> Vec<u32> {
        (0..BM_SIZE)
            .map(|i| disk.read_u32(self.number, ROOT_BM_PAGES + i * 4))
            .take_while(|&block| block != 0)
            .collect()
    }

    pub fn creation_time(&self, disk: &ADF) -> DateStamp {
        DateStamp::read(disk, self.number, ROOT_CREATION_DATE)
    }

    pub fn last_modification_time(&self, disk: &ADF) -> DateStamp {
        DateStamp::read(disk, self.number, BLK_DATE)
    }

    pub fn disk_last_modification_time(&self, disk: &ADF) -> DateStamp {
        DateStamp::read(disk, self.number, ROOT_DISK_DATE)
    }

    pub fn update_disk_last_modification_time(&self, disk: &mut ADF, now: DateStamp) {
        now.write(disk, self.number, ROOT_DISK_DATE);
        checksum::recompute(disk, ChecksumDomain::Block(self.number));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserDirectoryBlock {
    number: u32,
}

impl UserDirectoryBlock {
    pub fn new(number: u32) -> Self {
        UserDirectoryBlock { number }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Header key, secondary type "directory" and an empty hash table.
    pub fn initialize(&self, disk: &mut ADF, parent: u32, name: &str, now: DateStamp) -> Result<()> {
        let name = validate_name(name)?;
        write_header(disk, self.number, T_HEADER, self.number, ST_DIR);
        disk.write_bstr(self.number, BLK_NAME, MAXNAMELENGTH, &name);
        disk.write_u32(self.number, BLK_PARENT, parent);
        now.write(disk, self.number, BLK_DATE);
        checksum::recompute(disk, ChecksumDomain::Block(self.number));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHeaderBlock {
    number: u32,
}

impl FileHeaderBlock {
    pub fn new(number: u32) -> Self {
        FileHeaderBlock { number }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn initialize(&self, disk: &mut ADF, parent: u32, name: &str, now: DateStamp) -> Result<()> {
        let name = validate_name(name)?;
        write_header(disk, self.number, T_HEADER, self.number, ST_FILE);
        disk.write_bstr(self.number, BLK_NAME, MAXNAMELENGTH, &name);
        disk.write_u32(self.number, BLK_PARENT, parent);
        now.write(disk, self.number, BLK_DATE);
        checksum::recompute(disk, ChecksumDomain::Block(self.number));
        Ok(())
    }

    pub fn file_size(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_BYTE_SIZE)
    }

    pub fn set_file_size(&self, disk: &mut ADF, size: u32) {
        disk.write_u32(self.number, BLK_BYTE_SIZE, size);
    }

    /// Number of data block pointers stored in this header.
    pub fn block_count(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_HIGH_SEQ)
    }

    pub fn set_block_count(&self, disk: &mut ADF, count: u32) {
        disk.write_u32(self.number, BLK_HIGH_SEQ, count);
    }

    pub fn first_data_block_number(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_FIRST_DATA)
    }

    pub fn set_first_data_block_number(&self, disk: &mut ADF, block: u32) {
        disk.write_u32(self.number, BLK_FIRST_DATA, block);
    }

    pub fn data_block(&self, disk: &ADF, index: usize) -> u32 {
        disk.read_u32(self.number, table_offset(index))
    }

    pub fn set_data_block(&self, disk: &mut ADF, index: usize, block: u32) {
        disk.write_u32(self.number, table_offset(index), block);
    }

    pub fn extension(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_EXTENSION)
    }

    pub fn set_extension(&self, disk: &mut ADF, block: u32) {
        disk.write_u32(self.number, BLK_EXTENSION, block);
    }

    /// Extension blocks in chain order, each checked before it is followed.
    pub fn extension_blocks(&self, disk: &ADF) -> Result<Vec<FileExtensionBlock>> {
        let mut blocks = Vec::new();
        let mut current = self.extension(disk);
        while current != 0 {
            disk.check_block(current)?;
            if blocks.len() >= ADF_NUM_SECTORS as usize {
                return Err(AdfError::ChainLoop(self.number));
            }
            let extension = FileExtensionBlock::new(current);
            extension.verify(disk)?;
            blocks.push(extension);
            current = extension.extension(disk);
        }
        Ok(blocks)
    }

    /// Declared data block numbers in file order, including those stored in
    /// extension blocks.
    pub fn data_block_numbers(&self, disk: &ADF) -> Result<Vec<u32>> {
        let mut blocks = table_entries(disk, self.number);
        for extension in self.extension_blocks(disk)? {
            blocks.extend(table_entries(disk, extension.number()));
        }
        for &block in &blocks {
            disk.check_block(block)?;
        }
        Ok(blocks)
    }

    pub fn update_last_access_time(&self, disk: &mut ADF, now: DateStamp) {
        now.write(disk, self.number, BLK_DATE);
        checksum::recompute(disk, ChecksumDomain::Block(self.number));
    }
}

/// Overflow table for files with more than [`MAX_DATABLOCK`] data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileExtensionBlock {
    number: u32,
}

impl FileExtensionBlock {
    pub fn new(number: u32) -> Self {
        FileExtensionBlock { number }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn initialize(&self, disk: &mut ADF, header: u32) {
        write_header(disk, self.number, T_LIST, self.number, ST_FILE);
        disk.write_u32(self.number, BLK_PARENT, header);
    }

    pub fn verify(&self, disk: &ADF) -> Result<()> {
        checksum::ensure_valid(disk, ChecksumDomain::Block(self.number))?;
        let block_type = disk.read_u32(self.number, BLK_TYPE);
        let sec_type = disk.read_u32(self.number, BLK_SEC_TYPE);
        if block_type != T_LIST || sec_type != ST_FILE {
            return Err(AdfError::UnexpectedBlockType {
                block: self.number,
                block_type,
                sec_type,
            });
        }
        Ok(())
    }

    pub fn block_count(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_HIGH_SEQ)
    }

    pub fn set_block_count(&self, disk: &mut ADF, count: u32) {
        disk.write_u32(self.number, BLK_HIGH_SEQ, count);
    }

    pub fn set_data_block(&self, disk: &mut ADF, index: usize, block: u32) {
        disk.write_u32(self.number, table_offset(index), block);
    }

    pub fn extension(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.number, BLK_EXTENSION)
    }

    pub fn set_extension(&self, disk: &mut ADF, block: u32) {
        disk.write_u32(self.number, BLK_EXTENSION, block);
    }
}

/// A header block reachable from the directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Root(RootBlock),
    Directory(UserDirectoryBlock),
    File(FileHeaderBlock),
}

impl Entry {
    /// Classifies a header block after checking its checksum.
    pub fn load(disk: &ADF, block: u32) -> Result<Entry> {
        disk.check_block(block)?;
        checksum::ensure_valid(disk, ChecksumDomain::Block(block))?;
        let block_type = disk.read_u32(block, BLK_TYPE);
        let sec_type = disk.read_u32(block, BLK_SEC_TYPE);
        match (block_type, sec_type) {
            (T_HEADER, ST_ROOT) => Ok(Entry::Root(RootBlock::new(block))),
            (T_HEADER, ST_DIR) => Ok(Entry::Directory(UserDirectoryBlock::new(block))),
            (T_HEADER, ST_FILE) => Ok(Entry::File(FileHeaderBlock::new(block))),
            _ => Err(AdfError::UnexpectedBlockType {
                block,
                block_type,
                sec_type,
            }),
        }
    }

    pub fn block(&self) -> u32 {
        match self {
            Entry::Root(root) => root.number(),
            Entry::Directory(dir) => dir.number(),
            Entry::File(file) => file.number(),
        }
    }

    pub fn is_directory(&self) -> bool {
        !self.is_file()
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn as_file(&self) -> Option<FileHeaderBlock> {
        match self {
            Entry::File(file) => Some(*file),
            _ => None,
        }
    }

    pub fn name(&self, disk: &ADF) -> String {
        disk.read_bstr(self.block(), BLK_NAME, MAXNAMELENGTH)
    }

    /// Rewrites the name field only; callers keep the parent's hash table
    /// in step.
    pub(crate) fn set_name(&self, disk: &mut ADF, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        disk.write_bstr(self.block(), BLK_NAME, MAXNAMELENGTH, &name);
        self.recompute_checksum(disk);
        Ok(())
    }

    pub fn comment(&self, disk: &ADF) -> String {
        match self {
            Entry::Root(_) => String::new(),
            _ => disk.read_bstr(self.block(), BLK_COMMENT, MAXCOMMENTLENGTH),
        }
    }

    pub fn set_comment(&self, disk: &mut ADF, comment: &str) -> Result<()> {
        if let Entry::Root(_) = self {
            return Err(AdfError::RootEntry("comment"));
        }
        let comment = validate_comment(comment)?;
        disk.write_bstr(self.block(), BLK_COMMENT, MAXCOMMENTLENGTH, &comment);
        self.recompute_checksum(disk);
        Ok(())
    }

    pub fn protection(&self, disk: &ADF) -> u32 {
        match self {
            Entry::Root(_) => 0,
            _ => disk.read_u32(self.block(), BLK_PROTECT),
        }
    }

    pub fn set_protection(&self, disk: &mut ADF, protection: u32) -> Result<()> {
        if let Entry::Root(_) = self {
            return Err(AdfError::RootEntry("protection"));
        }
        disk.write_u32(self.block(), BLK_PROTECT, protection);
        self.recompute_checksum(disk);
        Ok(())
    }

    /// Block number of the containing directory, 0 for the root.
    pub fn parent(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.block(), BLK_PARENT)
    }

    pub(crate) fn set_parent(&self, disk: &mut ADF, parent: u32) {
        disk.write_u32(self.block(), BLK_PARENT, parent);
    }

    pub fn next_same_hash(&self, disk: &ADF) -> u32 {
        disk.read_u32(self.block(), BLK_HASH_CHAIN)
    }

    pub fn size(&self, disk: &ADF) -> u32 {
        match self {
            Entry::File(file) => file.file_size(disk),
            _ => 0,
        }
    }

    pub fn modification_time(&self, disk: &ADF) -> DateStamp {
        DateStamp::read(disk, self.block(), BLK_DATE)
    }

    pub fn update_last_access_time(&self, disk: &mut ADF, now: DateStamp) {
        now.write(disk, self.block(), BLK_DATE);
        self.recompute_checksum(disk);
    }

    pub fn recompute_checksum(&self, disk: &mut ADF) {
        checksum::recompute(disk, ChecksumDomain::Block(self.block()));
    }

    pub fn verify(&self, disk: &ADF) -> Result<()> {
        checksum::ensure_valid(disk, ChecksumDomain::Block(self.block()))
    }

    fn require_directory(&self, disk: &ADF) -> Result<()> {
        if self.is_file() {
            return Err(AdfError::NotADirectory(self.name(disk)));
        }
        Ok(())
    }

    pub fn entries(&self, disk: &ADF) -> Result<Vec<Entry>> {
        self.require_directory(disk)?;
        hash::entries(disk, self.block())?
            .into_iter()
            .map(|block| Entry::load(disk, block))
            .collect()
    }

    pub fn find(&self, disk: &ADF, name: &str) -> Result<Option<Entry>> {
        self.require_directory(disk)?;
        let found = hash::find(disk, self.block(), name)?;
        trace!("Lookup of '{}' in block {}: {:?}", name, self.block(), found);
        found.map(|block| Entry::load(disk, block)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> DateStamp {
        DateStamp {
            days: 100,
            minutes: 200,
            ticks: 300,
        }
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("s").is_ok());
        assert!(validate_name(&"x".repeat(30)).is_ok());
        assert!(matches!(
            validate_name(&"x".repeat(31)),
            Err(AdfError::NameTooLong(_))
        ));
        assert!(matches!(validate_name(""), Err(AdfError::InvalidName(_))));
        assert!(matches!(validate_name("a/b"), Err(AdfError::InvalidName(_))));
        assert_eq!(validate_name("caf\u{e9}").unwrap(), b"caf\xE9");
        assert_eq!(validate_name(&"\u{e9}".repeat(30)).unwrap().len(), 30);
        assert!(matches!(validate_name("\u{263a}"), Err(AdfError::NotLatin1(_))));
        assert!(matches!(validate_comment(&"c".repeat(80)), Err(AdfError::CommentTooLong)));
    }

    #[test]
    fn root_block_layout() {
        let mut disk = ADF::blank();
        let root = RootBlock::new(ROOT_BLOCK);
        root.initialize(&mut disk, "Workbench", BITMAP_BLOCK, stamp()).unwrap();

        assert!(root.verify(&disk).is_ok());
        assert_eq!(root.name(&disk), "Workbench");
        assert_eq!(root.hash_table_size(&disk), 72);
        assert!(root.bitmap_valid(&disk));
        assert_eq!(root.bitmap_blocks(&disk), vec![BITMAP_BLOCK]);
        assert_eq!(root.creation_time(&disk), stamp());
        assert!(root.hashtable_entries(&disk).unwrap().is_empty());
        assert!(matches!(Entry::load(&disk, ROOT_BLOCK).unwrap(), Entry::Root(_)));

        assert!(root.rename(&mut disk, &"n".repeat(31)).is_err());
        assert_eq!(root.name(&disk), "Workbench");
        root.rename(&mut disk, "Extras").unwrap();
        assert_eq!(root.name(&disk), "Extras");
        assert!(root.verify(&disk).is_ok());

        let later = DateStamp { days: 101, ..stamp() };
        root.update_disk_last_modification_time(&mut disk, later);
        assert_eq!(root.disk_last_modification_time(&disk), later);
        assert_eq!(root.creation_time(&disk), stamp());
        assert!(root.verify(&disk).is_ok());
    }

    #[test]
    fn directory_block_layout() {
        let mut disk = ADF::blank();
        let dir = UserDirectoryBlock::new(900);
        dir.initialize(&mut disk, ROOT_BLOCK, "Devs", stamp()).unwrap();

        let entry = Entry::load(&disk, 900).unwrap();
        assert_eq!(entry, Entry::Directory(dir));
        assert_eq!(disk.read_u32(900, BLK_HEADER_KEY), 900);
        assert_eq!(entry.parent(&disk), ROOT_BLOCK);
        assert_eq!(entry.name(&disk), "Devs");
        assert_eq!(entry.modification_time(&disk), stamp());
        assert!(entry.entries(&disk).unwrap().is_empty());
    }

    #[test]
    fn file_header_table_is_reversed() {
        let mut disk = ADF::blank();
        let file = FileHeaderBlock::new(900);
        file.initialize(&mut disk, ROOT_BLOCK, "readme", stamp()).unwrap();
        file.set_data_block(&mut disk, 0, 901);
        file.set_data_block(&mut disk, 1, 902);
        file.set_block_count(&mut disk, 2);
        file.set_first_data_block_number(&mut disk, 901);
        Entry::File(file).recompute_checksum(&mut disk);

        assert_eq!(disk.read_u32(900, BLK_TABLE + 71 * 4), 901);
        assert_eq!(disk.read_u32(900, BLK_TABLE + 70 * 4), 902);
        assert_eq!(file.data_block_numbers(&disk).unwrap(), vec![901, 902]);
        assert_eq!(disk.read_u32(900, BLK_SEC_TYPE), 0xFFFF_FFFD);
        assert!(Entry::load(&disk, 900).unwrap().is_file());
    }

    #[test]
    fn extension_blocks_extend_the_table() {
        let mut disk = ADF::blank();
        let file = FileHeaderBlock::new(900);
        file.initialize(&mut disk, ROOT_BLOCK, "big", stamp()).unwrap();
        file.set_block_count(&mut disk, 1);
        file.set_data_block(&mut disk, 0, 1000);
        file.set_extension(&mut disk, 901);
        Entry::File(file).recompute_checksum(&mut disk);

        let extension = FileExtensionBlock::new(901);
        extension.initialize(&mut disk, 900);
        extension.set_block_count(&mut disk, 2);
        extension.set_data_block(&mut disk, 0, 1001);
        extension.set_data_block(&mut disk, 1, 1002);
        checksum::recompute(&mut disk, ChecksumDomain::Block(901));

        assert_eq!(file.extension_blocks(&disk).unwrap(), vec![extension]);
        assert_eq!(
            file.data_block_numbers(&disk).unwrap(),
            vec![1000, 1001, 1002]
        );
    }

    #[test]
    fn comments_and_protection() {
        let mut disk = ADF::blank();
        let file = FileHeaderBlock::new(900);
        file.initialize(&mut disk, ROOT_BLOCK, "c", stamp()).unwrap();
        let entry = Entry::File(file);
        entry.set_comment(&mut disk, "hello").unwrap();
        entry.set_protection(&mut disk, 0x05).unwrap();
        assert_eq!(entry.comment(&disk), "hello");
        assert_eq!(entry.protection(&disk), 0x05);
        assert!(entry.verify(&disk).is_ok());

        let root = Entry::Root(RootBlock::new(ROOT_BLOCK));
        assert!(matches!(
            root.set_comment(&mut disk, "x"),
            Err(AdfError::RootEntry(_))
        ));
    }

    #[test]
    fn load_rejects_non_header_blocks() {
        let mut disk = ADF::blank();
        disk.write_u32(900, BLK_TYPE, T_DATA);
        checksum::recompute(&mut disk, ChecksumDomain::Block(900));
        assert!(matches!(
            Entry::load(&disk, 900),
            Err(AdfError::UnexpectedBlockType { block: 900, .. })
        ));
        disk.write_u32(900, BLK_TYPE, T_HEADER);
        assert!(matches!(
            Entry::load(&disk, 900),
            Err(AdfError::ChecksumMismatch { block: 900, .. })
        ));
    }
}
