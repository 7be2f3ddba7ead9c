// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Per directory hash table: 72 slots, each the head of a chain of entries
//! linked through their hash chain field.
//!
//! The functions here take the block number of a directory (root or user
//! directory, both keep their table at the same offset) and the block number
//! of an entry header.

use log::{debug, trace};

use crate::checksum::{self, ChecksumDomain};
use crate::consts::{ADF_NUM_SECTORS, BLK_HASH_CHAIN, BLK_NAME, BLK_TABLE, HT_SIZE, MAXNAMELENGTH};
use crate::disk::{decode_latin1, encode_latin1, ADF};
use crate::error::{AdfError, Result};

/// AmigaDOS (non international) hash of the on-disk name bytes.
pub fn hash_name(name: &[u8]) -> usize {
    let mut hash = name.len() as u32;
    for &c in name {
        hash = hash
            .wrapping_mul(13)
            .wrapping_add(c.to_ascii_uppercase() as u32)
            & 0x7FF;
    }
    hash as usize % HT_SIZE
}

pub(crate) fn slot(disk: &ADF, dir: u32, index: usize) -> u32 {
    disk.read_u32(dir, BLK_TABLE + index * 4)
}

fn set_slot(disk: &mut ADF, dir: u32, index: usize, block: u32) {
    disk.write_u32(dir, BLK_TABLE + index * 4, block);
}

fn next_in_chain(disk: &ADF, block: u32) -> u32 {
    disk.read_u32(block, BLK_HASH_CHAIN)
}

fn set_next_in_chain(disk: &mut ADF, block: u32, next: u32) {
    disk.write_u32(block, BLK_HASH_CHAIN, next);
}

fn entry_name(disk: &ADF, block: u32) -> &[u8] {
    disk.bstr_bytes(block, BLK_NAME, MAXNAMELENGTH)
}

/// Walks the chain starting at `head`, validating every link.
fn chain(disk: &ADF, dir: u32, head: u32) -> Result<Vec<u32>> {
    let mut blocks = Vec::new();
    let mut current = head;
    while current != 0 {
        disk.check_block(current)?;
        if blocks.len() >= ADF_NUM_SECTORS as usize {
            return Err(AdfError::ChainLoop(dir));
        }
        blocks.push(current);
        current = next_in_chain(disk, current);
    }
    Ok(blocks)
}

/// Looks up `name` (case sensitive) and returns the entry's header block.
pub fn find(disk: &ADF, dir: u32, name: &str) -> Result<Option<u32>> {
    // a name that cannot be stored cannot be on the disk either
    let bytes = match encode_latin1(name) {
        Some(bytes) if bytes.len() <= MAXNAMELENGTH => bytes,
        _ => return Ok(None),
    };
    let head = slot(disk, dir, hash_name(&bytes));
    Ok(chain(disk, dir, head)?
        .into_iter()
        .find(|&block| entry_name(disk, block) == bytes.as_slice()))
}

/// All entries of a directory, slot by slot, in chain order within a slot.
pub fn entries(disk: &ADF, dir: u32) -> Result<Vec<u32>> {
    let mut blocks = Vec::new();
    for index in 0..HT_SIZE {
        blocks.extend(chain(disk, dir, slot(disk, dir, index))?);
    }
    Ok(blocks)
}

/// Appends `entry` to the chain selected by its current name. Recomputes the
/// checksum of every block it touches.
pub(crate) fn insert(disk: &mut ADF, dir: u32, entry: u32) -> Result<()> {
    let index = hash_name(entry_name(disk, entry));
    set_next_in_chain(disk, entry, 0);
    checksum::recompute(disk, ChecksumDomain::Block(entry));

    let blocks = chain(disk, dir, slot(disk, dir, index))?;
    match blocks.last() {
        None => set_slot(disk, dir, index, entry),
        Some(&tail) => {
            set_next_in_chain(disk, tail, entry);
            checksum::recompute(disk, ChecksumDomain::Block(tail));
            trace!("Linked block {} after block {}", entry, tail);
        }
    }
    checksum::recompute(disk, ChecksumDomain::Block(dir));
    debug!("Inserted block {} into slot {} of directory {}", entry, index, dir);
    Ok(())
}

/// Removes `entry` from the chain selected by its current name, relinking
/// its predecessor to its successor.
pub(crate) fn unlink(disk: &mut ADF, dir: u32, entry: u32) -> Result<()> {
    let index = hash_name(entry_name(disk, entry));
    let blocks = chain(disk, dir, slot(disk, dir, index))?;
    let position = blocks
        .iter()
        .position(|&block| block == entry)
        .ok_or_else(|| AdfError::DirectoryEntryNotFound(decode_latin1(entry_name(disk, entry))))?;
    let next = next_in_chain(disk, entry);

    if position == 0 {
        set_slot(disk, dir, index, next);
    } else {
        let previous = blocks[position - 1];
        set_next_in_chain(disk, previous, next);
        checksum::recompute(disk, ChecksumDomain::Block(previous));
    }
    set_next_in_chain(disk, entry, 0);
    checksum::recompute(disk, ChecksumDomain::Block(entry));
    checksum::recompute(disk, ChecksumDomain::Block(dir));
    debug!("Unlinked block {} from slot {} of directory {}", entry, index, dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIR: u32 = 880;

    fn named(disk: &mut ADF, block: u32, name: &str) {
        let bytes = encode_latin1(name).unwrap();
        disk.write_bstr(block, BLK_NAME, MAXNAMELENGTH, &bytes);
    }

    #[test]
    fn hash_values() {
        assert_eq!(hash_name(b"a"), 6);
        assert_eq!(hash_name(b"A"), 6);
        assert_eq!(hash_name(b"s"), 24);
        assert_eq!(hash_name(b"zzz"), 29);
        assert_eq!(hash_name(b""), 0);
        assert!(hash_name(b"a very long file name of 30 ch") < HT_SIZE);
        // only ASCII letters fold
        assert_eq!(hash_name(&[0xE9]), 30);
        assert_eq!(hash_name(&[0xC9]), 70);
    }

    #[test]
    fn oversized_lookup_names_hash_and_miss() {
        let huge = vec![b'z'; 1 << 20];
        assert!(hash_name(&huge) < HT_SIZE);
        let disk = ADF::blank();
        assert_eq!(find(&disk, DIR, &"z".repeat(31)).unwrap(), None);
        assert_eq!(find(&disk, DIR, "\u{263a}").unwrap(), None);
    }

    #[test]
    fn insert_find_unlink() {
        let mut disk = ADF::blank();
        named(&mut disk, 900, "a");
        named(&mut disk, 901, "zzz");
        insert(&mut disk, DIR, 900).unwrap();
        insert(&mut disk, DIR, 901).unwrap();

        assert_eq!(slot(&disk, DIR, 6), 900);
        assert_eq!(slot(&disk, DIR, 29), 901);
        assert_eq!(find(&disk, DIR, "a").unwrap(), Some(900));
        assert_eq!(find(&disk, DIR, "zzz").unwrap(), Some(901));
        assert_eq!(find(&disk, DIR, "b").unwrap(), None);
        assert_eq!(entries(&disk, DIR).unwrap(), vec![900, 901]);

        unlink(&mut disk, DIR, 900).unwrap();
        assert_eq!(find(&disk, DIR, "a").unwrap(), None);
        assert_eq!(slot(&disk, DIR, 6), 0);
        assert!(matches!(
            unlink(&mut disk, DIR, 900),
            Err(AdfError::DirectoryEntryNotFound(_))
        ));
    }

    #[test]
    fn collisions_chain_in_insertion_order() {
        // same hash, different case: lookups stay case sensitive
        let mut disk = ADF::blank();
        named(&mut disk, 900, "a");
        named(&mut disk, 901, "A");
        named(&mut disk, 902, "a");
        for block in [900, 901, 902] {
            insert(&mut disk, DIR, block).unwrap();
        }
        assert_eq!(slot(&disk, DIR, 6), 900);
        assert_eq!(next_in_chain(&disk, 900), 901);
        assert_eq!(next_in_chain(&disk, 901), 902);
        assert_eq!(next_in_chain(&disk, 902), 0);
        assert_eq!(find(&disk, DIR, "A").unwrap(), Some(901));
        assert_eq!(find(&disk, DIR, "a").unwrap(), Some(900));

        // unlink from the middle of the chain
        unlink(&mut disk, DIR, 901).unwrap();
        assert_eq!(next_in_chain(&disk, 900), 902);
        assert_eq!(find(&disk, DIR, "A").unwrap(), None);

        // unlink the head
        unlink(&mut disk, DIR, 900).unwrap();
        assert_eq!(slot(&disk, DIR, 6), 902);
        assert_eq!(entries(&disk, DIR).unwrap(), vec![902]);
    }

    #[test]
    fn touched_blocks_are_checksummed() {
        let mut disk = ADF::blank();
        named(&mut disk, 900, "a");
        named(&mut disk, 901, "A");
        insert(&mut disk, DIR, 900).unwrap();
        insert(&mut disk, DIR, 901).unwrap();
        for block in [DIR, 900, 901] {
            assert!(checksum::verify(&disk, ChecksumDomain::Block(block)));
        }
    }

    #[test]
    fn looping_chain_is_detected() {
        let mut disk = ADF::blank();
        named(&mut disk, 900, "a");
        set_slot(&mut disk, DIR, 6, 900);
        set_next_in_chain(&mut disk, 900, 900);
        assert!(matches!(find(&disk, DIR, "A"), Err(AdfError::ChainLoop(DIR))));
    }

    #[test]
    fn invalid_link_is_reported() {
        let mut disk = ADF::blank();
        set_slot(&mut disk, DIR, 3, 5000);
        assert!(matches!(
            entries(&disk, DIR),
            Err(AdfError::InvalidBlockNumber(5000))
        ));
    }
}
