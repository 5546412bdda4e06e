//! In-memory block cache for one Spark service.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::block_types::BlockType;
use super::types::{Block, BlockAddress, BlockMeta, Link};
use crate::{BrewlinkError, Result};

/// Persistent and volatile blocks of a single service.
///
/// Holds no lock; the owning service module serializes access.
#[derive(Debug, Clone, Default)]
pub struct BlockRepository {
    service_id: String,
    blocks: Vec<Block>,
    volatile_blocks: Vec<Block>,
    last_blocks: Option<DateTime<Utc>>,
}

fn extend_by_id(blocks: &mut Vec<Block>, block: Block) {
    match blocks.iter_mut().find(|b| b.id == block.id) {
        Some(existing) => *existing = block,
        None => blocks.push(block),
    }
}

/// Keeps the last occurrence of every id, in the order those occurrences appear
fn dedup_last_wins(blocks: Vec<Block>) -> Vec<Block> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Block> = blocks
        .into_iter()
        .rev()
        .filter(|b| seen.insert(b.id.clone()))
        .collect();
    unique.reverse();
    unique
}

fn find_by_id<'a>(blocks: &'a [Block], id: &str) -> Option<&'a Block> {
    blocks.iter().find(|b| b.id == id)
}

impl BlockRepository {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            ..Default::default()
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn volatile_blocks(&self) -> &[Block] {
        &self.volatile_blocks
    }

    pub fn last_blocks(&self) -> Option<DateTime<Utc>> {
        self.last_blocks
    }

    pub fn block_ids(&self) -> Vec<String> {
        self.blocks.iter().map(|b| b.id.clone()).collect()
    }

    // A backend block replaces any volatile block with the same id
    fn drop_volatile_twins(&mut self, persistent: &[Block]) {
        self.volatile_blocks
            .retain(|v| !persistent.iter().any(|b| b.id == v.id));
    }

    /// Upsert into the persistent collection
    pub fn set_block(&mut self, block: Block) {
        self.drop_volatile_twins(std::slice::from_ref(&block));
        extend_by_id(&mut self.blocks, block);
    }

    /// Replace the persistent collection with a fetched snapshot
    pub fn update_blocks(&mut self, blocks: Vec<Block>) {
        let blocks = dedup_last_wins(blocks);
        self.drop_volatile_twins(&blocks);
        self.blocks = blocks;
        self.last_blocks = Some(Utc::now());
    }

    /// Drop `deleted` and every id in `changed`, then append `changed`.
    ///
    /// An id repeated in `changed` is kept once, with its last value.
    pub fn patch_blocks(&mut self, changed: Vec<Block>, deleted: &[String]) {
        let changed = dedup_last_wins(changed);
        self.blocks.retain(|b| {
            !deleted.iter().any(|id| *id == b.id) && !changed.iter().any(|c| c.id == b.id)
        });
        self.drop_volatile_twins(&changed);
        self.blocks.extend(changed);
    }

    pub fn invalidate_blocks(&mut self) {
        self.blocks.clear();
        self.last_blocks = None;
    }

    pub fn block_by_id(&self, id: &str) -> Option<&Block> {
        find_by_id(&self.blocks, id).or_else(|| find_by_id(&self.volatile_blocks, id))
    }

    pub fn block_by_address(&self, addr: &BlockAddress) -> Option<&Block> {
        self.resolve(addr)
    }

    pub fn block_by_link(&self, link: &Link) -> Option<&Block> {
        self.resolve(link)
    }

    pub fn blocks_by_type<'a>(&'a self, block_type: &'a BlockType) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| &b.block_type == block_type)
    }

    pub fn contains_persistent(&self, id: &str) -> bool {
        find_by_id(&self.blocks, id).is_some()
    }

    pub fn is_volatile_id(&self, id: &str) -> bool {
        find_by_id(&self.volatile_blocks, id).is_some()
    }

    /// Insert a client-only block, tagging it volatile.
    pub fn create_volatile_block(&mut self, mut block: Block) -> Result<()> {
        if self.contains_persistent(&block.id) {
            return Err(BrewlinkError::DuplicateId(block.id));
        }
        block.meta.get_or_insert_with(BlockMeta::default).volatile = true;
        extend_by_id(&mut self.volatile_blocks, block);
        Ok(())
    }

    /// Upsert a volatile block. Fails if the id is taken by a persistent block.
    pub fn save_volatile_block(&mut self, block: Block) -> Result<()> {
        if self.contains_persistent(&block.id) {
            return Err(BrewlinkError::DuplicateId(block.id));
        }
        extend_by_id(&mut self.volatile_blocks, block);
        Ok(())
    }

    pub fn remove_volatile_block(&mut self, id: &str) -> Option<Block> {
        let idx = self.volatile_blocks.iter().position(|b| b.id == id)?;
        Some(self.volatile_blocks.remove(idx))
    }

    /// Rename a volatile block locally; other fields are kept.
    pub fn rename_volatile_block(&mut self, current_id: &str, new_id: &str) -> Result<()> {
        if self.block_by_id(new_id).is_some() {
            return Err(BrewlinkError::DuplicateId(new_id.to_string()));
        }
        let mut block = self
            .remove_volatile_block(current_id)
            .ok_or_else(|| BrewlinkError::NotFound(current_id.to_string()))?;
        block.id = new_id.to_string();
        self.volatile_blocks.push(block);
        Ok(())
    }
}
