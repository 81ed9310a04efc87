//! Committed blocks on disk as `<height>.json`, and reading them back.

use std::path::{Path, PathBuf};

use meridian_types::Block;
use tracing::debug;

use crate::NodeError;

fn dump_err(path: &Path, reason: impl ToString) -> NodeError {
    NodeError::Dump {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

pub fn block_path(dir: &Path, height: u64) -> PathBuf {
    dir.join(format!("{height:012}.json"))
}

/// Write `block` into `dir`, creating the directory if needed.
pub fn write_block(dir: &Path, block: &Block) -> Result<PathBuf, NodeError> {
    std::fs::create_dir_all(dir)?;
    let path = block_path(dir, block.height);
    let json = serde_json::to_vec_pretty(block).map_err(|e| dump_err(&path, e))?;
    std::fs::write(&path, json)?;
    debug!(height = block.height, path = %path.display(), "block dumped");
    Ok(path)
}

/// Delete the dumps at `height` and above, after those blocks were rolled
/// back. Returns how many files went.
pub fn remove_from(dir: &Path, height: u64) -> Result<usize, NodeError> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let dumped = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        if dumped.is_some_and(|h| h >= height) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    debug!(dir = %dir.display(), height, removed, "stale block dumps removed");
    Ok(removed)
}

/// Every `*.json` block in `dir`, ordered by height. A missing directory
/// holds no blocks.
pub fn read_blocks(dir: &Path) -> Result<Vec<Block>, NodeError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut blocks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read(&path)?;
        let block: Block = serde_json::from_slice(&raw).map_err(|e| dump_err(&path, e))?;
        blocks.push(block);
    }
    blocks.sort_by_key(|b| b.height);
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{Address, BlockHash, MerkleRoot, Timestamp};

    fn block(height: u64) -> Block {
        Block {
            version: 1,
            height,
            prev_hash: BlockHash::ZERO,
            merkle_root: MerkleRoot::ZERO,
            timestamp: Timestamp::new(height),
            miner: Address::new([3; 32]),
            hash: BlockHash::new([height as u8; 32]),
            transactions: Vec::new(),
        }
    }

    #[test]
    fn blocks_come_back_in_height_order() {
        let dir = tempfile::tempdir().unwrap();
        for h in [3, 1, 2] {
            write_block(dir.path(), &block(h)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let heights: Vec<u64> = read_blocks(dir.path())
            .unwrap()
            .iter()
            .map(|b| b.height)
            .collect();
        assert_eq!(heights, vec![1, 2, 3]);
    }

    #[test]
    fn rolled_back_heights_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        for h in 1..=4 {
            write_block(dir.path(), &block(h)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "kept").unwrap();

        assert_eq!(remove_from(dir.path(), 3).unwrap(), 2);
        let heights: Vec<u64> = read_blocks(dir.path())
            .unwrap()
            .iter()
            .map(|b| b.height)
            .collect();
        assert_eq!(heights, vec![1, 2]);
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(remove_from(&dir.path().join("absent"), 1).unwrap(), 0);
    }

    #[test]
    fn missing_directory_is_empty_and_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_blocks(&dir.path().join("absent")).unwrap().is_empty());

        std::fs::write(dir.path().join("000000000001.json"), "{").unwrap();
        assert!(matches!(read_blocks(dir.path()), Err(NodeError::Dump { .. })));
    }
}
