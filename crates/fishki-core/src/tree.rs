//! Directory indexer.
//!
//! Builds the page tree for a wiki root in two passes:
//!
//! 1. Walk the root (pre-order) and give every retained entry a slot in a
//!    flat arena, recording the index of its parent slot.
//! 2. Fold the arena bottom-up: since a parent is always visited before its
//!    children, iterating the slots in reverse guarantees that every child
//!    node is complete before its parent takes it.
//!
//! Dot-entries (which includes the `.git` metadata directory) are pruned
//! without descending. Only folders and `*.md` files are retained. Entries
//! that fail to stat are skipped instead of aborting the walk.
//!
//! The tree is rebuilt from disk on every call; there is no cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::models::{is_page_name, sort_siblings, NodeKind, PageNode, PATH_SEPARATOR};

/// Name of the VCS metadata directory at the wiki root.
pub const VCS_METADATA_DIR: &str = ".git";

struct Slot {
    name: String,
    path: String,
    kind: NodeKind,
    children: Vec<usize>,
}

/// Walk `root` and return its top-level entries as an ordered sequence.
///
/// The root itself is never part of the result; callers that want a single
/// wrapper node use [`root_node`].
pub fn build_tree(root: &Path) -> Result<Vec<PageNode>> {
    if !root.is_dir() {
        bail!("wiki root is not a directory: {}", root.display());
    }

    let mut slots: Vec<Slot> = Vec::new();
    let mut top_level: Vec<usize> = Vec::new();
    let mut index_of: HashMap<PathBuf, usize> = HashMap::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let Some(kind) = classify(&entry) else {
            continue;
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };

        let idx = slots.len();
        slots.push(Slot {
            name: entry.file_name().to_string_lossy().to_string(),
            path: to_client_path(&relative),
            kind,
            children: Vec::new(),
        });

        match relative.parent().and_then(|p| index_of.get(p)) {
            Some(&parent) => slots[parent].children.push(idx),
            None => top_level.push(idx),
        }

        if kind == NodeKind::Folder {
            index_of.insert(relative, idx);
        }
    }

    let mut built: Vec<Option<PageNode>> = vec![None; slots.len()];
    for idx in (0..slots.len()).rev() {
        let slot = &slots[idx];
        let node = match slot.kind {
            NodeKind::Page => PageNode::page(slot.name.clone(), slot.path.clone()),
            NodeKind::Folder => {
                let children = slot
                    .children
                    .iter()
                    .filter_map(|&c| built[c].take())
                    .collect();
                PageNode::folder(slot.name.clone(), slot.path.clone(), children)
            }
        };
        built[idx] = Some(node);
    }

    let mut nodes: Vec<PageNode> = top_level
        .into_iter()
        .filter_map(|idx| built[idx].take())
        .collect();
    sort_siblings(&mut nodes);
    Ok(nodes)
}

/// Wrap the top-level entries in a synthetic folder named after the root.
pub fn root_node(root: &Path, children: Vec<PageNode>) -> PageNode {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());
    PageNode::folder(name, "", children)
}

fn is_hidden(entry: &DirEntry) -> bool {
    // The root itself may well live under a dot-directory.
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == VCS_METADATA_DIR || name.starts_with('.')
}

/// Decide whether an entry is kept, and as what.
///
/// Symlinks are never descended; a symlink to a markdown file is listed as a
/// page, anything else behind a symlink (including a dangling one) is dropped.
fn classify(entry: &DirEntry) -> Option<NodeKind> {
    let file_type = entry.file_type();
    let name = entry.file_name().to_string_lossy();

    if file_type.is_dir() {
        return Some(NodeKind::Folder);
    }
    if file_type.is_file() {
        return is_page_name(&name).then_some(NodeKind::Page);
    }
    if file_type.is_symlink() {
        return match std::fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() && is_page_name(&name) => Some(NodeKind::Page),
            Ok(_) => None,
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "skipping dangling symlink");
                None
            }
        };
    }
    None
}

fn to_client_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}
