//! Page tree data types.
//!
//! A [`PageNode`] is one filesystem entry surfaced to clients: either a
//! folder (with ordered children) or a markdown page. The JSON shape matches
//! what the web frontend consumes:
//!
//! ```json
//! { "name": "notes", "type": "folder", "path": "notes", "children": [
//!     { "name": "today.md", "type": "file", "path": "notes/today.md" }
//! ] }
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// File extension (without the dot) that marks a file as a wiki page.
pub const PAGE_EXTENSION: &str = "md";

/// Separator used in every `path` exposed to clients, regardless of platform.
pub const PATH_SEPARATOR: char = '/';

/// Kind of a [`PageNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "folder")]
    Folder,
    #[serde(rename = "file")]
    Page,
}

impl NodeKind {
    /// Folders sort before pages within a sibling group.
    fn rank(self) -> u8 {
        match self {
            NodeKind::Folder => 0,
            NodeKind::Page => 1,
        }
    }
}

/// One entry of the page tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    /// Base name of the entry.
    pub name: String,
    /// Folder or page.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Path relative to the wiki root, `/`-separated. Empty for the root itself.
    pub path: String,
    /// Ordered children. Always `Some` for folders (possibly empty), `None` for pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PageNode>>,
}

impl PageNode {
    pub fn folder(name: impl Into<String>, path: impl Into<String>, children: Vec<PageNode>) -> Self {
        let mut children = children;
        sort_siblings(&mut children);
        Self {
            name: name.into(),
            kind: NodeKind::Folder,
            path: path.into(),
            children: Some(children),
        }
    }

    pub fn page(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Page,
            path: path.into(),
            children: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Children of a folder; empty for pages.
    pub fn children(&self) -> &[PageNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Find a descendant by its relative path.
    pub fn find(&self, path: &str) -> Option<&PageNode> {
        if self.path == path {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(path))
    }
}

/// Sibling ordering: folders first, then case-sensitive name order.
pub fn sibling_order(a: &PageNode, b: &PageNode) -> Ordering {
    a.kind
        .rank()
        .cmp(&b.kind.rank())
        .then_with(|| a.name.cmp(&b.name))
}

pub fn sort_siblings(nodes: &mut [PageNode]) {
    nodes.sort_by(sibling_order);
}

/// Whether a file name carries the page extension.
pub fn is_page_name(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .map(|ext| ext == PAGE_EXTENSION)
        .unwrap_or(false)
}
