//! Serialized syntax trees for pre-parsed formatting.
//!
//! The host parses the source in a separate step and hands over a JSON tree:
//!
//! ```json
//! {"type": "program", "start": 0, "end": 17, "children": [
//!   {"type": "def", "start": 0, "end": 17, "children": [...]}
//! ]}
//! ```
//!
//! Offsets are byte positions in the original source.

use crate::error::FormatFailure;
use serde::Deserialize;

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A leaf in output order with the indentation depth it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    pub start: usize,
    pub end: usize,
    pub depth: usize,
}

/// Decoded and validated tree.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    root: Node,
}

impl SyntaxTree {
    /// Decode a JSON tree.
    pub fn from_json(tree: &[u8]) -> Result<Self, FormatFailure> {
        let root: Node =
            serde_json::from_slice(tree).map_err(|e| FormatFailure::TreeDecode(e.to_string()))?;
        Ok(Self { root })
    }

    /// Decode a tree and check it against the source it describes.
    pub fn decode(tree: &[u8], source: &str) -> Result<Self, FormatFailure> {
        let tree = Self::from_json(tree)?;
        tree.validate(source)?;
        Ok(tree)
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Check that every span lies in the source on character boundaries,
    /// that children lie inside their parent, and that siblings are ordered
    /// and do not overlap.
    pub fn validate(&self, source: &str) -> Result<(), FormatFailure> {
        validate_node(&self.root, source)
    }

    /// Leaves in source order with their indentation depth.
    ///
    /// A leaf is indented once for every non-root ancestor that opened on an
    /// earlier line and that the leaf does not close (is not its last leaf).
    #[must_use]
    pub fn leaves(&self, source: &str) -> Vec<Leaf> {
        let lines = LineIndex::new(source);
        let mut frames = Vec::new();
        let mut out = Vec::new();
        collect_leaves(&self.root, &lines, &mut frames, &mut out);
        out
    }
}

fn validate_node(node: &Node, source: &str) -> Result<(), FormatFailure> {
    if node.start > node.end || node.end > source.len() {
        return Err(span_error(node, "lies outside the source"));
    }
    if !source.is_char_boundary(node.start) || !source.is_char_boundary(node.end) {
        return Err(span_error(node, "splits a character"));
    }

    let mut cursor = node.start;
    for child in &node.children {
        if child.start < cursor || child.end > node.end {
            return Err(span_error(child, "is not ordered inside its parent"));
        }
        validate_node(child, source)?;
        cursor = child.end;
    }
    Ok(())
}

fn span_error(node: &Node, what: &str) -> FormatFailure {
    FormatFailure::TreeDecode(format!(
        "node `{}` at {}..{} {}",
        node.kind, node.start, node.end, what
    ))
}

struct Frame {
    line: usize,
    // True while the walk follows last children from this node down
    closing: bool,
}

fn collect_leaves(node: &Node, lines: &LineIndex, frames: &mut Vec<Frame>, out: &mut Vec<Leaf>) {
    if node.is_leaf() {
        let line = lines.line_of(node.start);
        let depth = frames
            .iter()
            .filter(|f| f.line < line && !f.closing)
            .count();
        out.push(Leaf {
            start: node.start,
            end: node.end,
            depth,
        });
        return;
    }

    let last = node.children.len() - 1;
    for (i, child) in node.children.iter().enumerate() {
        let saved: Vec<bool> = frames.iter().map(|f| f.closing).collect();
        if i != last {
            frames.iter_mut().for_each(|f| f.closing = false);
        }
        frames.push(Frame {
            line: lines.line_of(child.start),
            closing: true,
        });
        collect_leaves(child, lines, frames, out);
        frames.pop();
        for (f, closing) in frames.iter_mut().zip(saved) {
            f.closing = closing;
        }
    }
}

/// Byte offset to line number lookup.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).saturating_sub(1)
    }
}
