//! Stylesheet tree - an arena of CSS nodes that the sprite pipeline walks and rewrites
//!
//! Nodes are addressed by [`NodeId`]. Ids are handed out once and never reused, so an id
//! taken during scanning stays valid (and comparable) for the whole run even after the
//! node has been detached from the tree.

mod parser;
mod writer;

pub use parser::{parse, split_selectors, ParseError};

use std::path::{Path, PathBuf};

/// Opaque handle to a node in a [`Stylesheet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// 1-indexed source position of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A `property: value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub prop: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(prop: impl Into<String>, value: impl Into<String>) -> Self {
        Self { prop: prop.into(), value: value.into(), important: false }
    }
}

/// What a node is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The stylesheet itself
    Root,
    /// `selector, selector { ... }`
    Rule { selectors: Vec<String> },
    /// `@name params { ... }` or `@name params;`
    AtRule { name: String, params: String, has_block: bool },
    Decl(Declaration),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    location: Option<Location>,
}

/// A mutable CSS tree.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    nodes: Vec<Node>,
    source: Option<PathBuf>,
}

impl Stylesheet {
    /// Create an empty stylesheet, optionally remembering the file it came from
    pub fn new(source: Option<PathBuf>) -> Self {
        let root = Node { kind: NodeKind::Root, parent: None, children: vec![], location: None };
        Self { nodes: vec![root], source }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Path of the file this stylesheet was parsed from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Parent of the parent: for a declaration this is the context its rule lives in
    pub fn grandparent(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).and_then(|p| self.parent(p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn location(&self, id: NodeId) -> Option<Location> {
        self.nodes[id.0].location
    }

    pub fn declaration(&self, id: NodeId) -> Option<&Declaration> {
        match &self.nodes[id.0].kind {
            NodeKind::Decl(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn selectors(&self, id: NodeId) -> Option<&[String]> {
        match &self.nodes[id.0].kind {
            NodeKind::Rule { selectors } => Some(selectors),
            _ => None,
        }
    }

    /// Selector list of a rule joined the way it is written out
    pub fn selector(&self, id: NodeId) -> Option<String> {
        self.selectors(id).map(|s| s.join(", "))
    }

    pub fn is_at_rule(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::AtRule { .. })
    }

    /// Whether the node is still reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Create a detached node
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.create_at(kind, None)
    }

    pub(crate) fn create_at(&mut self, kind: NodeKind, location: Option<Location>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, parent: None, children: vec![], location });
        id
    }

    /// Create a detached declaration node
    pub fn create_decl(&mut self, decl: Declaration) -> NodeId {
        self.create(NodeKind::Decl(decl))
    }

    /// Clone a rule with a replacement selector list and no children
    pub fn clone_rule_empty(&mut self, rule: NodeId, selectors: Vec<String>) -> NodeId {
        let location = self.location(rule);
        self.create_at(NodeKind::Rule { selectors }, location)
    }

    /// Clone a node without its children (used for at-rule wrappers)
    pub fn clone_empty(&mut self, id: NodeId) -> NodeId {
        let kind = self.kind(id).clone();
        let location = self.location(id);
        self.create_at(kind, location)
    }

    /// Detach a node from its parent. The node and its subtree remain addressable.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn prepend(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(0, child);
    }

    /// Insert `child` right before `anchor` in the anchor's parent.
    ///
    /// Does nothing when the anchor is detached.
    pub fn insert_before(&mut self, anchor: NodeId, child: NodeId) {
        self.insert_relative(anchor, child, 0);
    }

    /// Insert `child` right after `anchor` in the anchor's parent.
    pub fn insert_after(&mut self, anchor: NodeId, child: NodeId) {
        self.insert_relative(anchor, child, 1);
    }

    fn insert_relative(&mut self, anchor: NodeId, child: NodeId, offset: usize) {
        let Some(parent) = self.parent(anchor) else {
            return;
        };
        self.remove(child);
        let siblings = &mut self.nodes[parent.0].children;
        let index = siblings.iter().position(|c| *c == anchor).unwrap_or(siblings.len());
        siblings.insert((index + offset).min(siblings.len()), child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// All attached declarations whose property matches, in document order
    pub fn walk_decls<F>(&self, mut matches: F) -> Vec<NodeId>
    where
        F: FnMut(&Declaration) -> bool,
    {
        let mut found = vec![];
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if let NodeKind::Decl(decl) = &self.nodes[id.0].kind {
                if matches(decl) {
                    found.push(id);
                }
            }
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        found
    }

    /// Serialize the tree back to CSS text
    pub fn to_css(&self) -> String {
        writer::write(self)
    }
}
