//! Syntax tree data model populated by an external frontend.
//!
//! The engine never parses source itself: a frontend lowers its parse result
//! into a [`SyntaxTree`] through [`TreeBuilder`], which enforces the two
//! structural invariants every consumer relies on — a child's range is
//! contained in its parent's range, and sibling ranges are non-overlapping and
//! in source order. Nodes are ids into an arena; [`Node`] is a cheap borrowed
//! handle over an id.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Byte range in the analyzed source (start inclusive, end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `offset` falls inside this span.
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` lies entirely within this span.
    #[must_use]
    pub fn contains_span(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two half-open ranges intersect.
    #[must_use]
    pub fn overlaps(&self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Category tag of a syntax node.
///
/// This is the closed set callbacks key on. Frontends map their grammar onto
/// these categories; a construct without a matching category is lowered as its
/// nearest structural parent and left to text-level rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// File root; exactly one per tree.
    Root,
    FunctionDecl,
    VariableDecl,
    Assignment,
    Block,
    Call,
    MemberAccess,
    Identifier,
    StringLiteral,
    NumberLiteral,
    If,
    Loop,
    Try,
    Finally,
    Return,
    Attribute,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::FunctionDecl => "function_decl",
            NodeKind::VariableDecl => "variable_decl",
            NodeKind::Assignment => "assignment",
            NodeKind::Block => "block",
            NodeKind::Call => "call",
            NodeKind::MemberAccess => "member_access",
            NodeKind::Identifier => "identifier",
            NodeKind::StringLiteral => "string_literal",
            NodeKind::NumberLiteral => "number_literal",
            NodeKind::If => "if",
            NodeKind::Loop => "loop",
            NodeKind::Try => "try",
            NodeKind::Finally => "finally",
            NodeKind::Return => "return",
            NodeKind::Attribute => "attribute",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a node within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Id of the root node of any tree.
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    span: Span,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Immutable syntax tree for one analysis run.
#[derive(Debug)]
pub struct SyntaxTree {
    nodes: Vec<NodeData>,
}

impl SyntaxTree {
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        Node {
            tree: self,
            id: NodeId::ROOT,
        }
    }

    /// Resolve an id captured earlier in the same run.
    ///
    /// Panics if `id` does not belong to this tree; ids are only minted by
    /// this tree's builder, so an out-of-range id is a caller bug.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Node<'_> {
        assert!(id.index() < self.nodes.len(), "node id out of range");
        Node { tree: self, id }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }
}

/// Borrowed handle to one node of a [`SyntaxTree`].
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t SyntaxTree,
    id: NodeId,
}

impl<'t> Node<'t> {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.tree.data(self.id).kind
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.tree.data(self.id).span
    }

    #[must_use]
    pub fn parent(&self) -> Option<Node<'t>> {
        self.tree.data(self.id).parent.map(|id| Node {
            tree: self.tree,
            id,
        })
    }

    /// Children in source order.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = Node<'t>> + ExactSizeIterator + '_ {
        let tree = self.tree;
        self.tree
            .data(self.id)
            .children
            .iter()
            .map(move |&id| Node { tree, id })
    }

    #[must_use]
    pub fn child(&self, n: usize) -> Option<Node<'t>> {
        let tree = self.tree;
        self.tree
            .data(self.id)
            .children
            .get(n)
            .map(|&id| Node { tree, id })
    }

    pub fn children_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = Node<'t>> + '_ {
        self.children().filter(move |c| c.kind() == kind)
    }

    #[must_use]
    pub fn first_child_of_kind(&self, kind: NodeKind) -> Option<Node<'t>> {
        self.children().find(|c| c.kind() == kind)
    }

    /// Walk towards the root, excluding `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'t>> + '_ {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    #[must_use]
    pub fn ancestor_of_kind(&self, kind: NodeKind) -> Option<Node<'t>> {
        self.ancestors().find(|n| n.kind() == kind)
    }

    /// Pre-order walk of everything below this node, excluding `self`.
    pub fn descendants(&self) -> Descendants<'t> {
        let mut stack: Vec<NodeId> = self.tree.data(self.id).children.clone();
        stack.reverse();
        Descendants {
            tree: self.tree,
            stack,
        }
    }

    /// Slice of the raw source covered by this node.
    ///
    /// Returns the empty string if the span does not index `source` cleanly;
    /// the builder guarantees in-bounds spans for the source the tree was
    /// built against.
    #[must_use]
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.span().range()).unwrap_or("")
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind(), self.span())
    }
}

/// Iterator returned by [`Node::descendants`].
pub struct Descendants<'t> {
    tree: &'t SyntaxTree,
    stack: Vec<NodeId>,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Node<'t>> {
        let id = self.stack.pop()?;
        let children = &self.tree.data(id).children;
        self.stack.extend(children.iter().rev().copied());
        Some(Node {
            tree: self.tree,
            id,
        })
    }
}

/// Structural violation rejected by [`TreeBuilder`].
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("parent node {0:?} does not exist")]
    UnknownParent(NodeId),

    #[error("child span {child} not contained in parent span {parent}")]
    OutsideParent { child: Span, parent: Span },

    #[error("sibling span {span} overlaps or precedes previous sibling ending at {prev_end}")]
    SiblingOrder { span: Span, prev_end: usize },
}

/// Incremental constructor used by frontends to lower a parse result.
///
/// Nodes must be added parent-first and siblings in source order; the builder
/// rejects anything that would break the containment or ordering invariants.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<NodeData>,
}

impl TreeBuilder {
    /// Start a tree whose root covers `root_span` (normally `0..source.len()`).
    #[must_use]
    pub fn new(root_span: Span) -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                span: root_span,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Append a node under `parent`.
    pub fn add(&mut self, parent: NodeId, kind: NodeKind, span: Span) -> Result<NodeId, TreeError> {
        let Some(parent_data) = self.nodes.get(parent.index()) else {
            return Err(TreeError::UnknownParent(parent));
        };

        if !parent_data.span.contains_span(span) {
            return Err(TreeError::OutsideParent {
                child: span,
                parent: parent_data.span,
            });
        }

        if let Some(&prev) = parent_data.children.last() {
            let prev_end = self.nodes[prev.index()].span.end;
            if span.start < prev_end {
                return Err(TreeError::SiblingOrder { span, prev_end });
            }
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            span,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    #[must_use]
    pub fn finish(self) -> SyntaxTree {
        SyntaxTree { nodes: self.nodes }
    }
}

/// Static type of an expression as reported by the frontend's type oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub arguments: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, arguments: Vec<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Head-name comparison, ignoring type arguments.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

/// On-demand static-type queries supplied by the frontend.
///
/// Only a minority of rules consult this; runs without type information pass
/// no oracle and those rules simply see `None`.
pub trait TypeOracle {
    fn static_type(&self, node: NodeId) -> Option<TypeDescriptor>;
}
