//! Formatting-preserving S-expression document model.
//!
//! KiCad board files (`.kicad_pcb`) are one big nested list:
//!
//! ```text
//! (kicad_pcb
//!     (version 20241229)
//!     (generator "pcbnew")
//!     (net 1 "GND")
//!     (segment (start 10 10) (end 20 10) (width 0.25) (layer "F.Cu") (net 1))
//! )
//! ```
//!
//! The [`Document`] keeps every node in a flat arena owned by the document.
//! Lists reference their children by index, and every node carries the
//! whitespace that preceded it in the source text (lists additionally keep the
//! whitespace before their closing parenthesis). Atoms keep their original
//! spelling, so serialising an unmodified document reproduces the input byte
//! for byte.
//!
//! Nodes are addressed by [`NodeId`], which embeds the id of the owning
//! document. Mutations reject ids from other documents and ids of nodes that
//! have already been removed.
//!
//! New content is described with the detached [`Expr`] builder and copied into
//! the arena by [`Document::append_child`], [`Document::insert_child`] and
//! [`Document::replace`].

mod reader;
mod writer;

pub use writer::{format_number, quote_string};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{DocumentError, DocumentResult};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_document_id() -> u64 {
    NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a node within a specific [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    document: u64,
    index: u32,
}

impl NodeId {
    /// Id of the document this node belongs to.
    #[must_use]
    pub const fn document(self) -> u64 {
        self.document
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document, self.index)
    }
}

/// The variant of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Parenthesised, ordered sequence of child nodes.
    List,
    /// Bare token such as `segment`, `F.Cu` or `yes`.
    Symbol,
    /// Double-quoted text.
    String,
    /// Numeric literal.
    Number,
}

#[derive(Debug, Clone)]
enum Content {
    List {
        children: Vec<u32>,
        /// Whitespace between the last child and the closing parenthesis.
        close: String,
    },
    Symbol(String),
    Str {
        raw: String,
        value: String,
    },
    Number {
        raw: String,
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct Slot {
    content: Content,
    /// Whitespace preceding the node in the source text.
    leading: String,
    parent: Option<u32>,
    attached: bool,
}

impl Slot {
    fn new(content: Content, leading: String, parent: Option<u32>) -> Self {
        Self {
            content,
            leading,
            parent,
            attached: true,
        }
    }
}

/// A detached expression used to build new document content.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A list of expressions. By convention the first item is the keyword.
    List(Vec<Expr>),
    /// A bare token.
    Symbol(String),
    /// Quoted text (stored unescaped, quoted on insertion).
    Str(String),
    /// A number, formatted with [`format_number`] on insertion.
    Number(f64),
}

impl Expr {
    /// Creates a keyword-headed list: `(head items...)`.
    pub fn node(head: &str, items: impl IntoIterator<Item = Self>) -> Self {
        let mut list = vec![Self::Symbol(head.to_string())];
        list.extend(items);
        Self::List(list)
    }

    /// Creates a bare symbol.
    pub fn symbol(value: impl Into<String>) -> Self {
        Self::Symbol(value.into())
    }

    /// Creates a quoted string.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Creates a number.
    #[must_use]
    pub const fn number(value: f64) -> Self {
        Self::Number(value)
    }

    /// Creates an integer number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // net numbers and counts are far below 2^53
    pub const fn integer(value: i64) -> Self {
        Self::Number(value as f64)
    }

    /// Creates `(head x y)`, the shape used for points and positions.
    #[must_use]
    pub fn point(head: &str, x: f64, y: f64) -> Self {
        Self::node(head, [Self::number(x), Self::number(y)])
    }
}

/// A borrowed view of one node in a [`Document`].
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    index: u32,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    fn slot(&self) -> &'a Slot {
        &self.doc.slots[self.index as usize]
    }

    /// Returns the identity of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.doc.node_id(self.index)
    }

    /// Returns the node variant.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self.slot().content {
            Content::List { .. } => NodeKind::List,
            Content::Symbol(_) => NodeKind::Symbol,
            Content::Str { .. } => NodeKind::String,
            Content::Number { .. } => NodeKind::Number,
        }
    }

    /// Returns `true` for list nodes.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.slot().content, Content::List { .. })
    }

    /// Returns the textual value of an atom.
    ///
    /// Symbols and numbers yield their source spelling, strings their
    /// unescaped contents. Lists yield `None`.
    #[must_use]
    pub fn atom(&self) -> Option<&'a str> {
        match &self.slot().content {
            Content::List { .. } => None,
            Content::Symbol(s) => Some(s),
            Content::Str { value, .. } => Some(value),
            Content::Number { raw, .. } => Some(raw),
        }
    }

    /// Returns the numeric value of an atom.
    ///
    /// Numbers yield their value; symbols and strings are parsed leniently so
    /// values such as `(size "1.2")` still resolve.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match &self.slot().content {
            Content::Number { value, .. } => Some(*value),
            Content::Symbol(s) | Content::Str { value: s, .. } => s.parse().ok(),
            Content::List { .. } => None,
        }
    }

    /// Returns the parent list, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.slot().parent.map(|index| Self {
            doc: self.doc,
            index,
        })
    }

    /// Iterates over the children of a list (empty for atoms).
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let doc = self.doc;
        let children: &'a [u32] = match &self.slot().content {
            Content::List { children, .. } => children,
            _ => &[],
        };
        children.iter().map(move |&index| NodeRef { doc, index })
    }

    /// Returns the keyword of a list: its first child when that child is a
    /// symbol.
    #[must_use]
    pub fn head(&self) -> Option<&'a str> {
        let first = self.children().next()?;
        match &first.slot().content {
            Content::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` if this is a list whose keyword is `head`.
    #[must_use]
    pub fn is(&self, head: &str) -> bool {
        self.head() == Some(head)
    }

    /// Returns the first child list with the given keyword.
    #[must_use]
    pub fn child(&self, head: &str) -> Option<NodeRef<'a>> {
        self.children().find(|c| c.is(head))
    }

    /// Iterates over the child lists with the given keyword.
    pub fn children_named<'h>(&self, head: &'h str) -> impl Iterator<Item = NodeRef<'a>> + 'h
    where
        'a: 'h,
    {
        self.children().filter(move |c| c.is(head))
    }

    /// Returns the atom values after the keyword.
    ///
    /// For `(net 3 "VCC")` this is `["3", "VCC"]`.
    #[must_use]
    pub fn values(&self) -> Vec<&'a str> {
        self.children()
            .skip(usize::from(self.head().is_some()))
            .filter_map(|c| c.atom())
            .collect()
    }

    /// Returns the first atom value after the keyword.
    #[must_use]
    pub fn first_value(&self) -> Option<&'a str> {
        self.values().first().copied()
    }

    /// Returns the numeric atom values after the keyword.
    #[must_use]
    pub fn numbers(&self) -> Vec<f64> {
        self.children()
            .skip(usize::from(self.head().is_some()))
            .filter(|c| !c.is_list())
            .filter_map(|c| c.as_f64())
            .collect()
    }

    /// Serialises this subtree (without the whitespace preceding it).
    #[must_use]
    pub fn to_text(&self) -> String {
        writer::write_subtree(self.doc, self.index)
    }
}

/// A parsed board document.
///
/// The document exclusively owns its nodes; ids handed out by one document are
/// rejected by every other document.
#[derive(Debug)]
pub struct Document {
    id: u64,
    slots: Vec<Slot>,
    root: u32,
    /// Whitespace after the root expression.
    trailing: String,
}

impl Document {
    /// Parses document text.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Syntax`] on unbalanced parentheses,
    /// unterminated strings, invalid numeric literals, or content outside
    /// the single root list.
    pub fn parse(text: &str) -> DocumentResult<Self> {
        let parsed = reader::parse(text)?;
        Ok(Self {
            id: next_document_id(),
            slots: parsed.slots,
            root: parsed.root,
            trailing: parsed.trailing,
        })
    }

    /// Serialises the document back to text.
    ///
    /// Unmodified subtrees are reproduced exactly as parsed.
    #[must_use]
    pub fn serialize(&self) -> String {
        writer::write_document(self)
    }

    /// Returns this document's id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    const fn node_id(&self, index: u32) -> NodeId {
        NodeId {
            document: self.id,
            index,
        }
    }

    /// Returns the root list.
    #[must_use]
    pub const fn root(&self) -> NodeRef<'_> {
        NodeRef {
            doc: self,
            index: self.root,
        }
    }

    /// Returns `true` if `id` refers to a node currently attached to this
    /// document.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.check(id).is_ok()
    }

    /// Looks up a node.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Ownership`] if the node is not attached to
    /// this document.
    pub fn node(&self, id: NodeId) -> DocumentResult<NodeRef<'_>> {
        let index = self.check(id)?;
        Ok(NodeRef { doc: self, index })
    }

    fn check(&self, id: NodeId) -> DocumentResult<u32> {
        if id.document != self.id {
            return Err(DocumentError::ownership(id, self.id));
        }
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.attached => Ok(id.index),
            _ => Err(DocumentError::ownership(id, self.id)),
        }
    }

    /// Depth-first, pre-order search from the root.
    ///
    /// The returned iterator is lazy; calling `find` again restarts the
    /// traversal.
    pub fn find<'a, P>(&'a self, predicate: P) -> Find<'a, P>
    where
        P: FnMut(&NodeRef<'a>) -> bool,
    {
        Find {
            doc: self,
            stack: vec![self.root],
            predicate,
        }
    }

    /// Depth-first, pre-order search of the subtree rooted at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Ownership`] if `start` is not attached to
    /// this document.
    pub fn find_from<'a, P>(
        &'a self,
        start: NodeId,
        predicate: P,
    ) -> DocumentResult<Find<'a, P>>
    where
        P: FnMut(&NodeRef<'a>) -> bool,
    {
        let index = self.check(start)?;
        Ok(Find {
            doc: self,
            stack: vec![index],
            predicate,
        })
    }

    fn list_children_mut(&mut self, index: u32) -> Option<&mut Vec<u32>> {
        match &mut self.slots[index as usize].content {
            Content::List { children, .. } => Some(children),
            _ => None,
        }
    }

    fn require_list(&self, id: NodeId) -> DocumentResult<u32> {
        let index = self.check(id)?;
        if matches!(self.slots[index as usize].content, Content::List { .. }) {
            Ok(index)
        } else {
            Err(DocumentError::invalid_target(id, "not a list"))
        }
    }

    /// Leading whitespace for a child inserted at `position` in `parent`.
    ///
    /// Lists copy the indentation of an adjacent list sibling so appended
    /// elements line up with the existing ones; everything else is separated
    /// by a single space.
    fn leading_for(&self, parent: u32, position: usize, expr: &Expr) -> String {
        let children = match &self.slots[parent as usize].content {
            Content::List { children, .. } => children,
            _ => return String::new(),
        };
        if children.is_empty() || position == 0 {
            return String::new();
        }
        if matches!(expr, Expr::List(_)) {
            let neighbours = children[..position]
                .iter()
                .rev()
                .chain(children[position..].iter());
            for &sibling in neighbours {
                let slot = &self.slots[sibling as usize];
                if matches!(slot.content, Content::List { .. }) && !slot.leading.is_empty() {
                    return slot.leading.clone();
                }
            }
        }
        " ".to_string()
    }

    fn alloc(&mut self, expr: &Expr, parent: Option<u32>, leading: String) -> u32 {
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        let content = match expr {
            Expr::List(_) => Content::List {
                children: Vec::new(),
                close: String::new(),
            },
            Expr::Symbol(s) => Content::Symbol(s.clone()),
            Expr::Str(s) => Content::Str {
                raw: quote_string(s),
                value: s.clone(),
            },
            Expr::Number(v) => Content::Number {
                raw: format_number(*v),
                value: *v,
            },
        };
        self.slots.push(Slot::new(content, leading, parent));

        if let Expr::List(items) = expr {
            let mut children = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let lead = if i == 0 { String::new() } else { " ".to_string() };
                children.push(self.alloc(item, Some(index), lead));
            }
            if let Some(slot_children) = self.list_children_mut(index) {
                *slot_children = children;
            }
        }
        index
    }

    /// Appends `expr` as the last child of the list `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Ownership`] if `parent` is not attached to
    /// this document, or [`DocumentError::InvalidTarget`] if it is an atom.
    pub fn append_child(&mut self, parent: NodeId, expr: Expr) -> DocumentResult<NodeId> {
        let parent_index = self.require_list(parent)?;
        let position = self
            .list_children_mut(parent_index)
            .map_or(0, |children| children.len());
        self.insert_at(parent_index, position, &expr)
    }

    /// Inserts `expr` into the list `parent` before the child at `position`.
    ///
    /// A `position` past the end appends.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Ownership`] if `parent` is not attached to
    /// this document, or [`DocumentError::InvalidTarget`] if it is an atom.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        position: usize,
        expr: Expr,
    ) -> DocumentResult<NodeId> {
        let parent_index = self.require_list(parent)?;
        let len = self
            .list_children_mut(parent_index)
            .map_or(0, |children| children.len());
        self.insert_at(parent_index, position.min(len), &expr)
    }

    fn insert_at(&mut self, parent: u32, position: usize, expr: &Expr) -> DocumentResult<NodeId> {
        let leading = self.leading_for(parent, position, expr);
        let index = self.alloc(expr, Some(parent), leading);
        if let Some(children) = self.list_children_mut(parent) {
            children.insert(position, index);
        }
        Ok(self.node_id(index))
    }

    /// Replaces `target` (and its subtree) with `expr`.
    ///
    /// The replacement inherits the target's leading whitespace. Replacing
    /// the root is allowed and keeps the document id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Ownership`] if `target` is not attached to
    /// this document.
    pub fn replace(&mut self, target: NodeId, expr: Expr) -> DocumentResult<NodeId> {
        let target_index = self.check(target)?;
        let slot = &self.slots[target_index as usize];
        let leading = slot.leading.clone();
        let parent = slot.parent;

        let new_index = self.alloc(&expr, parent, leading);
        match parent {
            Some(parent_index) => {
                if let Some(children) = self.list_children_mut(parent_index) {
                    if let Some(pos) = children.iter().position(|&c| c == target_index) {
                        children[pos] = new_index;
                    }
                }
            }
            None => self.root = new_index,
        }
        self.detach(target_index);
        Ok(self.node_id(new_index))
    }

    /// Removes `target` (and its subtree) from its parent list.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Ownership`] if `target` is not attached to
    /// this document, or [`DocumentError::InvalidTarget`] for the root.
    pub fn remove(&mut self, target: NodeId) -> DocumentResult<()> {
        let target_index = self.check(target)?;
        let Some(parent) = self.slots[target_index as usize].parent else {
            return Err(DocumentError::invalid_target(
                target,
                "the root node cannot be removed",
            ));
        };
        if let Some(children) = self.list_children_mut(parent) {
            children.retain(|&c| c != target_index);
        }
        self.detach(target_index);
        Ok(())
    }

    fn detach(&mut self, index: u32) {
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current as usize];
            slot.attached = false;
            slot.parent = None;
            if let Content::List { children, .. } = &slot.content {
                stack.extend(children.iter().copied());
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Lazy pre-order traversal returned by [`Document::find`].
pub struct Find<'a, P> {
    doc: &'a Document,
    stack: Vec<u32>,
    predicate: P,
}

impl<'a, P> Iterator for Find<'a, P>
where
    P: FnMut(&NodeRef<'a>) -> bool,
{
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(index) = self.stack.pop() {
            let node = NodeRef {
                doc: self.doc,
                index,
            };
            if let Content::List { children, .. } = &self.doc.slots[index as usize].content {
                self.stack.extend(children.iter().rev().copied());
            }
            if (self.predicate)(&node) {
                return Some(node);
            }
        }
        None
    }
}
