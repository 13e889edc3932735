//! # seqset-rs
//!
//! A set of sequences over the three-symbol alphabet `{0, 1, 2}`, stored as a
//! ternary tree with user-defined equivalence classes over the stored
//! sequences.
//!
//! A sequence is identified purely by its path from the root: the child at
//! index `i` extends its parent's sequence with symbol `i`, so no sequence is
//! ever stored explicitly. Adding a sequence implicitly adds every prefix of
//! it, and removing one removes every extension of it. Any two stored
//! sequences can be merged into one equivalence class, and a class can carry
//! a single shared name.
//!
//! The set is a single-threaded, in-process structure: wrap it in your own
//! synchronization if it must be shared.
//!
//! ## Example
//!
//! ```rust
//! use seqset_rs::SeqSet;
//!
//! let mut set = SeqSet::new();
//! set.add("012").unwrap();
//! assert!(set.contains("01").unwrap()); // prefixes are implied
//!
//! set.set_name("01", "even").unwrap();
//! assert_eq!(set.get_name("01").unwrap(), Some("even"));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::mem;

use smallvec::SmallVec;

// =============================================================================
// Errors and operation outcomes
// =============================================================================

/// Errors reported by [`SeqSet`] operations.
///
/// Negative outcomes that are not failures ("not found", "unchanged",
/// "already present") are reported through each operation's success value,
/// never through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A sequence argument was empty or contained a symbol outside
    /// `{'0', '1', '2'}`, or a name argument was empty.
    #[error("invalid sequence or name argument")]
    InvalidArgument,
    /// The configured memory limit was exceeded. The failing operation left
    /// the set exactly as it was before the call.
    #[error("memory limit exceeded")]
    OutOfMemory,
}

/// Outcome of [`SeqSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// At least one new node was created.
    Created,
    /// The sequence and all of its prefixes already existed.
    AlreadyPresent,
}

/// Outcome of [`SeqSet::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    /// The sequence and every extension of it were removed.
    Removed,
    /// The sequence was not in the set.
    NotFound,
}

/// Outcome of [`SeqSet::set_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameResult {
    /// The class name was set or replaced.
    Set,
    /// The class already had this exact name.
    Unchanged,
    /// The sequence was not in the set.
    NotFound,
}

/// Outcome of [`SeqSet::make_equivalent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquivResult {
    /// Two distinct classes were merged into one.
    Merged,
    /// Nothing to do: a sequence was missing, both named the same node, or
    /// both were already in the same class.
    Unchanged,
}

// =============================================================================
// Arena handles
// =============================================================================

/// Index of a node in the arena. `NULL` marks an absent child or list end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct NodeId(u32);

impl NodeId {
    const NULL: NodeId = NodeId(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn index(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }

    #[inline]
    fn from_usize(i: usize) -> Self {
        debug_assert!(i < u32::MAX as usize);
        NodeId(i as u32)
    }
}

/// Index of an interned class name. `NULL` marks an unnamed class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct NameId(u32);

impl NameId {
    const NULL: NameId = NameId(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn index(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }

    #[inline]
    fn from_usize(i: usize) -> Self {
        debug_assert!(i < u32::MAX as usize);
        NameId(i as u32)
    }
}

const ROOT: NodeId = NodeId(0);

/// Alphabet size; child `i` appends symbol `i` to the parent's sequence.
const SYMBOLS: usize = 3;

// =============================================================================
// Interned class names
// =============================================================================

/// One name allocation shared by every member of an equivalence class.
#[derive(Debug, Clone)]
struct NameEntry {
    text: Box<str>,
    /// Number of nodes currently pointing at this entry. The entry is freed
    /// exactly when this reaches zero.
    refs: u32,
}

/// Slab of class names with slot recycling.
///
/// Interning gives each class one allocation regardless of member count, and
/// makes "same name object" a [`NameId`] comparison.
#[derive(Debug, Clone, Default)]
struct NameTable {
    entries: Vec<Option<NameEntry>>,
    free: Vec<NameId>,
}

impl NameTable {
    /// Adds a new entry with zero references. The caller must hand the id to
    /// at least one node (via `acquire`) before the operation returns.
    fn intern(&mut self, text: &str) -> NameId {
        let entry = NameEntry {
            text: Box::from(text),
            refs: 0,
        };
        match self.free.pop() {
            Some(id) => {
                debug_assert!(self.entries[id.index()].is_none());
                self.entries[id.index()] = Some(entry);
                id
            }
            None => {
                let id = NameId::from_usize(self.entries.len());
                self.entries.push(Some(entry));
                id
            }
        }
    }

    fn text(&self, id: NameId) -> &str {
        &self.entries[id.index()].as_ref().expect("live name entry").text
    }

    fn acquire(&mut self, id: NameId) {
        self.entries[id.index()].as_mut().expect("live name entry").refs += 1;
    }

    /// Drops one reference. Returns the freed text length once the last
    /// reference is gone, so the caller can credit its memory accounting.
    fn release(&mut self, id: NameId) -> Option<usize> {
        let entry = self.entries[id.index()].as_mut().expect("live name entry");
        debug_assert!(entry.refs > 0);
        entry.refs -= 1;
        if entry.refs > 0 {
            return None;
        }
        let entry = self.entries[id.index()].take().expect("live name entry");
        self.free.push(id);
        Some(entry.text.len())
    }

    fn live_count(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    fn live_bytes(&self) -> usize {
        self.entries.iter().flatten().map(|e| e.text.len()).sum()
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A tree node. Its sequence is the path of child indices from the root.
///
/// `prev`/`next` form an intrusive doubly-linked list over all nodes in the
/// same equivalence class; a node with both `NULL` is a singleton class.
/// `name` is shared (same [`NameId`]) by every member of the list.
#[derive(Debug, Clone)]
struct Node {
    children: [NodeId; SYMBOLS],
    prev: NodeId,
    next: NodeId,
    name: NameId,
}

impl Node {
    #[inline]
    fn empty() -> Self {
        Node {
            children: [NodeId::NULL; SYMBOLS],
            prev: NodeId::NULL,
            next: NodeId::NULL,
            name: NameId::NULL,
        }
    }
}

/// Bytes charged against the memory limit per live node.
const NODE_COST: usize = mem::size_of::<Node>();

// =============================================================================
// Input validation
// =============================================================================

#[inline]
fn check_sequence(s: &str) -> Result<(), Error> {
    if s.is_empty() || !s.bytes().all(|b| (b'0'..=b'2').contains(&b)) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// Child index for a validated symbol byte.
#[inline]
fn child_slot(b: u8) -> usize {
    debug_assert!((b'0'..=b'2').contains(&b));
    (b - b'0') as usize
}

// =============================================================================
// SeqSet
// =============================================================================

/// Memory usage statistics for a [`SeqSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Live nodes, including the root.
    pub live_nodes: usize,
    /// Bytes charged for live nodes.
    pub node_bytes: usize,
    /// Distinct class names currently interned.
    pub name_count: usize,
    /// Bytes charged for interned name text.
    pub name_bytes: usize,
    /// Total bytes charged against the limit.
    pub mem_used: usize,
    /// Configured limit, if any.
    pub mem_limit: Option<usize>,
}

/// A set of sequences over `{0, 1, 2}` with named equivalence classes.
///
/// Nodes live in an index-addressed arena; removal recycles slots through a
/// free list, so handles never dangle across splices. Dropping the set
/// releases every node and every class name.
#[derive(Debug, Clone)]
pub struct SeqSet {
    nodes: Vec<Node>,
    free_nodes: Vec<NodeId>,
    names: NameTable,
    live_nodes: usize,
    mem_used: usize,
    mem_limit: Option<usize>,
}

impl SeqSet {
    /// Creates an empty set with no memory limit.
    pub fn new() -> Self {
        SeqSet {
            nodes: vec![Node::empty()],
            free_nodes: Vec::new(),
            names: NameTable::default(),
            live_nodes: 1,
            mem_used: NODE_COST,
            mem_limit: None,
        }
    }

    /// Creates an empty set that will report [`Error::OutOfMemory`] once
    /// nodes plus interned name text would exceed `limit` bytes.
    ///
    /// Every node costs `size_of::<Node>()` and every class name costs its
    /// text length. Fails if even the root node does not fit, leaving no
    /// partial state behind.
    pub fn with_memory_limit(limit: usize) -> Result<Self, Error> {
        if NODE_COST > limit {
            return Err(Error::OutOfMemory);
        }
        let mut set = Self::new();
        set.mem_limit = Some(limit);
        Ok(set)
    }

    /// Number of sequences stored. The empty sequence at the root is not
    /// counted.
    pub fn len(&self) -> usize {
        self.live_nodes - 1
    }

    /// Whether no sequences are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current memory usage and accounting state.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            live_nodes: self.live_nodes,
            node_bytes: self.live_nodes * NODE_COST,
            name_count: self.names.live_count(),
            name_bytes: self.names.live_bytes(),
            mem_used: self.mem_used,
            mem_limit: self.mem_limit,
        }
    }

    // -------------------------------------------------------------------------
    // Accounting and node allocation
    // -------------------------------------------------------------------------

    fn try_charge(&mut self, bytes: usize) -> Result<(), Error> {
        if let Some(limit) = self.mem_limit {
            if self.mem_used + bytes > limit {
                return Err(Error::OutOfMemory);
            }
        }
        self.mem_used += bytes;
        Ok(())
    }

    #[inline]
    fn credit(&mut self, bytes: usize) {
        debug_assert!(self.mem_used >= bytes);
        self.mem_used -= bytes;
    }

    fn alloc_node(&mut self) -> Result<NodeId, Error> {
        self.try_charge(NODE_COST)?;
        self.live_nodes += 1;
        match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id.index()] = Node::empty();
                Ok(id)
            }
            None => {
                let id = NodeId::from_usize(self.nodes.len());
                self.nodes.push(Node::empty());
                Ok(id)
            }
        }
    }

    fn free_node(&mut self, id: NodeId) {
        debug_assert!(id != ROOT);
        self.nodes[id.index()] = Node::empty();
        self.free_nodes.push(id);
        self.live_nodes -= 1;
        self.credit(NODE_COST);
    }

    // -------------------------------------------------------------------------
    // Path walks
    // -------------------------------------------------------------------------

    /// Node at path `s`, or `NULL`. `s` must already be validated.
    fn find(&self, s: &str) -> NodeId {
        let mut cur = ROOT;
        for b in s.bytes() {
            let child = self.nodes[cur.index()].children[child_slot(b)];
            if child.is_null() {
                return NodeId::NULL;
            }
            cur = child;
        }
        cur
    }

    /// Adds `s` and all of its prefixes, creating missing nodes lazily.
    ///
    /// If the memory limit is hit mid-walk, every node created by this call
    /// is destroyed again (the first created node is detached from its parent
    /// and its subtree unwound), pre-existing nodes are untouched, and the
    /// call fails with [`Error::OutOfMemory`].
    pub fn add(&mut self, s: &str) -> Result<AddResult, Error> {
        check_sequence(s)?;

        let mut cur = ROOT;
        let mut first_new = NodeId::NULL;
        let mut first_new_parent = NodeId::NULL;
        let mut first_new_slot = 0usize;

        for b in s.bytes() {
            let slot = child_slot(b);
            let child = self.nodes[cur.index()].children[slot];
            if !child.is_null() {
                cur = child;
                continue;
            }
            let id = match self.alloc_node() {
                Ok(id) => id,
                Err(e) => {
                    if !first_new.is_null() {
                        self.nodes[first_new_parent.index()].children[first_new_slot] =
                            NodeId::NULL;
                        self.destroy_subtree(first_new);
                    }
                    return Err(e);
                }
            };
            self.nodes[cur.index()].children[slot] = id;
            if first_new.is_null() {
                first_new = id;
                first_new_parent = cur;
                first_new_slot = slot;
            }
            cur = id;
        }

        Ok(if first_new.is_null() {
            AddResult::AlreadyPresent
        } else {
            AddResult::Created
        })
    }

    /// Removes `s` and every sequence extending it.
    ///
    /// Each destroyed node is spliced out of its own equivalence class;
    /// distinct nodes in the subtree may belong to unrelated classes
    /// elsewhere in the tree, and those classes stay consistent.
    pub fn remove(&mut self, s: &str) -> Result<RemoveResult, Error> {
        check_sequence(s)?;

        let bytes = s.as_bytes();
        let mut parent = ROOT;
        for &b in &bytes[..bytes.len() - 1] {
            let child = self.nodes[parent.index()].children[child_slot(b)];
            if child.is_null() {
                return Ok(RemoveResult::NotFound);
            }
            parent = child;
        }

        let slot = child_slot(bytes[bytes.len() - 1]);
        let target = self.nodes[parent.index()].children[slot];
        if target.is_null() {
            return Ok(RemoveResult::NotFound);
        }
        self.nodes[parent.index()].children[slot] = NodeId::NULL;
        self.destroy_subtree(target);
        Ok(RemoveResult::Removed)
    }

    /// Whether a node exists at path `s`.
    pub fn contains(&self, s: &str) -> Result<bool, Error> {
        check_sequence(s)?;
        Ok(!self.find(s).is_null())
    }

    /// Destroys a subtree whose root has already been detached from its
    /// parent slot. Iterative, so sequence length does not bound stack depth.
    fn destroy_subtree(&mut self, root: NodeId) {
        let mut stack: SmallVec<[NodeId; 16]> = SmallVec::new();
        stack.push(root);
        while let Some(id) = stack.pop() {
            for child in self.nodes[id.index()].children {
                if !child.is_null() {
                    stack.push(child);
                }
            }
            self.unlink_class(id);
            self.free_node(id);
        }
    }

    /// Splices a node out of its equivalence class and drops its name
    /// reference. Neighbors keep sharing the name; the allocation is freed
    /// only when the last member lets go.
    fn unlink_class(&mut self, id: NodeId) {
        let node = &self.nodes[id.index()];
        let (prev, next, name) = (node.prev, node.next, node.name);
        if !prev.is_null() {
            self.nodes[prev.index()].next = next;
        }
        if !next.is_null() {
            self.nodes[next.index()].prev = prev;
        }
        if !name.is_null() {
            if let Some(bytes) = self.names.release(name) {
                self.credit(bytes);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Equivalence classes
    // -------------------------------------------------------------------------

    fn class_head(&self, mut id: NodeId) -> NodeId {
        while !self.nodes[id.index()].prev.is_null() {
            id = self.nodes[id.index()].prev;
        }
        id
    }

    fn class_tail(&self, mut id: NodeId) -> NodeId {
        while !self.nodes[id.index()].next.is_null() {
            id = self.nodes[id.index()].next;
        }
        id
    }

    /// Interns `text` against the memory budget.
    fn intern_name(&mut self, text: &str) -> Result<NameId, Error> {
        self.try_charge(text.len())?;
        Ok(self.names.intern(text))
    }

    /// Points every member of the list containing `head` at `name`, adjusting
    /// reference counts. A superseded name is freed exactly once, when its
    /// last member is rewritten.
    fn assign_name(&mut self, head: NodeId, name: NameId) {
        debug_assert!(self.nodes[head.index()].prev.is_null());
        let mut cur = head;
        while !cur.is_null() {
            let old = self.nodes[cur.index()].name;
            if old != name {
                if !old.is_null() {
                    if let Some(bytes) = self.names.release(old) {
                        self.credit(bytes);
                    }
                }
                self.nodes[cur.index()].name = name;
                self.names.acquire(name);
            }
            cur = self.nodes[cur.index()].next;
        }
    }

    /// Sets or replaces the name of the class containing the node at `s`.
    ///
    /// The new text is allocated before the old name is touched, so an
    /// [`Error::OutOfMemory`] failure leaves the previous name intact.
    pub fn set_name(&mut self, s: &str, name: &str) -> Result<NameResult, Error> {
        check_sequence(s)?;
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let node = self.find(s);
        if node.is_null() {
            return Ok(NameResult::NotFound);
        }
        let old = self.nodes[node.index()].name;
        if !old.is_null() && self.names.text(old) == name {
            return Ok(NameResult::Unchanged);
        }

        let new_id = self.intern_name(name)?;
        let head = self.class_head(node);
        self.assign_name(head, new_id);
        Ok(NameResult::Set)
    }

    /// Name of the class containing the node at `s`.
    ///
    /// Returns `None` both when the sequence is absent and when its class is
    /// unnamed; only malformed input is an error.
    pub fn get_name(&self, s: &str) -> Result<Option<&str>, Error> {
        check_sequence(s)?;
        let node = self.find(s);
        if node.is_null() {
            return Ok(None);
        }
        let name = self.nodes[node.index()].name;
        Ok(if name.is_null() {
            None
        } else {
            Some(self.names.text(name))
        })
    }

    /// Merges the equivalence classes of the nodes at `s1` and `s2`.
    ///
    /// The merged class is named by cases: both unnamed stays unnamed;
    /// exactly one named keeps that name; identically named keeps one copy;
    /// differently named gets the concatenation, `s1`'s class name first.
    /// The concatenation is the only allocation and happens before the lists
    /// are linked, so an [`Error::OutOfMemory`] failure changes nothing.
    ///
    /// Reports [`EquivResult::Unchanged`] if either sequence is absent, both
    /// name the same node, or the two nodes already share a class.
    pub fn make_equivalent(&mut self, s1: &str, s2: &str) -> Result<EquivResult, Error> {
        check_sequence(s1)?;
        check_sequence(s2)?;

        let n1 = self.find(s1);
        let n2 = self.find(s2);
        if n1.is_null() || n2.is_null() || n1 == n2 {
            return Ok(EquivResult::Unchanged);
        }

        let name1 = self.nodes[n1.index()].name;
        let name2 = self.nodes[n2.index()].name;
        if !name1.is_null() && name1 == name2 {
            return Ok(EquivResult::Unchanged);
        }

        // Unnamed classes have no shared object to compare, so same-class
        // membership is detected by tail identity. Splicing a list into
        // itself would create a cycle.
        let tail1 = self.class_tail(n1);
        let tail2 = self.class_tail(n2);
        if tail1 == tail2 {
            return Ok(EquivResult::Unchanged);
        }

        let merged = if name1.is_null() && name2.is_null() {
            NameId::NULL
        } else if name1.is_null() {
            name2
        } else if name2.is_null() {
            name1
        } else {
            let t1 = self.names.text(name1);
            let t2 = self.names.text(name2);
            if t1 == t2 {
                name1
            } else {
                let joined = format!("{t1}{t2}");
                self.intern_name(&joined)?
            }
        };

        let head2 = self.class_head(n2);
        self.nodes[tail1.index()].next = head2;
        self.nodes[head2.index()].prev = tail1;

        if !merged.is_null() {
            let head = self.class_head(n1);
            self.assign_name(head, merged);
        }
        Ok(EquivResult::Merged)
    }
}

impl Default for SeqSet {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptests;
