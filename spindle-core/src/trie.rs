//! Subscription trie for prefix-based topic matching in SUB/XSUB sockets.
//!
//! A compressed (patricia) trie: every node stores up to [`PREFIX_MAX`] bytes
//! of prefix, a reference count of subscriptions ending exactly there, and
//! its children. Children are kept in a small sparse list of
//! `(byte, node)` pairs while there are at most [`SPARSE_MAX`] of them, and in
//! a dense table covering `min..=max` otherwise.
//!
//! ```text
//! subscribe("abcd"), subscribe("abxy"), subscribe("ab"):
//!
//!   ["ab" refs=1] --c--> ["d" refs=1]
//!                 \-x--> ["y" refs=1]
//! ```
//!
//! A message matches when some subscription is a prefix of it. The empty
//! subscription matches everything.

use crate::error::{Result, SpindleError};
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Maximum number of prefix bytes stored in a single node.
pub const PREFIX_MAX: usize = 10;

/// Maximum number of children kept in sparse form.
pub const SPARSE_MAX: usize = 8;

enum Children {
    Sparse(SmallVec<[(u8, Box<Node>); SPARSE_MAX]>),
    Dense {
        min: u8,
        max: u8,
        /// Number of occupied slots.
        nbr: u16,
        slots: Vec<Option<Box<Node>>>,
    },
}

impl Children {
    fn none() -> Self {
        Self::Sparse(SmallVec::new())
    }
}

struct Node {
    refcount: u32,
    prefix: SmallVec<[u8; PREFIX_MAX]>,
    children: Children,
}

/// What removing a subscription did to a node.
enum Removal {
    /// Refcount dropped but stays positive.
    Decremented,
    /// The subscription is gone; the node is still needed.
    Released,
    /// The subscription is gone and the node must be unlinked by its parent.
    Deleted,
}

impl Node {
    fn new(prefix: &[u8]) -> Self {
        Self {
            refcount: 0,
            prefix: SmallVec::from_slice(prefix),
            children: Children::none(),
        }
    }

    /// Builds the node chain for a fresh subscription to `data`.
    fn chain(data: &[u8]) -> Box<Self> {
        let (head, rest) = data.split_at(data.len().min(PREFIX_MAX));
        let mut node = Box::new(Self::new(head));
        match rest.split_first() {
            None => node.refcount = 1,
            Some((&c, tail)) => node.children = Children::Sparse(smallvec![(c, Self::chain(tail))]),
        }
        node
    }

    /// Number of leading bytes of `data` matching this node's prefix.
    fn check_prefix(&self, data: &[u8]) -> usize {
        self.prefix
            .iter()
            .zip(data)
            .take_while(|(a, b)| a == b)
            .count()
    }

    fn has_children(&self) -> bool {
        match &self.children {
            Children::Sparse(children) => !children.is_empty(),
            Children::Dense { nbr, .. } => *nbr > 0,
        }
    }

    fn child(&self, c: u8) -> Option<&Node> {
        match &self.children {
            Children::Sparse(children) => children
                .iter()
                .find(|(key, _)| *key == c)
                .map(|(_, node)| &**node),
            Children::Dense { min, max, slots, .. } if (*min..=*max).contains(&c) => {
                slots[usize::from(c - *min)].as_deref()
            }
            Children::Dense { .. } => None,
        }
    }

    fn child_mut(&mut self, c: u8) -> Option<&mut Box<Node>> {
        match &mut self.children {
            Children::Sparse(children) => children
                .iter_mut()
                .find(|(key, _)| *key == c)
                .map(|(_, node)| node),
            Children::Dense { min, max, slots, .. } if (*min..=*max).contains(&c) => {
                slots[usize::from(c - *min)].as_mut()
            }
            Children::Dense { .. } => None,
        }
    }

    /// Splits the prefix at `pos`: this node keeps `prefix[..pos]` and gets a
    /// single child holding the rest, the refcount, and the old children.
    fn split(&mut self, pos: usize) {
        let key = self.prefix[pos];
        let mut child = Box::new(Node {
            refcount: self.refcount,
            prefix: SmallVec::from_slice(&self.prefix[pos + 1..]),
            children: std::mem::replace(&mut self.children, Children::none()),
        });
        compact(&mut child);
        self.prefix.truncate(pos);
        self.refcount = 0;
        self.children = Children::Sparse(smallvec![(key, child)]);
    }

    /// Adds a child under a byte that has none yet.
    fn add_child(&mut self, c: u8, child: Box<Node>) {
        if let Children::Sparse(children) = &mut self.children {
            if children.len() < SPARSE_MAX {
                children.push((c, child));
                return;
            }
            let full = std::mem::take(children);
            self.children = to_dense(full, c, child);
            return;
        }

        let Children::Dense {
            min,
            max,
            nbr,
            slots,
        } = &mut self.children
        else {
            unreachable!("sparse handled above");
        };
        if c < *min {
            let mut grown = Vec::with_capacity(usize::from(*max - c) + 1);
            grown.resize_with(usize::from(*min - c), || None);
            grown.append(slots);
            *slots = grown;
            *min = c;
        } else if c > *max {
            slots.resize_with(usize::from(c - *min) + 1, || None);
            *max = c;
        }
        slots[usize::from(c - *min)] = Some(child);
        *nbr += 1;
    }

    /// Unlinks the (deleted) child under `c`.
    fn prune(&mut self, c: u8) {
        let sparse = match &mut self.children {
            Children::Sparse(children) => {
                children.retain(|(key, _)| *key != c);
                return;
            }
            Children::Dense {
                min,
                max,
                nbr,
                slots,
            } => {
                slots[usize::from(c - *min)] = None;
                if usize::from(*nbr) > SPARSE_MAX + 1 {
                    *nbr -= 1;
                    if c == *min {
                        let first = slots.iter().position(Option::is_some).unwrap_or(0);
                        slots.drain(..first);
                        *min += first as u8;
                    } else if c == *max {
                        let last = slots.iter().rposition(Option::is_some).unwrap_or(0);
                        slots.truncate(last + 1);
                        *max = *min + last as u8;
                    }
                    return;
                }
                let base = *min;
                let children: SmallVec<[(u8, Box<Node>); SPARSE_MAX]> = slots
                    .drain(..)
                    .enumerate()
                    .filter_map(|(i, slot)| slot.map(|node| (base + i as u8, node)))
                    .collect();
                debug_assert_eq!(children.len(), SPARSE_MAX);
                children
            }
        };
        self.children = Children::Sparse(sparse);
    }
}

fn to_dense(
    sparse: SmallVec<[(u8, Box<Node>); SPARSE_MAX]>,
    c: u8,
    child: Box<Node>,
) -> Children {
    let (min, max) = sparse
        .iter()
        .fold((c, c), |(lo, hi), (key, _)| (lo.min(*key), hi.max(*key)));
    let mut slots: Vec<Option<Box<Node>>> = Vec::new();
    slots.resize_with(usize::from(max - min) + 1, || None);
    let nbr = sparse.len() as u16 + 1;
    for (key, node) in sparse {
        slots[usize::from(key - min)] = Some(node);
    }
    slots[usize::from(c - min)] = Some(child);
    Children::Dense {
        min,
        max,
        nbr,
        slots,
    }
}

/// Merges a subscription-less node into its only child when the combined
/// prefix fits into one node.
fn compact(node: &mut Box<Node>) {
    if node.refcount > 0 {
        return;
    }
    let Children::Sparse(children) = &mut node.children else {
        return;
    };
    if children.len() != 1 || node.prefix.len() + 1 + children[0].1.prefix.len() > PREFIX_MAX {
        return;
    }
    let Some((key, mut child)) = children.pop() else {
        return;
    };
    let mut prefix = std::mem::take(&mut node.prefix);
    prefix.push(key);
    prefix.extend_from_slice(&child.prefix);
    child.prefix = prefix;
    *node = child;
}

fn insert(node: &mut Node, data: &[u8]) -> bool {
    let pos = node.check_prefix(data);
    if pos < node.prefix.len() {
        node.split(pos);
    }
    let Some((&c, tail)) = data[pos..].split_first() else {
        node.refcount += 1;
        return node.refcount == 1;
    };
    match node.child_mut(c) {
        Some(child) => insert(child, tail),
        None => {
            node.add_child(c, Node::chain(tail));
            true
        }
    }
}

fn remove(node: &mut Box<Node>, data: &[u8]) -> Result<Removal> {
    let len = node.prefix.len();
    if node.check_prefix(data) != len {
        return Err(SpindleError::SubscriptionNotFound);
    }

    let Some((&c, tail)) = data[len..].split_first() else {
        if node.refcount == 0 {
            return Err(SpindleError::SubscriptionNotFound);
        }
        node.refcount -= 1;
        if node.refcount > 0 {
            return Ok(Removal::Decremented);
        }
        if !node.has_children() {
            return Ok(Removal::Deleted);
        }
        compact(node);
        return Ok(Removal::Released);
    };

    let child = node.child_mut(c).ok_or(SpindleError::SubscriptionNotFound)?;
    match remove(child, tail)? {
        Removal::Deleted => {}
        other => return Ok(other),
    }

    node.prune(c);
    if matches!(node.children, Children::Sparse(_)) {
        if !node.has_children() && node.refcount == 0 {
            return Ok(Removal::Deleted);
        }
        compact(node);
    }
    Ok(Removal::Released)
}

/// Reference-counted set of topic prefixes.
#[derive(Default)]
pub struct SubscriptionTrie {
    root: Option<Box<Node>>,
}

impl SubscriptionTrie {
    #[must_use]
    pub const fn new() -> Self {
        Self { root: None }
    }

    /// Adds one reference to `topic`. Returns true if it is a new subscription.
    pub fn subscribe(&mut self, topic: &[u8]) -> bool {
        match self.root.as_deref_mut() {
            Some(root) => insert(root, topic),
            None => {
                self.root = Some(Node::chain(topic));
                true
            }
        }
    }

    /// Drops one reference to `topic`. Returns true if that was the last one.
    ///
    /// Fails with [`SpindleError::SubscriptionNotFound`] if `topic` is not
    /// subscribed.
    pub fn unsubscribe(&mut self, topic: &[u8]) -> Result<bool> {
        let root = self
            .root
            .as_mut()
            .ok_or(SpindleError::SubscriptionNotFound)?;
        match remove(root, topic)? {
            Removal::Decremented => Ok(false),
            Removal::Released => Ok(true),
            Removal::Deleted => {
                self.root = None;
                Ok(true)
            }
        }
    }

    /// Returns true if some subscription is a prefix of `message`.
    #[must_use]
    pub fn matches(&self, message: &[u8]) -> bool {
        let mut node = self.root.as_deref();
        let mut data = message;
        while let Some(n) = node {
            let len = n.prefix.len();
            if n.check_prefix(data) != len {
                return false;
            }
            data = &data[len..];
            if n.refcount > 0 {
                return true;
            }
            let Some((&c, rest)) = data.split_first() else {
                return false;
            };
            node = n.child(c);
            data = rest;
        }
        false
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            1 + match &node.children {
                Children::Sparse(children) => {
                    children.iter().map(|(_, n)| count(n)).sum::<usize>()
                }
                Children::Dense { slots, .. } => {
                    slots.iter().flatten().map(|n| count(n)).sum::<usize>()
                }
            }
        }
        self.root.as_deref().map_or(0, count)
    }

    #[cfg(test)]
    fn root_is_dense(&self) -> bool {
        self.root
            .as_ref()
            .is_some_and(|n| matches!(n.children, Children::Dense { .. }))
    }
}

impl fmt::Debug for SubscriptionTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn dump(f: &mut fmt::Formatter<'_>, node: &Node, key: Option<u8>, depth: usize) -> fmt::Result {
            let indent = depth * 2;
            match key {
                Some(key) => write!(f, "{:indent$}{:?} ", "", char::from(key))?,
                None => write!(f, "{:indent$}", "")?,
            }
            write!(
                f,
                "[{}] refs={}",
                String::from_utf8_lossy(&node.prefix),
                node.refcount
            )?;
            match &node.children {
                Children::Sparse(children) => {
                    writeln!(f, " sparse={}", children.len())?;
                    for (c, child) in children {
                        dump(f, child, Some(*c), depth + 1)?;
                    }
                }
                Children::Dense { min, max, nbr, slots } => {
                    writeln!(f, " dense={nbr} range={min}..={max}")?;
                    for (i, child) in slots.iter().enumerate() {
                        if let Some(child) = child {
                            dump(f, child, Some(*min + i as u8), depth + 1)?;
                        }
                    }
                }
            }
            Ok(())
        }

        match self.root.as_deref() {
            Some(root) => dump(f, root, None, 0),
            None => writeln!(f, "(empty)"),
        }
    }
}
