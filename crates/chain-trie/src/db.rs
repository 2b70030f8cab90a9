//! The trie database: `add`/`retrieve`/`walk` over a family of MPTs sharing
//! one column of content-addressed nodes (spec.md §4.1).
//!
//! Keys of a single logical trie (state, a contract's storage, the delegate
//! vote roll, ...) are assumed fixed-length for that trie, matching the
//! engine's actual key types (`Destination` is always 33 bytes, a contract
//! slot key is always 32). This is what lets [`Node::Value`] terminals sit
//! unambiguously at the end of a path with no sibling continuing past them.

use crate::nibble::{bytes_to_nibbles, common_prefix_len, nibbles_to_bytes};
use crate::node::{Node, BRANCH_WIDTH};
use chain_db::{Column, Db};
use chain_types::{Error, Result};
use ethereum_types::H256;
use std::collections::HashMap;

/// Nodes produced by a not-yet-committed [`TrieDb::stage`] call.
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    nodes: HashMap<H256, Vec<u8>>,
}

impl NodeMap {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, node: &Node) -> H256 {
        let hash = node.canonical_hash();
        self.nodes.entry(hash).or_insert_with(|| node.encode());
        hash
    }
}

/// Result of a staged (non-persisting) `add` call (spec.md §4.1 caching modes).
pub struct Staged {
    pub root: H256,
    pub nodes: NodeMap,
    /// `(prevRoot, hashBlock)` metadata recorded for this root, to be
    /// committed alongside `nodes` (spec.md §4.1 "every new root atomically
    /// records a small prev-root metadata entry").
    pub prev_root: H256,
    pub hash_block: H256,
}

/// Visitor outcome for [`TrieDb::walk`]: continue or stop early.
pub enum WalkControl {
    Continue,
    Stop,
}

/// One 16-ary-radix trie family, backed by `Column::TrieNode` plus a
/// root-metadata entry in `Column::TrieNode`'s reserved sub-keyspace.
pub struct TrieDb {
    db: Db,
}

const META_PREFIX: u8 = 0xff;

impl TrieDb {
    pub fn new(db: Db) -> Self {
        TrieDb { db }
    }

    fn load(&self, hash: &H256) -> Result<Node> {
        let bytes = self
            .db
            .get(Column::TrieNode, hash.as_bytes())?
            .ok_or_else(|| Error::DbCorrupt(format!("missing trie node {:#x}", hash)))?;
        let node = Node::decode(&bytes)
            .map_err(|e| Error::DbCorrupt(format!("trie node {:#x} decode: {e}", hash)))?;
        if node.canonical_hash() != *hash {
            return Err(Error::DbCorrupt(format!(
                "trie node read under {:#x} re-hashes to a different value",
                hash
            )));
        }
        Ok(node)
    }

    fn load_local(&self, local: &NodeMap, hash: &H256) -> Result<Node> {
        if let Some(bytes) = local.nodes.get(hash) {
            return Node::decode(bytes)
                .map_err(|e| Error::DbCorrupt(format!("staged node {:#x} decode: {e}", hash)));
        }
        self.load(hash)
    }

    fn node_present(&self, hash: &H256) -> Result<bool> {
        Ok(self.db.get(Column::TrieNode, hash.as_bytes())?.is_some())
    }

    /// Computes the new root obtained by applying `kv` to `prev_root`
    /// without writing anything to the backing store. `kvMap` empty implies
    /// `new_root == prev_root` (spec.md §4.1 guarantee).
    pub fn stage(
        &self,
        prev_root: H256,
        kv: &[(Vec<u8>, Option<Vec<u8>>)],
        hash_block: H256,
    ) -> Result<Staged> {
        let mut nodes = NodeMap::default();
        let mut root = prev_root;
        for (key, value) in kv {
            let path = bytes_to_nibbles(key);
            let current = if root.is_zero() {
                None
            } else {
                Some(self.load_local(&nodes, &root)?)
            };
            root = match value {
                Some(v) => self.insert_at(current, &path, v.clone(), &mut nodes)?,
                None => match current {
                    Some(node) => self.remove_at(node, &path, &mut nodes)?.unwrap_or_default(),
                    None => H256::zero(),
                },
            };
        }
        Ok(Staged {
            root,
            nodes,
            prev_root,
            hash_block,
        })
    }

    /// Stages then immediately persists — the "direct commit" mode
    /// (spec.md §4.1).
    pub fn add(
        &self,
        prev_root: H256,
        kv: &[(Vec<u8>, Option<Vec<u8>>)],
        hash_block: H256,
    ) -> Result<H256> {
        let staged = self.stage(prev_root, kv, hash_block)?;
        self.commit(&staged)?;
        Ok(staged.root)
    }

    /// Persists a previously staged node map plus its prev-root metadata.
    /// Only nodes genuinely absent from the store are written, which is what
    /// makes re-adding an identical `kvMap` a zero-new-node operation.
    pub fn commit(&self, staged: &Staged) -> Result<()> {
        let mut batch = self.db.new_batch();
        let mut any = false;
        for (hash, bytes) in &staged.nodes.nodes {
            if !self.node_present(hash)? {
                batch.put(Column::TrieNode.id(), hash.as_bytes(), bytes);
                any = true;
            }
        }
        if !staged.root.is_zero() {
            let meta = encode_root_meta(staged.prev_root, staged.hash_block);
            batch.put(Column::TrieNode.id(), &meta_key(staged.root), &meta);
            any = true;
        }
        if any {
            self.db.write(batch)?;
        }
        Ok(())
    }

    /// O(key-length) point lookup (spec.md §4.1).
    pub fn retrieve(&self, root: H256, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if root.is_zero() {
            return Ok(None);
        }
        let path = bytes_to_nibbles(key);
        self.retrieve_at(&self.load(&root)?, &path)
    }

    fn retrieve_at(&self, node: &Node, path: &[u8]) -> Result<Option<Vec<u8>>> {
        match node {
            Node::Value { bytes } => {
                if path.is_empty() {
                    Ok(Some(bytes.clone()))
                } else {
                    Ok(None)
                }
            }
            Node::Extension {
                key_nibbles,
                next,
                value,
            } => {
                if path.len() < key_nibbles.len() || &path[..key_nibbles.len()] != key_nibbles.as_slice() {
                    return Ok(None);
                }
                let rest = &path[key_nibbles.len()..];
                if rest.is_empty() {
                    match value {
                        Some(h) => self.retrieve_at(&self.load(h)?, &[]),
                        None => Ok(None),
                    }
                } else {
                    match next {
                        Some(h) => self.retrieve_at(&self.load(h)?, rest),
                        None => Ok(None),
                    }
                }
            }
            Node::Branch { next, value } => {
                if path.is_empty() {
                    match value {
                        Some(h) => self.retrieve_at(&self.load(h)?, &[]),
                        None => Ok(None),
                    }
                } else {
                    let nib = path[0] as usize;
                    match next[nib] {
                        Some(h) => self.retrieve_at(&self.load(h)?, &path[1..]),
                        None => Ok(None),
                    }
                }
            }
        }
    }

    /// In-order traversal from `root`, restricted to keys under `prefix`,
    /// optionally starting from `begin_key`, optionally reversed
    /// (spec.md §4.1 `walk`). `visitor` receives `(key, value, depth)` and
    /// decides whether to continue.
    pub fn walk(
        &self,
        root: H256,
        prefix: &[u8],
        begin_key: Option<&[u8]>,
        reverse: bool,
        mut visitor: impl FnMut(&[u8], &[u8], usize) -> WalkControl,
    ) -> Result<()> {
        if root.is_zero() {
            return Ok(());
        }
        let prefix_nibbles = bytes_to_nibbles(prefix);
        let begin_nibbles = begin_key.map(bytes_to_nibbles);
        let node = self.load(&root)?;
        let mut acc = Vec::new();
        let mut stop = false;
        self.walk_at(
            &node,
            &mut acc,
            &prefix_nibbles,
            begin_nibbles.as_deref(),
            reverse,
            0,
            &mut visitor,
            &mut stop,
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_at(
        &self,
        node: &Node,
        acc: &mut Vec<u8>,
        prefix: &[u8],
        begin: Option<&[u8]>,
        reverse: bool,
        depth: usize,
        visitor: &mut impl FnMut(&[u8], &[u8], usize) -> WalkControl,
        stop: &mut bool,
    ) -> Result<()> {
        if *stop {
            return Ok(());
        }
        if !matches_prefix_so_far(acc, prefix) {
            return Ok(());
        }
        match node {
            Node::Value { bytes } => {
                if acc.len() % 2 != 0 {
                    return Ok(());
                }
                if prefix.len() > acc.len() {
                    return Ok(());
                }
                if let Some(b) = begin {
                    if !reverse && acc.as_slice() < b {
                        return Ok(());
                    }
                    if reverse && acc.as_slice() > b {
                        return Ok(());
                    }
                }
                let key_bytes = nibbles_to_bytes(acc);
                if let WalkControl::Stop = visitor(&key_bytes, bytes, depth) {
                    *stop = true;
                }
            }
            Node::Extension {
                key_nibbles,
                next,
                value,
            } => {
                acc.extend_from_slice(key_nibbles);
                if let Some(h) = value {
                    let child = self.load(h)?;
                    self.walk_at(&child, acc, prefix, begin, reverse, depth + 1, visitor, stop)?;
                }
                if !*stop {
                    if let Some(h) = next {
                        let child = self.load(h)?;
                        self.walk_at(&child, acc, prefix, begin, reverse, depth + 1, visitor, stop)?;
                    }
                }
                acc.truncate(acc.len() - key_nibbles.len());
            }
            Node::Branch { next, value } => {
                let order: Box<dyn Iterator<Item = usize>> = if reverse {
                    Box::new((0..BRANCH_WIDTH).rev())
                } else {
                    Box::new(0..BRANCH_WIDTH)
                };
                if !reverse {
                    if let Some(h) = value {
                        let child = self.load(h)?;
                        self.walk_at(&child, acc, prefix, begin, reverse, depth + 1, visitor, stop)?;
                    }
                }
                for nib in order {
                    if *stop {
                        break;
                    }
                    if let Some(h) = next[nib] {
                        acc.push(nib as u8);
                        let child = self.load(&h)?;
                        self.walk_at(&child, acc, prefix, begin, reverse, depth + 1, visitor, stop)?;
                        acc.pop();
                    }
                }
                if reverse && !*stop {
                    if let Some(h) = value {
                        let child = self.load(h)?;
                        self.walk_at(&child, acc, prefix, begin, reverse, depth + 1, visitor, stop)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Recovers `(prevRoot, hashBlock)` for any committed root
    /// (spec.md §4.1 consistency audit).
    pub fn prev_root_of(&self, root: H256) -> Result<Option<(H256, H256)>> {
        match self.db.get(Column::TrieNode, &meta_key(root))? {
            Some(bytes) => Ok(Some(decode_root_meta(&bytes)?)),
            None => Ok(None),
        }
    }

    fn insert_at(
        &self,
        current: Option<Node>,
        path: &[u8],
        value: Vec<u8>,
        out: &mut NodeMap,
    ) -> Result<H256> {
        let node = match current {
            None => {
                if path.is_empty() {
                    Node::Value { bytes: value }
                } else {
                    Node::Extension {
                        key_nibbles: path.to_vec(),
                        next: None,
                        value: Some(out.insert(&Node::Value { bytes: value })),
                    }
                }
            }
            Some(Node::Value { .. }) => {
                debug_assert!(path.is_empty(), "fixed-length keys never continue past a Value terminal");
                Node::Value { bytes: value }
            }
            Some(Node::Extension {
                key_nibbles,
                next,
                value: ext_value,
            }) => {
                let cp = common_prefix_len(&key_nibbles, path);
                if cp == key_nibbles.len() {
                    let rest = &path[cp..];
                    if rest.is_empty() {
                        Node::Extension {
                            key_nibbles,
                            next,
                            value: Some(out.insert(&Node::Value { bytes: value })),
                        }
                    } else {
                        let child = match next {
                            Some(h) => Some(self.load_local(out, &h)?),
                            None => None,
                        };
                        let new_child_hash = self.insert_at(child, rest, value, out)?;
                        Node::Extension {
                            key_nibbles,
                            next: Some(new_child_hash),
                            value: ext_value,
                        }
                    }
                } else {
                    self.split_extension(key_nibbles, next, ext_value, path, value, out)?
                }
            }
            Some(Node::Branch {
                mut next,
                mut value: branch_value,
            }) => {
                if path.is_empty() {
                    branch_value = Some(out.insert(&Node::Value { bytes: value }));
                } else {
                    let nib = path[0] as usize;
                    let child = match next[nib] {
                        Some(h) => Some(self.load_local(out, &h)?),
                        None => None,
                    };
                    let new_child_hash = self.insert_at(child, &path[1..], value, out)?;
                    next[nib] = Some(new_child_hash);
                }
                Node::Branch {
                    next,
                    value: branch_value,
                }
            }
        };
        Ok(out.insert(&node))
    }

    #[allow(clippy::too_many_arguments)]
    fn split_extension(
        &self,
        old_key: Vec<u8>,
        old_next: Option<H256>,
        old_value: Option<H256>,
        new_path: &[u8],
        new_value_bytes: Vec<u8>,
        out: &mut NodeMap,
    ) -> Result<Node> {
        let cp = common_prefix_len(&old_key, new_path);
        let mut branch_next: [Option<H256>; BRANCH_WIDTH] = [None; BRANCH_WIDTH];
        let mut branch_value = None;

        let old_nibble = old_key[cp];
        let old_rest = old_key[cp + 1..].to_vec();
        let old_arm = Node::Extension {
            key_nibbles: old_rest,
            next: old_next,
            value: old_value,
        };
        branch_next[old_nibble as usize] = Some(out.insert(&old_arm));

        if cp == new_path.len() {
            branch_value = Some(out.insert(&Node::Value {
                bytes: new_value_bytes,
            }));
        } else {
            let new_nibble = new_path[cp];
            let new_rest = &new_path[cp + 1..];
            let new_arm = if new_rest.is_empty() {
                Node::Value {
                    bytes: new_value_bytes,
                }
            } else {
                Node::Extension {
                    key_nibbles: new_rest.to_vec(),
                    next: None,
                    value: Some(out.insert(&Node::Value {
                        bytes: new_value_bytes,
                    })),
                }
            };
            branch_next[new_nibble as usize] = Some(out.insert(&new_arm));
        }

        let branch = Node::Branch {
            next: branch_next,
            value: branch_value,
        };
        if cp == 0 {
            Ok(branch)
        } else {
            Ok(Node::Extension {
                key_nibbles: old_key[..cp].to_vec(),
                next: Some(out.insert(&branch)),
                value: None,
            })
        }
    }

    /// Removes `path` from the subtree rooted at `node`. Returns `None` when
    /// the whole subtree becomes empty.
    fn remove_at(&self, node: Node, path: &[u8], out: &mut NodeMap) -> Result<Option<H256>> {
        match node {
            Node::Value { .. } => {
                if path.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(out.insert(&node)))
                }
            }
            Node::Extension {
                key_nibbles,
                next,
                value,
            } => {
                let cp = common_prefix_len(&key_nibbles, path);
                if cp != key_nibbles.len() {
                    // key not present; nothing to remove.
                    return Ok(Some(out.insert(&Node::Extension {
                        key_nibbles,
                        next,
                        value,
                    })));
                }
                let rest = &path[cp..];
                if rest.is_empty() {
                    if next.is_none() {
                        return Ok(None);
                    }
                    return Ok(Some(out.insert(&Node::Extension {
                        key_nibbles,
                        next,
                        value: None,
                    })));
                }
                match next {
                    None => Ok(Some(out.insert(&Node::Extension {
                        key_nibbles,
                        next,
                        value,
                    }))),
                    Some(h) => {
                        let child = self.load_local(out, &h)?;
                        match self.remove_at(child, rest, out)? {
                            Some(new_child) => Ok(Some(out.insert(&Node::Extension {
                                key_nibbles,
                                next: Some(new_child),
                                value,
                            }))),
                            None if value.is_none() => Ok(None),
                            None => Ok(Some(out.insert(&Node::Extension {
                                key_nibbles,
                                next: None,
                                value,
                            }))),
                        }
                    }
                }
            }
            Node::Branch { mut next, mut value } => {
                if path.is_empty() {
                    value = None;
                } else {
                    let nib = path[0] as usize;
                    if let Some(h) = next[nib] {
                        let child = self.load_local(out, &h)?;
                        next[nib] = self.remove_at(child, &path[1..], out)?;
                    }
                }
                let populated = next.iter().filter(|n| n.is_some()).count();
                if populated == 0 && value.is_none() {
                    Ok(None)
                } else {
                    Ok(Some(out.insert(&Node::Branch { next, value })))
                }
            }
        }
    }
}

fn matches_prefix_so_far(acc: &[u8], prefix: &[u8]) -> bool {
    let take = acc.len().min(prefix.len());
    acc[..take] == prefix[..take]
}

fn meta_key(root: H256) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = META_PREFIX;
    key[1..].copy_from_slice(root.as_bytes());
    key
}

fn encode_root_meta(prev_root: H256, hash_block: H256) -> Vec<u8> {
    let mut stream = rlp::RlpStream::new();
    stream.begin_list(2);
    stream.append(&prev_root.as_bytes());
    stream.append(&hash_block.as_bytes());
    stream.out().to_vec()
}

fn decode_root_meta(bytes: &[u8]) -> Result<(H256, H256)> {
    let rlp = rlp::Rlp::new(bytes);
    let prev: Vec<u8> = rlp
        .val_at(0)
        .map_err(|e| Error::DbCorrupt(format!("root meta: {e}")))?;
    let block: Vec<u8> = rlp
        .val_at(1)
        .map_err(|e| Error::DbCorrupt(format!("root meta: {e}")))?;
    Ok((H256::from_slice(&prev), H256::from_slice(&block)))
}
