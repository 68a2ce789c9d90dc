use crate::chunker::blocks;
use crate::digest::{Blake3Digester, Digest, Digester};

/// A fully materialised Merkle tree over one buffer.
///
/// Levels are stored bottom-up in an arena: `levels[0]` holds the leaves and
/// the last level holds the root. Each level is computed iteratively from the
/// previous one, so deep trees never recurse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Builds the tree for `data` with the default [`Blake3Digester`].
    #[must_use]
    pub fn build(data: &[u8]) -> Self {
        Self::build_with(&Blake3Digester, data)
    }

    /// Builds the tree for `data` with a caller-supplied digester.
    pub fn build_with<D: Digester + ?Sized>(digester: &D, data: &[u8]) -> Self {
        let leaves = blocks(data).map(|b| digester.digest(b)).collect();
        Self::from_leaves_with(digester, leaves)
    }

    /// Builds the upper levels on top of precomputed leaf digests.
    pub fn from_leaves_with<D: Digester + ?Sized>(digester: &D, leaves: Vec<Digest>) -> Self {
        let mut levels = vec![leaves];
        loop {
            let next: Vec<Digest> = match levels.last() {
                Some(level) if level.len() > 1 => level
                    .chunks(2)
                    .map(|pair| parent(digester, pair))
                    .collect(),
                _ => break,
            };
            levels.push(next);
        }
        Self { levels }
    }

    /// The root digest, or `None` when the tree has no leaves.
    #[must_use]
    pub fn root(&self) -> Option<Digest> {
        self.levels.last().and_then(|top| top.first()).copied()
    }

    /// Number of leaves (blocks).
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Leaf digests in block order.
    #[must_use]
    pub fn leaves(&self) -> &[Digest] {
        self.level(0).unwrap_or(&[])
    }

    /// Number of hashing levels above the leaves: `ceil(log2(leaf_count))`.
    #[must_use]
    pub fn height(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Digests of level `n` (0 = leaves).
    #[must_use]
    pub fn level(&self, n: usize) -> Option<&[Digest]> {
        self.levels.get(n).map(Vec::as_slice)
    }
}

/// Folds one or two sibling nodes into their parent.
fn parent<D: Digester + ?Sized>(digester: &D, nodes: &[Digest]) -> Digest {
    match nodes {
        [left, right] => digester.digest_pair(left, right),
        [single] => digester.digest(single.as_bytes()),
        _ => unreachable!("chunks(2) yields one or two nodes"),
    }
}

/// Computes the root over an ordered list of blocks with the default digester.
pub fn build_root<'a, I>(blocks: I) -> Option<Digest>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    build_root_with(&Blake3Digester, blocks)
}

/// Computes the root over an ordered list of blocks.
///
/// Returns `None` for zero blocks.
pub fn build_root_with<'a, D, I>(digester: &D, blocks: I) -> Option<Digest>
where
    D: Digester + ?Sized,
    I: IntoIterator<Item = &'a [u8]>,
{
    let leaves = blocks.into_iter().map(|b| digester.digest(b)).collect();
    MerkleTree::from_leaves_with(digester, leaves).root()
}

/// Chunks `data` into 64-byte blocks and returns its root digest.
#[must_use]
pub fn root_of(data: &[u8]) -> Option<Digest> {
    root_of_with(&Blake3Digester, data)
}

pub fn root_of_with<D: Digester + ?Sized>(digester: &D, data: &[u8]) -> Option<Digest> {
    build_root_with(digester, blocks(data))
}
