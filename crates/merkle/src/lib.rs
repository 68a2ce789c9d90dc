//! # Merkle - Block Chunking and Root Digests
//!
//! Computes the Merkle root that SealFS stores for every tracked file.
//!
//! ## Construction
//!
//! ```text
//!                 root
//!               /      \
//!         H(a ++ b)    H(c)        <- odd level: last node re-hashed alone
//!          /    \        |
//!        a=H(b0) b=H(b1) c=H(b2)   <- leaves, one per 64-byte block
//! ```
//!
//! 1. The file content is cut into 64-byte blocks (the last one may be short).
//! 2. Every block is hashed into a leaf digest.
//! 3. Nodes are paired left to right and the 40-byte concatenation of each
//!    pair is hashed into the parent. When a level has an odd number of nodes
//!    the unpaired last node is hashed **alone** (a 20-byte input) instead of
//!    being duplicated or padded.
//! 4. Levels are folded until a single digest remains.
//!
//! A single-block input has no internal nodes: its root is the leaf digest.
//! An empty input has no blocks and therefore no root (`None`).
//!
//! ## Example
//!
//! ```rust
//! use merkle::{root_of, MerkleTree};
//!
//! let data = vec![0u8; 200]; // 4 blocks
//! let tree = MerkleTree::build(&data);
//! assert_eq!(tree.leaf_count(), 4);
//! assert_eq!(tree.height(), 2);
//! assert_eq!(tree.root(), root_of(&data));
//! ```

mod chunker;
mod digest;
mod tree;

pub use chunker::{block_count, block_range, blocks, BLOCK_SIZE};
pub use digest::{Blake3Digester, Digest, Digester, DIGEST_LEN};
pub use tree::{build_root, build_root_with, root_of, root_of_with, MerkleTree};
