//! Core identity types for atoms in the hypergraph.
//!
//! Every node and hyperedge is addressed by a [`Handle`] and classified by an
//! [`AtomKind`]. Handles are opaque, externally visible integers starting at 1.

use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique, niche-optimized identifier for an atom.
///
/// Uses `NonZeroU64` so that `Option<Handle>` is the same size as `Handle`.
/// Handles are monotonically assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Create a `Handle` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Handle)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Arena slot backing this handle.
    pub(crate) fn slot(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Handle for a given arena slot.
    pub(crate) fn from_slot(slot: usize) -> Self {
        // slot + 1 is never zero.
        Handle(NonZeroU64::MIN.saturating_add(slot as u64))
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "atom:{}", self.0)
    }
}

/// Classification of an atom in the hypergraph.
///
/// The link-flavoured kinds (`Evaluation`, `Inheritance`, `Similarity`, `Link`)
/// are conventionally used with a non-empty outgoing set, but the store does
/// not enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomKind {
    Node,
    Link,
    Concept,
    Predicate,
    Evaluation,
    Inheritance,
    Similarity,
}

impl AtomKind {
    /// All kinds, in declaration order.
    pub const ALL: [AtomKind; 7] = [
        AtomKind::Node,
        AtomKind::Link,
        AtomKind::Concept,
        AtomKind::Predicate,
        AtomKind::Evaluation,
        AtomKind::Inheritance,
        AtomKind::Similarity,
    ];

    /// Lowercase name used in configs and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            AtomKind::Node => "node",
            AtomKind::Link => "link",
            AtomKind::Concept => "concept",
            AtomKind::Predicate => "predicate",
            AtomKind::Evaluation => "evaluation",
            AtomKind::Inheritance => "inheritance",
            AtomKind::Similarity => "similarity",
        }
    }

    /// Whether this kind names a relation rather than a node.
    pub fn is_link_kind(self) -> bool {
        matches!(
            self,
            AtomKind::Link | AtomKind::Evaluation | AtomKind::Inheritance | AtomKind::Similarity
        )
    }
}

impl std::fmt::Display for AtomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AtomKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        AtomKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "unknown atom kind '{s}' (expected one of: node, link, concept, \
                     predicate, evaluation, inheritance, similarity)"
                )
            })
    }
}
