//! Handle-addressed hypergraph store.
//!
//! Atoms live in an arena keyed by handle (handle `n` occupies slot `n - 1`).
//! Links carry an ordered outgoing sequence; a secondary incidence index maps
//! every atom to the links that mention it. Both are updated inside a single
//! write critical section, so readers never see a link without its incidence
//! entries.
//!
//! Nothing is ever removed. Forgetting is an attention-level status, so the
//! outgoing references of surviving links never dangle.

pub mod payload;

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::AtomError;
use crate::handle::{AtomKind, Handle};

/// Result type for atom store operations.
pub type AtomResult<T> = std::result::Result<T, AtomError>;

/// A node or hyperedge in the knowledge hypergraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub handle: Handle,
    pub kind: AtomKind,
    pub name: Option<String>,
    /// Members of a link, in creation order. Empty for plain nodes.
    pub outgoing: Vec<Handle>,
}

impl Atom {
    /// Whether this atom has outgoing members.
    pub fn is_link(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Arity of the hyperedge (0 for nodes).
    pub fn arity(&self) -> usize {
        self.outgoing.len()
    }
}

/// Capacity policy and sizing hints for the atom store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomSpaceConfig {
    /// Upper bound on the number of atoms. `None` lets the arena grow freely.
    pub max_atoms: Option<usize>,
    /// Slots to pre-allocate.
    pub initial_capacity: usize,
}

impl Default for AtomSpaceConfig {
    fn default() -> Self {
        Self {
            max_atoms: Some(1_000_000),
            initial_capacity: 1024,
        }
    }
}

#[derive(Debug, Default)]
struct Arena {
    atoms: Vec<Atom>,
    /// Slot-parallel incidence lists: links in which each atom appears.
    incidence: Vec<Vec<Handle>>,
    link_count: usize,
}

impl Arena {
    fn atom(&self, handle: Handle) -> AtomResult<&Atom> {
        self.atoms
            .get(handle.slot())
            .ok_or(AtomError::NotFound {
                handle: handle.get(),
            })
    }

    fn ensure_capacity(&self, max_atoms: Option<usize>) -> AtomResult<()> {
        match max_atoms {
            Some(capacity) if self.atoms.len() >= capacity => {
                Err(AtomError::CapacityExceeded { capacity })
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, kind: AtomKind, name: Option<String>, outgoing: Vec<Handle>) -> Handle {
        let handle = Handle::from_slot(self.atoms.len());
        self.atoms.push(Atom {
            handle,
            kind,
            name,
            outgoing,
        });
        self.incidence.push(Vec::new());
        handle
    }
}

/// In-memory hypergraph of atoms with forward and reverse adjacency.
pub struct AtomSpace {
    arena: RwLock<Arena>,
    config: AtomSpaceConfig,
}

impl AtomSpace {
    /// Create an empty store.
    pub fn new(config: AtomSpaceConfig) -> Self {
        let capacity = match config.max_atoms {
            Some(max) => config.initial_capacity.min(max),
            None => config.initial_capacity,
        };
        Self {
            arena: RwLock::new(Arena {
                atoms: Vec::with_capacity(capacity),
                incidence: Vec::with_capacity(capacity),
                link_count: 0,
            }),
            config,
        }
    }

    /// Allocate a node with a fresh handle.
    pub fn create_atom(&self, kind: AtomKind, name: Option<&str>) -> AtomResult<Handle> {
        let mut arena = self.arena.write().expect("atomspace lock poisoned");
        arena.ensure_capacity(self.config.max_atoms)?;
        Ok(arena.push(kind, name.map(str::to_owned), Vec::new()))
    }

    /// Create a link over existing atoms.
    ///
    /// The outgoing sequence is stored verbatim; the link is registered once in
    /// the incidence list of each distinct member. Fails without mutating the
    /// store if any member is unknown or capacity is exhausted.
    pub fn create_link(&self, kind: AtomKind, outgoing: &[Handle]) -> AtomResult<Handle> {
        self.create_link_where(kind, outgoing, |_| true)
    }

    /// Like [`create_link`](Self::create_link), with an extra liveness predicate
    /// applied to every member while the write lock is held.
    pub(crate) fn create_link_where(
        &self,
        kind: AtomKind,
        outgoing: &[Handle],
        is_live: impl Fn(Handle) -> bool,
    ) -> AtomResult<Handle> {
        let mut arena = self.arena.write().expect("atomspace lock poisoned");

        for (position, &member) in outgoing.iter().enumerate() {
            if member.slot() >= arena.atoms.len() || !is_live(member) {
                return Err(AtomError::UnknownAtom {
                    member: member.get(),
                    position,
                });
            }
        }
        arena.ensure_capacity(self.config.max_atoms)?;

        let link = arena.push(kind, None, outgoing.to_vec());
        let mut registered: Vec<Handle> = Vec::with_capacity(outgoing.len());
        for &member in outgoing {
            if !registered.contains(&member) {
                arena.incidence[member.slot()].push(link);
                registered.push(member);
            }
        }
        arena.link_count += 1;
        Ok(link)
    }

    /// Look up an atom by handle.
    pub fn get(&self, handle: Handle) -> AtomResult<Atom> {
        let arena = self.arena.read().expect("atomspace lock poisoned");
        arena.atom(handle).cloned()
    }

    /// Whether a handle was ever allocated.
    pub fn contains(&self, handle: Handle) -> bool {
        let arena = self.arena.read().expect("atomspace lock poisoned");
        handle.slot() < arena.atoms.len()
    }

    /// Links in which `handle` appears as an outgoing member, in creation order.
    pub fn incoming(&self, handle: Handle) -> AtomResult<Vec<Handle>> {
        let arena = self.arena.read().expect("atomspace lock poisoned");
        arena.atom(handle)?;
        Ok(arena.incidence[handle.slot()].clone())
    }

    /// 1-hop adjacency: outgoing members (in order) followed by incident links
    /// (in creation order), each listed once.
    pub fn neighbors(&self, handle: Handle) -> AtomResult<Vec<Handle>> {
        let arena = self.arena.read().expect("atomspace lock poisoned");
        let atom = arena.atom(handle)?;
        let incident = &arena.incidence[handle.slot()];

        let mut out = Vec::with_capacity(atom.outgoing.len() + incident.len());
        for &h in atom.outgoing.iter().chain(incident.iter()) {
            if !out.contains(&h) {
                out.push(h);
            }
        }
        Ok(out)
    }

    /// First atom carrying the given name, if any.
    pub fn find_by_name(&self, name: &str) -> Option<Handle> {
        let arena = self.arena.read().expect("atomspace lock poisoned");
        arena
            .atoms
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| a.handle)
    }

    /// Total number of atoms (nodes and links).
    pub fn len(&self) -> usize {
        self.arena.read().expect("atomspace lock poisoned").atoms.len()
    }

    /// Whether the store holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of atoms created through `create_link`.
    pub fn link_count(&self) -> usize {
        self.arena.read().expect("atomspace lock poisoned").link_count
    }

    /// The store's configuration.
    pub fn config(&self) -> &AtomSpaceConfig {
        &self.config
    }
}

impl Default for AtomSpace {
    fn default() -> Self {
        Self::new(AtomSpaceConfig::default())
    }
}
