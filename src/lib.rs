// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # cogkern
//!
//! A cognitive kernel core: a hypergraph knowledge store with an economic
//! attention network and a tick-driven scheduler.
//!
//! ## Architecture
//!
//! - **AtomSpace** (`atomspace`): append-only hypergraph of nodes and links with
//!   an incidence index
//! - **Attention** (`attention`): ECAN ledger with rent, wages and forgetting,
//!   plus importance diffusion over 1-hop neighborhoods
//! - **Scheduler** (`scheduler`): staged bootstrap and the cognitive tick loop
//! - **Truth values** (`truth`): strength/confidence pairs for inference
//! - **Kernel** (`kernel`): the context object tying them together
//!
//! ## Library usage
//!
//! ```no_run
//! use cogkern::attention::AttentionValue;
//! use cogkern::config::KernelConfig;
//! use cogkern::handle::AtomKind;
//! use cogkern::kernel::Kernel;
//!
//! let kernel = Kernel::new(KernelConfig::default()).unwrap();
//! let cat = kernel.create_atom(AtomKind::Concept, Some("cat")).unwrap();
//! let mammal = kernel.create_atom(AtomKind::Concept, Some("mammal")).unwrap();
//! let isa = kernel.create_link(AtomKind::Inheritance, &[cat, mammal]).unwrap();
//!
//! kernel.set_attention(cat, AttentionValue::with_sti(100.0)).unwrap();
//! kernel.set_attention(isa, AttentionValue::with_sti(0.0)).unwrap();
//! kernel.spread_importance(cat, 0.2).unwrap();
//!
//! kernel.boot().unwrap();
//! kernel.start(0).unwrap();
//! kernel.tick().unwrap();
//! ```

pub mod atomspace;
pub mod attention;
pub mod config;
pub mod error;
pub mod handle;
pub mod kernel;
pub mod scheduler;
pub mod truth;
