//! Kernel facade: the explicit context object for the cognitive core.
//!
//! A [`Kernel`] owns one atom store, attention ledger, diffusion engine,
//! scheduler and truth store. Nothing is process-global, so independent
//! kernels can coexist (one per test, for instance).
//!
//! Cross-component rules live here: attention is only recorded for atoms that
//! exist, links may only be built over live (not forgotten) atoms, and a
//! forgotten atom no longer resolves through [`Kernel::get`].
//!
//! Locks are always taken ledger first, atom store second.

use std::sync::Arc;

use serde::Serialize;

use crate::atomspace::payload::{MemPayloadStore, PayloadStore};
use crate::atomspace::{Atom, AtomSpace};
use crate::attention::diffusion::DiffusionEngine;
use crate::attention::{AttentionFund, AttentionLedger, AttentionValue, EntryStatus, TickReport};
use crate::config::KernelConfig;
use crate::error::{AtomError, CogResult};
use crate::handle::{AtomKind, Handle};
use crate::scheduler::{BootStage, Scheduler, SchedulerState};
use crate::truth::{TruthStore, TruthValue};

/// The cognitive kernel.
pub struct Kernel {
    config: KernelConfig,
    atoms: Arc<AtomSpace>,
    ledger: Arc<AttentionLedger>,
    diffusion: DiffusionEngine,
    scheduler: Scheduler,
    truth: TruthStore,
    payloads: Box<dyn PayloadStore>,
}

impl Kernel {
    /// Create a kernel with the given configuration and an in-memory payload
    /// store.
    pub fn new(config: KernelConfig) -> CogResult<Self> {
        Self::with_payload_store(config, Box::new(MemPayloadStore::new()))
    }

    /// Create a kernel backed by a custom payload store.
    pub fn with_payload_store(
        config: KernelConfig,
        payloads: Box<dyn PayloadStore>,
    ) -> CogResult<Self> {
        config.validate()?;

        tracing::info!(
            max_atoms = ?config.atomspace.max_atoms,
            funded = config.attention.funded,
            decay_rate = config.attention.decay_rate,
            regions = config.scheduler.memory_regions,
            "initializing cognitive kernel"
        );

        let atoms = Arc::new(AtomSpace::new(config.atomspace.clone()));
        let ledger = Arc::new(AttentionLedger::new(&config.attention));
        let diffusion = DiffusionEngine::new(Arc::clone(&atoms), Arc::clone(&ledger));
        let scheduler = Scheduler::new(
            Arc::clone(&ledger),
            config.attention.tick_policy(),
            &config.scheduler,
        );

        Ok(Self {
            config,
            atoms,
            ledger,
            diffusion,
            scheduler,
            truth: TruthStore::new(),
            payloads,
        })
    }

    // -----------------------------------------------------------------------
    // Atom store
    // -----------------------------------------------------------------------

    /// Allocate a node.
    pub fn create_atom(&self, kind: AtomKind, name: Option<&str>) -> CogResult<Handle> {
        Ok(self.atoms.create_atom(kind, name)?)
    }

    /// Create a link over live atoms. Forgotten members count as unknown.
    pub fn create_link(&self, kind: AtomKind, outgoing: &[Handle]) -> CogResult<Handle> {
        // Hold the ledger read lock so no member is forgotten mid-creation.
        let ledger = self.ledger.read_state();
        let link = self
            .atoms
            .create_link_where(kind, outgoing, |h| !ledger.is_forgotten(h))?;
        Ok(link)
    }

    /// Resolve a handle to a live atom.
    pub fn get(&self, handle: Handle) -> CogResult<Atom> {
        let atom = self.atoms.get(handle)?;
        if self.ledger.is_forgotten(handle) {
            return Err(AtomError::Forgotten {
                handle: handle.get(),
            }
            .into());
        }
        Ok(atom)
    }

    /// Resolve a handle regardless of its attention status. Structural walks
    /// over surviving links use this to reach forgotten members.
    pub fn get_structural(&self, handle: Handle) -> CogResult<Atom> {
        Ok(self.atoms.get(handle)?)
    }

    /// 1-hop adjacency of `handle`.
    pub fn neighbors(&self, handle: Handle) -> CogResult<Vec<Handle>> {
        Ok(self.atoms.neighbors(handle)?)
    }

    /// Links mentioning `handle`.
    pub fn incoming(&self, handle: Handle) -> CogResult<Vec<Handle>> {
        Ok(self.atoms.incoming(handle)?)
    }

    /// First live atom with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<Handle> {
        self.atoms
            .find_by_name(name)
            .filter(|&h| !self.ledger.is_forgotten(h))
    }

    // -----------------------------------------------------------------------
    // Attention
    // -----------------------------------------------------------------------

    /// Record the attention value of an existing atom.
    pub fn set_attention(&self, handle: Handle, av: AttentionValue) -> CogResult<()> {
        self.ensure_exists(handle)?;
        Ok(self.ledger.set_attention(handle, av)?)
    }

    pub fn get_attention(&self, handle: Handle) -> CogResult<AttentionValue> {
        Ok(self.ledger.get_attention(handle)?)
    }

    /// Pay a wage from the STI fund. Returns the amount granted.
    pub fn stimulate(&self, handle: Handle, amount: f32) -> CogResult<f64> {
        Ok(self.ledger.stimulate(handle, amount)?)
    }

    /// Spread a fraction of `source`'s STI to its 1-hop neighbors.
    pub fn spread_importance(&self, source: Handle, diffusion_rate: f32) -> CogResult<usize> {
        self.diffusion.spread_importance(source, diffusion_rate)
    }

    /// Collect rent from every active entry outside the scheduler.
    pub fn decay(&self, rate: f32) -> CogResult<usize> {
        Ok(self.ledger.decay(rate)?)
    }

    pub fn decay_long_term(&self, rate: f32) -> CogResult<usize> {
        Ok(self.ledger.decay_long_term(rate)?)
    }

    /// Spread from several sources in order. Returns total recipients.
    pub fn spread_from(&self, sources: &[Handle], diffusion_rate: f32) -> CogResult<usize> {
        self.diffusion.spread_from(sources, diffusion_rate)
    }

    /// Run the forgetting check outside the scheduler.
    pub fn forget_check(&self, threshold: f32, min_ticks_below: u32) -> Vec<Handle> {
        self.ledger.forget_check(threshold, min_ticks_below)
    }

    pub fn fund(&self) -> AttentionFund {
        self.ledger.fund()
    }

    /// Live atoms ranked by STI.
    pub fn attentional_focus(&self, limit: usize) -> Vec<(Handle, AttentionValue)> {
        self.ledger.top_sti(limit)
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    pub fn boot_stage(&self, stage: BootStage) -> CogResult<()> {
        Ok(self.scheduler.boot_stage(stage)?)
    }

    /// Run all four bootstrap stages.
    pub fn boot(&self) -> CogResult<()> {
        Ok(self.scheduler.boot_through(BootStage::Cognitive)?)
    }

    pub fn init_memory_regions(&self, count: usize) -> CogResult<()> {
        Ok(self.scheduler.init_memory_regions(count)?)
    }

    /// Run one tick. Returns the number of attention entries processed.
    pub fn tick(&self) -> CogResult<usize> {
        self.scheduler.tick()
    }

    pub fn tick_report(&self) -> CogResult<TickReport> {
        self.scheduler.tick_report()
    }

    pub fn start(&self, hz: u32) -> CogResult<()> {
        Ok(self.scheduler.start(hz)?)
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    // -----------------------------------------------------------------------
    // Truth values
    // -----------------------------------------------------------------------

    /// Record a truth value on a live atom.
    pub fn set_truth(&self, handle: Handle, tv: TruthValue) -> CogResult<()> {
        self.get(handle)?;
        Ok(self.truth.set(handle, tv)?)
    }

    /// The atom's truth value, or the uninformative default.
    pub fn infer(&self, handle: Handle) -> CogResult<TruthValue> {
        self.get(handle)?;
        Ok(self.truth.infer(handle))
    }

    /// Record "premise implies conclusion" as an evaluation link carrying `tv`.
    pub fn link_infer(
        &self,
        premise: Handle,
        conclusion: Handle,
        tv: TruthValue,
    ) -> CogResult<Handle> {
        tv.validate()?;
        let link = self.create_link(AtomKind::Evaluation, &[premise, conclusion])?;
        self.truth.set(link, tv)?;
        Ok(link)
    }

    // -----------------------------------------------------------------------
    // Payloads
    // -----------------------------------------------------------------------

    /// Park an opaque payload on an existing atom. Returns the payload it
    /// replaces.
    pub fn attach_payload(
        &self,
        handle: Handle,
        payload: impl Into<Arc<[u8]>>,
    ) -> CogResult<Option<Arc<[u8]>>> {
        self.ensure_exists(handle)?;
        Ok(self.payloads.attach(handle, payload.into()))
    }

    pub fn payload(&self, handle: Handle) -> Option<Arc<[u8]>> {
        self.payloads.payload(handle)
    }

    pub fn detach_payload(&self, handle: Handle) -> Option<Arc<[u8]>> {
        self.payloads.detach(handle)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn atomspace(&self) -> &AtomSpace {
        &self.atoms
    }

    pub fn ledger(&self) -> &AttentionLedger {
        &self.ledger
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Attention status of a handle: `None` when it has no ledger entry.
    pub fn status(&self, handle: Handle) -> Option<EntryStatus> {
        self.ledger.status(handle)
    }

    pub fn info(&self) -> KernelInfo {
        let fund = self.ledger.fund();
        KernelInfo {
            atom_count: self.atoms.len(),
            link_count: self.atoms.link_count(),
            attention_entries: self.ledger.active_count(),
            forgotten: self.ledger.forgotten_count(),
            total_sti: self.ledger.total_sti(),
            sti_fund: fund.sti_fund,
            lti_fund: fund.lti_fund,
            truth_values: self.truth.len(),
            payloads: self.payloads.count(),
            payload_bytes: self.payloads.total_bytes(),
            scheduler: self.scheduler.state().to_string(),
            ticks: self.scheduler.tick_count(),
            memory_regions: self.scheduler.memory_regions(),
        }
    }

    fn ensure_exists(&self, handle: Handle) -> CogResult<()> {
        if self.atoms.contains(handle) {
            Ok(())
        } else {
            Err(AtomError::NotFound {
                handle: handle.get(),
            }
            .into())
        }
    }
}

impl TryFrom<&std::path::Path> for Kernel {
    type Error = crate::error::CogError;

    fn try_from(path: &std::path::Path) -> CogResult<Self> {
        Kernel::new(KernelConfig::load(path)?)
    }
}

/// Summary statistics for a kernel.
#[derive(Debug, Clone, Serialize)]
pub struct KernelInfo {
    pub atom_count: usize,
    pub link_count: usize,
    pub attention_entries: usize,
    pub forgotten: usize,
    pub total_sti: f64,
    pub sti_fund: f64,
    pub lti_fund: f64,
    pub truth_values: usize,
    pub payloads: usize,
    pub payload_bytes: usize,
    pub scheduler: String,
    pub ticks: u64,
    pub memory_regions: usize,
}

impl std::fmt::Display for KernelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Atoms:           {} ({} links)", self.atom_count, self.link_count)?;
        writeln!(
            f,
            "Attention:       {} active, {} forgotten",
            self.attention_entries, self.forgotten
        )?;
        writeln!(f, "Total STI:       {:.2}", self.total_sti)?;
        writeln!(f, "Funds:           sti={:.2} lti={:.2}", self.sti_fund, self.lti_fund)?;
        writeln!(f, "Truth values:    {}", self.truth_values)?;
        writeln!(
            f,
            "Payloads:        {} ({} bytes)",
            self.payloads, self.payload_bytes
        )?;
        writeln!(f, "Scheduler:       {}", self.scheduler)?;
        writeln!(f, "Ticks:           {}", self.ticks)?;
        write!(f, "Memory regions:  {}", self.memory_regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AttentionError, CogError};

    fn kernel() -> Kernel {
        Kernel::new(KernelConfig::default()).unwrap()
    }

    #[test]
    fn attention_requires_existing_atom() {
        let k = kernel();
        let ghost = Handle::new(99).unwrap();
        assert!(matches!(
            k.set_attention(ghost, AttentionValue::with_sti(1.0)),
            Err(CogError::Atom(AtomError::NotFound { handle: 99 }))
        ));
    }

    #[test]
    fn forgotten_atoms_do_not_resolve_but_links_survive() {
        let k = kernel();
        let a = k.create_atom(AtomKind::Concept, Some("a")).unwrap();
        let b = k.create_atom(AtomKind::Concept, Some("b")).unwrap();
        let link = k.create_link(AtomKind::Inheritance, &[a, b]).unwrap();
        k.set_attention(a, AttentionValue::with_sti(0.1)).unwrap();

        k.decay(1.0).unwrap();
        assert_eq!(k.forget_check(1.0, 1), vec![a]);

        assert!(matches!(k.get(a), Err(CogError::Atom(AtomError::Forgotten { .. }))));
        assert!(k.get_structural(a).is_ok());
        assert_eq!(k.get(link).unwrap().outgoing, vec![a, b]);
        assert_eq!(k.find_by_name("a"), None);
        assert_eq!(k.status(a), Some(EntryStatus::Forgotten));

        // New links cannot reference the forgotten atom.
        assert!(matches!(
            k.create_link(AtomKind::Similarity, &[b, a]),
            Err(CogError::Atom(AtomError::UnknownAtom { position: 1, .. }))
        ));
        assert!(matches!(
            k.get_attention(a),
            Err(CogError::Attention(AttentionError::Forgotten { .. }))
        ));
    }

    #[test]
    fn link_infer_creates_evaluation_link_with_truth() {
        let k = kernel();
        let human = k.create_atom(AtomKind::Concept, Some("human")).unwrap();
        let mortal = k.create_atom(AtomKind::Concept, Some("mortal")).unwrap();
        let tv = TruthValue::new(0.95, 0.9).unwrap();
        let link = k.link_infer(human, mortal, tv).unwrap();

        let atom = k.get(link).unwrap();
        assert_eq!(atom.kind, AtomKind::Evaluation);
        assert_eq!(atom.outgoing, vec![human, mortal]);
        assert_eq!(k.infer(link).unwrap(), tv);
        assert_eq!(k.infer(human).unwrap(), TruthValue::UNKNOWN);
    }

    #[test]
    fn infer_unknown_handle_fails() {
        let k = kernel();
        assert!(matches!(
            k.infer(Handle::new(3).unwrap()),
            Err(CogError::Atom(AtomError::NotFound { .. }))
        ));
    }

    #[test]
    fn payloads_attach_to_existing_atoms() {
        let k = kernel();
        let a = k.create_atom(AtomKind::Node, None).unwrap();
        assert!(k.attach_payload(a, vec![1u8, 2, 3]).unwrap().is_none());
        assert_eq!(k.payload(a).as_deref(), Some(&[1u8, 2, 3][..]));
        assert!(k.attach_payload(Handle::new(50).unwrap(), Vec::<u8>::new()).is_err());
        assert_eq!(k.info().payloads, 1);
        assert_eq!(k.info().payload_bytes, 3);

        let replaced = k.attach_payload(a, vec![7u8; 8]).unwrap().unwrap();
        assert_eq!(replaced.len(), 3);
        assert_eq!(k.info().payload_bytes, 8);
        assert!(k.detach_payload(a).is_some());
        assert_eq!(k.info().payloads, 0);
    }

    #[test]
    fn kernels_are_independent() {
        let k1 = kernel();
        let k2 = kernel();
        let a = k1.create_atom(AtomKind::Node, None).unwrap();
        let b = k2.create_atom(AtomKind::Node, None).unwrap();
        assert_eq!(a, b);
        k1.boot().unwrap();
        assert_eq!(k2.scheduler_state(), SchedulerState::Uninitialized);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = KernelConfig::default();
        config.scheduler.memory_regions = 0;
        assert!(matches!(Kernel::new(config), Err(CogError::Config(_))));
    }

    #[test]
    fn info_reports_counts() {
        let k = kernel();
        let a = k.create_atom(AtomKind::Node, None).unwrap();
        let b = k.create_atom(AtomKind::Node, None).unwrap();
        k.create_link(AtomKind::Link, &[a, b]).unwrap();
        k.set_attention(a, AttentionValue::with_sti(5.0)).unwrap();
        let info = k.info();
        assert_eq!(info.atom_count, 3);
        assert_eq!(info.link_count, 1);
        assert_eq!(info.attention_entries, 1);
        assert_eq!(info.scheduler, "uninitialized");
        assert!(info.to_string().contains("3 (1 links)"));
    }
}
