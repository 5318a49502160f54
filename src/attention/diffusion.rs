//! Importance diffusion over 1-hop hypergraph adjacency.
//!
//! A source atom gives a fraction of its STI to the neighbors that hold an
//! active attention entry, in equal shares. The debit precedes every credit,
//! so a source can never spread more than it holds. Any share that would
//! push a recipient past `sti_max` is returned to the source, which keeps
//! every value in bounds. The sub-ulp remainder of the source's new balance
//! goes to the fund, so `Σ sti + sti_fund` is unchanged exactly.
//!
//! The whole operation runs under the ledger's write lock, the same lock a
//! scheduler tick holds, so spreads and ticks never interleave.

use std::sync::Arc;

use crate::atomspace::AtomSpace;
use crate::error::{AttentionError, CogResult};
use crate::handle::Handle;

use super::AttentionLedger;

/// Stateless diffusion engine over shared store and ledger handles.
pub struct DiffusionEngine {
    atoms: Arc<AtomSpace>,
    ledger: Arc<AttentionLedger>,
}

impl DiffusionEngine {
    pub fn new(atoms: Arc<AtomSpace>, ledger: Arc<AttentionLedger>) -> Self {
        Self { atoms, ledger }
    }

    /// Spread `diffusion_rate` of `source`'s STI to its addressable neighbors.
    ///
    /// Returns the number of neighbors credited. A zero rate, a non-positive
    /// source balance, or the absence of addressable neighbors makes the call a
    /// no-op returning 0.
    pub fn spread_importance(&self, source: Handle, diffusion_rate: f32) -> CogResult<usize> {
        if !(0.0..=1.0).contains(&diffusion_rate) {
            return Err(AttentionError::InvalidRange {
                field: "diffusion rate",
                value: diffusion_rate,
                range: "[0, 1]".into(),
            }
            .into());
        }

        let sti_max = self.ledger.bounds().sti_max;
        let mut state = self.ledger.write_state();
        let source_sti = state.active(source)?.av.sti;

        if diffusion_rate == 0.0 {
            return Ok(0);
        }

        let recipients: Vec<Handle> = self
            .atoms
            .neighbors(source)?
            .into_iter()
            .filter(|&n| n != source && state.is_active(n))
            .collect();

        if recipients.is_empty() || source_sti <= 0.0 {
            return Ok(0);
        }

        let budget = source_sti * diffusion_rate;
        let share = budget / recipients.len() as f32;

        // Track what actually moved in f64 so rounding cannot mint or burn STI.
        let mut given = 0.0f64;
        for n in &recipients {
            if let Some(entry) = state.entries.get_mut(n) {
                let before = entry.av.sti;
                entry.av.sti = (before + share).min(sti_max);
                given += f64::from(entry.av.sti) - f64::from(before);
            }
        }
        let exact = f64::from(source_sti) - given;
        let remaining = exact as f32;
        if let Some(entry) = state.entries.get_mut(&source) {
            entry.av.sti = remaining;
        }
        state.fund.sti_fund += exact - f64::from(remaining);
        let overflow = f64::from(budget) - given;
        drop(state);

        tracing::debug!(
            %source,
            rate = diffusion_rate,
            budget,
            recipients = recipients.len(),
            overflow,
            "spread importance"
        );
        Ok(recipients.len())
    }

    /// Spread from several sources in order. Later sources see the balances
    /// left by earlier ones. Returns the total number of credits.
    pub fn spread_from(&self, sources: &[Handle], diffusion_rate: f32) -> CogResult<usize> {
        let mut credited = 0;
        for &source in sources {
            credited += self.spread_importance(source, diffusion_rate)?;
        }
        Ok(credited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::{AttentionBounds, AttentionConfig, AttentionValue};
    use crate::error::CogError;
    use crate::handle::AtomKind;

    struct Fixture {
        atoms: Arc<AtomSpace>,
        ledger: Arc<AttentionLedger>,
        engine: DiffusionEngine,
    }

    fn fixture(config: AttentionConfig) -> Fixture {
        let atoms = Arc::new(AtomSpace::default());
        let ledger = Arc::new(AttentionLedger::new(&config));
        let engine = DiffusionEngine::new(Arc::clone(&atoms), Arc::clone(&ledger));
        Fixture {
            atoms,
            ledger,
            engine,
        }
    }

    fn sti(f: &Fixture, h: Handle) -> f32 {
        f.ledger.get_attention(h).unwrap().sti
    }

    fn conserved_total(f: &Fixture) -> f64 {
        f.ledger.total_sti() + f.ledger.fund().sti_fund
    }

    #[test]
    fn spreads_to_single_link_neighbor() {
        let f = fixture(AttentionConfig::default());
        let cat = f.atoms.create_atom(AtomKind::Concept, Some("cat")).unwrap();
        let mammal = f.atoms.create_atom(AtomKind::Concept, Some("mammal")).unwrap();
        let link = f.atoms.create_link(AtomKind::Inheritance, &[cat, mammal]).unwrap();
        f.ledger.set_attention(cat, AttentionValue::with_sti(100.0)).unwrap();
        f.ledger.set_attention(link, AttentionValue::with_sti(0.0)).unwrap();

        assert_eq!(f.engine.spread_importance(cat, 0.2).unwrap(), 1);
        assert!((sti(&f, cat) - 80.0).abs() < 1e-4);
        assert!((sti(&f, link) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn zero_rate_is_noop() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let b = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let l = f.atoms.create_link(AtomKind::Link, &[a, b]).unwrap();
        f.ledger.set_attention(a, AttentionValue::with_sti(10.0)).unwrap();
        f.ledger.set_attention(l, AttentionValue::with_sti(1.0)).unwrap();

        assert_eq!(f.engine.spread_importance(a, 0.0).unwrap(), 0);
        assert_eq!(sti(&f, a), 10.0);
        assert_eq!(sti(&f, l), 1.0);
    }

    #[test]
    fn full_rate_moves_everything_to_one_neighbor() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let l = f.atoms.create_link(AtomKind::Link, &[a]).unwrap();
        f.ledger.set_attention(a, AttentionValue::with_sti(37.0)).unwrap();
        f.ledger.set_attention(l, AttentionValue::with_sti(3.0)).unwrap();

        assert_eq!(f.engine.spread_importance(a, 1.0).unwrap(), 1);
        assert_eq!(sti(&f, a), 0.0);
        assert_eq!(sti(&f, l), 40.0);
    }

    #[test]
    fn shares_split_over_addressed_neighbors_only() {
        let f = fixture(AttentionConfig::default());
        let hub = f.atoms.create_atom(AtomKind::Concept, Some("hub")).unwrap();
        let leaves: Vec<Handle> = (0..3)
            .map(|_| f.atoms.create_atom(AtomKind::Concept, None).unwrap())
            .collect();
        let links: Vec<Handle> = leaves
            .iter()
            .map(|&leaf| f.atoms.create_link(AtomKind::Similarity, &[hub, leaf]).unwrap())
            .collect();

        f.ledger.set_attention(hub, AttentionValue::with_sti(90.0)).unwrap();
        // Only two of three links are addressable.
        f.ledger.set_attention(links[0], AttentionValue::with_sti(0.0)).unwrap();
        f.ledger.set_attention(links[2], AttentionValue::with_sti(0.0)).unwrap();

        assert_eq!(f.engine.spread_importance(hub, 0.5).unwrap(), 2);
        assert!((sti(&f, links[0]) - 22.5).abs() < 1e-4);
        assert!((sti(&f, links[2]) - 22.5).abs() < 1e-4);
        assert!(f.ledger.get_attention(links[1]).is_err());
    }

    #[test]
    fn no_addressable_neighbors_skips_debit() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let b = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        f.atoms.create_link(AtomKind::Link, &[a, b]).unwrap();
        f.ledger.set_attention(a, AttentionValue::with_sti(10.0)).unwrap();

        assert_eq!(f.engine.spread_importance(a, 0.5).unwrap(), 0);
        assert_eq!(sti(&f, a), 10.0);
    }

    #[test]
    fn self_references_are_excluded() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let l = f.atoms.create_link(AtomKind::Link, &[a]).unwrap();
        let outer = f.atoms.create_link(AtomKind::Link, &[l, l]).unwrap();
        f.ledger.set_attention(l, AttentionValue::with_sti(10.0)).unwrap();
        f.ledger.set_attention(outer, AttentionValue::with_sti(0.0)).unwrap();

        // `l`'s neighbors are `a` (no entry) and `outer`; never itself.
        assert_eq!(f.engine.spread_importance(l, 0.5).unwrap(), 1);
        assert_eq!(sti(&f, outer), 5.0);
    }

    #[test]
    fn overflow_returns_to_source() {
        let f = fixture(AttentionConfig {
            bounds: AttentionBounds {
                sti_max: 100.0,
                ..Default::default()
            },
            ..Default::default()
        });
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let l = f.atoms.create_link(AtomKind::Link, &[a]).unwrap();
        f.ledger.set_attention(a, AttentionValue::with_sti(50.0)).unwrap();
        f.ledger.set_attention(l, AttentionValue::with_sti(95.0)).unwrap();
        let before = conserved_total(&f);

        assert_eq!(f.engine.spread_importance(a, 1.0).unwrap(), 1);
        assert_eq!(sti(&f, l), 100.0);
        assert_eq!(sti(&f, a), 45.0);
        assert!((conserved_total(&f) - before).abs() < 1e-6);
    }

    #[test]
    fn repeated_spreads_stay_in_bounds_and_conserve() {
        let f = fixture(AttentionConfig {
            bounds: AttentionBounds {
                sti_min: -10.0,
                sti_max: 60.0,
                ..Default::default()
            },
            ..Default::default()
        });
        let nodes: Vec<Handle> = (0..4)
            .map(|_| f.atoms.create_atom(AtomKind::Concept, None).unwrap())
            .collect();
        let mut all = nodes.clone();
        for pair in nodes.windows(2) {
            all.push(f.atoms.create_link(AtomKind::Inheritance, pair).unwrap());
        }
        for &h in &all {
            f.ledger.set_attention(h, AttentionValue::with_sti(50.0)).unwrap();
        }
        let before = conserved_total(&f);

        for round in 0..50 {
            let source = all[round % all.len()];
            f.engine.spread_importance(source, 0.7).unwrap();
        }
        for &h in &all {
            let v = sti(&f, h);
            assert!((-10.0..=60.0).contains(&v), "{h} out of bounds: {v}");
        }
        assert!((conserved_total(&f) - before).abs() < 1e-6);
    }

    #[test]
    fn invalid_rates_and_sources() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        for rate in [-0.1, 1.1, f32::NAN] {
            assert!(matches!(
                f.engine.spread_importance(a, rate),
                Err(CogError::Attention(AttentionError::InvalidRange { .. }))
            ));
        }
        assert!(matches!(
            f.engine.spread_importance(a, 0.5),
            Err(CogError::Attention(AttentionError::NotFound { .. }))
        ));
    }

    #[test]
    fn non_positive_source_is_noop() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let l = f.atoms.create_link(AtomKind::Link, &[a]).unwrap();
        f.ledger.set_attention(a, AttentionValue::with_sti(-5.0)).unwrap();
        f.ledger.set_attention(l, AttentionValue::with_sti(5.0)).unwrap();
        assert_eq!(f.engine.spread_importance(a, 0.5).unwrap(), 0);
        assert_eq!(sti(&f, a), -5.0);
        assert_eq!(sti(&f, l), 5.0);
    }

    #[test]
    fn spread_from_chains_sources() {
        let f = fixture(AttentionConfig::default());
        let a = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let b = f.atoms.create_atom(AtomKind::Node, None).unwrap();
        let l = f.atoms.create_link(AtomKind::Link, &[a, b]).unwrap();
        for h in [a, b, l] {
            f.ledger.set_attention(h, AttentionValue::with_sti(10.0)).unwrap();
        }
        assert_eq!(f.engine.spread_from(&[a, b], 0.5).unwrap(), 2);
        assert_eq!(sti(&f, l), 20.0);
    }

    #[test]
    fn fractional_shares_conserve_exactly() {
        let f = fixture(AttentionConfig::default());
        let hub = f.atoms.create_atom(AtomKind::Concept, None).unwrap();
        let mut all = vec![hub];
        for _ in 0..7 {
            let leaf = f.atoms.create_atom(AtomKind::Concept, None).unwrap();
            all.push(leaf);
            all.push(f.atoms.create_link(AtomKind::Similarity, &[hub, leaf]).unwrap());
        }
        for (i, &h) in all.iter().enumerate() {
            let sti = 0.1 + i as f32 * 1.37;
            f.ledger.set_attention(h, AttentionValue::with_sti(sti)).unwrap();
        }
        let before = conserved_total(&f);

        for round in 0..500 {
            let source = all[(round * 3) % all.len()];
            f.engine.spread_importance(source, 0.33).unwrap();
        }
        assert!((conserved_total(&f) - before).abs() < 1e-7);
    }
}
