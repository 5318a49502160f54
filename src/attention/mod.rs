//! Economic attention allocation (ECAN).
//!
//! The [`AttentionLedger`] owns one [`AttentionValue`] per atom plus the
//! economy's reserve, the [`AttentionFund`]. Importance moves between atoms and
//! the fund but is never created or destroyed by the ledger itself:
//!
//! - **Rent**: [`decay`](AttentionLedger::decay) shrinks positive STI and
//!   credits the removed amount to `sti_fund`.
//! - **Wages**: [`stimulate`](AttentionLedger::stimulate) pays STI out of the
//!   fund to an atom.
//! - **Forgetting**: an atom whose STI stays below a threshold for enough
//!   consecutive decays is retired and its residual STI returns to the fund.
//!
//! `Σ active sti + sti_fund` is therefore constant across decay, forgetting and
//! diffusion (see [`diffusion`]). Only wages and funded-mode `set_attention`
//! move value between the fund and atoms, and they do so symmetrically.

pub mod diffusion;

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::AttentionError;
use crate::handle::Handle;

/// Result type for attention operations.
pub type AttentionResult<T> = std::result::Result<T, AttentionError>;

/// Short-, long- and very-long-term importance of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttentionValue {
    pub sti: f32,
    pub lti: f32,
    pub vlti: f32,
}

impl AttentionValue {
    pub fn new(sti: f32, lti: f32, vlti: f32) -> Self {
        Self { sti, lti, vlti }
    }

    /// A neutral value with only STI set.
    pub fn with_sti(sti: f32) -> Self {
        Self {
            sti,
            ..Default::default()
        }
    }
}

impl std::fmt::Display for AttentionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "STI={:.2}, LTI={:.2}, VLTI={:.2}",
            self.sti, self.lti, self.vlti
        )
    }
}

/// Configured range for each attention component.
///
/// LTI and VLTI are always bounded below by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionBounds {
    pub sti_min: f32,
    pub sti_max: f32,
    pub lti_max: f32,
    pub vlti_max: f32,
}

impl Default for AttentionBounds {
    fn default() -> Self {
        Self {
            sti_min: -32768.0,
            sti_max: 32767.0,
            lti_max: 32767.0,
            vlti_max: 32767.0,
        }
    }
}

impl AttentionBounds {
    /// Check every component of `av` against its range. NaN never passes.
    pub fn validate(&self, av: &AttentionValue) -> AttentionResult<()> {
        check_range("sti", av.sti, self.sti_min, self.sti_max)?;
        check_range("lti", av.lti, 0.0, self.lti_max)?;
        check_range("vlti", av.vlti, 0.0, self.vlti_max)
    }

    /// Whether the bounds themselves describe non-empty ranges.
    pub fn is_well_formed(&self) -> bool {
        self.sti_min <= self.sti_max && self.lti_max >= 0.0 && self.vlti_max >= 0.0
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> AttentionResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AttentionError::InvalidRange {
            field,
            value,
            range: format!("[{min}, {max}]"),
        })
    }
}

fn check_decay_rate(field: &'static str, rate: f32) -> AttentionResult<()> {
    if rate > 0.0 && rate <= 1.0 {
        Ok(())
    } else {
        Err(AttentionError::InvalidRange {
            field,
            value: rate,
            range: "(0, 1]".into(),
        })
    }
}

/// The economy's reserve.
///
/// Held in `f64` so that rent far below the `f32` resolution of a large fund
/// is still credited.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttentionFund {
    pub sti_fund: f64,
    pub lti_fund: f64,
}

/// Lifecycle status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Active,
    /// Retired after sustained low importance. Terminal.
    Forgotten,
}

#[derive(Debug, Clone)]
struct Entry {
    av: AttentionValue,
    status: EntryStatus,
    /// Consecutive decay epochs observed below the forgetting threshold.
    ticks_below: u32,
    /// Last decay epoch folded into `ticks_below`.
    counted_epoch: u64,
}

impl Entry {
    fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }
}

/// Ledger configuration: bounds, funding mode and the tick policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    pub bounds: AttentionBounds,
    /// Debit `set_attention` from the fund instead of setting values directly.
    pub funded: bool,
    pub initial_sti_fund: f64,
    pub initial_lti_fund: f64,
    /// STI multiplier applied on every tick.
    pub decay_rate: f32,
    pub forget_threshold: f32,
    /// Consecutive below-threshold ticks before an atom is forgotten.
    pub forget_min_ticks: u32,
    /// LTI multiplier applied every `lti_decay_period` ticks.
    pub lti_decay_rate: f32,
    /// 0 disables long-term decay.
    pub lti_decay_period: u64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            bounds: AttentionBounds::default(),
            funded: false,
            initial_sti_fund: 100_000.0,
            initial_lti_fund: 100_000.0,
            decay_rate: 0.999,
            forget_threshold: 1.0,
            forget_min_ticks: 10,
            lti_decay_rate: 0.99,
            lti_decay_period: 100,
        }
    }
}

impl AttentionConfig {
    /// The per-tick policy derived from this configuration.
    pub fn tick_policy(&self) -> TickPolicy {
        TickPolicy {
            decay_rate: self.decay_rate,
            forget_threshold: self.forget_threshold,
            forget_min_ticks: self.forget_min_ticks,
            lti_decay_rate: self.lti_decay_rate,
            lti_decay_period: self.lti_decay_period,
        }
    }

    /// Reject malformed bounds and rates.
    pub fn validate(&self) -> Result<(), String> {
        if !self.bounds.is_well_formed() {
            return Err(format!("attention bounds are empty: {:?}", self.bounds));
        }
        check_decay_rate("decay rate", self.decay_rate).map_err(|e| e.to_string())?;
        check_decay_rate("lti decay rate", self.lti_decay_rate).map_err(|e| e.to_string())?;
        if !self.forget_threshold.is_finite() {
            return Err("forget_threshold must be finite".into());
        }
        Ok(())
    }
}

/// What one scheduler tick does to the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickPolicy {
    pub decay_rate: f32,
    pub forget_threshold: f32,
    pub forget_min_ticks: u32,
    pub lti_decay_rate: f32,
    pub lti_decay_period: u64,
}

/// Outcome of a single tick cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    /// Active entries visited by decay.
    pub processed: usize,
    pub sti_rent: f64,
    pub lti_rent: f64,
    pub forgotten: Vec<Handle>,
}

/// Entries and funds, guarded together so a conservation check never observes
/// one without the other.
#[derive(Debug)]
pub(crate) struct LedgerState {
    entries: HashMap<Handle, Entry>,
    fund: AttentionFund,
    decay_epoch: u64,
}

impl LedgerState {
    fn active(&self, handle: Handle) -> AttentionResult<&Entry> {
        match self.entries.get(&handle) {
            None => Err(AttentionError::NotFound {
                handle: handle.get(),
            }),
            Some(e) if !e.is_active() => Err(AttentionError::Forgotten {
                handle: handle.get(),
            }),
            Some(e) => Ok(e),
        }
    }

    fn is_active(&self, handle: Handle) -> bool {
        self.entries.get(&handle).is_some_and(Entry::is_active)
    }

    pub(crate) fn is_forgotten(&self, handle: Handle) -> bool {
        self.entries.get(&handle).is_some_and(|e| !e.is_active())
    }

    /// Returns `(processed, rent)`.
    fn decay_sti(&mut self, rate: f32) -> (usize, f64) {
        self.decay_epoch += 1;
        let mut processed = 0;
        let mut rent = 0.0f64;
        for entry in self.entries.values_mut().filter(|e| e.is_active()) {
            processed += 1;
            if entry.av.sti > 0.0 {
                let before = entry.av.sti;
                entry.av.sti = before * rate;
                rent += f64::from(before) - f64::from(entry.av.sti);
            }
        }
        self.fund.sti_fund += rent;
        (processed, rent)
    }

    fn decay_lti(&mut self, rate: f32) -> (usize, f64) {
        let mut processed = 0;
        let mut rent = 0.0f64;
        for entry in self.entries.values_mut().filter(|e| e.is_active()) {
            processed += 1;
            let before = entry.av.lti;
            entry.av.lti = before * rate;
            rent += f64::from(before) - f64::from(entry.av.lti);
        }
        self.fund.lti_fund += rent;
        (processed, rent)
    }

    fn forget(&mut self, threshold: f32, min_ticks_below: u32) -> Vec<Handle> {
        let required = min_ticks_below.max(1);
        let epoch = self.decay_epoch;
        let mut forgotten = Vec::new();

        for (&handle, entry) in self.entries.iter_mut().filter(|(_, e)| e.is_active()) {
            if entry.counted_epoch < epoch {
                entry.counted_epoch = epoch;
                if entry.av.sti < threshold {
                    entry.ticks_below += 1;
                } else {
                    entry.ticks_below = 0;
                }
            }
            if entry.ticks_below >= required {
                entry.status = EntryStatus::Forgotten;
                self.fund.sti_fund += f64::from(entry.av.sti);
                self.fund.lti_fund += f64::from(entry.av.lti);
                entry.av.sti = 0.0;
                entry.av.lti = 0.0;
                forgotten.push(handle);
            }
        }

        forgotten.sort();
        forgotten
    }
}

/// Per-atom attention values and the global attention fund.
pub struct AttentionLedger {
    state: RwLock<LedgerState>,
    bounds: AttentionBounds,
    funded: bool,
}

impl AttentionLedger {
    /// Create an empty ledger with the configured funds.
    pub fn new(config: &AttentionConfig) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                entries: HashMap::new(),
                fund: AttentionFund {
                    sti_fund: config.initial_sti_fund,
                    lti_fund: config.initial_lti_fund,
                },
                decay_epoch: 0,
            }),
            bounds: config.bounds,
            funded: config.funded,
        }
    }

    /// Upsert the attention value of `handle`.
    ///
    /// In funded mode the change relative to the previous value (the full
    /// value for a new entry) is paid from, or refunded to, the funds.
    pub fn set_attention(&self, handle: Handle, av: AttentionValue) -> AttentionResult<()> {
        self.bounds.validate(&av)?;
        let mut state = self.write_state();

        let previous = match state.entries.get(&handle) {
            Some(e) if !e.is_active() => {
                return Err(AttentionError::Forgotten {
                    handle: handle.get(),
                });
            }
            Some(e) => e.av,
            None => AttentionValue::default(),
        };

        if self.funded {
            let sti_cost = f64::from(av.sti) - f64::from(previous.sti);
            let lti_cost = f64::from(av.lti) - f64::from(previous.lti);
            ensure_affordable("sti", state.fund.sti_fund, sti_cost)?;
            ensure_affordable("lti", state.fund.lti_fund, lti_cost)?;
            state.fund.sti_fund -= sti_cost;
            state.fund.lti_fund -= lti_cost;
        }

        let epoch = state.decay_epoch;
        state.entries.insert(
            handle,
            Entry {
                av,
                status: EntryStatus::Active,
                ticks_below: 0,
                counted_epoch: epoch,
            },
        );
        Ok(())
    }

    /// The recorded attention value. Never fabricates a default.
    pub fn get_attention(&self, handle: Handle) -> AttentionResult<AttentionValue> {
        let state = self.read_state();
        state.active(handle).map(|e| e.av)
    }

    /// Status of the entry for `handle`, if one exists.
    pub fn status(&self, handle: Handle) -> Option<EntryStatus> {
        self.read_state().entries.get(&handle).map(|e| e.status)
    }

    pub fn is_forgotten(&self, handle: Handle) -> bool {
        self.status(handle) == Some(EntryStatus::Forgotten)
    }

    /// Collect rent: multiply every positive active STI by `rate ∈ (0, 1]`.
    ///
    /// Returns the number of active entries processed.
    pub fn decay(&self, rate: f32) -> AttentionResult<usize> {
        check_decay_rate("decay rate", rate)?;
        let (processed, _) = self.write_state().decay_sti(rate);
        Ok(processed)
    }

    /// The slower long-term decay: multiply every active LTI by `rate`.
    pub fn decay_long_term(&self, rate: f32) -> AttentionResult<usize> {
        check_decay_rate("lti decay rate", rate)?;
        let (processed, _) = self.write_state().decay_lti(rate);
        Ok(processed)
    }

    /// Retire entries whose STI has stayed below `threshold` for
    /// `min_ticks_below` consecutive decay calls. Returns the handles newly
    /// forgotten, in ascending order.
    pub fn forget_check(&self, threshold: f32, min_ticks_below: u32) -> Vec<Handle> {
        let forgotten = self.write_state().forget(threshold, min_ticks_below);
        if !forgotten.is_empty() {
            tracing::info!(count = forgotten.len(), threshold, "forgot atoms");
        }
        forgotten
    }

    /// Pay a wage of up to `amount` STI from the fund to `handle`.
    ///
    /// The grant is capped by `sti_max` and by what the fund holds. Returns the
    /// amount actually granted, which is exactly what the fund was debited.
    pub fn stimulate(&self, handle: Handle, amount: f32) -> AttentionResult<f64> {
        if !(amount >= 0.0 && amount.is_finite()) {
            return Err(AttentionError::InvalidRange {
                field: "wage",
                value: amount,
                range: "[0, ∞)".into(),
            });
        }
        let sti_max = self.bounds.sti_max;
        let mut state = self.write_state();
        let current = state.active(handle)?.av.sti;

        let available = state.fund.sti_fund.max(0.0);
        let headroom = f64::from(sti_max) - f64::from(current);
        let wanted = f64::from(amount).min(headroom).min(available).max(0.0);

        let mut credited = (f64::from(current) + wanted) as f32;
        if f64::from(credited) - f64::from(current) > available {
            // Rounded up past what the fund holds.
            credited = next_down(credited);
        }
        let granted = f64::from(credited) - f64::from(current);

        state.fund.sti_fund -= granted;
        if let Some(entry) = state.entries.get_mut(&handle) {
            entry.av.sti = credited;
        }
        Ok(granted)
    }

    /// Run one scheduler tick atomically: decay, forgetting check, and the
    /// periodic long-term decay when `tick` falls on the period.
    pub fn tick_cycle(&self, policy: &TickPolicy, tick: u64) -> AttentionResult<TickReport> {
        check_decay_rate("decay rate", policy.decay_rate)?;
        check_decay_rate("lti decay rate", policy.lti_decay_rate)?;

        let mut state = self.write_state();
        let (processed, sti_rent) = state.decay_sti(policy.decay_rate);
        let forgotten = state.forget(policy.forget_threshold, policy.forget_min_ticks);
        let lti_rent = if policy.lti_decay_period > 0 && tick % policy.lti_decay_period == 0 {
            state.decay_lti(policy.lti_decay_rate).1
        } else {
            0.0
        };
        drop(state);

        if !forgotten.is_empty() {
            tracing::info!(tick, count = forgotten.len(), "forgot atoms");
        }
        tracing::debug!(tick, processed, sti_rent, lti_rent, "tick cycle complete");

        Ok(TickReport {
            tick,
            processed,
            sti_rent,
            lti_rent,
            forgotten,
        })
    }

    /// Current reserve.
    pub fn fund(&self) -> AttentionFund {
        self.read_state().fund
    }

    /// Sum of STI over active entries.
    pub fn total_sti(&self) -> f64 {
        self.read_state()
            .entries
            .values()
            .filter(|e| e.is_active())
            .map(|e| f64::from(e.av.sti))
            .sum()
    }

    /// Total entries, forgotten ones included.
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.read_state()
            .entries
            .values()
            .filter(|e| e.is_active())
            .count()
    }

    pub fn forgotten_count(&self) -> usize {
        self.len() - self.active_count()
    }

    /// Active entries sorted by descending STI (the attentional focus).
    pub fn top_sti(&self, limit: usize) -> Vec<(Handle, AttentionValue)> {
        let state = self.read_state();
        let mut ranked: Vec<(Handle, AttentionValue)> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_active())
            .map(|(&h, e)| (h, e.av))
            .collect();
        ranked.sort_by(|a, b| b.1.sti.total_cmp(&a.1.sti).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    pub fn bounds(&self) -> &AttentionBounds {
        &self.bounds
    }

    pub fn is_funded(&self) -> bool {
        self.funded
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().expect("ledger lock poisoned")
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().expect("ledger lock poisoned")
    }
}

fn ensure_affordable(fund: &'static str, available: f64, cost: f64) -> AttentionResult<()> {
    if cost > 0.0 && cost > available {
        Err(AttentionError::InsufficientFunds {
            fund,
            available,
            requested: cost,
        })
    } else {
        Ok(())
    }
}

/// Largest `f32` strictly below a finite `x`.
fn next_down(x: f32) -> f32 {
    if x > 0.0 {
        f32::from_bits(x.to_bits() - 1)
    } else if x == 0.0 {
        -f32::from_bits(1)
    } else {
        f32::from_bits(x.to_bits() + 1)
    }
}
