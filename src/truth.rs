//! Truth values consumed by downstream probabilistic inference.
//!
//! The kernel only stores `{strength, confidence}` pairs. Atoms without a
//! stored value infer to [`TruthValue::UNKNOWN`]: even odds, zero confidence.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::TruthError;
use crate::handle::Handle;

/// Result type for truth value operations.
pub type TruthResult<T> = std::result::Result<T, TruthError>;

/// Probability estimate and the confidence in that estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthValue {
    pub strength: f32,
    pub confidence: f32,
}

impl TruthValue {
    /// Default for atoms with no recorded evidence.
    pub const UNKNOWN: TruthValue = TruthValue {
        strength: 0.5,
        confidence: 0.0,
    };

    /// Create a validated truth value.
    pub fn new(strength: f32, confidence: f32) -> TruthResult<Self> {
        let tv = Self {
            strength,
            confidence,
        };
        tv.validate()?;
        Ok(tv)
    }

    pub fn validate(&self) -> TruthResult<()> {
        for (field, value) in [("strength", self.strength), ("confidence", self.confidence)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TruthError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl std::fmt::Display for TruthValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "strength={:.3}, confidence={:.3}",
            self.strength, self.confidence
        )
    }
}

/// Handle-indexed truth values.
#[derive(Debug, Default)]
pub struct TruthStore {
    values: RwLock<HashMap<Handle, TruthValue>>,
}

impl TruthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a truth value, replacing any previous one.
    pub fn set(&self, handle: Handle, tv: TruthValue) -> TruthResult<()> {
        tv.validate()?;
        self.values
            .write()
            .expect("truth store lock poisoned")
            .insert(handle, tv);
        Ok(())
    }

    /// The stored value, if any.
    pub fn get(&self, handle: Handle) -> Option<TruthValue> {
        self.values
            .read()
            .expect("truth store lock poisoned")
            .get(&handle)
            .copied()
    }

    /// The stored value, or [`TruthValue::UNKNOWN`].
    pub fn infer(&self, handle: Handle) -> TruthValue {
        self.get(handle).unwrap_or(TruthValue::UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.values.read().expect("truth store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
