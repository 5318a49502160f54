//! Rich diagnostic error types for the cognitive kernel.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Every condition here is
//! local and recoverable: the kernel never retries on its own behalf.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the kernel.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum CogError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Atom(#[from] AtomError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Attention(#[from] AttentionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Truth(#[from] TruthError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Atom store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AtomError {
    #[error("atom not found: {handle}")]
    #[diagnostic(
        code(cogkern::atom::not_found),
        help("No atom was ever allocated with this handle. Handles start at 1.")
    )]
    NotFound { handle: u64 },

    #[error("link refers to unknown atom {member} (position {position})")]
    #[diagnostic(
        code(cogkern::atom::unknown_member),
        help(
            "Every member of a link's outgoing set must be a live atom. \
             Create the member first, or check that it has not been forgotten."
        )
    )]
    UnknownAtom { member: u64, position: usize },

    #[error("atom store capacity of {capacity} atoms exhausted")]
    #[diagnostic(
        code(cogkern::atom::capacity),
        help(
            "The store reached its configured `max_atoms`. Raise the limit in \
             `[atomspace]` or set it to unbounded."
        )
    )]
    CapacityExceeded { capacity: usize },

    #[error("atom {handle} has been forgotten")]
    #[diagnostic(
        code(cogkern::atom::forgotten),
        help(
            "The atom's importance stayed below the forgetting threshold. Its handle \
             is retained for structural references but it no longer resolves."
        )
    )]
    Forgotten { handle: u64 },
}

// ---------------------------------------------------------------------------
// Attention errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AttentionError {
    #[error("no attention value recorded for atom {handle}")]
    #[diagnostic(
        code(cogkern::attention::not_found),
        help(
            "The atom has no attention entry. This is not evidence of low importance; \
             call `set_attention` to give it one."
        )
    )]
    NotFound { handle: u64 },

    #[error("{field} = {value} is outside {range}")]
    #[diagnostic(
        code(cogkern::attention::invalid_range),
        help(
            "Attention components must lie within `[attention.bounds]`. Decay rates \
             lie in (0, 1] and diffusion rates in [0, 1]."
        )
    )]
    InvalidRange {
        field: &'static str,
        value: f32,
        range: String,
    },

    #[error("atom {handle} has been forgotten")]
    #[diagnostic(
        code(cogkern::attention::forgotten),
        help("Forgotten atoms are never re-funded. Create a new atom instead.")
    )]
    Forgotten { handle: u64 },

    #[error("{fund} fund holds {available}, cannot pay {requested}")]
    #[diagnostic(
        code(cogkern::attention::insufficient_funds),
        help(
            "Funded mode debits new attention from the economy's reserve. Let decay \
             collect more rent, lower the request, or disable `funded`."
        )
    )]
    InsufficientFunds {
        fund: &'static str,
        available: f64,
        requested: f64,
    },
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("stage {requested} is unavailable: stage {required} has not completed")]
    #[diagnostic(
        code(cogkern::scheduler::invalid_stage),
        help("Bootstrap stages must be entered in order 0 → 1 → 2 → 3.")
    )]
    InvalidStage { requested: u8, required: u8 },

    #[error("memory region count {count} is outside 1..=256")]
    #[diagnostic(
        code(cogkern::scheduler::invalid_regions),
        help("Configure `[scheduler] memory_regions` between 1 and 256.")
    )]
    InvalidRange { count: usize },

    #[error("cognitive loop already running")]
    #[diagnostic(
        code(cogkern::scheduler::already_running),
        help("Call `stop()` before starting the loop again.")
    )]
    AlreadyRunning,

    #[error("memory regions already initialized with {current} regions")]
    #[diagnostic(
        code(cogkern::scheduler::already_initialized),
        help("Stage 2 fixed the region count. It cannot change afterwards.")
    )]
    AlreadyInitialized { current: usize },

    #[error("manual tick rejected while the {hz} Hz cadence is running")]
    #[diagnostic(
        code(cogkern::scheduler::cadence_active),
        help("The autonomous cadence owns the tick. Stop it, or start in manual mode with hz = 0.")
    )]
    CadenceActive { hz: u32 },

    #[error("scheduler has been stopped")]
    #[diagnostic(
        code(cogkern::scheduler::stopped),
        help("`Stopped` is terminal. Create a new kernel to run again.")
    )]
    Stopped,
}

// ---------------------------------------------------------------------------
// Truth value errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TruthError {
    #[error("truth value {field} = {value} is outside [0, 1]")]
    #[diagnostic(
        code(cogkern::truth::out_of_range),
        help("Strength and confidence are probabilities in [0, 1].")
    )]
    OutOfRange { field: &'static str, value: f32 },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    #[diagnostic(
        code(cogkern::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(cogkern::config::parse),
        help("The file must be valid TOML with `[atomspace]`, `[attention]` and `[scheduler]` tables.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(cogkern::config::invalid), help("{message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning kernel results.
pub type CogResult<T> = std::result::Result<T, CogError>;
