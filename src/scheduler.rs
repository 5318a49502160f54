//! Bootstrap sequencing and the tick-driven cognitive loop.
//!
//! The scheduler walks the four bootstrap stages in order, then drives ledger
//! ticks either manually (`start(0)` and explicit [`Scheduler::tick`] calls) or
//! from a background cadence thread (`start(hz)` with `hz > 0`).
//!
//! While a cadence is running it owns the tick: external `tick()` calls are
//! rejected with [`SchedulerError::CadenceActive`]. Diffusion calls are still
//! accepted; they serialize against cadence ticks on the ledger lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::attention::{AttentionLedger, TickPolicy, TickReport};
use crate::error::{CogResult, SchedulerError};

/// Result type for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Bootstrap stage identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BootStage {
    /// Core kernel initialization.
    Init = 0,
    /// Hypergraph store.
    Hypergraph = 1,
    /// Scheduler and memory regions.
    Scheduler = 2,
    /// Cognitive loop.
    Cognitive = 3,
}

impl BootStage {
    pub const ALL: [BootStage; 4] = [
        BootStage::Init,
        BootStage::Hypergraph,
        BootStage::Scheduler,
        BootStage::Cognitive,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Stage from its number, if in `0..=3`.
    pub fn from_index(n: u8) -> Option<Self> {
        Self::ALL.get(n as usize).copied()
    }

    pub fn description(self) -> &'static str {
        match self {
            BootStage::Init => "Core initialization",
            BootStage::Hypergraph => "Hypergraph store",
            BootStage::Scheduler => "Scheduler and memory regions",
            BootStage::Cognitive => "Cognitive loop",
        }
    }
}

impl std::fmt::Display for BootStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage {} ({})", self.index(), self.description())
    }
}

/// Lifecycle state of the scheduler.
///
/// `StageN` means stage `N` has completed. There is no separate `Stage3`:
/// completing the cognitive stage lands in `Idle`, and both `Idle` and
/// `Ticking` report [`BootStage::Cognitive`] from
/// [`completed_stage`](Self::completed_stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Uninitialized,
    Stage0,
    Stage1,
    Stage2,
    /// Stage 3 complete, loop not started.
    Idle,
    /// Loop started. `hz == 0` is manual mode.
    Ticking { hz: u32 },
    Stopped,
}

impl SchedulerState {
    /// Highest bootstrap stage completed, if any.
    pub fn completed_stage(self) -> Option<BootStage> {
        match self {
            SchedulerState::Uninitialized => None,
            SchedulerState::Stage0 => Some(BootStage::Init),
            SchedulerState::Stage1 => Some(BootStage::Hypergraph),
            SchedulerState::Stage2 => Some(BootStage::Scheduler),
            SchedulerState::Idle | SchedulerState::Ticking { .. } | SchedulerState::Stopped => {
                Some(BootStage::Cognitive)
            }
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Uninitialized => write!(f, "uninitialized"),
            SchedulerState::Stage0 => write!(f, "stage0"),
            SchedulerState::Stage1 => write!(f, "stage1"),
            SchedulerState::Stage2 => write!(f, "stage2"),
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Ticking { hz: 0 } => write!(f, "ticking (manual)"),
            SchedulerState::Ticking { hz } => write!(f, "ticking ({hz} Hz)"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Memory regions configured at stage 2 (`1..=256`).
    pub memory_regions: usize,
    /// Nominal tick budget in microseconds; cadence ticks slower than this are
    /// logged.
    pub tick_interval_us: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            memory_regions: 16,
            tick_interval_us: 5,
        }
    }
}

const MAX_MEMORY_REGIONS: usize = 256;

fn check_regions(count: usize) -> SchedulerResult<()> {
    if (1..=MAX_MEMORY_REGIONS).contains(&count) {
        Ok(())
    } else {
        Err(SchedulerError::InvalidRange { count })
    }
}

/// State shared between the scheduler and its cadence thread.
struct TickCore {
    ledger: Arc<AttentionLedger>,
    policy: TickPolicy,
    tick_count: AtomicU64,
    budget: Duration,
}

impl TickCore {
    fn run(&self) -> CogResult<TickReport> {
        let started = Instant::now();
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        let report = self.ledger.tick_cycle(&self.policy, tick)?;
        let elapsed = started.elapsed();
        if elapsed > self.budget {
            tracing::trace!(tick, ?elapsed, budget = ?self.budget, "tick over budget");
        }
        Ok(report)
    }
}

struct Cadence {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

struct Inner {
    state: SchedulerState,
    memory_regions: usize,
    cadence: Option<Cadence>,
}

/// Drives bootstrap stages and attention ticks.
pub struct Scheduler {
    inner: Mutex<Inner>,
    core: Arc<TickCore>,
}

impl Scheduler {
    pub fn new(ledger: Arc<AttentionLedger>, policy: TickPolicy, config: &SchedulerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SchedulerState::Uninitialized,
                memory_regions: config.memory_regions,
                cadence: None,
            }),
            core: Arc::new(TickCore {
                ledger,
                policy,
                tick_count: AtomicU64::new(0),
                budget: Duration::from_micros(u64::from(config.tick_interval_us)),
            }),
        }
    }

    /// Enter a bootstrap stage.
    ///
    /// Re-entering the current or an already completed stage succeeds without
    /// side effects. Skipping a stage fails with `InvalidStage`.
    pub fn boot_stage(&self, stage: BootStage) -> SchedulerResult<()> {
        let mut inner = self.lock();
        if inner.state == SchedulerState::Stopped {
            return Err(SchedulerError::Stopped);
        }

        let completed = inner.state.completed_stage();
        if completed.is_some_and(|done| stage <= done) {
            tracing::debug!(%stage, "bootstrap stage already complete");
            return Ok(());
        }

        let expected = completed.map_or(0, |done| done.index() + 1);
        if stage.index() != expected {
            return Err(SchedulerError::InvalidStage {
                requested: stage.index(),
                required: stage.index() - 1,
            });
        }

        inner.state = match stage {
            BootStage::Init => SchedulerState::Stage0,
            BootStage::Hypergraph => SchedulerState::Stage1,
            BootStage::Scheduler => {
                check_regions(inner.memory_regions)?;
                SchedulerState::Stage2
            }
            BootStage::Cognitive => SchedulerState::Idle,
        };
        tracing::info!(%stage, regions = inner.memory_regions, "bootstrap stage complete");
        Ok(())
    }

    /// Enter every stage up to and including `stage`.
    pub fn boot_through(&self, stage: BootStage) -> SchedulerResult<()> {
        for s in BootStage::ALL.into_iter().take_while(|s| *s <= stage) {
            self.boot_stage(s)?;
        }
        Ok(())
    }

    /// Set the memory-region count used by stage 2.
    ///
    /// Once stage 2 has completed the count is fixed: the same count is
    /// accepted idempotently, a different one fails with `AlreadyInitialized`.
    pub fn init_memory_regions(&self, count: usize) -> SchedulerResult<()> {
        check_regions(count)?;
        let mut inner = self.lock();
        let fixed = inner
            .state
            .completed_stage()
            .is_some_and(|done| done >= BootStage::Scheduler);
        if fixed {
            if inner.memory_regions == count {
                return Ok(());
            }
            return Err(SchedulerError::AlreadyInitialized {
                current: inner.memory_regions,
            });
        }
        inner.memory_regions = count;
        Ok(())
    }

    /// Run one tick: decay, forgetting, periodic long-term decay.
    ///
    /// Returns the number of attention entries processed.
    pub fn tick(&self) -> CogResult<usize> {
        self.tick_report().map(|r| r.processed)
    }

    /// Like [`tick`](Self::tick), returning the full report.
    pub fn tick_report(&self) -> CogResult<TickReport> {
        // Holding the scheduler lock keeps `start(hz)` from racing a manual tick.
        let inner = self.lock();
        match inner.state {
            SchedulerState::Idle | SchedulerState::Ticking { hz: 0 } => {}
            SchedulerState::Ticking { hz } => {
                return Err(SchedulerError::CadenceActive { hz }.into());
            }
            SchedulerState::Stopped => return Err(SchedulerError::Stopped.into()),
            _ => return Err(not_booted().into()),
        }
        let report = self.core.run()?;
        drop(inner);
        Ok(report)
    }

    /// Start the loop. `hz == 0` selects manual mode; `hz > 0` spawns a cadence
    /// thread ticking at that frequency.
    pub fn start(&self, hz: u32) -> SchedulerResult<()> {
        let mut inner = self.lock();
        match inner.state {
            SchedulerState::Idle => {}
            SchedulerState::Ticking { .. } => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            _ => return Err(not_booted()),
        }

        if hz > 0 {
            inner.cadence = Some(self.spawn_cadence(hz));
        }
        inner.state = SchedulerState::Ticking { hz };
        let mode = if hz == 0 { "manual" } else { "autonomous" };
        tracing::info!(hz, mode, "cognitive loop started");
        Ok(())
    }

    fn spawn_cadence(&self, hz: u32) -> Cadence {
        let shutdown = Arc::new(AtomicBool::new(false));
        let core = Arc::clone(&self.core);
        let flag = Arc::clone(&shutdown);
        let period = Duration::from_secs_f64(1.0 / f64::from(hz));

        let handle = std::thread::spawn(move || {
            let mut next = Instant::now() + period;
            while !flag.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now < next {
                    std::thread::park_timeout(next - now);
                    continue;
                }
                if let Err(e) = core.run() {
                    tracing::warn!("cadence tick failed: {e}");
                }
                next += period;
                if next < Instant::now() {
                    // Fell behind; skip missed ticks instead of bursting.
                    next = Instant::now() + period;
                }
            }
        });

        Cadence { handle, shutdown }
    }

    /// Halt the loop and enter `Stopped`.
    ///
    /// Idempotent. Before the loop is booted this is a no-op.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if let Some(cadence) = inner.cadence.take() {
            halt(cadence);
        }
        match inner.state {
            SchedulerState::Idle | SchedulerState::Ticking { .. } => {
                inner.state = SchedulerState::Stopped;
                tracing::info!(ticks = self.tick_count(), "cognitive loop stopped");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub fn memory_regions(&self) -> usize {
        self.lock().memory_regions
    }

    /// Ticks executed so far, manual and autonomous.
    pub fn tick_count(&self) -> u64 {
        self.core.tick_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("scheduler lock poisoned")
    }
}

/// The loop operations need the cognitive stage to have completed.
fn not_booted() -> SchedulerError {
    SchedulerError::InvalidStage {
        requested: BootStage::Cognitive.index(),
        required: BootStage::Cognitive.index(),
    }
}

fn halt(cadence: Cadence) {
    cadence.shutdown.store(true, Ordering::SeqCst);
    cadence.handle.thread().unpark();
    if cadence.handle.join().is_err() {
        tracing::warn!("cadence thread panicked");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            if let Some(cadence) = inner.cadence.take() {
                halt(cadence);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::{AttentionConfig, AttentionValue};
    use crate::error::CogError;
    use crate::handle::Handle;

    fn scheduler() -> (Arc<AttentionLedger>, Scheduler) {
        let config = AttentionConfig::default();
        let ledger = Arc::new(AttentionLedger::new(&config));
        let sched = Scheduler::new(
            Arc::clone(&ledger),
            config.tick_policy(),
            &SchedulerConfig::default(),
        );
        (ledger, sched)
    }

    #[test]
    fn stages_must_be_entered_in_order() {
        let (_, sched) = scheduler();
        assert!(matches!(
            sched.boot_stage(BootStage::Hypergraph),
            Err(SchedulerError::InvalidStage {
                requested: 1,
                required: 0
            })
        ));
        sched.boot_stage(BootStage::Init).unwrap();
        assert!(matches!(
            sched.boot_stage(BootStage::Scheduler),
            Err(SchedulerError::InvalidStage {
                requested: 2,
                required: 1
            })
        ));
        assert_eq!(sched.state(), SchedulerState::Stage0);
    }

    #[test]
    fn repeated_stages_are_idempotent() {
        let (_, sched) = scheduler();
        sched.boot_stage(BootStage::Init).unwrap();
        sched.boot_stage(BootStage::Init).unwrap();
        assert_eq!(sched.state(), SchedulerState::Stage0);

        sched.boot_through(BootStage::Cognitive).unwrap();
        sched.boot_stage(BootStage::Hypergraph).unwrap();
        assert_eq!(sched.state(), SchedulerState::Idle);
    }

    #[test]
    fn stage_two_validates_region_count() {
        let (_, sched) = scheduler();
        assert!(matches!(
            sched.init_memory_regions(0),
            Err(SchedulerError::InvalidRange { count: 0 })
        ));
        assert!(sched.init_memory_regions(257).is_err());
        sched.init_memory_regions(64).unwrap();
        sched.boot_through(BootStage::Scheduler).unwrap();
        assert_eq!(sched.memory_regions(), 64);

        sched.init_memory_regions(64).unwrap();
        assert!(matches!(
            sched.init_memory_regions(32),
            Err(SchedulerError::AlreadyInitialized { current: 64 })
        ));
    }

    #[test]
    fn stage_two_rejects_misconfigured_regions() {
        let config = AttentionConfig::default();
        let ledger = Arc::new(AttentionLedger::new(&config));
        let sched = Scheduler::new(
            ledger,
            config.tick_policy(),
            &SchedulerConfig {
                memory_regions: 300,
                ..Default::default()
            },
        );
        sched.boot_through(BootStage::Hypergraph).unwrap();
        assert!(matches!(
            sched.boot_stage(BootStage::Scheduler),
            Err(SchedulerError::InvalidRange { count: 300 })
        ));
        assert_eq!(sched.state(), SchedulerState::Stage1);
    }

    #[test]
    fn tick_requires_full_boot() {
        let (_, sched) = scheduler();
        sched.boot_through(BootStage::Scheduler).unwrap();
        assert!(matches!(
            sched.tick(),
            Err(CogError::Scheduler(SchedulerError::InvalidStage { requested: 3, .. }))
        ));
        sched.boot_stage(BootStage::Cognitive).unwrap();
        assert_eq!(sched.tick().unwrap(), 0);
        assert_eq!(sched.tick_count(), 1);
    }

    #[test]
    fn manual_tick_decays_ledger() {
        let (ledger, sched) = scheduler();
        let h = Handle::new(1).unwrap();
        ledger.set_attention(h, AttentionValue::with_sti(100.0)).unwrap();
        sched.boot_through(BootStage::Cognitive).unwrap();
        sched.start(0).unwrap();

        assert_eq!(sched.tick().unwrap(), 1);
        let sti = ledger.get_attention(h).unwrap().sti;
        assert!((sti - 99.9).abs() < 1e-3);
        assert_eq!(sched.state(), SchedulerState::Ticking { hz: 0 });
    }

    #[test]
    fn start_twice_is_already_running() {
        let (_, sched) = scheduler();
        assert!(matches!(
            sched.start(0),
            Err(SchedulerError::InvalidStage { .. })
        ));
        sched.boot_through(BootStage::Cognitive).unwrap();
        sched.start(0).unwrap();
        assert!(matches!(sched.start(10), Err(SchedulerError::AlreadyRunning)));
    }

    #[test]
    fn cadence_ticks_and_rejects_manual_ticks() {
        let (_, sched) = scheduler();
        sched.boot_through(BootStage::Cognitive).unwrap();
        sched.start(200).unwrap();
        assert!(matches!(
            sched.tick(),
            Err(CogError::Scheduler(SchedulerError::CadenceActive { hz: 200 }))
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while sched.tick_count() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(sched.tick_count() >= 3);

        sched.stop();
        let after_stop = sched.tick_count();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sched.tick_count(), after_stop);
        assert_eq!(sched.state(), SchedulerState::Stopped);
    }

    #[test]
    fn stop_is_idempotent_and_terminal() {
        let (_, sched) = scheduler();
        sched.stop();
        assert_eq!(sched.state(), SchedulerState::Uninitialized);

        sched.boot_through(BootStage::Cognitive).unwrap();
        sched.stop();
        sched.stop();
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert!(matches!(sched.start(0), Err(SchedulerError::Stopped)));
        assert!(matches!(
            sched.tick(),
            Err(CogError::Scheduler(SchedulerError::Stopped))
        ));
        assert!(matches!(
            sched.boot_stage(BootStage::Init),
            Err(SchedulerError::Stopped)
        ));
    }

    #[test]
    fn completed_stage_tracks_boot_progress() {
        let (_, sched) = scheduler();
        assert_eq!(sched.state().completed_stage(), None);
        for stage in BootStage::ALL {
            sched.boot_stage(stage).unwrap();
            assert_eq!(sched.state().completed_stage(), Some(stage));
        }
        assert_eq!(sched.state(), SchedulerState::Idle);

        sched.start(0).unwrap();
        assert_eq!(
            sched.state().completed_stage(),
            Some(BootStage::Cognitive)
        );
    }

    #[test]
    fn stage_from_index() {
        assert_eq!(BootStage::from_index(2), Some(BootStage::Scheduler));
        assert_eq!(BootStage::from_index(4), None);
    }
}
