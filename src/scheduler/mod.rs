//! Capture scheduler.
//!
//! Runs the capture sequence (pull a frame, resolve the region, crop and
//! resample, submit) either on a fixed cadence or on demand. At most one
//! submission is outstanding at any time: a cycle that finds another in
//! flight is skipped, never queued.
//!
//! Locking:
//! - `Shared::source` guards the frame source. A pull may block (an HTTP
//!   snapshot waits on the camera), so nothing else is held across it.
//! - `Shared::state` guards the region source and motion baseline. It is
//!   held only to resolve a region, so pointer events stay responsive
//!   while a frame is pulled or a crop is being recognized.
//! - `Shared::in_flight` is an atomic ticket, `0` when idle. Only the
//!   cycle path sets it; `stop()` clears it.
//! - `Shared::gate` orders the last epoch check before submission against
//!   the epoch bump in `stop()`: once `stop()` returns, no cycle that was
//!   running at the time can start a new submission.
//! - `CaptureScheduler::control` serializes start/stop/period changes so
//!   there is never more than one live ticker.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::CaptureConfig;
use crate::detect::MotionConfig;
use crate::editor::{EditorUpdate, PointerEvent};
use crate::ingest::{open_source, FrameSource};
use crate::mode::{CaptureMode, RegionResolution, RegionSource};
use crate::normalizer::{NormalizeConfig, NormalizedImage, RegionNormalizer};
use crate::recognize::{open_recognizer, RecognitionResult, Recognizer};
use crate::region::BoundingRegion;
use crate::CaptureError;

mod outcome;
mod ticker;

pub use outcome::{SchedulerStats, SkipReason, TickOutcome};
use ticker::Ticker;

pub const DEFAULT_PERIOD_MS: u64 = 1000;

/// Called with every cycle outcome, on the thread that ran the cycle.
pub type OutcomeListener = Arc<dyn Fn(&TickOutcome) + Send + Sync>;

/// Pipeline settings fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureOptions {
    pub mode: CaptureMode,
    pub motion: MotionConfig,
    pub normalize: NormalizeConfig,
    /// In automatic mode, submit the whole frame when no motion region is
    /// found instead of skipping the cycle.
    pub fallback_to_full_frame: bool,
    /// Period used by [`CaptureScheduler::period`] until `start` or
    /// `set_period` supplies one.
    pub period: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Automatic,
            motion: MotionConfig::default(),
            normalize: NormalizeConfig::default(),
            fallback_to_full_frame: false,
            period: Duration::from_millis(DEFAULT_PERIOD_MS),
        }
    }
}

struct CaptureState {
    regions: RegionSource,
    motion: MotionConfig,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    missed_ticks: AtomicU64,
    triggers: AtomicU64,
    dispatches: AtomicU64,
    failures: AtomicU64,
    discarded: AtomicU64,
    skipped_in_flight: AtomicU64,
    skipped_no_frame: AtomicU64,
    skipped_no_region: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            missed_ticks: self.missed_ticks.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            skipped_in_flight: self.skipped_in_flight.load(Ordering::Relaxed),
            skipped_no_frame: self.skipped_no_frame.load(Ordering::Relaxed),
            skipped_no_region: self.skipped_no_region.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Trigger {
    Periodic { generation: u64 },
    Manual,
}

struct Shared {
    source: Mutex<Box<dyn FrameSource>>,
    state: Mutex<CaptureState>,
    recognizer: Arc<dyn Recognizer>,
    normalizer: RegionNormalizer,
    fallback_to_full_frame: bool,
    in_flight: AtomicU64,
    next_ticket: AtomicU64,
    /// Bumped by `stop()`; cycles from an older epoch do not submit, and
    /// results from one are discarded.
    epoch: AtomicU64,
    gate: Mutex<()>,
    /// Identifies the live ticker; ticks from older ones do nothing.
    generation: AtomicU64,
    /// Latest successful result. Failures are reported but never stored.
    last_result: Mutex<Option<RecognitionResult>>,
    listener: Mutex<Option<OutcomeListener>>,
    counters: Counters,
}

/// Holds the in-flight ticket for the duration of one cycle.
///
/// Release only clears the flag if it still holds this guard's ticket, so a
/// cycle that outlives a `stop()` cannot clear a newer cycle's flag.
struct InFlightGuard<'a> {
    flag: &'a AtomicU64,
    ticket: u64,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(shared: &'a Shared) -> Option<Self> {
        let ticket = shared.next_ticket.fetch_add(1, Ordering::SeqCst);
        shared
            .in_flight
            .compare_exchange(0, ticket, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self {
            flag: &shared.in_flight,
            ticket,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .flag
            .compare_exchange(self.ticket, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, CaptureState>, CaptureError> {
        self.state.lock().map_err(|_| CaptureError::Poisoned)
    }

    fn lock_source(&self) -> Result<MutexGuard<'_, Box<dyn FrameSource>>, CaptureError> {
        self.source.lock().map_err(|_| CaptureError::Poisoned)
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation.load(Ordering::SeqCst)
    }

    fn run_tick(&self, generation: u64) {
        if !self.is_current(generation) {
            log::debug!("tick from superseded ticker ignored");
            return;
        }
        Counters::bump(&self.counters.ticks);
        let outcome = self.cycle(Trigger::Periodic { generation });
        self.record(&outcome);
    }

    fn run_manual(&self) -> TickOutcome {
        Counters::bump(&self.counters.triggers);
        let outcome = self.cycle(Trigger::Manual);
        self.record(&outcome);
        outcome
    }

    fn cycle(&self, trigger: Trigger) -> TickOutcome {
        let Some(_guard) = InFlightGuard::acquire(self) else {
            return TickOutcome::Skipped(SkipReason::InFlight);
        };
        // Epoch before generation: `stop()` bumps them in the opposite
        // order, so a tick that still sees its generation as current also
        // holds the pre-stop epoch and is caught at the gate below.
        let epoch = self.epoch.load(Ordering::SeqCst);
        if let Trigger::Periodic { generation } = trigger {
            if !self.is_current(generation) {
                return TickOutcome::Skipped(SkipReason::Superseded);
            }
        }

        let image = match self.prepare() {
            Ok(image) => image,
            Err(outcome) => return outcome,
        };
        {
            let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return TickOutcome::Skipped(SkipReason::Superseded);
            }
        }
        let result = self.recognizer.submit(&image);

        if self.epoch.load(Ordering::SeqCst) != epoch {
            return TickOutcome::Discarded(result);
        }
        if result.succeeded {
            if let Ok(mut last) = self.last_result.lock() {
                *last = Some(result.clone());
            }
        }
        TickOutcome::Dispatched(result)
    }

    /// Everything up to submission: pull a frame, resolve the region, crop.
    fn prepare(&self) -> Result<NormalizedImage, TickOutcome> {
        let frame = {
            let mut source = self.lock_source().map_err(TickOutcome::Rejected)?;
            if !source.is_active() {
                return Err(TickOutcome::Skipped(SkipReason::FrameUnavailable));
            }
            match source.current_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(TickOutcome::Skipped(SkipReason::FrameUnavailable)),
                Err(err) => {
                    log::warn!("frame source {}: {:#}", source.describe(), err);
                    return Err(TickOutcome::Skipped(SkipReason::FrameUnavailable));
                }
            }
        };

        let resolution = self
            .lock_state()
            .map_err(TickOutcome::Rejected)?
            .regions
            .resolve(&frame);
        let region = match resolution {
            RegionResolution::Found(region) => Some(region),
            RegionResolution::NotSelected => {
                return Err(TickOutcome::Rejected(CaptureError::MissingRegion))
            }
            RegionResolution::NoMotion(_) if self.fallback_to_full_frame => None,
            RegionResolution::NoMotion(outcome) => {
                return Err(TickOutcome::Skipped(SkipReason::NoRegion(outcome)))
            }
        };

        self.normalizer
            .normalize(&frame, region.as_ref())
            .map_err(TickOutcome::Rejected)
    }

    fn record(&self, outcome: &TickOutcome) {
        let counters = &self.counters;
        match outcome {
            TickOutcome::Dispatched(result) => {
                Counters::bump(&counters.dispatches);
                if !result.succeeded {
                    Counters::bump(&counters.failures);
                }
                log::info!("recognition ({}): {}", self.recognizer.name(), result);
            }
            TickOutcome::Discarded(result) => {
                Counters::bump(&counters.discarded);
                if !result.succeeded {
                    Counters::bump(&counters.failures);
                }
                log::info!("result arrived after stop, discarded: {}", result);
            }
            TickOutcome::Skipped(reason) => {
                match reason {
                    SkipReason::InFlight => Counters::bump(&counters.skipped_in_flight),
                    SkipReason::FrameUnavailable => Counters::bump(&counters.skipped_no_frame),
                    SkipReason::NoRegion(_) => Counters::bump(&counters.skipped_no_region),
                    SkipReason::Superseded => {}
                }
                log::debug!("capture {}", outcome);
            }
            TickOutcome::Rejected(err) => {
                Counters::bump(&counters.rejected);
                match err {
                    CaptureError::MissingRegion => log::debug!("capture rejected: {}", err),
                    _ => log::warn!("capture rejected: {}", err),
                }
            }
        }

        let listener = self.listener.lock().ok().and_then(|l| l.clone());
        if let Some(listener) = listener {
            listener(outcome);
        }
    }
}

struct Control {
    ticker: Option<Ticker>,
    period: Duration,
}

/// Owns the capture pipeline and its cadence.
///
/// All methods take `&self`; share the scheduler across threads with an
/// `Arc`.
pub struct CaptureScheduler {
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl CaptureScheduler {
    pub fn new(
        source: Box<dyn FrameSource>,
        recognizer: Arc<dyn Recognizer>,
        options: CaptureOptions,
    ) -> Self {
        let shared = Shared {
            source: Mutex::new(source),
            state: Mutex::new(CaptureState {
                regions: RegionSource::new(options.mode, options.motion),
                motion: options.motion,
            }),
            recognizer,
            normalizer: RegionNormalizer::new(options.normalize),
            fallback_to_full_frame: options.fallback_to_full_frame,
            in_flight: AtomicU64::new(0),
            next_ticket: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            last_result: Mutex::new(None),
            listener: Mutex::new(None),
            counters: Counters::default(),
        };
        Self {
            shared: Arc::new(shared),
            control: Mutex::new(Control {
                ticker: None,
                period: options.period,
            }),
        }
    }

    /// Open and connect the configured source and recognizer.
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        let mut source = open_source(&config.source)?;
        let described = source.describe();
        source
            .connect()
            .with_context(|| format!("connect frame source {}", described))?;
        let recognizer = open_recognizer(&config.recognition)?;
        log::info!(
            "capture pipeline: source {}, recognizer {}",
            described,
            recognizer.name()
        );
        Ok(Self::new(source, recognizer, config.capture_options()))
    }

    fn lock_control(&self) -> Result<MutexGuard<'_, Control>> {
        self.control
            .lock()
            .map_err(|_| anyhow!("scheduler control lock poisoned"))
    }

    /// Begin periodic capture.
    ///
    /// Returns `Ok(false)` without doing anything when already running or
    /// when the frame source is not active.
    pub fn start(&self, period: Duration) -> Result<bool> {
        if period.is_zero() {
            return Err(anyhow!("capture period must be positive"));
        }
        let mut control = self.lock_control()?;
        if control.ticker.is_some() {
            log::debug!("capture already running");
            return Ok(false);
        }
        if !self.source_active()? {
            log::warn!("frame source is not active; capture not started");
            return Ok(false);
        }
        control.ticker = Some(self.spawn_ticker(period)?);
        control.period = period;
        log::info!("capture started (period {:?})", period);
        Ok(true)
    }

    /// Stop periodic capture and release the in-flight flag.
    ///
    /// A dispatch already outstanding runs to completion, but its result is
    /// reported as [`TickOutcome::Discarded`] and not applied. A cycle that
    /// has not submitted yet ends as [`SkipReason::Superseded`]; no
    /// submission starts after this returns. Returns whether a ticker was
    /// running.
    pub fn stop(&self) -> Result<bool> {
        let mut control = self.lock_control()?;
        let ticker = control.ticker.take();
        let was_running = ticker.is_some();
        if let Some(ticker) = ticker {
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            ticker.cancel();
        }
        {
            let _gate = self
                .shared
                .gate
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.shared.in_flight.store(0, Ordering::SeqCst);
        if was_running {
            log::info!("capture stopped");
        }
        Ok(was_running)
    }

    /// Change the capture period. While running, the old ticker is cancelled
    /// before the new one is created; an outstanding dispatch is unaffected.
    ///
    /// If the new ticker cannot be created the scheduler is left stopped and
    /// the error is returned.
    pub fn set_period(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(anyhow!("capture period must be positive"));
        }
        let mut control = self.lock_control()?;
        replace_ticker(&mut control, period, |period| self.spawn_ticker(period))
    }

    /// Run the capture sequence once, off the cadence.
    pub fn trigger_once(&self) -> TickOutcome {
        self.shared.run_manual()
    }

    fn spawn_ticker(&self, period: Duration) -> Result<Ticker> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = self.shared.clone();
        let missed = self.shared.clone();
        Ticker::spawn(
            period,
            move || shared.run_tick(generation),
            move |count| {
                missed
                    .counters
                    .missed_ticks
                    .fetch_add(count, Ordering::Relaxed);
                log::debug!("dropped {} tick(s) while a capture overran", count);
            },
        )
    }

    pub fn is_running(&self) -> bool {
        self.control
            .lock()
            .map(|c| c.ticker.is_some())
            .unwrap_or(false)
    }

    /// Current period: the live ticker's, or the one the next start would
    /// default to.
    pub fn period(&self) -> Duration {
        match self.control.lock() {
            Ok(control) => control
                .ticker
                .as_ref()
                .map(|t| t.period())
                .unwrap_or(control.period),
            Err(_) => Duration::from_millis(DEFAULT_PERIOD_MS),
        }
    }

    /// Waits for a frame pull in progress.
    pub fn source_active(&self) -> Result<bool> {
        Ok(self.shared.lock_source()?.is_active())
    }

    pub fn mode(&self) -> Result<CaptureMode, CaptureError> {
        Ok(self.shared.lock_state()?.regions.mode())
    }

    /// Switch between manual and automatic region selection. Switching
    /// discards the previous mode's region and the motion baseline.
    pub fn set_mode(&self, mode: CaptureMode) -> Result<bool, CaptureError> {
        let mut state = self.shared.lock_state()?;
        let motion = state.motion;
        let switched = state.regions.switch(mode, motion);
        if switched {
            log::info!("capture mode set to {}", mode);
        }
        Ok(switched)
    }

    /// Feed a pointer event to the region editor (manual mode only).
    pub fn handle_pointer(&self, event: PointerEvent) -> Result<EditorUpdate, CaptureError> {
        self.shared.lock_state()?.regions.handle_pointer(event)
    }

    /// Commit a region directly, as if it had been dragged out.
    pub fn select_region(&self, region: BoundingRegion) -> Result<(), CaptureError> {
        self.shared.lock_state()?.regions.commit(region)
    }

    /// Region the next cycle would use, as far as is known without a frame.
    pub fn current_region(&self) -> Option<BoundingRegion> {
        self.shared.lock_state().ok()?.regions.current()
    }

    /// Latest successful recognition. A failed dispatch leaves it unchanged.
    pub fn last_result(&self) -> Option<RecognitionResult> {
        self.shared.last_result.lock().ok()?.clone()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot()
    }

    /// Register a callback for every cycle outcome. Replaces any previous one.
    pub fn set_listener(&self, listener: OutcomeListener) {
        if let Ok(mut slot) = self.shared.listener.lock() {
            *slot = Some(listener);
        }
    }
}

/// Swap a running ticker for one with `period`, or just record the period
/// when stopped. On a spawn failure the old ticker is already gone.
fn replace_ticker<F>(control: &mut Control, period: Duration, spawn: F) -> Result<()>
where
    F: FnOnce(Duration) -> Result<Ticker>,
{
    control.period = period;
    let Some(old) = control.ticker.take() else {
        return Ok(());
    };
    old.cancel();
    match spawn(period) {
        Ok(ticker) => {
            control.ticker = Some(ticker);
            log::info!("capture period changed to {:?}", period);
            Ok(())
        }
        Err(err) => {
            log::error!("capture stopped: could not restart ticker: {:#}", err);
            Err(err.context("capture stopped"))
        }
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.lock() {
            if let Some(ticker) = control.ticker.take() {
                self.shared.generation.fetch_add(1, Ordering::SeqCst);
                ticker.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SyntheticScene, SyntheticSource};
    use crate::recognize::StubRecognizer;

    fn scheduler(mode: CaptureMode, connect: bool) -> CaptureScheduler {
        let mut source = SyntheticSource::new(SyntheticScene::Static, 64, 48);
        if connect {
            source.connect().unwrap();
        }
        CaptureScheduler::new(
            Box::new(source),
            Arc::new(StubRecognizer::new()),
            CaptureOptions {
                mode,
                ..CaptureOptions::default()
            },
        )
    }

    #[test]
    fn in_flight_guard_is_exclusive_and_ticket_scoped() {
        let scheduler = scheduler(CaptureMode::Automatic, true);
        let shared = &scheduler.shared;
        let first = InFlightGuard::acquire(shared).expect("idle flag");
        assert!(InFlightGuard::acquire(shared).is_none());

        // stop() clears the flag; a newer cycle takes it; the old guard's
        // release must leave the newer ticket alone.
        shared.in_flight.store(0, Ordering::SeqCst);
        let second = InFlightGuard::acquire(shared).expect("cleared flag");
        drop(first);
        assert_eq!(shared.in_flight.load(Ordering::SeqCst), second.ticket);
        drop(second);
        assert_eq!(shared.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn trigger_while_in_flight_is_skipped() {
        let scheduler = scheduler(CaptureMode::Automatic, true);
        let _held = InFlightGuard::acquire(&scheduler.shared).unwrap();
        assert_eq!(
            scheduler.trigger_once(),
            TickOutcome::Skipped(SkipReason::InFlight)
        );
        assert_eq!(scheduler.stats().skipped_in_flight, 1);
    }

    #[test]
    fn manual_mode_without_region_is_rejected() {
        let scheduler = scheduler(CaptureMode::Manual, true);
        let outcome = scheduler.trigger_once();
        assert_eq!(outcome, TickOutcome::Rejected(CaptureError::MissingRegion));
        assert!(scheduler.last_result().is_none());
    }

    #[test]
    fn selected_region_is_dispatched() {
        let scheduler = scheduler(CaptureMode::Manual, true);
        scheduler
            .select_region(BoundingRegion::new(0.25, 0.25, 0.5, 0.5).unwrap())
            .unwrap();
        let outcome = scheduler.trigger_once();
        assert!(matches!(outcome, TickOutcome::Dispatched(ref r) if r.succeeded));
        assert_eq!(scheduler.last_result().as_ref(), outcome.result());
    }

    #[test]
    fn start_is_a_no_op_for_inactive_source() -> Result<()> {
        let scheduler = scheduler(CaptureMode::Automatic, false);
        assert!(!scheduler.start(Duration::from_millis(20))?);
        assert!(!scheduler.is_running());
        Ok(())
    }

    #[test]
    fn start_twice_keeps_one_ticker() -> Result<()> {
        let scheduler = scheduler(CaptureMode::Automatic, true);
        assert!(scheduler.start(Duration::from_millis(50))?);
        assert!(!scheduler.start(Duration::from_millis(5))?);
        assert_eq!(scheduler.period(), Duration::from_millis(50));
        assert!(scheduler.stop()?);
        assert!(!scheduler.stop()?);
        Ok(())
    }

    #[test]
    fn failed_ticker_restart_leaves_scheduler_stopped() -> Result<()> {
        let mut control = Control {
            ticker: Some(Ticker::spawn(Duration::from_secs(60), || {}, |_| {})?),
            period: Duration::from_secs(60),
        };
        let err = replace_ticker(&mut control, Duration::from_millis(30), |_| {
            Err(anyhow!("no threads left"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("capture stopped"));
        assert!(control.ticker.is_none());
        assert_eq!(control.period, Duration::from_millis(30));
        Ok(())
    }

    #[test]
    fn periodic_cycle_from_stale_generation_does_not_submit() {
        let scheduler = scheduler(CaptureMode::Manual, true);
        scheduler
            .select_region(BoundingRegion::new(0.0, 0.0, 1.0, 1.0).unwrap())
            .unwrap();
        // The check after taking the flag catches a tick that got past the
        // one in `run_tick` before the ticker was replaced.
        scheduler.shared.generation.fetch_add(1, Ordering::SeqCst);
        let outcome = scheduler.shared.cycle(Trigger::Periodic { generation: 0 });
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::Superseded));
        assert_eq!(scheduler.shared.in_flight.load(Ordering::SeqCst), 0);
        assert!(scheduler.last_result().is_none());
    }

    #[test]
    fn superseded_tick_is_not_counted() {
        let scheduler = scheduler(CaptureMode::Automatic, true);
        scheduler.shared.generation.fetch_add(1, Ordering::SeqCst);
        scheduler.shared.run_tick(0);
        assert_eq!(scheduler.stats().ticks, 0);
        scheduler.shared.run_tick(1);
        assert_eq!(scheduler.stats().ticks, 1);
    }

    #[test]
    fn zero_period_is_an_error() {
        let scheduler = scheduler(CaptureMode::Automatic, true);
        assert!(scheduler.start(Duration::ZERO).is_err());
        assert!(scheduler.set_period(Duration::ZERO).is_err());
    }
}
