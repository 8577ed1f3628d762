//! # Metronome Module
//!
//! A silent, visual metronome. [`BeatScheduler`] is the clock-injected state
//! machine; [`Metronome`] runs one on a worker thread and delivers beat
//! indices to a callback.
//!
//! Every beat has an expected fire time anchored to the start of the run and
//! advanced by exactly one interval per beat. The next wake-up is computed
//! from that anchor, so late wake-ups never push later beats back.

use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::MetronomeConfig;

/// Slowest supported tempo in beats per minute.
pub const MIN_TEMPO: u16 = 40;

/// Fastest supported tempo in beats per minute.
pub const MAX_TEMPO: u16 = 240;

pub const DEFAULT_TEMPO: u16 = 80;

/// Beats per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Meter {
    #[default]
    Four,
    Eight,
}

impl Meter {
    pub fn beats(self) -> u8 {
        match self {
            Meter::Four => 4,
            Meter::Eight => 8,
        }
    }

    /// Maps a requested beat count onto the nearest supported meter.
    pub fn from_beats(beats: u8) -> Self {
        match beats {
            4 => Meter::Four,
            8 => Meter::Eight,
            other => {
                let meter = if other <= 6 { Meter::Four } else { Meter::Eight };
                log::warn!(
                    "Unsupported beats per cycle {other}; using {}",
                    meter.beats()
                );
                meter
            }
        }
    }
}

/// Clamps a tempo into `MIN_TEMPO..=MAX_TEMPO`.
pub fn clamp_tempo(tempo: u16) -> u16 {
    let clamped = tempo.clamp(MIN_TEMPO, MAX_TEMPO);
    if clamped != tempo {
        log::warn!("Tempo {tempo} BPM out of range; clamped to {clamped} BPM");
    }
    clamped
}

/// Time between beats at `tempo` beats per minute.
pub fn beat_interval(tempo: u16) -> Duration {
    Duration::from_nanos(60_000_000_000 / u64::from(tempo.max(1)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Point-in-time view of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetronomeStatus {
    pub state: SchedulerState,
    pub tempo: u16,
    pub meter: Meter,
    pub beat: u8,
}

/// Drift-corrected beat state machine.
///
/// Every operation takes the current instant, so the scheduler can be driven
/// by a real clock or a simulated one.
#[derive(Debug, Clone)]
pub struct BeatScheduler {
    tempo: u16,
    meter: Meter,
    beat: u8,
    state: SchedulerState,
    expected: Option<Instant>,
    next_wake: Option<Instant>,
    /// The cycle was reset while paused; the next fired beat is beat 1.
    restart_pending: bool,
}

impl Default for BeatScheduler {
    fn default() -> Self {
        Self::new(&MetronomeConfig::default())
    }
}

impl BeatScheduler {
    pub fn new(config: &MetronomeConfig) -> Self {
        Self {
            tempo: clamp_tempo(config.tempo),
            meter: Meter::from_beats(config.beats_per_cycle),
            beat: 1,
            state: SchedulerState::Stopped,
            expected: None,
            next_wake: None,
            restart_pending: false,
        }
    }

    /// Starts a run and returns beat 1, which fires immediately.
    ///
    /// Starting a scheduler that is already running or paused restarts it.
    pub fn start(&mut self, tempo: u16, meter: Meter, now: Instant) -> Option<u8> {
        self.stop();
        self.tempo = clamp_tempo(tempo);
        self.meter = meter;
        self.state = SchedulerState::Running;
        self.anchor(now);
        Some(self.beat)
    }

    /// Fires the pending beat if its wake-up time has come.
    ///
    /// The expected time advances by exactly one interval whatever the drift,
    /// and the next wake-up lands on that new expected time (or immediately if
    /// it has already passed).
    pub fn fire(&mut self, now: Instant) -> Option<u8> {
        if self.state != SchedulerState::Running {
            return None;
        }
        let (expected, wake) = (self.expected?, self.next_wake?);
        if now < wake {
            return None;
        }

        let interval = self.interval();
        let drift = now.saturating_duration_since(expected);
        self.beat = if self.restart_pending {
            1
        } else {
            self.beat % self.meter.beats() + 1
        };
        self.restart_pending = false;
        self.expected = Some(expected + interval);
        self.next_wake = Some(now + interval.saturating_sub(drift));

        log::trace!("beat {} (drift {drift:?})", self.beat);
        Some(self.beat)
    }

    /// Changes the tempo; the pending beat is re-targeted one new interval from `now`.
    pub fn update_tempo(&mut self, tempo: u16, now: Instant) {
        self.tempo = clamp_tempo(tempo);
        if self.state == SchedulerState::Running {
            self.anchor(now);
        }
    }

    /// Switches meter and restarts the cycle at beat 1. A running scheduler is
    /// restarted at the same tempo, which fires beat 1 again. A paused one
    /// delivers beat 1 as its first beat after resuming.
    pub fn update_time_signature(&mut self, meter: Meter, now: Instant) -> Option<u8> {
        self.meter = meter;
        self.beat = 1;
        match self.state {
            SchedulerState::Running => self.start(self.tempo, meter, now),
            SchedulerState::Paused => {
                self.restart_pending = true;
                None
            }
            SchedulerState::Stopped => None,
        }
    }

    /// Cancels the pending beat but remembers the beat position.
    pub fn pause(&mut self) {
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
            self.expected = None;
            self.next_wake = None;
        }
    }

    /// Continues from the remembered position one interval from `now`.
    /// Beats skipped while paused are not replayed.
    pub fn resume(&mut self, now: Instant) {
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Running;
            self.anchor(now);
        }
    }

    /// Cancels any pending beat and rewinds to beat 1. Idempotent.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
        self.beat = 1;
        self.expected = None;
        self.next_wake = None;
        self.restart_pending = false;
    }

    fn anchor(&mut self, now: Instant) {
        let expected = now + self.interval();
        self.expected = Some(expected);
        self.next_wake = Some(expected);
    }

    pub fn interval(&self) -> Duration {
        beat_interval(self.tempo)
    }

    /// When the next beat is due, if one is scheduled.
    pub fn next_wake(&self) -> Option<Instant> {
        self.next_wake
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn beat(&self) -> u8 {
        self.beat
    }

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn meter(&self) -> Meter {
        self.meter
    }

    pub fn status(&self) -> MetronomeStatus {
        MetronomeStatus {
            state: self.state,
            tempo: self.tempo,
            meter: self.meter,
            beat: self.beat,
        }
    }
}

/// Receives beat indices on the metronome thread. It may be slow; the next
/// wake-up is computed before it runs.
pub type BeatCallback = Box<dyn FnMut(u8) + Send + 'static>;

enum Command {
    Start {
        tempo: u16,
        meter: Meter,
        on_beat: BeatCallback,
    },
    Stop,
    Pause,
    Resume,
    Tempo(u16),
    TimeSignature(Meter),
    Shutdown,
}

/// Handle to a metronome worker thread.
///
/// Control calls block until the worker has applied them, so once `stop()`
/// returns no further beat is delivered.
pub struct Metronome {
    command_tx: Sender<Command>,
    ack_rx: Receiver<MetronomeStatus>,
    thread_handle: Option<JoinHandle<()>>,
    status: MetronomeStatus,
}

impl Metronome {
    /// Spawns the worker with tempo and meter taken from `config`.
    pub fn spawn(config: &MetronomeConfig) -> std::io::Result<Self> {
        let scheduler = BeatScheduler::new(config);
        let status = scheduler.status();
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);

        let thread_handle = thread::Builder::new()
            .name("metronome".into())
            .spawn(move || run_worker(scheduler, command_rx, ack_tx))?;

        Ok(Self {
            command_tx,
            ack_rx,
            thread_handle: Some(thread_handle),
            status,
        })
    }

    /// Starts at the configured tempo and meter; beat 1 is delivered before
    /// this returns.
    pub fn start(&mut self, on_beat: BeatCallback) {
        let (tempo, meter) = (self.status.tempo, self.status.meter);
        self.start_with(tempo, meter, on_beat);
    }

    pub fn start_with(&mut self, tempo: u16, meter: Meter, on_beat: BeatCallback) {
        self.send(Command::Start {
            tempo,
            meter,
            on_beat,
        });
    }

    pub fn stop(&mut self) {
        self.send(Command::Stop);
    }

    pub fn pause(&mut self) {
        self.send(Command::Pause);
    }

    pub fn resume(&mut self) {
        self.send(Command::Resume);
    }

    pub fn update_tempo(&mut self, tempo: u16) {
        self.send(Command::Tempo(tempo));
    }

    pub fn update_time_signature(&mut self, meter: Meter) {
        self.send(Command::TimeSignature(meter));
    }

    /// Hiding the host surface pauses, showing it resumes. Beat position is kept.
    pub fn set_visible(&mut self, visible: bool) {
        if visible {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Status as of the last acknowledged command.
    pub fn status(&self) -> MetronomeStatus {
        self.status
    }

    fn send(&mut self, command: Command) {
        if self.command_tx.send(command).is_err() {
            log::error!("Metronome worker is gone; command dropped");
            return;
        }
        match self.ack_rx.recv() {
            Ok(status) => self.status = status,
            Err(_) => log::error!("Metronome worker exited without acknowledging"),
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.send(Command::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Metronome thread panicked");
            }
        }
    }
}

fn run_worker(
    mut scheduler: BeatScheduler,
    commands: Receiver<Command>,
    acks: Sender<MetronomeStatus>,
) {
    let mut on_beat: Option<BeatCallback> = None;

    loop {
        let deadline = match scheduler.next_wake() {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };

        crossbeam_channel::select! {
            recv(commands) -> msg => {
                let Ok(command) = msg else { break };
                let now = Instant::now();
                let mut emitted = None;
                let mut shutdown = false;

                match command {
                    Command::Start { tempo, meter, on_beat: callback } => {
                        on_beat = Some(callback);
                        emitted = scheduler.start(tempo, meter, now);
                        log::info!(
                            "Metronome started at {} BPM, {} beats per cycle",
                            scheduler.tempo(),
                            scheduler.meter().beats()
                        );
                    }
                    Command::Stop => {
                        scheduler.stop();
                        on_beat = None;
                    }
                    Command::Pause => scheduler.pause(),
                    Command::Resume => scheduler.resume(now),
                    Command::Tempo(tempo) => scheduler.update_tempo(tempo, now),
                    Command::TimeSignature(meter) => {
                        emitted = scheduler.update_time_signature(meter, now);
                    }
                    Command::Shutdown => {
                        scheduler.stop();
                        on_beat = None;
                        shutdown = true;
                    }
                }

                if let (Some(beat), Some(callback)) = (emitted, on_beat.as_mut()) {
                    callback(beat);
                }
                if acks.send(scheduler.status()).is_err() || shutdown {
                    break;
                }
            }
            recv(deadline) -> _ => {
                if let (Some(beat), Some(callback)) =
                    (scheduler.fire(Instant::now()), on_beat.as_mut())
                {
                    callback(beat);
                }
            }
        }
    }
    log::debug!("Metronome worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Drives the scheduler with a simulated clock, waking `delay(n)` after
    /// each due time, and returns (beat, offset from t0) for each fired beat.
    fn simulate(
        scheduler: &mut BeatScheduler,
        t0: Instant,
        beats: usize,
        mut delay: impl FnMut(usize) -> Duration,
    ) -> Vec<(u8, Duration)> {
        let mut fired = Vec::new();
        let first = scheduler.start(scheduler.tempo(), scheduler.meter(), t0).expect("beat 1");
        fired.push((first, Duration::ZERO));
        while fired.len() < beats {
            let wake = scheduler.next_wake().expect("scheduled");
            let now = wake + delay(fired.len());
            let beat = scheduler.fire(now).expect("due");
            fired.push((beat, now - t0));
        }
        fired
    }

    fn scheduler(tempo: u16, beats_per_cycle: u8) -> BeatScheduler {
        BeatScheduler::new(&MetronomeConfig {
            tempo,
            beats_per_cycle,
        })
    }

    #[test]
    fn tempo_sixty_fires_on_whole_seconds() {
        for beats_per_cycle in [4, 8] {
            let mut s = scheduler(60, beats_per_cycle);
            let t0 = Instant::now();
            let fired = simulate(&mut s, t0, 12, |_| Duration::ZERO);
            for (n, (_, at)) in fired.iter().enumerate() {
                assert_eq!(*at, ms(1000 * n as u64));
            }
        }
    }

    #[test]
    fn beat_index_wraps() {
        let mut s = scheduler(120, 4);
        let fired = simulate(&mut s, Instant::now(), 10, |_| Duration::ZERO);
        let beats: Vec<u8> = fired.iter().map(|(b, _)| *b).collect();
        assert_eq!(beats, vec![1, 2, 3, 4, 1, 2, 3, 4, 1, 2]);

        let mut s = scheduler(120, 8);
        let fired = simulate(&mut s, Instant::now(), 9, |_| Duration::ZERO);
        assert_eq!(fired.last().map(|(b, _)| *b), Some(1));
    }

    #[test]
    fn one_late_beat_does_not_shift_the_next() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);

        let late = t0 + ms(1000) + ms(250);
        assert_eq!(s.fire(late), Some(2));
        assert_eq!(s.next_wake(), Some(t0 + ms(2000)));
    }

    #[test]
    fn random_delays_do_not_accumulate() {
        let mut seed: u32 = 0x1234_5678;
        let mut s = scheduler(100, 4);
        let interval = s.interval();
        let t0 = Instant::now();
        let fired = simulate(&mut s, t0, 200, |_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ms(u64::from((seed >> 16) % 400))
        });

        // Each wake-up was scheduled for exactly n intervals after t0.
        for (n, (_, at)) in fired.iter().enumerate().skip(1) {
            let target = interval * n as u32;
            assert!(*at >= target);
            assert!(*at - target < ms(400));
        }
        assert_eq!(s.next_wake(), Some(t0 + interval * 200));
    }

    #[test]
    fn very_late_wake_catches_up_immediately() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        let now = t0 + ms(2500);
        assert_eq!(s.fire(now), Some(2));
        assert_eq!(s.next_wake(), Some(now));
        assert_eq!(s.fire(now), Some(3));
        assert_eq!(s.next_wake(), Some(t0 + ms(3000)));
    }

    #[test]
    fn early_wake_is_ignored() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        assert_eq!(s.fire(t0 + ms(999)), None);
        assert_eq!(s.beat(), 1);
    }

    #[test]
    fn tempo_change_retargets_from_now() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        s.update_tempo(120, t0 + ms(300));
        assert_eq!(s.next_wake(), Some(t0 + ms(800)));
        assert_eq!(s.fire(t0 + ms(800)), Some(2));
        assert_eq!(s.next_wake(), Some(t0 + ms(1300)));
    }

    #[test]
    fn tempo_is_clamped() {
        let mut s = scheduler(60, 4);
        s.update_tempo(1000, Instant::now());
        assert_eq!(s.tempo(), MAX_TEMPO);
        s.update_tempo(5, Instant::now());
        assert_eq!(s.tempo(), MIN_TEMPO);
        assert_eq!(scheduler(0, 4).tempo(), MIN_TEMPO);
    }

    #[test]
    fn time_signature_change_restarts_cycle() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        s.fire(t0 + ms(1000));
        s.fire(t0 + ms(2000));
        assert_eq!(s.beat(), 3);

        let now = t0 + ms(2100);
        assert_eq!(s.update_time_signature(Meter::Eight, now), Some(1));
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.meter(), Meter::Eight);
        assert_eq!(s.next_wake(), Some(now + ms(1000)));

        let mut stopped = scheduler(60, 4);
        assert_eq!(stopped.update_time_signature(Meter::Eight, t0), None);
        assert_eq!(stopped.state(), SchedulerState::Stopped);
    }

    #[test]
    fn pause_keeps_position_and_resume_reanchors() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        s.fire(t0 + ms(1000));
        s.pause();
        assert_eq!(s.state(), SchedulerState::Paused);
        assert_eq!(s.next_wake(), None);
        assert_eq!(s.fire(t0 + ms(5000)), None);

        let back = t0 + ms(10_000);
        s.resume(back);
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.next_wake(), Some(back + ms(1000)));
        assert_eq!(s.fire(back + ms(1000)), Some(3));
    }

    #[test]
    fn meter_change_while_paused_resumes_on_beat_one() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        s.fire(t0 + ms(1000));
        s.fire(t0 + ms(2000));
        s.pause();

        assert_eq!(s.update_time_signature(Meter::Eight, t0 + ms(2500)), None);
        assert_eq!(s.state(), SchedulerState::Paused);
        assert_eq!(s.beat(), 1);

        let back = t0 + ms(3000);
        s.resume(back);
        assert_eq!(s.fire(back + ms(1000)), Some(1));
        assert_eq!(s.fire(back + ms(2000)), Some(2));

        // A later restart does not inherit the reset.
        s.pause();
        s.stop();
        s.start(60, Meter::Four, back);
        assert_eq!(s.fire(back + ms(1000)), Some(2));
    }

    #[test]
    fn stop_is_idempotent_and_rewinds() {
        let mut s = scheduler(60, 4);
        let t0 = Instant::now();
        s.start(60, Meter::Four, t0);
        s.fire(t0 + ms(1000));
        s.stop();
        s.stop();
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(s.beat(), 1);
        assert_eq!(s.next_wake(), None);
        assert_eq!(s.fire(t0 + ms(2000)), None);
    }

    #[test]
    fn resume_without_pause_is_ignored() {
        let mut s = scheduler(60, 4);
        s.resume(Instant::now());
        assert_eq!(s.state(), SchedulerState::Stopped);
    }

    #[test]
    fn meter_mapping() {
        assert_eq!(Meter::from_beats(4), Meter::Four);
        assert_eq!(Meter::from_beats(8), Meter::Eight);
        assert_eq!(Meter::from_beats(3), Meter::Four);
        assert_eq!(Meter::from_beats(12), Meter::Eight);
    }

    #[test]
    fn interval_matches_tempo() {
        assert_eq!(beat_interval(60), ms(1000));
        assert_eq!(beat_interval(120), ms(500));
        assert_eq!(beat_interval(100), ms(600));
    }
}
