//! # Vocal Tuner - Desktop GUI
//!
//! Real-time interface over `vocal-tuner-core`: live note and cents readout,
//! optional live monitor, reference tone, and a silent visual metronome.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme; ticks the capture
//!   pipeline every 16 ms
//! - **Audio Threads**: CPAL capture/playback streams on their own workers
//! - **Metronome Thread**: drift-corrected beat scheduler
//! - **Communication**: Crossbeam channels carry pitch updates and beats to the GUI

mod ui;

use crossbeam_channel::{Receiver, Sender};
use iced::{self, Element, Size, Subscription, Theme};
use std::time::Duration;
use ui::main_display::create_main_view;
use vocal_tuner_core::{
    CapturePipeline, CpalHost, Meter, Metronome, MetronomeStatus, NoteReading, SchedulerState,
    TunerConfig, TunerError,
    audio::{self, AudioHost},
    config::DEFAULT_CONFIG_FILE,
    tone::ReferenceTone,
    tuning,
};

/// Analysis and redraw cadence.
const TICK_INTERVAL: Duration = Duration::from_millis(16);

pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting Vocal Tuner...");

    let result = iced::application("Vocal Tuner", TunerApp::update, TunerApp::view)
        .subscription(TunerApp::subscription)
        .theme(TunerApp::theme)
        .run();
    log::info!("Application finished with result: {result:?}");
    result
}

#[derive(Debug, Clone)]
pub enum Message {
    // Microphone
    ToggleListening,
    ToggleMonitor,
    ToggleReferenceTone,

    // Metronome
    ToggleMetronome,
    TogglePause,
    TempoChanged(u16),
    MeterSelected(Meter),

    // Window
    WindowResized(Size),
    WindowClosed,

    // Continuous update message
    Tick,
}

/// Everything the view needs to render.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub listening: bool,
    pub monitoring: bool,
    pub headphones: bool,
    pub frequency: Option<f32>,
    pub note: Option<NoteReading>,
    /// Last note sung, offered as the reference tone.
    pub reference_note: Option<NoteReading>,
    pub tone_playing: bool,
    pub metronome: MetronomeStatus,
    pub active_beat: Option<u8>,
    /// User-facing message for the last failure.
    pub status: Option<String>,
}

impl AppDisplayData {
    /// A meter change restarts the cycle; the old lamp may not exist any more.
    fn restart_beat_lights(&mut self) {
        self.active_beat = match self.metronome.state {
            SchedulerState::Running => Some(1),
            _ => None,
        };
    }
}

struct TunerApp {
    pipeline: CapturePipeline<CpalHost>,
    pitch_sender: Sender<Option<f32>>,
    pitch_receiver: Receiver<Option<f32>>,

    metronome: Option<Metronome>,
    beat_sender: Sender<u8>,
    beat_receiver: Receiver<u8>,
    /// Set when the metronome was paused because the window was hidden.
    paused_while_hidden: bool,

    tone: ReferenceTone,

    display_data: AppDisplayData,
}

impl Default for TunerApp {
    fn default() -> Self {
        let config = TunerConfig::load_or_default(DEFAULT_CONFIG_FILE);
        let (pitch_sender, pitch_receiver) = crossbeam_channel::unbounded();
        let (beat_sender, beat_receiver) = crossbeam_channel::unbounded();

        let metronome = match Metronome::spawn(&config.metronome) {
            Ok(metronome) => Some(metronome),
            Err(e) => {
                log::error!("Could not start metronome thread: {e}");
                None
            }
        };
        let metronome_status = metronome
            .as_ref()
            .map(Metronome::status)
            .unwrap_or(MetronomeStatus {
                state: SchedulerState::Stopped,
                tempo: config.metronome.tempo,
                meter: config.metronome.meter(),
                beat: 1,
            });

        let mut app = Self {
            pipeline: CapturePipeline::with_cpal(config.analysis),
            pitch_sender,
            pitch_receiver,
            metronome,
            beat_sender,
            beat_receiver,
            paused_while_hidden: false,
            tone: ReferenceTone::new(),
            display_data: AppDisplayData {
                listening: false,
                monitoring: false,
                headphones: false,
                frequency: None,
                note: None,
                reference_note: None,
                tone_playing: false,
                metronome: metronome_status,
                active_beat: None,
                status: None,
            },
        };
        app.start_listening();
        app
    }
}

impl TunerApp {
    fn start_listening(&mut self) {
        let sender = self.pitch_sender.clone();
        match self.pipeline.start(Box::new(move |frequency| {
            let _ = sender.send(frequency);
        })) {
            Ok(()) => self.display_data.status = None,
            Err(e) => {
                self.display_data.status =
                    Some(format!("{e}. Check microphone access, then press Start listening."));
            }
        }
        self.sync_pipeline_state();
    }

    fn stop_listening(&mut self) {
        self.pipeline.stop();
        while self.pitch_receiver.try_recv().is_ok() {}
        self.display_data.frequency = None;
        self.display_data.note = None;
        self.sync_pipeline_state();
    }

    fn sync_pipeline_state(&mut self) {
        self.display_data.listening = self.pipeline.is_running();
        self.display_data.monitoring = self.pipeline.is_monitoring();
    }

    fn toggle_monitor(&mut self) {
        if self.pipeline.is_monitoring() {
            self.pipeline.disable_monitoring();
        } else {
            self.display_data.headphones = self
                .pipeline
                .host()
                .output_device_name()
                .is_some_and(|name| audio::looks_like_headphones(&name));
            if let Err(e) = self.pipeline.enable_monitoring() {
                self.display_data.status = Some(e.to_string());
            }
        }
        self.sync_pipeline_state();
    }

    fn toggle_reference_tone(&mut self) {
        if self.tone.is_playing() {
            self.tone.stop();
        } else {
            let frequency = self
                .display_data
                .reference_note
                .as_ref()
                .map(NoteReading::target_frequency)
                .unwrap_or(tuning::A4_FREQUENCY);
            if let Err(e) = self.tone.play(self.pipeline.host_mut(), frequency) {
                self.display_data.status = Some(e.to_string());
            }
        }
        self.display_data.tone_playing = self.tone.is_playing();
    }

    fn with_metronome(&mut self, action: impl FnOnce(&mut Metronome)) {
        if let Some(metronome) = self.metronome.as_mut() {
            action(metronome);
            self.display_data.metronome = metronome.status();
        }
    }

    fn toggle_metronome(&mut self) {
        let sender = self.beat_sender.clone();
        self.paused_while_hidden = false;
        self.with_metronome(|metronome| match metronome.status().state {
            SchedulerState::Stopped => metronome.start(Box::new(move |beat| {
                let _ = sender.send(beat);
            })),
            _ => metronome.stop(),
        });
        if self.display_data.metronome.state == SchedulerState::Stopped {
            while self.beat_receiver.try_recv().is_ok() {}
            self.display_data.active_beat = None;
        }
    }

    fn apply_pitch(&mut self, frequency: Option<f32>) {
        self.display_data.frequency = frequency;
        self.display_data.note = frequency.and_then(tuning::note_from_frequency);
        if let Some(note) = &self.display_data.note {
            self.display_data.reference_note = Some(note.clone());
        }
    }

    fn update(&mut self, message: Message) {
        match message {
            Message::ToggleListening => {
                if self.pipeline.is_running() {
                    self.stop_listening();
                } else {
                    self.start_listening();
                }
            }
            Message::ToggleMonitor => self.toggle_monitor(),
            Message::ToggleReferenceTone => self.toggle_reference_tone(),
            Message::ToggleMetronome => self.toggle_metronome(),
            Message::TogglePause => {
                self.paused_while_hidden = false;
                self.with_metronome(|metronome| match metronome.status().state {
                    SchedulerState::Running => metronome.pause(),
                    SchedulerState::Paused => metronome.resume(),
                    SchedulerState::Stopped => {}
                });
            }
            Message::TempoChanged(tempo) => {
                self.with_metronome(|metronome| metronome.update_tempo(tempo));
            }
            Message::MeterSelected(meter) => {
                self.with_metronome(|metronome| metronome.update_time_signature(meter));
                while self.beat_receiver.try_recv().is_ok() {}
                self.display_data.restart_beat_lights();
            }
            Message::WindowResized(size) => {
                // Minimizing reports a zero-sized window.
                let visible = size.width > 0.0 && size.height > 0.0;
                let state = self.display_data.metronome.state;
                if !visible && state == SchedulerState::Running {
                    self.paused_while_hidden = true;
                    self.with_metronome(|metronome| metronome.set_visible(false));
                } else if visible && self.paused_while_hidden {
                    self.paused_while_hidden = false;
                    self.with_metronome(|metronome| metronome.set_visible(true));
                }
            }
            Message::WindowClosed => {
                log::info!("Window closed - releasing audio devices");
                self.tone.stop();
                self.pipeline.stop();
                self.with_metronome(Metronome::stop);
                self.metronome = None;
            }
            Message::Tick => {
                if let Err(e) = self.pipeline.tick() {
                    if e == TunerError::DeviceLost {
                        self.display_data.frequency = None;
                        self.display_data.note = None;
                    }
                    self.display_data.status =
                        Some(format!("{e}. Press Start listening to try again."));
                }

                let updates: Vec<Option<f32>> = self.pitch_receiver.try_iter().collect();
                if let Some(latest) = updates.last() {
                    self.apply_pitch(*latest);
                }

                if let Some(beat) = self.beat_receiver.try_iter().last() {
                    self.display_data.active_beat = Some(beat);
                }

                self.display_data.tone_playing = self.tone.is_playing();
                self.sync_pipeline_state();
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            iced::time::every(TICK_INTERVAL).map(|_| Message::Tick),
            iced::window::resize_events().map(|(_id, size)| Message::WindowResized(size)),
            iced::window::close_events().map(|_id| Message::WindowClosed),
        ])
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
