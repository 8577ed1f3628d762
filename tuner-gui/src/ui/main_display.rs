//! # Main Display Module
//!
//! Layout of the tuner window: pitch panel on the left, metronome panel
//! below it, controls in the sidebar.

use iced::widget::{Space, button, column, container, horizontal_space, row, slider, text};
use iced::{Alignment, Color, Element, Length};

use vocal_tuner_core::metronome::{MAX_TEMPO, MIN_TEMPO};
use vocal_tuner_core::{Meter, SchedulerState};

use super::{beat_lights, cent_meter};
use crate::{AppDisplayData, Message};

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'static, Message> {
    let title = text("Vocal Tuner").size(28);

    let mut main_column = column![
        title,
        Space::with_height(20),
        create_pitch_panel(data),
        Space::with_height(10),
        create_metronome_panel(data),
    ]
    .width(Length::Fill)
    .spacing(10);

    if let Some(status) = &data.status {
        main_column = main_column.push(
            text(status.clone())
                .size(14)
                .color(Color::from_rgb(1.0, 0.6, 0.3)),
        );
    }

    let main_content = row![main_column, Space::with_width(10), create_sidebar(data)]
        .align_y(Alignment::Start)
        .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Note name, frequency readout and cent meter.
fn create_pitch_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let (note_text, cents_text) = match &data.note {
        Some(note) => (note.label(), format!("{:+} cents", note.cents)),
        None => ("--".to_string(), String::new()),
    };
    let freq_text = data
        .frequency
        .map(|hz| format!("{hz:.2} Hz"))
        .unwrap_or_else(|| "-- Hz".to_string());

    let content = column![
        row![
            text(note_text).size(64),
            Space::with_width(20),
            column![text(freq_text).size(24), text(cents_text).size(18)].spacing(4),
        ]
        .align_y(Alignment::Center),
        Space::with_height(10),
        cent_meter::CentMeter::new(data.note.as_ref().map(|n| n.cents)).view(),
    ]
    .spacing(5);

    container(
        column![text("Pitch").size(18), Space::with_height(10), content]
            .spacing(5)
            .padding(15),
    )
    .width(Length::Fill)
    .into()
}

/// Tempo, meter and the beat lights.
fn create_metronome_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let status = data.metronome;
    let beats = status.meter.beats();

    let tempo_row = row![
        text("Tempo").size(14),
        Space::with_width(10),
        slider(MIN_TEMPO..=MAX_TEMPO, status.tempo, Message::TempoChanged).width(Length::Fill),
        Space::with_width(10),
        text(format!("{} BPM", status.tempo)).size(14),
    ]
    .align_y(Alignment::Center);

    let meter_row = row![
        text("Beats").size(14),
        horizontal_space(),
        meter_button(Meter::Four, status.meter),
        Space::with_width(8),
        meter_button(Meter::Eight, status.meter),
    ]
    .align_y(Alignment::Center);

    let active = match status.state {
        SchedulerState::Stopped => None,
        _ => data.active_beat,
    };

    container(
        column![
            text("Metronome").size(18),
            Space::with_height(10),
            tempo_row,
            meter_row,
            beat_lights::BeatLights::new(beats, active).view(),
        ]
        .spacing(8)
        .padding(15),
    )
    .width(Length::Fill)
    .into()
}

fn meter_button(meter: Meter, current: Meter) -> Element<'static, Message> {
    let label = format!("{}", meter.beats());
    styled_button(label, meter == current)
        .on_press(Message::MeterSelected(meter))
        .into()
}

/// Sidebar with the session controls.
fn create_sidebar(data: &AppDisplayData) -> Element<'static, Message> {
    let listen_label = if data.listening { "Stop listening" } else { "Start listening" };
    let monitor_label = if data.monitoring { "Monitor: on" } else { "Monitor: off" };
    let tone_label = match (data.tone_playing, &data.reference_note) {
        (true, _) => "Stop reference".to_string(),
        (false, Some(note)) => format!("Play {}", note.label()),
        (false, None) => "Play A4".to_string(),
    };
    let metronome_label = match data.metronome.state {
        SchedulerState::Stopped => "Start metronome",
        _ => "Stop metronome",
    };
    let pause_label = match data.metronome.state {
        SchedulerState::Paused => "Resume",
        _ => "Pause",
    };

    let mut monitor = styled_button(monitor_label.to_string(), data.monitoring);
    if data.listening {
        monitor = monitor.on_press(Message::ToggleMonitor);
    }

    let mut pause = styled_button(pause_label.to_string(), false);
    if data.metronome.state != SchedulerState::Stopped {
        pause = pause.on_press(Message::TogglePause);
    }

    let mut items = column![
        text("Microphone").size(18),
        styled_button(listen_label.to_string(), data.listening).on_press(Message::ToggleListening),
        monitor,
    ]
    .spacing(8);

    if data.monitoring && !data.headphones {
        items = items.push(
            text("Use headphones to avoid feedback")
                .size(12)
                .color(Color::from_rgb(1.0, 0.84, 0.0)),
        );
    }

    items = items
        .push(Space::with_height(10))
        .push(text("Reference").size(18))
        .push(styled_button(tone_label, data.tone_playing).on_press(Message::ToggleReferenceTone))
        .push(Space::with_height(10))
        .push(text("Metronome").size(18))
        .push(
            styled_button(
                metronome_label.to_string(),
                data.metronome.state != SchedulerState::Stopped,
            )
            .on_press(Message::ToggleMetronome),
        )
        .push(pause);

    container(items.padding(15))
        .width(Length::Fixed(220.0))
        .height(Length::Fill)
        .into()
}

/// Sidebar button, red while its feature is active.
fn styled_button(label: String, active: bool) -> button::Button<'static, Message> {
    let widget = button(text(label).size(14).width(Length::Fill)).padding([6, 10]);
    if active {
        widget.style(|_theme, _status| button::Style {
            // Red background
            background: Some(iced::Background::Color(Color::from_rgb(0.8, 0.2, 0.2))),
            text_color: Color::WHITE,
            ..button::Style::default()
        })
    } else {
        widget
    }
}
