//! # Musical Tuning Module
//!
//! Converts detected frequencies into note names and cent offsets using
//! twelve-tone equal temperament with A4 = 440 Hz, and back again.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Concert pitch reference.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI number of A4.
pub const A4_MIDI: i32 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A frequency expressed as the nearest equal-tempered note.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteReading {
    /// Pitch class name (e.g., "C#").
    pub name: &'static str,
    /// Scientific pitch octave (A4 is octave 4).
    pub octave: i32,
    /// MIDI note number of the nearest semitone.
    pub midi: i32,
    /// Signed offset from the nearest semitone, -50..=50.
    pub cents: i32,
}

impl NoteReading {
    /// Name with octave, e.g. "A4".
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.octave)
    }

    /// Exact frequency of the nearest semitone.
    pub fn target_frequency(&self) -> f32 {
        frequency_from_midi(self.midi)
    }
}

/// Lookup from "A4"-style labels (sharps and flats) to MIDI numbers for the
/// full MIDI range.
static NOTE_MAP: Lazy<BTreeMap<String, i32>> = Lazy::new(|| {
    const FLAT_NAMES: [Option<&str>; 12] = [
        None,
        Some("Db"),
        None,
        Some("Eb"),
        None,
        None,
        Some("Gb"),
        None,
        Some("Ab"),
        None,
        Some("Bb"),
        None,
    ];
    let mut map = BTreeMap::new();
    for midi in 0..128 {
        let pitch_class = (midi % 12) as usize;
        let octave = midi / 12 - 1;
        map.insert(format!("{}{}", NOTE_NAMES[pitch_class], octave), midi);
        if let Some(flat) = FLAT_NAMES[pitch_class] {
            map.insert(format!("{flat}{octave}"), midi);
        }
    }
    map
});

/// Continuous MIDI position of a frequency: `12*log2(f/440)+69`.
pub fn midi_from_frequency(freq: f32) -> f32 {
    12.0 * (freq / A4_FREQUENCY).log2() + A4_MIDI as f32
}

/// Equal-tempered frequency of a MIDI note.
pub fn frequency_from_midi(midi: i32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0)
}

/// Finds the nearest note and cent offset for a frequency.
///
/// # Returns
/// * `None` for non-positive or non-finite input
pub fn note_from_frequency(freq: f32) -> Option<NoteReading> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let midi = midi_from_frequency(freq).round() as i32;
    let cents = calculate_cents_deviation(freq, frequency_from_midi(midi)).round() as i32;
    Some(NoteReading {
        name: NOTE_NAMES[midi.rem_euclid(12) as usize],
        octave: midi.div_euclid(12) - 1,
        midi,
        cents,
    })
}

/// Frequency of a labelled note such as "A4", "C#3" or "Bb2".
pub fn frequency_from_name(name: &str) -> Option<f32> {
    NOTE_MAP.get(name.trim()).map(|&midi| frequency_from_midi(midi))
}

/// Deviation of `freq` from `target_freq` in cents (positive = sharp).
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
