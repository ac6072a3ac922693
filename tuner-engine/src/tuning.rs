//! # Musical Tuning Module
//!
//! Pitch classification against 12-tone equal temperament anchored at
//! A4 = 440 Hz. A measured frequency maps to the nearest note name,
//! accidental, octave, reference frequency and cents deviation.
//!
//! ## Rounding
//! Every rounding step (nearest semitone, 2-decimal reference frequency,
//! whole cents) rounds half away from zero, which is what `f64::round` does.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};

/// Reference pitch A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// Octave number of the reference pitch.
pub const A4_OCTAVE: i32 = 4;

const SEMITONES_PER_OCTAVE: f64 = 12.0;
const CENTS_PER_OCTAVE: f64 = 1200.0;

/// One of the seven natural note letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
            Letter::F => "F",
            Letter::G => "G",
        };
        f.write_str(name)
    }
}

/// Accidental attached to a classified note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    /// Glyph used when printing a note name; empty for naturals.
    pub fn symbol(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "♯",
            Accidental::Flat => "♭",
        }
    }
}

/// Selects how chromatic tones are spelled.
///
/// `Sharp` names the lower natural with a sharp (C♯), `Flat` names the upper
/// natural with a flat (D♭).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccidentalMode {
    #[default]
    Sharp,
    Flat,
}

/// Spelling of one chromatic position.
#[derive(Debug, Clone, Copy)]
enum Spelling {
    Natural(Letter),
    Chromatic { sharp_of: Letter, flat_of: Letter },
}

impl Spelling {
    fn spell(self, mode: AccidentalMode) -> (Letter, Accidental) {
        match (self, mode) {
            (Spelling::Natural(letter), _) => (letter, Accidental::Natural),
            (Spelling::Chromatic { sharp_of, .. }, AccidentalMode::Sharp) => {
                (sharp_of, Accidental::Sharp)
            }
            (Spelling::Chromatic { flat_of, .. }, AccidentalMode::Flat) => {
                (flat_of, Accidental::Flat)
            }
        }
    }
}

/// The chromatic scale indexed by semitones above A.
const CHROMATIC_SCALE: [Spelling; 12] = [
    Spelling::Natural(Letter::A),
    Spelling::Chromatic { sharp_of: Letter::A, flat_of: Letter::B },
    Spelling::Natural(Letter::B),
    Spelling::Natural(Letter::C),
    Spelling::Chromatic { sharp_of: Letter::C, flat_of: Letter::D },
    Spelling::Natural(Letter::D),
    Spelling::Chromatic { sharp_of: Letter::D, flat_of: Letter::E },
    Spelling::Natural(Letter::E),
    Spelling::Natural(Letter::F),
    Spelling::Chromatic { sharp_of: Letter::F, flat_of: Letter::G },
    Spelling::Natural(Letter::G),
    Spelling::Chromatic { sharp_of: Letter::G, flat_of: Letter::A },
];

/// How close a reading is to its reference note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Within 10 cents.
    InTune,
    /// Within 25 cents.
    Close,
    Off,
}

/// A frequency classified against equal temperament.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchedNote {
    /// Natural letter of the nearest note.
    pub note: Letter,
    /// Accidental, spelled according to the requested mode.
    pub accidental: Accidental,
    /// Octave number; A440 sits in octave 4.
    pub octave: i32,
    /// Reference frequency of the nearest note in Hz, rounded to 2 decimals.
    pub frequency: f64,
    /// Deviation of the input from `frequency` in cents (positive = sharp).
    pub cents: i32,
}

impl PitchedNote {
    /// Buckets the cents deviation into a coarse accuracy band.
    pub fn accuracy(&self) -> Accuracy {
        match self.cents.unsigned_abs() {
            0..10 => Accuracy::InTune,
            10..25 => Accuracy::Close,
            _ => Accuracy::Off,
        }
    }
}

impl fmt::Display for PitchedNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.note, self.accidental.symbol(), self.octave)
    }
}

/// Signed, fractional semitone distance of `freq` from A4.
pub fn semitones_from_a4(freq: f64) -> f64 {
    SEMITONES_PER_OCTAVE * (freq / A4_FREQUENCY).log2()
}

/// Exact equal-tempered frequency `steps_away` semitones from A4.
pub fn reference_frequency(steps_away: i64) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf(steps_away as f64 / SEMITONES_PER_OCTAVE)
}

/// Rounds to 2 decimal places, half away from zero.
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp of the target, negative values flat. The
/// result is unrounded; see [`classify`] for the integer form.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    CENTS_PER_OCTAVE * (freq / target_freq).log2()
}

/// Resolves a semitone offset from A4 to a letter and accidental.
///
/// Negative offsets wrap correctly, so `-1` is G♯/A♭ and `-12` is A.
pub fn accidental_note(steps_away: i64, mode: AccidentalMode) -> (Letter, Accidental) {
    let position = steps_away.rem_euclid(CHROMATIC_SCALE.len() as i64) as usize;
    CHROMATIC_SCALE[position].spell(mode)
}

/// Classifies a frequency as the nearest equal-tempered note.
///
/// # Arguments
/// * `frequency` - Measured frequency in Hz
/// * `mode` - Whether chromatic tones are spelled with sharps or flats
///
/// # Returns
/// * `Ok(PitchedNote)` for any finite frequency above zero
/// * `Err(TunerError::InvalidFrequency)` otherwise
///
/// The mode only changes `note` and `accidental`; octave, reference
/// frequency and cents are identical for both spellings. Inputs far outside
/// the audible range still classify, with nonsensical octave numbers.
pub fn classify(frequency: f64, mode: AccidentalMode) -> Result<PitchedNote> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(TunerError::InvalidFrequency(frequency));
    }

    let octave_offset = (frequency / A4_FREQUENCY).log2();
    let steps_away = (SEMITONES_PER_OCTAVE * octave_offset).round() as i64;
    let (note, accidental) = accidental_note(steps_away, mode);

    // Cents are measured against the rounded reference that gets displayed.
    let reference = round_to_hundredths(reference_frequency(steps_away));
    let cents = calculate_cents_deviation(frequency, reference).round() as i32;

    Ok(PitchedNote {
        note,
        accidental,
        octave: (octave_offset + A4_OCTAVE as f64).ceil() as i32,
        frequency: reference,
        cents,
    })
}
