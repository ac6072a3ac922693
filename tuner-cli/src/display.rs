//! Terminal rendering of display updates.
//!
//! A reading renders as one line: note name, signed cents, reference
//! frequency, detected frequency and a text cent meter.

use tuner_engine::throttle::DisplayUpdate;
use tuner_engine::tuning::{Accuracy, PitchedNote};

/// The meter spans -50 to +50 cents.
const METER_RANGE: i32 = 50;

/// Cells on each side of the centre mark.
const METER_HALF_WIDTH: i32 = 10;

pub const WAITING: &str = "Waiting...";

/// Renders a throttled update as a single line.
pub fn render(update: &DisplayUpdate) -> String {
    match update {
        DisplayUpdate::Pitch { note, detected } => render_note(note, Some(*detected)),
        DisplayUpdate::Waiting => WAITING.to_string(),
    }
}

/// Renders a classified note. `detected` is omitted for direct lookups.
pub fn render_note(note: &PitchedNote, detected: Option<f64>) -> String {
    let name = note.to_string();
    let mut line = format!(
        "{name:<4} {cents:>+4}¢  {reference:>9.2} Hz",
        cents = note.cents,
        reference = note.frequency,
    );
    if let Some(detected) = detected {
        line.push_str(&format!("  (heard {detected:.1} Hz)"));
    }
    line.push_str("  ");
    line.push_str(&cent_meter(note.cents));
    line.push(' ');
    line.push_str(accuracy_label(note.accuracy()));
    line
}

/// Draws a needle on a fixed-width scale, e.g. `[---------|--*------]`.
///
/// Deviations beyond the meter range pin the needle to the edge.
pub fn cent_meter(cents: i32) -> String {
    let clamped = cents.clamp(-METER_RANGE, METER_RANGE);
    // Nearest cell, rounding half away from centre.
    let scaled = clamped * METER_HALF_WIDTH;
    let offset = (scaled + scaled.signum() * METER_RANGE / 2) / METER_RANGE;
    let needle = METER_HALF_WIDTH + offset;

    let mut meter = String::with_capacity((2 * METER_HALF_WIDTH + 3) as usize);
    meter.push('[');
    for cell in 0..=2 * METER_HALF_WIDTH {
        meter.push(if cell == needle {
            '*'
        } else if cell == METER_HALF_WIDTH {
            '|'
        } else {
            '-'
        });
    }
    meter.push(']');
    meter
}

fn accuracy_label(accuracy: Accuracy) -> &'static str {
    match accuracy {
        Accuracy::InTune => "in tune",
        Accuracy::Close => "close",
        Accuracy::Off => "off",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_engine::{AccidentalMode, classify};

    #[test]
    fn needle_sits_on_centre_when_in_tune() {
        assert_eq!(cent_meter(0), "[----------*----------]");
        assert_eq!(cent_meter(2), "[----------*----------]");
    }

    #[test]
    fn needle_moves_with_deviation() {
        assert_eq!(cent_meter(50), "[----------|---------*]");
        assert_eq!(cent_meter(-50), "[*---------|----------]");
        assert_eq!(cent_meter(25), "[----------|----*-----]");
        assert_eq!(cent_meter(-5), "[---------*|----------]");
    }

    #[test]
    fn needle_is_pinned_out_of_range() {
        assert_eq!(cent_meter(120), cent_meter(50));
        assert_eq!(cent_meter(-75), cent_meter(-50));
    }

    #[test]
    fn renders_live_reading() {
        let note = classify(277.18, AccidentalMode::Sharp).unwrap();
        let line = render(&DisplayUpdate::Pitch {
            note,
            detected: 277.2,
        });
        assert!(line.starts_with("C♯4"), "{line}");
        assert!(line.contains("+0¢"), "{line}");
        assert!(line.contains("277.18 Hz"), "{line}");
        assert!(line.contains("(heard 277.2 Hz)"), "{line}");
        assert!(line.ends_with("in tune"), "{line}");
    }

    #[test]
    fn renders_flat_reading_without_detected() {
        let note = classify(339.3, AccidentalMode::Flat).unwrap();
        let line = render_note(&note, None);
        assert!(line.starts_with("F4"), "{line}");
        assert!(line.contains("-50¢"), "{line}");
        assert!(!line.contains("heard"));
        assert!(line.ends_with("off"), "{line}");
    }

    #[test]
    fn renders_waiting() {
        assert_eq!(render(&DisplayUpdate::Waiting), WAITING);
    }
}
