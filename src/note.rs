//! Note names, scales and the grid-row to note mapping.

use serde::{Deserialize, Serialize};

pub const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Key number of A4 when C0 is key 0.
const A4_KEY: i32 = 9 + 4 * 12;

/// Split a note like `"C#4"` into its pitch-class index and octave.
pub fn parse_note(note: &str) -> Option<(usize, i32)> {
    let split = note.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let (name, octave) = note.split_at(split);
    let index = NOTE_NAMES.iter().position(|n| *n == name)?;
    let octave = octave.parse().ok()?;
    Some((index, octave))
}

/// Frequency of a sharp-spelled note name with A4 = 440 Hz.
/// Anything that does not parse sounds as A4.
pub fn note_to_frequency(note: &str) -> f64 {
    match parse_note(note) {
        Some((index, octave)) => {
            let key = index as i32 + octave * 12;
            440.0 * 2f64.powf((key - A4_KEY) as f64 / 12.0)
        }
        None => 440.0,
    }
}

/// MIDI key number of a note, with C4 = 60. `None` for names that do not
/// parse or fall outside 0..=127.
pub fn note_to_midi(note: &str) -> Option<u8> {
    let (index, octave) = parse_note(note)?;
    let key = index as i32 + (octave + 1) * 12;
    u8::try_from(key).ok().filter(|k| *k <= 127)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Major,
    Minor,
}

impl Scale {
    pub fn from_name(name: &str) -> Option<Scale> {
        match name.to_ascii_lowercase().as_str() {
            "major" => Some(Scale::Major),
            "minor" => Some(Scale::Minor),
            _ => None,
        }
    }

    /// Semitone steps of the scale within one octave.
    pub fn steps(self) -> [usize; 7] {
        match self {
            Scale::Major => [0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => [0, 2, 3, 5, 7, 8, 10],
        }
    }
}

/// Note played by grid row `row` of a `rows`-tall melodic grid.
///
/// Rows count down from the top; the top half sits in octave 4, the bottom
/// half in octave 3, shifted by `octave_offset`. The inverted row index walks
/// the scale and climbs an octave every seven degrees.
pub fn row_to_note(rows: usize, row: usize, octave_offset: i32, scale: Scale) -> String {
    let degree = rows.saturating_sub(1).saturating_sub(row);
    let base_octave = if row < rows / 2 { 4 } else { 3 };
    let steps = scale.steps();
    let name = NOTE_NAMES[steps[degree % steps.len()]];
    let octave = base_octave + octave_offset + (degree / steps.len()) as i32;
    format!("{name}{octave}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert_eq!(note_to_frequency("A4"), 440.0);
        assert!((note_to_frequency("A5") - 880.0).abs() < 1e-9);
    }

    #[test]
    fn middle_c() {
        let c4 = note_to_frequency("C4");
        assert!((c4 - 261.63).abs() < 0.01, "C4 = {c4}");
    }

    #[test]
    fn unknown_notes_fall_back_to_a4() {
        for bad in ["H2", "", "Bb4", "C", "X#9"] {
            assert_eq!(note_to_frequency(bad), 440.0, "{bad:?}");
        }
    }

    #[test]
    fn parses_sharps_and_negative_octaves() {
        assert_eq!(parse_note("F#3"), Some((6, 3)));
        assert_eq!(parse_note("C-1"), Some((0, -1)));
        assert_eq!(parse_note("C#"), None);
    }

    #[test]
    fn midi_keys_put_middle_c_at_60() {
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_eq!(note_to_midi("C-1"), Some(0));
        assert_eq!(note_to_midi("C-2"), None);
        assert_eq!(note_to_midi("G#9"), None, "key 128 is out of range");
        assert_eq!(note_to_midi("noise"), None);
    }

    #[test]
    fn rows_map_onto_the_major_scale() {
        // 12-row grid: bottom row is degree 0 in octave 3
        assert_eq!(row_to_note(12, 11, 0, Scale::Major), "C3");
        assert_eq!(row_to_note(12, 10, 0, Scale::Major), "D3");
        assert_eq!(row_to_note(12, 4, 0, Scale::Major), "C5");
        assert_eq!(row_to_note(12, 0, 0, Scale::Major), "G5");
        assert_eq!(row_to_note(12, 11, 1, Scale::Major), "C4");
    }

    #[test]
    fn minor_scale_flattens_the_third() {
        assert_eq!(row_to_note(12, 9, 0, Scale::Minor), "D#3");
        assert_eq!(row_to_note(6, 5, 0, Scale::Minor), "C3");
        assert_eq!(row_to_note(6, 0, -1, Scale::Minor), "G#3");
    }
}
