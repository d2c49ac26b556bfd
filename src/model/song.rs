use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// A single melodic event: one sounding pitch or one silence, with its
/// duration in quarter-note units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Note { midi: u8, quarters: f64 },
    Rest { quarters: f64 },
}

impl Event {
    pub fn quarters(&self) -> f64 {
        match self {
            Event::Note { quarters, .. } => *quarters,
            Event::Rest { quarters } => *quarters,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

/// Tonal center of a piece: a tonic pitch class (0 = C .. 11 = B) and a mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignature {
    pub tonic_pc: u8,
    pub mode: Mode,
}

impl KeySignature {
    pub fn new(tonic_pc: u8, mode: Mode) -> Self {
        Self {
            tonic_pc: tonic_pc % 12,
            mode,
        }
    }

    /// Build from a MIDI key signature meta event (count of sharps, minor flag).
    ///
    /// Walks the circle of fifths: each sharp moves the major tonic up a
    /// fifth from C, each flat down a fifth. The relative minor sits three
    /// semitones below its major tonic.
    pub fn from_midi(sharps: i8, minor: bool) -> Result<Self> {
        if !(-7..=7).contains(&sharps) {
            bail!("Unrecognized key signature: {} accidentals..!", sharps);
        }

        let major_tonic = (sharps as i32 * 7).rem_euclid(12) as u8;
        if minor {
            Ok(Self::new((major_tonic + 9) % 12, Mode::Minor))
        } else {
            Ok(Self::new(major_tonic, Mode::Major))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub tempo_bpm: Option<f64>,
    pub key: Option<KeySignature>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Song {
    pub metadata: Metadata,
    pub events: Vec<Event>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_signature_from_sharps() {
        // No accidentals: C major / A minor.
        assert_eq!(
            KeySignature::from_midi(0, false).unwrap(),
            KeySignature::new(0, Mode::Major)
        );
        assert_eq!(
            KeySignature::from_midi(0, true).unwrap(),
            KeySignature::new(9, Mode::Minor)
        );

        // Two sharps: D major / B minor.
        assert_eq!(
            KeySignature::from_midi(2, false).unwrap(),
            KeySignature::new(2, Mode::Major)
        );
        assert_eq!(
            KeySignature::from_midi(2, true).unwrap(),
            KeySignature::new(11, Mode::Minor)
        );

        // Three flats: Eb major / C minor.
        assert_eq!(
            KeySignature::from_midi(-3, false).unwrap(),
            KeySignature::new(3, Mode::Major)
        );
        assert_eq!(
            KeySignature::from_midi(-3, true).unwrap(),
            KeySignature::new(0, Mode::Minor)
        );
    }

    #[test]
    fn key_signature_rejects_garbage_accidental_count() {
        assert!(KeySignature::from_midi(9, false).is_err());
        assert!(KeySignature::from_midi(-13, true).is_err());
    }
}
