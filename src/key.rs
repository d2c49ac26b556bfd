use crate::model::song::{Event, KeySignature, Metadata, Mode, Song};
use anyhow::{Result, bail};
use log::debug;

/// Krumhansl-Kessler tonal profiles: perceived fit of each pitch class
/// (relative to the tonic at index 0) within a major or minor key.
///
/// Krumhansl, C. L., & Kessler, E. J. (1982). Tracing the Dynamic Changes in
/// Perceived Tonal Organization in a Spatial Representation of Musical Keys.
/// Psychological Review, 89(4), 334-368.
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Estimate a piece's key from its pitch-content statistics.
///
/// Builds a duration-weighted pitch-class histogram and correlates it
/// against the 24 rotated Krumhansl-Kessler profiles; the best-scoring
/// (tonic, mode) pair wins. Fails on a piece with no sounding notes, since
/// an all-rest piece has no tonal center to normalize toward.
pub fn estimate_key(events: &[Event]) -> Result<KeySignature> {
    let mut histogram = [0.0f64; 12];
    for event in events {
        if let Event::Note { midi, quarters } = event {
            histogram[(*midi % 12) as usize] += quarters;
        }
    }

    if histogram.iter().all(|&w| w == 0.0) {
        bail!("Cannot estimate a key: the piece contains no notes..!");
    }

    let mut best_score = f64::NEG_INFINITY;
    let mut best_key = KeySignature::new(0, Mode::Major);
    for tonic_pc in 0u8..12 {
        for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let score = correlation(&histogram, profile, tonic_pc);
            if score > best_score {
                best_score = score;
                best_key = KeySignature::new(tonic_pc, mode);
            }
        }
    }

    debug!(
        "Estimated key: pc {} {:?} (correlation {:.3})",
        best_key.tonic_pc, best_key.mode, best_score
    );
    Ok(best_key)
}

/// Pearson correlation between the histogram and the profile rotated so the
/// profile's tonic lands on `tonic_pc`.
fn correlation(histogram: &[f64; 12], profile: &[f64; 12], tonic_pc: u8) -> f64 {
    let h_mean = histogram.iter().sum::<f64>() / 12.0;
    let p_mean = profile.iter().sum::<f64>() / 12.0;

    let mut covariance = 0.0;
    let mut h_variance = 0.0;
    let mut p_variance = 0.0;
    for pc in 0..12 {
        let h = histogram[pc] - h_mean;
        let p = profile[(pc + 12 - tonic_pc as usize) % 12] - p_mean;
        covariance += h * p;
        h_variance += h * h;
        p_variance += p * p;
    }

    if h_variance == 0.0 || p_variance == 0.0 {
        return 0.0;
    }
    covariance / (h_variance * p_variance).sqrt()
}

/// Semitone shift moving `from_pc` onto `to_pc` by the shortest path,
/// in the range -5..=6.
fn transposition_interval(from_pc: u8, to_pc: u8) -> i32 {
    let mut shift = (to_pc as i32 - from_pc as i32).rem_euclid(12);
    if shift > 6 {
        shift -= 12;
    }
    shift
}

/// Transpose a piece to the canonical tonal center: C for major pieces,
/// A for minor pieces.
///
/// The key comes from the piece's metadata when the importer found a
/// recognizable key signature, otherwise from pitch-content estimation.
/// The interval is applied uniformly to every note; rests and durations are
/// untouched. A shift that would push any pitch outside the MIDI range
/// fails the piece rather than clamping it out of tune.
pub fn normalize(song: &Song) -> Result<Song> {
    let key = match song.metadata.key {
        Some(key) => key,
        None => estimate_key(&song.events)?,
    };

    let target_pc: u8 = match key.mode {
        Mode::Major => 0, // C
        Mode::Minor => 9, // A
    };
    let shift = transposition_interval(key.tonic_pc, target_pc);

    let mut events = Vec::with_capacity(song.events.len());
    for event in &song.events {
        events.push(match event {
            Event::Note { midi, quarters } => {
                let transposed = *midi as i32 + shift;
                if !(0..=127).contains(&transposed) {
                    bail!(
                        "Transposing by {} semitones pushes MIDI {} out of range..!",
                        shift,
                        midi
                    );
                }
                Event::Note {
                    midi: transposed as u8,
                    quarters: *quarters,
                }
            }
            rest => *rest,
        });
    }

    debug!(
        "Normalized from pc {} {:?} by {} semitones",
        key.tonic_pc, key.mode, shift
    );

    Ok(Song {
        metadata: Metadata {
            key: Some(KeySignature::new(target_pc, key.mode)),
            ..song.metadata.clone()
        },
        events,
    })
}
