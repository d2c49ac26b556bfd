use crate::model::song::{Event, KeySignature, Metadata, Song};
use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// Simple policy for converting polyphonic MIDI to a single melodic line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolyPolicy {
    /// Pick the highest active pitch for a given set of overlapping events.
    #[default]
    Highest,

    /// Pick the lowest active pitch for a given set of overlapping events.
    Lowest,

    /// Pick the highest velocity note for a given set of overlapping events.
    Loudest,
}

#[derive(Debug, Clone, Copy)]
struct NoteInterval {
    midi: u8,
    start_tick: u64,
    end_tick: u64,
    velocity: u8,
}

struct Point {
    tick: u64,
    is_start: bool,
    midi: u8,
    velocity: u8,
    end_tick: u64,
}

/// Read a Standard MIDI File into an ordered note/rest event sequence with
/// durations in quarter-note units. Polyphonic input is reduced to one line
/// by `policy`; gaps between notes become explicit rest events.
pub fn import_midi_file<P: AsRef<Path>>(path: P, policy: PolyPolicy) -> Result<Song> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    midi_bytes_to_song(&bytes, path.as_ref(), policy)
}

pub(crate) fn midi_bytes_to_song(
    bytes: &[u8],
    source_path: &Path,
    policy: PolyPolicy,
) -> Result<Song> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            bail!("SMPTE timecode midi timing is not currently supported..!");
        }
    };

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut title = String::new();
    let mut tempo_mpqn: Option<u32> = None;
    let mut key: Option<KeySignature> = None;

    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        if tempo_mpqn.is_none() {
                            tempo_mpqn = Some(micro.as_int());
                            debug!(
                                "Tempo {} us/qn at tick {} (track {})",
                                micro.as_int(),
                                abs_tick,
                                track_idx
                            );
                        }
                    }
                    MetaMessage::KeySignature(sharps, minor) => {
                        if key.is_none() {
                            match KeySignature::from_midi(*sharps, *minor) {
                                Ok(sig) => {
                                    debug!(
                                        "Key signature: pc {} {:?} (track {})",
                                        sig.tonic_pc, sig.mode, track_idx
                                    );
                                    key = Some(sig);
                                }
                                // Not of a recognized key type: leave the key
                                // unset so normalization estimates it instead.
                                Err(why) => warn!("Ignoring key signature meta: {}", why),
                            }
                        }
                    }
                    MetaMessage::TrackName(bytes) => {
                        if title.is_empty() {
                            title = String::from_utf8_lossy(bytes).into_owned();
                            debug!("Track name: {}", title);
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            let velocity: u8 = vel.as_int();

                            if velocity == 0 {
                                close_note(
                                    &mut open_notes,
                                    &mut intervals,
                                    ch,
                                    key.as_int(),
                                    abs_tick,
                                );
                            } else {
                                open_notes
                                    .entry((ch, key.as_int()))
                                    .or_default()
                                    .push((abs_tick, velocity));
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(&mut open_notes, &mut intervals, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    let last_tick_estimate = intervals
        .iter()
        .map(|interval| interval.end_tick)
        .max()
        .unwrap_or(0);

    for ((ch, midi), stack) in open_notes.into_iter() {
        for (start_tick, start_vel) in stack {
            let end_tick = if last_tick_estimate > start_tick {
                last_tick_estimate
            } else {
                start_tick + ticks_per_quarter
            };

            intervals.push(NoteInterval {
                midi,
                start_tick,
                end_tick,
                velocity: start_vel,
            });

            warn!(
                "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                midi, ch, start_tick, end_tick
            );
        }
    }

    intervals.retain(|interval| {
        if interval.end_tick <= interval.start_tick {
            debug!(
                "Skipping zero-length midi note {} at tick {}..!",
                interval.midi, interval.start_tick
            );
            return false;
        }
        true
    });
    intervals.sort_unstable_by_key(|interval| (interval.start_tick, interval.midi));

    let mono = reduce_to_monophonic(intervals, policy);

    let mut events: Vec<Event> = Vec::new();
    let mut cursor: u64 = 0;
    for interval in mono {
        if interval.start_tick > cursor {
            events.push(Event::Rest {
                quarters: (interval.start_tick - cursor) as f64 / ticks_per_quarter as f64,
            });
        }
        events.push(Event::Note {
            midi: interval.midi,
            quarters: (interval.end_tick - interval.start_tick) as f64 / ticks_per_quarter as f64,
        });
        cursor = interval.end_tick;
    }

    let tempo_bpm = Some(MICROSECONDS_PER_MINUTE / (tempo_mpqn.unwrap_or(DEFAULT_MPQN) as f64));

    Ok(Song {
        metadata: Metadata {
            title: if title.is_empty() {
                source_path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            } else {
                Some(title)
            },
            tempo_bpm,
            key,
        },
        events,
    })
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    if let Some(stack) = open_notes.get_mut(&(ch, midi_num))
        && let Some((start_tick, start_vel)) = stack.pop()
    {
        intervals.push(NoteInterval {
            midi: midi_num,
            start_tick,
            end_tick: abs_tick,
            velocity: start_vel,
        });
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}

/// Given a possibly-overlapping set of note intervals, reduce to a single
/// monophonic sequence according to the specified policy. The intervals
/// emitted by this function do not overlap.
///
/// Basic approach: create a sorted set of ticks where something changes
/// (start or end), and at each point decide which note should be active
/// using the policy.
fn reduce_to_monophonic(intervals: Vec<NoteInterval>, policy: PolyPolicy) -> Vec<NoteInterval> {
    if intervals.is_empty() {
        return intervals;
    }

    let mut points: Vec<Point> = Vec::new();
    for interval in intervals.into_iter() {
        points.push(Point {
            tick: interval.start_tick,
            is_start: true,
            midi: interval.midi,
            velocity: interval.velocity,
            end_tick: interval.end_tick,
        });
        points.push(Point {
            tick: interval.end_tick,
            is_start: false,
            midi: interval.midi,
            velocity: interval.velocity,
            end_tick: interval.end_tick,
        });
    }

    // Ends sort before starts at the same tick, so a note ending at `t` is
    // not counted active against another note starting at `t`.
    points.sort_by(|a, b| {
        a.tick
            .cmp(&b.tick)
            .then_with(|| (a.is_start as u8).cmp(&(b.is_start as u8)))
    });

    let mut result: Vec<NoteInterval> = Vec::new();
    let mut current_note: Option<(u8, u8)> = None; // (midi, velocity)
    let mut current_start: Option<u64> = None;
    let mut active: BTreeMap<u8, u64> = BTreeMap::new();
    let mut note_velocity_lookup: HashMap<u8, u8> = HashMap::new();

    let mut reduced = false;
    for pt in points.into_iter() {
        if pt.is_start {
            note_velocity_lookup.insert(pt.midi, pt.velocity);
            active.insert(pt.midi, pt.end_tick);
        } else {
            active.remove(&pt.midi);
            note_velocity_lookup.remove(&pt.midi);
        }

        let chosen: Option<u8> = match policy {
            PolyPolicy::Highest => active.keys().next_back().copied(),
            PolyPolicy::Lowest => active.keys().next().copied(),
            PolyPolicy::Loudest => active
                .keys()
                .filter_map(|note| note_velocity_lookup.get(note).map(|&vel| (vel, *note)))
                .max_by_key(|(vel, _)| *vel)
                .map(|(_, note)| note),
        };

        if active.len() > 1 && !reduced {
            reduced = true;
            warn!(
                "MIDI contains overlapping notes, reducing to monophony with the [{:?}] policy...",
                policy
            );
        }

        if chosen != current_note.map(|(midi, _)| midi) {
            if let (Some((midi, velocity)), Some(start)) = (current_note, current_start)
                && pt.tick > start
            {
                result.push(NoteInterval {
                    midi,
                    start_tick: start,
                    end_tick: pt.tick,
                    velocity,
                });
            }

            if let Some(midi) = chosen {
                let velocity = note_velocity_lookup.get(&midi).copied().unwrap_or(64);
                current_note = Some((midi, velocity));
                current_start = Some(pt.tick);
            } else {
                current_note = None;
                current_start = None;
            }
        }
    }

    result
}
