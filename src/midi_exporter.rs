use crate::model::song::Event;
use anyhow::{Context, Result, bail};
use log::debug;
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use std::fs;
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

const NOTE_VELOCITY: u8 = 80;

/// Persist an event sequence as a playable single-track Standard MIDI File.
pub fn write_midi_file<P: AsRef<Path>>(events: &[Event], tempo_bpm: f64, path: P) -> Result<()> {
    let smf = events_to_smf(events, tempo_bpm)?;
    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| anyhow::anyhow!("Failed to serialize MIDI: {e}"))?;
    fs::write(path.as_ref(), &buf)
        .with_context(|| format!("Failed to write MIDI to {}", path.as_ref().display()))?;

    debug!(
        "Wrote {} events ({} bytes) to {}",
        events.len(),
        buf.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Build the in-memory SMF: a tempo meta event, then one NoteOn/NoteOff pair
/// per note. Rests only advance the running delta.
pub(crate) fn events_to_smf(events: &[Event], tempo_bpm: f64) -> Result<Smf<'static>> {
    if !(tempo_bpm > 0.0) {
        bail!("Tempo must be positive, got {} bpm..!", tempo_bpm);
    }

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let mut track: Track<'static> = Vec::new();
    let tempo_microseconds = (60_000_000.0 / tempo_bpm).round() as u32;
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });

    let channel = u4::new(0);
    let mut pending_delta: u32 = 0;
    for event in events {
        let quarters = event.quarters();
        if !(quarters > 0.0) {
            bail!("Cannot write an event with duration {}..!", quarters);
        }
        let ticks = (quarters * TICKS_PER_QUARTER as f64).round() as u32;

        match event {
            Event::Note { midi, .. } => {
                track.push(TrackEvent {
                    delta: u28::new(pending_delta),
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn {
                            key: u7::new(*midi),
                            vel: u7::new(NOTE_VELOCITY),
                        },
                    },
                });
                track.push(TrackEvent {
                    delta: u28::new(ticks),
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff {
                            key: u7::new(*midi),
                            vel: u7::new(0),
                        },
                    },
                });
                pending_delta = 0;
            }
            Event::Rest { .. } => {
                pending_delta += ticks;
            }
        }
    }

    track.push(TrackEvent {
        delta: u28::new(pending_delta),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok(smf)
}
