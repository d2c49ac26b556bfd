use crate::model::song::Event;
use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance when checking that a duration is an exact multiple of the step.
const STEP_RATIO_EPSILON: f64 = 1e-6;

/// One symbol of the encoded time series.
///
/// A melody becomes a stream with one token per `step` quarter-notes: the
/// first step of an event carries its pitch (or the rest marker), every
/// remaining step is a hold. The boundary token never appears inside a
/// piece; it separates pieces in the concatenated corpus and doubles as the
/// stop signal during sampling.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Note(u8),
    Rest,
    Hold,
    Boundary,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Note(midi) => write!(f, "{}", midi),
            Token::Rest => write!(f, "r"),
            Token::Hold => write!(f, "_"),
            Token::Boundary => write!(f, "/"),
        }
    }
}

impl FromStr for Token {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Token::Rest),
            "_" => Ok(Token::Hold),
            "/" => Ok(Token::Boundary),
            other => {
                let midi: u8 = other
                    .parse()
                    .map_err(|_| anyhow!("Unrecognized token '{}'..!", other))?;
                if midi > 127 {
                    bail!("MIDI pitch {} is out of range (0..=127)..!", midi);
                }
                Ok(Token::Note(midi))
            }
        }
    }
}

/// Expand an event sequence into the fixed-step token stream.
///
/// Each event contributes `duration / step` tokens: its own symbol first,
/// then holds. Durations that are not a positive whole multiple of the step
/// are a precondition violation (the quantizer admits only compatible
/// pieces) and fail the whole piece.
pub fn encode(events: &[Event], step_quarters: f64) -> Result<Vec<Token>> {
    if !(step_quarters > 0.0) {
        bail!("Step duration must be positive, got {}..!", step_quarters);
    }

    let mut tokens = Vec::new();
    for event in events {
        let ratio = event.quarters() / step_quarters;
        let steps = ratio.round();
        if steps < 1.0 || (ratio - steps).abs() > STEP_RATIO_EPSILON {
            bail!(
                "Event duration {} is not a positive multiple of step {}..!",
                event.quarters(),
                step_quarters
            );
        }

        tokens.push(match event {
            Event::Note { midi, .. } => Token::Note(*midi),
            Event::Rest { .. } => Token::Rest,
        });
        for _ in 1..steps as u64 {
            tokens.push(Token::Hold);
        }
    }

    Ok(tokens)
}

/// Regroup a hold-padded token stream back into discrete events.
///
/// Scans left to right with a pending symbol and a run-length counter: a
/// non-hold token closes the pending symbol into an event of
/// `step * run_length` quarters and starts a new run. The end of the stream
/// closes whatever is pending, so a stream truncated mid-hold (a sampler
/// that ran out of budget) still flushes its final event.
pub fn decode(tokens: &[Token], step_quarters: f64) -> Result<Vec<Event>> {
    if !(step_quarters > 0.0) {
        bail!("Step duration must be positive, got {}..!", step_quarters);
    }
    if tokens.is_empty() {
        bail!("Cannot decode an empty token stream..!");
    }

    let mut events = Vec::new();
    let mut pending: Option<Token> = None;
    let mut run_length: u64 = 0;

    for token in tokens {
        match token {
            Token::Hold => {
                if pending.is_none() {
                    bail!("Token stream starts with a hold symbol: nothing to sustain..!");
                }
                run_length += 1;
            }
            Token::Boundary => {
                bail!("Boundary token inside a decodable stream..!");
            }
            onset => {
                if let Some(symbol) = pending.replace(*onset) {
                    events.push(close_run(symbol, run_length, step_quarters));
                }
                run_length = 1;
            }
        }
    }

    if let Some(symbol) = pending {
        events.push(close_run(symbol, run_length, step_quarters));
    }

    Ok(events)
}

fn close_run(symbol: Token, run_length: u64, step_quarters: f64) -> Event {
    let quarters = step_quarters * run_length as f64;
    match symbol {
        Token::Note(midi) => Event::Note { midi, quarters },
        // decode only ever parks a note or rest as pending
        _ => Event::Rest { quarters },
    }
}
