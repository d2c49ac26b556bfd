use crate::model::song::Event;

/// Duration values (in quarter-note units) a piece may use and still be
/// representable on the fixed step grid without ambiguity.
pub const ACCEPTABLE_DURATIONS: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0];

/// True when every event's duration is bit-exact-present in `allowed`.
///
/// Membership is exact on purpose: a piece with an off-grid duration cannot
/// be encoded losslessly, so it is dropped whole rather than rounded into
/// something it never was.
pub fn is_acceptable(events: &[Event], allowed: &[f64]) -> bool {
    events.iter().all(|e| allowed.contains(&e.quarters()))
}
