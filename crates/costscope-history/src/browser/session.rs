//! Session-based dwell estimate from visit timestamps.
//!
//! Visits more than [`SESSION_GAP_SECS`] apart start a new session. A
//! single-visit session counts [`SINGLE_VISIT_SECS`]; a longer one counts
//! its span plus [`READING_BUFFER_SECS`] for time spent after the last
//! visit.

pub const SESSION_GAP_SECS: f64 = 1800.0;
pub const SINGLE_VISIT_SECS: f64 = 60.0;
pub const READING_BUFFER_SECS: f64 = 300.0;

/// Estimated seconds spent across `timestamps` (Unix seconds, any order).
pub fn estimate_duration(timestamps: &[f64]) -> f64 {
    if timestamps.is_empty() {
        return 0.0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut total = 0.0;
    let mut start = sorted[0];
    let mut prev = sorted[0];
    let mut visits = 1usize;

    for &ts in &sorted[1..] {
        if ts - prev > SESSION_GAP_SECS {
            total += session_duration(start, prev, visits);
            start = ts;
            visits = 1;
        } else {
            visits += 1;
        }
        prev = ts;
    }
    total += session_duration(start, prev, visits);
    total.max(0.0)
}

fn session_duration(start: f64, end: f64, visits: usize) -> f64 {
    if visits > 1 {
        end - start + READING_BUFFER_SECS
    } else {
        SINGLE_VISIT_SECS
    }
}
