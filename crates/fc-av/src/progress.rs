//! Incremental parser for ffmpeg's `-progress pipe:2` output.
//!
//! ffmpeg interleaves its normal log (which carries the input `Duration:`)
//! with `key=value` progress blocks on stderr. The parser turns that stream
//! into strictly increasing percentages.

/// Time-based estimates stop here; only `progress=end` reports 100.
const MAX_ESTIMATE: f32 = 99.0;

/// Stateful line parser. Feed it every stderr line in order.
#[derive(Debug, Default)]
pub struct ProgressParser {
    total_us: Option<u64>,
    last_emitted: f32,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total media duration in microseconds, once known.
    pub fn total_us(&self) -> Option<u64> {
        self.total_us
    }

    /// Consume one line. Returns a new percentage when it advanced.
    pub fn feed(&mut self, line: &str) -> Option<f32> {
        let line = line.trim();

        if self.total_us.is_none() {
            if let Some(total) = parse_duration_line(line) {
                self.total_us = Some(total);
                return None;
            }
        }

        // `out_time_ms` is in microseconds too, despite its name.
        let position = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="));
        if let Some(value) = position {
            let position: i64 = value.trim().parse().ok()?;
            let total = self.total_us.filter(|t| *t > 0)?;
            let pct = (position.max(0) as f64 / total as f64 * 100.0) as f32;
            return self.advance(pct.min(MAX_ESTIMATE));
        }

        if line == "progress=end" {
            return self.advance(100.0);
        }

        None
    }

    fn advance(&mut self, pct: f32) -> Option<f32> {
        if pct > self.last_emitted {
            self.last_emitted = pct;
            Some(pct)
        } else {
            None
        }
    }
}

/// Parse `Duration: HH:MM:SS.ff, start: ...` into microseconds.
fn parse_duration_line(line: &str) -> Option<u64> {
    let rest = line.strip_prefix("Duration:")?.trim_start();
    let stamp = rest.split(',').next()?.trim();
    parse_timestamp(stamp)
}

/// Parse `HH:MM:SS(.fraction)` into microseconds. `N/A` yields `None`.
fn parse_timestamp(stamp: &str) -> Option<u64> {
    let mut parts = stamp.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_mul(1_000_000)?;
    let fraction = (seconds * 1_000_000.0).round();
    if fraction >= u64::MAX as f64 {
        return None;
    }
    whole.checked_add(fraction as u64)
}
