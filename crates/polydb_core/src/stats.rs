//! Row-transfer statistics.

use std::fmt;
use std::time::Duration;

/// Statistics of moving rows through one table pipeline (or a sum of them).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NDJsonStats {
    /// Rows written to the sink.
    pub rows: u64,
    /// Uncompressed bytes written, where a file was involved.
    pub size_bytes: u64,
    /// Bytes on disk after compression, if the output was compressed.
    pub size_bytes_zipped: Option<u64>,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

impl NDJsonStats {
    /// Creates stats for `rows` rows moved in `elapsed`.
    #[must_use]
    pub fn new(rows: u64, elapsed: Duration) -> Self {
        Self {
            rows,
            elapsed,
            ..Self::default()
        }
    }

    /// Rows per second, 0 when nothing was timed.
    #[must_use]
    pub fn rows_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.rows as f64 / secs).round() as u64
        } else {
            0
        }
    }

    /// Adds `other` into `self`.
    ///
    /// Rows and bytes are summed; elapsed time takes the maximum, since
    /// tables run concurrently.
    pub fn merge(&mut self, other: &Self) {
        self.rows += other.rows;
        self.size_bytes += other.size_bytes;
        self.size_bytes_zipped = match (self.size_bytes_zipped, other.size_bytes_zipped) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };
        self.elapsed = self.elapsed.max(other.elapsed);
    }

    /// Sums a set of stats.
    #[must_use]
    pub fn total<'a>(stats: impl IntoIterator<Item = &'a NDJsonStats>) -> Self {
        let mut total = Self::default();
        for s in stats {
            total.merge(s);
        }
        total
    }
}

impl fmt::Display for NDJsonStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows in {:.1}s ({} rows/s)",
            self.rows,
            self.elapsed.as_secs_f64(),
            self.rows_per_sec()
        )?;
        if self.size_bytes > 0 {
            write!(f, ", {} bytes", self.size_bytes)?;
        }
        if let Some(zipped) = self.size_bytes_zipped {
            write!(f, " ({zipped} zipped)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_rows_and_keeps_longest_time() {
        let a = NDJsonStats {
            rows: 10,
            size_bytes: 100,
            size_bytes_zipped: Some(40),
            elapsed: Duration::from_secs(2),
        };
        let b = NDJsonStats {
            rows: 5,
            size_bytes: 50,
            size_bytes_zipped: None,
            elapsed: Duration::from_secs(1),
        };
        let total = NDJsonStats::total([&a, &b]);
        assert_eq!(total.rows, 15);
        assert_eq!(total.size_bytes, 150);
        assert_eq!(total.size_bytes_zipped, Some(40));
        assert_eq!(total.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn rows_per_sec() {
        assert_eq!(NDJsonStats::new(100, Duration::from_secs(4)).rows_per_sec(), 25);
        assert_eq!(NDJsonStats::new(100, Duration::ZERO).rows_per_sec(), 0);
    }

    #[test]
    fn display() {
        let s = NDJsonStats::new(3, Duration::from_millis(1500));
        assert_eq!(s.to_string(), "3 rows in 1.5s (2 rows/s)");
    }
}
