//! Output filename patterns and time-based rotation.
//!
//! Patterns use strftime-style substitutions (`cap-%Y%m%d-%H%M%S`); the
//! sink's compression extension is appended to the pattern before any
//! substitution. Rotation periods are aligned to the Unix epoch, so a
//! 60-second period rotates on minute boundaries.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use cdns_core::{CdnsError, Result};

/// A compiled output filename pattern.
#[derive(Debug, Clone)]
pub struct OutputPattern {
    pattern: String,
    period_secs: u64,
}

impl OutputPattern {
    /// Compile a pattern. Unknown substitution tokens are a
    /// configuration error.
    pub fn new(pattern: &str, extension: &str, period_secs: u64) -> Result<Self> {
        let mut full = String::from(pattern);
        full.push_str(extension);

        // Probe-format once so bad tokens fail at construction, not at
        // the first rotation.
        let mut probe = String::new();
        write!(probe, "{}", DateTime::UNIX_EPOCH.format(&full)).map_err(|_| {
            CdnsError::Config(format!("unknown substitution in output pattern '{full}'"))
        })?;

        Ok(Self {
            pattern: full,
            period_secs,
        })
    }

    /// Index of the rotation period containing `ts`. Always 0 when
    /// time-based rotation is disabled.
    #[must_use]
    pub fn period_index(&self, ts: DateTime<Utc>) -> i64 {
        if self.period_secs == 0 {
            return 0;
        }
        ts.timestamp().div_euclid(self.period_secs as i64)
    }

    /// `true` when `ts` falls outside the period a file opened in
    /// `open_period` belongs to.
    #[must_use]
    pub fn needs_rotation(&self, open_period: i64, ts: DateTime<Utc>) -> bool {
        self.period_secs != 0 && self.period_index(ts) != open_period
    }

    /// Filename for a file opened at `ts`. If the substituted name is
    /// already taken, a `-1`, `-2`, ... suffix is appended until it is
    /// not.
    #[must_use]
    pub fn filename(&self, ts: DateTime<Utc>) -> PathBuf {
        let base = ts.format(&self.pattern).to_string();
        let mut candidate = PathBuf::from(&base);
        let mut count = 0u32;
        while candidate.exists() {
            count += 1;
            candidate = PathBuf::from(format!("{base}-{count}"));
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_substitution_with_extension() {
        let pattern = OutputPattern::new("cap-%Y%m%d-%H%M%S", ".gz", 60).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap();
        assert_eq!(
            pattern.filename(ts),
            PathBuf::from("cap-20240305-102030.gz")
        );
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(OutputPattern::new("cap-%Q", "", 60).is_err());
        assert!(OutputPattern::new("cap-%Y", "", 60).is_ok());
    }

    #[test]
    fn test_period_boundaries() {
        let pattern = OutputPattern::new("cap", "", 60).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 59).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 3, 5, 10, 21, 0).unwrap();
        let open = pattern.period_index(t0);
        assert!(!pattern.needs_rotation(open, t0));
        assert!(pattern.needs_rotation(open, t1));
    }

    #[test]
    fn test_zero_period_never_rotates() {
        let pattern = OutputPattern::new("cap", "", 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2034, 3, 5, 10, 20, 0).unwrap();
        assert!(!pattern.needs_rotation(pattern.period_index(t0), t1));
    }

    #[test]
    fn test_existing_files_get_counter_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("fixed-name");
        let pattern = OutputPattern::new(base.to_str().unwrap(), "", 60).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

        assert_eq!(pattern.filename(ts), base);
        std::fs::write(&base, b"").unwrap();
        let second = pattern.filename(ts);
        assert_eq!(
            second,
            PathBuf::from(format!("{}-1", base.display()))
        );
        std::fs::write(&second, b"").unwrap();
        assert_eq!(
            pattern.filename(ts),
            PathBuf::from(format!("{}-2", base.display()))
        );
    }
}
