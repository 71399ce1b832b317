// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional frame tee to a dated file under `./logs/`, enabled by `--log`.
//! Pure I/O plumbing, reopened whenever the UTC date rolls over.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tokio::sync::Mutex;

pub struct FrameLog {
    inner: Mutex<Inner>,
}

struct Inner {
    date: String,
    file: File,
}

impl FrameLog {
    pub fn open() -> std::io::Result<Self> {
        std::fs::create_dir_all("logs")?;
        let date = today();
        let file = open_for(&date)?;
        Ok(Self { inner: Mutex::new(Inner { date, file }) })
    }

    /// Append one JSON line describing a frame crossing the boundary.
    pub async fn record(&self, direction: &str, remote: &str, bytes: &[u8]) {
        let date = today();
        let mut inner = self.inner.lock().await;
        if inner.date != date {
            match open_for(&date) {
                Ok(file) => {
                    inner.file = file;
                    inner.date = date;
                }
                Err(e) => {
                    tracing::warn!(err = %e, "failed to roll frame log to new date");
                }
            }
        }
        let line = serde_json::json!({
            "direction": direction,
            "remote": remote,
            "frame": String::from_utf8_lossy(bytes),
        });
        if let Err(e) = writeln!(inner.file, "{line}") {
            tracing::warn!(err = %e, "failed to write frame log line");
        }
    }
}

fn today() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let days = secs / 86_400;
    civil_from_days(days as i64)
}

fn path_for(date: &str) -> PathBuf {
    PathBuf::from("logs").join(format!("{date}.log"))
}

fn open_for(date: &str) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path_for(date))
}

/// Howard Hinnant's civil-from-days algorithm, avoiding a chrono
/// dependency the teacher doesn't already carry for this one conversion.
fn civil_from_days(z: i64) -> String {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}")
}

#[cfg(test)]
mod tests {
    use super::civil_from_days;

    #[test]
    fn epoch_day_is_1970_01_01() {
        assert_eq!(civil_from_days(0), "1970-01-01");
    }

    #[test]
    fn known_date_round_trips() {
        // 2024-03-01 is day 19782 since the epoch.
        assert_eq!(civil_from_days(19_782), "2024-03-01");
    }
}
