/*! Doppler model: a dense per-second table of frequency and frequency
rate.

Entry `k` of the table gives the Doppler offset and Doppler rate to
apply during elapsed second `k` of the run. The table is dense by
construction: one entry per integer second from 0, no gaps, enforced
when the model is loaded. It is built once, never mutated, and owned by
the correction block for the duration of the run.

Two loaders exist:

* [`DopplerModel::from_predicts`] reads a predicts ephemeris file, where
  range rate and range acceleration are converted to Doppler and Doppler
  rate at the carrier frequency. These models are anchored to absolute
  time: every entry carries its UTC epoch.
* [`DopplerModel::from_estimates`] reads coarse operator supplied
  estimates (`mm:ss frequency_hz` lines at irregular tags) and densifies
  them to one entry per second by forward propagating each segment's
  constant rate.
*/
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};

use crate::{Error, Result};

/// Speed of light, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Default carrier frequency for predicts conversion, Hz.
pub const DEFAULT_CARRIER_HZ: f64 = 401.585625e6;

/// One second of the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelEntry {
    /// Doppler offset during this second, Hz.
    pub doppler_hz: f64,
    /// Doppler rate during this second, Hz/s.
    pub doppler_rate_hz_s: f64,
}

/// Dense per-second Doppler model.
#[derive(Debug)]
pub struct DopplerModel {
    entries: Vec<ModelEntry>,
    epochs: Option<Vec<DateTime<Utc>>>,
}

impl DopplerModel {
    /// Create a model without absolute time anchoring. Entry `k`
    /// applies to elapsed second `k`.
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self {
            entries,
            epochs: None,
        }
    }

    /// Create a model anchored to absolute time, one epoch per entry.
    pub fn with_epochs(entries: Vec<ModelEntry>, epochs: Vec<DateTime<Utc>>) -> Self {
        assert_eq!(entries.len(), epochs.len(), "one epoch per entry");
        Self {
            entries,
            epochs: Some(epochs),
        }
    }

    /// Entry for the given second, if the model covers it.
    pub fn entry(&self, second: usize) -> Option<ModelEntry> {
        self.entries.get(second).copied()
    }

    /// Epoch of the given entry, if the model is anchored to absolute
    /// time.
    pub fn epoch(&self, second: usize) -> Option<DateTime<Utc>> {
        self.epochs.as_ref()?.get(second).copied()
    }

    /// True if entries carry absolute timestamps.
    pub fn has_epochs(&self) -> bool {
        self.epochs.is_some()
    }

    /// Number of seconds covered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the model covers nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry whose epoch exactly matches the run's start time.
    ///
    /// Only meaningful for time anchored models; without epochs the
    /// model starts at the run's first sample and the index is 0.
    pub fn start_index(&self, start: DateTime<Utc>) -> Result<usize> {
        let Some(epochs) = &self.epochs else {
            return Ok(0);
        };
        let (Some(&first), Some(&last)) = (epochs.first(), epochs.last()) else {
            return Err(Error::ModelRange("model is empty".into()));
        };
        if last < start {
            return Err(Error::ModelRange(format!(
                "predicts file ends before data start time: covers {first} to {last}, start {start}"
            )));
        }
        if first > start {
            return Err(Error::ModelRange(format!(
                "predicts file starts after data start time: covers {first} to {last}, start {start}"
            )));
        }
        epochs.iter().position(|&e| e == start).ok_or_else(|| {
            Error::ModelRange(format!("no epoch in predicts file exactly matches {start}"))
        })
    }

    /// Read a predicts ephemeris file.
    ///
    /// Header lines are skipped until the column header containing the
    /// `KM` distance unit marker. After that every line is a data line
    /// with 10 or 11 whitespace separated fields: a date, the time in
    /// one or two sub-fields, slant range (km), range rate (km/s) and
    /// range acceleration (m/s^2), plus trailing columns that are not
    /// used. Range rate and acceleration are converted to Doppler and
    /// Doppler rate at `carrier_hz`.
    pub fn from_predicts<P: AsRef<Path>>(path: P, carrier_hz: f64) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)?;
        let mut entries = Vec::new();
        let mut epochs: Vec<DateTime<Utc>> = Vec::new();
        let mut data_start = false;
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line?;
            let lineno = n + 1;
            if !data_start {
                if line.contains("KM") {
                    data_start = true;
                }
                continue;
            }
            let d: Vec<&str> = line.split_whitespace().collect();
            // 11 field lines carry the time in two sub-fields; 10 field
            // lines in one.
            let (timestr, fields) = match d.len() {
                11 => (
                    format!("{}T{}{}", d[0].replace('/', "-"), d[1], d[2]),
                    &d[3..6],
                ),
                10 => (format!("{}T{}", d[0].replace('/', "-"), d[1]), &d[2..5]),
                len => {
                    return Err(Error::MalformedInput(format!(
                        "{}:{lineno}: data line has {len} fields, expected 10 or 11",
                        path.display()
                    )));
                }
            };
            let num = |what: &str, s: &str| -> Result<f64> {
                s.parse::<f64>().map_err(|e| {
                    Error::MalformedInput(format!(
                        "{}:{lineno}: bad {what} {s:?}: {e}",
                        path.display()
                    ))
                })
            };
            let _range_m = num("range", fields[0])? * 1000.0;
            let range_rate_m_s = num("range rate", fields[1])? * 1000.0;
            let range_accel_m_s2 = num("range acceleration", fields[2])?;
            let ts = NaiveDateTime::parse_from_str(&timestr, "%Y-%m-%dT%H:%M:%S%.f")
                .map_err(|e| {
                    Error::MalformedInput(format!(
                        "{}:{lineno}: bad timestamp {timestr:?}: {e}",
                        path.display()
                    ))
                })?
                .and_utc();
            if let Some(&prev) = epochs.last() {
                let dt = (ts - prev).num_milliseconds() as f64 / 1e3;
                if dt <= 0.0 {
                    return Err(Error::MalformedInput(format!(
                        "{}:{lineno}: epochs not strictly increasing ({prev} then {ts})",
                        path.display()
                    )));
                }
                // The model must be dense at one entry per second.
                // Sub-second drift inside the window is caught by the
                // runtime alignment check instead.
                if !(0.5..=1.5).contains(&dt) {
                    return Err(Error::MalformedInput(format!(
                        "{}:{lineno}: model gap, epochs {dt:.3} s apart",
                        path.display()
                    )));
                }
            }
            epochs.push(ts);
            entries.push(ModelEntry {
                doppler_hz: -range_rate_m_s / SPEED_OF_LIGHT * carrier_hz,
                doppler_rate_hz_s: -range_accel_m_s2 / SPEED_OF_LIGHT * carrier_hz,
            });
        }
        if entries.is_empty() {
            return Err(Error::MalformedInput(format!(
                "{}: no data lines found",
                path.display()
            )));
        }
        let (first, last) = (entries[0], entries[entries.len() - 1]);
        info!("Predicts filename : {}", path.display());
        info!("    Start time : {}", epochs[0]);
        info!("    End time   : {}", epochs[epochs.len() - 1]);
        info!(
            "    Duration   : {} s",
            (epochs[epochs.len() - 1] - epochs[0]).num_seconds()
        );
        info!(
            "    Start model: {:.1} Hz, {:.3} Hz/s",
            first.doppler_hz, first.doppler_rate_hz_s
        );
        info!(
            "    End model  : {:.1} Hz, {:.3} Hz/s",
            last.doppler_hz, last.doppler_rate_hz_s
        );
        Ok(Self {
            entries,
            epochs: Some(epochs),
        })
    }

    /// Read a Doppler estimate file and densify it.
    ///
    /// The file holds lines of `mm:ss frequency_hz` at irregular time
    /// tags, the first of which must be at second 0. Between
    /// consecutive tags the frequency rate is constant,
    /// `(f[i+1] - f[i]) / (t[i+1] - t[i])`, and entries are generated
    /// by adding that rate once per second. At every tag the propagated
    /// frequency is checked against the tag's stated frequency to the
    /// nearest Hz; a mismatch means the estimates are internally
    /// inconsistent, which is logged, and the propagated value stays in
    /// effect. The final entry is the last tag's second; nothing is
    /// extrapolated past it here.
    pub fn from_estimates<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)?;
        let mut tags: Vec<(u64, f64)> = Vec::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line?;
            let lineno = n + 1;
            let bad = |msg: String| Error::MalformedInput(format!("{}:{lineno}: {msg}", path.display()));
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [time, freq] = fields.as_slice() else {
                return Err(bad(format!(
                    "expected `mm:ss frequency_hz`, got {} fields",
                    fields.len()
                )));
            };
            let Some((minutes, seconds)) = time.split_once(':') else {
                return Err(bad(format!("bad time tag {time:?}")));
            };
            let minutes: u64 = minutes
                .parse()
                .map_err(|e| bad(format!("bad minutes {minutes:?}: {e}")))?;
            let seconds: u64 = seconds
                .parse()
                .map_err(|e| bad(format!("bad seconds {seconds:?}: {e}")))?;
            let freq: f64 = freq
                .parse()
                .map_err(|e| bad(format!("bad frequency {freq:?}: {e}")))?;
            let elapsed = minutes * 60 + seconds;
            if tags.is_empty() && elapsed != 0 {
                return Err(bad("doppler estimate must start at second 0".into()));
            }
            if let Some(&(prev, _)) = tags.last()
                && elapsed <= prev
            {
                return Err(bad(format!(
                    "time tags not strictly increasing ({prev} then {elapsed})"
                )));
            }
            tags.push((elapsed, freq));
        }
        if tags.len() < 2 {
            return Err(Error::MalformedInput(format!(
                "{}: need at least two estimates to derive a rate",
                path.display()
            )));
        }

        let rates: Vec<f64> = tags
            .windows(2)
            .map(|w| (w[1].1 - w[0].1) / (w[1].0 - w[0].0) as f64)
            .collect();

        let last_sec = tags[tags.len() - 1].0;
        let mut entries = Vec::with_capacity(last_sec as usize + 1);
        let mut k = 0;
        let mut dop_hz = 0.0;
        let mut rate_hz_s = 0.0;
        for sec in 0..=last_sec {
            if k < tags.len() && sec == tags[k].0 {
                if k == 0 {
                    dop_hz = tags[0].1;
                } else if dop_hz.round() != tags[k].1.round() {
                    warn!(
                        "propagated doppler {dop_hz:.1} Hz disagrees with tag {:.1} Hz at second {sec}",
                        tags[k].1
                    );
                }
                if k < rates.len() {
                    rate_hz_s = rates[k];
                }
                k += 1;
            }
            entries.push(ModelEntry {
                doppler_hz: dop_hz,
                doppler_rate_hz_s: rate_hz_s,
            });
            // Propagate to the next second.
            dop_hz += rate_hz_s;
        }
        Ok(Self::new(entries))
    }
}
