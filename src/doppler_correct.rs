/*! Doppler correction block.

Consumes a complex sample stream one second at a time, applies the
frequency and frequency-rate to mix with for that second (from a
[`DopplerModel`], or fixed values), and emits the counter rotated
samples. The phase is carried across seconds by the [`Mixer`], so the
output joins seamlessly at every chunk boundary.

The number of samples forming "one second" is recomputed every second as
`round((elapsed + 1) * sample_rate) - samples_consumed`: samples the
wall clock owes us in total, minus samples already taken. That way the
cumulative count tracks the sample rate exactly even when the rate is
not an integer, instead of accumulating a rounding error every second.

When the model runs out before the input does, the block keeps mixing
with the carried frequency and the last known rate, warning once. That
is the only degraded mode; every other inconsistency is fatal.
*/
use std::io::Write;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, warn};

use crate::block::{Block, BlockRet};
use crate::doppler_model::DopplerModel;
use crate::mixer::Mixer;
use crate::stream::{Stream, Streamp};
use crate::{Complex, Error, Result};

/// Run configuration for the corrector.
///
/// Built once by the caller (the CLI in the shipped binary) and passed
/// by reference at construction; the block copies what it needs. No
/// global state.
#[derive(Clone, Debug)]
pub struct Config {
    /// Sample rate of the input stream, Hz.
    pub sample_rate: f64,

    /// UTC time of the first input sample. Required when the model is
    /// anchored to absolute time.
    pub start_utc: Option<DateTime<Utc>>,

    /// Fixed frequency offset, Hz. Without a model this is the mixing
    /// frequency; with a model it is added to every model frequency as
    /// an operator trim on top.
    pub frequency_hz: f64,

    /// Fixed frequency rate, Hz/s. Only used without a model; a model's
    /// rate always replaces it.
    pub frequency_rate_hz_s: f64,
}

/// Doppler correction block.
pub struct DopplerCorrect {
    src: Streamp<Complex>,
    dst: Streamp<Complex>,
    sample_rate: f64,
    start_utc: Option<DateTime<Utc>>,
    static_frequency_hz: f64,
    rate_hz_s: f64,
    mixer: Mixer,
    model: Option<DopplerModel>,
    base_index: usize,
    elapsed_seconds: u64,
    samples_consumed: u64,
    past_model_warned: bool,
    doppler_log: Option<Box<dyn Write + Send>>,
}

impl DopplerCorrect {
    /// Create new DopplerCorrect block.
    ///
    /// All configuration and model validation happens here, before any
    /// sample is read. `doppler_log`, if given, receives one line per
    /// processed second (`<time> <frequency_hz> <rate_hz_s>`), flushed
    /// per line; the handle is owned by the block and closed when the
    /// block is dropped, on success and on error alike.
    pub fn new(
        src: Streamp<Complex>,
        config: &Config,
        model: Option<DopplerModel>,
        doppler_log: Option<Box<dyn Write + Send>>,
    ) -> Result<(Self, Streamp<Complex>)> {
        if !config.sample_rate.is_finite() || config.sample_rate <= 0.0 {
            return Err(Error::Config(format!(
                "sample rate must be positive, got {}",
                config.sample_rate
            )));
        }
        let base_index = match &model {
            Some(m) if m.has_epochs() => {
                let start = config.start_utc.ok_or_else(|| {
                    Error::Config(
                        "a predicts model needs the UTC time of the first sample".into(),
                    )
                })?;
                m.start_index(start)?
            }
            _ => 0,
        };
        let dst = Stream::newp();
        Ok((
            Self {
                src,
                dst: dst.clone(),
                sample_rate: config.sample_rate,
                start_utc: config.start_utc,
                static_frequency_hz: config.frequency_hz,
                rate_hz_s: config.frequency_rate_hz_s,
                mixer: Mixer::new(config.frequency_hz),
                model,
                base_index,
                elapsed_seconds: 0,
                samples_consumed: 0,
                past_model_warned: false,
                doppler_log,
            },
            dst,
        ))
    }

    /// Frequency and rate to mix with during the current second.
    fn model_for_second(&mut self) -> Result<(f64, f64)> {
        let mut fc = self.mixer.frequency_hz();
        let mut rate = self.rate_hz_s;
        let Some(m) = &self.model else {
            return Ok((fc, rate));
        };
        let idx = self.base_index + self.elapsed_seconds as usize;
        match m.entry(idx) {
            Some(e) => {
                fc = self.static_frequency_hz + e.doppler_hz;
                rate = e.doppler_rate_hz_s;
                if let (Some(epoch), Some(start)) = (m.epoch(idx), self.start_utc) {
                    let current = start + TimeDelta::seconds(self.elapsed_seconds as i64);
                    let delta_ms = (current - epoch).num_milliseconds().abs();
                    if delta_ms > 100 {
                        return Err(Error::TimeAlignment(format!(
                            "model time {epoch} and stream time {current} differ by {:.3} s",
                            delta_ms as f64 / 1e3
                        )));
                    }
                }
            }
            None => {
                // Keep mixing with the carried values.
                if !self.past_model_warned {
                    self.past_model_warned = true;
                    warn!(
                        "past end of doppler model at second {}, continuing with {fc:.3} Hz {rate:.6} Hz/s",
                        self.elapsed_seconds
                    );
                }
            }
        }
        Ok((fc, rate))
    }

    fn log_second(&mut self, fc: f64, rate: f64) -> Result<()> {
        let Some(log) = &mut self.doppler_log else {
            return Ok(());
        };
        let line = match self.start_utc {
            Some(start) => {
                let current = start + TimeDelta::seconds(self.elapsed_seconds as i64);
                format!(
                    "{} {fc:.6} {rate:.6}\n",
                    current.format("%Y-%m-%dT%H:%M:%S%.3f")
                )
            }
            None => format!("{} {fc:.6} {rate:.6}\n", self.elapsed_seconds),
        };
        log.write_all(line.as_bytes())?;
        // Flushed per line, so tailing the log shows live progress.
        log.flush()?;
        Ok(())
    }
}

impl Block for DopplerCorrect {
    fn block_name(&self) -> &'static str {
        "DopplerCorrect"
    }
    fn work(&mut self) -> Result<BlockRet> {
        // Binding, since the borrow checker won't let us call &mut self
        // methods while a read guard borrows through self.
        let src = self.src.clone();
        let i = src.read_buf();
        let want = ((self.elapsed_seconds + 1) as f64 * self.sample_rate
            - self.samples_consumed as f64)
            .round() as usize;
        let take = if i.len() >= want {
            want
        } else if i.closed() {
            // Short final second.
            i.len()
        } else {
            return Ok(BlockRet::Noop);
        };
        if take == 0 {
            if let Some(log) = &mut self.doppler_log {
                log.flush()?;
            }
            self.dst.close();
            return Ok(BlockRet::EOF);
        }

        let (fc, rate) = self.model_for_second()?;
        self.mixer.set_frequency_hz(fc);
        self.rate_hz_s = rate;
        self.log_second(fc, rate)?;
        debug!(
            "second {}: mixing {take} samples at {fc:.3} Hz, {rate:.6} Hz/s",
            self.elapsed_seconds
        );

        let block = i.slice()[..take].to_vec();
        i.consume(take);
        let out = self.mixer.mix(&block, self.sample_rate, self.rate_hz_s);
        self.dst.write_slice(&out);

        self.elapsed_seconds += 1;
        self.samples_consumed += take as u64;
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doppler_model::ModelEntry;
    use crate::stream::streamp_from_slice;
    use crate::tests::{SharedWriter, assert_almost_equal_complex};

    fn ones(n: usize) -> Vec<Complex> {
        vec![Complex::new(1.0, 0.0); n]
    }

    fn config(sample_rate: f64) -> Config {
        Config {
            sample_rate,
            start_utc: None,
            frequency_hz: 0.0,
            frequency_rate_hz_s: 0.0,
        }
    }

    fn drain(b: &mut DopplerCorrect) -> Result<()> {
        loop {
            if matches!(b.work()?, BlockRet::EOF) {
                return Ok(());
            }
        }
    }

    #[test]
    fn static_frequency_derotation() -> Result<()> {
        let src = streamp_from_slice(&ones(8));
        src.close();
        let cfg = Config {
            frequency_hz: 1.0,
            ..config(4.0)
        };
        let (mut b, out) = DopplerCorrect::new(src, &cfg, None, None)?;
        drain(&mut b)?;
        let i = out.read_buf();
        assert!(i.closed());
        // exp(-j*2*pi*n/4) cycles through 1, -j, -1, j.
        let cycle = [
            Complex::new(1.0, 0.0),
            Complex::new(0.0, -1.0),
            Complex::new(-1.0, 0.0),
            Complex::new(0.0, 1.0),
        ];
        let expected: Vec<Complex> = (0..8).map(|n| cycle[n % 4]).collect();
        assert_almost_equal_complex(i.slice(), &expected);
        Ok(())
    }

    #[test]
    fn fractional_sample_rate_chunking() -> Result<()> {
        // 2.5 samples per second must chunk as 3, 2, 3, 2.
        let src = streamp_from_slice(&ones(10));
        src.close();
        let (mut b, out) = DopplerCorrect::new(src, &config(2.5), None, None)?;
        for want_total in [3, 5, 8, 10] {
            assert!(matches!(b.work()?, BlockRet::Ok));
            assert_eq!(out.len(), want_total);
        }
        assert!(matches!(b.work()?, BlockRet::EOF));
        Ok(())
    }

    #[test]
    fn waits_for_a_whole_second() -> Result<()> {
        let src = streamp_from_slice(&ones(3));
        let (mut b, out) = DopplerCorrect::new(src.clone(), &config(4.0), None, None)?;
        // Three of four samples buffered, stream still open: hold.
        assert!(matches!(b.work()?, BlockRet::Noop));
        assert!(out.is_empty());
        src.write_slice(&ones(1));
        assert!(matches!(b.work()?, BlockRet::Ok));
        assert_eq!(out.len(), 4);
        Ok(())
    }

    #[test]
    fn model_is_applied_with_static_trim() -> Result<()> {
        let model = DopplerModel::new(vec![
            ModelEntry {
                doppler_hz: 100.0,
                doppler_rate_hz_s: 0.0,
            },
            ModelEntry {
                doppler_hz: 200.0,
                doppler_rate_hz_s: 0.0,
            },
        ]);
        let src = streamp_from_slice(&ones(4));
        src.close();
        let cfg = Config {
            frequency_hz: 10.0,
            frequency_rate_hz_s: 99.0, // never combined with the model's rate
            ..config(2.0)
        };
        let log = SharedWriter::default();
        let (mut b, _out) =
            DopplerCorrect::new(src, &cfg, Some(model), Some(Box::new(log.clone())))?;
        drain(&mut b)?;
        let logged = String::from_utf8(log.bytes()).unwrap();
        assert_eq!(
            logged,
            "0 110.000000 0.000000\n1 210.000000 0.000000\n"
        );
        Ok(())
    }

    #[test]
    fn model_exhaustion_extrapolates() -> Result<()> {
        // Model covers seconds 0..=4 at 2 Hz/s; stream runs 10 seconds.
        let model = DopplerModel::new(
            (0..5)
                .map(|s| ModelEntry {
                    doppler_hz: 2.0 * s as f64,
                    doppler_rate_hz_s: 2.0,
                })
                .collect(),
        );
        let src = streamp_from_slice(&ones(20));
        src.close();
        let log = SharedWriter::default();
        let (mut b, _out) =
            DopplerCorrect::new(src, &config(2.0), Some(model), Some(Box::new(log.clone())))?;
        drain(&mut b)?;
        assert!(b.past_model_warned);
        let logged = String::from_utf8(log.bytes()).unwrap();
        let freqs: Vec<f64> = logged
            .lines()
            .map(|l| l.split_whitespace().nth(1).unwrap().parse().unwrap())
            .collect();
        // Seconds 5..9 keep propagating at the last rate.
        assert_eq!(
            freqs,
            vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0]
        );
        for line in logged.lines() {
            assert!(line.ends_with("2.000000"), "rate retained: {line}");
        }
        Ok(())
    }

    fn epoch_model(offsets_ms: &[i64], start: DateTime<Utc>) -> DopplerModel {
        let entries = vec![
            ModelEntry {
                doppler_hz: 0.0,
                doppler_rate_hz_s: 0.0,
            };
            offsets_ms.len()
        ];
        let epochs = offsets_ms
            .iter()
            .enumerate()
            .map(|(k, &ms)| start + TimeDelta::seconds(k as i64) + TimeDelta::milliseconds(ms))
            .collect();
        DopplerModel::with_epochs(entries, epochs)
    }

    fn start_time() -> DateTime<Utc> {
        "2016-10-19T06:54:07"
            .parse::<chrono::NaiveDateTime>()
            .unwrap()
            .and_utc()
    }

    #[test]
    fn small_time_drift_passes() -> Result<()> {
        let start = start_time();
        let model = epoch_model(&[0, 0, 50], start);
        let src = streamp_from_slice(&ones(6));
        src.close();
        let cfg = Config {
            start_utc: Some(start),
            ..config(2.0)
        };
        let (mut b, _out) = DopplerCorrect::new(src, &cfg, Some(model), None)?;
        drain(&mut b)?;
        Ok(())
    }

    #[test]
    fn large_time_drift_is_fatal() -> Result<()> {
        let start = start_time();
        let model = epoch_model(&[0, 0, 500], start);
        let src = streamp_from_slice(&ones(6));
        src.close();
        let cfg = Config {
            start_utc: Some(start),
            ..config(2.0)
        };
        let (mut b, _out) = DopplerCorrect::new(src, &cfg, Some(model), None)?;
        b.work()?;
        b.work()?;
        let err = b.work().unwrap_err();
        assert!(matches!(err, Error::TimeAlignment(_)), "got {err:?}");
        Ok(())
    }

    #[test]
    fn predicts_model_requires_start_time() {
        let model = epoch_model(&[0], start_time());
        let src = streamp_from_slice(&ones(1));
        let err = DopplerCorrect::new(src, &config(1.0), Some(model), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn bad_sample_rate_is_fatal() {
        let src = streamp_from_slice(&ones(1));
        let err = DopplerCorrect::new(src, &config(0.0), None, None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn start_time_outside_model_is_fatal() {
        let start = start_time();
        let model = epoch_model(&[0, 0, 0], start);
        let src = streamp_from_slice(&ones(1));
        let cfg = Config {
            start_utc: Some(start + TimeDelta::seconds(10)),
            ..config(1.0)
        };
        let err = DopplerCorrect::new(src, &cfg, Some(model), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModelRange(_)), "got {err:?}");
    }

    #[test]
    fn starts_mid_model() -> Result<()> {
        // Start one second into the model: second 0 of the stream uses
        // entry 1.
        let start = start_time();
        let entries = vec![
            ModelEntry {
                doppler_hz: 7.0,
                doppler_rate_hz_s: 0.0,
            },
            ModelEntry {
                doppler_hz: 8.0,
                doppler_rate_hz_s: 0.0,
            },
        ];
        let epochs = vec![start, start + TimeDelta::seconds(1)];
        let model = DopplerModel::with_epochs(entries, epochs);
        let src = streamp_from_slice(&ones(2));
        src.close();
        let cfg = Config {
            start_utc: Some(start + TimeDelta::seconds(1)),
            ..config(2.0)
        };
        let log = SharedWriter::default();
        let (mut b, _out) =
            DopplerCorrect::new(src, &cfg, Some(model), Some(Box::new(log.clone())))?;
        drain(&mut b)?;
        let logged = String::from_utf8(log.bytes()).unwrap();
        assert_eq!(logged, "2016-10-19T06:54:08.000 8.000000 0.000000\n");
        Ok(())
    }
}
