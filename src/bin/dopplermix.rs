//! Doppler correction pipeline stage.
//!
//! Reads interleaved float32 I/Q samples from stdin, counter rotates
//! them so that a drifting carrier appears stationary, and writes the
//! corrected samples to stdout. The frequency trajectory comes from a
//! predicts ephemeris file, a coarse Doppler estimate file, or fixed
//! `--fc`/`--fc-rate` values. Diagnostics go to stderr.
use anyhow::Result;
use clap::Parser;

use dopplermix::Complex;
use dopplermix::blocks::{DopplerCorrect, ReaderSource, SwapIq, WriterSink};
use dopplermix::doppler_correct::Config;
use dopplermix::doppler_model::{DEFAULT_CARRIER_HZ, DopplerModel};
use dopplermix::graph::Graph;

#[derive(clap::Parser)]
#[command(version, about)]
struct Opt {
    /// Sample rate in Hz.
    #[arg(long)]
    fs: f64,

    /// UTC time of the first sample, e.g. '2016-10-19T06:54:07.000'.
    ///
    /// Required with --predicts, which anchors the model to absolute
    /// time.
    #[arg(long, value_parser = parse_utc)]
    utc: Option<chrono::DateTime<chrono::Utc>>,

    /// Mix with this frequency (Hz). Added on top of the model
    /// frequency, if a model is given.
    #[arg(long, default_value_t = 0.0)]
    fc: f64,

    /// Mix with this frequency rate (Hz/s). A model's rate replaces
    /// this.
    #[arg(long, default_value_t = 0.0)]
    fc_rate: f64,

    /// Predicts (ephemeris) doppler correction file.
    #[arg(long, conflicts_with = "dopestimate")]
    predicts: Option<std::path::PathBuf>,

    /// Carrier frequency (Hz) for converting predicts range rates to
    /// Doppler.
    #[arg(long, default_value_t = DEFAULT_CARRIER_HZ)]
    carrier: f64,

    /// Doppler estimate file, lines of `mm:ss frequency_hz`.
    #[arg(long)]
    dopestimate: Option<std::path::PathBuf>,

    /// Save the applied doppler, one line per second, to this file.
    #[arg(long)]
    save_doppler: Option<std::path::PathBuf>,

    /// Swap I/Q order on input and output.
    #[arg(long)]
    swap_iq: bool,

    /// Increase log verbosity.
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_utc(s: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    s.parse::<chrono::NaiveDateTime>()
        .map(|t| t.and_utc())
        .map_err(|e| format!("invalid UTC time {s:?}: {e}"))
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("dopplermix")
        .quiet(false)
        .verbosity(opt.verbose as usize + 2)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let model = if let Some(path) = &opt.predicts {
        Some(DopplerModel::from_predicts(path, opt.carrier)?)
    } else if let Some(path) = &opt.dopestimate {
        Some(DopplerModel::from_estimates(path)?)
    } else {
        None
    };

    let config = Config {
        sample_rate: opt.fs,
        start_utc: opt.utc,
        frequency_hz: opt.fc,
        frequency_rate_hz_s: opt.fc_rate,
    };
    let doppler_log: Option<Box<dyn std::io::Write + Send>> = match &opt.save_doppler {
        Some(path) => Some(Box::new(std::fs::File::create(path)?)),
        None => None,
    };

    let mut g = Graph::new();
    let (src, mut prev) = ReaderSource::<Complex>::new(std::io::stdin());
    g.add(Box::new(src));
    if opt.swap_iq {
        let (swap, out) = SwapIq::new(prev);
        g.add(Box::new(swap));
        prev = out;
    }
    let (correct, out) = DopplerCorrect::new(prev, &config, model, doppler_log)?;
    g.add(Box::new(correct));
    prev = out;
    if opt.swap_iq {
        // Swap back, so the output framing matches the input framing.
        let (swap, out) = SwapIq::new(prev);
        g.add(Box::new(swap));
        prev = out;
    }
    g.add(Box::new(WriterSink::<Complex>::new(prev, std::io::stdout())));
    g.run()?;
    Ok(())
}
