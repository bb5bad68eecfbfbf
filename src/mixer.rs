/*! Phase continuous complex mixer.

Models an object with a velocity and an acceleration: over a block of
samples the phase trajectory is

```text
phi(t) = 2*pi*(f*t + 0.5*a*t*t) + phi0
```

and every sample is multiplied by `exp(-j*phi(t))`, so that an observed
drift at frequency `f` and rate `a` becomes stationary.

The trajectory is evaluated one step past the end of the block. That
trailing point becomes the starting phase of the next block, which is
what makes consecutive blocks join without a seam: recomputing the phase
per block from the frequency alone would accumulate discretization
error, carrying the exact trailing phase does not.

This is the numeric core only, in the same spirit as a FIR kernel being
separate from its filter block. The [`DopplerCorrect`] block owns a
`Mixer` and feeds it one second of samples at a time.

[`DopplerCorrect`]: crate::doppler_correct::DopplerCorrect
*/
use crate::{Complex, Float};

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// Running mixer state: accumulated phase and current frequency.
///
/// The phase is accumulated in f64 and never explicitly normalized;
/// trigonometric periodicity takes care of the wrap. It must never be
/// reset mid stream, since a discontinuity here puts a phase glitch in
/// the output.
pub struct Mixer {
    phase: f64,
    frequency_hz: f64,
}

impl Mixer {
    /// Create a new mixer at phase zero.
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            phase: 0.0,
            frequency_hz,
        }
    }

    /// Current frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Overwrite the frequency, e.g. from a model entry.
    ///
    /// The phase is deliberately left alone.
    pub fn set_frequency_hz(&mut self, hz: f64) {
        self.frequency_hz = hz;
    }

    /// Accumulated phase in radians.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Counter rotate one block of samples.
    ///
    /// Mixes `data` with `exp(-j*phi(t))` where `phi` runs from the
    /// carried phase at the carried frequency, swept by `rate_hz_s`.
    /// Afterwards the carried phase is the trajectory point one sample
    /// past the block, and the carried frequency has advanced by
    /// `rate_hz_s` times the block duration.
    ///
    /// An empty block is a no-op and leaves the state untouched.
    pub fn mix(&mut self, data: &[Complex], sample_rate: f64, rate_hz_s: f64) -> Vec<Complex> {
        if data.is_empty() {
            return Vec::new();
        }
        let dt = 1.0 / sample_rate;
        let mut out = Vec::with_capacity(data.len());
        for (n, s) in data.iter().enumerate() {
            let t = n as f64 * dt;
            let phi = self.phase + TWO_PI * (self.frequency_hz * t + 0.5 * rate_hz_s * t * t);
            // exp(-j*phi) = cos(phi) - j*sin(phi)
            let (sin, cos) = phi.sin_cos();
            out.push(Complex::new(
                (s.re as f64 * cos + s.im as f64 * sin) as Float,
                (s.im as f64 * cos - s.re as f64 * sin) as Float,
            ));
        }
        let t_end = data.len() as f64 * dt;
        self.phase += TWO_PI * (self.frequency_hz * t_end + 0.5 * rate_hz_s * t_end * t_end);
        self.frequency_hz += rate_hz_s * t_end;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_almost_equal_complex;
    use rand::Rng;

    fn random_block(n: usize) -> Vec<Complex> {
        let mut rng = rand::rng();
        (0..n)
            .map(|_| Complex::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect()
    }

    #[test]
    fn rate_zero_is_constant_derotation() {
        let fs = 1000.0;
        let f = 12.5;
        let data = random_block(256);
        let mut mixer = Mixer::new(f);
        let out = mixer.mix(&data, fs, 0.0);
        let expected: Vec<Complex> = data
            .iter()
            .enumerate()
            .map(|(n, s)| {
                let phi = TWO_PI * f * n as f64 / fs;
                let rot = Complex::new(phi.cos() as Float, -(phi.sin() as Float));
                s * rot
            })
            .collect();
        assert_almost_equal_complex(&out, &expected);
    }

    #[test]
    fn split_equals_whole() {
        let fs = 8000.0;
        let data = random_block(512);
        let rate = 3.75;

        let mut whole = Mixer::new(-420.0);
        let out_whole = whole.mix(&data, fs, rate);

        let mut split = Mixer::new(-420.0);
        let mut out_split = split.mix(&data[..256], fs, rate);
        out_split.extend(split.mix(&data[256..], fs, rate));

        assert_almost_equal_complex(&out_whole, &out_split);
        assert!((whole.phase() - split.phase()).abs() < 1e-9);
        assert!((whole.frequency_hz() - split.frequency_hz()).abs() < 1e-9);
    }

    #[test]
    fn mix_then_unmix_restores_input() {
        let fs = 4000.0;
        let data = random_block(300);
        let (f, rate) = (77.0, -1.5);

        let mut fwd = Mixer::new(f);
        let mut rev = Mixer::new(-f);
        let mut restored = Vec::new();
        // Thread both states through two consecutive blocks.
        for chunk in data.chunks(150) {
            let mixed = fwd.mix(chunk, fs, rate);
            restored.extend(rev.mix(&mixed, fs, -rate));
        }
        assert_almost_equal_complex(&restored, &data);
    }

    #[test]
    fn empty_block_is_noop() {
        let mut mixer = Mixer::new(100.0);
        mixer.mix(&random_block(10), 1000.0, 5.0);
        let (phase, freq) = (mixer.phase(), mixer.frequency_hz());
        let out = mixer.mix(&[], 1000.0, 5.0);
        assert!(out.is_empty());
        assert_eq!(mixer.phase(), phase);
        assert_eq!(mixer.frequency_hz(), freq);
    }

    #[test]
    fn rate_advances_frequency() {
        let fs = 100.0;
        let mut mixer = Mixer::new(10.0);
        // One full second at 2 Hz/s.
        mixer.mix(&random_block(100), fs, 2.0);
        assert!((mixer.frequency_hz() - 12.0).abs() < 1e-9);
    }
}
