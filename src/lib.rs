/*! This crate removes a time-varying Doppler shift from a stream of
complex I/Q samples.

It is built as a stage for ground station processing pipelines that pipe
raw samples through successive filtering steps. The stage reads interleaved
32 bit float I/Q pairs on one end, counter-rotates them against a frequency
and frequency-rate model, and writes the corrected samples out the other
end, so that a drifting carrier appears stationary downstream.

The frequency model comes from one of two places:

* a "predicts" ephemeris file, giving range rate and range acceleration of
  the spacecraft vs time, converted to Doppler and Doppler rate at the
  carrier frequency, or
* a coarse operator supplied Doppler estimate file, densified to one
  (frequency, rate) entry per second.

Without a model, a fixed frequency and frequency rate can be applied.

# Architecture overview

Processing is organized as blocks connected by unidirectional streams and
run by a single threaded graph, in the style of GNU Radio. A typical graph
for this crate is:

```text
[ ReaderSource (stdin) ]
          ↓
  [ SwapIq (optional) ]
          ↓
   [ DopplerCorrect ]
          ↓
  [ SwapIq (optional) ]
          ↓
[ WriterSink (stdout) ]
```

The reads and writes at the ends block on the pipes, which is what paces
the whole graph. There is no parallelism across seconds of input, because
each block of samples starts at the phase the previous block ended on.

# Example

```
use dopplermix::graph::Graph;
use dopplermix::blocks::{SwapIq, VectorSink, VectorSource};
use dopplermix::Complex;
let (src, prev) = VectorSource::new(vec![
    Complex::new(1.0, -2.0),
    Complex::new(0.5, 0.25),
]);
let (swap, prev) = SwapIq::new(prev);
let sink = VectorSink::new(prev);
let hook = sink.hook();
let mut g = Graph::new();
g.add(Box::new(src));
g.add(Box::new(swap));
g.add(Box::new(sink));
g.run()?;
assert_eq!(hook.data()[0], Complex::new(-2.0, 1.0));
# Ok::<(), anyhow::Error>(())
```
*/

// Blocks.
pub mod doppler_correct;
pub mod reader_source;
pub mod swap_iq;
pub mod vector_sink;
pub mod vector_source;
pub mod writer_sink;

pub mod block;
pub mod blocks;
pub mod doppler_model;
pub mod graph;
pub mod mixer;
pub mod stream;

/// Float type used. Usually f32, but not guaranteed.
pub type Float = f32;

/// Complex (I/Q) data.
pub type Complex = num_complex::Complex<Float>;

/// Crate error type.
///
/// Every variant except `Io` maps to one condition the design treats as
/// fatal: the process should print the diagnostic and exit non-zero.
/// Running past the end of a finite model is deliberately *not* an error;
/// the corrector degrades to extrapolation with a one time warning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid run configuration. Reported before any stream I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// The model's time coverage does not bracket the requested start time.
    #[error("model range error: {0}")]
    ModelRange(String),

    /// A model file that cannot be understood. Never partially recovered,
    /// since the resulting model would be silently wrong.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Model epoch and computed stream time have desynchronized.
    #[error("time alignment error: {0}")]
    TimeAlignment(String),

    /// Wrapped I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A trait all sample types must implement.
///
/// This is the byte level framing of the raw streams: fixed size little
/// endian fields, no header, consumed and produced in whole sample units.
pub trait Sample {
    /// The type of the sample.
    type Type;

    /// The serialized size of one sample.
    fn size() -> usize;

    /// Parse one sample.
    fn parse(data: &[u8]) -> Result<Self::Type>;

    /// Serialize one sample.
    fn serialize(&self) -> Vec<u8>;
}

impl Sample for Complex {
    type Type = Complex;
    fn size() -> usize {
        std::mem::size_of::<Self>()
    }
    fn parse(data: &[u8]) -> Result<Self::Type> {
        assert_eq!(data.len(), Self::size(), "caller must slice whole samples");
        let half = Self::size() / 2;
        let i = Float::from_le_bytes(data[..half].try_into().unwrap());
        let q = Float::from_le_bytes(data[half..].try_into().unwrap());
        Ok(Complex::new(i, q))
    }
    fn serialize(&self) -> Vec<u8> {
        let mut ret = Vec::with_capacity(Self::size());
        ret.extend(Float::to_le_bytes(self.re));
        ret.extend(Float::to_le_bytes(self.im));
        ret
    }
}

impl Sample for Float {
    type Type = Float;
    fn size() -> usize {
        std::mem::size_of::<Self>()
    }
    fn parse(data: &[u8]) -> Result<Self::Type> {
        assert_eq!(data.len(), Self::size(), "caller must slice whole samples");
        Ok(Float::from_le_bytes(data.try_into().unwrap()))
    }
    fn serialize(&self) -> Vec<u8> {
        Float::to_le_bytes(*self).to_vec()
    }
}

#[cfg(test)]
pub mod tests {
    //! Test helper functions.
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Shared in-memory writer, so tests can inspect what a boxed-up
    /// sink or log handle wrote.
    #[derive(Clone, Default)]
    pub struct SharedWriter {
        data: Arc<Mutex<Vec<u8>>>,
    }

    impl SharedWriter {
        /// Snapshot of everything written so far.
        pub fn bytes(&self) -> Vec<u8> {
            self.data.lock().unwrap().clone()
        }
    }

    impl Write for SharedWriter {
        fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
            self.data.lock().unwrap().extend_from_slice(b);
            Ok(b.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// For testing, assert that two slices are almost equal.
    ///
    /// Floating point numbers are almost never exactly equal.
    pub fn assert_almost_equal_complex(left: &[Complex], right: &[Complex]) {
        assert_eq!(
            left.len(),
            right.len(),
            "\nleft: {:?}\nright: {:?}",
            left,
            right
        );
        for i in 0..left.len() {
            let dist = (left[i] - right[i]).norm_sqr().sqrt();
            if dist > 0.001 {
                assert_eq!(
                    left[i], right[i],
                    "\nElement {i}:\nleft: {:?}\nright: {:?}",
                    left, right
                );
            }
        }
    }

    #[test]
    fn complex_roundtrip() -> Result<()> {
        let c = Complex::new(3.14, -2.7);
        let bytes = c.serialize();
        assert_eq!(bytes.len(), Complex::size());
        assert_eq!(Complex::parse(&bytes)?, c);
        Ok(())
    }

    #[test]
    fn float_roundtrip() -> Result<()> {
        let f: Float = -1.25;
        let bytes = f.serialize();
        assert_eq!(bytes.len(), Float::size());
        assert_eq!(Float::parse(&bytes)?, f);
        Ok(())
    }
}
/* vim: textwidth=80
 */
