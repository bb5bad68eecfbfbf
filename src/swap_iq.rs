//! Swap the I and Q components of every sample.
//!
//! Raw capture files disagree on whether the real or the imaginary
//! component comes first in the interleaved framing. Putting this block
//! on both sides of a processing stage handles the swapped convention
//! without the stage itself having to know: swap on the way in, process,
//! swap back on the way out, and the output framing matches the input.
use crate::block::{Block, BlockRet};
use crate::stream::{Stream, Streamp};
use crate::{Complex, Result};

/// Swap I and Q.
pub struct SwapIq {
    src: Streamp<Complex>,
    dst: Streamp<Complex>,
}

impl SwapIq {
    /// Create new SwapIq block.
    pub fn new(src: Streamp<Complex>) -> (Self, Streamp<Complex>) {
        let dst = Stream::newp();
        (
            Self {
                src,
                dst: dst.clone(),
            },
            dst,
        )
    }

    fn process_one(&self, s: &Complex) -> Complex {
        Complex::new(s.im, s.re)
    }
}

impl Block for SwapIq {
    fn block_name(&self) -> &'static str {
        "SwapIq"
    }
    fn work(&mut self) -> Result<BlockRet> {
        let i = self.src.read_buf();
        let n = i.len();
        if n == 0 {
            if i.closed() {
                self.dst.close();
                return Ok(BlockRet::EOF);
            }
            return Ok(BlockRet::Noop);
        }
        let v: Vec<Complex> = i.slice().iter().map(|s| self.process_one(s)).collect();
        self.dst.write_slice(&v);
        i.consume(n);
        Ok(BlockRet::Ok)
    }
}
