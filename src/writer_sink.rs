//! Sink block writing raw samples to a byte stream.
use std::io::Write;

use crate::block::{Block, BlockRet};
use crate::stream::Streamp;
use crate::{Result, Sample};

/// Arbitrary writer sink.
///
/// Serializes samples onto any `Write`, typically stdout or a pipe.
/// Flushes after every batch so a downstream consumer sees data as soon
/// as it was produced.
pub struct WriterSink<T: Sample> {
    writer: Box<dyn Write + Send>,
    src: Streamp<T::Type>,
}

impl<T> WriterSink<T>
where
    T: Sample<Type = T> + Copy,
{
    /// Create new WriterSink block.
    pub fn new<W: Write + Send + 'static>(src: Streamp<T>, writer: W) -> Self {
        Self {
            writer: Box::new(writer),
            src,
        }
    }
}

impl<T> Block for WriterSink<T>
where
    T: Sample<Type = T> + Copy,
{
    fn block_name(&self) -> &'static str {
        "WriterSink"
    }
    fn work(&mut self) -> Result<BlockRet> {
        let i = self.src.read_buf();
        let n = i.len();
        if n == 0 {
            if i.closed() {
                self.writer.flush()?;
                return Ok(BlockRet::EOF);
            }
            return Ok(BlockRet::Noop);
        }
        let mut v = Vec::with_capacity(T::size() * n);
        i.slice().iter().for_each(|s: &T| {
            v.extend(s.serialize());
        });
        self.writer.write_all(&v)?;
        self.writer.flush()?;
        i.consume(n);
        Ok(BlockRet::Ok)
    }
}
