//! Source block reading raw samples from a byte stream.
use std::io::Read;

use log::{debug, warn};

use crate::block::{Block, BlockRet};
use crate::stream::{Stream, Streamp};
use crate::{Result, Sample};

/// Bytes requested from the reader per work call.
const READ_CHUNK: usize = 65536;

/// Arbitrary reader source.
///
/// Parses fixed size samples off any `Read`, typically stdin or a pipe.
/// Reads block, which is what paces the graph when upstream is slow.
/// Bytes that do not yet form a whole sample are carried to the next
/// call.
pub struct ReaderSource<T: Sample> {
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
    dst: Streamp<T::Type>,
}

impl<T> ReaderSource<T>
where
    T: Sample<Type = T> + Copy,
{
    /// Create new ReaderSource block.
    pub fn new<R: Read + Send + 'static>(reader: R) -> (Self, Streamp<T>) {
        let dst = Stream::newp();
        (
            Self {
                reader: Box::new(reader),
                buf: Vec::new(),
                dst: dst.clone(),
            },
            dst,
        )
    }
}

impl<T> Block for ReaderSource<T>
where
    T: Sample<Type = T> + Copy,
{
    fn block_name(&self) -> &'static str {
        "ReaderSource"
    }
    fn work(&mut self) -> Result<BlockRet> {
        let mut buffer = vec![0u8; READ_CHUNK];
        let n = self.reader.read(&mut buffer)?;
        if n == 0 {
            if !self.buf.is_empty() {
                warn!(
                    "input ended with {} trailing bytes, not a whole sample",
                    self.buf.len()
                );
            }
            debug!("input reached EOF");
            self.dst.close();
            return Ok(BlockRet::EOF);
        }
        let size = T::size();
        self.buf.extend(&buffer[..n]);
        let whole = self.buf.len() / size * size;
        let mut v = Vec::with_capacity(whole / size);
        for pos in (0..whole).step_by(size) {
            v.push(T::parse(&self.buf[pos..pos + size])?);
        }
        self.buf.drain(..whole);
        self.dst.write_slice(&v);
        Ok(BlockRet::Ok)
    }
}
