//! Source block emitting a fixed vector of samples.
//!
//! This block is really only useful for unit tests.
use crate::Result;
use crate::block::{Block, BlockRet};
use crate::stream::{Stream, Streamp};

/// Write a provided vector into a stream, then close it.
pub struct VectorSource<T: Copy> {
    data: Vec<T>,
    dst: Streamp<T>,
}

impl<T: Copy> VectorSource<T> {
    /// Create new VectorSource block.
    pub fn new(data: Vec<T>) -> (Self, Streamp<T>) {
        let dst = Stream::newp();
        (
            Self {
                data,
                dst: dst.clone(),
            },
            dst,
        )
    }
}

impl<T: Copy> Block for VectorSource<T> {
    fn block_name(&self) -> &'static str {
        "VectorSource"
    }
    fn work(&mut self) -> Result<BlockRet> {
        self.dst.write_slice(&self.data);
        self.dst.close();
        Ok(BlockRet::EOF)
    }
}
