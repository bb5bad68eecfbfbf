//! Sink values into a vector.
//!
//! This block is really only useful for unit tests.
use std::sync::{Arc, Mutex};

use crate::Result;
use crate::block::{Block, BlockRet};
use crate::stream::Streamp;

/// VectorSink.
///
/// Takes what comes from the stream and just adds it to a vector. The
/// vector stays reachable through a [`Hook`] after the sink itself has
/// been boxed into a graph.
pub struct VectorSink<T: Copy> {
    src: Streamp<T>,
    storage: Arc<Mutex<Vec<T>>>,
}

/// Hook into the data written to a [`VectorSink`].
pub struct Hook<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone> Hook<T> {
    /// Snapshot of the samples written so far.
    pub fn data(&self) -> Vec<T> {
        self.inner.lock().unwrap().clone()
    }
}

impl<T: Copy> VectorSink<T> {
    /// Create new VectorSink block.
    pub fn new(src: Streamp<T>) -> Self {
        Self {
            src,
            storage: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a Hook into the data that will be written.
    #[must_use]
    pub fn hook(&self) -> Hook<T> {
        Hook {
            inner: self.storage.clone(),
        }
    }
}

impl<T: Copy> Block for VectorSink<T> {
    fn block_name(&self) -> &'static str {
        "VectorSink"
    }
    fn work(&mut self) -> Result<BlockRet> {
        let i = self.src.read_buf();
        let n = i.len();
        if n == 0 {
            return Ok(if i.closed() {
                BlockRet::EOF
            } else {
                BlockRet::Noop
            });
        }
        self.storage.lock().unwrap().extend_from_slice(i.slice());
        i.consume(n);
        Ok(BlockRet::Ok)
    }
}
