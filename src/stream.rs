/*! Streams connecting blocks.

Blocks are connected with streams. A block can have zero or more input
streams, and write to zero or more output streams.

A stream is a FIFO of samples plus a "closed" flag. The producing block
closes the stream when it will never write again, which is how
end-of-input propagates down the pipeline: a consuming block that finds
its input both empty and closed is done.

Streams are not bounded. Pacing comes from the blocking pipe reads and
writes at the ends of the graph, and from consumers draining what they
read on every scheduler pass.
*/
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner<T> {
    data: Vec<T>,
    closed: bool,
}

/// A stream between blocks.
pub struct Stream<T> {
    inner: Mutex<Inner<T>>,
}

/// Convenience type for a "pointer to a stream".
pub type Streamp<T> = Arc<Stream<T>>;

/// Create a new Streamp with contents.
pub fn streamp_from_slice<T: Copy>(data: &[T]) -> Streamp<T> {
    let s = Stream::newp();
    s.write_slice(data);
    s
}

impl<T> Stream<T> {
    /// Create a new stream, wrapped for sharing between blocks.
    pub fn newp() -> Streamp<T> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                data: Vec::new(),
                closed: false,
            }),
        })
    }

    /// Return a read handle on the buffered samples.
    ///
    /// The stream is locked for as long as the handle lives.
    pub fn read_buf(&self) -> ReadBuf<'_, T> {
        ReadBuf {
            guard: self.inner.lock().unwrap(),
        }
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().data.len()
    }

    /// True if no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the stream as never receiving more samples.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }

    /// True if the producer will never write again.
    pub fn closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl<T: Copy> Stream<T> {
    /// Append samples to the stream.
    pub fn write_slice(&self, data: &[T]) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.closed, "write to closed stream");
        inner.data.extend_from_slice(data);
    }
}

/// Read handle on a stream, holding the stream lock.
///
/// Data remains in the stream until `consume()` is called; dropping the
/// handle without consuming means the same samples are read again next
/// time.
pub struct ReadBuf<'a, T> {
    guard: MutexGuard<'a, Inner<T>>,
}

impl<T> ReadBuf<'_, T> {
    /// The buffered samples.
    pub fn slice(&self) -> &[T] {
        &self.guard.data
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.guard.data.len()
    }

    /// True if no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.guard.data.is_empty()
    }

    /// True if the producer will never write again.
    pub fn closed(&self) -> bool {
        self.guard.closed
    }

    /// Remove the first `n` samples from the stream.
    pub fn consume(mut self, n: usize) {
        assert!(n <= self.guard.data.len(), "consumed more than was read");
        self.guard.data.drain(..n);
    }
}
