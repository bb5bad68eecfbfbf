/*! Graphs contain blocks connected by streams, and run them.
 */
use std::time::Instant;

use log::{info, trace};

use crate::Result;
use crate::block::{Block, BlockRet};

/**
A graph runs blocks connected by streams until every block has reached
its terminal state.

The scheduler is deliberately single threaded and sequential: every
block's output phase depends on state left behind by the previous chunk,
so there is nothing to parallelize. Blocks at the ends of the graph block
on pipe I/O, which is the backpressure mechanism for the whole run.

# Example

```
use dopplermix::graph::Graph;
use dopplermix::blocks::{VectorSink, VectorSource};
let (src, prev) = VectorSource::new(vec![1.0f32, 2.0]);
let sink = VectorSink::new(prev);
let mut g = Graph::new();
g.add(Box::new(src));
g.add(Box::new(sink));
g.run()?;
# Ok::<(), anyhow::Error>(())
```
*/
pub struct Graph {
    blocks: Vec<Box<dyn Block>>,
    cancel_token: CancellationToken,
    spent_time: Option<std::time::Duration>,
    times: Vec<std::time::Duration>,
}

impl Graph {
    /// Create a new flowgraph.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            cancel_token: CancellationToken::new(),
            spent_time: None,
            times: Vec::new(),
        }
    }

    /// Add a block to the graph.
    pub fn add(&mut self, b: Box<dyn Block>) {
        self.blocks.push(b);
    }

    /// Run the graph.
    ///
    /// Runs until all blocks are done, or until the graph is cancelled.
    pub fn run(&mut self) -> Result<()> {
        let st = Instant::now();
        self.times
            .resize(self.blocks.len(), std::time::Duration::default());
        let mut eof = vec![false; self.blocks.len()];
        loop {
            if self.cancel_token.is_canceled() {
                break;
            }
            let mut progress = false;
            for (n, b) in self.blocks.iter_mut().enumerate() {
                if eof[n] {
                    continue;
                }
                let name = b.block_name();
                let st = Instant::now();
                let ret = b.work()?;
                self.times[n] += st.elapsed();
                match ret {
                    BlockRet::Ok => progress = true,
                    BlockRet::Noop => {}
                    BlockRet::EOF => {
                        // A state change too: downstream blocks may only
                        // now see their input as closed.
                        eof[n] = true;
                        progress = true;
                        info!("{name} EOF, exiting");
                    }
                }
            }
            if eof.iter().all(|&e| e) {
                break;
            }
            if !progress {
                // Nothing moved and nothing EOFed. With blocking
                // sources that means the graph is drained.
                trace!("no block made progress, stopping");
                break;
            }
        }
        self.spent_time = Some(st.elapsed());
        if let Some(stats) = self.generate_stats() {
            for line in stats.split('\n') {
                if !line.is_empty() {
                    info!("{line}");
                }
            }
        }
        Ok(())
    }

    /// Return a string with stats about where time went.
    pub fn generate_stats(&self) -> Option<String> {
        let elapsed = self.spent_time?.as_secs_f64();
        let total = self
            .times
            .iter()
            .cloned()
            .sum::<std::time::Duration>()
            .as_secs_f64();
        let ml = self
            .blocks
            .iter()
            .map(|b| b.block_name().len())
            .max()?;
        let mut s = format!("{:<ml$}    Seconds  Percent\n", "Block name");
        for (n, b) in self.blocks.iter().enumerate() {
            s.push_str(&format!(
                "{:<ml$} {:10.3} {:>7.2}%\n",
                b.block_name(),
                self.times[n].as_secs_f64(),
                100.0 * self.times[n].as_secs_f64() / elapsed,
            ));
        }
        s.push_str(&format!(
            "{:<ml$} {:10.3} {:>7.2}%\n",
            "Non-block time",
            elapsed - total,
            100.0 * (elapsed - total) / elapsed,
        ));
        Some(s)
    }

    /// Return a cancellation token, for asynchronously stopping the
    /// graph, for example if the user presses Ctrl-C.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to be able to stop the Graph.
#[derive(Clone)]
pub struct CancellationToken {
    inner: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl CancellationToken {
    /// Create new cancellation token.
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Mark the token cancelled.
    pub fn cancel(&self) {
        self.inner.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Check if the token is cancelled.
    pub fn is_canceled(&self) -> bool {
        self.inner.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/* vim: textwidth=80
 */
