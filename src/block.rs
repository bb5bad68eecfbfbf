/*! Block implementation.

Blocks are the main building blocks of a pipeline. They each do one
thing, and you connect them together with streams to process the data.
*/

use crate::Result;

/** Return type for all blocks.

This lets the scheduler know whether the block did anything, and whether
it could ever do anything again.
*/
#[derive(Debug)]
pub enum BlockRet {
    /// The normal return. The block consumed and/or produced something.
    Ok,

    /// Produced nothing, because not enough input.
    Noop,

    /// Block indicates that it will never produce more output.
    ///
    /// Examples:
    /// * reading from a pipe, and the pipe reached EOF.
    /// * all upstream blocks are done and the input stream is drained.
    EOF,
}

/**
Block trait, that must be implemented for all blocks.
*/
pub trait Block {
    /** Name of block.

    Not name of *instance* of block. But it may include the
    type. E.g. `ReaderSource<Complex>`.
     */
    fn block_name(&self) -> &'static str;

    /** Block work function.

    Consuming data from an input stream involves first reading it, and
    then consuming from the stream. If `consume()` is not called, the
    same data will be read again on the next call.

    A block that reaches its terminal state must close its output
    stream before returning `EOF`, so that downstream blocks can drain
    and finish too.
     */
    fn work(&mut self) -> Result<BlockRet>;
}
