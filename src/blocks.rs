//! Sugar re-export of all blocks.
pub use crate::doppler_correct::DopplerCorrect;
pub use crate::reader_source::ReaderSource;
pub use crate::swap_iq::SwapIq;
pub use crate::vector_sink::VectorSink;
pub use crate::vector_source::VectorSource;
pub use crate::writer_sink::WriterSink;
