//! Progressive download
//!
//! Sources open a byte stream for a URL; the accumulator collects it into the
//! growing prefix the decoders work on.

pub mod accumulator;
pub mod source;

pub use accumulator::{ChunkAccumulator, ChunkEvent, DownloadProgress, DownloadSession};
pub use source::{ByteSource, FileSource, HttpSource, OpenedStream, RoutingSource};
