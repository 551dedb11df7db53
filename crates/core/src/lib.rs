#![warn(missing_docs)]
//! Shared primitives for the forgenet runtime.

mod buffer;

pub use buffer::{BufferError, ByteReader, ByteWriter};
