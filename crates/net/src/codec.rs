//! Postcard bridging between serde payloads and the wire buffers.
//!
//! The message contract is byte-oriented; these helpers cover the common
//! case of a payload that is one serde value in postcard encoding.

use anyhow::{Context, Result};
use forgenet_core::{ByteReader, ByteWriter};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Append `value` at the writer cursor in postcard encoding.
pub fn write_postcard<T: Serialize>(writer: &mut ByteWriter, value: &T) -> Result<()> {
    let payload = postcard::to_allocvec(value).context("Failed to serialize payload")?;
    writer
        .try_begin_write(payload.len())
        .context("Payload does not fit the writer ceiling")?;
    writer.write_bytes(&payload);
    Ok(())
}

/// Decode a `T` at the reader cursor, advancing past the consumed bytes.
pub fn read_postcard<T: DeserializeOwned>(reader: &mut ByteReader<'_>) -> Result<T> {
    let (value, rest) = postcard::take_from_bytes(reader.remaining_slice())
        .context("Failed to deserialize payload")?;
    let consumed = reader.remaining() - rest.len();
    reader.try_begin_read(consumed)?;
    reader.skip(consumed);
    Ok(value)
}
