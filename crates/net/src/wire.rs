//! Fixed wire records framing batches and messages.
//!
//! Every transport blob is `BatchHeader | (MessageHeader | payload)*`.
//! Multibyte fields use native byte order: the wire runs peer-to-peer
//! between homogeneous endpoints of the same build.

use forgenet_core::{BufferError, ByteReader, ByteWriter};

use crate::MessageTag;

/// Leading record of every batch, carrying the message count.
///
/// Written at offset 0 of an outbound batch after the payloads are known
/// (the slot is reserved when the batch opens and back-patched at flush),
/// read first from every inbound blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    /// Number of `MessageHeader` records that follow.
    pub message_count: u16,
}

impl BatchHeader {
    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 2;

    /// Append this header at the writer cursor.
    pub fn write_to(&self, writer: &mut ByteWriter) -> Result<(), BufferError> {
        writer.try_begin_write(Self::WIRE_SIZE)?;
        writer.write_u16(self.message_count);
        Ok(())
    }

    /// Decode a header at the reader cursor.
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self, BufferError> {
        reader.try_begin_read(Self::WIRE_SIZE)?;
        Ok(Self {
            message_count: reader.read_u16(),
        })
    }
}

/// Per-message record preceding each payload within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Payload length in bytes, excluding this header.
    pub message_size: u16,
    /// Registry tag identifying the payload's message type.
    pub message_tag: MessageTag,
}

impl MessageHeader {
    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 3;

    /// Append this header at the writer cursor.
    pub fn write_to(&self, writer: &mut ByteWriter) -> Result<(), BufferError> {
        writer.try_begin_write(Self::WIRE_SIZE)?;
        writer.write_u16(self.message_size);
        writer.write_u8(self.message_tag);
        Ok(())
    }

    /// Decode a header at the reader cursor.
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self, BufferError> {
        reader.try_begin_read(Self::WIRE_SIZE)?;
        Ok(Self {
            message_size: reader.read_u16(),
            message_tag: reader.read_u8(),
        })
    }
}
