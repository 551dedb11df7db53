#![warn(missing_docs)]
//! Typed message batching over an abstract peer transport.
//!
//! Application message types register with a [`MessagingSystem`], which
//! assigns each a compact wire tag, packs outbound messages into
//! per-peer, per-delivery batches, and parses inbound batches back into
//! deferred handler dispatches. Physical delivery is behind the
//! [`Transport`] trait; reliability and ordering are the transport's
//! business, selected per message via [`DeliveryClass`].

mod codec;
mod delivery;
mod hooks;
mod message;
mod registry;
mod system;
mod transport;
mod wire;

pub use codec::{read_postcard, write_postcard};
pub use delivery::{DeliveryClass, FRAGMENTED_MAX_BATCH_BYTES, NON_FRAGMENTED_MAX_BATCH_BYTES};
pub use hooks::MessagingHook;
pub use message::{
    MessageDescriptor, MessageHandlerFn, NetMessage, NetworkContext, OwnerBinding, OwnerHandle,
};
pub use registry::{MessageRegistry, MAX_MESSAGE_TYPES};
pub use system::MessagingSystem;
pub use transport::Transport;
pub use wire::{BatchHeader, MessageHeader};

pub use forgenet_core::{BufferError, ByteReader, ByteWriter};

use thiserror::Error;

/// Identifier of a remote endpoint.
pub type PeerId = u64;

/// Compact wire identifier assigned to each admitted message type.
pub type MessageTag = u8;

/// Errors surfaced by registry construction and the send path.
///
/// Malformed inbound data never surfaces here: the receive path logs a
/// warning and keeps going, so one peer's garbage cannot take the
/// runtime down.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The same message type appeared more than once in the descriptor set.
    #[error("message type {0} registered more than once")]
    DuplicateMessageType(&'static str),

    /// More admitted message types than the one-byte tag space can hold.
    #[error("{0} message types exceed the {MAX_MESSAGE_TYPES}-type tag space")]
    TooManyMessageTypes(usize),

    /// A send was attempted for a type the registry never admitted.
    #[error("message type {0} is not registered")]
    UnregisteredMessageType(&'static str),

    /// The serialized payload cannot fit any batch of the requested
    /// delivery class. Nothing is enqueued — this is the runtime's only
    /// form of backpressure.
    #[error("payload of {payload_len} bytes exceeds the {max_payload} byte payload ceiling")]
    MessageTooLarge {
        /// Payload bytes the message attempted to serialize.
        payload_len: usize,
        /// Largest payload the requested delivery class can carry.
        max_payload: usize,
    },

    /// The message's own serializer failed for a reason other than the
    /// payload ceiling.
    #[error("failed to serialize message {type_name}")]
    Serialization {
        /// Fully qualified name of the message type.
        type_name: &'static str,
        /// Underlying serialization failure.
        #[source]
        source: anyhow::Error,
    },
}
