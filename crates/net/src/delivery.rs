//! Delivery classes handed through to the transport.
//!
//! The runtime does not implement reliability itself; a delivery class is
//! a label the transport interprets. The only distinction made here is
//! the per-batch size ceiling: fragmenting delivery raises it.

use serde::{Deserialize, Serialize};

/// Largest batch emitted on a non-fragmenting delivery, in bytes.
///
/// Sized to stay under a conservative path MTU so the transport never has
/// to split a batch it was told not to fragment.
pub const NON_FRAGMENTED_MAX_BATCH_BYTES: usize = 1300;

/// Largest batch emitted on a fragmenting delivery, in bytes.
pub const FRAGMENTED_MAX_BATCH_BYTES: usize = 64000;

/// Delivery class for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeliveryClass {
    /// Fire-and-forget datagrams.
    Unreliable = 0,
    /// Unreliable datagrams; the transport drops stale arrivals.
    UnreliableSequenced = 1,
    /// Guaranteed arrival, arbitrary order.
    Reliable = 2,
    /// Guaranteed arrival in send order.
    ReliableSequenced = 3,
    /// Guaranteed in-order arrival; the transport may fragment payloads.
    ReliableFragmentedSequenced = 4,
}

impl DeliveryClass {
    /// Check if this delivery class guarantees arrival.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            DeliveryClass::Reliable
                | DeliveryClass::ReliableSequenced
                | DeliveryClass::ReliableFragmentedSequenced
        )
    }

    /// Check if the transport may fragment batches of this class.
    pub fn is_fragmenting(self) -> bool {
        matches!(self, DeliveryClass::ReliableFragmentedSequenced)
    }

    /// Per-batch byte ceiling for this delivery class.
    pub fn max_batch_bytes(self) -> usize {
        if self.is_fragmenting() {
            FRAGMENTED_MAX_BATCH_BYTES
        } else {
            NON_FRAGMENTED_MAX_BATCH_BYTES
        }
    }
}

impl TryFrom<u8> for DeliveryClass {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeliveryClass::Unreliable),
            1 => Ok(DeliveryClass::UnreliableSequenced),
            2 => Ok(DeliveryClass::Reliable),
            3 => Ok(DeliveryClass::ReliableSequenced),
            4 => Ok(DeliveryClass::ReliableFragmentedSequenced),
            _ => Err(anyhow::anyhow!("Invalid delivery class: {}", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fragmenting_delivery_raises_the_ceiling() {
        for delivery in [
            DeliveryClass::Unreliable,
            DeliveryClass::UnreliableSequenced,
            DeliveryClass::Reliable,
            DeliveryClass::ReliableSequenced,
        ] {
            assert_eq!(delivery.max_batch_bytes(), NON_FRAGMENTED_MAX_BATCH_BYTES);
            assert!(!delivery.is_fragmenting());
        }
        assert_eq!(
            DeliveryClass::ReliableFragmentedSequenced.max_batch_bytes(),
            FRAGMENTED_MAX_BATCH_BYTES
        );
        assert!(DeliveryClass::ReliableFragmentedSequenced.is_fragmenting());
    }

    #[test]
    fn reliability_split() {
        assert!(!DeliveryClass::Unreliable.is_reliable());
        assert!(!DeliveryClass::UnreliableSequenced.is_reliable());
        assert!(DeliveryClass::Reliable.is_reliable());
        assert!(DeliveryClass::ReliableSequenced.is_reliable());
        assert!(DeliveryClass::ReliableFragmentedSequenced.is_reliable());
    }

    #[test]
    fn byte_tag_roundtrip() {
        for value in 0u8..=4 {
            let delivery = DeliveryClass::try_from(value).unwrap();
            assert_eq!(delivery as u8, value);
        }
        assert!(DeliveryClass::try_from(5).is_err());
    }
}
