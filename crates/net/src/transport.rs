//! Transport seam: physical delivery of finalized batches.

use crate::delivery::DeliveryClass;
use crate::PeerId;

/// Sink for finalized outbound batches.
///
/// The payload slice is valid only for the duration of the call; a
/// transport that queues internally must copy. A send error is logged by
/// the runtime and does not abort the flush of other batches or peers —
/// reliability, where requested, is the transport's own job via the
/// delivery class.
pub trait Transport {
    /// Deliver one batch to `peer` under the given delivery class.
    fn send(&mut self, peer: PeerId, delivery: DeliveryClass, payload: &[u8])
        -> anyhow::Result<()>;
}
