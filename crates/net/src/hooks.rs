//! Observation hooks over the messaging lifecycle.

use std::any::TypeId;

use crate::delivery::DeliveryClass;
use crate::PeerId;

/// Observer invoked at messaging lifecycle points, with veto power over
/// traffic in either direction.
///
/// Every callback defaults to a no-op and both predicates default to
/// allow, so implementors override only what they watch. Hooks run in
/// registration order; predicates short-circuit on the first veto. Hooks
/// sit inside the trusted boundary: a panicking hook propagates to the
/// caller.
#[allow(unused_variables)]
pub trait MessagingHook {
    /// An inbound blob parsed its batch header and is about to be split
    /// into messages.
    fn on_before_receive_batch(&mut self, sender: PeerId, message_count: usize, batch_len: usize) {
    }

    /// An inbound blob finished splitting into queued messages.
    fn on_after_receive_batch(&mut self, sender: PeerId, message_count: usize, batch_len: usize) {}

    /// A queued message is about to be dispatched to its handler.
    fn on_before_receive_message(
        &mut self,
        sender: PeerId,
        message_type: TypeId,
        payload_len: usize,
    ) {
    }

    /// A queued message finished dispatch.
    fn on_after_receive_message(
        &mut self,
        sender: PeerId,
        message_type: TypeId,
        payload_len: usize,
    ) {
    }

    /// A message is about to be appended to `recipient`'s send queue.
    fn on_before_send_message(
        &mut self,
        recipient: PeerId,
        message_type: TypeId,
        delivery: DeliveryClass,
    ) {
    }

    /// A message was appended to `recipient`'s send queue.
    /// `bytes_written` covers the message header and the payload.
    fn on_after_send_message(
        &mut self,
        recipient: PeerId,
        message_type: TypeId,
        delivery: DeliveryClass,
        bytes_written: usize,
    ) {
    }

    /// A finalized batch is about to be handed to the transport.
    fn on_before_send_batch(
        &mut self,
        recipient: PeerId,
        message_count: usize,
        batch_len: usize,
        delivery: DeliveryClass,
    ) {
    }

    /// A finalized batch was handed to the transport.
    fn on_after_send_batch(
        &mut self,
        recipient: PeerId,
        message_count: usize,
        batch_len: usize,
        delivery: DeliveryClass,
    ) {
    }

    /// Veto outbound traffic. Returning `false` silently skips this
    /// recipient; other recipients of the same send are unaffected.
    fn can_send(
        &mut self,
        recipient: PeerId,
        message_type: TypeId,
        delivery: DeliveryClass,
    ) -> bool {
        true
    }

    /// Veto inbound dispatch. Returning `false` silently drops the
    /// queued message.
    fn can_receive(&mut self, sender: PeerId, message_type: TypeId) -> bool {
        true
    }
}
