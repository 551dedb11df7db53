//! The messaging runtime: outbound batching, inbound dispatch, peer
//! lifecycle.
//!
//! Single-threaded and non-reentrant; the caller serializes all entry
//! points. Messages to the same peer under the same delivery class keep
//! submission order through batching and flush.

use std::any::TypeId;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use forgenet_core::{BufferError, ByteReader, ByteWriter};
use tracing::{debug, trace, warn};

use crate::delivery::{DeliveryClass, NON_FRAGMENTED_MAX_BATCH_BYTES};
use crate::hooks::MessagingHook;
use crate::message::{MessageDescriptor, NetMessage, NetworkContext, OwnerHandle};
use crate::registry::MessageRegistry;
use crate::transport::Transport;
use crate::wire::{BatchHeader, MessageHeader};
use crate::{MessagingError, PeerId};

/// Up-front allocation for batch and scratch writers; growth past this is
/// amortized up to the per-delivery ceiling.
const INITIAL_BATCH_CAPACITY: usize = NON_FRAGMENTED_MAX_BATCH_BYTES;

/// A partially filled outbound batch. Only the queue tail accepts
/// appends.
struct SendBatch {
    delivery: DeliveryClass,
    message_count: u16,
    writer: ByteWriter,
}

impl SendBatch {
    fn open(delivery: DeliveryClass) -> Self {
        let mut writer = ByteWriter::new(INITIAL_BATCH_CAPACITY, delivery.max_batch_bytes());
        // placeholder slot, back-patched with the real count at flush
        BatchHeader { message_count: 0 }
            .write_to(&mut writer)
            .expect("batch ceiling covers the header slot");
        Self {
            delivery,
            message_count: 0,
            writer,
        }
    }

    fn has_room_for(&self, payload_len: usize) -> bool {
        self.writer.remaining_capacity() >= MessageHeader::WIRE_SIZE + payload_len
    }

    fn append(&mut self, header: MessageHeader, payload: &[u8]) -> Result<(), BufferError> {
        self.writer
            .try_begin_write(MessageHeader::WIRE_SIZE + payload.len())?;
        header.write_to(&mut self.writer)?;
        self.writer.write_bytes(payload);
        self.message_count += 1;
        Ok(())
    }
}

/// A parsed inbound message awaiting dispatch. The reader owns the
/// payload copy; dropping the entry releases it.
struct InboundEntry {
    reader: ByteReader<'static>,
    header: MessageHeader,
    sender: PeerId,
    timestamp: f32,
}

/// Marshals typed messages to and from per-peer byte batches.
///
/// Built once with the full descriptor set; the registry is frozen
/// afterwards. Outbound messages accumulate in per-peer queues until
/// [`process_send_queues`](Self::process_send_queues); inbound blobs are
/// split and queued by
/// [`handle_incoming_data`](Self::handle_incoming_data) and dispatched by
/// [`process_incoming_message_queue`](Self::process_incoming_message_queue).
pub struct MessagingSystem<T: Transport> {
    registry: MessageRegistry,
    hooks: Vec<Box<dyn MessagingHook>>,
    owner: OwnerHandle,
    transport: T,
    local_peer_id: PeerId,
    inbound: VecDeque<InboundEntry>,
    send_queues: BTreeMap<PeerId, Vec<SendBatch>>,
}

impl<T: Transport> MessagingSystem<T> {
    /// Build the runtime, filtering and tag-assigning `descriptors`
    /// against `owner`.
    ///
    /// `canonical_owner` names the owner type under which unbound message
    /// types are admitted. Fails if the admitted set is structurally
    /// invalid; nothing is leaked on failure.
    pub fn new(
        owner: OwnerHandle,
        canonical_owner: TypeId,
        descriptors: Vec<MessageDescriptor>,
        transport: T,
    ) -> Result<Self, MessagingError> {
        let registry = MessageRegistry::build(descriptors, &owner, canonical_owner)?;
        Ok(Self {
            registry,
            hooks: Vec::new(),
            owner,
            transport,
            local_peer_id: 0,
            inbound: VecDeque::new(),
            send_queues: BTreeMap::new(),
        })
    }

    /// The frozen message registry.
    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Append an observer to the hook pipeline. Hooks run in
    /// registration order.
    pub fn register_hook(&mut self, hook: Box<dyn MessagingHook>) {
        self.hooks.push(hook);
    }

    /// Identity of the local endpoint. Not interpreted by the runtime;
    /// upper layers use it for self-addressing.
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Update the local endpoint identity.
    pub fn set_local_peer_id(&mut self, peer: PeerId) {
        self.local_peer_id = peer;
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether `peer` currently has a send queue.
    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.send_queues.contains_key(&peer)
    }

    /// Messages parsed but not yet dispatched.
    pub fn pending_inbound_messages(&self) -> usize {
        self.inbound.len()
    }

    /// Batches accumulated for `peer` since the last flush.
    pub fn pending_send_batches(&self, peer: PeerId) -> usize {
        self.send_queues.get(&peer).map_or(0, Vec::len)
    }

    /// Create `peer`'s send queue. Idempotent: reconnecting an already
    /// connected peer keeps its pending batches.
    pub fn client_connected(&mut self, peer: PeerId) {
        self.send_queues.entry(peer).or_default();
        debug!("peer {} connected", peer);
    }

    /// Discard `peer`'s pending batches without emission and remove its
    /// send queue.
    pub fn client_disconnected(&mut self, peer: PeerId) {
        if let Some(queue) = self.send_queues.remove(&peer) {
            debug!(
                "peer {} disconnected, discarding {} pending batches",
                peer,
                queue.len()
            );
        }
    }

    /// Discard all per-peer queues and the inbound queue. Idempotent;
    /// also runs on drop.
    pub fn shutdown(&mut self) {
        self.send_queues.clear();
        self.inbound.clear();
    }

    /// Parse one inbound blob into queued messages.
    ///
    /// `bytes` only has to live for this call: payloads are copied into
    /// owning readers for deferred dispatch. Malformed input is logged
    /// and discarded from the first bad record onward; messages parsed
    /// before that point stay queued.
    pub fn handle_incoming_data(&mut self, sender: PeerId, bytes: &[u8], receive_time: f32) {
        let mut reader = ByteReader::borrowed(bytes);
        let batch_header = match BatchHeader::read_from(&mut reader) {
            Ok(header) => header,
            Err(err) => {
                warn!("discarding inbound blob from peer {}: {}", sender, err);
                return;
            }
        };
        let expected = batch_header.message_count as usize;

        for hook in &mut self.hooks {
            hook.on_before_receive_batch(sender, expected, bytes.len());
        }

        for index in 0..expected {
            let header = match MessageHeader::read_from(&mut reader) {
                Ok(header) => header,
                Err(err) => {
                    warn!(
                        "truncated batch from peer {}: header of message {}/{}: {}",
                        sender, index, expected, err
                    );
                    break;
                }
            };
            let size = header.message_size as usize;
            if let Err(err) = reader.try_begin_read(size) {
                warn!(
                    "truncated batch from peer {}: payload of message {}/{}: {}",
                    sender, index, expected, err
                );
                break;
            }
            let owned = reader.to_owned_from_cursor(size);
            reader.skip(size);
            self.inbound.push_back(InboundEntry {
                reader: owned,
                header,
                sender,
                timestamp: receive_time,
            });
            trace!(
                "queued {} byte message with tag {} from peer {}",
                size,
                header.message_tag,
                sender
            );
        }

        for hook in &mut self.hooks {
            hook.on_after_receive_batch(sender, expected, bytes.len());
        }
    }

    /// Dispatch every queued inbound message, in arrival order.
    ///
    /// A failing or panicking handler is logged and skipped; the next
    /// message proceeds. Payload copies are released on every exit path.
    pub fn process_incoming_message_queue(&mut self) {
        while let Some(mut entry) = self.inbound.pop_front() {
            let tag = entry.header.message_tag;
            let (handler, type_id) = match (self.registry.handler(tag), self.registry.type_id(tag))
            {
                (Some(handler), Some(type_id)) => (handler, type_id),
                _ => {
                    warn!(
                        "dropping message with unknown tag {} from peer {}",
                        tag, entry.sender
                    );
                    continue;
                }
            };

            if !self.verify_can_receive(entry.sender, type_id) {
                continue;
            }

            let payload_len = entry.header.message_size as usize;
            for hook in &mut self.hooks {
                hook.on_before_receive_message(entry.sender, type_id, payload_len);
            }

            let ctx = NetworkContext {
                owner: &self.owner,
                sender_id: entry.sender,
                timestamp: entry.timestamp,
                header: entry.header,
            };
            match catch_unwind(AssertUnwindSafe(|| handler(&mut entry.reader, &ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    "handler for {} from peer {} failed: {:#}",
                    self.registry.type_name(tag).unwrap_or("<unknown>"),
                    entry.sender,
                    err
                ),
                Err(_) => warn!(
                    "handler for {} from peer {} panicked",
                    self.registry.type_name(tag).unwrap_or("<unknown>"),
                    entry.sender
                ),
            }

            for hook in &mut self.hooks {
                hook.on_after_receive_message(entry.sender, type_id, payload_len);
            }
        }
    }

    /// Serialize `message` once and append it to each recipient's send
    /// queue under `delivery`.
    ///
    /// Any iterable of peer ids works, a borrowed slice included.
    /// Unknown peers are logged and skipped; a `can_send` veto skips its
    /// peer silently. A payload too large for the delivery's batch
    /// ceiling fails with [`MessagingError::MessageTooLarge`] and nothing
    /// is enqueued — the runtime's only form of backpressure.
    pub fn send_message<M: NetMessage>(
        &mut self,
        message: &M,
        delivery: DeliveryClass,
        recipients: impl IntoIterator<Item = PeerId>,
    ) -> Result<(), MessagingError> {
        let type_id = TypeId::of::<M>();
        let type_name = std::any::type_name::<M>();
        let tag = self
            .registry
            .tag_of(type_id)
            .ok_or(MessagingError::UnregisteredMessageType(type_name))?;

        let max_batch_bytes = delivery.max_batch_bytes();
        let max_payload = max_batch_bytes - BatchHeader::WIRE_SIZE - MessageHeader::WIRE_SIZE;
        let mut scratch = ByteWriter::new(
            INITIAL_BATCH_CAPACITY - MessageHeader::WIRE_SIZE,
            max_payload,
        );
        if let Err(source) = message.serialize(&mut scratch) {
            // only a ceiling hit counts as backpressure
            if let Some(&BufferError::CeilingExceeded {
                requested, position, ..
            }) = source.downcast_ref::<BufferError>()
            {
                return Err(MessagingError::MessageTooLarge {
                    payload_len: position + requested,
                    max_payload,
                });
            }
            return Err(MessagingError::Serialization { type_name, source });
        }
        let payload = scratch.as_slice();
        let header = MessageHeader {
            message_size: payload.len() as u16,
            message_tag: tag,
        };

        for peer in recipients {
            if !self.send_queues.contains_key(&peer) {
                warn!("dropping {} for unknown peer {}", type_name, peer);
                continue;
            }
            if !self.verify_can_send(peer, type_id, delivery) {
                continue;
            }
            for hook in &mut self.hooks {
                hook.on_before_send_message(peer, type_id, delivery);
            }

            let Some(queue) = self.send_queues.get_mut(&peer) else {
                continue;
            };
            let tail_fits = queue
                .last()
                .is_some_and(|tail| tail.delivery == delivery && tail.has_room_for(payload.len()));
            if !tail_fits {
                queue.push(SendBatch::open(delivery));
            }
            let tail = queue.len() - 1;
            if let Err(err) = queue[tail].append(header, payload) {
                warn!("failed to append {} for peer {}: {}", type_name, peer, err);
                continue;
            }
            trace!(
                "queued {} byte {} for peer {}",
                payload.len(),
                type_name,
                peer
            );

            for hook in &mut self.hooks {
                hook.on_after_send_message(
                    peer,
                    type_id,
                    delivery,
                    MessageHeader::WIRE_SIZE + payload.len(),
                );
            }
        }

        Ok(())
    }

    /// Finalize and emit every pending batch, then clear the queues.
    ///
    /// Peers flush in ascending id order; each peer's batches flush in
    /// the order they were opened. A transport failure is logged and the
    /// flush continues with the next batch.
    pub fn process_send_queues(&mut self) {
        for (&peer, queue) in self.send_queues.iter_mut() {
            for mut batch in queue.drain(..) {
                if batch.message_count == 0 {
                    continue;
                }
                let batch_len = batch.writer.written();
                let message_count = batch.message_count as usize;

                for hook in &mut self.hooks {
                    hook.on_before_send_batch(peer, message_count, batch_len, batch.delivery);
                }

                batch.writer.seek(0);
                let header = BatchHeader {
                    message_count: batch.message_count,
                };
                if let Err(err) = header.write_to(&mut batch.writer) {
                    warn!("failed to finalize batch for peer {}: {}", peer, err);
                    continue;
                }

                trace!(
                    "sending {} byte batch of {} messages to peer {}",
                    batch_len,
                    message_count,
                    peer
                );
                if let Err(err) = self
                    .transport
                    .send(peer, batch.delivery, batch.writer.as_slice())
                {
                    warn!("transport send to peer {} failed: {:#}", peer, err);
                }

                for hook in &mut self.hooks {
                    hook.on_after_send_batch(peer, message_count, batch_len, batch.delivery);
                }
            }
        }
    }

    fn verify_can_send(&mut self, peer: PeerId, message_type: TypeId, delivery: DeliveryClass) -> bool {
        self.hooks
            .iter_mut()
            .all(|hook| hook.can_send(peer, message_type, delivery))
    }

    fn verify_can_receive(&mut self, sender: PeerId, message_type: TypeId) -> bool {
        self.hooks
            .iter_mut()
            .all(|hook| hook.can_receive(sender, message_type))
    }
}

impl<T: Transport> Drop for MessagingSystem<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
