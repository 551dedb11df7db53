//! Fuzz-style property tests for inbound batch parsing.
//!
//! These tests validate that the inbound path handles arbitrary network
//! input gracefully without crashing.

use std::any::TypeId;
use std::cell::RefCell;

use forgenet_net::{
    BatchHeader, ByteReader, ByteWriter, DeliveryClass, MessageDescriptor, MessageHeader,
    MessagingSystem, NetMessage, NetworkContext, OwnerHandle, PeerId, Transport,
};
use proptest::prelude::*;

#[derive(Default)]
struct Counters {
    dispatched: RefCell<usize>,
}

#[derive(Default)]
struct NullTransport;

impl Transport for NullTransport {
    fn send(
        &mut self,
        _peer: PeerId,
        _delivery: DeliveryClass,
        _payload: &[u8],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Ping {
    nonce: u32,
}

impl NetMessage for Ping {
    fn serialize(&self, writer: &mut ByteWriter) -> anyhow::Result<()> {
        writer.try_begin_write(4)?;
        writer.write_u32(self.nonce);
        Ok(())
    }

    fn receive(reader: &mut ByteReader<'_>, ctx: &NetworkContext<'_>) -> anyhow::Result<()> {
        reader.try_begin_read(4)?;
        let _nonce = reader.read_u32();
        if let Some(counters) = ctx.owner.downcast_ref::<Counters>() {
            *counters.dispatched.borrow_mut() += 1;
        }
        Ok(())
    }
}

fn harness() -> (MessagingSystem<NullTransport>, OwnerHandle) {
    let owner = OwnerHandle::new(Counters::default());
    let system = MessagingSystem::new(
        owner.clone(),
        TypeId::of::<Counters>(),
        vec![MessageDescriptor::of::<Ping>()],
        NullTransport,
    )
    .expect("registry builds");
    (system, owner)
}

fn dispatched(owner: &OwnerHandle) -> usize {
    *owner
        .downcast_ref::<Counters>()
        .expect("owner holds counters")
        .dispatched
        .borrow()
}

/// A well-formed three-ping batch for truncation tests.
fn three_ping_blob(tag: u8) -> Vec<u8> {
    let mut blob = ByteWriter::new(64, 64);
    BatchHeader { message_count: 3 }.write_to(&mut blob).unwrap();
    for nonce in [10u32, 20, 30] {
        MessageHeader {
            message_size: 4,
            message_tag: tag,
        }
        .write_to(&mut blob)
        .unwrap();
        blob.try_begin_write(4).unwrap();
        blob.write_u32(nonce);
    }
    blob.as_slice().to_vec()
}

proptest! {
    /// Property: Arbitrary bytes don't crash the inbound path
    #[test]
    fn arbitrary_bytes_dont_crash(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let (mut system, _owner) = harness();
        system.client_connected(1);
        system.handle_incoming_data(1, &random_bytes, 0.0);
        system.process_incoming_message_queue();
        prop_assert_eq!(system.pending_inbound_messages(), 0);
    }

    /// Property: Truncated batches dispatch a prefix and never crash
    #[test]
    fn truncated_batches_dispatch_a_prefix(
        truncate_at in 0usize..32,
    ) {
        let (mut system, owner) = harness();
        system.client_connected(1);
        let tag = system
            .registry()
            .tag_of(TypeId::of::<Ping>())
            .expect("ping is registered");
        let blob = three_ping_blob(tag);

        let cut = truncate_at.min(blob.len());
        system.handle_incoming_data(1, &blob[..cut], 0.0);
        system.process_incoming_message_queue();

        prop_assert!(dispatched(&owner) <= 3);
        prop_assert_eq!(system.pending_inbound_messages(), 0);
    }

    /// Property: Oversized declared counts are handled gracefully
    #[test]
    fn oversized_declared_count_handled(
        declared in 1u16..,
    ) {
        let (mut system, owner) = harness();
        system.client_connected(1);

        let mut blob = ByteWriter::new(8, 8);
        BatchHeader { message_count: declared }.write_to(&mut blob).unwrap();
        system.handle_incoming_data(1, blob.as_slice(), 0.0);
        system.process_incoming_message_queue();

        prop_assert_eq!(dispatched(&owner), 0);
    }

    /// Property: Declared sizes beyond the buffer don't read past the end
    #[test]
    fn declared_size_beyond_buffer_handled(
        declared_size in 5u16..,
        actual in prop::collection::vec(any::<u8>(), 0..4),
    ) {
        let (mut system, owner) = harness();
        system.client_connected(1);
        let tag = system
            .registry()
            .tag_of(TypeId::of::<Ping>())
            .expect("ping is registered");

        let mut blob = ByteWriter::new(64, 64);
        BatchHeader { message_count: 1 }.write_to(&mut blob).unwrap();
        MessageHeader {
            message_size: declared_size,
            message_tag: tag,
        }
        .write_to(&mut blob)
        .unwrap();
        blob.try_begin_write(actual.len()).unwrap();
        blob.write_bytes(&actual);

        system.handle_incoming_data(1, blob.as_slice(), 0.0);
        system.process_incoming_message_queue();

        prop_assert_eq!(dispatched(&owner), 0);
        prop_assert_eq!(system.pending_inbound_messages(), 0);
    }

    /// Property: Well-formed batches always dispatch every message
    #[test]
    fn well_formed_batches_dispatch_everything(
        nonces in prop::collection::vec(any::<u32>(), 1..50),
    ) {
        let (mut system, owner) = harness();
        system.client_connected(1);

        let mut blob = ByteWriter::new(64, 4096);
        BatchHeader { message_count: nonces.len() as u16 }
            .write_to(&mut blob)
            .unwrap();
        let tag = system
            .registry()
            .tag_of(TypeId::of::<Ping>())
            .expect("ping is registered");
        for nonce in &nonces {
            MessageHeader {
                message_size: 4,
                message_tag: tag,
            }
            .write_to(&mut blob)
            .unwrap();
            blob.try_begin_write(4).unwrap();
            blob.write_u32(*nonce);
        }

        system.handle_incoming_data(1, blob.as_slice(), 0.0);
        system.process_incoming_message_queue();

        prop_assert_eq!(dispatched(&owner), nonces.len());
    }
}
