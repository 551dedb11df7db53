//! Application message contract and owner binding.

use std::any::{Any, TypeId};
use std::rc::Rc;

use forgenet_core::{ByteReader, ByteWriter};

use crate::wire::MessageHeader;
use crate::PeerId;

/// Handler entrypoint bound for each admitted message type.
///
/// Bound eagerly at registry build time as a plain function pointer, so
/// dispatch is a single table index with no per-message lookup.
pub type MessageHandlerFn =
    fn(&mut ByteReader<'_>, &NetworkContext<'_>) -> anyhow::Result<()>;

/// Context handed to message handlers during dispatch.
pub struct NetworkContext<'a> {
    /// Application state handle the runtime was built with.
    pub owner: &'a OwnerHandle,
    /// Peer the message arrived from.
    pub sender_id: PeerId,
    /// Receive timestamp in seconds, as supplied to
    /// [`handle_incoming_data`](crate::MessagingSystem::handle_incoming_data).
    pub timestamp: f32,
    /// Wire header of the message being dispatched.
    pub header: MessageHeader,
}

/// Opaque handle to the application object that owns the runtime.
///
/// Placed in every [`NetworkContext`] so handlers can locate application
/// state by downcasting. Clones share the underlying value. The handle is
/// single-threaded, like the runtime that carries it.
#[derive(Clone)]
pub struct OwnerHandle {
    value: Option<Rc<dyn Any>>,
}

impl OwnerHandle {
    /// Wrap an owning application value.
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Some(Rc::new(value)),
        }
    }

    /// The null owner: no application state attached.
    pub fn detached() -> Self {
        Self { value: None }
    }

    /// Whether this is the null owner.
    pub fn is_detached(&self) -> bool {
        self.value.is_none()
    }

    /// Runtime type of the held value, if any.
    pub fn type_key(&self) -> Option<TypeId> {
        self.value.as_deref().map(|value| value.type_id())
    }

    /// Borrow the held value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|value| value.downcast_ref())
    }
}

/// Owner-binding annotation of a message type, resolved against the
/// owner's runtime type at registry build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerBinding {
    /// No explicit binding: admitted only when the owner is the canonical
    /// runtime owner type.
    DefaultOwner,
    /// Admitted when the owner's type appears in the set. A `None` entry
    /// matches the detached owner.
    BoundTo(Vec<Option<TypeId>>),
}

/// Contract every application message type implements.
///
/// `serialize` appends the payload bytes to a writer whose ceiling is the
/// per-delivery payload bound; `receive` is the static entrypoint invoked
/// when a payload of this type is dispatched. The payload format is the
/// message type's own business — raw field writes and the
/// [`codec`](crate::write_postcard) helpers are both fine.
pub trait NetMessage: 'static {
    /// Append this message's payload at the writer cursor.
    fn serialize(&self, writer: &mut ByteWriter) -> anyhow::Result<()>;

    /// Consume one payload of this type.
    ///
    /// The reader owns exactly the payload bytes. Errors are logged by
    /// the dispatcher and never stall the queue.
    fn receive(reader: &mut ByteReader<'_>, ctx: &NetworkContext<'_>) -> anyhow::Result<()>;

    /// Owner types this message is bound to.
    fn owner_binding() -> OwnerBinding {
        OwnerBinding::DefaultOwner
    }
}

/// Construction-time description of one message type.
///
/// The descriptor set supplied to the runtime is the explicit enumeration
/// of candidate types; admission and tag assignment happen at build time.
pub struct MessageDescriptor {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) binding: OwnerBinding,
    pub(crate) handler: MessageHandlerFn,
}

impl MessageDescriptor {
    /// Describe `M` for registration.
    pub fn of<M: NetMessage>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            binding: M::owner_binding(),
            handler: M::receive,
        }
    }

    /// Fully qualified name of the described type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Identity of the described type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}
