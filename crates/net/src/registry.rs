//! Message type registry: owner filtering, tag assignment, dispatch tables.
//!
//! Admitted types are sorted by fully qualified name (byte-ordinal) before
//! tags are assigned, so the type-to-tag map is stable across process
//! restarts given the same admitted set.

use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::message::{MessageDescriptor, MessageHandlerFn, OwnerBinding, OwnerHandle};
use crate::{MessageTag, MessagingError};

/// Maximum number of distinct admitted message types (tags are one byte).
pub const MAX_MESSAGE_TYPES: usize = 255;

/// Immutable dispatch tables built once at runtime construction.
///
/// Tags index three parallel tables (handler, type identity, type name),
/// keeping dispatch to a bound check and two loads.
pub struct MessageRegistry {
    handlers: Vec<MessageHandlerFn>,
    type_ids: Vec<TypeId>,
    type_names: Vec<&'static str>,
    tags: HashMap<TypeId, MessageTag>,
    schema_hash: u64,
}

impl MessageRegistry {
    pub(crate) fn build(
        mut descriptors: Vec<MessageDescriptor>,
        owner: &OwnerHandle,
        canonical_owner: TypeId,
    ) -> Result<Self, MessagingError> {
        descriptors.retain(|descriptor| admitted(&descriptor.binding, owner, canonical_owner));
        descriptors.sort_by(|a, b| a.type_name.as_bytes().cmp(b.type_name.as_bytes()));

        if descriptors.len() > MAX_MESSAGE_TYPES {
            return Err(MessagingError::TooManyMessageTypes(descriptors.len()));
        }

        let mut handlers = Vec::with_capacity(descriptors.len());
        let mut type_ids = Vec::with_capacity(descriptors.len());
        let mut type_names = Vec::with_capacity(descriptors.len());
        let mut tags = HashMap::with_capacity(descriptors.len());
        let mut hasher = blake3::Hasher::new();

        for (tag, descriptor) in descriptors.iter().enumerate() {
            let tag = tag as MessageTag;
            if tags.insert(descriptor.type_id, tag).is_some() {
                return Err(MessagingError::DuplicateMessageType(descriptor.type_name));
            }
            handlers.push(descriptor.handler);
            type_ids.push(descriptor.type_id);
            type_names.push(descriptor.type_name);
            hasher.update(descriptor.type_name.as_bytes());
            hasher.update(&[tag]);
        }

        let hash = hasher.finalize();
        let schema_hash = u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap());

        debug!(
            "message registry built: {} types, schema hash {:016x}",
            handlers.len(),
            schema_hash
        );

        Ok(Self {
            handlers,
            type_ids,
            type_names,
            tags,
            schema_hash,
        })
    }

    /// Number of admitted message types.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no message types were admitted.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Tag assigned to `type_id`, if it was admitted.
    pub fn tag_of(&self, type_id: TypeId) -> Option<MessageTag> {
        self.tags.get(&type_id).copied()
    }

    /// Handler bound to `tag`.
    pub fn handler(&self, tag: MessageTag) -> Option<MessageHandlerFn> {
        self.handlers.get(tag as usize).copied()
    }

    /// Type identity behind `tag`.
    pub fn type_id(&self, tag: MessageTag) -> Option<TypeId> {
        self.type_ids.get(tag as usize).copied()
    }

    /// Fully qualified name behind `tag`.
    pub fn type_name(&self, tag: MessageTag) -> Option<&'static str> {
        self.type_names.get(tag as usize).copied()
    }

    /// Hash over the admitted name-to-tag assignment.
    ///
    /// Two endpoints with the same admitted set agree on this value;
    /// exchange it at handshake time to reject incompatible builds.
    pub fn schema_hash(&self) -> u64 {
        self.schema_hash
    }
}

fn admitted(binding: &OwnerBinding, owner: &OwnerHandle, canonical_owner: TypeId) -> bool {
    match binding {
        OwnerBinding::DefaultOwner => owner.type_key() == Some(canonical_owner),
        OwnerBinding::BoundTo(owner_types) => owner_types.contains(&owner.type_key()),
    }
}
