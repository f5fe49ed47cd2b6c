//! Owner/group/other access evaluation.
//!
//! Pure functions over an already-fetched [`Metadata`] snapshot. What to do
//! when metadata cannot be fetched is the caller's decision; see
//! [`VirtualEntry::is_writable`](crate::entry::VirtualEntry::is_writable).

use crate::error::Access;
use crate::identity::Identity;
use crate::store::{AccessBits, Metadata};

/// How a requester relates to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Owner,
    Group,
    Other,
}

/// Owner if the names match, group member if the entry's group is one of
/// the identity's groups, other otherwise.
pub fn classify(identity: &Identity, meta: &Metadata) -> Class {
    if identity.name() == meta.owner {
        Class::Owner
    } else if identity.in_group(&meta.group) {
        Class::Group
    } else {
        Class::Other
    }
}

/// The permission triple that applies to `identity`.
pub fn bits_for(identity: &Identity, meta: &Metadata) -> (Class, AccessBits) {
    let class = classify(identity, meta);
    let bits = match class {
        Class::Owner => meta.permissions.owner,
        Class::Group => meta.permissions.group,
        Class::Other => meta.permissions.other,
    };
    (class, bits)
}

pub fn allows(identity: &Identity, meta: &Metadata, access: Access) -> bool {
    let (class, bits) = bits_for(identity, meta);
    let allowed = match access {
        Access::Read => bits.read,
        Access::Write => bits.write,
    };
    tracing::trace!(user = %identity.name(), ?class, %access, allowed, "permission check");
    allowed
}

pub fn can_read(identity: &Identity, meta: &Metadata) -> bool {
    allows(identity, meta, Access::Read)
}

pub fn can_write(identity: &Identity, meta: &Metadata) -> bool {
    allows(identity, meta, Access::Write)
}
