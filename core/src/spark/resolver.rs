//! Resolution of weak references (links and addresses) into blocks.
//!
//! Lookups never fail: a missing or mismatched target is `None`.

use super::block_types::BlockOrIntfType;
use super::repository::BlockRepository;
use super::types::{Block, BlockAddress, BlockFieldAddress, FieldValue, Link};

/// Anything that points at a block by id
pub trait BlockReference {
    fn ref_id(&self) -> Option<&str>;

    fn ref_service(&self) -> Option<&str> {
        None
    }

    fn ref_type(&self) -> Option<&BlockOrIntfType> {
        None
    }
}

impl BlockReference for Link {
    fn ref_id(&self) -> Option<&str> {
        self.target()
    }

    fn ref_type(&self) -> Option<&BlockOrIntfType> {
        self.link_type.as_ref()
    }
}

impl BlockReference for BlockAddress {
    fn ref_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn ref_service(&self) -> Option<&str> {
        self.service_id.as_deref().filter(|s| !s.is_empty())
    }

    fn ref_type(&self) -> Option<&BlockOrIntfType> {
        self.block_type.as_ref()
    }
}

impl BlockReference for BlockFieldAddress {
    fn ref_id(&self) -> Option<&str> {
        self.address.ref_id()
    }

    fn ref_service(&self) -> Option<&str> {
        self.address.ref_service()
    }

    fn ref_type(&self) -> Option<&BlockOrIntfType> {
        self.address.ref_type()
    }
}

impl BlockReference for Block {
    fn ref_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn ref_service(&self) -> Option<&str> {
        Some(self.service_id.as_str()).filter(|s| !s.is_empty())
    }
}

fn matches<R: BlockReference + ?Sized>(block: &Block, reference: &R) -> bool {
    reference
        .ref_type()
        .map_or(true, |constraint| block.block_type.satisfies(constraint))
}

impl BlockRepository {
    /// Persistent collection first, then volatile, honoring type and service.
    pub fn resolve<R: BlockReference + ?Sized>(&self, reference: &R) -> Option<&Block> {
        let id = reference.ref_id()?;
        if reference
            .ref_service()
            .is_some_and(|service| service != self.service_id())
        {
            return None;
        }
        self.blocks()
            .iter()
            .find(|b| b.id == id && matches(b, reference))
            .or_else(|| {
                self.volatile_blocks()
                    .iter()
                    .find(|b| b.id == id && matches(b, reference))
            })
    }

    /// Set id that resolves to nothing: a dangling reference
    pub fn is_broken<R: BlockReference + ?Sized>(&self, reference: &R) -> bool {
        reference.ref_id().is_some() && self.resolve(reference).is_none()
    }

    pub fn field_by_address(&self, addr: &BlockFieldAddress) -> Option<&FieldValue> {
        let field = addr.field.as_deref()?;
        self.resolve(addr)?.data.get(field)
    }
}
