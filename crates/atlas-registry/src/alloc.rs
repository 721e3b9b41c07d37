use atlas_types::{AssetId, Partition, ProjectInfo, TypeError, MAX_LOCAL_INDEX};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};

/// Mints dynamic identifiers for one session.
///
/// Each session reserves its own dynamic ordinal from [`ProjectInfo`] and
/// counts local indices up from 1 inside it. When the local range runs out
/// the next ordinal is reserved; when ordinals run out minting fails with
/// [`RegistryError::IdentifiersExhausted`]. Identifiers never wrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicIdAllocator {
    ordinal: u32,
    next_local: u64,
}

impl DynamicIdAllocator {
    /// Reserve a fresh dynamic ordinal.
    pub fn reserve(info: &mut ProjectInfo) -> RegistryResult<Self> {
        let ordinal = Self::mint(info)?;
        info!(ordinal, "reserved dynamic identifier range");
        Ok(Self {
            ordinal,
            next_local: 1,
        })
    }

    /// Continue an existing range.
    pub fn resume(ordinal: u32, next_local: u32) -> Self {
        Self {
            ordinal,
            next_local: next_local as u64,
        }
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    fn mint(info: &mut ProjectInfo) -> RegistryResult<u32> {
        info.mint_ordinal(Partition::Dynamic).map_err(|e| match e {
            TypeError::OrdinalsExhausted(_) | TypeError::OrdinalOutOfRange { .. } => {
                RegistryError::IdentifiersExhausted
            }
            other => RegistryError::Type(other),
        })
    }

    /// Mint the next dynamic identifier.
    pub fn next(&mut self, info: &mut ProjectInfo) -> RegistryResult<AssetId> {
        if self.next_local > MAX_LOCAL_INDEX as u64 {
            self.ordinal = Self::mint(info)?;
            self.next_local = 1;
            debug!(ordinal = self.ordinal, "dynamic range rolled over to a new ordinal");
        }
        let id = AssetId::dynamic_id(self.ordinal, self.next_local as u32)?;
        self.next_local += 1;
        Ok(id)
    }
}
