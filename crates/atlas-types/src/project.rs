use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{Partition, MAX_ORDINAL};

/// Session metadata persisted per project.
///
/// Holds one ordinal counter per partition the project mints ordinals for.
/// Built-in ordinals are the library number and are never minted here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_write: DateTime<Utc>,
    pub next_static_ordinal: u32,
    pub next_dynamic_ordinal: u32,
    pub next_scene_ordinal: u32,
    pub next_bundle_ordinal: u32,
}

impl ProjectInfo {
    /// Fresh metadata. Ordinal 0 is never handed out, so every counter starts
    /// at 1.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created_at: now,
            last_write: now,
            next_static_ordinal: 1,
            next_dynamic_ordinal: 1,
            next_scene_ordinal: 1,
            next_bundle_ordinal: 1,
        }
    }

    pub fn touch(&mut self) {
        self.last_write = Utc::now();
    }

    fn counter_mut(&mut self, partition: Partition) -> Result<&mut u32, TypeError> {
        match partition {
            Partition::Static => Ok(&mut self.next_static_ordinal),
            Partition::Dynamic => Ok(&mut self.next_dynamic_ordinal),
            Partition::Scene => Ok(&mut self.next_scene_ordinal),
            Partition::Bundled => Ok(&mut self.next_bundle_ordinal),
            Partition::BuiltIn => Err(TypeError::NotMintable(partition)),
        }
    }

    /// The ordinal [`ProjectInfo::mint_ordinal`] would return next.
    pub fn peek_ordinal(&self, partition: Partition) -> Result<u32, TypeError> {
        match partition {
            Partition::Static => Ok(self.next_static_ordinal),
            Partition::Dynamic => Ok(self.next_dynamic_ordinal),
            Partition::Scene => Ok(self.next_scene_ordinal),
            Partition::Bundled => Ok(self.next_bundle_ordinal),
            Partition::BuiltIn => Err(TypeError::NotMintable(partition)),
        }
    }

    /// Reserve the next ordinal of `partition`.
    pub fn mint_ordinal(&mut self, partition: Partition) -> Result<u32, TypeError> {
        let counter = self.counter_mut(partition)?;
        if *counter > MAX_ORDINAL {
            return Err(TypeError::OrdinalsExhausted(partition));
        }
        let ordinal = *counter;
        *counter += 1;
        Ok(ordinal)
    }
}
