use std::fmt;

use atlas_types::Partition;
use serde::{Deserialize, Serialize};

/// Where an external library comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LibrarySource {
    /// A named library asset.
    Static { name: String },
    /// A numbered built-in library. The number is the ordinal.
    BuiltIn { number: u32 },
    /// The implicit library of one scene.
    Scene { name: String },
    /// An externally distributed archive.
    Bundle { path: String },
}

impl LibrarySource {
    pub fn partition(&self) -> Partition {
        match self {
            Self::Static { .. } => Partition::Static,
            Self::BuiltIn { .. } => Partition::BuiltIn,
            Self::Scene { .. } => Partition::Scene,
            Self::Bundle { .. } => Partition::Bundled,
        }
    }
}

impl fmt::Display for LibrarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { name } => write!(f, "static:{name}"),
            Self::BuiltIn { number } => write!(f, "builtin:{number}"),
            Self::Scene { name } => write!(f, "scene:{name}"),
            Self::Bundle { path } => write!(f, "bundle:{path}"),
        }
    }
}
