//! Partitioned 64-bit asset identifiers.
//!
//! u64 layout, most significant bits first:
//! `[4 bits partition tag][28 bits ordinal][32 bits local index]`.
//! Tag 0 is reserved for [`AssetId::NULL`]. Everything is recovered with
//! shifts and masks; no table lookup is involved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const PARTITION_SHIFT: u32 = 60;
const ORDINAL_SHIFT: u32 = 32;
const ORDINAL_MASK: u64 = 0x0FFF_FFFF;
const LOCAL_MASK: u64 = 0xFFFF_FFFF;

/// Largest ordinal a partition can hold (28 bits).
pub const MAX_ORDINAL: u32 = ORDINAL_MASK as u32;

/// Largest local index inside one library (32 bits).
pub const MAX_LOCAL_INDEX: u32 = u32::MAX;

/// The identifier ranges an [`AssetId`] can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Partition {
    /// Recoverable purely from a named library asset.
    Static,
    /// Minted at runtime for objects not backed by a library.
    Dynamic,
    /// Per-scene implicit library of dependencies.
    Scene,
    /// Numbered built-in libraries.
    BuiltIn,
    /// Externally distributed archives; ordinal assigned on first import.
    Bundled,
}

impl Partition {
    pub const ALL: [Partition; 5] = [
        Self::Static,
        Self::Dynamic,
        Self::Scene,
        Self::BuiltIn,
        Self::Bundled,
    ];

    const fn tag(self) -> u64 {
        match self {
            Self::Static => 1,
            Self::Dynamic => 2,
            Self::Scene => 3,
            Self::BuiltIn => 4,
            Self::Bundled => 5,
        }
    }

    const fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::Static),
            2 => Some(Self::Dynamic),
            3 => Some(Self::Scene),
            4 => Some(Self::BuiltIn),
            5 => Some(Self::Bundled),
            _ => None,
        }
    }

    /// Objects in every partition except [`Partition::Dynamic`] are owned by
    /// the library that supplied them, never by the session.
    pub const fn is_library_owned(self) -> bool {
        !matches!(self, Self::Dynamic)
    }

    /// Prefix of the key/value entry holding a library's identifier table.
    pub const fn table_prefix(self) -> &'static str {
        match self {
            Self::Static => "AssetLibrary",
            Self::Dynamic => "DynamicLibrary",
            Self::Scene => "SceneLibrary",
            Self::BuiltIn => "BuiltinLibrary",
            Self::Bundled => "BundleLibrary",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
            Self::Scene => write!(f, "scene"),
            Self::BuiltIn => write!(f, "builtin"),
            Self::Bundled => write!(f, "bundled"),
        }
    }
}

/// Stable identifier of a persisted object (the session-wide `TID`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AssetId(u64);

impl AssetId {
    /// The null identifier. Stands for "no object".
    pub const NULL: Self = Self(0);

    /// Compose an identifier from its parts.
    pub fn new(partition: Partition, ordinal: u32, local_index: u32) -> Result<Self, TypeError> {
        if ordinal > MAX_ORDINAL {
            return Err(TypeError::OrdinalOutOfRange { ordinal });
        }
        Ok(Self(
            (partition.tag() << PARTITION_SHIFT)
                | ((ordinal as u64) << ORDINAL_SHIFT)
                | local_index as u64,
        ))
    }

    pub fn static_id(ordinal: u32, local_index: u32) -> Result<Self, TypeError> {
        Self::new(Partition::Static, ordinal, local_index)
    }

    pub fn dynamic_id(ordinal: u32, local_index: u32) -> Result<Self, TypeError> {
        Self::new(Partition::Dynamic, ordinal, local_index)
    }

    pub fn scene_id(ordinal: u32, local_index: u32) -> Result<Self, TypeError> {
        Self::new(Partition::Scene, ordinal, local_index)
    }

    pub fn builtin_id(ordinal: u32, local_index: u32) -> Result<Self, TypeError> {
        Self::new(Partition::BuiltIn, ordinal, local_index)
    }

    pub fn bundled_id(ordinal: u32, local_index: u32) -> Result<Self, TypeError> {
        Self::new(Partition::Bundled, ordinal, local_index)
    }

    #[inline]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The partition, or `None` for null and malformed identifiers.
    #[inline]
    pub const fn partition(self) -> Option<Partition> {
        Partition::from_tag(self.0 >> PARTITION_SHIFT)
    }

    #[inline]
    pub const fn ordinal(self) -> u32 {
        ((self.0 >> ORDINAL_SHIFT) & ORDINAL_MASK) as u32
    }

    #[inline]
    pub const fn local_index(self) -> u32 {
        (self.0 & LOCAL_MASK) as u32
    }

    /// The library this identifier belongs to.
    pub fn library(self) -> Option<LibraryRef> {
        self.partition().map(|partition| LibraryRef {
            partition,
            ordinal: self.ordinal(),
        })
    }

    pub fn is_static(self) -> bool {
        self.partition() == Some(Partition::Static)
    }

    pub fn is_dynamic(self) -> bool {
        self.partition() == Some(Partition::Dynamic)
    }

    pub fn is_scene(self) -> bool {
        self.partition() == Some(Partition::Scene)
    }

    pub fn is_builtin(self) -> bool {
        self.partition() == Some(Partition::BuiltIn)
    }

    pub fn is_bundled(self) -> bool {
        self.partition() == Some(Partition::Bundled)
    }

    /// Returns `true` if a library, not the session, owns the object.
    pub fn is_library_owned(self) -> bool {
        self.partition().is_some_and(Partition::is_library_owned)
    }

    /// Fixed-width lowercase hex (16 characters).
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({self})")
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.partition() {
            _ if self.is_null() => write!(f, "null"),
            Some(p) => write!(f, "{p}:{}:{}", self.ordinal(), self.local_index()),
            None => write!(f, "invalid:{}", self.to_hex()),
        }
    }
}

impl FromStr for AssetId {
    type Err = TypeError;

    /// Parse a hex string (up to 16 characters, optional `0x` prefix).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| TypeError::InvalidHex(format!("{s}: {e}")))
    }
}

/// One external library: a partition and the library's ordinal within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryRef {
    pub partition: Partition,
    pub ordinal: u32,
}

impl LibraryRef {
    pub fn new(partition: Partition, ordinal: u32) -> Self {
        Self { partition, ordinal }
    }

    /// Identifier of the object at `local_index` inside this library.
    pub fn id(&self, local_index: u32) -> Result<AssetId, TypeError> {
        AssetId::new(self.partition, self.ordinal, local_index)
    }

    /// Key of the persisted identifier table, e.g. `AssetLibrary_3`.
    pub fn table_key(&self) -> String {
        format!("{}_{}", self.partition.table_prefix(), self.ordinal)
    }
}

impl fmt::Display for LibraryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.partition, self.ordinal)
    }
}
