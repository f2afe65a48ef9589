//! Domain models for raw chain data and normalized events.
//!
//! Raw models ([`Block`], [`EventRecord`], [`ChainExtrinsic`]) are ephemeral
//! snapshots built by the subscriber and poller. Normalized models live in
//! [`events`] and are what handlers receive.

use serde::{Deserialize, Serialize};

mod entity;
mod events;

pub use entity::*;
pub use events::*;

// =============================================================================
// 32-byte Hash Types
// =============================================================================

/// Macro to generate 32-byte hash newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `is_zero()` - Whether every byte is zero
/// - `Display` trait implementation
/// - `From<[u8; 32]>` implementation
macro_rules! hash32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Whether this is the all-zero sentinel.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hash32_newtype!(
    /// 32-byte block hash (Blake2-256).
    ///
    /// Nodes answer block-hash-by-number lookups for pruned blocks with the
    /// zero hash, see [`BlockHash::is_zero`].
    BlockHash
);

// =============================================================================
// Block & Chain Data
// =============================================================================

/// Block header fields needed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Block number (height).
    pub number: u64,
    /// Block hash.
    pub hash: BlockHash,
}

/// Runtime spec version: `(spec_name, spec_version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeVersion {
    /// Spec name, e.g. "edgeware".
    pub spec_name: String,
    /// Spec version number.
    pub spec_version: u32,
}

/// Phase of block execution an event was emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Emitted while applying the extrinsic at this index.
    ApplyExtrinsic(u32),
    /// Emitted during block finalization.
    Finalization,
    /// Emitted during block initialization.
    Initialization,
}

/// A decoded runtime event.
///
/// `section` is the lower camel case pallet name (`staking`,
/// `technicalCommittee`) and `method` the event variant name (`Slash`).
/// `data` holds the positional event arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub section: String,
    pub method: String,
    pub data: Vec<serde_json::Value>,
}

impl ChainEvent {
    /// Whether this event is `section.method`.
    pub fn is(&self, section: &str, method: &str) -> bool {
        self.section == section && self.method == method
    }
}

/// An event together with the phase it was emitted in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: ChainEvent,
    pub phase: Phase,
}

impl EventRecord {
    /// Index of the extrinsic this event belongs to, if any.
    pub fn extrinsic_index(&self) -> Option<u32> {
        match self.phase {
            Phase::ApplyExtrinsic(idx) => Some(idx),
            _ => None,
        }
    }
}

/// A decoded extrinsic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainExtrinsic {
    /// Index in block.
    pub index: u32,
    /// Lower camel case pallet name.
    pub section: String,
    /// Call name, e.g. `submitCandidacy`.
    pub method: String,
    /// Signer account as 0x-hex (None for unsigned/inherent).
    pub signer: Option<String>,
    /// Positional call arguments.
    pub args: Vec<serde_json::Value>,
}

/// One block plus the runtime context it must be classified with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub events: Vec<EventRecord>,
    pub extrinsics: Vec<ChainExtrinsic>,
    pub runtime_version: RuntimeVersion,
}

impl Block {
    pub fn number(&self) -> u64 {
        self.header.number
    }
}

/// Either side of what the classifier accepts.
///
/// Resolved once at the node-client boundary.
#[derive(Debug, Clone, Copy)]
pub enum RawDatum<'a> {
    Event(&'a ChainEvent),
    Extrinsic(&'a ChainExtrinsic),
}

impl RawDatum<'_> {
    pub fn section(&self) -> &str {
        match self {
            RawDatum::Event(e) => &e.section,
            RawDatum::Extrinsic(x) => &x.section,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            RawDatum::Event(e) => &e.method,
            RawDatum::Extrinsic(x) => &x.method,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            RawDatum::Event(_) => "event",
            RawDatum::Extrinsic(_) => "extrinsic",
        }
    }
}

// =============================================================================
// Catch-up
// =============================================================================

/// A span of blocks that has not been processed.
///
/// `end_block` is exclusive; `None` means "up to the current head".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectedRange {
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
}

impl DisconnectedRange {
    pub fn from_block(start_block: u64) -> Self {
        Self {
            start_block: Some(start_block),
            end_block: None,
        }
    }
}
