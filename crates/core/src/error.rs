//! Error types for the ingestion pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ChainError`] - Node RPC and decoding errors
//! - [`EnrichError`] - Per-item enrichment failures
//! - [`HandlerError`] - Failures raised by downstream event handlers
//! - [`ListenerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Chain Errors
// =============================================================================

/// Blockchain RPC and connectivity errors.
///
/// These errors occur when communicating with the Substrate node
/// via WebSocket RPC.
#[derive(Debug, Error)]
pub enum ChainError {
    /// WebSocket connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request failed.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Header or runtime version subscription failed or disconnected.
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// Runtime metadata could not be fetched or parsed.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// A storage query could not be built or executed.
    #[error("Storage query {pallet}.{entry} failed: {message}")]
    StorageError {
        /// Pallet name as found in metadata.
        pallet: String,
        /// Storage entry name.
        entry: String,
        /// Error details.
        message: String,
    },

    /// SCALE data could not be decoded.
    #[error("Decoding error: {0}")]
    DecodeError(String),

    /// Block could not be fetched.
    #[error("Block fetch error at hash {hash}: {message}")]
    BlockFetchError {
        /// Block hash that failed to fetch.
        hash: String,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Enrichment Errors
// =============================================================================

/// Failure to build a normalized event from a classified raw datum.
///
/// An enrichment error only ever discards the item being enriched.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// A chain query needed for enrichment failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// A storage value that must exist was absent.
    #[error("Missing storage value {storage} for {key}")]
    MissingStorage {
        /// `Pallet.Entry` that was queried.
        storage: String,
        /// Human readable key.
        key: String,
    },

    /// The raw datum or a storage value did not have the expected shape.
    #[error("Unexpected data shape: {0}")]
    Decode(String),

    /// The kind cannot be produced from this kind of datum.
    #[error("Unsupported {datum} for kind {kind}")]
    Unsupported {
        /// Event kind wire name.
        kind: &'static str,
        /// "event" or "extrinsic".
        datum: &'static str,
    },
}

impl EnrichError {
    pub(crate) fn missing(storage: &str, key: impl std::fmt::Display) -> Self {
        Self::MissingStorage {
            storage: storage.to_string(),
            key: key.to_string(),
        }
    }
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Error returned by a downstream event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler refused or failed to process the event.
    #[error("Handler {handler} failed: {message}")]
    Failed {
        /// Handler name.
        handler: String,
        /// Error details.
        message: String,
    },

    /// Event or handler output could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Listener Errors
// =============================================================================

/// Top-level listener orchestration errors.
///
/// This is the error type returned by [`crate::services::Listener`].
/// Per-event and per-block failures never surface here.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Blockchain connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The listener was already subscribed.
    #[error("Listener already subscribed")]
    AlreadySubscribed,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for listener operations.
pub type ListenerResult<T> = Result<T, ListenerError>;

/// Result type for enrichment.
pub type EnrichResult<T> = Result<T, EnrichError>;

/// Result type for event handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
