//! Core domain layer for the Herald chain-event listener.
//!
//! This crate turns a Substrate node's raw, runtime-dependent block stream
//! into a typed event feed. It contains the models, the port traits the
//! node adapter implements, and the pipeline services. It has no
//! dependency on a concrete RPC client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      herald (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     herald-substrate                        │
//! │                  (ChainApi over subxt)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   herald-core  ← YOU ARE HERE               │
//! │          (models, classifier, ports, services)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Raw blocks, normalized events and entity grouping
//! - [`classifier`] - Version-aware `(section, method)` classification
//! - [`ports`] - Node capability, pipeline stages and handler chain
//! - [`services`] - Enricher, processor, poller, subscriber, listener and
//!   storage fetcher
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Pipeline
//!
//! 1. The subscriber (live) or poller (catch-up, archival) builds [`models::Block`]s
//! 2. The processor classifies every event and successful extrinsic
//! 3. The enricher queries chain state to build each [`models::CWEvent`]
//! 4. The listener stamps each event and runs it through the
//!    [`ports::HandlerChain`]
//!
//! A failure while enriching or handling one event never affects another.

pub mod classifier;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
