//! Substrate RPC adapter for Herald.
//!
//! This crate implements the [`ChainApi`] port from `herald-core`,
//! providing connectivity to Substrate-based chains via WebSocket RPC.
//!
//! # Features
//!
//! - Best-head and runtime version subscriptions
//! - Transport that reconnects with exponential backoff and reports
//!   each reconnection
//! - Dynamic metadata decoding and storage queries using subxt
//! - Type-aware SCALE to JSON conversion for events, extrinsics and
//!   storage values
//!
//! # Usage
//!
//! ```ignore
//! use herald_core::ports::ChainApi;
//! use herald_substrate::{SubstrateClient, SubstrateClientConfig};
//!
//! let config = SubstrateClientConfig {
//!     ws_url: "ws://localhost:9944".to_string(),
//! };
//!
//! let client = SubstrateClient::connect(config).await?;
//! let head = client.latest_header().await?;
//! let events = client.events(&head.hash).await?;
//! ```
//!
//! [`ChainApi`]: herald_core::ports::ChainApi

mod client;
mod convert;

pub use client::{SubstrateClient, SubstrateClientConfig};
