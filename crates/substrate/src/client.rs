//! Substrate RPC client with dynamic metadata decoding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde_json::Value as Json;
use subxt::backend::legacy::{LegacyBackend, LegacyRpcMethods};
use subxt::backend::rpc::RpcClient;
use subxt::backend::rpc::reconnecting_rpc_client::{
    ExponentialBackoff, RpcClient as ReconnectingRpcClient,
};
use subxt::config::substrate::H256;
use subxt::events::Phase as SubxtPhase;
use subxt::ext::scale_value;
use subxt::storage::Storage;
use subxt::{OnlineClient, PolkadotConfig};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use herald_core::error::{ChainError, ChainResult};
use herald_core::metrics::record_decode_error;
use herald_core::models::{
    BlockHash, ChainEvent, ChainExtrinsic, EventRecord, Header, Phase, RuntimeVersion,
};
use herald_core::ports::{
    ChainApi, HeaderStream, ReconnectStream, RuntimeVersionStream, StorageEntry,
};
use herald_core::utils::lower_camel;

use crate::convert::{UNTYPED, json_to_value, value_to_json};

// Transport reconnection backoff
const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Configuration for the Substrate client.
#[derive(Debug, Clone)]
pub struct SubstrateClientConfig {
    /// WebSocket URL (e.g., "ws://localhost:9944").
    pub ws_url: String,
}

impl Default for SubstrateClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9944".to_string(),
        }
    }
}

/// Substrate client adapter implementing the [`ChainApi`] port.
///
/// The underlying WebSocket transport reconnects on its own; open
/// subscriptions end when it does and [`ChainApi::reconnections`] yields.
pub struct SubstrateClient {
    client: OnlineClient<PolkadotConfig>,
    rpc: LegacyRpcMethods<PolkadotConfig>,
    transport: ReconnectingRpcClient,
    updater: AbortHandle,
}

impl SubstrateClient {
    /// Connect to a Substrate node.
    #[instrument(skip_all, fields(url = %config.ws_url))]
    pub async fn connect(config: SubstrateClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let transport = ReconnectingRpcClient::builder()
            .retry_policy(
                ExponentialBackoff::from_millis(INITIAL_RETRY_DELAY_MS).max_delay(MAX_RETRY_DELAY),
            )
            .build(config.ws_url.clone())
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let rpc_client = RpcClient::new(transport.clone());

        let backend = LegacyBackend::<PolkadotConfig>::builder().build(rpc_client.clone());
        let client = OnlineClient::<PolkadotConfig>::from_backend(Arc::new(backend))
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        // Keep metadata current across runtime upgrades
        let updater = client.updater();
        let updater = tokio::spawn(async move {
            if let Err(e) = updater.perform_runtime_updates().await {
                warn!(error = %e, "⚠️  Runtime update tracking stopped");
            }
        })
        .abort_handle();

        debug!("Connected successfully");

        Ok(Self {
            client,
            rpc: LegacyRpcMethods::new(rpc_client),
            transport,
            updater,
        })
    }

    async fn storage_at(
        &self,
        at: Option<&BlockHash>,
    ) -> ChainResult<Storage<PolkadotConfig, OnlineClient<PolkadotConfig>>> {
        match at {
            Some(hash) => Ok(self.client.storage().at(h256(hash))),
            None => self
                .client
                .storage()
                .at_latest()
                .await
                .map_err(|e| ChainError::RpcError(e.to_string())),
        }
    }
}

impl Drop for SubstrateClient {
    fn drop(&mut self) {
        self.updater.abort();
    }
}

fn h256(hash: &BlockHash) -> H256 {
    H256(hash.0)
}

fn storage_err(pallet: &str, entry: &str, e: impl ToString) -> ChainError {
    ChainError::StorageError {
        pallet: pallet.to_string(),
        entry: entry.to_string(),
        message: e.to_string(),
    }
}

fn block_err(hash: &BlockHash, e: impl ToString) -> ChainError {
    ChainError::BlockFetchError {
        hash: hash.to_hex(),
        message: e.to_string(),
    }
}

fn runtime_version(
    version: subxt::backend::legacy::rpc_methods::RuntimeVersion,
) -> RuntimeVersion {
    RuntimeVersion {
        spec_name: version
            .other
            .get("specName")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string(),
        spec_version: version.spec_version,
    }
}

#[async_trait]
impl ChainApi for SubstrateClient {
    async fn latest_header(&self) -> ChainResult<Header> {
        let header = self
            .rpc
            .chain_get_header(None)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or_else(|| ChainError::RpcError("node returned no best header".into()))?;
        let number = u64::from(header.number);
        Ok(Header {
            number,
            hash: self.block_hash(number).await?,
        })
    }

    async fn block_hash(&self, number: u64) -> ChainResult<BlockHash> {
        let hash = self
            .rpc
            .chain_get_block_hash(Some(number.into()))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        Ok(hash.map(|h| BlockHash(h.0)).unwrap_or_default())
    }

    async fn header(&self, hash: &BlockHash) -> ChainResult<Header> {
        let header = self
            .rpc
            .chain_get_header(Some(h256(hash)))
            .await
            .map_err(|e| block_err(hash, e))?
            .ok_or_else(|| block_err(hash, "header not found"))?;
        Ok(Header {
            number: u64::from(header.number),
            hash: *hash,
        })
    }

    async fn events(&self, hash: &BlockHash) -> ChainResult<Vec<EventRecord>> {
        let events = self
            .client
            .events()
            .at(h256(hash))
            .await
            .map_err(|e| block_err(hash, e))?;
        let metadata = self.client.metadata();
        let types = metadata.types();

        let mut records = Vec::new();
        for (index, event) in events.iter().enumerate() {
            let decoded = event.and_then(|ev| {
                let fields = ev.field_values()?;
                Ok((ev, fields))
            });
            let (ev, fields) = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(block = %hash, index, error = %e, "⚠️  Failed to decode event");
                    record_decode_error("event");
                    continue;
                }
            };
            let phase = match ev.phase() {
                SubxtPhase::ApplyExtrinsic(idx) => Phase::ApplyExtrinsic(idx),
                SubxtPhase::Finalization => Phase::Finalization,
                SubxtPhase::Initialization => Phase::Initialization,
            };
            records.push(EventRecord {
                event: ChainEvent {
                    section: lower_camel(ev.pallet_name()),
                    method: ev.variant_name().to_string(),
                    data: fields.values().map(|v| value_to_json(v, types)).collect(),
                },
                phase,
            });
        }

        Ok(records)
    }

    async fn extrinsics(&self, hash: &BlockHash) -> ChainResult<Vec<ChainExtrinsic>> {
        let block = self
            .client
            .blocks()
            .at(h256(hash))
            .await
            .map_err(|e| block_err(hash, e))?;
        let extrinsics = block.extrinsics().await.map_err(|e| block_err(hash, e))?;
        let metadata = self.client.metadata();
        let types = metadata.types();

        let mut decoded = Vec::new();
        for ext in extrinsics.iter() {
            let index = ext.index();
            let call = ext
                .pallet_name()
                .and_then(|pallet| Ok((pallet, ext.variant_name()?, ext.field_values()?)));
            let (pallet, method, fields) = match call {
                Ok(call) => call,
                Err(e) => {
                    warn!(block = %hash, index, error = %e, "⚠️  Failed to decode extrinsic");
                    record_decode_error("extrinsic");
                    continue;
                }
            };
            decoded.push(ChainExtrinsic {
                index,
                section: lower_camel(pallet),
                method: lower_camel(method),
                signer: ext.address_bytes().and_then(signer),
                args: fields.values().map(|v| value_to_json(v, types)).collect(),
            });
        }

        Ok(decoded)
    }

    async fn runtime_version(&self) -> ChainResult<RuntimeVersion> {
        self.rpc
            .state_get_runtime_version(None)
            .await
            .map(runtime_version)
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn subscribe_runtime_version(&self) -> ChainResult<RuntimeVersionStream> {
        let subscription = self
            .rpc
            .state_subscribe_runtime_version()
            .await
            .map_err(|e| ChainError::SubscriptionError(e.to_string()))?;

        Ok(subscription
            .map(|item| {
                item.map(runtime_version)
                    .map_err(|e| ChainError::SubscriptionError(e.to_string()))
            })
            .boxed())
    }

    async fn subscribe_new_heads(&self) -> ChainResult<HeaderStream> {
        let subscription = self
            .client
            .blocks()
            .subscribe_best()
            .await
            .map_err(|e| ChainError::SubscriptionError(e.to_string()))?;
        debug!("📡 Subscription established");

        Ok(subscription
            .map(|item| {
                item.map(|block| Header {
                    number: u64::from(block.number()),
                    hash: BlockHash(block.hash().0),
                })
                .map_err(|e| ChainError::SubscriptionError(e.to_string()))
            })
            .boxed())
    }

    fn reconnections(&self) -> ReconnectStream {
        futures::stream::unfold(self.transport.clone(), |transport| async move {
            transport.reconnect_initiated().await;
            info!("🔄 Reconnecting to chain...");
            Some(((), transport))
        })
        .boxed()
    }

    async fn storage(
        &self,
        at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        keys: &[Json],
    ) -> ChainResult<Option<Json>> {
        let address = subxt::dynamic::storage(
            pallet,
            entry,
            keys.iter().map(json_to_value).collect::<Vec<_>>(),
        );
        let value = self
            .storage_at(at)
            .await?
            .fetch(&address)
            .await
            .map_err(|e| storage_err(pallet, entry, e))?;
        let Some(value) = value else {
            return Ok(None);
        };
        let value = value
            .to_value()
            .map_err(|e| storage_err(pallet, entry, e))?;
        Ok(Some(value_to_json(&value, self.client.metadata().types())))
    }

    async fn storage_entries(
        &self,
        at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        partial_keys: &[Json],
    ) -> ChainResult<Vec<StorageEntry>> {
        let address = subxt::dynamic::storage(
            pallet,
            entry,
            partial_keys.iter().map(json_to_value).collect::<Vec<_>>(),
        );
        let metadata = self.client.metadata();
        let types = metadata.types();

        self.storage_at(at)
            .await?
            .iter(address)
            .await
            .map_err(|e| storage_err(pallet, entry, e))?
            .map_err(|e| storage_err(pallet, entry, e))
            .and_then(|pair| async move {
                let value = pair
                    .value
                    .to_value()
                    .map_err(|e| storage_err(pallet, entry, e))?;
                let keys: Vec<Json> = pair
                    .keys
                    .into_iter()
                    .map(|key| value_to_json(&key.map_context(|_| UNTYPED), types))
                    .collect();
                Ok((keys, value_to_json(&value, types)))
            })
            .try_collect()
            .await
    }

    async fn decode_call(&self, bytes: &[u8]) -> ChainResult<Json> {
        let metadata = self.client.metadata();
        let call_ty = metadata.outer_enums().call_enum_ty();
        let value = scale_value::scale::decode_as_type(&mut &bytes[..], call_ty, metadata.types())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;
        Ok(value_to_json(&value, metadata.types()))
    }

    fn has_pallet(&self, pallet: &str) -> bool {
        self.client.metadata().pallet_by_name(pallet).is_some()
    }

    fn has_storage(&self, pallet: &str, entry: &str) -> bool {
        self.client
            .metadata()
            .pallet_by_name(pallet)
            .and_then(|p| p.storage())
            .and_then(|s| s.entry_by_name(entry))
            .is_some()
    }
}

/// Signer account from encoded address bytes.
///
/// Accepts a raw 32-byte account or a `MultiAddress::Id`.
fn signer(bytes: &[u8]) -> Option<String> {
    let account = match bytes {
        [0, rest @ ..] if rest.len() == 32 => rest,
        _ if bytes.len() == 32 => bytes,
        _ => return None,
    };
    Some(format!("0x{}", hex::encode(account)))
}
