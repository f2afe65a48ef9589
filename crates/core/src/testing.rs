//! In-memory [`ChainApi`] for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde_json::{Value, json};

use crate::error::{ChainError, ChainResult};
use crate::models::{
    BlockHash, ChainEvent, ChainExtrinsic, EventRecord, Header, Phase, RuntimeVersion,
};
use crate::ports::{
    ChainApi, HeaderStream, ReconnectStream, RuntimeVersionStream, StorageEntry,
};

pub(crate) fn account(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 32]))
}

pub(crate) fn hash(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 32]))
}

pub(crate) fn event(section: &str, method: &str, data: Vec<Value>) -> ChainEvent {
    ChainEvent {
        section: section.into(),
        method: method.into(),
        data,
    }
}

pub(crate) fn record(section: &str, method: &str, data: Vec<Value>) -> EventRecord {
    EventRecord {
        event: event(section, method, data),
        phase: Phase::Finalization,
    }
}

pub(crate) fn applied(index: u32, section: &str, method: &str, data: Vec<Value>) -> EventRecord {
    EventRecord {
        event: event(section, method, data),
        phase: Phase::ApplyExtrinsic(index),
    }
}

fn storage_key(pallet: &str, entry: &str, keys: &[Value]) -> String {
    format!("{pallet}.{entry}{}", Value::Array(keys.to_vec()))
}

/// Scriptable chain state.
///
/// Block `n` has hash `MockChain::hash_of(n)` unless pruned. Storage is
/// keyed by pallet, entry and the JSON of the keys, and ignores `at`.
pub(crate) struct MockChain {
    pub version: Mutex<RuntimeVersion>,
    head: Mutex<u64>,
    pruned: Mutex<HashSet<u64>>,
    failing_blocks: Mutex<HashSet<u64>>,
    events: Mutex<HashMap<u64, Vec<EventRecord>>>,
    extrinsics: Mutex<HashMap<u64, Vec<ChainExtrinsic>>>,
    storage: Mutex<HashMap<String, Value>>,
    entries: Mutex<HashMap<String, Vec<StorageEntry>>>,
    failing_storage: Mutex<HashSet<String>>,
    absent_pallets: Mutex<HashSet<String>>,
    absent_storage: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<Vec<u8>, Value>>,
    heads: Mutex<Vec<mpsc::UnboundedSender<ChainResult<Header>>>>,
    versions: Mutex<Vec<mpsc::UnboundedSender<ChainResult<RuntimeVersion>>>>,
    reconnects: Mutex<Vec<mpsc::UnboundedSender<()>>>,
    /// Whether a version subscription yields the current version right away.
    pub emit_initial_version: Mutex<bool>,
    pub fail_head_subscription: Mutex<bool>,
    pub head_subscriptions: AtomicUsize,
    pub blocks_fetched: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            version: Mutex::new(RuntimeVersion {
                spec_name: "edgeware".into(),
                spec_version: 40,
            }),
            head: Mutex::new(0),
            pruned: Default::default(),
            failing_blocks: Default::default(),
            events: Default::default(),
            extrinsics: Default::default(),
            storage: Default::default(),
            entries: Default::default(),
            failing_storage: Default::default(),
            absent_pallets: Default::default(),
            absent_storage: Default::default(),
            calls: Default::default(),
            heads: Default::default(),
            versions: Default::default(),
            reconnects: Default::default(),
            emit_initial_version: Mutex::new(true),
            fail_head_subscription: Mutex::new(false),
            head_subscriptions: AtomicUsize::new(0),
            blocks_fetched: AtomicUsize::new(0),
        }
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_of(number: u64) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&(number + 1).to_be_bytes());
        BlockHash(bytes)
    }

    fn number_of(hash: &BlockHash) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.0[..8]);
        u64::from_be_bytes(bytes).saturating_sub(1)
    }

    pub fn set_head(&self, number: u64) {
        *self.head.lock().unwrap() = number;
    }

    pub fn prune(&self, number: u64) {
        self.pruned.lock().unwrap().insert(number);
    }

    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.lock().unwrap().insert(number);
    }

    pub fn add_events(&self, number: u64, records: Vec<EventRecord>) {
        self.events
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .extend(records);
    }

    pub fn add_extrinsics(&self, number: u64, extrinsics: Vec<ChainExtrinsic>) {
        self.extrinsics
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .extend(extrinsics);
    }

    pub fn set_storage(&self, pallet: &str, entry: &str, keys: Vec<Value>, value: Value) {
        self.storage
            .lock()
            .unwrap()
            .insert(storage_key(pallet, entry, &keys), value);
    }

    pub fn set_entries(&self, pallet: &str, entry: &str, partial: Vec<Value>, items: Vec<StorageEntry>) {
        self.entries
            .lock()
            .unwrap()
            .insert(storage_key(pallet, entry, &partial), items);
    }

    pub fn fail_storage(&self, pallet: &str, entry: &str) {
        self.failing_storage
            .lock()
            .unwrap()
            .insert(format!("{pallet}.{entry}"));
    }

    pub fn remove_pallet(&self, pallet: &str) {
        self.absent_pallets.lock().unwrap().insert(pallet.into());
    }

    pub fn remove_storage(&self, pallet: &str, entry: &str) {
        self.absent_storage
            .lock()
            .unwrap()
            .insert(format!("{pallet}.{entry}"));
    }

    pub fn set_call(&self, bytes: &[u8], call: Value) {
        self.calls.lock().unwrap().insert(bytes.to_vec(), call);
    }

    /// Deliver a header to every open head subscription.
    pub fn push_head(&self, number: u64) {
        self.set_head(number);
        let header = Header {
            number,
            hash: Self::hash_of(number),
        };
        for tx in self.heads.lock().unwrap().iter() {
            let _ = tx.unbounded_send(Ok(header.clone()));
        }
    }

    /// End every open head subscription, as a dropped transport would.
    pub fn close_heads(&self) {
        self.heads.lock().unwrap().clear();
    }

    pub fn push_version(&self, version: RuntimeVersion) {
        *self.version.lock().unwrap() = version.clone();
        for tx in self.versions.lock().unwrap().iter() {
            let _ = tx.unbounded_send(Ok(version.clone()));
        }
    }

    pub fn reconnect(&self) {
        for tx in self.reconnects.lock().unwrap().iter() {
            let _ = tx.unbounded_send(());
        }
    }

    fn check_storage(&self, pallet: &str, entry: &str) -> ChainResult<()> {
        if self
            .failing_storage
            .lock()
            .unwrap()
            .contains(&format!("{pallet}.{entry}"))
        {
            return Err(ChainError::StorageError {
                pallet: pallet.into(),
                entry: entry.into(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn check_block(&self, hash: &BlockHash) -> ChainResult<u64> {
        let number = Self::number_of(hash);
        if self.failing_blocks.lock().unwrap().contains(&number) {
            return Err(ChainError::BlockFetchError {
                hash: hash.to_hex(),
                message: "injected failure".into(),
            });
        }
        Ok(number)
    }
}

#[async_trait]
impl ChainApi for MockChain {
    async fn latest_header(&self) -> ChainResult<Header> {
        let number = *self.head.lock().unwrap();
        Ok(Header {
            number,
            hash: Self::hash_of(number),
        })
    }

    async fn block_hash(&self, number: u64) -> ChainResult<BlockHash> {
        if self.pruned.lock().unwrap().contains(&number) {
            return Ok(BlockHash::default());
        }
        Ok(Self::hash_of(number))
    }

    async fn header(&self, hash: &BlockHash) -> ChainResult<Header> {
        let number = self.check_block(hash)?;
        Ok(Header {
            number,
            hash: *hash,
        })
    }

    async fn events(&self, hash: &BlockHash) -> ChainResult<Vec<EventRecord>> {
        let number = self.check_block(hash)?;
        self.blocks_fetched.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn extrinsics(&self, hash: &BlockHash) -> ChainResult<Vec<ChainExtrinsic>> {
        let number = self.check_block(hash)?;
        Ok(self
            .extrinsics
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn runtime_version(&self) -> ChainResult<RuntimeVersion> {
        Ok(self.version.lock().unwrap().clone())
    }

    async fn subscribe_runtime_version(&self) -> ChainResult<RuntimeVersionStream> {
        let (tx, rx) = mpsc::unbounded();
        if *self.emit_initial_version.lock().unwrap() {
            let _ = tx.unbounded_send(Ok(self.version.lock().unwrap().clone()));
        }
        self.versions.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }

    async fn subscribe_new_heads(&self) -> ChainResult<HeaderStream> {
        if *self.fail_head_subscription.lock().unwrap() {
            return Err(ChainError::SubscriptionError("injected failure".into()));
        }
        self.head_subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded();
        self.heads.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }

    fn reconnections(&self) -> ReconnectStream {
        let (tx, rx) = mpsc::unbounded();
        self.reconnects.lock().unwrap().push(tx);
        rx.boxed()
    }

    async fn storage(
        &self,
        _at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        keys: &[Value],
    ) -> ChainResult<Option<Value>> {
        self.check_storage(pallet, entry)?;
        Ok(self
            .storage
            .lock()
            .unwrap()
            .get(&storage_key(pallet, entry, keys))
            .cloned())
    }

    async fn storage_entries(
        &self,
        _at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        partial_keys: &[Value],
    ) -> ChainResult<Vec<StorageEntry>> {
        self.check_storage(pallet, entry)?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&storage_key(pallet, entry, partial_keys))
            .cloned()
            .unwrap_or_default())
    }

    async fn decode_call(&self, bytes: &[u8]) -> ChainResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .get(bytes)
            .cloned()
            .ok_or_else(|| ChainError::DecodeError(format!("unknown call 0x{}", hex::encode(bytes))))
    }

    fn has_pallet(&self, pallet: &str) -> bool {
        !self.absent_pallets.lock().unwrap().contains(pallet)
    }

    fn has_storage(&self, pallet: &str, entry: &str) -> bool {
        self.has_pallet(pallet)
            && !self
                .absent_storage
                .lock()
                .unwrap()
                .contains(&format!("{pallet}.{entry}"))
    }
}

/// Encoded bytes of a balance transfer and its decoded value.
pub(crate) fn sample_call() -> (Vec<u8>, Value) {
    (
        vec![0x05, 0x00, 0x2a],
        json!({"Balances": {"transfer": {"dest": account(9), "value": "42"}}}),
    )
}
