//! Block processor - classifies and enriches everything in a block.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tracing::{instrument, trace, warn};

use super::enricher::enrich;
use crate::classifier::classify;
use crate::metrics::{
    ProcessingTimer, record_block_processed, record_enrich_error, record_events_emitted,
    record_unclassified,
};
use crate::models::{Block, CWEvent, EventKind, EventRecord, RawDatum, RuntimeVersion};
use crate::ports::{ChainApi, EventProcessor};

/// Default number of enrichments in flight per block.
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 16;

/// Turns raw blocks into ordered [`CWEvent`]s.
///
/// Events come first in record order, followed by successful extrinsics in
/// block order. Items that fail enrichment are logged and dropped.
pub struct Processor<C: ?Sized> {
    api: Arc<C>,
    enrich_concurrency: usize,
    /// Highest processed block number, valid once `processed` is set.
    last_block: AtomicU64,
    processed: AtomicBool,
}

impl<C: ChainApi + ?Sized> Processor<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self {
            api,
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            last_block: AtomicU64::new(0),
            processed: AtomicBool::new(false),
        }
    }

    pub fn with_enrich_concurrency(mut self, concurrency: usize) -> Self {
        self.enrich_concurrency = concurrency.max(1);
        self
    }

    /// Process one block.
    #[instrument(skip_all, fields(block = block.number()))]
    pub async fn process(&self, block: &Block) -> Vec<CWEvent> {
        let _timer = ProcessingTimer::new();
        let number = block.number();
        let version = &block.runtime_version;

        let events: Vec<(EventKind, RawDatum<'_>)> = block
            .events
            .iter()
            .filter_map(|record| classified(version, RawDatum::Event(&record.event)))
            .collect();
        let unclassified = (block.events.len() - events.len()) as u64;

        let successful: HashSet<u32> = block
            .events
            .iter()
            .filter(|record| record.event.is("system", "ExtrinsicSuccess"))
            .filter_map(EventRecord::extrinsic_index)
            .collect();
        let extrinsics: Vec<(EventKind, RawDatum<'_>)> = block
            .extrinsics
            .iter()
            .filter(|extrinsic| successful.contains(&extrinsic.index))
            .filter_map(|extrinsic| classified(version, RawDatum::Extrinsic(extrinsic)))
            .collect();

        let api = &*self.api;
        let enrichments: Vec<_> = events
            .into_iter()
            .chain(extrinsics)
            .map(|(kind, raw)| async move { (kind, enrich(api, number, kind, raw).await) })
            .collect();
        let results: Vec<CWEvent> = stream::iter(enrichments)
            .buffered(self.enrich_concurrency)
            .filter_map(|(kind, result)| async move {
                match result {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(block = number, %kind, error = %e, "⚠️  Enrichment failed, dropping");
                        record_enrich_error(kind.as_str());
                        None
                    }
                }
            })
            .collect()
            .await;

        self.last_block.fetch_max(number, Ordering::SeqCst);
        self.processed.store(true, Ordering::SeqCst);
        record_block_processed();
        record_events_emitted(results.len() as u64);
        record_unclassified(unclassified);
        trace!(events = results.len(), unclassified, "Block processed");

        results
    }

    /// Highest block number processed so far.
    pub fn last_block_number(&self) -> Option<u64> {
        self.processed
            .load(Ordering::SeqCst)
            .then(|| self.last_block.load(Ordering::SeqCst))
    }
}

fn classified<'a>(
    version: &RuntimeVersion,
    raw: RawDatum<'a>,
) -> Option<(EventKind, RawDatum<'a>)> {
    classify(
        &version.spec_name,
        version.spec_version,
        raw.section(),
        raw.method(),
    )
    .map(|kind| (kind, raw))
}

#[async_trait]
impl<C: ChainApi + ?Sized> EventProcessor for Processor<C> {
    async fn process(&self, block: &Block) -> Vec<CWEvent> {
        Processor::process(self, block).await
    }

    fn last_block_number(&self) -> Option<u64> {
        Processor::last_block_number(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{ChainExtrinsic, EventData, Header};
    use crate::testing::{MockChain, account, applied, record};

    fn block(number: u64, events: Vec<EventRecord>, extrinsics: Vec<ChainExtrinsic>) -> Block {
        Block {
            header: Header {
                number,
                hash: MockChain::hash_of(number),
            },
            events,
            extrinsics,
            runtime_version: RuntimeVersion {
                spec_name: "edgeware".into(),
                spec_version: 40,
            },
        }
    }

    fn candidacy(index: u32, signer: u8) -> ChainExtrinsic {
        ChainExtrinsic {
            index,
            section: "electionsPhragmen".into(),
            method: "submitCandidacy".into(),
            signer: Some(account(signer)),
            args: vec![],
        }
    }

    // A block holding a single slash yields exactly one routed event
    #[tokio::test]
    async fn test_slash_block_end_to_end() {
        let processor = Processor::new(Arc::new(MockChain::new()));
        let block = block(
            7,
            vec![record(
                "staking",
                "Slash",
                vec![json!(account(1)), json!("12000000000000000000")],
            )],
            vec![],
        );

        let events = processor.process(&block).await;

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.block_number, 7);
        assert_eq!(
            event.data,
            EventData::Slash {
                validator: account(1),
                amount: "12000000000000000000".into()
            }
        );
        assert_eq!(event.include_addresses, Some(vec![account(1)]));
    }

    // One failing enrichment costs exactly one event; unknown events vanish
    #[tokio::test]
    async fn test_enrichment_failure_is_isolated() {
        let api = MockChain::new();
        for idx in [0, 2] {
            api.set_storage(
                "Treasury",
                "Proposals",
                vec![json!(idx)],
                json!({"proposer": account(1), "value": "5", "beneficiary": account(2), "bond": "1"}),
            );
        }
        let processor = Processor::new(Arc::new(api)).with_enrich_concurrency(2);

        let block = block(
            3,
            vec![
                record("treasury", "Proposed", vec![json!("0")]),
                record("balances", "Transfer", vec![]),
                record("treasury", "Proposed", vec![json!("1")]),
                record("system", "NewAccount", vec![]),
                record("treasury", "Proposed", vec![json!("2")]),
            ],
            vec![],
        );

        let events = processor.process(&block).await;
        let indices: Vec<_> = events
            .iter()
            .map(|e| match e.data {
                EventData::TreasuryProposed { proposal_index, .. } => proposal_index,
                _ => panic!("unexpected payload"),
            })
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }

    // Only extrinsics with a success marker are classified, after the events
    #[tokio::test]
    async fn test_successful_extrinsics_follow_events() {
        let api = MockChain::new();
        api.set_storage("ElectionsPhragmen", "ElectionRounds", vec![], json!("2"));
        let processor = Processor::new(Arc::new(api));

        let block = block(
            9,
            vec![
                applied(0, "system", "ExtrinsicFailed", vec![]),
                applied(1, "system", "ExtrinsicSuccess", vec![]),
                record("staking", "Slash", vec![json!(account(5)), json!("1")]),
            ],
            vec![candidacy(0, 3), candidacy(1, 4)],
        );

        let events = processor.process(&block).await;
        let kinds: Vec<_> = events.iter().map(CWEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Slash, EventKind::ElectionCandidacySubmitted]
        );
        assert_eq!(
            events[1].data,
            EventData::ElectionCandidacySubmitted {
                round: 2,
                candidate: account(4)
            }
        );
    }

    #[tokio::test]
    async fn test_last_block_number_is_monotonic() {
        let processor = Processor::new(Arc::new(MockChain::new()));
        assert_eq!(processor.last_block_number(), None);

        processor.process(&block(0, vec![], vec![])).await;
        assert_eq!(processor.last_block_number(), Some(0));

        processor.process(&block(12, vec![], vec![])).await;
        processor.process(&block(5, vec![], vec![])).await;
        assert_eq!(processor.last_block_number(), Some(12));

        let mut tip = block(0, vec![], vec![]);
        tip.header.number = u64::MAX;
        processor.process(&tip).await;
        assert_eq!(processor.last_block_number(), Some(u64::MAX));
    }

    // The block's own runtime version drives classification
    #[tokio::test]
    async fn test_block_version_selects_minting_kind() {
        let processor = Processor::new(Arc::new(MockChain::new()));
        let minting = || {
            vec![record(
                "treasuryReward",
                "TreasuryMinting",
                vec![json!("1000"), json!("10"), json!(account(6))],
            )]
        };

        let mut old = block(1, minting(), vec![]);
        old.runtime_version.spec_version = 33;
        let new = block(2, minting(), vec![]);

        let old_events = processor.process(&old).await;
        let new_events = processor.process(&new).await;
        assert_eq!(
            old_events[0].data,
            EventData::TreasuryRewardMinting {
                pot: "1000".into(),
                reward: "10".into()
            }
        );
        assert_eq!(
            new_events[0].data,
            EventData::TreasuryRewardMintingV2 {
                pot: "1000".into(),
                pot_address: account(6)
            }
        );
    }
}
