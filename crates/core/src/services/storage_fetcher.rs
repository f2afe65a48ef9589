//! Storage fetcher - synthesizes events from present chain state.
//!
//! Used to seed a fresh consumer with the entities that are currently open
//! on chain, without replaying history. Synthesized events carry the
//! current head as their block number unless the state records a better
//! one.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use super::state::{self, SignalingStage, decode_err};
use crate::error::{ChainError, ChainResult};
use crate::models::{CWEvent, CollectiveName, DecodedCall, EntityKind, EventData};
use crate::ports::{ChainApi, StorageFetch};
use crate::utils::{parse_account, parse_amount, parse_hash, parse_u32};

/// Builds events for every open entity from storage.
pub struct StorageFetcher<C: ?Sized> {
    api: Arc<C>,
}

impl<C: ChainApi + ?Sized> StorageFetcher<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self { api }
    }

    async fn head_number(&self) -> ChainResult<u64> {
        Ok(self.api.latest_header().await?.number)
    }

    /// Events for every open democracy, treasury, collective and signaling
    /// entity. The first failing sub-fetch aborts the whole fetch.
    #[instrument(skip_all)]
    pub async fn fetch(&self) -> ChainResult<Vec<CWEvent>> {
        let block_number = self.head_number().await?;
        info!(block_number, "🗄️  Fetching chain state");

        let proposals = self.fetch_democracy_proposals(block_number, None).await?;
        let referenda = self.fetch_democracy_referenda(block_number, None).await?;

        let mut seen = HashSet::new();
        let hashes: Vec<String> = proposals
            .iter()
            .chain(&referenda)
            .filter_map(|event| match &event.data {
                EventData::DemocracyProposed { proposal_hash, .. }
                | EventData::DemocracyStarted { proposal_hash, .. } => Some(proposal_hash.clone()),
                _ => None,
            })
            .filter(|hash| seen.insert(hash.clone()))
            .collect();
        let preimages = self.fetch_democracy_preimages(&hashes).await?;

        let treasury = self.fetch_treasury_proposals(block_number, None).await?;
        let mut collectives = Vec::new();
        for collective in [CollectiveName::TechnicalCommittee, CollectiveName::Council] {
            if self.api.has_pallet(collective.pallet()) {
                collectives.extend(
                    self.fetch_collective_proposals(collective, block_number, None)
                        .await?,
                );
            }
        }
        let signaling = self.fetch_signaling_proposals(block_number, None).await?;

        let events: Vec<CWEvent> = proposals
            .into_iter()
            .chain(referenda)
            .chain(preimages)
            .chain(treasury)
            .chain(collectives)
            .chain(signaling)
            .collect();
        info!(events = events.len(), "✅ Fetch complete");
        Ok(events)
    }

    /// Events for a single entity, by index or hash.
    ///
    /// Unknown entities yield an empty list.
    #[instrument(skip(self))]
    pub async fn fetch_one(
        &self,
        id: &str,
        kind: EntityKind,
        collective: Option<CollectiveName>,
    ) -> ChainResult<Vec<CWEvent>> {
        let block_number = self.head_number().await?;
        let events = match kind {
            EntityKind::DemocracyPreimage => {
                self.fetch_democracy_preimages(&[hash_id(id)]).await?
            }
            EntityKind::DemocracyProposal => {
                self.fetch_democracy_proposals(block_number, Some(index(id)?))
                    .await?
            }
            EntityKind::DemocracyReferendum => {
                self.fetch_democracy_referenda(block_number, Some(index(id)?))
                    .await?
            }
            EntityKind::TreasuryProposal => {
                self.fetch_treasury_proposals(block_number, Some(index(id)?))
                    .await?
            }
            EntityKind::CollectiveProposal => {
                let collective = collective.unwrap_or(CollectiveName::Council);
                self.fetch_collective_proposals(collective, block_number, Some(&hash_id(id)))
                    .await?
            }
            EntityKind::SignalingProposal => {
                self.fetch_signaling_proposals(block_number, Some(&hash_id(id)))
                    .await?
            }
        };
        if events.is_empty() {
            warn!("⚠️  Entity not found on chain");
        }
        Ok(events)
    }

    // =========================================================================
    // Democracy
    // =========================================================================

    /// `DemocracyProposed` for every public proposal with a recorded deposit.
    pub async fn fetch_democracy_proposals(
        &self,
        block_number: u64,
        only: Option<u32>,
    ) -> ChainResult<Vec<CWEvent>> {
        if !self.api.has_pallet("Democracy") {
            info!("Democracy pallet not found, skipping proposals");
            return Ok(Vec::new());
        }
        debug!("Fetching democracy proposals");

        let props = self
            .api
            .storage(None, "Democracy", "PublicProps", &[])
            .await?
            .unwrap_or(Value::Null);
        let props = props
            .as_array()
            .into_iter()
            .flatten()
            .map(|prop| {
                let t = prop.as_array().filter(|t| t.len() >= 3);
                t.and_then(|t| {
                    Some((
                        parse_u32(&t[0])?,
                        state::proposal_hash_of(&t[1])?,
                        parse_account(&t[2])?,
                    ))
                })
                .ok_or_else(|| decode_err("public proposal", prop))
            })
            .filter(|prop| match (prop, only) {
                (Ok((idx, _, _)), Some(wanted)) => *idx == wanted,
                _ => true,
            })
            .collect::<ChainResult<Vec<_>>>()?;

        let keys: Vec<Vec<Value>> = props.iter().map(|(idx, _, _)| vec![json!(idx)]).collect();
        let deposits = self
            .api
            .storage_multi(None, "Democracy", "DepositOf", &keys)
            .await?;

        let events: Vec<CWEvent> = props
            .into_iter()
            .zip(deposits)
            .filter_map(|((proposal_index, proposal_hash, proposer), deposit)| {
                // (Vec<AccountId>, Balance) on newer runtimes, (Balance, Vec<AccountId>) on older
                let deposit = deposit?
                    .as_array()?
                    .iter()
                    .find_map(parse_amount)?;
                Some(CWEvent::new(
                    block_number,
                    EventData::DemocracyProposed {
                        proposal_index,
                        proposal_hash,
                        deposit,
                        proposer,
                    },
                ))
            })
            .collect();
        info!(count = events.len(), "Found democracy proposals");
        Ok(events)
    }

    /// `DemocracyStarted` for ongoing referenda, plus `DemocracyStarted` and
    /// `DemocracyPassed` for referenda waiting in the dispatch queue.
    pub async fn fetch_democracy_referenda(
        &self,
        block_number: u64,
        only: Option<u32>,
    ) -> ChainResult<Vec<CWEvent>> {
        if !self.api.has_pallet("Democracy") {
            info!("Democracy pallet not found, skipping referenda");
            return Ok(Vec::new());
        }
        debug!("Fetching democracy referenda");

        let counter = |entry: &'static str| async move {
            Ok::<_, ChainError>(
                self.api
                    .storage(None, "Democracy", entry, &[])
                    .await?
                    .as_ref()
                    .and_then(parse_u32)
                    .unwrap_or_default(),
            )
        };
        let lowest = counter("LowestUnbaked").await?;
        let count = counter("ReferendumCount").await?;

        let indices: Vec<u32> = (lowest..count)
            .filter(|idx| only.is_none_or(|wanted| wanted == *idx))
            .collect();
        let keys: Vec<Vec<Value>> = indices.iter().map(|idx| vec![json!(idx)]).collect();
        let infos = self
            .api
            .storage_multi(None, "Democracy", "ReferendumInfoOf", &keys)
            .await?;

        let mut events = Vec::new();
        for (referendum_index, info) in indices.into_iter().zip(infos) {
            let Some(info) = info else { continue };
            let Some(referendum) = state::ongoing_referendum(&info)? else {
                continue;
            };
            events.push(CWEvent::new(
                block_number,
                EventData::DemocracyStarted {
                    referendum_index,
                    proposal_hash: referendum.proposal_hash,
                    vote_threshold: referendum.threshold,
                    end_block: referendum.end,
                },
            ));
        }
        let ongoing = events.len();

        for (dispatch_block, proposal_hash, referendum_index) in state::dispatch_queue(&*self.api).await? {
            if only.is_some_and(|wanted| wanted != referendum_index) {
                continue;
            }
            // Threshold and end are no longer known once a referendum passed
            events.push(CWEvent::new(
                block_number,
                EventData::DemocracyStarted {
                    referendum_index,
                    proposal_hash,
                    vote_threshold: String::new(),
                    end_block: 0,
                },
            ));
            events.push(CWEvent::new(
                block_number,
                EventData::DemocracyPassed {
                    referendum_index,
                    dispatch_block: Some(dispatch_block),
                },
            ));
        }
        info!(ongoing, queued = events.len() - ongoing, "Found democracy referenda");
        Ok(events)
    }

    /// `PreimageNoted` for each hash with an available preimage, at the
    /// block the preimage was noted.
    pub async fn fetch_democracy_preimages(&self, hashes: &[String]) -> ChainResult<Vec<CWEvent>> {
        if !self.api.has_storage("Democracy", "Preimages") {
            info!("Democracy preimages not found, skipping");
            return Ok(Vec::new());
        }
        debug!(hashes = hashes.len(), "Fetching democracy preimages");

        let mut events = Vec::new();
        for hash in hashes {
            let Some(image) = state::preimage(&*self.api, hash).await? else {
                continue;
            };
            events.push(CWEvent::new(
                image.since.unwrap_or_default(),
                EventData::PreimageNoted {
                    proposal_hash: hash.clone(),
                    noter: image.provider.unwrap_or_default(),
                    preimage: image.call,
                },
            ));
        }
        info!(count = events.len(), "Found preimages");
        Ok(events)
    }

    // =========================================================================
    // Treasury
    // =========================================================================

    /// `TreasuryProposed` for every proposal not yet approved.
    pub async fn fetch_treasury_proposals(
        &self,
        block_number: u64,
        only: Option<u32>,
    ) -> ChainResult<Vec<CWEvent>> {
        if !self.api.has_pallet("Treasury") {
            info!("Treasury pallet not found, skipping proposals");
            return Ok(Vec::new());
        }
        debug!("Fetching treasury proposals");

        let indices: Vec<u32> = match only {
            Some(idx) => vec![idx],
            None => {
                let count = self
                    .api
                    .storage(None, "Treasury", "ProposalCount", &[])
                    .await?
                    .as_ref()
                    .and_then(parse_u32)
                    .unwrap_or_default();
                let approvals: HashSet<u32> = self
                    .api
                    .storage(None, "Treasury", "Approvals", &[])
                    .await?
                    .as_ref()
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(parse_u32).collect())
                    .unwrap_or_default();
                (0..count).filter(|idx| !approvals.contains(idx)).collect()
            }
        };

        let keys: Vec<Vec<Value>> = indices.iter().map(|idx| vec![json!(idx)]).collect();
        let proposals = self
            .api
            .storage_multi(None, "Treasury", "Proposals", &keys)
            .await?;

        let mut events = Vec::new();
        for (proposal_index, proposal) in indices.into_iter().zip(proposals) {
            let Some(proposal) = proposal else { continue };
            let proposal = state::treasury_proposal(&proposal)?;
            events.push(CWEvent::new(
                block_number,
                EventData::TreasuryProposed {
                    proposal_index,
                    proposer: proposal.proposer,
                    value: proposal.value,
                    beneficiary: proposal.beneficiary,
                    bond: proposal.bond,
                },
            ));
        }
        info!(count = events.len(), "Found treasury proposals");
        Ok(events)
    }

    // =========================================================================
    // Collectives
    // =========================================================================

    /// `CollectiveProposed` and one `CollectiveVoted` per recorded vote for
    /// every open motion of `collective`.
    ///
    /// Motions whose call cannot be fetched are logged and skipped.
    pub async fn fetch_collective_proposals(
        &self,
        collective: CollectiveName,
        block_number: u64,
        only: Option<&str>,
    ) -> ChainResult<Vec<CWEvent>> {
        let pallet = collective.pallet();
        debug!(collective = collective.as_str(), "Fetching collective proposals");

        let hashes: Vec<String> = self
            .api
            .storage(None, pallet, "Proposals", &[])
            .await?
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_hash).collect())
            .unwrap_or_default();
        let hashes: Vec<String> = hashes
            .into_iter()
            .filter(|hash| only.is_none_or(|wanted| wanted == hash))
            .collect();

        let calls = join_all(hashes.iter().map(|hash| async move {
            match self.api.storage(None, pallet, "ProposalOf", &[json!(hash)]).await {
                Ok(call) => call,
                Err(e) => {
                    error!(collective = collective.as_str(), %hash, error = %e, "❌ Failed to fetch motion");
                    None
                }
            }
        }))
        .await;
        let keys: Vec<Vec<Value>> = hashes.iter().map(|hash| vec![json!(hash)]).collect();
        let votes = self.api.storage_multi(None, pallet, "Voting", &keys).await?;

        let mut events = Vec::new();
        let mut motions = 0;
        for ((proposal_hash, call), votes) in hashes.into_iter().zip(calls).zip(votes) {
            let (Some(call), Some(votes)) = (call, votes) else {
                continue;
            };
            let call = DecodedCall::from_value(&call).ok_or_else(|| decode_err("call", &call))?;
            let proposal_index = votes
                .get("index")
                .and_then(parse_u32)
                .ok_or_else(|| decode_err("motion votes", &votes))?;
            let threshold = votes
                .get("threshold")
                .and_then(parse_u32)
                .ok_or_else(|| decode_err("motion votes", &votes))?;

            motions += 1;
            events.push(CWEvent::new(
                block_number,
                EventData::CollectiveProposed {
                    collective_name: Some(collective),
                    // Not recorded in storage
                    proposer: String::new(),
                    proposal_index,
                    proposal_hash: proposal_hash.clone(),
                    threshold,
                    call,
                },
            ));
            for (field, vote) in [("ayes", true), ("nays", false)] {
                let voters = votes.get(field).map(crate::utils::parse_accounts).unwrap_or_default();
                events.extend(voters.into_iter().map(|voter| {
                    CWEvent::new(
                        block_number,
                        EventData::CollectiveVoted {
                            collective_name: Some(collective),
                            proposal_hash: proposal_hash.clone(),
                            voter,
                            vote,
                        },
                    )
                }));
            }
        }
        info!(
            collective = collective.as_str(),
            motions,
            votes = events.len() - motions,
            "Found collective proposals"
        );
        Ok(events)
    }

    // =========================================================================
    // Signaling
    // =========================================================================

    /// Events reproducing the current stage of every signaling proposal.
    ///
    /// Every proposal gets a `SignalingNewProposal`; commit stage adds
    /// `SignalingCommitStarted`, voting and completed stages add
    /// `SignalingVotingStarted`, completed adds `SignalingVotingCompleted`.
    pub async fn fetch_signaling_proposals(
        &self,
        block_number: u64,
        only: Option<&str>,
    ) -> ChainResult<Vec<CWEvent>> {
        if !self.api.has_pallet("Signaling") || !self.api.has_pallet("Voting") {
            info!("Signaling pallets not found, skipping proposals");
            return Ok(Vec::new());
        }
        debug!("Fetching signaling proposals");

        let mut hashes = Vec::new();
        for entry in ["InactiveProposals", "ActiveProposals", "CompletedProposals"] {
            let listed = self.api.storage(None, "Signaling", entry, &[]).await?;
            hashes.extend(
                listed
                    .as_ref()
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|item| match item {
                        // (Hash, BlockNumber)
                        Value::Array(t) if t.len() == 2 => parse_hash(&t[0]),
                        other => parse_hash(other),
                    }),
            );
        }
        hashes.retain(|hash| only.is_none_or(|wanted| wanted == hash));

        let keys: Vec<Vec<Value>> = hashes.iter().map(|hash| vec![json!(hash)]).collect();
        let records = self
            .api
            .storage_multi(None, "Signaling", "ProposalOf", &keys)
            .await?;
        let mut proposals = Vec::new();
        for (hash, record) in hashes.into_iter().zip(records) {
            if let Some(record) = record {
                proposals.push((hash, state::signaling_proposal(&record)?));
            }
        }

        let keys: Vec<Vec<Value>> = proposals
            .iter()
            .map(|(_, proposal)| vec![json!(proposal.vote_id)])
            .collect();
        let votes = self
            .api
            .storage_multi(None, "Voting", "VoteRecords", &keys)
            .await?;

        let mut created = Vec::new();
        let mut progressed = Vec::new();
        for ((hash, proposal), vote) in proposals.into_iter().zip(votes) {
            let Some(vote) = vote else { continue };
            let data = state::signaling_new_proposal(&hash, &proposal, &vote);
            let vote_id = match &data {
                EventData::SignalingNewProposal { vote_id, .. } => vote_id.clone(),
                _ => proposal.vote_id.to_string(),
            };
            created.push(CWEvent::new(block_number, data));

            let end_block = proposal.transition_time;
            if proposal.stage == SignalingStage::Commit {
                progressed.push(EventData::SignalingCommitStarted {
                    proposal_hash: hash.clone(),
                    vote_id: vote_id.clone(),
                    end_block,
                });
            }
            if matches!(proposal.stage, SignalingStage::Voting | SignalingStage::Completed) {
                progressed.push(EventData::SignalingVotingStarted {
                    proposal_hash: hash.clone(),
                    vote_id: vote_id.clone(),
                    end_block,
                });
            }
            if proposal.stage == SignalingStage::Completed {
                progressed.push(EventData::SignalingVotingCompleted {
                    proposal_hash: hash,
                    vote_id,
                });
            }
        }
        info!(count = created.len(), "Found signaling proposals");

        Ok(created
            .into_iter()
            .chain(progressed.into_iter().map(|data| CWEvent::new(block_number, data)))
            .collect())
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// `IdentitySet` for each address with a raw display name.
    ///
    /// Judgements by registrars that no longer exist are dropped.
    #[instrument(skip_all, fields(addresses = addresses.len()))]
    pub async fn fetch_identities(&self, addresses: &[String]) -> ChainResult<Vec<CWEvent>> {
        if !self.api.has_pallet("Identity") {
            info!("Identity pallet not found, skipping identities");
            return Ok(Vec::new());
        }
        let block_number = self.head_number().await?;

        let keys: Vec<Vec<Value>> = addresses.iter().map(|who| vec![json!(who)]).collect();
        let identities = self
            .api
            .storage_multi(None, "Identity", "IdentityOf", &keys)
            .await?;
        let registrars = state::registrars(&*self.api).await?;

        let mut events = Vec::new();
        for (who, identity) in addresses.iter().zip(identities) {
            let Some(identity) = identity else { continue };
            let registration = state::registration(&identity)?;
            let Some(display_name) = registration.display else {
                continue;
            };
            let judgements = registration
                .judgements
                .into_iter()
                .filter_map(|(idx, judgement)| {
                    let registrar = registrars.get(idx as usize).cloned().flatten()?;
                    Some((registrar, judgement))
                })
                .collect();
            events.push(CWEvent::new(
                block_number,
                EventData::IdentitySet {
                    who: who.clone(),
                    display_name,
                    judgements,
                },
            ));
        }
        info!(count = events.len(), "Found identities");
        Ok(events)
    }
}

fn index(id: &str) -> ChainResult<u32> {
    id.parse()
        .map_err(|_| ChainError::DecodeError(format!("invalid entity index {id:?}")))
}

/// Canonical lowercase form of a hash id, or the id unchanged if it is not one.
fn hash_id(id: &str) -> String {
    parse_hash(&json!(id)).unwrap_or_else(|| id.to_string())
}

#[async_trait]
impl<C: ChainApi + ?Sized> StorageFetch for StorageFetcher<C> {
    async fn fetch(&self) -> ChainResult<Vec<CWEvent>> {
        StorageFetcher::fetch(self).await
    }

    async fn fetch_one(
        &self,
        id: &str,
        kind: EntityKind,
        collective: Option<CollectiveName>,
    ) -> ChainResult<Vec<CWEvent>> {
        StorageFetcher::fetch_one(self, id, kind, collective).await
    }

    async fn fetch_identities(&self, addresses: &[String]) -> ChainResult<Vec<CWEvent>> {
        StorageFetcher::fetch_identities(self, addresses).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, IdentityJudgement};
    use crate::testing::{MockChain, account, hash, sample_call};

    fn kinds(events: &[CWEvent]) -> Vec<EventKind> {
        events.iter().map(CWEvent::kind).collect()
    }

    fn democracy(api: &MockChain) {
        api.set_storage(
            "Democracy",
            "PublicProps",
            vec![],
            json!([["0", hash(1), account(1)], ["1", hash(2), account(2)]]),
        );
        // Older runtimes put the balance first
        api.set_storage("Democracy", "DepositOf", vec![json!(0)], json!(["100", [account(1)]]));
        api.set_storage("Democracy", "DepositOf", vec![json!(1)], json!([[account(2)], "250"]));
        api.set_storage("Democracy", "LowestUnbaked", vec![], json!("3"));
        api.set_storage("Democracy", "ReferendumCount", vec![], json!("5"));
        api.set_storage(
            "Democracy",
            "ReferendumInfoOf",
            vec![json!(3)],
            json!({"Ongoing": {"end": "900", "proposal_hash": hash(3), "threshold": "SimpleMajority"}}),
        );
        api.set_storage(
            "Democracy",
            "ReferendumInfoOf",
            vec![json!(4)],
            json!({"Finished": {"approved": false, "end": "10"}}),
        );
        api.set_storage("Democracy", "DispatchQueue", vec![], json!([["1000", hash(4), "2"]]));
    }

    #[tokio::test]
    async fn test_democracy_proposals_read_deposit_in_either_order() {
        let api = MockChain::new();
        api.set_head(77);
        democracy(&api);
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher.fetch_democracy_proposals(77, None).await.unwrap();

        assert_eq!(
            events.iter().map(|e| e.data.clone()).collect::<Vec<_>>(),
            vec![
                EventData::DemocracyProposed {
                    proposal_index: 0,
                    proposal_hash: hash(1),
                    deposit: "100".into(),
                    proposer: account(1)
                },
                EventData::DemocracyProposed {
                    proposal_index: 1,
                    proposal_hash: hash(2),
                    deposit: "250".into(),
                    proposer: account(2)
                },
            ]
        );
        assert!(events.iter().all(|e| e.block_number == 77));
    }

    // Ongoing referenda become Started; queued ones also get a Passed
    #[tokio::test]
    async fn test_referenda_include_dispatch_queue() {
        let api = MockChain::new();
        democracy(&api);
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher.fetch_democracy_referenda(10, None).await.unwrap();

        assert_eq!(
            kinds(&events),
            vec![EventKind::DemocracyStarted, EventKind::DemocracyStarted, EventKind::DemocracyPassed]
        );
        assert_eq!(
            events[1].data,
            EventData::DemocracyStarted {
                referendum_index: 2,
                proposal_hash: hash(4),
                vote_threshold: String::new(),
                end_block: 0
            }
        );
        assert_eq!(
            events[2].data,
            EventData::DemocracyPassed {
                referendum_index: 2,
                dispatch_block: Some(1000)
            }
        );
    }

    #[tokio::test]
    async fn test_treasury_skips_approved_and_missing() {
        let api = MockChain::new();
        api.set_storage("Treasury", "ProposalCount", vec![], json!("4"));
        api.set_storage("Treasury", "Approvals", vec![], json!(["1"]));
        for idx in [0, 1, 3] {
            api.set_storage(
                "Treasury",
                "Proposals",
                vec![json!(idx)],
                json!({"proposer": account(1), "value": "10", "beneficiary": account(2), "bond": "1"}),
            );
        }
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher.fetch_treasury_proposals(5, None).await.unwrap();
        let indices: Vec<u32> = events
            .iter()
            .filter_map(|e| match e.data {
                EventData::TreasuryProposed { proposal_index, .. } => Some(proposal_index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 3]);
    }

    #[tokio::test]
    async fn test_collective_proposals_with_votes() {
        let api = MockChain::new();
        let (_, call) = sample_call();
        api.set_storage("Council", "Proposals", vec![], json!([hash(1)]));
        api.set_storage("Council", "ProposalOf", vec![json!(hash(1))], call);
        api.set_storage(
            "Council",
            "Voting",
            vec![json!(hash(1))],
            json!({"index": "7", "threshold": "3", "ayes": [account(1), account(2)], "nays": [account(3)], "end": "100"}),
        );
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher
            .fetch_collective_proposals(CollectiveName::Council, 20, None)
            .await
            .unwrap();

        assert_eq!(
            kinds(&events),
            vec![
                EventKind::CollectiveProposed,
                EventKind::CollectiveVoted,
                EventKind::CollectiveVoted,
                EventKind::CollectiveVoted
            ]
        );
        let EventData::CollectiveProposed { proposer, proposal_index, threshold, call, .. } = &events[0].data else {
            panic!("unexpected payload {:?}", events[0].data);
        };
        assert_eq!(proposer, "");
        assert_eq!((*proposal_index, *threshold), (7, 3));
        assert_eq!(call.method, "transfer");
        assert_eq!(
            events[3].data,
            EventData::CollectiveVoted {
                collective_name: Some(CollectiveName::Council),
                proposal_hash: hash(1),
                voter: account(3),
                vote: false
            }
        );
    }

    // A motion whose call cannot be read is skipped without failing the fetch
    #[tokio::test]
    async fn test_collective_motion_failure_is_skipped() {
        let api = MockChain::new();
        api.set_storage("Council", "Proposals", vec![], json!([hash(1)]));
        api.set_storage("Council", "Voting", vec![json!(hash(1))], json!({"index": "0", "threshold": "1", "ayes": [], "nays": []}));
        api.fail_storage("Council", "ProposalOf");
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher
            .fetch_collective_proposals(CollectiveName::Council, 1, None)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_signaling_stages() {
        let api = MockChain::new();
        api.set_storage("Signaling", "InactiveProposals", vec![], json!([[hash(1), "10"]]));
        api.set_storage("Signaling", "ActiveProposals", vec![], json!([[hash(2), "20"]]));
        api.set_storage("Signaling", "CompletedProposals", vec![], json!([[hash(3), "30"]]));
        for (byte, stage, vote_id) in [(1u8, "PreVoting", 1), (2, "Voting", 2), (3, "Completed", 3)] {
            api.set_storage(
                "Signaling",
                "ProposalOf",
                vec![json!(hash(byte))],
                json!({"author": account(byte), "stage": {stage: []}, "transition_time": "500", "title": "0x5469746c65", "contents": "0x", "vote_id": vote_id.to_string()}),
            );
            api.set_storage(
                "Voting",
                "VoteRecords",
                vec![json!(vote_id)],
                json!({"id": vote_id.to_string(), "data": {"tally_type": "OnePerson", "vote_type": "Binary"}, "outcomes": ["0x01", "0x00"]}),
            );
        }
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher.fetch_signaling_proposals(40, None).await.unwrap();

        assert_eq!(
            kinds(&events),
            vec![
                EventKind::SignalingNewProposal,
                EventKind::SignalingNewProposal,
                EventKind::SignalingNewProposal,
                EventKind::SignalingVotingStarted,
                EventKind::SignalingVotingStarted,
                EventKind::SignalingVotingCompleted,
            ]
        );
        assert_eq!(
            events[5].data,
            EventData::SignalingVotingCompleted {
                proposal_hash: hash(3),
                vote_id: "3".into()
            }
        );
    }

    #[tokio::test]
    async fn test_signaling_absent_pallet() {
        let api = MockChain::new();
        api.remove_pallet("Signaling");
        let fetcher = StorageFetcher::new(Arc::new(api));
        assert!(fetcher.fetch_signaling_proposals(1, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_identities_skips_undisplayed() {
        let api = MockChain::new();
        api.set_head(9);
        api.set_storage(
            "Identity",
            "IdentityOf",
            vec![json!("a")],
            json!({"judgements": [["0", "KnownGood"], ["1", "Reasonable"]], "info": {"display": {"Raw5": "0x416c696365"}}}),
        );
        api.set_storage("Identity", "Registrars", vec![], json!([{"account": account(8)}, null]));
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher
            .fetch_identities(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, 9);
        assert_eq!(
            events[0].data,
            EventData::IdentitySet {
                who: "a".into(),
                display_name: "Alice".into(),
                judgements: vec![(account(8), IdentityJudgement::KnownGood)]
            }
        );
    }

    // Proposals, referenda and their preimages come out in family order
    #[tokio::test]
    async fn test_fetch_gathers_every_family() {
        let api = MockChain::new();
        api.set_head(50);
        democracy(&api);
        let (bytes, call) = sample_call();
        api.set_call(&bytes, call);
        api.set_storage(
            "Democracy",
            "Preimages",
            vec![json!(hash(3))],
            json!({"Available": {"data": format!("0x{}", hex::encode(&bytes)), "provider": account(6), "deposit": "1", "since": "12", "expiry": null}}),
        );
        api.remove_pallet("Signaling");
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher.fetch().await.unwrap();

        assert_eq!(
            kinds(&events),
            vec![
                EventKind::DemocracyProposed,
                EventKind::DemocracyProposed,
                EventKind::DemocracyStarted,
                EventKind::DemocracyStarted,
                EventKind::DemocracyPassed,
                EventKind::PreimageNoted,
            ]
        );
        let preimage = &events[5];
        assert_eq!(preimage.block_number, 12);
        assert!(events[..5].iter().all(|e| e.block_number == 50));
    }

    #[tokio::test]
    async fn test_fetch_fails_fast() {
        let api = MockChain::new();
        democracy(&api);
        api.fail_storage("Treasury", "ProposalCount");
        let fetcher = StorageFetcher::new(Arc::new(api));

        assert!(fetcher.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_one_by_index() {
        let api = MockChain::new();
        democracy(&api);
        let fetcher = StorageFetcher::new(Arc::new(api));

        let events = fetcher
            .fetch_one("3", EntityKind::DemocracyReferendum, None)
            .await
            .unwrap();
        assert_eq!(kinds(&events), vec![EventKind::DemocracyStarted]);

        let events = fetcher
            .fetch_one("1", EntityKind::DemocracyProposal, None)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        assert!(fetcher.fetch_one("x", EntityKind::TreasuryProposal, None).await.is_err());
        assert!(fetcher
            .fetch_one(&hash(9), EntityKind::CollectiveProposal, Some(CollectiveName::TechnicalCommittee))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_accepts_uppercase_hash() {
        let api = MockChain::new();
        let (_, call) = sample_call();
        api.set_storage("Council", "Proposals", vec![], json!([hash(0xab)]));
        api.set_storage("Council", "ProposalOf", vec![json!(hash(0xab))], call);
        api.set_storage("Council", "Voting", vec![json!(hash(0xab))], json!({"index": "4", "threshold": "2", "ayes": [], "nays": []}));
        let fetcher = StorageFetcher::new(Arc::new(api));

        let id = format!("0x{}", hash(0xab)[2..].to_uppercase());
        let events = fetcher
            .fetch_one(&id, EntityKind::CollectiveProposal, Some(CollectiveName::Council))
            .await
            .unwrap();

        assert_eq!(kinds(&events), vec![EventKind::CollectiveProposed]);
        let EventData::CollectiveProposed { proposal_hash, .. } = &events[0].data else {
            panic!("unexpected payload {:?}", events[0].data);
        };
        assert_eq!(proposal_hash, &hash(0xab));
    }
}
