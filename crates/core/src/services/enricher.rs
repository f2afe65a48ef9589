//! Enrichment of classified raw data into normalized events.
//!
//! Each kind reads its positional arguments and, where the event alone does
//! not carry enough, queries chain state. Any failed query, absent value or
//! unexpected shape fails only the item being enriched.

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::{StreamExt, stream};
use serde_json::{Value, json};
use tracing::trace;

use super::state;
use crate::error::{EnrichError, EnrichResult};
use crate::models::{
    ActiveExposure, BlockHash, CWEvent, ChainEvent, ChainExtrinsic, CollectiveName, DecodedCall,
    EventData, EventKind, ExposureShare, RawDatum, ValidatorInfo,
};
use crate::ports::ChainApi;
use crate::utils::{
    parse_account, parse_accounts, parse_amount, parse_bool, parse_bytes, parse_hash, parse_u32,
    parse_u64, value_to_arg_string,
};

/// Per-validator lookups in flight while enriching a new session.
const VALIDATOR_QUERY_CONCURRENCY: usize = 8;

/// Build the normalized event for a classified raw datum.
///
/// Trusts the classification: `kind` must be what the classifier returned
/// for `raw`.
pub async fn enrich<C: ChainApi + ?Sized>(
    api: &C,
    block_number: u64,
    kind: EventKind,
    raw: RawDatum<'_>,
) -> EnrichResult<CWEvent> {
    trace!(block_number, %kind, datum = raw.describe(), "Enriching");
    match raw {
        RawDatum::Event(event) => enrich_event(api, block_number, kind, event).await,
        RawDatum::Extrinsic(extrinsic) => {
            enrich_extrinsic(api, block_number, kind, extrinsic).await
        }
    }
}

// =============================================================================
// Argument access
// =============================================================================

/// Positional arguments of a raw event.
struct Args<'a> {
    kind: EventKind,
    data: &'a [Value],
}

impl<'a> Args<'a> {
    fn get(&self, idx: usize) -> EnrichResult<&'a Value> {
        self.data
            .get(idx)
            .ok_or_else(|| EnrichError::Decode(format!("{}: missing argument {idx}", self.kind)))
    }

    fn parse<T>(
        &self,
        idx: usize,
        what: &str,
        f: impl FnOnce(&Value) -> Option<T>,
    ) -> EnrichResult<T> {
        let value = self.get(idx)?;
        f(value).ok_or_else(|| {
            EnrichError::Decode(format!(
                "{}: argument {idx} is not {what}: {value}",
                self.kind
            ))
        })
    }

    fn account(&self, idx: usize) -> EnrichResult<String> {
        self.parse(idx, "an account", parse_account)
    }

    fn amount(&self, idx: usize) -> EnrichResult<String> {
        self.parse(idx, "a balance", parse_amount)
    }

    fn u32(&self, idx: usize) -> EnrichResult<u32> {
        self.parse(idx, "a u32", parse_u32)
    }

    fn u64(&self, idx: usize) -> EnrichResult<u64> {
        self.parse(idx, "a u64", parse_u64)
    }

    fn hash(&self, idx: usize) -> EnrichResult<String> {
        self.parse(idx, "a hash", parse_hash)
    }

    fn bool(&self, idx: usize) -> EnrichResult<bool> {
        self.parse(idx, "a boolean", parse_bool)
    }
}

fn unexpected(what: &str, value: &Value) -> EnrichError {
    EnrichError::Decode(format!("unexpected {what}: {value}"))
}

/// Fetch a storage value that must exist.
async fn required<C: ChainApi + ?Sized>(
    api: &C,
    at: Option<&BlockHash>,
    pallet: &str,
    entry: &str,
    keys: &[Value],
) -> EnrichResult<Value> {
    api.storage(at, pallet, entry, keys)
        .await?
        .ok_or_else(|| EnrichError::missing(&format!("{pallet}.{entry}"), Value::from(keys.to_vec())))
}

/// Metadata pallet name for a collective event section.
fn collective_pallet(section: &str) -> String {
    let mut chars = section.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Events
// =============================================================================

async fn enrich_event<C: ChainApi + ?Sized>(
    api: &C,
    block_number: u64,
    kind: EventKind,
    event: &ChainEvent,
) -> EnrichResult<CWEvent> {
    let args = Args {
        kind,
        data: &event.data,
    };
    let emit = |data: EventData| CWEvent::new(block_number, data);

    let enriched = match kind {
        // ---------------------------------------------------------------------
        // Staking
        // ---------------------------------------------------------------------
        EventKind::Slash => {
            let validator = args.account(0)?;
            emit(EventData::Slash {
                validator: validator.clone(),
                amount: args.amount(1)?,
            })
            .including(validator)
        }
        EventKind::Reward => {
            // Older runtimes emit (Balance, Balance), newer (AccountId, Balance).
            if args.data.len() >= 2 && parse_amount(args.get(0)?).is_none() {
                let validator = args.account(0)?;
                emit(EventData::Reward {
                    validator: Some(validator.clone()),
                    amount: args.amount(1)?,
                })
                .including(validator)
            } else {
                emit(EventData::Reward {
                    validator: None,
                    amount: args.amount(0)?,
                })
            }
        }
        EventKind::Bonded | EventKind::Unbonded => {
            let stash = args.account(0)?;
            let amount = args.amount(1)?;
            let at = api.block_hash(block_number).await?;
            let controller =
                required(api, Some(&at), "Staking", "Bonded", &[json!(stash)]).await?;
            let controller =
                parse_account(&controller).ok_or_else(|| unexpected("controller", &controller))?;
            let data = if kind == EventKind::Bonded {
                EventData::Bonded {
                    stash: stash.clone(),
                    amount,
                    controller,
                }
            } else {
                EventData::Unbonded {
                    stash: stash.clone(),
                    amount,
                    controller,
                }
            };
            emit(data).including(stash)
        }

        // ---------------------------------------------------------------------
        // Democracy
        // ---------------------------------------------------------------------
        EventKind::VoteDelegated => {
            let target = args.account(1)?;
            emit(EventData::VoteDelegated {
                who: args.account(0)?,
                target: target.clone(),
            })
            .including(target)
        }
        EventKind::DemocracyProposed => {
            let proposal_index = args.u32(0)?;
            let deposit = args.amount(1)?;
            let props = required(api, None, "Democracy", "PublicProps", &[]).await?;
            let prop = props
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_array)
                .find(|t| t.len() >= 3 && parse_u32(&t[0]) == Some(proposal_index))
                .ok_or_else(|| EnrichError::missing("Democracy.PublicProps", proposal_index))?;
            let proposal_hash =
                state::proposal_hash_of(&prop[1]).ok_or_else(|| unexpected("proposal", &prop[1]))?;
            let proposer = parse_account(&prop[2]).ok_or_else(|| unexpected("proposer", &prop[2]))?;
            emit(EventData::DemocracyProposed {
                proposal_index,
                proposal_hash,
                deposit,
                proposer: proposer.clone(),
            })
            .excluding(proposer)
        }
        EventKind::DemocracyTabled => emit(EventData::DemocracyTabled {
            proposal_index: args.u32(0)?,
        }),
        EventKind::DemocracyStarted => {
            let referendum_index = args.u32(0)?;
            let info = required(
                api,
                None,
                "Democracy",
                "ReferendumInfoOf",
                &[json!(referendum_index)],
            )
            .await?;
            let referendum = state::ongoing_referendum(&info)?.ok_or_else(|| {
                EnrichError::Decode(format!("referendum {referendum_index} is not ongoing"))
            })?;
            let vote_threshold = args
                .data
                .get(1)
                .map(state::variant_name)
                .unwrap_or(referendum.threshold);
            emit(EventData::DemocracyStarted {
                referendum_index,
                proposal_hash: referendum.proposal_hash,
                vote_threshold,
                end_block: referendum.end,
            })
        }
        EventKind::DemocracyPassed => {
            let referendum_index = args.u32(0)?;
            let dispatch_block = state::dispatch_queue(api)
                .await?
                .into_iter()
                .find(|(_, _, idx)| *idx == referendum_index)
                .map(|(block, _, _)| block);
            emit(EventData::DemocracyPassed {
                referendum_index,
                dispatch_block,
            })
        }
        EventKind::DemocracyNotPassed => emit(EventData::DemocracyNotPassed {
            referendum_index: args.u32(0)?,
        }),
        EventKind::DemocracyCancelled => emit(EventData::DemocracyCancelled {
            referendum_index: args.u32(0)?,
        }),
        EventKind::DemocracyExecuted => emit(EventData::DemocracyExecuted {
            referendum_index: args.u32(0)?,
            execution_ok: args.bool(1)?,
        }),

        // ---------------------------------------------------------------------
        // Preimages
        // ---------------------------------------------------------------------
        EventKind::PreimageNoted => {
            let proposal_hash = args.hash(0)?;
            let noter = args.account(1)?;
            let preimage = state::preimage(api, &proposal_hash)
                .await?
                .ok_or_else(|| EnrichError::missing("Democracy.Preimages", &proposal_hash))?;
            emit(EventData::PreimageNoted {
                proposal_hash,
                noter: noter.clone(),
                preimage: preimage.call,
            })
            .excluding(noter)
        }
        EventKind::PreimageUsed => emit(EventData::PreimageUsed {
            proposal_hash: args.hash(0)?,
            noter: args.account(1)?,
        }),
        EventKind::PreimageInvalid => emit(EventData::PreimageInvalid {
            proposal_hash: args.hash(0)?,
            referendum_index: args.u32(1)?,
        }),
        EventKind::PreimageMissing => emit(EventData::PreimageMissing {
            proposal_hash: args.hash(0)?,
            referendum_index: args.u32(1)?,
        }),
        EventKind::PreimageReaped => {
            let reaper = args.account(3)?;
            emit(EventData::PreimageReaped {
                proposal_hash: args.hash(0)?,
                noter: args.account(1)?,
                reaper: reaper.clone(),
            })
            .excluding(reaper)
        }

        // ---------------------------------------------------------------------
        // Treasury
        // ---------------------------------------------------------------------
        EventKind::TreasuryProposed => {
            let proposal_index = args.u32(0)?;
            let value =
                required(api, None, "Treasury", "Proposals", &[json!(proposal_index)]).await?;
            let proposal = state::treasury_proposal(&value)?;
            emit(EventData::TreasuryProposed {
                proposal_index,
                proposer: proposal.proposer.clone(),
                value: proposal.value,
                beneficiary: proposal.beneficiary,
                bond: proposal.bond,
            })
            .excluding(proposal.proposer)
        }
        EventKind::TreasuryAwarded => emit(EventData::TreasuryAwarded {
            proposal_index: args.u32(0)?,
            value: args.amount(1)?,
            beneficiary: args.account(2)?,
        }),
        EventKind::TreasuryRejected => emit(EventData::TreasuryRejected {
            proposal_index: args.u32(0)?,
        }),

        // ---------------------------------------------------------------------
        // Elections
        // ---------------------------------------------------------------------
        EventKind::ElectionNewTerm => {
            let new_members = parse_accounts(args.get(0)?);
            let round = state::election_round(api).await?;
            let all_members = state::election_members(api).await?;
            emit(EventData::ElectionNewTerm {
                round,
                new_members,
                all_members,
            })
        }
        EventKind::ElectionEmptyTerm => {
            let round = state::election_round(api).await?;
            let members = state::election_members(api).await?;
            emit(EventData::ElectionEmptyTerm { round, members })
        }
        EventKind::ElectionMemberKicked => emit(EventData::ElectionMemberKicked {
            who: args.account(0)?,
        }),
        EventKind::ElectionMemberRenounced => emit(EventData::ElectionMemberRenounced {
            who: args.account(0)?,
        }),
        EventKind::ElectionCandidacySubmitted => {
            return Err(EnrichError::Unsupported {
                kind: kind.as_str(),
                datum: "event",
            });
        }

        // ---------------------------------------------------------------------
        // Collectives
        // ---------------------------------------------------------------------
        EventKind::CollectiveProposed => {
            let collective_name = CollectiveName::from_section(&event.section);
            let proposer = args.account(0)?;
            let proposal_hash = args.hash(2)?;
            let pallet = collective_pallet(&event.section);
            let call =
                required(api, None, &pallet, "ProposalOf", &[json!(proposal_hash)]).await?;
            let call = DecodedCall::from_value(&call).ok_or_else(|| unexpected("call", &call))?;
            emit(EventData::CollectiveProposed {
                collective_name,
                proposer: proposer.clone(),
                proposal_index: args.u32(1)?,
                proposal_hash,
                threshold: args.u32(3)?,
                call,
            })
            .excluding(proposer)
        }
        EventKind::CollectiveVoted => {
            let voter = args.account(0)?;
            emit(EventData::CollectiveVoted {
                collective_name: CollectiveName::from_section(&event.section),
                proposal_hash: args.hash(1)?,
                voter: voter.clone(),
                vote: args.bool(2)?,
            })
            .excluding(voter)
        }
        EventKind::CollectiveApproved => emit(EventData::CollectiveApproved {
            collective_name: CollectiveName::from_section(&event.section),
            proposal_hash: args.hash(0)?,
        }),
        EventKind::CollectiveDisapproved => emit(EventData::CollectiveDisapproved {
            collective_name: CollectiveName::from_section(&event.section),
            proposal_hash: args.hash(0)?,
        }),
        EventKind::CollectiveExecuted => emit(EventData::CollectiveExecuted {
            collective_name: CollectiveName::from_section(&event.section),
            proposal_hash: args.hash(0)?,
            execution_ok: args.bool(1)?,
        }),
        EventKind::CollectiveMemberExecuted => emit(EventData::CollectiveMemberExecuted {
            collective_name: CollectiveName::from_section(&event.section),
            proposal_hash: args.hash(0)?,
            execution_ok: args.bool(1)?,
        }),

        // ---------------------------------------------------------------------
        // Signaling
        // ---------------------------------------------------------------------
        EventKind::SignalingNewProposal => {
            let proposer = args.account(0)?;
            let proposal_hash = args.hash(1)?;
            let record =
                required(api, None, "Signaling", "ProposalOf", &[json!(proposal_hash)]).await?;
            let proposal = state::signaling_proposal(&record)?;
            let vote =
                required(api, None, "Voting", "VoteRecords", &[json!(proposal.vote_id)]).await?;
            emit(state::signaling_new_proposal(&proposal_hash, &proposal, &vote))
                .excluding(proposer)
        }
        EventKind::SignalingCommitStarted => emit(EventData::SignalingCommitStarted {
            proposal_hash: args.hash(0)?,
            vote_id: args.u64(1)?.to_string(),
            end_block: args.u64(2)?,
        }),
        EventKind::SignalingVotingStarted => emit(EventData::SignalingVotingStarted {
            proposal_hash: args.hash(0)?,
            vote_id: args.u64(1)?.to_string(),
            end_block: args.u64(2)?,
        }),
        EventKind::SignalingVotingCompleted => emit(EventData::SignalingVotingCompleted {
            proposal_hash: args.hash(0)?,
            vote_id: args.u64(1)?.to_string(),
        }),

        // ---------------------------------------------------------------------
        // Treasury reward
        // ---------------------------------------------------------------------
        EventKind::TreasuryRewardMinting => emit(EventData::TreasuryRewardMinting {
            pot: args.amount(0)?,
            reward: args.amount(1)?,
        }),
        EventKind::TreasuryRewardMintingV2 => emit(EventData::TreasuryRewardMintingV2 {
            pot: args.amount(0)?,
            pot_address: args.account(2)?,
        }),

        // ---------------------------------------------------------------------
        // Identity
        // ---------------------------------------------------------------------
        EventKind::IdentitySet => {
            let who = args.account(0)?;
            emit(identity_set(api, &who).await?).excluding(who)
        }
        EventKind::JudgementGiven => {
            let who = args.account(0)?;
            let registrar_index = args.u32(1)?;
            let registrar = state::registrars(api)
                .await?
                .get(registrar_index as usize)
                .cloned()
                .flatten()
                .ok_or_else(|| EnrichError::missing("Identity.Registrars", registrar_index))?;
            let value = required(api, None, "Identity", "IdentityOf", &[json!(who)]).await?;
            let judgement = state::registration(&value)?
                .judgements
                .into_iter()
                .find(|(idx, _)| *idx == registrar_index)
                .map(|(_, judgement)| judgement)
                .ok_or_else(|| {
                    EnrichError::Decode(format!(
                        "no judgement from registrar {registrar_index} on {who}"
                    ))
                })?;
            emit(EventData::JudgementGiven {
                who,
                registrar,
                judgement,
            })
        }
        EventKind::IdentityCleared => {
            let who = args.account(0)?;
            emit(EventData::IdentityCleared { who: who.clone() }).excluding(who)
        }
        EventKind::IdentityKilled => emit(EventData::IdentityKilled {
            who: args.account(0)?,
        }),

        // ---------------------------------------------------------------------
        // Session and validator health
        // ---------------------------------------------------------------------
        EventKind::NewSession => emit(new_session(api, block_number).await?),
        EventKind::HeartbeatReceived => {
            let raw = args.get(0)?;
            emit(EventData::HeartbeatReceived {
                authority_id: parse_account(raw).unwrap_or_else(|| value_to_arg_string(raw)),
            })
        }
        EventKind::SomeOffline => {
            let at = api.block_hash(block_number).await?;
            let session_index = state::session_index(api, &at).await?.saturating_sub(1);
            emit(EventData::SomeOffline {
                session_index,
                validators: parse_accounts(args.get(0)?),
            })
        }
        EventKind::AllGood => {
            let at = api.block_hash(block_number).await?;
            let session_index = state::session_index(api, &at).await?.saturating_sub(1);
            emit(EventData::AllGood {
                session_index,
                validators: state::session_validators(api, &at).await?,
            })
        }
        EventKind::Offence => emit(offence(api, &args).await?),
    };

    Ok(enriched)
}

async fn identity_set<C: ChainApi + ?Sized>(api: &C, who: &str) -> EnrichResult<EventData> {
    let value = required(api, None, "Identity", "IdentityOf", &[json!(who)]).await?;
    let registration = state::registration(&value)?;
    let display_name = registration
        .display
        .ok_or_else(|| EnrichError::Decode(format!("identity of {who} has no raw display name")))?;

    let judgements = if registration.judgements.is_empty() {
        Vec::new()
    } else {
        let registrars = state::registrars(api).await?;
        registration
            .judgements
            .into_iter()
            .map(|(idx, judgement)| {
                registrars
                    .get(idx as usize)
                    .cloned()
                    .flatten()
                    .map(|account| (account, judgement))
                    .ok_or_else(|| EnrichError::Decode(format!("invalid registrar {idx}")))
            })
            .collect::<EnrichResult<Vec<_>>>()?
    };

    Ok(EventData::IdentitySet {
        who: who.to_string(),
        display_name,
        judgements,
    })
}

async fn offence<C: ChainApi + ?Sized>(api: &C, args: &Args<'_>) -> EnrichResult<EventData> {
    let offence_kind = format!("0x{}", hex::encode(args.parse(0, "bytes", parse_bytes)?));
    let opaque_time_slot = format!("0x{}", hex::encode(args.parse(1, "bytes", parse_bytes)?));
    // Newer runtimes dropped the `applied` flag.
    let applied = args.data.get(2).and_then(parse_bool).unwrap_or(false);

    let report_ids: Vec<String> = api
        .storage(
            None,
            "Offences",
            "ConcurrentReportsIndex",
            &[json!(offence_kind), json!(opaque_time_slot)],
        )
        .await?
        .as_ref()
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(parse_hash).collect())
        .unwrap_or_default();

    let keys: Vec<Vec<Value>> = report_ids.iter().map(|id| vec![json!(id)]).collect();
    let offenders = api
        .storage_multi(None, "Offences", "Reports", &keys)
        .await?
        .iter()
        .flatten()
        .filter_map(|report| match report.get("offender")? {
            Value::Array(tuple) if !tuple.is_empty() && tuple.len() != 32 => {
                parse_account(&tuple[0])
            }
            other => parse_account(other),
        })
        .collect();

    Ok(EventData::Offence {
        offence_kind,
        opaque_time_slot,
        applied,
        offenders,
    })
}

// =============================================================================
// New session
// =============================================================================

async fn new_session<C: ChainApi + ?Sized>(api: &C, block_number: u64) -> EnrichResult<EventData> {
    let at = api.block_hash(block_number).await?;
    let session_index = state::session_index(api, &at).await?;
    let active = state::session_validators(api, &at).await?;
    let current_era = if api.has_storage("Staking", "CurrentEra") {
        api.storage(Some(&at), "Staking", "CurrentEra", &[])
            .await?
            .as_ref()
            .and_then(parse_u32)
    } else {
        None
    };

    // Exposures of the next elected set, keyed by stash.
    let exposures: HashMap<String, Value> = match current_era {
        Some(era) if api.has_storage("Staking", "ErasStakers") => api
            .storage_entries(Some(&at), "Staking", "ErasStakers", &[json!(era)])
            .await?
            .into_iter()
            .filter_map(|(keys, value)| Some((parse_account(keys.last()?)?, value)))
            .collect(),
        _ => HashMap::new(),
    };
    let next_elected: HashSet<&str> = if exposures.is_empty() {
        active.iter().map(String::as_str).collect()
    } else {
        exposures.keys().map(String::as_str).collect()
    };

    let waiting: Vec<String> = api
        .storage_entries(Some(&at), "Staking", "Validators", &[])
        .await?
        .into_iter()
        .filter_map(|(keys, _)| keys.last().and_then(parse_account))
        .filter(|stash| !next_elected.contains(stash.as_str()))
        .collect();

    let points = match current_era {
        Some(era) => api
            .storage(Some(&at), "Staking", "ErasRewardPoints", &[json!(era)])
            .await?
            .map(|v| era_points(&v))
            .unwrap_or_default(),
        None => HashMap::new(),
    };

    let active_exposures: BTreeMap<String, ActiveExposure> = active
        .iter()
        .filter_map(|stash| Some((stash.clone(), exposure(exposures.get(stash)?)?)))
        .collect();

    let stashes: Vec<String> = active.iter().chain(waiting.iter()).cloned().collect();
    let validator_info = stream::iter(stashes)
        .map(|stash| validator_info(api, &at, current_era, stash, &points))
        .buffer_unordered(VALIDATOR_QUERY_CONCURRENCY)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<EnrichResult<BTreeMap<_, _>>>()?;

    Ok(EventData::NewSession {
        active_exposures,
        active,
        waiting,
        session_index,
        current_era,
        validator_info,
    })
}

async fn validator_info<C: ChainApi + ?Sized>(
    api: &C,
    at: &BlockHash,
    era: Option<u32>,
    stash: String,
    points: &HashMap<String, u32>,
) -> EnrichResult<(String, ValidatorInfo)> {
    let prefs = match era {
        Some(era) if api.has_storage("Staking", "ErasValidatorPrefs") => {
            api.storage(
                Some(at),
                "Staking",
                "ErasValidatorPrefs",
                &[json!(era), json!(stash)],
            )
            .await?
        }
        _ => {
            api.storage(Some(at), "Staking", "Validators", &[json!(stash)])
                .await?
        }
    };
    let controller = api
        .storage(Some(at), "Staking", "Bonded", &[json!(stash)])
        .await?;
    let payee = api
        .storage(Some(at), "Staking", "Payee", &[json!(stash)])
        .await?;

    let info = ValidatorInfo {
        commission_perbill: prefs
            .as_ref()
            .and_then(|p| p.get("commission"))
            .and_then(parse_u32)
            .unwrap_or_default(),
        controller_id: controller
            .as_ref()
            .and_then(parse_account)
            .unwrap_or_else(|| stash.clone()),
        reward_destination: payee.unwrap_or(Value::Null),
        era_points: points.get(&stash).copied().unwrap_or_default(),
    };
    Ok((stash, info))
}

/// Individual era points from an `EraRewardPoints` value.
fn era_points(value: &Value) -> HashMap<String, u32> {
    match value.get("individual") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let pair = item.as_array()?;
                Some((parse_account(pair.first()?)?, parse_u32(pair.get(1)?)?))
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(who, pts)| Some((who.clone(), parse_u32(pts)?)))
            .collect(),
        _ => HashMap::new(),
    }
}

fn exposure(value: &Value) -> Option<ActiveExposure> {
    let others = value
        .get("others")
        .and_then(Value::as_array)
        .map(|others| {
            others
                .iter()
                .filter_map(|share| {
                    Some(ExposureShare {
                        who: share.get("who").and_then(parse_account)?,
                        value: share.get("value").and_then(parse_amount)?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(ActiveExposure {
        own: value.get("own").and_then(parse_amount)?,
        total: value.get("total").and_then(parse_amount)?,
        others,
    })
}

// =============================================================================
// Extrinsics
// =============================================================================

async fn enrich_extrinsic<C: ChainApi + ?Sized>(
    api: &C,
    block_number: u64,
    kind: EventKind,
    extrinsic: &ChainExtrinsic,
) -> EnrichResult<CWEvent> {
    match kind {
        EventKind::ElectionCandidacySubmitted => {
            let candidate = extrinsic
                .signer
                .clone()
                .ok_or_else(|| EnrichError::Decode(format!("{kind} extrinsic is unsigned")))?;
            let round = state::election_round(api).await?;
            Ok(CWEvent::new(
                block_number,
                EventData::ElectionCandidacySubmitted {
                    round,
                    candidate: candidate.clone(),
                },
            )
            .excluding(candidate))
        }
        _ => Err(EnrichError::Unsupported {
            kind: kind.as_str(),
            datum: "extrinsic",
        }),
    }
}
