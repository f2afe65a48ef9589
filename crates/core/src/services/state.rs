//! Typed readers for the storage entries the pipeline consults.
//!
//! Shared by the enricher and the storage fetcher. Readers return
//! `Ok(None)` when the value is absent and a decode error when it is
//! present but malformed.

use serde_json::{Value, json};

use crate::error::{ChainError, ChainResult};
use crate::models::{BlockHash, DecodedCall, EventData, IdentityJudgement};
use crate::ports::ChainApi;
use crate::utils::{
    parse_account, parse_amount, parse_bytes, parse_hash, parse_text, parse_u32, parse_u64,
    value_to_arg_string, variant,
};

/// Election pallet names, in lookup order.
const ELECTION_PALLETS: [&str; 3] = ["ElectionsPhragmen", "PhragmenElection", "Elections"];

pub(crate) fn decode_err(what: &str, value: &Value) -> ChainError {
    ChainError::DecodeError(format!("unexpected {what}: {value}"))
}

/// Hash of a proposal, whether stored as a plain hash or a bounded call
/// (`{"Legacy": {"hash": ..}}`, `{"Lookup": {"hash": .., "len": ..}}`).
pub(crate) fn proposal_hash_of(value: &Value) -> Option<String> {
    if let Some(hash) = parse_hash(value) {
        return Some(hash);
    }
    if let Some(hash) = value.get("hash").and_then(parse_hash) {
        return Some(hash);
    }
    let (_, inner) = variant(value)?;
    inner.get("hash").and_then(parse_hash)
}

/// Name of the enum variant, or the value rendered as text.
pub(crate) fn variant_name(value: &Value) -> String {
    match variant(value) {
        Some((name, _)) => name.to_string(),
        None => value_to_arg_string(value),
    }
}

// =============================================================================
// Democracy
// =============================================================================

/// A referendum that is still being voted on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OngoingReferendum {
    pub proposal_hash: String,
    pub end: u64,
    pub threshold: String,
}

/// Parse `ReferendumInfoOf`: `{"Ongoing": status}` or a legacy bare status.
///
/// Returns `None` for finished referenda.
pub(crate) fn ongoing_referendum(info: &Value) -> ChainResult<Option<OngoingReferendum>> {
    let status = match variant(info) {
        Some(("Ongoing", status)) => status,
        Some(("Finished", _)) => return Ok(None),
        _ if info.get("end").is_some() => info,
        _ => return Err(decode_err("referendum info", info)),
    };
    let end = status
        .get("end")
        .and_then(parse_u64)
        .ok_or_else(|| decode_err("referendum end", status))?;
    let proposal_hash = status
        .get("proposal_hash")
        .or_else(|| status.get("proposal"))
        .and_then(proposal_hash_of)
        .ok_or_else(|| decode_err("referendum proposal", status))?;
    let threshold = status
        .get("threshold")
        .map(variant_name)
        .unwrap_or_default();
    Ok(Some(OngoingReferendum {
        proposal_hash,
        end,
        threshold,
    }))
}

/// `Democracy.DispatchQueue` entries as `(dispatch_block, hash, referendum_index)`.
pub(crate) async fn dispatch_queue<C: ChainApi + ?Sized>(
    api: &C,
) -> ChainResult<Vec<(u64, String, u32)>> {
    if !api.has_storage("Democracy", "DispatchQueue") {
        return Ok(Vec::new());
    }
    let Some(queue) = api.storage(None, "Democracy", "DispatchQueue", &[]).await? else {
        return Ok(Vec::new());
    };
    let items = queue.as_array().cloned().unwrap_or_default();
    items
        .iter()
        .map(|item| {
            let tuple = item.as_array().filter(|t| t.len() >= 3);
            tuple
                .and_then(|t| {
                    Some((
                        parse_u64(&t[0])?,
                        proposal_hash_of(&t[1])?,
                        parse_u32(&t[2])?,
                    ))
                })
                .ok_or_else(|| decode_err("dispatch queue entry", item))
        })
        .collect()
}

/// A noted preimage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Preimage {
    pub call: DecodedCall,
    pub provider: Option<String>,
    pub since: Option<u64>,
}

/// Look up and decode `Democracy.Preimages(hash)`.
///
/// Preimages that are recorded as missing count as absent.
pub(crate) async fn preimage<C: ChainApi + ?Sized>(
    api: &C,
    hash: &str,
) -> ChainResult<Option<Preimage>> {
    let Some(status) = api
        .storage(None, "Democracy", "Preimages", &[json!(hash)])
        .await?
    else {
        return Ok(None);
    };

    let (bytes, provider, since) = match variant(&status) {
        Some(("Available", image)) => (
            image.get("data").and_then(parse_bytes),
            image.get("provider").and_then(parse_account),
            image.get("since").and_then(parse_u64),
        ),
        Some(("Missing", _)) => return Ok(None),
        // Legacy tuple: (Bytes, AccountId, Balance, BlockNumber)
        _ => match status.as_array() {
            Some(t) if t.len() >= 4 => (parse_bytes(&t[0]), parse_account(&t[1]), parse_u64(&t[3])),
            _ => (None, None, None),
        },
    };
    let bytes = bytes.ok_or_else(|| decode_err("preimage", &status))?;
    let decoded = api.decode_call(&bytes).await?;
    let call = DecodedCall::from_value(&decoded).ok_or_else(|| decode_err("call", &decoded))?;
    Ok(Some(Preimage {
        call,
        provider,
        since,
    }))
}

// =============================================================================
// Treasury
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TreasuryProposal {
    pub proposer: String,
    pub value: String,
    pub beneficiary: String,
    pub bond: String,
}

pub(crate) fn treasury_proposal(value: &Value) -> ChainResult<TreasuryProposal> {
    let field = |name: &str| value.get(name).ok_or_else(|| decode_err("treasury proposal", value));
    let account = |name: &str| {
        field(name).and_then(|v| parse_account(v).ok_or_else(|| decode_err(name, v)))
    };
    let amount = |name: &str| {
        field(name).and_then(|v| parse_amount(v).ok_or_else(|| decode_err(name, v)))
    };
    Ok(TreasuryProposal {
        proposer: account("proposer")?,
        value: amount("value")?,
        beneficiary: account("beneficiary")?,
        bond: amount("bond")?,
    })
}

// =============================================================================
// Elections
// =============================================================================

/// Metadata name of the elections pallet on this runtime.
pub(crate) fn elections_pallet<C: ChainApi + ?Sized>(api: &C) -> ChainResult<&'static str> {
    ELECTION_PALLETS
        .into_iter()
        .find(|p| api.has_pallet(p))
        .ok_or_else(|| ChainError::MetadataError("no elections pallet".into()))
}

/// Member accounts from `(AccountId, Balance)` tuples or `SeatHolder` structs.
pub(crate) fn members(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => obj.get("who").and_then(parse_account),
                    Value::Array(t) if !t.is_empty() => parse_account(&t[0]),
                    other => parse_account(other),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Current election round.
pub(crate) async fn election_round<C: ChainApi + ?Sized>(api: &C) -> ChainResult<u32> {
    let pallet = elections_pallet(api)?;
    Ok(api
        .storage(None, pallet, "ElectionRounds", &[])
        .await?
        .as_ref()
        .and_then(parse_u32)
        .unwrap_or_default())
}

/// Current election members.
pub(crate) async fn election_members<C: ChainApi + ?Sized>(api: &C) -> ChainResult<Vec<String>> {
    let pallet = elections_pallet(api)?;
    Ok(api
        .storage(None, pallet, "Members", &[])
        .await?
        .map(|v| members(&v))
        .unwrap_or_default())
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Registration {
    /// Raw display name, if one is set.
    pub display: Option<String>,
    pub judgements: Vec<(u32, IdentityJudgement)>,
}

/// Parse an `IdentityOf` value, with or without the trailing username.
pub(crate) fn registration(value: &Value) -> ChainResult<Registration> {
    let reg = match value.as_array() {
        Some(t) if !t.is_empty() && t[0].get("info").is_some() => &t[0],
        _ => value,
    };
    let info = reg
        .get("info")
        .ok_or_else(|| decode_err("identity registration", value))?;

    let display = info.get("display").and_then(|d| match variant(d) {
        Some((name, raw)) if name.starts_with("Raw") => parse_text(raw).or(Some(String::new())),
        _ => None,
    });

    let judgements = reg
        .get("judgements")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|j| {
                    let t = j.as_array()?;
                    Some((parse_u32(t.first()?)?, IdentityJudgement::from_value(t.get(1)?)))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Registration {
        display,
        judgements,
    })
}

/// Registrar accounts by index; `None` for vacated slots.
pub(crate) async fn registrars<C: ChainApi + ?Sized>(api: &C) -> ChainResult<Vec<Option<String>>> {
    let value = api.storage(None, "Identity", "Registrars", &[]).await?;
    Ok(value
        .as_ref()
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|r| r.get("account").and_then(parse_account))
                .collect()
        })
        .unwrap_or_default())
}

// =============================================================================
// Signaling
// =============================================================================

/// Stage of a signaling proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalingStage {
    PreVoting,
    Commit,
    Voting,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SignalingProposal {
    pub author: String,
    pub stage: SignalingStage,
    pub transition_time: u64,
    pub title: String,
    pub contents: String,
    pub vote_id: u64,
}

pub(crate) fn signaling_proposal(value: &Value) -> ChainResult<SignalingProposal> {
    let stage = match value.get("stage").map(variant_name).as_deref() {
        Some("Commit") => SignalingStage::Commit,
        Some("Voting") => SignalingStage::Voting,
        Some("Completed") => SignalingStage::Completed,
        Some(_) => SignalingStage::PreVoting,
        None => return Err(decode_err("signaling proposal", value)),
    };
    Ok(SignalingProposal {
        author: value
            .get("author")
            .and_then(parse_account)
            .ok_or_else(|| decode_err("signaling author", value))?,
        stage,
        transition_time: value
            .get("transition_time")
            .and_then(parse_u64)
            .unwrap_or_default(),
        title: value.get("title").and_then(parse_text).unwrap_or_default(),
        contents: value.get("contents").and_then(parse_text).unwrap_or_default(),
        vote_id: value
            .get("vote_id")
            .and_then(parse_u64)
            .ok_or_else(|| decode_err("signaling vote id", value))?,
    })
}

/// Build the `SignalingNewProposal` payload from a proposal and its vote record.
pub(crate) fn signaling_new_proposal(
    proposal_hash: &str,
    proposal: &SignalingProposal,
    vote: &Value,
) -> EventData {
    let data = vote.get("data");
    EventData::SignalingNewProposal {
        proposer: proposal.author.clone(),
        proposal_hash: proposal_hash.to_string(),
        vote_id: vote
            .get("id")
            .map(value_to_arg_string)
            .unwrap_or_else(|| proposal.vote_id.to_string()),
        title: proposal.title.clone(),
        description: proposal.contents.clone(),
        tally_type: data
            .and_then(|d| d.get("tally_type"))
            .map(variant_name)
            .unwrap_or_default(),
        vote_type: data
            .and_then(|d| d.get("vote_type"))
            .map(variant_name)
            .unwrap_or_default(),
        choices: vote
            .get("outcomes")
            .and_then(Value::as_array)
            .map(|o| o.iter().map(value_to_arg_string).collect())
            .unwrap_or_default(),
    }
}

// =============================================================================
// Session
// =============================================================================

/// `Session.CurrentIndex` at a block.
pub(crate) async fn session_index<C: ChainApi + ?Sized>(
    api: &C,
    at: &BlockHash,
) -> ChainResult<u32> {
    Ok(api
        .storage(Some(at), "Session", "CurrentIndex", &[])
        .await?
        .as_ref()
        .and_then(parse_u32)
        .unwrap_or_default())
}

/// `Session.Validators` at a block.
pub(crate) async fn session_validators<C: ChainApi + ?Sized>(
    api: &C,
    at: &BlockHash,
) -> ChainResult<Vec<String>> {
    Ok(api
        .storage(Some(at), "Session", "Validators", &[])
        .await?
        .map(|v| crate::utils::parse_accounts(&v))
        .unwrap_or_default())
}
