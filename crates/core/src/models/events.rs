//! Normalized event kinds and payloads.
//!
//! [`EventKind`] is the closed set of events the pipeline understands and
//! [`EventData`] carries exactly one payload shape per kind. Accounts and
//! hashes are 0x-hex strings, balances are decimal strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{lower_camel, value_to_arg_string};

// =============================================================================
// Event Kind
// =============================================================================

/// Every event kind the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Slash,
    Reward,
    Bonded,
    Unbonded,

    VoteDelegated,
    DemocracyProposed,
    DemocracyTabled,
    DemocracyStarted,
    DemocracyPassed,
    DemocracyNotPassed,
    DemocracyCancelled,
    DemocracyExecuted,

    PreimageNoted,
    PreimageUsed,
    PreimageInvalid,
    PreimageMissing,
    PreimageReaped,

    TreasuryProposed,
    TreasuryAwarded,
    TreasuryRejected,

    ElectionNewTerm,
    ElectionEmptyTerm,
    ElectionCandidacySubmitted,
    ElectionMemberKicked,
    ElectionMemberRenounced,

    CollectiveProposed,
    CollectiveVoted,
    CollectiveApproved,
    CollectiveDisapproved,
    CollectiveExecuted,
    CollectiveMemberExecuted,

    SignalingNewProposal,
    SignalingCommitStarted,
    SignalingVotingStarted,
    SignalingVotingCompleted,

    TreasuryRewardMinting,
    TreasuryRewardMintingV2,

    IdentitySet,
    #[serde(rename = "identity-judgement-given")]
    JudgementGiven,
    IdentityCleared,
    IdentityKilled,

    NewSession,
    AllGood,
    HeartbeatReceived,
    SomeOffline,

    #[serde(rename = "offences-offence")]
    Offence,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 46] = [
        EventKind::Slash,
        EventKind::Reward,
        EventKind::Bonded,
        EventKind::Unbonded,
        EventKind::VoteDelegated,
        EventKind::DemocracyProposed,
        EventKind::DemocracyTabled,
        EventKind::DemocracyStarted,
        EventKind::DemocracyPassed,
        EventKind::DemocracyNotPassed,
        EventKind::DemocracyCancelled,
        EventKind::DemocracyExecuted,
        EventKind::PreimageNoted,
        EventKind::PreimageUsed,
        EventKind::PreimageInvalid,
        EventKind::PreimageMissing,
        EventKind::PreimageReaped,
        EventKind::TreasuryProposed,
        EventKind::TreasuryAwarded,
        EventKind::TreasuryRejected,
        EventKind::ElectionNewTerm,
        EventKind::ElectionEmptyTerm,
        EventKind::ElectionCandidacySubmitted,
        EventKind::ElectionMemberKicked,
        EventKind::ElectionMemberRenounced,
        EventKind::CollectiveProposed,
        EventKind::CollectiveVoted,
        EventKind::CollectiveApproved,
        EventKind::CollectiveDisapproved,
        EventKind::CollectiveExecuted,
        EventKind::CollectiveMemberExecuted,
        EventKind::SignalingNewProposal,
        EventKind::SignalingCommitStarted,
        EventKind::SignalingVotingStarted,
        EventKind::SignalingVotingCompleted,
        EventKind::TreasuryRewardMinting,
        EventKind::TreasuryRewardMintingV2,
        EventKind::IdentitySet,
        EventKind::JudgementGiven,
        EventKind::IdentityCleared,
        EventKind::IdentityKilled,
        EventKind::NewSession,
        EventKind::AllGood,
        EventKind::HeartbeatReceived,
        EventKind::SomeOffline,
        EventKind::Offence,
    ];

    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Slash => "slash",
            EventKind::Reward => "reward",
            EventKind::Bonded => "bonded",
            EventKind::Unbonded => "unbonded",
            EventKind::VoteDelegated => "vote-delegated",
            EventKind::DemocracyProposed => "democracy-proposed",
            EventKind::DemocracyTabled => "democracy-tabled",
            EventKind::DemocracyStarted => "democracy-started",
            EventKind::DemocracyPassed => "democracy-passed",
            EventKind::DemocracyNotPassed => "democracy-not-passed",
            EventKind::DemocracyCancelled => "democracy-cancelled",
            EventKind::DemocracyExecuted => "democracy-executed",
            EventKind::PreimageNoted => "preimage-noted",
            EventKind::PreimageUsed => "preimage-used",
            EventKind::PreimageInvalid => "preimage-invalid",
            EventKind::PreimageMissing => "preimage-missing",
            EventKind::PreimageReaped => "preimage-reaped",
            EventKind::TreasuryProposed => "treasury-proposed",
            EventKind::TreasuryAwarded => "treasury-awarded",
            EventKind::TreasuryRejected => "treasury-rejected",
            EventKind::ElectionNewTerm => "election-new-term",
            EventKind::ElectionEmptyTerm => "election-empty-term",
            EventKind::ElectionCandidacySubmitted => "election-candidacy-submitted",
            EventKind::ElectionMemberKicked => "election-member-kicked",
            EventKind::ElectionMemberRenounced => "election-member-renounced",
            EventKind::CollectiveProposed => "collective-proposed",
            EventKind::CollectiveVoted => "collective-voted",
            EventKind::CollectiveApproved => "collective-approved",
            EventKind::CollectiveDisapproved => "collective-disapproved",
            EventKind::CollectiveExecuted => "collective-executed",
            EventKind::CollectiveMemberExecuted => "collective-member-executed",
            EventKind::SignalingNewProposal => "signaling-new-proposal",
            EventKind::SignalingCommitStarted => "signaling-commit-started",
            EventKind::SignalingVotingStarted => "signaling-voting-started",
            EventKind::SignalingVotingCompleted => "signaling-voting-completed",
            EventKind::TreasuryRewardMinting => "treasury-reward-minting",
            EventKind::TreasuryRewardMintingV2 => "treasury-reward-minting-v2",
            EventKind::IdentitySet => "identity-set",
            EventKind::JudgementGiven => "identity-judgement-given",
            EventKind::IdentityCleared => "identity-cleared",
            EventKind::IdentityKilled => "identity-killed",
            EventKind::NewSession => "new-session",
            EventKind::AllGood => "all-good",
            EventKind::HeartbeatReceived => "heartbeat-received",
            EventKind::SomeOffline => "some-offline",
            EventKind::Offence => "offences-offence",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payload helpers
// =============================================================================

/// Registrar judgement on an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityJudgement {
    Unknown,
    FeePaid,
    Reasonable,
    KnownGood,
    OutOfDate,
    LowQuality,
    Erroneous,
}

impl IdentityJudgement {
    /// Map a decoded `Judgement` value (`"Reasonable"`, `{"FeePaid": "10"}`).
    ///
    /// Anything unrecognized is [`IdentityJudgement::Unknown`].
    pub fn from_value(value: &serde_json::Value) -> Self {
        let name = match value {
            serde_json::Value::String(s) => s.as_str(),
            serde_json::Value::Object(obj) => match obj.keys().next() {
                Some(k) => k.as_str(),
                None => return Self::Unknown,
            },
            _ => return Self::Unknown,
        };
        match name {
            "FeePaid" => Self::FeePaid,
            "Reasonable" => Self::Reasonable,
            "KnownGood" => Self::KnownGood,
            "OutOfDate" => Self::OutOfDate,
            "LowQuality" => Self::LowQuality,
            "Erroneous" => Self::Erroneous,
            _ => Self::Unknown,
        }
    }
}

/// Collective bodies whose events are tagged with their name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectiveName {
    Council,
    TechnicalCommittee,
}

impl CollectiveName {
    /// Parse an event section (`council`, `technicalCommittee`).
    pub fn from_section(section: &str) -> Option<Self> {
        match section {
            "council" => Some(Self::Council),
            "technicalCommittee" => Some(Self::TechnicalCommittee),
            _ => None,
        }
    }

    /// Metadata pallet name, used for storage queries.
    pub fn pallet(&self) -> &'static str {
        match self {
            Self::Council => "Council",
            Self::TechnicalCommittee => "TechnicalCommittee",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Council => "council",
            Self::TechnicalCommittee => "technicalCommittee",
        }
    }
}

/// A decoded runtime call, as carried by preimages and collective motions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedCall {
    pub method: String,
    pub section: String,
    pub args: Vec<String>,
}

impl DecodedCall {
    /// Build from a decoded `RuntimeCall` value: `{"Pallet": {"call": args}}`.
    ///
    /// `args` may be an object of named fields or a positional array.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let (pallet, inner) = single_entry(value)?;
        let (call, fields) = single_entry(inner)?;
        let args = match fields {
            serde_json::Value::Object(obj) => obj.values().map(value_to_arg_string).collect(),
            serde_json::Value::Array(arr) => arr.iter().map(value_to_arg_string).collect(),
            serde_json::Value::Null => Vec::new(),
            other => vec![value_to_arg_string(other)],
        };
        Some(Self {
            method: lower_camel(call),
            section: lower_camel(pallet),
            args,
        })
    }
}

fn single_entry(value: &serde_json::Value) -> Option<(&str, &serde_json::Value)> {
    match value {
        serde_json::Value::Object(obj) if obj.len() == 1 => {
            obj.iter().next().map(|(k, v)| (k.as_str(), v))
        }
        // Unit variants decode to a bare string.
        serde_json::Value::String(s) => Some((s.as_str(), &serde_json::Value::Null)),
        _ => None,
    }
}

/// One nominator's share of a validator exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureShare {
    pub who: String,
    pub value: String,
}

/// Stake backing an active validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveExposure {
    pub own: String,
    pub total: String,
    pub others: Vec<ExposureShare>,
}

/// Per-validator details reported with a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorInfo {
    /// Commission in parts per billion.
    pub commission_perbill: u32,
    pub controller_id: String,
    pub reward_destination: serde_json::Value,
    pub era_points: u32,
}

// =============================================================================
// Event Data
// =============================================================================

/// Payload of a normalized event, one shape per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EventData {
    // Staking
    Slash {
        validator: String,
        amount: String,
    },
    Reward {
        /// Absent on the legacy `(Balance, Balance)` encoding.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validator: Option<String>,
        amount: String,
    },
    Bonded {
        stash: String,
        amount: String,
        controller: String,
    },
    Unbonded {
        stash: String,
        amount: String,
        controller: String,
    },

    // Democracy
    VoteDelegated {
        who: String,
        target: String,
    },
    DemocracyProposed {
        proposal_index: u32,
        proposal_hash: String,
        deposit: String,
        proposer: String,
    },
    DemocracyTabled {
        proposal_index: u32,
    },
    DemocracyStarted {
        referendum_index: u32,
        proposal_hash: String,
        vote_threshold: String,
        end_block: u64,
    },
    DemocracyPassed {
        referendum_index: u32,
        dispatch_block: Option<u64>,
    },
    DemocracyNotPassed {
        referendum_index: u32,
    },
    DemocracyCancelled {
        referendum_index: u32,
    },
    DemocracyExecuted {
        referendum_index: u32,
        execution_ok: bool,
    },

    // Preimages
    PreimageNoted {
        proposal_hash: String,
        noter: String,
        preimage: DecodedCall,
    },
    PreimageUsed {
        proposal_hash: String,
        noter: String,
    },
    PreimageInvalid {
        proposal_hash: String,
        referendum_index: u32,
    },
    PreimageMissing {
        proposal_hash: String,
        referendum_index: u32,
    },
    PreimageReaped {
        proposal_hash: String,
        noter: String,
        reaper: String,
    },

    // Treasury
    TreasuryProposed {
        proposal_index: u32,
        proposer: String,
        value: String,
        beneficiary: String,
        bond: String,
    },
    TreasuryAwarded {
        proposal_index: u32,
        value: String,
        beneficiary: String,
    },
    TreasuryRejected {
        proposal_index: u32,
    },

    // Elections
    ElectionNewTerm {
        round: u32,
        new_members: Vec<String>,
        all_members: Vec<String>,
    },
    ElectionEmptyTerm {
        round: u32,
        members: Vec<String>,
    },
    ElectionCandidacySubmitted {
        round: u32,
        candidate: String,
    },
    ElectionMemberKicked {
        who: String,
    },
    ElectionMemberRenounced {
        who: String,
    },

    // Collectives
    CollectiveProposed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collective_name: Option<CollectiveName>,
        proposer: String,
        proposal_index: u32,
        proposal_hash: String,
        threshold: u32,
        call: DecodedCall,
    },
    CollectiveVoted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collective_name: Option<CollectiveName>,
        proposal_hash: String,
        voter: String,
        vote: bool,
    },
    CollectiveApproved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collective_name: Option<CollectiveName>,
        proposal_hash: String,
    },
    CollectiveDisapproved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collective_name: Option<CollectiveName>,
        proposal_hash: String,
    },
    CollectiveExecuted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collective_name: Option<CollectiveName>,
        proposal_hash: String,
        execution_ok: bool,
    },
    CollectiveMemberExecuted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collective_name: Option<CollectiveName>,
        proposal_hash: String,
        execution_ok: bool,
    },

    // Signaling
    SignalingNewProposal {
        proposer: String,
        proposal_hash: String,
        vote_id: String,
        title: String,
        description: String,
        tally_type: String,
        vote_type: String,
        choices: Vec<String>,
    },
    SignalingCommitStarted {
        proposal_hash: String,
        vote_id: String,
        end_block: u64,
    },
    SignalingVotingStarted {
        proposal_hash: String,
        vote_id: String,
        end_block: u64,
    },
    SignalingVotingCompleted {
        proposal_hash: String,
        vote_id: String,
    },

    // Treasury reward
    TreasuryRewardMinting {
        pot: String,
        reward: String,
    },
    TreasuryRewardMintingV2 {
        pot: String,
        pot_address: String,
    },

    // Identity
    IdentitySet {
        who: String,
        display_name: String,
        judgements: Vec<(String, IdentityJudgement)>,
    },
    #[serde(rename = "identity-judgement-given")]
    JudgementGiven {
        who: String,
        registrar: String,
        judgement: IdentityJudgement,
    },
    IdentityCleared {
        who: String,
    },
    IdentityKilled {
        who: String,
    },

    // Session and validator health
    NewSession {
        active_exposures: BTreeMap<String, ActiveExposure>,
        active: Vec<String>,
        waiting: Vec<String>,
        session_index: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_era: Option<u32>,
        validator_info: BTreeMap<String, ValidatorInfo>,
    },
    AllGood {
        session_index: u32,
        validators: Vec<String>,
    },
    HeartbeatReceived {
        authority_id: String,
    },
    SomeOffline {
        session_index: u32,
        validators: Vec<String>,
    },
    #[serde(rename = "offences-offence")]
    Offence {
        offence_kind: String,
        opaque_time_slot: String,
        applied: bool,
        offenders: Vec<String>,
    },
}

impl EventData {
    /// The kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventData::Slash { .. } => EventKind::Slash,
            EventData::Reward { .. } => EventKind::Reward,
            EventData::Bonded { .. } => EventKind::Bonded,
            EventData::Unbonded { .. } => EventKind::Unbonded,
            EventData::VoteDelegated { .. } => EventKind::VoteDelegated,
            EventData::DemocracyProposed { .. } => EventKind::DemocracyProposed,
            EventData::DemocracyTabled { .. } => EventKind::DemocracyTabled,
            EventData::DemocracyStarted { .. } => EventKind::DemocracyStarted,
            EventData::DemocracyPassed { .. } => EventKind::DemocracyPassed,
            EventData::DemocracyNotPassed { .. } => EventKind::DemocracyNotPassed,
            EventData::DemocracyCancelled { .. } => EventKind::DemocracyCancelled,
            EventData::DemocracyExecuted { .. } => EventKind::DemocracyExecuted,
            EventData::PreimageNoted { .. } => EventKind::PreimageNoted,
            EventData::PreimageUsed { .. } => EventKind::PreimageUsed,
            EventData::PreimageInvalid { .. } => EventKind::PreimageInvalid,
            EventData::PreimageMissing { .. } => EventKind::PreimageMissing,
            EventData::PreimageReaped { .. } => EventKind::PreimageReaped,
            EventData::TreasuryProposed { .. } => EventKind::TreasuryProposed,
            EventData::TreasuryAwarded { .. } => EventKind::TreasuryAwarded,
            EventData::TreasuryRejected { .. } => EventKind::TreasuryRejected,
            EventData::ElectionNewTerm { .. } => EventKind::ElectionNewTerm,
            EventData::ElectionEmptyTerm { .. } => EventKind::ElectionEmptyTerm,
            EventData::ElectionCandidacySubmitted { .. } => EventKind::ElectionCandidacySubmitted,
            EventData::ElectionMemberKicked { .. } => EventKind::ElectionMemberKicked,
            EventData::ElectionMemberRenounced { .. } => EventKind::ElectionMemberRenounced,
            EventData::CollectiveProposed { .. } => EventKind::CollectiveProposed,
            EventData::CollectiveVoted { .. } => EventKind::CollectiveVoted,
            EventData::CollectiveApproved { .. } => EventKind::CollectiveApproved,
            EventData::CollectiveDisapproved { .. } => EventKind::CollectiveDisapproved,
            EventData::CollectiveExecuted { .. } => EventKind::CollectiveExecuted,
            EventData::CollectiveMemberExecuted { .. } => EventKind::CollectiveMemberExecuted,
            EventData::SignalingNewProposal { .. } => EventKind::SignalingNewProposal,
            EventData::SignalingCommitStarted { .. } => EventKind::SignalingCommitStarted,
            EventData::SignalingVotingStarted { .. } => EventKind::SignalingVotingStarted,
            EventData::SignalingVotingCompleted { .. } => EventKind::SignalingVotingCompleted,
            EventData::TreasuryRewardMinting { .. } => EventKind::TreasuryRewardMinting,
            EventData::TreasuryRewardMintingV2 { .. } => EventKind::TreasuryRewardMintingV2,
            EventData::IdentitySet { .. } => EventKind::IdentitySet,
            EventData::JudgementGiven { .. } => EventKind::JudgementGiven,
            EventData::IdentityCleared { .. } => EventKind::IdentityCleared,
            EventData::IdentityKilled { .. } => EventKind::IdentityKilled,
            EventData::NewSession { .. } => EventKind::NewSession,
            EventData::AllGood { .. } => EventKind::AllGood,
            EventData::HeartbeatReceived { .. } => EventKind::HeartbeatReceived,
            EventData::SomeOffline { .. } => EventKind::SomeOffline,
            EventData::Offence { .. } => EventKind::Offence,
        }
    }
}

// =============================================================================
// Normalized envelope
// =============================================================================

/// A normalized chain event, as handed to the handler chain.
///
/// `include_addresses` and `exclude_addresses` are routing hints for
/// downstream notification: who must be told, and who caused the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CWEvent {
    pub block_number: u64,
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_addresses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_addresses: Option<Vec<String>>,
    /// Chain identifier, stamped by the listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    /// When the listener received the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<DateTime<Utc>>,
}

impl CWEvent {
    pub fn new(block_number: u64, data: EventData) -> Self {
        Self {
            block_number,
            data,
            include_addresses: None,
            exclude_addresses: None,
            chain: None,
            received: None,
        }
    }

    pub fn including(mut self, address: impl Into<String>) -> Self {
        self.include_addresses
            .get_or_insert_with(Vec::new)
            .push(address.into());
        self
    }

    pub fn excluding(mut self, address: impl Into<String>) -> Self {
        self.exclude_addresses
            .get_or_insert_with(Vec::new)
            .push(address.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.data.kind()
    }
}
