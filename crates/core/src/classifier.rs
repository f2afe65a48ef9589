//! Version-aware mapping from `(section, method)` to [`EventKind`].

use crate::models::EventKind;

/// First `treasuryReward` spec version whose `TreasuryMinting` event carries
/// the pot address instead of the minted reward.
pub const TREASURY_REWARD_V2_SPEC_VERSION: u32 = 34;

/// Classify a raw event or extrinsic.
///
/// `section` is the lower camel case pallet name and `method` the event
/// variant or call name as reported by the node adapter. Returns `None` for
/// anything the pipeline does not track.
pub fn classify(
    _version_name: &str,
    version_number: u32,
    section: &str,
    method: &str,
) -> Option<EventKind> {
    let kind = match (section, method) {
        // Staking
        ("staking", "Slash") => EventKind::Slash,
        ("staking", "Reward") => EventKind::Reward,
        ("staking", "Bonded") => EventKind::Bonded,
        ("staking", "Unbonded") => EventKind::Unbonded,

        // Offences / session / imOnline
        ("offences", "Offence") => EventKind::Offence,
        ("session", "NewSession") => EventKind::NewSession,
        ("imOnline", "AllGood") => EventKind::AllGood,
        ("imOnline", "HeartbeatReceived") => EventKind::HeartbeatReceived,
        ("imOnline", "SomeOffline") => EventKind::SomeOffline,

        // Democracy
        ("democracy", "Proposed") => EventKind::DemocracyProposed,
        ("democracy", "Tabled") => EventKind::DemocracyTabled,
        ("democracy", "Started") => EventKind::DemocracyStarted,
        ("democracy", "Passed") => EventKind::DemocracyPassed,
        ("democracy", "NotPassed") => EventKind::DemocracyNotPassed,
        ("democracy", "Cancelled") => EventKind::DemocracyCancelled,
        ("democracy", "Executed") => EventKind::DemocracyExecuted,
        ("democracy", "Delegated") => EventKind::VoteDelegated,
        ("democracy", "PreimageNoted") => EventKind::PreimageNoted,
        ("democracy", "PreimageUsed") => EventKind::PreimageUsed,
        ("democracy", "PreimageInvalid") => EventKind::PreimageInvalid,
        ("democracy", "PreimageMissing") => EventKind::PreimageMissing,
        ("democracy", "PreimageReaped") => EventKind::PreimageReaped,

        // Treasury
        ("treasury", "Proposed") => EventKind::TreasuryProposed,
        ("treasury", "Awarded") => EventKind::TreasuryAwarded,
        ("treasury", "Rejected") => EventKind::TreasuryRejected,

        // Elections (submitCandidacy is an extrinsic)
        ("elections" | "electionsPhragmen", "submitCandidacy") => {
            EventKind::ElectionCandidacySubmitted
        }
        ("elections" | "electionsPhragmen", "NewTerm") => EventKind::ElectionNewTerm,
        ("elections" | "electionsPhragmen", "EmptyTerm") => EventKind::ElectionEmptyTerm,
        ("elections" | "electionsPhragmen", "MemberKicked") => EventKind::ElectionMemberKicked,
        ("elections" | "electionsPhragmen", "MemberRenounced") => {
            EventKind::ElectionMemberRenounced
        }

        // Collectives
        ("council" | "technicalCommittee", "Proposed") => EventKind::CollectiveProposed,
        ("council" | "technicalCommittee", "Voted") => EventKind::CollectiveVoted,
        ("council" | "technicalCommittee", "Approved") => EventKind::CollectiveApproved,
        ("council" | "technicalCommittee", "Disapproved") => EventKind::CollectiveDisapproved,
        ("council" | "technicalCommittee", "Executed") => EventKind::CollectiveExecuted,
        ("council" | "technicalCommittee", "MemberExecuted") => {
            EventKind::CollectiveMemberExecuted
        }

        // Signaling
        ("signaling", "NewProposal") => EventKind::SignalingNewProposal,
        ("signaling", "CommitStarted") => EventKind::SignalingCommitStarted,
        ("signaling", "VotingStarted") => EventKind::SignalingVotingStarted,
        ("signaling", "VotingCompleted") => EventKind::SignalingVotingCompleted,

        // Treasury reward, version gated
        ("treasuryReward", "TreasuryMinting") => {
            if version_number < TREASURY_REWARD_V2_SPEC_VERSION {
                EventKind::TreasuryRewardMinting
            } else {
                EventKind::TreasuryRewardMintingV2
            }
        }

        // Identity
        ("identity", "IdentitySet") => EventKind::IdentitySet,
        ("identity", "JudgementGiven") => EventKind::JudgementGiven,
        ("identity", "IdentityCleared") => EventKind::IdentityCleared,
        ("identity", "IdentityKilled") => EventKind::IdentityKilled,

        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_staking_slash() {
        assert_eq!(
            classify("edgeware", 10, "staking", "Slash"),
            Some(EventKind::Slash)
        );
    }

    // The minting kind flips exactly at the threshold
    #[test]
    fn test_treasury_reward_version_boundary() {
        assert_eq!(
            classify("edgeware", 33, "treasuryReward", "TreasuryMinting"),
            Some(EventKind::TreasuryRewardMinting)
        );
        assert_eq!(
            classify("edgeware", 34, "treasuryReward", "TreasuryMinting"),
            Some(EventKind::TreasuryRewardMintingV2)
        );
        assert_eq!(
            classify("edgeware", 40, "treasuryReward", "TreasuryMinting"),
            Some(EventKind::TreasuryRewardMintingV2)
        );
    }

    #[test]
    fn test_collective_sections() {
        for section in ["council", "technicalCommittee"] {
            assert_eq!(
                classify("kusama", 1000, section, "Voted"),
                Some(EventKind::CollectiveVoted)
            );
        }
        // Other collective instances are not tracked
        assert_eq!(classify("kusama", 1000, "alliance", "Voted"), None);
    }

    #[test]
    fn test_election_sections() {
        assert_eq!(
            classify("kusama", 1000, "electionsPhragmen", "submitCandidacy"),
            Some(EventKind::ElectionCandidacySubmitted)
        );
        assert_eq!(
            classify("edgeware", 20, "elections", "NewTerm"),
            Some(EventKind::ElectionNewTerm)
        );
    }

    #[test]
    fn test_delegated_maps_to_vote_delegated() {
        assert_eq!(
            classify("polkadot", 0, "democracy", "Delegated"),
            Some(EventKind::VoteDelegated)
        );
    }

    #[test]
    fn test_unknown_pairs_are_unclassified() {
        assert_eq!(classify("edgeware", 10, "balances", "Transfer"), None);
        assert_eq!(classify("edgeware", 10, "system", "ExtrinsicSuccess"), None);
        // Sections are case sensitive
        assert_eq!(classify("edgeware", 10, "Staking", "Slash"), None);
        assert_eq!(classify("", 0, "", ""), None);
    }

    #[test]
    fn test_every_kind_is_reachable() {
        let table = [
            ("staking", "Slash"),
            ("staking", "Reward"),
            ("staking", "Bonded"),
            ("staking", "Unbonded"),
            ("democracy", "Delegated"),
            ("democracy", "Proposed"),
            ("democracy", "Tabled"),
            ("democracy", "Started"),
            ("democracy", "Passed"),
            ("democracy", "NotPassed"),
            ("democracy", "Cancelled"),
            ("democracy", "Executed"),
            ("democracy", "PreimageNoted"),
            ("democracy", "PreimageUsed"),
            ("democracy", "PreimageInvalid"),
            ("democracy", "PreimageMissing"),
            ("democracy", "PreimageReaped"),
            ("treasury", "Proposed"),
            ("treasury", "Awarded"),
            ("treasury", "Rejected"),
            ("elections", "NewTerm"),
            ("elections", "EmptyTerm"),
            ("elections", "submitCandidacy"),
            ("elections", "MemberKicked"),
            ("elections", "MemberRenounced"),
            ("council", "Proposed"),
            ("council", "Voted"),
            ("council", "Approved"),
            ("council", "Disapproved"),
            ("council", "Executed"),
            ("council", "MemberExecuted"),
            ("signaling", "NewProposal"),
            ("signaling", "CommitStarted"),
            ("signaling", "VotingStarted"),
            ("signaling", "VotingCompleted"),
            ("identity", "IdentitySet"),
            ("identity", "JudgementGiven"),
            ("identity", "IdentityCleared"),
            ("identity", "IdentityKilled"),
            ("session", "NewSession"),
            ("imOnline", "AllGood"),
            ("imOnline", "HeartbeatReceived"),
            ("imOnline", "SomeOffline"),
            ("offences", "Offence"),
        ];

        let mut seen: Vec<EventKind> = table
            .iter()
            .filter_map(|(s, m)| classify("edgeware", 10, s, m))
            .collect();
        seen.push(EventKind::TreasuryRewardMinting);
        seen.push(EventKind::TreasuryRewardMintingV2);
        seen.sort();
        seen.dedup();

        assert_eq!(seen.len(), EventKind::ALL.len());
    }
}
