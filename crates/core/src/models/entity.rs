//! Grouping of event kinds into long-lived on-chain entities.

use serde::{Deserialize, Serialize};

use super::events::{CWEvent, EventKind};

/// A long-lived on-chain object described by several events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    DemocracyProposal,
    DemocracyReferendum,
    DemocracyPreimage,
    TreasuryProposal,
    CollectiveProposal,
    SignalingProposal,
}

impl EntityKind {
    /// Payload field (camelCase) that identifies the entity.
    pub fn field_name(&self) -> &'static str {
        match self {
            EntityKind::DemocracyProposal | EntityKind::TreasuryProposal => "proposalIndex",
            EntityKind::DemocracyReferendum => "referendumIndex",
            EntityKind::DemocracyPreimage
            | EntityKind::CollectiveProposal
            | EntityKind::SignalingProposal => "proposalHash",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "democracy-proposal" => Ok(Self::DemocracyProposal),
            "democracy-referendum" => Ok(Self::DemocracyReferendum),
            "democracy-preimage" => Ok(Self::DemocracyPreimage),
            "treasury-proposal" => Ok(Self::TreasuryProposal),
            "collective-proposal" => Ok(Self::CollectiveProposal),
            "signaling-proposal" => Ok(Self::SignalingProposal),
            other => Err(format!("Invalid entity kind '{other}'")),
        }
    }
}

/// Lifecycle step an event represents for its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityEventKind {
    Create,
    Update,
    Vote,
    Complete,
}

/// Map an event kind to the entity it belongs to, if any.
pub fn event_to_entity(kind: EventKind) -> Option<(EntityKind, EntityEventKind)> {
    use EntityEventKind::*;
    use EntityKind::*;

    let mapped = match kind {
        EventKind::DemocracyProposed => (DemocracyProposal, Create),
        EventKind::DemocracyTabled => (DemocracyProposal, Complete),

        EventKind::DemocracyStarted => (DemocracyReferendum, Create),
        EventKind::DemocracyPassed => (DemocracyReferendum, Update),
        EventKind::DemocracyNotPassed
        | EventKind::DemocracyCancelled
        | EventKind::DemocracyExecuted => (DemocracyReferendum, Complete),

        EventKind::PreimageNoted => (DemocracyPreimage, Create),
        EventKind::PreimageUsed | EventKind::PreimageInvalid | EventKind::PreimageReaped => {
            (DemocracyPreimage, Complete)
        }

        EventKind::TreasuryProposed => (TreasuryProposal, Create),
        EventKind::TreasuryRejected | EventKind::TreasuryAwarded => (TreasuryProposal, Complete),

        EventKind::CollectiveProposed => (CollectiveProposal, Create),
        EventKind::CollectiveVoted => (CollectiveProposal, Vote),
        EventKind::CollectiveApproved => (CollectiveProposal, Update),
        EventKind::CollectiveDisapproved | EventKind::CollectiveExecuted => {
            (CollectiveProposal, Complete)
        }

        EventKind::SignalingNewProposal => (SignalingProposal, Create),
        EventKind::SignalingCommitStarted | EventKind::SignalingVotingStarted => {
            (SignalingProposal, Update)
        }
        EventKind::SignalingVotingCompleted => (SignalingProposal, Complete),

        _ => return None,
    };
    Some(mapped)
}

/// Whether any of an entity's events marks it complete.
pub fn is_entity_completed(events: &[CWEvent]) -> bool {
    events.iter().any(|e| {
        matches!(
            event_to_entity(e.kind()),
            Some((_, EntityEventKind::Complete))
        )
    })
}

impl CWEvent {
    /// Identifier of the entity this event belongs to, as a string.
    pub fn entity_id(&self) -> Option<String> {
        let (entity, _) = event_to_entity(self.kind())?;
        let value = serde_json::to_value(&self.data).ok()?;
        match value.get(entity.field_name())? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventData;

    #[test]
    fn test_referendum_lifecycle_mapping() {
        assert_eq!(
            event_to_entity(EventKind::DemocracyStarted),
            Some((EntityKind::DemocracyReferendum, EntityEventKind::Create))
        );
        assert_eq!(
            event_to_entity(EventKind::DemocracyPassed),
            Some((EntityKind::DemocracyReferendum, EntityEventKind::Update))
        );
        assert_eq!(
            event_to_entity(EventKind::DemocracyExecuted),
            Some((EntityKind::DemocracyReferendum, EntityEventKind::Complete))
        );
        // Staking events have no entity
        assert_eq!(event_to_entity(EventKind::Slash), None);
    }

    #[test]
    fn test_every_entity_has_a_create_event() {
        let creators: Vec<EntityKind> = EventKind::ALL
            .iter()
            .filter_map(|k| event_to_entity(*k))
            .filter(|(_, step)| *step == EntityEventKind::Create)
            .map(|(entity, _)| entity)
            .collect();
        for entity in [
            EntityKind::DemocracyProposal,
            EntityKind::DemocracyReferendum,
            EntityKind::DemocracyPreimage,
            EntityKind::TreasuryProposal,
            EntityKind::CollectiveProposal,
            EntityKind::SignalingProposal,
        ] {
            assert!(creators.contains(&entity), "{entity:?}");
        }
    }

    #[test]
    fn test_entity_completion() {
        let started = CWEvent::new(
            1,
            EventData::DemocracyStarted {
                referendum_index: 3,
                proposal_hash: "0x01".into(),
                vote_threshold: "SimpleMajority".into(),
                end_block: 100,
            },
        );
        let cancelled = CWEvent::new(5, EventData::DemocracyCancelled { referendum_index: 3 });

        assert!(!is_entity_completed(std::slice::from_ref(&started)));
        assert!(is_entity_completed(&[started.clone(), cancelled]));
        assert_eq!(started.entity_id().as_deref(), Some("3"));
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(
            "collective-proposal".parse::<EntityKind>(),
            Ok(EntityKind::CollectiveProposal)
        );
        assert!("bounty".parse::<EntityKind>().is_err());
    }
}
