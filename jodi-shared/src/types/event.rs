use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ event envelope wrapping all domain events.
///
/// Routing key format: `jodi.{domain}.{entity}.{action}`
/// Example: `jodi.matching.pairing.delivered`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            profile_id: None,
            data,
        }
    }

    pub fn with_profile(mut self, profile_id: Uuid) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Profile events
    pub const PROFILE_CREATED: &str = "jodi.profile.profile.created";
    pub const PROFILE_DEACTIVATED: &str = "jodi.profile.profile.deactivated";
    pub const PROFILE_REACTIVATED: &str = "jodi.profile.profile.reactivated";
    pub const PREFERENCE_SAVED: &str = "jodi.profile.preference.saved";

    // Matching events
    pub const PAIRING_DELIVER: &str = "jodi.matching.pairing.deliver";
    pub const PAIRING_DELIVERED: &str = "jodi.matching.pairing.delivered";
}

/// Queue names for the recomputation pipeline. Work lands on
/// [`RECOMPUTE`]; [`RECOMPUTE_WAIT`] holds messages for the coalescing
/// delay and dead-letters them into the work queue when the TTL fires.
pub mod queues {
    pub const RECOMPUTE: &str = "jodi.matching.recompute";
    pub const RECOMPUTE_WAIT: &str = "jodi.matching.recompute.wait";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Why a recomputation was requested. The handler re-reads current
    /// state either way, so replays and coalesced duplicates are safe.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RecomputeKind {
        Create,
        Update,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RecomputeRequested {
        pub profile_id: Uuid,
        pub kind: RecomputeKind,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ProfileCreated {
        pub profile_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ProfileDeactivated {
        pub profile_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PreferenceSaved {
        pub profile_id: Uuid,
    }

    /// A reference to a verified, currently-active document held by the
    /// external document service.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DocumentRef {
        pub document_id: i64,
        pub url: String,
    }

    /// Instruction for the external bot channel to present one
    /// counterpart profile to one recipient.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PairingDeliver {
        pub to_chat_handle: String,
        pub counterpart_profile_id: Uuid,
        pub counterpart_name: String,
        pub bio: Option<DocumentRef>,
        pub picture: Option<DocumentRef>,
        pub id_proof: Option<DocumentRef>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PairingDelivered {
        pub male_profile_id: Uuid,
        pub female_profile_id: Uuid,
    }
}

#[cfg(test)]
mod tests {
    use super::payloads::{RecomputeKind, RecomputeRequested};
    use super::*;

    #[test]
    fn recompute_payload_round_trips() {
        let event = Event::new(
            "jodi-matching",
            "recompute",
            RecomputeRequested {
                profile_id: Uuid::nil(),
                kind: RecomputeKind::Update,
            },
        );
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: Event<RecomputeRequested> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.data.kind, RecomputeKind::Update);
        assert_eq!(back.data.profile_id, Uuid::nil());
    }

    #[test]
    fn recompute_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RecomputeKind::Create).unwrap(), "\"create\"");
    }
}
