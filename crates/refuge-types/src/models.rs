use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored or submitted label that is not one of an enum's known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a lowercase string-labelled enum with `as_str`, `Display` and
/// `FromStr`. Labels are the values stored in enum-constrained columns.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

labelled_enum! {
    Role ("role") {
        User => "user",
        Admin => "admin",
        Ngo => "ngo",
        Volunteer => "volunteer",
        Refugee => "refugee",
    }
}

impl Role {
    /// Roles that may post needs.
    pub fn can_post_needs(&self) -> bool {
        matches!(self, Role::Refugee | Role::Admin)
    }

    /// Roles that may post offers.
    pub fn can_post_offers(&self) -> bool {
        matches!(self, Role::Volunteer | Role::Ngo | Role::Admin)
    }

    /// Roles that may publish announcements and manage the resource directory.
    pub fn can_publish(&self) -> bool {
        matches!(self, Role::Ngo | Role::Admin)
    }
}

labelled_enum! {
    /// Domain classification shared by needs and offers.
    Category ("category") {
        Food => "food",
        Shelter => "shelter",
        Housing => "housing",
        Medical => "medical",
        Clothing => "clothing",
        Education => "education",
        Transportation => "transportation",
        Legal => "legal",
        Employment => "employment",
        Translation => "translation",
        Other => "other",
    }
}

labelled_enum! {
    NeedStatus ("need status") {
        Open => "open",
        Matched => "matched",
        Fulfilled => "fulfilled",
        Closed => "closed",
    }
}

impl NeedStatus {
    /// Whether the owner may set `to` by hand. `matched` and `fulfilled`
    /// are reached only through the match workflow.
    pub fn owner_can_move_to(self, to: NeedStatus) -> bool {
        self == to
            || (to == NeedStatus::Closed && matches!(self, NeedStatus::Open | NeedStatus::Matched))
    }
}

labelled_enum! {
    OfferStatus ("offer status") {
        Active => "active",
        Inactive => "inactive",
        Fulfilled => "fulfilled",
    }
}

impl OfferStatus {
    /// Whether the owner may set `to` by hand. A fulfilled offer stays fulfilled.
    pub fn owner_can_move_to(self, to: OfferStatus) -> bool {
        use OfferStatus::*;
        self == to
            || matches!(
                (self, to),
                (Active, Inactive) | (Inactive, Active) | (Active | Inactive, Fulfilled)
            )
    }
}

labelled_enum! {
    MatchStatus ("match status") {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

labelled_enum! {
    NotificationType ("notification type") {
        Match => "match",
        Message => "message",
        Offer => "offer",
        Need => "need",
        Announcement => "announcement",
        System => "system",
    }
}

/// Structured location attached to users, needs and offers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// Public user profile. The password hash never leaves the db crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub organization_name: Option<String>,
    pub email: String,
    pub role: Role,
    pub language: String,
    pub verified: bool,
    pub avatar: Option<String>,
    pub contact: Option<String>,
    pub location: Option<GeoLocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact participant view embedded in conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub organization_name: Option<String>,
    pub role: Role,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Need {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub urgent: bool,
    pub status: NeedStatus,
    pub location: Option<GeoLocation>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub status: OfferStatus,
    pub location: Option<GeoLocation>,
    pub contact: Option<String>,
    pub availability: Option<String>,
    pub user_id: Uuid,
    pub helped_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A proposed or confirmed pairing. At least one of `need_id` and
/// `offer_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: Uuid,
    pub need_id: Option<Uuid>,
    pub offer_id: Option<Uuid>,
    pub initiated_by: Uuid,
    pub responded_by: Option<Uuid>,
    pub message: Option<String>,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// A match naming only one side.
    pub fn is_direct_request(&self) -> bool {
        self.need_id.is_none() || self.offer_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub participants: Vec<UserSummary>,
    /// Messages from other participants the caller has not read.
    #[serde(default)]
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub read: bool,
    pub conversation_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub read: bool,
    pub action_taken: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: String,
    pub region: String,
    pub important: bool,
    pub event_date: Option<DateTime<Utc>>,
    pub posted_by_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementSubscription {
    pub id: Uuid,
    pub email: String,
    pub categories: Option<Vec<String>>,
    pub regions: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
}

/// Entry in the resource directory (clinics, shelters, distribution points).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub description: Option<String>,
    pub contact: Option<ContactInfo>,
    pub services: Vec<Service>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(*category));
        }
        assert_eq!(Category::ALL.len(), 11);
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let err = "spaceship".parse::<Role>().unwrap_err();
        assert_eq!(err.kind, "role");
        assert_eq!(err.to_string(), "unknown role 'spaceship'");
    }

    #[test]
    fn test_serde_uses_lowercase_labels() {
        let json = serde_json::to_string(&MatchStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let parsed: NotificationType = serde_json::from_str("\"announcement\"").unwrap();
        assert_eq!(parsed, NotificationType::Announcement);
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Refugee.can_post_needs());
        assert!(!Role::Volunteer.can_post_needs());
        assert!(Role::Ngo.can_post_offers());
        assert!(!Role::Refugee.can_post_offers());
        assert!(!Role::User.can_publish());
    }

    #[test]
    fn test_owner_need_status_changes() {
        assert!(NeedStatus::Open.owner_can_move_to(NeedStatus::Closed));
        assert!(NeedStatus::Matched.owner_can_move_to(NeedStatus::Closed));
        assert!(NeedStatus::Open.owner_can_move_to(NeedStatus::Open));
        assert!(!NeedStatus::Open.owner_can_move_to(NeedStatus::Fulfilled));
        assert!(!NeedStatus::Open.owner_can_move_to(NeedStatus::Matched));
        assert!(!NeedStatus::Closed.owner_can_move_to(NeedStatus::Open));
        assert!(!NeedStatus::Fulfilled.owner_can_move_to(NeedStatus::Closed));
    }

    #[test]
    fn test_owner_offer_status_changes() {
        assert!(OfferStatus::Active.owner_can_move_to(OfferStatus::Inactive));
        assert!(OfferStatus::Inactive.owner_can_move_to(OfferStatus::Active));
        assert!(OfferStatus::Inactive.owner_can_move_to(OfferStatus::Fulfilled));
        assert!(!OfferStatus::Fulfilled.owner_can_move_to(OfferStatus::Active));
        assert!(!OfferStatus::Fulfilled.owner_can_move_to(OfferStatus::Inactive));
    }

    #[test]
    fn test_direct_request() {
        let now = Utc::now();
        let m = Match {
            id: Uuid::new_v4(),
            need_id: Some(Uuid::new_v4()),
            offer_id: None,
            initiated_by: Uuid::new_v4(),
            responded_by: None,
            message: None,
            status: MatchStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        assert!(m.is_direct_request());
    }

    #[test]
    fn test_notification_type_field_is_named_type() {
        let n = Notification {
            id: Uuid::nil(),
            title: "t".into(),
            description: "d".into(),
            notification_type: NotificationType::Message,
            recipient_id: Uuid::nil(),
            entity_id: None,
            read: false,
            action_taken: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["actionTaken"], false);
    }
}
