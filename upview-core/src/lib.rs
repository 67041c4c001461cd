//! Upview Core - Shared Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no business logic, no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier. All persisted records are keyed by UUID.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new random EntityId.
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4()
}

// ============================================================================
// FEEDBACK CATEGORY
// ============================================================================

/// Category assigned to a piece of player feedback by the classifier.
///
/// The classifier returns a single lowercase word; anything that is not
/// one of the known labels maps to `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    /// Describes something broken or not working
    Bug,
    /// A feature or improvement idea
    Suggestion,
    /// Irrelevant, unreadable, promotional, or repeated content
    Spam,
    /// Contains insults, profanity, or offensive language
    Rude,
    /// Anything else
    #[default]
    Other,
}

impl FeedbackCategory {
    /// All valid category labels, in classifier-output form.
    pub const LABELS: [&'static str; 5] = ["bug", "suggestion", "spam", "rude", "other"];

    /// The lowercase wire/storage label for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Bug => "bug",
            FeedbackCategory::Suggestion => "suggestion",
            FeedbackCategory::Spam => "spam",
            FeedbackCategory::Rude => "rude",
            FeedbackCategory::Other => "other",
        }
    }
}

impl fmt::Display for FeedbackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bug" => Ok(FeedbackCategory::Bug),
            "suggestion" => Ok(FeedbackCategory::Suggestion),
            "spam" => Ok(FeedbackCategory::Spam),
            "rude" => Ok(FeedbackCategory::Rude),
            "other" => Ok(FeedbackCategory::Other),
            _ => Err(CoreError::UnknownCategory(s.to_string())),
        }
    }
}

// ============================================================================
// SUBSCRIPTION STATUS
// ============================================================================

/// Lifecycle status of a payment-provider subscription.
///
/// Mirrors the provider's status vocabulary; stored verbatim and consumed
/// as a plain record (no lifecycle logic lives here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Storage label for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
        }
    }

    /// Whether this status entitles the owner to the product.
    ///
    /// Checkout is refused while an entitling subscription exists.
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Trialing | SubscriptionStatus::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Ok(SubscriptionStatus::IncompleteExpired),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "paused" => Ok(SubscriptionStatus::Paused),
            _ => Err(CoreError::UnknownSubscriptionStatus(s.to_string())),
        }
    }
}

// ============================================================================
// AVATAR SUBJECT KIND
// ============================================================================

/// Discriminator for avatar resolution: a dashboard user or a game player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AvatarKind {
    User,
    Player,
}

impl FromStr for AvatarKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(AvatarKind::User),
            "player" => Ok(AvatarKind::Player),
            _ => Err(CoreError::UnknownAvatarKind(s.to_string())),
        }
    }
}

impl fmt::Display for AvatarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvatarKind::User => f.write_str("user"),
            AvatarKind::Player => f.write_str("player"),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors produced when parsing core enum labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown feedback category: {0}")]
    UnknownCategory(String),

    #[error("unknown subscription status: {0}")]
    UnknownSubscriptionStatus(String),

    #[error("unknown avatar kind: {0}, expected 'user' or 'player'")]
    UnknownAvatarKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_category_roundtrip() {
        for label in FeedbackCategory::LABELS {
            let category: FeedbackCategory = label.parse().expect("known label");
            assert_eq!(category.as_str(), label);
        }
    }

    #[test]
    fn test_feedback_category_unknown_word() {
        let err = "gibberish".parse::<FeedbackCategory>().unwrap_err();
        assert_eq!(err, CoreError::UnknownCategory("gibberish".to_string()));
    }

    #[test]
    fn test_feedback_category_serde() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&FeedbackCategory::Suggestion)?;
        assert_eq!(json, "\"suggestion\"");
        let back: FeedbackCategory = serde_json::from_str(&json)?;
        assert_eq!(back, FeedbackCategory::Suggestion);
        Ok(())
    }

    #[test]
    fn test_subscription_status_entitlement() {
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(!SubscriptionStatus::Canceled.is_entitled());
        assert!(!SubscriptionStatus::PastDue.is_entitled());
    }

    #[test]
    fn test_subscription_status_roundtrip() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Paused,
        ] {
            let parsed: SubscriptionStatus = status.as_str().parse().expect("roundtrip");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_avatar_kind_parse() {
        assert_eq!("user".parse::<AvatarKind>().unwrap(), AvatarKind::User);
        assert_eq!("player".parse::<AvatarKind>().unwrap(), AvatarKind::Player);
        assert!("guild".parse::<AvatarKind>().is_err());
    }

    #[test]
    fn test_entity_ids_are_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
