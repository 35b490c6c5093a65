//! Review kinds and the schema adapter.
//!
//! The five review families store the same concepts under different column
//! names. [`KindSchema`] is the single mapping table from a [`ReviewKind`]
//! to those columns and to the way a review resolves to its target. Every
//! storage backend and every service resolves fields through it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ReviewError;

/// One of the five review record families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Merchant reviews from the commerce vertical.
    Commerce,
    /// Producer reviews from the agro marketplace.
    Agro,
    /// Provider reviews from the services vertical.
    Services,
    /// Course reviews from the learning platform.
    Course,
    /// Mentoring session reviews.
    Mentoring,
}

impl ReviewKind {
    /// All registered kinds, in dashboard order.
    pub const ALL: [Self; 5] = [
        Self::Commerce,
        Self::Agro,
        Self::Services,
        Self::Course,
        Self::Mentoring,
    ];

    /// Returns the machine name used in URLs, cache keys and payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commerce => "commerce",
            Self::Agro => "agro",
            Self::Services => "services",
            Self::Course => "course",
            Self::Mentoring => "mentoring",
        }
    }

    /// Returns the static schema for this kind.
    #[must_use]
    pub const fn schema(&self) -> &'static KindSchema {
        match self {
            Self::Commerce => &COMMERCE,
            Self::Agro => &AGRO,
            Self::Services => &SERVICES,
            Self::Course => &COURSE,
            Self::Mentoring => &MENTORING,
        }
    }
}

impl fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewKind {
    type Err = ReviewError;

    /// Accepts either the machine name (`"commerce"`) or the table name
    /// (`"commerce_review"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.schema().table == s)
            .ok_or_else(|| ReviewError::UnknownKind(s.to_string()))
    }
}

/// How a review resolves to the type of the entity it is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSpec {
    /// The target type is stored per row in the named column.
    Polymorphic {
        /// Column holding the target type.
        type_field: &'static str,
    },
    /// Every review of the kind targets the same entity type.
    Fixed(&'static str),
}

/// Column mapping for one review kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSchema {
    /// The kind this schema describes.
    pub kind: ReviewKind,
    /// Storage table.
    pub table: &'static str,
    /// Column holding the 1–5 rating.
    pub rating_field: &'static str,
    /// Column holding the moderation status.
    pub status_field: &'static str,
    /// Column holding the review text.
    pub body_field: &'static str,
    /// Column holding the target id.
    pub target_field: &'static str,
    /// Target type resolution.
    pub target: TargetSpec,
    /// Column holding the owner response, if the kind accepts one.
    pub response_field: Option<&'static str>,
    /// Whether rows carry `helpful_count` / `not_helpful_count` / `wilson_score`.
    pub tracks_helpfulness: bool,
}

impl KindSchema {
    /// Returns `true` when the target type varies per row.
    #[must_use]
    pub const fn is_polymorphic(&self) -> bool {
        matches!(self.target, TargetSpec::Polymorphic { .. })
    }

    /// Returns the column holding the target type, for polymorphic kinds.
    #[must_use]
    pub const fn target_type_field(&self) -> Option<&'static str> {
        match self.target {
            TargetSpec::Polymorphic { type_field } => Some(type_field),
            TargetSpec::Fixed(_) => None,
        }
    }

    /// Returns the fixed target type, for non-polymorphic kinds.
    #[must_use]
    pub const fn fixed_target_type(&self) -> Option<&'static str> {
        match self.target {
            TargetSpec::Fixed(target_type) => Some(target_type),
            TargetSpec::Polymorphic { .. } => None,
        }
    }
}

const COMMERCE: KindSchema = KindSchema {
    kind: ReviewKind::Commerce,
    table: "commerce_review",
    rating_field: "rating",
    status_field: "status",
    body_field: "body",
    target_field: "entity_id_ref",
    target: TargetSpec::Polymorphic {
        type_field: "entity_type_ref",
    },
    response_field: Some("merchant_response"),
    tracks_helpfulness: true,
};

const AGRO: KindSchema = KindSchema {
    kind: ReviewKind::Agro,
    table: "agro_review",
    rating_field: "rating",
    status_field: "state",
    body_field: "body",
    target_field: "target_entity_id",
    target: TargetSpec::Polymorphic {
        type_field: "target_entity_type",
    },
    response_field: Some("response"),
    tracks_helpfulness: true,
};

const SERVICES: KindSchema = KindSchema {
    kind: ReviewKind::Services,
    table: "services_review",
    rating_field: "rating",
    status_field: "status",
    body_field: "comment",
    target_field: "provider_id",
    target: TargetSpec::Fixed("provider_profile"),
    response_field: Some("provider_response"),
    tracks_helpfulness: true,
};

const COURSE: KindSchema = KindSchema {
    kind: ReviewKind::Course,
    table: "course_review",
    rating_field: "rating",
    status_field: "review_status",
    body_field: "body",
    target_field: "course_id",
    target: TargetSpec::Fixed("lms_course"),
    response_field: Some("instructor_response"),
    tracks_helpfulness: true,
};

const MENTORING: KindSchema = KindSchema {
    kind: ReviewKind::Mentoring,
    table: "session_review",
    rating_field: "overall_rating",
    status_field: "review_status",
    body_field: "comment",
    target_field: "session_id",
    target: TargetSpec::Fixed("mentoring_session"),
    response_field: None,
    tracks_helpfulness: false,
};

/// Resolves a kind name to its schema.
///
/// # Errors
///
/// Returns [`ReviewError::UnknownKind`] when the name is not one of the
/// registered kinds. Callers treat that as "not part of the review
/// subsystem".
pub fn resolve(kind_name: &str) -> Result<&'static KindSchema, ReviewError> {
    kind_name.parse::<ReviewKind>().map(|kind| kind.schema())
}

/// Storage mapping and capabilities of a target entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetTypeSchema {
    /// Target type name as stored on reviews.
    pub name: &'static str,
    /// Storage table.
    pub table: &'static str,
    /// Column holding the owning user id.
    pub owner_field: &'static str,
    /// Whether the table carries `average_rating` / `total_reviews`.
    pub supports_rating_denormalization: bool,
}

const TARGET_TYPES: [TargetTypeSchema; 5] = [
    TargetTypeSchema {
        name: "merchant_profile",
        table: "merchant_profile",
        owner_field: "uid",
        supports_rating_denormalization: true,
    },
    TargetTypeSchema {
        name: "producer_profile",
        table: "producer_profile",
        owner_field: "uid",
        supports_rating_denormalization: true,
    },
    TargetTypeSchema {
        name: "provider_profile",
        table: "provider_profile",
        owner_field: "user_id",
        supports_rating_denormalization: true,
    },
    TargetTypeSchema {
        name: "lms_course",
        table: "lms_course",
        owner_field: "author_id",
        supports_rating_denormalization: true,
    },
    TargetTypeSchema {
        name: "mentoring_session",
        table: "mentoring_session",
        owner_field: "mentor_id",
        supports_rating_denormalization: false,
    },
];

/// Looks up the schema of a target type, `None` for unregistered types.
#[must_use]
pub fn target_type_schema(name: &str) -> Option<&'static TargetTypeSchema> {
    TARGET_TYPES.iter().find(|schema| schema.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_accepts_machine_and_table_names() {
        let by_name = resolve("mentoring");
        let by_table = resolve("session_review");
        assert!(matches!(by_name, Ok(s) if s.rating_field == "overall_rating"));
        assert!(matches!(by_table, Ok(s) if s.kind == ReviewKind::Mentoring));
    }

    #[test]
    fn resolve_unknown_kind_fails() {
        let result = resolve("content_comment");
        assert!(matches!(result, Err(ReviewError::UnknownKind(name)) if name == "content_comment"));
    }

    #[test]
    fn status_fields_differ_per_kind() {
        assert_eq!(ReviewKind::Commerce.schema().status_field, "status");
        assert_eq!(ReviewKind::Agro.schema().status_field, "state");
        assert_eq!(ReviewKind::Course.schema().status_field, "review_status");
    }

    #[test]
    fn polymorphic_kinds_expose_type_column() {
        let commerce = ReviewKind::Commerce.schema();
        assert!(commerce.is_polymorphic());
        assert_eq!(commerce.target_type_field(), Some("entity_type_ref"));
        assert_eq!(commerce.fixed_target_type(), None);

        let services = ReviewKind::Services.schema();
        assert!(!services.is_polymorphic());
        assert_eq!(services.fixed_target_type(), Some("provider_profile"));
    }

    #[test]
    fn every_fixed_target_type_is_registered() {
        for kind in ReviewKind::ALL {
            if let Some(target_type) = kind.schema().fixed_target_type() {
                assert!(target_type_schema(target_type).is_some(), "{target_type}");
            }
        }
    }

    #[test]
    fn mentoring_has_no_owner_response() {
        assert!(ReviewKind::Mentoring.schema().response_field.is_none());
        assert!(!ReviewKind::Mentoring.schema().tracks_helpfulness);
    }

    #[test]
    fn serde_uses_machine_names() {
        let json = serde_json::to_string(&ReviewKind::Course).unwrap_or_default();
        assert_eq!(json, "\"course\"");
    }
}
