//! Identifiers.
//!
//! Every stored entity is keyed by a UUIDv7. Ownership references are a
//! special case: historical records hold the owner either as a plain string or
//! as a typed `{"$oid": "..."}` reference, so they are modelled separately as
//! [`IdRef`] and only ever compared through [`IdRef::canonical`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Resource};

macro_rules! entity_id {
    ($name:ident, $resource:expr) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Parses a well-formed id, reporting a malformed one as
            /// [`CoreError::InvalidIdentifier`].
            pub fn parse(s: &str) -> Result<Self, CoreError> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| CoreError::InvalidIdentifier($resource))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }
    };
}

entity_id!(TournamentId, Resource::Tournament);
entity_id!(TeamId, Resource::Team);
entity_id!(MatchId, Resource::Match);
entity_id!(UserId, Resource::User);

/// A reference to the principal owning a resource.
///
/// New writes always produce [`IdRef::Raw`] holding the canonical form; the
/// typed variant exists to read records written before that was the case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdRef {
    Typed {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Raw(String),
}

impl IdRef {
    /// The canonical string form: a hyphenated lower-case UUID when the
    /// reference holds one in any accepted spelling, otherwise the trimmed,
    /// lower-cased text.
    pub fn canonical(&self) -> String {
        let raw = match self {
            IdRef::Typed { oid } => oid,
            IdRef::Raw(raw) => raw,
        };
        let trimmed = raw.trim();
        match Uuid::parse_str(trimmed) {
            Ok(uuid) => uuid.hyphenated().to_string(),
            Err(_) => trimmed.to_ascii_lowercase(),
        }
    }

    pub fn refers_to(&self, other: &IdRef) -> bool {
        self.canonical() == other.canonical()
    }

    /// Decodes the text form kept in a store column. Typed references are
    /// kept as their JSON encoding.
    pub fn from_stored(s: &str) -> IdRef {
        if s.trim_start().starts_with('{')
            && let Ok(typed @ IdRef::Typed { .. }) =
                serde_json::from_str::<IdRef>(s)
        {
            return typed;
        }
        IdRef::Raw(s.to_string())
    }

    /// The text form to keep in a store column.
    pub fn to_stored(&self) -> String {
        match self {
            IdRef::Typed { .. } => serde_json::to_string(self)
                .unwrap_or_else(|_| self.canonical()),
            IdRef::Raw(raw) => raw.clone(),
        }
    }
}

impl From<UserId> for IdRef {
    fn from(id: UserId) -> Self {
        IdRef::Raw(id.to_string())
    }
}

impl fmt::Display for IdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_and_typed_references_normalise_to_the_same_form() {
        let id = UserId::generate();
        let raw = IdRef::from(id);
        let typed = IdRef::Typed {
            oid: id.to_string().to_uppercase(),
        };
        let simple = IdRef::Raw(format!(
            "  {}  ",
            id.as_uuid().simple().to_string()
        ));

        assert!(raw.refers_to(&typed));
        assert!(raw.refers_to(&simple));
        assert_eq!(typed.canonical(), id.to_string());
    }

    #[test]
    fn typed_references_round_trip_through_storage() {
        let typed = IdRef::Typed {
            oid: UserId::generate().to_string(),
        };
        let stored = typed.to_stored();
        assert!(stored.contains("$oid"));
        assert_eq!(IdRef::from_stored(&stored), typed);
    }

    #[test]
    fn non_uuid_text_is_compared_case_insensitively() {
        assert!(IdRef::Raw("Legacy-Owner".into())
            .refers_to(&IdRef::Raw(" legacy-owner".into())));
        assert!(!IdRef::Raw("a".into()).refers_to(&IdRef::Raw("b".into())));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert_eq!(
            TeamId::parse("not-an-id"),
            Err(CoreError::InvalidIdentifier(Resource::Team))
        );
        assert!(MatchId::parse(&MatchId::generate().to_string()).is_ok());
    }
}
