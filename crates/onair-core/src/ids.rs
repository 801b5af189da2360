//! Typed ID wrappers providing compile-time safety for entity identifiers.
//!
//! Each ID type is a newtype over `String`. Identifiers in a rundown are
//! either externally sourced or derived deterministically (hash ids,
//! continuation ids such as `<infiniteId>_<partId>`), so they cannot be
//! plain UUIDs. Fresh ids are still generated from v4 UUIDs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;

/// Generate a newtype ID wrapper over `String`.
///
/// The macro produces a struct with:
/// - `new()` to create a random id from a v4 UUID
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Ord`, `Serialize`, `Deserialize`
/// - `Display` delegating to the inner string
/// - `From<&str>` and `From<String>` conversions
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                /// Create a new random ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(uuid::Uuid::new_v4().simple().to_string())
                }

                /// Borrow the id as a string slice.
                #[must_use]
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }

            impl From<String> for $name {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }

            impl Borrow<str> for $name {
                fn borrow(&self) -> &str {
                    &self.0
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

typed_id! {
    /// Unique identifier for a studio (one playout chain).
    StudioId,
    /// Unique identifier for a rundown.
    RundownId,
    /// Unique identifier for a segment within a rundown.
    SegmentId,
    /// Unique identifier for a part (a playable story unit).
    PartId,
    /// Unique identifier for a piece of content on a part.
    PieceId,
    /// Unique identifier for an ad-lib piece offered by the blueprint.
    AdLibPieceId,
}

/// Derive a stable 17-character id from arbitrary input.
///
/// Used for ids that must survive re-ingest (e.g. a part id derived from the
/// rundown id and the part's external id).
pub fn hash_id(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(17);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = PartId::new();
        let b = PartId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_inner() {
        let id = PieceId::from("piece_a");
        assert_eq!(id.to_string(), "piece_a");
        assert_eq!(id.as_str(), "piece_a");
    }

    #[test]
    fn serde_is_transparent() {
        let id = RundownId::from("ro1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ro1\"");
        let back: RundownId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn hash_id_is_deterministic() {
        assert_eq!(hash_id("ro1_part1"), hash_id("ro1_part1"));
        assert_ne!(hash_id("ro1_part1"), hash_id("ro1_part2"));
        assert_eq!(hash_id("x").len(), 17);
    }

    #[test]
    fn borrow_allows_str_lookup() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(SegmentId::from("s1"));
        assert!(set.contains("s1"));
    }
}
