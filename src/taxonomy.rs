//! Disposition taxonomy — the three-way outcome assigned to each message.
//!
//! Two codecs live here on purpose so the encoding stays consistent across
//! the log and the dashboard:
//! - `as_str` / `parse`: the storage round-trip. `parse` is total and lossy —
//!   the log tolerates manual edits and legacy rows, so unknown strings fall
//!   back to `Negotiation` instead of failing.
//! - `from_model_label`: the strict matcher for classifier output. Malformed
//!   model output must surface, not coerce, so this one returns `None`.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

/// Outcome classification for an inbound sponsorship email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Requires price negotiation.
    Negotiation,
    /// Opportunity declined.
    Rejected,
    /// Assets were provided (or the message carried attachments).
    AssetProvided,
}

impl Disposition {
    /// Storage string for this disposition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negotiation => "Negotiation",
            Self::Rejected => "Rejected",
            Self::AssetProvided => "Asset Provided",
        }
    }

    /// Total, lossy parse of a stored string. Unknown input → `Negotiation`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Rejected" => Self::Rejected,
            "Asset Provided" => Self::AssetProvided,
            _ => Self::Negotiation,
        }
    }

    /// Strict parse of a classifier model label (`NEGOTIATION`, `REJECTED`,
    /// `ASSET_PROVIDED`). Case-insensitive, whitespace-trimmed.
    pub fn from_model_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NEGOTIATION" => Some(Self::Negotiation),
            "REJECTED" => Some(Self::Rejected),
            "ASSET_PROVIDED" => Some(Self::AssetProvided),
            _ => None,
        }
    }

    /// All three values, for iteration in views and tests.
    pub fn all() -> [Self; 3] {
        [Self::Negotiation, Self::Rejected, Self::AssetProvided]
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Disposition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Disposition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_values() {
        for d in Disposition::all() {
            assert_eq!(Disposition::parse(d.as_str()), d);
        }
    }

    #[test]
    fn unknown_string_falls_back_to_negotiation() {
        assert_eq!(Disposition::parse("Pending"), Disposition::Negotiation);
        assert_eq!(Disposition::parse(""), Disposition::Negotiation);
        assert_eq!(Disposition::parse("asset provided"), Disposition::Negotiation);
    }

    #[test]
    fn model_label_strict_matches() {
        assert_eq!(
            Disposition::from_model_label("NEGOTIATION"),
            Some(Disposition::Negotiation)
        );
        assert_eq!(
            Disposition::from_model_label("rejected"),
            Some(Disposition::Rejected)
        );
        assert_eq!(
            Disposition::from_model_label("  ASSET_PROVIDED\n"),
            Some(Disposition::AssetProvided)
        );
    }

    #[test]
    fn model_label_rejects_unknown() {
        assert_eq!(Disposition::from_model_label("MAYBE"), None);
        assert_eq!(Disposition::from_model_label("PENDING"), None);
        assert_eq!(Disposition::from_model_label(""), None);
    }

    #[test]
    fn serde_uses_storage_strings() {
        let json = serde_json::to_string(&Disposition::AssetProvided).unwrap();
        assert_eq!(json, "\"Asset Provided\"");
        let back: Disposition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Disposition::AssetProvided);
    }

    #[test]
    fn serde_deserialize_is_lenient() {
        let d: Disposition = serde_json::from_str("\"Whatever\"").unwrap();
        assert_eq!(d, Disposition::Negotiation);
    }
}
