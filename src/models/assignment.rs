//! Backend call-to-deal assignments.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which deal (if any) and contact a call belongs to.
///
/// The backend is the authoritative owner; values held here are a
/// time-bounded replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub deal_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub contact_id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, rename = "duration")]
    pub duration_seconds: i64,
}

impl Assignment {
    pub fn new(deal_id: Option<&str>, contact_id: &str) -> Self {
        Self {
            deal_id: deal_id.map(|d| d.to_string()),
            contact_id: contact_id.to_string(),
            created_at: 0,
            duration_seconds: 0,
        }
    }

    /// True when the call is assigned to exactly this deal.
    pub fn belongs_to(&self, deal_id: &str) -> bool {
        self.deal_id.as_deref() == Some(deal_id)
    }

    pub fn is_unassigned(&self) -> bool {
        self.deal_id.is_none()
    }
}

/// Ownership test used by every resolution pass.
pub fn is_owned_by(assignment: Option<&Assignment>, deal_id: &str) -> bool {
    assignment.map(|a| a.belongs_to(deal_id)).unwrap_or(false)
}

/// Inverse test used by the unassigned-calls read path.
pub fn is_unassigned(assignment: Option<&Assignment>) -> bool {
    assignment.map(|a| a.is_unassigned()).unwrap_or(true)
}

/// Ids arrive as strings or numbers depending on the backend version.
fn id_from_value<E: de::Error>(value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(E::custom(format!(
            "expected a string or numeric id, got {}",
            other
        ))),
    }
}

pub(crate) fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    id_from_value(Value::deserialize(deserializer)?)
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_from_value(Value::deserialize(deserializer)?)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_ids_normalized() {
        let a: Assignment = serde_json::from_value(json!({
            "deal_id": 42,
            "contact_id": 7,
            "created_at": 1706500000,
            "duration": 79
        }))
        .unwrap();

        assert_eq!(a.deal_id.as_deref(), Some("42"));
        assert_eq!(a.contact_id, "7");
        assert_eq!(a.duration_seconds, 79);
        assert!(a.belongs_to("42"));
    }

    #[test]
    fn test_null_deal() {
        let a: Assignment =
            serde_json::from_value(json!({"deal_id": null, "contact_id": "7"})).unwrap();
        assert!(a.is_unassigned());
        assert!(!a.belongs_to("42"));
    }

    #[test]
    fn test_rejects_object_id() {
        let result: Result<Assignment, _> =
            serde_json::from_value(json!({"deal_id": {"id": 1}, "contact_id": "7"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_ownership_predicate() {
        let same = Assignment::new(Some("42"), "7");
        let other = Assignment::new(Some("43"), "7");
        let none = Assignment::new(None, "7");

        assert!(is_owned_by(Some(&same), "42"));
        assert!(!is_owned_by(Some(&other), "42"));
        assert!(!is_owned_by(Some(&none), "42"));
        assert!(!is_owned_by(None, "42"));
    }

    #[test]
    fn test_unassigned_predicate() {
        assert!(is_unassigned(None));
        assert!(is_unassigned(Some(&Assignment::new(None, "7"))));
        assert!(!is_unassigned(Some(&Assignment::new(Some("42"), "7"))));
    }
}
