//! Push event payload as sent by the source-code host.
//!
//! Only the fields the bridge reads are modelled. Unknown fields are ignored
//! and every field defaults when absent or `null`, so decoding only fails on
//! malformed JSON or on a field of the wrong type.

use serde::{Deserialize, Deserializer};

/// Body of a push webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub before: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub after: String,
    #[serde(default, deserialize_with = "null_as_default", rename = "ref")]
    pub git_ref: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commits: Vec<Commit>,
}

/// One pushed commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Commit {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default", rename = "added")]
    pub added_paths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", rename = "removed")]
    pub removed_paths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", rename = "modified")]
    pub modified_paths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: Person,
    #[serde(default, deserialize_with = "null_as_default")]
    pub committer: Person,
    #[serde(default, deserialize_with = "null_as_default")]
    pub distinct: bool,
}

/// Commit author or committer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Person {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

impl Commit {
    /// Names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.url) {
            missing.push("url");
        }
        if is_blank(&self.author.name) {
            missing.push("author.name");
        }
        if is_blank(&self.message) {
            missing.push("message");
        }
        missing
    }
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_payload() {
        let json = r#"{
            "before": "aaa",
            "after": "bbb",
            "ref": "refs/heads/main",
            "compare": "https://example.com/compare/aaa...bbb",
            "repository": {"name": "widgets"},
            "pusher": {"name": "ann"},
            "commits": [{
                "id": "bbb",
                "message": "Fixed it [CARD-1](Done)",
                "timestamp": "2024-05-01T10:00:00+02:00",
                "url": "http://x/1",
                "added": ["src/new.rs"],
                "removed": [],
                "modified": ["src/lib.rs"],
                "author": {"name": "Ann", "username": "ann", "email": "ann@example.com"},
                "committer": {"name": "Ann", "username": "ann", "email": "ann@example.com"},
                "distinct": true,
                "tree_id": "ccc"
            }]
        }"#;

        let payload: PushPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.git_ref, "refs/heads/main");
        assert_eq!(payload.commits.len(), 1);

        let commit = &payload.commits[0];
        assert_eq!(commit.author.name, "Ann");
        assert_eq!(commit.added_paths, vec!["src/new.rs"]);
        assert_eq!(commit.modified_paths, vec!["src/lib.rs"]);
        assert!(commit.distinct);
        assert!(commit.missing_fields().is_empty());
    }

    #[test]
    fn test_minimal_payload() {
        let payload: PushPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.commits.is_empty());

        let payload: PushPayload =
            serde_json::from_str(r#"{"commits": [{"message": "x"}]}"#).unwrap();
        assert_eq!(payload.commits[0].url, "");
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let json = r#"{
            "before": null,
            "ref": "refs/heads/main",
            "commits": [{
                "id": "bbb",
                "message": "Fixed it [CARD-1](Done)",
                "timestamp": null,
                "url": "http://x/1",
                "added": null,
                "removed": null,
                "modified": null,
                "author": {"name": "Ann", "username": null, "email": null},
                "committer": null,
                "distinct": null
            }]
        }"#;

        let payload: PushPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.before, "");

        let commit = &payload.commits[0];
        assert_eq!(commit.author.name, "Ann");
        assert_eq!(commit.author.username, "");
        assert_eq!(commit.committer, Person::default());
        assert!(commit.added_paths.is_empty());
        assert!(!commit.distinct);
        assert!(commit.missing_fields().is_empty());

        let payload: PushPayload = serde_json::from_str(r#"{"commits": null}"#).unwrap();
        assert!(payload.commits.is_empty());
    }

    #[test]
    fn test_null_required_field_is_reported_missing() {
        let payload: PushPayload = serde_json::from_str(
            r#"{"commits": [{"message": "x", "url": "http://x/1", "author": {"name": null}}]}"#,
        )
        .unwrap();
        assert_eq!(payload.commits[0].missing_fields(), vec!["author.name"]);
    }

    #[test]
    fn test_wrong_type_fails() {
        assert!(serde_json::from_str::<PushPayload>(r#"{"commits": "nope"}"#).is_err());
        assert!(serde_json::from_str::<PushPayload>("not json").is_err());
    }

    #[test]
    fn test_missing_fields_treats_whitespace_as_blank() {
        let commit = Commit {
            message: "  \n".to_string(),
            url: "http://x/1".to_string(),
            ..Default::default()
        };
        assert_eq!(commit.missing_fields(), vec!["author.name", "message"]);
    }
}
