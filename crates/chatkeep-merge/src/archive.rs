// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain-JSON conversation archives.
//!
//! Two shapes are read: a bare conversation array (older exports) and an
//! object `{chatHistory, singleChatOnly, meta}`. Exports always use the
//! object form.

use chatkeep_core::{ChatkeepError, Conversation, iso_from_ms};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumString};

/// Archive format version written by [`build_archive`].
pub const ARCHIVE_VERSION: u32 = 1;

/// A parsed archive. Conversations stay raw until repaired.
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    pub chats: Vec<Value>,
    /// Set by single-conversation exports, which may only be merged.
    pub single_chat_only: bool,
    pub meta: Map<String, Value>,
}

/// How an archive is applied to the existing set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImportMode {
    /// Union with the existing set.
    #[default]
    Merge,
    /// Replace the existing set.
    Overwrite,
}

/// What an export covers.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveScope {
    Full,
    /// One conversation, remembered as the current one.
    Single { current_chat_id: String },
}

/// Parse archive text into its conversations and metadata.
pub fn parse_archive(text: &str) -> Result<Archive, ChatkeepError> {
    let data: Value = serde_json::from_str(text)?;
    match data {
        Value::Array(chats) => Ok(Archive {
            chats,
            single_chat_only: false,
            meta: Map::new(),
        }),
        Value::Object(mut object) => {
            if object.get("encrypted").and_then(Value::as_bool) == Some(true) {
                return Err(ChatkeepError::InvalidArchive(
                    "encrypted archives are not supported".into(),
                ));
            }
            let Some(Value::Array(chats)) = object.remove("chatHistory") else {
                return Err(ChatkeepError::InvalidArchive(
                    "expected a conversation array or an object with `chatHistory`".into(),
                ));
            };
            let single_chat_only = object
                .get("singleChatOnly")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let meta = match object.remove("meta") {
                Some(Value::Object(meta)) => meta,
                _ => Map::new(),
            };
            Ok(Archive {
                chats,
                single_chat_only,
                meta,
            })
        }
        _ => Err(ChatkeepError::InvalidArchive(
            "expected a conversation array or an object with `chatHistory`".into(),
        )),
    }
}

impl Archive {
    /// Reject modes the archive does not allow.
    pub fn check_mode(&self, mode: ImportMode) -> Result<(), ChatkeepError> {
        if mode == ImportMode::Overwrite && self.single_chat_only {
            return Err(ChatkeepError::InvalidArchive(
                "single-conversation archives can only be merged".into(),
            ));
        }
        Ok(())
    }
}

/// Build the export document for `chats`, stamped at `now_ms`.
pub fn build_archive(
    chats: &[Conversation],
    scope: &ArchiveScope,
    now_ms: i64,
) -> Result<Value, ChatkeepError> {
    let mut meta = json!({
        "version": ARCHIVE_VERSION,
        "exportedAt": iso_from_ms(now_ms),
        "totalChats": chats.len(),
    });
    let mut doc = Map::new();
    match scope {
        ArchiveScope::Full => {
            meta["type"] = json!("full");
        }
        ArchiveScope::Single { current_chat_id } => {
            meta["type"] = json!("single");
            meta["currentChatId"] = json!(current_chat_id);
            doc.insert("singleChatOnly".into(), Value::Bool(true));
        }
    }
    doc.insert("meta".into(), meta);
    doc.insert("chatHistory".into(), serde_json::to_value(chats)?);
    Ok(Value::Object(doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_is_a_full_archive() {
        let archive = parse_archive(r#"[{"id":"a"}]"#).unwrap();
        assert_eq!(archive.chats.len(), 1);
        assert!(!archive.single_chat_only);
        assert!(archive.meta.is_empty());
    }

    #[test]
    fn object_form_carries_flags_and_meta() {
        let text = r#"{"singleChatOnly": true, "meta": {"version": 1}, "chatHistory": []}"#;
        let archive = parse_archive(text).unwrap();
        assert!(archive.single_chat_only);
        assert_eq!(archive.meta.get("version"), Some(&json!(1)));
        assert!(archive.check_mode(ImportMode::Overwrite).is_err());
        assert!(archive.check_mode(ImportMode::Merge).is_ok());
    }

    #[test]
    fn unrecognized_shapes_are_rejected() {
        for text in [r#"{"chats": []}"#, "42", r#""text""#] {
            let err = parse_archive(text).unwrap_err();
            assert_eq!(err.kind(), "invalid_archive", "input {text}");
        }
        assert_eq!(parse_archive("{").unwrap_err().kind(), "serialization");
        let err = parse_archive(r#"{"encrypted": true, "data": "..."}"#).unwrap_err();
        assert!(err.to_string().contains("encrypted"));
    }

    #[test]
    fn export_round_trips_through_parse() {
        let chat = Conversation::new("Hello", None, 1_704_067_200_000);
        let doc = build_archive(
            std::slice::from_ref(&chat),
            &ArchiveScope::Single {
                current_chat_id: chat.id.clone(),
            },
            1_704_067_200_000,
        )
        .unwrap();
        assert_eq!(doc["meta"]["type"], json!("single"));
        assert_eq!(doc["meta"]["exportedAt"], json!("2024-01-01T00:00:00.000Z"));

        let archive = parse_archive(&doc.to_string()).unwrap();
        assert!(archive.single_chat_only);
        assert_eq!(archive.chats[0]["id"], json!(chat.id));
        assert_eq!(archive.meta.get("currentChatId"), Some(&json!(chat.id)));
    }

    #[test]
    fn import_mode_names() {
        assert_eq!(ImportMode::Overwrite.to_string(), "overwrite");
        assert_eq!("merge".parse::<ImportMode>().unwrap(), ImportMode::Merge);
    }
}
