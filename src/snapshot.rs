// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Portable, versioned JSON snapshots of the whole sound library.
//!
//! A snapshot looks like:
//!
//! ```json
//! {
//!   "version": 1,
//!   "items": [
//!     { "id": 1, "name": "Jump", "key": "Space", "createdAt": 1700000000000,
//!       "duration": 0.42, "blobType": "audio/wav", "blobText": "UklGR..." }
//!   ]
//! }
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::error::{Error, Result};
use crate::keys::KeyLabel;
use crate::sound::{now_millis, NewSound, Sound, SoundId};

/// The only snapshot version understood.
pub const VERSION: u64 = 1;

/// Default file name for exports.
pub const DEFAULT_EXPORT_FILE: &str = "soundpad_export.json";

/// Name given to imported items that carry none.
pub const IMPORTED_NAME: &str = "Imported";

/// What to do when one item of an import cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPolicy {
    /// Stop at the failing item. Items created before it are kept.
    #[default]
    #[serde(alias = "abort_remaining")]
    Abort,
    /// Skip the failing item and continue with the next one.
    #[serde(alias = "skip_failed")]
    Skip,
}

impl FromStr for ImportPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "abort_remaining" => Ok(ImportPolicy::Abort),
            "skip" | "skip_failed" => Ok(ImportPolicy::Skip),
            _ => Err(format!("unknown import policy '{}'", s)),
        }
    }
}

/// The outcome of an import.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Ids of the records created, in document order.
    pub created: Vec<SoundId>,
    /// Items that failed, by index in the document.
    pub failed: Vec<(usize, Error)>,
    /// True if the import stopped before reaching the end of the document.
    pub aborted: bool,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }
}

#[derive(Serialize)]
struct Document<'a> {
    version: u64,
    items: Vec<ExportItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportItem<'a> {
    id: i64,
    name: &'a str,
    key: Option<&'a str>,
    created_at: i64,
    duration: Option<f64>,
    blob_type: &'a str,
    blob_text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ImportItem {
    // Never reused, records always get fresh ids.
    #[allow(dead_code)]
    id: Option<Value>,
    name: Option<String>,
    key: Option<String>,
    created_at: Option<f64>,
    duration: Option<f64>,
    blob_type: Option<String>,
    #[serde(alias = "blobB64")]
    blob_text: Option<String>,
}

/// Serializes the given sounds into a pretty-printed snapshot document.
pub fn export(sounds: &[Sound]) -> Result<String> {
    let document = Document {
        version: VERSION,
        items: sounds
            .iter()
            .map(|sound| ExportItem {
                id: sound.id.0,
                name: &sound.name,
                key: sound.key.as_ref().map(|k| k.as_str()),
                created_at: sound.created_at,
                duration: sound.duration.filter(|d| d.is_finite()),
                blob_type: sound.blob.mime(),
                blob_text: codec::encode(sound.blob.bytes()),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&document).map_err(|e| Error::Format(e.to_string()))
}

/// Parses a snapshot document into one creation request per item.
///
/// Structural problems with the document as a whole fail with `Format` before anything is
/// produced. Problems with a single item are reported in that item's slot so the caller can
/// apply its partial-failure policy.
pub fn import(text: &str, default_blob_type: &str) -> Result<Vec<Result<NewSound>>> {
    let document: Value =
        serde_json::from_str(text).map_err(|e| Error::Format(format!("not JSON: {}", e)))?;

    let object = document
        .as_object()
        .ok_or_else(|| Error::Format("document is not an object".to_string()))?;

    match object.get("version").and_then(Value::as_u64) {
        Some(VERSION) => {}
        Some(other) => return Err(Error::Format(format!("unsupported version {}", other))),
        None => return Err(Error::Format("missing version".to_string())),
    }

    let items = object
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Format("items is missing or not a list".to_string()))?;

    Ok(items
        .iter()
        .map(|item| to_request(item, default_blob_type))
        .collect())
}

fn to_request(item: &Value, default_blob_type: &str) -> Result<NewSound> {
    let item: ImportItem = serde_json::from_value(item.clone())
        .map_err(|e| Error::Decode(format!("malformed item: {}", e)))?;

    let text = item
        .blob_text
        .ok_or_else(|| Error::Decode("item has no audio payload".to_string()))?;
    let blob_type = item
        .blob_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default_blob_type.to_string());
    let blob = codec::decode(&text, &blob_type)?;

    let name = item
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| IMPORTED_NAME.to_string());
    let key = item
        .key
        .filter(|k| !k.is_empty())
        .map(|k| KeyLabel::from_stored(&k));
    let created_at = item
        .created_at
        .filter(|c| *c != 0.0 && c.is_finite())
        .map(|c| c as i64)
        .unwrap_or_else(now_millis);

    Ok(NewSound {
        name,
        key,
        blob,
        created_at,
        duration: item.duration,
    })
}

#[cfg(test)]
mod test {
    use crate::sound::Blob;

    use super::*;

    fn sound(id: i64, name: &str, key: Option<&str>, duration: Option<f64>) -> Sound {
        Sound {
            id: SoundId(id),
            name: name.to_string(),
            key: key.map(KeyLabel::from_stored),
            blob: Blob::new("audio/wav", vec![id as u8, 0, 255, 128]),
            created_at: 1_700_000_000_000 + id,
            duration,
        }
    }

    #[test]
    fn test_export_schema() {
        let text = export(&[sound(3, "Jump", None, None)]).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["version"], 1);
        let item = &value["items"][0];
        assert_eq!(item["id"], 3);
        assert_eq!(item["name"], "Jump");
        // Absent values are explicit nulls, not omitted.
        assert!(item.as_object().unwrap().contains_key("key"));
        assert!(item["key"].is_null());
        assert!(item.as_object().unwrap().contains_key("duration"));
        assert!(item["duration"].is_null());
        assert_eq!(item["createdAt"], 1_700_000_000_003i64);
        assert_eq!(item["blobType"], "audio/wav");
        assert_eq!(item["blobText"], codec::encode(&[3, 0, 255, 128]));
    }

    #[test]
    fn test_export_import() {
        let sounds = vec![
            sound(1, "Jump", Some("Space"), Some(0.25)),
            sound(2, "Coin", Some("A"), None),
            sound(3, "Boom", None, Some(12.0)),
        ];
        let requests = import(&export(&sounds).unwrap(), "audio/mpeg").unwrap();
        assert_eq!(requests.len(), sounds.len());

        for (original, request) in sounds.iter().zip(requests) {
            let request = request.unwrap();
            assert_eq!(request.name, original.name);
            assert_eq!(request.key, original.key);
            assert_eq!(request.duration, original.duration);
            assert_eq!(request.created_at, original.created_at);
            assert_eq!(request.blob, original.blob);
        }
    }

    #[test]
    fn test_export_import_keeps_probed_durations() {
        // Frame counts over common sample rates rarely have short decimal forms.
        let durations = [4.0 / 44100.0, 7.0 / 48000.0, 12345.0 / 22050.0, 3.0 / 11025.0];
        let sounds: Vec<Sound> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| sound(i as i64 + 1, "Clip", None, Some(*d)))
            .collect();

        let requests = import(&export(&sounds).unwrap(), "audio/mpeg").unwrap();
        for (expected, request) in durations.iter().zip(requests) {
            let duration = request.unwrap().duration.unwrap();
            assert_eq!(duration.to_bits(), expected.to_bits(), "{} != {}", duration, expected);
        }
    }

    #[test]
    fn test_import_format_faults() {
        for text in [
            "not json",
            "[]",
            r#"{"items": []}"#,
            r#"{"version": 2, "items": []}"#,
            r#"{"version": 1}"#,
            r#"{"version": 1, "items": {}}"#,
        ] {
            assert!(
                matches!(import(text, "audio/mpeg"), Err(Error::Format(_))),
                "expected format fault for {}",
                text
            );
        }
    }

    #[test]
    fn test_import_defaults() {
        let text = r#"{
            "version": 1,
            "items": [
                { "id": 9, "name": "", "key": "", "blobB64": "AAEC" },
                { "name": "Named", "key": "B", "createdAt": 5, "duration": 2.5,
                  "blobType": "audio/ogg", "blobText": "AAEC" }
            ]
        }"#;
        let before = now_millis();
        let requests: Vec<NewSound> = import(text, "audio/mpeg")
            .unwrap()
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(requests[0].name, IMPORTED_NAME);
        assert_eq!(requests[0].key, None);
        assert_eq!(requests[0].blob.mime(), "audio/mpeg");
        assert_eq!(requests[0].blob.bytes(), &[0, 1, 2]);
        assert!(requests[0].created_at >= before);
        assert_eq!(requests[0].duration, None);

        assert_eq!(requests[1].name, "Named");
        assert_eq!(requests[1].key, Some(KeyLabel::from_stored("B")));
        assert_eq!(requests[1].blob.mime(), "audio/ogg");
        assert_eq!(requests[1].created_at, 5);
        assert_eq!(requests[1].duration, Some(2.5));
    }

    #[test]
    fn test_import_item_faults_are_per_item() {
        let text = r#"{
            "version": 1,
            "items": [
                { "name": "good", "blobText": "AAEC" },
                { "name": "bad payload", "blobText": "%%%" },
                { "name": "no payload" },
                "not an object"
            ]
        }"#;
        let requests = import(text, "audio/mpeg").unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests[0].is_ok());
        assert!(matches!(requests[1], Err(Error::Decode(_))));
        assert!(matches!(requests[2], Err(Error::Decode(_))));
        assert!(matches!(requests[3], Err(Error::Decode(_))));
    }

    #[test]
    fn test_import_policy_from_str() {
        assert_eq!("abort".parse::<ImportPolicy>(), Ok(ImportPolicy::Abort));
        assert_eq!("Skip".parse::<ImportPolicy>(), Ok(ImportPolicy::Skip));
        assert!("sometimes".parse::<ImportPolicy>().is_err());
        assert_eq!(ImportPolicy::default(), ImportPolicy::Abort);
    }
}
