//! Vault export loading and record normalization
//!
//! Reads a Bitwarden-style JSON export and flattens each item into a
//! [`Record`]. Missing optional data never fails an item: an unknown folder
//! id gives an empty folder name and an item without a usable URI or email
//! username gives an empty domain. An item without an id gets the positional
//! id `item-<index>`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{CustomField, ItemType, Record};

/// Top-level export document
#[derive(Debug, Deserialize)]
struct RawExport {
    #[serde(default)]
    encrypted: bool,
    #[serde(default)]
    folders: Option<Vec<RawFolder>>,
    #[serde(default)]
    items: Option<Vec<RawItem>>,
}

#[derive(Debug, Deserialize)]
struct RawFolder {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    item_type: Option<i64>,
    folder_id: Option<String>,
    login: Option<RawLogin>,
    notes: Option<String>,
    fields: Option<Vec<RawField>>,
    favorite: Option<bool>,
    reprompt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawLogin {
    uris: Option<Vec<RawUri>>,
    username: Option<String>,
    password: Option<String>,
    totp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUri {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: Option<String>,
    value: Option<Value>,
}

/// Read and normalize a vault export file
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let content = fs::read_to_string(path)?;
    let records = parse_export(&content)?;
    debug!(path = %path.display(), items = records.len(), "Loaded vault export");
    Ok(records)
}

/// Parse an export document into records, in export order
pub fn parse_export(content: &str) -> Result<Vec<Record>> {
    let raw: RawExport = serde_json::from_str(content)
        .map_err(|e| Error::InputFormat(format!("Invalid vault export JSON: {}", e)))?;

    if raw.encrypted {
        return Err(Error::InputFormat(
            "Encrypted exports are not supported; export the vault as unencrypted JSON".into(),
        ));
    }

    let items = raw
        .items
        .ok_or_else(|| Error::InputFormat("Vault export has no `items` array".into()))?;

    let folders: HashMap<String, String> = raw
        .folders
        .unwrap_or_default()
        .into_iter()
        .filter_map(|f| Some((f.id?, f.name.unwrap_or_default())))
        .collect();

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let record = normalize_item(index, item, &folders)?;
        if !seen.insert(record.id.clone()) {
            return Err(Error::InputFormat(format!(
                "Duplicate item id in export: {}",
                record.id
            )));
        }
        records.push(record);
    }

    Ok(records)
}

fn normalize_item(index: usize, item: RawItem, folders: &HashMap<String, String>) -> Result<Record> {
    let id = match item.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => {
            let id = format!("item-{}", index);
            warn!(position = index, id = %id, "Item has no id; assigned a positional id");
            id
        }
    };

    let folder_name = item
        .folder_id
        .as_ref()
        .and_then(|folder_id| folders.get(folder_id))
        .cloned()
        .unwrap_or_default();

    let (login_uris, username, password, totp) = match item.login {
        Some(login) => (
            login
                .uris
                .unwrap_or_default()
                .into_iter()
                .filter_map(|u| u.uri)
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect::<Vec<_>>(),
            login.username.unwrap_or_default(),
            login.password.unwrap_or_default(),
            login.totp.unwrap_or_default(),
        ),
        None => (Vec::new(), String::new(), String::new(), String::new()),
    };

    let fields = item
        .fields
        .unwrap_or_default()
        .into_iter()
        .map(|f| CustomField {
            name: f.name.unwrap_or_default(),
            value: match f.value {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
            },
        })
        .collect();

    let domain = extract_domain(&login_uris, &username);

    Ok(Record {
        id,
        name: item.name.unwrap_or_default(),
        item_type: ItemType::from_code(item.item_type.unwrap_or(1)),
        folder_name,
        username,
        domain,
        notes: item.notes.unwrap_or_default(),
        fields,
        favorite: item.favorite.unwrap_or(false),
        reprompt: item.reprompt.unwrap_or(0),
        login_uris,
        password,
        totp,
    })
}

/// True for Android app identifiers, which carry no web host
pub fn is_android_uri(uri: &str) -> bool {
    uri.trim().to_lowercase().starts_with("androidapp://")
}

/// Lower-cased host of a login URI, if it has one
///
/// URIs without a scheme are read as `http://<uri>`.
pub fn uri_host(uri: &str) -> Option<String> {
    let uri = uri.trim();
    if uri.is_empty() || is_android_uri(uri) {
        return None;
    }
    let candidate = if uri.contains("://") {
        uri.to_string()
    } else {
        format!("http://{}", uri)
    };
    let url = Url::parse(&candidate).ok()?;
    let host = url.host_str()?.trim_matches(|c| c == '[' || c == ']');
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// Derive an item's domain from its first web URI or its email username
///
/// Returns an empty string when neither yields a domain.
pub fn extract_domain(uris: &[String], username: &str) -> String {
    if let Some(host) = uris.iter().find_map(|u| uri_host(u)) {
        return host;
    }
    match username.trim().rsplit_once('@') {
        Some((_, domain)) if !domain.trim().is_empty() => domain.trim().to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_export() -> &'static str {
        r#"{
            "encrypted": false,
            "folders": [
                {"id": "f-work", "name": "Work"},
                {"id": "f-home", "name": "Home"}
            ],
            "items": [
                {
                    "id": "i-1",
                    "name": "GitHub",
                    "type": 1,
                    "folderId": "f-work",
                    "favorite": true,
                    "reprompt": 0,
                    "notes": "2FA enabled",
                    "fields": [{"name": "pin", "value": "1234", "type": 1}],
                    "login": {
                        "uris": [{"uri": "androidapp://com.github.android"}, {"uri": "https://GitHub.com/login"}],
                        "username": "dev@example.com",
                        "password": "hunter2",
                        "totp": "otpauth://x"
                    }
                },
                {
                    "id": "i-2",
                    "name": "Mail",
                    "type": 1,
                    "folderId": "missing-folder",
                    "login": {"uris": null, "username": "alice@Google.com"}
                },
                {
                    "id": "i-3",
                    "name": "Wifi notes",
                    "type": 2,
                    "folderId": null,
                    "notes": null,
                    "login": null
                }
            ]
        }"#
    }

    #[test]
    fn test_parse_export_normalizes_items() {
        let records = parse_export(sample_export()).unwrap();
        assert_eq!(records.len(), 3);

        let github = &records[0];
        assert_eq!(github.id, "i-1");
        assert_eq!(github.folder_name, "Work");
        assert_eq!(github.domain, "github.com");
        assert_eq!(github.item_type, ItemType::Login);
        assert!(github.favorite);
        assert_eq!(github.login_uris.len(), 2);
        assert_eq!(github.fields[0].name, "pin");
        assert_eq!(github.fields[0].value, "1234");
        assert_eq!(github.password, "hunter2");
    }

    #[test]
    fn test_unknown_folder_is_empty() {
        let records = parse_export(sample_export()).unwrap();
        assert_eq!(records[1].folder_name, "");
        assert_eq!(records[1].domain, "google.com");
    }

    #[test]
    fn test_incomplete_item_gets_empty_domain() {
        let records = parse_export(sample_export()).unwrap();
        let note = &records[2];
        assert_eq!(note.item_type, ItemType::SecureNote);
        assert_eq!(note.domain, "");
        assert_eq!(note.username, "");
        assert!(note.login_uris.is_empty());
    }

    #[test]
    fn test_missing_items_is_input_format_error() {
        let err = parse_export(r#"{"folders": []}"#).unwrap_err();
        assert!(matches!(err, Error::InputFormat(_)));
    }

    #[test]
    fn test_invalid_json_is_input_format_error() {
        let err = parse_export("not json").unwrap_err();
        assert!(matches!(err, Error::InputFormat(_)));
    }

    #[test]
    fn test_encrypted_export_rejected() {
        let err = parse_export(r#"{"encrypted": true, "items": []}"#).unwrap_err();
        assert!(matches!(err, Error::InputFormat(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = parse_export(r#"{"items": [{"id": "a"}, {"id": "a"}]}"#).unwrap_err();
        assert!(matches!(err, Error::InputFormat(_)));
    }

    #[test]
    fn test_missing_id_gets_positional_id() {
        let records = parse_export(
            r#"{"items": [{"id": "a", "name": "first"}, {"name": "no id"}, {"id": "  ", "name": "blank"}]}"#,
        )
        .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "item-1", "item-2"]);
        assert_eq!(records[1].name, "no id");
    }

    #[test]
    fn test_positional_id_still_checked_for_duplicates() {
        let err = parse_export(r#"{"items": [{"id": "item-1"}, {"name": "no id"}]}"#).unwrap_err();
        assert!(matches!(err, Error::InputFormat(_)));
    }

    #[test]
    fn test_missing_folders_allowed() {
        let records = parse_export(r#"{"items": [{"id": "a", "folderId": "x"}]}"#).unwrap();
        assert_eq!(records[0].folder_name, "");
    }

    #[test]
    fn test_extract_domain_without_scheme() {
        let uris = vec!["accounts.example.org/signin".to_string()];
        assert_eq!(extract_domain(&uris, ""), "accounts.example.org");
    }

    #[test]
    fn test_extract_domain_skips_android() {
        let uris = vec!["androidapp://com.bank.app".to_string()];
        assert_eq!(extract_domain(&uris, "bob@bank.com"), "bank.com");
        assert_eq!(extract_domain(&uris, "bob"), "");
    }

    #[test]
    fn test_uri_host_ip_literal() {
        assert_eq!(uri_host("http://192.168.1.10:8080/admin").as_deref(), Some("192.168.1.10"));
        assert_eq!(uri_host("https://[::1]/").as_deref(), Some("::1"));
        assert_eq!(uri_host("   "), None);
    }

    #[test]
    fn test_load_records_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, sample_export()).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 3);
    }
}
