//! Deterministic classification from the domain-folder map
//!
//! Items matched here never reach the model. The map is an ordered list of
//! `{domain, folder}` entries; the first entry that matches an item wins,
//! whether it matched on folder name or on domain.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Category, Classification, DomainFolderRule, Record};
use crate::vault::uri_host;

/// Raw map entry; incomplete entries are skipped rather than rejected
#[derive(Debug, Deserialize)]
struct RawRule {
    domain: Option<String>,
    folder: Option<String>,
}

/// Ordered domain/folder rules loaded from the optional mapping file
#[derive(Debug, Clone, Default)]
pub struct DomainFolderMap {
    rules: Vec<DomainFolderRule>,
}

impl DomainFolderMap {
    pub fn new(rules: Vec<DomainFolderRule>) -> Self {
        Self { rules }
    }

    /// Load the mapping file (YAML; JSON is accepted as a YAML subset)
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let map = Self::from_yaml(&content)?;
        debug!(path = %path.display(), rules = map.len(), "Loaded domain-folder map");
        Ok(map)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: Option<Vec<RawRule>> = serde_yaml::from_str(content).map_err(|e| {
            Error::InputFormat(format!(
                "Domain-folder map must be a list of {{domain, folder}} entries: {}",
                e
            ))
        })?;

        let mut rules = Vec::new();
        for (index, entry) in raw.unwrap_or_default().into_iter().enumerate() {
            let domain = entry.domain.map(|d| d.trim().to_string()).unwrap_or_default();
            let folder = entry.folder.map(|f| f.trim().to_string()).unwrap_or_default();
            if domain.is_empty() || folder.is_empty() {
                warn!(entry = index, "Skipping domain-folder map entry without domain and folder");
                continue;
            }
            rules.push(DomainFolderRule { domain, folder });
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[DomainFolderRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose folder or domain matches the record, case-insensitively
    pub fn match_record(&self, record: &Record) -> Option<Classification> {
        self.rules.iter().find_map(|rule| {
            if !record.folder_name.is_empty() && eq_ignore_case(&rule.folder, &record.folder_name) {
                Some(Classification::deterministic(
                    &record.id,
                    Category::Folder(rule.folder.clone()),
                    "Mapped folder",
                ))
            } else if !record.domain.is_empty() && eq_ignore_case(&rule.domain, &record.domain) {
                Some(Classification::deterministic(
                    &record.id,
                    Category::Folder(rule.folder.clone()),
                    "Mapped domain",
                ))
            } else {
                None
            }
        })
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Load the optional domain-folder map; no path means no rules
pub fn load_domain_map(path: Option<&Path>) -> Result<DomainFolderMap> {
    match path {
        Some(path) => DomainFolderMap::load(path),
        None => Ok(DomainFolderMap::default()),
    }
}

/// All rule-based shortcuts applied before the model path
#[derive(Debug, Clone, Default)]
pub struct DeterministicMatcher {
    map: DomainFolderMap,
    detect_homelab: bool,
}

impl DeterministicMatcher {
    pub fn new(map: DomainFolderMap) -> Self {
        Self {
            map,
            detect_homelab: false,
        }
    }

    /// Also classify items pointing at private addresses as Personal/Homelab
    pub fn with_homelab_detection(mut self, enabled: bool) -> Self {
        self.detect_homelab = enabled;
        self
    }

    pub fn classify(&self, record: &Record) -> Option<Classification> {
        if let Some(classification) = self.map.match_record(record) {
            return Some(classification);
        }
        if self.detect_homelab && record.login_uris.iter().any(|u| is_homelab_uri(u)) {
            return Some(Classification::deterministic(
                &record.id,
                Category::PersonalHomelab,
                "Private IP",
            ));
        }
        None
    }

    /// Split records into rule matches and the items left for the model
    ///
    /// Both halves keep input order. Every record lands in exactly one half.
    pub fn partition(&self, records: &[Record]) -> Partition {
        let mut partition = Partition::default();
        for record in records {
            match self.classify(record) {
                Some(classification) => partition.matched.push(classification),
                None => partition.unmatched.push(record.clone()),
            }
        }
        partition
    }
}

/// Result of [`DeterministicMatcher::partition`]
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub matched: Vec<Classification>,
    pub unmatched: Vec<Record>,
}

/// True when a login URI points at localhost or a private/loopback/link-local IP
pub fn is_homelab_uri(uri: &str) -> bool {
    let Some(host) = uri_host(uri) else {
        return false;
    };
    if host == "localhost" {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_private() || ip.is_loopback() || ip.is_link_local(),
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationSource, ItemType};

    fn record(id: &str, folder: &str, domain: &str) -> Record {
        Record {
            id: id.to_string(),
            name: id.to_string(),
            item_type: ItemType::Login,
            folder_name: folder.to_string(),
            username: String::new(),
            domain: domain.to_string(),
            notes: String::new(),
            fields: Vec::new(),
            favorite: false,
            reprompt: 0,
            login_uris: Vec::new(),
            password: String::new(),
            totp: String::new(),
        }
    }

    fn rule(domain: &str, folder: &str) -> DomainFolderRule {
        DomainFolderRule {
            domain: domain.to_string(),
            folder: folder.to_string(),
        }
    }

    #[test]
    fn test_domain_match() {
        let map = DomainFolderMap::new(vec![rule("google.com", "Google")]);
        let c = map.match_record(&record("a", "", "google.com")).unwrap();
        assert_eq!(c.category, Category::Folder("Google".into()));
        assert_eq!(c.confidence, 100);
        assert_eq!(c.source, ClassificationSource::Deterministic);
        assert_eq!(c.reason, "Mapped domain");
    }

    #[test]
    fn test_folder_match_is_case_insensitive() {
        let map = DomainFolderMap::new(vec![rule("acme.com", "ACME Corp")]);
        let c = map.match_record(&record("a", "acme corp", "")).unwrap();
        assert_eq!(c.category.label(), "ACME Corp");
        assert_eq!(c.reason, "Mapped folder");
    }

    #[test]
    fn test_domain_match_is_case_insensitive() {
        let map = DomainFolderMap::new(vec![rule("Google.COM", "Google")]);
        assert!(map.match_record(&record("a", "", "google.com")).is_some());
    }

    #[test]
    fn test_no_match() {
        let map = DomainFolderMap::new(vec![rule("google.com", "Google")]);
        assert!(map.match_record(&record("a", "Personal", "mail.google.com")).is_none());
        assert!(map.match_record(&record("b", "", "")).is_none());
    }

    #[test]
    fn test_first_listed_rule_wins() {
        // Folder matches the second rule, domain matches the first
        let map = DomainFolderMap::new(vec![rule("acme.com", "Acme"), rule("other.com", "Work")]);
        let c = map.match_record(&record("a", "Work", "acme.com")).unwrap();
        assert_eq!(c.category.label(), "Acme");
        assert_eq!(c.reason, "Mapped domain");
    }

    #[test]
    fn test_from_yaml_skips_incomplete_entries() {
        let yaml = r#"
- domain: google.com
  folder: Google
- domain: nofolder.com
- folder: NoDomain
- domain: acme.com
  folder: "  Acme  "
"#;
        let map = DomainFolderMap::from_yaml(yaml).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.rules()[1].folder, "Acme");
    }

    #[test]
    fn test_from_yaml_accepts_json_and_empty() {
        let map = DomainFolderMap::from_yaml(r#"[{"domain": "a.com", "folder": "A"}]"#).unwrap();
        assert_eq!(map.len(), 1);
        assert!(DomainFolderMap::from_yaml("").unwrap().is_empty());
    }

    #[test]
    fn test_from_yaml_rejects_mapping() {
        let err = DomainFolderMap::from_yaml("google.com: Google").unwrap_err();
        assert!(matches!(err, Error::InputFormat(_)));
    }

    #[test]
    fn test_partition_preserves_order() {
        let map = DomainFolderMap::new(vec![rule("google.com", "Google")]);
        let matcher = DeterministicMatcher::new(map);
        let records = vec![
            record("1", "", "github.com"),
            record("2", "", "google.com"),
            record("3", "", "example.com"),
            record("4", "", "google.com"),
        ];

        let partition = matcher.partition(&records);
        let matched: Vec<_> = partition.matched.iter().map(|c| c.item_id.as_str()).collect();
        let unmatched: Vec<_> = partition.unmatched.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(matched, vec!["2", "4"]);
        assert_eq!(unmatched, vec!["1", "3"]);
    }

    #[test]
    fn test_homelab_detection_opt_in() {
        let mut r = record("nas", "", "192.168.1.5");
        r.login_uris = vec!["http://192.168.1.5:5000".to_string()];

        let plain = DeterministicMatcher::new(DomainFolderMap::default());
        assert!(plain.classify(&r).is_none());

        let homelab = plain.with_homelab_detection(true);
        let c = homelab.classify(&r).unwrap();
        assert_eq!(c.category, Category::PersonalHomelab);
        assert_eq!(c.reason, "Private IP");
    }

    #[test]
    fn test_is_homelab_uri() {
        assert!(is_homelab_uri("10.0.0.1"));
        assert!(is_homelab_uri("https://localhost:8443"));
        assert!(is_homelab_uri("http://127.0.0.1"));
        assert!(is_homelab_uri("http://[fd00::1]/"));
        assert!(!is_homelab_uri("https://8.8.8.8"));
        assert!(!is_homelab_uri("https://example.com"));
        assert!(!is_homelab_uri("androidapp://com.example"));
    }

    #[test]
    fn test_load_domain_map_none() {
        assert!(load_domain_map(None).unwrap().is_empty());
    }
}
