//! Prompt library for model classification
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/vaultsort/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! This allows users to customize prompts without modifying the source,
//! while automatically getting new default prompts on upgrade.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Category, Record};
use crate::text::truncate;

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const CLASSIFY_VAULT_ITEMS: &str =
        include_str!("../../../prompts/classify_vault_items.md");
}

/// Longest notes excerpt sent to the model, in characters
pub const NOTES_EXCERPT_CHARS: usize = 200;

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    ClassifyVaultItems,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifyVaultItems => "classify_vault_items",
        }
    }

    /// Get all known prompt IDs
    pub fn all() -> &'static [PromptId] {
        &[Self::ClassifyVaultItems]
    }

    /// Get the default embedded content for this prompt
    fn default_content(&self) -> &'static str {
        match self {
            Self::ClassifyVaultItems => defaults::CLASSIFY_VAULT_ITEMS,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    /// Unique identifier
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    /// Task type label
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Metadata from frontmatter
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    /// Whether this came from an override file
    pub is_override: bool,
    /// Path to override file (if any)
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    /// Get the system section of the prompt
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    /// Get the user section of the prompt
    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the prompt with template variables replaced
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.content, vars)
    }

    /// Render just the user section with variables
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        match self.user_section() {
            Some(user) => render_template(user, vars),
            None => self.render(vars),
        }
    }
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    /// Override directory path
    override_dir: Option<PathBuf>,
    /// Cached parsed prompts
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::InvalidData(format!("Prompt not cached: {}", id.as_str())))
    }

    /// Load a prompt (checking override first, then default)
    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(override_path) = self.override_path(id) {
            if override_path.exists() {
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::Configuration(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(override_path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    /// Where an override for this prompt would live
    pub fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|d| d.join(format!("{}.md", id.as_str())))
    }

    /// Check if a prompt has an override file
    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    /// Get the override directory path
    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }

    /// Render the classification request for one batch
    ///
    /// The system section, when present, leads the single user message.
    pub fn render_batch(&mut self, batch: &[Record]) -> Result<String> {
        let items = serde_json::to_string_pretty(&batch_contexts(batch))?;
        let categories = category_list();
        let count = batch.len().to_string();

        let template = self.get(PromptId::ClassifyVaultItems)?;
        let mut vars = HashMap::new();
        vars.insert("items", items.as_str());
        vars.insert("categories", categories.as_str());
        vars.insert("count", count.as_str());

        let user = template.render_user(&vars);
        Ok(match template.system_section() {
            Some(system) if !system.is_empty() => format!("{}\n\n{}", system, user),
            _ => user,
        })
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// What the model sees of one vault item
///
/// Passwords and TOTP secrets are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemContext {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub domain: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl ItemContext {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            url: record.login_uris.join(","),
            username: record.username.clone(),
            domain: record.domain.clone(),
            item_type: record.item_type.as_str().into_owned(),
            folder: record.folder_name.clone(),
            notes: notes_excerpt(&record.notes),
        }
    }
}

/// Item contexts for a batch, in batch order
pub fn batch_contexts(batch: &[Record]) -> Vec<ItemContext> {
    batch.iter().map(ItemContext::from_record).collect()
}

/// Recover the item contexts from a rendered prompt
///
/// Reads the first fenced JSON block that decodes as an item list. Offline
/// backends use this to answer prompts without a model.
pub fn extract_items(prompt: &str) -> Option<Vec<ItemContext>> {
    const FENCE: &str = "```json";
    let start = prompt.find(FENCE)? + FENCE.len();
    let block = &prompt[start..];

    // Notes may themselves contain fences, so try each closing candidate
    block
        .match_indices("```")
        .find_map(|(end, _)| serde_json::from_str(block[..end].trim()).ok())
}

/// Bulleted list of the fixed categories
pub fn category_list() -> String {
    Category::fixed()
        .iter()
        .map(|c| format!("- {}", c.label()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First line-collapsed characters of the notes, marked when cut
fn notes_excerpt(notes: &str) -> String {
    let collapsed = notes.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&collapsed, NOTES_EXCERPT_CHARS)
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("vaultsort").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::Configuration(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::Configuration("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Configuration(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];

    // Sections end at the next top-level header
    let end = after_header.find("\n# ").unwrap_or(after_header.len());

    Some(after_header[..end].trim())
}

/// Substitute `{{var}}` placeholders in one pass
///
/// Substituted values are never rescanned, so item text containing braces
/// cannot inject further placeholders.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
