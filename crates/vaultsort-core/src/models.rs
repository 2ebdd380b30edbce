//! Domain models for vaultsort

use serde::{Deserialize, Serialize};

/// Semantic category assigned to a vault item
///
/// The model path may only produce the fixed members or `Uncategorized`.
/// `Folder` carries a label taken verbatim from the domain-folder map and is
/// only produced by the deterministic matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    FinancialBanking,
    FinancialInvestments,
    FinancialCryptocurrency,
    Social,
    Email,
    ToolsDevelopment,
    ToolsProductivity,
    ToolsDesign,
    ToolsAnalytics,
    ToolsProjectManagement,
    ToolsCommunication,
    ToolsMarketing,
    Shopping,
    Entertainment,
    GovernmentLegal,
    Utilities,
    Education,
    Healthcare,
    Gaming,
    Travel,
    Forum,
    CloudStorage,
    CloudComputing,
    CloudHosting,
    Security,
    Ai,
    PersonalHomelab,
    /// Fallback when the model gives no usable answer
    Uncategorized,
    /// Folder label from the domain-folder map
    Folder(String),
}

static FIXED_CATEGORIES: [Category; 27] = [
    Category::FinancialBanking,
    Category::FinancialInvestments,
    Category::FinancialCryptocurrency,
    Category::Social,
    Category::Email,
    Category::ToolsDevelopment,
    Category::ToolsProductivity,
    Category::ToolsDesign,
    Category::ToolsAnalytics,
    Category::ToolsProjectManagement,
    Category::ToolsCommunication,
    Category::ToolsMarketing,
    Category::Shopping,
    Category::Entertainment,
    Category::GovernmentLegal,
    Category::Utilities,
    Category::Education,
    Category::Healthcare,
    Category::Gaming,
    Category::Travel,
    Category::Forum,
    Category::CloudStorage,
    Category::CloudComputing,
    Category::CloudHosting,
    Category::Security,
    Category::Ai,
    Category::PersonalHomelab,
];

impl Category {
    /// The fixed category set offered to the model (excludes `Uncategorized`)
    pub fn fixed() -> &'static [Category] {
        &FIXED_CATEGORIES
    }

    /// Display label, using '/' to separate subcategories
    pub fn label(&self) -> &str {
        match self {
            Self::FinancialBanking => "Financial/Banking",
            Self::FinancialInvestments => "Financial/Investments",
            Self::FinancialCryptocurrency => "Financial/Cryptocurrency",
            Self::Social => "Social",
            Self::Email => "Email",
            Self::ToolsDevelopment => "Tools/Development",
            Self::ToolsProductivity => "Tools/Productivity",
            Self::ToolsDesign => "Tools/Design",
            Self::ToolsAnalytics => "Tools/Analytics",
            Self::ToolsProjectManagement => "Tools/Project Management",
            Self::ToolsCommunication => "Tools/Communication",
            Self::ToolsMarketing => "Tools/Marketing",
            Self::Shopping => "Shopping",
            Self::Entertainment => "Entertainment",
            Self::GovernmentLegal => "Government/Legal",
            Self::Utilities => "Utilities",
            Self::Education => "Education",
            Self::Healthcare => "Healthcare",
            Self::Gaming => "Gaming",
            Self::Travel => "Travel",
            Self::Forum => "Forum",
            Self::CloudStorage => "Cloud/Storage",
            Self::CloudComputing => "Cloud/Computing",
            Self::CloudHosting => "Cloud/Hosting",
            Self::Security => "Security",
            Self::Ai => "AI",
            Self::PersonalHomelab => "Personal/Homelab",
            Self::Uncategorized => "Uncategorized",
            Self::Folder(name) => name,
        }
    }

    /// Resolve a model-supplied label against the fixed set
    ///
    /// Matching ignores case and whitespace around '/'. Returns None for
    /// anything outside the fixed set; `Folder` is never produced here.
    pub fn from_label(label: &str) -> Option<Category> {
        let wanted = canonical_label(label);
        if wanted.is_empty() {
            return None;
        }
        if wanted == "uncategorized" {
            return Some(Category::Uncategorized);
        }
        FIXED_CATEGORIES
            .iter()
            .find(|c| canonical_label(c.label()) == wanted)
            .cloned()
    }

    pub fn is_uncategorized(&self) -> bool {
        matches!(self, Self::Uncategorized)
    }
}

fn canonical_label(label: &str) -> String {
    label
        .split('/')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("/")
        .to_lowercase()
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Vault item type, from the export's numeric `type` code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Login,
    SecureNote,
    Card,
    Identity,
    SshKey,
    Other(i64),
}

impl ItemType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Login,
            2 => Self::SecureNote,
            3 => Self::Card,
            4 => Self::Identity,
            5 => Self::SshKey,
            other => Self::Other(other),
        }
    }

    /// Stable string form, matching the Bitwarden CSV import format
    pub fn as_str(&self) -> std::borrow::Cow<'static, str> {
        match self {
            Self::Login => "login".into(),
            Self::SecureNote => "note".into(),
            Self::Card => "card".into(),
            Self::Identity => "identity".into(),
            Self::SshKey => "sshkey".into(),
            Self::Other(code) => code.to_string().into(),
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A custom field attached to a vault item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

/// A normalized vault item
///
/// Built once from the export and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub item_type: ItemType,
    /// Resolved folder name (empty when the item has no known folder)
    pub folder_name: String,
    pub username: String,
    /// Lower-cased host of the first web URI, else the username's email domain
    pub domain: String,
    pub notes: String,
    pub fields: Vec<CustomField>,
    pub favorite: bool,
    pub reprompt: i64,
    pub login_uris: Vec<String>,
    pub password: String,
    pub totp: String,
}

/// One entry of the domain-folder map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFolderRule {
    pub domain: String,
    pub folder: String,
}

/// Which path produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// Static rule lookup, no model call
    Deterministic,
    /// Model reply, or a fallback standing in for one
    Model,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The category decision for one vault item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub item_id: String,
    pub category: Category,
    /// 0-100
    pub confidence: u8,
    pub reason: String,
    pub source: ClassificationSource,
}

impl Classification {
    /// A rule-based match, always at full confidence
    pub fn deterministic(item_id: &str, category: Category, reason: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            category,
            confidence: 100,
            reason: reason.to_string(),
            source: ClassificationSource::Deterministic,
        }
    }

    /// Degraded result used when the model path produced nothing usable
    pub fn fallback(item_id: &str, reason: impl Into<String>) -> Self {
        Self {
            item_id: item_id.to_string(),
            category: Category::Uncategorized,
            confidence: 0,
            reason: reason.into(),
            source: ClassificationSource::Model,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ClassificationSource::Model
            && self.category.is_uncategorized()
            && self.confidence == 0
    }
}
