//! Mock backend for testing and dry runs
//!
//! Answers classification prompts offline with a keyword classifier, so a
//! full run works without a model server. Failures, delays and canned
//! replies can be injected for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::error::TransportError;
use crate::models::Category;
use crate::prompts::{extract_items, ItemContext};

use super::{AIBackend, TransportResult};

/// Keyword patterns checked in order; the first hit wins
const KEYWORD_RULES: &[(&str, Category)] = &[
    (r"openai|chatgpt|anthropic|claude\.ai|huggingface|midjourney|perplexity", Category::Ai),
    (r"github|gitlab|bitbucket|npmjs|docker|jetbrains|stackoverflow", Category::ToolsDevelopment),
    (r"jira|trello|asana|linear\.app|monday\.com|clickup", Category::ToolsProjectManagement),
    (r"slack|zoom\.us|discord|telegram|whatsapp|\bsignal\b", Category::ToolsCommunication),
    (r"mailchimp|hubspot|hootsuite|buffer\.com", Category::ToolsMarketing),
    (r"figma|canva|adobe|dribbble|sketch", Category::ToolsDesign),
    (r"analytics|mixpanel|amplitude|datadog|grafana", Category::ToolsAnalytics),
    (r"dropbox|icloud|drive\.google|onedrive|box\.com|mega\.nz", Category::CloudStorage),
    (r"\baws\b|azure|cloud\.google|digitalocean|linode|hetzner", Category::CloudComputing),
    (r"vercel|netlify|heroku|cloudflare|godaddy|namecheap", Category::CloudHosting),
    (r"1password|bitwarden|lastpass|authy|nordvpn|mullvad|vpn", Category::Security),
    (r"coinbase|binance|kraken|metamask|ledger|crypto", Category::FinancialCryptocurrency),
    (r"fidelity|vanguard|schwab|robinhood|etrade|brokerage", Category::FinancialInvestments),
    (r"bank|chase|wellsfargo|paypal|venmo|credit ?union", Category::FinancialBanking),
    (r"gmail|outlook|proton\.me|protonmail|yahoo|fastmail|webmail", Category::Email),
    (r"facebook|instagram|twitter|\bx\.com|linkedin|tiktok|mastodon", Category::Social),
    (r"reddit|forum|discourse|hacker ?news", Category::Forum),
    (r"netflix|spotify|hulu|disney|youtube|twitch|hbo", Category::Entertainment),
    (r"steam|epicgames|xbox|playstation|nintendo|battle\.net|riotgames", Category::Gaming),
    (r"amazon|ebay|etsy|walmart|aliexpress|shop", Category::Shopping),
    (r"airbnb|booking\.com|expedia|airline|marriott|hilton|hotel", Category::Travel),
    (r"\.gov\b|\birs\b|\bdmv\b|\bcourts?\b", Category::GovernmentLegal),
    (r"\.edu\b|coursera|udemy|khanacademy|duolingo", Category::Education),
    (r"health|clinic|pharmacy|hospital|medical|dental", Category::Healthcare),
    (r"electric|energy|comcast|xfinity|verizon|utility", Category::Utilities),
    (r"notion|evernote|todoist|microsoft|office", Category::ToolsProductivity),
    (r"localhost|192\.168\.|proxmox|synology|truenas|unraid|homeassistant", Category::PersonalHomelab),
];

fn keyword_rules() -> &'static [(Regex, Category)] {
    static RULES: OnceLock<Vec<(Regex, Category)>> = OnceLock::new();
    RULES.get_or_init(|| {
        KEYWORD_RULES
            .iter()
            .filter_map(|(pattern, category)| {
                Regex::new(&format!("(?i){}", pattern))
                    .ok()
                    .map(|re| (re, category.clone()))
            })
            .collect()
    })
}

/// Keyword guess for one item: (category, confidence, reason)
pub fn classify_item(item: &ItemContext) -> (Category, u8, &'static str) {
    let haystack = format!("{} {} {}", item.name, item.domain, item.url);
    keyword_rules()
        .iter()
        .find(|(re, _)| re.is_match(&haystack))
        .map(|(_, category)| (category.clone(), 80, "Keyword match"))
        .unwrap_or((Category::Uncategorized, 0, "No keyword match"))
}

/// Chat reply the keyword classifier gives for a rendered prompt
///
/// Returns None when the prompt carries no item list.
pub fn reply_for_prompt(prompt: &str) -> Option<String> {
    let items = extract_items(prompt)?;
    let entries: Vec<_> = items
        .iter()
        .map(|item| {
            let (category, confidence, reason) = classify_item(item);
            json!({
                "id": item.id,
                "category": category.label(),
                "confidence": confidence,
                "reason": reason,
            })
        })
        .collect();
    Some(serde_json::Value::Array(entries).to_string())
}

/// Mock AI backend
///
/// Clones share call history, in-flight counters and the failure budget.
#[derive(Clone)]
pub struct MockBackend {
    model: String,
    /// Whether health_check should return true
    pub healthy: bool,
    failures_remaining: Arc<AtomicUsize>,
    failure: TransportError,
    reply: Option<String>,
    delay: Option<Duration>,
    item_delays: HashMap<String, Duration>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Counts a call as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            model: "mock".to_string(),
            healthy: true,
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            failure: TransportError::Status {
                status: 500,
                body: "mock failure".to_string(),
            },
            reply: None,
            delay: None,
            item_delays: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Fail the next `count` calls with `error`
    pub fn failing(count: usize, error: TransportError) -> Self {
        Self {
            failures_remaining: Arc::new(AtomicUsize::new(count)),
            failure: error,
            ..Self::new()
        }
    }

    /// Fail every call with `error`
    pub fn always_failing(error: TransportError) -> Self {
        Self::failing(usize::MAX, error)
    }

    /// Answer every call with `reply` instead of classifying
    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before answering calls whose batch contains `item_id`
    pub fn with_item_delay(mut self, item_id: &str, delay: Duration) -> Self {
        self.item_delays.insert(item_id.to_string(), delay);
        self
    }

    /// Create a new instance with a different model name
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Prompts received so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Most calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn delay_for(&self, prompt: &str) -> Option<Duration> {
        let item_delay = extract_items(prompt).and_then(|items| {
            items
                .iter()
                .filter_map(|item| self.item_delays.get(&item.id).copied())
                .max()
        });
        item_delay.or(self.delay)
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> TransportResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay_for(prompt) {
            tokio::time::sleep(delay).await;
        }

        if self.take_failure() {
            return Err(self.failure.clone());
        }

        if let Some(ref reply) = self.reply {
            return Ok(reply.clone());
        }

        Ok(reply_for_prompt(prompt)
            .unwrap_or_else(|| "I could not find any items to classify.".to_string()))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, domain: &str) -> ItemContext {
        ItemContext {
            id: id.to_string(),
            name: name.to_string(),
            url: String::new(),
            username: String::new(),
            domain: domain.to_string(),
            item_type: "login".to_string(),
            folder: String::new(),
            notes: String::new(),
        }
    }

    fn prompt_for(items: &[ItemContext]) -> String {
        format!(
            "Classify:\n```json\n{}\n```\n",
            serde_json::to_string_pretty(items).unwrap()
        )
    }

    #[test]
    fn test_keyword_rules_all_compile() {
        assert_eq!(keyword_rules().len(), KEYWORD_RULES.len());
    }

    #[test]
    fn test_classify_item_keywords() {
        assert_eq!(classify_item(&item("1", "GitHub", "github.com")).0, Category::ToolsDevelopment);
        assert_eq!(classify_item(&item("2", "Chase", "chase.com")).0, Category::FinancialBanking);
        assert_eq!(classify_item(&item("3", "Mailchimp", "mailchimp.com")).0, Category::ToolsMarketing);
        assert_eq!(classify_item(&item("4", "NAS", "192.168.1.2")).0, Category::PersonalHomelab);

        let (category, confidence, _) = classify_item(&item("5", "Zzyzx", "zzyzx.example"));
        assert_eq!(category, Category::Uncategorized);
        assert_eq!(confidence, 0);
    }

    #[tokio::test]
    async fn test_complete_answers_every_item() {
        let backend = MockBackend::new();
        let prompt = prompt_for(&[item("a", "Netflix", "netflix.com"), item("b", "Steam", "")]);
        let reply = backend.complete(&prompt).await.unwrap();

        let parsed: Vec<serde_json::Value> = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["id"], "a");
        assert_eq!(parsed[0]["category"], "Entertainment");
        assert_eq!(parsed[1]["category"], "Gaming");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_then_recovering() {
        let backend = MockBackend::failing(2, TransportError::Timeout);
        let prompt = prompt_for(&[item("a", "GitHub", "github.com")]);

        assert_eq!(backend.complete(&prompt).await, Err(TransportError::Timeout));
        assert_eq!(backend.complete(&prompt).await, Err(TransportError::Timeout));
        assert!(backend.complete(&prompt).await.is_ok());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_canned_reply() {
        let backend = MockBackend::new().with_reply("not json at all");
        assert_eq!(backend.complete("anything").await.unwrap(), "not json at all");
    }

    #[tokio::test]
    async fn test_clones_share_history() {
        let backend = MockBackend::new();
        let clone = backend.with_model("other");
        clone.complete("hello").await.unwrap();
        assert_eq!(backend.calls(), vec!["hello".to_string()]);
        assert_eq!(clone.model(), "other");
        assert_eq!(backend.model(), "mock");
    }

    #[tokio::test]
    async fn test_peak_in_flight() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(50));
        backend.complete("one").await.unwrap();
        assert_eq!(backend.peak_in_flight(), 1);

        let (a, b) = tokio::join!(backend.complete("two"), backend.complete("three"));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(backend.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_health() {
        assert!(MockBackend::new().health_check().await);
        assert!(!MockBackend::unhealthy().health_check().await);
    }
}
