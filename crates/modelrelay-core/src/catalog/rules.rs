//! Tier classification rule table
//!
//! Rules are evaluated in order against `<provider>/<model>` and the first match
//! wins. Unmatched models fall into [`Tier::Low`]. An explicit tier hint from the
//! upstream listing takes precedence over the table.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::Tier;
use crate::error::{Error, Result};

/// Built-in rules, most specific first
const DEFAULT_RULES: &[(&str, Tier)] = &[
    (r"embed", Tier::Embedding),
    (r"^openai/o\d", Tier::Custom),
    (r"^deepseek/deepseek-r1", Tier::Custom),
    (r"^xai/grok", Tier::Custom),
    (r"^openai/gpt-(4o|4\.1|5)$", Tier::High),
    (r"^meta/.*-(70b|405b)", Tier::High),
    (r"^mistral-ai/mistral-(large|medium)", Tier::High),
    (r"^deepseek/deepseek-v3", Tier::High),
    (r"^cohere/cohere-command-(r-plus|a)", Tier::High),
    (r"^ai21-labs/.*-large", Tier::High),
];

/// Serializable form of a rule, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRuleConfig {
    /// Regular expression matched against `<provider>/<model>`, case-insensitive
    pub pattern: String,
    /// Tier assigned on match
    pub tier: Tier,
}

/// One compiled rule
#[derive(Debug, Clone)]
pub struct TierRule {
    pattern: Regex,
    tier: Tier,
}

impl TierRule {
    /// Compile a rule
    pub fn new(pattern: &str, tier: Tier) -> Result<Self> {
        let pattern = Regex::new(&format!("(?i){}", pattern))
            .map_err(|e| Error::ConfigError(format!("Invalid tier rule '{}': {}", pattern, e)))?;
        Ok(Self { pattern, tier })
    }

    /// Tier assigned by this rule
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Whether the rule matches a subject string
    pub fn matches(&self, subject: &str) -> bool {
        self.pattern.is_match(subject)
    }
}

/// Ordered pattern → tier table
#[derive(Debug, Clone)]
pub struct TierRules {
    rules: Vec<TierRule>,
}

impl Default for TierRules {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TierRules {
    /// An empty table (everything classifies as Low unless hinted)
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in table
    pub fn with_defaults() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(pattern, tier)| TierRule::new(pattern, *tier).ok())
            .collect();
        Self { rules }
    }

    /// Built-in table preceded by configured rules
    pub fn from_config(extra: &[TierRuleConfig]) -> Result<Self> {
        let mut rules = extra
            .iter()
            .map(|rule| TierRule::new(&rule.pattern, rule.tier))
            .collect::<Result<Vec<_>>>()?;
        rules.extend(Self::with_defaults().rules);
        Ok(Self { rules })
    }

    /// Append a rule at the lowest precedence
    pub fn push(&mut self, rule: TierRule) {
        self.rules.push(rule);
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify one model
    pub fn classify(&self, provider: &str, model_id: &str, hint: Option<&str>) -> Tier {
        if let Some(tier) = hint.and_then(|h| h.parse::<Tier>().ok()) {
            return tier;
        }

        let subject = if model_id.contains('/') || provider.is_empty() {
            model_id.to_string()
        } else {
            format!("{}/{}", provider, model_id)
        };

        self.rules
            .iter()
            .find(|rule| rule.matches(&subject))
            .map(TierRule::tier)
            .unwrap_or(Tier::Low)
    }
}
