//! Device classification from advertised services.
//!
//! A [`RuleSet`] holds three ordered rule lists, each tested against a different
//! field of a [`ServiceRecord`]:
//!
//! | kind      | field                 |
//! |-----------|-----------------------|
//! | record    | `full_record_string`  |
//! | attribute | `attribute_string`    |
//! | hostname  | `hostname`            |
//!
//! For one record the first matching rule wins, trying record rules, then
//! attribute rules, then hostname rules, each list in declared order. Across a
//! host's records the category is overwritten by every record that matches
//! anything, so the last matching record decides. A record that matches nothing
//! leaves the category alone.

use crate::scanner::{DiscoveryError, ServiceRecord, UNKNOWN_DEVICE_TYPE};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which record field a rule is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Record,
    Attribute,
    Hostname,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Record => write!(f, "record"),
            RuleKind::Attribute => write!(f, "attribute"),
            RuleKind::Hostname => write!(f, "hostname"),
        }
    }
}

/// Uncompiled rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub pattern: String,
    pub category: String,
}

impl RuleDef {
    pub fn new(pattern: &str, category: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            category: category.to_string(),
        }
    }
}

/// `[rules]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Start from the built-in rules; operator rules are appended after them
    pub include_defaults: bool,
    pub record: Vec<RuleDef>,
    pub attribute: Vec<RuleDef>,
    pub hostname: Vec<RuleDef>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            record: Vec::new(),
            attribute: Vec::new(),
            hostname: Vec::new(),
        }
    }
}

fn builtin_defs(kind: RuleKind) -> Vec<RuleDef> {
    match kind {
        RuleKind::Record => vec![
            RuleDef::new(r"_amzn-alexa._tcp", "Alexa"),
            RuleDef::new(r"Amazon Fire TV", "Fire TV"),
        ],
        RuleKind::Attribute => vec![
            RuleDef::new(r#""md=Google Nest Hub""#, "Nest Hub"),
            RuleDef::new(r#""md=BSB002""#, "Hue Hub"),
            RuleDef::new(r"=AppleTV", "TV"),
        ],
        RuleKind::Hostname => vec![RuleDef::new(r"-MacBook-", "MacBook")],
    }
}

/// A compiled pattern and the category it assigns.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    category: String,
}

impl Rule {
    pub fn new(pattern: &str, category: &str) -> Result<Self, DiscoveryError> {
        let pattern = Regex::new(pattern).map_err(|e| DiscoveryError::InvalidRule {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern,
            category: category.to_string(),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn matches(&self, field: Option<&str>) -> bool {
        field.is_some_and(|f| self.pattern.is_match(f))
    }
}

/// Ordered classification rules for all three record fields.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    record: Vec<Rule>,
    attribute: Vec<Rule>,
    hostname: Vec<Rule>,
}

impl RuleSet {
    /// The built-in rules only.
    pub fn builtin() -> Self {
        let compile = |kind: RuleKind| -> Vec<Rule> {
            builtin_defs(kind)
                .iter()
                .filter_map(|def| Rule::new(&def.pattern, &def.category).ok())
                .collect()
        };
        Self {
            record: compile(RuleKind::Record),
            attribute: compile(RuleKind::Attribute),
            hostname: compile(RuleKind::Hostname),
        }
    }

    /// Compile a configured rule set. Fails on the first invalid pattern.
    pub fn from_config(config: &RulesConfig) -> Result<Self, DiscoveryError> {
        let compile = |kind: RuleKind, extra: &[RuleDef]| -> Result<Vec<Rule>, DiscoveryError> {
            let defaults = if config.include_defaults {
                builtin_defs(kind)
            } else {
                Vec::new()
            };
            defaults
                .iter()
                .chain(extra)
                .map(|def| Rule::new(&def.pattern, &def.category))
                .collect()
        };

        let rules = Self {
            record: compile(RuleKind::Record, &config.record)?,
            attribute: compile(RuleKind::Attribute, &config.attribute)?,
            hostname: compile(RuleKind::Hostname, &config.hostname)?,
        };
        tracing::debug!(
            "Classification rules: {} record, {} attribute, {} hostname",
            rules.record.len(),
            rules.attribute.len(),
            rules.hostname.len()
        );
        Ok(rules)
    }

    pub fn rules(&self, kind: RuleKind) -> &[Rule] {
        match kind {
            RuleKind::Record => &self.record,
            RuleKind::Attribute => &self.attribute,
            RuleKind::Hostname => &self.hostname,
        }
    }

    /// Category for a single record, if any rule matches it.
    pub fn match_record(&self, record: &ServiceRecord) -> Option<&str> {
        fn first<'r>(rules: &'r [Rule], field: Option<&str>) -> Option<&'r str> {
            rules.iter().find(|r| r.matches(field)).map(Rule::category)
        }

        first(&self.record, record.full_record_string.as_deref())
            .or_else(|| first(&self.attribute, record.attribute_string.as_deref()))
            .or_else(|| first(&self.hostname, record.hostname.as_deref()))
    }
}

/// Category for a host given its records in discovery order.
///
/// Starts at `"Unknown"`; each record that matches a rule overwrites the
/// category, records that match nothing leave it unchanged.
pub fn classify<'a, I>(rules: &RuleSet, records: I) -> String
where
    I: IntoIterator<Item = &'a ServiceRecord>,
{
    let mut category = UNKNOWN_DEVICE_TYPE;
    for record in records {
        if let Some(matched) = rules.match_record(record) {
            category = matched;
        }
    }
    category.to_string()
}
