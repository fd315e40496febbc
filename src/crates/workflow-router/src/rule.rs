//! Routing rules and the rule-matching order (§4.7): metadata filters, an
//! optional matcher function, regex patterns, then keywords, falling back to
//! metadata-only when only `metadata` was declared.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

/// How a rule matched a message, used for specificity and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Regex,
    Keyword,
    Function,
    MetadataOnly,
}

impl MatchType {
    pub fn base_specificity(self) -> u32 {
        match self {
            MatchType::Exact => 1000,
            MatchType::Regex => 800,
            MatchType::Keyword => 700,
            MatchType::Function => 600,
            MatchType::MetadataOnly => 500,
        }
    }

    pub fn raw_confidence(self) -> f64 {
        match self {
            MatchType::Exact => 1.0,
            MatchType::Regex => 0.8,
            MatchType::Keyword => 0.7,
            MatchType::Function => 0.8,
            MatchType::MetadataOnly => 0.6,
        }
    }
}

pub type Matcher = Arc<dyn Fn(&str, &HashMap<String, Value>) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RoutingRule {
    pub id: String,
    pub agent: String,
    pub priority: i32,
    pub patterns: Vec<Regex>,
    pub keywords: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub matcher: Option<Matcher>,
}

impl RoutingRule {
    pub fn new(id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            priority: 0,
            patterns: Vec::new(),
            keywords: Vec::new(),
            metadata: HashMap::new(),
            matcher: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Attempt to match `message`/`meta` against this rule, per the
    /// documented evaluation order. Returns the match type and the matched
    /// pattern length (used in the specificity formula) when it matches.
    pub fn try_match(&self, message: &str, meta: &HashMap<String, Value>) -> Option<(MatchType, usize)> {
        if !self.metadata.is_empty() {
            let all_match = self.metadata.iter().all(|(key, value)| meta.get(key) == Some(value));
            if !all_match {
                return None;
            }
        }

        if let Some(matcher) = &self.matcher {
            if matcher(message, meta) {
                return Some((MatchType::Function, 0));
            }
            if self.patterns.is_empty() && self.keywords.is_empty() {
                return None;
            }
        }

        for pattern in &self.patterns {
            if pattern.is_match(&message.to_lowercase()) || pattern.is_match(message) {
                let anchored = pattern.as_str().starts_with('^') && pattern.as_str().ends_with('$');
                let match_type = if anchored { MatchType::Exact } else { MatchType::Regex };
                return Some((match_type, pattern.as_str().len()));
            }
        }

        if !self.keywords.is_empty() {
            let lower = message.to_lowercase();
            for keyword in &self.keywords {
                if word_boundary_contains(&lower, &keyword.to_lowercase()) {
                    return Some((MatchType::Keyword, keyword.len()));
                }
            }
        }

        if self.patterns.is_empty() && self.keywords.is_empty() && self.matcher.is_none() && !self.metadata.is_empty() {
            return Some((MatchType::MetadataOnly, 0));
        }

        None
    }

    pub fn specificity(&self, match_type: MatchType, matched_len: usize) -> i64 {
        match_type.base_specificity() as i64
            + matched_len as i64
            + 100 * self.metadata.len() as i64
            + self.priority as i64
    }
}

fn word_boundary_contains(haystack: &str, needle: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|word| word == needle)
}
