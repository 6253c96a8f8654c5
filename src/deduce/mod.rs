//! Rule-chaining deduction.
//!
//! Each rule's premise is a case-insensitive regex tested against the lowered
//! input plus every conclusion fired so far in the same call. Premises may use
//! lookaround and backreferences. Rules are visited
//! once, in table order: a rule can fire on conclusions of earlier rules, never
//! on those of later ones. Output is sorted by strength, descending.

use std::path::Path;

use fancy_regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::RuleError;
use crate::models::{FiredRule, InferenceRule};

pub const DEFAULT_MAX_RULES: usize = 18;
pub const DEFAULT_YEAR: &str = "2025";
pub const NO_DEDUCTIONS: &str = "No relevant deductions triggered.";
pub const CHAIN_CLOSING: &str = "The prophecy is therefore unavoidable.";

/// A rule with its premise compiled once at load time.
/// `pattern` is `None` when the premise failed to compile; such a rule never fires.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: InferenceRule,
    pattern: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: InferenceRule) -> Self {
        let pattern = match RegexBuilder::new(&rule.premise).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(rule = %rule.id, "Skipping rule with malformed premise: {e}");
                None
            }
        };
        Self { rule, pattern }
    }

    pub fn is_inert(&self) -> bool {
        self.pattern.is_none()
    }

    fn matches(&self, text: &str) -> bool {
        let Some(re) = &self.pattern else {
            return false;
        };
        // Backtracking can hit its limit on pathological premises; count that as no match.
        re.is_match(text).unwrap_or_else(|e| {
            tracing::warn!(rule = %self.rule.id, "Premise match aborted: {e}");
            false
        })
    }
}

/// The immutable rule table, in load order.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<CompiledRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<InferenceRule>) -> Self {
        let rules: Vec<CompiledRule> = rules.into_iter().map(CompiledRule::compile).collect();
        let inert = rules.iter().filter(|r| r.is_inert()).count();
        tracing::info!("Loaded {} inference rules ({inert} inert)", rules.len());
        Self { rules }
    }

    /// Parse a rule table from JSON text. Entries that are not valid rules are skipped.
    pub fn from_json(data: &str) -> Result<Self, RuleError> {
        let entries: Vec<Value> = serde_json::from_str(data)?;
        let rules = entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| match serde_json::from_value::<InferenceRule>(entry) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!("Skipping rule entry {i}: {e}");
                    None
                }
            })
            .collect();
        Ok(Self::new(rules))
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let data = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }
}

/// Run one forward-chaining pass over `table` and return at most `max_rules`
/// fired rules, strongest first. Equal strengths keep table order.
pub fn deduce(table: &RuleTable, phenomenon: &str, max_rules: usize) -> Vec<FiredRule> {
    let text = phenomenon.to_lowercase();
    let mut conclusions = String::new();
    let mut fired: Vec<FiredRule> = Vec::new();

    for compiled in &table.rules {
        let search_space = format!("{text} {conclusions}");
        if compiled.matches(&search_space) {
            fired.push(compiled.rule.clone());
            conclusions.push(' ');
            conclusions.push_str(&compiled.rule.conclusion.to_lowercase());
        }
    }

    tracing::debug!("Deduction fired {} of {} rules", fired.len(), table.len());

    fired.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fired.truncate(max_rules);
    fired
}

/// Render fired rules as prose, one proposition per paragraph.
pub fn format_chain(fired: &[FiredRule]) -> String {
    if fired.is_empty() {
        return NO_DEDUCTIONS.to_string();
    }

    let lines: Vec<String> = fired
        .iter()
        .map(|rule| {
            format!(
                "Consider the proposition that {} ({})",
                rule.conclusion,
                year_label(rule)
            )
        })
        .collect();

    format!("{}\n\n{CHAIN_CLOSING}", lines.join("\n\n"))
}

pub fn deduce_and_format(table: &RuleTable, phenomenon: &str, max_rules: usize) -> String {
    format_chain(&deduce(table, phenomenon, max_rules))
}

/// The rule's year as display text; absent or null years read as 2025.
pub fn year_label(rule: &InferenceRule) -> String {
    match &rule.year {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => DEFAULT_YEAR.to_string(),
        Some(other) => other.to_string(),
    }
}
