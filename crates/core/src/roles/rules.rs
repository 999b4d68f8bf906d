//! Ordered designation rule table.
//!
//! Designations are free text, so matching is phrase based over a normalised
//! token string: lowercase, every non-alphanumeric run collapsed to a single
//! space. Phrases only match on whole-token boundaries, so `sh` never matches
//! inside `shah`. Rules are evaluated in order and the first match wins.
//!
//! The table is data: [`RuleSet::builtin`] ships the default, and a TOML file of
//! the same shape can replace it without touching the matcher.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roles::Role;

pub const BUILTIN_RULESET_VERSION: &str = "2026.10";

/// Designation reduced to space-separated lowercase tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedDesignation {
    normalized: String,
    padded: String,
}

impl NormalizedDesignation {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize_phrase(raw);
        let padded = format!(" {normalized} ");
        Self { normalized, padded }
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn equals(&self, phrase: &str) -> bool {
        let phrase = normalize_phrase(phrase);
        !phrase.is_empty() && self.normalized == phrase
    }

    pub fn has_phrase(&self, phrase: &str) -> bool {
        let phrase = normalize_phrase(phrase);
        !phrase.is_empty() && self.padded.contains(&format!(" {phrase} "))
    }

    pub fn starts_with_phrase(&self, phrase: &str) -> bool {
        let phrase = normalize_phrase(phrase);
        !phrase.is_empty() && self.padded.starts_with(&format!(" {phrase} "))
    }
}

pub(crate) fn normalize_phrase(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One `(predicate → role)` row.
///
/// A rule matches when none of `none_of` is present and at least one of the
/// following holds: the whole designation equals an `exact` entry, it contains
/// a `phrases` entry, it starts with a `prefixes` entry, or every `all_of`
/// group has at least one phrase present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignationRule {
    pub role: Role,
    #[serde(default)]
    pub exact: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub all_of: Vec<Vec<String>>,
    #[serde(default)]
    pub none_of: Vec<String>,
}

impl DesignationRule {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            exact: Vec::new(),
            phrases: Vec::new(),
            prefixes: Vec::new(),
            all_of: Vec::new(),
            none_of: Vec::new(),
        }
    }

    pub fn exact(mut self, values: &[&str]) -> Self {
        self.exact.extend(values.iter().map(ToString::to_string));
        self
    }

    pub fn phrases(mut self, values: &[&str]) -> Self {
        self.phrases.extend(values.iter().map(ToString::to_string));
        self
    }

    pub fn prefixes(mut self, values: &[&str]) -> Self {
        self.prefixes.extend(values.iter().map(ToString::to_string));
        self
    }

    pub fn require_one_of(mut self, values: &[&str]) -> Self {
        self.all_of.push(values.iter().map(ToString::to_string).collect());
        self
    }

    pub fn excluding(mut self, values: &[&str]) -> Self {
        self.none_of.extend(values.iter().map(ToString::to_string));
        self
    }

    pub fn matches(&self, designation: &NormalizedDesignation) -> bool {
        if designation.is_empty() {
            return false;
        }
        if self.none_of.iter().any(|phrase| designation.has_phrase(phrase)) {
            return false;
        }

        self.exact.iter().any(|value| designation.equals(value))
            || self.phrases.iter().any(|phrase| designation.has_phrase(phrase))
            || self.prefixes.iter().any(|prefix| designation.starts_with_phrase(prefix))
            || (!self.all_of.is_empty()
                && self
                    .all_of
                    .iter()
                    .all(|group| group.iter().any(|phrase| designation.has_phrase(phrase))))
    }

    fn has_patterns(&self) -> bool {
        fn non_blank(values: &[String]) -> bool {
            values.iter().any(|value| !value.trim().is_empty())
        }

        non_blank(&self.exact)
            || non_blank(&self.phrases)
            || non_blank(&self.prefixes)
            || (!self.all_of.is_empty() && self.all_of.iter().all(|group| non_blank(group)))
    }
}

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("could not read role rule file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse role rule file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("role rule set is invalid: {0}")]
    Invalid(String),
}

/// Versioned, ordered designation rule table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub rules: Vec<DesignationRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleSet {
    /// Default table.
    ///
    /// Ordering notes: national heads precede state and area heads; level/domain
    /// heads exclude the opposite domain so a designation naming both domains
    /// never resolves to a guessed one; central ops precedes admin; BCM precedes
    /// BM so "Branch Manager - Credit" resolves to BCM.
    pub fn builtin() -> Self {
        use Role::*;

        let rules = vec![
            DesignationRule::new(NationalBusinessHead)
                .exact(&["national business head", "nbh"])
                .phrases(&["national business head", "national head business"])
                .prefixes(&["nbh"]),
            DesignationRule::new(NationalCreditHead)
                .exact(&["national credit head", "nch"])
                .phrases(&["national credit head", "national head credit"])
                .prefixes(&["nch"]),
            DesignationRule::new(StateHeadBusiness)
                .phrases(&["state business head", "sbh"])
                .require_one_of(&["state head", "sh"])
                .require_one_of(&["business", "bh"])
                .excluding(&["credit", "ch"]),
            DesignationRule::new(StateHeadCredit)
                .phrases(&["state credit head", "sch"])
                .require_one_of(&["state head", "sh"])
                .require_one_of(&["credit", "ch"])
                .excluding(&["business", "bh"]),
            DesignationRule::new(AreaHeadBusiness)
                .phrases(&["area business head", "abh"])
                .require_one_of(&["area head", "ah"])
                .require_one_of(&["business", "bh"])
                .excluding(&["credit", "ch"]),
            DesignationRule::new(AreaHeadCredit)
                .phrases(&["area credit head", "ach"])
                .require_one_of(&["area head", "ah"])
                .require_one_of(&["credit", "ch"])
                .excluding(&["business", "bh"]),
            DesignationRule::new(CentralOps)
                .require_one_of(&["central"])
                .require_one_of(&["ops", "operations"]),
            DesignationRule::new(Admin).phrases(&["admin", "administrator"]),
            DesignationRule::new(Hr)
                .exact(&["hr"])
                .phrases(&["human resources", "hr manager", "hr executive", "hrbp"])
                .prefixes(&["hr"]),
            DesignationRule::new(Cso).exact(&["cso"]).phrases(&[
                "credit officer",
                "credit and service officer",
                "credit service officer",
                "cso",
            ]),
            DesignationRule::new(Bcm)
                .exact(&["bcm"])
                .phrases(&["branch credit manager", "bcm"])
                .require_one_of(&["branch manager"])
                .require_one_of(&["credit"]),
            DesignationRule::new(Bm).exact(&["bm"]).phrases(&["branch manager", "bm"]),
            DesignationRule::new(Rm)
                .exact(&["relationship manager", "rm"])
                .phrases(&["relationship manager"])
                .prefixes(&["rm"]),
        ];

        Self { version: BUILTIN_RULESET_VERSION.to_string(), rules }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RuleSetError> {
        let rule_set: RuleSet = toml::from_str(raw)?;
        rule_set.validate()?;
        Ok(rule_set)
    }

    pub fn load(path: &Path) -> Result<Self, RuleSetError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RuleSetError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), RuleSetError> {
        if self.version.trim().is_empty() {
            return Err(RuleSetError::Invalid("version must not be empty".to_string()));
        }
        if self.rules.is_empty() {
            return Err(RuleSetError::Invalid("at least one rule is required".to_string()));
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.role == Role::Unknown {
                return Err(RuleSetError::Invalid(format!(
                    "rule #{index} targets `unknown`; unmatched designations already resolve to it"
                )));
            }
            if !rule.has_patterns() {
                return Err(RuleSetError::Invalid(format!(
                    "rule #{index} for `{}` has no patterns",
                    rule.role
                )));
            }
        }

        Ok(())
    }

    /// First matching rule, with its position in the table.
    pub fn first_match(&self, designation: &NormalizedDesignation) -> Option<(usize, Role)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(designation))
            .map(|(index, rule)| (index, rule.role))
    }
}
