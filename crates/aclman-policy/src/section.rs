// section.rs - Policy file parsing.
//
// A policy file is a list of sections:
//
//   [/bin/*]
//   OWNER=root
//   GROUP=root
//   ACL=u::rwX-,g::r-XD,o::r-X-,d:u::rwx,d:g::r-x,d:o::r-x
//   FINAL=true
//
// Structural problems (bad header, unknown key, stray line) reject the whole
// file. A bad ACL value only poisons its own section: the section still takes
// part in matching and reports the error for any object it wins.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ace::{parse_acl, AclSpec};
use crate::error::{ConfigLocation, PolicyError};
use crate::pattern::Pattern;

/// One configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Header text between the brackets, as written.
    pub header: String,
    pub pattern: Pattern,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub acl: Option<Result<AclSpec, PolicyError>>,
    /// Used instead of `acl` for directories when present.
    pub dir_acl: Option<Result<AclSpec, PolicyError>>,
    pub is_final: bool,
    /// Leave matched objects untouched.
    pub ignore: bool,
    /// The policy file that declares this rule.
    pub source: PathBuf,
    /// Line of the section header.
    pub line: usize,
}

impl Rule {
    fn new(header: String, pattern: Pattern, source: PathBuf, line: usize) -> Self {
        Self {
            header,
            pattern,
            owner: None,
            group: None,
            acl: None,
            dir_acl: None,
            is_final: false,
            ignore: false,
            source,
            line,
        }
    }

    pub fn reference(&self) -> RuleRef {
        RuleRef {
            source: self.source.clone(),
            section: self.header.clone(),
            line: self.line,
        }
    }
}

/// Serializable pointer to a rule, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub source: PathBuf,
    pub section: String,
    pub line: usize,
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}]", self.source.display(), self.line, self.section)
    }
}

/// A parsed policy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Path of the policy file itself.
    pub source: PathBuf,
    /// Directory the patterns are relative to.
    pub base: PathBuf,
    pub rules: Vec<Rule>,
}

impl ConfigFile {
    /// Parse the text of the policy file at `source`.
    pub fn parse(source: &Path, text: &str) -> Result<Self, PolicyError> {
        let base = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let mut rules: Vec<Rule> = Vec::new();
        let mut seen_patterns = HashSet::new();
        let mut seen_keys: HashSet<String> = HashSet::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            let location = || ConfigLocation {
                file: source.to_path_buf(),
                line,
                section: rules.last().map(|r| r.header.clone()),
            };
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if let Some(inner) = trimmed.strip_prefix('[') {
                let Some(header) = inner.strip_suffix(']') else {
                    return Err(PolicyError::grammar("unterminated section header").at(location()));
                };
                let header = header.trim().to_string();
                let pattern = Pattern::parse(&header).map_err(|e| {
                    e.at(ConfigLocation {
                        file: source.to_path_buf(),
                        line,
                        section: Some(header.clone()),
                    })
                })?;
                if !seen_patterns.insert(pattern.clone()) {
                    return Err(PolicyError::grammar(format!(
                        "duplicate section [{}]",
                        header
                    ))
                    .at(location()));
                }
                seen_keys.clear();
                rules.push(Rule::new(header, pattern, source.to_path_buf(), line));
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(PolicyError::grammar(format!(
                    "expected KEY=VALUE or [pattern], found '{}'",
                    trimmed
                ))
                .at(location()));
            };
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            let here = location();
            let Some(rule) = rules.last_mut() else {
                return Err(
                    PolicyError::grammar(format!("'{}' appears before any section", key)).at(here),
                );
            };
            if !seen_keys.insert(key.clone()) {
                return Err(PolicyError::grammar(format!("duplicate key '{}'", key)).at(here));
            }

            match key.as_str() {
                "OWNER" => rule.owner = non_empty(value, &key).map_err(|e| e.at(here.clone()))?,
                "GROUP" => rule.group = non_empty(value, &key).map_err(|e| e.at(here.clone()))?,
                "ACL" => rule.acl = Some(parse_acl(value).map_err(|e| e.at(here.clone()))),
                "DIRACL" => rule.dir_acl = Some(parse_acl(value).map_err(|e| e.at(here.clone()))),
                "FINAL" => rule.is_final = parse_bool(value, &key).map_err(|e| e.at(here.clone()))?,
                "IGNORE" => rule.ignore = parse_bool(value, &key).map_err(|e| e.at(here.clone()))?,
                other => {
                    return Err(PolicyError::grammar(format!("unknown key '{}'", other)).at(here))
                }
            }
        }

        Ok(Self {
            source: source.to_path_buf(),
            base,
            rules,
        })
    }

    /// Grammar errors carried by poisoned ACL values.
    pub fn acl_errors(&self) -> impl Iterator<Item = &PolicyError> {
        self.rules
            .iter()
            .flat_map(|rule| [rule.acl.as_ref(), rule.dir_acl.as_ref()])
            .flatten()
            .filter_map(|acl| acl.as_ref().err())
    }
}

fn non_empty(value: &str, key: &str) -> Result<Option<String>, PolicyError> {
    if value.is_empty() {
        return Err(PolicyError::grammar(format!("{} must not be empty", key)));
    }
    Ok(Some(value.to_string()))
}

fn parse_bool(value: &str, key: &str) -> Result<bool, PolicyError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        other => Err(PolicyError::grammar(format!(
            "invalid value for {} '{}', expected true/false/yes/no",
            key, other
        ))),
    }
}
