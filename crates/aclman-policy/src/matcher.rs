// matcher.rs - Picks the single most specific rule for an object.
//
// Scopes are examined shallowest first:
//
// 1. A broken policy file anywhere in the chain makes the object unresolvable.
// 2. Within one file the matching rule with the most literal segments wins;
//    two matches with the same literal count are an AmbiguousMatch.
// 3. A FINAL winner ends the search, deeper files are never consulted.
// 4. Otherwise the winner of the deepest file with any match is used.

use std::path::Path;
use std::sync::Arc;

use crate::error::PolicyError;
use crate::pattern::candidate_segments;
use crate::scope::{RuleChain, Scope};
use crate::section::{ConfigFile, Rule};
use crate::state::ObjectKind;

/// The winning rule together with the candidate segments it matched.
#[derive(Debug, Clone)]
pub struct Selection {
    pub file: Arc<ConfigFile>,
    pub index: usize,
    pub segments: Vec<String>,
}

impl Selection {
    pub fn rule(&self) -> &Rule {
        &self.file.rules[self.index]
    }
}

enum FileMatch {
    None,
    One(usize),
    Tie(usize, usize),
}

/// Best match within a single policy file.
fn best_in_file(file: &ConfigFile, segments: &[String]) -> FileMatch {
    let mut best: Option<(usize, usize)> = None;
    let mut tie: Option<usize> = None;
    for (index, rule) in file.rules.iter().enumerate() {
        if !rule.pattern.matches(segments) {
            continue;
        }
        let literals = rule.pattern.literal_count();
        match best {
            Some((_, top)) if literals < top => {}
            Some((_, top)) if literals == top => {
                tie.get_or_insert(index);
            }
            _ => {
                best = Some((index, literals));
                tie = None;
            }
        }
    }
    match (best, tie) {
        (None, _) => FileMatch::None,
        (Some((index, _)), None) => FileMatch::One(index),
        (Some((index, _)), Some(other)) => FileMatch::Tie(index, other),
    }
}

fn ambiguous(path: &Path, file: &ConfigFile, first: usize, second: usize) -> PolicyError {
    PolicyError::AmbiguousMatch {
        path: path.to_path_buf(),
        source_file: file.source.clone(),
        first: file.rules[first].header.clone(),
        second: file.rules[second].header.clone(),
    }
}

/// Select the rule that governs `path`, if any.
pub fn select_rule(
    chain: &RuleChain,
    path: &Path,
    kind: ObjectKind,
) -> Result<Option<Selection>, PolicyError> {
    let mut deepest: Option<(Arc<ConfigFile>, FileMatch, Vec<String>)> = None;

    for scope in chain.scopes() {
        let file = match scope {
            Scope::Broken { source, reason } => {
                return Err(PolicyError::ConfigUnavailable {
                    source_file: source.clone(),
                    reason: reason.clone(),
                })
            }
            Scope::Loaded(file) => file,
        };
        let Some(segments) = candidate_segments(&file.base, path, kind) else {
            continue;
        };
        match best_in_file(file, &segments) {
            FileMatch::None => {}
            FileMatch::One(index) => {
                if file.rules[index].is_final {
                    tracing::trace!(
                        "{}: final section [{}] in {}",
                        path.display(),
                        file.rules[index].header,
                        file.source.display()
                    );
                    return Ok(Some(Selection {
                        file: Arc::clone(file),
                        index,
                        segments,
                    }));
                }
                deepest = Some((Arc::clone(file), FileMatch::One(index), segments));
            }
            FileMatch::Tie(first, second) => {
                if file.rules[first].is_final || file.rules[second].is_final {
                    return Err(ambiguous(path, file, first, second));
                }
                deepest = Some((Arc::clone(file), FileMatch::Tie(first, second), segments));
            }
        }
    }

    match deepest {
        None => Ok(None),
        Some((file, FileMatch::One(index), segments)) => Ok(Some(Selection {
            file,
            index,
            segments,
        })),
        Some((file, FileMatch::Tie(first, second), _)) => {
            Err(ambiguous(path, &file, first, second))
        }
        Some((_, FileMatch::None, _)) => Ok(None),
    }
}
