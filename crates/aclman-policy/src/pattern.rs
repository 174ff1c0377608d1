// pattern.rs - Section header patterns.
//
// A pattern is a `/`-separated list of segments relative to the directory of
// the policy file that declares it. `*` matches any single segment and may
// carry substitution flags:
//
//   O  the matched name becomes the owner
//   P  the primary group of the matched name becomes the group
//   G  the matched name becomes the group
//
// Directories are matched with a trailing `.` self segment, so `[/*/*]` covers
// `sub/file` and `sub/` itself but not `file`. `[/]` is shorthand for `[/.]`,
// the policy file's own directory.

use std::fmt;
use std::path::{Component, Path};

use crate::error::PolicyError;
use crate::state::ObjectKind;

/// Segment that stands for a directory itself.
pub const SELF_SEGMENT: &str = ".";

/// Substitution flags carried by a wildcard segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WildcardFlags {
    pub owner: bool,
    pub primary_group: bool,
    pub group: bool,
}

impl WildcardFlags {
    pub fn is_empty(&self) -> bool {
        !(self.owner || self.primary_group || self.group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Wildcard(WildcardFlags),
}

impl Segment {
    fn parse(text: &str) -> Segment {
        if let Some(letters) = text.strip_prefix('*') {
            let mut flags = WildcardFlags::default();
            let all_flags = letters.chars().all(|c| match c {
                'O' => {
                    flags.owner = true;
                    true
                }
                'P' => {
                    flags.primary_group = true;
                    true
                }
                'G' => {
                    flags.group = true;
                    true
                }
                _ => false,
            });
            if all_flags {
                return Segment::Wildcard(flags);
            }
        }
        Segment::Literal(text.to_string())
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == name,
            Segment::Wildcard(_) => true,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(literal) => write!(f, "{}", literal),
            Segment::Wildcard(flags) => {
                write!(f, "*")?;
                if flags.owner {
                    write!(f, "O")?;
                }
                if flags.primary_group {
                    write!(f, "P")?;
                }
                if flags.group {
                    write!(f, "G")?;
                }
                Ok(())
            }
        }
    }
}

/// Where a substituted group name comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCapture {
    /// The matched segment itself (`G`).
    Name(String),
    /// The primary group of this user (`P`), looked up later.
    PrimaryOf(String),
}

/// Owner/group values captured by flagged wildcards during a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    pub owner: Option<String>,
    pub group: Option<GroupCapture>,
}

/// A parsed section header pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let Some(body) = text.strip_prefix('/') else {
            return Err(PolicyError::grammar(format!(
                "pattern '{}' must start with '/'",
                text
            )));
        };
        if body.is_empty() {
            return Ok(Self {
                segments: vec![Segment::Literal(SELF_SEGMENT.to_string())],
            });
        }
        let mut segments = Vec::new();
        for part in body.split('/') {
            if part.is_empty() {
                return Err(PolicyError::grammar(format!(
                    "pattern '{}' contains an empty segment",
                    text
                )));
            }
            segments.push(Segment::parse(part));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of non-wildcard segments; more literals means more specific.
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// True iff the lengths agree and every literal equals its candidate segment.
    pub fn matches<S: AsRef<str>>(&self, candidate: &[S]) -> bool {
        self.segments.len() == candidate.len()
            && self
                .segments
                .iter()
                .zip(candidate)
                .all(|(segment, name)| segment.matches(name.as_ref()))
    }

    /// Collect flag substitutions for a candidate this pattern matches.
    ///
    /// Segments apply left to right, so the rightmost flag wins; within one
    /// segment `G` is applied after `P`. The `.` self segment never substitutes.
    pub fn captures<S: AsRef<str>>(&self, candidate: &[S]) -> Captures {
        let mut captures = Captures::default();
        for (segment, name) in self.segments.iter().zip(candidate) {
            let name: &str = name.as_ref();
            let Segment::Wildcard(flags) = segment else {
                continue;
            };
            if name == SELF_SEGMENT {
                continue;
            }
            if flags.owner {
                captures.owner = Some(name.to_string());
            }
            if flags.primary_group {
                captures.group = Some(GroupCapture::PrimaryOf(name.to_string()));
            }
            if flags.group {
                captures.group = Some(GroupCapture::Name(name.to_string()));
            }
        }
        captures
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Pattern {
    type Err = PolicyError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Pattern::parse(text)
    }
}

/// Candidate segments of an object relative to a policy file's directory.
///
/// Returns `None` when `path` is not inside `base`.
pub fn candidate_segments(base: &Path, path: &Path, kind: ObjectKind) -> Option<Vec<String>> {
    let relative = path.strip_prefix(base).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if kind.is_dir() {
        segments.push(SELF_SEGMENT.to_string());
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Pattern {
        Pattern::parse(text).unwrap()
    }

    #[test]
    fn parses_literals_and_wildcards() {
        let pattern = p("/Users/*OP/*");
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal("Users".into()),
                Segment::Wildcard(WildcardFlags {
                    owner: true,
                    primary_group: true,
                    group: false
                }),
                Segment::Wildcard(WildcardFlags::default()),
            ]
        );
        assert_eq!(pattern.literal_count(), 1);
        assert_eq!(pattern.to_string(), "/Users/*OP/*");
    }

    #[test]
    fn flag_letters_in_any_order() {
        let pattern = p("/*GO");
        let Segment::Wildcard(flags) = &pattern.segments()[0] else {
            panic!("expected wildcard");
        };
        assert!(flags.owner && flags.group && !flags.primary_group);
    }

    #[test]
    fn star_with_other_letters_is_literal() {
        assert_eq!(p("/*x").segments(), &[Segment::Literal("*x".into())]);
    }

    #[test]
    fn root_pattern_is_the_directory_itself() {
        assert_eq!(p("/"), p("/."));
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(Pattern::parse("bin/*").is_err());
        assert!(Pattern::parse("/bin//x").is_err());
        assert!(Pattern::parse("/bin/").is_err());
        assert!(Pattern::parse("").is_err());
    }

    #[test]
    fn match_requires_equal_length() {
        let pattern = p("/opt/*/*");
        assert!(pattern.matches(&["opt", "tool1", "file1"]));
        assert!(pattern.matches(&["opt", "tool1", "."]));
        assert!(!pattern.matches(&["opt", "file3"]));
        assert!(!pattern.matches(&["opt", "tool1", "sub", "x"]));
        assert!(!pattern.matches(&["var", "tool1", "file1"]));
    }

    #[test]
    fn match_agrees_with_generated_cases() {
        // Patterns with 0-3 wildcards over a fixed literal alphabet.
        let names = ["a", "b"];
        let mut patterns = Vec::new();
        for len in 1..=3usize {
            for mask in 0..(1u32 << len) {
                for pick in 0..(1u32 << len) {
                    let mut text = String::new();
                    for i in 0..len {
                        text.push('/');
                        if mask & (1 << i) != 0 {
                            text.push('*');
                        } else {
                            text.push_str(names[((pick >> i) & 1) as usize]);
                        }
                    }
                    patterns.push(text);
                }
            }
        }
        let candidates: Vec<Vec<&str>> = vec![
            vec![],
            vec!["a"],
            vec!["b"],
            vec!["a", "b"],
            vec!["b", "b"],
            vec!["a", "a", "b"],
            vec!["b", "a", "a", "a"],
        ];
        for text in &patterns {
            let pattern = p(text);
            for candidate in &candidates {
                let expected = pattern.segments().len() == candidate.len()
                    && pattern.segments().iter().zip(candidate).all(|(s, c)| match s {
                        Segment::Literal(l) => l.as_str() == *c,
                        Segment::Wildcard(_) => true,
                    });
                assert_eq!(pattern.matches(candidate.as_slice()), expected, "{} vs {:?}", text, candidate);
            }
        }
    }

    #[test]
    fn captures_owner_and_primary_group() {
        let pattern = p("/Users/*OP/*");
        let captures = pattern.captures(&["Users", "user1", "file"]);
        assert_eq!(captures.owner.as_deref(), Some("user1"));
        assert_eq!(captures.group, Some(GroupCapture::PrimaryOf("user1".into())));
    }

    #[test]
    fn group_flag_wins_over_primary_in_same_segment() {
        let captures = p("/*PG").captures(&["staff"]);
        assert_eq!(captures.group, Some(GroupCapture::Name("staff".into())));
    }

    #[test]
    fn rightmost_flag_wins() {
        let captures = p("/*O/*O").captures(&["outer", "inner"]);
        assert_eq!(captures.owner.as_deref(), Some("inner"));
    }

    #[test]
    fn self_segment_never_substitutes() {
        let captures = p("/Users/*O").captures(&["Users", "."]);
        assert_eq!(captures.owner, None);
    }

    #[test]
    fn candidate_segments_for_files_and_directories() {
        let base = Path::new("/org");
        assert_eq!(
            candidate_segments(base, Path::new("/org/opt/file3"), ObjectKind::File),
            Some(vec!["opt".to_string(), "file3".to_string()])
        );
        assert_eq!(
            candidate_segments(base, Path::new("/org/Users"), ObjectKind::Directory),
            Some(vec!["Users".to_string(), ".".to_string()])
        );
        assert_eq!(
            candidate_segments(base, Path::new("/org"), ObjectKind::Directory),
            Some(vec![".".to_string()])
        );
        assert_eq!(
            candidate_segments(base, Path::new("/var/x"), ObjectKind::File),
            None
        );
    }
}
