// report.rs - Human and JSON-lines rendering of object reports.

use std::io::Write;

use aclman_policy::{ObjectReport, Outcome};

/// Counters over every report seen in a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub visited: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Writes each report as it arrives and keeps the totals.
pub struct Reporter<W: Write> {
    out: W,
    json: bool,
    dry_run: bool,
    totals: Totals,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, json: bool, dry_run: bool) -> Self {
        Self {
            out,
            json,
            dry_run,
            totals: Totals::default(),
        }
    }

    pub fn record(&mut self, report: &ObjectReport) -> std::io::Result<()> {
        self.totals.visited += 1;
        match &report.outcome {
            Outcome::Failed { .. } => self.totals.failed += 1,
            Outcome::Planned | Outcome::Applied => self.totals.changed += 1,
            Outcome::Unchanged | Outcome::Ignored => {}
        }

        if self.json {
            serde_json::to_writer(&mut self.out, report)?;
            writeln!(self.out)?;
        } else {
            for line in human_lines(report, self.dry_run) {
                writeln!(self.out, "{}", line)?;
            }
        }
        Ok(())
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// One shell-like line per change, `would `-prefixed in dry run.
/// Failures are reported through the log, not here.
pub fn human_lines(report: &ObjectReport, dry_run: bool) -> Vec<String> {
    if !matches!(report.outcome, Outcome::Planned | Outcome::Applied) {
        return Vec::new();
    }
    let prefix = if dry_run { "would " } else { "" };
    let path = report.path.display();
    report
        .chown_spec()
        .map(|spec| format!("chown {}", spec))
        .into_iter()
        .chain(report.changes.iter().map(|change| change.to_string()))
        .map(|command| format!("{}{} {}", prefix, command, path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aclman_policy::{AclChange, AclTag, IdentityChange, ObjectKind, Perms};
    use std::path::PathBuf;

    fn home_report(outcome: Outcome) -> ObjectReport {
        ObjectReport {
            path: PathBuf::from("/org/Users/user1"),
            kind: ObjectKind::Directory,
            matched_rule: None,
            owner_change: Some(IdentityChange {
                from: "root".to_string(),
                to: "user1".to_string(),
            }),
            group_change: Some(IdentityChange {
                from: "root".to_string(),
                to: "staff".to_string(),
            }),
            changes: vec![AclChange::Modify {
                default: false,
                tag: AclTag::Other,
                from: Perms::new(true, false, true),
                to: Perms::default(),
            }],
            terminal: false,
            outcome,
        }
    }

    #[test]
    fn human_lines_read_like_commands() {
        let lines = human_lines(&home_report(Outcome::Applied), false);
        assert_eq!(
            lines,
            vec![
                "chown user1:staff /org/Users/user1",
                "setfacl -m o::--- /org/Users/user1",
            ]
        );
    }

    #[test]
    fn dry_run_lines_say_would() {
        let lines = human_lines(&home_report(Outcome::Planned), true);
        assert_eq!(lines[0], "would chown user1:staff /org/Users/user1");
    }

    #[test]
    fn unchanged_and_failed_objects_print_nothing() {
        assert!(human_lines(&home_report(Outcome::Unchanged), false).is_empty());
        let failed = home_report(Outcome::Failed {
            error: "permission denied".to_string(),
        });
        assert!(human_lines(&failed, false).is_empty());
    }

    #[test]
    fn totals_count_failures() {
        let mut reporter = Reporter::new(Vec::new(), false, false);
        reporter.record(&home_report(Outcome::Applied)).unwrap();
        reporter.record(&home_report(Outcome::Unchanged)).unwrap();
        reporter
            .record(&home_report(Outcome::Failed {
                error: "x".to_string(),
            }))
            .unwrap();
        assert_eq!(
            reporter.totals(),
            Totals {
                visited: 3,
                changed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn json_mode_writes_one_object_per_line() {
        let mut out = Vec::new();
        {
            let mut reporter = Reporter::new(&mut out, true, true);
            reporter.record(&home_report(Outcome::Planned)).unwrap();
            reporter.record(&home_report(Outcome::Unchanged)).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["path"], "/org/Users/user1");
        assert_eq!(first["outcome"]["status"], "planned");
        assert_eq!(first["owner_change"]["to"], "user1");
    }
}
