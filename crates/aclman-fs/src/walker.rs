// walker.rs - Directory-by-directory enforcement.
//
// Work is split into directory items. Processing an item loads the
// directory's own policy file, enforces the directory and its non-directory
// entries, and hands back the subdirectories as new items. Each item carries
// its immutable rule chain, so items can run on any thread in any order.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aclman_policy::{
    load_scope, plan, Applier, ConfigSource, IdentityResolver, ObjectKind, ObjectReport, Outcome,
    PolicyError, PolicyResolver, ResolveOptions, RuleChain, StateReader,
};

/// Run-wide switches.
#[derive(Debug, Clone, Default)]
pub struct EnforcerSettings {
    /// Descend into subdirectories of start directories.
    pub recursive: bool,
    /// Plan and report, but never call the applier.
    pub dry_run: bool,
    pub resolve: ResolveOptions,
}

/// A directory waiting to be processed, with the rules of its ancestors.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: PathBuf,
    pub chain: RuleChain,
}

/// Result of processing one directory item.
#[derive(Debug, Default)]
pub struct DirOutcome {
    pub reports: Vec<ObjectReport>,
    pub subdirs: Vec<WorkItem>,
}

/// What a start path turned into.
#[derive(Debug)]
pub enum Start {
    /// A directory: process it as a work item.
    Walk(WorkItem),
    /// A single non-directory object, already enforced.
    Done(ObjectReport),
    /// A symbolic link, left alone.
    Skipped,
}

/// Resolves, plans and applies policy for filesystem objects.
pub struct Enforcer {
    config: Arc<dyn ConfigSource>,
    reader: Arc<dyn StateReader>,
    applier: Arc<dyn Applier>,
    identities: Arc<dyn IdentityResolver>,
    settings: EnforcerSettings,
    cancel: Arc<AtomicBool>,
}

impl Enforcer {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        reader: Arc<dyn StateReader>,
        applier: Arc<dyn Applier>,
        identities: Arc<dyn IdentityResolver>,
        settings: EnforcerSettings,
    ) -> Self {
        Self {
            config,
            reader,
            applier,
            identities,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &EnforcerSettings {
        &self.settings
    }

    /// Shared flag; once set, no new objects are visited.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Rule chain made of the policy files of every ancestor of `path`,
    /// from `/` down to its parent directory.
    pub fn ancestor_chain(&self, path: &Path) -> RuleChain {
        let mut dirs: Vec<&Path> = path.ancestors().skip(1).collect();
        dirs.reverse();
        dirs.into_iter().fold(RuleChain::new(), |chain, dir| {
            match load_scope(self.config.as_ref(), dir) {
                Some(scope) => chain.push(scope),
                None => chain,
            }
        })
    }

    /// Prepare a start path given on the command line.
    pub fn start(&self, path: &Path) -> Start {
        let path = match absolute(path) {
            Ok(path) => path,
            Err(e) => return Start::Done(failed_io(path, ObjectKind::File, e)),
        };
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", path.display(), e);
                return Start::Done(failed_io(&path, ObjectKind::File, e));
            }
        };
        if meta.file_type().is_symlink() {
            tracing::debug!("Ignoring symbolic link {}", path.display());
            return Start::Skipped;
        }

        let chain = self.ancestor_chain(&path);
        if meta.is_dir() {
            Start::Walk(WorkItem { path, chain })
        } else {
            Start::Done(self.process_object(&path, ObjectKind::File, &chain))
        }
    }

    /// Enforce a directory and, when recursive, its non-directory entries.
    pub fn process_dir(&self, item: WorkItem) -> DirOutcome {
        let mut outcome = DirOutcome::default();
        if self.is_cancelled() {
            return outcome;
        }
        let chain = match load_scope(self.config.as_ref(), &item.path) {
            Some(scope) => item.chain.push(scope),
            None => item.chain,
        };
        tracing::debug!("DIR {}", item.path.display());
        outcome
            .reports
            .push(self.process_object(&item.path, ObjectKind::Directory, &chain));
        if !self.settings.recursive {
            return outcome;
        }

        let entries = match list_dir(&item.path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot list {}: {}", item.path.display(), e);
                outcome
                    .reports
                    .push(failed_io(&item.path, ObjectKind::Directory, e));
                return outcome;
            }
        };
        for (path, file_type) in entries {
            if self.is_cancelled() {
                break;
            }
            if file_type.is_symlink() {
                tracing::trace!("Ignoring symbolic link {}", path.display());
            } else if file_type.is_dir() {
                outcome.subdirs.push(WorkItem {
                    path,
                    chain: chain.clone(),
                });
            } else {
                outcome
                    .reports
                    .push(self.process_object(&path, ObjectKind::File, &chain));
            }
        }
        outcome
    }

    /// Resolve, plan and (unless dry run) apply one object.
    pub fn process_object(
        &self,
        path: &Path,
        kind: ObjectKind,
        chain: &RuleChain,
    ) -> ObjectReport {
        let state = match self.reader.read_state(path) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("{}", e);
                return ObjectReport::failed(path, kind, None, &e);
            }
        };
        let resolver = PolicyResolver::new(self.identities.as_ref(), &self.settings.resolve);
        let policy = match resolver.resolve(path, chain, &state) {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!("{}: {}", path.display(), e);
                return ObjectReport::failed(path, state.kind, None, &e);
            }
        };

        let mut report = plan(path, &state, &policy);
        match report.outcome {
            Outcome::Planned if !self.settings.dry_run => match self.applier.apply(&report) {
                Ok(()) => report.outcome = Outcome::Applied,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.outcome = Outcome::Failed {
                        error: e.to_string(),
                    };
                }
            },
            Outcome::Ignored => tracing::debug!("{}: ignored", path.display()),
            _ => {}
        }
        report
    }

    /// Walk every start path on the current thread.
    pub fn run_sequential(&self, paths: &[PathBuf]) -> Vec<ObjectReport> {
        let mut reports = Vec::new();
        let mut stack = Vec::new();
        for path in paths {
            match self.start(path) {
                Start::Walk(item) => stack.push(item),
                Start::Done(report) => reports.push(report),
                Start::Skipped => {}
            }
        }
        stack.reverse();
        while let Some(item) = stack.pop() {
            if self.is_cancelled() {
                break;
            }
            let outcome = self.process_dir(item);
            reports.extend(outcome.reports);
            stack.extend(outcome.subdirs.into_iter().rev());
        }
        reports
    }
}

fn failed_io(path: &Path, kind: ObjectKind, err: std::io::Error) -> ObjectReport {
    let err: PolicyError = crate::error::FsError::io(path, err).into();
    ObjectReport::failed(path, kind, None, &err)
}

/// Entries of `dir` sorted by name, with their (non-followed) file types.
fn list_dir(dir: &Path) -> std::io::Result<Vec<(PathBuf, std::fs::FileType)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        entries.push((entry.path(), entry.file_type()?));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Make `path` absolute and drop `.`/`..` components without following links.
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
