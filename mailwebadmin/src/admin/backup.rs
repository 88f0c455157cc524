//! Backup and removal of mail directories
//!
//! When a domain or mailbox is deleted its mail directory can be archived
//! into `<backup>/<domain>.zip` (or `<domain>-<user>.zip`) and removed.
//! This runs as a background job, the HTTP response never waits for it.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AdminError, Result};
use crate::utils::validate::{contains_invalid_parts, ValidationError};

/// What was deleted in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Domain(i64),
    User(i64),
}

/// Path components of a mail directory. `user` is empty for whole domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailDir {
    pub domain: String,
    pub user: String,
}

impl MailDir {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            user: String::new(),
        }
    }

    pub fn user(domain: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            user: user.into(),
        }
    }

    fn check(&self, subject: Subject) -> std::result::Result<(), ValidationError> {
        if self.domain.is_empty() {
            return Err(ValidationError("empty domain in mail directory".to_string()));
        }
        if matches!(subject, Subject::User(_)) && self.user.is_empty() {
            return Err(ValidationError("empty user in mail directory".to_string()));
        }
        if self.domain == "." || self.user == "." {
            return Err(ValidationError("\".\" as mail directory component".to_string()));
        }
        contains_invalid_parts(&self.domain)?;
        contains_invalid_parts(&self.user)
    }

    /// Component the resolved directory has to end in.
    fn target(&self) -> &str {
        if self.user.is_empty() {
            &self.domain
        } else {
            &self.user
        }
    }
}

/// A directory cleanup request.
///
/// The name lookup happens before the database row is deleted, its result
/// (success or failure) travels with the job.
#[derive(Debug)]
pub struct CleanupJob {
    pub subject: Subject,
    pub lookup: Result<MailDir>,
}

/// Where mail directories live and where backups go.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    /// Pattern with `%d` for the domain and `%n` for the user part.
    pub maildir: String,
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    LookupFailed,
    Rejected,
    ArchiveFailed,
    RemoveFailed,
    Removed { archive: Option<PathBuf> },
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new("%[dn]").expect("placeholder regex is valid"))
}

/// Mail directory for the pattern with placeholders replaced.
///
/// Both placeholders are replaced in a single pass, a `%n` inside the
/// domain stays as it is.
pub fn source_path(pattern: &str, domain: &str, user: &str) -> PathBuf {
    let path = placeholder_regex().replace_all(pattern, |caps: &Captures| {
        if &caps[0] == "%d" {
            domain.to_string()
        } else {
            user.to_string()
        }
    });
    PathBuf::from(path.into_owned())
}

/// True if the last normal component of `path` is `name`.
fn ends_in(path: &Path, name: &str) -> bool {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .last()
        .is_some_and(|part| part == name)
}

/// Backup file for a domain (`user` empty) or a single mailbox.
pub fn dest_path(backup_dir: &Path, domain: &str, user: &str) -> PathBuf {
    let name = if user.is_empty() {
        format!("{}.zip", domain)
    } else {
        format!("{}-{}.zip", domain, user)
    };
    backup_dir.join(name)
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn add_dir<W: io::Write + io::Seek>(zip: &mut ZipWriter<W>, dir: &Path, entry: &str) -> Result<()> {
    zip.add_directory(format!("{}/", entry), file_options())?;

    let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|c| c.file_name());

    for child in children {
        let name = format!("{}/{}", entry, child.file_name().to_string_lossy());
        let path = child.path();
        if child.file_type()?.is_dir() {
            add_dir(zip, &path, &name)?;
        } else {
            add_file(zip, &path, &name)?;
        }
    }
    Ok(())
}

fn add_file<W: io::Write + io::Seek>(zip: &mut ZipWriter<W>, path: &Path, entry: &str) -> Result<()> {
    zip.start_file(entry, file_options())?;
    let mut file = File::open(path)?;
    io::copy(&mut file, zip)?;
    Ok(())
}

/// Archive `source` into the zip file `dest`.
///
/// Entries are rooted at the base name of `source`. Returns `None` without
/// creating anything if `source` does not exist.
pub fn zip_to_file(source: &Path, dest: &Path) -> Result<Option<PathBuf>> {
    let meta = match fs::metadata(source) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AdminError::Config(format!("no base name in {}", source.display())))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = (|| -> Result<()> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
        if meta.is_dir() {
            add_dir(&mut zip, source, &base)?;
        } else {
            add_file(&mut zip, source, &base)?;
        }
        let mut out = zip.finish()?;
        io::Write::flush(&mut out)?;
        Ok(())
    })();

    if let Err(e) = written {
        // no half written archives
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(Some(dest.to_path_buf()))
}

/// Recursively remove a directory, a missing directory is not an error.
pub fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Archive (if configured) and remove the mail directory of a job.
///
/// Every step logs its own failure and stops the job, nothing is retried.
pub fn run_cleanup(policy: &CleanupPolicy, job: CleanupJob) -> CleanupOutcome {
    let subject = job.subject;
    let dir = match job.lookup {
        Ok(dir) => dir,
        Err(e) => {
            error!(
                ?subject,
                "Can't create backup of mail directory, NOT deleting directory. Database lookup failed: {}",
                e
            );
            return CleanupOutcome::LookupFailed;
        }
    };

    if let Err(e) = dir.check(subject) {
        error!(?subject, domain = %dir.domain, user = %dir.user, "Refusing to touch mail directory: {}", e);
        return CleanupOutcome::Rejected;
    }

    let source = source_path(&policy.maildir, &dir.domain, &dir.user);
    if !ends_in(&source, dir.target()) {
        error!(
            ?subject,
            path = %source.display(),
            "Refusing to touch mail directory: path does not end in {:?}",
            dir.target()
        );
        return CleanupOutcome::Rejected;
    }

    let mut archive = None;
    if let Some(backup_dir) = &policy.backup {
        let dest = dest_path(backup_dir, &dir.domain, &dir.user);
        match zip_to_file(&source, &dest) {
            Ok(Some(path)) => {
                info!(?subject, archive = %path.display(), "Created backup of mail directory");
                archive = Some(path);
            }
            Ok(None) => {
                info!(?subject, source = %source.display(), "Mail directory does not exist, nothing to archive");
            }
            Err(e) => {
                error!(?subject, "Can't create backup of mail directory. NOT deleting directory: {}", e);
                return CleanupOutcome::ArchiveFailed;
            }
        }
    }

    match remove_dir(&source) {
        Ok(()) => {
            info!(?subject, path = %source.display(), "Deleted mail directory");
            CleanupOutcome::Removed { archive }
        }
        Err(e) => {
            error!(?subject, path = %source.display(), "Can't delete mail directory: {}", e);
            CleanupOutcome::RemoveFailed
        }
    }
}

/// Accepts cleanup jobs for background execution.
#[cfg_attr(test, mockall::automock)]
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: CleanupJob);
}

/// Runs every job on its own tokio task.
pub struct TokioJobQueue {
    policy: Arc<CleanupPolicy>,
}

impl TokioJobQueue {
    pub fn new(policy: CleanupPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl JobQueue for TokioJobQueue {
    fn submit(&self, job: CleanupJob) {
        let policy = self.policy.clone();
        let subject = job.subject;
        debug!(?subject, "Scheduling mail directory cleanup");

        // Detached: the handle is dropped, nobody waits for the job and a
        // panic inside it stays inside the task.
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || run_cleanup(&policy, job)).await {
                Ok(outcome) => debug!(?subject, ?outcome, "Mail directory cleanup finished"),
                Err(e) => warn!(?subject, "Mail directory cleanup task failed: {}", e),
            }
        });
    }
}
