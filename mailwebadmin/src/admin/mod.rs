/// Mail directory maintenance
///
/// Provides:
/// - Backup and removal of mail directories of deleted domains and users

pub mod backup;

pub use backup::{
    CleanupJob, CleanupOutcome, CleanupPolicy, JobQueue, MailDir, Subject, TokioJobQueue,
};
