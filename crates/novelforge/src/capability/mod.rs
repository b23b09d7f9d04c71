//! Collaborators the engine consumes but does not implement.

mod binder;
mod fetcher;
mod mailer;

pub use binder::{ArtifactRequest, BindError, Binder, BoundFile};
pub use fetcher::{FetchError, Fetcher};
pub use mailer::{MailError, Mailer, NoopMailer};
