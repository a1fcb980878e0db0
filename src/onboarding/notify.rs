use crate::shared::fs_atomic::write_once_atomic;
use crate::shared::time::now_secs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    IdentityIssued,
    AccessProvisioned,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentityIssued => "identity_issued",
            Self::AccessProvisioned => "access_provisioned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub entity_id: i64,
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: i64,
}

impl Notification {
    pub fn new(
        entity_id: i64,
        kind: NotificationKind,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            kind,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            created_at: now_secs(),
        }
    }

    /// One notification per entity and kind, regardless of content.
    pub fn dedupe_key(&self) -> String {
        let digest = Sha256::digest(format!("{}:{}", self.entity_id, self.kind.as_str()));
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<NotifyOutcome, NotifyError>;
}

/// Drops each notification as a JSON file under `<state_root>/outbox/`.
/// Delivery is left to whatever drains the directory.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, notification: &Notification) -> PathBuf {
        self.dir.join(format!("{}.json", notification.dedupe_key()))
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, notification: &Notification) -> Result<NotifyOutcome, NotifyError> {
        let path = self.path_for(notification);
        let body = serde_json::to_vec_pretty(notification).map_err(|source| NotifyError::Json {
            path: path.display().to_string(),
            source,
        })?;
        match write_once_atomic(&path, &body) {
            Ok(()) => Ok(NotifyOutcome::Sent),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(NotifyOutcome::Duplicate),
            Err(source) => Err(NotifyError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_notification_for_same_key_is_a_duplicate() {
        let temp = tempdir().expect("tempdir");
        let notifier = OutboxNotifier::new(temp.path().join("outbox"));
        let first = Notification::new(
            3,
            NotificationKind::IdentityIssued,
            "it@example.com",
            "Company email issued",
            "jane.doe@corp.example.com",
        );
        let second = Notification::new(
            3,
            NotificationKind::IdentityIssued,
            "it@example.com",
            "Company email issued again",
            "different body",
        );
        assert_eq!(notifier.notify(&first).expect("first"), NotifyOutcome::Sent);
        assert_eq!(
            notifier.notify(&second).expect("second"),
            NotifyOutcome::Duplicate
        );

        let stored: Notification = serde_json::from_slice(
            &std::fs::read(notifier.path_for(&first)).expect("read outbox"),
        )
        .expect("parse outbox");
        assert_eq!(stored.subject, "Company email issued");
    }

    #[test]
    fn keys_differ_per_kind() {
        let issued = Notification::new(1, NotificationKind::IdentityIssued, "a@x.io", "s", "b");
        let provisioned =
            Notification::new(1, NotificationKind::AccessProvisioned, "a@x.io", "s", "b");
        assert_ne!(issued.dedupe_key(), provisioned.dedupe_key());
        assert_eq!(issued.dedupe_key().len(), 64);
    }
}
