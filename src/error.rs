//! Error taxonomy for collaborator calls and node operations, plus the
//! dismissible notice list the presentation layer renders failures from.
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::BlockId;
use crate::moves::Direction;

/// Failure reported by a `StudioService` backend.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("version conflict on {block_id}: expected {expected}, found {actual:?}")]
    Conflict {
        block_id: BlockId,
        expected: u64,
        actual: Option<u64>,
    },
    #[error("block not found: {0}")]
    NotFound(BlockId),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }
}

/// Failure of a node operation. None of these are fatal; all are meant to be
/// surfaced as a dismissible notice.
#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("rejected: {0}")]
    ValidationRejected(String),
    #[error("{action} is not permitted on {id}")]
    NotPermitted { action: &'static str, id: BlockId },
    #[error("cannot move {id} {direction}")]
    MoveIllegal { id: BlockId, direction: Direction },
    #[error("sync of {id} conflicts with the server; refresh and retry")]
    SyncConflict {
        id: BlockId,
        #[source]
        source: ServiceError,
    },
    #[error("{action} failed for {id}")]
    PersistenceFailure {
        action: &'static str,
        id: BlockId,
        #[source]
        source: ServiceError,
    },
    #[error("refresh of {section_id} failed; outcome is unconfirmed")]
    RefreshFailure {
        section_id: BlockId,
        #[source]
        source: ServiceError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Validation,
    Conflict,
    Persistence,
    Refresh,
}

impl From<&OutlineError> for NoticeKind {
    fn from(err: &OutlineError) -> Self {
        match err {
            OutlineError::ValidationRejected(_)
            | OutlineError::NotPermitted { .. }
            | OutlineError::MoveIllegal { .. } => NoticeKind::Validation,
            OutlineError::SyncConflict { .. } => NoticeKind::Conflict,
            OutlineError::PersistenceFailure { .. } => NoticeKind::Persistence,
            OutlineError::RefreshFailure { .. } => NoticeKind::Refresh,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Notices {
    next_id: u64,
    items: Vec<Notice>,
}

impl Notices {
    pub fn push(&mut self, err: &OutlineError) -> u64 {
        self.next_id += 1;
        let mut message = err.to_string();
        if let Some(source) = std::error::Error::source(err) {
            message = format!("{message}: {source}");
        }
        self.items.push(Notice {
            id: self.next_id,
            kind: err.into(),
            message,
            raised_at: Utc::now(),
        });
        self.next_id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
