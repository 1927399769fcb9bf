//! Row models returned by the outline repository.
//!
//! Keep these structs focused on the data returned by queries; tree assembly
//! lives in the parent module.

use sqlx::FromRow;

use crate::error::ServiceError;
use crate::model::{Actions, Category, OutlineNode, UpstreamInfo, VisibilityState};

/// One `blocks` row joined with the latest version of its library block.
#[derive(Debug, Clone, FromRow)]
pub struct BlockRow {
    pub id: String,
    pub course_id: String,
    pub parent_id: String,
    pub category: String,
    pub position: i64,
    pub display_name: String,
    pub published: bool,
    pub has_changes: bool,
    pub visibility_state: String,
    pub deletable: bool,
    pub draggable: bool,
    pub child_addable: bool,
    pub duplicable: bool,
    pub graded: bool,
    pub is_time_limited: bool,
    pub is_header_visible: bool,
    pub upstream_ref: Option<String>,
    pub version_synced: Option<i64>,
    pub upstream_version: Option<i64>,
}

impl BlockRow {
    /// The node without children. `ready_to_sync` is computed here: the
    /// library holds a newer version than the one last applied.
    pub fn to_node(&self) -> Result<OutlineNode, ServiceError> {
        let category = Category::parse(&self.category).ok_or_else(|| {
            ServiceError::Invalid(format!("stored block {} has category {}", self.id, self.category))
        })?;
        let upstream_info = self.upstream_ref.as_ref().map(|upstream_ref| {
            let synced = self.version_synced.unwrap_or(0);
            UpstreamInfo {
                ready_to_sync: self.upstream_version.is_some_and(|v| v > synced),
                upstream_ref: upstream_ref.clone(),
                version_synced: synced.max(0) as u64,
            }
        });
        Ok(OutlineNode {
            id: self.id.clone(),
            category,
            display_name: self.display_name.clone(),
            published: self.published,
            has_changes: self.has_changes,
            visibility_state: VisibilityState::parse(&self.visibility_state),
            actions: Actions {
                deletable: self.deletable,
                draggable: self.draggable,
                child_addable: self.child_addable,
                duplicable: self.duplicable,
            },
            should_scroll: false,
            graded: self.graded,
            is_time_limited: self.is_time_limited,
            is_header_visible: self.is_header_visible,
            upstream_info,
            children: Vec::new(),
        })
    }
}

/// Library block slice read while applying a sync.
#[derive(Debug, Clone, FromRow)]
pub struct SyncSource {
    pub upstream_ref: Option<String>,
    pub version_synced: Option<i64>,
    pub library_version: Option<i64>,
    pub library_display_name: Option<String>,
}
