//! Local SQLite backend: a `StudioService` that keeps the outline on disk.
//!
//! - `model`: rows returned by queries.
//! - `repo`: SQL-only functions.
//!
//! `SqliteStudio` assembles rows into `OutlineNode` trees and is what the CLI
//! runs against with `--backend local`.

pub mod model;
pub mod repo;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument};

pub use repo::{import_outline, init_pool, run_migrations, upsert_library_block, Pool};

use crate::error::ServiceError;
use crate::model::{BlockId, CourseOutline, OutlineNode};
use crate::service::StudioService;
use model::BlockRow;

#[derive(Debug, Clone)]
pub struct SqliteStudio {
    pool: Pool,
}

impl SqliteStudio {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// A library block version listed in a seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryBlock {
    pub upstream_ref: String,
    pub display_name: String,
    pub version: u64,
}

/// JSON document accepted by `seed`: an outline plus the library it links to.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub course_id: Option<String>,
    pub sections: Vec<OutlineNode>,
    #[serde(default)]
    pub library: Vec<LibraryBlock>,
}

/// Load a seed document into the store. `course_id` applies when the file
/// does not name one. Returns the number of blocks written.
#[instrument(skip_all)]
pub async fn seed(pool: &Pool, course_id: &str, file: SeedFile) -> Result<usize, ServiceError> {
    for lib in &file.library {
        upsert_library_block(pool, &lib.upstream_ref, &lib.display_name, lib.version).await?;
    }
    let outline = CourseOutline {
        course_id: file.course_id.unwrap_or_else(|| course_id.to_string()),
        sections: file.sections,
    };
    let written = import_outline(pool, &outline).await?;
    info!(
        course_id = %outline.course_id,
        blocks = written,
        library = file.library.len(),
        "seeded local store"
    );
    Ok(written)
}

/// Group rows under their parents and return the children of `root_parent`,
/// each with its full subtree attached.
fn assemble(rows: Vec<BlockRow>, root_parent: &str) -> Result<Vec<OutlineNode>, ServiceError> {
    let mut by_parent: HashMap<String, Vec<(i64, OutlineNode)>> = HashMap::new();
    for row in &rows {
        by_parent
            .entry(row.parent_id.clone())
            .or_default()
            .push((row.position, row.to_node()?));
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by_key(|(pos, _)| *pos);
    }
    let mut roots = take_children(&mut by_parent, root_parent);
    for root in &mut roots {
        attach(root, &mut by_parent);
    }
    Ok(roots)
}

fn take_children(
    by_parent: &mut HashMap<String, Vec<(i64, OutlineNode)>>,
    parent: &str,
) -> Vec<OutlineNode> {
    by_parent
        .remove(parent)
        .map(|v| v.into_iter().map(|(_, n)| n).collect())
        .unwrap_or_default()
}

fn attach(node: &mut OutlineNode, by_parent: &mut HashMap<String, Vec<(i64, OutlineNode)>>) {
    node.children = take_children(by_parent, &node.id);
    for child in &mut node.children {
        attach(child, by_parent);
    }
}

#[async_trait]
impl StudioService for SqliteStudio {
    #[instrument(skip_all, fields(course_id = %course_id))]
    async fn fetch_outline(&self, course_id: &str) -> Result<CourseOutline, ServiceError> {
        let rows = repo::load_course(&self.pool, course_id).await?;
        Ok(CourseOutline {
            course_id: course_id.to_string(),
            sections: assemble(rows, course_id)?,
        })
    }

    #[instrument(skip_all, fields(section_id = %section_id))]
    async fn fetch_section(&self, section_id: &str) -> Result<OutlineNode, ServiceError> {
        let rows = repo::load_subtree(&self.pool, section_id).await?;
        let parent = rows
            .iter()
            .find(|r| r.id == section_id)
            .map(|r| r.parent_id.clone())
            .ok_or_else(|| ServiceError::NotFound(section_id.to_string()))?;
        assemble(rows, &parent)?
            .into_iter()
            .find(|n| n.id == section_id)
            .ok_or_else(|| ServiceError::NotFound(section_id.to_string()))
    }

    async fn persist_title_edit(
        &self,
        node_id: &str,
        _parent_id: &str,
        new_title: &str,
    ) -> Result<(), ServiceError> {
        repo::rename_block(&self.pool, node_id, new_title).await
    }

    async fn apply_reorder(
        &self,
        parent_id: &str,
        ordered_child_ids: &[BlockId],
    ) -> Result<(), ServiceError> {
        repo::reorder_children(&self.pool, parent_id, ordered_child_ids).await
    }

    async fn apply_sync(
        &self,
        downstream_id: &str,
        upstream_ref: &str,
        expected_version: u64,
    ) -> Result<(), ServiceError> {
        repo::sync_block(&self.pool, downstream_id, upstream_ref, expected_version).await?;
        Ok(())
    }

    async fn duplicate(&self, node_id: &str, parent_id: &str) -> Result<BlockId, ServiceError> {
        repo::duplicate_subtree(&self.pool, node_id, parent_id).await
    }

    async fn delete(&self, node_id: &str) -> Result<(), ServiceError> {
        repo::delete_subtree(&self.pool, node_id).await?;
        Ok(())
    }

    async fn publish(&self, node_id: &str) -> Result<(), ServiceError> {
        repo::publish_subtree(&self.pool, node_id).await?;
        Ok(())
    }
}
