use super::model::{BlockRow, SyncSource};
use crate::error::ServiceError;
use crate::model::{BlockId, Category, CourseOutline, OutlineNode, VisibilityState};
use crate::usage_key::BlockKey;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use uuid::Uuid;

pub type Pool = SqlitePool;
type Result<T> = std::result::Result<T, ServiceError>;

const BLOCK_COLUMNS: &str = "b.id, b.course_id, b.parent_id, b.category, b.position, b.display_name, \
     b.published, b.has_changes, b.visibility_state, b.deletable, b.draggable, b.child_addable, \
     b.duplicable, b.graded, b.is_time_limited, b.is_header_visible, b.upstream_ref, \
     b.version_synced, l.version AS upstream_version";

const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id) AS ( \
     SELECT id FROM blocks WHERE id = ? \
     UNION ALL \
     SELECT c.id FROM blocks c JOIN subtree s ON c.parent_id = s.id)";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and create its parent
/// directory. In-memory and non-sqlite URLs are returned unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // sqlx only creates missing files when asked to.
    let mut rebuilt = format!("sqlite://{expanded_path}");
    match query_part {
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(sqlx::Error::from)?;
    Ok(())
}

/// Replace every block of the outline's course with the given tree.
#[instrument(skip_all, fields(course_id = %outline.course_id))]
pub async fn import_outline(pool: &Pool, outline: &CourseOutline) -> Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM blocks WHERE course_id = ?")
        .bind(&outline.course_id)
        .execute(&mut *tx)
        .await?;

    let mut stack: Vec<(&OutlineNode, &str, i64)> = outline
        .sections
        .iter()
        .enumerate()
        .rev()
        .map(|(pos, s)| (s, outline.course_id.as_str(), pos as i64))
        .collect();
    let mut inserted = 0usize;
    while let Some((node, parent_id, position)) = stack.pop() {
        insert_node(&mut tx, &outline.course_id, parent_id, position, node).await?;
        inserted += 1;
        for (pos, child) in node.children.iter().enumerate().rev() {
            stack.push((child, node.id.as_str(), pos as i64));
        }
    }
    tx.commit().await?;
    debug!(inserted, "outline imported");
    Ok(inserted)
}

async fn insert_node(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: &str,
    parent_id: &str,
    position: i64,
    node: &OutlineNode,
) -> Result<()> {
    let upstream = node.upstream_info.as_ref();
    sqlx::query(
        "INSERT INTO blocks (id, course_id, parent_id, category, position, display_name, published, \
         has_changes, visibility_state, deletable, draggable, child_addable, duplicable, graded, \
         is_time_limited, is_header_visible, upstream_ref, version_synced, edited_on) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&node.id)
    .bind(course_id)
    .bind(parent_id)
    .bind(node.category.as_str())
    .bind(position)
    .bind(&node.display_name)
    .bind(node.published)
    .bind(node.has_changes)
    .bind(node.visibility_state.as_str())
    .bind(node.actions.deletable)
    .bind(node.actions.draggable)
    .bind(node.actions.child_addable)
    .bind(node.actions.duplicable)
    .bind(node.graded)
    .bind(node.is_time_limited)
    .bind(node.is_header_visible)
    .bind(upstream.map(|u| u.upstream_ref.as_str()))
    .bind(upstream.map(|u| u.version_synced as i64))
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Publish (or republish) a library block version.
#[instrument(skip_all, fields(upstream_ref = %upstream_ref, version = version))]
pub async fn upsert_library_block(
    pool: &Pool,
    upstream_ref: &str,
    display_name: &str,
    version: u64,
) -> Result<()> {
    if upstream_ref.trim().is_empty() {
        return Err(ServiceError::Invalid("library block reference must be non-empty".into()));
    }
    sqlx::query(
        "INSERT INTO library_blocks (upstream_ref, display_name, version) VALUES (?, ?, ?) \
         ON CONFLICT(upstream_ref) DO UPDATE SET display_name = excluded.display_name, version = excluded.version",
    )
    .bind(upstream_ref)
    .bind(display_name)
    .bind(version as i64)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn load_course(pool: &Pool, course_id: &str) -> Result<Vec<BlockRow>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks b \
         LEFT JOIN library_blocks l ON l.upstream_ref = b.upstream_ref \
         WHERE b.course_id = ? ORDER BY b.parent_id, b.position"
    );
    Ok(sqlx::query_as::<_, BlockRow>(&sql)
        .bind(course_id)
        .fetch_all(pool)
        .await?)
}

/// The block and all of its descendants.
#[instrument(skip_all)]
pub async fn load_subtree(pool: &Pool, root_id: &str) -> Result<Vec<BlockRow>> {
    let sql = format!(
        "{SUBTREE_CTE} SELECT {BLOCK_COLUMNS} FROM blocks b JOIN subtree s ON s.id = b.id \
         LEFT JOIN library_blocks l ON l.upstream_ref = b.upstream_ref \
         ORDER BY b.parent_id, b.position"
    );
    Ok(sqlx::query_as::<_, BlockRow>(&sql)
        .bind(root_id)
        .fetch_all(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn rename_block(pool: &Pool, id: &str, title: &str) -> Result<()> {
    let res = sqlx::query(
        "UPDATE blocks SET display_name = ?, has_changes = 1, edited_on = ? WHERE id = ?",
    )
    .bind(title)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(ServiceError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Rewrite child positions. `ordered_ids` must be a permutation of the
/// current children of `parent_id`.
#[instrument(skip_all)]
pub async fn reorder_children(pool: &Pool, parent_id: &str, ordered_ids: &[BlockId]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let current: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT id FROM blocks WHERE parent_id = ?")
            .bind(parent_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();
    let proposed: HashSet<&str> = ordered_ids.iter().map(String::as_str).collect();
    if proposed.len() != ordered_ids.len()
        || current.len() != ordered_ids.len()
        || !current.iter().all(|id| proposed.contains(id.as_str()))
    {
        return Err(ServiceError::Invalid(format!(
            "reorder of {parent_id} is not a permutation of its children"
        )));
    }
    for (position, id) in ordered_ids.iter().enumerate() {
        sqlx::query("UPDATE blocks SET position = ? WHERE id = ?")
            .bind(position as i64)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE blocks SET has_changes = 1, edited_on = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(parent_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Apply the latest library version to a linked block, failing with
/// `Conflict` when `expected_version` no longer matches what is stored.
#[instrument(skip_all)]
pub async fn sync_block(
    pool: &Pool,
    id: &str,
    upstream_ref: &str,
    expected_version: u64,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let source = sqlx::query_as::<_, SyncSource>(
        "SELECT b.upstream_ref, b.version_synced, l.version AS library_version, \
         l.display_name AS library_display_name \
         FROM blocks b LEFT JOIN library_blocks l ON l.upstream_ref = b.upstream_ref \
         WHERE b.id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;

    if source.upstream_ref.as_deref() != Some(upstream_ref) {
        return Err(ServiceError::Invalid(format!(
            "{id} is not linked to {upstream_ref}"
        )));
    }
    let stored = source.version_synced.map(|v| v.max(0) as u64);
    if stored != Some(expected_version) {
        return Err(ServiceError::Conflict {
            block_id: id.to_string(),
            expected: expected_version,
            actual: stored,
        });
    }
    let (Some(version), Some(name)) = (source.library_version, source.library_display_name) else {
        return Err(ServiceError::NotFound(upstream_ref.to_string()));
    };

    sqlx::query(
        "UPDATE blocks SET display_name = ?, version_synced = ?, has_changes = 1, edited_on = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(version)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(version.max(0) as u64)
}

/// Copy `source_id` and its subtree right after the source under `parent_id`.
#[instrument(skip_all)]
pub async fn duplicate_subtree(pool: &Pool, source_id: &str, parent_id: &str) -> Result<BlockId> {
    let rows = load_subtree(pool, source_id).await?;
    let root = rows
        .iter()
        .find(|r| r.id == source_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(source_id.to_string()))?;
    if root.parent_id != parent_id {
        return Err(ServiceError::Invalid(format!(
            "{source_id} is not a child of {parent_id}"
        )));
    }

    let mut new_ids: HashMap<String, String> = HashMap::new();
    for row in &rows {
        let category = Category::parse(&row.category).unwrap_or(Category::Unit);
        let new_id = match BlockKey::parse(&row.id) {
            Some(key) => key.sibling(category),
            None => format!("{}-{}", row.id, Uuid::new_v4().simple()),
        };
        new_ids.insert(row.id.clone(), new_id);
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE blocks SET position = position + 1 WHERE parent_id = ? AND position > ?")
        .bind(parent_id)
        .bind(root.position)
        .execute(&mut *tx)
        .await?;

    for row in &rows {
        let is_root = row.id == root.id;
        let mut node = row.to_node()?;
        node.id = new_ids[&row.id].clone();
        node.published = false;
        node.has_changes = true;
        node.visibility_state = VisibilityState::Unscheduled;
        let (parent, position) = if is_root {
            node.display_name = format!("Duplicate of {}", row.display_name);
            (parent_id.to_string(), root.position + 1)
        } else {
            let parent = new_ids
                .get(&row.parent_id)
                .cloned()
                .unwrap_or_else(|| row.parent_id.clone());
            (parent, row.position)
        };
        insert_node(&mut tx, &row.course_id, &parent, position, &node).await?;
    }
    tx.commit().await?;

    let new_root = new_ids[&root.id].clone();
    debug!(copied = rows.len(), new_id = %new_root, "subtree duplicated");
    Ok(new_root)
}

#[instrument(skip_all)]
pub async fn delete_subtree(pool: &Pool, id: &str) -> Result<u64> {
    let sql = format!("{SUBTREE_CTE} DELETE FROM blocks WHERE id IN (SELECT id FROM subtree)");
    let res = sqlx::query(&sql).bind(id).execute(pool).await?;
    if res.rows_affected() == 0 {
        return Err(ServiceError::NotFound(id.to_string()));
    }
    Ok(res.rows_affected())
}

/// Publish the block and its descendants. Staff-only content stays staff-only.
#[instrument(skip_all)]
pub async fn publish_subtree(pool: &Pool, id: &str) -> Result<u64> {
    let sql = format!(
        "{SUBTREE_CTE} UPDATE blocks SET published = 1, has_changes = 0, \
         visibility_state = CASE WHEN visibility_state = 'staff_only' THEN 'staff_only' ELSE 'live' END \
         WHERE id IN (SELECT id FROM subtree)"
    );
    let res = sqlx::query(&sql).bind(id).execute(pool).await?;
    if res.rows_affected() == 0 {
        return Err(ServiceError::NotFound(id.to_string()));
    }
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::prepare_sqlite_url;

    #[test]
    fn memory_url_untouched() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn file_url_gets_create_mode() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/outline.db");
        let url = prepare_sqlite_url(&format!("sqlite://{}", path.display()));
        assert_eq!(url, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn explicit_query_is_kept() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("o.db");
        let url = prepare_sqlite_url(&format!("sqlite:{}?mode=ro", path.display()));
        assert_eq!(url, format!("sqlite://{}?mode=ro", path.display()));
    }
}
