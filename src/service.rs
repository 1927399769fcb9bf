//! Collaborator contracts consumed by the outline engine.
use async_trait::async_trait;

use crate::error::ServiceError;
use crate::model::{BlockId, CourseOutline, OutlineNode};

/// Backend that owns all durable outline state.
#[async_trait]
pub trait StudioService: Send + Sync {
    async fn fetch_outline(&self, course_id: &str) -> Result<CourseOutline, ServiceError>;

    /// Fetch one section with its whole subtree.
    async fn fetch_section(&self, section_id: &str) -> Result<OutlineNode, ServiceError>;

    async fn persist_title_edit(
        &self,
        node_id: &str,
        parent_id: &str,
        new_title: &str,
    ) -> Result<(), ServiceError>;

    async fn apply_reorder(
        &self,
        parent_id: &str,
        ordered_child_ids: &[BlockId],
    ) -> Result<(), ServiceError>;

    /// Pull upstream content into `downstream_id`. The backend must reject the
    /// call with `ServiceError::Conflict` if `expected_version` is stale.
    async fn apply_sync(
        &self,
        downstream_id: &str,
        upstream_ref: &str,
        expected_version: u64,
    ) -> Result<(), ServiceError>;

    /// Returns the id of the copy.
    async fn duplicate(&self, node_id: &str, parent_id: &str) -> Result<BlockId, ServiceError>;

    async fn delete(&self, node_id: &str) -> Result<(), ServiceError>;

    async fn publish(&self, node_id: &str) -> Result<(), ServiceError>;
}

/// The refresh callback contract: refetch and replace, then hand back the
/// authoritative data.
#[async_trait]
pub trait PostChangeRefresh: Send {
    /// Refetch a section. `scroll` marks the refetched section for scroll-into-view.
    async fn refresh_section(
        &mut self,
        section_id: &str,
        scroll: bool,
    ) -> Result<OutlineNode, ServiceError>;

    /// Refetch the whole outline. `scroll_to` marks that section for scroll-into-view.
    async fn refresh_outline(
        &mut self,
        scroll_to: Option<&str>,
    ) -> Result<CourseOutline, ServiceError>;
}

/// Port for the "currently selected" item, section and subsection.
pub trait SelectionPort {
    fn set_current_item(&mut self, node: &OutlineNode);
    fn set_current_section(&mut self, section: &OutlineNode);
    fn set_current_subsection(&mut self, subsection: Option<&OutlineNode>);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    pub item: Option<BlockId>,
    pub section: Option<BlockId>,
    pub subsection: Option<BlockId>,
}

impl SelectionPort for Selection {
    fn set_current_item(&mut self, node: &OutlineNode) {
        self.item = Some(node.id.clone());
    }

    fn set_current_section(&mut self, section: &OutlineNode) {
        self.section = Some(section.id.clone());
    }

    fn set_current_subsection(&mut self, subsection: Option<&OutlineNode>) {
        self.subsection = subsection.map(|s| s.id.clone());
    }
}
