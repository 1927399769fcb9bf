//! Per-node controller: status, moves and sync for one outline card, plus the
//! operations the presentation layer invokes on it.
//!
//! Every mutating operation holds `&mut self` across its awaits, so a node
//! never has two requests in flight. Each successful mutation ends in an
//! authoritative refetch through [`PostChangeRefresh`]; the controller never
//! patches node data locally.
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{OutlineError, ServiceError};
use crate::model::{Actions, BlockId, Category, NodeContext, OutlineNode, ParentInfo};
use crate::moves::{Direction, MoveCalculator, MoveDetails};
use crate::service::{PostChangeRefresh, SelectionPort, StudioService};
use crate::status::{item_status, BorderStyle, ItemStatus, StatusInput};
use crate::sync::{SyncAffordance, SyncRequest, SyncState, SyncStateMachine};

/// Authorization flags plus the move affordances derived for this render.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct NodeActions {
    pub deletable: bool,
    pub draggable: bool,
    pub child_addable: bool,
    pub duplicable: bool,
    pub allow_move_up: bool,
    pub allow_move_down: bool,
}

impl NodeActions {
    pub fn derive(actions: &Actions, allow_move_up: bool, allow_move_down: bool) -> Self {
        Self {
            deletable: actions.deletable,
            draggable: actions.draggable,
            child_addable: actions.child_addable,
            duplicable: actions.duplicable,
            allow_move_up,
            allow_move_down,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeView {
    pub id: BlockId,
    pub category: Category,
    pub title: String,
    pub status: ItemStatus,
    pub border: BorderStyle,
    pub has_changes: bool,
    pub actions: NodeActions,
    pub is_draggable: bool,
    pub is_droppable: bool,
    pub parent_info: ParentInfo,
    pub read_only: bool,
    pub edit_open: bool,
    pub edit_disabled: bool,
    pub ready_to_sync: bool,
    pub sync_affordance: SyncAffordance,
    pub highlight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAlign {
    /// Deep-link focus: align with the top of the viewport.
    Top,
    /// Freshly created content: scroll just enough to reveal it.
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavingStatus {
    #[default]
    Idle,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Title identical to the current one; surface closed, nothing sent.
    Unchanged,
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No sync was pending confirmation.
    Skipped,
    Synced,
}

#[derive(Debug, Clone)]
pub struct OutlineNodeController {
    course_id: BlockId,
    node: OutlineNode,
    section: OutlineNode,
    subsection: Option<OutlineNode>,
    parent_id: BlockId,
    parent_info: ParentInfo,
    move_up: Option<MoveDetails>,
    move_down: Option<MoveDetails>,
    sync: SyncStateMachine,
    edit_open: bool,
    saving: SavingStatus,
    scroll_key: Option<Option<BlockId>>,
    removed: bool,
}

impl OutlineNodeController {
    pub fn new(ctx: NodeContext<'_>) -> Self {
        let node = ctx.node();
        let mut controller = Self {
            course_id: ctx.course_id.to_string(),
            node: node.clone(),
            section: ctx.section.clone(),
            subsection: None,
            parent_id: String::new(),
            parent_info: ParentInfo::default(),
            move_up: None,
            move_down: None,
            sync: SyncStateMachine::new(node, ctx.section.id.clone()),
            edit_open: false,
            saving: SavingStatus::Idle,
            scroll_key: None,
            removed: false,
        };
        controller.apply_context(ctx);
        controller
    }

    fn apply_context(&mut self, ctx: NodeContext<'_>) {
        let node = ctx.node();
        let calc = MoveCalculator::new(ctx.siblings);
        self.move_up = calc.possible_moves(ctx.index, Direction::Up);
        self.move_down = calc.possible_moves(ctx.index, Direction::Down);
        self.parent_id = ctx.parent_id().to_string();
        self.parent_info = ParentInfo::from_parent(ctx.parent);
        self.subsection = match node.category {
            Category::Unit => ctx.parent.cloned(),
            Category::Subsection => Some(node.clone()),
            Category::Section => None,
        };
        self.section = ctx.section.clone();
        self.node = node.clone();
    }

    /// Re-derive from a refetched tree. Edit surface, scroll key and in-flight
    /// sync state survive.
    pub fn rebind(&mut self, ctx: NodeContext<'_>) {
        let node = ctx.node();
        if *self.sync.state() == SyncState::Refreshing {
            self.sync.refresh_resolved(Some(node));
        } else {
            self.sync.observe(node);
        }
        self.apply_context(ctx);
        self.removed = false;
    }

    fn mark_removed(&mut self) {
        self.sync.refresh_resolved(None);
        self.edit_open = false;
        self.removed = true;
    }

    pub fn node(&self) -> &OutlineNode {
        &self.node
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn section_id(&self) -> &str {
        &self.section.id
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn parent_info(&self) -> ParentInfo {
        self.parent_info
    }

    pub fn sync_state(&self) -> &SyncState {
        self.sync.state()
    }

    pub fn saving_status(&self) -> SavingStatus {
        self.saving
    }

    /// True once a refetch no longer contains this node.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn status(&self) -> ItemStatus {
        item_status(StatusInput::from(&self.node))
    }

    pub fn possible_move(&self, direction: Direction) -> Option<&MoveDetails> {
        match direction {
            Direction::Up => self.move_up.as_ref(),
            Direction::Down => self.move_down.as_ref(),
        }
    }

    /// Render model for the card. `None` when the header is hidden.
    pub fn view(&self, focus: Option<&str>) -> Option<NodeView> {
        if !self.node.is_header_visible {
            return None;
        }
        let status = self.status();
        let actions = NodeActions::derive(
            &self.node.actions,
            self.move_up.is_some(),
            self.move_down.is_some(),
        );
        let read_only = self.node.is_read_only();
        Some(NodeView {
            id: self.node.id.clone(),
            category: self.node.category,
            title: self.node.display_name.clone(),
            status,
            border: status.border(),
            has_changes: self.node.has_changes,
            is_draggable: actions.draggable && (actions.allow_move_up || actions.allow_move_down),
            is_droppable: actions.child_addable,
            actions,
            parent_info: self.parent_info,
            read_only,
            edit_open: self.edit_open,
            edit_disabled: read_only || self.saving == SavingStatus::InProgress,
            ready_to_sync: self
                .node
                .upstream_info
                .as_ref()
                .is_some_and(|i| i.ready_to_sync),
            sync_affordance: self.sync.affordance(),
            highlight: focus == Some(self.node.id.as_str()),
        })
    }

    /// Evaluated on every render; fires only when the focus input changed
    /// since the previous evaluation.
    pub fn scroll_request(&mut self, focus: Option<&str>) -> Option<ScrollAlign> {
        let key = focus.map(str::to_owned);
        if self.scroll_key.as_ref() == Some(&key) {
            return None;
        }
        self.scroll_key = Some(key);
        if focus == Some(self.node.id.as_str()) {
            Some(ScrollAlign::Top)
        } else if self.node.should_scroll || self.section.should_scroll {
            Some(ScrollAlign::Nearest)
        } else {
            None
        }
    }

    pub fn select(&self, port: &mut dyn SelectionPort) {
        port.set_current_item(&self.node);
        port.set_current_section(&self.section);
        port.set_current_subsection(self.subsection.as_ref());
    }

    pub fn open_edit(&mut self) {
        self.edit_open = true;
    }

    pub fn close_edit(&mut self) {
        self.edit_open = false;
    }

    #[instrument(skip_all, fields(id = %self.node.id))]
    pub async fn submit_title(
        &mut self,
        title: &str,
        service: &dyn StudioService,
        refresher: &mut dyn PostChangeRefresh,
    ) -> Result<EditOutcome, OutlineError> {
        if title == self.node.display_name {
            self.edit_open = false;
            return Ok(EditOutcome::Unchanged);
        }
        if title.trim().is_empty() {
            return Err(OutlineError::ValidationRejected("title must be non-empty".into()));
        }
        if self.node.is_read_only() {
            return Err(OutlineError::ValidationRejected(format!(
                "{} is linked to a library and cannot be renamed",
                self.node.id
            )));
        }

        self.saving = SavingStatus::InProgress;
        if let Err(source) = service
            .persist_title_edit(&self.node.id, &self.section.id, title)
            .await
        {
            self.saving = SavingStatus::Failed;
            warn!(?source, "title edit failed");
            return Err(self.persistence("rename", source));
        }
        self.saving = SavingStatus::Succeeded;
        self.edit_open = false;
        info!(title, "title edit saved");
        self.refetch(refresher, None).await?;
        Ok(EditOutcome::Saved)
    }

    #[instrument(skip_all, fields(id = %self.node.id, direction = %direction))]
    pub async fn move_node(
        &mut self,
        direction: Direction,
        service: &dyn StudioService,
        refresher: &mut dyn PostChangeRefresh,
    ) -> Result<MoveDetails, OutlineError> {
        let Some(details) = self.possible_move(direction).cloned() else {
            return Err(OutlineError::MoveIllegal {
                id: self.node.id.clone(),
                direction,
            });
        };
        if let Err(source) = service
            .apply_reorder(&self.parent_id, &details.ordered_ids)
            .await
        {
            warn!(?source, "reorder failed");
            return Err(self.persistence("reorder", source));
        }
        info!(from = details.from, to = details.to, "reordered");
        self.refetch(refresher, None).await?;
        Ok(details)
    }

    pub fn open_sync(&mut self) -> Option<&SyncRequest> {
        self.sync.open_modal()
    }

    pub fn cancel_sync(&mut self) {
        self.sync.cancel();
    }

    /// Dispatch the sync confirmed in the modal. Exactly one refetch of the
    /// containing section follows a successful sync; none follows a failure.
    #[instrument(skip_all, fields(id = %self.node.id))]
    pub async fn confirm_sync(
        &mut self,
        service: &dyn StudioService,
        refresher: &mut dyn PostChangeRefresh,
    ) -> Result<SyncOutcome, OutlineError> {
        let Some(request) = self.sync.confirm() else {
            return Ok(SyncOutcome::Skipped);
        };
        info!(
            upstream = %request.upstream_block_id,
            version = request.upstream_block_version_synced,
            "applying upstream changes"
        );
        if let Err(source) = service
            .apply_sync(
                &request.downstream_block_id,
                &request.upstream_block_id,
                request.upstream_block_version_synced,
            )
            .await
        {
            self.sync.sync_failed();
            warn!(?source, "sync failed");
            if source.is_conflict() {
                return Err(OutlineError::SyncConflict {
                    id: self.node.id.clone(),
                    source,
                });
            }
            return Err(self.persistence("sync", source));
        }
        if self.sync.sync_succeeded().is_none() {
            return Ok(SyncOutcome::Skipped);
        }
        self.refetch(refresher, None).await?;
        Ok(SyncOutcome::Synced)
    }

    #[instrument(skip_all, fields(id = %self.node.id))]
    pub async fn duplicate(
        &mut self,
        service: &dyn StudioService,
        refresher: &mut dyn PostChangeRefresh,
    ) -> Result<BlockId, OutlineError> {
        if !self.node.actions.duplicable {
            return Err(self.not_permitted("duplicate"));
        }
        let new_id = service
            .duplicate(&self.node.id, &self.parent_id)
            .await
            .map_err(|source| self.persistence("duplicate", source))?;
        info!(%new_id, "duplicated");
        self.refetch(refresher, Some(&new_id)).await?;
        Ok(new_id)
    }

    /// Delete the node. On success the controller reports `is_removed()`.
    #[instrument(skip_all, fields(id = %self.node.id))]
    pub async fn delete(
        &mut self,
        service: &dyn StudioService,
        refresher: &mut dyn PostChangeRefresh,
    ) -> Result<(), OutlineError> {
        if !self.node.actions.deletable {
            return Err(self.not_permitted("delete"));
        }
        service
            .delete(&self.node.id)
            .await
            .map_err(|source| self.persistence("delete", source))?;
        info!("deleted");
        self.refetch(refresher, None).await
    }

    #[instrument(skip_all, fields(id = %self.node.id))]
    pub async fn publish(
        &mut self,
        service: &dyn StudioService,
        refresher: &mut dyn PostChangeRefresh,
    ) -> Result<(), OutlineError> {
        service
            .publish(&self.node.id)
            .await
            .map_err(|source| self.persistence("publish", source))?;
        info!("published");
        self.refetch(refresher, None).await
    }

    /// Sections refetch the whole outline (their siblings are other sections);
    /// everything else refetches its containing section. `created` is a block
    /// the mutation just made, to be scrolled into view.
    async fn refetch(
        &mut self,
        refresher: &mut dyn PostChangeRefresh,
        created: Option<&str>,
    ) -> Result<(), OutlineError> {
        let course_id = self.course_id.clone();
        let section_id = self.section.id.clone();
        let id = self.node.id.clone();
        if self.node.category == Category::Section {
            match refresher.refresh_outline(created).await {
                Ok(outline) => match outline.context(&id) {
                    Some(ctx) => self.rebind(ctx),
                    None => self.mark_removed(),
                },
                Err(source) => return Err(self.refresh_failed(source)),
            }
        } else {
            match refresher.refresh_section(&section_id, created.is_some()).await {
                Ok(section) => {
                    let sections = std::slice::from_ref(&section);
                    match NodeContext::locate_in_section(&course_id, sections, &section, &id) {
                        Some(ctx) => self.rebind(ctx),
                        None => self.mark_removed(),
                    }
                }
                Err(source) => return Err(self.refresh_failed(source)),
            }
        }
        Ok(())
    }

    fn refresh_failed(&mut self, source: ServiceError) -> OutlineError {
        self.sync.refresh_failed();
        warn!(?source, section_id = %self.section.id, "refresh failed; node left stale");
        OutlineError::RefreshFailure {
            section_id: self.section.id.clone(),
            source,
        }
    }

    fn persistence(&self, action: &'static str, source: ServiceError) -> OutlineError {
        OutlineError::PersistenceFailure {
            action,
            id: self.node.id.clone(),
            source,
        }
    }

    fn not_permitted(&self, action: &'static str) -> OutlineError {
        OutlineError::NotPermitted {
            action,
            id: self.node.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseOutline, UpstreamInfo};
    use crate::service::Selection;

    fn course(unit_count: usize) -> CourseOutline {
        let mut section = OutlineNode::new("s1", Category::Section, "Section 1");
        let mut sub = OutlineNode::new("ss1", Category::Subsection, "Subsection 1");
        sub.graded = true;
        sub.is_time_limited = true;
        sub.children = (0..unit_count)
            .map(|i| OutlineNode::new(format!("u{i}"), Category::Unit, format!("Unit {i}")))
            .collect();
        section.children = vec![sub];
        CourseOutline {
            course_id: "course-v1:Org+C+R".into(),
            sections: vec![section],
        }
    }

    #[test]
    fn middle_of_three_published_live() {
        let mut outline = course(3);
        {
            let u1 = &mut outline.sections[0].children[0].children[1];
            u1.published = true;
            u1.has_changes = false;
            u1.visibility_state = crate::model::VisibilityState::Live;
        }
        let controller = OutlineNodeController::new(outline.context("u1").unwrap());
        let view = controller.view(None).unwrap();
        assert!(view.actions.allow_move_up);
        assert!(view.actions.allow_move_down);
        assert!(view.is_draggable);
        assert_eq!(view.status, ItemStatus::Live);
        assert_eq!(view.status.as_str(), "published-live");
        assert_eq!(view.parent_info, ParentInfo { graded: true, is_time_limited: true });
    }

    #[test]
    fn single_unit_cannot_move_regardless_of_flags() {
        let outline = course(1);
        let controller = OutlineNodeController::new(outline.context("u0").unwrap());
        let view = controller.view(None).unwrap();
        assert!(view.actions.draggable);
        assert!(!view.actions.allow_move_up);
        assert!(!view.actions.allow_move_down);
        assert!(!view.is_draggable);
    }

    #[test]
    fn derived_actions_leave_authorization_untouched() {
        let outline = course(3);
        let controller = OutlineNodeController::new(outline.context("u0").unwrap());
        let _ = controller.view(None);
        assert_eq!(controller.node().actions, Actions::all());
        assert_eq!(outline.find("u0").unwrap().actions, Actions::all());
    }

    #[test]
    fn hidden_header_renders_nothing() {
        let mut outline = course(2);
        outline.sections[0].children[0].children[0].is_header_visible = false;
        let controller = OutlineNodeController::new(outline.context("u0").unwrap());
        assert!(controller.view(None).is_none());
    }

    #[test]
    fn scroll_fires_once_per_focus_value() {
        let outline = course(2);
        let mut controller = OutlineNodeController::new(outline.context("u1").unwrap());
        assert_eq!(controller.scroll_request(None), None);
        assert_eq!(controller.scroll_request(Some("u1")), Some(ScrollAlign::Top));
        assert_eq!(controller.scroll_request(Some("u1")), None);
        assert!(controller.view(Some("u1")).unwrap().highlight);
        assert_eq!(controller.scroll_request(Some("u0")), None);
    }

    #[test]
    fn fresh_content_scrolls_to_nearest() {
        let mut outline = course(2);
        outline.sections[0].should_scroll = true;
        let mut controller = OutlineNodeController::new(outline.context("u0").unwrap());
        assert_eq!(controller.scroll_request(None), Some(ScrollAlign::Nearest));
        // unrelated re-render with the same focus input
        assert_eq!(controller.scroll_request(None), None);
    }

    #[test]
    fn select_records_item_section_and_subsection() {
        let outline = course(2);
        let controller = OutlineNodeController::new(outline.context("u1").unwrap());
        let mut selection = Selection::default();
        controller.select(&mut selection);
        assert_eq!(selection.item.as_deref(), Some("u1"));
        assert_eq!(selection.section.as_deref(), Some("s1"));
        assert_eq!(selection.subsection.as_deref(), Some("ss1"));
    }

    #[test]
    fn linked_unit_is_read_only_and_offers_sync() {
        let mut outline = course(1);
        outline.sections[0].children[0].children[0].upstream_info = Some(UpstreamInfo {
            ready_to_sync: true,
            upstream_ref: "lb:Org:lib:unit:1".into(),
            version_synced: 2,
        });
        let mut controller = OutlineNodeController::new(outline.context("u0").unwrap());
        let view = controller.view(None).unwrap();
        assert!(view.read_only);
        assert!(view.edit_disabled);
        assert!(view.ready_to_sync);
        assert_eq!(view.sync_affordance, SyncAffordance::Enabled);
        assert_eq!(
            controller.open_sync().map(|r| r.upstream_block_version_synced),
            Some(2)
        );
    }
}
