//! Upstream→downstream sync state machine for library-linked units.
//!
//! The machine itself performs no I/O. Each transition that needs the outside
//! world hands back what to do (the request to dispatch, the section to
//! refetch); the controller executes it and reports the result back.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{BlockId, OutlineNode, UpstreamInfo};

/// Value object shown in the confirmation modal and dispatched on confirm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub display_name: String,
    pub downstream_block_id: BlockId,
    pub upstream_block_id: String,
    pub upstream_block_version_synced: u64,
    pub is_vertical: bool,
}

impl SyncRequest {
    /// Build a request from a node, if the node is ready to sync.
    pub fn from_node(node: &OutlineNode) -> Option<Self> {
        let info = node.upstream_info.as_ref().filter(|i| i.ready_to_sync)?;
        Some(Self {
            display_name: node.display_name.clone(),
            downstream_block_id: node.id.clone(),
            upstream_block_id: info.upstream_ref.clone(),
            upstream_block_version_synced: info.version_synced,
            is_vertical: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    NotLinked,
    UpToDate,
    SyncAvailable,
    ModalOpen(SyncRequest),
    Syncing(SyncRequest),
    /// Sync applied; waiting for the containing section to be refetched.
    Refreshing,
    /// Sync applied but the refetch failed; the node's data is unconfirmed.
    Stale,
}

impl SyncState {
    fn derive(upstream: Option<&UpstreamInfo>) -> Self {
        match upstream {
            None => SyncState::NotLinked,
            Some(info) if info.ready_to_sync => SyncState::SyncAvailable,
            Some(_) => SyncState::UpToDate,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncState::NotLinked => "not_linked",
            SyncState::UpToDate => "up_to_date",
            SyncState::SyncAvailable => "sync_available",
            SyncState::ModalOpen(_) => "modal_open",
            SyncState::Syncing(_) => "syncing",
            SyncState::Refreshing => "refreshing",
            SyncState::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncAffordance {
    Hidden,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct SyncStateMachine {
    node: OutlineNode,
    section_id: BlockId,
    state: SyncState,
}

impl SyncStateMachine {
    pub fn new(node: &OutlineNode, section_id: impl Into<BlockId>) -> Self {
        Self {
            state: SyncState::derive(node.upstream_info.as_ref()),
            node: node.clone(),
            section_id: section_id.into(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn section_id(&self) -> &str {
        &self.section_id
    }

    pub fn affordance(&self) -> SyncAffordance {
        match self.state {
            SyncState::NotLinked | SyncState::UpToDate => SyncAffordance::Hidden,
            SyncState::SyncAvailable | SyncState::ModalOpen(_) => SyncAffordance::Enabled,
            SyncState::Syncing(_) | SyncState::Refreshing | SyncState::Stale => {
                SyncAffordance::Disabled
            }
        }
    }

    /// The request currently shown in the modal, if any.
    pub fn pending_request(&self) -> Option<&SyncRequest> {
        match &self.state {
            SyncState::ModalOpen(req) | SyncState::Syncing(req) => Some(req),
            _ => None,
        }
    }

    /// User opened the sync affordance. No-op unless a sync is available.
    pub fn open_modal(&mut self) -> Option<&SyncRequest> {
        if self.state != SyncState::SyncAvailable {
            return None;
        }
        let request = SyncRequest::from_node(&self.node)?;
        self.state = SyncState::ModalOpen(request);
        self.pending_request()
    }

    pub fn cancel(&mut self) {
        if matches!(self.state, SyncState::ModalOpen(_)) {
            debug!(id = %self.node.id, "sync cancelled");
            self.state = SyncState::SyncAvailable;
        }
    }

    /// User confirmed inside the modal. Returns the request to dispatch.
    pub fn confirm(&mut self) -> Option<SyncRequest> {
        let SyncState::ModalOpen(request) = &self.state else {
            return None;
        };
        let request = request.clone();
        self.state = SyncState::Syncing(request.clone());
        Some(request)
    }

    /// The backend applied the upstream content. Returns the section to refetch.
    pub fn sync_succeeded(&mut self) -> Option<BlockId> {
        if !matches!(self.state, SyncState::Syncing(_)) {
            return None;
        }
        self.state = SyncState::Refreshing;
        Some(self.section_id.clone())
    }

    /// The backend rejected or failed the sync. Nothing changed server-side.
    pub fn sync_failed(&mut self) {
        if matches!(self.state, SyncState::Syncing(_)) {
            self.state = SyncState::SyncAvailable;
        }
    }

    /// The post-sync refetch came back. `None` means the node is gone.
    pub fn refresh_resolved(&mut self, node: Option<&OutlineNode>) {
        if !matches!(self.state, SyncState::Refreshing | SyncState::Stale) {
            return;
        }
        self.adopt(node);
    }

    pub fn refresh_failed(&mut self) {
        if self.state == SyncState::Refreshing {
            self.state = SyncState::Stale;
        }
    }

    /// A refetch that was not triggered by this machine.
    pub fn observe(&mut self, node: &OutlineNode) {
        match self.state {
            SyncState::Syncing(_) | SyncState::Refreshing => {
                self.node = node.clone();
            }
            SyncState::ModalOpen(_) => {
                self.node = node.clone();
                self.state = match SyncRequest::from_node(node) {
                    Some(request) => SyncState::ModalOpen(request),
                    None => SyncState::derive(node.upstream_info.as_ref()),
                };
            }
            _ => self.adopt(Some(node)),
        }
    }

    fn adopt(&mut self, node: Option<&OutlineNode>) {
        match node {
            Some(node) => {
                self.state = SyncState::derive(node.upstream_info.as_ref());
                self.node = node.clone();
            }
            None => self.state = SyncState::NotLinked,
        }
        debug!(id = %self.node.id, state = self.state.name(), "sync state re-derived");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn linked(ready: bool, version: u64) -> OutlineNode {
        let mut node = OutlineNode::new("u1", Category::Unit, "Linked unit");
        node.upstream_info = Some(UpstreamInfo {
            ready_to_sync: ready,
            upstream_ref: "lib:abc".into(),
            version_synced: version,
        });
        node
    }

    #[test]
    fn derived_states() {
        let plain = OutlineNode::new("u0", Category::Unit, "Plain");
        assert_eq!(SyncStateMachine::new(&plain, "s").state(), &SyncState::NotLinked);
        assert_eq!(SyncStateMachine::new(&linked(false, 1), "s").state(), &SyncState::UpToDate);
        assert_eq!(
            SyncStateMachine::new(&linked(true, 1), "s").state(),
            &SyncState::SyncAvailable
        );
    }

    #[test]
    fn open_is_noop_when_not_ready() {
        let plain = OutlineNode::new("u0", Category::Unit, "Plain");
        let mut m = SyncStateMachine::new(&plain, "s");
        assert!(m.open_modal().is_none());
        assert_eq!(m.affordance(), SyncAffordance::Hidden);
        assert!(m.confirm().is_none());

        let mut m = SyncStateMachine::new(&linked(false, 2), "s");
        assert!(m.open_modal().is_none());
        assert_eq!(m.state(), &SyncState::UpToDate);
        assert_eq!(m.affordance(), SyncAffordance::Hidden);
    }

    #[test]
    fn request_is_built_from_node_fields() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        let req = m.open_modal().unwrap().clone();
        assert_eq!(
            req,
            SyncRequest {
                display_name: "Linked unit".into(),
                downstream_block_id: "u1".into(),
                upstream_block_id: "lib:abc".into(),
                upstream_block_version_synced: 3,
                is_vertical: true,
            }
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["upstreamBlockVersionSynced"], 3);
        assert_eq!(json["isVertical"], true);
    }

    #[test]
    fn cancel_discards_request() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        m.open_modal();
        m.cancel();
        assert_eq!(m.state(), &SyncState::SyncAvailable);
        assert!(m.pending_request().is_none());
    }

    #[test]
    fn success_path_blocks_until_refresh() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "sec-1");
        m.open_modal();
        let req = m.confirm().unwrap();
        assert_eq!(req.upstream_block_version_synced, 3);
        assert_eq!(m.affordance(), SyncAffordance::Disabled);

        assert_eq!(m.sync_succeeded().as_deref(), Some("sec-1"));
        assert_eq!(m.state(), &SyncState::Refreshing);
        assert_eq!(m.affordance(), SyncAffordance::Disabled);
        assert!(m.open_modal().is_none());
        // second success report does not ask for another refresh
        assert!(m.sync_succeeded().is_none());

        m.refresh_resolved(Some(&linked(false, 4)));
        assert_eq!(m.state(), &SyncState::UpToDate);
    }

    #[test]
    fn failure_returns_to_available_without_refresh() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        m.open_modal();
        m.confirm();
        m.sync_failed();
        assert_eq!(m.state(), &SyncState::SyncAvailable);
        assert!(m.sync_succeeded().is_none());
    }

    #[test]
    fn refresh_failure_is_stale_until_observed() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        m.open_modal();
        m.confirm();
        m.sync_succeeded();
        m.refresh_failed();
        assert_eq!(m.state(), &SyncState::Stale);
        assert_eq!(m.affordance(), SyncAffordance::Disabled);
        assert!(m.open_modal().is_none());

        m.observe(&linked(false, 4));
        assert_eq!(m.state(), &SyncState::UpToDate);
    }

    #[test]
    fn observe_during_flight_keeps_state() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        m.open_modal();
        m.confirm();
        m.observe(&linked(false, 4));
        assert!(matches!(m.state(), SyncState::Syncing(_)));
    }

    #[test]
    fn observe_closes_modal_when_no_longer_ready() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        m.open_modal();
        m.observe(&linked(false, 4));
        assert_eq!(m.state(), &SyncState::UpToDate);
    }

    #[test]
    fn refetch_while_modal_open_refreshes_the_request() {
        let mut m = SyncStateMachine::new(&linked(true, 3), "s");
        m.open_modal();
        m.observe(&linked(true, 4));
        assert_eq!(
            m.pending_request().map(|r| r.upstream_block_version_synced),
            Some(4)
        );
        let req = m.confirm().unwrap();
        assert_eq!(req.upstream_block_version_synced, 4);
    }

    #[test]
    fn refetch_can_link_a_plain_node() {
        let plain = OutlineNode::new("u1", Category::Unit, "Plain");
        let mut m = SyncStateMachine::new(&plain, "s");
        m.observe(&linked(true, 1));
        assert_eq!(m.state(), &SyncState::SyncAvailable);
    }
}
