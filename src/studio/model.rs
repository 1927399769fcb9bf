use serde::Deserialize;

use crate::error::ServiceError;
use crate::model::{Actions, Category, CourseOutline, OutlineNode, UpstreamInfo, VisibilityState};

#[derive(Deserialize, Debug, Default)]
pub struct WireActions {
    #[serde(default)]
    pub deletable: bool,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default, alias = "childAddable")]
    pub child_addable: bool,
    #[serde(default)]
    pub duplicable: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct ChildInfo {
    #[serde(default)]
    pub children: Vec<XBlockOutline>,
}

#[derive(Deserialize, Debug)]
pub struct WireUpstreamInfo {
    #[serde(default)]
    pub ready_to_sync: bool,
    #[serde(default)]
    pub upstream_ref: Option<String>,
    #[serde(default)]
    pub version_synced: Option<u64>,
}

/// One block of the outline as the authoring API returns it.
#[derive(Deserialize, Debug)]
pub struct XBlockOutline {
    pub id: String,
    pub display_name: String,
    pub category: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub visibility_state: Option<String>,
    #[serde(default)]
    pub actions: Option<WireActions>,
    #[serde(default)]
    pub graded: bool,
    #[serde(default)]
    pub is_time_limited: bool,
    #[serde(default)]
    pub is_header_visible: Option<bool>,
    #[serde(default)]
    pub child_info: Option<ChildInfo>,
    #[serde(default)]
    pub upstream_info: Option<WireUpstreamInfo>,
}

#[derive(Deserialize, Debug)]
pub struct CourseIndexResp {
    pub course_structure: XBlockOutline,
}

#[derive(Deserialize, Debug)]
pub struct DuplicateResp {
    pub locator: String,
}

impl TryFrom<XBlockOutline> for OutlineNode {
    type Error = ServiceError;

    fn try_from(wire: XBlockOutline) -> Result<Self, Self::Error> {
        let category = Category::parse(&wire.category).ok_or_else(|| {
            ServiceError::Invalid(format!("unexpected category '{}' for {}", wire.category, wire.id))
        })?;
        let actions = wire
            .actions
            .map(|a| Actions {
                deletable: a.deletable,
                draggable: a.draggable,
                child_addable: a.child_addable,
                duplicable: a.duplicable,
            })
            .unwrap_or_default();
        // A block whose upstream link was severed still reports the struct with a null ref.
        let upstream_info = wire.upstream_info.and_then(|u| {
            let upstream_ref = u.upstream_ref.filter(|r| !r.is_empty())?;
            Some(UpstreamInfo {
                ready_to_sync: u.ready_to_sync,
                upstream_ref,
                version_synced: u.version_synced.unwrap_or(0),
            })
        });
        let children = wire
            .child_info
            .map(|c| c.children)
            .unwrap_or_default()
            .into_iter()
            .map(OutlineNode::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OutlineNode {
            id: wire.id,
            category,
            display_name: wire.display_name,
            published: wire.published,
            has_changes: wire.has_changes,
            visibility_state: wire
                .visibility_state
                .as_deref()
                .map(VisibilityState::parse)
                .unwrap_or_default(),
            actions,
            should_scroll: false,
            graded: wire.graded,
            is_time_limited: wire.is_time_limited,
            is_header_visible: wire.is_header_visible.unwrap_or(true),
            upstream_info,
            children,
        })
    }
}

impl CourseIndexResp {
    pub fn into_outline(self, course_id: &str) -> Result<CourseOutline, ServiceError> {
        let sections = self
            .course_structure
            .child_info
            .map(|c| c.children)
            .unwrap_or_default()
            .into_iter()
            .map(OutlineNode::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CourseOutline {
            course_id: course_id.to_string(),
            sections,
        })
    }
}
