//! Outline tree: nodes, their authorization flags and position lookup.
use serde::{Deserialize, Serialize};

/// Usage key of a block (`block-v1:...`), or the course key for the outline root.
pub type BlockId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[serde(alias = "chapter")]
    Section,
    #[serde(alias = "sequential")]
    Subsection,
    #[serde(alias = "vertical")]
    Unit,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Section => "section",
            Category::Subsection => "subsection",
            Category::Unit => "unit",
        }
    }

    /// Block type as it appears inside usage keys and on the wire.
    pub fn block_type(&self) -> &'static str {
        match self {
            Category::Section => "chapter",
            Category::Subsection => "sequential",
            Category::Unit => "vertical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "section" | "chapter" => Some(Category::Section),
            "subsection" | "sequential" => Some(Category::Subsection),
            "unit" | "vertical" => Some(Category::Unit),
            _ => None,
        }
    }
}

/// Server-derived visibility. Treated as ground truth; never recomputed here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(from = "String", into = "String")]
pub enum VisibilityState {
    Live,
    Ready,
    NeedsAttention,
    StaffOnly,
    Hidden,
    #[default]
    Unscheduled,
    Gated,
    /// Any value this crate does not know about; classified as an opaque discriminant.
    Other,
}

impl From<String> for VisibilityState {
    fn from(value: String) -> Self {
        VisibilityState::parse(&value)
    }
}

impl From<VisibilityState> for String {
    fn from(value: VisibilityState) -> Self {
        value.as_str().to_string()
    }
}

impl VisibilityState {
    pub const ALL: [VisibilityState; 8] = [
        VisibilityState::Live,
        VisibilityState::Ready,
        VisibilityState::NeedsAttention,
        VisibilityState::StaffOnly,
        VisibilityState::Hidden,
        VisibilityState::Unscheduled,
        VisibilityState::Gated,
        VisibilityState::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityState::Live => "live",
            VisibilityState::Ready => "ready",
            VisibilityState::NeedsAttention => "needs_attention",
            VisibilityState::StaffOnly => "staff_only",
            VisibilityState::Hidden => "hide_from_toc",
            VisibilityState::Unscheduled => "unscheduled",
            VisibilityState::Gated => "gated",
            VisibilityState::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "live" => VisibilityState::Live,
            "ready" => VisibilityState::Ready,
            "needs_attention" => VisibilityState::NeedsAttention,
            "staff_only" => VisibilityState::StaffOnly,
            "hide_from_toc" | "hidden" => VisibilityState::Hidden,
            "unscheduled" => VisibilityState::Unscheduled,
            "gated" => VisibilityState::Gated,
            _ => VisibilityState::Other,
        }
    }
}

/// Authorization flags as delivered by the server. Never mutated locally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Actions {
    #[serde(default)]
    pub deletable: bool,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default)]
    pub child_addable: bool,
    #[serde(default)]
    pub duplicable: bool,
}

impl Actions {
    pub fn all() -> Self {
        Self {
            deletable: true,
            draggable: true,
            child_addable: true,
            duplicable: true,
        }
    }
}

/// Link from a course-local block to the library block it was copied from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamInfo {
    pub ready_to_sync: bool,
    pub upstream_ref: String,
    pub version_synced: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutlineNode {
    pub id: BlockId,
    pub category: Category,
    pub display_name: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub visibility_state: VisibilityState,
    #[serde(default)]
    pub actions: Actions,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub should_scroll: bool,
    #[serde(default)]
    pub graded: bool,
    #[serde(default)]
    pub is_time_limited: bool,
    #[serde(default = "default_true")]
    pub is_header_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_info: Option<UpstreamInfo>,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(id: impl Into<BlockId>, category: Category, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            display_name: display_name.into(),
            published: false,
            has_changes: false,
            visibility_state: VisibilityState::default(),
            actions: Actions::all(),
            should_scroll: false,
            graded: false,
            is_time_limited: false,
            is_header_visible: true,
            upstream_info: None,
            children: Vec::new(),
        }
    }

    /// Depth-first search of this node and its descendants.
    pub fn find(&self, id: &str) -> Option<&OutlineNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Library-linked blocks cannot be renamed locally.
    pub fn is_read_only(&self) -> bool {
        self.upstream_info
            .as_ref()
            .is_some_and(|info| !info.upstream_ref.is_empty())
    }
}

/// Display-only flags inherited from the immediate parent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParentInfo {
    pub graded: bool,
    pub is_time_limited: bool,
}

impl ParentInfo {
    pub fn from_parent(parent: Option<&OutlineNode>) -> Self {
        parent
            .map(|p| Self {
                graded: p.graded,
                is_time_limited: p.is_time_limited,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CourseOutline {
    pub course_id: BlockId,
    pub sections: Vec<OutlineNode>,
}

/// Where a node sits in the tree: everything a controller needs to derive its view.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub course_id: &'a str,
    pub section: &'a OutlineNode,
    /// `None` for sections, whose parent is the course itself.
    pub parent: Option<&'a OutlineNode>,
    pub siblings: &'a [OutlineNode],
    pub index: usize,
}

impl<'a> NodeContext<'a> {
    pub fn node(&self) -> &'a OutlineNode {
        &self.siblings[self.index]
    }

    pub fn parent_id(&self) -> &'a str {
        self.parent.map(|p| p.id.as_str()).unwrap_or(self.course_id)
    }

    /// Locate `id` inside a single section subtree.
    pub fn locate_in_section(
        course_id: &'a str,
        sections: &'a [OutlineNode],
        section: &'a OutlineNode,
        id: &str,
    ) -> Option<Self> {
        if section.id == id {
            let index = sections.iter().position(|s| s.id == id)?;
            return Some(Self {
                course_id,
                section,
                parent: None,
                siblings: sections,
                index,
            });
        }
        fn walk<'b>(
            course_id: &'b str,
            section: &'b OutlineNode,
            parent: &'b OutlineNode,
            id: &str,
        ) -> Option<NodeContext<'b>> {
            if let Some(index) = parent.children.iter().position(|c| c.id == id) {
                return Some(NodeContext {
                    course_id,
                    section,
                    parent: Some(parent),
                    siblings: &parent.children,
                    index,
                });
            }
            parent
                .children
                .iter()
                .find_map(|child| walk(course_id, section, child, id))
        }
        walk(course_id, section, section, id)
    }
}

impl CourseOutline {
    pub fn section(&self, id: &str) -> Option<&OutlineNode> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&OutlineNode> {
        self.sections.iter().find_map(|s| s.find(id))
    }

    pub fn context(&self, id: &str) -> Option<NodeContext<'_>> {
        self.sections.iter().find_map(|section| {
            NodeContext::locate_in_section(&self.course_id, &self.sections, section, id)
        })
    }

    /// Replace a section wholesale. Returns false when the section is unknown.
    pub fn replace_section(&mut self, section: OutlineNode) -> bool {
        match self.sections.iter_mut().find(|s| s.id == section.id) {
            Some(slot) => {
                *slot = section;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline() -> CourseOutline {
        let mut section = OutlineNode::new("s1", Category::Section, "Section");
        let mut sub = OutlineNode::new("ss1", Category::Subsection, "Subsection");
        sub.graded = true;
        sub.children = vec![
            OutlineNode::new("u1", Category::Unit, "One"),
            OutlineNode::new("u2", Category::Unit, "Two"),
        ];
        section.children = vec![sub];
        CourseOutline {
            course_id: "course-v1:Org+C+R".into(),
            sections: vec![section, OutlineNode::new("s2", Category::Section, "Other")],
        }
    }

    #[test]
    fn context_for_unit_points_at_subsection() {
        let outline = outline();
        let ctx = outline.context("u2").unwrap();
        assert_eq!(ctx.index, 1);
        assert_eq!(ctx.parent_id(), "ss1");
        assert_eq!(ctx.section.id, "s1");
        assert_eq!(ctx.node().display_name, "Two");
        assert!(ParentInfo::from_parent(ctx.parent).graded);
    }

    #[test]
    fn context_for_section_uses_course_as_parent() {
        let outline = outline();
        let ctx = outline.context("s2").unwrap();
        assert_eq!(ctx.index, 1);
        assert_eq!(ctx.parent_id(), "course-v1:Org+C+R");
        assert!(ctx.parent.is_none());
    }

    #[test]
    fn wire_aliases_and_unknown_visibility() {
        let node: OutlineNode = serde_json::from_str(
            r#"{"id":"u","category":"vertical","display_name":"U","published":true,
                "has_changes":false,"visibility_state":"something_new"}"#,
        )
        .unwrap();
        assert_eq!(node.category, Category::Unit);
        assert_eq!(node.visibility_state, VisibilityState::Other);
        assert!(node.is_header_visible);
        assert!(node.children.is_empty());
    }

    #[test]
    fn replace_section_is_wholesale() {
        let mut outline = outline();
        let fresh = OutlineNode::new("s1", Category::Section, "Renamed");
        assert!(outline.replace_section(fresh));
        assert!(outline.find("u1").is_none());
        assert!(!outline.replace_section(OutlineNode::new("zz", Category::Section, "x")));
    }
}
