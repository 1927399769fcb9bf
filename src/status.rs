//! Publish/visibility classification of outline nodes.
use serde::{Deserialize, Serialize};

use crate::model::{OutlineNode, VisibilityState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInput {
    pub published: bool,
    pub visibility_state: VisibilityState,
    pub has_changes: bool,
}

impl From<&OutlineNode> for StatusInput {
    fn from(node: &OutlineNode) -> Self {
        Self {
            published: node.published,
            visibility_state: node.visibility_state,
            has_changes: node.has_changes,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Live,
    PublishedNotLive,
    PublishedWithChanges,
    Draft,
    NeverPublished,
    StaffOnly,
    Gated,
    NeedsAttention,
    HiddenFromToc,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Live => "published-live",
            ItemStatus::PublishedNotLive => "published-not-live",
            ItemStatus::PublishedWithChanges => "published-with-changes",
            ItemStatus::Draft => "draft",
            ItemStatus::NeverPublished => "never-published",
            ItemStatus::StaffOnly => "staff-only",
            ItemStatus::Gated => "gated",
            ItemStatus::NeedsAttention => "needs-attention",
            ItemStatus::HiddenFromToc => "hidden-from-toc",
        }
    }

    pub fn border(&self) -> BorderStyle {
        match self {
            ItemStatus::Live => BorderStyle::Live,
            ItemStatus::PublishedNotLive => BorderStyle::Published,
            ItemStatus::StaffOnly | ItemStatus::Gated | ItemStatus::HiddenFromToc => {
                BorderStyle::Restricted
            }
            ItemStatus::PublishedWithChanges | ItemStatus::Draft | ItemStatus::NeedsAttention => {
                BorderStyle::Pending
            }
            ItemStatus::NeverPublished => BorderStyle::None,
        }
    }
}

/// Presentation token for the left border of an outline card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BorderStyle {
    Live,
    Published,
    Restricted,
    Pending,
    None,
}

impl BorderStyle {
    pub fn color(&self) -> Option<&'static str> {
        match self {
            BorderStyle::Live => Some("#00688D"),
            BorderStyle::Published => Some("#0D7D4D"),
            BorderStyle::Restricted => Some("#000000"),
            BorderStyle::Pending => Some("#F0CC00"),
            BorderStyle::None => None,
        }
    }

    /// CSS value for `border-left`, if any.
    pub fn css(&self) -> Option<String> {
        self.color().map(|c| format!("5px solid {c}"))
    }
}

/// Classify a node. Unpublished edits on published content always win, then
/// server visibility, then the plain published/draft split.
pub fn item_status(input: StatusInput) -> ItemStatus {
    if input.published && input.has_changes {
        return ItemStatus::PublishedWithChanges;
    }
    match input.visibility_state {
        VisibilityState::StaffOnly => return ItemStatus::StaffOnly,
        VisibilityState::Live => return ItemStatus::Live,
        VisibilityState::Gated => return ItemStatus::Gated,
        VisibilityState::NeedsAttention => return ItemStatus::NeedsAttention,
        VisibilityState::Hidden => return ItemStatus::HiddenFromToc,
        VisibilityState::Ready | VisibilityState::Unscheduled | VisibilityState::Other => {}
    }
    match (input.published, input.has_changes) {
        (true, _) => ItemStatus::PublishedNotLive,
        (false, true) => ItemStatus::Draft,
        (false, false) => ItemStatus::NeverPublished,
    }
}

pub fn item_status_border(status: ItemStatus) -> BorderStyle {
    status.border()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(published: bool, has_changes: bool, visibility_state: VisibilityState) -> ItemStatus {
        item_status(StatusInput {
            published,
            visibility_state,
            has_changes,
        })
    }

    #[test]
    fn full_truth_table() {
        use ItemStatus::*;
        use VisibilityState as V;

        // (visibility, [ (published, has_changes) -> expected ] in order
        //   (t,t) (t,f) (f,t) (f,f) )
        let table = [
            (V::Live, [PublishedWithChanges, Live, Live, Live]),
            (V::Ready, [PublishedWithChanges, PublishedNotLive, Draft, NeverPublished]),
            (V::NeedsAttention, [PublishedWithChanges, NeedsAttention, NeedsAttention, NeedsAttention]),
            (V::StaffOnly, [PublishedWithChanges, StaffOnly, StaffOnly, StaffOnly]),
            (V::Hidden, [PublishedWithChanges, HiddenFromToc, HiddenFromToc, HiddenFromToc]),
            (V::Unscheduled, [PublishedWithChanges, PublishedNotLive, Draft, NeverPublished]),
            (V::Gated, [PublishedWithChanges, Gated, Gated, Gated]),
            (V::Other, [PublishedWithChanges, PublishedNotLive, Draft, NeverPublished]),
        ];
        assert_eq!(table.len(), V::ALL.len());

        let combos = [(true, true), (true, false), (false, true), (false, false)];
        for (visibility, expected) in table {
            for ((published, has_changes), want) in combos.iter().zip(expected) {
                let got = status(*published, *has_changes, visibility);
                assert_eq!(
                    got, want,
                    "published={published} has_changes={has_changes} visibility={visibility:?}"
                );
                // stable across calls
                assert_eq!(got, status(*published, *has_changes, visibility));
            }
        }
    }

    #[test]
    fn unpublished_edits_surface_over_visibility() {
        for v in VisibilityState::ALL {
            assert_eq!(status(true, true, v), ItemStatus::PublishedWithChanges);
            assert_eq!(status(true, true, v).border(), BorderStyle::Pending);
        }
    }

    #[test]
    fn borders() {
        assert_eq!(ItemStatus::Live.border().css().as_deref(), Some("5px solid #00688D"));
        assert_eq!(item_status_border(ItemStatus::PublishedNotLive).color(), Some("#0D7D4D"));
        assert_eq!(ItemStatus::StaffOnly.border(), BorderStyle::Restricted);
        assert_eq!(ItemStatus::NeverPublished.border().css(), None);
    }
}
