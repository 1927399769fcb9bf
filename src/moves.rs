//! Legal single-step sibling moves within one parent.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{BlockId, OutlineNode};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn offset(&self) -> isize {
        match self {
            Direction::Up => -1,
            Direction::Down => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

impl TryFrom<i32> for Direction {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Direction::Up),
            1 => Ok(Direction::Down),
            other => Err(other),
        }
    }
}

/// A legal swap of two adjacent siblings, and the order it would produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDetails {
    pub from: usize,
    pub to: usize,
    pub moved_id: BlockId,
    pub displaced_id: BlockId,
    pub ordered_ids: Vec<BlockId>,
}

/// Answers "can this sibling move, and what would the order look like".
/// Never applies the move.
#[derive(Debug, Clone, Copy)]
pub struct MoveCalculator<'a> {
    siblings: &'a [OutlineNode],
}

impl<'a> MoveCalculator<'a> {
    pub fn new(siblings: &'a [OutlineNode]) -> Self {
        Self { siblings }
    }

    pub fn possible_moves(&self, index: usize, direction: Direction) -> Option<MoveDetails> {
        let node = self.siblings.get(index)?;
        if !node.actions.draggable {
            return None;
        }
        let to = index.checked_add_signed(direction.offset())?;
        let displaced = self.siblings.get(to)?;

        let mut ordered_ids: Vec<BlockId> = self.siblings.iter().map(|n| n.id.clone()).collect();
        ordered_ids.swap(index, to);
        Some(MoveDetails {
            from: index,
            to,
            moved_id: node.id.clone(),
            displaced_id: displaced.id.clone(),
            ordered_ids,
        })
    }

    /// `(allow_move_up, allow_move_down)` for the node at `index`.
    pub fn allowed(&self, index: usize) -> (bool, bool) {
        (
            self.possible_moves(index, Direction::Up).is_some(),
            self.possible_moves(index, Direction::Down).is_some(),
        )
    }
}
