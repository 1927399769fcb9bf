use proptest::prelude::*;
use proptest::test_runner::Config;
use studio_outline::model::{Category, OutlineNode, VisibilityState};
use studio_outline::moves::{Direction, MoveCalculator};
use studio_outline::status::{item_status, ItemStatus, StatusInput};

fn siblings(draggable: &[bool]) -> Vec<OutlineNode> {
    draggable
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let mut node = OutlineNode::new(format!("u{i}"), Category::Unit, format!("Unit {i}"));
            node.actions.draggable = *d;
            node
        })
        .collect()
}

fn visibility() -> impl Strategy<Value = VisibilityState> {
    proptest::sample::select(VisibilityState::ALL.to_vec())
}

proptest! {
    #![proptest_config(Config::with_cases(128))]
    #[test]
    fn boundaries_are_the_only_blocked_positions(n in 1_usize..12, pick in 0_usize..12) {
        let list = siblings(&vec![true; n]);
        let index = pick % n;
        let calc = MoveCalculator::new(&list);
        prop_assert_eq!(calc.possible_moves(index, Direction::Up).is_none(), index == 0);
        prop_assert_eq!(calc.possible_moves(index, Direction::Down).is_none(), index == n - 1);
    }

    #[test]
    fn a_move_is_a_single_adjacent_swap(draggable in proptest::collection::vec(any::<bool>(), 1..10), pick in 0_usize..10) {
        let list = siblings(&draggable);
        let snapshot = list.clone();
        let before: Vec<String> = list.iter().map(|n| n.id.clone()).collect();
        let index = pick % list.len();
        let calc = MoveCalculator::new(&list);
        for direction in [Direction::Up, Direction::Down] {
            match calc.possible_moves(index, direction) {
                Some(details) => {
                    prop_assert!(draggable[index]);
                    prop_assert_eq!(details.from, index);
                    prop_assert_eq!(details.from.abs_diff(details.to), 1);
                    let mut expected = before.clone();
                    expected.swap(details.from, details.to);
                    prop_assert_eq!(details.ordered_ids, expected);
                }
                None => prop_assert!(!draggable[index] || (direction == Direction::Up && index == 0) || (direction == Direction::Down && index == list.len() - 1)),
            }
        }
        prop_assert_eq!(&list, &snapshot);
    }

    #[test]
    fn published_edits_always_win(vis in visibility()) {
        let status = item_status(StatusInput {
            published: true,
            has_changes: true,
            visibility_state: vis,
        });
        prop_assert_eq!(status, ItemStatus::PublishedWithChanges);
    }
}
