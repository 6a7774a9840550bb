//! Position arithmetic within a block.
//!
//! A train's position counts the feedbacks it has passed along the block's
//! natural axis: `0` before the first feedback, `feedback_count` past the
//! last. The arithmetic is direction sensitive, so it lives in one pure
//! function instead of being scattered through the movement handlers.

use crate::layout::Direction;

/// Computes the new position after feedback `feedback_index` was detected.
///
/// In strict mode only the feedback directly ahead of the current position
/// advances the train (by one). In lenient mode any feedback ahead of the
/// position jumps the train to it, which tolerates sensors that failed to
/// report. Feedbacks behind the position (the train's own tail, another
/// train's noise) never move it backwards.
///
/// Returns the new position, or `None` when the detection does not advance
/// the train.
///
/// # Example
///
/// ```rust
/// use railyard::controller::new_position;
/// use railyard::layout::Direction;
///
/// // Travelling along the axis, position 1 of 3 feedbacks.
/// assert_eq!(new_position(1, 1, Direction::Next, true, 3), Some(2));
/// assert_eq!(new_position(1, 2, Direction::Next, true, 3), None); // strict: not adjacent
/// assert_eq!(new_position(1, 2, Direction::Next, false, 3), Some(3)); // lenient: jump
/// ```
pub fn new_position(
    current: usize,
    feedback_index: usize,
    direction: Direction,
    strict: bool,
    feedback_count: usize,
) -> Option<usize> {
    if feedback_index >= feedback_count {
        return None;
    }
    match direction {
        Direction::Next => {
            // Feedback i is ahead when i >= current; passing it puts the
            // train at i + 1.
            if strict {
                (feedback_index == current).then(|| current + 1)
            } else {
                (feedback_index >= current).then(|| feedback_index + 1)
            }
        }
        Direction::Previous => {
            // Travelling against the axis the next feedback ahead is
            // current - 1; passing feedback i puts the train at i.
            if strict {
                (current > 0 && feedback_index == current - 1).then_some(feedback_index)
            } else {
                (feedback_index < current).then_some(feedback_index)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_strict_advances_one_at_a_time() {
        assert_eq!(new_position(0, 0, Direction::Next, true, 3), Some(1));
        assert_eq!(new_position(1, 1, Direction::Next, true, 3), Some(2));
        assert_eq!(new_position(2, 2, Direction::Next, true, 3), Some(3));
        // Skipping a feedback does not advance in strict mode.
        assert_eq!(new_position(0, 1, Direction::Next, true, 3), None);
        // Feedback behind the train is ignored.
        assert_eq!(new_position(2, 0, Direction::Next, true, 3), None);
    }

    #[test]
    fn next_lenient_jumps_ahead() {
        assert_eq!(new_position(0, 2, Direction::Next, false, 3), Some(3));
        assert_eq!(new_position(1, 1, Direction::Next, false, 3), Some(2));
        assert_eq!(new_position(2, 0, Direction::Next, false, 3), None);
    }

    #[test]
    fn previous_strict_counts_down() {
        assert_eq!(new_position(3, 2, Direction::Previous, true, 3), Some(2));
        assert_eq!(new_position(2, 1, Direction::Previous, true, 3), Some(1));
        assert_eq!(new_position(1, 0, Direction::Previous, true, 3), Some(0));
        assert_eq!(new_position(3, 0, Direction::Previous, true, 3), None);
        assert_eq!(new_position(0, 0, Direction::Previous, true, 3), None);
    }

    #[test]
    fn previous_lenient_jumps_ahead() {
        assert_eq!(new_position(3, 0, Direction::Previous, false, 3), Some(0));
        assert_eq!(new_position(2, 0, Direction::Previous, false, 3), Some(0));
        // A feedback at or past the position is behind the train.
        assert_eq!(new_position(1, 1, Direction::Previous, false, 3), None);
        assert_eq!(new_position(1, 2, Direction::Previous, false, 3), None);
    }

    #[test]
    fn out_of_range_feedback_is_ignored() {
        assert_eq!(new_position(0, 5, Direction::Next, false, 3), None);
    }
}
