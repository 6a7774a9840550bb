//! Routes: ordered block/direction sequences a train follows.

use super::{BlockId, Direction, RouteId};

/// One step of a route: a block and the direction to traverse it in.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteStep {
    /// Block to traverse.
    pub block: BlockId,
    /// Direction relative to the block's natural axis.
    pub direction: Direction,
    /// Waiting time override for a station stop at this step, in
    /// milliseconds. Takes precedence over the block's own value.
    #[cfg_attr(feature = "serde", serde(default))]
    pub waiting_time_ms: Option<u64>,
}

impl RouteStep {
    /// Creates a step without a waiting-time override.
    pub fn new(block: impl Into<BlockId>, direction: Direction) -> Self {
        Self {
            block: block.into(),
            direction,
            waiting_time_ms: None,
        }
    }
}

/// Destination of an `automaticOnce` route.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Destination {
    /// Target block.
    pub block: BlockId,
    /// Required arrival direction, if the operator cares.
    #[cfg_attr(feature = "serde", serde(default))]
    pub direction: Option<Direction>,
}

impl Destination {
    /// Destination with no direction requirement.
    pub fn new(block: impl Into<BlockId>) -> Self {
        Self {
            block: block.into(),
            direction: None,
        }
    }

    /// Destination with a required arrival direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// How a route is produced and maintained.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum RouteMode {
    /// Operator-authored; never mutated by the runtime.
    Fixed,
    /// Generated towards a destination, then the train stops for good.
    AutomaticOnce(Destination),
    /// Endless: regenerated from station to station until finished.
    Automatic,
}

/// An ordered sequence of `(block, direction)` steps.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    /// Stable identifier.
    pub id: RouteId,
    /// The steps, in travel order.
    pub steps: Vec<RouteStep>,
    /// Generation mode.
    pub mode: RouteMode,
    /// Disabled routes cannot be started.
    pub enabled: bool,
}

impl Route {
    /// Creates an enabled route.
    pub fn new(id: impl Into<RouteId>, mode: RouteMode, steps: Vec<RouteStep>) -> Self {
        Self {
            id: id.into(),
            steps,
            mode,
            enabled: true,
        }
    }

    /// True when the runtime owns (and may regenerate) the steps.
    pub fn is_automatic(&self) -> bool {
        !matches!(self.mode, RouteMode::Fixed)
    }

    /// True when the route loops from station to station forever.
    pub fn is_endless(&self) -> bool {
        matches!(self.mode, RouteMode::Automatic)
    }

    /// The step at `index`, if it exists.
    pub fn step(&self, index: usize) -> Option<&RouteStep> {
        self.steps.get(index)
    }

    /// Index of the last step, when the route has any.
    pub fn last_step_index(&self) -> Option<usize> {
        self.steps.len().checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_mode_predicates() {
        let fixed = Route::new("r1", RouteMode::Fixed, vec![]);
        let endless = Route::new("r2", RouteMode::Automatic, vec![]);
        let once = Route::new(
            "r3",
            RouteMode::AutomaticOnce(Destination::new("s2")),
            vec![],
        );

        assert!(!fixed.is_automatic());
        assert!(endless.is_automatic() && endless.is_endless());
        assert!(once.is_automatic() && !once.is_endless());
    }

    #[test]
    fn last_step_index() {
        let route = Route::new(
            "r1",
            RouteMode::Fixed,
            vec![
                RouteStep::new("a", Direction::Next),
                RouteStep::new("b", Direction::Previous),
            ],
        );
        assert_eq!(route.last_step_index(), Some(1));
        assert_eq!(Route::new("r2", RouteMode::Fixed, vec![]).last_step_index(), None);
    }
}
