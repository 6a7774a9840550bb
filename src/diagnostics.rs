//! Layout inspector: pure queries for configuration mistakes, plus a
//! repair pass for trivially invalid state.
//!
//! The inspector never mutates; it returns a list of typed
//! [`LayoutIssue`]s for the operator. [`repair`] removes the few things
//! that are safe to fix mechanically: self-loop transitions, transitions
//! with dangling endpoints, and references to trains or blocks that no
//! longer exist.

use core::fmt;

use log::info;

use crate::layout::{
    BlockId, ElementRef, FeedbackAddress, FeedbackId, Layout, SocketRef, TrainId, TurnoutId,
};

/// A finding of the layout inspector.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutIssue {
    /// Two elements of the same kind share an id.
    DuplicateId {
        /// Element kind ("block", "turnout", "feedback", "train").
        kind: &'static str,
        /// The shared id.
        id: String,
    },
    /// Two elements of the same kind share a name.
    DuplicateName {
        /// Element kind.
        kind: &'static str,
        /// The shared name.
        name: String,
    },
    /// Two feedbacks share a hardware address.
    DuplicateFeedbackAddress(FeedbackAddress),
    /// Two turnouts share a decoder address.
    DuplicateTurnoutAddress(u32),
    /// Two trains share a locomotive address.
    DuplicateLocomotiveAddress(u32),
    /// A socket with no transition attached.
    OrphanSocket(SocketRef),
    /// A transition endpoint referencing a missing element or socket.
    DanglingTransition {
        /// The broken transition.
        transition: crate::layout::TransitionId,
        /// The endpoint that does not resolve.
        endpoint: SocketRef,
    },
    /// A block lists a feedback id that does not exist.
    UnknownFeedback {
        /// The block with the broken reference.
        block: BlockId,
        /// The missing feedback id.
        feedback: FeedbackId,
    },
    /// A block without a length (length-aware features only).
    MissingBlockLength(BlockId),
    /// A block whose feedback distances are absent or incomplete
    /// (length-aware features only).
    MissingFeedbackDistances(BlockId),
    /// A turnout without a length (length-aware features only).
    MissingTurnoutLength(TurnoutId),
    /// A train without a length (length-aware features only).
    MissingTrainLength(TrainId),
}

impl fmt::Display for LayoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutIssue::DuplicateId { kind, id } => write!(f, "duplicate {kind} id {id}"),
            LayoutIssue::DuplicateName { kind, name } => {
                write!(f, "duplicate {kind} name {name:?}")
            }
            LayoutIssue::DuplicateFeedbackAddress(address) => {
                write!(f, "duplicate feedback address {address}")
            }
            LayoutIssue::DuplicateTurnoutAddress(address) => {
                write!(f, "duplicate turnout address {address}")
            }
            LayoutIssue::DuplicateLocomotiveAddress(address) => {
                write!(f, "duplicate locomotive address {address}")
            }
            LayoutIssue::OrphanSocket(socket) => write!(f, "socket {socket} has no transition"),
            LayoutIssue::DanglingTransition {
                transition,
                endpoint,
            } => write!(f, "transition {transition} endpoint {endpoint} does not resolve"),
            LayoutIssue::UnknownFeedback { block, feedback } => {
                write!(f, "block {block} lists unknown feedback {feedback}")
            }
            LayoutIssue::MissingBlockLength(id) => write!(f, "block {id} has no length"),
            LayoutIssue::MissingFeedbackDistances(id) => {
                write!(f, "block {id} has incomplete feedback distances")
            }
            LayoutIssue::MissingTurnoutLength(id) => write!(f, "turnout {id} has no length"),
            LayoutIssue::MissingTrainLength(id) => write!(f, "train {id} has no length"),
        }
    }
}

/// What the inspector should look at.
#[derive(Debug, Clone, Default)]
pub struct InspectionOptions {
    /// Also report missing lengths and feedback distances, needed only
    /// when length-aware features are in use.
    pub length_aware: bool,
}

/// Inspects the layout and returns all findings.
pub fn inspect(layout: &Layout, options: &InspectionOptions) -> Vec<LayoutIssue> {
    let mut issues = Vec::new();

    duplicate_ids(layout, &mut issues);
    duplicate_names(layout, &mut issues);
    duplicate_addresses(layout, &mut issues);
    transition_endpoints(layout, &mut issues);
    orphan_sockets(layout, &mut issues);
    feedback_references(layout, &mut issues);
    if options.length_aware {
        lengths(layout, &mut issues);
    }

    issues
}

fn duplicate_ids(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    let mut push = |kind: &'static str, ids: Vec<&str>| {
        let mut seen = Vec::new();
        for id in ids {
            if seen.contains(&id) {
                issues.push(LayoutIssue::DuplicateId {
                    kind,
                    id: id.to_owned(),
                });
            } else {
                seen.push(id);
            }
        }
    };
    push("block", layout.blocks().iter().map(|b| b.id.as_str()).collect());
    push(
        "turnout",
        layout.turnouts().iter().map(|t| t.id.as_str()).collect(),
    );
    push(
        "feedback",
        layout.feedbacks().iter().map(|f| f.id.as_str()).collect(),
    );
    push("train", layout.trains().iter().map(|t| t.id.as_str()).collect());
}

fn duplicate_names(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    let mut push = |kind: &'static str, names: Vec<&str>| {
        let mut seen = Vec::new();
        for name in names {
            if name.is_empty() {
                continue;
            }
            if seen.contains(&name) {
                issues.push(LayoutIssue::DuplicateName {
                    kind,
                    name: name.to_owned(),
                });
            } else {
                seen.push(name);
            }
        }
    };
    push(
        "block",
        layout.blocks().iter().map(|b| b.name.as_str()).collect(),
    );
    push(
        "turnout",
        layout.turnouts().iter().map(|t| t.name.as_str()).collect(),
    );
    push(
        "feedback",
        layout.feedbacks().iter().map(|f| f.name.as_str()).collect(),
    );
}

fn duplicate_addresses(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    let mut seen_feedback = Vec::new();
    for feedback in layout.feedbacks() {
        if seen_feedback.contains(&feedback.address) {
            issues.push(LayoutIssue::DuplicateFeedbackAddress(feedback.address));
        } else {
            seen_feedback.push(feedback.address);
        }
    }

    let mut seen_turnout: Vec<u32> = Vec::new();
    for turnout in layout.turnouts() {
        for address in std::iter::once(turnout.address).chain(turnout.address2) {
            if seen_turnout.contains(&address) {
                issues.push(LayoutIssue::DuplicateTurnoutAddress(address));
            } else {
                seen_turnout.push(address);
            }
        }
    }

    let mut seen_train: Vec<u32> = Vec::new();
    for train in layout.trains() {
        if seen_train.contains(&train.address) {
            issues.push(LayoutIssue::DuplicateLocomotiveAddress(train.address));
        } else {
            seen_train.push(train.address);
        }
    }
}

fn endpoint_resolves(layout: &Layout, endpoint: &SocketRef) -> bool {
    match &endpoint.element {
        ElementRef::Block(id) => layout
            .block(id)
            .map(|block| block.sockets().contains(&endpoint.socket))
            .unwrap_or(false),
        ElementRef::Turnout(id) => layout
            .turnout(id)
            .map(|turnout| turnout.category.sockets().contains(&endpoint.socket))
            .unwrap_or(false),
    }
}

fn transition_endpoints(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    for transition in layout.transitions() {
        for endpoint in [&transition.a, &transition.b] {
            if !endpoint_resolves(layout, endpoint) {
                issues.push(LayoutIssue::DanglingTransition {
                    transition: transition.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
    }
}

fn orphan_sockets(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    let mut check = |socket: SocketRef| {
        let attached = layout
            .transitions()
            .iter()
            .any(|transition| transition.touches(&socket));
        if !attached {
            issues.push(LayoutIssue::OrphanSocket(socket));
        }
    };
    for block in layout.blocks() {
        for &socket in block.sockets() {
            check(SocketRef {
                element: ElementRef::Block(block.id.clone()),
                socket,
            });
        }
    }
    for turnout in layout.turnouts() {
        for &socket in turnout.category.sockets() {
            check(SocketRef {
                element: ElementRef::Turnout(turnout.id.clone()),
                socket,
            });
        }
    }
}

fn feedback_references(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    for block in layout.blocks() {
        for feedback in &block.feedbacks {
            if layout.feedback(feedback).is_err() {
                issues.push(LayoutIssue::UnknownFeedback {
                    block: block.id.clone(),
                    feedback: feedback.clone(),
                });
            }
        }
    }
}

fn lengths(layout: &Layout, issues: &mut Vec<LayoutIssue>) {
    for block in layout.blocks() {
        match block.length_cm {
            None => issues.push(LayoutIssue::MissingBlockLength(block.id.clone())),
            Some(_) => {
                if block.feedback_distances_cm.len() != block.feedbacks.len() {
                    issues.push(LayoutIssue::MissingFeedbackDistances(block.id.clone()));
                }
            }
        }
    }
    for turnout in layout.turnouts() {
        if turnout.length_cm.is_none() {
            issues.push(LayoutIssue::MissingTurnoutLength(turnout.id.clone()));
        }
    }
    for train in layout.trains() {
        if train.length_cm.is_none() {
            issues.push(LayoutIssue::MissingTrainLength(train.id.clone()));
        }
    }
}

/// Removes trivially invalid state. Returns the number of repairs applied.
///
/// Repairs: self-loop transitions, transitions with dangling endpoints,
/// occupancy/reservation records naming unknown trains, and train block
/// assignments naming unknown blocks.
pub fn repair(layout: &mut Layout) -> usize {
    let mut repairs = 0;

    let broken: Vec<_> = layout
        .transitions()
        .iter()
        .filter(|t| {
            t.is_self_loop() || !endpoint_resolves(layout, &t.a) || !endpoint_resolves(layout, &t.b)
        })
        .map(|t| t.id.clone())
        .collect();
    if !broken.is_empty() {
        repairs += broken.len();
        layout
            .transitions_mut()
            .retain(|transition| !broken.contains(&transition.id));
    }

    let train_ids: Vec<TrainId> = layout.trains().iter().map(|t| t.id.clone()).collect();
    let block_ids: Vec<BlockId> = layout.blocks().iter().map(|b| b.id.clone()).collect();

    let block_fixes: Vec<BlockId> = layout
        .blocks()
        .iter()
        .filter(|block| {
            block
                .occupancy
                .as_ref()
                .is_some_and(|o| !train_ids.contains(&o.train))
                || block
                    .reservation
                    .as_ref()
                    .is_some_and(|r| !train_ids.contains(&r.train))
        })
        .map(|block| block.id.clone())
        .collect();
    for id in block_fixes {
        if let Ok(block) = layout.block_mut(&id) {
            if block
                .occupancy
                .as_ref()
                .is_some_and(|o| !train_ids.contains(&o.train))
            {
                block.occupancy = None;
                repairs += 1;
            }
            if block
                .reservation
                .as_ref()
                .is_some_and(|r| !train_ids.contains(&r.train))
            {
                block.reservation = None;
                repairs += 1;
            }
        }
    }

    for train in layout.trains_mut() {
        if train
            .block
            .as_ref()
            .is_some_and(|block| !block_ids.contains(block))
        {
            train.block = None;
            repairs += 1;
        }
    }

    if repairs > 0 {
        info!("repaired {repairs} invalid layout entries");
    }
    repairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{
        Block, BlockCategory, DecoderFamily, Feedback, Train, TrainInstance, Transition,
        Turnout, TurnoutCategory,
    };

    fn clean_layout() -> Layout {
        let mut layout = Layout::new();
        layout.add_block(
            Block::new("b1", "One", BlockCategory::Free)
                .with_feedbacks(["f1"])
                .with_length_cm(100.0),
        );
        layout.add_block(
            Block::new("b2", "Two", BlockCategory::Free)
                .with_feedbacks(["f2"])
                .with_length_cm(100.0),
        );
        layout.add_feedback(Feedback::new("f1", "F one", FeedbackAddress::new(1, 1)));
        layout.add_feedback(Feedback::new("f2", "F two", FeedbackAddress::new(1, 2)));
        layout.add_transition(Transition::new(
            "tr1",
            SocketRef::block("b1", 1),
            SocketRef::block("b2", 0),
        ));
        layout.add_transition(Transition::new(
            "tr2",
            SocketRef::block("b2", 1),
            SocketRef::block("b1", 0),
        ));
        layout
    }

    #[test]
    fn clean_layout_has_no_issues() {
        let layout = clean_layout();
        assert!(inspect(&layout, &InspectionOptions::default()).is_empty());
    }

    #[test]
    fn duplicate_ids_and_addresses_are_reported() {
        let mut layout = clean_layout();
        layout.add_feedback(Feedback::new("f1", "F dup", FeedbackAddress::new(1, 1)));

        let issues = inspect(&layout, &InspectionOptions::default());
        assert!(issues.contains(&LayoutIssue::DuplicateId {
            kind: "feedback",
            id: "f1".into(),
        }));
        assert!(issues.contains(&LayoutIssue::DuplicateFeedbackAddress(FeedbackAddress::new(
            1, 1
        ))));
    }

    #[test]
    fn orphan_sockets_are_reported() {
        let mut layout = clean_layout();
        layout.add_turnout(Turnout::new("t1", "T", TurnoutCategory::SingleLeft, 9));

        let issues = inspect(&layout, &InspectionOptions::default());
        let orphans = issues
            .iter()
            .filter(|issue| matches!(issue, LayoutIssue::OrphanSocket(_)))
            .count();
        assert_eq!(orphans, 3);
    }

    #[test]
    fn dangling_transitions_are_reported() {
        let mut layout = clean_layout();
        layout.add_transition(Transition::new(
            "tr3",
            SocketRef::block("b1", 1),
            SocketRef::block("missing", 0),
        ));

        let issues = inspect(&layout, &InspectionOptions::default());
        assert!(issues
            .iter()
            .any(|issue| matches!(issue, LayoutIssue::DanglingTransition { .. })));
    }

    #[test]
    fn length_aware_findings_only_when_asked() {
        let mut layout = clean_layout();
        layout.add_train(Train::new("t1", "Loco", 3, DecoderFamily::Mm));

        assert!(inspect(&layout, &InspectionOptions::default()).is_empty());

        let issues = inspect(&layout, &InspectionOptions { length_aware: true });
        assert!(issues.contains(&LayoutIssue::MissingTrainLength(TrainId::new("t1"))));
        // Blocks have lengths but no feedback distances.
        assert!(issues.contains(&LayoutIssue::MissingFeedbackDistances(BlockId::new("b1"))));
    }

    #[test]
    fn repair_removes_self_loops_and_dangling_refs() {
        let mut layout = clean_layout();
        layout.add_transition(Transition::new(
            "loop",
            SocketRef::block("b1", 1),
            SocketRef::block("b1", 1),
        ));
        layout.block_mut(&BlockId::new("b1")).unwrap().occupancy = Some(TrainInstance {
            train: TrainId::new("ghost"),
            direction: crate::layout::Direction::Next,
        });

        let repairs = repair(&mut layout);
        assert_eq!(repairs, 2);
        assert_eq!(layout.transitions().len(), 2);
        assert!(layout.block(&BlockId::new("b1")).unwrap().occupancy.is_none());
        assert!(inspect(&layout, &InspectionOptions::default()).is_empty());
    }
}
