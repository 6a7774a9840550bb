//! End-to-end scenarios driving the full runtime against a mock bus.

use railyard::commands::BusEvent;
use railyard::config::{PathSettings, RuntimeConfig};
use railyard::hal::{MockBus, MockClock};
use railyard::layout::{
    Block, BlockCategory, BlockId, DecoderFamily, Destination, Direction, Feedback,
    FeedbackAddress, Layout, Route, RouteId, RouteMode, RouteStep, Scheduling, SocketRef, Train,
    TrainId, TrainState, Transition, Turnout, TurnoutCategory, TurnoutId, TurnoutState,
};
use railyard::runtime::LayoutRuntime;
use railyard::traits::Clock;

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    runtime: LayoutRuntime<MockBus>,
    clock: MockClock,
}

impl Harness {
    fn new(layout: Layout) -> Self {
        Self::with_config(layout, RuntimeConfig::default())
    }

    fn with_config(layout: Layout, config: RuntimeConfig) -> Self {
        Self {
            runtime: LayoutRuntime::new(layout, MockBus::new(), config),
            clock: MockClock::new(),
        }
    }

    /// Reports a contact as detected (rising edge).
    fn feedback(&mut self, device: u16, contact: u16) {
        self.runtime
            .process_bus_event(BusEvent::Feedback {
                address: FeedbackAddress::new(device, contact),
                detected: true,
            })
            .unwrap();
    }

    fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.runtime.advance_to(self.clock.now_ms()).unwrap();
    }

    fn train(&self, id: &str) -> &Train {
        self.runtime.layout().train(&TrainId::new(id)).unwrap()
    }

    fn assert_at(&self, train: &str, block: &str) {
        assert_eq!(
            self.train(train).block,
            Some(BlockId::new(block)),
            "{train} should be in {block}"
        );
    }
}

fn block(id: &str, category: BlockCategory, contacts: &[(u16, u16)]) -> (Block, Vec<Feedback>) {
    let ids: Vec<String> = (0..contacts.len()).map(|i| format!("{id}.f{i}")).collect();
    let block = Block::new(id, id, category).with_feedbacks(ids.iter().map(String::as_str));
    let feedbacks = ids
        .iter()
        .zip(contacts)
        .map(|(fid, &(device, contact))| {
            Feedback::new(fid.as_str(), fid.clone(), FeedbackAddress::new(device, contact))
        })
        .collect();
    (block, feedbacks)
}

fn add_block(layout: &mut Layout, id: &str, category: BlockCategory, contacts: &[(u16, u16)]) {
    let (b, feedbacks) = block(id, category, contacts);
    layout.add_block(b);
    for feedback in feedbacks {
        layout.add_feedback(feedback);
    }
}

fn link(layout: &mut Layout, id: &str, a: SocketRef, b: SocketRef) {
    layout.add_transition(Transition::new(id, a, b));
}

// ============================================================================
// S1: single train, single lap, fixed route over turnouts
// ============================================================================

/// s1 -t1- b1 -t2- b2 -t3- b3 -t4- s2, all straight. Every feedback
/// advances the train; entering the station at the end of the route brings
/// it to a complete stop.
#[test]
fn s1_single_lap_to_station() {
    let mut layout = Layout::new();
    let names = ["s1", "b1", "b2", "b3", "s2"];
    for (i, name) in names.iter().enumerate() {
        let category = if name.starts_with('s') {
            BlockCategory::Station
        } else {
            BlockCategory::Free
        };
        add_block(
            &mut layout,
            name,
            category,
            &[(1, (i * 2) as u16), (1, (i * 2 + 1) as u16)],
        );
    }
    for i in 0..4 {
        let t = format!("t{}", i + 1);
        layout.add_turnout(Turnout::new(
            t.as_str(),
            t.as_str(),
            TurnoutCategory::SingleLeft,
            (10 + i) as u32,
        ));
        link(
            &mut layout,
            &format!("tr{}a", i + 1),
            SocketRef::block(names[i], 1),
            SocketRef::turnout(t.as_str(), 0),
        );
        link(
            &mut layout,
            &format!("tr{}b", i + 1),
            SocketRef::turnout(t.as_str(), 1),
            SocketRef::block(names[i + 1], 0),
        );
    }
    layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx));
    layout.add_route(Route::new(
        "lap",
        RouteMode::Fixed,
        names
            .iter()
            .map(|name| RouteStep::new(*name, Direction::Next))
            .collect(),
    ));

    let mut h = Harness::new(layout);
    let ice = TrainId::new("ice");
    h.runtime
        .place_train(&ice, &BlockId::new("s1"), 2, Direction::Next)
        .unwrap();
    h.runtime.start(&ice, &RouteId::new("lap"), None).unwrap();
    assert_eq!(h.train("ice").state, TrainState::Running);

    // Each entry feedback moves the train one block forward.
    for (i, name) in names.iter().enumerate().skip(1) {
        h.feedback(1, (i * 2) as u16);
        h.assert_at("ice", name);
        // The second contact advances the position within the block.
        h.feedback(1, (i * 2 + 1) as u16);
        assert_eq!(h.train("ice").position, 2, "position within {name}");
    }

    let ice = h.train("ice");
    assert_eq!(ice.state, TrainState::Stopped);
    assert_eq!(ice.scheduling, Scheduling::Manual);
    assert_eq!(h.runtime.bus().speed_commands().last(), Some(&(3, 0)));
    h.runtime.layout().check_invariants().unwrap();
}

// ============================================================================
// S2: route regeneration around a reserved block
// ============================================================================

/// a -> b1 -> t1 -> (straight) b2 -> t2 -> c
///                  (branch)  b5 (entered reversed) -> t2 -> c
///
/// The endless route initially runs through b2. Once another train occupies
/// b2, the next leading reservation fails and the controller finds the
/// alternative through b5, traversed against its natural axis.
#[test]
fn s2_regenerates_around_conflict() {
    let mut layout = Layout::new();
    add_block(&mut layout, "a", BlockCategory::Station, &[(1, 0), (1, 1)]);
    add_block(&mut layout, "b1", BlockCategory::Free, &[(1, 2), (1, 3)]);
    add_block(&mut layout, "b2", BlockCategory::Free, &[(1, 4), (1, 5)]);
    add_block(&mut layout, "b5", BlockCategory::Free, &[(1, 6), (1, 7)]);
    add_block(&mut layout, "c", BlockCategory::Station, &[(1, 8), (1, 9)]);
    layout.add_turnout(Turnout::new("t1", "t1", TurnoutCategory::SingleLeft, 20));
    layout.add_turnout(Turnout::new("t2", "t2", TurnoutCategory::SingleLeft, 21));

    link(&mut layout, "tr1", SocketRef::block("a", 1), SocketRef::block("b1", 0));
    link(&mut layout, "tr2", SocketRef::block("b1", 1), SocketRef::turnout("t1", 0));
    link(&mut layout, "tr3", SocketRef::turnout("t1", 1), SocketRef::block("b2", 0));
    // The branch enters b5 from its next side: traversal is reversed.
    link(&mut layout, "tr4", SocketRef::turnout("t1", 2), SocketRef::block("b5", 1));
    link(&mut layout, "tr5", SocketRef::block("b2", 1), SocketRef::turnout("t2", 1));
    link(&mut layout, "tr6", SocketRef::block("b5", 0), SocketRef::turnout("t2", 2));
    link(&mut layout, "tr7", SocketRef::turnout("t2", 0), SocketRef::block("c", 0));

    layout.add_train(
        Train::new("ice", "ICE", 3, DecoderFamily::Mfx).with_max_leading_blocks(1),
    );
    layout.add_train(Train::new("freight", "Freight", 4, DecoderFamily::Mm));
    layout.add_route(Route::new("wander", RouteMode::Automatic, vec![]));

    let mut h = Harness::new(layout);
    let ice = TrainId::new("ice");

    h.runtime
        .place_train(&ice, &BlockId::new("a"), 2, Direction::Next)
        .unwrap();
    h.runtime.start(&ice, &RouteId::new("wander"), None).unwrap();

    // The generated endless route runs through the free b2.
    let route = h.runtime.layout().route(&RouteId::new("wander")).unwrap();
    assert!(route.steps.iter().any(|s| s.block == BlockId::new("b2")));

    // Now the conflict appears.
    h.runtime
        .place_train(
            &TrainId::new("freight"),
            &BlockId::new("b2"),
            0,
            Direction::Next,
        )
        .unwrap();

    // Crossing into b1 triggers the next leading reservation, which fails
    // on b2 and regenerates the route through b5, reversed.
    h.feedback(1, 2);
    h.assert_at("ice", "b1");
    let route = h.runtime.layout().route(&RouteId::new("wander")).unwrap();
    let steps: Vec<(String, Direction)> = route
        .steps
        .iter()
        .map(|s| (s.block.to_string(), s.direction))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("b1".into(), Direction::Next),
            ("b5".into(), Direction::Previous),
            ("c".into(), Direction::Next),
        ]
    );
    assert_eq!(h.train("ice").state, TrainState::Running);

    // b5 is entered from its next side, so its entry feedback is the last
    // one along the natural axis.
    h.feedback(1, 7);
    h.assert_at("ice", "b5");
    h.feedback(1, 8);
    h.assert_at("ice", "c");

    // Station reached: brake/stop feedbacks bring the train to a stop.
    h.feedback(1, 9);
    assert_eq!(h.train("ice").state, TrainState::Stopped);
    h.runtime.layout().check_invariants().unwrap();
}

// ============================================================================
// S3: station restart
// ============================================================================

/// Ring: a -> b1 -> b -> b2 -> a. Endless mode stops in the station with a
/// restart delay; nothing moves during the delay, and after the timer fires
/// the route is regenerated and the train runs again.
#[test]
fn s3_station_restart_after_delay() {
    let mut layout = Layout::new();
    add_block(&mut layout, "a", BlockCategory::Station, &[(1, 0), (1, 1)]);
    add_block(&mut layout, "b1", BlockCategory::Free, &[(1, 2), (1, 3)]);
    add_block(&mut layout, "b", BlockCategory::Station, &[(1, 4), (1, 5)]);
    add_block(&mut layout, "b2", BlockCategory::Free, &[(1, 6), (1, 7)]);
    layout
        .block_mut(&BlockId::new("b"))
        .unwrap()
        .waiting_time_ms = Some(5_000);

    link(&mut layout, "tr1", SocketRef::block("a", 1), SocketRef::block("b1", 0));
    link(&mut layout, "tr2", SocketRef::block("b1", 1), SocketRef::block("b", 0));
    link(&mut layout, "tr3", SocketRef::block("b", 1), SocketRef::block("b2", 0));
    link(&mut layout, "tr4", SocketRef::block("b2", 1), SocketRef::block("a", 0));

    layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx));
    layout.add_route(Route::new("shuttle", RouteMode::Automatic, vec![]));

    let mut h = Harness::new(layout);
    let ice = TrainId::new("ice");
    h.runtime
        .place_train(&ice, &BlockId::new("a"), 2, Direction::Next)
        .unwrap();
    h.runtime.start(&ice, &RouteId::new("shuttle"), None).unwrap();

    // Run into the station block b.
    h.feedback(1, 2);
    h.feedback(1, 4);
    h.assert_at("ice", "b");
    h.feedback(1, 5);
    assert_eq!(h.train("ice").state, TrainState::Stopped);
    let commands_at_stop = h.runtime.bus().executed.len();

    // The block's waiting time (5 s) wins over the 10 s default. Until it
    // elapses, nothing moves.
    h.advance(4_999);
    assert_eq!(h.train("ice").state, TrainState::Stopped);
    assert_eq!(h.runtime.bus().executed.len(), commands_at_stop);

    // Timer fires: route regenerated from b, reservations taken, running.
    h.advance(2);
    let ice_train = h.train("ice");
    assert_eq!(ice_train.state, TrainState::Running);
    assert_eq!(ice_train.scheduling, Scheduling::AutomaticRunning);
    let route = h.runtime.layout().route(&RouteId::new("shuttle")).unwrap();
    assert_eq!(route.steps.first().map(|s| s.block.clone()), Some(BlockId::new("b")));
    assert_eq!(route.steps.last().map(|s| s.block.clone()), Some(BlockId::new("a")));

    // Second leg completes back in a.
    h.feedback(1, 6);
    h.feedback(1, 0);
    h.assert_at("ice", "a");
    h.feedback(1, 1);
    assert_eq!(h.train("ice").state, TrainState::Stopped);
    h.runtime.layout().check_invariants().unwrap();
}

// ============================================================================
// S4: two trains competing for a shared turnout
// ============================================================================

/// a1 \
///     t1 -- c
/// a2 /
///
/// A reserves the turnout chain first; B's start is refused and it stays at
/// speed 0. After A stops and the operator frees the chain, B starts.
#[test]
fn s4_competing_reservations_on_shared_turnout() {
    let mut layout = Layout::new();
    add_block(&mut layout, "a1", BlockCategory::Station, &[(1, 0), (1, 1)]);
    add_block(&mut layout, "a2", BlockCategory::Station, &[(1, 2), (1, 3)]);
    add_block(&mut layout, "c", BlockCategory::Station, &[(1, 4), (1, 5)]);
    layout.add_turnout(Turnout::new("t1", "t1", TurnoutCategory::SingleLeft, 30));

    link(&mut layout, "tr1", SocketRef::block("a1", 1), SocketRef::turnout("t1", 1));
    link(&mut layout, "tr2", SocketRef::block("a2", 1), SocketRef::turnout("t1", 2));
    link(&mut layout, "tr3", SocketRef::turnout("t1", 0), SocketRef::block("c", 0));

    layout.add_train(Train::new("a-train", "A", 11, DecoderFamily::Mm));
    layout.add_train(Train::new("b-train", "B", 12, DecoderFamily::Mm));
    layout.add_route(Route::new(
        "ra",
        RouteMode::Fixed,
        vec![
            RouteStep::new("a1", Direction::Next),
            RouteStep::new("c", Direction::Next),
        ],
    ));
    layout.add_route(Route::new(
        "rb",
        RouteMode::Fixed,
        vec![
            RouteStep::new("a2", Direction::Next),
            RouteStep::new("c", Direction::Next),
        ],
    ));

    let mut h = Harness::new(layout);
    let a = TrainId::new("a-train");
    let b = TrainId::new("b-train");
    h.runtime
        .place_train(&a, &BlockId::new("a1"), 2, Direction::Next)
        .unwrap();
    h.runtime
        .place_train(&b, &BlockId::new("a2"), 2, Direction::Next)
        .unwrap();

    h.runtime.start(&a, &RouteId::new("ra"), None).unwrap();
    assert_eq!(h.train("a-train").state, TrainState::Running);
    assert_eq!(
        h.runtime
            .layout()
            .turnout(&TurnoutId::new("t1"))
            .unwrap()
            .reservation,
        Some(a.clone())
    );

    // B cannot get the turnout; it never receives a speed command.
    h.runtime.start(&b, &RouteId::new("rb"), None).unwrap();
    assert_eq!(h.train("b-train").state, TrainState::Stopped);
    assert!(h
        .runtime
        .bus()
        .speed_commands()
        .iter()
        .all(|(address, _)| *address != 12));

    // Mutual exclusion held: the turnout has seen exactly one owner.
    // A stops; the operator tears the chain down.
    h.runtime.stop(&a, true).unwrap();
    h.runtime
        .free_between(&BlockId::new("a1"), &BlockId::new("a2"), Direction::Next)
        .unwrap();
    assert!(h
        .runtime
        .layout()
        .turnout(&TurnoutId::new("t1"))
        .unwrap()
        .reservation
        .is_none());

    // Now B's start succeeds and the turnout is thrown for its branch.
    h.runtime.start(&b, &RouteId::new("rb"), None).unwrap();
    assert_eq!(h.train("b-train").state, TrainState::Running);
    let turnout = h.runtime.layout().turnout(&TurnoutId::new("t1")).unwrap();
    assert_eq!(turnout.reservation, Some(b.clone()));
    assert_eq!(turnout.state, TurnoutState::BranchLeft);
    h.runtime.layout().check_invariants().unwrap();
}

// ============================================================================
// S5: point-to-loop
// ============================================================================

/// The only way back to the start traverses a reversing loop; the generated
/// route visits the loop blocks with the right direction annotations.
#[test]
fn s5_point_to_loop_route() {
    let mut layout = Layout::new();
    add_block(&mut layout, "A", BlockCategory::Station, &[(1, 0), (1, 1)]);
    add_block(&mut layout, "B", BlockCategory::Free, &[(1, 2), (1, 3)]);
    add_block(&mut layout, "C", BlockCategory::Free, &[(1, 4), (1, 5)]);
    add_block(&mut layout, "D", BlockCategory::Free, &[(1, 6), (1, 7)]);
    layout.add_turnout(Turnout::new("T1", "T1", TurnoutCategory::SingleLeft, 40));

    link(&mut layout, "tr1", SocketRef::block("A", 1), SocketRef::turnout("T1", 0));
    link(&mut layout, "tr2", SocketRef::turnout("T1", 1), SocketRef::block("B", 0));
    link(&mut layout, "tr3", SocketRef::block("B", 1), SocketRef::block("C", 0));
    link(&mut layout, "tr4", SocketRef::block("C", 1), SocketRef::block("D", 0));
    link(&mut layout, "tr5", SocketRef::block("D", 1), SocketRef::turnout("T1", 2));

    layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx));
    layout.add_route(Route::new("loop", RouteMode::Automatic, vec![]));

    let mut h = Harness::new(layout);
    let ice = TrainId::new("ice");
    h.runtime
        .place_train(&ice, &BlockId::new("A"), 2, Direction::Next)
        .unwrap();
    h.runtime
        .start(
            &ice,
            &RouteId::new("loop"),
            Some(Destination::new("A").with_direction(Direction::Previous)),
        )
        .unwrap();

    let route = h.runtime.layout().route(&RouteId::new("loop")).unwrap();
    let steps: Vec<(String, Direction)> = route
        .steps
        .iter()
        .map(|s| (s.block.to_string(), s.direction))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("A".into(), Direction::Next),
            ("B".into(), Direction::Next),
            ("C".into(), Direction::Next),
            ("D".into(), Direction::Next),
            ("A".into(), Direction::Previous),
        ]
    );
    assert_eq!(h.train("ice").state, TrainState::Running);
    h.runtime.layout().check_invariants().unwrap();
}

// ============================================================================
// S6: fixed-route end-of-route stop with distinct brake/stop feedbacks
// ============================================================================

/// Three feedbacks in the final block: entry, brake and stop are distinct,
/// so the braking phase is observable between them.
#[test]
fn s6_fixed_route_brakes_then_stops() {
    let mut layout = Layout::new();
    add_block(&mut layout, "start", BlockCategory::Station, &[(1, 0), (1, 1)]);
    add_block(
        &mut layout,
        "e",
        BlockCategory::Free,
        &[(1, 2), (1, 3), (1, 4)],
    );
    link(
        &mut layout,
        "tr1",
        SocketRef::block("start", 1),
        SocketRef::block("e", 0),
    );
    layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx).with_max_kph(120));
    layout.add_route(Route::new(
        "to-e",
        RouteMode::Fixed,
        vec![
            RouteStep::new("start", Direction::Next),
            RouteStep::new("e", Direction::Next),
        ],
    ));

    let config = RuntimeConfig::default().with_path(PathSettings::default());
    let mut h = Harness::with_config(layout, config);
    let ice = TrainId::new("ice");
    h.runtime
        .place_train(&ice, &BlockId::new("start"), 2, Direction::Next)
        .unwrap();
    h.runtime.start(&ice, &RouteId::new("to-e"), None).unwrap();

    // Entry: the train is in the last block, stop pending, still rolling.
    h.feedback(1, 2);
    h.assert_at("ice", "e");
    assert_eq!(h.train("ice").state, TrainState::Running);

    // Brake feedback: braking speed commanded.
    h.feedback(1, 3);
    assert_eq!(h.train("ice").state, TrainState::Braking);
    let braking_step = h.runtime.bus().speed_commands().last().copied().unwrap();
    assert!(braking_step.1 > 0 && braking_step.1 < 1000);

    // Stop feedback: speed 0, stopped, back to manual scheduling.
    h.feedback(1, 4);
    let train = h.train("ice");
    assert_eq!(train.state, TrainState::Stopped);
    assert_eq!(train.scheduling, Scheduling::Manual);
    assert_eq!(h.runtime.bus().speed_commands().last(), Some(&(3, 0)));
    h.runtime.layout().check_invariants().unwrap();
}

// ============================================================================
// Clock sanity for the harness itself
// ============================================================================

#[test]
fn harness_clock_advances_runtime_time() {
    let mut layout = Layout::new();
    add_block(&mut layout, "a", BlockCategory::Station, &[(1, 0)]);
    layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx));
    let mut h = Harness::new(layout);
    h.advance(1_000);
    assert_eq!(h.clock.now_ms(), 1_000);
}
