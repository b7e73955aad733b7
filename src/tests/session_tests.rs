use super::{InteractiveSession, SessionError};
use crate::clock::ManualClock;
use crate::config::SessionSettings;
use crate::controls::{ControlDefinition, ControlId, ParticipantId};
use crate::interactive::EventKind;
use crate::transport::{ChannelCommandSink, CommandSink, OutboundCommand, TransportError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct RecordingSink {
    sent: Mutex<Vec<OutboundCommand>>,
    offline: AtomicBool,
}

impl RecordingSink {
    fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().expect("sink lock").clone()
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().expect("sink lock").push(command);
        Ok(())
    }
}

struct Fixture {
    session: InteractiveSession,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

fn fixture() -> Fixture {
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let session =
        InteractiveSession::with_clock(SessionSettings::default(), sink.clone(), clock.clone());
    session.register_controls([
        ControlDefinition::button("btn1", "default", "Jump", 10).with_etag("v1"),
        ControlDefinition::button("btn2", "default", "Duck", 0),
        ControlDefinition::button("bonus", "bonus-round", "Bonus", 100),
    ]);
    Fixture {
        session,
        sink,
        clock,
    }
}

fn btn1() -> ControlId {
    ControlId::new("btn1")
}

#[test]
fn down_down_up_scenario() {
    let f = fixture();
    let ingress = f.session.ingress();
    ingress.enqueue("btn1", 42, EventKind::Down, 1).expect("down");
    ingress.enqueue("btn1", 42, EventKind::Down, 2).expect("down");
    ingress.enqueue("btn1", 42, EventKind::Up, 3).expect("up");

    f.session.do_work();
    let button = f.session.button(&btn1()).expect("btn1 registered");

    assert_eq!(button.count_of_button_downs(), 2);
    assert_eq!(button.count_of_button_ups(), 1);
    assert_eq!(button.count_of_button_downs_by(ParticipantId(42)), 2);
    assert!(button.button_down());
    assert!(button.button_up());
    assert!(!button.button_pressed());
    assert!(!button.button_pressed_by(ParticipantId(42)));
}

#[test]
fn n_downs_visible_for_one_tick_only() {
    let f = fixture();
    let ingress = f.session.ingress();
    let button = f.session.button(&btn1()).expect("btn1 registered");

    f.session.do_work();
    for ts in 0..25 {
        ingress.enqueue("btn1", ts as u64 % 4, EventKind::Down, ts).expect("down");
    }
    f.session.do_work();
    assert_eq!(button.count_of_button_downs(), 25);

    f.session.do_work();
    assert_eq!(button.count_of_button_downs(), 0);
    assert!(!button.button_down());
}

#[test]
fn idle_tick_adds_nothing() {
    let f = fixture();
    f.session.do_work();
    let before = f.session.counts(&btn1(), None);
    f.session.do_work();
    assert_eq!(f.session.counts(&btn1(), None), before);
    assert!(before.is_empty());
}

#[test]
fn per_participant_counts_sum_to_aggregate() {
    let f = fixture();
    let ingress = f.session.ingress();
    for (participant, kind) in [
        (1, EventKind::Down),
        (2, EventKind::Down),
        (2, EventKind::Press),
        (3, EventKind::Up),
        (1, EventKind::Down),
    ] {
        ingress.enqueue("btn1", participant, kind, 0).expect("enqueue");
    }
    f.session.do_work();

    let button = f.session.button(&btn1()).expect("btn1 registered");
    let participants = button.participants();
    let ids: Vec<_> = participants.iter().map(|(id, _)| id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let summed: u32 = participants.iter().map(|(_, counts)| counts.downs).sum();
    assert_eq!(summed, button.count_of_button_downs());
    for (id, counts) in participants {
        assert_eq!(button.button_down_by(id), counts.downs > 0);
        assert_eq!(button.count_of_button_ups_by(id), counts.ups);
    }
}

#[test]
fn reads_within_a_tick_agree_regardless_of_order() {
    let f = fixture();
    f.session
        .ingress()
        .enqueue("btn2", 9, EventKind::Press, 0)
        .expect("press");
    f.session.do_work();

    let button = f.session.button(&ControlId::new("btn2")).expect("btn2");
    let first = button.count_of_button_presses();
    let second = button.count_of_button_presses();
    assert_eq!(first, 1);
    assert_eq!(first, second);

    // Events arriving after the pass wait for the next one
    f.session
        .ingress()
        .enqueue("btn2", 9, EventKind::Press, 1)
        .expect("press");
    assert_eq!(button.count_of_button_presses(), 1);
}

#[test]
fn unknown_controls_read_as_defaults() {
    let f = fixture();
    let ghost = ControlId::new("ghost");
    f.session
        .ingress()
        .enqueue("ghost", 1, EventKind::Down, 0)
        .expect("enqueue");
    let report = f.session.do_work().report();

    assert_eq!(report.events_skipped, 1);
    assert!(f.session.button(&ghost).is_none());
    assert!(f.session.counts(&ghost, None).is_empty());
    assert_eq!(f.session.remaining_cooldown(&ghost), 0);
    assert_eq!(f.session.progress(&ghost), 0.0);
}

#[test]
fn writes_to_unknown_controls_are_reported() {
    let f = fixture();
    let ghost = ControlId::new("ghost");
    assert_eq!(
        f.session.trigger_cooldown(&ghost, 1_000),
        Err(SessionError::UnknownControl(ghost.clone()))
    );
    assert_eq!(
        f.session.set_progress(&ghost, 0.5),
        Err(SessionError::UnknownControl(ghost))
    );
    assert!(f.sink.sent().is_empty());
}

#[test]
fn cooldown_counts_down_with_the_clock_and_is_sent() {
    let f = fixture();
    let button = f.session.button(&btn1()).expect("btn1");

    let expiration = button.trigger_cooldown(5_000).expect("cooldown");
    assert_eq!(button.remaining_cooldown(), 5_000);
    assert_eq!(
        f.sink.sent(),
        vec![OutboundCommand::SetControlCooldown {
            control_id: btn1(),
            expiration_ms: expiration,
        }]
    );

    f.clock.advance(4_000);
    assert_eq!(button.remaining_cooldown(), 1_000);
    f.clock.set(expiration);
    assert_eq!(button.remaining_cooldown(), 0);
}

#[test]
fn cooldown_is_independent_of_ticks() {
    let f = fixture();
    let button = f.session.button(&btn1()).expect("btn1");
    button.trigger_cooldown(2_000).expect("cooldown");
    f.session.do_work();
    f.session.do_work();
    assert_eq!(button.remaining_cooldown(), 2_000);
}

#[test]
fn negative_cooldown_leaves_state_unchanged() {
    let f = fixture();
    let button = f.session.button(&btn1()).expect("btn1");
    button.trigger_cooldown(3_000).expect("cooldown");
    f.clock.advance(500);

    let err = button.trigger_cooldown(-10).unwrap_err();
    assert!(matches!(err, SessionError::InvalidArgument(_)));
    assert_eq!(button.remaining_cooldown(), 2_500);
    assert_eq!(f.sink.sent().len(), 1);
}

#[test]
fn transport_failure_is_surfaced_and_mirror_untouched() {
    let f = fixture();
    let button = f.session.button(&btn1()).expect("btn1");
    button.set_progress(0.25).expect("progress");
    f.sink.go_offline();

    assert_eq!(
        button.set_progress(0.75),
        Err(SessionError::TransportUnavailable(TransportError::Closed))
    );
    assert_eq!(button.progress(), 0.25);
    assert_eq!(
        button.trigger_cooldown(1_000),
        Err(SessionError::TransportUnavailable(TransportError::Closed))
    );
    assert_eq!(button.remaining_cooldown(), 0);
}

// Records every command, then parks the first send until the test releases it
#[derive(Debug)]
struct GatedSink {
    sent: Mutex<Vec<OutboundCommand>>,
    gate_armed: AtomicBool,
    gate: Barrier,
}

impl GatedSink {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            gate_armed: AtomicBool::new(true),
            gate: Barrier::new(2),
        }
    }

    fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().expect("sink lock").clone()
    }

    // First rendezvous: the parked send has started
    fn wait_until_parked(&self) {
        self.gate.wait();
    }

    // Second rendezvous: let the parked send return
    fn release(&self) {
        self.gate.wait();
    }
}

impl CommandSink for GatedSink {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError> {
        self.sent.lock().expect("sink lock").push(command);
        if self.gate_armed.swap(false, Ordering::SeqCst) {
            self.gate.wait();
            self.gate.wait();
        }
        Ok(())
    }
}

fn gated_session() -> (InteractiveSession, Arc<GatedSink>) {
    let sink = Arc::new(GatedSink::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let session = InteractiveSession::with_clock(SessionSettings::default(), sink.clone(), clock);
    session.register_control(ControlDefinition::button("btn1", "default", "Jump", 0));
    (session, sink)
}

#[test]
fn concurrent_cooldowns_keep_gate_in_step_with_sink() {
    let (session, sink) = gated_session();

    thread::scope(|scope| {
        let slow = scope.spawn(|| session.trigger_cooldown(&btn1(), 5_000));
        sink.wait_until_parked();

        // Starts while the first trigger is still inside the sink
        let fast = scope.spawn(|| session.trigger_cooldown(&btn1(), 100));
        thread::sleep(Duration::from_millis(50));
        sink.release();

        slow.join().expect("slow trigger").expect("cooldown");
        fast.join().expect("fast trigger").expect("cooldown");
    });

    let last_sent = match sink.sent().last() {
        Some(OutboundCommand::SetControlCooldown { expiration_ms, .. }) => *expiration_ms,
        other => panic!("expected a cooldown command, got {other:?}"),
    };
    assert_eq!(sink.sent().len(), 2);
    assert_eq!(session.remaining_cooldown(&btn1()), 100);
    assert_eq!(session.clock().now_ms() + 100, last_sent);
}

#[test]
fn concurrent_progress_keeps_mirror_in_step_with_sink() {
    let (session, sink) = gated_session();

    thread::scope(|scope| {
        let first = scope.spawn(|| session.set_progress(&btn1(), 0.9));
        sink.wait_until_parked();

        let second = scope.spawn(|| session.set_progress(&btn1(), 0.1));
        thread::sleep(Duration::from_millis(50));
        sink.release();

        first.join().expect("first writer").expect("progress");
        second.join().expect("second writer").expect("progress");
    });

    assert_eq!(
        sink.sent().last(),
        Some(&OutboundCommand::SetControlProgress {
            control_id: btn1(),
            progress: 0.1,
        })
    );
    assert_eq!(session.progress(&btn1()), 0.1);
}

#[test]
fn progress_outside_unit_range_is_rejected() {
    let f = fixture();
    let button = f.session.button(&btn1()).expect("btn1");

    for bad in [-0.1, 1.01, f32::NAN] {
        assert!(matches!(
            button.set_progress(bad),
            Err(SessionError::InvalidArgument(_))
        ));
    }
    button.set_progress(1.0).expect("upper bound");
    button.set_progress(0.0).expect("lower bound");
    assert_eq!(button.progress(), 0.0);
    assert_eq!(f.sink.sent().len(), 2);
}

#[test]
fn views_expose_definition_attributes() {
    let f = fixture();
    let button = f.session.button(&btn1()).expect("btn1");
    assert_eq!(button.button_text(), "Jump");
    assert_eq!(button.cost(), 10);
    assert_eq!(button.etag(), "v1");
    assert_eq!(button.scene_id(), "default");
    assert!(!button.disabled());

    let bonus: Vec<_> = f
        .session
        .buttons_in_scene("bonus-round")
        .iter()
        .map(|b| b.control_id().as_str().to_owned())
        .collect();
    assert_eq!(bonus, vec!["bonus"]);
    assert_eq!(f.session.buttons().len(), 3);
}

#[test]
fn removing_a_control_clears_its_state() {
    let f = fixture();
    f.session.trigger_cooldown(&btn1(), 10_000).expect("cooldown");
    f.session.set_progress(&btn1(), 0.5).expect("progress");

    assert!(f.session.remove_control(&btn1()).is_some());
    assert_eq!(f.session.remaining_cooldown(&btn1()), 0);
    assert_eq!(f.session.progress(&btn1()), 0.0);
    assert!(f.session.button(&btn1()).is_none());
}

#[test]
fn sessions_do_not_share_state() {
    let a = fixture();
    let b = fixture();
    a.session
        .ingress()
        .enqueue("btn1", 1, EventKind::Down, 0)
        .expect("enqueue");
    a.session.do_work();
    b.session.do_work();

    assert_eq!(a.session.counts(&btn1(), None).downs, 1);
    assert_eq!(b.session.counts(&btn1(), Some(ParticipantId(1))).downs, 0);
}

#[tokio::test]
async fn channel_sink_carries_session_commands() {
    let (sink, mut receiver) = ChannelCommandSink::channel(8);
    let session = InteractiveSession::new(SessionSettings::default(), Arc::new(sink));
    session.register_control(ControlDefinition::button("btn1", "default", "Jump", 0));

    session.set_progress(&btn1(), 0.5).expect("progress");
    assert_eq!(
        receiver.recv().await,
        Some(OutboundCommand::SetControlProgress {
            control_id: btn1(),
            progress: 0.5,
        })
    );

    let remaining = session
        .button(&btn1())
        .expect("btn1")
        .trigger_cooldown(5_000)
        .map(|_| session.remaining_cooldown(&btn1()))
        .expect("cooldown");
    assert!(remaining > 4_900 && remaining <= 5_000, "remaining = {remaining}");
}
