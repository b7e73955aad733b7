use color_eyre::Result;
use crowd_controls::interactive::EventKind;
use crowd_controls::{
    ButtonControl, ChannelCommandSink, ControlDefinition, InteractiveSession, OutboundCommand,
    SessionSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const SIMULATED_PARTICIPANTS: u64 = 12;
const BUTTON_COOLDOWN_MS: i64 = 2_000;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = SessionSettings::load_or_default();
    let (sink, commands) = ChannelCommandSink::channel(settings.transport.command_capacity);
    let session = InteractiveSession::new(settings.clone(), Arc::new(sink));

    session.register_controls([
        ControlDefinition::button("jump", "default", "Jump", 0).with_help_text("Make them jump"),
        ControlDefinition::button("boost", "default", "Boost", 50).with_help_text("Costs sparks"),
        ControlDefinition::button("confetti", "celebration", "Confetti", 0),
    ]);

    let shutdown = CancellationToken::new();

    let transport_handle = tokio::spawn(run_transport_stub(commands, shutdown.clone()));

    info!("Spawning {} simulated participants", SIMULATED_PARTICIPANTS);
    let producers: Vec<_> = (1..=SIMULATED_PARTICIPANTS)
        .map(|participant| {
            tokio::spawn(simulate_participant(
                session.clone(),
                participant,
                shutdown.clone(),
            ))
        })
        .collect();

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown requested");
        ctrl_c_token.cancel();
    });

    run_host_loop(&session, shutdown.clone()).await;

    for producer in producers {
        if let Err(e) = producer.await {
            warn!("Participant task ended abnormally: {}", e);
        }
    }
    transport_handle.await?;

    info!("Session closed");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

// Host side: one do_work per tick, then game logic reads the views
async fn run_host_loop(session: &InteractiveSession, shutdown: CancellationToken) {
    let interval_ms = session.settings().tick.interval_ms.max(1);
    info!("Starting host tick loop with {}ms interval", interval_ms);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = session.do_work();
        debug!("Tick {} report: {:?}", snapshot.tick(), snapshot.report());

        for button in session.buttons() {
            handle_button(&button);
        }

        if snapshot.tick() % 100 == 0 {
            session.prune_cooldowns();
        }
    }

    info!("Host tick loop stopped");
}

fn handle_button(button: &ButtonControl) {
    if !button.button_down() || button.disabled() {
        return;
    }

    let participants = button.participants();
    info!(
        "{}: {} downs, {} presses, {} ups from {} participants",
        button.button_text(),
        button.count_of_button_downs(),
        button.count_of_button_presses(),
        button.count_of_button_ups(),
        participants.len()
    );

    if button.remaining_cooldown() > 0 {
        debug!(
            "{} still cooling down for {}ms",
            button.button_text(),
            button.remaining_cooldown()
        );
        return;
    }

    if let Err(e) = button.trigger_cooldown(BUTTON_COOLDOWN_MS) {
        warn!("Could not start cooldown on {}: {}", button.control_id(), e);
        return;
    }

    let progress = (button.progress() + 0.1).min(1.0);
    let progress = if progress >= 1.0 { 0.0 } else { progress };
    if let Err(e) = button.set_progress(progress) {
        warn!("Could not update progress on {}: {}", button.control_id(), e);
    }
}

// Stand-in for a transport callback pushing a participant's input
async fn simulate_participant(
    session: InteractiveSession,
    participant: u64,
    shutdown: CancellationToken,
) {
    let ingress = session.ingress();
    let controls = ["jump", "boost", "confetti"];
    let mut ticker = tokio::time::interval(Duration::from_millis(37 * participant + 50));
    let mut step: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let control = controls[((participant + step) % controls.len() as u64) as usize];
        let now_ms = session.clock().now_ms();
        for kind in [EventKind::Down, EventKind::Press, EventKind::Up] {
            if let Err(e) = ingress.enqueue(control, participant, kind, now_ms) {
                warn!("Participant {} input lost: {}", participant, e);
            }
        }
        step += 1;
    }

    debug!("Participant {} disconnected", participant);
}

// Drains outbound commands the way a real transport would send them
async fn run_transport_stub(
    mut commands: mpsc::Receiver<OutboundCommand>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(OutboundCommand::SetControlProgress { control_id, progress }) => {
                    info!("-> setControlProgress {} {:.2}", control_id, progress);
                }
                Some(OutboundCommand::SetControlCooldown { control_id, expiration_ms }) => {
                    let until = chrono::DateTime::from_timestamp_millis(expiration_ms)
                        .map(|t| t.format("%H:%M:%S%.3f").to_string())
                        .unwrap_or_else(|| expiration_ms.to_string());
                    info!("-> setControlCooldown {} until {}", control_id, until);
                }
                None => break,
            }
        }
    }
    info!("Transport stub stopped");
}
