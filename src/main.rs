use music_trainer::messaging::channels::NotificationConsumer;
use music_trainer::sequencer::scheduler::Schedule;
use music_trainer::session::NoteCountEvaluator;
use music_trainer::{
    AudioEngine, MidiBackend, MidiCapture, MidirBackend, MonotonicClock, Note, Phrase,
    PhraseMetadata, PhraseScheduler, Result, SessionController, SessionOutcome,
    SimulatedMidiBackend, TrainerConfig, TrainerError, TransportClock, create_note_event_channel,
    create_notification_channel, create_render_channel,
};
use ringbuf::traits::Consumer;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(5);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);
const SIMULATED_PORT: &str = "Simulated Keyboard";

/// Extra delay before the simulated musician answers
const SIMULATED_REACTION: Duration = Duration::from_millis(300);

struct Options {
    simulate: bool,
    config: Option<PathBuf>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Options {
            simulate: false,
            config: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--simulate" => options.simulate = true,
                "--config" => {
                    let path = args
                        .next()
                        .ok_or_else(|| TrainerError::Config("--config needs a path".to_string()))?;
                    options.config = Some(PathBuf::from(path));
                }
                other => {
                    return Err(TrainerError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }
        Ok(options)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Music Trainer ===");
    println!("Version {}\n", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => TrainerConfig::load(path)?,
        None => TrainerConfig::load_or_default(),
    };

    let clock = MonotonicClock::shared();
    let transport = TransportClock::new(clock.clone());
    let (render_tx, render_rx) = create_render_channel(config.audio.trigger_queue_capacity);
    let (note_tx, note_rx) = create_note_event_channel(config.midi.note_queue_capacity);
    let (notification_tx, mut notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);

    println!("Audio engine initialisation...");
    let mut audio_engine = match AudioEngine::start(&config, render_rx, transport.reader()) {
        Ok(engine) => Some(engine),
        Err(e) => {
            log::warn!("Running without audio output: {}", e);
            None
        }
    };

    println!("\nMIDI initialisation...");
    let simulated = options
        .simulate
        .then(|| SimulatedMidiBackend::with_ports(&[SIMULATED_PORT]));
    let backend: Arc<dyn MidiBackend> = match &simulated {
        Some(backend) => Arc::new(backend.clone()),
        None => Arc::new(MidirBackend::new()),
    };
    let capture = MidiCapture::new(backend, note_tx, clock, config.midi.input_channel);

    match capture.available_devices() {
        Ok(devices) if devices.is_empty() => println!("No MIDI input ports found"),
        Ok(devices) => {
            for device in devices {
                let marker = if device.is_default { " (default)" } else { "" };
                println!("  [{}] {}{}", device.index, device.name, marker);
            }
        }
        Err(e) => log::warn!("Cannot list MIDI ports: {}", e),
    }
    if config.midi.auto_connect {
        if let Err(e) = capture.connect_default(config.midi.device_name.as_deref()) {
            log::warn!("{} - the session will end without a response", e);
        }
    }

    let mut controller = SessionController::new(
        config.session_settings(),
        transport,
        PhraseScheduler::new(render_tx),
        note_rx,
        Arc::new(NoteCountEvaluator),
    )
    .with_notifications(notification_tx);
    let _monitor = capture.spawn_monitor(
        config.monitor_interval(),
        config.reconnection_strategy(),
        controller.control_sender(),
    );

    let phrase = demo_phrase()?;
    let schedule = controller.start_session(phrase)?;
    println!(
        "\n=== Listen ({:.1} s at {}) ===",
        schedule.duration_seconds, schedule.tempo
    );

    let _echo = simulated.map(|backend| {
        let listen_after = Duration::from_secs_f64(
            schedule.duration_seconds + config.practice.grace_period,
        ) + SIMULATED_REACTION;
        spawn_echo(backend, schedule.clone(), listen_after)
    });

    let mut last_report = Instant::now();
    let outcome = loop {
        if let Some(outcome) = controller.poll() {
            break outcome;
        }
        print_notifications(&mut notification_rx);
        if last_report.elapsed() >= REPORT_INTERVAL {
            if let Some(engine) = audio_engine.as_mut() {
                engine.report();
            }
            last_report = Instant::now();
        }
        thread::sleep(POLL_INTERVAL);
    };
    print_notifications(&mut notification_rx);
    print_outcome(&outcome);

    capture.disconnect();
    Ok(())
}

/// One bar of a rising C major arpeggio at 100 BPM
fn demo_phrase() -> Result<Phrase> {
    let notes = [60, 64, 67, 72]
        .iter()
        .enumerate()
        .map(|(i, &pitch)| Note::new(pitch, i as f64, 0.9, 96))
        .collect::<Result<Vec<Note>>>()?;
    Phrase::new(
        notes,
        PhraseMetadata {
            tempo: 100.0,
            bar_count: 1,
            style: "modal_jazz".to_string(),
            difficulty: 2,
        },
    )
}

/// Play the call back through the simulated port, like a musician would
fn spawn_echo(
    backend: SimulatedMidiBackend,
    schedule: Schedule,
    listen_after: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now() + listen_after;
        let mut events: Vec<(f64, u8, bool)> = schedule
            .notes
            .iter()
            .flat_map(|n| {
                [
                    (n.trigger_time, n.pitch, true),
                    (n.trigger_time + n.duration, n.pitch, false),
                ]
            })
            .collect();
        events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));

        for (time, pitch, on) in events {
            let at = start + Duration::from_secs_f64(time.max(0.0));
            let now = Instant::now();
            if at > now {
                thread::sleep(at - now);
            }
            if on {
                backend.note_on(SIMULATED_PORT, pitch, 90);
            } else {
                backend.note_off(SIMULATED_PORT, pitch);
            }
        }
    })
}

fn print_notifications(notifications: &mut NotificationConsumer) {
    while let Some(notification) = notifications.try_pop() {
        println!("  {}", notification);
    }
}

fn print_outcome(outcome: &SessionOutcome) {
    println!("\n=== Result ===");
    match outcome {
        SessionOutcome::Evaluated(report) => {
            if report.degraded {
                println!("Evaluation unavailable, no adjustment");
            }
            println!("Recorded {} note(s)", report.recorded.len());
            for (dimension, score) in &report.result.scores {
                println!("  {:<14} {:.2}", dimension, score);
            }
            if !report.result.feedback.is_empty() {
                println!("{}", report.result.feedback);
            }
            println!(
                "Next difficulty: {}",
                report.result.suggested_difficulty()
            );
        }
        SessionOutcome::NoResponse => println!("No response heard"),
        SessionOutcome::Aborted { reason } => println!("Session aborted: {}", reason),
    }
}
