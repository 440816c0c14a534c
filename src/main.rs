#[cfg(not(feature = "simulated"))]
fn main() {
    eprintln!(
        "The mystery-gate demo requires the \"simulated\" feature. Rebuild with `--features simulated` to run a session."
    );
}

#[cfg(feature = "simulated")]
mod cli {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use clap::Parser;
    use mystery_gate::audio::simulated::SimulatedBackend;
    use mystery_gate::gate::InputEvent;
    use mystery_gate::{AudioBackend, EngineState, EventLoop, GatePhase, LandingConfig, LandingPage};
    use tracing_subscriber::EnvFilter;

    /// Run a simulated landing session and print its timeline
    #[derive(Parser, Debug)]
    #[command(name = "mystery-gate", version)]
    #[command(about = "Entry gate / audio unlock / delayed glitch session runner")]
    struct Args {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the effective configuration and exit
        #[arg(long)]
        print_config: bool,

        /// Number of activations on the call-to-action
        #[arg(long, default_value_t = 1)]
        clicks: u32,

        /// Time of the first activation (ms)
        #[arg(long, default_value_t = 0)]
        first_click_ms: u64,

        /// Gap between activations (ms); 0 sends them all in one frame
        #[arg(long, default_value_t = 0)]
        click_interval_ms: u64,

        /// Simulated resume latency (ms)
        #[arg(long, default_value_t = 5)]
        resume_latency_ms: u64,

        /// Simulate a platform that refuses to construct an audio engine
        #[arg(long)]
        deny_audio: bool,

        /// Engines start running instead of suspended
        #[arg(long)]
        start_running: bool,

        /// Frame length (ms)
        #[arg(long, default_value_t = 16)]
        frame_ms: u64,

        /// Session length (ms); defaults to exit + glitch delay + 500
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Sleep between frames instead of running as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Use the default output device instead of the simulated platform
        #[cfg(feature = "streaming")]
        #[arg(long)]
        device: bool,

        /// Debug logging
        #[arg(short, long)]
        verbose: bool,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Observation {
        phase: GatePhase,
        unlocked: bool,
        engine: Option<EngineState>,
        glitch_active: bool,
    }

    impl Observation {
        fn of(page: &LandingPage) -> Self {
            Observation {
                phase: page.gate().phase(),
                unlocked: page.audio().is_unlocked(),
                engine: page.audio().engine_state(),
                glitch_active: page.glitch().is_active(),
            }
        }
    }

    fn init_tracing(verbose: bool) {
        let filter = if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    fn make_backend(
        args: &Args,
        event_loop: &EventLoop,
    ) -> (Arc<dyn AudioBackend>, Option<SimulatedBackend>) {
        #[cfg(feature = "streaming")]
        if args.device {
            let backend = mystery_gate::RodioBackend::default();
            let backend = if args.start_running {
                backend.start_running()
            } else {
                backend
            };
            return (Arc::new(backend), None);
        }

        let mut backend = if args.start_running {
            SimulatedBackend::running(event_loop.clone())
        } else {
            SimulatedBackend::browser(event_loop.clone())
        };
        backend = backend.with_resume_latency_ms(args.resume_latency_ms);
        if args.deny_audio {
            backend = backend.deny_audio();
        }
        (Arc::new(backend.clone()), Some(backend))
    }

    pub(crate) fn default_duration_ms(config: &LandingConfig) -> u64 {
        config
            .gate_exit_duration_ms
            .saturating_add(config.glitch_initial_delay_ms)
            .saturating_add(500)
    }

    fn print_gate(page: &LandingPage) {
        let copy = page.gate().copy();
        println!("  {}", copy.symbol);
        for line in &copy.prompt {
            println!("  {}", line);
        }
        println!("  [ {} ]", copy.button_label.to_uppercase());
        println!("  {}", copy.hint);
        println!();
    }

    fn print_changes(now_ms: u64, last: &Observation, current: &Observation) {
        if last.phase != current.phase {
            println!("[{:>6} ms] gate: {:?} -> {:?}", now_ms, last.phase, current.phase);
        }
        if last.engine != current.engine {
            println!(
                "[{:>6} ms] audio engine: {:?} -> {:?}",
                now_ms, last.engine, current.engine
            );
        }
        if last.unlocked != current.unlocked {
            println!("[{:>6} ms] audio unlocked", now_ms);
        }
        if last.glitch_active != current.glitch_active {
            println!("[{:>6} ms] glitch active", now_ms);
        }
    }

    pub fn run() -> Result<()> {
        let args = Args::parse();
        init_tracing(args.verbose);

        let config = match &args.config {
            Some(path) => LandingConfig::from_path(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => LandingConfig::default(),
        };

        if args.print_config {
            println!("{}", config.to_json_string()?);
            return Ok(());
        }

        let event_loop = EventLoop::new();
        let (backend, simulated) = make_backend(&args, &event_loop);
        let mut page = LandingPage::new(config.clone(), backend, event_loop.clone())?;

        print_gate(&page);

        let end_ms = args.duration_ms.unwrap_or_else(|| default_duration_ms(&config));
        let frame_ms = args.frame_ms.max(1);
        let mut next_click_ms = args.first_click_ms;
        let mut clicks_sent = 0u32;
        let mut last = Observation::of(&page);

        loop {
            while clicks_sent < args.clicks && event_loop.now_ms() >= next_click_ms {
                let dispatch = page.handle(InputEvent::click_cta());
                clicks_sent += 1;
                next_click_ms = next_click_ms.saturating_add(args.click_interval_ms);
                println!(
                    "[{:>6} ms] click #{} -> {:?}",
                    event_loop.now_ms(),
                    clicks_sent,
                    dispatch
                );
            }

            page.render_frame();
            let current = Observation::of(&page);
            print_changes(event_loop.now_ms(), &last, &current);
            last = current;

            if event_loop.now_ms() >= end_ms {
                break;
            }
            if args.realtime {
                std::thread::sleep(Duration::from_millis(frame_ms));
            }
            event_loop.advance(frame_ms);
            page.reconcile();
        }

        let stats = page.audio().stats();
        println!();
        println!(
            "Session: {} ms, {} activations, entered at {:?} ms",
            event_loop.now_ms(),
            page.gate().session().activations(),
            page.gate().session().entered_at_ms()
        );
        println!(
            "Audio: {} engine(s), {} resume request(s), {} primer(s), {} failure(s), {} joined call(s)",
            stats.engines_created,
            stats.resume_requests,
            stats.primers_played,
            stats.failures,
            stats.joined_calls
        );
        if let Some(backend) = simulated {
            let counters = backend.counters();
            println!(
                "Platform: {} construction attempt(s), {} buffer(s) played",
                counters.create_attempts, counters.buffers_played
            );
        }
        println!(
            "Glitch: {} (fired at {:?} ms)",
            if page.glitch().is_active() { "active" } else { "idle" },
            page.glitch().scheduler().fired_at_ms()
        );
        println!("Frames rendered: {:?}", page.scene().frames_rendered());

        page.teardown();
        Ok(())
    }
}


#[cfg(feature = "simulated")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
