mod adjust;
mod channel;
mod cli;
mod color;
mod control;
mod controller;
mod event_loop;
mod outputs;
mod shm;
mod wayland;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wayland_client::Connection;

use adjust::{AdjustmentState, DEFAULT_TEMP};
use channel::{ControlSource, SignalNotifier, fifo_path};
use cli::Opts;
use wayland::AppState;

fn main() -> Result<()> {
    let opts = match Opts::try_parse_args(std::env::args_os()) {
        Ok(opts) => opts,
        Err(err) => err.exit(),
    };

    let Some((opts, temperature)) =
        opts.and_then(|o| o.start_temperature(DEFAULT_TEMP).map(|t| (o, t)))
    else {
        eprintln!("usage: redway <temperature>");
        return Ok(());
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let initial = AdjustmentState::new(temperature, opts.gamma, i64::from(opts.contrast));

    let fifo = match opts.fifo {
        Some(path) => path,
        None => fifo_path(|name| std::env::var(name).ok())?,
    };
    let mut fifo_source = ControlSource::fifo(&fifo)
        .with_context(|| format!("open control FIFO {}", fifo.display()))?;
    info!(path = %fifo.display(), "listening for commands");
    let mut signals = SignalNotifier::install().context("install signal handlers")?;

    let conn = Connection::connect_to_env().context("connect wayland display")?;
    let mut event_queue = conn.new_event_queue();
    let qh = event_queue.handle();
    conn.display().get_registry(&qh, ());

    let mut state = AppState::new(initial);
    event_queue
        .roundtrip(&mut state)
        .context("initial wayland roundtrip")?;
    if state.gamma_mgr.is_none() {
        return Err(anyhow!("Compositor lacks wlr-gamma-control-unstable-v1"));
    }
    state.ensure_gamma_all(&qh);
    event_queue
        .roundtrip(&mut state)
        .context("gamma setup roundtrip")?;
    if let Some(err) = state.fatal.take() {
        return Err(err).context("could not create gamma table");
    }

    let current = state.controller.state();
    info!(
        temperature = current.temperature,
        gamma = current.gamma,
        contrast = current.contrast,
        outputs = state.controller.outputs().len(),
        "started"
    );

    event_loop::run(
        &mut event_queue,
        &mut state,
        &mut [&mut fifo_source, signals.source_mut()],
    )
}
