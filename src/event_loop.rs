use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use tracing::{debug, warn};
use wayland_client::EventQueue;
use wayland_client::backend::WaylandError;

use crate::channel::ControlSource;
use crate::controller::Controller;
use crate::outputs::RampSink;
use crate::wayland::AppState;

/// Runs until the display connection fails.
pub fn run(
    queue: &mut EventQueue<AppState>,
    state: &mut AppState,
    sources: &mut [&mut ControlSource],
) -> Result<()> {
    let mut input = Vec::new();
    loop {
        let changed = dispatch(queue, state, sources, &mut input)?;
        if let Some(err) = state.fatal.take() {
            return Err(err).context("could not create gamma table");
        }
        if changed {
            state.controller.refresh();
        }
    }
}

/// One loop iteration. Returns whether the control input changed the
/// adjustment state.
fn dispatch(
    queue: &mut EventQueue<AppState>,
    state: &mut AppState,
    sources: &mut [&mut ControlSource],
    input: &mut Vec<u8>,
) -> Result<bool> {
    let Some(guard) = queue.prepare_read() else {
        queue
            .dispatch_pending(state)
            .context("dispatch pending wayland events")?;
        return Ok(false);
    };

    loop {
        match queue.flush() {
            Ok(()) => break,
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                let mut fds = [PollFd::new(guard.connection_fd(), PollFlags::POLLOUT)];
                wait(&mut fds).context("wait for wayland socket to drain")?;
            }
            Err(err) => return Err(err).context("flush wayland connection"),
        }
    }

    let (display_ready, ready) = poll_ready(guard.connection_fd(), sources)
        .context("poll wayland and control descriptors")?;
    // control input is consumed before the display read so the state it sets
    // is in place when the queued events are dispatched
    let changed = drain_ready(sources, &ready, &mut state.controller, input);

    if display_ready {
        guard.read().context("read wayland events")?;
        queue
            .dispatch_pending(state)
            .context("dispatch wayland events")?;
    } else {
        drop(guard);
    }

    Ok(changed)
}

/// Waits for the display or any control source. Returns the display's
/// readiness and one flag per source.
fn poll_ready(
    display: BorrowedFd<'_>,
    sources: &[&mut ControlSource],
) -> Result<(bool, Vec<bool>), Errno> {
    let mut fds = Vec::with_capacity(sources.len() + 1);
    fds.push(PollFd::new(display, PollFlags::POLLIN));
    for source in sources {
        fds.push(PollFd::new(source.as_fd(), PollFlags::POLLIN));
    }
    wait(&mut fds)?;
    let display_ready = is_readable(&fds[0]);
    Ok((display_ready, fds[1..].iter().map(is_readable).collect()))
}

/// Drains the sources flagged in `ready`, each as its own batch.
fn drain_ready<S: RampSink>(
    sources: &mut [&mut ControlSource],
    ready: &[bool],
    controller: &mut Controller<S>,
    input: &mut Vec<u8>,
) -> bool {
    let mut changed = false;
    for (source, _) in sources.iter_mut().zip(ready).filter(|(_, ready)| **ready) {
        changed |= drain_into(source, controller, input);
    }
    changed
}

/// Blocks until one of `fds` is ready, retrying on EINTR.
fn wait(fds: &mut [PollFd]) -> Result<(), Errno> {
    loop {
        match poll(fds, PollTimeout::NONE) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

fn is_readable(fd: &PollFd) -> bool {
    fd.revents().is_some_and(|flags| {
        flags.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP)
    })
}

/// Drains `source` and applies its commands as one batch.
fn drain_into<S: RampSink>(
    source: &mut ControlSource,
    controller: &mut Controller<S>,
    input: &mut Vec<u8>,
) -> bool {
    input.clear();
    if let Err(err) = source.read_commands(input) {
        warn!(source = source.name(), "failed to read control input: {err}");
    }
    if input.is_empty() {
        return false;
    }
    debug!(source = source.name(), bytes = input.len(), "control input");
    controller.apply_input(input)
}
