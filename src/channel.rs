use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::stat::Mode;
use nix::unistd::{mkfifo, pipe2};
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, info, warn};

const APP_DIR: &str = "redway";
const FIFO_NAME: &str = "io";
/// Longest unterminated command kept waiting for its terminator.
const MAX_PENDING: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("none of XDG_RUNTIME_DIR, XDG_STATE_HOME or HOME is set")]
    NoStateDir,
    #[error("failed to create {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to create FIFO {}: {source}", path.display())]
    Mkfifo { path: PathBuf, source: Errno },
    #[error("{} exists and is not a FIFO", .0.display())]
    NotAFifo(PathBuf),
    #[error("failed to open FIFO {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to set up signal notification: {0}")]
    Signal(#[from] Errno),
}

/// Control FIFO location: `$XDG_RUNTIME_DIR/redway/io`, else
/// `$XDG_STATE_HOME/redway/io`, else `$HOME/.local/state/redway/io`.
pub fn fifo_path<F>(var: F) -> Result<PathBuf, ChannelError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| var(name).filter(|v| !v.is_empty());
    let base = match non_empty("XDG_RUNTIME_DIR").or_else(|| non_empty("XDG_STATE_HOME")) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = non_empty("HOME").ok_or(ChannelError::NoStateDir)?;
            PathBuf::from(home).join(".local").join("state")
        }
    };
    Ok(base.join(APP_DIR).join(FIFO_NAME))
}

/// A non-blocking descriptor that delivers command bytes.
pub struct ControlSource {
    name: &'static str,
    reader: File,
    // held open so the FIFO never reports hang-up between writers
    _writer: File,
    /// Bytes after the last terminator, waiting for the rest of the token.
    pending: Vec<u8>,
}

impl ControlSource {
    /// Creates the FIFO (and its parent directories) if needed and opens it.
    pub fn fifo(path: &Path) -> Result<Self, ChannelError> {
        if let Some(parent) = path.parent() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(parent)
                .map_err(|source| ChannelError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        match mkfifo(path, Mode::from_bits_truncate(0o660)) {
            Ok(()) => info!(path = %path.display(), "created control FIFO"),
            Err(Errno::EEXIST) => {}
            Err(source) => {
                return Err(ChannelError::Mkfifo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        let open = |write: bool| {
            OpenOptions::new()
                .read(!write)
                .write(write)
                .custom_flags(OFlag::O_NONBLOCK.bits() | OFlag::O_CLOEXEC.bits())
                .open(path)
                .map_err(|source| ChannelError::Open {
                    path: path.to_path_buf(),
                    source,
                })
        };
        // the read end has to exist before a non-blocking writer may open
        let reader = open(false)?;
        let is_fifo = reader
            .metadata()
            .map_err(|source| ChannelError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .file_type()
            .is_fifo();
        if !is_fifo {
            return Err(ChannelError::NotAFifo(path.to_path_buf()));
        }
        let writer = open(true)?;

        Ok(Self::new("fifo", reader, writer))
    }

    fn new(name: &'static str, reader: File, writer: File) -> Self {
        Self {
            name,
            reader,
            _writer: writer,
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Drains the descriptor and appends every complete, terminated token
    /// to `buf`. Returns the number of bytes read.
    ///
    /// An unterminated tail is held back until a later read completes it,
    /// except a lone `+` or `-`, which cannot grow into another command.
    pub fn read_commands(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let read = drain(&mut self.reader, &mut self.pending);

        let complete = self
            .pending
            .iter()
            .rposition(|&b| b == b'\n' || b == 0)
            .map_or(0, |last| last + 1);
        buf.extend(self.pending.drain(..complete));

        if matches!(self.pending.trim_ascii(), b"+" | b"-") {
            buf.append(&mut self.pending);
        } else if self.pending.len() > MAX_PENDING {
            warn!(source = self.name, bytes = self.pending.len(), "dropping unterminated input");
            self.pending.clear();
        }
        read
    }
}

/// Reads until the descriptor would block or reports end of file.
fn drain(reader: &mut File, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut chunk = [0u8; 512];
    let mut total = 0;
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                total += n;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

impl AsFd for ControlSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

/// Write end of the signal pipe, read by the handlers below.
static NOTIFY_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn notify_increase(_: nix::libc::c_int) {
    notify(b"+\n");
}

extern "C" fn notify_decrease(_: nix::libc::c_int) {
    notify(b"-\n");
}

fn notify(marker: &[u8]) {
    let fd: RawFd = NOTIFY_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    // SAFETY: the descriptor stays open while it is published in NOTIFY_FD.
    write_marker(unsafe { BorrowedFd::borrow_raw(fd) }, marker);
}

/// write(2) that leaves `errno` as the interrupted code last saw it.
fn write_marker(fd: BorrowedFd<'_>, marker: &[u8]) {
    let saved = Errno::last_raw();
    // a full pipe already holds pending steps; dropping this one is fine
    let _ = nix::unistd::write(fd, marker);
    Errno::set_raw(saved);
}

/// SIGUSR1 / SIGUSR2 turned into `+` / `-` tokens on a pipe.
pub struct SignalNotifier {
    source: ControlSource,
}

impl SignalNotifier {
    pub fn install() -> Result<Self, ChannelError> {
        let (read, write) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;
        let writer = File::from(write);
        NOTIFY_FD.store(writer.as_raw_fd(), Ordering::Relaxed);

        let handlers = [
            (Signal::SIGUSR1, notify_increase as extern "C" fn(nix::libc::c_int)),
            (Signal::SIGUSR2, notify_decrease),
        ];
        for (signal, handler) in handlers {
            let action = SigAction::new(
                SigHandler::Handler(handler),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            // SAFETY: the handler only loads an atomic and calls write(2).
            unsafe { sigaction(signal, &action) }?;
            debug!(?signal, "installed signal handler");
        }

        Ok(Self {
            source: ControlSource::new("signal", File::from(read), writer),
        })
    }

    pub fn source_mut(&mut self) -> &mut ControlSource {
        &mut self.source
    }
}

impl Drop for SignalNotifier {
    fn drop(&mut self) {
        NOTIFY_FD.store(-1, Ordering::Relaxed);
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for signal in [Signal::SIGUSR1, Signal::SIGUSR2] {
            // SAFETY: restoring the default disposition.
            let _ = unsafe { sigaction(signal, &default) };
        }
    }
}
