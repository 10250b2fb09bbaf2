use std::{
    io::{self, BufRead, Write},
    os::fd::AsFd,
    sync::Mutex,
    time::Duration,
};

pub use console::Key;
use console::Term;
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use crate::error::InstallerError;

// ── Shared types ──────────────────────────────────────────────────────────────

/// Current window width. Always re-queried before a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
}

/// Whether a line read shows what the operator types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Visible,
    Hidden,
}

/// Everything the Menu and Form components need from a terminal.
///
/// `read_key` and `read_line` return `Ok(None)` at end of input.
pub trait Terminal: Write {
    fn size(&self) -> TerminalSize;
    fn clear_screen(&mut self) -> io::Result<()>;
    /// 1-based row and column.
    fn move_to(&mut self, row: u16, col: u16) -> io::Result<()>;
    fn read_key(&mut self) -> io::Result<Option<Key>>;
    fn read_line(&mut self, echo: Echo) -> io::Result<Option<String>>;
    fn pause(&mut self, duration: Duration);
}

// ── Mode stack ────────────────────────────────────────────────────────────────

/// Reads and installs terminal attributes.
pub trait ModeDevice {
    type Mode: Clone;

    fn current(&self) -> io::Result<Self::Mode>;
    fn apply(&mut self, mode: &Self::Mode) -> io::Result<()>;
}

/// Nested terminal modes. Each pop reinstalls the mode that was active
/// before the matching push; `restore` and `Drop` reinstall the mode that
/// was active before the first push.
pub struct ModeStack<D: ModeDevice> {
    device: D,
    saved: Vec<D::Mode>,
}

impl<D: ModeDevice> ModeStack<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            saved: Vec::new(),
        }
    }

    pub fn push(&mut self, adjust: impl FnOnce(&mut D::Mode)) -> io::Result<()> {
        let current = self.device.current()?;
        let mut next = current.clone();
        adjust(&mut next);
        self.device.apply(&next)?;
        self.saved.push(current);
        Ok(())
    }

    pub fn pop(&mut self) -> io::Result<()> {
        match self.saved.pop() {
            Some(previous) => self.device.apply(&previous),
            None => Ok(()),
        }
    }

    pub fn restore(&mut self) {
        if let Some(original) = self.saved.drain(..).next() {
            let _ = self.device.apply(&original);
        }
    }
}

impl<D: ModeDevice> Drop for ModeStack<D> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// termios attributes of standard input.
pub struct StdinModes;

impl ModeDevice for StdinModes {
    type Mode = Termios;

    fn current(&self) -> io::Result<Termios> {
        termios::tcgetattr(io::stdin().as_fd()).map_err(io::Error::from)
    }

    fn apply(&mut self, mode: &Termios) -> io::Result<()> {
        termios::tcsetattr(io::stdin().as_fd(), SetArg::TCSAFLUSH, mode).map_err(io::Error::from)
    }
}

// ── Terminal session ──────────────────────────────────────────────────────────

// Attributes captured by `enter`, kept where the termination handler can
// reach them from its own thread.
static ORIGINAL: Mutex<Option<Termios>> = Mutex::new(None);

/// Restores the attributes captured by the active session, if any.
///
/// Safe to call from the termination handler: a later `Drop` of the session
/// finds nothing to restore.
pub fn restore_original() {
    let saved = match ORIGINAL.lock() {
        Ok(mut guard) => guard.take(),
        Err(_) => None,
    };
    if let Some(original) = saved {
        let _ = termios::tcsetattr(io::stdin().as_fd(), SetArg::TCSAFLUSH, &original);
    }
}

/// Owns the controlling terminal for the lifetime of the wizard.
///
/// Between reads the terminal stays quiet: no echo, no line buffering, no
/// signal characters. Keys are read in raw mode by `console`; line reads
/// push an echo/canonical sub-mode that is popped afterwards. Dropping the
/// session restores the original mode.
pub struct TerminalSession {
    modes: ModeStack<StdinModes>,
    term: Term,
}

impl TerminalSession {
    pub fn enter() -> Result<Self, InstallerError> {
        let term = Term::stdout();
        let original = StdinModes
            .current()
            .map_err(|_| InstallerError::NotATerminal)?;
        if !term.is_term() {
            return Err(InstallerError::NotATerminal);
        }

        if let Ok(mut guard) = ORIGINAL.lock() {
            *guard = Some(original);
        }

        let mut modes = ModeStack::new(StdinModes);
        modes.push(|quiet| {
            quiet
                .local_flags
                .remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG);
        })?;
        Ok(Self { modes, term })
    }

    /// Explicitly leaves the session. Dropping it has the same effect.
    pub fn leave(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        let _ = self.term.write_str("\x1b[0m");
        let _ = self.term.show_cursor();
        self.modes.restore();
        if let Ok(mut guard) = ORIGINAL.lock() {
            guard.take();
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.restore();
    }
}

impl Write for TerminalSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.term.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.term.flush()
    }
}

impl Terminal for TerminalSession {
    fn size(&self) -> TerminalSize {
        let (_rows, cols) = self.term.size();
        TerminalSize { cols }
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        self.term.clear_screen()
    }

    fn move_to(&mut self, row: u16, col: u16) -> io::Result<()> {
        self.term.move_cursor_to(
            usize::from(col.saturating_sub(1)),
            usize::from(row.saturating_sub(1)),
        )
    }

    fn read_key(&mut self) -> io::Result<Option<Key>> {
        self.term.flush()?;
        match self.term.read_key_raw() {
            // ^C ends input the same way end of file does.
            Ok(Key::CtrlC) => Ok(None),
            Ok(key) => Ok(Some(key)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_line(&mut self, echo: Echo) -> io::Result<Option<String>> {
        self.term.flush()?;
        self.modes.push(|line| {
            line.local_flags.insert(LocalFlags::ICANON);
            match echo {
                Echo::Visible => line.local_flags.insert(LocalFlags::ECHO),
                Echo::Hidden => line.local_flags.remove(LocalFlags::ECHO),
            }
        })?;

        let mut buf = String::new();
        let read = io::stdin().lock().read_line(&mut buf);
        self.modes.pop()?;

        match read? {
            0 => Ok(None),
            _ => Ok(Some(buf.trim_end_matches(['\n', '\r']).to_string())),
        }
    }

    fn pause(&mut self, duration: Duration) {
        let _ = self.term.flush();
        std::thread::sleep(duration);
    }
}
