//! Test doubles for the terminal, the process boundary and the log.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

use crate::{
    cmd::{Executor, ExitIndicator, ProcessOutput, Runner},
    config::Answers,
    logger::LogSink,
    lsblk::Disk,
    pipeline::InstallContext,
    profile::PROFILES,
    steps::uefi::BootMode,
    filter::{ChoiceFilter, ChoiceSource},
    term::{Echo, Key, Terminal, TerminalSize},
};

// ── Log buffer ────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Recording runner ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Call {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
}

impl Call {
    pub fn program(&self) -> &str {
        effective_program(&self.argv)
    }
}

struct Failure {
    program: String,
    code: i32,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct RunnerState {
    calls: Vec<Call>,
    failures: Vec<Failure>,
    responses: Vec<(String, String)>,
}

/// Records every spawned command; succeeds unless told otherwise.
#[derive(Clone, Default)]
pub struct RecordingRunner(Rc<RefCell<RunnerState>>);

impl RecordingRunner {
    /// Every invocation of `program` exits with `code`.
    pub fn fail_on(self, program: &str, code: i32) -> Self {
        self.push_failure(program, code, None)
    }

    /// The next `times` invocations of `program` exit with `code`.
    pub fn fail_times(self, program: &str, code: i32, times: usize) -> Self {
        self.push_failure(program, code, Some(times))
    }

    fn push_failure(self, program: &str, code: i32, remaining: Option<usize>) -> Self {
        self.0.borrow_mut().failures.push(Failure {
            program: program.to_string(),
            code,
            remaining,
        });
        self
    }

    /// Invocations of `program` print `stdout`.
    pub fn respond(self, program: &str, stdout: &str) -> Self {
        self.0
            .borrow_mut()
            .responses
            .push((program.to_string(), stdout.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.program().to_string()).collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&mut self, argv: &[String], stdin: Option<&str>) -> io::Result<ProcessOutput> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call {
            argv: argv.to_vec(),
            stdin: stdin.map(str::to_string),
        });

        let program = effective_program(argv);
        let code = match state
            .failures
            .iter_mut()
            .find(|f| f.program == program && f.remaining != Some(0))
        {
            Some(failure) => {
                if let Some(n) = failure.remaining.as_mut() {
                    *n -= 1;
                }
                failure.code
            }
            None => 0,
        };
        let stdout = state
            .responses
            .iter()
            .find(|(p, _)| p == program)
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(ProcessOutput {
            exit: ExitIndicator::Code(code),
            stdout,
            stderr: String::new(),
        })
    }
}

/// The program a wrapped argv ultimately runs.
fn effective_program(argv: &[String]) -> &str {
    let mut rest = argv;
    if rest.first().map(String::as_str) == Some("arch-chroot") {
        rest = &rest[2.min(rest.len())..];
        if rest.first().map(String::as_str) == Some("runuser") {
            rest = &rest[4.min(rest.len())..];
        }
    }
    rest.first().map(String::as_str).unwrap_or("")
}

// ── Scripted terminal ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Input {
    Key(Key),
    Line(String),
}

/// A terminal fed from a script of keys and lines.
///
/// Running out of script reads as end of input.
pub struct ScriptedTerminal {
    inputs: VecDeque<Input>,
    output: Vec<u8>,
    pub size: TerminalSize,
    pub pauses: usize,
    pub hidden_reads: usize,
    pub clears: usize,
    /// Every cursor move, as `(row, col)`.
    pub moves: Vec<(u16, u16)>,
}

impl ScriptedTerminal {
    pub fn new() -> Self {
        Self {
            inputs: VecDeque::new(),
            output: Vec::new(),
            size: TerminalSize { cols: 100 },
            pauses: 0,
            hidden_reads: 0,
            clears: 0,
            moves: Vec::new(),
        }
    }

    pub fn key(mut self, key: Key) -> Self {
        self.inputs.push_back(Input::Key(key));
        self
    }

    pub fn keys(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.inputs.extend(keys.into_iter().map(Input::Key));
        self
    }

    pub fn line(mut self, line: &str) -> Self {
        self.inputs.push_back(Input::Line(line.to_string()));
        self
    }

    pub fn lines<'a>(mut self, lines: impl IntoIterator<Item = &'a str>) -> Self {
        self.inputs
            .extend(lines.into_iter().map(|l| Input::Line(l.to_string())));
        self
    }

    /// Everything drawn so far, without escape sequences.
    pub fn screen(&self) -> String {
        console::strip_ansi_codes(&String::from_utf8_lossy(&self.output)).into_owned()
    }

    pub fn raw_output(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

impl Write for ScriptedTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Terminal for ScriptedTerminal {
    fn size(&self) -> TerminalSize {
        self.size
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        self.clears += 1;
        self.output.extend_from_slice(b"\x1b[2J\x1b[H");
        Ok(())
    }

    fn move_to(&mut self, row: u16, col: u16) -> io::Result<()> {
        self.moves.push((row, col));
        write!(self.output, "\x1b[{};{}H", row, col)
    }

    fn read_key(&mut self) -> io::Result<Option<Key>> {
        match self.inputs.pop_front() {
            None => Ok(None),
            Some(Input::Key(key)) => Ok(Some(key)),
            Some(Input::Line(line)) => panic!("script expected a key, found line {:?}", line),
        }
    }

    fn read_line(&mut self, echo: Echo) -> io::Result<Option<String>> {
        if echo == Echo::Hidden {
            self.hidden_reads += 1;
        }
        match self.inputs.pop_front() {
            None => Ok(None),
            Some(Input::Line(line)) => Ok(Some(line)),
            Some(Input::Key(key)) => panic!("script expected a line, found key {:?}", key),
        }
    }

    fn pause(&mut self, _duration: Duration) {
        self.pauses += 1;
    }
}

// ── Queued picker ─────────────────────────────────────────────────────────────

/// Answers picker calls from a queue; `None` means nothing was picked.
#[derive(Default)]
pub struct QueueFilter {
    answers: VecDeque<Option<String>>,
    pub calls: usize,
}

impl QueueFilter {
    pub fn with(answers: &[Option<&str>]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.map(str::to_string)).collect(),
            calls: 0,
        }
    }
}

impl ChoiceFilter for QueueFilter {
    fn choose(&mut self, _source: &ChoiceSource) -> io::Result<Option<String>> {
        self.calls += 1;
        Ok(self.answers.pop_front().flatten())
    }
}

// ── Install context ───────────────────────────────────────────────────────────

pub fn answers() -> Answers {
    Answers {
        username: "tony".into(),
        password: "hunter2".into(),
        hostname: "tonarchy".into(),
        keyboard: "us".into(),
        timezone: "Europe/Berlin".into(),
        root_password: None,
    }
}

/// A beginner-profile run against `/dev/sda`.
pub fn install_context<'a>(
    log: &'a LogSink,
    runner: RecordingRunner,
    target: impl Into<PathBuf>,
    boot: BootMode,
) -> InstallContext<'a> {
    InstallContext {
        exec: Executor::new(log, Box::new(runner), target),
        answers: answers(),
        disk: Disk {
            name: "sda".into(),
            size: "20G".into(),
            model: "QEMU HARDDISK".into(),
        },
        boot,
        profile: &PROFILES[0],
        assets: PathBuf::from("/usr/share/tonarchy"),
    }
}

/// The directories `pacstrap` and `useradd` would have created.
pub fn prepare_target(root: &Path) {
    for dir in ["etc", "boot", "home/tony", "var/log"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
}
