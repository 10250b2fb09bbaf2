use std::{
    fmt, fs,
    io::{self, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::logger::LogSink;

const CHROOT_TOOL: &str = "arch-chroot";
const SECRET_MASK: &str = "********";

// ── Requests ──────────────────────────────────────────────────────────────────

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecContext {
    /// The live installer environment.
    Host,
    /// Inside the target root, as root.
    Chroot,
    /// Inside the target root, after dropping to the given user.
    ChrootAsUser(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    secret: bool,
}

/// A typed command: context plus an argument vector. No shell is involved,
/// so operator-supplied values are never re-parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    context: ExecContext,
    program: String,
    args: Vec<Arg>,
    stdin: Option<String>,
}

impl CommandRequest {
    pub fn new(context: ExecContext, program: impl Into<String>) -> Self {
        Self {
            context,
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn host(program: impl Into<String>) -> Self {
        Self::new(ExecContext::Host, program)
    }

    pub fn chroot(program: impl Into<String>) -> Self {
        Self::new(ExecContext::Chroot, program)
    }

    pub fn as_user(user: impl Into<String>, program: impl Into<String>) -> Self {
        Self::new(ExecContext::ChrootAsUser(user.into()), program)
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: false,
        });
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    /// An argument that is masked wherever the command is displayed or logged.
    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: true,
        });
        self
    }

    /// Data fed to the command's standard input. Never logged.
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument vector actually spawned, with the context wrapper applied.
    pub fn argv(&self, target: &Path) -> Vec<String> {
        self.wrapped(target, |arg| arg.value.clone())
    }

    /// Shell-quoted rendering for the log, with secret arguments masked.
    pub fn display(&self, target: &Path) -> String {
        let shown = self.wrapped(target, |arg| {
            if arg.secret {
                SECRET_MASK.to_string()
            } else {
                arg.value.clone()
            }
        });
        shell_words::join(shown)
    }

    fn wrapped(&self, target: &Path, render: impl Fn(&Arg) -> String) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 6);
        match &self.context {
            ExecContext::Host => {}
            ExecContext::Chroot => {
                argv.push(CHROOT_TOOL.to_string());
                argv.push(target.display().to_string());
            }
            ExecContext::ChrootAsUser(user) => {
                argv.push(CHROOT_TOOL.to_string());
                argv.push(target.display().to_string());
                argv.extend(["runuser", "-u", user.as_str(), "--"].map(String::from));
            }
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().map(render));
        argv
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitIndicator {
    Code(i32),
    Signal,
    SpawnFailed(String),
}

impl fmt::Display for ExitIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitIndicator::Code(code) => write!(f, "exit {}", code),
            ExitIndicator::Signal => f.write_str("killed by signal"),
            ExitIndicator::SpawnFailed(reason) => write!(f, "spawn failed: {}", reason),
        }
    }
}

/// Raw output of one spawned process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit: ExitIndicator,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub succeeded: bool,
    pub stdout: String,
}

// ── Process boundary ──────────────────────────────────────────────────────────

/// Spawns a fully built argument vector and waits for it.
pub trait Runner {
    fn run(&mut self, argv: &[String], stdin: Option<&str>) -> io::Result<ProcessOutput>;
}

/// Runs commands for real, capturing stdout and stderr.
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&mut self, argv: &[String], stdin: Option<&str>) -> io::Result<ProcessOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // The pipe is closed at the end of the arm so the child sees EOF.
        let fed = match (stdin, child.stdin.take()) {
            (Some(data), Some(mut pipe)) => pipe.write_all(data.as_bytes()),
            _ => Ok(()),
        };

        // Always reaped, even when the child stopped reading early.
        let output = child.wait_with_output()?;
        let exit = match output.status.code() {
            Some(code) => ExitIndicator::Code(code),
            None => ExitIndicator::Signal,
        };

        // A nonzero exit already explains a short write.
        if let Err(e) = fed {
            if exit == ExitIndicator::Code(0) {
                return Err(e);
            }
        }

        Ok(ProcessOutput {
            exit,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ── Composite payloads ────────────────────────────────────────────────────────

/// A file placed in a user's home directory inside the target.
#[derive(Debug, Clone)]
pub struct DotFile {
    pub name: &'static str,
    pub content: String,
    pub mode: u32,
}

/// A service drop-in override under `/etc/systemd/system/<unit>.d/`.
#[derive(Debug, Clone)]
pub struct DropIn {
    pub unit_dir: String,
    pub file: String,
    /// `(key, Some(value))` renders `key=value`; `(key, None)` renders `key`.
    pub entries: Vec<(String, Option<String>)>,
}

impl DropIn {
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| match value {
                Some(v) => format!("{}={}\n", key, v),
                None => format!("{}\n", key),
            })
            .collect()
    }
}

// ── Executor ──────────────────────────────────────────────────────────────────

/// The privileged execution layer.
///
/// Every command is logged before it runs and again on failure. Callers only
/// learn success or failure; nothing is rolled back, so a failed command may
/// leave the target partly modified.
pub struct Executor<'a> {
    log: &'a LogSink,
    runner: Box<dyn Runner + 'a>,
    target: PathBuf,
    dry_run: bool,
}

impl<'a> Executor<'a> {
    pub fn new(log: &'a LogSink, runner: Box<dyn Runner + 'a>, target: impl Into<PathBuf>) -> Self {
        Self {
            log,
            runner,
            target: target.into(),
            dry_run: false,
        }
    }

    /// In dry-run mode mutating commands and target writes are only logged.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn log(&self) -> &'a LogSink {
        self.log
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Maps an absolute path inside the installed system to the host path.
    pub fn target_path(&self, inner: &str) -> PathBuf {
        self.target.join(inner.trim_start_matches('/'))
    }

    pub fn execute(&mut self, req: &CommandRequest) -> CommandResult {
        let shown = req.display(&self.target);
        self.log.info(format!("Executing: {}", shown));

        if self.dry_run {
            self.log.debug(format!("[dry-run] skipped: {}", shown));
            return CommandResult {
                succeeded: true,
                stdout: String::new(),
            };
        }

        self.spawn(req, &shown)
    }

    pub fn run(&mut self, req: &CommandRequest) -> bool {
        self.execute(req).succeeded
    }

    /// Runs a command whose failure must not stop the stage.
    pub fn run_best_effort(&mut self, req: &CommandRequest) {
        if !self.run(req) {
            self.log.warn(format!("Continuing without: {}", req.program()));
        }
    }

    /// Runs a command and returns its first non-empty output line, trimmed.
    ///
    /// Used to read back values produced by earlier steps (e.g. a partition
    /// UUID); in dry-run mode a placeholder is returned instead.
    pub fn capture(&mut self, req: &CommandRequest) -> Option<String> {
        if self.dry_run {
            self.execute(req);
            return Some("00000000-0000-0000-0000-000000000000".to_string());
        }
        let result = self.execute(req);
        if !result.succeeded {
            return None;
        }
        result
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    }

    /// Runs a read-only command, even in dry-run mode, returning all of stdout.
    pub fn query(&mut self, req: &CommandRequest) -> Option<String> {
        let shown = req.display(&self.target);
        self.log.info(format!("Querying: {}", shown));
        let result = self.spawn(req, &shown);
        result.succeeded.then_some(result.stdout)
    }

    /// Appends the command's stdout to a file inside the target (`cmd >> file`).
    pub fn append_output(&mut self, req: &CommandRequest, inner: &str) -> bool {
        let result = self.execute(req);
        if !result.succeeded {
            return false;
        }
        if self.dry_run {
            return true;
        }
        let path = self.target_path(inner);
        let appended = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(result.stdout.as_bytes()));
        self.file_outcome(appended, "append to", &path)
    }

    pub fn write_file(&mut self, inner: &str, content: &str) -> bool {
        let path = self.target_path(inner);
        self.log.info(format!("Writing file: {}", path.display()));
        if self.dry_run {
            return true;
        }
        self.file_outcome(fs::write(&path, content), "write", &path)
    }

    /// `mkdir -p` plus mode. A mode that cannot be applied is only a warning.
    pub fn create_dir(&mut self, inner: &str, mode: u32) -> bool {
        let path = self.target_path(inner);
        self.log.info(format!("Creating directory: {}", path.display()));
        if self.dry_run {
            return true;
        }
        if !self.file_outcome(fs::create_dir_all(&path), "create", &path) {
            return false;
        }
        if fs::set_permissions(&path, fs::Permissions::from_mode(mode)).is_err() {
            self.log
                .warn(format!("Failed to set permissions on directory: {}", path.display()));
        }
        true
    }

    pub fn set_mode(&mut self, inner: &str, mode: u32) -> bool {
        let path = self.target_path(inner);
        self.log
            .info(format!("Setting mode {:o} on {}", mode, path.display()));
        if self.dry_run {
            return true;
        }
        self.file_outcome(
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)),
            "chmod",
            &path,
        )
    }

    /// Changes ownership inside the target, where the user actually exists.
    pub fn chown(&mut self, inner: &str, user: &str, recursive: bool) -> bool {
        let mut req = CommandRequest::chroot("chown");
        if recursive {
            req = req.arg("-R");
        }
        self.run(&req.arg(format!("{}:{}", user, user)).arg(inner))
    }

    /// Copies a file or tree from the live medium to exactly `inner` in the
    /// target (`cp -rT`, so a directory's contents land in `inner`).
    pub fn copy_in(&mut self, source: &Path, inner: &str) -> bool {
        let dest = self.target_path(inner);
        self.run(
            &CommandRequest::host("cp")
                .arg("-rT")
                .arg(source.display().to_string())
                .arg(dest.display().to_string()),
        )
    }

    /// Write a dotfile, then set its mode and owner. Stops at the first failure.
    pub fn install_dotfile(&mut self, user: &str, dotfile: &DotFile) -> bool {
        let inner = format!("/home/{}/{}", user, dotfile.name);
        self.log
            .info(format!("Creating dotfile {} for user {}", dotfile.name, user));
        self.write_file(&inner, &dotfile.content)
            && self.set_mode(&inner, dotfile.mode)
            && self.chown(&inner, user, false)
    }

    pub fn clone_as_user(&mut self, user: &str, repo_url: &str, dest: &str) -> bool {
        self.log
            .info(format!("Cloning {} to {} as user {}", repo_url, dest, user));
        self.run(
            &CommandRequest::as_user(user, "git")
                .arg("clone")
                .arg(repo_url)
                .arg(dest),
        )
    }

    pub fn write_drop_in(&mut self, drop_in: &DropIn) -> bool {
        let dir = format!("/etc/systemd/system/{}", drop_in.unit_dir);
        let file = format!("{}/{}", dir, drop_in.file);
        self.log.info(format!("Setting up service override: {}", file));
        self.create_dir(&dir, 0o755) && self.write_file(&file, &drop_in.render())
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn spawn(&mut self, req: &CommandRequest, shown: &str) -> CommandResult {
        let argv = req.argv(&self.target);
        let output = match self.runner.run(&argv, req.stdin.as_deref()) {
            Ok(output) => output,
            Err(e) => ProcessOutput {
                exit: ExitIndicator::SpawnFailed(e.to_string()),
                stdout: String::new(),
                stderr: String::new(),
            },
        };

        // Command output goes to the log; stdin never does.
        for line in output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .filter(|l| !l.trim().is_empty())
        {
            self.log.debug(format!("  {}", line));
        }

        let succeeded = output.exit == ExitIndicator::Code(0);
        if !succeeded {
            self.log
                .error(format!("Command failed ({}): {}", output.exit, shown));
        }
        CommandResult {
            succeeded,
            stdout: output.stdout,
        }
    }

    fn file_outcome(&self, result: io::Result<()>, action: &str, path: &Path) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.log
                    .error(format!("Failed to {} {}: {}", action, path.display(), e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, SharedBuf};

    fn sink() -> (LogSink, SharedBuf) {
        let buf = SharedBuf::default();
        (LogSink::from_writer(Box::new(buf.clone())), buf)
    }

    #[test]
    fn host_and_chroot_render_differently() {
        let target = Path::new("/mnt");
        let host = CommandRequest::host("locale-gen");
        let chroot = CommandRequest::chroot("locale-gen");

        assert_eq!(host.display(target), "locale-gen");
        assert_eq!(chroot.display(target), "arch-chroot /mnt locale-gen");
        assert_ne!(host.display(target), chroot.display(target));
    }

    #[test]
    fn chroot_as_user_drops_privilege_inside_target() {
        let req = CommandRequest::as_user("tony", "git").args(["clone", "url", "/home/tony/x"]);
        assert_eq!(
            req.argv(Path::new("/mnt")),
            vec![
                "arch-chroot", "/mnt", "runuser", "-u", "tony", "--", "git", "clone", "url",
                "/home/tony/x"
            ]
        );
    }

    #[test]
    fn operator_values_stay_single_arguments() {
        let req = CommandRequest::host("echo").arg("a'; rm -rf / #");
        let argv = req.argv(Path::new("/mnt"));
        assert_eq!(argv, vec!["echo", "a'; rm -rf / #"]);
        // The log shows it quoted, never as two commands.
        assert_eq!(shell_words::split(&req.display(Path::new("/mnt"))).unwrap(), argv);
    }

    #[test]
    fn logged_commands_differ_by_context() {
        let (log, buf) = sink();
        let runner = RecordingRunner::default();
        let mut exec = Executor::new(&log, Box::new(runner.clone()), "/mnt");

        assert!(exec.run(&CommandRequest::host("hwclock").arg("--systohc")));
        assert!(exec.run(&CommandRequest::chroot("hwclock").arg("--systohc")));

        let text = buf.contents();
        assert!(text.contains("[INFO] Executing: hwclock --systohc"));
        assert!(text.contains("[INFO] Executing: arch-chroot /mnt hwclock --systohc"));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn failure_is_logged_with_exit_indicator() {
        let (log, buf) = sink();
        let runner = RecordingRunner::default().fail_on("wipefs", 1);
        let mut exec = Executor::new(&log, Box::new(runner), "/mnt");

        assert!(!exec.run(&CommandRequest::host("wipefs").args(["-af", "/dev/sda"])));
        assert!(buf
            .contents()
            .contains("[ERROR] Command failed (exit 1): wipefs -af /dev/sda"));
    }

    #[test]
    fn command_output_is_logged() {
        let (log, buf) = sink();
        let runner = RecordingRunner::default()
            .respond("locale-gen", "Generating locales...\n  en_US.UTF-8... done\n");
        let mut exec = Executor::new(&log, Box::new(runner), "/mnt");

        assert!(exec.run(&CommandRequest::chroot("locale-gen")));
        let text = buf.contents();
        assert!(text.contains("[DEBUG]   Generating locales..."));
        assert!(text.contains("en_US.UTF-8... done"));
    }

    #[test]
    fn secrets_never_reach_the_log() {
        let (log, buf) = sink();
        let runner = RecordingRunner::default();
        let mut exec = Executor::new(&log, Box::new(runner.clone()), "/mnt");

        exec.run(
            &CommandRequest::host("nmcli")
                .args(["device", "wifi", "connect", "home", "password"])
                .secret_arg("hunter2"),
        );
        exec.run(&CommandRequest::chroot("chpasswd").stdin("tony:hunter2\n"));

        let text = buf.contents();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("password '********'") || text.contains("password ********"));
        assert_eq!(runner.calls()[0].argv.last().unwrap(), "hunter2");
        assert_eq!(runner.calls()[1].stdin.as_deref(), Some("tony:hunter2\n"));
    }

    #[test]
    fn dry_run_spawns_nothing() {
        let (log, _buf) = sink();
        let runner = RecordingRunner::default();
        let mut exec = Executor::new(&log, Box::new(runner.clone()), "/mnt").with_dry_run(true);

        assert!(exec.run(&CommandRequest::host("wipefs").arg("-af")));
        assert!(exec.capture(&CommandRequest::host("blkid")).is_some());
        assert!(exec.write_file("/etc/hostname", "box\n"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn capture_returns_first_line() {
        let (log, _buf) = sink();
        let runner = RecordingRunner::default().respond("blkid", "1234-abcd\n\n");
        let mut exec = Executor::new(&log, Box::new(runner), "/mnt");

        assert_eq!(
            exec.capture(&CommandRequest::host("blkid")).as_deref(),
            Some("1234-abcd")
        );
    }

    #[test]
    fn dotfile_composite_writes_then_owns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("home/tony")).unwrap();
        let (log, _buf) = sink();
        let runner = RecordingRunner::default();
        let mut exec = Executor::new(&log, Box::new(runner.clone()), dir.path());

        let dotfile = DotFile {
            name: ".xinitrc",
            content: "exec startxfce4\n".to_string(),
            mode: 0o755,
        };
        assert!(exec.install_dotfile("tony", &dotfile));

        let path = dir.path().join("home/tony/.xinitrc");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "exec startxfce4\n");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0].argv[2..], ["chown", "tony:tony", "/home/tony/.xinitrc"]);
    }

    #[test]
    fn dotfile_composite_stops_on_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        // no home directory: the write fails
        let (log, _buf) = sink();
        let runner = RecordingRunner::default();
        let mut exec = Executor::new(&log, Box::new(runner.clone()), dir.path());

        let dotfile = DotFile {
            name: ".bashrc",
            content: String::new(),
            mode: 0o644,
        };
        assert!(!exec.install_dotfile("tony", &dotfile));
        assert!(runner.calls().is_empty(), "chown must not run after a failed write");
    }

    #[test]
    fn drop_in_renders_bare_and_keyed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (log, _buf) = sink();
        let mut exec = Executor::new(&log, Box::new(RecordingRunner::default()), dir.path());

        let drop_in = DropIn {
            unit_dir: "getty@tty1.service.d".to_string(),
            file: "autologin.conf".to_string(),
            entries: vec![
                ("[Service]".to_string(), None),
                ("ExecStart".to_string(), Some(String::new())),
                ("Type".to_string(), Some("simple".to_string())),
            ],
        };
        assert!(exec.write_drop_in(&drop_in));

        let written = std::fs::read_to_string(
            dir.path()
                .join("etc/systemd/system/getty@tty1.service.d/autologin.conf"),
        )
        .unwrap();
        assert_eq!(written, "[Service]\nExecStart=\nType=simple\n");
    }

    fn shell(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn child_that_stops_reading_is_still_reaped_with_its_exit_code() {
        let input = "x".repeat(1 << 20);
        let output = SystemRunner
            .run(&shell("exec 0<&-; exit 3"), Some(&input))
            .unwrap();
        assert_eq!(output.exit, ExitIndicator::Code(3));
    }

    #[test]
    fn unread_input_fails_a_successful_exit() {
        let input = "x".repeat(1 << 20);
        assert!(SystemRunner
            .run(&shell("exec 0<&-; exit 0"), Some(&input))
            .is_err());
    }

    #[test]
    fn stdin_reaches_the_child() {
        let output = SystemRunner
            .run(&shell("cat"), Some("tony:secret\n"))
            .unwrap();
        assert_eq!(output.exit, ExitIndicator::Code(0));
        assert_eq!(output.stdout, "tony:secret\n");
    }

    #[test]
    fn spawn_failure_is_a_failure() {
        let (log, buf) = sink();
        let mut exec = Executor::new(&log, Box::new(SystemRunner), "/mnt");
        assert!(!exec.run(&CommandRequest::host("/nonexistent/tonarchy-test-binary")));
        assert!(buf.contents().contains("spawn failed"));
    }
}
