use std::{
    io::{self, Write},
    process::{Command, Stdio},
};

/// Where an external-choice field gets its candidates and how the picker
/// is introduced to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSource {
    /// Command whose stdout lines are the candidates.
    pub list: Vec<String>,
    pub prompt: String,
    pub header: String,
    /// Initial filter text.
    pub query: Option<String>,
}

impl ChoiceSource {
    pub fn keymaps() -> Self {
        Self {
            list: vec!["localectl".into(), "list-keymaps".into()],
            prompt: "Keyboard: ".into(),
            header: "Start typing to filter, Enter to select".into(),
            query: Some("us".into()),
        }
    }

    pub fn timezones() -> Self {
        Self {
            list: vec!["timedatectl".into(), "list-timezones".into()],
            prompt: "Timezone: ".into(),
            header: "Type your city/timezone, Enter to select".into(),
            query: None,
        }
    }
}

/// An interactive picker run outside the wizard's own rendering.
///
/// Returns the selected line, or `None` when nothing was picked.
pub trait ChoiceFilter {
    fn choose(&mut self, source: &ChoiceSource) -> io::Result<Option<String>>;
}

/// Pipes the candidate list through `fzf` (or a compatible program).
///
/// The picker draws on the controlling tty itself; only its selection is
/// read back from stdout.
pub struct FzfFilter {
    program: String,
}

impl FzfFilter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(source: &ChoiceSource) -> Vec<String> {
        let mut args = vec![
            "--height=40%".to_string(),
            "--reverse".to_string(),
            format!("--prompt={}", source.prompt),
            format!("--header={}", source.header),
        ];
        if let Some(query) = &source.query {
            args.push(format!("--query={}", query));
        }
        args
    }
}

impl ChoiceFilter for FzfFilter {
    fn choose(&mut self, source: &ChoiceSource) -> io::Result<Option<String>> {
        let Some((program, list_args)) = source.list.split_first() else {
            return Ok(None);
        };
        let candidates = Command::new(program)
            .args(list_args)
            .stderr(Stdio::null())
            .output()?;

        let mut child = Command::new(&self.program)
            .args(Self::args(source))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        if let Some(mut pipe) = child.stdin.take() {
            // fzf may exit before reading everything; a broken pipe is fine.
            let _ = pipe.write_all(&candidates.stdout);
        }

        let output = child.wait_with_output()?;
        Ok(first_line(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}
