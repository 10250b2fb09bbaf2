use std::io;

use crate::{
    error::InstallerError,
    filter::{ChoiceFilter, ChoiceSource},
    term::{Echo, Key, Terminal},
    ui::{self, paint, CONTENT_ROW},
};

const MASK: &str = "********";
// Review edits are addressed by a single digit.
const MAX_FIELDS: usize = 10;

// ── Field definitions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Validator {
    pub check: fn(&str) -> bool,
    pub message: String,
}

/// Letters, digits, `-` and `_`. Used for user and host names.
pub fn is_identifier(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    /// Masked entry; always immediately followed by its `Confirm` field.
    Password,
    Confirm,
    /// Resolved by an external picker.
    Choice(ChoiceSource),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub label: String,
    pub default: Option<String>,
    pub kind: FieldKind,
    pub validator: Option<Validator>,
    /// Shown when the field is left empty with nothing to fall back to.
    pub missing: Option<String>,
}

impl FieldSpec {
    fn new(label: &str, kind: FieldKind) -> Self {
        Self {
            label: label.to_string(),
            default: None,
            kind,
            validator: None,
            missing: None,
        }
    }

    pub fn text(label: &str) -> Self {
        Self::new(label, FieldKind::Text)
    }

    pub fn password(label: &str) -> Self {
        Self::new(label, FieldKind::Password)
    }

    pub fn confirm(label: &str) -> Self {
        Self::new(label, FieldKind::Confirm)
    }

    pub fn choice(label: &str, source: ChoiceSource) -> Self {
        Self::new(label, FieldKind::Choice(source))
    }

    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn validate(mut self, check: fn(&str) -> bool, message: &str) -> Self {
        self.validator = Some(Validator {
            check,
            message: message.to_string(),
        });
        self
    }

    pub fn missing_message(mut self, message: &str) -> Self {
        self.missing = Some(message.to_string());
        self
    }

    fn is_secret(&self) -> bool {
        matches!(self.kind, FieldKind::Password | FieldKind::Confirm)
    }

    fn missing_text(&self) -> String {
        self.missing
            .clone()
            .unwrap_or_else(|| format!("{} is required", self.label))
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// Committed form contents, in field order.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldValues {
    entries: Vec<(String, String)>,
}

impl FieldValues {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

// Values include passwords; only labels are printable.
impl std::fmt::Debug for FieldValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(l, _)| l))
            .finish()
    }
}

// ── Session state ─────────────────────────────────────────────────────────────

/// Fields plus the operator's current values and completion marks.
pub struct FormSession {
    fields: Vec<FieldSpec>,
    values: Vec<String>,
    complete: Vec<bool>,
}

impl FormSession {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, InstallerError> {
        if fields.len() > MAX_FIELDS {
            return Err(InstallerError::InvalidForm(format!(
                "{} fields; at most {} can be edited by digit",
                fields.len(),
                MAX_FIELDS
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            let next_is_confirm = matches!(
                fields.get(i + 1).map(|f| &f.kind),
                Some(FieldKind::Confirm)
            );
            let prev_is_password =
                i > 0 && matches!(fields[i - 1].kind, FieldKind::Password);
            match field.kind {
                FieldKind::Password if !next_is_confirm => {
                    return Err(InstallerError::InvalidForm(format!(
                        "'{}' has no confirmation field",
                        field.label
                    )))
                }
                FieldKind::Confirm if !prev_is_password => {
                    return Err(InstallerError::InvalidForm(format!(
                        "'{}' does not follow a password field",
                        field.label
                    )))
                }
                _ => {}
            }
        }

        let n = fields.len();
        Ok(Self {
            fields,
            values: vec![String::new(); n],
            complete: vec![false; n],
        })
    }

    pub fn value(&self, index: usize) -> &str {
        &self.values[index]
    }

    pub fn is_complete(&self, index: usize) -> bool {
        self.complete[index]
    }

    fn store(&mut self, index: usize, value: String) {
        self.values[index] = value;
        self.complete[index] = true;
    }

    fn finish(self) -> FieldValues {
        FieldValues {
            entries: self
                .fields
                .into_iter()
                .map(|f| f.label)
                .zip(self.values)
                .collect(),
        }
    }
}

// ── Component ─────────────────────────────────────────────────────────────────

/// Where a re-entry of a field falls back to on empty input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// First visit: the field's declared default.
    Forward,
    /// Review edit: the declared default, then the value already entered.
    Review,
}

/// Walks the operator through every field once, then loops in review until
/// the form is committed or cancelled.
pub fn collect<T: Terminal, F: ChoiceFilter>(
    term: &mut T,
    filter: &mut F,
    fields: Vec<FieldSpec>,
) -> Result<FieldValues, InstallerError> {
    let mut form = Form {
        term,
        filter,
        session: FormSession::new(fields)?,
    };
    form.forward_pass()?;
    form.review()?;
    Ok(form.session.finish())
}

struct Form<'a, T, F> {
    term: &'a mut T,
    filter: &'a mut F,
    session: FormSession,
}

impl<T: Terminal, F: ChoiceFilter> Form<'_, T, F> {
    fn len(&self) -> usize {
        self.session.fields.len()
    }

    fn forward_pass(&mut self) -> Result<(), InstallerError> {
        let mut index = 0;
        while index < self.len() {
            index = match self.session.fields[index].kind {
                FieldKind::Password => {
                    if self.enter_password_pair(index)? {
                        index + 2
                    } else {
                        index
                    }
                }
                // Confirmation is always driven from its password field.
                FieldKind::Confirm => index - 1,
                _ => {
                    if self.enter_field(index, Pass::Forward)? {
                        index + 1
                    } else {
                        index
                    }
                }
            };
        }
        Ok(())
    }

    fn review(&mut self) -> Result<(), InstallerError> {
        loop {
            self.draw(None)?;
            let Some(key) = self.term.read_key()? else {
                return Err(InstallerError::Cancelled);
            };
            match key {
                Key::Enter => return Ok(()),
                Key::Char('q') | Key::Escape => return Err(InstallerError::Cancelled),
                Key::Char(c) if c.is_ascii_digit() => {
                    let index = c as usize - '0' as usize;
                    if index < self.len() {
                        self.edit(index)?;
                    }
                }
                _ => {}
            }
        }
    }

    /// Re-enters one field until it holds an acceptable value.
    fn edit(&mut self, index: usize) -> Result<(), InstallerError> {
        match self.session.fields[index].kind {
            FieldKind::Password => while !self.enter_password_pair(index)? {},
            FieldKind::Confirm => while !self.enter_password_pair(index - 1)? {},
            _ => while !self.enter_field(index, Pass::Review)? {},
        }
        Ok(())
    }

    /// One attempt at a text or choice field. `Ok(false)` means re-prompt.
    fn enter_field(&mut self, index: usize, pass: Pass) -> Result<bool, InstallerError> {
        let field = self.session.fields[index].clone();
        let fallback = match pass {
            Pass::Forward => field.default.clone(),
            Pass::Review => field.default.clone().or_else(|| {
                self.session
                    .is_complete(index)
                    .then(|| self.session.value(index).to_string())
            }),
        };

        let input = match &field.kind {
            FieldKind::Choice(source) => {
                self.term.clear_screen()?;
                self.term.flush()?;
                self.filter.choose(source)?.unwrap_or_default()
            }
            _ => {
                self.draw(Some(index))?;
                self.place_cursor(index)?;
                match self.term.read_line(Echo::Visible)? {
                    Some(line) => line,
                    None => return Err(InstallerError::Cancelled),
                }
            }
        };

        if input.is_empty() {
            return match fallback {
                Some(value) => {
                    self.session.store(index, value);
                    Ok(true)
                }
                None => {
                    ui::show_message(self.term, &field.missing_text())?;
                    Ok(false)
                }
            };
        }

        if let Some(validator) = &field.validator {
            if !(validator.check)(&input) {
                ui::show_message(self.term, &validator.message)?;
                return Ok(false);
            }
        }

        self.session.store(index, input);
        Ok(true)
    }

    /// One attempt at a password and its confirmation.
    ///
    /// On mismatch both values are cleared and neither is complete.
    fn enter_password_pair(&mut self, index: usize) -> Result<bool, InstallerError> {
        let confirm = index + 1;
        let label = self.session.fields[index].label.clone();

        self.draw(Some(index))?;
        self.place_cursor(index)?;
        let Some(password) = self.term.read_line(Echo::Hidden)? else {
            return Err(InstallerError::Cancelled);
        };
        if password.is_empty() {
            ui::show_message(self.term, &format!("{} cannot be empty", label))?;
            return Ok(false);
        }

        self.session.values[index] = password;
        self.session.complete[index] = false;
        self.draw(Some(confirm))?;
        self.place_cursor(confirm)?;
        let Some(repeated) = self.term.read_line(Echo::Hidden)? else {
            return Err(InstallerError::Cancelled);
        };

        if repeated == self.session.values[index] {
            self.session.complete[index] = true;
            self.session.store(confirm, repeated);
            Ok(true)
        } else {
            for i in [index, confirm] {
                self.session.values[i].clear();
                self.session.complete[i] = false;
            }
            ui::show_message(self.term, "Passwords do not match")?;
            Ok(false)
        }
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn row(index: usize) -> u16 {
        CONTENT_ROW + 2 + index as u16
    }

    fn place_cursor(&mut self, index: usize) -> io::Result<()> {
        let left = ui::margin(self.term.size().cols);
        let col = left + 2 + self.session.fields[index].label.chars().count() as u16 + 2;
        self.term.move_to(Self::row(index), col)?;
        self.term.flush()
    }

    /// `focus` is the field being entered; `None` draws the review screen.
    fn draw(&mut self, focus: Option<usize>) -> io::Result<()> {
        let left = ui::draw_frame(self.term)?;
        self.term.move_to(CONTENT_ROW, left)?;
        write!(self.term, "{}", paint("Setup your system:").white())?;

        for (i, field) in self.session.fields.iter().enumerate() {
            self.term.move_to(Self::row(i), left)?;
            if focus == Some(i) {
                write!(self.term, "{} ", paint(">").blue().bold())?;
            } else {
                write!(self.term, "  ")?;
            }
            write!(self.term, "{}", paint(format!("{}: ", field.label)).white())?;

            let value = &self.session.values[i];
            if !value.is_empty() {
                let shown = if field.is_secret() { MASK } else { value.as_str() };
                write!(self.term, "{}", paint(shown).green())?;
            } else if focus != Some(i) {
                let placeholder = field.default.as_deref().unwrap_or("[not set]");
                write!(self.term, "{}", paint(placeholder).black().bright())?;
            }
            if focus.is_none() {
                write!(self.term, "  {}", paint(format!("({})", i)).black().bright())?;
            }
        }

        if focus.is_none() {
            let hint = format!(
                "Press Enter to continue, q to quit, or field number to edit (0-{})",
                self.len().saturating_sub(1)
            );
            self.term.move_to(Self::row(self.len()) + 2, left)?;
            write!(self.term, "{}", paint(hint).yellow())?;
        }
        self.term.flush()
    }
}
