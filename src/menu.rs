use std::io;

use crate::{
    error::InstallerError,
    term::{Key, Terminal},
    ui::{self, paint, CONTENT_ROW},
};

const HINT: &str = "j/k Navigate  Enter Select  q Quit";

/// What a keystroke does to an open menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// A navigation key, clamped or not. The menu is redrawn.
    Moved,
    Ignored,
    Chosen(usize),
    Cancelled,
}

/// Selection state of one menu invocation. Movement clamps at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuState {
    selected: usize,
    len: usize,
}

impl MenuState {
    pub fn new(len: usize) -> Self {
        Self { selected: 0, len }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn handle(&mut self, key: Key) -> MenuAction {
        match key {
            Key::Char('j') | Key::ArrowDown => {
                if self.selected + 1 < self.len {
                    self.selected += 1;
                }
                MenuAction::Moved
            }
            Key::Char('k') | Key::ArrowUp => {
                self.selected = self.selected.saturating_sub(1);
                MenuAction::Moved
            }
            Key::Enter => MenuAction::Chosen(self.selected),
            Key::Char('q') | Key::Escape => MenuAction::Cancelled,
            _ => MenuAction::Ignored,
        }
    }
}

/// Lets the operator pick one of `items`. Returns its index.
///
/// An empty list, `q`, Escape and end of input all cancel.
pub fn select<T: Terminal, S: AsRef<str>>(
    term: &mut T,
    items: &[S],
) -> Result<usize, InstallerError> {
    if items.is_empty() {
        return Err(InstallerError::Cancelled);
    }

    let mut state = MenuState::new(items.len());
    draw(term, items, state.selected())?;

    loop {
        let Some(key) = term.read_key()? else {
            return Err(InstallerError::Cancelled);
        };
        match state.handle(key) {
            MenuAction::Moved => draw(term, items, state.selected())?,
            MenuAction::Ignored => {}
            MenuAction::Chosen(index) => return Ok(index),
            MenuAction::Cancelled => return Err(InstallerError::Cancelled),
        }
    }
}

fn draw<T: Terminal, S: AsRef<str>>(term: &mut T, items: &[S], selected: usize) -> io::Result<()> {
    let left = ui::draw_frame(term)?;

    for (i, item) in items.iter().enumerate() {
        let row = CONTENT_ROW + i as u16;
        term.move_to(row, left + 2)?;
        if i == selected {
            write!(term, "{}", paint(format!("> {}", item.as_ref())).blue().bold().reverse())?;
        } else {
            write!(term, "{}", paint(format!("  {}", item.as_ref())).white())?;
        }
    }

    term.move_to(CONTENT_ROW + items.len() as u16 + 2, left)?;
    write!(term, "{}", paint(HINT).yellow())?;
    term.flush()
}
