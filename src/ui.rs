use std::{
    fmt::Display,
    io,
    time::Duration,
};

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

use crate::term::Terminal;

/// First row below the logo, where menus, forms and messages start.
pub const CONTENT_ROW: u16 = 10;

const LOGO_WIDTH: u16 = 70;
const MESSAGE_PAUSE: Duration = Duration::from_secs(2);

const LOGO: [&str; 6] = [
    "████████╗ ██████╗ ███╗   ██╗ █████╗ ██████╗  ██████╗██╗  ██╗██╗   ██╗",
    "╚══██╔══╝██╔═══██╗████╗  ██║██╔══██╗██╔══██╗██╔════╝██║  ██║╚██╗ ██╔╝",
    "   ██║   ██║   ██║██╔██╗ ██║███████║██████╔╝██║     ███████║ ╚████╔╝ ",
    "   ██║   ██║   ██║██║╚██╗██║██╔══██║██╔══██╗██║     ██╔══██║  ╚██╔╝  ",
    "   ██║   ╚██████╔╝██║ ╚████║██║  ██║██║  ██║╚██████╗██║  ██║   ██║   ",
    "   ╚═╝    ╚═════╝ ╚═╝  ╚═══╝╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚═╝  ╚═╝   ╚═╝   ",
];

// ── Escape helpers ────────────────────────────────────────────────────────────

/// Styled text that always carries its SGR codes, tty or not.
pub fn paint<D: Display>(text: D) -> StyledObject<D> {
    style(text).force_styling(true)
}

/// Left edge of the centred logo; everything else aligns with it.
pub fn margin(cols: u16) -> u16 {
    cols.saturating_sub(LOGO_WIDTH) / 2 + 1
}

// ── Screens ───────────────────────────────────────────────────────────────────

/// Clears the screen and draws the logo. Returns the left margin for the
/// current window width, which is re-queried on every call.
pub fn draw_frame<T: Terminal>(term: &mut T) -> io::Result<u16> {
    let cols = term.size().cols;
    let left = margin(cols);

    term.clear_screen()?;
    for (i, line) in LOGO.iter().enumerate() {
        term.move_to(i as u16 + 2, left)?;
        write!(term, "{}", paint(line).green().bold())?;
    }
    Ok(left)
}

/// Draws `lines` under the logo without waiting.
pub fn show_status<T: Terminal>(term: &mut T, lines: &[&str]) -> io::Result<()> {
    let left = draw_frame(term)?;
    for (i, line) in lines.iter().enumerate() {
        term.move_to(CONTENT_ROW + i as u16, left)?;
        write!(term, "{}", paint(line).white())?;
    }
    term.flush()
}

/// Shows a transient message under the logo and holds it briefly.
pub fn show_message<T: Terminal>(term: &mut T, message: &str) -> io::Result<()> {
    show_status(term, &[message])?;
    term.pause(MESSAGE_PAUSE);
    Ok(())
}

// ── Plain-terminal feedback (outside the wizard) ──────────────────────────────

/// Blue → for neutral info and progress notes.
pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

/// Yellow ⚠ for non-fatal notices.
pub fn print_warning(msg: &str) {
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Red ✗ for errors, written to stderr.
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Returns a running braille spinner on stderr.
/// Call `pb.finish_and_clear()` when the work is done.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTerminal;

    #[test]
    fn margin_centres_the_logo() {
        assert_eq!(margin(70), 1);
        assert_eq!(margin(100), 16);
        // narrower than the logo: pinned to the left edge
        assert_eq!(margin(40), 1);
    }

    #[test]
    fn frame_clears_then_positions_logo() {
        let mut term = ScriptedTerminal::new();
        let left = draw_frame(&mut term).unwrap();

        assert_eq!(term.clears, 1);
        assert_eq!(term.moves[..2], [(2, left), (3, left)]);
        assert_eq!(term.moves.last(), Some(&(7, left)));
    }

    #[test]
    fn message_pauses_once() {
        let mut term = ScriptedTerminal::new();
        show_message(&mut term, "Passwords do not match").unwrap();
        assert_eq!(term.pauses, 1);
        assert!(term.screen().contains("Passwords do not match"));
    }
}
