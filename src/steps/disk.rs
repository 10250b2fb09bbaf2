use crate::{
    cmd::Executor,
    error::InstallerError,
    lsblk::{self, Disk},
    menu,
    term::{Echo, Terminal},
    ui::{self, paint, CONTENT_ROW},
};

const CONFIRMATION: &str = "yes";

/// Lets the operator pick the installation disk and confirm that it will be
/// erased. Only the exact word `yes` confirms.
pub fn choose<T: Terminal>(term: &mut T, exec: &mut Executor) -> Result<Disk, InstallerError> {
    let disks = lsblk::list_disks(exec);
    if disks.is_empty() {
        ui::show_message(term, "No disks found")?;
        return Err(InstallerError::NoDisks);
    }

    let labels: Vec<String> = disks.iter().map(Disk::label).collect();
    let disk = disks[menu::select(term, &labels)?].clone();

    let left = ui::draw_frame(term)?;
    term.move_to(CONTENT_ROW, left)?;
    write!(
        term,
        "{}{}{}",
        paint("WARNING: All data on ").white(),
        paint(disk.device()).red(),
        paint(" will be destroyed!").white()
    )?;
    term.move_to(CONTENT_ROW + 2, left)?;
    write!(term, "{}", paint("Type 'yes' to confirm: ").white())?;
    term.flush()?;

    let answer = term.read_line(Echo::Visible)?;
    if answer.as_deref() != Some(CONFIRMATION) {
        exec.log().info("Disk erase not confirmed");
        ui::show_message(term, "Installation cancelled")?;
        return Err(InstallerError::Cancelled);
    }

    exec.log().info(format!("Selected disk: {}", disk.device()));
    Ok(disk)
}
