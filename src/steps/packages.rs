use crate::{
    cmd::CommandRequest,
    pipeline::{InstallContext, Stage, StageFailure},
};

/// Bootstraps the profile's package set into the target with `pacstrap`.
pub struct PackagesStage;

impl Stage for PackagesStage {
    fn name(&self) -> &str {
        "Install packages"
    }

    fn run(&self, ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
        let packages = ctx.profile.packages();
        ctx.log().info("Starting package installation");
        ctx.log().info(format!("Packages: {}", packages.join(" ")));

        // -K: fresh pacman keyring inside the target
        let request = CommandRequest::host("pacstrap")
            .arg("-K")
            .arg(ctx.exec.target().display().to_string())
            .args(packages);
        ctx.require(&request, "Failed to install packages")?;

        ctx.log().info("Package installation completed successfully");
        Ok(())
    }
}
