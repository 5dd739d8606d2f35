//! `compendium sysdeps` command

use anyhow::Result;

use crate::cli::SysdepsArgs;
use crate::GlobalOptions;
use compendium::core::sysdeps::SystemDependencyMapping;
use compendium::ops::dockerfile::project_packages;

pub fn execute(_args: SysdepsArgs, global_opts: &GlobalOptions) -> Result<()> {
    let shell = &global_opts.shell;
    let ctx = global_opts.context()?;
    let project_root = ctx.find_project_root()?;

    let (packages, _, warnings) = project_packages(&project_root);
    for warning in &warnings {
        shell.warn(warning);
    }

    let mapping = SystemDependencyMapping::from_config(ctx.config());
    let os_packages = mapping.resolve(&packages);

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "sysdeps",
            "packages": packages,
            "system_packages": os_packages,
        }));
        return Ok(());
    }

    if os_packages.is_empty() {
        shell.note("no system dependencies required");
    }
    for name in &os_packages {
        println!("{}", name);
    }

    Ok(())
}
