//! `compendium dockerfile` command

use anyhow::Result;

use crate::cli::DockerfileArgs;
use crate::GlobalOptions;
use compendium::core::stamp::generator_version;
use compendium::ops::dockerfile::{generate_dockerfile, DockerfileOptions};
use compendium::util::fs::relative_path;
use compendium::util::Status;

pub fn execute(args: DockerfileArgs, global_opts: &GlobalOptions) -> Result<()> {
    let shell = &global_opts.shell;
    let ctx = global_opts.context()?;
    let project_root = ctx.find_project_root()?;

    let options = DockerfileOptions {
        project_root: project_root.clone(),
        base_image: args.base_image,
        output: args.output.map(|p| ctx.cwd().join(p)),
        dry_run: args.stdout,
        version: generator_version(),
    };

    let result = generate_dockerfile(&options, ctx.config())?;

    for warning in &result.warnings {
        shell.warn(warning);
    }

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "dockerfile",
            "result": result,
        }));
        return Ok(());
    }

    match &result.path {
        Some(path) => {
            shell.status(
                Status::Created,
                format!(
                    "{} from {}",
                    relative_path(&project_root, path).display(),
                    result.description.base_image.reference
                ),
            );
            if !result.description.os_deps.is_empty() {
                shell.detail(format!(
                    "system packages: {}",
                    result
                        .description
                        .os_deps
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(" ")
                ));
            }
        }
        None => print!("{}", result.content),
    }

    Ok(())
}
