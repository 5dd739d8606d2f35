//! `compendium staleness` command

use anyhow::Result;

use crate::cli::StalenessArgs;
use crate::GlobalOptions;
use compendium::core::stamp::{generator_version, parse_version};
use compendium::ops::staleness::{check_root, scan, ProjectStaleness, StalenessStatus};
use compendium::util::diagnostic::suggestions;
use compendium::util::{Shell, Status};

pub fn execute(args: StalenessArgs, global_opts: &GlobalOptions) -> Result<()> {
    let shell = &global_opts.shell;
    let ctx = global_opts.context()?;

    let current = match &args.current {
        Some(v) => parse_version(v)?,
        None => generator_version(),
    };

    let projects = match &args.scan {
        Some(dir) => scan(&ctx.cwd().join(dir), args.depth, &current),
        None => {
            let root = ctx
                .find_project_root()
                .unwrap_or_else(|_| ctx.cwd().to_path_buf());
            vec![check_root(&root, &current)?]
        }
    };

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "staleness",
            "current": current.to_string(),
            "projects": projects,
        }));
        return Ok(());
    }

    let batch = args.scan.is_some();
    let mut outdated = 0;
    for project in &projects {
        outdated += print_project(shell, project, batch);
    }

    if projects.iter().all(|p| p.artifacts.is_empty()) {
        shell.note("no generated files found");
    } else if outdated > 0 {
        shell.warn(format!(
            "{} file(s) generated by an older compendium (current v{})",
            outdated, current
        ));
        shell.detail(suggestions::REGENERATE);
    }

    // Staleness is advisory and never fails the command
    Ok(())
}

fn print_project(shell: &Shell, project: &ProjectStaleness, batch: bool) -> usize {
    let prefix = if batch && !project.root.as_os_str().is_empty() {
        format!("{}/", project.root.display())
    } else {
        String::new()
    };

    if let Some(error) = &project.error {
        shell.warn(format!("{}: {}", project.root.display(), error));
    }

    for artifact in &project.artifacts {
        let label = format!("{}{}", prefix, artifact.path.display());
        match (artifact.status, &artifact.stamped) {
            (StalenessStatus::Current, Some(v)) => {
                shell.status(Status::Current, format!("{} v{}", label, v))
            }
            (StalenessStatus::Outdated, Some(v)) => {
                shell.status(Status::Outdated, format!("{} v{}", label, v))
            }
            (StalenessStatus::Ahead, Some(v)) => shell.status(
                Status::Info,
                format!("{} v{} (newer than this compendium)", label, v),
            ),
            _ => shell.status(Status::Skipped, format!("{} (unstamped)", label)),
        }
    }

    project.outdated().count()
}
