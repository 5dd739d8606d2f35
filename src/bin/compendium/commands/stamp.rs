//! `compendium stamp` command

use anyhow::{Context, Result};

use crate::cli::StampArgs;
use crate::GlobalOptions;
use compendium::core::stamp::{artifact, generator_version, parse_version, stamp_file, VersionStamp};
use compendium::util::Status;

pub fn execute(args: StampArgs, global_opts: &GlobalOptions) -> Result<()> {
    let shell = &global_opts.shell;
    let ctx = global_opts.context()?;

    let target = artifact(&args.artifact)?;
    let version = match &args.version {
        Some(v) => parse_version(v)?,
        None => generator_version(),
    };
    let path = ctx.cwd().join(&args.file);

    let stamp = VersionStamp::new(target.id, version);
    stamp_file(&path, &stamp).with_context(|| format!("failed to stamp {}", path.display()))?;

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "stamp",
            "path": path,
            "marker": stamp.marker(),
        }));
    } else {
        shell.status(Status::Stamped, format!("{} ({})", args.file.display(), stamp.marker()));
    }

    Ok(())
}
