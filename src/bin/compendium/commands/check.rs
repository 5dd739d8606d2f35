//! `compendium check` command

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;

use crate::cli::CheckArgs;
use crate::GlobalOptions;
use compendium::core::lockfile::LOCKFILE_NAME;
use compendium::core::manifest::MANIFEST_NAME;
use compendium::ops::check::{CheckOptions, CheckReport, Checker, Inspection};
use compendium::ops::fix::LockStep;
use compendium::util::diagnostic::{emit, suggestions};
use compendium::util::{Diagnostic, Shell, Status};

pub fn execute(args: CheckArgs, global_opts: &GlobalOptions) -> Result<()> {
    let shell = &global_opts.shell;
    let ctx = global_opts.context()?;

    // Without a DESCRIPTION the pipeline still runs and reports it
    let project_root = ctx
        .find_project_root()
        .unwrap_or_else(|_| ctx.cwd().to_path_buf());

    let options = CheckOptions {
        project_root,
        strict: args.strict,
        fix: args.fix || args.yes,
    };
    let mut checker = Checker::from_config(ctx.config(), ctx.is_offline())?;

    let spinner = shell.spinner(
        Status::Checking,
        format!("{}", options.project_root.display()),
    );
    let inspection = checker.inspect(&options);
    spinner.finish();

    let report = if options.fix {
        run_fix(shell, &mut checker, &options, inspection)
    } else if !args.fail_on_issues
        && inspection.has_critical()
        && inspection.is_fixable()
        && confirm_fix(shell)?
    {
        run_fix(shell, &mut checker, &options, inspection)
    } else {
        CheckReport::new(&options.project_root, inspection)
    };

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "check-report",
            "report": report,
        }));
    } else {
        print_report(shell, &report);
    }
    shell.verdict(report.ready);

    // Critical issues always fail, with or without --fail-on-issues
    if !report.ready {
        std::process::exit(1);
    }

    Ok(())
}

fn run_fix(
    shell: &std::sync::Arc<Shell>,
    checker: &mut Checker<'_>,
    options: &CheckOptions,
    inspection: Inspection,
) -> CheckReport {
    if inspection.is_fixable() {
        shell.status(Status::Fixing, MANIFEST_NAME);
    }
    let spinner = shell.spinner(Status::Restoring, LOCKFILE_NAME);
    let report = checker.fix(options, inspection);
    spinner.finish();
    report
}

/// Ask before touching files. Only on an interactive terminal.
fn confirm_fix(shell: &Shell) -> Result<bool> {
    if shell.is_json() || shell.is_quiet() || !io::stdin().is_terminal() {
        return Ok(false);
    }

    eprint!("{:>12} apply fixes to {} and {}? [y/N] ", "Fix", MANIFEST_NAME, LOCKFILE_NAME);
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_report(shell: &Shell, report: &CheckReport) {
    let color = shell.use_color();
    let quiet = shell.is_quiet();

    if let Some(fix) = &report.fix {
        for name in &fix.manifest.added {
            shell.status(Status::Added, format!("{} to Imports", name));
        }
        for name in &fix.manifest.removed {
            shell.status(Status::Removed, format!("{} from {}", name, MANIFEST_NAME));
        }
        match &fix.lock {
            LockStep::Refreshed(path) => {
                shell.status(Status::Finished, format!("refreshed {}", path.display()))
            }
            LockStep::Regenerated(path) => {
                shell.status(Status::Finished, format!("regenerated {}", path.display()))
            }
            LockStep::Skipped(reason) => shell.status(Status::Skipped, format!("lock step: {}", reason)),
            LockStep::Failed(_) => {}
        }
    }

    if quiet {
        // Errors only
        for diagnostic in critical_diagnostics(report) {
            emit(&diagnostic, color);
        }
        return;
    }

    shell.status(
        Status::Scanning,
        format!(
            "{} files, {} packages referenced",
            report.extraction.files_scanned,
            report.extraction.packages.len()
        ),
    );
    if shell.is_verbose() {
        shell.detail(format!("{}: {}", MANIFEST_NAME, report.manifest.message));
        shell.detail(format!("{}: {}", LOCKFILE_NAME, report.lock.message));
    }
    let registry_warned = report.warnings.contains(&report.validation.message);
    if report.validation.error && !registry_warned {
        shell.note(&report.validation.message);
    }

    for warning in &report.warnings {
        if report.validation.error && *warning == report.validation.message {
            emit(
                &Diagnostic::warning(warning.clone()).with_suggestion(suggestions::REGISTRY_UNREACHABLE),
                color,
            );
        } else {
            shell.warn(warning);
        }
    }

    for diagnostic in critical_diagnostics(report) {
        emit(&diagnostic, color);
    }

    let reconciliation = &report.reconciliation;
    if !reconciliation.unused_in_manifest.is_empty() {
        emit(
            &Diagnostic::note(format!(
                "declared in {} but not used in code: {}",
                MANIFEST_NAME,
                join(&reconciliation.unused_in_manifest)
            )),
            color,
        );
    }
    if !reconciliation.extra_in_lock.is_empty() {
        emit(
            &Diagnostic::note(format!(
                "pinned in {} but not declared in {}: {}",
                LOCKFILE_NAME,
                MANIFEST_NAME,
                join(&reconciliation.extra_in_lock)
            ))
            .with_suggestion(suggestions::RUN_FIX),
            color,
        );
    }
    if reconciliation.is_clean() && !report.manifest.error && !report.lock.error {
        shell.status(Status::Finished, "code, DESCRIPTION and renv.lock agree");
    }
}

/// Findings that block a READY verdict.
fn critical_diagnostics(report: &CheckReport) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if report.manifest.error {
        out.push(
            Diagnostic::error(report.manifest.message.clone())
                .with_location(report.project_root.join(MANIFEST_NAME))
                .with_suggestion(suggestions::NO_MANIFEST),
        );
    }
    if report.lock.error {
        out.push(
            Diagnostic::error(report.lock.message.clone())
                .with_location(report.project_root.join(LOCKFILE_NAME))
                .with_suggestion(suggestions::NO_LOCKFILE),
        );
    }

    for name in &report.reconciliation.missing {
        let mut diagnostic = Diagnostic::error(format!(
            "`{}` is used in code but not declared in {}",
            name, MANIFEST_NAME
        ));
        for file in report.files_for(name) {
            diagnostic = diagnostic.with_context(format!("referenced in {}", file.display()));
        }
        out.push(diagnostic.with_suggestion(suggestions::RUN_FIX));
    }
    for name in &report.reconciliation.invalid_in_manifest {
        out.push(
            Diagnostic::error(format!(
                "`{}` is declared in {} but the registry does not publish it",
                name, MANIFEST_NAME
            ))
            .with_suggestion(suggestions::RUN_FIX),
        );
    }

    out
}

fn join<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    names.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
