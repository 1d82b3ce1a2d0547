//! CLI front-end: argument parsing, exit-code mapping, `.retry`
//! bookkeeping, and console reporting. Explicitly out of scope per
//! spec.md §1 ("treated as external collaborators"); kept minimal here
//! as a reference consumer of `shellinspector-parser`/`-shell`/`-runner`.

mod reporter;
mod retry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::prelude::*;

use reporter::ConsoleReporter;
use shellinspector_runner::Runner;
use shellinspector_shell::SshTarget;

#[derive(Parser, Debug)]
#[command(
    name = "shellinspector",
    about = "Verify interactive shell transcripts (.ispec) against a live local/SSH shell",
    version
)]
struct Cli {
    /// Spec files to run. Ignored (in favor of `.retry`'s contents) when `--retry` is set.
    specs: Vec<PathBuf>,

    /// SSH target host for commands whose header resolves to `remote`.
    #[arg(long)]
    ssh_host: Option<String>,

    #[arg(long, default_value_t = 22)]
    ssh_port: u16,

    #[arg(long)]
    ssh_user: Option<String>,

    #[arg(long)]
    ssh_key: Option<PathBuf>,

    /// Only run spec files carrying at least one of these tags (§6.2);
    /// omit to run everything discovered on the command line.
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Re-run only the spec files that failed on the previous invocation.
    #[arg(long)]
    retry: bool,
}

impl Cli {
    fn ssh_target(&self) -> Option<SshTarget> {
        let server = self.ssh_host.clone()?;
        Some(SshTarget {
            server,
            port: self.ssh_port,
            username: self.ssh_user.clone().unwrap_or_else(|| "root".to_string()),
            key_path: self.ssh_key.clone(),
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let specs = if cli.retry {
        retry::read().context("--retry was given but .retry could not be read")?
    } else {
        cli.specs.clone()
    };

    if specs.is_empty() {
        eprintln!("Usage: shellinspector [OPTIONS] <SPECS>...");
        eprintln!();
        eprintln!("Run `shellinspector --help` for the full option list.");
        anyhow::bail!("no spec files given");
    }

    let ssh_target = cli.ssh_target();
    let context = Runner::context_from_ssh_target(ssh_target.as_ref());

    let mut failed_specs = Vec::new();
    let mut any_failed = false;

    // Non-goal per spec.md §1: spec files run strictly sequentially in
    // one process, sharing the session pool across the whole invocation.
    let mut runner = Runner::new(ssh_target, context, Box::new(ConsoleReporter::new()));

    for spec_path in &specs {
        let specfile = match shellinspector_parser::parse(spec_path) {
            Ok(specfile) => specfile,
            Err(err) => {
                eprintln!("{} {}: {err}", "ERROR".red().bold(), spec_path.display());
                any_failed = true;
                failed_specs.push(spec_path.clone());
                continue;
            }
        };

        if !cli.tags.is_empty() && !specfile.tags.iter().any(|t| cli.tags.contains(t)) {
            continue;
        }

        if !specfile.is_runnable() {
            for err in &specfile.errors {
                eprintln!(
                    "{} {}:{}: {}",
                    "PARSE ERROR".red().bold(),
                    err.source_file.display(),
                    err.source_line_no,
                    err.message
                );
            }
            any_failed = true;
            failed_specs.push(spec_path.clone());
            continue;
        }

        let runs: Vec<_> = if specfile.examples.is_empty() {
            vec![specfile.clone()]
        } else {
            specfile
                .examples
                .iter()
                .map(|example| specfile.as_example(example))
                .collect()
        };

        let mut spec_passed = true;
        for run in &runs {
            if !runner.run(run) {
                spec_passed = false;
            }
        }

        if !spec_passed {
            any_failed = true;
            failed_specs.push(spec_path.clone());
        }
    }

    retry::write(&failed_specs).context("failed to update .retry")?;

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}
