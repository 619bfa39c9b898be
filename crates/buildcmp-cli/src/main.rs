//! buildcmp - build revisions deterministically and fingerprint their code
//!
//! Run from the root of an autotools checkout:
//!
//! ```text
//! buildcmp 4b5b263 d1bc5bf
//! ```
//!
//! Each revision is built with deterministic flags, its objects are
//! disassembled and every code section is stored under its SHA-256, so two
//! revisions can be compared with a plain directory diff.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{error, info};

use buildcmp_core::config::{
    parse_opt_override, BuildConfig, Toolchain, DEFAULT_EXECUTABLE, DEFAULT_PARALLELISM,
};
use buildcmp_core::disasm::VolatileFilter;
use buildcmp_core::safety::SafetyGuard;
use buildcmp_core::store::StdinConfirm;
use buildcmp_core::telemetry;
use buildcmp_pipeline::{Orchestrator, RunRequest, RunSummary, StagingMode, SystemRunner};

#[derive(Parser, Debug)]
#[command(name = "buildcmp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build revisions for comparing generated code", long_about = None)]
struct Cli {
    /// Commit ids to build
    #[arg(value_name = "COMMITID", required = true)]
    commits: Vec<String>,

    /// Comma-separated executables to build, relative to the source tree
    #[arg(long, default_value = DEFAULT_EXECUTABLE)]
    executables: String,

    /// Target directory (default: <temp-root>/compare)
    #[arg(long)]
    tgtdir: Option<PathBuf>,

    /// Staging directory (default: <temp-root>/repo)
    #[arg(long)]
    repodir: Option<PathBuf>,

    /// make parallelism
    #[arg(short = 'j', long, default_value_t = DEFAULT_PARALLELISM)]
    parallelism: usize,

    /// Build with assertions enabled
    #[arg(long)]
    assertions: bool,

    /// Optimization flags replacing the baseline set; must start with '+'
    #[arg(long, allow_hyphen_values = true)]
    opt: Option<String>,

    /// Comma-separated patches to strip build info, one per commit id
    #[arg(short = 'P', long)]
    patches: Option<String>,

    /// Directory holding the patches
    #[arg(long, default_value = "patches")]
    patch_dir: PathBuf,

    /// Depends prefix to configure with
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Build in the current checkout instead of a copy
    #[arg(long)]
    nocopy: bool,

    /// Extra argument for ./configure (repeatable)
    #[arg(long = "configure-arg", value_name = "ARG", allow_hyphen_values = true)]
    configure_args: Vec<String>,

    /// Volatile-line filter preset: elf, pe or macho
    #[arg(long, default_value = "elf")]
    filter: String,

    /// Regex of disassembly lines to drop, replacing the preset's markers
    #[arg(long)]
    filter_pattern: Option<String>,

    /// Directory under which everything may be deleted (default: system temp)
    #[arg(long)]
    temp_root: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines and a JSON summary
    #[arg(long)]
    json: bool,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn build_request(
    cli: &Cli,
    guard: &SafetyGuard,
    source: PathBuf,
    toolchain: Toolchain,
) -> Result<RunRequest> {
    let mut config = BuildConfig {
        executables: split_list(&cli.executables),
        parallelism: cli.parallelism,
        assertions: cli.assertions,
        prefix: cli.prefix.clone(),
        configure_extra: cli.configure_args.clone(),
        patch_dir: cli.patch_dir.clone(),
        toolchain,
        ..BuildConfig::default()
    };
    if let Some(opt) = &cli.opt {
        config.opt_flags = parse_opt_override(opt)?;
    }

    let mut filter = VolatileFilter::preset(&cli.filter)?;
    if let Some(pattern) = &cli.filter_pattern {
        filter = filter.with_pattern(pattern)?;
    }

    let staging = if cli.nocopy {
        StagingMode::InPlace
    } else {
        StagingMode::Mirror {
            dir: cli
                .repodir
                .clone()
                .unwrap_or_else(|| guard.root().join("repo")),
        }
    };

    Ok(RunRequest {
        revisions: cli.commits.clone(),
        patches: cli.patches.clone(),
        source,
        target_dir: cli
            .tgtdir
            .clone()
            .unwrap_or_else(|| guard.root().join("compare")),
        staging,
        filter,
        config,
    })
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let guard = match &cli.temp_root {
        Some(root) => SafetyGuard::new(root)?,
        None => SafetyGuard::system_temp(),
    };
    let source = std::env::current_dir().context("Failed to read current directory")?;
    let toolchain = Toolchain::from_env().context("Invalid tool override in environment")?;
    let request = build_request(cli, &guard, source, toolchain)?;

    let runner = SystemRunner;
    let summary = Orchestrator::new(&runner, guard)
        .run(&request, &mut StdinConfirm)
        .await
        .context("Build for compare failed")?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json, telemetry::level_for_verbosity(cli.verbose));

    match run(&cli).await {
        Ok(summary) => {
            if cli.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!("Failed to serialize summary: {e}"),
                }
            }
            info!(
                built = summary.built.len(),
                skipped = summary.skipped.len(),
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildcmp_core::config::baseline_opt_flags;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["buildcmp"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse failed")
    }

    fn request(args: &[&str]) -> Result<RunRequest> {
        let guard = SafetyGuard::new("/tmp").unwrap();
        build_request(
            &parse(args),
            &guard,
            PathBuf::from("/src/example"),
            Toolchain::default(),
        )
    }

    #[test]
    fn test_defaults() {
        let req = request(&["4b5b263", "d1bc5bf"]).unwrap();
        assert_eq!(req.revisions, vec!["4b5b263", "d1bc5bf"]);
        assert_eq!(req.target_dir, PathBuf::from("/tmp/compare"));
        assert_eq!(
            req.staging,
            StagingMode::Mirror {
                dir: PathBuf::from("/tmp/repo")
            }
        );
        assert_eq!(req.config.executables, vec![DEFAULT_EXECUTABLE]);
        assert_eq!(req.config.parallelism, 4);
        assert_eq!(req.config.opt_flags, baseline_opt_flags());
        assert_eq!(req.filter.name(), "elf");
        assert!(req.patches.is_none());
    }

    #[test]
    fn test_commit_id_is_required() {
        assert!(Cli::try_parse_from(["buildcmp"]).is_err());
    }

    #[test]
    fn test_options_map_into_request() {
        let req = request(&[
            "--executables",
            "src/exampled, src/qt/example-qt",
            "--nocopy",
            "-j",
            "12",
            "--assertions",
            "--opt",
            "+-O2 -g",
            "-P",
            "old.patch",
            "--configure-arg",
            "--enable-debug",
            "--tgtdir",
            "/tmp/cmp",
            "--filter",
            "pe",
            "4b5b263",
        ])
        .unwrap();
        assert_eq!(
            req.config.executables,
            vec!["src/exampled", "src/qt/example-qt"]
        );
        assert_eq!(req.staging, StagingMode::InPlace);
        assert_eq!(req.config.parallelism, 12);
        assert!(req.config.assertions);
        assert_eq!(req.config.opt_flags, vec!["-O2", "-g"]);
        assert_eq!(req.patches.as_deref(), Some("old.patch"));
        assert_eq!(req.config.configure_extra, vec!["--enable-debug"]);
        assert_eq!(req.target_dir, PathBuf::from("/tmp/cmp"));
        assert_eq!(req.filter.name(), "pe");
    }

    #[test]
    fn test_opt_without_plus_is_rejected() {
        let err = request(&["--opt", "-O2", "4b5b263"]).unwrap_err();
        assert!(err.to_string().contains("must start with +"));
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        assert!(request(&["--filter", "wasm", "4b5b263"]).is_err());
        let req = request(&["--filter-pattern", r"\.rodata", "4b5b263"]).unwrap();
        assert_eq!(req.filter.name(), "elf+pattern");
    }

    #[test]
    fn test_temp_root_moves_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["--temp-root", dir.path().to_str().unwrap(), "4b5b263"]);
        let guard = SafetyGuard::new(cli.temp_root.clone().unwrap()).unwrap();
        let req = build_request(&cli, &guard, PathBuf::from("/src"), Toolchain::default()).unwrap();
        assert_eq!(req.target_dir, dir.path().join("compare"));
    }
}
