//! mlrepair - repair buggy Keras model programs by mask and infill
//!
//! ## Commands
//!
//! - `run`: run pipeline ops over a directory of buggy programs
//! - `format`: write the canonical form of every program in a directory
//! - `repair`: format bug and fix directories, then run `end2end`
//! - `validate-worker`: validate one shard (spawned by `run`)

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mlrepair_core::pipeline::Op;
use mlrepair_core::{
    format_programs, init_file_tracing, init_tracing, parse_ops, run_shard, CommandMaterializer,
    HttpInfillService, HttpTrainerService, Orchestrator, RepairConfig, RunPaths, Services,
    ShardSpec, SnippetMode,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mlrepair")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mask-and-infill repair of deep-learning model programs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (TOML); falls back to $MLREPAIR_CONFIG, then defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line overrides applied on top of the config file.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Predictions per masked program
    #[arg(long)]
    top_k: Option<usize>,

    /// whole_program | model_context | mask_line
    #[arg(long)]
    snippet_mode: Option<SnippetMode>,

    /// Validation worker processes
    #[arg(long)]
    workers: Option<usize>,

    /// Validate every artifact instead of stopping at the first pass
    #[arg(long)]
    no_early_stop: bool,

    #[arg(long)]
    no_syntax_filter: bool,

    #[arg(long)]
    no_identity_filter: bool,

    #[arg(long)]
    no_no_op_filter: bool,

    #[arg(long)]
    no_bad_change_filter: bool,
}

impl Overrides {
    fn apply(&self, config: &mut RepairConfig) {
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(mode) = self.snippet_mode {
            config.snippet_mode = mode;
        }
        if let Some(workers) = self.workers {
            config.validation.workers = workers;
        }
        if self.no_early_stop {
            config.validation.early_stop = false;
        }
        if self.no_syntax_filter {
            config.filters.syntax = false;
        }
        if self.no_identity_filter {
            config.filters.identity = false;
        }
        if self.no_no_op_filter {
            config.filters.no_op = false;
        }
        if self.no_bad_change_filter {
            config.filters.bad_change = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run pipeline ops (wpfl, 1..6, stat-*, end2end, stat-all)
    Run {
        #[arg(long)]
        buggy_dir: PathBuf,

        #[arg(long)]
        out_dir: PathBuf,

        /// Reference fixes, needed by stat-rank-* and 6
        #[arg(long)]
        correct_dir: Option<PathBuf>,

        /// Buggy programs with the placeholder at the fault, needed by wpfl
        #[arg(long)]
        perfect_fl_dir: Option<PathBuf>,

        #[arg(long, num_args = 1.., value_delimiter = ',', required = true)]
        ops: Vec<String>,

        /// Remove the output directory first (asks for confirmation)
        #[arg(long)]
        overwrite: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write the canonical form of every *.py file
    Format { input_dir: PathBuf, output_dir: PathBuf },

    /// Format the bug (and fix) directories, then run end2end
    Repair {
        #[arg(long)]
        bug_dir: PathBuf,

        #[arg(long)]
        fixed_dir: Option<PathBuf>,

        #[arg(long)]
        out_dir: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Validate the items of one shard file
    #[command(hide = true)]
    ValidateWorker {
        #[arg(long)]
        shard: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // workers log to their own file
    if !matches!(cli.command, Commands::ValidateWorker { .. }) {
        init_tracing(cli.json, level);
    }
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            buggy_dir,
            out_dir,
            correct_dir,
            perfect_fl_dir,
            ops,
            overwrite,
            overrides,
        } => {
            let config = load_config(config_path, &overrides)?;
            let ops = parse_ops(&ops).context("Invalid --ops")?;
            if overwrite {
                confirm_overwrite(&out_dir)?;
            }
            let paths = RunPaths {
                buggy_dir,
                out_dir,
                correct_dir,
                perfect_fl_dir,
            };
            cmd_run(config, paths, &ops).await
        }
        Commands::Format {
            input_dir,
            output_dir,
        } => cmd_format(&input_dir, &output_dir),
        Commands::Repair {
            bug_dir,
            fixed_dir,
            out_dir,
            overrides,
        } => {
            let config = load_config(config_path, &overrides)?;
            cmd_repair(config, &bug_dir, fixed_dir.as_deref(), &out_dir).await
        }
        Commands::ValidateWorker { shard } => cmd_validate_worker(&shard, level).await,
    }
}

fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<RepairConfig> {
    let mut config = RepairConfig::resolve(path).context("Failed to load config")?;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn confirm_overwrite(out_dir: &Path) -> Result<()> {
    if !out_dir.exists() {
        return Ok(());
    }
    eprint!("Type 'overwrite' to confirm (to remove {}): ", out_dir.display());
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    if answer.trim() != "overwrite" {
        bail!("Not confirmed to overwrite {}", out_dir.display());
    }
    info!("Removing {}", out_dir.display());
    std::fs::remove_dir_all(out_dir)
        .with_context(|| format!("Failed to remove {}", out_dir.display()))?;
    Ok(())
}

async fn cmd_run(config: RepairConfig, paths: RunPaths, ops: &BTreeSet<Op>) -> Result<()> {
    let mut infill =
        HttpInfillService::new(config.infill.clone()).context("Failed to set up infill client")?;
    let mut trainer = HttpTrainerService::new(config.trainer.clone())
        .context("Failed to set up trainer client")?;
    let materializer = CommandMaterializer::new(config.materializer.clone());
    let mut services = Services {
        infill: &mut infill,
        trainer: &mut trainer,
        materializer: &materializer,
        worker_exe: std::env::current_exe().ok(),
    };

    let out_dir = paths.out_dir.clone();
    let report = Orchestrator::new(config, paths)
        .run(ops, &mut services)
        .await
        .context("Pipeline run failed")?;
    println!(
        "Run {} finished: {} items, ops {}",
        report.run_id,
        report.items,
        mlrepair_core::pipeline::render_ops(ops)
    );
    println!("Output: {}", out_dir.display());
    Ok(())
}

fn cmd_format(input_dir: &Path, output_dir: &Path) -> Result<()> {
    let report = format_programs(input_dir, output_dir)
        .with_context(|| format!("Failed to format {}", input_dir.display()))?;
    if report.up_to_date {
        println!("{} is up to date", output_dir.display());
    } else {
        println!("Formatted {} programs", report.formatted);
        for failed in &report.failed {
            println!("  skipped (unparseable): {failed}");
        }
    }
    Ok(())
}

async fn cmd_repair(
    config: RepairConfig,
    bug_dir: &Path,
    fixed_dir: Option<&Path>,
    out_dir: &Path,
) -> Result<()> {
    let fmt_bug = out_dir.join("fmt_bug_files");
    cmd_format(bug_dir, &fmt_bug)?;
    let fmt_fixed = match fixed_dir {
        Some(dir) => {
            let fmt_fixed = out_dir.join("fmt_fixed_files");
            cmd_format(dir, &fmt_fixed)?;
            Some(fmt_fixed)
        }
        None => None,
    };

    let mut ops = parse_ops(&["end2end"])?;
    if fmt_fixed.is_none() {
        // the summary compares against reference fixes
        ops.remove(&Op::Summarize);
    }
    let paths = RunPaths {
        buggy_dir: fmt_bug,
        out_dir: out_dir.join("repair"),
        correct_dir: fmt_fixed,
        perfect_fl_dir: None,
    };
    cmd_run(config, paths, &ops).await
}

async fn cmd_validate_worker(shard: &Path, level: Level) -> Result<()> {
    let spec = ShardSpec::load(shard)
        .with_context(|| format!("Failed to read shard {}", shard.display()))?;
    init_file_tracing(&spec.log_file, level)
        .with_context(|| format!("Failed to open {}", spec.log_file.display()))?;
    info!(worker = spec.worker, items = spec.items.len(), "validate worker started");

    let mut trainer = HttpTrainerService::new(spec.trainer.clone())
        .context("Failed to set up trainer client")?;
    let validated = run_shard(&spec, &mut trainer)
        .await
        .context("Shard validation failed")?;
    info!(worker = spec.worker, validated, "validate worker finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_run_parses_ops_and_overrides() {
        let cli = Cli::try_parse_from([
            "mlrepair",
            "run",
            "--buggy-dir",
            "bugs",
            "--out-dir",
            "out",
            "--ops",
            "1,2",
            "3",
            "--top-k",
            "5",
            "--snippet-mode",
            "mask_line",
            "--no-bad-change-filter",
        ])
        .unwrap();
        let Commands::Run { ops, overrides, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(ops, vec!["1", "2", "3"]);

        let mut config = RepairConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.snippet_mode, SnippetMode::MaskLine);
        assert!(!config.filters.bad_change);
        assert!(config.filters.no_op);
        assert!(config.validation.early_stop);
    }

    #[test]
    fn test_validate_worker_is_hidden_but_parses() {
        let cli =
            Cli::try_parse_from(["mlrepair", "validate-worker", "--shard", "s.json"]).unwrap();
        assert!(matches!(cli.command, Commands::ValidateWorker { .. }));
        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("validate-worker"));
        assert!(help.contains("repair"));
    }

    #[test]
    fn test_run_requires_ops() {
        assert!(Cli::try_parse_from(["mlrepair", "run", "--buggy-dir", "b", "--out-dir", "o"]).is_err());
    }

    #[test]
    fn test_format_command() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("a.py"), "x = 1\n").unwrap();
        let out = output.path().join("fmt");
        cmd_format(input.path(), &out).unwrap();
        assert!(out.join("a.py").is_file());
    }
}
