//! labgraph CLI: compile, verify and stress-test lab protocol plans.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use labgraph::compiler::Compiler;
use labgraph::config::CompilerConfig;
use labgraph::error::PhysicsError;
use labgraph::ir::load_ir_file;
use labgraph::plan::ProtocolPlan;
use labgraph::profile::{BUNDLED_PROFILES, CapabilityProfile};
use labgraph::robustness::{AcceptancePolicy, PassRatePolicy, SweepConfig, robustness_sweep};

#[derive(Parser)]
#[command(name = "labgraph", version, about = "Lab protocol compiler and physics validator")]
struct Cli {
    /// Compiler configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a protocol plan and export its canonical IR.
    Compile {
        /// Plan file (JSON, or TOML with a .toml extension).
        #[arg(long)]
        plan: PathBuf,

        /// Bundled profile name or path to a profile TOML.
        #[arg(long)]
        profile: Option<String>,

        /// Write the IR here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Load an exported IR file and verify its structure and content hash.
    Verify {
        #[arg(long)]
        ir: PathBuf,
    },

    /// Dry-run perturbed copies of a plan and report failure modes.
    Sweep {
        #[arg(long)]
        plan: PathBuf,

        #[arg(long)]
        profile: Option<String>,

        #[arg(long, default_value = "100")]
        trials: usize,

        /// Relative noise bound, e.g. 0.05 for ±5 %.
        #[arg(long, default_value = "0.05")]
        noise: f64,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Minimum pass rate to accept.
        #[arg(long, default_value = "0.95")]
        min_pass_rate: f64,
    },

    /// List bundled capability profiles.
    Profiles,
}

/// Print the machine-readable report, then hand the diagnostic to miette.
fn rejected(err: PhysicsError) -> miette::Report {
    println!("{}", err.to_report().to_agent_payload());
    err.into()
}

fn resolve_profile(profile: Option<&str>) -> Result<Option<CapabilityProfile>> {
    profile.map(CapabilityProfile::resolve).transpose().map_err(rejected)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::load(path).map_err(rejected)?,
        None => CompilerConfig::default(),
    };
    let compiler = Compiler::new(config);

    match cli.command {
        Commands::Compile { plan, profile, out } => {
            let plan = ProtocolPlan::load(&plan).map_err(rejected)?;
            let profile = resolve_profile(profile.as_deref())?;
            let ir = compiler
                .validate(&plan, profile.as_ref())
                .map_err(rejected)?
                .export_json();

            match out {
                Some(path) => {
                    std::fs::write(&path, ir.to_canonical_bytes()).into_diagnostic()?;
                    let summary = ir.summary();
                    eprintln!(
                        "Wrote {} ({} steps, sha256 {})",
                        path.display(),
                        summary.step_count,
                        summary.content_hash
                    );
                }
                None => println!("{}", ir.to_canonical_string()),
            }
        }

        Commands::Verify { ir } => {
            let payload = load_ir_file(&ir).map_err(rejected)?;
            let summary = payload.summary();
            println!("OK {}", ir.display());
            println!("  protocol:       {}", payload.protocol_name);
            println!("  ir_version:     {}", summary.ir_version);
            println!("  schema_version: {}", summary.schema_version);
            println!("  steps:          {}", summary.step_count);
            println!("  content_hash:   {}", summary.content_hash);
        }

        Commands::Sweep {
            plan,
            profile,
            trials,
            noise,
            seed,
            min_pass_rate,
        } => {
            let plan = ProtocolPlan::load(&plan).map_err(rejected)?;
            let profile = resolve_profile(profile.as_deref())?;
            let graph = compiler.build(&plan).map_err(rejected)?;
            let sweep = SweepConfig {
                trials,
                noise_level: noise,
                seed,
            };
            let report = robustness_sweep(&graph, profile.as_ref(), &sweep);

            println!(
                "{}/{} trials passed ({:.1}%)",
                report.passed,
                report.trials,
                report.pass_rate * 100.0
            );
            for (constraint, count) in &report.failure_modes {
                println!("  {constraint}: {count}");
            }
            let policy = PassRatePolicy { min_pass_rate };
            if !policy.accept(&report) {
                miette::bail!(
                    "pass rate {:.3} is below the required {min_pass_rate}",
                    report.pass_rate
                );
            }
        }

        Commands::Profiles => {
            for name in BUNDLED_PROFILES {
                let profile = CapabilityProfile::bundled(name).map_err(rejected)?;
                println!(
                    "{name}: max_volume {}, temp {}..{}, max_steps {}",
                    profile.max_volume,
                    profile
                        .min_temp
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    profile.max_temp,
                    profile.max_steps
                );
            }
        }
    }

    Ok(())
}
