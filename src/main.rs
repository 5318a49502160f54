//! cogkern CLI: drive a cognitive kernel from the command line.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use cogkern::attention::AttentionValue;
use cogkern::config::KernelConfig;
use cogkern::handle::AtomKind;
use cogkern::kernel::Kernel;
use cogkern::truth::TruthValue;

#[derive(Parser)]
#[command(name = "cogkern", version, about = "Hypergraph AtomSpace with economic attention")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a small concept hierarchy, spread attention and tick.
    Demo,

    /// Boot the kernel and run the cognitive loop.
    Run {
        /// Number of manual ticks (ignored when --hz is set).
        #[arg(long, default_value = "10")]
        ticks: u64,

        /// Autonomous cadence in Hz; 0 ticks manually.
        #[arg(long, default_value = "0")]
        hz: u32,

        /// How long to let the cadence run, in milliseconds.
        #[arg(long, default_value = "1000")]
        duration_ms: u64,
    },

    /// Show the effective configuration and kernel statistics.
    Info,
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
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };
    let kernel = Kernel::new(config)?;

    match cli.command {
        Commands::Demo => run_demo(&kernel, cli.json)?,

        Commands::Run {
            ticks,
            hz,
            duration_ms,
        } => {
            kernel.boot()?;
            kernel.start(hz)?;
            if hz == 0 {
                let mut forgotten = 0;
                for _ in 0..ticks {
                    forgotten += kernel.tick_report()?.forgotten.len();
                }
                tracing::info!(ticks, forgotten, "manual run complete");
            } else {
                std::thread::sleep(Duration::from_millis(duration_ms));
            }
            kernel.stop();
            print_info(&kernel, cli.json)?;
        }

        Commands::Info => {
            if cli.json {
                let value = serde_json::json!({
                    "config": kernel.config(),
                    "info": kernel.info(),
                });
                println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
            } else {
                println!("{}", kernel.config().to_toml()?);
                println!("{}", kernel.info());
            }
        }
    }

    Ok(())
}

fn run_demo(kernel: &Kernel, json: bool) -> Result<()> {
    let cat = kernel.create_atom(AtomKind::Concept, Some("cat"))?;
    let mammal = kernel.create_atom(AtomKind::Concept, Some("mammal"))?;
    let animal = kernel.create_atom(AtomKind::Concept, Some("animal"))?;
    let cat_isa = kernel.create_link(AtomKind::Inheritance, &[cat, mammal])?;
    let mammal_isa = kernel.create_link(AtomKind::Inheritance, &[mammal, animal])?;

    for h in [cat, mammal, animal, cat_isa, mammal_isa] {
        kernel.set_attention(h, AttentionValue::with_sti(0.0))?;
    }
    kernel.set_attention(cat, AttentionValue::with_sti(100.0))?;
    kernel.link_infer(cat_isa, mammal_isa, TruthValue::new(0.9, 0.8)?)?;

    let wage = kernel.stimulate(animal, 25.0)?;
    let recipients = kernel.spread_importance(cat, 0.2)?;
    tracing::info!(wage, recipients, "stimulated animal, spread from cat");

    kernel.boot()?;
    kernel.start(0)?;
    let report = kernel.tick_report()?;
    tracing::info!(
        processed = report.processed,
        rent = report.sti_rent,
        "first tick"
    );

    if !json {
        println!("Attentional focus:");
        for (h, av) in kernel.attentional_focus(5) {
            let label = kernel
                .get(h)
                .ok()
                .and_then(|a| a.name)
                .unwrap_or_else(|| h.to_string());
            println!("  {label:<10} {av}");
        }
        println!();
    }
    print_info(kernel, json)
}

fn print_info(kernel: &Kernel, json: bool) -> Result<()> {
    let info = kernel.info();
    if json {
        println!("{}", serde_json::to_string_pretty(&info).into_diagnostic()?);
    } else {
        println!("{info}");
    }
    Ok(())
}
