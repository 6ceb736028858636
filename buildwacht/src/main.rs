//! Buildwacht - incremental build driver

use buildwacht::ProjectOptions;
use buildwacht::commands::{Cli, Commands, make, status, suspend};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "buildwacht=debug,convenient_monitor=debug,convenient_ledger=debug"
    } else {
        "buildwacht=info,convenient_monitor=info,convenient_ledger=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = ProjectOptions {
        workspace: cli.workspace,
        system_dir: cli.system_dir,
    };

    let result = match cli.command {
        Commands::Make { rebuild, force } => make::make(&options, rebuild, force).await.map(|summary| {
            println!(
                "{} compiled, {} deleted, {} failed{}",
                summary.compiled,
                summary.deleted,
                summary.failed,
                if summary.rebuild { " (full rebuild)" } else { "" }
            );
        }),
        Commands::Status => status::status(&options).await.map(|report| report.print()),
        Commands::Suspend => suspend::suspend(&options).map(|()| println!("Workspace suspended")),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
