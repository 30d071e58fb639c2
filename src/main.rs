use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use hwpool::cli::{self, Cli, Commands};
use hwpool::cluster::PoolController;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let settings = cli::resolve_settings(args.config.as_deref(), args.inventory.as_deref())
        .context("Failed to load settings")?;

    match args.command {
        Commands::Serve(serve) => {
            let settings = cli::apply_serve_args(settings, &serve);
            cli::run_server(settings).await?;
        }
        Commands::Init(init) => {
            let summary =
                cli::init_inventory(&settings.inventory_path(), &init.resources, init.force)
                    .await
                    .context("Failed to initialize inventory")?;
            print!("{}", cli::format_init_summary(&summary));
        }
        Commands::Free(free) => {
            let adaptor = cli::open_adaptor(&settings);
            let nodes = cli::free_nodes(&adaptor, &free.pool).await?;
            print!("{}", cli::format_free_nodes(&free.pool, &nodes));
        }
        Commands::Inventory => {
            let adaptor = cli::open_adaptor(&settings);
            let report = cli::inventory_report(&adaptor).await?;
            print!("{}", cli::format_inventory(&report));
        }
        Commands::Validate => {
            let adaptor = cli::open_adaptor(&settings);
            let issues = cli::check_inventory(&adaptor).await?;
            print!("{}", cli::format_issues(&issues));
            if !issues.is_empty() {
                process::exit(2);
            }
        }
        Commands::Reconcile(reconcile) => {
            let mut settings = settings;
            if let Some(delay) = reconcile.provisioning_delay_secs {
                settings.provisioning_delay_secs = delay;
            }
            let pool = cli::load_request(&reconcile.request)
                .await
                .with_context(|| format!("Failed to load {}", reconcile.request.display()))?;
            let controller = PoolController::new(cli::open_adaptor(&settings));
            let report = cli::simulate_request(
                &controller,
                pool,
                reconcile.invocations,
                reconcile.release,
            )
            .await?;
            print!("{}", cli::format_simulation(&report));
        }
        Commands::Release(release) => {
            let adaptor = cli::open_adaptor(&settings);
            let report = cli::release_cloud(&adaptor, &release.cloud).await?;
            print!("{}", cli::format_release(&report));
        }
    }

    Ok(())
}
