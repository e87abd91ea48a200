use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use usage_exporter::config::Config;
use usage_exporter::control_plane::SnapshotReader;
use usage_exporter::delivery::{DeliveryChannel, HttpDeliveryChannel, LogChannel, RateLimitedChannel};
use usage_exporter::logging::init_logging;
use usage_exporter::pipeline::PreparationPipeline;

#[derive(Parser)]
#[command(name = "usage_exporter")]
#[command(about = "Cloud resource usage accounting exporter")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract usage records from a control plane snapshot and deliver them
    Export {
        /// Path to the configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Path to the control plane snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,
        /// Prepare records but log them instead of transmitting
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Export {
            config,
            snapshot,
            dry_run,
        } => {
            let config = Config::load(&config)?;
            let reader = Arc::new(SnapshotReader::from_path(&snapshot)?);

            let records_per_min = config.delivery.records_per_min;
            let channel: Arc<dyn DeliveryChannel> = if dry_run {
                info!("dry run: records will be logged, not transmitted");
                Arc::new(RateLimitedChannel::new(LogChannel, records_per_min))
            } else {
                let http =
                    HttpDeliveryChannel::new(&config.delivery, config.site.site_name.clone())?;
                Arc::new(RateLimitedChannel::new(http, records_per_min))
            };

            let pipeline = PreparationPipeline::new(reader, channel, &config);
            let summary = pipeline.run().await?;

            println!("\n📊 Export results for {}:", config.site.site_name);
            println!("   Total machines: {}", summary.total);
            println!("   Delivered: {}", summary.delivered);
            println!("   Dropped: {}", summary.dropped);
            println!("   Failed: {}", summary.failed);
        }
    }

    Ok(())
}
