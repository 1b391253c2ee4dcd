use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ptex_atlas::config::{CliArgs, PipelineConfig};
use ptex_atlas::pipeline::Pipeline;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Init tracing
    let filter = if args.verbose {
        EnvFilter::new("ptex_atlas=debug")
    } else {
        EnvFilter::new("ptex_atlas=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config: PipelineConfig = args.into();

    // Configure rayon thread pool
    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure rayon thread pool")?;
    }

    match Pipeline::run(&config) {
        Ok(result) if config.dry_run => {
            println!(
                "Dry run: {} loops in {:.2}s",
                result.loops,
                result.duration.as_secs_f64()
            );
            Ok(())
        }
        Ok(result) => {
            let (w, h) = result.atlas_size;
            println!(
                "Done: {} loops packed into a {w}x{h} atlas in {:.2}s",
                result.loops,
                result.duration.as_secs_f64()
            );
            if let Some(path) = &result.atlas_path {
                println!("  Atlas:   {}", path.display());
            }
            if let Some(path) = &result.archive_path {
                println!("  Archive: {}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            error!(%e, "Pipeline failed");
            Err(anyhow::anyhow!(e)).context("ptex-atlas pipeline failed")
        }
    }
}
