use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use decod_angles::analysis::decod_angles::run_decod_angles;
use decod_angles::analysis::target_probe::run_target_probe;
use decod_angles::config::{Layout, ANALYSES};
use decod_angles::helper_functions::write_config_json;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let layout = Layout::from_env();
    info!("Aggregating angle decoding under {}", layout.base_path().display());
    write_config_json(&layout)?;

    for analysis in ANALYSES {
        let path = run_decod_angles(&layout, analysis)
            .with_context(|| format!("aggregating {analysis}"))?;
        info!("{analysis} done: {}", path.display());
    }

    let path = run_target_probe(&layout).context("aggregating target/probe bias")?;
    info!("target/probe bias done: {}", path.display());
    Ok(())
}
