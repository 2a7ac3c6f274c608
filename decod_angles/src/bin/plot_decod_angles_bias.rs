use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use decod_angles::analysis::decod_angles::{tuning_path, TuningResults};
use decod_angles::analysis::target_probe::{bias_path, BiasResults};
use decod_angles::config::{Layout, ANALYSES};
use decod_angles::helper_functions::{read_json, write_config_json};
use decod_angles::report::bias::bias_section;
use decod_angles::report::decoding::decoding_section;
use decod_angles::report::Report;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let layout = Layout::from_env();
    write_config_json(&layout)?;
    let mut report = Report::new(layout.report_dir()?, "decod_angles_bias");

    let bias_file = bias_path(&layout)?;
    let bias: BiasResults = read_json(&bias_file)
        .with_context(|| format!("loading {}", bias_file.display()))?;
    bias_section(&mut report, &bias)?;

    for analysis in ANALYSES {
        let file = tuning_path(&layout, analysis)?;
        let results: TuningResults =
            read_json(&file).with_context(|| format!("loading {}", file.display()))?;
        decoding_section(&mut report, &results)?;
    }

    let path = report.save()?;
    info!("Report written to {}", path.display());
    Ok(())
}
