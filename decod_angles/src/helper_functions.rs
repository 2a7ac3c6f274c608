use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::{self, Layout};
use crate::models::polars_err;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Snapshot of the experiment constants, written next to the report.
pub fn write_config_json(layout: &Layout) -> PolarsResult<PathBuf> {
    let subscores: Vec<_> = config::subscores()
        .into_iter()
        .map(|s| json!({ "name": s.name, "query": format!("{:?}", s.query) }))
        .collect();

    let config = json!({
        "SUBJECTS": config::SUBJECTS,
        "ANALYSES": config::ANALYSES,
        "TOIS": config::TOIS,
        "EARLY_WINDOWS": config::EARLY_WINDOWS,
        "N_BINS": config::N_BINS,
        "N_VIS": config::N_VIS,
        "PREPROC": {
            "decim": config::PREPROC.decim,
            "crop": { "tmin": config::PREPROC.tmin, "tmax": config::PREPROC.tmax },
        },
        "DATA_TYPES": config::DATA_TYPES,
        "SUBSCORES": subscores,
    });

    let config_path = layout.report_dir()?.join("config.json");
    let pretty = serde_json::to_string_pretty(&config).map_err(|e| polars_err(Box::new(e)))?;
    fs::write(&config_path, pretty).map_err(|e| polars_err(Box::new(e)))?;

    info!("Experiment configuration written to {}", config_path.display());
    Ok(config_path)
}

pub fn read_csv(file_path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()
}

pub fn dataframe_to_csv(df: &mut DataFrame, file_path: &Path) -> PolarsResult<()> {
    let mut file = File::create(file_path).map_err(|e| polars_err(Box::new(e)))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)
}

pub fn read_json<T: DeserializeOwned>(file_path: &Path) -> PolarsResult<T> {
    let file = File::open(file_path)
        .map_err(|e| polars_err(format!("cannot open {}: {e}", file_path.display()).into()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| polars_err(Box::new(e)))
}

pub fn write_json<T: Serialize>(value: &T, file_path: &Path) -> PolarsResult<()> {
    let file = File::create(file_path).map_err(|e| polars_err(Box::new(e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| polars_err(Box::new(e)))?;
    writer.flush().map_err(|e| polars_err(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn csv_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let mut df = df![
            "detect_button" => &[0i64, 3, 1],
            "target_present" => &[true, true, false],
        ]
        .unwrap();

        dataframe_to_csv(&mut df, &path).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(back.shape(), (3, 2));
        assert_eq!(back.column("detect_button").unwrap().i64().unwrap().get(1), Some(3));
    }

    #[test]
    fn missing_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res: PolarsResult<Vec<f64>> = read_json(&dir.path().join("nope.json"));
        assert!(res.is_err());
    }
}
