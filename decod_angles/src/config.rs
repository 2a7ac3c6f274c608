//! Experiment constants and the on-disk layout of every artifact.
//!
//! ```text
//! <base>/results                                        report, config.json
//! <base>/<script>.log                                   resolved paths, if asked
//! <base>/data/<subject>/behavior/<subject>_events.csv   full trial metadata
//! <base>/data/<subject>/decod/<subject>_<lock>_<data_type>_<analysis>.json
//! <base>/data/fsaverage/score/fsaverage_<lock>_<data_type>_<analysis>.json
//! ```

use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::helper_functions::project_root;
use crate::models::{polars_err, Toi};

pub const SUBJECTS: [&str; 20] = [
    "ak130184", "el130086", "ga130053", "gm130176", "hn120493", "ia130315", "jd110235", "jm120476",
    "ma130185", "mc130295", "mj130216", "mr080072", "oa130317", "rg110386", "sb120316", "tc120199",
    "ts130283", "yp130276", "av130322", "ps120458",
];

/// Subject name under which group-level results are stored.
pub const AVERAGE_SUBJECT: &str = "fsaverage";

pub const TARGET_ANALYSIS: &str = "target_circAngle";
pub const PROBE_ANALYSIS: &str = "probe_circAngle";
pub const ANALYSES: [&str; 2] = [TARGET_ANALYSIS, PROBE_ANALYSIS];

/// Name of the cross-decoding bias results.
pub const TARGET_PROBE: &str = "target_probe";

pub const DATA_TYPES: [&str; 1] = ["erf"];

pub const TOIS: [Toi; 4] = [
    Toi::new(-0.100, 0.050),
    Toi::new(0.100, 0.250),
    Toi::new(0.300, 0.800),
    Toi::new(0.900, 1.050),
];

/// Early classifiers whose generalization over the whole trial is tracked.
pub const EARLY_WINDOWS: [Toi; 2] = [Toi::new(0.100, 0.150), Toi::new(0.170, 0.220)];

pub const N_BINS: usize = 24;

/// Visibility ratings 0..=3.
pub const N_VIS: usize = 4;

/// Probe orientation offset relative to the target, in tilt units.
pub const TILTS: [i64; 3] = [-1, 0, 1];

/// Probe onset, drawn as a reference line on the bias figures.
pub const PROBE_ONSET: f64 = 0.800;

pub struct Preproc {
    pub decim: usize,
    pub tmin: f64,
    pub tmax: f64,
}

pub const PREPROC: Preproc = Preproc { decim: 2, tmin: -0.200, tmax: 1.200 };

/// Peak decoding window of each stimulus.
pub fn peak_window(analysis: &str) -> Toi {
    if analysis == TARGET_ANALYSIS {
        Toi::new(0.100, 0.250)
    } else {
        Toi::new(0.900, 1.150)
    }
}

/// Named trial subselection over the events table.
#[derive(Debug, Clone)]
pub struct Subscore {
    pub name: &'static str,
    pub query: Expr,
}

fn present() -> Expr {
    col("target_present").eq(lit(true))
}

pub fn visibility(pas: i64) -> Expr {
    col("detect_button").eq(lit(pas)).and(present())
}

pub fn subscores() -> Vec<Subscore> {
    let mut subscores = vec![
        Subscore {
            name: "seen",
            query: col("detect_button").gt(lit(0)).and(present()),
        },
        Subscore {
            name: "unseen",
            query: visibility(0),
        },
    ];
    for (pas, name) in ["pas0", "pas1", "pas2", "pas3"].into_iter().enumerate() {
        subscores.push(Subscore { name, query: visibility(pas as i64) });
    }
    subscores.push(Subscore {
        name: "absent",
        query: col("target_present").eq(lit(false)),
    });
    subscores
}

/// Symbolic artifact kinds known to the path resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    BasePath,
    DataPath,
    Report,
    Log,
    Behavior,
    Decod,
    Score,
}

impl Artifact {
    fn dir_name(self) -> &'static str {
        match self {
            Artifact::BasePath => "base_path",
            Artifact::DataPath => "data_path",
            Artifact::Report => "report",
            Artifact::Log => "log",
            Artifact::Behavior => "behavior",
            Artifact::Decod => "decod",
            Artifact::Score => "score",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathParams {
    pub subject: String,
    pub data_type: String,
    pub lock: String,
    pub analysis: String,
    pub script: String,
    pub log: bool,
}

impl Default for PathParams {
    fn default() -> Self {
        Self {
            subject: AVERAGE_SUBJECT.to_string(),
            data_type: "erf".to_string(),
            lock: "target".to_string(),
            analysis: "analysis".to_string(),
            script: "config.rs".to_string(),
            log: false,
        }
    }
}

impl PathParams {
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn analysis(mut self, analysis: &str) -> Self {
        self.analysis = analysis.to_string();
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.script = script.to_string();
        self
    }

    pub fn logged(mut self) -> Self {
        self.log = true;
        self
    }
}

/// Resolves artifact paths under a project root.
#[derive(Debug, Clone)]
pub struct Layout {
    base_path: PathBuf,
}

impl Layout {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    /// Layout rooted at `PROJECT_ROOT`, or the working directory.
    pub fn from_env() -> Self {
        Self::new(project_root())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn data_path(&self) -> PathBuf {
        self.base_path.join("data")
    }

    pub fn report_dir(&self) -> PolarsResult<PathBuf> {
        self.path(Artifact::Report, &PathParams::default())
    }

    /// Builds the path of an artifact and creates its parent directories.
    pub fn path(&self, kind: Artifact, params: &PathParams) -> PolarsResult<PathBuf> {
        let PathParams { subject, data_type, lock, analysis, .. } = params;
        let this_path = self.data_path().join(subject).join(kind.dir_name());

        let file = match kind {
            Artifact::BasePath => self.base_path.clone(),
            Artifact::DataPath => self.data_path(),
            Artifact::Report => self.base_path.join("results"),
            Artifact::Log => {
                let stem = Path::new(&params.script)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| params.script.clone());
                self.base_path.join(format!("{stem}.log"))
            }
            Artifact::Behavior => this_path.join(format!("{subject}_events.csv")),
            Artifact::Decod | Artifact::Score => {
                this_path.join(format!("{subject}_{lock}_{data_type}_{analysis}.json"))
            }
        };

        let folder = match kind {
            Artifact::BasePath | Artifact::DataPath | Artifact::Report => Some(file.as_path()),
            _ => file.parent(),
        };
        if let Some(folder) = folder {
            create_dir_all(folder).map_err(|e| polars_err(Box::new(e)))?;
        }

        if params.log {
            let log_params = PathParams { log: false, ..params.clone() };
            let log_file = self.path(Artifact::Log, &log_params)?;
            info!("{}: {}", log_file.display(), file.display());
            let mut handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| polars_err(Box::new(e)))?;
            writeln!(handle, "{}", file.display()).map_err(|e| polars_err(Box::new(e)))?;
        }

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decod_path_follows_layout_and_creates_folders() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let params = PathParams::default().subject("ak130184").analysis(TARGET_ANALYSIS);

        let path = layout.path(Artifact::Decod, &params).unwrap();
        assert_eq!(
            path,
            dir.path()
                .join("data/ak130184/decod/ak130184_target_erf_target_circAngle.json")
        );
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn logged_paths_are_appended_to_the_script_log() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let params = PathParams::default().script("run_decod_angles.rs").logged();

        let first = layout.path(Artifact::Behavior, &params.clone().subject("el130086")).unwrap();
        let second = layout.path(Artifact::Score, &params.analysis("x-tuning")).unwrap();

        let log = std::fs::read_to_string(dir.path().join("run_decod_angles.log")).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines, vec![first.display().to_string(), second.display().to_string()]);
    }

    #[test]
    fn subscores_and_windows_are_fixed() {
        let names: Vec<_> = subscores().iter().map(|s| s.name).collect();
        assert_eq!(names, ["seen", "unseen", "pas0", "pas1", "pas2", "pas3", "absent"]);
        assert_eq!(peak_window(PROBE_ANALYSIS), Toi::new(0.9, 1.15));
    }
}
