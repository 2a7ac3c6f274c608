//! HTML report assembled from figures and tables, written once on `save`.

pub mod bias;
pub mod decoding;
pub mod plots;

use std::fmt::Write as _;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::helper_functions::dataframe_to_csv;
use crate::models::polars_err;

const FIGURE_DIR: &str = "figures";

#[derive(Debug, Clone, PartialEq)]
enum Content {
    /// PNG path relative to the report directory.
    Figure(PathBuf),
    Html(String),
}

#[derive(Debug, Clone)]
struct Entry {
    section: String,
    subsection: String,
    content: Content,
}

#[derive(Debug)]
pub struct Report {
    dir: PathBuf,
    title: String,
    entries: Vec<Entry>,
}

impl Report {
    pub fn new(dir: impl Into<PathBuf>, title: &str) -> Self {
        Self { dir: dir.into(), title: title.to_string(), entries: Vec::new() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves a PNG path for a figure and registers it under `section`.
    ///
    /// The caller draws into the returned path before `save`.
    pub fn add_figure(&mut self, section: &str, subsection: &str) -> PolarsResult<PathBuf> {
        let n = self.entries.iter().filter(|e| matches!(e.content, Content::Figure(_))).count();
        let name = format!("{n:02}_{}_{}.png", slug(section), slug(subsection));
        let relative = Path::new(FIGURE_DIR).join(name);

        let absolute = self.dir.join(&relative);
        if let Some(parent) = absolute.parent() {
            create_dir_all(parent).map_err(|e| polars_err(Box::new(e)))?;
        }
        self.push(section, subsection, Content::Figure(relative));
        Ok(absolute)
    }

    pub fn add_html(&mut self, html: String, section: &str, subsection: &str) {
        self.push(section, subsection, Content::Html(html));
    }

    /// Adds `table` as HTML and writes it as `<name>.csv` next to the report.
    pub fn add_table(
        &mut self,
        table: &[Vec<String>],
        name: &str,
        section: &str,
        subsection: &str,
    ) -> PolarsResult<PathBuf> {
        let mut df = table_to_dataframe(table)?;
        let csv_path = self.dir.join(format!("{}.csv", slug(name)));
        create_dir_all(&self.dir).map_err(|e| polars_err(Box::new(e)))?;
        dataframe_to_csv(&mut df, &csv_path)?;
        self.add_html(table_to_html(table), section, subsection);
        Ok(csv_path)
    }

    fn push(&mut self, section: &str, subsection: &str, content: Content) {
        self.entries.push(Entry {
            section: section.to_string(),
            subsection: subsection.to_string(),
            content,
        });
    }

    /// Section names in first-insertion order.
    fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !sections.contains(&entry.section.as_str()) {
                sections.push(&entry.section);
            }
        }
        sections
    }

    pub fn render(&self) -> String {
        let mut html = String::new();
        let _ = writeln!(html, "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">");
        let _ = writeln!(html, "<title>{}</title>\n</head>\n<body>", escape(&self.title));
        let _ = writeln!(html, "<h1>{}</h1>", escape(&self.title));

        for section in self.sections() {
            let _ = writeln!(
                html,
                "<section id=\"{}\">\n<h2>{}</h2>",
                slug(section),
                escape(section)
            );
            for entry in self.entries.iter().filter(|e| e.section == section) {
                let _ = writeln!(html, "<h3>{}</h3>", escape(&entry.subsection));
                match &entry.content {
                    Content::Figure(path) => {
                        let src = path.to_string_lossy().replace('\\', "/");
                        let _ = writeln!(
                            html,
                            "<img src=\"{}\" alt=\"{}\">",
                            escape(&src),
                            escape(&entry.subsection)
                        );
                    }
                    Content::Html(fragment) => {
                        let _ = writeln!(html, "{fragment}");
                    }
                }
            }
            let _ = writeln!(html, "</section>");
        }
        html.push_str("</body>\n</html>\n");
        html
    }

    pub fn save(&self) -> PolarsResult<PathBuf> {
        create_dir_all(&self.dir).map_err(|e| polars_err(Box::new(e)))?;
        let path = self.dir.join("report.html");
        fs::write(&path, self.render()).map_err(|e| polars_err(Box::new(e)))?;
        info!("Report with {} entries saved to {}", self.entries.len(), path.display());
        Ok(path)
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn slug(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Renders a table whose first row is the header.
pub fn table_to_html(table: &[Vec<String>]) -> String {
    let mut html = String::from("<table>\n");
    for (i, row) in table.iter().enumerate() {
        let tag = if i == 0 { "th" } else { "td" };
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<{tag}>{}</{tag}>", escape(cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

/// String columns named after the header row; an empty header becomes `label`.
pub fn table_to_dataframe(table: &[Vec<String>]) -> PolarsResult<DataFrame> {
    let Some((header, rows)) = table.split_first() else {
        return Err(PolarsError::NoData("empty table".into()));
    };
    let columns = header
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let name = if name.is_empty() { "label" } else { name.as_str() };
            let values: Vec<&str> =
                rows.iter().map(|row| row.get(j).map(String::as_str).unwrap_or("")).collect();
            Column::new(PlSmallStr::from(name), values)
        })
        .collect();
    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::bias::bias_section;
    use super::decoding::decoding_section;
    use crate::analysis::decod_angles::{aggregate_tuning, tests::subject, TuningResults};
    use crate::analysis::target_probe::{aggregate_bias, tests::pair, BiasResults};
    use crate::config::TARGET_ANALYSIS;
    use crate::data_handling::events::Events;
    use crate::helper_functions::{read_json, write_json};

    fn table() -> Vec<Vec<String>> {
        vec![
            vec!["".into(), "(0.100, 0.250)".into()],
            vec!["vis0".into(), "[0.010+/-0.002, p=0.0400]".into()],
            vec!["diff".into(), "<b>".into()],
        ]
    }

    #[test]
    fn html_table_escapes_cells() {
        let html = table_to_html(&table());
        assert!(html.starts_with("<table>\n<tr><th></th><th>(0.100, 0.250)</th></tr>"));
        assert!(html.contains("<td>&lt;b&gt;</td>"));
    }

    #[test]
    fn dataframe_uses_header_row() {
        let df = table_to_dataframe(&table()).unwrap();
        assert_eq!(df.shape(), (2, 2));
        let names: Vec<&str> = df.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["label", "(0.100, 0.250)"]);
        assert!(table_to_dataframe(&[]).is_err());
    }

    #[test]
    fn save_groups_entries_by_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = Report::new(dir.path(), "decod_angles_bias");
        let fig = report.add_figure("target_probe", "cross_generalization").unwrap();
        assert!(fig.starts_with(dir.path().join(FIGURE_DIR)));
        report.add_html("<p>first</p>".into(), "bias", "table");
        report.add_html("<p>second</p>".into(), "target_probe", "note");
        let csv = report.add_table(&table(), "target table", "bias", "csv").unwrap();
        assert!(csv.exists());

        let path = report.save().unwrap();
        let html = fs::read_to_string(path).unwrap();
        let target = html.find("<h2>target_probe</h2>").unwrap();
        let second = html.find("<p>second</p>").unwrap();
        let bias = html.find("<h2>bias</h2>").unwrap();
        assert!(target < second && second < bias);
        assert!(html.contains("src=\"figures/00_target_probe_cross_generalization.png\""));
    }

    fn files_with_extension(dir: &Path, extension: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|e| e == extension))
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Stored results are read back the way the plotting binary reads them.
    fn reloaded<T>(value: &T, path: &Path) -> T
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        write_json(value, path).unwrap();
        read_json(path).unwrap()
    }

    #[test]
    fn full_report_from_stored_results() {
        let dir = tempfile::tempdir().unwrap();
        let pairs = [pair("ak130184"), pair("el130086"), pair("ga130053")];
        let bias = aggregate_bias(pairs.into_iter().map(Ok)).unwrap();
        let bias: BiasResults = reloaded(&bias, &dir.path().join("target_probe.json"));
        assert_eq!(bias.bias.shape(), &[3, 2, 2, 4, 4]);
        assert_eq!(bias.subjects, vec!["ak130184", "el130086", "ga130053"]);

        let subjects = [subject("ak130184"), subject("el130086")];
        let tuning = aggregate_tuning(TARGET_ANALYSIS, subjects.into_iter().map(Ok)).unwrap();
        let tuning: TuningResults = reloaded(&tuning, &dir.path().join("tuning.json"));
        assert_eq!(tuning.analysis, TARGET_ANALYSIS);
        assert!(tuning.subscore["absent"].toi.iter().all(|v| v.is_nan()));

        let report_dir = dir.path().join("report");
        let mut report = Report::new(&report_dir, "decod_angles_bias");
        bias_section(&mut report, &bias).unwrap();
        decoding_section(&mut report, &tuning).unwrap();
        let html = fs::read_to_string(report.save().unwrap()).unwrap();

        // five bias figures, four decoding figures
        let figures = files_with_extension(&report_dir.join(FIGURE_DIR), "png");
        assert_eq!(figures.len(), 9);
        assert!(figures.contains(&"00_target_probe_cross_generalization.png".to_string()));
        for figure in &figures {
            assert!(fs::metadata(report_dir.join(FIGURE_DIR).join(figure)).unwrap().len() > 0);
            assert!(html.contains(&format!("src=\"figures/{figure}\"")), "{figure}");
        }
        let tables = files_with_extension(&report_dir, "csv");
        assert_eq!(tables.len(), 4);
        assert!(tables.contains(&"bias_visibility_target.csv".to_string()));
        assert!(tables.contains(&"target_circangle_subscores.csv".to_string()));
    }

    #[test]
    fn report_without_tilted_trials() {
        let untilted = |name: &str| {
            let (mut target, mut probe) = pair(name);
            let mut df = target.events.dataframe().clone();
            let zeros = vec![0i64; df.height()];
            df.with_column(Series::new("probe_tilt".into(), zeros)).unwrap();
            target.events = Events::new(df.clone());
            probe.events = Events::new(df);
            (target, probe)
        };
        let pairs = [untilted("ak130184"), untilted("el130086")];
        let bias = aggregate_bias(pairs.into_iter().map(Ok)).unwrap();
        assert!(bias.bias.iter().all(|v| v.is_nan()));
        assert!(bias.bias_vis_toi.iter().all(|v| v.is_nan()));
        assert!(bias.bias_pval.iter().all(|v| v.is_nan()));
        let dir = tempfile::tempdir().unwrap();
        let bias: BiasResults = reloaded(&bias, &dir.path().join("target_probe.json"));

        let mut report = Report::new(dir.path(), "decod_angles_bias");
        bias_section(&mut report, &bias).unwrap();
        let html = fs::read_to_string(report.save().unwrap()).unwrap();
        assert_eq!(files_with_extension(&dir.path().join(FIGURE_DIR), "png").len(), 5);
        assert!(html.contains("[NaN+/-NaN, p=NaN]"));
    }
}
