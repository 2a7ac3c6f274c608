use std::path::PathBuf;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Artifact, Layout, PathParams};
use crate::data_handling::events::{Events, EventsDataset};
use crate::helper_functions::read_json;
use crate::models::{Dataset, Gat};

/// On-disk classifier output of one subject and analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodArtifact {
    pub gat: Gat,
    /// Row of the events table behind each classifier trial.
    pub events_sel: Vec<usize>,
}

/// Everything the aggregation needs about one subject.
#[derive(Debug, Clone)]
pub struct SubjectDecoding {
    pub subject: String,
    pub gat: Gat,
    pub events_sel: Vec<usize>,
    /// Full session table; see [`SubjectDecoding::subevents`].
    pub events: Events,
}

impl SubjectDecoding {
    /// Events of the classifier trials, in classifier trial order.
    pub fn subevents(&self) -> PolarsResult<Events> {
        self.events.take_rows(&self.events_sel)
    }
}

pub struct DecodDataset {
    pub subject: String,
    pub decod_path: PathBuf,
    pub events_path: PathBuf,
}

impl DecodDataset {
    pub fn for_subject(layout: &Layout, subject: &str, analysis: &str) -> PolarsResult<Self> {
        let params = PathParams::default()
            .subject(subject)
            .analysis(analysis)
            .script("run_decod_angles.rs")
            .logged();
        Ok(Self {
            subject: subject.to_string(),
            decod_path: layout.path(Artifact::Decod, &params)?,
            events_path: layout.path(Artifact::Behavior, &params)?,
        })
    }
}

impl Dataset for DecodDataset {
    type Output = SubjectDecoding;

    fn load(&self) -> PolarsResult<SubjectDecoding> {
        info!("Loading {} from {}", self.subject, self.decod_path.display());
        let DecodArtifact { gat, events_sel } = read_json(&self.decod_path)?;
        gat.validate()?;
        if events_sel.len() != gat.n_trials() {
            return Err(PolarsError::ShapeMismatch(
                format!(
                    "{}: {} selected events for {} classifier trials",
                    self.subject,
                    events_sel.len(),
                    gat.n_trials()
                )
                .into(),
            ));
        }

        let events = EventsDataset { path: self.events_path.clone() }.load()?;
        Ok(SubjectDecoding { subject: self.subject.clone(), gat, events_sel, events })
    }
}
