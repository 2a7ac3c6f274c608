use std::path::PathBuf;

use polars::prelude::*;
use tracing::{error, info};

use crate::helper_functions::read_csv;
use crate::models::Dataset;

const ROW_INDEX: &str = "__row";

/// Per-trial metadata (visibility rating, stimulus presence, angles, tilt).
#[derive(Debug, Clone)]
pub struct Events {
    df: DataFrame,
}

impl Events {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Rows picked by `events_sel`, renumbered from zero.
    pub fn take_rows(&self, events_sel: &[usize]) -> PolarsResult<Events> {
        if let Some(&bad) = events_sel.iter().find(|&&i| i >= self.height()) {
            return Err(PolarsError::OutOfBounds(
                format!("trial selection index {bad} exceeds {} events", self.height()).into(),
            ));
        }
        let idx: Vec<IdxSize> = events_sel.iter().map(|&i| i as IdxSize).collect();
        let rows = self.df.take(&IdxCa::from_vec(PlSmallStr::from("events_sel"), idx))?;
        Ok(Events::new(rows))
    }

    /// Positions of the rows matching `query`. Null comparisons never match.
    pub fn query(&self, query: Expr) -> PolarsResult<Vec<usize>> {
        let matched = self
            .df
            .with_row_index(PlSmallStr::from(ROW_INDEX), None)?
            .lazy()
            .filter(query)
            .select([col(ROW_INDEX)])
            .collect()?;
        let rows = matched.column(ROW_INDEX)?.cast(&DataType::UInt64)?;
        let rows = rows.u64()?.into_no_null_iter().map(|i| i as usize).collect();
        Ok(rows)
    }

    /// Column as floats, nulls becoming NaN.
    pub fn f64_column(&self, name: &str) -> PolarsResult<Vec<f64>> {
        let column = self.df.column(name)?.cast(&DataType::Float64)?;
        Ok(column.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

pub struct EventsDataset {
    pub path: PathBuf,
}

impl Dataset for EventsDataset {
    type Output = Events;

    fn load(&self) -> PolarsResult<Events> {
        info!("Reading events from {}", self.path.display());
        match read_csv(&self.path) {
            Ok(df) => Ok(Events::new(df)),
            Err(e) => {
                error!("Failed to read events CSV {}: {}", self.path.display(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{subscores, visibility};
    use polars::df;

    fn events() -> Events {
        Events::new(
            df![
                "detect_button" => &[Some(0i64), Some(3), None, Some(1), Some(3)],
                "target_present" => &[true, true, true, false, true],
                "target_angle" => &[Some(0.5), Some(1.0), Some(1.5), None, Some(2.0)],
            ]
            .unwrap(),
        )
    }

    #[test]
    fn query_returns_row_positions() {
        let ev = events();
        assert_eq!(ev.query(visibility(3)).unwrap(), vec![1, 4]);
        assert_eq!(ev.query(visibility(2)).unwrap(), Vec::<usize>::new());

        let seen = subscores().into_iter().find(|s| s.name == "seen").unwrap();
        assert_eq!(ev.query(seen.query).unwrap(), vec![1, 4]);
    }

    #[test]
    fn take_rows_renumbers() {
        let sub = events().take_rows(&[4, 0, 2]).unwrap();
        assert_eq!(sub.height(), 3);
        assert_eq!(sub.query(visibility(3)).unwrap(), vec![0]);
        assert!(events().take_rows(&[7]).is_err());
    }

    #[test]
    fn nulls_become_nan() {
        let angles = events().f64_column("target_angle").unwrap();
        assert!(angles[3].is_nan());
        assert_eq!(angles[4], 2.0);
        let vis = events().f64_column("detect_button").unwrap();
        assert!(vis[2].is_nan());
    }
}
