use std::fmt;
use std::ops::{Deref, DerefMut};

use ndarray::{Array, Array1, Array3, ArrayD, Dimension, IxDyn};
use polars::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wraps any boxed error into the pipeline's error type.
pub fn polars_err(e: Box<dyn std::error::Error>) -> PolarsError {
    PolarsError::ComputeError(e.to_string().into())
}

/// Anything the pipeline reads from disk.
pub trait Dataset {
    type Output;

    fn load(&self) -> PolarsResult<Self::Output>;
}

/// Time of interest: half-open window `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Toi {
    pub start: f64,
    pub end: f64,
}

impl Toi {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Indices of the samples of `times` falling inside the window.
    pub fn indices(&self, times: &[f64]) -> Vec<usize> {
        times
            .iter()
            .enumerate()
            .filter(|(_, t)| self.contains(**t))
            .map(|(i, _)| i)
            .collect()
    }

    /// Figure title, e.g. `100 - 250 ms`.
    pub fn label(&self) -> String {
        format!("{:.0} - {:.0} ms", self.start * 1e3, self.end * 1e3)
    }
}

impl fmt::Display for Toi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.start, self.end)
    }
}

/// Cross-validated angle predictions over the generalization-across-time grid.
///
/// Training and testing share the same time axis, so `y_pred` is
/// `trials × train time × test time`. Angles are radians on the full circle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gat {
    pub times: Array1<f64>,
    pub y_true: Array1<f64>,
    pub y_pred: Array3<f64>,
}

impl Gat {
    pub fn n_trials(&self) -> usize {
        self.y_true.len()
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn times(&self) -> &[f64] {
        self.times.as_slice().unwrap_or(&[])
    }

    pub fn validate(&self) -> PolarsResult<()> {
        let (n_trials, n_train, n_test) = self.y_pred.dim();
        if n_trials != self.n_trials() || n_train != self.n_times() || n_test != self.n_times() {
            return Err(PolarsError::ShapeMismatch(
                format!(
                    "predictions have shape {:?}, expected ({}, {}, {})",
                    self.y_pred.dim(),
                    self.n_trials(),
                    self.n_times(),
                    self.n_times()
                )
                .into(),
            ));
        }
        if self.times.as_slice().is_none() {
            return Err(PolarsError::ComputeError("time axis is not contiguous".into()));
        }
        Ok(())
    }
}

/// N-dimensional result array that survives JSON with its NaNs.
///
/// Serialized as `{"shape": [...], "data": [...]}` in row-major order with
/// NaN written as `null`.
#[derive(Debug, Clone)]
pub struct NanArray(pub ArrayD<f64>);

#[derive(Serialize, Deserialize)]
struct NanArrayRepr {
    shape: Vec<usize>,
    data: Vec<Option<f64>>,
}

impl NanArray {
    /// All-NaN array of the given shape.
    pub fn nan(shape: &[usize]) -> Self {
        Self(ArrayD::from_elem(IxDyn(shape), f64::NAN))
    }
}

impl<D: Dimension> From<Array<f64, D>> for NanArray {
    fn from(a: Array<f64, D>) -> Self {
        Self(a.into_dyn())
    }
}

impl Deref for NanArray {
    type Target = ArrayD<f64>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for NanArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Serialize for NanArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NanArrayRepr {
            shape: self.0.shape().to_vec(),
            data: self.0.iter().map(|v| (!v.is_nan()).then_some(*v)).collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NanArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = NanArrayRepr::deserialize(deserializer)?;
        let data = repr.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        ArrayD::from_shape_vec(IxDyn(&repr.shape), data)
            .map(NanArray)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn nan_array_keeps_nans_through_json() {
        let a = NanArray::from(array![[1.0, f64::NAN], [0.5, -2.0]]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"shape":[2,2],"data":[1.0,null,0.5,-2.0]}"#);

        let back: NanArray = serde_json::from_str(&json).unwrap();
        assert_eq!(back.shape(), &[2, 2]);
        assert!(back[&[0, 1][..]].is_nan());
        assert_eq!(back[&[1, 1][..]], -2.0);
    }

    #[test]
    fn toi_is_half_open() {
        let toi = Toi::new(0.1, 0.25);
        let times = [0.0, 0.1, 0.2, 0.25, 0.3];
        assert_eq!(toi.indices(&times), vec![1, 2]);
        assert_eq!(toi.label(), "100 - 250 ms");
    }

    #[test]
    fn gat_shape_is_checked() {
        let gat = Gat {
            times: array![0.0, 0.1],
            y_true: array![0.0, 1.0, 2.0],
            y_pred: Array3::zeros((3, 2, 1)),
        };
        assert!(gat.validate().is_err());
    }
}
