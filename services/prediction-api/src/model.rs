//! The loaded price model: a linear regressor over (optionally standardized) house features.
//!
//! Artifacts are JSON. The regressor lists the request fields it uses, one coefficient each,
//! an intercept, whether it predicts price or log-price, and how it estimates uncertainty.
//! The optional companion preprocessor is a standard scaler applied before the regressor.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use crate::schema::HouseFeatures;

pub const DEFAULT_INTERVAL_FRACTION: f64 = 0.10;
const DEFAULT_Z: f64 = 1.96;
fn default_z() -> f64 { DEFAULT_Z }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target { #[default] Price, LogPrice }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntervalEstimator {
    /// Plus/minus a fraction of the point estimate.
    Relative { fraction: f64 },
    /// Plus/minus `z` residual standard deviations, in target space.
    Residual { std: f64, #[serde(default = "default_z")] z: f64 },
}

impl Default for IntervalEstimator { fn default() -> Self { Self::Relative { fraction: DEFAULT_INTERVAL_FRACTION } } }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionArtifact {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub interval: IntervalEstimator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    pub features: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("artifact not found at {0:?}")] Missing(PathBuf),
    #[error("reading {path:?}: {source}")] Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("decoding {path:?}: {source}")] Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("invalid artifact: {0}")] Invalid(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model produced a non-finite value")] NonFinite,
    #[error("model produced a non-positive price {0}")] NonPositive(f64),
    #[error("inference task aborted: {0}")] Panicked(String),
}

/// Point estimate with its interval, `low <= price <= high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate { pub price: f64, pub low: f64, pub high: f64 }

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub version: Option<String>,
    pub features: usize,
    pub target: Target,
    pub scaled: bool,
}

#[derive(Debug, Clone, Copy)]
struct Column { index: usize, coefficient: f64, mean: f64, scale: f64 }

/// Immutable once built; shared across requests behind an `Arc`.
#[derive(Debug)]
pub struct LoadedModel {
    regressor: RegressionArtifact,
    columns: Vec<Column>,
    scaled: bool,
    source: Option<PathBuf>,
}

impl LoadedModel {
    /// Reads `<dir>/<model_name>.json` and, when present, `<dir>/<preprocessor_name>.json`.
    pub fn load(dir: &Path, model_name: &str, preprocessor_name: &str) -> Result<Self, ModelLoadError> {
        let companion = dir.join(format!("{preprocessor_name}.json"));
        let companion = companion.is_file().then_some(companion);
        Self::from_files(&dir.join(format!("{model_name}.json")), companion.as_deref())
    }

    pub fn from_files(model_path: &Path, preprocessor_path: Option<&Path>) -> Result<Self, ModelLoadError> {
        let regressor: RegressionArtifact = read_json(model_path)?;
        let preprocessor = preprocessor_path.map(read_json::<Preprocessor>).transpose()?;
        let mut model = Self::from_parts(regressor, preprocessor)?;
        model.source = Some(model_path.to_path_buf());
        Ok(model)
    }

    pub fn from_parts(regressor: RegressionArtifact, preprocessor: Option<Preprocessor>) -> Result<Self, ModelLoadError> {
        check_regressor(&regressor)?;
        let scaling = match &preprocessor {
            Some(p) => check_preprocessor(p)?,
            None => HashMap::new(),
        };
        for name in scaling.keys() {
            if !regressor.features.iter().any(|f| f == name) { warn!(feature=%name, "preprocessor scales a feature the model does not use"); }
        }
        let columns = regressor.features.iter().zip(&regressor.coefficients).map(|(name, &coefficient)| {
            let (mean, scale) = scaling.get(name.as_str()).copied().unwrap_or((0.0, 1.0));
            // names were checked above
            let index = HouseFeatures::field_index(name).unwrap_or_default();
            Column { index, coefficient, mean, scale }
        }).collect();
        Ok(Self { regressor, columns, scaled: preprocessor.is_some(), source: None })
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.regressor.name.clone(),
            version: self.regressor.version.clone(),
            features: self.columns.len(),
            target: self.regressor.target,
            scaled: self.scaled,
        }
    }

    pub fn source(&self) -> Option<&Path> { self.source.as_deref() }

    pub fn predict(&self, house: &HouseFeatures) -> Result<Estimate, InferenceError> {
        let row = house.as_row();
        let y = self.columns.iter().fold(self.regressor.intercept, |acc, c| acc + c.coefficient * (row[c.index] - c.mean) / c.scale);
        if !y.is_finite() { return Err(InferenceError::NonFinite); }

        let (price, low, high) = match (self.regressor.target, &self.regressor.interval) {
            (Target::LogPrice, IntervalEstimator::Residual { std, z }) => (y.exp(), (y - z * std).exp(), (y + z * std).exp()),
            (Target::Price, IntervalEstimator::Residual { std, z }) => (y, (y - z * std).max(0.0), y + z * std),
            (target, IntervalEstimator::Relative { fraction }) => {
                let price = if target == Target::LogPrice { y.exp() } else { y };
                (price, (price * (1.0 - fraction)).max(0.0), price * (1.0 + fraction))
            }
        };
        if !price.is_finite() || !high.is_finite() { return Err(InferenceError::NonFinite); }
        if price <= 0.0 { return Err(InferenceError::NonPositive(price)); }
        Ok(Estimate { price, low: low.min(price), high: high.max(price) })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelLoadError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ModelLoadError::Missing(path.to_path_buf()),
        _ => ModelLoadError::Io { path: path.to_path_buf(), source: e },
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ModelLoadError::Parse { path: path.to_path_buf(), source })
}

fn check_known(features: &[String], what: &str) -> Result<(), ModelLoadError> {
    let mut seen = HashSet::new();
    for name in features {
        if HouseFeatures::field_index(name).is_none() { return Err(ModelLoadError::Invalid(format!("{what} uses unknown feature '{name}'"))); }
        if !seen.insert(name.as_str()) { return Err(ModelLoadError::Invalid(format!("{what} lists '{name}' twice"))); }
    }
    Ok(())
}

fn check_regressor(r: &RegressionArtifact) -> Result<(), ModelLoadError> {
    if r.features.len() != r.coefficients.len() {
        return Err(ModelLoadError::Invalid(format!("{} features but {} coefficients", r.features.len(), r.coefficients.len())));
    }
    check_known(&r.features, "model")?;
    if !r.intercept.is_finite() || r.coefficients.iter().any(|c| !c.is_finite()) {
        return Err(ModelLoadError::Invalid("non-finite model parameter".into()));
    }
    match r.interval {
        IntervalEstimator::Relative { fraction } if !(0.0..1.0).contains(&fraction) => Err(ModelLoadError::Invalid(format!("interval fraction {fraction} outside [0, 1)"))),
        IntervalEstimator::Residual { std, z } if !(std.is_finite() && std >= 0.0 && z.is_finite() && z > 0.0) => Err(ModelLoadError::Invalid(format!("bad residual interval std={std} z={z}"))),
        _ => Ok(()),
    }
}

fn check_preprocessor(p: &Preprocessor) -> Result<HashMap<&str, (f64, f64)>, ModelLoadError> {
    if p.features.len() != p.mean.len() || p.features.len() != p.scale.len() {
        return Err(ModelLoadError::Invalid("preprocessor features, mean and scale differ in length".into()));
    }
    check_known(&p.features, "preprocessor")?;
    let mut out = HashMap::new();
    for ((name, &mean), &scale) in p.features.iter().zip(&p.mean).zip(&p.scale) {
        if !mean.is_finite() || !scale.is_finite() || scale == 0.0 {
            return Err(ModelLoadError::Invalid(format!("preprocessor has unusable mean/scale for '{name}'")));
        }
        out.insert(name.as_str(), (mean, scale));
    }
    Ok(out)
}
