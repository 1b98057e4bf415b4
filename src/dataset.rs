//! Reference dataset - historical clients used for lookups, population
//! views and as the attribution background.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::{self, FeatureKind, CLIENT_ID_FIELD, FEATURES, FEATURE_COUNT};

/// Cell contents treated as missing
const MISSING_TOKENS: [&str; 9] = ["", "NA", "N/A", "#N/A", "null", "NULL", "nan", "NaN", "None"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("reference dataset not readable: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference dataset is not valid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("reference dataset is incomplete, missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("invalid {column} value {value:?} at row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("reference dataset has no rows")]
    Empty,
}

/// A profile cell, kept in its original flavour
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if is_missing(raw) {
            return Cell::Missing;
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(raw.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Missing => Value::Null,
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Value::from(*v as i64),
            Cell::Number(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
        }
    }
}

fn is_missing(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw)
}

/// In-memory reference dataset
#[derive(Debug)]
pub struct ReferenceDataset {
    ids: Vec<i64>,
    index: HashMap<i64, usize>,
    /// rows x FEATURE_COUNT, canonical order, NaN for missing
    features: Array2<f64>,
    profile_columns: Vec<String>,
    profiles: Vec<Vec<Cell>>,
}

impl ReferenceDataset {
    pub fn from_path(
        path: impl AsRef<Path>,
        profile_columns: &[String],
    ) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        tracing::info!("Loading reference dataset from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, profile_columns)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        profile_columns: &[String],
    ) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let mut missing = Vec::new();
        let id_col = column(CLIENT_ID_FIELD);
        if id_col.is_none() {
            missing.push(CLIENT_ID_FIELD.to_string());
        }
        let feature_cols: Vec<Option<usize>> = FEATURES.iter().map(|f| column(f.name)).collect();
        for (spec, col) in FEATURES.iter().zip(&feature_cols) {
            if col.is_none() {
                missing.push(spec.name.to_string());
            }
        }
        let (Some(id_col), true) = (id_col, missing.is_empty()) else {
            return Err(DatasetError::MissingColumns(missing));
        };
        let feature_cols: Vec<usize> = feature_cols.into_iter().flatten().collect();

        // Profile columns absent from the file are skipped
        let profile: Vec<(String, usize)> = profile_columns
            .iter()
            .filter(|name| name.as_str() != CLIENT_ID_FIELD)
            .filter_map(|name| column(name).map(|idx| (name.clone(), idx)))
            .collect();

        let mut ids = Vec::new();
        let mut index = HashMap::new();
        let mut values: Vec<f64> = Vec::new();
        let mut profiles = Vec::new();

        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            let raw_id = record.get(id_col).unwrap_or("");
            let id = parse_id(raw_id).ok_or_else(|| DatasetError::InvalidValue {
                row,
                column: CLIENT_ID_FIELD.to_string(),
                value: raw_id.to_string(),
            })?;

            for (spec, &col) in FEATURES.iter().zip(&feature_cols) {
                let raw = record.get(col).unwrap_or("");
                values.push(parse_feature(raw, spec.kind).ok_or_else(|| DatasetError::InvalidValue {
                    row,
                    column: spec.name.to_string(),
                    value: raw.to_string(),
                })?);
            }

            if index.contains_key(&id) {
                tracing::warn!(
                    "Duplicate {} {} at row {}, keeping first",
                    CLIENT_ID_FIELD,
                    id,
                    row
                );
            } else {
                index.insert(id, ids.len());
            }
            ids.push(id);
            profiles.push(
                profile
                    .iter()
                    .map(|(_, idx)| Cell::parse(record.get(*idx).unwrap_or("")))
                    .collect(),
            );
        }

        if ids.is_empty() {
            return Err(DatasetError::Empty);
        }

        let features = Array2::from_shape_vec((ids.len(), FEATURE_COUNT), values)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        tracing::info!(
            "Reference dataset loaded: {} rows, {} profile columns",
            ids.len(),
            profile.len()
        );

        Ok(Self {
            ids,
            index,
            features,
            profile_columns: profile.into_iter().map(|(name, _)| name).collect(),
            profiles,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    /// Feature row for a client, canonical order
    pub fn features_of(&self, id: i64) -> Option<ArrayView1<'_, f64>> {
        self.index.get(&id).map(|&row| self.features.row(row))
    }

    /// Client record: features plus profile, both keyed by column name
    pub fn client_record(&self, id: i64) -> Option<ClientRecord> {
        let &row = self.index.get(&id)?;
        let features = schema::feature_map(&self.features.row(row).to_vec());

        let mut profile = Map::new();
        profile.insert(CLIENT_ID_FIELD.to_string(), Value::from(id));
        for (name, cell) in self.profile_columns.iter().zip(&self.profiles[row]) {
            profile.insert(name.clone(), cell.to_json());
        }

        Some(ClientRecord { id, features, profile })
    }

    /// Seeded sample of row indices without replacement, `n` clamped to the row count
    pub fn sample_rows(&self, n: usize, seed: u64) -> Vec<usize> {
        let amount = n.min(self.len());
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, self.len(), amount).into_vec()
    }

    /// Feature matrix of the given rows
    pub fn feature_matrix(&self, rows: &[usize]) -> Array2<f64> {
        self.features.select(Axis(0), rows)
    }

    /// Seeded background sample for the attribution engines
    pub fn background(&self, n: usize, seed: u64) -> Array2<f64> {
        self.feature_matrix(&self.sample_rows(n, seed))
    }

    /// Population rows for comparison views: `SK_ID_CURR` plus features
    pub fn population_rows(&self, n: usize, seed: u64) -> Vec<Map<String, Value>> {
        self.sample_rows(n, seed)
            .into_iter()
            .map(|row| {
                let mut map = Map::new();
                map.insert(CLIENT_ID_FIELD.to_string(), Value::from(self.ids[row]));
                map.extend(schema::feature_map(&self.features.row(row).to_vec()));
                map
            })
            .collect()
    }
}

/// A single client as served by `/client/{id}`
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub id: i64,
    pub features: Map<String, Value>,
    pub profile: Map<String, Value>,
}

fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        let v = raw.parse::<f64>().ok()?;
        (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
    })
}

/// Integer-kind columns only take integral values, so rows round-trip
/// through the scoring payload
fn parse_feature(raw: &str, kind: FeatureKind) -> Option<f64> {
    let raw = raw.trim();
    if is_missing(raw) {
        return Some(f64::NAN);
    }
    let value = raw.parse::<f64>().ok()?;
    match kind {
        FeatureKind::Int if value.fract() != 0.0 => None,
        _ => Some(value),
    }
}
