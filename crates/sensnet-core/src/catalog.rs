//! Measurement sources
//!
//! A node produces readings by position from a finite, ordered catalog.
//! The catalog is built once and handed to the node explicitly; there is no
//! process-wide loader.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::CatalogError;
use crate::measurement::Measurement;

/// An ordered, finite catalog of measurements accessed by position
pub trait MeasurementSource: Send + Sync {
    /// Number of measurements in the catalog
    fn len(&self) -> usize;

    /// Measurement at `index`, or `None` past the end
    fn get(&self, index: usize) -> Option<Measurement>;

    /// True if the catalog holds no measurements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Measurement at `index` modulo the catalog size
    fn get_wrapping(&self, index: usize) -> Option<Measurement> {
        let len = self.len();
        if len == 0 {
            None
        } else {
            self.get(index % len)
        }
    }
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    measurements: Vec<Measurement>,
}

impl InMemoryCatalog {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self { measurements }
    }

    /// Create a catalog, rejecting an empty list
    pub fn non_empty(measurements: Vec<Measurement>) -> Result<Self, CatalogError> {
        if measurements.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self::new(measurements))
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }
}

impl MeasurementSource for InMemoryCatalog {
    fn len(&self) -> usize {
        self.measurements.len()
    }

    fn get(&self, index: usize) -> Option<Measurement> {
        self.measurements.get(index).copied()
    }
}

/// Catalog loaded from a CSV file
///
/// The first line is a header and is skipped. Blank lines are ignored.
/// Each remaining line is `temperature,pressure,humidity,co,no2,so2` with
/// empty optional columns.
#[derive(Debug, Clone)]
pub struct CsvCatalog {
    inner: InMemoryCatalog,
}

impl CsvCatalog {
    /// Load and parse the whole file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let catalog = Self::parse(&contents)?;
        debug!(path = %path.display(), count = catalog.len(), "Loaded measurement catalog");
        Ok(catalog)
    }

    /// Parse CSV text (header line included)
    pub fn parse(contents: &str) -> Result<Self, CatalogError> {
        let measurements = contents
            .lines()
            .enumerate()
            .skip(1)
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                Measurement::parse_csv_row(line).map_err(|e| CatalogError::Malformed {
                    line: i + 1,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            inner: InMemoryCatalog::non_empty(measurements)?,
        })
    }

    pub fn measurements(&self) -> &[Measurement] {
        self.inner.measurements()
    }
}

impl MeasurementSource for CsvCatalog {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Option<Measurement> {
        self.inner.get(index)
    }
}
