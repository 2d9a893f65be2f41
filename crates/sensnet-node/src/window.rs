//! Aggregation window
//!
//! Every stored measurement lands in three views at once: an insertion-order
//! list, a multimap keyed by scalar timestamp and a multimap keyed by vector
//! timestamp. Keys may repeat across nodes, so each key holds a list.

use std::collections::BTreeMap;
use std::fmt;

use sensnet_core::{Measurement, ScalarTimestamp, VectorTimestamp, mean_co};

/// Measurements accumulated since the last drain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    measurements: Vec<Measurement>,
    by_scalar: BTreeMap<ScalarTimestamp, Vec<Measurement>>,
    by_vector: BTreeMap<VectorTimestamp, Vec<Measurement>>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one measurement under both of its timestamps
    pub fn record(
        &mut self,
        measurement: Measurement,
        scalar: ScalarTimestamp,
        vector: VectorTimestamp,
    ) {
        self.measurements.push(measurement);
        self.by_scalar.entry(scalar).or_default().push(measurement);
        self.by_vector.entry(vector).or_default().push(measurement);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Move every view out, leaving the window empty
    pub fn take(&mut self) -> Window {
        std::mem::take(self)
    }

    /// Measurements in insertion order
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Arithmetic mean of the present CO readings
    pub fn mean_co(&self) -> Option<f64> {
        mean_co(&self.measurements)
    }

    /// Entries ordered by scalar timestamp, largest first
    ///
    /// Entries sharing a key come latest-stored first.
    pub fn descending_by_scalar(&self) -> Vec<(ScalarTimestamp, Measurement)> {
        descending(&self.by_scalar)
    }

    /// Entries ordered lexicographically by vector timestamp, largest first
    pub fn descending_by_vector(&self) -> Vec<(VectorTimestamp, Measurement)> {
        descending(&self.by_vector)
    }

    /// Summarise the window
    pub fn report(&self) -> WindowReport {
        WindowReport {
            mean_co: self.mean_co(),
            count: self.len(),
            by_scalar: self.descending_by_scalar(),
            by_vector: self.descending_by_vector(),
        }
    }
}

fn descending<K: Clone>(map: &BTreeMap<K, Vec<Measurement>>) -> Vec<(K, Measurement)> {
    map.iter()
        .rev()
        .flat_map(|(key, entries)| entries.iter().rev().map(move |m| (key.clone(), *m)))
        .collect()
}

/// Result of one aggregation round
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    /// Mean CO concentration, `None` if no measurement in the window carried one
    pub mean_co: Option<f64>,
    /// Number of measurements drained
    pub count: usize,
    /// Scalar-ordered view, largest timestamp first
    pub by_scalar: Vec<(ScalarTimestamp, Measurement)>,
    /// Vector-ordered view, largest timestamp first
    pub by_vector: Vec<(VectorTimestamp, Measurement)>,
}

impl WindowReport {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean_co {
            Some(mean) => writeln!(f, "Mean CO: {:.2} ({} measurements)", mean, self.count)?,
            None => writeln!(f, "Mean CO: no data ({} measurements)", self.count)?,
        }
        writeln!(f, "By scalar timestamp:")?;
        for (scalar, m) in &self.by_scalar {
            writeln!(f, "  {} -> {}", scalar, m)?;
        }
        writeln!(f, "By vector timestamp:")?;
        for (vector, m) in &self.by_vector {
            writeln!(f, "  {} -> {}", vector, m)?;
        }
        Ok(())
    }
}
