//! Sensor measurement records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseMeasurementError;

/// One immutable set of sensor readings
///
/// Temperature, pressure and humidity are always present. The pollutant
/// readings are optional; `co` is the field aggregated per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Measurement {
    temperature: i32,
    pressure: i32,
    humidity: i32,
    co: Option<i32>,
    no2: Option<i32>,
    so2: Option<i32>,
}

impl Measurement {
    /// Create a measurement with only the required readings
    pub fn new(temperature: i32, pressure: i32, humidity: i32) -> Self {
        Self {
            temperature,
            pressure,
            humidity,
            co: None,
            no2: None,
            so2: None,
        }
    }

    /// Set the carbon monoxide reading
    pub fn with_co(mut self, co: Option<i32>) -> Self {
        self.co = co;
        self
    }

    /// Set the nitrogen dioxide reading
    pub fn with_no2(mut self, no2: Option<i32>) -> Self {
        self.no2 = no2;
        self
    }

    /// Set the sulphur dioxide reading
    pub fn with_so2(mut self, so2: Option<i32>) -> Self {
        self.so2 = so2;
        self
    }

    pub fn temperature(&self) -> i32 {
        self.temperature
    }

    pub fn pressure(&self) -> i32 {
        self.pressure
    }

    pub fn humidity(&self) -> i32 {
        self.humidity
    }

    pub fn co(&self) -> Option<i32> {
        self.co
    }

    pub fn no2(&self) -> Option<i32> {
        self.no2
    }

    pub fn so2(&self) -> Option<i32> {
        self.so2
    }

    /// Field-by-field average of two measurements
    ///
    /// Required readings use integer division. Optional readings follow
    /// [`average_optional`].
    pub fn average(a: &Self, b: &Self) -> Self {
        Self {
            temperature: midpoint(a.temperature, b.temperature),
            pressure: midpoint(a.pressure, b.pressure),
            humidity: midpoint(a.humidity, b.humidity),
            co: average_optional(a.co, b.co),
            no2: average_optional(a.no2, b.no2),
            so2: average_optional(a.so2, b.so2),
        }
    }

    /// Parse one CSV row: `temperature,pressure,humidity,co,no2,so2`
    ///
    /// Empty or missing optional columns parse as absent.
    pub fn parse_csv_row(row: &str) -> Result<Self, ParseMeasurementError> {
        let mut tokens = row.trim().split(',').map(str::trim);

        let temperature = required(tokens.next(), "temperature")?;
        let pressure = required(tokens.next(), "pressure")?;
        let humidity = required(tokens.next(), "humidity")?;
        let co = optional(tokens.next(), "co")?;
        let no2 = optional(tokens.next(), "no2")?;
        let so2 = optional(tokens.next(), "so2")?;

        Ok(Self {
            temperature,
            pressure,
            humidity,
            co,
            no2,
            so2,
        })
    }

    /// Serialize as a CSV row accepted by [`Measurement::parse_csv_row`]
    pub fn to_csv_row(&self) -> String {
        let opt = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{},{},{},{},{},{}",
            self.temperature,
            self.pressure,
            self.humidity,
            opt(self.co),
            opt(self.no2),
            opt(self.so2)
        )
    }
}

impl FromStr for Measurement {
    type Err = ParseMeasurementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_csv_row(s)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T={} P={} H={}",
            self.temperature, self.pressure, self.humidity
        )?;
        if let Some(co) = self.co {
            write!(f, " CO={}", co)?;
        }
        if let Some(no2) = self.no2 {
            write!(f, " NO2={}", no2)?;
        }
        if let Some(so2) = self.so2 {
            write!(f, " SO2={}", so2)?;
        }
        Ok(())
    }
}

/// Integer mean truncated toward zero, computed wide so it cannot overflow
fn midpoint(a: i32, b: i32) -> i32 {
    // The mean of two i32 values always fits back into an i32.
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

/// Average two optional readings
///
/// Both present gives their integer mean, one present gives that one,
/// none gives `None`.
pub fn average_optional(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(midpoint(a, b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Mean of the `co` readings, skipping absent ones
///
/// Returns `None` when no measurement carries a reading.
pub fn mean_co<'a>(measurements: impl IntoIterator<Item = &'a Measurement>) -> Option<f64> {
    let (sum, count) = measurements
        .into_iter()
        .filter_map(Measurement::co)
        .fold((0i64, 0u64), |(sum, count), co| (sum + i64::from(co), count + 1));

    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}

fn required(token: Option<&str>, field: &'static str) -> Result<i32, ParseMeasurementError> {
    match token {
        None | Some("") => Err(ParseMeasurementError::MissingField(field)),
        Some(value) => parse_number(value, field),
    }
}

fn optional(token: Option<&str>, field: &'static str) -> Result<Option<i32>, ParseMeasurementError> {
    match token {
        None | Some("") => Ok(None),
        Some(value) => parse_number(value, field).map(Some),
    }
}

fn parse_number(value: &str, field: &'static str) -> Result<i32, ParseMeasurementError> {
    value
        .parse()
        .map_err(|_| ParseMeasurementError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_row() {
        let m = Measurement::parse_csv_row("22,1013,45,7,12,3").unwrap();
        assert_eq!(m.temperature(), 22);
        assert_eq!(m.pressure(), 1013);
        assert_eq!(m.humidity(), 45);
        assert_eq!(m.co(), Some(7));
        assert_eq!(m.no2(), Some(12));
        assert_eq!(m.so2(), Some(3));
    }

    #[test]
    fn test_parse_empty_optionals() {
        let m: Measurement = "22,1013,45,,12,".parse().unwrap();
        assert_eq!(m.co(), None);
        assert_eq!(m.no2(), Some(12));
        assert_eq!(m.so2(), None);

        // Trailing columns may be missing entirely
        let m = Measurement::parse_csv_row("1,2,3").unwrap();
        assert_eq!(m.co(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Measurement::parse_csv_row("1,2"),
            Err(ParseMeasurementError::MissingField("humidity"))
        );
        assert!(matches!(
            Measurement::parse_csv_row("1,2,3,x"),
            Err(ParseMeasurementError::InvalidNumber { field: "co", .. })
        ));
    }

    #[test]
    fn test_csv_row_is_parseable() {
        let m = Measurement::new(-4, 990, 80).with_no2(Some(15));
        assert_eq!(m.to_csv_row(), "-4,990,80,,15,");
        assert_eq!(Measurement::parse_csv_row(&m.to_csv_row()).unwrap(), m);
    }

    #[test]
    fn test_average() {
        let a = Measurement::new(20, 1000, 40).with_co(Some(10)).with_no2(Some(4));
        let b = Measurement::new(25, 1010, 50).with_co(Some(21));
        let avg = Measurement::average(&a, &b);
        assert_eq!(avg.temperature(), 22);
        assert_eq!(avg.pressure(), 1005);
        assert_eq!(avg.humidity(), 45);
        assert_eq!(avg.co(), Some(15));
        assert_eq!(avg.no2(), Some(4));
        assert_eq!(avg.so2(), None);
    }

    #[test]
    fn test_average_of_extreme_readings() {
        let high = Measurement::new(i32::MAX, i32::MAX, i32::MIN).with_co(Some(i32::MAX));
        let avg = Measurement::average(&high, &high);
        assert_eq!(avg.temperature(), i32::MAX);
        assert_eq!(avg.humidity(), i32::MIN);
        assert_eq!(avg.co(), Some(i32::MAX));

        let low = Measurement::new(i32::MIN, -3, 0);
        let avg = Measurement::average(&high, &low);
        assert_eq!(avg.temperature(), 0);
        assert_eq!(avg.pressure(), (i32::MAX - 3) / 2);
        assert_eq!(average_optional(Some(-3), Some(0)), Some(-1));
    }

    #[test]
    fn test_mean_co_skips_absent() {
        let window = [
            Measurement::new(0, 0, 0).with_co(Some(10)),
            Measurement::new(0, 0, 0),
            Measurement::new(0, 0, 0).with_co(Some(20)),
        ];
        assert_eq!(mean_co(&window), Some(15.0));
    }

    #[test]
    fn test_mean_co_no_data() {
        let window = [Measurement::new(0, 0, 0), Measurement::new(1, 1, 1)];
        assert_eq!(mean_co(&window), None);
        assert_eq!(mean_co(&[] as &[Measurement]), None);
    }
}
