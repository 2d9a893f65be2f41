//! # Sensnet Console
//!
//! Bootstraps one node of a sensor network from a TOML network file and
//! hands control to an operator console.

pub mod command;
pub mod config;
pub mod console;

pub use command::{Command, UnknownCommand, parse_line};
pub use config::{Cli, ConfigError, NetworkFile, NodeEntry, SelectedNode};
pub use console::{run_console, status_report};

use std::sync::Arc;

use sensnet_core::{CatalogError, CsvCatalog, MeasurementSource};

/// Readings used when the network file names no catalog
const BUILTIN_READINGS: &str = "\
temperature,pressure,humidity,co,no2,so2
-4,990,80,,15,
-3,991,79,410,,4
-3,992,77,420,16,
-2,992,75,,17,5
-1,993,72,440,,
0,994,70,450,18,6
1,995,68,,19,
2,995,66,470,20,7
";

/// The catalog named by the network file, or the built-in readings
pub fn load_catalog(network: &NetworkFile) -> Result<Arc<dyn MeasurementSource>, CatalogError> {
    let catalog = match &network.measurements {
        Some(path) => CsvCatalog::load(path)?,
        None => CsvCatalog::parse(BUILTIN_READINGS)?,
    };
    Ok(Arc::new(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let network = NetworkFile::parse(
            r#"
[[nodes]]
name = "alpha"
index = 0
port = 9000
"#,
        )
        .unwrap();
        let catalog = load_catalog(&network).unwrap();
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog.get(0).unwrap().co(), None);
        assert_eq!(catalog.get(1).unwrap().co(), Some(410));
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.toml");
        std::fs::write(
            &path,
            r#"
measurements = "missing.csv"

[[nodes]]
name = "alpha"
index = 0
port = 9000
"#,
        )
        .unwrap();

        let network = NetworkFile::load(&path).unwrap();
        assert!(matches!(load_catalog(&network), Err(CatalogError::Io(_))));
    }
}
