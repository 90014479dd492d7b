//! Tool configuration
//!
//! Settings come from an optional TOML file (`--config`, else
//! `$STAMP_TOOLS_CONFIG`); anything not given falls back to the built-in
//! defaults. Data files default to `$STAMP_DATA_DIR`, else `../data`
//! relative to the executable.

use crate::error::StampError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "STAMP_TOOLS_CONFIG";
pub const DATA_DIR_ENV: &str = "STAMP_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub data_dir: Option<PathBuf>,
    pub fastq: FastqConfig,
    pub barcodes: BarcodeConfig,
    pub postprocess: PostprocessConfig,
    pub qc: QcConfig,
    pub water: WaterConfig,
    pub addendum: AddendumConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastqConfig {
    pub progress_interval: u64,
}

impl Default for FastqConfig {
    fn default() -> Self {
        Self {
            progress_interval: 750_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeConfig {
    pub display_limit: usize,
    pub progress_interval: u64,
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            display_limit: 12,
            progress_interval: 500_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    pub min_coverage: u32,
    pub male_min_coverage: u32,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            min_coverage: 200,
            male_min_coverage: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub db: Option<PathBuf>,
    pub truth_file: Option<PathBuf>,
    pub spreadsheet: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    pub db: Option<PathBuf>,
    pub spreadsheet: Option<PathBuf>,
    /// barcode -> label
    pub barcodes: BTreeMap<String, String>,
    pub limit: f64,
}

impl Default for WaterConfig {
    fn default() -> Self {
        let mut barcodes = BTreeMap::new();
        barcodes.insert("NNNNGTCA".to_string(), "water".to_string());
        Self {
            db: None,
            spreadsheet: None,
            barcodes,
            limit: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddendumConfig {
    pub special_variants: Option<PathBuf>,
    pub resident: String,
    pub signout: String,
    pub director: String,
}

impl Default for AddendumConfig {
    fn default() -> Self {
        Self {
            special_variants: None,
            resident: "RESIDENTSNAME".to_string(),
            signout: "ORIGINALSIGNOUTATTENDING".to_string(),
            director: "DIRECTOR".to_string(),
        }
    }
}

impl ToolConfig {
    /// Load configuration from `explicit`, else from `$STAMP_TOOLS_CONFIG`,
    /// else return the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StampError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml(&content).map_err(|e| StampError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        tracing::debug!(config = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("..").join("data")))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn qc_db(&self) -> PathBuf {
        self.qc
            .db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("stampqc").join("stampQC_TruQ3.db"))
    }

    pub fn qc_truth_file(&self) -> PathBuf {
        self.qc
            .truth_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("stampqc").join("truq3_truths.txt"))
    }

    pub fn qc_spreadsheet(&self) -> PathBuf {
        self.qc
            .spreadsheet
            .clone()
            .unwrap_or_else(|| self.data_dir().join("stampqc").join("stampQC_TruQ3.xlsx"))
    }

    pub fn water_db(&self) -> PathBuf {
        self.water
            .db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("stamp_water_barcode_counts.db"))
    }

    pub fn water_spreadsheet(&self) -> PathBuf {
        self.water
            .spreadsheet
            .clone()
            .unwrap_or_else(|| self.data_dir().join("stamp_water_barcode_counts.xlsx"))
    }

    pub fn special_variants_file(&self) -> PathBuf {
        self.addendum.special_variants.clone().unwrap_or_else(|| {
            self.data_dir()
                .join("..")
                .join("docs")
                .join("addendums_special_cases.tsv")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.postprocess.min_coverage, 200);
        assert_eq!(config.postprocess.male_min_coverage, 60);
        assert_eq!(config.barcodes.display_limit, 12);
        assert_eq!(config.fastq.progress_interval, 750_000);
        assert_eq!(config.water.barcodes.get("NNNNGTCA").map(String::as_str), Some("water"));
        assert!((config.water.limit - 0.005).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml() {
        let config = ToolConfig::from_toml(
            r#"
data_dir = "/lab/data"

[postprocess]
min_coverage = 250

[addendum]
resident = "SMITH"
"#,
        )
        .unwrap();

        assert_eq!(config.postprocess.min_coverage, 250);
        assert_eq!(config.postprocess.male_min_coverage, 60);
        assert_eq!(config.addendum.resident, "SMITH");
        assert_eq!(config.addendum.signout, "ORIGINALSIGNOUTATTENDING");
        assert_eq!(
            config.qc_db(),
            PathBuf::from("/lab/data/stampqc/stampQC_TruQ3.db")
        );
        assert_eq!(
            config.water_db(),
            PathBuf::from("/lab/data/stamp_water_barcode_counts.db")
        );
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = ToolConfig::from_toml(
            r#"
[qc]
db = "/tmp/qc.db"
"#,
        )
        .unwrap();
        assert_eq!(config.qc_db(), PathBuf::from("/tmp/qc.db"));
    }

    #[test]
    fn test_missing_config_file() {
        let err = ToolConfig::from_file(Path::new("/nonexistent/stamp.toml")).unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }
}
