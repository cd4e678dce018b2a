//! Persisted artifact layout.
//!
//! Every component writes its artifact under a fixed subdirectory of the
//! data root, so a rerun can pick up where a cancelled run left off.

use std::path::{Path, PathBuf};

use crate::config::Peak;

/// The artifact directory tree rooted at `--data`.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline] pub fn root(&self) -> &Path { &self.root }

    pub fn fishnet_cells(&self) -> PathBuf {
        self.root.join("fishnet").join("cells.csv")
    }

    pub fn fishnet_manifest(&self) -> PathBuf {
        self.root.join("fishnet").join("manifest.json")
    }

    pub fn od_cleaned(&self, peak: Peak) -> PathBuf {
        self.root.join("od_cleaned").join(format!("{peak}.csv"))
    }

    pub fn grid_segments(&self, peak: Peak) -> PathBuf {
        self.root.join("grid_segments").join(format!("{peak}.csv"))
    }

    pub fn emissions(&self, peak: Peak) -> PathBuf {
        self.root.join("emissions").join(format!("{peak}.csv"))
    }

    pub fn poi_features(&self) -> PathBuf {
        self.root.join("poi").join("poi_features.csv")
    }

    pub fn road_features(&self) -> PathBuf {
        self.root.join("road").join("road_features.csv")
    }

    pub fn transit_features(&self) -> PathBuf {
        self.root.join("transit").join("transit_features.csv")
    }

    pub fn population_features(&self) -> PathBuf {
        self.root.join("population").join("population_features.csv")
    }

    pub fn centre_features(&self) -> PathBuf {
        self.root.join("centre").join("centre_features.csv")
    }

    pub fn final_table(&self, peak: Peak) -> PathBuf {
        self.root.join("final_tables").join(format!("{peak}.csv"))
    }

    pub fn final_table_standardized(&self, peak: Peak) -> PathBuf {
        self.root.join("final_tables").join(format!("{peak}_standardized.csv"))
    }

    pub fn standardization_sidecar(&self, peak: Peak) -> PathBuf {
        self.root.join("final_tables").join(format!("{peak}_standardized.json"))
    }
}
