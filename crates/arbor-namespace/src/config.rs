use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where containers live and how domains name them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub data_root: PathBuf,
    /// Every domain ends in this suffix; compared case-insensitively.
    pub domain_suffix: String,
    pub container_ext: String,
    pub toc_name: String,
    /// Directory under the data root that holds per-user namespaces.
    pub home_label: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            domain_suffix: "hdfgroup.org".into(),
            container_ext: ".h5".into(),
            toc_name: ".toc.h5".into(),
            home_label: "home".into(),
        }
    }
}

impl NamespaceConfig {
    /// Defaults with a different data root.
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        self.data_root.join(&self.home_label)
    }
}
