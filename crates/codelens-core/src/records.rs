//! Raw records supplied by the graph store on every bulk load.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fully_qualified_name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub method_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    #[serde(default)]
    pub class_names: Vec<String>,
}

impl ClassRecord {
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

impl MethodRecord {
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

impl PackageRecord {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// On-disk export of a full entity set, as produced by a graph store dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySnapshotFile {
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
}

impl EntitySnapshotFile {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
