//! SF/SFC YAML reader and resource-function directory loader.
//!
//! ```yaml
//! sfc_list:
//!   sfc_1: [a, b, c]
//! sf_list:
//!   a:
//!     processing_delay_mean: 5.0
//!     processing_delay_stdev: 0.0
//!     startup_delay: 0.0
//!     resource_function: identity
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::sfc::{ResourceFunction, ServiceFunction, SfId, SfList, SfcId, SfcList};

const IDENTITY: &str = "identity";

#[derive(Debug, Deserialize)]
struct SfFile {
    sfc_list: BTreeMap<SfcId, Vec<SfId>>,
    sf_list: BTreeMap<SfId, SfEntry>,
}

#[derive(Debug, Deserialize)]
struct SfEntry {
    #[serde(default)]
    processing_delay_mean: f64,
    #[serde(default)]
    processing_delay_stdev: f64,
    #[serde(default)]
    startup_delay: f64,
    #[serde(default, alias = "resource_function_id")]
    resource_function: Option<String>,
}

/// Reads SFs and SFCs from `path`, resolving resource functions against `resource_dir`.
pub fn read_sf_file(path: &Path, resource_dir: Option<&Path>) -> Result<(SfList, SfcList)> {
    let raw = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    let file: SfFile = serde_yaml::from_str(&raw).map_err(|source| SimError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let (sfs, sfcs) = build(file, resource_dir)?;
    info!(path = %path.display(), sfs = sfs.len(), sfcs = sfcs.len(), "读取 SF/SFC 定义");
    Ok((sfs, sfcs))
}

/// Same as [`read_sf_file`] for YAML text.
pub fn parse_sf_yaml(raw: &str, resource_dir: Option<&Path>) -> Result<(SfList, SfcList)> {
    let file: SfFile = serde_yaml::from_str(raw).map_err(|source| SimError::Yaml {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    build(file, resource_dir)
}

fn build(file: SfFile, resource_dir: Option<&Path>) -> Result<(SfList, SfcList)> {
    let mut sfs = SfList::new();
    for (id, entry) in file.sf_list {
        if entry.processing_delay_mean < 0.0 || entry.processing_delay_stdev < 0.0 || entry.startup_delay < 0.0 {
            return Err(SimError::InvalidInput(format!("SF `{id}` has a negative delay parameter")));
        }
        let name = entry.resource_function.unwrap_or_else(|| IDENTITY.to_string());
        let function = match (name.as_str(), resource_dir) {
            (IDENTITY, _) => ResourceFunction::Identity,
            (_, Some(dir)) => load_resource_function(dir, &name)?,
            (_, None) => {
                return Err(SimError::ResourceFunctionNotFound {
                    name,
                    dir: PathBuf::from("."),
                });
            }
        };
        let sf = ServiceFunction::new(id.clone(), entry.processing_delay_mean, entry.processing_delay_stdev)
            .with_startup_delay(entry.startup_delay)
            .with_resource_function(name, function);
        sfs.insert(id, sf);
    }
    for (sfc, chain) in &file.sfc_list {
        if let Some(sf) = chain.iter().find(|sf| !sfs.contains_key(*sf)) {
            return Err(SimError::InvalidInput(format!("SFC `{sfc}` references unknown SF `{sf}`")));
        }
    }
    Ok((sfs, file.sfc_list))
}

/// Loads `<dir>/<name>.yaml` (or `.yml`).
pub fn load_resource_function(dir: &Path, name: &str) -> Result<ResourceFunction> {
    if name == IDENTITY {
        return Ok(ResourceFunction::Identity);
    }
    let Some(path) = ["yaml", "yml"]
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
    else {
        return Err(SimError::ResourceFunctionNotFound {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        });
    };
    let raw = std::fs::read_to_string(&path).map_err(|e| SimError::io(&path, e))?;
    let function: ResourceFunction =
        serde_yaml::from_str(&raw).map_err(|source| SimError::Yaml { path: path.clone(), source })?;
    debug!(name, path = %path.display(), "读取资源函数");
    Ok(function)
}
