use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeZone};
use log::info;
use serde::Serialize;

use crate::error::{GenerationError, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How a downloaded artifact is named on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub prefix: String,
    pub extension: String,
    /// Fixed name a downstream step picks the latest artifact up from
    pub canonical: String,
}

impl ArtifactNames {
    pub fn new(
        prefix: impl Into<String>,
        extension: impl Into<String>,
        canonical: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
            canonical: canonical.into(),
        }
    }

    pub fn timestamped<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "{}_{}.{}",
            self.prefix,
            now.format(TIMESTAMP_FORMAT),
            self.extension
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    pub timestamped: PathBuf,
    pub canonical: PathBuf,
}

impl PersistedArtifact {
    pub fn sidecar_path(&self) -> PathBuf {
        self.timestamped.with_extension("json")
    }
}

/// Writes `bytes` under a timestamped name and the canonical name in `dir`.
/// The canonical file is overwritten.
pub fn persist<Tz: TimeZone>(
    bytes: &[u8],
    names: &ArtifactNames,
    dir: &Path,
    now: &DateTime<Tz>,
) -> Result<PersistedArtifact>
where
    Tz::Offset: std::fmt::Display,
{
    if bytes.is_empty() {
        return Err(GenerationError::EmptyArtifact {
            url: names.canonical.clone(),
        });
    }

    fs::create_dir_all(dir)?;
    let timestamped = dir.join(names.timestamped(now));
    fs::write(&timestamped, bytes)?;
    info!("Saved {} bytes to {}", bytes.len(), timestamped.display());

    let canonical = dir.join(&names.canonical);
    fs::write(&canonical, bytes)?;
    info!("Updated {}", canonical.display());

    Ok(PersistedArtifact {
        timestamped,
        canonical,
    })
}

pub fn write_sidecar<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(data)?)?;
    info!("Wrote {}", path.display());
    Ok(())
}
