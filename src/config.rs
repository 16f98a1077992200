//! `tracegrid.toml` config loading.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{Headroom, Metric, MetricGroup, RunLayout, TraceGridError, TraceGridResult};

pub const DEFAULT_CONFIG_PATH: &str = "tracegrid.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// Directory holding `<kind>_log_<version>` files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Versions compared when none are given on the command line.
    #[serde(default)]
    pub versions: Vec<String>,

    #[serde(default)]
    pub layout: RunLayout,

    /// Image written by `compare`; the extension picks PNG or SVG.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub headroom: Headroom,

    /// Metrics replaced by their running sum in unified-layout runs.
    #[serde(default = "default_cumulative")]
    pub cumulative: BTreeSet<Metric>,

    /// Panel rows, top to bottom.
    #[serde(default = "MetricGroup::defaults")]
    pub groups: Vec<MetricGroup>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/pgsr_pfd")
}

fn default_output() -> PathBuf {
    PathBuf::from("current.png")
}

fn default_cumulative() -> BTreeSet<Metric> {
    BTreeSet::from([Metric::Wait])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            versions: Vec::new(),
            layout: RunLayout::default(),
            output: default_output(),
            headroom: Headroom::default(),
            cumulative: default_cumulative(),
            groups: MetricGroup::defaults(),
        }
    }
}

impl Config {
    /// Strict load for a path the user named explicitly.
    pub fn load(path: &Path) -> TraceGridResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            TraceGridError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        let cfg = toml::from_str::<Config>(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => match cfg.validate() {
                    Ok(()) => cfg,
                    Err(err) => {
                        tracing::warn!("ignoring config {}: {err}", path.display());
                        Self::default()
                    }
                },
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Explicit path is strict; otherwise the default file is optional.
    pub fn resolve(explicit: Option<&Path>) -> TraceGridResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_optional(Path::new(DEFAULT_CONFIG_PATH))),
        }
    }

    pub fn validate(&self) -> TraceGridResult<()> {
        if !(self.headroom.x.is_finite() && self.headroom.x > 0.0)
            || !(self.headroom.y.is_finite() && self.headroom.y > 0.0)
        {
            return Err(TraceGridError::Config(format!(
                "headroom must be positive, got x={} y={}",
                self.headroom.x, self.headroom.y
            )));
        }
        let mut names = BTreeSet::new();
        for group in &self.groups {
            if !names.insert(group.name.as_str()) {
                return Err(TraceGridError::Config(format!(
                    "metric group {:?} is defined twice",
                    group.name
                )));
            }
        }
        Ok(())
    }
}
