use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use geocoder_engine::ClientSettings;
use serde::Deserialize;
use url::Url;

use crate::cli::Cli;

/// Optional settings file; every field falls back to the built-in default.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub stream_path: Option<String>,
    pub one_shot_path: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_artifact_mb: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub one_shot: Option<bool>,
    pub province: Option<String>,
    pub municipality: Option<String>,
}

pub fn load(path: &Path) -> anyhow::Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    ron::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

/// Everything one invocation needs, after merging defaults, the config file
/// and the command line (in that order of precedence, lowest first).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings: ClientSettings,
    pub one_shot: bool,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub output_dir: PathBuf,
}

pub fn resolve(cli: &Cli, file: FileConfig) -> anyhow::Result<RunOptions> {
    let mut settings = ClientSettings::default();
    if let Some(server) = cli.server.as_deref().or(file.server.as_deref()) {
        settings.base_url = parse_base_url(server)?.into();
    }
    if let Some(path) = file.stream_path {
        settings.stream_path = path;
    }
    if let Some(path) = file.one_shot_path {
        settings.one_shot_path = path;
    }
    if let Some(secs) = file.connect_timeout_secs {
        settings.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.request_timeout_secs {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(mb) = file.max_artifact_mb {
        settings.max_artifact_bytes = mb.saturating_mul(1024 * 1024);
    }

    let output_dir = match cli.output.clone().or(file.output_dir) {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving the current directory")?,
    };

    Ok(RunOptions {
        settings,
        one_shot: cli.one_shot || file.one_shot.unwrap_or(false),
        province: cli.province.clone().or(file.province),
        municipality: cli.municipality.clone().or(file.municipality),
        output_dir,
    })
}

/// Endpoint paths are joined onto the base, so it must end with a slash.
fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw).with_context(|| format!("invalid server URL `{raw}`"))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "server URL must be http or https, got `{}`",
        url.scheme()
    );
    Ok(url)
}
