use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level `archintel.toml`. Every section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub workspace: WorkspaceConfig,
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub pipeline: PipelineConfig,
    pub synthesis: SynthesisConfig,
    pub oracle: OracleConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    /// Graph versions kept per project by garbage collection
    pub keep_versions: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(".archintel").join("archintel.db"),
            keep_versions: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Snapshots are materialized under `<dir>/<project>/<snapshot>`
    pub dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".archintel").join("workspace") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub allowed_hosts: Vec<String>,
    pub attempt_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Extra gitignore-style patterns excluded from snapshots
    pub exclude: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: vec![
                "github.com".to_string(),
                "gitlab.com".to_string(),
                "bitbucket.org".to_string(),
            ],
            attempt_timeout_secs: 120,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            exclude: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// `base * 2^(attempt-1)`, capped at `backoff_max_ms`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub max_file_bytes: u64,
    pub max_symbols_per_file: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            max_symbols_per_file: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub run_timeout_secs: u64,
    /// Run the documentation synthesizer after each build
    pub synthesize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            run_timeout_secs: 1_800,
            synthesize: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_context_chars: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 12_000,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub relevance_threshold: f64,
    pub max_matches: usize,
    pub max_context_symbols: usize,
    pub max_question_chars: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 1.0,
            max_matches: 8,
            max_context_symbols: 40,
            max_question_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` endpoint
    Openai,
    /// Deterministic local provider, no network
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key; never stored in the file
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub input_budget_chars: usize,
    pub temperature: f32,
    /// Providers tried in order when the previous one is rate limited or times out
    pub fallback: Vec<ProviderConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openai,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "ARCHINTEL_API_KEY".to_string(),
            timeout_secs: 30,
            input_budget_chars: 24_000,
            temperature: 0.3,
            fallback: Vec::new(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("archintel.toml")
}

/// Load the config file. A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &Config, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.fetch.allowed_hosts.len(), 3);
        assert_eq!(config.oracle.max_question_chars, 2_000);
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archintel.toml");
        std::fs::write(&path, "[pipeline]\nworkers = 7\n\n[provider]\nkind = \"offline\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.pipeline.workers, 7);
        assert!(config.pipeline.synthesize);
        assert_eq!(config.provider.kind, ProviderKind::Offline);
        assert_eq!(config.extract.max_symbols_per_file, 5_000);
    }

    #[test]
    fn test_write_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archintel.toml");
        write_config(&path, &Config::default(), false).unwrap();
        assert!(write_config(&path, &Config::default(), false).is_err());
        assert!(write_config(&path, &Config::default(), true).is_ok());

        let reloaded = load_config(Some(&path)).unwrap();
        assert_eq!(reloaded.storage.keep_versions, 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let fetch = FetchConfig { backoff_base_ms: 100, backoff_max_ms: 350, ..FetchConfig::default() };
        assert_eq!(fetch.backoff(1), Duration::from_millis(100));
        assert_eq!(fetch.backoff(2), Duration::from_millis(200));
        assert_eq!(fetch.backoff(3), Duration::from_millis(350));
    }
}
