use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "EPIC_ROLLUP_CONFIG";
const PAT_ENV: &str = "ADO_PAT";

/// Most ids the service accepts in one batch read.
pub const MAX_BATCH_IDS: usize = 200;

#[derive(Clone, Deserialize)]
pub struct AdoConfig {
    /// Organization URL, e.g. `https://dev.azure.com/contoso`.
    pub organization: String,
    pub project: String,
    #[serde(default)]
    pub pat_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_versions: ApiVersions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiVersions {
    #[serde(default = "default_wiql_version")]
    pub wiql: String,
    #[serde(default = "default_work_items_version")]
    pub work_items: String,
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self {
            wiql: default_wiql_version(),
            work_items: default_work_items_version(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_wiql_version() -> String {
    "7.1-preview.2".into()
}

fn default_work_items_version() -> String {
    "7.1-preview.3".into()
}

impl fmt::Debug for AdoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdoConfig")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("pat_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("api_versions", &self.api_versions)
            .finish()
    }
}

impl AdoConfig {
    pub fn wiql_url(&self) -> String {
        format!(
            "{}/{}/_apis/wit/wiql?api-version={}",
            self.organization,
            urlencoding::encode(&self.project),
            self.api_versions.wiql
        )
    }

    pub fn work_items_url(&self, ids: &[u64]) -> String {
        let ids = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}/_apis/wit/workitems?ids={ids}&api-version={}",
            self.organization, self.api_versions.work_items
        )
    }

    /// One batch URL per chunk of at most `MAX_BATCH_IDS` ids, in input order.
    pub fn work_items_urls(&self, ids: &[u64]) -> Vec<String> {
        ids.chunks(MAX_BATCH_IDS)
            .map(|chunk| self.work_items_url(chunk))
            .collect()
    }

    pub fn work_item_url(&self, id: u64) -> String {
        format!(
            "{}/_apis/wit/workitems/{id}?$expand=relations&api-version={}",
            self.organization, self.api_versions.work_items
        )
    }

    fn validate(mut self) -> Result<Self> {
        self.organization = self.organization.trim().trim_end_matches('/').to_string();
        self.project = self.project.trim().to_string();
        if self.organization.is_empty() {
            bail!("`organization` must not be empty");
        }
        if self.project.is_empty() {
            bail!("`project` must not be empty");
        }
        if self.pat_token.is_empty() {
            bail!("No personal access token: set `pat_token` or {PAT_ENV}");
        }
        Ok(self)
    }
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".epic-rollup")
        .join("config.toml")
}

pub fn load_config() -> Result<AdoConfig> {
    load_config_from(&config_path(), std::env::var(PAT_ENV).ok())
}

pub fn load_config_from(path: &Path, pat_override: Option<String>) -> Result<AdoConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents, pat_override)
        .with_context(|| format!("Invalid config in {}", path.display()))
}

fn parse_config(contents: &str, pat_override: Option<String>) -> Result<AdoConfig> {
    let mut config: AdoConfig =
        toml::from_str(contents).with_context(|| "Failed to parse config.toml")?;
    if let Some(pat) = pat_override.filter(|p| !p.is_empty()) {
        config.pat_token = pat;
    }
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
organization = "https://dev.azure.com/contoso/"
project = "Fabrikam Fiber"
pat_token = "secret"
"#;

    #[test]
    fn defaults_are_filled_in() {
        let config = parse_config(MINIMAL, None).unwrap();
        assert_eq!(config.organization, "https://dev.azure.com/contoso");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.api_versions.wiql, "7.1-preview.2");
        assert_eq!(config.api_versions.work_items, "7.1-preview.3");
    }

    #[test]
    fn env_token_overrides_file() {
        let config = parse_config(MINIMAL, Some("from-env".into())).unwrap();
        assert_eq!(config.pat_token, "from-env");
    }

    #[test]
    fn missing_token_is_rejected() {
        let toml = "organization = \"https://dev.azure.com/x\"\nproject = \"p\"\n";
        let err = parse_config(toml, None).unwrap_err();
        assert!(err.to_string().contains("personal access token"));
        assert!(parse_config(toml, Some("t".into())).is_ok());
    }

    #[test]
    fn empty_project_is_rejected() {
        let toml = "organization = \"https://dev.azure.com/x\"\nproject = \" \"\npat_token = \"t\"\n";
        assert!(parse_config(toml, None).is_err());
    }

    #[test]
    fn api_versions_can_be_overridden() {
        let toml = format!("{MINIMAL}\n[api_versions]\nwiql = \"7.0\"\n");
        let config = parse_config(&toml, None).unwrap();
        assert_eq!(config.api_versions.wiql, "7.0");
        assert_eq!(config.api_versions.work_items, "7.1-preview.3");
    }

    #[test]
    fn urls_are_built_from_config() {
        let config = parse_config(MINIMAL, None).unwrap();
        assert_eq!(
            config.wiql_url(),
            "https://dev.azure.com/contoso/Fabrikam%20Fiber/_apis/wit/wiql?api-version=7.1-preview.2"
        );
        assert_eq!(
            config.work_items_url(&[1, 2, 3]),
            "https://dev.azure.com/contoso/_apis/wit/workitems?ids=1,2,3&api-version=7.1-preview.3"
        );
        assert_eq!(
            config.work_item_url(42),
            "https://dev.azure.com/contoso/_apis/wit/workitems/42?$expand=relations&api-version=7.1-preview.3"
        );
    }

    #[test]
    fn long_id_lists_are_split_into_batches() {
        let config = parse_config(MINIMAL, None).unwrap();
        let ids: Vec<u64> = (1..=450).collect();
        let urls = config.work_items_urls(&ids);
        assert_eq!(urls.len(), 3);
        assert!(urls[0].contains("ids=1,2,"));
        assert!(urls[0].contains(",200&"));
        assert!(urls[1].contains("ids=201,"));
        assert!(urls[1].contains(",400&"));
        assert!(urls[2].contains("ids=401,"));
        assert!(urls[2].contains(",450&"));

        let batch_sizes: Vec<usize> = urls
            .iter()
            .map(|u| u.split("ids=").nth(1).unwrap().split('&').next().unwrap())
            .map(|ids| ids.split(',').count())
            .collect();
        assert_eq!(batch_sizes, vec![200, 200, 50]);
    }

    #[test]
    fn short_id_lists_stay_in_one_batch() {
        let config = parse_config(MINIMAL, None).unwrap();
        let ids: Vec<u64> = (1..=200).collect();
        assert_eq!(config.work_items_urls(&ids).len(), 1);
        assert!(config.work_items_urls(&[]).is_empty());
    }

    #[test]
    fn debug_output_hides_token() {
        let config = parse_config(MINIMAL, None).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = load_config_from(file.path(), None).unwrap();
        assert_eq!(config.project, "Fabrikam Fiber");
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config_from(&path, None).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
