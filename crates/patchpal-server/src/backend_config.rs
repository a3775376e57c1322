//! Completion backend configuration file.
//!
//! ```yaml
//! token: sk-...
//! base_url: https://api.openai.com/v1
//! org_id: org-123
//! api_type: OPEN_AI        # or AZURE
//! api_version: 2023-05-15  # AZURE only
//! engine: review-gpt35     # AZURE deployment name
//! models:
//!   - name: gpt-4-1106
//!     context_tokens: 128000
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use patchpal_ai::{OpenAiAuthScheme, OpenAiConfig};
use patchpal_core::{ModelBudget, ModelBudgetTable, TokenOverhead};
use serde::Deserialize;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const BACKEND_REQUEST_TIMEOUT_MS: u64 = 120_000;
const BACKEND_MAX_RETRIES: usize = 2;
const BACKEND_RETRY_BUDGET_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendApiType {
    #[default]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelOverride {
    pub name: String,
    pub context_tokens: usize,
    #[serde(default)]
    pub tokens_per_message: Option<i64>,
    #[serde(default)]
    pub tokens_per_name: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// Public struct `BackendConfig` used across patchpal components.
pub struct BackendConfig {
    pub token: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub api_type: BackendApiType,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelOverride>,
}

impl BackendConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read backend config {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse backend config {}", path.display()))
    }

    pub fn openai_config(&self) -> Result<OpenAiConfig> {
        let base_url = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/');
        let (api_base, auth_scheme, api_version) = match self.api_type {
            BackendApiType::OpenAi => (base_url.to_string(), OpenAiAuthScheme::Bearer, None),
            BackendApiType::Azure => {
                let Some(engine) = self.engine.as_deref().filter(|value| !value.trim().is_empty())
                else {
                    bail!("backend config with api_type AZURE requires `engine`");
                };
                let Some(api_version) = self.api_version.clone() else {
                    bail!("backend config with api_type AZURE requires `api_version`");
                };
                (
                    format!("{base_url}/openai/deployments/{}", engine.trim()),
                    OpenAiAuthScheme::ApiKeyHeader,
                    Some(api_version),
                )
            }
        };
        Ok(OpenAiConfig {
            api_base,
            api_key: self.token.trim().to_string(),
            organization: self
                .org_id
                .clone()
                .filter(|value| !value.trim().is_empty()),
            request_timeout_ms: BACKEND_REQUEST_TIMEOUT_MS,
            max_retries: BACKEND_MAX_RETRIES,
            retry_budget_ms: BACKEND_RETRY_BUDGET_MS,
            retry_jitter: true,
            auth_scheme,
            api_version,
        })
    }

    /// Default model budgets with this file's overrides applied.
    pub fn model_budgets(&self) -> ModelBudgetTable {
        self.models
            .iter()
            .fold(ModelBudgetTable::default(), |table, model| {
                let defaults = TokenOverhead::default();
                table.with_model(
                    model.name.clone(),
                    ModelBudget {
                        context_tokens: model.context_tokens,
                        overhead: TokenOverhead {
                            tokens_per_message: model
                                .tokens_per_message
                                .unwrap_or(defaults.tokens_per_message),
                            tokens_per_name: model
                                .tokens_per_name
                                .unwrap_or(defaults.tokens_per_name),
                        },
                    },
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use patchpal_ai::OpenAiAuthScheme;
    use tempfile::tempdir;

    use super::{BackendApiType, BackendConfig};

    #[test]
    fn functional_openai_config_defaults_to_public_endpoint() {
        let config: BackendConfig =
            serde_yaml::from_str("token: \" sk-test \"\norg_id: org-1\n").expect("parse");
        assert_eq!(config.api_type, BackendApiType::OpenAi);
        let openai = config.openai_config().expect("openai config");
        assert_eq!(openai.api_base, "https://api.openai.com/v1");
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.organization.as_deref(), Some("org-1"));
        assert_eq!(openai.auth_scheme, OpenAiAuthScheme::Bearer);
        assert_eq!(openai.api_version, None);
    }

    #[test]
    fn functional_azure_config_targets_deployment() {
        let config: BackendConfig = serde_yaml::from_str(
            "token: az-key\n\
             base_url: https://acme.openai.azure.com/\n\
             api_type: AZURE\n\
             api_version: 2023-05-15\n\
             engine: review\n",
        )
        .expect("parse");
        let openai = config.openai_config().expect("azure config");
        assert_eq!(
            openai.api_base,
            "https://acme.openai.azure.com/openai/deployments/review"
        );
        assert_eq!(openai.auth_scheme, OpenAiAuthScheme::ApiKeyHeader);
        assert_eq!(openai.api_version.as_deref(), Some("2023-05-15"));
    }

    #[test]
    fn regression_azure_config_requires_engine() {
        let config: BackendConfig =
            serde_yaml::from_str("token: az-key\napi_type: AZURE\napi_version: v1\n")
                .expect("parse");
        let error = config.openai_config().expect_err("missing engine");
        assert!(error.to_string().contains("requires `engine`"));
    }

    #[test]
    fn unit_model_overrides_extend_budget_table() {
        let config: BackendConfig = serde_yaml::from_str(
            "token: t\nmodels:\n  - name: local-llm\n    context_tokens: 2048\n    \
             tokens_per_message: 5\n",
        )
        .expect("parse");
        let budgets = config.model_budgets();
        let budget = budgets.budget_for("local-llm-7b");
        assert_eq!(budget.context_tokens, 2_048);
        assert_eq!(budget.overhead.tokens_per_message, 5);
        assert_eq!(budget.overhead.tokens_per_name, 1);
        assert_eq!(budgets.budget_for("gpt-4").context_tokens, 8_192);
    }

    #[test]
    fn integration_load_reads_yaml_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("openai.yaml");
        std::fs::write(&path, "token: from-file\n").expect("write");
        let config = BackendConfig::load(&path).expect("load");
        assert_eq!(config.token, "from-file");
        assert!(BackendConfig::load(&temp.path().join("missing.yaml")).is_err());
    }
}
