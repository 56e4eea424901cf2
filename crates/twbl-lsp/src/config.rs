use figment::{providers::Serialized, Figment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{path::PathBuf, time::Duration};
use twbl_analysis::{diagnostics::DiagnosticsSettings, incremental::IncrementalSettings, MemorySettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    /// Configuration section requested from the client.
    #[serde(default = "default_configuration_section")]
    pub configuration_section: String,
    /// Definition file overriding the bundled catalogue.
    pub definition_file: Option<PathBuf>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            configuration_section: default_configuration_section(),
            definition_file: Default::default(),
        }
    }
}

fn default_configuration_section() -> String {
    String::from("tableau")
}

/// Settings under the `tableau` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LspConfig {
    pub enable_formatting: bool,
    pub code_lens: CodeLensConfig,
    pub diagnostics: DiagnosticsConfig,
    pub memory: MemoryConfig,
    pub scheduler: SchedulerConfig,
    pub definition_file: Option<PathBuf>,
}

impl LspConfig {
    pub fn update_from_json(&mut self, json: &Value) -> Result<(), anyhow::Error> {
        // Clients may push the whole settings object or just our section.
        let section = json.get("tableau").unwrap_or(json);

        *self = Figment::new()
            .merge(Serialized::defaults(&self))
            .merge(Serialized::defaults(section))
            .extract()?;
        Ok(())
    }

    #[must_use]
    pub fn diagnostics_settings(&self) -> DiagnosticsSettings {
        DiagnosticsSettings {
            max_nesting_depth: self.diagnostics.max_nesting_depth,
            max_complexity: self.diagnostics.max_complexity,
        }
    }

    #[must_use]
    pub fn memory_settings(&self) -> MemorySettings {
        MemorySettings {
            cleanup_bytes: self.memory.cleanup_mb * 1024 * 1024,
            aggressive_bytes: self.memory.aggressive_mb * 1024 * 1024,
            per_document_cap: self.memory.document_cap_mb * 1024 * 1024,
            tick: Duration::from_secs(self.memory.tick_seconds),
            ..MemorySettings::default()
        }
    }

    #[must_use]
    pub fn incremental_settings(&self) -> IncrementalSettings {
        IncrementalSettings::default()
    }

    #[must_use]
    pub fn scheduler_settings(&self) -> crate::scheduler::SchedulerSettings {
        crate::scheduler::SchedulerSettings {
            high_delay: Duration::from_millis(self.scheduler.high_delay_ms),
            medium_delay: Duration::from_millis(self.scheduler.medium_delay_ms),
            low_delay: Duration::from_millis(self.scheduler.low_delay_ms),
            batch_size: self.scheduler.batch_size.max(1),
            ..crate::scheduler::SchedulerSettings::default()
        }
    }
}

/// Editor-side code lens toggles. The lenses themselves live in the editor
/// extension; the server only round-trips the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeLensConfig {
    pub enabled: bool,
    pub format_expression: bool,
    #[serde(rename = "explainLOD")]
    pub explain_lod: bool,
    pub show_function_help: bool,
    pub copy_with_comment: bool,
}

impl Default for CodeLensConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format_expression: true,
            explain_lod: true,
            show_function_help: true,
            copy_with_comment: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
    pub max_nesting_depth: usize,
    pub max_complexity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        let defaults = DiagnosticsSettings::default();
        Self {
            max_nesting_depth: defaults.max_nesting_depth,
            max_complexity: defaults.max_complexity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    pub cleanup_mb: u64,
    pub aggressive_mb: u64,
    pub document_cap_mb: u64,
    pub tick_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cleanup_mb: 80,
            aggressive_mb: 120,
            document_cap_mb: 50,
            tick_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub high_delay_ms: u64,
    pub medium_delay_ms: u64,
    pub low_delay_ms: u64,
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            high_delay_ms: 100,
            medium_delay_ms: 175,
            low_delay_ms: 400,
            batch_size: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = LspConfig::default();
        assert!(!config.enable_formatting);
        assert_eq!(config.diagnostics.max_nesting_depth, 5);
        assert_eq!(config.memory.cleanup_mb, 80);
        assert_eq!(config.memory.aggressive_mb, 120);
        assert_eq!(config.memory.document_cap_mb, 50);
    }

    #[test]
    fn updates_from_full_settings_object() {
        let mut config = LspConfig::default();
        config
            .update_from_json(&serde_json::json!({
                "tableau": {
                    "enableFormatting": true,
                    "codeLens": { "explainLOD": false },
                    "memory": { "cleanupMb": 64 }
                }
            }))
            .unwrap();

        assert!(config.enable_formatting);
        assert!(!config.code_lens.explain_lod);
        assert_eq!(config.memory.cleanup_mb, 64);
        // Unset keys keep their defaults.
        assert!(config.code_lens.enabled);
    }

    #[test]
    fn updates_from_bare_section() {
        let mut config = LspConfig::default();
        config
            .update_from_json(&serde_json::json!({ "enableFormatting": true }))
            .unwrap();
        assert!(config.enable_formatting);
    }
}
