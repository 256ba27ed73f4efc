// ⚙️ Run configuration - rules as data
// One JSON file names the scales, the translation dictionary, what to
// exclude and what to categorize. Validated once, right after loading.

use crate::batch::{ListSelection, PatternSelection, VariablePlan};
use crate::error::CategorizeError;
use crate::registry::{compile_patterns, MissingDictionaryPolicy, RegistrySettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// CONFIG TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSource {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationSource {
    pub path: PathBuf,
    /// Column holding the display name
    pub name_column: String,
    /// Column holding the variable code
    pub alias_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub scales: Vec<ScaleSource>,
    pub translations: TranslationSource,
    pub identifier_columns: Vec<String>,

    #[serde(default)]
    pub excluded_variables: Vec<String>,

    #[serde(default)]
    pub excluded_patterns: Vec<String>,

    #[serde(default)]
    pub missing_dictionary_policy: MissingDictionaryPolicy,

    #[serde(default)]
    pub variables_by_list: Vec<ListSelection>,

    #[serde(default)]
    pub variables_by_regex: Vec<PatternSelection>,

    #[serde(default = "default_q")]
    pub q: usize,

    pub output_path: PathBuf,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_q() -> usize {
    10
}

fn default_delimiter() -> char {
    ','
}

impl RunConfig {
    /// Load and validate a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let mut config: RunConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;

        if let Some(dir) = path.as_ref().parent() {
            config.resolve_paths(dir);
        }

        Ok(config)
    }

    /// Make relative input and output paths relative to `dir`
    pub fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        for scale in &mut self.scales {
            resolve(&mut scale.path);
        }
        resolve(&mut self.translations.path);
        resolve(&mut self.output_path);
    }

    /// Check every field once so later stages can rely on them
    pub fn validate(&self) -> std::result::Result<(), CategorizeError> {
        let fail = |msg: String| Err(CategorizeError::Configuration(msg));

        if self.scales.is_empty() {
            return fail("At least one scale must be configured".to_string());
        }
        let mut names = BTreeSet::new();
        for scale in &self.scales {
            if !names.insert(scale.name.as_str()) {
                return fail(format!("Scale {} is configured more than once", scale.name));
            }
        }
        if self.identifier_columns.is_empty() {
            return fail("At least one identifier column must be configured".to_string());
        }
        if self.variables_by_list.is_empty() && self.variables_by_regex.is_empty() {
            return fail(
                "At least one of variables_by_list or variables_by_regex must be configured"
                    .to_string(),
            );
        }
        if self.q < 1 {
            return fail(format!("q must be at least 1, got {}", self.q));
        }
        if !self.delimiter.is_ascii() {
            return fail(format!("Delimiter {:?} must be a single ASCII character", self.delimiter));
        }
        if self.output_path.as_os_str().is_empty() {
            return fail("output_path must not be empty".to_string());
        }

        compile_patterns(&self.excluded_patterns)?;
        let selection_patterns: Vec<String> = self
            .variables_by_regex
            .iter()
            .map(|s| s.pattern.clone())
            .collect();
        compile_patterns(&selection_patterns)?;

        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            identifier_columns: self.identifier_columns.clone(),
            excluded_variables: self.excluded_variables.clone(),
            excluded_patterns: self.excluded_patterns.clone(),
            missing_dictionary_policy: self.missing_dictionary_policy,
        }
    }

    pub fn plan(&self) -> VariablePlan {
        VariablePlan {
            by_list: self.variables_by_list.clone(),
            by_regex: self.variables_by_regex.clone(),
        }
    }

    pub fn scale_names(&self) -> Vec<&str> {
        self.scales.iter().map(|s| s.name.as_str()).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
