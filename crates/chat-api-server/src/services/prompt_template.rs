use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// `{name}` where name is an identifier. Other braces are literal text.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Variable the chat flow fills with the user's message
pub const INPUT_VARIABLE: &str = "input";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Missing template variable: {0}")]
    MissingVariable(String),

    #[error("Template {} has no {{{}}} placeholder", .path.display(), .name)]
    MissingPlaceholder { path: PathBuf, name: String },

    #[error("Failed to read template {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Static prompt text with named placeholders, loaded once at startup
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Load from file and check that every `required` placeholder exists
    pub fn load(path: impl AsRef<Path>, required: &[&str]) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let template = Self::new(source);
        let placeholders = template.placeholders();
        for name in required {
            if !placeholders.contains(*name) {
                return Err(TemplateError::MissingPlaceholder {
                    path: path.to_path_buf(),
                    name: name.to_string(),
                });
            }
        }

        info!(
            "Loaded prompt template {} ({} chars, placeholders: {:?})",
            path.display(),
            template.source.len(),
            placeholders
        );
        Ok(template)
    }

    pub fn placeholders(&self) -> BTreeSet<&str> {
        PLACEHOLDER
            .captures_iter(&self.source)
            .filter_map(|caps| caps.get(1))
            .map(|name| name.as_str())
            .collect()
    }

    /// Substitute every placeholder. Unused variables are ignored.
    pub fn render(&self, variables: &HashMap<&str, &str>) -> Result<String, TemplateError> {
        let mut rendered = String::with_capacity(self.source.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(&self.source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = variables
                .get(name.as_str())
                .ok_or_else(|| TemplateError::MissingVariable(name.as_str().to_string()))?;

            rendered.push_str(&self.source[last..whole.start()]);
            rendered.push_str(value);
            last = whole.end();
        }

        rendered.push_str(&self.source[last..]);
        Ok(rendered)
    }
}
