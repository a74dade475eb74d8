//! project::schema
//!
//! The `flexlate.json` project metadata file.
//!
//! # Example
//!
//! ```json
//! {
//!   "template_sources": [
//!     { "name": "python-package", "path": "https://github.com/org/tpl", "version": "v1.2" }
//!   ],
//!   "applied_templates": [
//!     { "name": "python-package", "data": { "name": "demo" }, "version": "v1.2", "root": "." }
//!   ]
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ProjectError;
use crate::core::transaction::TemplateData;

/// File name of project metadata.
pub const CONFIG_FILE_NAME: &str = "flexlate.json";

/// File name of project-wide settings.
pub const PROJECT_CONFIG_FILE_NAME: &str = "flexlate-project.json";

/// Where a template comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    /// Unique name within a config
    pub name: String,
    /// Local path or URL
    pub path: String,
    /// Pinned version, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// A template rendered into the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTemplate {
    /// Name of the template source
    pub name: String,
    /// Answers the template was rendered with
    #[serde(default)]
    pub data: TemplateData,
    /// Version that was rendered
    pub version: String,
    /// Output directory relative to the config file
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

/// Contents of one `flexlate.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexlateConfig {
    pub template_sources: Vec<TemplateSource>,
    pub applied_templates: Vec<AppliedTemplate>,
}

impl FlexlateConfig {
    /// Load `path`, or an empty config if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ProjectError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ProjectError::io(path, e)),
        };
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ProjectError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config to `path`. An empty config removes the file instead,
    /// so adding and then removing a source leaves no trace.
    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        self.validate()?;
        if self.is_empty() {
            return match fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    Err(ProjectError::io(path, e))
                }
                _ => Ok(()),
            };
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ProjectError::io(parent, e))?;
        }
        let mut contents =
            serde_json::to_string_pretty(self).map_err(|source| ProjectError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        contents.push('\n');
        let mut file = fs::File::create(path).map_err(|e| ProjectError::io(path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| ProjectError::io(path, e))
    }

    pub fn is_empty(&self) -> bool {
        self.template_sources.is_empty() && self.applied_templates.is_empty()
    }

    /// Source names must be unique.
    pub fn validate(&self) -> Result<(), ProjectError> {
        for (i, source) in self.template_sources.iter().enumerate() {
            if self.template_sources[..i]
                .iter()
                .any(|s| s.name == source.name)
            {
                return Err(ProjectError::DuplicateSource {
                    name: source.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&TemplateSource> {
        self.template_sources.iter().find(|s| s.name == name)
    }

    pub fn add_source(&mut self, source: TemplateSource) -> Result<(), ProjectError> {
        if self.source(&source.name).is_some() {
            return Err(ProjectError::DuplicateSource { name: source.name });
        }
        self.template_sources.push(source);
        Ok(())
    }

    pub fn remove_source(&mut self, name: &str) -> Result<TemplateSource, ProjectError> {
        let index = self
            .template_sources
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ProjectError::SourceNotFound {
                name: name.to_string(),
            })?;
        Ok(self.template_sources.remove(index))
    }

    /// Record `applied`. One output per template name and root.
    pub fn add_applied(&mut self, applied: AppliedTemplate) -> Result<(), ProjectError> {
        if self
            .applied_templates
            .iter()
            .any(|a| a.name == applied.name && a.root == applied.root)
        {
            return Err(ProjectError::DuplicateOutput {
                name: applied.name,
                root: applied.root,
            });
        }
        self.applied_templates.push(applied);
        Ok(())
    }

    pub fn remove_applied(
        &mut self,
        name: &str,
        root: &Path,
    ) -> Result<AppliedTemplate, ProjectError> {
        let index = self
            .applied_templates
            .iter()
            .position(|a| a.name == name && a.root == root)
            .ok_or_else(|| ProjectError::OutputNotFound {
                name: name.to_string(),
                root: root.to_path_buf(),
            })?;
        Ok(self.applied_templates.remove(index))
    }
}
