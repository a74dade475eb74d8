//! project
//!
//! Project metadata and the collaborators the engine calls out to.
//!
//! - [`ConfigStore`]: lists and copies metadata files so they survive the
//!   template branch being wiped
//! - [`Renderer`]: writes template output into a directory
//! - [`mutations`]: the built-in mutations (add or remove a template
//!   source, apply or remove a template output, re-render applied
//!   templates)
//!
//! Collaborators are plain values constructed by the caller and passed into
//! each engine operation.

pub mod mutations;
pub mod render;
pub mod schema;
pub mod store;

pub use mutations::{
    update_transaction, AddAppliedTemplate, AddTemplateSource, RemoveAppliedTemplate,
    RemoveTemplateSource, RenderTemplates,
};
pub use render::Renderer;
pub use schema::{AppliedTemplate, FlexlateConfig, TemplateSource, CONFIG_FILE_NAME};
pub use store::{ConfigStore, FileConfigStore};

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from reading or editing project metadata.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid metadata in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("template source '{name}' already exists")]
    DuplicateSource { name: String },

    #[error("no template source named '{name}'")]
    SourceNotFound { name: String },

    #[error("template '{name}' is already applied at {}", root.display())]
    DuplicateOutput { name: String, root: PathBuf },

    #[error("template '{name}' is not applied at {}", root.display())]
    OutputNotFound { name: String, root: PathBuf },
}

impl ProjectError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ProjectError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
