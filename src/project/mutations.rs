//! project::mutations
//!
//! Built-in mutations run by the branch synchronizer.
//!
//! Each mutation works on a working tree root handed to it by the engine.
//! That root is a throwaway clone on the template branch, not the user's
//! working tree.
//!
//! The engine rebuilds the template branch from metadata on every
//! transaction, so mutations that change which templates are applied end
//! by re-rendering all of them through [`RenderTemplates`].

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::render::Renderer;
use super::schema::{AppliedTemplate, FlexlateConfig, TemplateSource, CONFIG_FILE_NAME};
use super::store::{ConfigStore, FileConfigStore};
use crate::core::transaction::{Transaction, TransactionType};
use crate::engine::Mutation;

/// Register a template source in the `flexlate.json` under `out_root`.
#[derive(Debug, Clone)]
pub struct AddTemplateSource {
    pub source: TemplateSource,
    pub out_root: PathBuf,
}

impl AddTemplateSource {
    pub fn new(source: TemplateSource, out_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            out_root: out_root.into(),
        }
    }

    /// The transaction this mutation is recorded under.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(TransactionType::AddSource)
            .with_target(self.source.name.clone())
            .with_out_root(self.out_root.clone())
    }

    pub fn commit_message(&self) -> String {
        format!("Add template source {}", self.source.name)
    }
}

impl Mutation for AddTemplateSource {
    fn apply(&self, root: &Path) -> anyhow::Result<()> {
        let path = root.join(&self.out_root).join(CONFIG_FILE_NAME);
        let mut config = FlexlateConfig::load_or_default(&path)?;
        config.add_source(self.source.clone())?;
        config.save(&path)?;
        Ok(())
    }
}

/// Drop a template source from the `flexlate.json` under `out_root`.
#[derive(Debug, Clone)]
pub struct RemoveTemplateSource {
    pub name: String,
    pub out_root: PathBuf,
}

impl RemoveTemplateSource {
    pub fn new(name: impl Into<String>, out_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            out_root: out_root.into(),
        }
    }

    pub fn transaction(&self) -> Transaction {
        Transaction::new(TransactionType::RemoveSource)
            .with_target(self.name.clone())
            .with_out_root(self.out_root.clone())
    }

    pub fn commit_message(&self) -> String {
        format!("Remove template source {}", self.name)
    }
}

impl Mutation for RemoveTemplateSource {
    fn apply(&self, root: &Path) -> anyhow::Result<()> {
        let path = root.join(&self.out_root).join(CONFIG_FILE_NAME);
        let mut config = FlexlateConfig::load_or_default(&path)?;
        config.remove_source(&self.name)?;
        config.save(&path)?;
        Ok(())
    }
}

/// Re-render every applied template found below `out_root`.
///
/// Sources are looked up by name across all configs found. Relative source
/// paths are resolved against `source_root`, since the tree being mutated
/// no longer holds the project's own files.
#[derive(Debug, Clone)]
pub struct RenderTemplates<R> {
    pub out_root: PathBuf,
    pub source_root: PathBuf,
    renderer: R,
}

impl<R: Renderer> RenderTemplates<R> {
    pub fn new(out_root: impl Into<PathBuf>, source_root: impl Into<PathBuf>, renderer: R) -> Self {
        Self {
            out_root: out_root.into(),
            source_root: source_root.into(),
            renderer,
        }
    }
}

impl<R: Renderer> Mutation for RenderTemplates<R> {
    fn apply(&self, root: &Path) -> anyhow::Result<()> {
        let base = root.join(&self.out_root);
        let mut configs = Vec::new();
        for relative in FileConfigStore.metadata_files(&base)? {
            if relative.file_name().is_some_and(|n| n == CONFIG_FILE_NAME) {
                let config = FlexlateConfig::load_or_default(&base.join(&relative))?;
                configs.push((relative, config));
            }
        }

        let sources: Vec<&TemplateSource> = configs
            .iter()
            .flat_map(|(_, c)| c.template_sources.iter())
            .collect();

        for (relative, config) in &configs {
            let config_dir = base.join(relative.parent().unwrap_or(Path::new("")));
            for applied in &config.applied_templates {
                let source = sources
                    .iter()
                    .find(|s| s.name == applied.name)
                    .with_context(|| format!("no template source named '{}'", applied.name))?;
                let mut resolved = (*source).clone();
                if Path::new(&resolved.path).is_relative() {
                    resolved.path = self.source_root.join(&resolved.path).display().to_string();
                }

                let out_dir = config_dir.join(&applied.root);
                std::fs::create_dir_all(&out_dir)
                    .with_context(|| format!("failed to create {}", out_dir.display()))?;
                tracing::debug!(template = %applied.name, out_dir = %out_dir.display(), "rendering");
                self.renderer
                    .render(&resolved, &applied.data, &out_dir)
                    .with_context(|| format!("failed to render template '{}'", applied.name))?;
            }
        }
        Ok(())
    }
}

/// Apply a template to the project: record it in the `flexlate.json` under
/// `out_root`, then render.
#[derive(Debug, Clone)]
pub struct AddAppliedTemplate<R> {
    pub template: AppliedTemplate,
    render: RenderTemplates<R>,
}

impl<R: Renderer> AddAppliedTemplate<R> {
    pub fn new(
        template: AppliedTemplate,
        out_root: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
        renderer: R,
    ) -> Self {
        Self {
            template,
            render: RenderTemplates::new(out_root, source_root, renderer),
        }
    }

    pub fn transaction(&self) -> Transaction {
        Transaction::new(TransactionType::AddOutput)
            .with_target(self.template.name.clone())
            .with_out_root(self.render.out_root.clone())
            .with_data(vec![self.template.data.clone()])
    }

    pub fn commit_message(&self) -> String {
        format!(
            "Apply template {} to {}",
            self.template.name,
            self.render.out_root.join(&self.template.root).display()
        )
    }
}

impl<R: Renderer> Mutation for AddAppliedTemplate<R> {
    fn apply(&self, root: &Path) -> anyhow::Result<()> {
        let path = root.join(&self.render.out_root).join(CONFIG_FILE_NAME);
        let mut config = FlexlateConfig::load_or_default(&path)?;
        config.add_applied(self.template.clone())?;
        config.save(&path)?;
        self.render.apply(root)
    }
}

/// Stop applying a template. Its output disappears with the next render
/// since the remaining templates are rendered into a fresh tree.
#[derive(Debug, Clone)]
pub struct RemoveAppliedTemplate<R> {
    pub name: String,
    /// Output directory relative to the config file
    pub root: PathBuf,
    render: RenderTemplates<R>,
}

impl<R: Renderer> RemoveAppliedTemplate<R> {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        out_root: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
        renderer: R,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            render: RenderTemplates::new(out_root, source_root, renderer),
        }
    }

    pub fn transaction(&self) -> Transaction {
        Transaction::new(TransactionType::RemoveOutput)
            .with_target(self.name.clone())
            .with_out_root(self.render.out_root.clone())
    }

    pub fn commit_message(&self) -> String {
        format!(
            "Remove template {} from {}",
            self.name,
            self.render.out_root.join(&self.root).display()
        )
    }
}

impl<R: Renderer> Mutation for RemoveAppliedTemplate<R> {
    fn apply(&self, root: &Path) -> anyhow::Result<()> {
        let path = root.join(&self.render.out_root).join(CONFIG_FILE_NAME);
        let mut config = FlexlateConfig::load_or_default(&path)?;
        config.remove_applied(&self.name, &self.root)?;
        config.save(&path)?;
        self.render.apply(root)
    }
}

/// A transaction for re-rendering `target` (or everything when None).
pub fn update_transaction(target: Option<&str>, out_root: &Path) -> Transaction {
    let tx = Transaction::new(TransactionType::Update).with_out_root(out_root);
    match target {
        Some(target) => tx.with_target(target),
        None => tx,
    }
}
