//! project::render
//!
//! The renderer seam. Template engines live outside flexlate; the engine
//! only asks them to write output into a directory and treats any failure
//! as opaque.

use std::path::Path;

use super::schema::TemplateSource;
use crate::core::transaction::TemplateData;

/// Renders a template into a directory.
pub trait Renderer {
    fn render(&self, source: &TemplateSource, data: &TemplateData, out_dir: &Path)
        -> anyhow::Result<()>;
}

impl<F> Renderer for F
where
    F: Fn(&TemplateSource, &TemplateData, &Path) -> anyhow::Result<()>,
{
    fn render(
        &self,
        source: &TemplateSource,
        data: &TemplateData,
        out_dir: &Path,
    ) -> anyhow::Result<()> {
        self(source, data, out_dir)
    }
}
