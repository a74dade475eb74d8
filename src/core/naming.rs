//! core::naming
//!
//! Branch roles and how their names are chosen.
//!
//! Flexlate tracks three branches per operation:
//!
//! - the **output** branch, whatever the user had checked out
//! - the **merged** branch, user content plus template updates
//! - the **template** branch, rendered template output only
//!
//! On the default branch the canonical names are used directly. On any
//! other branch the merged and template branches are feature-scoped as
//! `<canonical>-<feature>` so work on a feature branch can be folded back
//! later without touching the canonical pair.

use crate::core::types::BranchName;

/// Canonical merged branch name.
pub const DEFAULT_MERGED_BRANCH: &str = "flexlate-output";

/// Canonical template branch name.
pub const DEFAULT_TEMPLATE_BRANCH: &str = "flexlate-templates";

/// The branch names one operation works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNames {
    /// Branch the caller had checked out.
    pub active: BranchName,
    /// Merged branch for this operation (possibly feature-scoped).
    pub merged: BranchName,
    /// Template branch for this operation (possibly feature-scoped).
    pub template: BranchName,
    /// Canonical merged branch.
    pub base_merged: BranchName,
    /// Canonical template branch.
    pub base_template: BranchName,
}

impl BranchNames {
    /// Choose names for an operation started on `active`.
    ///
    /// Feature scoping applies only when a default branch is known and
    /// `active` is not it.
    ///
    /// # Example
    ///
    /// ```
    /// use flexlate::core::naming::BranchNames;
    /// use flexlate::core::types::BranchName;
    ///
    /// let b = |s: &str| BranchName::new(s).unwrap();
    /// let names = BranchNames::resolve(
    ///     b("flexlate-templates"),
    ///     b("flexlate-output"),
    ///     b("feature"),
    ///     Some(&b("main")),
    /// );
    /// assert_eq!(names.template.as_str(), "flexlate-templates-feature");
    /// assert!(names.is_feature_scoped());
    /// ```
    pub fn resolve(
        base_template: BranchName,
        base_merged: BranchName,
        active: BranchName,
        default_branch: Option<&BranchName>,
    ) -> Self {
        let scoped = matches!(default_branch, Some(default) if *default != active);
        let (template, merged) = if scoped {
            (
                base_template.feature_scoped(&active),
                base_merged.feature_scoped(&active),
            )
        } else {
            (base_template.clone(), base_merged.clone())
        };
        Self {
            active,
            merged,
            template,
            base_merged,
            base_template,
        }
    }

    /// True when the merged/template pair differs from the canonical pair.
    pub fn is_feature_scoped(&self) -> bool {
        self.template != self.base_template
    }

    /// True if `branch` is one of the two canonical flexlate branches.
    pub fn is_canonical(&self, branch: &BranchName) -> bool {
        *branch == self.base_merged || *branch == self.base_template
    }
}
