//! core::transaction
//!
//! The transaction envelope carried in commit messages.
//!
//! # Wire format
//!
//! A transaction commit message is the human message, followed by a fixed
//! divider, followed by the transaction serialized as pretty JSON:
//!
//! ```text
//! Applied template demo to .
//!
//! -------------------BEGIN FLEXLATE TRANSACTION-------------------
//! {
//!   "type": "add source",
//!   "target": "demo",
//!   "out_root": ".",
//!   "data": null,
//!   "id": "6c1f0f4e-9a4e-4a39-8f5c-2d1f3f0e9a11"
//! }
//! ```
//!
//! Merge commits authored by flexlate carry no envelope. Their message is
//! exactly `Merge branch '<source>' into <target>\n`.
//!
//! # Example
//!
//! ```
//! use flexlate::core::transaction::{Transaction, TransactionType};
//!
//! let tx = Transaction::new(TransactionType::AddSource).with_target("demo");
//! let message = tx.commit_message("Added template source demo");
//! let parsed = Transaction::parse_commit_message(&message).unwrap();
//! assert_eq!(parsed, tx);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Separates the human part of a commit message from the JSON envelope.
pub const TRANSACTION_DIVIDER: &str =
    "\n\n-------------------BEGIN FLEXLATE TRANSACTION-------------------\n";

/// Template answers keyed by question name.
pub type TemplateData = serde_json::Map<String, serde_json::Value>;

/// Errors from reading a transaction envelope.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The message does not split into exactly one human part and one
    /// envelope part.
    #[error("commit message has no flexlate transaction: found {parts} part(s) around the divider, expected 2")]
    MissingDivider {
        /// Number of parts produced by splitting on the divider
        parts: usize,
    },

    /// The envelope is present but is not a valid transaction.
    #[error("invalid flexlate transaction envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),
}

/// What a transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "add source")]
    AddSource,
    #[serde(rename = "add output")]
    AddOutput,
    #[serde(rename = "add source and output")]
    AddSourceAndOutput,
    #[serde(rename = "remove source")]
    RemoveSource,
    #[serde(rename = "remove output")]
    RemoveOutput,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "sync")]
    Sync,
}

impl TransactionType {
    /// The wire name, as it appears in the envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::AddSource => "add source",
            TransactionType::AddOutput => "add output",
            TransactionType::AddSourceAndOutput => "add source and output",
            TransactionType::RemoveSource => "remove source",
            TransactionType::RemoveOutput => "remove output",
            TransactionType::Update => "update",
            TransactionType::Sync => "sync",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identified unit of template mutation.
///
/// Minted once at the start of a caller-initiated operation and stamped
/// onto every commit the operation produces. Fields are read-only after
/// construction; the `with_*` builders consume the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    kind: TransactionType,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    out_root: Option<PathBuf>,
    #[serde(default)]
    data: Option<Vec<TemplateData>>,
    id: Uuid,
}

impl Transaction {
    /// Mint a new transaction with a fresh v4 id.
    pub fn new(kind: TransactionType) -> Self {
        Self {
            kind,
            target: None,
            out_root: None,
            data: None,
            id: Uuid::new_v4(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_out_root(mut self, out_root: impl Into<PathBuf>) -> Self {
        self.out_root = Some(out_root.into());
        self
    }

    pub fn with_data(mut self, data: Vec<TemplateData>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn out_root(&self) -> Option<&Path> {
        self.out_root.as_deref()
    }

    pub fn data(&self) -> Option<&[TemplateData]> {
        self.data.as_deref()
    }

    /// The suffix appended to a commit message: divider plus JSON envelope.
    pub fn encode(&self) -> String {
        // Serializing plain structs with string keys cannot fail.
        let json = serde_json::to_string_pretty(self).unwrap_or_default();
        format!("{TRANSACTION_DIVIDER}{json}")
    }

    /// Full commit message for `message` stamped with this transaction.
    pub fn commit_message(&self, message: &str) -> String {
        format!("{}{}", message, self.encode())
    }

    /// Parse the transaction out of a commit message.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::MissingDivider`] if the divider is absent or repeated
    /// - [`TransactionError::InvalidEnvelope`] if the JSON is not a transaction
    pub fn parse_commit_message(message: &str) -> Result<Self, TransactionError> {
        let parts: Vec<&str> = message.split(TRANSACTION_DIVIDER).collect();
        match parts.as_slice() {
            [_, envelope] => Ok(serde_json::from_str(envelope)?),
            _ => Err(TransactionError::MissingDivider { parts: parts.len() }),
        }
    }
}

/// The message flexlate writes on the merge commit it creates when merging
/// `source` into `target`.
pub fn merge_commit_message(source: &str, target: &str) -> String {
    format!("Merge branch '{source}' into {target}\n")
}

/// Parse a flexlate merge message back into `(source, target)`.
///
/// Only the exact form produced by [`merge_commit_message`] is accepted,
/// including the single trailing newline.
pub fn parse_merge_commit_message(message: &str) -> Option<(&str, &str)> {
    let rest = message.strip_prefix("Merge branch '")?.strip_suffix('\n')?;
    let (source, target) = rest.split_once("' into ")?;
    if source.is_empty() || target.is_empty() || target.contains('\n') {
        return None;
    }
    Some((source, target))
}
