use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::template::document::placeholder_token;
use crate::template::index::{TemplateIndex, TemplateRecord};

/// What to do when a token appears in more than one template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Rewrite the first template in index order.
    #[default]
    FirstMatch,
    /// Refuse to rewrite anything and report the ambiguity.
    Reject,
}

/// Result of a successful [`TemplateRewriter::apply_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// No template references the node; nothing was written.
    NoMatch,
    Applied {
        template: PathBuf,
        generated: PathBuf,
        content: String,
    },
}

/// Applies node value changes to generated files.
///
/// All rewrites go through one lock, so at most one `apply_change` touches
/// the index or the filesystem at any time.
pub struct TemplateRewriter {
    index: Mutex<TemplateIndex>,
    ambiguity: AmbiguityPolicy,
}

impl TemplateRewriter {
    pub fn new(index: TemplateIndex) -> Self {
        Self::with_policy(index, AmbiguityPolicy::default())
    }

    pub fn with_policy(index: TemplateIndex, ambiguity: AmbiguityPolicy) -> Self {
        Self {
            index: Mutex::new(index),
            ambiguity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TemplateIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of a record's current state.
    pub fn record(&self, template: &Path) -> Option<TemplateRecord> {
        self.lock().get(template).cloned()
    }

    pub fn template_count(&self) -> usize {
        self.lock().len()
    }

    /// Writes `value` into the generated file of the first template whose
    /// original content references `node_name`.
    ///
    /// A template that fails (missing generated file, token without a
    /// `key=` line) is logged and the next matching template is tried. When
    /// none succeeds the first failure is returned.
    pub fn apply_change(
        &self,
        node_name: &str,
        value: &str,
    ) -> Result<RewriteOutcome, TemplateError> {
        let _span = tracing::info_span!("template.rewrite", node = node_name).entered();
        let token = placeholder_token(node_name);

        let mut index = self.lock();
        let candidates = index.matching(&token);
        if candidates.is_empty() {
            debug!("No template references {}", token);
            return Ok(RewriteOutcome::NoMatch);
        }

        if self.ambiguity == AmbiguityPolicy::Reject && candidates.len() > 1 {
            let templates = candidates
                .iter()
                .filter_map(|&idx| index.records().get(idx))
                .map(|r| r.path().to_path_buf())
                .collect();
            return Err(TemplateError::AmbiguousToken { token, templates });
        }

        let mut first_error = None;
        for idx in candidates {
            let Some(record) = index.record_mut(idx) else {
                continue;
            };
            match rewrite_record(record, &token, value) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!("Rewrite of {} skipped: {}", record.path().display(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(RewriteOutcome::NoMatch),
        }
    }
}

fn rewrite_record(
    record: &mut TemplateRecord,
    token: &str,
    value: &str,
) -> Result<RewriteOutcome, TemplateError> {
    let pos = record
        .document()
        .locate(token)
        .ok_or_else(|| TemplateError::MalformedTemplate {
            template: record.path().to_path_buf(),
            token: token.to_string(),
        })?;

    let generated = record.generated_path().to_path_buf();
    let rendered = record.preview(pos, value);
    overwrite_existing(&generated, &rendered)?;

    info!(
        "Updated {} from {} ({})",
        generated.display(),
        record.path().display(),
        token
    );
    record.commit(pos, value, rendered.clone());

    Ok(RewriteOutcome::Applied {
        template: record.path().to_path_buf(),
        generated,
        content: rendered,
    })
}

/// Replaces the content of an existing file. A missing file is never created.
fn overwrite_existing(path: &Path, content: &str) -> Result<(), TemplateError> {
    let write_error = |source: io::Error| TemplateError::WriteFile {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TemplateError::MissingTargetFile(path.to_path_buf()),
            _ => write_error(e),
        })?;
    file.write_all(content.as_bytes()).map_err(write_error)
}
