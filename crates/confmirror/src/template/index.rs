use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::TemplateSettings;
use crate::error::TemplateError;
use crate::template::document::{BindingPos, TemplateDocument};

/// How template files are recognised and where their output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNaming {
    /// Substring a file name must contain to be treated as a template.
    pub marker: String,
    /// Removed from the template's file name to get the generated file name.
    pub suffix: String,
}

impl Default for TemplateNaming {
    fn default() -> Self {
        Self {
            marker: "example".to_string(),
            suffix: ".example".to_string(),
        }
    }
}

impl From<&TemplateSettings> for TemplateNaming {
    fn from(settings: &TemplateSettings) -> Self {
        Self {
            marker: settings.marker.clone(),
            suffix: settings.suffix.clone(),
        }
    }
}

impl TemplateNaming {
    pub fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.contains(&self.marker))
            .unwrap_or(false)
    }

    /// Derives the generated file path by dropping the suffix from the file
    /// name. Returns `None` when the file name does not carry the suffix.
    pub fn generated_path(&self, template: &Path) -> Option<PathBuf> {
        let name = template.file_name()?.to_str()?;
        let stripped = name.replacen(&self.suffix, "", 1);
        if stripped == name || stripped.is_empty() {
            return None;
        }
        Some(template.with_file_name(stripped))
    }
}

/// One template file and the state of its generated counterpart.
#[derive(Debug, Clone)]
pub struct TemplateRecord {
    path: PathBuf,
    generated_path: PathBuf,
    document: TemplateDocument,
    applied: HashMap<BindingPos, String>,
    current: String,
}

impl TemplateRecord {
    pub fn new(path: PathBuf, generated_path: PathBuf, original: &str) -> Self {
        Self {
            path,
            generated_path,
            document: TemplateDocument::parse(original),
            applied: HashMap::new(),
            current: original.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generated_path(&self) -> &Path {
        &self.generated_path
    }

    pub fn document(&self) -> &TemplateDocument {
        &self.document
    }

    pub fn original_content(&self) -> &str {
        self.document.original()
    }

    /// Latest rendered content; equals the original until the first rewrite.
    pub fn current_content(&self) -> &str {
        &self.current
    }

    /// Renders the content that results from setting the binding at `pos`
    /// to `value`, without committing it.
    pub(crate) fn preview(&self, pos: BindingPos, value: &str) -> String {
        let mut values = self.applied.clone();
        values.insert(pos, value.to_string());
        self.document.render(&values)
    }

    pub(crate) fn commit(&mut self, pos: BindingPos, value: &str, rendered: String) {
        self.applied.insert(pos, value.to_string());
        self.current = rendered;
    }
}

/// Ordered inventory of template records.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    records: Vec<TemplateRecord>,
}

impl TemplateIndex {
    pub fn from_records(records: Vec<TemplateRecord>) -> Self {
        Self { records }
    }

    /// Walks `dir` recursively and loads every template it finds.
    ///
    /// Entries are visited sorted by file name so the resulting order is
    /// stable across runs. Unreadable or non-UTF-8 files and files whose
    /// generated path cannot be derived are logged and skipped.
    pub fn scan(dir: &Path, naming: &TemplateNaming) -> Result<Self, TemplateError> {
        let mut records = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(TemplateError::ScanFailed {
                        path: dir.to_path_buf(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !naming.is_template(path) {
                continue;
            }

            let Some(generated) = naming.generated_path(path) else {
                warn!(
                    "Skipping {}: file name has no '{}' suffix to strip",
                    path.display(),
                    naming.suffix
                );
                continue;
            };

            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let err = TemplateError::ReadFile {
                        path: path.to_path_buf(),
                        source: e,
                    };
                    warn!("{}", err);
                    continue;
                }
            };

            match String::from_utf8(bytes) {
                Ok(content) => {
                    debug!("Found template: {}", path.display());
                    records.push(TemplateRecord::new(path.to_path_buf(), generated, &content));
                }
                Err(e) => warn!(
                    "Skipping {}: not valid UTF-8 ({})",
                    path.display(),
                    e.utf8_error()
                ),
            }
        }

        info!("Scanned {} templates in {}", records.len(), dir.display());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TemplateRecord] {
        &self.records
    }

    pub fn get(&self, path: &Path) -> Option<&TemplateRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    pub(crate) fn record_mut(&mut self, idx: usize) -> Option<&mut TemplateRecord> {
        self.records.get_mut(idx)
    }

    /// Indices of records whose original content contains `token`, in index order.
    pub fn matching(&self, token: &str) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.document.contains_token(token))
            .map(|(idx, _)| idx)
            .collect()
    }
}
