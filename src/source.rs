//! Manifest loading
//!
//! Turns paths, directories and glob patterns into [`Document`]s. Files may
//! hold several YAML documents separated by `---`; empty documents and
//! documents without a `kind` are skipped, and `kind: List` objects are
//! expanded into their items.

use crate::document::{Document, DocumentError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions of manifest files
pub const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{}: document {index}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: document {index}: {source}", path.display())]
    Document {
        path: PathBuf,
        index: usize,
        #[source]
        source: DocumentError,
    },

    #[error("invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("no such file, directory or pattern match: {0}")]
    NotFound(String),
}

/// Finds and parses manifest files
#[derive(Debug, Default)]
pub struct Loader {
    exclude: GlobSet,
    skip_dirs: Vec<String>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave out files whose path matches any of `patterns`
    pub fn exclude_paths(mut self, patterns: &[String]) -> Result<Self, SourceError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| SourceError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        self.exclude = builder.build().map_err(|e| SourceError::Pattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;
        Ok(self)
    }

    /// Never descend into directories with these names
    pub fn skip_dirs(mut self, names: &[String]) -> Self {
        self.skip_dirs = names.to_vec();
        self
    }

    /// Expand inputs into a sorted, de-duplicated list of manifest files.
    ///
    /// Each input is a file, a directory (walked recursively) or a glob
    /// pattern. Files named explicitly are kept whatever their extension.
    pub fn collect_files(&self, inputs: &[String]) -> Result<Vec<PathBuf>, SourceError> {
        let mut files = Vec::new();

        for input in inputs {
            let path = Path::new(input);
            if path.is_dir() {
                files.extend(self.walk(path)?);
            } else if path.is_file() {
                files.push(path.to_path_buf());
            } else {
                let before = files.len();
                let entries = glob::glob(input).map_err(|e| SourceError::Pattern {
                    pattern: input.clone(),
                    message: e.to_string(),
                })?;
                files.extend(
                    entries
                        .filter_map(Result::ok)
                        .filter(|p| p.is_file() && is_manifest(p)),
                );
                if files.len() == before {
                    return Err(SourceError::NotFound(input.clone()));
                }
            }
        }

        files.retain(|p| !self.exclude.is_match(p));
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn walk(&self, dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !self.is_skipped_dir(&e.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = entry.map_err(|source| SourceError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() && is_manifest(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn is_skipped_dir(&self, name: &str) -> bool {
        name == ".git" || self.skip_dirs.iter().any(|s| s == name)
    }

    /// Collect and parse every manifest named by `inputs`
    pub fn load(&self, inputs: &[String]) -> Result<Vec<Document>, SourceError> {
        let files = self.collect_files(inputs)?;
        let mut documents = Vec::new();
        for file in &files {
            let content = std::fs::read_to_string(file).map_err(|source| SourceError::Io {
                path: file.clone(),
                source,
            })?;
            let parsed = parse_documents(&content, file)?;
            debug!("Loaded {} document(s) from {}", parsed.len(), file.display());
            documents.extend(parsed);
        }
        info!("Loaded {} document(s) from {} file(s)", documents.len(), files.len());
        Ok(documents)
    }
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
}

/// Parse the documents of one file. JSON files hold a single document;
/// anything else is read as a YAML stream.
pub fn parse_documents(content: &str, path: &Path) -> Result<Vec<Document>, SourceError> {
    let values = if path.extension().is_some_and(|e| e == "json") {
        let value = serde_json::from_str(content).map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        vec![value]
    } else {
        let mut values = Vec::new();
        for (index, de) in serde_yaml::Deserializer::from_str(content).enumerate() {
            let value = Value::deserialize(de).map_err(|source| SourceError::Yaml {
                path: path.to_path_buf(),
                index,
                source,
            })?;
            values.push(value);
        }
        values
    };

    let mut documents = Vec::new();
    for (index, value) in values.into_iter().enumerate() {
        for value in expand_list(value) {
            if value.is_null() {
                continue;
            }
            if value.get("kind").and_then(Value::as_str).map_or(true, str::is_empty) {
                debug!("Skipping document {} of {} without a kind", index, path.display());
                continue;
            }
            let document = Document::from_value(value).map_err(|source| SourceError::Document {
                path: path.to_path_buf(),
                index,
                source,
            })?;
            documents.push(document.with_source(path));
        }
    }
    Ok(documents)
}

fn expand_list(value: Value) -> Vec<Value> {
    let is_list = value.get("kind").and_then(Value::as_str) == Some("List");
    match value {
        Value::Object(mut map) if is_list => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        other => vec![other],
    }
}
