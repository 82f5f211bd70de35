use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::flow::model::{FLOW_SUFFIX, FlowDocument};

/// Failure reported by a [`FlowStorage`] backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("save rejected: {0}")]
    Rejected(String),
}

/// Where flow documents live.
///
/// `save_flows` receives the complete set of flows. Documents the backend
/// handed out or stored before and that are absent from the set are removed,
/// which is how renames and deletions reach disk. Anything the backend never
/// loaded, such as a file it could not parse, is left alone.
#[async_trait]
pub trait FlowStorage: Send + Sync {
    async fn get_flows(&self) -> Result<Vec<FlowDocument>, StorageError>;

    async fn save_flows(&self, flows: Vec<FlowDocument>) -> Result<(), StorageError>;

    /// Opaque descriptors of the functions nodes may call.
    async fn get_available_functions(&self) -> Result<Vec<Value>, StorageError>;
}

pub const FUNCTIONS_FILE: &str = "functions.json";

/// A directory of `*.flow.json` files, one per flow. Flow names containing
/// `/` map to sub directories.
///
/// Files whose content already equals the document being saved are not
/// rewritten, so whitespace and explicit nulls of untouched flows stay as
/// they are.
#[derive(Debug, Clone)]
pub struct FileFlowStorage {
    dir: PathBuf,
    /// Files this instance loaded or wrote; only these are ever removed.
    known: DashSet<String>,
}

impl FileFlowStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            known: DashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn load_document(path: &Path) -> Result<FlowDocument, StorageError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| StorageError::Io(format!("read error {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents).map_err(|e| {
            StorageError::Serialization(format!("JSON parse error {}: {}", path.display(), e))
        })
    }

    /// Write `doc` to `path` unless the file already holds an equal document.
    /// A rewritten file keeps its trailing newline, or lack of one; new files
    /// end with a newline. Returns whether the file was written.
    pub fn save_document(path: &Path, doc: &FlowDocument) -> Result<bool, StorageError> {
        let existing = fs::read_to_string(path).ok();
        if let Some(current) = existing.as_deref() {
            if let Ok(mut on_disk) = serde_json::from_str::<FlowDocument>(current) {
                on_disk.name.clone_from(&doc.name);
                if on_disk == *doc {
                    return Ok(false);
                }
            }
        }

        let mut contents =
            serde_json::to_string_pretty(doc).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if existing.as_deref().is_none_or(|c| c.ends_with('\n')) {
            contents.push('\n');
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        fs::write(path, contents).map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Every `*.flow.json` below the directory, as paths relative to it.
    fn flow_files(&self) -> Result<Vec<String>, StorageError> {
        let mut found = Vec::new();
        if self.dir.exists() {
            collect_flow_files(&self.dir, &self.dir, &mut found)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        found.sort();
        Ok(found)
    }
}

fn collect_flow_files(root: &Path, dir: &Path, found: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_flow_files(root, &path, found)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.ends_with(FLOW_SUFFIX) {
            found.push(relative);
        }
    }
    Ok(())
}

#[async_trait]
impl FlowStorage for FileFlowStorage {
    async fn get_flows(&self) -> Result<Vec<FlowDocument>, StorageError> {
        let mut docs = Vec::new();
        for file in self.flow_files()? {
            match Self::load_document(&self.path_for(&file)) {
                Ok(mut doc) => {
                    // the path is authoritative for the name
                    self.known.insert(file.clone());
                    doc.name = file;
                    docs.push(doc);
                }
                Err(e) => error!("Failed to load {}: {}", file, e),
            }
        }
        info!("Loaded {} flows from {}", docs.len(), self.dir.display());
        Ok(docs)
    }

    async fn save_flows(&self, flows: Vec<FlowDocument>) -> Result<(), StorageError> {
        if let Some(doc) = flows.iter().find(|d| !d.name.ends_with(FLOW_SUFFIX)) {
            return Err(StorageError::Rejected(format!(
                "`{}` is not a {FLOW_SUFFIX} file name",
                doc.name
            )));
        }

        let mut written = 0;
        for doc in &flows {
            if Self::save_document(&self.path_for(&doc.name), doc)? {
                written += 1;
            } else {
                debug!("{} unchanged", doc.name);
            }
            self.known.insert(doc.name.clone());
        }

        let keep: BTreeSet<&str> = flows.iter().map(|d| d.name.as_str()).collect();
        let stale: Vec<String> = self
            .known
            .iter()
            .filter(|name| !keep.contains(name.as_str()))
            .map(|name| name.key().clone())
            .collect();
        for name in stale {
            let path = self.path_for(&name);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))?;
                info!("Removed {}", name);
            }
            self.known.remove(&name);
        }
        info!("Saved {} of {} flows to {}", written, flows.len(), self.dir.display());
        Ok(())
    }

    async fn get_available_functions(&self) -> Result<Vec<Value>, StorageError> {
        let path = self.dir.join(FUNCTIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Keeps documents in memory. `reject_saves` makes every save fail, for
/// exercising the rollback path.
#[derive(Debug, Default)]
pub struct InMemoryFlowStorage {
    flows: DashMap<String, FlowDocument>,
    functions: Vec<Value>,
    reject: AtomicBool,
}

impl InMemoryFlowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flows(flows: Vec<FlowDocument>) -> Self {
        let storage = Self::default();
        for doc in flows {
            storage.flows.insert(doc.name.clone(), doc);
        }
        storage
    }

    pub fn with_functions(mut self, functions: Vec<Value>) -> Self {
        self.functions = functions;
        self
    }

    pub fn reject_saves(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn document(&self, name: &str) -> Option<FlowDocument> {
        self.flows.get(name).map(|d| d.value().clone())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[async_trait]
impl FlowStorage for InMemoryFlowStorage {
    async fn get_flows(&self) -> Result<Vec<FlowDocument>, StorageError> {
        let mut docs: Vec<FlowDocument> = self.flows.iter().map(|d| d.value().clone()).collect();
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }

    async fn save_flows(&self, flows: Vec<FlowDocument>) -> Result<(), StorageError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("storage is rejecting saves".into()));
        }
        self.flows.clear();
        for doc in flows {
            self.flows.insert(doc.name.clone(), doc);
        }
        Ok(())
    }

    async fn get_available_functions(&self) -> Result<Vec<Value>, StorageError> {
        Ok(self.functions.clone())
    }
}
