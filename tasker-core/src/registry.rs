use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::record::ProcessRecord;

/// Indent used when the caller does not configure one.
pub const DEFAULT_INDENT: &str = "\t";

const PROCESS_KEY: &str = "process";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read registry {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to write registry {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to parse registry {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("Failed to serialize registry: {0}")]
    Serialize(serde_json::Error),

    #[error("Registry {0} must contain a JSON object")]
    NotAnObject(PathBuf),

    #[error("Invalid process record in registry: {0}")]
    InvalidRecord(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// The internal key/value document that survives across CLI invocations.
///
/// There is no locking. Callers re-read the file right before every
/// read-modify-write cycle; the last writer wins.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    indent: String,
    data: Map<String, Value>,
}

impl Registry {
    /// Load the document, creating an empty `{}` file first when none exists.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .map_err(|e| RegistryError::Write(parent.to_path_buf(), e))?;
            }
            fs::write(path, "{}").map_err(|e| RegistryError::Write(path.to_path_buf(), e))?;
        }

        let content =
            fs::read_to_string(path).map_err(|e| RegistryError::Read(path.to_path_buf(), e))?;
        let data = Self::parse(path, &content)?;

        Ok(Self {
            path: path.to_path_buf(),
            indent: DEFAULT_INDENT.to_string(),
            data,
        })
    }

    fn parse(path: &Path, content: &str) -> Result<Map<String, Value>> {
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(RegistryError::NotAnObject(path.to_path_buf())),
            Err(e) => Err(RegistryError::Parse(path.to_path_buf(), e)),
        }
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Look up a value by dotted path (`process.ports.local`).
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let mut keys = dotted.split('.');
        let mut current = self.data.get(keys.next()?)?;
        for key in keys {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    /// Merge `value` into the in-memory document at a dotted path.
    ///
    /// Missing intermediate objects are created; non-object intermediates are
    /// replaced by objects.
    pub fn set(&mut self, dotted: &str, value: Value) {
        let keys: Vec<&str> = dotted.split('.').collect();
        let Some((last, parents)) = keys.split_last() else {
            return;
        };

        let mut current = &mut self.data;
        for key in parents {
            let entry = current
                .entry((*key).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            current = map;
        }
        current.insert((*last).to_string(), value);
    }

    /// Persist the whole document, pretty-printed with the configured indent.
    pub fn write(&self) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(self.indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.data
            .serialize(&mut serializer)
            .map_err(RegistryError::Serialize)?;
        buf.push(b'\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| RegistryError::Write(parent.to_path_buf(), e))?;
        }
        fs::write(&self.path, buf).map_err(|e| RegistryError::Write(self.path.clone(), e))
    }

    /// Typed view of the `process` section. Absent or `null` means no record.
    pub fn process(&self) -> Result<Option<ProcessRecord>> {
        match self.data.get(PROCESS_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(RegistryError::InvalidRecord),
        }
    }

    pub fn recorded_pid(&self) -> Option<u32> {
        self.get("process.pid")
            .and_then(Value::as_u64)
            .and_then(|pid| u32::try_from(pid).ok())
    }

    /// Replace the `process` section; `None` clears it to `null`.
    pub fn set_process(&mut self, record: Option<&ProcessRecord>) -> Result<()> {
        let value = match record {
            Some(record) => serde_json::to_value(record).map_err(RegistryError::Serialize)?,
            None => Value::Null,
        };
        self.set(PROCESS_KEY, value);
        Ok(())
    }
}
