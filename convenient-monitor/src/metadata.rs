//! Persisted per-source and per-output records
//!
//! Both records are encoded with big-endian integers and the same
//! length-prefixed strings the deletion ledger uses.

use crate::attributes::AttributeStore;
use crate::error::{MonitorError, MonitorResult};
use crate::types::{FileId, WorkspaceId};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use convenient_ledger::codec::{read_string, write_string};
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Timestamp recorded while a source waits for recompilation
pub const PENDING_TIMESTAMP: i64 = -1;

/// What one workspace knows about a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Timestamp of the last successful compile, or [`PENDING_TIMESTAMP`]
    pub timestamp: i64,
    /// Outputs produced by that compile
    pub outputs: BTreeMap<FileId, PathBuf>,
}

impl Default for SourceRecord {
    fn default() -> Self {
        Self {
            timestamp: PENDING_TIMESTAMP,
            outputs: BTreeMap::new(),
        }
    }
}

/// Per-source record, one entry per workspace that compiled the source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    records: BTreeMap<WorkspaceId, SourceRecord>,
}

impl SourceMetadata {
    /// Recorded timestamp for `ws`
    pub fn timestamp(&self, ws: WorkspaceId) -> Option<i64> {
        self.records.get(&ws).map(|r| r.timestamp)
    }

    /// Set the timestamp for `ws`
    pub fn set_timestamp(&mut self, ws: WorkspaceId, timestamp: i64) {
        self.records.entry(ws).or_default().timestamp = timestamp;
    }

    /// Outputs recorded for `ws`
    pub fn outputs(&self, ws: WorkspaceId) -> impl Iterator<Item = (FileId, &Path)> {
        self.records
            .get(&ws)
            .into_iter()
            .flat_map(|r| r.outputs.iter().map(|(id, path)| (*id, path.as_path())))
    }

    /// True if `output` is recorded for `ws`
    pub fn has_output(&self, ws: WorkspaceId, output: FileId) -> bool {
        self.records.get(&ws).is_some_and(|r| r.outputs.contains_key(&output))
    }

    /// Record an output for `ws`
    pub fn add_output(&mut self, ws: WorkspaceId, output: FileId, path: impl Into<PathBuf>) {
        let _ = self.records.entry(ws).or_default().outputs.insert(output, path.into());
    }

    /// Remove and return the outputs recorded for `ws`
    pub fn take_outputs(&mut self, ws: WorkspaceId) -> BTreeMap<FileId, PathBuf> {
        self.records
            .get_mut(&ws)
            .map(|r| std::mem::take(&mut r.outputs))
            .unwrap_or_default()
    }

    /// Workspaces with a record
    pub fn workspaces(&self) -> impl Iterator<Item = WorkspaceId> + '_ {
        self.records.keys().copied()
    }

    /// Serialize to bytes
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_i32::<BigEndian>(len_i32(self.records.len())?)?;
        for (ws, record) in &self.records {
            out.write_i32::<BigEndian>(ws.0)?;
            out.write_i64::<BigEndian>(record.timestamp)?;
            out.write_i32::<BigEndian>(len_i32(record.outputs.len())?)?;
            for (id, path) in &record.outputs {
                out.write_i32::<BigEndian>(id.0)?;
                write_string(&mut out, Some(path.to_string_lossy().as_ref()))?;
            }
        }
        Ok(out)
    }

    /// Deserialize from bytes
    pub fn decode(bytes: &[u8]) -> MonitorResult<Self> {
        let mut input = Cursor::new(bytes);
        let mut records = BTreeMap::new();

        let count = read_count(&mut input)?;
        for _ in 0..count {
            let ws = WorkspaceId(input.read_i32::<BigEndian>().map_err(corrupt)?);
            let timestamp = input.read_i64::<BigEndian>().map_err(corrupt)?;
            let mut outputs = BTreeMap::new();
            for _ in 0..read_count(&mut input)? {
                let id = FileId(input.read_i32::<BigEndian>().map_err(corrupt)?);
                let path = read_string(&mut input)?.ok_or_else(|| MonitorError::Metadata("missing output path".into()))?;
                let _ = outputs.insert(id, PathBuf::from(path));
            }
            let _ = records.insert(ws, SourceRecord { timestamp, outputs });
        }
        Ok(Self { records })
    }
}

/// Per-output record: who produced it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputMetadata {
    /// URL of the producing source
    pub source_url: Option<String>,
    /// Artifact name reported for the output
    pub artifact_name: Option<String>,
}

impl OutputMetadata {
    /// Serialize to bytes
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        write_string(&mut out, self.source_url.as_deref())?;
        write_string(&mut out, self.artifact_name.as_deref())?;
        Ok(out)
    }

    /// Deserialize from bytes
    pub fn decode(bytes: &[u8]) -> MonitorResult<Self> {
        let mut input = Cursor::new(bytes);
        Ok(Self {
            source_url: read_string(&mut input)?,
            artifact_name: read_string(&mut input)?,
        })
    }
}

fn len_i32(len: usize) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many records"))
}

fn read_count(input: &mut Cursor<&[u8]>) -> MonitorResult<i32> {
    let count = input.read_i32::<BigEndian>().map_err(corrupt)?;
    if count < 0 {
        return Err(MonitorError::Metadata(format!("negative record count {count}")));
    }
    Ok(count)
}

fn corrupt(e: io::Error) -> MonitorError {
    MonitorError::Metadata(format!("truncated record: {e}"))
}

/// Source and output records on top of two attribute stores
#[derive(Clone)]
pub struct MetadataStore {
    sources: Arc<dyn AttributeStore>,
    outputs: Arc<dyn AttributeStore>,
}

impl MetadataStore {
    /// Pair a store for source records with one for output records
    pub fn new(sources: Arc<dyn AttributeStore>, outputs: Arc<dyn AttributeStore>) -> Self {
        Self { sources, outputs }
    }

    /// Source record of `file`; unreadable records count as absent
    pub fn load_source(&self, file: FileId) -> Option<SourceMetadata> {
        let bytes = self.sources.get(file)?;
        SourceMetadata::decode(&bytes)
            .inspect_err(|e| debug!(file = %file, error = %e, "Ignoring unreadable source metadata"))
            .ok()
    }

    /// Store the source record of `file`
    pub fn save_source(&self, file: FileId, metadata: &SourceMetadata) -> MonitorResult<()> {
        let bytes = metadata
            .encode()
            .map_err(|source| MonitorError::AttributeStore { file, source })?;
        self.sources
            .set(file, bytes)
            .map_err(|source| MonitorError::AttributeStore { file, source })
    }

    /// Output record of `file`; unreadable records count as absent
    pub fn load_output(&self, file: FileId) -> Option<OutputMetadata> {
        let bytes = self.outputs.get(file)?;
        OutputMetadata::decode(&bytes)
            .inspect_err(|e| debug!(file = %file, error = %e, "Ignoring unreadable output metadata"))
            .ok()
    }

    /// Store the output record of `file`
    pub fn save_output(&self, file: FileId, metadata: &OutputMetadata) -> MonitorResult<()> {
        let bytes = metadata
            .encode()
            .map_err(|source| MonitorError::AttributeStore { file, source })?;
        self.outputs
            .set(file, bytes)
            .map_err(|source| MonitorError::AttributeStore { file, source })
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}
