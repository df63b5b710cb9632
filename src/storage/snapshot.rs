//! Snapshot persistence for built cluster indexes.
//!
//! A snapshot holds every aggregate of every zoom level. Files are written to
//! a temporary sibling and atomically renamed over the previous snapshot.

use crate::error::{ClusterError, Result};
use crate::storage::MemoryStore;
use quadcluster_types::{Bounds, ClusterAggregate, Zoom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SNAPSHOT_MAGIC: &[u8] = b"QUADCLUSTER_SNAPSHOT";
const SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Seconds since the Unix epoch when the snapshot was captured.
    pub created_at: u64,
    pub bounds: Bounds,
    pub aggregates: BTreeMap<Zoom, Vec<ClusterAggregate>>,
}

impl IndexSnapshot {
    pub fn capture(store: &MemoryStore, bounds: Bounds) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            created_at,
            bounds,
            aggregates: store.aggregates_by_zoom(),
        }
    }

    /// Replace the aggregates of `store` with the captured ones.
    ///
    /// Quadkeys only address the same cells under the bounds they were
    /// computed with, so a snapshot taken under other bounds is rejected and
    /// `store` is left untouched.
    pub fn restore_into(self, store: &MemoryStore, bounds: &Bounds) -> Result<()> {
        if self.bounds != *bounds {
            return Err(ClusterError::InvalidConfig(format!(
                "snapshot bounds {:?} do not match index bounds {:?}",
                self.bounds, bounds
            )));
        }
        store.restore_aggregates(self.aggregates);
        Ok(())
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregates.values().map(Vec::len).sum()
    }
}

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or `None` when the file is missing or empty.
    pub fn load(&self) -> Result<Option<IndexSnapshot>> {
        if !self.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }

        let mut reader = BufReader::new(file);

        let mut magic = vec![0u8; SNAPSHOT_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(ClusterError::InvalidFormat);
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(ClusterError::InvalidFormat);
        }

        let snapshot = bincode::deserialize_from(&mut reader)
            .map_err(|e| ClusterError::Serialization(format!("snapshot payload: {}", e)))?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let temp_path = self.temp_path();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(SNAPSHOT_MAGIC)?;
        writer.write_all(&[SNAPSHOT_VERSION])?;
        bincode::serialize_into(&mut writer, snapshot)
            .map_err(|e| ClusterError::Serialization(format!("snapshot payload: {}", e)))?;

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        self.sync_parent_dir()?;

        log::info!(
            "snapshot: wrote {} aggregates to {}",
            snapshot.aggregate_count(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        if let Some(name) = temp.file_name() {
            let mut new_name = name.to_string_lossy().into_owned();
            new_name.push_str(".tmp");
            temp.set_file_name(new_name);
        }
        temp
    }

    fn sync_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
        Ok(())
    }
}
