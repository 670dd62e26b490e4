// Checksummed snapshots of trained embedding tables
use anyhow::{anyhow, bail, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spherix_core::{EmbeddingTable, RelationMap};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const SNAPSHOT_EXT: &str = "snapshot";
const CHECKSUM_SUFFIX: &str = ".sha256";

/// Snapshot listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub name: String,
    pub label: String,
    pub creation_time: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// A trained table together with the hierarchy it was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSnapshot {
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub relations: RelationMap,
    pub table: EmbeddingTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hfs: Option<f64>,
    /// Free-form training metadata (config, loss history, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EmbeddingSnapshot {
    pub fn new(label: impl Into<String>, relations: RelationMap, table: EmbeddingTable) -> Self {
        Self {
            label: label.into(),
            created_at: Utc::now(),
            relations,
            table,
            hfs: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_hfs(mut self, hfs: f64) -> Self {
        self.hfs = Some(hfs);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn check(&self) -> Result<()> {
        validate_label(&self.label)?;
        self.relations
            .validate(self.table.len())
            .context("relation map does not fit the embedding table")?;
        Ok(())
    }
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        bail!("snapshot label must not be empty");
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("snapshot label '{}' may only contain [A-Za-z0-9_-]", label);
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
        bail!("invalid snapshot name '{}'", name);
    }
    Ok(())
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn creation_time(metadata: &fs::Metadata) -> Option<String> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

pub struct SnapshotManager {
    snapshot_dir: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_dir: P) -> Result<Self> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&snapshot_dir)
            .with_context(|| format!("failed to create {}", snapshot_dir.display()))?;
        Ok(Self { snapshot_dir })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    fn label_dir(&self, label: &str) -> PathBuf {
        self.snapshot_dir.join(label)
    }

    /// `{label}-{timestamp}-{short uuid}.snapshot`
    fn generate_snapshot_name(label: &str) -> String {
        let now: DateTime<Utc> = Utc::now();
        let id = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}.{}",
            label,
            now.format("%Y-%m-%d-%H-%M-%S-%3f"),
            &id[..8],
            SNAPSHOT_EXT
        )
    }

    /// Write a snapshot and its checksum sidecar.
    pub fn save(&self, snapshot: &EmbeddingSnapshot) -> Result<SnapshotDescription> {
        snapshot.check()?;
        let label_dir = self.label_dir(&snapshot.label);
        fs::create_dir_all(&label_dir)?;

        let name = Self::generate_snapshot_name(&snapshot.label);
        let path = label_dir.join(&name);

        let json = serde_json::to_vec(snapshot)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let bytes = encoder.finish()?;
        let checksum = sha256_hex(&bytes);

        write_atomic(&path, &bytes)?;
        write_atomic(&checksum_path(&path), checksum.as_bytes())?;
        info!(
            label = %snapshot.label,
            name = %name,
            indicators = snapshot.table.len(),
            size = bytes.len(),
            "saved snapshot"
        );

        Ok(SnapshotDescription {
            name,
            label: snapshot.label.clone(),
            creation_time: Some(snapshot.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            size: bytes.len() as u64,
            checksum: Some(checksum),
        })
    }

    pub fn load(&self, label: &str, name: &str) -> Result<EmbeddingSnapshot> {
        validate_label(label)?;
        validate_name(name)?;
        let path = self.label_dir(label).join(name);
        if !path.exists() {
            bail!("snapshot '{}' not found for label '{}'", name, label);
        }
        Self::load_from_path(&path)
    }

    /// Load any snapshot file; its `.sha256` sidecar must be next to it.
    pub fn load_from_path(path: &Path) -> Result<EmbeddingSnapshot> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

        let sidecar = checksum_path(path);
        let expected = fs::read_to_string(&sidecar)
            .with_context(|| format!("missing checksum file {}", sidecar.display()))?;
        let actual = sha256_hex(&bytes);
        if expected.trim() != actual {
            return Err(anyhow!(
                "checksum mismatch for {}: expected {}, got {}",
                path.display(),
                expected.trim(),
                actual
            ));
        }

        let mut json = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut json)
            .with_context(|| format!("failed to decompress {}", path.display()))?;
        let snapshot: EmbeddingSnapshot = serde_json::from_slice(&json)?;
        snapshot.check()?;
        debug!(path = %path.display(), "loaded snapshot");
        Ok(snapshot)
    }

    /// Snapshots for `label`, newest first.
    pub fn list(&self, label: &str) -> Result<Vec<SnapshotDescription>> {
        validate_label(label)?;
        let label_dir = self.label_dir(label);
        if !label_dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&label_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let metadata = fs::metadata(&path)?;
            let checksum = fs::read_to_string(checksum_path(&path))
                .ok()
                .map(|s| s.trim().to_string());
            snapshots.push(SnapshotDescription {
                name: name.to_string(),
                label: label.to_string(),
                creation_time: creation_time(&metadata),
                size: metadata.len(),
                checksum,
            });
        }

        snapshots.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(snapshots)
    }

    /// Snapshots across all labels, newest first.
    pub fn list_all(&self) -> Result<Vec<SnapshotDescription>> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(label) = entry.file_name().to_str() {
                if validate_label(label).is_ok() {
                    all.extend(self.list(label)?);
                }
            }
        }
        all.sort_by(|a, b| b.creation_time.cmp(&a.creation_time).then(b.name.cmp(&a.name)));
        Ok(all)
    }

    /// Most recent snapshot for `label`, if any.
    pub fn latest(&self, label: &str) -> Result<Option<EmbeddingSnapshot>> {
        match self.list(label)?.first() {
            Some(desc) => self.load(label, &desc.name).map(Some),
            None => Ok(None),
        }
    }

    /// Remove a snapshot and its sidecar. Returns false when it did not exist.
    pub fn delete(&self, label: &str, name: &str) -> Result<bool> {
        validate_label(label)?;
        validate_name(name)?;
        let path = self.label_dir(label).join(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        let sidecar = checksum_path(&path);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
        info!(label, name, "deleted snapshot");
        Ok(true)
    }

    pub fn snapshot_path(&self, label: &str, name: &str) -> Option<PathBuf> {
        let path = self.label_dir(label).join(name);
        path.exists().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> EmbeddingSnapshot {
        let mut relations = RelationMap::new();
        relations.add_relation(1, &[0]);
        relations.add_relation(2, &[0, 1]);
        let table = EmbeddingTable::from_rows(vec![
            vec![1.0, 0.0],
            vec![0.6, 0.8],
            vec![0.0, 1.0],
        ])
        .unwrap();
        EmbeddingSnapshot::new("attack-tree", relations, table)
            .with_hfs(0.75)
            .with_metadata("epochs", 100)
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let snapshot = sample();

        let desc = manager.save(&snapshot).unwrap();
        assert!(desc.name.starts_with("attack-tree-"));
        assert!(desc.name.ends_with(".snapshot"));
        assert_eq!(desc.checksum.as_ref().map(String::len), Some(64));

        let loaded = manager.load("attack-tree", &desc.name).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.relations.parents(2), &[0, 1]);
    }

    #[test]
    fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        assert!(manager.list("attack-tree").unwrap().is_empty());

        let a = manager.save(&sample()).unwrap();
        let b = manager.save(&sample()).unwrap();
        assert_ne!(a.name, b.name);

        let listed = manager.list("attack-tree").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|d| d.checksum.is_some()));
        assert_eq!(manager.list_all().unwrap().len(), 2);

        assert!(manager.delete("attack-tree", &a.name).unwrap());
        assert!(!manager.delete("attack-tree", &a.name).unwrap());
        assert!(manager.snapshot_path("attack-tree", &a.name).is_none());
        assert_eq!(manager.list("attack-tree").unwrap().len(), 1);
    }

    #[test]
    fn test_latest() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        assert!(manager.latest("attack-tree").unwrap().is_none());
        manager.save(&sample()).unwrap();
        let latest = manager.latest("attack-tree").unwrap().unwrap();
        assert_eq!(latest.hfs, Some(0.75));
    }

    #[test]
    fn test_corruption_detected() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let desc = manager.save(&sample()).unwrap();
        let path = manager.snapshot_path("attack-tree", &desc.name).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let err = manager.load("attack-tree", &desc.name).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_missing_checksum_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let desc = manager.save(&sample()).unwrap();
        let path = manager.snapshot_path("attack-tree", &desc.name).unwrap();
        fs::remove_file(checksum_path(&path)).unwrap();
        assert!(SnapshotManager::load_from_path(&path).is_err());
    }

    #[test]
    fn test_rejects_bad_label_and_name() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let mut snapshot = sample();
        snapshot.label = "../escape".into();
        assert!(manager.save(&snapshot).is_err());
        assert!(manager.load("attack-tree", "../other.snapshot").is_err());
        assert!(manager.load("attack-tree", "absent.snapshot").is_err());
    }

    #[test]
    fn test_rejects_relations_outside_table() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let mut snapshot = sample();
        snapshot.relations.add_relation(7, &[0]);
        assert!(manager.save(&snapshot).is_err());
    }

    #[test]
    fn test_load_rejects_malformed_table() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let desc = manager.save(&sample()).unwrap();
        let path = manager.snapshot_path("attack-tree", &desc.name).unwrap();

        let json = r#"{"label":"attack-tree","created_at":"2024-01-01T00:00:00Z","relations":[],"table":{"rows":3,"dim":2,"data":[1.0,0.0]}}"#;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        let bytes = encoder.finish().unwrap();
        fs::write(&path, &bytes).unwrap();
        fs::write(checksum_path(&path), sha256_hex(&bytes)).unwrap();

        let err = SnapshotManager::load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("embedding table buffer"));
    }
}
