//! Binary manifest: what the downloader says is installed, checked against
//! what is actually on disk.
//!
//! A worker kind is installed only if an entry for its module exists and the
//! file at `<bin>/<module>/<version>/<name>` hashes to the entry's sha256.
//! `force_include` in settings enables kinds without a verified entry,
//! pointing at `binary_overrides` when given.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::data::write_atomic;
use crate::error::ControlError;
use crate::types::config::Settings;
use crate::worker::WorkerKind;


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Lower-case hex sha256 of the binary.
    pub hash: String,
    pub version: String,
    /// Required-module tag; matches `WorkerKind::module()`.
    pub module: String,
}


/// Where manifest entries come from.
pub trait ManifestSource: Send {
    fn entries(&self) -> Result<Vec<ManifestEntry>, ControlError>;
}

/// Where verified binaries live.
pub trait BinaryStore: Send {
    fn path_of(&self, entry: &ManifestEntry) -> PathBuf;
    /// Whether the binary for `entry` is present and matches its hash.
    fn verify(&self, entry: &ManifestEntry) -> bool;
}


/// JSON array of entries written by the downloader. A missing file means
/// nothing is installed.
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    pub fn new(path: &Path) -> Self {
        FileManifest {
            path: path.to_path_buf(),
        }
    }
}

impl ManifestSource for FileManifest {
    fn entries(&self) -> Result<Vec<ManifestEntry>, ControlError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ControlError::io(format!("read {}", self.path.display()), e))
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            ControlError::validation("manifest", format!("{}: {}", self.path.display(), e))
        })
    }
}

/// Fixed entry list.
impl ManifestSource for Vec<ManifestEntry> {
    fn entries(&self) -> Result<Vec<ManifestEntry>, ControlError> {
        Ok(self.clone())
    }
}


pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: &Path) -> Self {
        DiskStore {
            root: root.to_path_buf(),
        }
    }
}

impl BinaryStore for DiskStore {
    fn path_of(&self, entry: &ManifestEntry) -> PathBuf {
        self.root.join(&entry.module).join(&entry.version).join(&entry.name)
    }

    fn verify(&self, entry: &ManifestEntry) -> bool {
        let path = self.path_of(entry);
        match sha256_file(&path) {
            Ok(digest) if digest.eq_ignore_ascii_case(&entry.hash) => true,
            Ok(digest) => {
                warn!("{}: hash mismatch (have {}, want {})", path.display(), digest, entry.hash);
                false
            }
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                false
            }
        }
    }
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}


/// A manifest entry whose binary passed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Installed {
    pub entry: ManifestEntry,
    pub path: PathBuf,
}

/// Keep the entries whose binaries verify on disk.
pub fn verify_installed(entries: &[ManifestEntry], store: &dyn BinaryStore) -> Vec<Installed> {
    entries
        .iter()
        .filter(|entry| store.verify(entry))
        .map(|entry| Installed {
            entry: entry.clone(),
            path: store.path_of(entry),
        })
        .collect()
}

/// Order dotted versions part by part. Numeric parts compare as numbers
/// and sort before non-numeric ones; anything else compares as text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Map every usable worker kind to its executable.
pub fn resolve_binaries(installed: &[Installed], settings: &Settings) -> BTreeMap<WorkerKind, PathBuf> {
    let mut binaries: BTreeMap<WorkerKind, (String, PathBuf)> = BTreeMap::new();
    for item in installed {
        let kind = match crate::worker::ALL_KINDS
            .iter()
            .copied()
            .find(|k| k.module() == item.entry.module)
        {
            Some(k) => k,
            None => continue,
        };
        // Several versions may be installed; the highest wins.
        let newer = binaries
            .get(&kind)
            .map(|(version, _)| compare_versions(&item.entry.version, version) == Ordering::Greater)
            .unwrap_or(true);
        if newer {
            binaries.insert(kind, (item.entry.version.clone(), item.path.clone()));
        }
    }
    let mut resolved: BTreeMap<WorkerKind, PathBuf> =
        binaries.into_iter().map(|(k, (_, path))| (k, path)).collect();

    for name in &settings.force_include {
        let kind = match WorkerKind::from_name(name) {
            Some(k) => k,
            None => {
                warn!("force_include: unknown worker kind '{}'", name);
                continue;
            }
        };
        match settings.binary_overrides.get(name) {
            Some(path) => {
                info!("{}: forced in with binary {}", name, path.display());
                resolved.insert(kind, path.clone());
            }
            None if resolved.contains_key(&kind) => {}
            None => warn!("force_include: {} has no binary override and is not installed", name),
        }
    }
    resolved
}


/// Persist the last verified manifest.
pub fn write_mirror(path: &Path, entries: &[ManifestEntry]) -> Result<(), ControlError> {
    write_atomic(path, &serde_json::to_vec_pretty(entries)?)
}

pub fn read_mirror(path: &Path) -> Vec<ManifestEntry> {
    fs::read_to_string(path)
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default()
}
