//! The artifact store: per-run, append-only output directories.
//!
//! Each simulation run gets a directory named by its creation timestamp
//! (with a disambiguating suffix on collision) holding a fixed file set:
//! the input snapshot, the solver log, the raw result data, and any plot
//! files appended afterwards. Files are write-once and directories are
//! never deleted, so historical runs can always be compared or replayed.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};

/// File name of the input definition snapshot.
pub const INPUT_FILE: &str = "case.json";
/// File name of the solver log.
pub const LOG_FILE: &str = "solver.log";
/// File name of the raw result data.
pub const RESULTS_FILE: &str = "results.csv";

/// Upper bound on same-second run directories before giving up.
const MAX_COLLISION_SUFFIX: u32 = 1000;

/// The store: a root directory holding one subdirectory per run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> GatewayResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| GatewayError::io(root.display().to_string(), &e))?;
        Ok(Self { root })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new uniquely named run directory.
    ///
    /// Directories are keyed by creation timestamp; a second run within
    /// the same wall-clock second gets a `-2`, `-3`, ... suffix. Creation
    /// uses `create_dir`, so a collision is detected by the filesystem
    /// rather than by a racy existence check.
    pub fn begin_run(&self) -> GatewayResult<RunDirectory> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        for attempt in 1..=MAX_COLLISION_SUFFIX {
            let id = if attempt == 1 {
                stamp.clone()
            } else {
                format!("{stamp}-{attempt}")
            };
            let path = self.root.join(&id);
            match fs::create_dir(&path) {
                Ok(()) => {
                    info!(run_id = %id, "run directory created");
                    return Ok(RunDirectory { id, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(GatewayError::io(path.display().to_string(), &e)),
            }
        }
        Err(GatewayError::Io {
            path: self.root.display().to_string(),
            message: format!("exhausted {MAX_COLLISION_SUFFIX} run directory names for {stamp}"),
        })
    }

    /// Opens an existing run directory by id.
    pub fn run(&self, run_id: &str) -> GatewayResult<RunDirectory> {
        validate_name(run_id)?;
        let path = self.root.join(run_id);
        if !path.is_dir() {
            return Err(GatewayError::NotFound {
                path: run_id.to_string(),
            });
        }
        Ok(RunDirectory {
            id: run_id.to_string(),
            path,
        })
    }

    /// Lists all run ids, oldest first.
    pub fn list_runs(&self) -> GatewayResult<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| GatewayError::io(self.root.display().to_string(), &e))?;
        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GatewayError::io(self.root.display().to_string(), &e))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }
}

/// One run's output directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    id: String,
    path: PathBuf,
}

impl RunDirectory {
    /// The run id (the directory name).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one named file. Files are write-once: a second write to the
    /// same name fails with `IoError` instead of overwriting.
    pub fn write(&self, name: &str, bytes: &[u8]) -> GatewayResult<()> {
        validate_name(name)?;
        let path = self.path.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| GatewayError::io(path.display().to_string(), &e))?;
        file.write_all(bytes)
            .map_err(|e| GatewayError::io(path.display().to_string(), &e))?;
        file.flush()
            .map_err(|e| GatewayError::io(path.display().to_string(), &e))?;
        info!(run_id = %self.id, file = name, bytes = bytes.len(), "artifact written");
        Ok(())
    }

    /// Reads one named file, failing with `NotFound` if it is absent.
    pub fn read(&self, name: &str) -> GatewayResult<Vec<u8>> {
        validate_name(name)?;
        let path = self.path.join(name);
        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GatewayError::NotFound {
                    path: format!("{}/{name}", self.id),
                });
            }
            Err(e) => return Err(GatewayError::io(path.display().to_string(), &e)),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| GatewayError::io(path.display().to_string(), &e))?;
        Ok(bytes)
    }

    /// Reads one named file as UTF-8 text.
    pub fn read_to_string(&self, name: &str) -> GatewayResult<String> {
        let bytes = self.read(name)?;
        String::from_utf8(bytes).map_err(|_| GatewayError::Io {
            path: format!("{}/{name}", self.id),
            message: "artifact is not valid UTF-8".to_string(),
        })
    }

    /// Lists the files in this run, sorted by name.
    pub fn list(&self) -> GatewayResult<Vec<String>> {
        let entries = fs::read_dir(&self.path)
            .map_err(|e| GatewayError::io(self.path.display().to_string(), &e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GatewayError::io(self.path.display().to_string(), &e))?;
            if let Some(name) = entry.file_name().to_str() {
                files.push(name.to_string());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Run ids and artifact names must be plain names, never paths.
fn validate_name(name: &str) -> GatewayResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(GatewayError::InvalidValue {
            target: "artifact".to_string(),
            field: "name".to_string(),
            reason: format!("'{name}' is not a plain file name"),
        });
    }
    Ok(())
}
