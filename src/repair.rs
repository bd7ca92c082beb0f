use crate::{
    acf::{self, AcfError, Field, STATE_FULLY_INSTALLED},
    catalog::IdentifierIndex,
    steam::LibraryPaths,
    template::{Cleanup, Template},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("game folder directory not found: {}", path.display())]
    LibraryMissing { path: PathBuf },
    #[error("permission denied listing {}", path.display())]
    PermissionDenied { path: PathBuf },
    #[error("could not list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTarget {
    pub folder: String,
    pub appid: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FailedRepair {
    pub target: ManifestTarget,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RepairReport {
    pub written: Vec<ManifestTarget>,
    pub already_present: Vec<ManifestTarget>,
    pub unmatched: Vec<String>,
    pub failed: Vec<FailedRepair>,
    pub template_cleanup: Cleanup,
}

impl RepairReport {
    pub fn repaired_count(&self) -> usize {
        self.written.len()
    }
}

pub fn list_library_folders(common_dir: &Path) -> Result<Vec<String>, RepairError> {
    let entries = fs::read_dir(common_dir).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => RepairError::LibraryMissing {
            path: common_dir.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => RepairError::PermissionDenied {
            path: common_dir.to_path_buf(),
        },
        _ => RepairError::Io {
            path: common_dir.to_path_buf(),
            source,
        },
    })?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {err}", common_dir.display());
                continue;
            }
        };
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => folders.push(name),
            Err(name) => warn!("Skipping folder with a non UTF-8 name: {name:?}"),
        }
    }
    folders.sort();
    Ok(folders)
}

pub fn derive_manifest(
    template_raw: &str,
    appid: &str,
    folder: &str,
    timestamp: &str,
) -> Result<String, AcfError> {
    let mut replacements = vec![
        (Field::AppId, appid),
        (Field::InstallDir, folder),
        (Field::Name, folder),
        (Field::StateFlags, STATE_FULLY_INSTALLED),
        (Field::LastUpdated, timestamp),
    ];
    replacements.extend(Field::BYTE_COUNTERS.into_iter().map(|field| (field, "0")));
    acf::substitute(template_raw, &replacements)
}

// Writes a manifest for every game folder the catalog recognizes and that has
// none yet. Consumes the template: a generated one is removed afterwards.
pub fn repair_library(
    paths: &LibraryPaths,
    index: &IdentifierIndex,
    template: Template,
) -> Result<RepairReport, RepairError> {
    let folders = match list_library_folders(&paths.common_dir) {
        Ok(folders) => folders,
        Err(err) => {
            template.release();
            return Err(err);
        }
    };
    info!(
        "Found {} game folders in {}",
        folders.len(),
        paths.common_dir.display()
    );

    let timestamp = acf::current_timestamp();
    let mut written = Vec::new();
    let mut already_present = Vec::new();
    let mut unmatched = Vec::new();
    let mut failed = Vec::new();

    for folder in folders {
        let Some(appid) = index.lookup(&folder) else {
            debug!("No catalog match for {folder}");
            unmatched.push(folder);
            continue;
        };

        let target = ManifestTarget {
            path: paths.manifest_path(appid),
            appid: appid.to_string(),
            folder,
        };
        if target.path.exists() {
            debug!(
                "{} already has {}",
                target.folder,
                target.path.display()
            );
            already_present.push(target);
            continue;
        }

        info!("Repairing {} (appid {})", target.folder, target.appid);
        let result = derive_manifest(&template.raw, &target.appid, &target.folder, &timestamp)
            .map_err(|err| err.to_string())
            .and_then(|contents| {
                write_manifest(&target.path, &contents).map_err(|err| err.to_string())
            });
        match result {
            Ok(()) => written.push(target),
            Err(reason) => {
                error!("Failed to repair {}: {reason}", target.folder);
                failed.push(FailedRepair { target, reason });
            }
        }
    }

    let template_cleanup = template.release();
    info!("Wrote {} manifests", written.len());
    Ok(RepairReport {
        written,
        already_present,
        unmatched,
        failed,
        template_cleanup,
    })
}

fn write_manifest(path: &Path, contents: &str) -> io::Result<()> {
    let temp = path.with_extension("acf.tmp");
    fs::write(&temp, contents)?;
    if let Err(err) = fs::rename(&temp, path) {
        if let Err(cleanup) = fs::remove_file(&temp) {
            warn!("Could not remove {}: {cleanup}", temp.display());
        }
        return Err(err);
    }
    Ok(())
}
