use crate::acf;
use directories::BaseDirs;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    pub root: PathBuf,
    pub manifest_dir: PathBuf,
    pub common_dir: PathBuf,
}

impl LibraryPaths {
    pub fn from_root(root: &Path) -> Self {
        let manifest_dir = root.join("steamapps");
        let common_dir = manifest_dir.join("common");
        Self {
            root: root.to_path_buf(),
            manifest_dir,
            common_dir,
        }
    }

    pub fn manifest_path(&self, appid: &str) -> PathBuf {
        self.manifest_dir.join(acf::manifest_file_name(appid))
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("{} is not a Steam library: expected a steamapps/ directory", path.display())]
    NotALibrary { path: PathBuf },
    #[error("could not find a Steam library; pass --library <path>")]
    NotFound,
}

pub fn detect_library(root_override: Option<&Path>) -> Result<LibraryPaths, LocateError> {
    if let Some(root) = root_override {
        if !looks_like_library_root(root) {
            return Err(LocateError::NotALibrary {
                path: root.to_path_buf(),
            });
        }
        return Ok(LibraryPaths::from_root(root));
    }

    find_library_root()
        .map(|root| LibraryPaths::from_root(&root))
        .ok_or(LocateError::NotFound)
}

pub fn looks_like_library_root(path: &Path) -> bool {
    path.join("steamapps").is_dir()
}

fn find_library_root() -> Option<PathBuf> {
    let mut libraries = Vec::new();
    for base in steam_install_candidates() {
        let vdf = base.join("steamapps/libraryfolders.vdf");
        if let Ok(raw) = fs::read_to_string(&vdf) {
            libraries.extend(parse_library_folders(&raw));
        }
        libraries.push(base);
    }

    libraries.into_iter().find(|candidate| {
        let found = looks_like_library_root(candidate);
        debug!("Library candidate {} (found: {found})", candidate.display());
        found
    })
}

fn steam_install_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let home = base.home_dir();
        candidates.push(home.join(".local/share/Steam"));
        candidates.push(home.join(".steam/steam"));
        candidates.push(home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam"));
    }
    if cfg!(windows) {
        candidates.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
    }
    candidates
}

// VDF escapes backslashes, so Windows library paths arrive doubled.
pub fn parse_library_folders(raw: &str) -> Vec<PathBuf> {
    acf::string_pairs(raw)
        .into_iter()
        .filter(|(key, _)| *key == "path")
        .map(|(_, value)| PathBuf::from(value.replace("\\\\", "\\")))
        .collect()
}
