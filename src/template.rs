use crate::acf::{self, Field, ManifestRecord, STATE_FULLY_INSTALLED};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

pub const GENERATED_APPID: &str = "999999";
pub const GENERATED_INSTALLDIR: &str = "GenericTemplate";
pub const GENERATED_NAME: &str = "Generic ACF Template";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOrigin {
    ExistingFile,
    Generated,
}

impl TemplateOrigin {
    pub fn label(self) -> &'static str {
        match self {
            TemplateOrigin::ExistingFile => "existing manifest",
            TemplateOrigin::Generated => "generated template",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    pub record: ManifestRecord,
    pub raw: String,
    pub origin: TemplateOrigin,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Kept,
    Removed,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("could not list manifests in {}: {source}", path.display())]
    ListStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read template candidate {}: {source}", path.display())]
    ReadCandidate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write generated template {}: {source}", path.display())]
    WriteGenerated {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Template {
    pub fn appid(&self) -> &str {
        self.record.field(Field::AppId).unwrap_or_default()
    }

    pub fn install_dir(&self) -> &str {
        self.record.field(Field::InstallDir).unwrap_or_default()
    }

    pub fn release(self) -> Cleanup {
        if self.origin == TemplateOrigin::ExistingFile {
            return Cleanup::Kept;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed generated template {}", self.path.display());
                Cleanup::Removed
            }
            Err(err) => {
                warn!(
                    "Could not remove generated template {}, delete it by hand: {err}",
                    self.path.display()
                );
                Cleanup::Failed(err.to_string())
            }
        }
    }
}

pub fn resolve_template(manifest_dir: &Path) -> Result<Template, TemplateError> {
    let candidates = list_manifests(manifest_dir)?;
    if let Some(path) = candidates.into_iter().next() {
        let bytes = fs::read(&path).map_err(|source| TemplateError::ReadCandidate {
            path: path.clone(),
            source,
        })?;
        if let Some(template) = existing_template(path, bytes) {
            info!(
                "Using {} as template (appid {}, installdir {})",
                template.path.display(),
                template.appid(),
                template.install_dir()
            );
            return Ok(template);
        }
    }

    warn!("No usable manifest template found, generating a generic one");
    write_generated_template(manifest_dir)
}

pub fn generic_record(timestamp: &str) -> ManifestRecord {
    let mut record = ManifestRecord::new();
    record.set(Field::AppId.key(), GENERATED_APPID);
    record.set("universe", "1");
    record.set(Field::Name.key(), GENERATED_NAME);
    record.set(Field::StateFlags.key(), STATE_FULLY_INSTALLED);
    record.set(Field::InstallDir.key(), GENERATED_INSTALLDIR);
    record.set(Field::LastUpdated.key(), timestamp);
    record.set("SizeOnDisk", "100000000");
    record.set("buildid", "1");
    record.set("LastOwner", "0");
    record.set("DownloadType", "1");
    record.set("UpdateResult", "0");
    for field in Field::BYTE_COUNTERS {
        record.set(field.key(), "0");
    }
    record.set(Field::AutoUpdateBehavior.key(), "0");
    record.set(Field::AllowOtherDownloadsWhileRunning.key(), "0");
    record.set(Field::ScheduledAutoUpdate.key(), "0");
    record
}

fn list_manifests(manifest_dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let entries = fs::read_dir(manifest_dir).map_err(|source| TemplateError::ListStore {
        path: manifest_dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {err}", manifest_dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(acf::is_manifest_file_name)
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    Ok(paths)
}

fn existing_template(path: PathBuf, bytes: Vec<u8>) -> Option<Template> {
    let raw = match String::from_utf8(bytes) {
        Ok(raw) => raw,
        Err(_) => {
            warn!("Template candidate {} is not valid UTF-8", path.display());
            return None;
        }
    };

    let record = ManifestRecord::parse(&raw);
    let missing = record.missing_required();
    if !missing.is_empty() {
        let keys: Vec<&str> = missing.iter().map(|field| field.key()).collect();
        warn!(
            "Template candidate {} lacks {}",
            path.display(),
            keys.join(", ")
        );
        return None;
    }

    if let Err(err) = acf::check_single_occurrence(&raw, &acf::stamped_fields()) {
        warn!("Template candidate {} cannot be stamped: {err}", path.display());
        return None;
    }

    Some(Template {
        record,
        raw,
        origin: TemplateOrigin::ExistingFile,
        path,
    })
}

fn write_generated_template(manifest_dir: &Path) -> Result<Template, TemplateError> {
    let record = generic_record(&acf::current_timestamp());
    let raw = record.render();
    let path = manifest_dir.join(acf::manifest_file_name(GENERATED_APPID));
    fs::write(&path, &raw).map_err(|source| TemplateError::WriteGenerated {
        path: path.clone(),
        source,
    })?;
    info!("Wrote generated template {}", path.display());
    Ok(Template {
        record,
        raw,
        origin: TemplateOrigin::Generated,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(appid: &str, installdir: &str) -> String {
        let mut record = generic_record("1700000000");
        record.set("appid", appid);
        record.set("installdir", installdir);
        record.set("name", installdir);
        record.render()
    }

    #[test]
    fn generates_template_when_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let template = resolve_template(dir.path()).unwrap();

        assert_eq!(template.origin, TemplateOrigin::Generated);
        assert_eq!(template.path, dir.path().join("appmanifest_999999.acf"));
        assert!(!template.appid().is_empty());
        assert!(!template.install_dir().is_empty());
        for field in Field::BYTE_COUNTERS {
            assert_eq!(template.record.field(field), Some("0"));
        }
        let on_disk = fs::read_to_string(&template.path).unwrap();
        assert_eq!(on_disk, template.raw);
        assert_eq!(ManifestRecord::parse(&on_disk).field(Field::StateFlags), Some("4"));
    }

    #[test]
    fn prefers_first_existing_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("appmanifest_440.acf"), manifest("440", "Team Fortress 2")).unwrap();
        fs::write(dir.path().join("appmanifest_220.acf"), manifest("220", "Half-Life 2")).unwrap();
        fs::write(dir.path().join("libraryfolders.vdf"), "\"libraryfolders\" {}").unwrap();

        let template = resolve_template(dir.path()).unwrap();
        assert_eq!(template.origin, TemplateOrigin::ExistingFile);
        assert_eq!(template.appid(), "220");
        assert_eq!(template.install_dir(), "Half-Life 2");
        assert!(!dir.path().join("appmanifest_999999.acf").exists());
    }

    #[test]
    fn falls_back_when_candidate_lacks_required_fields() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("appmanifest_1.acf"),
            "\"AppState\"\n{\n\t\"appid\"\t\t\"1\"\n}",
        )
        .unwrap();

        let template = resolve_template(dir.path()).unwrap();
        assert_eq!(template.origin, TemplateOrigin::Generated);
        assert_eq!(template.appid(), GENERATED_APPID);
    }

    #[test]
    fn falls_back_when_candidate_has_duplicate_markers() {
        let dir = TempDir::new().unwrap();
        let mut raw = manifest("220", "Half-Life 2");
        raw.push_str("\n\"name\"\t\t\"again\"");
        fs::write(dir.path().join("appmanifest_220.acf"), raw).unwrap();

        let template = resolve_template(dir.path()).unwrap();
        assert_eq!(template.origin, TemplateOrigin::Generated);
    }

    #[test]
    fn missing_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = resolve_template(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, TemplateError::ListStore { .. }));
    }

    #[test]
    fn release_only_removes_generated_templates() {
        let dir = TempDir::new().unwrap();
        let generated = resolve_template(dir.path()).unwrap();
        let path = generated.path.clone();
        assert_eq!(generated.release(), Cleanup::Removed);
        assert!(!path.exists());

        let existing = dir.path().join("appmanifest_220.acf");
        fs::write(&existing, manifest("220", "Half-Life 2")).unwrap();
        let template = resolve_template(dir.path()).unwrap();
        assert_eq!(template.release(), Cleanup::Kept);
        assert!(existing.exists());
    }

    #[test]
    fn falls_back_when_candidate_is_not_utf8() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("appmanifest_1.acf"), [0xff, 0xfe]).unwrap();

        let template = resolve_template(dir.path()).unwrap();
        assert_eq!(template.origin, TemplateOrigin::Generated);
        assert_eq!(template.appid(), GENERATED_APPID);
    }

    #[test]
    fn unwritable_generated_template_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("appmanifest_999999.acf")).unwrap();

        let err = resolve_template(dir.path()).unwrap_err();
        assert!(matches!(err, TemplateError::WriteGenerated { .. }));
    }
}
