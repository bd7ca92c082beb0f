use crate::{
    catalog::{self, CatalogSource, IdentifierIndex},
    config::AppConfig,
    repair::{self, RepairReport},
    steam::{self, LibraryPaths},
    template,
};
use anyhow::{bail, Context, Result};
use std::{
    io::{self, BufRead, Write},
    path::Path,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    TemplateReady,
    IndexBuilt,
    BeforeRepair,
}

impl Checkpoint {
    pub fn prompt(self) -> &'static str {
        match self {
            Checkpoint::TemplateReady => "Step 1 done: library located and manifest template ready.",
            Checkpoint::IndexBuilt => "Step 2 done: identifier catalog downloaded and indexed.",
            Checkpoint::BeforeRepair => "Step 3 will write missing manifests into the library.",
        }
    }
}

pub trait Confirm {
    fn confirm(&mut self, checkpoint: Checkpoint) -> Result<bool>;
}

pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, checkpoint: Checkpoint) -> Result<bool> {
        let rule = "-".repeat(50);
        println!("{rule}");
        print!("{} Type 'y' to continue, anything else to quit: ", checkpoint.prompt());
        io::stdout().flush().context("flush prompt")?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read confirmation")?;
        println!("{rule}");
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, checkpoint: Checkpoint) -> Result<bool> {
        info!("{} Continuing (--yes)", checkpoint.prompt());
        Ok(true)
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    Completed(RepairReport),
    Declined(Checkpoint),
}

#[derive(Debug, Clone)]
pub struct App {
    pub config: AppConfig,
    pub paths: LibraryPaths,
}

impl App {
    pub fn initialize(config: AppConfig, library_override: Option<&Path>) -> Result<Self> {
        let paths = match (library_override, config.library_root.as_deref()) {
            (Some(root), _) => steam::detect_library(Some(root))?,
            (None, Some(stored)) => match steam::detect_library(Some(stored)) {
                Ok(paths) => paths,
                Err(err) => {
                    // Stored root may be stale; fall back to auto-detect.
                    warn!("{err}");
                    steam::detect_library(None)?
                }
            },
            (None, None) => steam::detect_library(None)?,
        };
        info!("Steam library: {}", paths.root.display());
        Ok(Self { config, paths })
    }

    pub fn run(
        &self,
        catalog: &dyn CatalogSource,
        confirm: &mut dyn Confirm,
    ) -> Result<SessionOutcome> {
        if !self.paths.manifest_dir.is_dir() {
            bail!(
                "Steam apps directory not found: {}",
                self.paths.manifest_dir.display()
            );
        }

        println!("\n=== [1/3] Preparing manifest template ===");
        let template =
            template::resolve_template(&self.paths.manifest_dir).context("prepare template")?;
        println!(
            "Template: {} ({})",
            template.path.display(),
            template.origin.label()
        );

        let index = match self.gather_index(catalog, confirm) {
            Ok(Gathered::Ready(index)) => index,
            Ok(Gathered::Declined(checkpoint)) => {
                info!("Stopped at {checkpoint:?}");
                template.release();
                return Ok(SessionOutcome::Declined(checkpoint));
            }
            Err(err) => {
                template.release();
                return Err(err);
            }
        };

        println!("\n=== [3/3] Writing missing manifests ===");
        let report = repair::repair_library(&self.paths, &index, template)
            .context("repair library")?;
        Ok(SessionOutcome::Completed(report))
    }

    fn gather_index(
        &self,
        catalog: &dyn CatalogSource,
        confirm: &mut dyn Confirm,
    ) -> Result<Gathered> {
        if !confirm.confirm(Checkpoint::TemplateReady)? {
            return Ok(Gathered::Declined(Checkpoint::TemplateReady));
        }

        println!("\n=== [2/3] Building identifier index ===");
        let index = catalog::build_index(catalog).context("build identifier index")?;
        println!("Indexed {} catalog names.", index.len());

        for checkpoint in [Checkpoint::IndexBuilt, Checkpoint::BeforeRepair] {
            if !confirm.confirm(checkpoint)? {
                return Ok(Gathered::Declined(checkpoint));
            }
        }
        Ok(Gathered::Ready(index))
    }
}

enum Gathered {
    Ready(IdentifierIndex),
    Declined(Checkpoint),
}
