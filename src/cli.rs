use crate::{
    app::{App, AssumeYes, Confirm, SessionOutcome, StdinConfirm},
    catalog::{CatalogSource, FileCatalog, HttpCatalog},
    config::AppConfig,
    logging::{self, Verbosity},
    repair::RepairReport,
    template::Cleanup,
};
use anyhow::{bail, Result};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, PartialEq, Eq)]
enum CliAction {
    Run(RunOptions),
    Help,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct RunOptions {
    library: Option<PathBuf>,
    catalog_url: Option<String>,
    catalog_file: Option<PathBuf>,
    timeout_secs: Option<u64>,
    assume_yes: bool,
    verbosity: Verbosity,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            library: None,
            catalog_url: None,
            catalog_file: None,
            timeout_secs: None,
            assume_yes: false,
            verbosity: Verbosity::Normal,
        }
    }
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        CliAction::Help => {
            print_help();
            Ok(())
        }
        CliAction::Version => {
            println!("manifestsmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(options) => run_repair(options),
    }
}

fn run_repair(options: RunOptions) -> Result<()> {
    logging::init(options.verbosity)?;
    let config = AppConfig::load_or_create()?;
    let app = App::initialize(config, options.library.as_deref())?;

    let catalog: Box<dyn CatalogSource> = match options.catalog_file {
        Some(path) => Box::new(FileCatalog { path }),
        None => Box::new(HttpCatalog {
            url: options
                .catalog_url
                .unwrap_or_else(|| app.config.catalog_url.clone()),
            timeout: options
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| app.config.catalog_timeout()),
        }),
    };
    let mut confirm: Box<dyn Confirm> = if options.assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    };

    match app.run(catalog.as_ref(), confirm.as_mut())? {
        SessionOutcome::Declined(_) => println!("Stopped. Nothing further was written."),
        SessionOutcome::Completed(report) => print_summary(&report),
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    let mut options = RunOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            match inline.clone().or_else(|| iter.next().cloned()) {
                Some(value) => Ok(value),
                None => bail!("{name} requires a value"),
            }
        };

        match flag {
            "-h" | "--help" | "help" => return Ok(CliAction::Help),
            "-V" | "--version" | "version" => return Ok(CliAction::Version),
            "--library" => options.library = Some(PathBuf::from(value("--library")?)),
            "--catalog-url" => options.catalog_url = Some(value("--catalog-url")?),
            "--catalog-file" => {
                options.catalog_file = Some(PathBuf::from(value("--catalog-file")?))
            }
            "--timeout" => {
                let raw = value("--timeout")?;
                match raw.parse::<u64>() {
                    Ok(secs) if secs > 0 => options.timeout_secs = Some(secs),
                    _ => bail!("--timeout expects a positive number of seconds, got {raw}"),
                }
            }
            "-y" | "--yes" => options.assume_yes = true,
            "-q" | "--quiet" => options.verbosity = Verbosity::Quiet,
            "--verbose" => options.verbosity = Verbosity::Verbose,
            "--verbosity" => {
                let level = value("--verbosity")?;
                match Verbosity::parse(&level) {
                    Some(verbosity) => options.verbosity = verbosity,
                    None => bail!("Unknown verbosity: {level}"),
                }
            }
            _ if flag.starts_with("-v") && flag[1..].chars().all(|ch| ch == 'v') => {
                options.verbosity = if flag.len() > 2 {
                    Verbosity::Debug
                } else {
                    Verbosity::Verbose
                };
            }
            _ => bail!("Unknown argument: {arg} (see --help)"),
        }
    }

    Ok(CliAction::Run(options))
}

fn print_summary(report: &RepairReport) {
    println!();
    for target in &report.written {
        println!("  repaired  {} -> {}", target.folder, target.path.display());
    }
    for failed in &report.failed {
        println!("  FAILED    {}: {}", failed.target.folder, failed.reason);
    }
    println!(
        "Wrote {} manifest(s); {} already present, {} unmatched, {} failed.",
        report.repaired_count(),
        report.already_present.len(),
        report.unmatched.len(),
        report.failed.len()
    );
    if let Cleanup::Failed(reason) = &report.template_cleanup {
        println!("Remove the generated template by hand ({reason}).");
    }
    if report.repaired_count() > 0 {
        println!();
        println!("Next steps:");
        println!("  1. Quit Steam completely.");
        println!("  2. Start Steam again; the repaired games show as installed.");
        println!("  3. Run \"Verify integrity of game files\" on each repaired game.");
    }
}

fn print_help() {
    println!("manifestsmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Regenerates missing appmanifest_<appid>.acf files for game folders in steamapps/common.");
    println!();
    println!("Usage:");
    println!("  manifestsmith [options]");
    println!();
    println!("Options:");
    println!("  --library <path>        Steam library root (the folder containing steamapps/)");
    println!("  --catalog-url <url>     Identifier catalog URL");
    println!("  --catalog-file <path>   Read the identifier catalog from a local JSON file");
    println!("  --timeout <secs>        Catalog download timeout");
    println!("  -y, --yes               Continue past every checkpoint without asking");
    println!("  -q, --quiet             Errors only");
    println!("  -v, -vv                 Increase verbosity");
    println!("  --verbosity <level>     quiet | normal | verbose | debug");
    println!("  -h, --help              Show help");
    println!("  -V, --version           Show version");
}
