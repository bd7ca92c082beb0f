use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quiet" | "minimal" => Some(Verbosity::Quiet),
            "normal" | "info" => Some(Verbosity::Normal),
            "verbose" => Some(Verbosity::Verbose),
            "debug" | "trace" => Some(Verbosity::Debug),
            _ => None,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Debug => "trace",
        }
    }
}

pub fn init(verbosity: Verbosity) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(verbosity.directive()))
        .map_err(|err| anyhow!("configure log filter: {err}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("install log subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_names() {
        assert_eq!(Verbosity::parse("quiet"), Some(Verbosity::Quiet));
        assert_eq!(Verbosity::parse("trace"), Some(Verbosity::Debug));
        assert_eq!(Verbosity::parse("loud"), None);
        assert_eq!(Verbosity::Verbose.directive(), "debug");
    }

    #[test]
    fn init_twice_is_reported() {
        let _ = init(Verbosity::Normal);
        assert!(init(Verbosity::Normal).is_err());
    }
}
