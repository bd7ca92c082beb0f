use crate::normalize::normalize_name;
use serde_json::Value;
use std::{
    collections::HashMap,
    fs, io,
    io::Read,
    path::PathBuf,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/jsnli/steamappidlist/master/data/games_appid.json";
const USER_AGENT: &str = concat!("manifestsmith/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("identifier catalog unavailable: request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Transport>,
    },
    #[error("identifier catalog unavailable: {url} answered HTTP {code}")]
    Status { url: String, code: u16 },
    #[error("identifier catalog unavailable: could not read response body: {0}")]
    Read(#[source] io::Error),
    #[error("identifier catalog unavailable: could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("identifier catalog unavailable: malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(
        "identifier catalog unavailable: expected an array of entries or an id-to-name object, found {found}"
    )]
    UnrecognizedShape { found: &'static str },
    #[error("identifier catalog unavailable: no usable entries")]
    Empty,
}

pub trait CatalogSource {
    fn describe(&self) -> String;
    fn fetch(&self) -> Result<String, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct HttpCatalog {
    pub url: String,
    pub timeout: Duration,
}

impl CatalogSource for HttpCatalog {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<String, CatalogError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.timeout)
            .timeout_read(self.timeout)
            .timeout_write(self.timeout)
            .build();
        let response = match agent.get(&self.url).set("User-Agent", USER_AGENT).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(CatalogError::Status {
                    url: self.url.clone(),
                    code,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(CatalogError::Transport {
                    url: self.url.clone(),
                    source: Box::new(transport),
                })
            }
        };
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(CatalogError::Read)?;
        Ok(body)
    }
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    pub path: PathBuf,
}

impl CatalogSource for FileCatalog {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<String, CatalogError> {
        fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub appid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogPayload {
    Entries(Vec<CatalogEntry>),
    ById(Vec<CatalogEntry>),
}

impl CatalogPayload {
    pub fn decode(raw: &str) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(raw)?;
        match value {
            Value::Array(items) => Ok(CatalogPayload::Entries(
                items.iter().filter_map(entry_from_object).collect(),
            )),
            Value::Object(map) => Ok(CatalogPayload::ById(
                map.into_iter()
                    .filter_map(|(appid, name)| match name {
                        Value::String(name) => Some(CatalogEntry { appid, name }),
                        _ => None,
                    })
                    .collect(),
            )),
            other => Err(CatalogError::UnrecognizedShape {
                found: json_kind(&other),
            }),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        match self {
            CatalogPayload::Entries(entries) | CatalogPayload::ById(entries) => entries,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            CatalogPayload::Entries(_) => "entry list",
            CatalogPayload::ById(_) => "id map",
        }
    }
}

fn entry_from_object(item: &Value) -> Option<CatalogEntry> {
    let object = item.as_object()?;
    let appid = match object.get("appid")? {
        Value::String(appid) => appid.clone(),
        Value::Number(appid) => appid.to_string(),
        _ => return None,
    };
    let name = object.get("name")?.as_str()?.to_string();
    Some(CatalogEntry { appid, name })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierIndex {
    by_name: HashMap<String, String>,
}

impl IdentifierIndex {
    pub fn from_payload(payload: &CatalogPayload) -> Self {
        let mut index = IdentifierIndex::default();
        for entry in payload.entries() {
            index.insert(&entry.name, &entry.appid);
        }
        index
    }

    // Adds a catalog entry; ids that are not all digits and blank names are
    // ignored. A later name collision replaces the earlier id.
    pub fn insert(&mut self, name: &str, appid: &str) -> bool {
        let numeric = !appid.is_empty() && appid.bytes().all(|byte| byte.is_ascii_digit());
        if !numeric || name.is_empty() {
            return false;
        }
        self.by_name.insert(normalize_name(name), appid.to_string());
        true
    }

    pub fn get(&self, normalized: &str) -> Option<&str> {
        self.by_name.get(normalized).map(String::as_str)
    }

    pub fn lookup(&self, display_name: &str) -> Option<&str> {
        self.get(&normalize_name(display_name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

pub fn build_index(source: &dyn CatalogSource) -> Result<IdentifierIndex, CatalogError> {
    info!("Fetching identifier catalog from {}", source.describe());
    let raw = source.fetch()?;
    let payload = CatalogPayload::decode(&raw)?;
    debug!(
        "Catalog decoded as {} with {} candidate entries",
        payload.shape(),
        payload.entries().len()
    );
    let index = IdentifierIndex::from_payload(&payload);
    if index.is_empty() {
        return Err(CatalogError::Empty);
    }
    info!("Loaded {} catalog names", index.len());
    Ok(index)
}
