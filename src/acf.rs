use std::ops::Range;
use thiserror::Error;
use time::OffsetDateTime;

pub const GROUP_KEY: &str = "AppState";
pub const STATE_FULLY_INSTALLED: &str = "4";

const MANIFEST_PREFIX: &str = "appmanifest_";
const MANIFEST_EXTENSION: &str = ".acf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    AppId,
    InstallDir,
    Name,
    StateFlags,
    LastUpdated,
    BytesToDownload,
    BytesDownloaded,
    BytesToStage,
    BytesStaged,
    AutoUpdateBehavior,
    AllowOtherDownloadsWhileRunning,
    ScheduledAutoUpdate,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::AppId,
        Field::InstallDir,
        Field::Name,
        Field::StateFlags,
        Field::LastUpdated,
        Field::BytesToDownload,
        Field::BytesDownloaded,
        Field::BytesToStage,
        Field::BytesStaged,
        Field::AutoUpdateBehavior,
        Field::AllowOtherDownloadsWhileRunning,
        Field::ScheduledAutoUpdate,
    ];

    pub const BYTE_COUNTERS: [Field; 4] = [
        Field::BytesToDownload,
        Field::BytesDownloaded,
        Field::BytesToStage,
        Field::BytesStaged,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::AppId => "appid",
            Field::InstallDir => "installdir",
            Field::Name => "name",
            Field::StateFlags => "StateFlags",
            Field::LastUpdated => "LastUpdated",
            Field::BytesToDownload => "BytesToDownload",
            Field::BytesDownloaded => "BytesDownloaded",
            Field::BytesToStage => "BytesToStage",
            Field::BytesStaged => "BytesStaged",
            Field::AutoUpdateBehavior => "AutoUpdateBehavior",
            Field::AllowOtherDownloadsWhileRunning => "AllowOtherDownloadsWhileRunning",
            Field::ScheduledAutoUpdate => "ScheduledAutoUpdate",
        }
    }

    pub fn required(self) -> bool {
        matches!(self, Field::AppId | Field::InstallDir)
    }

    pub fn stamped(self) -> bool {
        !matches!(
            self,
            Field::AutoUpdateBehavior
                | Field::AllowOtherDownloadsWhileRunning
                | Field::ScheduledAutoUpdate
        )
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.key() == key)
    }
}

pub fn stamped_fields() -> Vec<Field> {
    Field::ALL
        .into_iter()
        .filter(|field| field.stamped())
        .collect()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcfError {
    #[error("template has no \"{key}\" field")]
    MissingField { key: &'static str },
    #[error("template has {count} \"{key}\" fields, expected exactly one")]
    DuplicateField { key: &'static str, count: usize },
    #[error("value for \"{key}\" contains a quote or line break: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRecord {
    fields: Vec<(String, String)>,
}

impl ManifestRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut record = ManifestRecord::new();
        for pair in key_value_pairs(text) {
            if let Some(field) = Field::from_key(pair.key) {
                record.set(field.key(), pair.value);
            }
        }
        record
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.get(field.key())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == key) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn missing_required(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| field.required())
            .filter(|field| self.field(*field).map_or(true, str::is_empty))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() + 3);
        lines.push(format!("\"{GROUP_KEY}\""));
        lines.push("{".to_string());
        for (key, value) in &self.fields {
            lines.push(format!("\t\"{key}\"\t\t\"{value}\""));
        }
        lines.push("}".to_string());
        lines.join("\n")
    }
}

pub fn manifest_file_name(appid: &str) -> String {
    format!("{MANIFEST_PREFIX}{appid}{MANIFEST_EXTENSION}")
}

pub fn is_manifest_file_name(name: &str) -> bool {
    name.starts_with(MANIFEST_PREFIX) && name.ends_with(MANIFEST_EXTENSION)
}

pub fn current_timestamp() -> String {
    OffsetDateTime::now_utc().unix_timestamp().to_string()
}

// Checks that every field occurs exactly once, so substitution has a single
// unambiguous position to rewrite.
pub fn check_single_occurrence(text: &str, fields: &[Field]) -> Result<(), AcfError> {
    let pairs = key_value_pairs(text);
    for field in fields {
        let count = pairs.iter().filter(|pair| pair.key == field.key()).count();
        match count {
            0 => return Err(AcfError::MissingField { key: field.key() }),
            1 => {}
            count => {
                return Err(AcfError::DuplicateField {
                    key: field.key(),
                    count,
                })
            }
        }
    }
    Ok(())
}

pub fn substitute(text: &str, replacements: &[(Field, &str)]) -> Result<String, AcfError> {
    for (field, value) in replacements {
        if value.contains(['"', '\n', '\r']) {
            return Err(AcfError::InvalidValue {
                key: field.key(),
                value: value.to_string(),
            });
        }
    }

    let fields: Vec<Field> = replacements.iter().map(|(field, _)| *field).collect();
    check_single_occurrence(text, &fields)?;

    let pairs = key_value_pairs(text);
    let mut edits: Vec<(Range<usize>, &str)> = Vec::new();
    for (field, value) in replacements {
        let Some(pair) = pairs.iter().find(|pair| pair.key == field.key()) else {
            continue;
        };
        match edits.iter_mut().find(|edit| edit.0 == pair.value_span) {
            Some(edit) => edit.1 = *value,
            None => edits.push((pair.value_span.clone(), *value)),
        }
    }
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));

    let mut output = text.to_string();
    for (span, value) in edits {
        output.replace_range(span, value);
    }
    Ok(output)
}

#[derive(Debug)]
struct Pair<'a> {
    key: &'a str,
    value: &'a str,
    value_span: Range<usize>,
}

#[derive(Debug)]
enum Token {
    Quoted(Range<usize>),
    Other,
}

fn tokens(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'"' => {
                let start = index + 1;
                let Some(len) = text[start..].find('"') else {
                    break;
                };
                tokens.push(Token::Quoted(start..start + len));
                index = start + len + 1;
            }
            byte if byte.is_ascii_whitespace() => index += 1,
            _ => {
                tokens.push(Token::Other);
                index += 1;
            }
        }
    }
    tokens
}

pub fn string_pairs(text: &str) -> Vec<(&str, &str)> {
    key_value_pairs(text)
        .into_iter()
        .map(|pair| (pair.key, pair.value))
        .collect()
}

// Two quoted strings separated only by whitespace form a key/value pair.
fn key_value_pairs(text: &str) -> Vec<Pair<'_>> {
    let tokens = tokens(text);
    let mut pairs = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        if let (Token::Quoted(key), Some(Token::Quoted(value))) =
            (&tokens[index], tokens.get(index + 1))
        {
            pairs.push(Pair {
                key: &text[key.clone()],
                value: &text[value.clone()],
                value_span: value.clone(),
            });
            index += 2;
        } else {
            index += 1;
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEAM_MANIFEST: &str = "\"AppState\"\n{\n\t\"appid\"\t\t\"220\"\n\t\"universe\"\t\t\"1\"\n\t\"name\"\t\t\"Half-Life 2\"\n\t\"StateFlags\"\t\t\"4\"\n\t\"installdir\"\t\t\"Half-Life 2\"\n\t\"LastUpdated\"\t\t\"1700000000\"\n\t\"SizeOnDisk\"\t\t\"6400000000\"\n\t\"BytesToDownload\"\t\t\"12\"\n\t\"BytesDownloaded\"\t\t\"12\"\n\t\"BytesToStage\"\t\t\"34\"\n\t\"BytesStaged\"\t\t\"34\"\n\t\"InstalledDepots\"\n\t{\n\t\t\"221\"\n\t\t{\n\t\t\t\"manifest\"\t\t\"123\"\n\t\t\t\"size\"\t\t\"999\"\n\t\t}\n\t}\n\t\"UserConfig\"\n\t{\n\t\t\"language\"\t\t\"name\"\n\t}\n}";

    #[test]
    fn parse_extracts_known_fields_in_order() {
        let record = ManifestRecord::parse(STEAM_MANIFEST);
        let keys: Vec<&str> = record.iter().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            vec![
                "appid",
                "name",
                "StateFlags",
                "installdir",
                "LastUpdated",
                "BytesToDownload",
                "BytesDownloaded",
                "BytesToStage",
                "BytesStaged",
            ]
        );
        assert_eq!(record.field(Field::AppId), Some("220"));
        assert_eq!(record.field(Field::InstallDir), Some("Half-Life 2"));
        assert_eq!(record.get("SizeOnDisk"), None);
        assert!(record.missing_required().is_empty());
    }

    #[test]
    fn parse_does_not_treat_values_as_keys() {
        let record = ManifestRecord::parse("\"language\"\t\t\"name\"\n\"appid\"\t\t\"5\"");
        assert_eq!(record.field(Field::Name), None);
        assert_eq!(record.field(Field::AppId), Some("5"));
    }

    #[test]
    fn parse_later_duplicate_wins_and_keeps_position() {
        let record = ManifestRecord::parse("\"appid\" \"1\"\n\"name\" \"a\"\n\"appid\" \"2\"");
        let pairs: Vec<(&str, &str)> = record.iter().collect();
        assert_eq!(pairs, vec![("appid", "2"), ("name", "a")]);
    }

    #[test]
    fn parse_tolerates_garbage() {
        assert!(ManifestRecord::parse("").is_empty());
        assert!(ManifestRecord::parse("\"appid\" {").is_empty());
        assert!(ManifestRecord::parse("\"appid\" \"12").is_empty());
        let record = ManifestRecord::parse("\"appid\"\n\n\t\"\"");
        assert_eq!(record.field(Field::AppId), Some(""));
        assert_eq!(record.missing_required(), vec![Field::AppId, Field::InstallDir]);
    }

    #[test]
    fn render_then_parse_recovers_record() {
        let mut record = ManifestRecord::new();
        record.set("appid", "440");
        record.set("installdir", "Team Fortress 2");
        record.set("name", "Team Fortress 2");
        record.set("StateFlags", "4");
        record.set("BytesStaged", "0");
        record.set("ScheduledAutoUpdate", "0");

        let rendered = record.render();
        assert!(rendered.starts_with("\"AppState\"\n{\n\t\"appid\"\t\t\"440\"\n"));
        assert!(rendered.ends_with("\n}"));
        assert_eq!(ManifestRecord::parse(&rendered), record);
    }

    #[test]
    fn substitute_rewrites_only_targeted_values() {
        let output = substitute(
            STEAM_MANIFEST,
            &[
                (Field::AppId, "70"),
                (Field::InstallDir, "Half-Life"),
                (Field::BytesStaged, "0"),
            ],
        )
        .unwrap();
        let record = ManifestRecord::parse(&output);
        assert_eq!(record.field(Field::AppId), Some("70"));
        assert_eq!(record.field(Field::InstallDir), Some("Half-Life"));
        assert_eq!(record.field(Field::BytesStaged), Some("0"));
        assert_eq!(record.field(Field::BytesToStage), Some("34"));
        assert!(output.contains("\t\t\t\"manifest\"\t\t\"123\""));
        assert!(output.contains("\"language\"\t\t\"name\""));
    }

    #[test]
    fn substitute_rejects_missing_and_duplicate_targets() {
        let err = substitute("\"appid\" \"1\"", &[(Field::Name, "x")]).unwrap_err();
        assert_eq!(err, AcfError::MissingField { key: "name" });

        let err = substitute("\"name\" \"a\" \"name\" \"b\"", &[(Field::Name, "x")]).unwrap_err();
        assert_eq!(err, AcfError::DuplicateField { key: "name", count: 2 });
    }

    #[test]
    fn substitute_rejects_quotes_in_values() {
        let err = substitute(STEAM_MANIFEST, &[(Field::Name, "Say \"Hi\"")]).unwrap_err();
        assert!(matches!(err, AcfError::InvalidValue { key: "name", .. }));
    }

    #[test]
    fn manifest_names() {
        assert_eq!(manifest_file_name("220"), "appmanifest_220.acf");
        assert!(is_manifest_file_name("appmanifest_220.acf"));
        assert!(!is_manifest_file_name("appmanifest_220.acf.bak"));
        assert!(!is_manifest_file_name("libraryfolders.vdf"));
    }

    #[test]
    fn stamped_fields_exclude_scheduling_flags() {
        let stamped = stamped_fields();
        assert_eq!(stamped.len(), 9);
        assert!(!stamped.contains(&Field::ScheduledAutoUpdate));
    }

    #[test]
    fn string_pairs_walk_nested_sections() {
        let pairs = string_pairs(STEAM_MANIFEST);
        assert_eq!(pairs.first(), Some(&("appid", "220")));
        assert!(pairs.contains(&("manifest", "123")));
        assert!(pairs.contains(&("language", "name")));
        assert!(!pairs.iter().any(|(key, _)| *key == "InstalledDepots"));
    }
}
