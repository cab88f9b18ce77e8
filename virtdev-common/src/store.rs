//! INI configuration store.
//!
//! The device list is an INI file written by the external configuration
//! wizard. [`ConfigStore`] keeps an ordered in-memory index of the whole file
//! so that a save rewrites every section and key it did not touch verbatim.
//! Section and key lookups are case-insensitive; the original spelling is
//! kept for writing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use thiserror::Error;

/// Errors raised while loading or saving the configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write store '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse store: {0}")]
    Parse(String),
}

/// One named section of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl StoreSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Section name as written in the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a key, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First key of `keys` that is present.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Parse a key's value, falling back to `default` when the key is absent
    /// or does not parse.
    pub fn parse_or<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + fmt::Display,
    {
        match self.get(key).map(str::trim) {
            None | Some("") => default,
            Some(raw) => match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        section = %self.name,
                        key = %key,
                        value = %raw,
                        default = %default,
                        "Unparsable store value, using default"
                    );
                    default
                }
            },
        }
    }

    /// Insert or replace a key. Returns `true` when the stored value changed.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some((_, existing)) if *existing == value => false,
            Some((_, existing)) => {
                *existing = value;
                true
            }
            None => {
                self.entries.push((key.to_string(), value));
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Ordered, case-insensitive index of an INI file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    sections: Vec<StoreSection>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and index a store file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Index INI text. Values are taken literally: no quote or escape
    /// processing, matching what the wizard writes.
    pub fn parse(content: &str) -> Result<Self, StoreError> {
        let opt = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..Default::default()
        };
        let ini =
            Ini::load_from_str_opt(content, opt).map_err(|e| StoreError::Parse(e.to_string()))?;

        let mut store = ConfigStore::new();
        for (name, props) in ini.iter() {
            let name = name.unwrap_or_default();
            if name.is_empty() && props.is_empty() {
                continue;
            }
            let section = store.section_entry(name);
            for (key, value) in props.iter() {
                section.set(key, value);
            }
        }
        Ok(store)
    }

    /// Find a section, ignoring ASCII case.
    pub fn section(&self, name: &str) -> Option<&StoreSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sections(&self) -> impl Iterator<Item = &StoreSection> {
        self.sections.iter()
    }

    /// Convenience lookup of a single key.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Set `key` in `section`, creating the section if needed.
    ///
    /// Returns `true` when the index changed.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) -> bool {
        if self.section(section).is_none() {
            tracing::warn!(section = %section, "Creating missing store section");
        }
        self.section_entry(section).set(key, value)
    }

    fn section_entry(&mut self, name: &str) -> &mut StoreSection {
        let pos = match self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(pos) => pos,
            None => {
                self.sections.push(StoreSection::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos]
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for section in &self.sections {
            let name = (!section.name.is_empty()).then(|| section.name.clone());
            ini.with_section(name.clone());
            for (k, v) in section.iter() {
                ini.set_to(name.clone(), k.to_string(), v.to_string());
            }
        }
        ini
    }

    /// Write the whole store to `<path>.tmp` and rename it over `path`.
    pub fn save_atomic(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        self.to_ini()
            .write_to_file_opt(&tmp, write_option())
            .map_err(|source| StoreError::Write {
                path: tmp.clone(),
                source,
            })?;

        std::fs::rename(&tmp, path).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn write_option() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Nothing,
        kv_separator: " = ",
        ..Default::default()
    }
}
