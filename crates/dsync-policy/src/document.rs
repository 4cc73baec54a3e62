//! Access documents (bucket policies)
//!
//! Every statement is stored as the raw JSON text it was read from. Only the
//! `Sid` is decoded, which is all the merge needs. Writing a document back
//! therefore reproduces foreign statements exactly as they were received.

use crate::error::PolicyError;
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use std::collections::HashSet;

/// Policy language version used for documents this tool creates
pub const POLICY_VERSION: &str = "2012-10-17";

const VERSION_KEY: &str = "Version";
const STATEMENT_KEY: &str = "Statement";

#[derive(Deserialize)]
struct SidProbe {
    #[serde(rename = "Sid", default)]
    sid: Option<String>,
}

/// One allow/deny rule of an access document
#[derive(Debug, Clone)]
pub struct Statement {
    sid: Option<String>,
    raw: Box<RawValue>,
}

impl Statement {
    /// Wrap raw statement JSON found at position `index` of a document
    ///
    /// # Errors
    /// Returns error if the JSON is not an object or its `Sid` is not a string
    pub fn from_raw(raw: Box<RawValue>, index: usize) -> Result<Self, PolicyError> {
        if !raw.get().trim_start().starts_with('{') {
            return Err(PolicyError::StatementNotObject { index });
        }
        let probe: SidProbe = serde_json::from_str(raw.get())
            .map_err(|source| PolicyError::InvalidStatement { index, source })?;
        Ok(Self {
            sid: probe.sid,
            raw,
        })
    }

    /// Build a statement from a JSON value
    ///
    /// # Errors
    /// Returns error if the value is not an object or cannot be serialized
    pub fn from_value(value: &serde_json::Value) -> Result<Self, PolicyError> {
        let raw = serde_json::value::to_raw_value(value).map_err(PolicyError::Serialization)?;
        Self::from_raw(raw, 0)
    }

    /// Statement id, if any
    #[inline]
    #[must_use]
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Statement JSON exactly as stored
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        self.raw.get()
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.raw.get() == other.raw.get()
    }
}

impl Eq for Statement {}

impl Serialize for Statement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// A bucket policy: version tag plus an ordered list of statements
///
/// Top-level keys other than `Version` and `Statement` (such as `Id`) are
/// carried through untouched.
#[derive(Debug, Clone)]
pub struct AccessDocument {
    version: Option<String>,
    statements: Vec<Statement>,
    extra: IndexMap<String, Box<RawValue>>,
}

impl AccessDocument {
    /// Empty document with the current policy version
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: Some(POLICY_VERSION.to_string()),
            statements: Vec::new(),
            extra: IndexMap::new(),
        }
    }

    /// Parse a document from policy JSON
    ///
    /// A single statement object (instead of an array) is accepted.
    ///
    /// # Errors
    /// - `PolicyError::Malformed` if the text is not a JSON object
    /// - `PolicyError::StatementNotObject` / `InvalidStatement` for bad statements
    /// - `PolicyError::DuplicateSid` if two statements share an id
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let fields: IndexMap<String, Box<RawValue>> =
            serde_json::from_str(text).map_err(PolicyError::Malformed)?;

        let mut document = Self {
            version: None,
            statements: Vec::new(),
            extra: IndexMap::new(),
        };

        for (key, raw) in fields {
            match key.as_str() {
                VERSION_KEY => {
                    let version: String =
                        serde_json::from_str(raw.get()).map_err(PolicyError::Malformed)?;
                    document.version = Some(version);
                }
                STATEMENT_KEY => document.statements = parse_statements(raw)?,
                _ => {
                    document.extra.insert(key, raw);
                }
            }
        }

        document.check_unique_sids()?;
        Ok(document)
    }

    /// Serialize to compact policy JSON
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, PolicyError> {
        serde_json::to_string(self).map_err(PolicyError::Serialization)
    }

    /// Version tag, if the document carries one
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Statements in document order
    #[inline]
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Number of statements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// True if the document has no statements
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Find a statement by id
    #[must_use]
    pub fn statement(&self, sid: &str) -> Option<&Statement> {
        self.statements.iter().find(|s| s.sid() == Some(sid))
    }

    /// Statement ids in document order (statements without an id are skipped)
    pub fn sids(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().filter_map(Statement::sid)
    }

    pub(crate) fn retain_statements(&mut self, keep: impl FnMut(&Statement) -> bool) {
        self.statements.retain(keep);
    }

    pub(crate) fn push_statement(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub(crate) fn check_unique_sids(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for sid in self.sids() {
            if !seen.insert(sid) {
                return Err(PolicyError::DuplicateSid(sid.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for AccessDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for AccessDocument {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.statements == other.statements
            && self.extra.len() == other.extra.len()
            && self
                .extra
                .iter()
                .zip(other.extra.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.get() == vb.get())
    }
}

impl Eq for AccessDocument {}

impl Serialize for AccessDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(version) = &self.version {
            map.serialize_entry(VERSION_KEY, version)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(STATEMENT_KEY, &self.statements)?;
        map.end()
    }
}

fn parse_statements(raw: Box<RawValue>) -> Result<Vec<Statement>, PolicyError> {
    if raw.get().trim_start().starts_with('[') {
        let items: Vec<Box<RawValue>> =
            serde_json::from_str(raw.get()).map_err(PolicyError::Malformed)?;
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Statement::from_raw(item, index))
            .collect()
    } else {
        Ok(vec![Statement::from_raw(raw, 0)?])
    }
}
