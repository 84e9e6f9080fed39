//! Decoding collaborator for downloaded artifacts
//!
//! The pipeline hands the downloaded bytes to a [`ModelDecoder`] and forwards
//! whatever model it produces to subscribers. Hosts with a real viewer plug in
//! their own loader; [`StepModelDecoder`] is a lightweight built-in that
//! validates an IFC (ISO 10303-21, "STEP") file and summarises its contents.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::spawn_blocking;

/// Turns downloaded artifact bytes into a host-specific model
///
/// Implementations report unparseable input as [`Error::Decode`].
#[async_trait]
pub trait ModelDecoder: Send + Sync + 'static {
    /// The decoded model handed to subscribers
    type Model: Send + Sync + 'static;

    /// Decode one artifact
    async fn decode(&self, bytes: Bytes) -> Result<Self::Model>;
}

/// First line of every exchange-structure file
const STEP_MAGIC: &str = "ISO-10303-21;";
/// Last statement of every exchange-structure file
const STEP_TRAILER: &str = "END-ISO-10303-21;";

/// Summary of a decoded IFC exchange file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IfcModel {
    /// Schema named in the header's `FILE_SCHEMA` (e.g. `IFC2X3`, `IFC4`)
    pub schema: String,
    /// Number of `#id=TYPE(...)` instance statements
    pub entity_count: usize,
    /// Instance count per entity type, keyed by upper-case type name
    pub entity_types: BTreeMap<String, usize>,
    /// The raw file, for hosts that re-parse it themselves
    pub bytes: Bytes,
}

impl IfcModel {
    /// How many instances of `kind` (e.g. `IFCWALL`) the file declares
    pub fn count_of(&self, kind: &str) -> usize {
        self.entity_types
            .get(&kind.to_ascii_uppercase())
            .copied()
            .unwrap_or(0)
    }
}

struct StepPatterns {
    schema: Regex,
    instance: Regex,
}

/// Built-in decoder for IFC files in the STEP physical-file encoding
#[derive(Clone)]
pub struct StepModelDecoder {
    patterns: Arc<StepPatterns>,
}

impl StepModelDecoder {
    /// Compile the statement patterns
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Other(format!("invalid STEP pattern: {e}")))
        };
        Ok(Self {
            patterns: Arc::new(StepPatterns {
                schema: compile(r"FILE_SCHEMA\s*\(\s*\(\s*'([^']+)'")?,
                instance: compile(r"^#(\d+)\s*=\s*([A-Za-z0-9_]+)\s*\((.*)\)\s*;$")?,
            }),
        })
    }
}

#[async_trait]
impl ModelDecoder for StepModelDecoder {
    type Model = IfcModel;

    async fn decode(&self, bytes: Bytes) -> Result<IfcModel> {
        let patterns = Arc::clone(&self.patterns);
        spawn_blocking(move || decode_step(&patterns, bytes))
            .await
            .map_err(|e| Error::Decode(format!("decoder task panicked: {e}")))?
    }
}

fn decode_step(patterns: &StepPatterns, bytes: Bytes) -> Result<IfcModel> {
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| Error::Decode(format!("artifact is not text: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let trimmed = text.trim();
    if !trimmed.starts_with(STEP_MAGIC) {
        return Err(Error::Decode(
            "artifact is not an ISO-10303-21 exchange file".to_string(),
        ));
    }
    if !trimmed.ends_with(STEP_TRAILER) {
        return Err(Error::Decode(
            "exchange file is truncated (no END-ISO-10303-21)".to_string(),
        ));
    }

    let schema = patterns
        .schema
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Decode("header has no FILE_SCHEMA".to_string()))?;

    let mut entity_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut entity_count = 0;
    for_each_statement(text, |statement| {
        if let Some(kind) = patterns.instance.captures(statement).and_then(|cap| cap.get(2)) {
            entity_count += 1;
            *entity_types
                .entry(kind.as_str().to_ascii_uppercase())
                .or_default() += 1;
        }
    });

    tracing::debug!(schema = %schema, entity_count, "Exchange file decoded");
    Ok(IfcModel {
        schema,
        entity_count,
        entity_types,
        bytes,
    })
}

/// Feed `f` each `;`-terminated statement, joining statements that span lines
fn for_each_statement(text: &str, mut f: impl FnMut(&str)) {
    let mut buf = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with("/*") {
            continue;
        }
        buf.push_str(line);
        if line.ends_with(';') {
            f(&buf);
            buf.clear();
        } else {
            buf.push(' ');
        }
    }
}
