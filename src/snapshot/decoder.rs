//! Streaming snapshot decoder.
//!
//! The snapshot is one JSON object whose keys are absolute node paths:
//!
//! ```json
//! {
//!   "/app": {"ephemeralOwner": 0, "data": "aGVsbG8=", "acls": [...]},
//!   "/app/config": {"ephemeralOwner": 0, "data": null, "acls": [...]}
//! }
//! ```
//!
//! The outer object is walked token by token straight off the reader, and each
//! node object is handed to `serde_json` on its own, so at most one node is in
//! memory at a time regardless of snapshot size. Records come out in stream
//! order through the [`Iterator`] impl; the first error ends the sequence.

use std::fmt;
use std::io::{BufRead, ErrorKind};
use std::iter::FusedIterator;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize as _;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use tracing::debug;

use crate::core::errors::{Result, ZnrError};
use crate::core::paths::validate_node_path;
use crate::snapshot::record::{NodeRecord, SnapshotAcl};
use crate::snapshot::{FIELD_ACLS, FIELD_DATA, FIELD_EPHEMERAL_OWNER, REQUIRED_NODE_FIELDS};

/// Location label used for errors outside any node object.
const TOP_LEVEL: &str = "snapshot top level";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing read yet; the opening brace is next.
    Start,
    /// Inside the top-level object, before the first entry.
    FirstEntry,
    /// Inside the top-level object, after at least one entry.
    NextEntry,
    /// Closing brace consumed, or an error was returned.
    Done,
}

/// Lazy, single-pass reader turning a snapshot stream into [`NodeRecord`]s.
pub struct SnapshotDecoder<R> {
    reader: R,
    state: State,
    decoded: u64,
}

impl<R: BufRead> SnapshotDecoder<R> {
    /// Wrap a buffered reader positioned at the start of the snapshot object.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::Start,
            decoded: 0,
        }
    }

    /// Number of records yielded so far.
    pub fn records_decoded(&self) -> u64 {
        self.decoded
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn next_record(&mut self) -> Result<Option<NodeRecord>> {
        match self.state {
            State::Done => return Ok(None),
            State::Start => {
                self.expect_byte(b'{', "'{' opening the snapshot object")?;
                self.state = State::FirstEntry;
            }
            State::FirstEntry | State::NextEntry => {}
        }

        match (self.state, self.peek_token()?) {
            (State::FirstEntry | State::NextEntry, Some(b'}')) => {
                self.bump();
                self.finish()?;
                return Ok(None);
            }
            (State::NextEntry, Some(b',')) => {
                self.bump();
                if self.peek_token()? != Some(b'"') {
                    return Err(self.unexpected(TOP_LEVEL, "node path string after ','"));
                }
            }
            (State::FirstEntry, Some(b'"')) => {}
            (State::FirstEntry, _) => {
                return Err(self.unexpected(TOP_LEVEL, "node path string or '}'"));
            }
            _ => return Err(self.unexpected(TOP_LEVEL, "',' or '}'")),
        }

        let path = String::deserialize(&mut serde_json::Deserializer::from_reader(
            &mut self.reader,
        ))
        .map_err(|err| json_error(TOP_LEVEL, err))?;
        validate_node_path(&path)?;

        self.expect_byte(b':', "':' after node path")
            .map_err(|err| relocate(err, &path))?;
        if self.peek_token()? != Some(b'{') {
            return Err(self.unexpected(&path, "'{' opening the node object"));
        }

        let fields = NodeSeed { path: &path }
            .deserialize(&mut serde_json::Deserializer::from_reader(&mut self.reader))
            .map_err(|err| json_error(&path, err))?;

        self.state = State::NextEntry;
        self.decoded += 1;
        Ok(Some(NodeRecord {
            path,
            ephemeral_owner: fields.ephemeral_owner,
            data: fields.data,
            acls: fields.acls,
        }))
    }

    /// After the closing brace only whitespace may follow.
    fn finish(&mut self) -> Result<()> {
        self.state = State::Done;
        if self.peek_token()?.is_some() {
            return Err(self.unexpected(TOP_LEVEL, "end of input after the snapshot object"));
        }
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(source) => return Err(ZnrError::Input { source }),
            }
        }
    }

    fn bump(&mut self) {
        self.reader.consume(1);
    }

    /// Skip whitespace and peek at the next significant byte.
    fn peek_token(&mut self) -> Result<Option<u8>> {
        loop {
            match self.peek()? {
                Some(b) if b.is_ascii_whitespace() => self.bump(),
                other => return Ok(other),
            }
        }
    }

    fn expect_byte(&mut self, expected: u8, what: &str) -> Result<()> {
        if self.peek_token()? == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected(TOP_LEVEL, what))
        }
    }

    fn unexpected(&mut self, location: &str, expected: &str) -> ZnrError {
        let found = match self.peek() {
            Ok(byte) => Token(byte).to_string(),
            Err(err) => return err,
        };
        ZnrError::malformed(location, format!("expected {expected}, found {found}"))
    }
}

impl<R: BufRead> Iterator for SnapshotDecoder<R> {
    type Item = Result<NodeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> FusedIterator for SnapshotDecoder<R> {}

/// Display helper naming the byte the decoder tripped over.
struct Token(Option<u8>);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("end of input"),
            Some(b) if b.is_ascii_graphic() => write!(f, "'{}'", char::from(b)),
            Some(b) => write!(f, "byte 0x{b:02x}"),
        }
    }
}

fn json_error(location: &str, err: serde_json::Error) -> ZnrError {
    if err.is_io() {
        ZnrError::Input {
            source: std::io::Error::from(err),
        }
    } else {
        ZnrError::malformed(location, err.to_string())
    }
}

fn relocate(err: ZnrError, location: &str) -> ZnrError {
    match err {
        ZnrError::MalformedSnapshot { details, .. } => ZnrError::malformed(location, details),
        other => other,
    }
}

// ──────────────────── node object ────────────────────

struct NodeFields {
    ephemeral_owner: i64,
    data: Option<Vec<u8>>,
    acls: Vec<SnapshotAcl>,
}

struct NodeSeed<'a> {
    path: &'a str,
}

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = NodeFields;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed<'_> {
    type Value = NodeFields;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a node object with ephemeralOwner, data and acls")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut ephemeral_owner: Option<i64> = None;
        let mut data: Option<Option<Vec<u8>>> = None;
        let mut acls: Option<Vec<SnapshotAcl>> = None;

        while let Some(field) = map.next_key::<String>()? {
            match field.as_str() {
                FIELD_EPHEMERAL_OWNER => ephemeral_owner = Some(map.next_value()?),
                FIELD_DATA => {
                    let encoded: Option<String> = map.next_value()?;
                    let decoded = encoded
                        .map(|text| BASE64_STANDARD.decode(text.as_bytes()))
                        .transpose()
                        .map_err(|err| {
                            <A::Error as de::Error>::custom(format_args!(
                                "invalid base64 in `data`: {err}"
                            ))
                        })?;
                    data = Some(decoded);
                }
                FIELD_ACLS => acls = Some(map.next_value()?),
                other => {
                    debug!(path = self.path, field = other, "ignored unknown node field");
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let present = [ephemeral_owner.is_some(), data.is_some(), acls.is_some()];
        let missing: Vec<&str> = REQUIRED_NODE_FIELDS
            .iter()
            .zip(present)
            .filter_map(|(name, seen)| (!seen).then_some(*name))
            .collect();
        match (ephemeral_owner, data, acls) {
            (Some(ephemeral_owner), Some(data), Some(acls)) => Ok(NodeFields {
                ephemeral_owner,
                data,
                acls,
            }),
            _ => Err(de::Error::custom(format_args!(
                "missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}
