//! Restore engine: drives one snapshot stream into one store session.
//!
//! The run is single-threaded and strictly ordered. Each record is decoded,
//! filtered, pushed onto the ancestor chain, and, if kept, applied (its
//! ancestors first) before the next record is read. The first decode or store
//! error aborts the run and leaves whatever was already written in place.

use std::io::BufRead;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::core::config::RestoreConfig;
use crate::core::errors::{Result, ZnrError};
use crate::core::paths::ROOT;
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::restore::filter::{PathFilter, SkipReason};
use crate::restore::materializer::PathMaterializer;
use crate::restore::restorer::{NodeOutcome, NodeRestorer};
use crate::restore::tracker::AncestorChain;
use crate::snapshot::decoder::SnapshotDecoder;
use crate::snapshot::record::NodeRecord;
use crate::store::{Credentials, Store};

/// Counters describing a finished (or aborted) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreStats {
    pub records: u64,
    pub created: u64,
    pub overwritten: u64,
    pub conflicts_skipped: u64,
    pub placeholders_filled: u64,
    pub skipped_ephemeral: u64,
    pub skipped_outside_root: u64,
    pub skipped_excluded: u64,
    pub skipped_not_included: u64,
    /// Ancestor paths created bare because no kept record covered them.
    pub paths_materialized: u64,
    /// Ancestor creates that found the node already made by someone else.
    pub races_tolerated: u64,
    pub max_depth: usize,
    pub elapsed_ms: u64,
}

impl RestoreStats {
    /// Records that reached the store.
    pub const fn applied(&self) -> u64 {
        self.created + self.overwritten + self.conflicts_skipped + self.placeholders_filled
    }

    /// Records filtered out before any store call.
    pub const fn skipped(&self) -> u64 {
        self.skipped_ephemeral
            + self.skipped_outside_root
            + self.skipped_excluded
            + self.skipped_not_included
    }

    fn count_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Ephemeral => self.skipped_ephemeral += 1,
            SkipReason::OutsideRoot => self.skipped_outside_root += 1,
            SkipReason::Excluded => self.skipped_excluded += 1,
            SkipReason::NotIncluded => self.skipped_not_included += 1,
        }
    }

    fn count_outcome(&mut self, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Created => self.created += 1,
            NodeOutcome::Overwritten => self.overwritten += 1,
            NodeOutcome::ConflictSkipped => self.conflicts_skipped += 1,
            NodeOutcome::PlaceholderFilled => self.placeholders_filled += 1,
        }
    }
}

/// Streaming restore of a snapshot into a [`Store`].
pub struct RestoreEngine {
    filter: PathFilter,
    restorer: NodeRestorer,
    activity: Option<JsonlWriter>,
    config_hash: Option<String>,
}

impl RestoreEngine {
    /// Build an engine from the `[restore]` configuration section.
    pub fn new(config: &RestoreConfig) -> Result<Self> {
        Ok(Self {
            filter: PathFilter::new(&config.root_path, &config.include, &config.exclude)?,
            restorer: NodeRestorer::new(config.overwrite_existing, config.no_acls),
            activity: None,
            config_hash: None,
        })
    }

    /// Also record every node outcome to a JSONL activity log.
    #[must_use]
    pub fn with_activity_log(mut self, writer: JsonlWriter) -> Self {
        self.activity = Some(writer);
        self
    }

    /// Stamp the run-start activity line with a configuration fingerprint.
    #[must_use]
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Run a whole session: authenticate, restore the stream, close the store.
    ///
    /// The store is closed on every path out; a restore error takes precedence
    /// over a close error. The reader is consumed and dropped before returning.
    pub fn run<R, S>(
        &mut self,
        reader: R,
        store: &mut S,
        credentials: Option<&Credentials>,
    ) -> Result<RestoreStats>
    where
        R: BufRead,
        S: Store + ?Sized,
    {
        let outcome = self.session(reader, store, credentials);
        let closed = store
            .close()
            .map_err(|err| ZnrError::store("close", ROOT, err));

        match (outcome, closed) {
            (Ok(stats), Ok(())) => Ok(stats),
            (Ok(_), Err(err)) | (Err(err), _) => Err(err),
        }
    }

    fn session<R, S>(
        &mut self,
        reader: R,
        store: &mut S,
        credentials: Option<&Credentials>,
    ) -> Result<RestoreStats>
    where
        R: BufRead,
        S: Store + ?Sized,
    {
        if let Some(credentials) = credentials {
            store
                .authenticate(Credentials::DIGEST_SCHEME, &credentials.digest_auth())
                .map_err(|err| ZnrError::store("authenticate", ROOT, err))?;
        }
        self.apply(reader, store)
    }

    /// Restore every record from `reader` into `store` without touching the
    /// session lifecycle.
    pub fn apply<R, S>(&mut self, reader: R, store: &mut S) -> Result<RestoreStats>
    where
        R: BufRead,
        S: Store + ?Sized,
    {
        let started = Instant::now();
        let mut stats = RestoreStats::default();
        let mut chain = AncestorChain::new();
        let mut materializer = PathMaterializer::new();

        info!(root = self.filter.root(), "starting restore");
        let mut entry = LogEntry::new(EventType::RestoreStart, Severity::Info);
        entry.details = Some(match &self.config_hash {
            Some(hash) => format!("root_path={} config_hash={hash}", self.filter.root()),
            None => format!("root_path={}", self.filter.root()),
        });
        self.log(&entry);

        let result = self.apply_records(
            SnapshotDecoder::new(reader),
            store,
            &mut chain,
            &mut materializer,
            &mut stats,
        );

        stats.paths_materialized = materializer.created_count();
        stats.races_tolerated = materializer.raced_count();
        stats.max_depth = chain.max_depth();
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                info!(
                    records = stats.records,
                    created = stats.created,
                    overwritten = stats.overwritten,
                    conflicts = stats.conflicts_skipped,
                    skipped = stats.skipped(),
                    "restore finished"
                );
                let mut entry = LogEntry::new(EventType::RestoreFinish, Severity::Info);
                entry.duration_ms = Some(stats.elapsed_ms);
                entry.summary = serde_json::to_value(&stats).ok();
                self.log(&entry);
                self.flush_log();
                Ok(stats)
            }
            Err(err) => {
                error!(records = stats.records, error = %err, "restore aborted");
                let mut entry = LogEntry::new(EventType::RestoreAbort, Severity::Error);
                entry.duration_ms = Some(stats.elapsed_ms);
                entry.error_code = Some(err.code().to_string());
                entry.error_message = Some(err.to_string());
                entry.summary = serde_json::to_value(&stats).ok();
                self.log(&entry);
                self.flush_log();
                Err(err)
            }
        }
    }

    fn apply_records<R, S>(
        &mut self,
        records: SnapshotDecoder<R>,
        store: &mut S,
        chain: &mut AncestorChain,
        materializer: &mut PathMaterializer,
        stats: &mut RestoreStats,
    ) -> Result<()>
    where
        R: BufRead,
        S: Store + ?Sized,
    {
        for item in records {
            let record = item?;
            stats.records += 1;
            let skip = self.filter.check(&record);
            let (ancestors, current) = chain.push(record, skip.is_none());

            if let Some(reason) = skip {
                info!(path = %current.record.path, %reason, "skipping node");
                stats.count_skip(reason);
                let mut entry =
                    LogEntry::for_node(EventType::NodeSkipped, Severity::Info, &current.record.path);
                entry.reason = Some(reason.as_str().to_string());
                self.log(&entry);
                continue;
            }

            // Skipped ancestors on the chain still have to exist for this
            // record; they are created bare, never from their own record.
            for ancestor in ancestors {
                materializer.ensure(store, &ancestor.record.path)?;
            }

            let outcome = self.restorer.restore(store, materializer, &current.record);
            for path in materializer.take_fresh() {
                self.log(&LogEntry::for_node(
                    EventType::PathMaterialized,
                    Severity::Info,
                    &path,
                ));
            }
            let outcome = outcome?;
            stats.count_outcome(outcome);
            self.log_outcome(outcome, &current.record);
        }
        Ok(())
    }

    fn log_outcome(&mut self, outcome: NodeOutcome, record: &NodeRecord) {
        let (event, severity) = match outcome {
            NodeOutcome::Created => (EventType::NodeCreated, Severity::Info),
            NodeOutcome::Overwritten => (EventType::NodeOverwritten, Severity::Info),
            NodeOutcome::ConflictSkipped => (EventType::ConflictSkipped, Severity::Warning),
            NodeOutcome::PlaceholderFilled => (EventType::PlaceholderFilled, Severity::Info),
        };
        let mut entry = LogEntry::for_node(event, severity, &record.path);
        if outcome != NodeOutcome::ConflictSkipped {
            entry.bytes = Some(record.data_len() as u64);
        }
        self.log(&entry);
    }

    fn log(&mut self, entry: &LogEntry) {
        if let Some(writer) = self.activity.as_mut() {
            writer.write_entry(entry);
        }
    }

    fn flush_log(&mut self) {
        if let Some(writer) = self.activity.as_mut() {
            writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreOp};

    const OPEN: &str = r#"[{"scheme":"world","id":"anyone","perms":31}]"#;

    fn node(owner: i64, data: &str) -> String {
        format!(r#"{{"ephemeralOwner":{owner},"data":{data},"acls":{OPEN}}}"#)
    }

    fn snapshot(entries: &[(&str, String)]) -> String {
        let body: Vec<String> = entries
            .iter()
            .map(|(path, value)| format!("{path:?}: {value}"))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    fn engine(config: RestoreConfig) -> RestoreEngine {
        RestoreEngine::new(&config).unwrap()
    }

    #[test]
    fn restores_nodes_and_implied_ancestors() {
        let input = snapshot(&[
            ("/a/b/c", node(0, r#""Yw==""#)),
            ("/a/b/d", node(0, "null")),
        ]);
        let mut store = MemoryStore::new();
        let stats = engine(RestoreConfig::default())
            .run(input.as_bytes(), &mut store, None)
            .unwrap();

        assert!(store.contains("/a"));
        assert!(store.contains("/a/b"));
        assert_eq!(store.get("/a/b/c").unwrap().data.as_deref(), Some(&b"c"[..]));
        assert_eq!(stats.records, 2);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.paths_materialized, 2);
        assert!(store.is_closed());
    }

    #[test]
    fn ephemeral_record_causes_no_mutation() {
        let input = snapshot(&[("/a", node(0, "null")), ("/a/lock", node(77, r#""eA==""#))]);
        let mut store = MemoryStore::new();
        let stats = engine(RestoreConfig::default())
            .run(input.as_bytes(), &mut store, None)
            .unwrap();
        assert_eq!(store.touches_of("/a/lock"), 0);
        assert!(!store.contains("/a/lock"));
        assert_eq!(stats.skipped_ephemeral, 1);
    }

    #[test]
    fn root_filter_blocks_outside_paths() {
        let input = snapshot(&[("/other", node(0, "null")), ("/keep/x", node(0, "null"))]);
        let config = RestoreConfig {
            root_path: "/keep".to_string(),
            ..RestoreConfig::default()
        };
        let mut store = MemoryStore::new();
        let stats = engine(config).run(input.as_bytes(), &mut store, None).unwrap();
        assert_eq!(store.touches_of("/other"), 0);
        assert!(store.contains("/keep/x"));
        assert_eq!(stats.skipped_outside_root, 1);
    }

    #[test]
    fn root_and_exclusion_example_creates_only_a() {
        let input = snapshot(&[("/a", node(0, "null")), ("/a/b", node(0, "null"))]);
        let config = RestoreConfig {
            root_path: "/a".to_string(),
            exclude: vec!["/a/b.*".to_string()],
            ..RestoreConfig::default()
        };
        let mut store = MemoryStore::new();
        engine(config).run(input.as_bytes(), &mut store, None).unwrap();
        assert_eq!(store.paths().collect::<Vec<_>>(), ["/", "/a"]);
    }

    #[test]
    fn skipped_ancestor_is_materialized_bare() {
        let input = snapshot(&[
            ("/a", node(0, r#""c2VjcmV0""#)),
            ("/a/b", node(0, r#""Yg==""#)),
        ]);
        let config = RestoreConfig {
            exclude: vec!["/a".to_string()],
            ..RestoreConfig::default()
        };
        let mut store = MemoryStore::new();
        let stats = engine(config).run(input.as_bytes(), &mut store, None).unwrap();
        assert_eq!(store.get("/a").unwrap().data, None);
        assert_eq!(store.get("/a/b").unwrap().data.as_deref(), Some(&b"b"[..]));
        assert_eq!(stats.skipped_excluded, 1);
        assert_eq!(stats.paths_materialized, 1);
    }

    #[test]
    fn child_before_parent_fills_placeholder() {
        let input = snapshot(&[("/a/b", node(0, "null")), ("/a", node(0, r#""cA==""#))]);
        let mut store = MemoryStore::new();
        let stats = engine(RestoreConfig::default())
            .run(input.as_bytes(), &mut store, None)
            .unwrap();
        assert_eq!(store.get("/a").unwrap().data.as_deref(), Some(&b"p"[..]));
        assert_eq!(stats.placeholders_filled, 1);
        assert_eq!(stats.conflicts_skipped, 0);
    }

    #[test]
    fn shared_ancestor_is_checked_once() {
        let input = snapshot(&[
            ("/a/x", node(0, "null")),
            ("/a/y", node(0, "null")),
            ("/a/z", node(0, "null")),
        ]);
        let mut store = MemoryStore::new();
        engine(RestoreConfig::default())
            .apply(input.as_bytes(), &mut store)
            .unwrap();
        assert_eq!(store.touches_of("/a"), 2, "one exists + one create");
    }

    #[test]
    fn malformed_input_aborts_but_keeps_earlier_writes_and_closes() {
        let input = format!(r#"{{"/a": {}, "/b": {{"data": null}}}}"#, node(0, "null"));
        let mut store = MemoryStore::new();
        let err = engine(RestoreConfig::default())
            .run(input.as_bytes(), &mut store, None)
            .unwrap_err();
        assert!(matches!(err, ZnrError::MalformedSnapshot { .. }));
        assert!(store.contains("/a"));
        assert!(store.is_closed());
    }

    #[test]
    fn store_failure_aborts_and_closes() {
        let input = snapshot(&[("/a", node(0, "null")), ("/b", node(0, "null"))]);
        let mut store = MemoryStore::new();
        store.fail_on("/a");
        let err = engine(RestoreConfig::default())
            .run(input.as_bytes(), &mut store, None)
            .unwrap_err();
        assert!(matches!(err, ZnrError::Store { .. }));
        assert_eq!(store.touches_of("/b"), 0);
        assert!(store.is_closed());
    }

    #[test]
    fn credentials_are_sent_as_digest() {
        let mut store = MemoryStore::new();
        let credentials = Credentials {
            user: "admin".to_string(),
            password: "pw".to_string(),
        };
        engine(RestoreConfig::default())
            .run(&b"{}"[..], &mut store, Some(&credentials))
            .unwrap();
        assert_eq!(
            store.auth_info(),
            [("digest".to_string(), b"admin:pw".to_vec())]
        );
        assert_eq!(store.journal().first(), Some(&StoreOp::Authenticate("digest".to_string())));
    }

    #[test]
    fn activity_log_records_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("activity.jsonl");
        let input = snapshot(&[("/a", node(0, "null")), ("/e", node(5, "null"))]);
        let mut store = MemoryStore::new();
        let writer = JsonlWriter::open(crate::logger::jsonl::JsonlConfig::new(&log_path));
        let mut engine = engine(RestoreConfig::default()).with_activity_log(writer);
        engine.run(input.as_bytes(), &mut store, None).unwrap();
        drop(engine);

        let events: Vec<String> = std::fs::read_to_string(&log_path)
            .unwrap()
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            events,
            ["restore_start", "node_created", "node_skipped", "restore_finish"]
        );
    }

    #[test]
    fn activity_log_names_materialized_paths() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("activity.jsonl");
        let input = snapshot(&[("/a/b", node(0, "null"))]);
        let writer = JsonlWriter::open(crate::logger::jsonl::JsonlConfig::new(&log_path));
        let mut engine = engine(RestoreConfig::default()).with_activity_log(writer);
        engine.apply(input.as_bytes(), &mut MemoryStore::new()).unwrap();
        drop(engine);

        let raw = std::fs::read_to_string(&log_path).unwrap();
        let materialized: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .filter(|value| value["event"] == "path_materialized")
            .collect();
        assert_eq!(materialized.len(), 1);
        assert_eq!(materialized[0]["path"], "/a");
    }
}
