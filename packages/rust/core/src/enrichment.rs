//! Optional enrichment and language-detection collaborators.
//!
//! The pipeline never depends on either being present. Both are injected as
//! trait objects; a missing collaborator or a failed call leaves the segment
//! as it was (or `"und"` for the title language) and is only logged.
//!
//! Two enrichers ship with the crate:
//! - [`RulesEnricher`]: local tag rules loaded from `enrichment_rules.json`
//! - [`BridgeEnricher`]: an external process speaking JSON lines on
//!   stdin/stdout, so model-backed services live outside this workspace
//!
//! [`WhatlangDetector`] is the bundled language detector.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use cultureseg_shared::{Confidence, Result, Segment, SegmenterError, UNDETERMINED_LANG};

/// Character budget for content handed to an external enricher.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 6_000;

/// Default wait for one bridge message.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(120);

/// How long a bridge gets to exit after `shutdown` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Fields an enrichment collaborator may supply. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_quality_score: Option<Confidence>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.tags.is_none() && self.summary_quality_score.is_none()
    }
}

/// Produces summaries, tags, and quality scores for a segment.
pub trait Enricher: Send + Sync {
    /// Short name for logs and session records.
    fn name(&self) -> &str;

    fn enrich(&self, title: &str, content: &str) -> Result<Enrichment>;
}

/// Detects the language of a title.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<String>;
}

/// Detector that never knows the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct UndeterminedLanguage;

impl LanguageDetector for UndeterminedLanguage {
    fn detect(&self, _text: &str) -> Result<String> {
        Ok(UNDETERMINED_LANG.to_string())
    }
}

/// Trigram-based detector answering ISO 639-3 codes (`eng`, `deu`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String> {
        let info = whatlang::detect(text).ok_or_else(|| {
            SegmenterError::Enrichment(format!("no language detected for {text:?}"))
        })?;
        debug!(
            lang = info.lang().code(),
            confidence = info.confidence(),
            reliable = info.is_reliable(),
            "title language"
        );
        Ok(info.lang().code().to_string())
    }
}

// ---------------------------------------------------------------------------
// Call-site guards
// ---------------------------------------------------------------------------

/// Run `enricher` on the segment, copying over whatever it supplied.
///
/// Returns `true` when the enricher answered. Errors are logged and
/// swallowed; the segment is then left untouched.
pub fn apply_enrichment(segment: &mut Segment, enricher: Option<&dyn Enricher>) -> bool {
    let Some(enricher) = enricher else {
        return false;
    };

    match enricher.enrich(&segment.title, &segment.content) {
        Ok(enrichment) => {
            if let Some(summary) = enrichment.summary {
                segment.summary = Some(summary);
            }
            if let Some(tags) = enrichment.tags {
                segment.tags = Some(tags);
            }
            if let Some(score) = enrichment.summary_quality_score {
                segment.summary_quality_score = Some(score);
            }
            true
        }
        Err(e) => {
            warn!(
                enricher = enricher.name(),
                title = %segment.title,
                error = %e,
                "enrichment failed, keeping segment as is"
            );
            false
        }
    }
}

/// Set `title_lang`, falling back to `"und"` on any failure.
pub fn apply_language(segment: &mut Segment, detector: Option<&dyn LanguageDetector>) {
    let lang = match detector.map(|d| d.detect(&segment.title)) {
        Some(Ok(lang)) if !lang.trim().is_empty() => lang,
        Some(Err(e)) => {
            debug!(title = %segment.title, error = %e, "language detection failed");
            UNDETERMINED_LANG.to_string()
        }
        _ => UNDETERMINED_LANG.to_string(),
    };
    segment.title_lang = Some(lang);
}

// ---------------------------------------------------------------------------
// Rules enricher
// ---------------------------------------------------------------------------

/// One entry of `enrichment_rules.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRule {
    /// Case-insensitive substring looked up in the segment title.
    #[serde(rename = "match")]
    pub pattern: String,
    /// Tags contributed on a match; a comma-separated string is accepted too.
    #[serde(default, deserialize_with = "tags_list")]
    pub tags: Vec<String>,
}

fn tags_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Csv(String),
    }

    let tags = match Tags::deserialize(deserializer)? {
        Tags::List(list) => list,
        Tags::Csv(s) => s.split(',').map(str::to_string).collect(),
    };
    Ok(tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

/// Tags segments from a static list of title rules.
#[derive(Debug, Clone, Default)]
pub struct RulesEnricher {
    rules: Vec<EnrichmentRule>,
}

impl RulesEnricher {
    pub fn new(rules: Vec<EnrichmentRule>) -> Self {
        Self { rules }
    }

    /// Load rules from a JSON array on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SegmenterError::io(path, e))?;
        let rules: Vec<EnrichmentRule> = serde_json::from_str(&raw).map_err(|e| {
            SegmenterError::parse(format!("invalid rules file {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), rules = rules.len(), "loaded enrichment rules");
        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Enricher for RulesEnricher {
    fn name(&self) -> &str {
        "rules"
    }

    fn enrich(&self, title: &str, _content: &str) -> Result<Enrichment> {
        let title = title.to_uppercase();
        let mut tags: Vec<String> = Vec::new();

        for rule in &self.rules {
            if rule.pattern.trim().is_empty() || !title.contains(&rule.pattern.to_uppercase()) {
                continue;
            }
            for tag in &rule.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        Ok(Enrichment {
            tags: (!tags.is_empty()).then_some(tags),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Bridge protocol
// ---------------------------------------------------------------------------

/// Payload of one enrichment request.
#[derive(Debug, Clone, Serialize)]
struct EnrichTask<'a> {
    title: &'a str,
    content: String,
}

/// Request message sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum RequestMessage<'a> {
    #[serde(rename = "enrich")]
    Enrich { id: String, task: EnrichTask<'a> },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result { id: String, result: Enrichment },
    #[serde(rename = "error")]
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

/// How to launch an external enrichment process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory for the child; inherits ours when `None`.
    pub working_dir: Option<PathBuf>,
    /// Content longer than this is cut before sending.
    pub max_content_chars: usize,
    /// Longest wait for any single bridge message, the ready signal included.
    pub timeout: Duration,
}

impl BridgeConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
            timeout: DEFAULT_BRIDGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Answer to one enrichment request on a healthy stream.
enum Reply {
    Enriched(Enrichment),
    /// The worker reported a failure for this request; the stream is still in sync.
    Rejected(String),
}

/// Handle to the spawned bridge subprocess.
///
/// Stdout is drained by a reader thread so every read can carry a deadline.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    timeout: Duration,
    request_counter: u64,
}

impl BridgeHandle {
    fn spawn(config: &BridgeConfig) -> Result<Self> {
        info!(cmd = %config.command, args = ?config.args, "spawning enrichment bridge");

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()); // Bridge logs go to parent stderr
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            SegmenterError::Enrichment(format!(
                "failed to spawn bridge: {e}. Is `{}` installed?",
                config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SegmenterError::Enrichment("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SegmenterError::Enrichment("failed to capture bridge stdout".into()))?;

        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut handle = Self {
            child,
            stdin,
            lines,
            timeout: config.timeout,
            request_counter: 0,
        };
        handle.wait_for_ready()?;
        Ok(handle)
    }

    fn read_message(&mut self) -> Result<ResponseMessage> {
        let line = match self.lines.recv_timeout(self.timeout) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                return Err(SegmenterError::Enrichment(format!("bridge read error: {e}")));
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(SegmenterError::Enrichment(format!(
                    "bridge did not answer within {}s",
                    self.timeout.as_secs_f64()
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SegmenterError::Enrichment(
                    "bridge closed stdout unexpectedly".into(),
                ));
            }
        };

        serde_json::from_str(line.trim()).map_err(|e| {
            let shown: String = line.chars().take(200).collect();
            SegmenterError::Enrichment(format!("invalid bridge message: {e} (got: {shown})"))
        })
    }

    fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message()? {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(())
            }
            other => Err(SegmenterError::Enrichment(format!(
                "expected ready message, got: {other:?}"
            ))),
        }
    }

    fn send(&mut self, message: &RequestMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(message).map_err(|e| {
            SegmenterError::Enrichment(format!("failed to serialize request: {e}"))
        })?;
        writeln!(self.stdin, "{json}").map_err(|e| {
            SegmenterError::Enrichment(format!("failed to write to bridge stdin: {e}"))
        })?;
        self.stdin.flush().map_err(|e| {
            SegmenterError::Enrichment(format!("failed to flush bridge stdin: {e}"))
        })
    }

    /// Errors mean the stream can no longer be trusted.
    fn enrich(&mut self, title: &str, content: String) -> Result<Reply> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        self.send(&RequestMessage::Enrich {
            id: id.clone(),
            task: EnrichTask { title, content },
        })?;

        match self.read_message()? {
            ResponseMessage::Result { id: resp_id, result } if resp_id == id => {
                Ok(Reply::Enriched(result))
            }
            ResponseMessage::Result { id: resp_id, .. } => Err(SegmenterError::Enrichment(
                format!("bridge answered {resp_id}, expected {id}"),
            )),
            ResponseMessage::Error { error, .. } => Ok(Reply::Rejected(error)),
            ResponseMessage::Ready => Err(SegmenterError::Enrichment(
                "unexpected ready message during enrichment".into(),
            )),
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        let _ = self.send(&RequestMessage::Shutdown);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!(?status, "bridge exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("bridge wait error: {e}");
                    break;
                }
            }
        }

        warn!("bridge ignored shutdown, killing it");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Enricher backed by an external JSON-lines process.
///
/// Requests are serialized through a mutex; one bridge process serves the
/// run at a time. A timeout or protocol error retires that process and the
/// next request starts a fresh one.
pub struct BridgeEnricher {
    config: BridgeConfig,
    handle: Mutex<Option<BridgeHandle>>,
}

impl BridgeEnricher {
    /// Spawn the bridge and wait for its ready signal.
    pub fn spawn(config: &BridgeConfig) -> Result<Self> {
        Ok(Self {
            handle: Mutex::new(Some(BridgeHandle::spawn(config)?)),
            config: config.clone(),
        })
    }
}

impl Enricher for BridgeEnricher {
    fn name(&self) -> &str {
        "bridge"
    }

    fn enrich(&self, title: &str, content: &str) -> Result<Enrichment> {
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| SegmenterError::Enrichment("bridge lock poisoned".into()))?;

        let mut handle = match slot.take() {
            Some(handle) => handle,
            None => {
                warn!(cmd = %self.config.command, "restarting enrichment bridge");
                BridgeHandle::spawn(&self.config)?
            }
        };

        match handle.enrich(title, truncate_content(content, self.config.max_content_chars)) {
            Ok(reply) => {
                *slot = Some(handle);
                match reply {
                    Reply::Enriched(enrichment) => Ok(enrichment),
                    Reply::Rejected(error) => Err(SegmenterError::Enrichment(error)),
                }
            }
            Err(e) => {
                warn!(error = %e, "retiring enrichment bridge");
                Err(e)
            }
        }
    }
}

/// Truncate content to at most `max_chars` characters.
fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((cut, _)) => format!("{}\n\n[... content truncated ...]", &content[..cut]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEnricher;

    impl Enricher for FailingEnricher {
        fn name(&self) -> &str {
            "failing"
        }

        fn enrich(&self, _title: &str, _content: &str) -> Result<Enrichment> {
            Err(SegmenterError::Enrichment("service unavailable".into()))
        }
    }

    struct FixedEnricher(Enrichment);

    impl Enricher for FixedEnricher {
        fn name(&self) -> &str {
            "fixed"
        }

        fn enrich(&self, _title: &str, _content: &str) -> Result<Enrichment> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl LanguageDetector for FailingDetector {
        fn detect(&self, _text: &str) -> Result<String> {
            Err(SegmenterError::Enrichment("no model".into()))
        }
    }

    struct FixedDetector(&'static str);

    impl LanguageDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn absent_enricher_leaves_segment() {
        let mut seg = Segment::new("AINU", "Hokkaido");
        let before = seg.clone();
        assert!(!apply_enrichment(&mut seg, None));
        assert_eq!(seg, before);
    }

    #[test]
    fn failing_enricher_leaves_segment() {
        let mut seg = Segment::new("AINU", "Hokkaido");
        seg.tags = Some(vec!["existing".into()]);
        let before = seg.clone();
        assert!(!apply_enrichment(&mut seg, Some(&FailingEnricher)));
        assert_eq!(seg, before);
    }

    #[test]
    fn enrichment_only_overwrites_supplied_fields() {
        let mut seg = Segment::new("AINU", "Hokkaido");
        seg.summary = Some("old summary".into());
        let enricher = FixedEnricher(Enrichment {
            tags: Some(vec!["kinship".into()]),
            summary_quality_score: Some(Confidence::Low),
            ..Default::default()
        });
        assert!(apply_enrichment(&mut seg, Some(&enricher)));
        assert_eq!(seg.summary.as_deref(), Some("old summary"));
        assert_eq!(seg.tags, Some(vec!["kinship".to_string()]));
        assert_eq!(seg.summary_quality_score, Some(Confidence::Low));
    }

    #[test]
    fn language_falls_back_to_und() {
        let mut seg = Segment::new("AINU", "");
        apply_language(&mut seg, None);
        assert_eq!(seg.title_lang.as_deref(), Some("und"));

        apply_language(&mut seg, Some(&FailingDetector));
        assert_eq!(seg.title_lang.as_deref(), Some("und"));

        apply_language(&mut seg, Some(&FixedDetector("  ")));
        assert_eq!(seg.title_lang.as_deref(), Some("und"));

        apply_language(&mut seg, Some(&FixedDetector("ja")));
        assert_eq!(seg.title_lang.as_deref(), Some("ja"));

        apply_language(&mut seg, Some(&UndeterminedLanguage));
        assert_eq!(seg.title_lang.as_deref(), Some("und"));
    }

    #[test]
    fn whatlang_detects_title_language() {
        let detector = WhatlangDetector;
        assert_eq!(
            detector
                .detect("The people of the northern islands live by fishing and hunting")
                .unwrap(),
            "eng"
        );
        assert_eq!(
            detector
                .detect("Die Bewohner der Insel leben vom Fischfang und von der Jagd")
                .unwrap(),
            "deu"
        );
    }

    #[test]
    fn whatlang_without_letters_falls_back_to_und() {
        let mut seg = Segment::new("1234 -- 5678", "");
        apply_language(&mut seg, Some(&WhatlangDetector));
        assert_eq!(seg.title_lang.as_deref(), Some("und"));
    }

    #[test]
    fn rules_parse_list_and_csv_tags() {
        let json = r#"[
            {"match": "ainu", "tags": ["indigenous", "hokkaido"]},
            {"match": "Basque", "tags": "pyrenees, euskara ,", "region": "Europe"}
        ]"#;
        let rules: Vec<EnrichmentRule> = serde_json::from_str(json).expect("parse rules");
        assert_eq!(rules[0].tags, ["indigenous", "hokkaido"]);
        assert_eq!(rules[1].tags, ["pyrenees", "euskara"]);
    }

    #[test]
    fn rules_enricher_collects_matching_tags() {
        let enricher = RulesEnricher::new(vec![
            EnrichmentRule {
                pattern: "ainu".into(),
                tags: vec!["indigenous".into(), "japan".into()],
            },
            EnrichmentRule {
                pattern: "japan".into(),
                tags: vec!["japan".into(), "island".into()],
            },
        ]);

        let result = enricher.enrich("AINU OF JAPAN", "").unwrap();
        assert_eq!(
            result.tags,
            Some(vec!["indigenous".into(), "japan".into(), "island".into()])
        );
        assert!(result.summary.is_none());

        let none = enricher.enrich("BASQUE", "").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn rules_from_missing_file_is_io_error() {
        let err = RulesEnricher::from_path(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, SegmenterError::Io { .. }));
    }

    #[test]
    fn truncate_short_content() {
        assert_eq!(truncate_content("short text", 100), "short text");
    }

    #[test]
    fn truncate_long_content_on_char_boundary() {
        let content = "é".repeat(200);
        let result = truncate_content(&content, 100);
        assert!(result.starts_with(&"é".repeat(100)));
        assert!(result.contains("truncated"));
    }

    #[test]
    fn request_message_serializes_correctly() {
        let msg = RequestMessage::Enrich {
            id: "req-1".into(),
            task: EnrichTask {
                title: "AINU",
                content: "Hokkaido".into(),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"enrich""#));
        assert!(json.contains(r#""id":"req-1""#));
        assert!(json.contains(r#""title":"AINU""#));
    }

    #[test]
    fn shutdown_message_serializes_correctly() {
        let json = serde_json::to_string(&RequestMessage::Shutdown).unwrap();
        assert_eq!(json, r#"{"type":"shutdown"}"#);
    }

    #[test]
    fn response_message_deserializes_result() {
        let json = r#"{"type":"result","id":"req-1","result":{"summary":"An island people.","tags":["ainu"],"summary_quality_score":"low"}}"#;
        match serde_json::from_str::<ResponseMessage>(json).unwrap() {
            ResponseMessage::Result { id, result } => {
                assert_eq!(id, "req-1");
                assert_eq!(result.summary.as_deref(), Some("An island people."));
                assert_eq!(result.summary_quality_score, Some(Confidence::Low));
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn response_message_deserializes_error() {
        let json = r#"{"type":"error","id":"req-2","error":"rate limited"}"#;
        match serde_json::from_str::<ResponseMessage>(json).unwrap() {
            ResponseMessage::Error { error, .. } => assert_eq!(error, "rate limited"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn bridge_spawn_failure_is_reported() {
        let config = BridgeConfig::new("cultureseg-no-such-bridge-binary", vec![]);
        let err = BridgeEnricher::spawn(&config).err().expect("spawn should fail");
        assert!(err.to_string().contains("failed to spawn bridge"));
    }

    #[cfg(unix)]
    #[test]
    fn bridge_round_trip_with_shell_script() {
        let script = r#"echo '{"type":"ready"}'
n=0
while read -r line; do
  case "$line" in *shutdown*) exit 0;; esac
  n=$((n+1))
  echo "{\"type\":\"result\",\"id\":\"req-$n\",\"result\":{\"tags\":[\"bridged\"]}}"
done"#;
        let config = BridgeConfig::new("sh", vec!["-c".into(), script.into()]);
        let enricher = BridgeEnricher::spawn(&config).expect("spawn sh bridge");

        let first = enricher.enrich("AINU", "Hokkaido").expect("first call");
        assert_eq!(first.tags, Some(vec!["bridged".to_string()]));
        let second = enricher.enrich("BASQUE", "Pyrenees").expect("second call");
        assert_eq!(second.tags, Some(vec!["bridged".to_string()]));
    }

    #[cfg(unix)]
    #[test]
    fn hung_bridge_times_out_and_is_restarted() {
        // First process answers once then hangs; every restart answers normally.
        let marker = std::env::temp_dir().join(format!("cs_bridge_{}", uuid::Uuid::now_v7()));
        let script = format!(
            r#"echo '{{"type":"ready"}}'
if [ -e "{marker}" ]; then hang=0; else touch "{marker}"; hang=1; fi
n=0
while read -r line; do
  case "$line" in *shutdown*) exit 0;; esac
  n=$((n+1))
  if [ "$hang" = 1 ] && [ "$n" -gt 1 ]; then sleep 30; fi
  echo "{{\"type\":\"result\",\"id\":\"req-$n\",\"result\":{{\"tags\":[\"bridged\"]}}}}"
done"#,
            marker = marker.display()
        );
        let config = BridgeConfig::new("sh", vec!["-c".into(), script])
            .with_timeout(Duration::from_millis(500));
        let enricher = BridgeEnricher::spawn(&config).expect("spawn sh bridge");

        assert!(enricher.enrich("AINU", "").is_ok());

        let started = Instant::now();
        let err = enricher.enrich("BASQUE", "").unwrap_err();
        assert!(err.to_string().contains("did not answer"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));

        let after = enricher.enrich("DINKA", "").expect("restarted bridge answers");
        assert_eq!(after.tags, Some(vec!["bridged".to_string()]));
    }

    #[cfg(unix)]
    #[test]
    fn mismatched_reply_id_retires_bridge() {
        let script = r#"echo '{"type":"ready"}'
while read -r line; do
  case "$line" in *shutdown*) exit 0;; esac
  echo '{"type":"result","id":"req-99","result":{}}'
done"#;
        let config = BridgeConfig::new("sh", vec!["-c".into(), script.into()]);
        let enricher = BridgeEnricher::spawn(&config).expect("spawn sh bridge");

        let err = enricher.enrich("AINU", "").unwrap_err();
        assert!(err.to_string().contains("expected req-1"), "{err}");
        assert!(enricher.handle.lock().unwrap().is_none());

        // The fresh process numbers requests from req-1 again.
        let err = enricher.enrich("BASQUE", "").unwrap_err();
        assert!(err.to_string().contains("expected req-1"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn worker_error_keeps_bridge() {
        let script = r#"echo '{"type":"ready"}'
n=0
while read -r line; do
  case "$line" in *shutdown*) exit 0;; esac
  n=$((n+1))
  echo "{\"type\":\"error\",\"id\":\"req-$n\",\"error\":\"rate limited\"}"
done"#;
        let config = BridgeConfig::new("sh", vec!["-c".into(), script.into()]);
        let enricher = BridgeEnricher::spawn(&config).expect("spawn sh bridge");

        let err = enricher.enrich("AINU", "").unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(enricher.handle.lock().unwrap().is_some());
    }
}
