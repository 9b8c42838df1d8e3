//! Host capability surface.
//!
//! The AI-native intrinsics (`knowledge`, `say`, `listen`, `optimize_self`)
//! and the wall clock are not hard-wired into the interpreter: they dispatch
//! through a [`HostCapabilities`] object supplied per execution. Absent
//! capabilities degrade to deterministic no-ops with documented return
//! values, so a headless run never fails because a backend is missing.
//!
//! Tests inject [`FixtureHost`], which returns configured fixtures and
//! records every invocation for assertions.

use indexmap::IndexMap;

use crate::value::Value;

/// Per-execution store of personality traits.
///
/// Each execution owns its record; nothing is process-wide. All values lie
/// in [0.0, 1.0] — the insert path is the only writer and it range-checks.
#[derive(Debug, Clone, Default)]
pub struct PersonalityRecord {
    traits: IndexMap<String, f64>,
}

impl PersonalityRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a trait. Fails when the value lies outside [0.0, 1.0].
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), f64> {
        if !(0.0..=1.0).contains(&value) {
            return Err(value);
        }
        self.traits.insert(name.to_owned(), value);
        Ok(())
    }

    /// Returns the current value of a trait, or `None` when unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.traits.get(name).copied()
    }

    /// Trait names and values in insertion order.
    #[must_use]
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.traits.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// A fully evaluated `say` invocation, handed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct SayRequest {
    pub text: String,
    pub emotion: Option<String>,
    pub voice_id: Option<String>,
    pub speed: Option<f64>,
}

impl SayRequest {
    /// Textual transcription used when no voice backend is attached.
    #[must_use]
    pub fn transcription(&self) -> String {
        let mut line = String::from("[say");
        if let Some(emotion) = &self.emotion {
            line.push_str(" emotion=");
            line.push_str(emotion);
        }
        if let Some(voice_id) = &self.voice_id {
            line.push_str(" voice=");
            line.push_str(voice_id);
        }
        if let Some(speed) = self.speed {
            let mut buffer = ryu::Buffer::new();
            line.push_str(" speed=");
            line.push_str(buffer.format(speed));
        }
        line.push_str("] ");
        line.push_str(&self.text);
        line
    }
}

/// A fully evaluated `optimize_self` invocation.
#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub metric: Value,
    pub target: Value,
    pub strategy: Option<Value>,
}

/// The capability object the host supplies per execution.
///
/// Default method bodies implement the documented degraded behaviour, so a
/// host only overrides what it actually provides. The capability object is
/// the sole boundary between the language core and the outside world.
pub trait HostCapabilities {
    /// Answers a `knowledge(query, ...)` call with an array of records.
    ///
    /// Each record carries at least `title`, `summary`, `confidence`, and
    /// `source`. Never fails; the degraded answer is an empty array.
    fn knowledge(&mut self, query: &Value, filters: &IndexMap<String, Value>) -> Vec<IndexMap<String, Value>> {
        let _ = (query, filters);
        Vec::new()
    }

    /// Speaks the given text.
    ///
    /// Returns `Some(line)` when the host wants a textual transcription
    /// written to the output sink (the degraded behaviour), or `None` when
    /// the host handled the request itself.
    fn say(&mut self, request: &SayRequest) -> Option<String> {
        Some(request.transcription())
    }

    /// Captures voice input. The degraded answer is `None` (null).
    fn listen(&mut self, timeout: Option<f64>, language: Option<&str>) -> Option<String> {
        let _ = (timeout, language);
        None
    }

    /// Receives an `optimize_self` directive. Declarative; no effect beyond
    /// the call itself.
    fn optimize_self(&mut self, request: &OptimizeRequest) {
        let _ = request;
    }

    /// Milliseconds since the Unix epoch.
    fn now_ms(&mut self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Host with every capability degraded to its deterministic no-op (except
/// the wall clock, which is real).
#[derive(Debug, Default)]
pub struct DefaultHost;

impl HostCapabilities for DefaultHost {}

/// Deterministic host for tests.
///
/// Returns configured fixtures and records every `say` / `optimize_self` /
/// `knowledge` invocation. The clock starts at a fixed epoch and advances
/// by a fixed step per call.
#[derive(Debug)]
pub struct FixtureHost {
    /// Records returned for every knowledge query.
    pub knowledge_results: Vec<IndexMap<String, Value>>,
    /// Fixture returned by `listen`; `None` degrades to null.
    pub listen_response: Option<String>,
    /// Queries observed, in call order.
    pub knowledge_queries: Vec<String>,
    /// Say requests observed, in call order.
    pub say_requests: Vec<SayRequest>,
    /// Optimize directives observed, in call order.
    pub optimize_requests: Vec<OptimizeRequest>,
    clock_ms: i64,
    clock_step_ms: i64,
}

impl FixtureHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            knowledge_results: Vec::new(),
            listen_response: None,
            knowledge_queries: Vec::new(),
            say_requests: Vec::new(),
            optimize_requests: Vec::new(),
            clock_ms: 1_700_000_000_000,
            clock_step_ms: 10,
        }
    }

    /// Configures a single knowledge record with the standard fields.
    #[must_use]
    pub fn with_knowledge_record(mut self, title: &str, summary: &str, confidence: f64, source: &str) -> Self {
        let mut record = IndexMap::new();
        record.insert("title".to_owned(), Value::str(title));
        record.insert("summary".to_owned(), Value::str(summary));
        record.insert("confidence".to_owned(), Value::Float(confidence));
        record.insert("source".to_owned(), Value::str(source));
        self.knowledge_results.push(record);
        self
    }

    #[must_use]
    pub fn with_listen_response(mut self, response: &str) -> Self {
        self.listen_response = Some(response.to_owned());
        self
    }
}

impl Default for FixtureHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCapabilities for FixtureHost {
    fn knowledge(&mut self, query: &Value, _filters: &IndexMap<String, Value>) -> Vec<IndexMap<String, Value>> {
        self.knowledge_queries.push(query.to_string());
        self.knowledge_results.clone()
    }

    fn say(&mut self, request: &SayRequest) -> Option<String> {
        self.say_requests.push(request.clone());
        Some(request.transcription())
    }

    fn listen(&mut self, _timeout: Option<f64>, _language: Option<&str>) -> Option<String> {
        self.listen_response.clone()
    }

    fn optimize_self(&mut self, request: &OptimizeRequest) {
        self.optimize_requests.push(request.clone());
    }

    fn now_ms(&mut self) -> i64 {
        let now = self.clock_ms;
        self.clock_ms += self.clock_step_ms;
        now
    }
}
