//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blueprint::{BlueprintTag, FetchError, Fetcher, Payload, TagHolder};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use tracing::Dispatch;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// Captured event information for testing.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    /// Event level
    pub level: Level,
    /// The `message` field
    pub message: String,
    /// Other fields as strings
    pub fields: Vec<(String, String)>,
    /// Names of the enclosing spans, innermost first
    pub spans: Vec<String>,
}

impl CapturedEvent {
    /// Value of the field `name`, if recorded.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields
                .push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}

/// A tracing layer that captures events for testing.
struct EventCaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for EventCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut visitor);

        let spans = ctx
            .event_scope(event)
            .map(|scope| scope.map(|span| span.name().to_string()).collect())
            .unwrap_or_default();

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
            spans,
        });
    }
}

/// Collector for captured events.
#[derive(Clone)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    dispatch: Dispatch,
}

/// Create a new event collector with its associated dispatch.
pub fn create_event_collector() -> EventCollector {
    let events = Arc::new(Mutex::new(Vec::new()));
    let layer = EventCaptureLayer {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(layer);
    EventCollector {
        events,
        dispatch: Dispatch::new(subscriber),
    }
}

impl EventCollector {
    /// Install the collector for the current thread until the guard drops.
    ///
    /// Tests using it run on a current-thread runtime, so spawned tasks log
    /// into the collector too.
    pub fn set_default(&self) -> tracing::dispatcher::DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    /// All captured events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events at `level` whose message is `message`.
    pub fn matching(&self, level: Level, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level && event.message == message)
            .collect()
    }
}

/// Fetcher serving canned responses and counting calls per URL.
#[derive(Clone, Default)]
pub struct CountingFetcher {
    responses: Arc<Mutex<HashMap<String, Result<Bytes, String>>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    total: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serve `body` for `url`.
    pub fn serve(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.into()));
        self
    }

    /// Fail fetches of `url` with `reason`.
    pub fn fail(self, url: &str, reason: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
        self
    }

    /// Number of fetches of `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Number of fetches of any URL.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok(body)) => Ok(body),
            Some(Err(reason)) => Err(FetchError::transport(std::io::Error::other(reason))),
            None => Err(FetchError::transport(std::io::Error::other("not found"))),
        }
    }
}

/// An item stack carrying an optional blueprint tag.
#[derive(Debug, Default)]
pub struct Item {
    pub tag: Option<BlueprintTag>,
}

impl Item {
    pub fn new(tag: BlueprintTag) -> Arc<Self> {
        Arc::new(Self { tag: Some(tag) })
    }

    pub fn blank() -> Arc<Self> {
        Arc::new(Self { tag: None })
    }
}

impl TagHolder for Item {
    fn tag(&self) -> Option<&BlueprintTag> {
        self.tag.as_ref()
    }
}

/// zlib-compress `data`.
pub fn zlib(data: &[u8]) -> Bytes {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    Bytes::from(encoder.finish().unwrap())
}

/// Let spawned tasks on a current-thread runtime run until they block.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
