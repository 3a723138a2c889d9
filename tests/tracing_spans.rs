//! Span instrumentation tests
//!
//! Installs a capturing subscriber layer and checks the fields recorded on
//! the `cache.check`, `cache.store`, `cache.batch_check` and
//! `cache.batch_slot` spans.

mod common;

use common::*;
use ouroboros_semcache::{CacheConfig, CacheQuery, SemanticCache, StoreRequest};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
struct CapturedSpan {
    name: &'static str,
    fields: BTreeMap<String, String>,
}

#[derive(Default)]
struct Captured {
    spans: Vec<CapturedSpan>,
    live: HashMap<u64, usize>,
}

#[derive(Clone, Default)]
struct SpanCapture {
    inner: Arc<Mutex<Captured>>,
}

impl SpanCapture {
    fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.inner
            .lock()
            .spans
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

struct FieldVisitor<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

impl<S: Subscriber> Layer<S> for SpanCapture {
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));

        let mut captured = self.inner.lock();
        captured.spans.push(CapturedSpan {
            name: attrs.metadata().name(),
            fields,
        });
        let index = captured.spans.len() - 1;
        captured.live.insert(id.into_u64(), index);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut captured = self.inner.lock();
        if let Some(&index) = captured.live.get(&id.into_u64()) {
            values.record(&mut FieldVisitor(&mut captured.spans[index].fields));
        }
    }
}

fn field<'a>(span: &'a CapturedSpan, name: &str) -> Option<&'a str> {
    span.fields.get(name).map(String::as_str)
}

#[tokio::test]
async fn test_check_span_records_hit_and_layer() {
    let capture = SpanCapture::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let cache = SemanticCache::in_memory(test_config(), Arc::new(StaticEmbedder::new())).unwrap();
    cache.store(&StoreRequest::new("q", "r").tag("faq")).await.unwrap();
    cache.check(&CacheQuery::new("q")).await;
    cache.check(&CacheQuery::new("unknown")).await;

    let stores = capture.named("cache.store");
    assert_eq!(stores.len(), 1);
    assert_eq!(field(&stores[0], "tag_count"), Some("1"));
    assert_eq!(field(&stores[0], "cache_layer"), Some("l1+l2"));

    let checks = capture.named("cache.check");
    assert_eq!(checks.len(), 2);
    assert_eq!(field(&checks[0], "cache_hit"), Some("true"));
    assert_eq!(field(&checks[0], "cache_layer"), Some("l1"));
    assert!(field(&checks[0], "l1_latency_ms").is_some());
    assert_eq!(field(&checks[1], "cache_hit"), Some("false"));
    assert_eq!(field(&checks[1], "cache_layer"), None);
}

#[tokio::test]
async fn test_check_span_records_degraded_error() {
    let capture = SpanCapture::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let cache = SemanticCache::in_memory(test_config(), Arc::new(BrokenEmbedder)).unwrap();
    assert!(cache.check(&CacheQuery::new("q")).await.is_none());

    let checks = capture.named("cache.check");
    assert_eq!(checks.len(), 1);
    assert_eq!(field(&checks[0], "cache_hit"), Some("false"));
    assert_eq!(field(&checks[0], "error"), Some("operation_failed"));
}

#[tokio::test]
async fn test_batch_slots_get_their_own_spans() {
    let capture = SpanCapture::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let config = CacheConfig::builder()
        .name("spans")
        .ttl_jitter(0.0)
        .disable_l1()
        .build();
    let cache = SemanticCache::in_memory(config, Arc::new(StaticEmbedder::new())).unwrap();
    cache.store(&StoreRequest::new("b", "B")).await.unwrap();

    let prompts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    cache.batch_check(&prompts, None, None).await.unwrap();

    let batches = capture.named("cache.batch_check");
    assert_eq!(batches.len(), 1);
    assert_eq!(field(&batches[0], "batch_size"), Some("3"));
    assert_eq!(field(&batches[0], "hits"), Some("1"));

    let slots = capture.named("cache.batch_slot");
    assert_eq!(slots.len(), 3);
    let hit = slots
        .iter()
        .find(|s| field(s, "index") == Some("1"))
        .unwrap();
    assert_eq!(field(hit, "cache_hit"), Some("true"));
    assert_eq!(field(hit, "cache_layer"), Some("l2"));
    assert!(field(hit, "l2_latency_ms").is_some());
}
