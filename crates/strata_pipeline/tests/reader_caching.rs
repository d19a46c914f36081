//! Integration tests for reader pipelines.

mod common;

use std::sync::Arc;

use common::{memory_store, run, Control, FakeStage};
use strata_cache::{
    CacheStore, CachedResponse, KeyFragment, MemoryStore, PipelineCacheKey, StageKind, Validity,
};
use strata_pipeline::{
    CacheUse, CachingPipeline, PipelineConfig, PipelineError, Request, ResponseStatus,
};

const BODY: &str = "logo.png";

fn reader_pipeline(
    control: &Arc<Control>,
    store: &Arc<MemoryStore>,
    config: PipelineConfig,
) -> CachingPipeline {
    let mut pipeline = CachingPipeline::new(store.clone(), config);
    pipeline.set_reader(FakeStage::new("resource", BODY, control));
    pipeline
}

fn reader_key() -> PipelineCacheKey {
    std::iter::once(KeyFragment::new(StageKind::Reader, "resource", BODY, "r")).collect()
}

#[test]
fn reader_miss_then_hit() {
    let control = Control::cacheable("r", Validity::TimeStamp(1));
    let store = memory_store();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());

    let (first, body) = run(&mut pipeline, &Request::new()).unwrap();
    assert_eq!(first.cache, CacheUse::Miss);
    assert!(first.committed);
    assert_eq!(body, BODY);
    assert_eq!(first.content_type.as_deref(), Some("text/html"));

    let (second, body) = run(&mut pipeline, &Request::new()).unwrap();
    assert_eq!(second.cache, CacheUse::FullHit);
    assert_eq!(body, BODY);
    assert_eq!(control.calls(), 1);
}

#[test]
fn changed_reader_source_regenerates() {
    let control = Control::cacheable("r", Validity::TimeStamp(1));
    let store = memory_store();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());
    run(&mut pipeline, &Request::new()).unwrap();

    control.set_validity(Some(Validity::TimeStamp(2)));
    let (outcome, body) = run(&mut pipeline, &Request::new()).unwrap();
    assert_eq!(outcome.cache, CacheUse::Miss);
    assert!(outcome.committed);
    assert_eq!(body, BODY);
    assert_eq!(control.calls(), 2);
    assert_eq!(
        store.get(&reader_key()).unwrap().validities,
        vec![Validity::TimeStamp(2)]
    );
}

#[test]
fn reader_without_validity_is_not_cached() {
    let control = Control::cacheable("r", Validity::Nop);
    control.set_validity(None);
    let store = memory_store();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());

    let (outcome, body) = run(&mut pipeline, &Request::new()).unwrap();
    assert_eq!(body, BODY);
    assert!(!outcome.committed);
    assert!(store.is_empty());
}

#[test]
fn malformed_reader_entry_is_removed() {
    let control = Control::cacheable("r", Validity::Nop);
    let store = memory_store();
    store
        .store(
            &reader_key(),
            CachedResponse::new(vec![Validity::Nop, Validity::Nop], b"stale".to_vec()),
        )
        .unwrap();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());

    let (outcome, body) = run(&mut pipeline, &Request::new()).unwrap();
    assert_eq!(outcome.cache, CacheUse::Miss);
    assert_eq!(body, BODY);
    assert_eq!(store.get(&reader_key()).unwrap().validities.len(), 1);
}

#[test]
fn internal_reader_request_bypasses_the_store() {
    let control = Control::cacheable("r", Validity::Nop);
    let store = memory_store();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());

    let (outcome, _) = run(&mut pipeline, &Request::new().internal()).unwrap();
    assert_eq!(outcome.cache, CacheUse::Uncached);
    assert!(store.is_empty());
}

#[test]
fn reader_answers_not_modified() {
    let control = Control::cacheable("r", Validity::Nop);
    let store = memory_store();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());
    let (first, _) = run(&mut pipeline, &Request::new()).unwrap();

    let request = Request::new().if_modified_since(first.last_modified.unwrap());
    let (outcome, body) = run(&mut pipeline, &request).unwrap();
    assert_eq!(outcome.status, ResponseStatus::NotModified);
    assert!(body.is_empty());
}

#[test]
fn reader_with_chain_stages_is_incomplete() {
    let control = Control::uncacheable();
    let store = memory_store();
    let mut pipeline = reader_pipeline(&control, &store, PipelineConfig::default());
    pipeline.set_producer(FakeStage::new("file", "index.xml", &control));

    let err = run(&mut pipeline, &Request::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Incomplete(_)));
}
