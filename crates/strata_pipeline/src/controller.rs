//! The caching pipeline controller.
//!
//! Chain positions are numbered from the producer: position 0 is the
//! producer, positions `1..=T` are the transforms, and position `T + 1` is
//! the serializer. A cache key of length `n` covers positions `0..n`, and
//! the entry stored under it holds the output of position `n - 1`.

use std::io::{BufWriter, Write};
use std::sync::Arc;

use strata_cache::{
    CacheStore, CachedResponse, KeyFragment, PipelineCacheKey, StageKind, Validity,
};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::outcome::{CacheUse, ProcessOutcome, ResponseStatus};
use crate::sink::CaptureSink;
use crate::stage::{Cacheable, Producer, Reader, Request, Serializer, Transform};
use crate::validation::{self, Verdict};

/// A processing pipeline with per-stage caching.
///
/// Stages are attached with the builder methods and the pipeline is then
/// run once per request with [`process`](Self::process). A pipeline holds
/// either a producer/transform/serializer chain or a single reader.
pub struct CachingPipeline {
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) config: PipelineConfig,
    producer: Option<Box<dyn Producer>>,
    transforms: Vec<Box<dyn Transform>>,
    serializer: Option<Box<dyn Serializer>>,
    pub(crate) reader: Option<Box<dyn Reader>>,
    mime_type: Option<String>,
}

/// Per-request caching state.
#[derive(Debug, Default)]
struct CacheState {
    /// Key the current run will commit under, if any.
    to_cache_key: Option<PipelineCacheKey>,
    /// One fresh token per position of `to_cache_key`.
    to_cache_validities: Vec<Validity>,
    /// `to_cache_key` includes the serializer.
    cache_complete_response: bool,
    /// Whether a key was built at all.
    key_built: bool,
    /// Key of the valid entry found in the store, a prefix of the built key.
    from_cache_key: Option<PipelineCacheKey>,
    cached: Option<CachedResponse>,
    /// The found entry is the complete response.
    complete_response_is_cached: bool,
    /// First position the run has to execute.
    first_uncached_stage: usize,
}

/// Borrowed view of the stage at one chain position.
struct StageProbe<'a> {
    kind: StageKind,
    role: &'a str,
    source: &'a str,
    cacheable: Option<&'a dyn Cacheable>,
}

impl CachingPipeline {
    /// Creates an empty pipeline backed by `store`.
    pub fn new(store: Arc<dyn CacheStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            producer: None,
            transforms: Vec::new(),
            serializer: None,
            reader: None,
            mime_type: None,
        }
    }

    /// Sets the head of the chain.
    pub fn set_producer(&mut self, producer: impl Producer + 'static) -> &mut Self {
        self.producer = Some(Box::new(producer));
        self
    }

    /// Appends an intermediate stage.
    pub fn add_transform(&mut self, transform: impl Transform + 'static) -> &mut Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Sets the terminal stage of the chain.
    pub fn set_serializer(&mut self, serializer: impl Serializer + 'static) -> &mut Self {
        self.serializer = Some(Box::new(serializer));
        self
    }

    /// Makes this a reader pipeline.
    pub fn set_reader(&mut self, reader: impl Reader + 'static) -> &mut Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// Overrides the terminal stage's content type.
    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) -> &mut Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// The pipeline's caching configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline for `request`, writing the response to `out`.
    ///
    /// The response is served from the store when a valid complete entry
    /// exists. Otherwise the chain runs from the first position the store
    /// cannot supply, and the longest newly cacheable output is committed
    /// after the run succeeds.
    #[instrument(skip_all, fields(internal = request.internal))]
    pub fn process(
        &mut self,
        request: &Request,
        out: &mut dyn Write,
    ) -> Result<ProcessOutcome, PipelineError> {
        if self.reader.is_some() {
            if self.producer.is_some() || !self.transforms.is_empty() || self.serializer.is_some()
            {
                return Err(PipelineError::Incomplete(
                    "a reader pipeline cannot also hold a chain".to_string(),
                ));
            }
            let mime_type = self.resolve_mime_type()?;
            return self.process_reader(request, out, mime_type);
        }
        if self.producer.is_none() {
            return Err(PipelineError::Incomplete("missing producer".to_string()));
        }
        if self.serializer.is_none() {
            return Err(PipelineError::Incomplete("missing serializer".to_string()));
        }
        let mime_type = self.resolve_mime_type()?;
        self.setup_stages(request)?;

        let mut state = CacheState::default();
        if self.config.enabled {
            self.generate_caching_key(request, &mut state);
            if state.key_built {
                self.validate_pipeline(&mut state);
                self.setup_validities(&mut state);
            }
        }
        self.execute(request, state, mime_type, out)
    }

    fn resolve_mime_type(&self) -> Result<String, PipelineError> {
        let terminal = match (&self.serializer, &self.reader) {
            (Some(serializer), _) => serializer.mime_type(),
            (None, Some(reader)) => reader.mime_type(),
            (None, None) => None,
        };
        self.mime_type
            .clone()
            .or_else(|| terminal.map(str::to_string))
            .ok_or(PipelineError::NoMimeType)
    }

    fn setup_stages(&mut self, request: &Request) -> Result<(), PipelineError> {
        if let Some(producer) = self.producer.as_mut() {
            producer
                .setup(request)
                .map_err(|e| PipelineError::stage(producer.role(), e))?;
        }
        for transform in self.transforms.iter_mut() {
            transform
                .setup(request)
                .map_err(|e| PipelineError::stage(transform.role(), e))?;
        }
        if let Some(serializer) = self.serializer.as_mut() {
            serializer
                .setup(request)
                .map_err(|e| PipelineError::stage(serializer.role(), e))?;
        }
        Ok(())
    }

    fn serializer_position(&self) -> usize {
        self.transforms.len() + 1
    }

    fn probe(&self, position: usize) -> Option<StageProbe<'_>> {
        let serializer_position = self.serializer_position();
        if position == 0 {
            let producer = self.producer.as_deref()?;
            Some(StageProbe {
                kind: StageKind::Producer,
                role: producer.role(),
                source: producer.source(),
                cacheable: producer.cacheable(),
            })
        } else if position < serializer_position {
            let transform = self.transforms.get(position - 1)?;
            Some(StageProbe {
                kind: StageKind::Transform,
                role: transform.role(),
                source: transform.source(),
                cacheable: transform.cacheable(),
            })
        } else if position == serializer_position {
            let serializer = self.serializer.as_deref()?;
            Some(StageProbe {
                kind: StageKind::Serializer,
                role: serializer.role(),
                source: serializer.source(),
                cacheable: serializer.cacheable(),
            })
        } else {
            None
        }
    }

    fn fragment_at(&self, position: usize) -> Option<KeyFragment> {
        let probe = self.probe(position)?;
        let key = probe.cacheable?.cache_key()?;
        Some(KeyFragment::new(probe.kind, probe.role, probe.source, key))
    }

    fn validity_at(&self, position: usize) -> Option<Validity> {
        self.probe(position)?.cacheable?.validity()
    }

    /// Builds the key from the longest cacheable prefix of the chain.
    fn generate_caching_key(&self, request: &Request, state: &mut CacheState) {
        let serializer_position = self.serializer_position();
        let mut key = PipelineCacheKey::new();
        while key.len() < serializer_position {
            match self.fragment_at(key.len()) {
                Some(fragment) => key.push(fragment),
                None => break,
            }
        }
        if key.is_empty() {
            debug!("producer is not cacheable");
            return;
        }
        if key.len() == serializer_position {
            if request.internal {
                debug!("internal request, serializer output is not cached");
            } else if let Some(fragment) = self.fragment_at(serializer_position) {
                key.push(fragment);
                state.cache_complete_response = true;
            }
        }
        debug!(key = %key, complete = state.cache_complete_response, "built cache key");
        state.key_built = true;
        state.to_cache_key = Some(key);
    }

    /// Finds the longest valid stored prefix of the built key.
    fn validate_pipeline(&self, state: &mut CacheState) {
        let mut from_key = match &state.to_cache_key {
            Some(key) => key.clone(),
            None => return,
        };
        let window = self.config.expiry_window();
        while !from_key.is_empty() {
            state.first_uncached_stage = from_key.len();
            let Some(mut response) = self.store.get(&from_key) else {
                if self.config.smart_caching {
                    debug!(key = %from_key, "cache miss");
                    break;
                }
                debug!(key = %from_key, "cache miss, trying a shorter key");
                from_key.pop();
                continue;
            };
            if !response.matches_key_len(from_key.len()) {
                warn!(
                    key = %from_key,
                    validities = response.validities.len(),
                    "stored entry does not match its key length, removing"
                );
                self.store.remove(&from_key);
                break;
            }
            if validation::apply_expiry(self.store.as_ref(), &from_key, &mut response, window) {
                debug!(key = %from_key, "entry within its explicit expiry");
                self.accept(state, from_key, response);
                return;
            }
            match validation::judge(&response.validities, |i| self.validity_at(i)) {
                Verdict::Valid => {
                    debug!(key = %from_key, "entry is valid");
                    self.accept(state, from_key, response);
                    return;
                }
                Verdict::Stale { valid_prefix } => {
                    debug!(key = %from_key, valid_prefix, "entry is stale");
                    from_key.truncate(valid_prefix);
                }
                Verdict::Unusable { valid_prefix } => {
                    debug!(key = %from_key, valid_prefix, "entry cannot be validated, removing");
                    self.store.remove(&from_key);
                    from_key.truncate(valid_prefix);
                }
            }
        }
        state.first_uncached_stage = 0;
    }

    fn accept(&self, state: &mut CacheState, from_key: PipelineCacheKey, response: CachedResponse) {
        let to_len = state.to_cache_key.as_ref().map_or(0, PipelineCacheKey::len);
        debug_assert!(state
            .to_cache_key
            .as_ref()
            .is_some_and(|to_key| from_key.is_prefix_of(to_key)));
        state.complete_response_is_cached =
            state.cache_complete_response && from_key.len() == to_len;
        state.first_uncached_stage = from_key.len();
        state.from_cache_key = Some(from_key);
        state.cached = Some(response);
    }

    /// Collects the fresh tokens the commit needs, shortening or dropping
    /// the commit key where a stage cannot supply one.
    fn setup_validities(&self, state: &mut CacheState) {
        let from_len = state.from_cache_key.as_ref().map_or(0, PipelineCacheKey::len);
        let Some(to_key) = state.to_cache_key.as_mut() else {
            return;
        };
        if state.cached.is_some() && from_len >= to_key.len() {
            debug!("stored entry covers the whole cacheable prefix");
            state.to_cache_key = None;
            state.cache_complete_response = false;
            return;
        }
        let mut validities = Vec::with_capacity(to_key.len());
        for position in 0..to_key.len() {
            match self.validity_at(position) {
                Some(validity) => validities.push(validity),
                None => {
                    debug!(position, "stage has no validity, shortening cache key");
                    to_key.truncate(position);
                    state.cache_complete_response = false;
                    break;
                }
            }
        }
        let no_gain = state.cached.is_some() && to_key.len() <= from_len;
        if to_key.is_empty() || no_gain {
            debug!("nothing new to cache for this request");
            state.to_cache_key = None;
            state.cache_complete_response = false;
            return;
        }
        state.to_cache_validities = validities;
    }

    fn execute(
        &mut self,
        request: &Request,
        mut state: CacheState,
        mime_type: String,
        out: &mut dyn Write,
    ) -> Result<ProcessOutcome, PipelineError> {
        let mut writer = BufWriter::with_capacity(self.config.output_buffer_size, out);
        if state.complete_response_is_cached {
            if let Some(cached) = state.cached.take() {
                return serve_cached(request, cached, mime_type, &mut writer);
            }
        }

        let cache = match (&state.cached, state.key_built) {
            (Some(_), _) => CacheUse::PartialHit {
                cached_stages: state.first_uncached_stage,
            },
            (None, true) => CacheUse::Miss,
            (None, false) => CacheUse::Uncached,
        };
        // Position whose output is committed when the key stops short of
        // the serializer.
        let capture_position = match &state.to_cache_key {
            Some(key) if !state.cache_complete_response => Some(key.len() - 1),
            _ => None,
        };
        let capture_response = state.cache_complete_response && state.to_cache_key.is_some();

        let (start, mut document) = match state.cached.take() {
            Some(cached) => {
                let start = state.first_uncached_stage;
                (start, self.deserialize_at(start, cached.response)?)
            }
            None => {
                let producer = self
                    .producer
                    .as_mut()
                    .ok_or_else(|| PipelineError::Incomplete("missing producer".to_string()))?;
                let document = producer
                    .generate()
                    .map_err(|e| PipelineError::stage(producer.role(), e))?;
                (1, document)
            }
        };
        let mut captured = None;
        if capture_position == Some(0) {
            captured = Some(document.clone());
        }
        for (index, transform) in self.transforms.iter_mut().enumerate() {
            let position = index + 1;
            if position < start {
                continue;
            }
            document = transform
                .transform(document)
                .map_err(|e| PipelineError::stage(transform.role(), e))?;
            if capture_position == Some(position) {
                captured = Some(document.clone());
            }
        }

        let serializer = self
            .serializer
            .as_mut()
            .ok_or_else(|| PipelineError::Incomplete("missing serializer".to_string()))?;
        let mut sink = if capture_response {
            CaptureSink::new(&mut writer)
        } else {
            CaptureSink::passthrough(&mut writer)
        };
        serializer
            .serialize(document, &mut sink)
            .map_err(|e| PipelineError::stage(serializer.role(), e))?;
        let bytes_written = sink.written();
        let response_bytes = sink.into_captured();
        writer.flush().map_err(PipelineError::output)?;
        if capture_response {
            captured = response_bytes;
        }

        let mut committed = false;
        let mut last_modified = None;
        if let (Some(key), Some(bytes)) = (state.to_cache_key.as_ref(), captured) {
            let content_type = state.cache_complete_response.then(|| mime_type.clone());
            if let Some(stored_at) = validation::commit(
                self.store.as_ref(),
                key,
                std::mem::take(&mut state.to_cache_validities),
                bytes,
                content_type,
                self.config.expiry_window(),
            ) {
                committed = true;
                if state.cache_complete_response {
                    last_modified = Some(stored_at);
                }
            }
        }

        Ok(ProcessOutcome {
            cache,
            status: ResponseStatus::Ok,
            content_type: Some(mime_type),
            last_modified,
            bytes_written,
            committed,
        })
    }

    /// Feeds cached bytes to the stage at `position`, the first one the
    /// store could not supply.
    fn deserialize_at(&self, position: usize, cached: Vec<u8>) -> Result<Vec<u8>, PipelineError> {
        let serializer_position = self.serializer_position();
        if position >= 1 && position < serializer_position {
            if let Some(transform) = self.transforms.get(position - 1) {
                return transform
                    .deserialize(cached)
                    .map_err(|e| PipelineError::stage(transform.role(), e));
            }
        } else if position == serializer_position {
            if let Some(serializer) = self.serializer.as_deref() {
                return serializer
                    .deserialize(cached)
                    .map_err(|e| PipelineError::stage(serializer.role(), e));
            }
        }
        Err(PipelineError::Incomplete(format!(
            "no stage at chain position {position}"
        )))
    }
}

/// Writes a complete stored response, or answers not-modified when the
/// client's copy is current.
pub(crate) fn serve_cached(
    request: &Request,
    cached: CachedResponse,
    mime_type: String,
    out: &mut dyn Write,
) -> Result<ProcessOutcome, PipelineError> {
    let content_type = cached.content_type.clone().or(Some(mime_type));
    let last_modified = Some(cached.last_modified);
    if is_not_modified(request, &cached) {
        debug!("client copy is current");
        return Ok(ProcessOutcome {
            cache: CacheUse::FullHit,
            status: ResponseStatus::NotModified,
            content_type,
            last_modified,
            bytes_written: 0,
            committed: false,
        });
    }
    out.write_all(&cached.response).map_err(PipelineError::output)?;
    out.flush().map_err(PipelineError::output)?;
    debug!(bytes = cached.response.len(), "served stored response");
    Ok(ProcessOutcome {
        cache: CacheUse::FullHit,
        status: ResponseStatus::Ok,
        content_type,
        last_modified,
        bytes_written: cached.response.len() as u64,
        committed: false,
    })
}

fn is_not_modified(request: &Request, cached: &CachedResponse) -> bool {
    request
        .if_modified_since
        .is_some_and(|since: OffsetDateTime| cached.last_modified <= since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_cache::MemoryStore;

    use crate::error::StageError;
    use crate::stage::Stage;

    struct Fixed(&'static str, Option<&'static str>);

    impl Stage for Fixed {
        fn role(&self) -> &str {
            self.0
        }

        fn cacheable(&self) -> Option<&dyn Cacheable> {
            self.1.map(|_| self as &dyn Cacheable)
        }
    }

    impl Cacheable for Fixed {
        fn cache_key(&self) -> Option<String> {
            self.1.map(str::to_string)
        }

        fn validity(&self) -> Option<Validity> {
            Some(Validity::Nop)
        }
    }

    impl Producer for Fixed {
        fn generate(&mut self) -> Result<Vec<u8>, StageError> {
            Ok(b"doc".to_vec())
        }
    }

    impl Transform for Fixed {
        fn transform(&mut self, input: Vec<u8>) -> Result<Vec<u8>, StageError> {
            Ok(input)
        }
    }

    impl Serializer for Fixed {
        fn mime_type(&self) -> Option<&str> {
            Some("text/plain")
        }

        fn serialize(&mut self, input: Vec<u8>, out: &mut dyn Write) -> Result<(), StageError> {
            out.write_all(&input)?;
            Ok(())
        }
    }

    fn pipeline(stages: [Option<&'static str>; 4]) -> CachingPipeline {
        let store = Arc::new(MemoryStore::with_capacity(8));
        let mut pipeline = CachingPipeline::new(store, PipelineConfig::default());
        pipeline
            .set_producer(Fixed("file", stages[0]))
            .add_transform(Fixed("xslt", stages[1]))
            .add_transform(Fixed("i18n", stages[2]))
            .set_serializer(Fixed("html", stages[3]));
        pipeline
    }

    fn built_key(pipeline: &CachingPipeline, request: &Request) -> (Option<String>, bool) {
        let mut state = CacheState::default();
        pipeline.generate_caching_key(request, &mut state);
        (
            state.to_cache_key.map(|k| k.to_string()),
            state.cache_complete_response,
        )
    }

    #[test]
    fn key_covers_fully_cacheable_chain() {
        let p = pipeline([Some("a"), Some("b"), Some("c"), Some("d")]);
        let (key, complete) = built_key(&p, &Request::new());
        assert_eq!(
            key.as_deref(),
            Some("PK_G-file-?a_T-xslt-?b_T-i18n-?c_S-html-?d")
        );
        assert!(complete);
    }

    #[test]
    fn key_stops_at_first_uncacheable_stage() {
        let p = pipeline([Some("a"), None, Some("c"), Some("d")]);
        let (key, complete) = built_key(&p, &Request::new());
        assert_eq!(key.as_deref(), Some("PK_G-file-?a"));
        assert!(!complete);
    }

    #[test]
    fn uncacheable_producer_builds_no_key() {
        let p = pipeline([None, Some("b"), Some("c"), Some("d")]);
        assert_eq!(built_key(&p, &Request::new()), (None, false));
    }

    #[test]
    fn internal_request_leaves_out_serializer() {
        let p = pipeline([Some("a"), Some("b"), Some("c"), Some("d")]);
        let (key, complete) = built_key(&p, &Request::new().internal());
        assert_eq!(key.as_deref(), Some("PK_G-file-?a_T-xslt-?b_T-i18n-?c"));
        assert!(!complete);
    }

    #[test]
    fn key_construction_is_idempotent() {
        let p = pipeline([Some("a"), Some("b"), None, Some("d")]);
        let request = Request::new();
        assert_eq!(built_key(&p, &request), built_key(&p, &request));
    }

    #[test]
    fn probe_maps_positions() {
        let p = pipeline([Some("a"), Some("b"), Some("c"), Some("d")]);
        let kinds: Vec<StageKind> = (0..4).filter_map(|i| p.probe(i)).map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [
                StageKind::Producer,
                StageKind::Transform,
                StageKind::Transform,
                StageKind::Serializer
            ]
        );
        assert!(p.probe(4).is_none());
    }

    #[test]
    fn explicit_mime_type_wins() {
        let mut p = pipeline([None, None, None, None]);
        assert_eq!(p.resolve_mime_type().unwrap(), "text/plain");
        p.set_mime_type("text/html");
        assert_eq!(p.resolve_mime_type().unwrap(), "text/html");
    }

    #[test]
    fn not_modified_compares_whole_seconds() {
        let mut cached = CachedResponse::new(vec![Validity::Nop], b"x".to_vec());
        cached.last_modified = OffsetDateTime::from_unix_timestamp(1_000).unwrap();
        let same = Request::new().if_modified_since(cached.last_modified);
        let older = Request::new()
            .if_modified_since(OffsetDateTime::from_unix_timestamp(999).unwrap());
        assert!(is_not_modified(&same, &cached));
        assert!(!is_not_modified(&older, &cached));
        assert!(!is_not_modified(&Request::new(), &cached));
    }
}
