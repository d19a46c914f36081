//! Reader pipelines: a single stage whose output is cached whole.

use std::io::{BufWriter, Write};
use std::sync::Arc;

use strata_cache::{KeyFragment, PipelineCacheKey, StageKind};
use tracing::{debug, instrument, warn};

use crate::controller::{serve_cached, CachingPipeline};
use crate::error::PipelineError;
use crate::outcome::{CacheUse, ProcessOutcome, ResponseStatus};
use crate::sink::CaptureSink;
use crate::stage::{Request, Stage};
use crate::validation::{self, Verdict};

impl CachingPipeline {
    #[instrument(skip_all, fields(internal = request.internal))]
    pub(crate) fn process_reader(
        &mut self,
        request: &Request,
        out: &mut dyn Write,
        mime_type: String,
    ) -> Result<ProcessOutcome, PipelineError> {
        let store = Arc::clone(&self.store);
        let window = self.config.expiry_window();
        let enabled = self.config.enabled;
        let buffer_size = self.config.output_buffer_size;
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| PipelineError::Incomplete("missing reader".to_string()))?;
        reader
            .setup(request)
            .map_err(|e| PipelineError::stage(reader.role(), e))?;

        let key: Option<PipelineCacheKey> = if enabled && !request.internal {
            reader
                .cacheable()
                .and_then(|c| c.cache_key())
                .map(|k| {
                    std::iter::once(KeyFragment::new(
                        StageKind::Reader,
                        reader.role(),
                        reader.source(),
                        k,
                    ))
                    .collect()
                })
        } else {
            None
        };

        let mut writer = BufWriter::with_capacity(buffer_size, out);
        if let Some(key) = &key {
            if let Some(mut cached) = store.get(key) {
                if !cached.matches_key_len(1) {
                    warn!(
                        key = %key,
                        validities = cached.validities.len(),
                        "stored reader entry is malformed, removing"
                    );
                    store.remove(key);
                } else if validation::apply_expiry(store.as_ref(), key, &mut cached, window) {
                    debug!(key = %key, "entry within its explicit expiry");
                    return serve_cached(request, cached, mime_type, &mut writer);
                } else {
                    let fresh = || reader.cacheable().and_then(|c| c.validity());
                    match validation::judge(&cached.validities, |_| fresh()) {
                        Verdict::Valid => {
                            debug!(key = %key, "entry is valid");
                            return serve_cached(request, cached, mime_type, &mut writer);
                        }
                        Verdict::Stale { .. } => debug!(key = %key, "entry is stale"),
                        Verdict::Unusable { .. } => {
                            debug!(key = %key, "entry cannot be validated, removing");
                            store.remove(key);
                        }
                    }
                }
            } else {
                debug!(key = %key, "cache miss");
            }
        }

        let validity = key
            .as_ref()
            .and_then(|_| reader.cacheable())
            .and_then(|c| c.validity());
        if key.is_some() && validity.is_none() {
            debug!("reader has no validity, response will not be cached");
        }
        let mut sink = if validity.is_some() {
            CaptureSink::new(&mut writer)
        } else {
            CaptureSink::passthrough(&mut writer)
        };
        reader
            .generate(&mut sink)
            .map_err(|e| PipelineError::stage(reader.role(), e))?;
        let bytes_written = sink.written();
        let captured = sink.into_captured();
        writer.flush().map_err(PipelineError::output)?;

        let mut committed = false;
        let mut last_modified = None;
        if let (Some(key), Some(validity), Some(bytes)) = (&key, validity, captured) {
            last_modified = validation::commit(
                store.as_ref(),
                key,
                vec![validity],
                bytes,
                Some(mime_type.clone()),
                window,
            );
            committed = last_modified.is_some();
        }

        Ok(ProcessOutcome {
            cache: if key.is_some() {
                CacheUse::Miss
            } else {
                CacheUse::Uncached
            },
            status: ResponseStatus::Ok,
            content_type: Some(mime_type),
            last_modified,
            bytes_written,
            committed,
        })
    }
}
