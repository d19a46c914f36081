//! Scriptable stages shared by the pipeline integration tests.
//!
//! Every stage is driven by a [`Control`] the test keeps a handle to, so
//! keys, validities and failures can change between requests the way a
//! real source file or template would.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_cache::{
    CacheStore, KeyFragment, MemoryStore, PipelineCacheKey, StageKind, Validity,
};
use strata_pipeline::{
    Cacheable, CachingPipeline, PipelineConfig, ProcessOutcome, PipelineError, Producer,
    Reader, Request, Serializer, Stage, StageError, Transform,
};

/// Shared knobs and counters for one fake stage.
#[derive(Default)]
pub struct Control {
    key: Mutex<Option<String>>,
    validity: Mutex<Option<Validity>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl Control {
    pub fn cacheable(key: &str, validity: Validity) -> Arc<Self> {
        Arc::new(Self {
            key: Mutex::new(Some(key.to_string())),
            validity: Mutex::new(Some(validity)),
            ..Self::default()
        })
    }

    pub fn uncacheable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_key(&self, key: Option<&str>) {
        *self.key.lock().unwrap() = key.map(str::to_string);
    }

    pub fn set_validity(&self, validity: Option<Validity>) {
        *self.validity.lock().unwrap() = validity;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, role: &str) -> Result<(), StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StageError::Failed(format!("{role} refused to run")));
        }
        Ok(())
    }
}

/// A stage usable in any role. Its output is derived from its label.
pub struct FakeStage {
    role: &'static str,
    label: &'static str,
    mime_type: Option<&'static str>,
    control: Arc<Control>,
}

impl FakeStage {
    pub fn new(role: &'static str, label: &'static str, control: &Arc<Control>) -> Self {
        Self {
            role,
            label,
            mime_type: Some("text/html"),
            control: Arc::clone(control),
        }
    }

    pub fn without_mime_type(mut self) -> Self {
        self.mime_type = None;
        self
    }
}

impl Stage for FakeStage {
    fn role(&self) -> &str {
        self.role
    }

    fn source(&self) -> &str {
        self.label
    }

    fn cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }
}

impl Cacheable for FakeStage {
    fn cache_key(&self) -> Option<String> {
        self.control.key.lock().unwrap().clone()
    }

    fn validity(&self) -> Option<Validity> {
        self.control.validity.lock().unwrap().clone()
    }
}

impl Producer for FakeStage {
    fn generate(&mut self) -> Result<Vec<u8>, StageError> {
        self.control.enter(self.role)?;
        Ok(self.label.as_bytes().to_vec())
    }
}

impl Transform for FakeStage {
    fn transform(&mut self, mut input: Vec<u8>) -> Result<Vec<u8>, StageError> {
        self.control.enter(self.role)?;
        input.push(b'+');
        input.extend_from_slice(self.label.as_bytes());
        Ok(input)
    }
}

impl Serializer for FakeStage {
    fn mime_type(&self) -> Option<&str> {
        self.mime_type
    }

    fn serialize(&mut self, input: Vec<u8>, out: &mut dyn Write) -> Result<(), StageError> {
        self.control.enter(self.role)?;
        out.write_all(b"<")?;
        out.write_all(&input)?;
        out.write_all(b">")?;
        Ok(())
    }
}

impl Reader for FakeStage {
    fn mime_type(&self) -> Option<&str> {
        self.mime_type
    }

    fn generate(&mut self, out: &mut dyn Write) -> Result<(), StageError> {
        self.control.enter(self.role)?;
        out.write_all(self.label.as_bytes())?;
        Ok(())
    }
}

/// A sink whose peer has gone away.
pub struct HungUp;

impl Write for HungUp {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))
    }
}

/// Controls of a producer, two transforms and a serializer.
pub struct Chain {
    pub producer: Arc<Control>,
    pub xslt: Arc<Control>,
    pub i18n: Arc<Control>,
    pub serializer: Arc<Control>,
}

impl Chain {
    /// A fully cacheable chain keyed `a`, `b`, `c`, `d`.
    pub fn cacheable() -> Self {
        Self {
            producer: Control::cacheable("a", Validity::TimeStamp(1)),
            xslt: Control::cacheable("b", Validity::TimeStamp(1)),
            i18n: Control::cacheable("c", Validity::TimeStamp(1)),
            serializer: Control::cacheable("d", Validity::Nop),
        }
    }

    pub fn pipeline(&self, store: Arc<dyn CacheStore>, config: PipelineConfig) -> CachingPipeline {
        let mut pipeline = CachingPipeline::new(store, config);
        pipeline
            .set_producer(FakeStage::new("file", "index.xml", &self.producer))
            .add_transform(FakeStage::new("xslt", "page.xsl", &self.xslt))
            .add_transform(FakeStage::new("i18n", "messages", &self.i18n))
            .set_serializer(FakeStage::new("html", "", &self.serializer));
        pipeline
    }

    /// Stage call counts, in chain order.
    pub fn calls(&self) -> [usize; 4] {
        [
            self.producer.calls(),
            self.xslt.calls(),
            self.i18n.calls(),
            self.serializer.calls(),
        ]
    }

    /// Key of the first `len` chain positions as the pipeline builds it.
    pub fn key(&self, len: usize) -> PipelineCacheKey {
        let fragments = [
            KeyFragment::new(StageKind::Producer, "file", "index.xml", "a"),
            KeyFragment::new(StageKind::Transform, "xslt", "page.xsl", "b"),
            KeyFragment::new(StageKind::Transform, "i18n", "messages", "c"),
            KeyFragment::new(StageKind::Serializer, "html", "", "d"),
        ];
        fragments.into_iter().take(len).collect()
    }
}

/// Output of the whole chain.
pub const FULL_OUTPUT: &str = "<index.xml+page.xsl+messages>";

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_capacity(64))
}

pub fn run(
    pipeline: &mut CachingPipeline,
    request: &Request,
) -> Result<(ProcessOutcome, String), PipelineError> {
    let mut out = Vec::new();
    let outcome = pipeline.process(request, &mut out)?;
    Ok((outcome, String::from_utf8(out).unwrap()))
}
