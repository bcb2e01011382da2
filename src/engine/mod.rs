//! Request orchestration
//!
//! [`Engine::process`] turns a request path into result bytes:
//!
//! 1. parse the path and verify its signature;
//! 2. coalesce on the fingerprint, so identical concurrent requests share
//!    one execution;
//! 3. the leader loads the source and runs the processor chain in a spawned
//!    task under the request deadline, then settles every follower;
//! 4. the result is written back to the storages in a detached task under
//!    the save deadline, after the response is already on its way.
//!
//! Dropping the future returned by `process` does not cancel the leader's
//! spawned work, so followers still get their result.

pub mod timeout;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::blob::Blob;
use crate::coalescing::{CoalesceError, LeaderGuard, RequestCoalescer, Slot};
use crate::constants::DEFAULT_COALESCING_GRACE_MS;
use crate::error::GatewayError;
use crate::loader::{Loader, SourceResolver};
use crate::params::{self, signature, ParseOptions, Params};
use crate::processor::{Processor, ProcessorChain, ProcessorError};
use crate::storage::{storage_key, ResultWriter, Storage};

pub use timeout::TimeoutController;

type Outcome = Result<Blob, GatewayError>;

struct EngineInner {
    resolver: SourceResolver,
    chain: ProcessorChain,
    writer: ResultWriter,
    secret: Vec<u8>,
    parse_options: ParseOptions,
    timeouts: TimeoutController,
    coalescer: Option<RequestCoalescer<Outcome>>,
}

/// The gateway core. Cheap to clone; all clones share backends and state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn loader_count(&self) -> usize {
        self.inner.resolver.len()
    }

    pub fn processor_count(&self) -> usize {
        self.inner.chain.len()
    }

    pub fn storage_count(&self) -> usize {
        self.inner.writer.len()
    }

    /// Fingerprints currently being processed
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .coalescer
            .as_ref()
            .map_or(0, |c| c.in_flight_count())
    }

    /// Process a request path.
    ///
    /// `path` must already be percent-decoded. `unsafe_allowed` enables
    /// `unsafe/` paths and, with an empty secret, skips verification.
    pub async fn process(&self, path: &str, unsafe_allowed: bool) -> Result<Blob, GatewayError> {
        let started = Instant::now();
        let result = self.process_inner(path, unsafe_allowed).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(blob) => tracing::info!(
                path = %path,
                outcome = "served",
                bytes = blob.len(),
                content_type = blob.content_type(),
                elapsed_ms,
                "Request processed"
            ),
            Err(e) => tracing::info!(
                path = %path,
                outcome = e.outcome().as_str(),
                status = e.status(),
                error = %e,
                elapsed_ms,
                "Request failed"
            ),
        }
        result
    }

    async fn process_inner(&self, path: &str, unsafe_allowed: bool) -> Outcome {
        let params = params::parse_with(path, &self.inner.parse_options)?;
        signature::verify_params(&params, &self.inner.secret, unsafe_allowed)?;

        // Reject disabled filters before spending a fetch on them
        if let Some(name) = self.inner.chain.disabled_filter(&params) {
            return Err(ProcessorError::Disabled(name.to_string()).into());
        }

        let key = params.fingerprint();

        let Some(coalescer) = &self.inner.coalescer else {
            return self.spawn_leader(params, key, None).await;
        };

        match coalescer.begin(&key).await {
            Ok(Slot::Leader(guard)) => self.spawn_leader(params, key, Some(guard)).await,
            Ok(Slot::Follower(outcome)) => {
                tracing::debug!(fingerprint = %key, "Joined in-flight request");
                outcome
            }
            Err(CoalesceError::Saturated { limit }) => Err(GatewayError::Overloaded { limit }),
            Err(e @ CoalesceError::LeaderAbandoned) => {
                Err(GatewayError::upstream("engine", e.to_string()))
            }
        }
    }

    /// Run the leader's work on its own task and wait for it.
    ///
    /// A panic in the task drops the guard unsettled, which wakes followers
    /// with `LeaderAbandoned`; this caller sees an upstream fault.
    async fn spawn_leader(
        &self,
        params: Params,
        key: String,
        guard: Option<LeaderGuard<Outcome>>,
    ) -> Outcome {
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let outcome = engine.fetch_and_transform(&params).await;
            if let Some(guard) = guard {
                guard.settle(outcome.clone());
            }
            if let Ok(blob) = &outcome {
                if !params.meta {
                    engine.spawn_save(storage_key(&key), blob.clone());
                }
            }
            outcome
        });

        task.await
            .map_err(|e| GatewayError::upstream("engine", format!("request task failed: {e}")))?
    }

    async fn fetch_and_transform(&self, params: &Params) -> Outcome {
        let inner = &self.inner;
        inner
            .timeouts
            .run_request(async {
                let source = inner
                    .resolver
                    .load(&params.image)
                    .await
                    .map_err(|e| e.into_gateway_error(&params.image))?;
                Ok(inner.chain.apply(source, params).await?)
            })
            .await
    }

    /// Write `blob` back under the storage `key` without blocking the response
    fn spawn_save(&self, key: String, blob: Blob) {
        if self.inner.writer.is_empty() {
            return;
        }
        let writer = self.inner.writer.clone();
        let timeouts = self.inner.timeouts;
        tokio::spawn(async move {
            match timeouts.run_save(writer.save(&key, &blob)).await {
                Ok(reports) => {
                    let failed = reports.iter().filter(|r| r.result.is_err()).count();
                    tracing::debug!(
                        key = %key,
                        storages = reports.len(),
                        failed,
                        "Write-back finished"
                    );
                }
                Err(_) => tracing::warn!(
                    key = %key,
                    timeout_ms = timeouts.save_timeout().as_millis() as u64,
                    "PersistenceFault: write-back timed out"
                ),
            }
        });
    }
}

/// Options-style constructor for [`Engine`]
pub struct EngineBuilder {
    loaders: Vec<Arc<dyn Loader>>,
    processors: Vec<Arc<dyn Processor>>,
    storages: Vec<Arc<dyn Storage>>,
    secret: Vec<u8>,
    strict_params: bool,
    timeouts: TimeoutController,
    coalescing: bool,
    coalescing_grace: Duration,
    max_in_flight: Option<usize>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            processors: Vec::new(),
            storages: Vec::new(),
            secret: Vec::new(),
            strict_params: false,
            timeouts: TimeoutController::default(),
            coalescing: true,
            coalescing_grace: Duration::from_millis(DEFAULT_COALESCING_GRACE_MS),
            max_in_flight: None,
        }
    }

    pub fn with_loaders(mut self, loaders: Vec<Arc<dyn Loader>>) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn with_processors(mut self, processors: Vec<Arc<dyn Processor>>) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_storages(mut self, storages: Vec<Arc<dyn Storage>>) -> Self {
        self.storages = storages;
        self
    }

    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts = TimeoutController::new(timeout, self.timeouts.save_timeout());
        self
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts = TimeoutController::new(self.timeouts.request_timeout(), timeout);
        self
    }

    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalescing = enabled;
        self
    }

    pub fn with_coalescing_grace(mut self, grace: Duration) -> Self {
        self.coalescing_grace = grace;
        self
    }

    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    pub fn with_strict_params(mut self, strict: bool) -> Self {
        self.strict_params = strict;
        self
    }

    pub fn build(self) -> Engine {
        let coalescer = self
            .coalescing
            .then(|| RequestCoalescer::with_limit(self.coalescing_grace, self.max_in_flight));

        Engine {
            inner: Arc::new(EngineInner {
                resolver: SourceResolver::new(self.loaders),
                chain: ProcessorChain::new(self.processors),
                writer: ResultWriter::new(self.storages),
                secret: self.secret,
                parse_options: ParseOptions {
                    strict: self.strict_params,
                },
                timeouts: self.timeouts,
                coalescer,
            }),
        }
    }
}
