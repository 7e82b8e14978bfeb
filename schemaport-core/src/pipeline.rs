//! Export run orchestration.
//!
//! One run walks Connecting → Listing → Sampling → Inferring → Serializing →
//! Done, or ends in Failed from any of them. Every run yields exactly one
//! `SchemaDocument`; failures are embedded as `ExportError`s instead of being
//! returned to the caller.
//!
//! # Resource Guarantees
//! - The connector opened at Connecting is closed on every exit path,
//!   including a panic inside connector code
//! - At most `max_concurrency` entities are sampled at once
//! - Each entity sample is bounded by `sample_timeout`
//! - Cancellation stops new entity samples; in-flight ones may finish

use crate::Result;
use crate::connectors::{ConnectionDescriptor, Connector, ConnectorFactory, ExportOptions, FailurePolicy};
use crate::error::SchemaportError;
use crate::models::{
    Entity, EntityRef, ExportError, RelationCandidate, SchemaDocument, SourceMetadata,
};
use crate::relations::RelationInferrer;
use crate::sampler::{EntitySample, SchemaSampler};
use crate::serializer::SchemaSerializer;
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Connecting,
    Listing,
    Sampling,
    Inferring,
    Serializing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Connecting => "connecting",
            PipelineState::Listing => "listing",
            PipelineState::Sampling => "sampling",
            PipelineState::Inferring => "inferring",
            PipelineState::Serializing => "serializing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one export run.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub run_id: Uuid,
    /// Terminal state, `Done` or `Failed`
    pub state: PipelineState,
    pub document: SchemaDocument,
}

/// Drives the connector registry, sampler, relation inferrer and serializer
/// for export runs.
#[derive(Clone)]
pub struct ExportPipeline {
    factory: Arc<dyn ConnectorFactory>,
    options: ExportOptions,
    cancel: CancellationToken,
}

impl fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Mutable bookkeeping for one run.
struct RunState {
    state: PipelineState,
    errors: Vec<ExportError>,
}

impl RunState {
    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state, to = %next, "Export state transition");
        self.state = next;
    }

    fn record(&mut self, error: ExportError) {
        match &error.entity {
            Some(entity) if error.fatal => {
                tracing::error!(entity = %entity, fatal = true, "{}", error.message);
            }
            Some(entity) => tracing::warn!(entity = %entity, fatal = false, "{}", error.message),
            None if error.fatal => tracing::error!(fatal = true, "{}", error.message),
            None => tracing::warn!(fatal = false, "{}", error.message),
        }
        self.errors.push(error);
    }

    fn fail(&mut self, error: ExportError) {
        self.record(error);
        self.transition(PipelineState::Failed);
    }
}

impl ExportPipeline {
    pub fn new(factory: Arc<dyn ConnectorFactory>, options: ExportOptions) -> Self {
        Self {
            factory,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Builder method to tie the run to a caller's cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Runs one export against the descriptor.
    pub async fn run(&self, descriptor: &ConnectionDescriptor) -> ExportOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "export",
            %run_id,
            kind = %descriptor.kind,
            url = %descriptor.redacted_url()
        );

        async move {
            let started = std::time::Instant::now();
            let serializer = SchemaSerializer::new(SourceMetadata {
                kind: descriptor.kind,
                url: descriptor.redacted_url(),
                scope: descriptor.scope.clone(),
            });
            let mut run = RunState {
                state: PipelineState::Connecting,
                errors: Vec::new(),
            };

            let document = self.run_inner(descriptor, &serializer, &mut run).await;

            if run.state != PipelineState::Failed {
                run.transition(PipelineState::Done);
            }
            tracing::info!(
                state = %run.state,
                entities = document.entities.len(),
                relations = document.relations.len(),
                errors = document.errors.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Export finished"
            );

            ExportOutcome {
                run_id,
                state: run.state,
                document,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_inner(
        &self,
        descriptor: &ConnectionDescriptor,
        serializer: &SchemaSerializer,
        run: &mut RunState,
    ) -> SchemaDocument {
        if let Err(e) = self.options.validate() {
            run.fail(ExportError::for_run(e.to_string(), true));
            return serializer.failed(std::mem::take(&mut run.errors));
        }

        tracing::info!("Connecting to source");
        let connector = match self.factory.connect(descriptor).await {
            Ok(connector) => connector,
            Err(e) => {
                run.fail(ExportError::for_run(e.to_string(), true));
                return serializer.failed(std::mem::take(&mut run.errors));
            }
        };

        let exported = AssertUnwindSafe(self.export_with(connector.as_ref(), descriptor, run))
            .catch_unwind()
            .await;
        connector.close().await;
        tracing::debug!("Connector closed");

        let (entities, relations) = match exported {
            Ok(Some(result)) => result,
            Ok(None) => return serializer.failed(std::mem::take(&mut run.errors)),
            Err(_) => {
                run.fail(ExportError::for_run("connector panicked during export", true));
                return serializer.failed(std::mem::take(&mut run.errors));
            }
        };

        if run.state != PipelineState::Failed {
            run.transition(PipelineState::Serializing);
        }
        let errors = std::mem::take(&mut run.errors);
        match serializer.build(entities, relations, errors.clone()) {
            Ok(document) => document,
            Err(e) => {
                run.errors = errors;
                run.fail(ExportError::for_run(e.to_string(), true));
                serializer.failed(std::mem::take(&mut run.errors))
            }
        }
    }

    /// Listing, sampling and inference against an open connector.
    ///
    /// Returns `None` when nothing can go into the document but errors.
    async fn export_with(
        &self,
        connector: &dyn Connector,
        descriptor: &ConnectionDescriptor,
        run: &mut RunState,
    ) -> Option<(Vec<Entity>, Vec<RelationCandidate>)> {
        run.transition(PipelineState::Listing);
        let entity_refs = match connector.list_entities(&descriptor.scope).await {
            Ok(refs) => refs,
            Err(e) => {
                run.fail(ExportError::for_run(e.to_string(), true));
                return None;
            }
        };
        tracing::info!("Found {} entities", entity_refs.len());

        run.transition(PipelineState::Sampling);
        let entities = self.sample_all(connector, &entity_refs, run).await;

        if run.state == PipelineState::Failed {
            return Some((entities, Vec::new()));
        }

        run.transition(PipelineState::Inferring);
        let declared = match connector.list_declared_relations(&descriptor.scope).await {
            Ok(declared) => declared,
            Err(e) if e.is_unsupported() => {
                tracing::debug!("{}", e);
                Vec::new()
            }
            Err(e) => {
                run.record(ExportError::for_run(
                    format!("Declared relations unavailable: {}", e),
                    false,
                ));
                Vec::new()
            }
        };
        let relations = RelationInferrer::new(self.options.relations).infer(&entities, declared);

        Some((entities, relations))
    }

    /// Samples entities in enumeration order with bounded concurrency.
    async fn sample_all(
        &self,
        connector: &dyn Connector,
        entity_refs: &[EntityRef],
        run: &mut RunState,
    ) -> Vec<Entity> {
        let sampler = SchemaSampler::new(self.options.sampling.clone());
        let max_concurrency = self.options.max_concurrency.max(1) as usize;

        let mut samples = futures::stream::iter(entity_refs.iter().cloned())
            .map(|entity: EntityRef| {
                let sampler = &sampler;
                async move {
                    let result = if self.cancel.is_cancelled() {
                        Err(SchemaportError::Cancelled {
                            context: format!("sampling '{}' not started", entity),
                        })
                    } else {
                        self.sample_with_timeout(sampler, connector, &entity).await
                    };
                    (entity, result)
                }
            })
            .buffered(max_concurrency);

        let mut entities = Vec::with_capacity(entity_refs.len());
        let mut cancelled = false;

        while let Some((entity, result)) = samples.next().await {
            match result {
                Ok(sample) => {
                    if sample.is_empty() {
                        run.record(ExportError::for_entity(
                            &entity,
                            "entity returned no records",
                            false,
                        ));
                    }
                    entities.push(sample.entity);
                }
                Err(SchemaportError::Cancelled { .. }) => cancelled = true,
                Err(e)
                    if e.is_fatal_to_run()
                        || self.options.failure_policy == FailurePolicy::FailFast =>
                {
                    run.fail(ExportError::for_entity(&entity, e.to_string(), true));
                    return entities;
                }
                Err(e) => run.record(ExportError::for_entity(&entity, e.to_string(), false)),
            }
        }

        if cancelled {
            run.fail(ExportError::for_run("export cancelled before all entities were sampled", true));
        }

        entities
    }

    async fn sample_with_timeout(
        &self,
        sampler: &SchemaSampler,
        connector: &dyn Connector,
        entity: &EntityRef,
    ) -> Result<EntitySample> {
        let timeout = self.options.sample_timeout();
        tokio::time::timeout(timeout, sampler.sample(connector, entity))
            .await
            .map_err(|_| SchemaportError::SamplingTimeout {
                entity: entity.qualified_name(),
                timeout,
            })?
    }

    /// Samples a single entity outside a full export run.
    ///
    /// Opens its own connector and closes it before returning.
    ///
    /// # Errors
    /// Returns the connection, sampling or timeout error that stopped it
    pub async fn sample_entity(
        &self,
        descriptor: &ConnectionDescriptor,
        entity: &EntityRef,
    ) -> Result<EntitySample> {
        self.options.validate()?;
        if self.cancel.is_cancelled() {
            return Err(SchemaportError::Cancelled {
                context: format!("sampling '{}' not started", entity),
            });
        }

        let connector = self.factory.connect(descriptor).await?;
        let sampler = SchemaSampler::new(self.options.sampling.clone());
        let result = AssertUnwindSafe(self.sample_with_timeout(&sampler, connector.as_ref(), entity))
            .catch_unwind()
            .await;
        connector.close().await;

        result.unwrap_or_else(|_| {
            Err(SchemaportError::sampling(
                entity.qualified_name(),
                "connector panicked while sampling",
            ))
        })
    }
}
