use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::cover::{normalize_cover, COVER_MEDIA_TYPE};
use crate::error::RecordError;
use crate::parser::{BookParser, ParserRegistry, SIGNATURE_LEN};
use crate::record::{RecordStore, RecordUpdate};
use crate::sanitize;
use crate::status::BookStatus;
use crate::storage::{ObjectKey, StorageBackend};
use crate::worker::job::{IngestRequest, JobOutcome, JobResult};

use super::budget::run_with_budget;
use super::config::PipelineConfig;
use super::context::IngestContext;
use super::error::{IngestError, IngestWarning, StepError};
use super::retry::retry_transient;

/// Runs one upload through parse, store-original, store-cover and finalize.
///
/// Safe to run more than once for the same book: every write is a
/// conditional transition, so a replay of a finished record does nothing
/// and a concurrent duplicate loses with `Superseded`.
pub struct IngestionJob {
    config: Arc<PipelineConfig>,
    registry: ParserRegistry,
    storage: Arc<dyn StorageBackend>,
    records: Arc<dyn RecordStore>,
}

impl IngestionJob {
    pub fn new(
        config: Arc<PipelineConfig>,
        storage: Arc<dyn StorageBackend>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let registry = ParserRegistry::new(&config.parsers);
        Self {
            config,
            registry,
            storage,
            records,
        }
    }

    pub async fn run(&self, request: IngestRequest) -> JobResult {
        let span = info_span!("ingest",
            book_id = %request.book_id,
            filename = %sanitize::redact_path(&request.upload.path),
        );
        self.run_steps(IngestContext::new(request))
            .instrument(span)
            .await
    }

    async fn run_steps(&self, mut ctx: IngestContext) -> JobResult {
        // Step 0: entry guard
        let record = match self.records.get_record(ctx.book_id()) {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("record no longer exists, nothing to do");
                return ctx.finish(JobOutcome::Missing);
            }
            Err(e) => return self.abandon(ctx, e).await,
        };

        if record.status.is_terminal() {
            debug!(status = %record.status, "record already finished, skipping");
            return ctx.finish(JobOutcome::Skipped {
                status: record.status,
            });
        }

        if let Err(e) = self.records.update_record(
            ctx.book_id(),
            &RecordUpdate::transition(BookStatus::Processing),
            record.status,
        ) {
            return self.abandon(ctx, e).await;
        }

        match self.process(&mut ctx).await {
            Ok(()) => self.finalize(ctx).await,
            Err(StepError::Ingest(e)) => self.fail(ctx, e).await,
            Err(StepError::Record(e)) => self.abandon(ctx, e).await,
        }
    }

    async fn process(&self, ctx: &mut IngestContext) -> Result<(), StepError> {
        // Step 1: read upload and pick a parser
        self.step_detect(ctx)
            .instrument(info_span!("detect"))
            .await?;

        // Step 2: store original
        self.step_store_original(ctx)
            .instrument(info_span!("store_original"))
            .await?;

        // Step 3: parse
        self.step_parse(ctx).instrument(info_span!("parse")).await?;

        // Step 4: cover, best effort
        self.step_store_cover(ctx)
            .instrument(info_span!("store_cover"))
            .await;

        Ok(())
    }

    async fn step_detect(&self, ctx: &mut IngestContext) -> Result<(), StepError> {
        let bytes = tokio::fs::read(&ctx.request.upload.path)
            .await
            .map_err(|source| IngestError::Upload { source })?;

        let header = &bytes[..bytes.len().min(SIGNATURE_LEN)];
        let parser = self
            .registry
            .resolve(header, ctx.request.upload.filename_hint.as_deref())
            .map_err(IngestError::from)?;

        debug!(format = %parser.format(), bytes = bytes.len(), "format detected");
        ctx.parser = Some(parser);
        ctx.bytes = Some(Arc::from(bytes));
        Ok(())
    }

    async fn step_store_original(&self, ctx: &mut IngestContext) -> Result<(), StepError> {
        let (Some(bytes), Some(parser)) = (ctx.bytes.clone(), ctx.parser.as_ref()) else {
            return Ok(());
        };

        let hint = format!("{}/original.{}", ctx.book_id(), parser.format().extension());
        let key = self.put_with_retry("put_original", &hint, &bytes).await?;
        ctx.original_key = Some(key.clone());

        self.records.update_record(
            ctx.book_id(),
            &RecordUpdate::transition(BookStatus::Processing)
                .with_original_key(key)
                .with_file_size(bytes.len() as u64),
            BookStatus::Processing,
        )?;
        Ok(())
    }

    async fn step_parse(&self, ctx: &mut IngestContext) -> Result<(), StepError> {
        let (Some(bytes), Some(parser)) = (ctx.bytes.clone(), ctx.parser.clone()) else {
            return Ok(());
        };

        let parsed = run_with_budget(self.config.parse_timeout, move || parser.parse(&bytes))
            .await?
            .map_err(IngestError::from)?;

        debug!(
            fields = parsed.metadata.len(),
            pages = ?parsed.page_count,
            has_cover = parsed.cover.is_some(),
            "document parsed"
        );
        ctx.parsed = Some(parsed);
        // The buffer is no longer needed once parsed.
        ctx.bytes = None;
        Ok(())
    }

    async fn step_store_cover(&self, ctx: &mut IngestContext) {
        let Some(cover) = ctx.parsed.as_ref().and_then(|p| p.cover.clone()) else {
            return;
        };

        let covers = self.config.covers.clone();
        let normalized = match run_with_budget(self.config.parse_timeout, move || {
            normalize_cover(&cover.data, &covers)
        })
        .await
        {
            Ok(Ok(normalized)) => normalized,
            Ok(Err(e)) => return skip_cover(ctx, e.to_string()),
            Err(e) => return skip_cover(ctx, e.to_string()),
        };

        let cover_hint = format!("{}/cover.jpg", ctx.book_id());
        let cover_key = match self
            .put_with_retry("put_cover", &cover_hint, &normalized.image)
            .await
        {
            Ok(key) => key,
            Err(e) => return skip_cover(ctx, e.to_string()),
        };

        let thumb_hint = format!("{}/cover_thumbnail.jpg", ctx.book_id());
        let thumb_key = match self
            .put_with_retry("put_thumbnail", &thumb_hint, &normalized.thumbnail)
            .await
        {
            Ok(key) => key,
            Err(e) => {
                self.delete_quietly(&cover_key).await;
                return skip_cover(ctx, e.to_string());
            }
        };

        debug!(
            width = normalized.width,
            height = normalized.height,
            media_type = COVER_MEDIA_TYPE,
            "cover stored"
        );
        ctx.cover_key = Some(cover_key);
        ctx.thumbnail_key = Some(thumb_key);
    }

    /// Step 5: single conditional write of everything the job produced.
    async fn finalize(&self, ctx: IngestContext) -> JobResult {
        let Some(parsed) = ctx.parsed.as_ref() else {
            return self.abandon_with("pipeline finished without a parsed document", ctx);
        };

        let format = parsed.format;
        let mut update = RecordUpdate::transition(BookStatus::Completed).with_parsed(
            format,
            parsed.metadata.clone(),
            parsed.page_count,
        );
        if let (Some(cover), Some(thumb)) = (&ctx.cover_key, &ctx.thumbnail_key) {
            update = update.with_cover(cover.clone(), thumb.clone());
        }

        match self
            .records
            .update_record(ctx.book_id(), &update, BookStatus::Processing)
        {
            Ok(()) => {
                info!(format = %format, cover = ctx.cover_key.is_some(), "ingestion completed");
                let cover_stored = ctx.cover_key.is_some();
                ctx.finish(JobOutcome::Completed {
                    format,
                    cover_stored,
                })
            }
            Err(e) => self.abandon(ctx, e).await,
        }
    }

    async fn fail(&self, ctx: IngestContext, error: IngestError) -> JobResult {
        let detail = error.to_string();
        match &error {
            IngestError::Storage(source) => warn!(error = %source, "ingestion failed"),
            other => warn!(error = %other, "ingestion failed"),
        }

        match self.records.update_record(
            ctx.book_id(),
            &RecordUpdate::transition(BookStatus::Failed).with_error(detail.clone()),
            BookStatus::Processing,
        ) {
            Ok(()) => ctx.finish(JobOutcome::Failed { detail }),
            Err(e) => self.abandon(ctx, e).await,
        }
    }

    /// Ends the job after the record store refused or failed a write.
    async fn abandon(&self, ctx: IngestContext, error: RecordError) -> JobResult {
        match error {
            RecordError::NotFound(_) => {
                // Deleted mid-flight: drop what was stored, never resurrect.
                for key in ctx.stored_keys() {
                    self.delete_quietly(&key).await;
                }
                info!("record deleted during ingestion, stored objects removed");
                ctx.finish(JobOutcome::Missing)
            }
            RecordError::Conflict { current, .. } => {
                // Another run owns the record, and possibly the same keys.
                info!(current = %current, "record moved on, abandoning run");
                ctx.finish(JobOutcome::Superseded { current })
            }
            RecordError::Database(e) => {
                let reason = e.to_string();
                self.abandon_with(&reason, ctx)
            }
        }
    }

    fn abandon_with(&self, reason: &str, ctx: IngestContext) -> JobResult {
        warn!(reason, "ingestion aborted, record left for the sweep");
        ctx.finish(JobOutcome::Aborted {
            reason: reason.to_string(),
        })
    }

    async fn put_with_retry(
        &self,
        operation: &'static str,
        hint: &str,
        data: &[u8],
    ) -> Result<ObjectKey, IngestError> {
        let storage = self.storage.as_ref();
        retry_transient(&self.config.retry, operation, move || storage.put(hint, data)).await
    }

    async fn delete_quietly(&self, key: &ObjectKey) {
        if let Err(e) = self.storage.delete(key).await {
            warn!(key = %key, error = %e, "failed to delete stored object");
        }
    }
}

fn skip_cover(ctx: &mut IngestContext, reason: String) {
    warn!(reason = %reason, "cover skipped");
    ctx.warnings.push(IngestWarning::CoverSkipped { reason });
}
