//! The driver that runs one request to completion.
//!
//! A [`TransformationJob`] owns the transcoders of a request and polls them
//! round-robin on the worker thread until every track has reached end of
//! stream, the request is cancelled, or something fails. Whatever happens,
//! it stops every transcoder, releases sources and targets, deletes the
//! output of unsuccessful requests and posts exactly one terminal callback.

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use crate::configuration::TransformationOptions;
use crate::error::{Phase, TransformError, TranscoderErrorKind};
use crate::estimate;
use crate::io::{self, SeekMode, SharedMediaSource, SharedMediaTarget};
use crate::listener::JobNotifier;
use crate::progress::{CancellationToken, ProgressThrottle};
use crate::stats::TransformationStatsCollector;
use crate::track_transform::TrackTransform;
use crate::transcoder::{TrackTranscoder, TranscodeResult, TranscoderFactory};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// One request: its tracks, its settings and where its events go.
pub(crate) struct TransformationJob {
    transforms: Vec<TrackTransform>,
    sources: Vec<SharedMediaSource>,
    targets: Vec<SharedMediaTarget>,
    options: TransformationOptions,
    factory: Arc<dyn TranscoderFactory>,
    cancellation: CancellationToken,
    notifier: JobNotifier,
    on_finish: Option<Box<dyn FnOnce() + Send>>,
}

impl TransformationJob {
    pub(crate) fn new(
        transforms: Vec<TrackTransform>,
        options: TransformationOptions,
        factory: Arc<dyn TranscoderFactory>,
        cancellation: CancellationToken,
        notifier: JobNotifier,
    ) -> Self {
        let mut sources: Vec<SharedMediaSource> = Vec::new();
        let mut targets: Vec<SharedMediaTarget> = Vec::new();
        for transform in &transforms {
            if !sources.iter().any(|source| Arc::ptr_eq(source, &transform.source)) {
                sources.push(transform.source.clone());
            }
            if !targets.iter().any(|target| Arc::ptr_eq(target, &transform.target)) {
                targets.push(transform.target.clone());
            }
        }

        Self {
            transforms,
            sources,
            targets,
            options,
            factory,
            cancellation,
            notifier,
            on_finish: None,
        }
    }

    /// Run `on_finish` right before the terminal callback is posted.
    #[must_use]
    pub(crate) fn with_on_finish(mut self, on_finish: Box<dyn FnOnce() + Send>) -> Self {
        self.on_finish = Some(on_finish);
        self
    }

    /// Run the request on the calling thread.
    pub(crate) fn run(mut self) -> JobOutcome {
        let mut stats = TransformationStatsCollector::new();
        let mut transcoders: Vec<Box<dyn TrackTranscoder>> = Vec::new();

        log::info!("Starting transformation {}", self.notifier.id());
        let result = self.transform(&mut transcoders, &mut stats);
        let released = self.release(&mut transcoders, &mut stats, matches!(result, Ok(true)));

        match (result, released) {
            (Ok(true), Ok(())) => {
                log::info!("Transformation {} completed", self.notifier.id());
                self.finish();
                self.notifier.completed(stats.into_stats());
                JobOutcome::Completed
            }
            (Ok(true), Err(error)) | (Err(error), _) => {
                log::error!("Transformation {} failed: {error}", self.notifier.id());
                self.finish();
                self.notifier.error(error, stats.into_stats());
                JobOutcome::Failed
            }
            (Ok(false), _) => {
                log::info!("Transformation {} cancelled", self.notifier.id());
                self.finish();
                self.notifier.cancelled(stats.into_stats());
                JobOutcome::Cancelled
            }
        }
    }

    fn finish(&mut self) {
        if let Some(on_finish) = self.on_finish.take() {
            on_finish();
        }
    }

    /// Everything up to the end of the frame loop. `Ok(false)` means cancelled.
    fn transform(
        &mut self,
        transcoders: &mut Vec<Box<dyn TrackTranscoder>>,
        stats: &mut TransformationStatsCollector,
    ) -> Result<bool, TransformError> {
        if self.cancellation.is_cancelled() {
            return Ok(false);
        }

        for transform in &self.transforms {
            let format = io::lock(&transform.source).track_format(transform.source_track)?;
            stats.add_source_track(format);
        }

        if self.options.verify_disk_space {
            self.verify_disk_space()?;
        }

        if self.transforms.is_empty() {
            return Err(TransformError::in_phase(TranscoderErrorKind::NoTracksFound, Phase::Setup));
        }

        for (track, transform) in self.transforms.drain(..).enumerate() {
            let transcoder = self
                .factory
                .create(transform)
                .map_err(|e| e.during(Phase::Setup).for_track(track))?;
            stats.set_track_codecs(track, transcoder.decoder_name(), transcoder.encoder_name());
            transcoders.push(transcoder);
        }

        for (track, transcoder) in transcoders.iter_mut().enumerate() {
            transcoder
                .start()
                .map_err(|e| e.during(Phase::Start).for_track(track))?;
        }

        for source in &self.sources {
            let mut source = io::lock(source);
            let start = source.selection().start();
            source.seek_to(start, SeekMode::PreviousSync);
        }

        self.notifier.started();
        self.run_frame_loop(transcoders, stats)
    }

    fn verify_disk_space(&self) -> Result<(), TransformError> {
        let estimated = estimate::estimated_target_size(&self.transforms, self.options.fallback_audio_bitrate)?;
        let padded = (estimated as f64 * (1.0 + self.options.size_padding)) as u64;
        let output = self
            .targets
            .iter()
            .find_map(|target| io::lock(target).output_file_path());

        match self.options.disk_space_probe.available_bytes(output.as_deref()) {
            Some(available) if padded > available => Err(TransformError::InsufficientDiskSpace {
                estimated: padded,
                available,
            }),
            Some(available) => {
                log::debug!("Estimated output size {padded} bytes, {available} bytes available");
                Ok(())
            }
            None => {
                log::warn!("Could not determine available disk space, skipping check");
                Ok(())
            }
        }
    }

    fn run_frame_loop(
        &mut self,
        transcoders: &mut [Box<dyn TrackTranscoder>],
        stats: &mut TransformationStatsCollector,
    ) -> Result<bool, TransformError> {
        let mut throttle = ProgressThrottle::new(self.options.granularity);
        let track_count = transcoders.len() as f32;

        loop {
            if self.cancellation.is_cancelled() {
                return Ok(false);
            }

            let mut completed = true;
            let mut progress = 0.0;
            for (track, transcoder) in transcoders.iter_mut().enumerate() {
                let started = Instant::now();
                let result = transcoder.process_next_frame().map_err(|e| e.for_track(track))?;
                stats.increase_track_processing_duration(track, started.elapsed());

                completed &= result == TranscodeResult::EosReached;
                progress += transcoder.progress();
            }

            if let Some(progress) = throttle.update(progress / track_count) {
                self.notifier.progress(progress);
            }

            if completed {
                if throttle.last() < 1.0 {
                    self.notifier.progress(1.0);
                }
                return Ok(true);
            }
        }
    }

    /// Stop transcoders and release containers. Output files are deleted
    /// unless the job succeeded and every target finalised cleanly.
    fn release(
        &mut self,
        transcoders: &mut [Box<dyn TrackTranscoder>],
        stats: &mut TransformationStatsCollector,
        success: bool,
    ) -> Result<(), TransformError> {
        for (track, transcoder) in transcoders.iter_mut().enumerate() {
            transcoder.stop();
            stats.set_target_format(track, transcoder.target_format().cloned());
        }

        for source in &self.sources {
            io::lock(source).release();
        }

        let mut result = Ok(());
        for target in &self.targets {
            if let Err(error) = io::lock(target).release() {
                log::error!("Failed to release media target: {error}");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }

        if !success || result.is_err() {
            self.delete_outputs();
        }
        result
    }

    fn delete_outputs(&self) {
        for target in &self.targets {
            let Some(path) = io::lock(target).output_file_path() else {
                continue;
            };
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("Deleted output {}", path.display()),
                Err(error) => log::warn!("Failed to delete output {}: {error}", path.display()),
            }
        }
    }
}
