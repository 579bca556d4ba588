//! End-to-end transformation tests over in-memory containers.
//!
//! Every test drives a real [`MediaTransformer`] worker and waits for the
//! terminal callback, so the full job lifecycle is exercised: setup, the
//! round-robin frame loop, release and cleanup.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use mediaflow::io::{
    self, MediaRange, MediaTarget, MemoryMediaSource, MemoryMediaTarget, SharedMediaSource, SharedMediaTarget,
};
use mediaflow::{
    BufferFlags, BufferInfo, CallbackContext, Decoder, DequeueStatus, Encoder, FixedDiskSpace, Frame, FrameSync,
    MediaFormat, MediaTransformer, PassthroughBufferEncoder, PassthroughDecoder, Phase, RenderMode, RenderStatus,
    Renderer, Surface, TrackTransform, TrackTransformationInfo, TranscoderErrorKind, TransformError,
    TransformationListener, TransformationOptions, TransformerOptions, mime,
};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Started,
    Progress(f32),
    Completed(Vec<TrackTransformationInfo>),
    Cancelled,
    Failed {
        message: String,
        kind: Option<TranscoderErrorKind>,
        track: Option<usize>,
        phase: Option<Phase>,
        disk: Option<(u64, u64)>,
    },
}

impl Event {
    fn is_terminal(&self) -> bool {
        !matches!(self, Event::Started | Event::Progress(_))
    }
}

struct RecordingListener(Mutex<mpsc::Sender<Event>>);

impl RecordingListener {
    fn new() -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel();
        (Arc::new(Self(Mutex::new(sender))), receiver)
    }

    fn send(&self, event: Event) {
        let _ = self.0.lock().unwrap().send(event);
    }
}

impl TransformationListener for RecordingListener {
    fn on_started(&self, _id: &str) {
        self.send(Event::Started);
    }

    fn on_progress(&self, _id: &str, progress: f32) {
        self.send(Event::Progress(progress));
    }

    fn on_completed(&self, _id: &str, stats: &[TrackTransformationInfo]) {
        self.send(Event::Completed(stats.to_vec()));
    }

    fn on_cancelled(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
        self.send(Event::Cancelled);
    }

    fn on_error(&self, _id: &str, error: &TransformError, _stats: &[TrackTransformationInfo]) {
        let disk = match error {
            TransformError::InsufficientDiskSpace { estimated, available } => Some((*estimated, *available)),
            _ => None,
        };
        self.send(Event::Failed {
            message: error.to_string(),
            kind: error.transcoder_kind(),
            track: error.track(),
            phase: error.phase(),
            disk,
        });
    }
}

/// Collect events up to and including the terminal one.
fn events_until_terminal(receiver: &mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = receiver.recv_timeout(WAIT).expect("terminal callback not delivered");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn progress_values(events: &[Event]) -> Vec<f32> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Progress(value) => Some(*value),
            _ => None,
        })
        .collect()
}

fn options() -> TransformationOptions {
    TransformationOptions::new().with_disk_space_check(false)
}

fn audio_source(samples: i64, spacing_us: i64) -> MemoryMediaSource {
    let format = MediaFormat::audio(mime::AUDIO_AAC, 48_000, 2)
        .with_bit_rate(128_000)
        .with_duration_us(samples * spacing_us);
    let mut source = MemoryMediaSource::new(vec![format]);
    for i in 0..samples {
        source.push_sample(0, vec![i as u8; 8], i * spacing_us, BufferFlags::KEY_FRAME);
    }
    source
}

/// Video on track 0 with a sync sample every fifth frame, audio on track 1.
fn interleaved_source(selection: MediaRange) -> MemoryMediaSource {
    let mut source = MemoryMediaSource::new(vec![
        MediaFormat::video(mime::VIDEO_AVC, 640, 360)
            .with_frame_rate(30.0)
            .with_duration_us(10_000),
        MediaFormat::audio(mime::AUDIO_AAC, 44_100, 2).with_duration_us(10_000),
    ])
    .with_selection(selection);
    for i in 0..10i64 {
        let flags = if i % 5 == 0 {
            BufferFlags::KEY_FRAME
        } else {
            BufferFlags::empty()
        };
        source.push_sample(0, vec![i as u8, 0xaa], i * 1_000, flags);
        source.push_sample(1, vec![i as u8, 0xbb], i * 1_000 + 200, BufferFlags::KEY_FRAME);
    }
    source
}

// ── Passthrough copies ─────────────────────────────────────────────

#[test]
fn passthrough_copy_is_byte_identical() {
    let source = audio_source(20, 1_000);
    let expected: Vec<Vec<u8>> = source.samples().iter().map(|s| s.data.clone()).collect();
    let source = io::share_source(source);
    let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "copy",
            vec![TrackTransform::builder(source, 0, target.clone()).build()],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert_eq!(events.first(), Some(&Event::Started));
    assert!(matches!(events.last(), Some(Event::Completed(_))));

    let target = target.lock().unwrap();
    assert!(target.is_released());
    let written: Vec<Vec<u8>> = target.samples(0).iter().map(|s| s.data.clone()).collect();
    assert_eq!(written, expected);
    assert_eq!(
        target.track_format(0).and_then(MediaFormat::mime),
        Some(mime::AUDIO_AAC)
    );
}

#[test]
fn trimmed_copy_rebases_both_tracks() {
    let source = io::share_source(interleaved_source(MediaRange::new(2_000, 6_000)));
    let target = Arc::new(Mutex::new(MemoryMediaTarget::new(2)));
    let shared: SharedMediaTarget = target.clone();

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "trim",
            vec![
                TrackTransform::builder(source.clone(), 0, shared.clone()).build(),
                TrackTransform::builder(source, 1, shared).build(),
            ],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    let Some(Event::Completed(stats)) = events.last() else {
        panic!("expected completion, got {events:?}");
    };
    assert_eq!(stats.len(), 2);

    let target = target.lock().unwrap();
    let video: Vec<i64> = target.samples(0).iter().map(|s| s.info.presentation_time_us).collect();
    let audio: Vec<i64> = target.samples(1).iter().map(|s| s.info.presentation_time_us).collect();
    assert_eq!(video, [0, 1_000, 2_000, 3_000]);
    assert_eq!(audio, [200, 1_200, 2_200, 3_200]);
    assert!(video.iter().chain(&audio).all(|&t| t >= 0));
}

#[test]
fn selection_past_the_end_writes_nothing() {
    let source = io::share_source(audio_source(5, 1_000).with_selection(MediaRange::new(50_000, i64::MAX)));
    let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "empty",
            vec![TrackTransform::builder(source, 0, target.clone()).build()],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert!(matches!(events.last(), Some(Event::Completed(_))));
    assert!(target.lock().unwrap().samples(0).is_empty());
}

// ── Progress ───────────────────────────────────────────────────────

#[test]
fn progress_is_monotonic_and_ends_at_one() {
    let source = io::share_source(audio_source(200, 1_000));
    let target = io::share_target(MemoryMediaTarget::new(1));

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform(
            "progress",
            vec![TrackTransform::builder(source, 0, target).build()],
            listener,
            10,
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    let progress = progress_values(&events);
    assert!(!progress.is_empty());
    assert!(progress.len() <= 11, "too many reports: {progress:?}");
    assert!(progress.windows(2).all(|pair| pair[0] < pair[1]), "{progress:?}");
    assert_eq!(progress.last(), Some(&1.0));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn callbacks_run_on_worker_thread_in_order() {
    let transformer = MediaTransformer::with_options(
        TransformerOptions::new().with_callback_context(CallbackContext::Worker),
    )
    .unwrap();
    let source = io::share_source(audio_source(10, 1_000));
    let target = io::share_target(MemoryMediaTarget::new(1));
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "worker",
            vec![TrackTransform::builder(source, 0, target).build()],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert_eq!(events.first(), Some(&Event::Started));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

// ── Request lifecycle ──────────────────────────────────────────────

/// An encoder that never produces output, keeping its job running until
/// it is cancelled.
struct StalledEncoder {
    running: bool,
}

impl Encoder for StalledEncoder {
    fn init(&mut self, _target_format: &MediaFormat) -> Result<(), TransformError> {
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<Option<Surface>, TransformError> {
        Ok(None)
    }

    fn start(&mut self) -> Result<(), TransformError> {
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), TransformError> {
        Ok(())
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Ok(DequeueStatus::TryAgainLater)
    }

    fn input_frame(&mut self, _tag: usize) -> Option<&mut Frame> {
        None
    }

    fn queue_input_frame(&mut self, _tag: usize) -> Result<(), TransformError> {
        Ok(())
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Ok(DequeueStatus::TryAgainLater)
    }

    fn output_frame(&self, _tag: usize) -> Option<&Frame> {
        None
    }

    fn release_output_frame(&mut self, _tag: usize) -> Result<(), TransformError> {
        Ok(())
    }

    fn output_format(&self) -> Option<MediaFormat> {
        None
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {}

    fn name(&self) -> String {
        "StalledEncoder".to_string()
    }
}

fn stalled_transform() -> TrackTransform {
    let source = io::share_source(audio_source(10, 1_000));
    let target = io::share_target(MemoryMediaTarget::new(1));
    TrackTransform::builder(source, 0, target)
        .with_decoder(Box::new(PassthroughDecoder::new(64)))
        .with_encoder(Box::new(StalledEncoder { running: false }))
        .with_target_format(MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2))
        .build()
}

#[test]
fn duplicate_id_is_rejected_while_in_flight() {
    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options("job", vec![stalled_transform()], listener.clone(), options())
        .unwrap();

    let duplicate = transformer.transform_with_options("job", vec![stalled_transform()], listener, options());
    assert!(matches!(duplicate, Err(TransformError::DuplicateRequest(id)) if id == "job"));

    transformer.cancel("job");
    let events = events_until_terminal(&receiver);
    assert_eq!(events.last(), Some(&Event::Cancelled));
}

#[test]
fn cancel_stops_a_running_job() {
    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options("cancel", vec![stalled_transform()], listener, options())
        .unwrap();

    assert_eq!(receiver.recv_timeout(WAIT).unwrap(), Event::Started);
    transformer.cancel("cancel");

    let events = events_until_terminal(&receiver);
    assert_eq!(events.last(), Some(&Event::Cancelled));
    assert!(!events.iter().any(|e| matches!(e, Event::Completed(_) | Event::Failed { .. })));
}

#[test]
fn release_cancels_and_rejects_new_work() {
    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options("released", vec![stalled_transform()], listener.clone(), options())
        .unwrap();
    assert_eq!(receiver.recv_timeout(WAIT).unwrap(), Event::Started);

    transformer.release();

    let again = transformer.transform_with_options("again", vec![stalled_transform()], listener, options());
    assert!(matches!(again, Err(TransformError::Released)));
    // Callbacks are no longer delivered after release.
    assert!(!matches!(
        receiver.recv_timeout(Duration::from_millis(200)),
        Ok(Event::Completed(_) | Event::Failed { .. })
    ));
}

// ── Failures and cleanup ───────────────────────────────────────────

/// Passes input through but fails on its first output poll after start.
struct FailingEncoder {
    inner: PassthroughBufferEncoder,
}

impl Encoder for FailingEncoder {
    fn init(&mut self, target_format: &MediaFormat) -> Result<(), TransformError> {
        self.inner.init(target_format)
    }

    fn create_input_surface(&mut self) -> Result<Option<Surface>, TransformError> {
        Ok(None)
    }

    fn start(&mut self) -> Result<(), TransformError> {
        self.inner.start()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), TransformError> {
        self.inner.signal_end_of_input_stream()
    }

    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError> {
        self.inner.dequeue_input_frame(timeout)
    }

    fn input_frame(&mut self, tag: usize) -> Option<&mut Frame> {
        self.inner.input_frame(tag)
    }

    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        self.inner.queue_input_frame(tag)
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Err(TransformError::transcoder(TranscoderErrorKind::InternalCodecError).with_detail("device lost"))
    }

    fn output_frame(&self, tag: usize) -> Option<&Frame> {
        self.inner.output_frame(tag)
    }

    fn release_output_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        self.inner.release_output_frame(tag)
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.inner.output_format()
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn release(&mut self) {
        self.inner.release();
    }

    fn name(&self) -> String {
        "FailingEncoder".to_string()
    }
}

#[test]
fn codec_error_deletes_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let target = io::share_target(MemoryMediaTarget::create_file(&output, 2).unwrap());
    let source = io::share_source(interleaved_source(MediaRange::default()));
    assert!(output.exists());

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "broken",
            vec![
                TrackTransform::builder(source.clone(), 0, target.clone()).build(),
                TrackTransform::builder(source, 1, target)
                    .with_decoder(Box::new(PassthroughDecoder::new(16)))
                    .with_encoder(Box::new(FailingEncoder {
                        inner: PassthroughBufferEncoder::new(16),
                    }))
                    .with_target_format(MediaFormat::audio(mime::AUDIO_RAW, 44_100, 2))
                    .build(),
            ],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    let Some(Event::Failed { kind, track, message, .. }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert_eq!(*kind, Some(TranscoderErrorKind::InternalCodecError));
    assert_eq!(*track, Some(1));
    assert!(message.contains("device lost"), "{message}");
    assert!(!output.exists(), "partial output was not deleted");
}

#[test]
fn missing_encoder_is_a_configuration_error() {
    let source = io::share_source(audio_source(4, 1_000));
    let target = io::share_target(MemoryMediaTarget::new(1));
    let transform = TrackTransform::builder(source, 0, target)
        .with_decoder(Box::new(PassthroughDecoder::new(16)))
        .with_target_format(MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2))
        .build();

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options("no-encoder", vec![transform], listener, options())
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert!(!events.contains(&Event::Started));
    assert!(matches!(
        events.last(),
        Some(Event::Failed { kind: Some(TranscoderErrorKind::EncoderNotProvided), track: Some(0), .. })
    ));
}

#[test]
fn insufficient_disk_space_fails_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("big.bin");
    let source = MemoryMediaSource::new(vec![
        MediaFormat::audio(mime::AUDIO_AAC, 48_000, 2)
            .with_bit_rate(8_000_000)
            .with_duration_us(10_000_000),
    ]);
    let source = io::share_source(source);
    let target = io::share_target(MemoryMediaTarget::create_file(&output, 1).unwrap());

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "disk",
            vec![TrackTransform::builder(source, 0, target).build()],
            listener,
            TransformationOptions::new().with_disk_space_probe(Arc::new(FixedDiskSpace(Some(1_000)))),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert!(!events.contains(&Event::Started));
    let Some(Event::Failed { disk: Some((estimated, available)), .. }) = events.last() else {
        panic!("expected a disk space failure, got {events:?}");
    };
    // 8 Mbit/s for ten seconds, plus ten percent.
    assert_eq!(*estimated, 11_000_000);
    assert_eq!(*available, 1_000);
    assert!(!output.exists());
}

#[test]
fn unknown_free_space_skips_the_check() {
    let source = io::share_source(audio_source(4, 1_000));
    let target = io::share_target(MemoryMediaTarget::new(1));

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "unknown-space",
            vec![TrackTransform::builder(source, 0, target).build()],
            listener,
            TransformationOptions::new().with_disk_space_probe(Arc::new(FixedDiskSpace(None))),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert!(matches!(events.last(), Some(Event::Completed(_))));
}

// ── Audio path ─────────────────────────────────────────────────────

#[test]
fn audio_path_reencodes_through_buffer_renderer() {
    let source = io::share_source(audio_source(12, 20_000).with_selection(MediaRange::new(40_000, 200_000)));
    let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));
    let target_format = MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2);

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "audio",
            vec![
                TrackTransform::builder(source, 0, target.clone())
                    .with_decoder(Box::new(PassthroughDecoder::new(64)))
                    .with_encoder(Box::new(PassthroughBufferEncoder::new(64)))
                    .with_target_format(target_format)
                    .build(),
            ],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    let Some(Event::Completed(stats)) = events.last() else {
        panic!("expected completion, got {events:?}");
    };
    assert_eq!(stats[0].decoder_codec.as_deref(), Some("PassthroughDecoder"));
    assert_eq!(stats[0].encoder_codec.as_deref(), Some("PassthroughEncoder"));
    assert_eq!(
        stats[0].target_format.as_ref().and_then(MediaFormat::mime),
        Some(mime::AUDIO_RAW)
    );

    let target = target.lock().unwrap();
    let times: Vec<i64> = target.samples(0).iter().map(|s| s.info.presentation_time_us).collect();
    assert_eq!(times, [0, 20_000, 40_000, 60_000, 80_000, 100_000, 120_000, 140_000]);
    assert_eq!(target.samples(0)[0].data, vec![2u8; 8]);
}

#[test]
fn audio_frames_larger_than_encoder_slots_are_written_whole() {
    let source = io::share_source(audio_source(10, 20_000));
    let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "split-audio",
            vec![
                TrackTransform::builder(source, 0, target.clone())
                    .with_decoder(Box::new(PassthroughDecoder::new(8)))
                    .with_encoder(Box::new(PassthroughBufferEncoder::new(4)))
                    .with_target_format(MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2))
                    .build(),
            ],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert!(matches!(events.last(), Some(Event::Completed(_))), "{events:?}");

    let target = target.lock().unwrap();
    let written: Vec<u8> = target.samples(0).iter().flat_map(|s| s.data.clone()).collect();
    let expected: Vec<u8> = (0..10u8).flat_map(|i| [i; 8]).collect();
    assert_eq!(written, expected);

    // Each eight byte frame lands in two four byte slots sharing its timestamp.
    let times: Vec<i64> = target.samples(0).iter().map(|s| s.info.presentation_time_us).collect();
    assert_eq!(times.len(), 20);
    assert!(times.chunks(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(times[18], 9 * 20_000);
}

/// Memory target whose writes to one track fail.
struct FullDiskTarget {
    inner: MemoryMediaTarget,
    failing_track: usize,
}

impl MediaTarget for FullDiskTarget {
    fn add_track(&mut self, format: &MediaFormat, target_track: usize) -> Result<usize, TransformError> {
        self.inner.add_track(format, target_track)
    }

    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<(), TransformError> {
        if track == self.failing_track {
            return Err(TransformError::MediaTarget {
                path: None,
                reason: "disk full".to_string(),
            });
        }
        self.inner.write_sample_data(track, data, info)
    }

    fn release(&mut self) -> Result<(), TransformError> {
        self.inner.release()
    }

    fn output_file_path(&self) -> Option<PathBuf> {
        None
    }
}

#[test]
fn target_write_failure_names_track_and_phase() {
    let source = io::share_source(interleaved_source(MediaRange::default()));
    let target = io::share_target(FullDiskTarget {
        inner: MemoryMediaTarget::new(2),
        failing_track: 1,
    });

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(
            "full-disk",
            vec![
                TrackTransform::builder(source.clone(), 0, target.clone()).build(),
                TrackTransform::builder(source, 1, target).build(),
            ],
            listener,
            options(),
        )
        .unwrap();

    let events = events_until_terminal(&receiver);
    let Some(Event::Failed { kind, track, phase, message, .. }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert_eq!(*kind, None);
    assert_eq!(*track, Some(1));
    assert_eq!(*phase, Some(Phase::Encode));
    assert!(message.contains("disk full"), "{message}");
}

// ── Video path ─────────────────────────────────────────────────────

/// Stand-in for the GPU: what the decoder drew for the renderer, and what
/// the renderer drew for the encoder.
#[derive(Default)]
struct Surfaces {
    decoded: Mutex<VecDeque<i64>>,
    encoder_input: Mutex<VecDeque<i64>>,
    sync: FrameSync,
}

const RENDERER_SURFACE: u64 = 1;
const ENCODER_SURFACE: u64 = 2;

/// Decodes by passing samples through, and draws rendered frames onto
/// the renderer's surface.
struct SurfaceDecoder {
    inner: PassthroughDecoder,
    surfaces: Arc<Surfaces>,
    surface: Option<Surface>,
    released_frames: Arc<Mutex<usize>>,
}

impl Decoder for SurfaceDecoder {
    fn init(&mut self, format: &MediaFormat, surface: Option<Surface>) -> Result<(), TransformError> {
        self.surface = surface;
        self.inner.init(format, None)
    }

    fn start(&mut self) -> Result<(), TransformError> {
        self.inner.start()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError> {
        self.inner.dequeue_input_frame(timeout)
    }

    fn input_frame(&mut self, tag: usize) -> Option<&mut Frame> {
        self.inner.input_frame(tag)
    }

    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        self.inner.queue_input_frame(tag)
    }

    fn dequeue_output_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError> {
        self.inner.dequeue_output_frame(timeout)
    }

    fn output_frame(&self, tag: usize) -> Option<&Frame> {
        self.inner.output_frame(tag)
    }

    fn release_output_frame(&mut self, tag: usize, render: bool) -> Result<(), TransformError> {
        *self.released_frames.lock().unwrap() += 1;
        if render && self.surface == Some(Surface::new(RENDERER_SURFACE)) {
            if let Some(frame) = self.inner.output_frame(tag) {
                self.surfaces
                    .decoded
                    .lock()
                    .unwrap()
                    .push_back(frame.info.presentation_time_us);
                self.surfaces.sync.notify_frame_available();
            }
        }
        self.inner.release_output_frame(tag, false)
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.inner.output_format()
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn release(&mut self) {
        self.inner.release();
    }

    fn name(&self) -> String {
        "SurfaceDecoder".to_string()
    }
}

struct SurfaceRenderer {
    surfaces: Arc<Surfaces>,
    output: Option<Surface>,
    released: Arc<Mutex<bool>>,
}

impl Renderer for SurfaceRenderer {
    fn init(
        &mut self,
        output_surface: Option<Surface>,
        _source_format: Option<&MediaFormat>,
        _target_format: Option<&MediaFormat>,
    ) -> Result<(), TransformError> {
        self.output = output_surface;
        Ok(())
    }

    fn input_surface(&self) -> Option<Surface> {
        Some(Surface::new(RENDERER_SURFACE))
    }

    fn render_frame(
        &mut self,
        frame: Option<&Frame>,
        presentation_time_ns: i64,
        _encoder: &mut dyn Encoder,
    ) -> Result<RenderStatus, TransformError> {
        assert!(frame.is_none());
        self.surfaces.sync.await_frame()?;
        self.surfaces.decoded.lock().unwrap().pop_front();
        if self.output == Some(Surface::new(ENCODER_SURFACE)) {
            self.surfaces
                .encoder_input
                .lock()
                .unwrap()
                .push_back(presentation_time_ns / 1_000);
        }
        Ok(RenderStatus::Rendered)
    }

    fn release(&mut self) {
        *self.released.lock().unwrap() = true;
    }

    fn mode(&self) -> RenderMode {
        RenderMode::Surface
    }
}

/// Encodes whatever the renderer drew onto its input surface.
struct SurfaceEncoder {
    surfaces: Arc<Surfaces>,
    format: Option<MediaFormat>,
    running: bool,
    format_reported: bool,
    end_of_input: bool,
    end_of_stream_sent: bool,
    produced: HashMap<usize, Frame>,
    next_tag: usize,
}

impl SurfaceEncoder {
    fn new(surfaces: Arc<Surfaces>) -> Self {
        Self {
            surfaces,
            format: None,
            running: false,
            format_reported: false,
            end_of_input: false,
            end_of_stream_sent: false,
            produced: HashMap::new(),
            next_tag: 0,
        }
    }

    fn produce(&mut self, presentation_time_us: i64, flags: BufferFlags, size: usize) -> DequeueStatus {
        let tag = self.next_tag;
        self.next_tag += 1;
        let mut frame = Frame::new(tag, size);
        frame.buffer.fill(0x5a);
        frame.info.set(0, size, presentation_time_us, flags);
        self.produced.insert(tag, frame);
        DequeueStatus::Frame(tag)
    }
}

impl Encoder for SurfaceEncoder {
    fn init(&mut self, target_format: &MediaFormat) -> Result<(), TransformError> {
        self.format = Some(target_format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<Option<Surface>, TransformError> {
        Ok(Some(Surface::new(ENCODER_SURFACE)))
    }

    fn start(&mut self) -> Result<(), TransformError> {
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), TransformError> {
        self.end_of_input = true;
        Ok(())
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Ok(DequeueStatus::TryAgainLater)
    }

    fn input_frame(&mut self, _tag: usize) -> Option<&mut Frame> {
        None
    }

    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        Err(TransformError::transcoder(TranscoderErrorKind::NoFrameAvailable)
            .with_detail(format!("surface encoder has no input slot {tag}")))
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        if !self.format_reported {
            self.format_reported = true;
            return Ok(DequeueStatus::OutputFormatChanged);
        }
        let drawn = self.surfaces.encoder_input.lock().unwrap().pop_front();
        if let Some(presentation_time_us) = drawn {
            return Ok(self.produce(presentation_time_us, BufferFlags::KEY_FRAME, 4));
        }
        if self.end_of_input && !self.end_of_stream_sent {
            self.end_of_stream_sent = true;
            return Ok(self.produce(0, BufferFlags::END_OF_STREAM, 0));
        }
        Ok(DequeueStatus::TryAgainLater)
    }

    fn output_frame(&self, tag: usize) -> Option<&Frame> {
        self.produced.get(&tag)
    }

    fn release_output_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        self.produced.remove(&tag);
        Ok(())
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.format.clone()
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        self.produced.clear();
    }

    fn name(&self) -> String {
        "SurfaceEncoder".to_string()
    }
}

const FRAME_US: i64 = 33_333;

/// Thirty frames at 30 fps, every one a sync frame.
fn video_source(selection: MediaRange) -> SharedMediaSource {
    let mut source = MemoryMediaSource::new(vec![
        MediaFormat::video(mime::VIDEO_AVC, 320, 240)
            .with_frame_rate(30.0)
            .with_duration_us(30 * FRAME_US),
    ])
    .with_selection(selection);
    for i in 0..30 {
        source.push_sample(0, vec![i as u8; 16], i * FRAME_US, BufferFlags::KEY_FRAME);
    }
    io::share_source(source)
}

struct VideoRun {
    target: Arc<Mutex<MemoryMediaTarget>>,
    released_frames: Arc<Mutex<usize>>,
    renderer_released: Arc<Mutex<bool>>,
    events: Vec<Event>,
}

/// Transcode track 0 of `source` to 15 fps through the surface codecs.
fn run_video(id: &str, source: SharedMediaSource) -> VideoRun {
    let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));
    let surfaces = Arc::new(Surfaces::default());
    let released_frames = Arc::new(Mutex::new(0));
    let renderer_released = Arc::new(Mutex::new(false));
    let transform = TrackTransform::builder(source, 0, target.clone())
        .with_decoder(Box::new(SurfaceDecoder {
            inner: PassthroughDecoder::new(16),
            surfaces: surfaces.clone(),
            surface: None,
            released_frames: released_frames.clone(),
        }))
        .with_renderer(Box::new(SurfaceRenderer {
            surfaces: surfaces.clone(),
            output: None,
            released: renderer_released.clone(),
        }))
        .with_encoder(Box::new(SurfaceEncoder::new(surfaces)))
        .with_target_format(MediaFormat::video(mime::VIDEO_AVC, 320, 240).with_frame_rate(15.0))
        .build();

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options(id, vec![transform], listener, options())
        .unwrap();

    VideoRun {
        target,
        released_frames,
        renderer_released,
        events: events_until_terminal(&receiver),
    }
}

#[test]
fn video_path_halves_frame_rate() {
    let run = run_video("video", video_source(MediaRange::default()));
    assert!(matches!(run.events.last(), Some(Event::Completed(_))), "{:?}", run.events);
    assert!(*run.renderer_released.lock().unwrap());

    // Every decoded frame goes back to the decoder once, rendered or not,
    // plus the end-of-stream frame.
    assert_eq!(*run.released_frames.lock().unwrap(), 31);

    let target = run.target.lock().unwrap();
    let times: Vec<i64> = target.samples(0).iter().map(|s| s.info.presentation_time_us).collect();
    let expected: Vec<i64> = (0..15).map(|i| i * 2 * FRAME_US).collect();
    assert_eq!(times, expected);
    assert_eq!(target.track_format(0).and_then(|f| f.frame_rate), Some(15.0));
}

#[test]
fn trimmed_video_path_rebases_rendered_frames() {
    // Frames 10..20 fall inside the selection.
    let selection = MediaRange::new(10 * FRAME_US, 20 * FRAME_US);
    let run = run_video("video-trim", video_source(selection));
    assert!(matches!(run.events.last(), Some(Event::Completed(_))), "{:?}", run.events);

    let target = run.target.lock().unwrap();
    let times: Vec<i64> = target.samples(0).iter().map(|s| s.info.presentation_time_us).collect();
    let expected: Vec<i64> = (0..5).map(|i| i * 2 * FRAME_US).collect();
    assert_eq!(times, expected);

    // The job seeks to frame 10, so ten frames plus end of stream come back.
    assert_eq!(*run.released_frames.lock().unwrap(), 11);
}

#[test]
fn buffer_renderer_is_rejected_for_video() {
    let source = io::share_source(MemoryMediaSource::new(vec![MediaFormat::video(
        mime::VIDEO_AVC,
        320,
        240,
    )]));
    let target = io::share_target(MemoryMediaTarget::new(1));
    let transform = TrackTransform::builder(source, 0, target)
        .with_decoder(Box::new(PassthroughDecoder::new(16)))
        .with_renderer(Box::new(mediaflow::PassthroughSoftwareRenderer::new()))
        .with_encoder(Box::new(PassthroughBufferEncoder::new(16)))
        .with_target_format(MediaFormat::video(mime::VIDEO_AVC, 320, 240))
        .build();

    let transformer = MediaTransformer::new().unwrap();
    let (listener, receiver) = RecordingListener::new();
    transformer
        .transform_with_options("buffer-video", vec![transform], listener, options())
        .unwrap();

    let events = events_until_terminal(&receiver);
    assert!(matches!(
        events.last(),
        Some(Event::Failed { kind: Some(TranscoderErrorKind::RendererNotSurfaceCapable), .. })
    ));
}
