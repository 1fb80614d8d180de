//! # Playback State Machine
//!
//! Single-owner state machine driving one external engine session. It runs
//! inside the coordinator task and reacts to three kinds of messages:
//!
//! - owner commands (seek, volume, shutdown, ...)
//! - completions of reader/engine requests it spawned
//! - notifications pushed by the engine through its listener
//!
//! Nothing here blocks or awaits; every asynchronous call is spawned through
//! the [`RequestSpawner`] and its outcome comes back as a [`Completion`].

use crate::config::{CoordinatorConfig, EngineMode};
use crate::crash_monitor::CrashMonitor;
use crate::error::{DrmError, ErrorSeverity, PlaybackError, SeekError};
use crate::pending::{DrmResponder, PendingTask, PendingTaskQueue};
use crate::requests::{RequestId, RequestSpawner, TrackRequests};
use crate::seek::{PendingSeek, SeekJob, SeekResponder};
use crate::snapshot::{PlayState, PlaybackSnapshot};
use crate::state::{
    EngineInit, PlaybackState, ReadingMetadata, SeekingData, ShutdownEngine, ShutdownFuture,
    StateKind,
};
use bridge_traits::engine::{
    EngineEvent, EngineFactory, EngineListener, EngineNotification, PlaybackEngine,
};
use bridge_traits::error::{EngineError, ReaderError, SeekRejection};
use bridge_traits::media::{
    AudioSample, CdmProxy, DisplaySize, InitFlags, MediaDuration, MediaInfo, MediaSample,
    SeekTarget, TrackSet, TrackType, VideoSample,
};
use bridge_traits::reader::MediaReader;
use core_runtime::events::{CoordinatorEvent, EventBus, NextFrameStatus};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Mailbox Messages
// ============================================================================

pub(crate) enum Message {
    Command(Command),
    Completion(Completion),
    Engine {
        generation: u64,
        notification: EngineNotification,
    },
}

pub(crate) enum Command {
    Seek {
        target: SeekTarget,
        reply: SeekResponder,
    },
    SetPlaybackRate(f64),
    SetVolume(f64),
    SetLooping(bool),
    SetPreservesPitch(bool),
    SetPlayState(PlayState),
    BindDrm {
        proxy: CdmProxy,
        reply: DrmResponder,
    },
    BufferedEndUpdated(Duration),
    Shutdown {
        reply: Option<oneshot::Sender<ShutdownFuture>>,
    },
}

#[derive(Debug)]
pub(crate) enum Completion {
    Metadata {
        id: RequestId,
        result: Result<MediaInfo, ReaderError>,
    },
    EngineInit {
        id: RequestId,
        result: Result<(), EngineError>,
    },
    AudioData {
        id: RequestId,
        result: Result<AudioSample, ReaderError>,
    },
    VideoData {
        id: RequestId,
        result: Result<VideoSample, ReaderError>,
    },
    WaitedForData {
        id: RequestId,
        track: TrackType,
        result: Result<TrackType, ReaderError>,
    },
    ReaderSeeked {
        id: RequestId,
        result: Result<Duration, SeekRejection>,
    },
    ReaderShutdown,
}

// ============================================================================
// State Machine
// ============================================================================

pub(crate) struct StateMachine {
    config: CoordinatorConfig,
    state: PlaybackState,
    reader: Arc<dyn MediaReader>,
    engine_factory: Arc<dyn EngineFactory>,
    engine: Option<Arc<dyn PlaybackEngine>>,
    /// Set once the current engine's `init` resolved.
    engine_ready: bool,
    /// Generation of the current engine; bumped for every engine created.
    generation: u64,
    crash_monitor: Arc<CrashMonitor>,
    events: EventBus,
    snapshot: Arc<RwLock<PlaybackSnapshot>>,
    spawner: RequestSpawner<Message>,
    tracks: TrackRequests,
    pending_tasks: PendingTaskQueue,
    pending_seek: PendingSeek,

    info: Option<MediaInfo>,
    position: Duration,
    duration: Option<MediaDuration>,
    has_enough_audio: bool,
    has_enough_video: bool,

    playback_rate: f64,
    volume: f64,
    looping: bool,
    preserves_pitch: bool,
    play_state: PlayState,
    key_system: Option<String>,

    error: Option<ErrorSeverity>,
    audible: bool,
    received_first_video_frame: bool,
    sent_first_frame_loaded: bool,
    sent_playback_ended: bool,
    finished: bool,
}

impl StateMachine {
    pub fn new(
        config: CoordinatorConfig,
        reader: Arc<dyn MediaReader>,
        engine_factory: Arc<dyn EngineFactory>,
        crash_monitor: Arc<CrashMonitor>,
        events: EventBus,
        snapshot: Arc<RwLock<PlaybackSnapshot>>,
        mailbox: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            config,
            state: PlaybackState::ReadingMetadata(ReadingMetadata::default()),
            reader,
            engine_factory,
            engine: None,
            engine_ready: false,
            generation: 0,
            crash_monitor,
            events,
            snapshot,
            spawner: RequestSpawner::new(mailbox),
            tracks: TrackRequests::default(),
            pending_tasks: PendingTaskQueue::default(),
            pending_seek: PendingSeek::default(),
            info: None,
            position: Duration::ZERO,
            duration: None,
            has_enough_audio: false,
            has_enough_video: false,
            playback_rate: 1.0,
            volume: 1.0,
            looping: false,
            preserves_pitch: true,
            play_state: PlayState::Paused,
            key_system: None,
            error: None,
            audible: false,
            received_first_video_frame: false,
            sent_first_frame_loaded: false,
            sent_playback_ended: false,
            finished: false,
        }
    }

    /// Kicks off metadata reading.
    pub fn start(&mut self) {
        self.read_metadata();
    }

    /// Whether the reader confirmed shutdown and the task can exit.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Command(command) => self.on_command(command),
            Message::Completion(completion) => self.on_completion(completion),
            Message::Engine {
                generation,
                notification,
            } => self.on_engine_notification(generation, notification),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Seek { target, reply } => self.invoke_seek(SeekJob::new(target, reply)),
            Command::SetPlaybackRate(rate) => {
                self.playback_rate = rate;
                self.apply_playback_rate();
            }
            Command::SetVolume(volume) => {
                self.volume = volume;
                self.apply_volume();
            }
            Command::SetLooping(looping) => {
                self.looping = looping;
                self.apply_looping();
            }
            Command::SetPreservesPitch(preserves_pitch) => {
                self.preserves_pitch = preserves_pitch;
                self.apply_preserves_pitch();
            }
            Command::SetPlayState(play_state) => {
                self.play_state = play_state;
                self.update_snapshot(|s| s.play_state = play_state);
                self.apply_play_state();
            }
            Command::BindDrm { proxy, reply } => self.bind_drm(proxy, reply),
            Command::BufferedEndUpdated(end) => self.on_buffered_end_updated(end),
            Command::Shutdown { reply } => {
                let future = self.shutdown();
                if let Some(reply) = reply {
                    let _ = reply.send(future);
                }
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        if let Completion::ReaderShutdown = completion {
            self.on_reader_shutdown();
            return;
        }
        if self.state.is_shutdown() || self.error.is_some() {
            trace!(?completion, "completion ignored");
            return;
        }

        match completion {
            Completion::Metadata { id, result } => self.on_metadata(id, result),
            Completion::EngineInit { id, result } => self.on_engine_init(id, result),
            Completion::AudioData { id, result } => {
                self.on_data(TrackType::Audio, id, result.map(MediaSample::Audio))
            }
            Completion::VideoData { id, result } => {
                self.on_data(TrackType::Video, id, result.map(MediaSample::Video))
            }
            Completion::WaitedForData { id, track, result } => {
                self.on_waited_for_data(track, id, result)
            }
            Completion::ReaderSeeked { id, result } => self.on_reader_seeked(id, result),
            Completion::ReaderShutdown => {}
        }
    }

    // ========================================================================
    // Metadata & Engine Initialization
    // ========================================================================

    fn read_metadata(&mut self) {
        debug!("reading metadata");
        let reader = self.reader.clone();
        let request = self.spawner.spawn(
            async move { reader.read_metadata().await },
            |id, result| Message::Completion(Completion::Metadata { id, result }),
        );
        if let PlaybackState::ReadingMetadata(state) = &mut self.state {
            state.request = Some(request);
        }
    }

    fn on_metadata(&mut self, id: RequestId, result: Result<MediaInfo, ReaderError>) {
        let PlaybackState::ReadingMetadata(state) = &mut self.state else {
            return;
        };
        if !state.request.as_ref().is_some_and(|r| r.is(id)) {
            return;
        }
        state.request = None;

        let mut info = match result {
            Ok(info) => info,
            Err(error) => {
                warn!(%error, "failed to read metadata");
                self.report_error(PlaybackError::Metadata(error));
                return;
            }
        };

        if let Some(reason) = self.unsupported_reason(&info) {
            info!(%reason, "external engine can't play this media");
            self.report_error(PlaybackError::EngineNotSupported { reason });
            return;
        }

        let duration = match (info.metadata_duration, info.unadjusted_end_time) {
            (Some(duration), _) => MediaDuration::Finite(duration),
            (None, Some(end)) => {
                let duration = end.saturating_sub(info.start_time);
                info.metadata_duration = Some(duration);
                MediaDuration::Finite(duration)
            }
            (None, None) => MediaDuration::Infinite,
        };
        let display_size = info.video.as_ref().map(|video| video.display);

        info!(
            audio = info.audio.as_ref().map(|a| a.mime_type.as_str()),
            video = info.video.as_ref().map(|v| v.mime_type.as_str()),
            encrypted = info.is_encrypted(),
            duration = ?duration,
            "metadata loaded"
        );

        self.info = Some(info.clone());
        self.update_snapshot(|s| s.display_size = display_size);
        self.set_duration(duration);
        self.emit(CoordinatorEvent::MetadataLoaded { info });

        self.change_state(PlaybackState::InitEngine(EngineInit::default()));
        self.init_engine();
    }

    fn unsupported_reason(&self, info: &MediaInfo) -> Option<String> {
        if self.config.engine_mode == EngineMode::Disabled {
            return Some("external engine disabled".to_string());
        }
        if !self.config.is_format_supported(info) {
            return Some(format!(
                "unsupported codecs (audio={}, video={})",
                info.audio.as_ref().map_or("none", |a| a.mime_type.as_str()),
                info.video.as_ref().map_or("none", |v| v.mime_type.as_str()),
            ));
        }
        if self.config.engine_mode == EngineMode::EncryptedOnly
            && !info.is_encrypted()
            && !self.reader.is_encrypted_custom_ident()
        {
            return Some("clear content is not allowed".to_string());
        }
        None
    }

    /// Creates a new engine generation and starts initializing it.
    fn init_engine(&mut self) {
        let Some(info) = self.info.clone() else {
            return;
        };

        self.generation += 1;
        self.engine_ready = false;
        let mailbox = self.spawner.mailbox();
        let listener = EngineListener::new(self.generation, move |generation, notification| {
            let _ = mailbox.send(Message::Engine {
                generation,
                notification,
            });
        });

        let engine = match self.engine_factory.create(listener) {
            Ok(engine) => engine,
            Err(error) => {
                self.on_engine_init_failed(error);
                return;
            }
        };

        let flags = InitFlags {
            should_preload: self.config.minimize_preroll,
            encrypted_custom_ident: self.reader.is_encrypted_custom_ident(),
        };
        info!(generation = self.generation, ?flags, "initializing engine");

        self.engine = Some(engine.clone());
        let request = self.spawner.spawn(
            async move { engine.init(info, flags).await },
            |id, result| Message::Completion(Completion::EngineInit { id, result }),
        );
        if let Some(state) = self.state.engine_init_mut() {
            state.request = Some(request);
        }
    }

    fn on_engine_init(&mut self, id: RequestId, result: Result<(), EngineError>) {
        let Some(state) = self.state.engine_init_mut() else {
            return;
        };
        if !state.request.as_ref().is_some_and(|r| r.is(id)) {
            return;
        }
        state.request = None;

        if let Err(error) = result {
            self.on_engine_init_failed(error);
            return;
        }
        let Some(engine) = self.engine.clone() else {
            return;
        };

        self.engine_ready = true;
        info!(engine_id = engine.id(), state = %self.state.kind(), "engine initialized");
        self.reader.update_media_engine_id(engine.id());

        if self.state.kind() == StateKind::InitEngine {
            self.start_running_engine();
        } else {
            // Recovered: bring the new engine back to where playback was.
            let target = SeekTarget::accurate(self.position);
            self.seek(SeekJob::internal(target));
        }
    }

    fn on_engine_init_failed(&mut self, error: EngineError) {
        let drm_bound = self.key_system.is_some();
        warn!(%error, drm_bound, "engine initialization failed");
        self.report_error(PlaybackError::EngineInitFailed { error, drm_bound });
    }

    // ========================================================================
    // Running
    // ========================================================================

    fn start_running_engine(&mut self) {
        self.change_state(PlaybackState::RunningEngine);
        if self.play_state == PlayState::Playing {
            if let Some(engine) = &self.engine {
                engine.play();
            }
        }

        self.running_engine_update(TrackType::Audio);
        self.running_engine_update(TrackType::Video);

        if !self.pending_tasks.is_empty() {
            debug!(count = self.pending_tasks.len(), "running pending tasks");
        }
        for task in self.pending_tasks.take_all() {
            self.run_pending_task(task);
        }
    }

    fn run_pending_task(&mut self, task: PendingTask) {
        trace!(task = task.name(), "pending task");
        match task {
            PendingTask::ApplyPlaybackRate => self.apply_playback_rate(),
            PendingTask::ApplyVolume => self.apply_volume(),
            PendingTask::ApplyLooping => self.apply_looping(),
            PendingTask::ApplyPreservesPitch => self.apply_preserves_pitch(),
            PendingTask::ApplyPlayState => self.apply_play_state(),
            PendingTask::Seek => {
                if let Some(job) = self.pending_seek.take() {
                    self.seek(job);
                }
            }
            PendingTask::BindDrm { proxy, reply } => self.bind_drm(proxy, reply),
        }
    }

    /// Engine notifications that ask for data are served while running, and
    /// while seeking once the reader has repositioned.
    fn should_run_engine_update(&self) -> bool {
        match &self.state {
            PlaybackState::RunningEngine => true,
            PlaybackState::SeekingData(seeking) => !seeking.waiting_reader_seeked,
            _ => false,
        }
    }

    fn running_engine_update(&mut self, track: TrackType) {
        if !self.has_enough(track) {
            self.request_data(track);
        }
    }

    fn request_data(&mut self, track: TrackType) {
        if !self.has_track(track) {
            return;
        }
        if !matches!(
            self.state.kind(),
            StateKind::RunningEngine | StateKind::SeekingData
        ) {
            return;
        }
        if self.tracks.is_tracking(track) || self.is_seeking() {
            trace!(track = %track, "data already requested or reader seeking");
            return;
        }

        let reader = self.reader.clone();
        let request = match track {
            TrackType::Audio => self.spawner.spawn(
                async move { reader.request_audio_data().await },
                |id, result| Message::Completion(Completion::AudioData { id, result }),
            ),
            TrackType::Video => {
                let threshold = self.video_threshold();
                self.spawner.spawn(
                    async move { reader.request_video_data(threshold).await },
                    |id, result| Message::Completion(Completion::VideoData { id, result }),
                )
            }
        };
        trace!(track = %track, request = ?request.id(), "data requested");
        self.tracks.set_data(track, request);
    }

    /// Video older than this is skipped by the reader.
    fn video_threshold(&self) -> Duration {
        self.state
            .seeking()
            .map_or(self.position, SeekingData::target_time)
    }

    fn on_data(&mut self, track: TrackType, id: RequestId, result: Result<MediaSample, ReaderError>) {
        if !self.tracks.complete_data(track, id) {
            return;
        }

        match result {
            Ok(sample) => {
                trace!(track = %track, time_us = sample.time().as_micros() as u64, "push sample");
                if let Some(engine) = &self.engine {
                    engine.push_sample(sample);
                }
                if track == TrackType::Video && !self.received_first_video_frame {
                    self.received_first_video_frame = true;
                    self.on_loaded_first_frame();
                }
                self.running_engine_update(track);
            }
            Err(error) => self.on_data_error(track, error),
        }
    }

    fn on_data_error(&mut self, track: TrackType, error: ReaderError) {
        match error {
            ReaderError::WaitingForData => {
                if self.state.kind() == StateKind::RunningEngine {
                    self.emit_next_frame(NextFrameStatus::UnavailableBuffering);
                }
                self.wait_for_data(track);
            }
            ReaderError::Canceled => self.request_data(track),
            ReaderError::EndOfStream => self.end_of_stream(track),
            // The engine reports host crashes on its own channel.
            ReaderError::RemoteCrashed => {
                debug!(track = %track, "reader request failed on remote crash")
            }
            error => {
                warn!(track = %track, %error, "data request failed");
                self.report_error(PlaybackError::Decode(error));
            }
        }
    }

    fn end_of_stream(&mut self, track: TrackType) {
        debug!(track = %track, "end of stream");
        if let Some(engine) = &self.engine {
            engine.notify_end_of_stream(track);
        }
    }

    fn wait_for_data(&mut self, track: TrackType) {
        if !self.has_track(track) || self.tracks.is_tracking(track) {
            return;
        }
        debug!(track = %track, "waiting for data");
        let reader = self.reader.clone();
        let request = self.spawner.spawn(
            async move { reader.wait_for_data(track).await },
            move |id, result| Message::Completion(Completion::WaitedForData { id, track, result }),
        );
        self.tracks.set_wait(track, request);
    }

    fn on_waited_for_data(
        &mut self,
        track: TrackType,
        id: RequestId,
        result: Result<TrackType, ReaderError>,
    ) {
        if !self.tracks.complete_wait(track, id) {
            return;
        }
        match result {
            Ok(_) => {
                debug!(track = %track, "data available");
                self.maybe_finish_wait_for_data();
            }
            Err(ReaderError::Canceled) => {
                debug!(track = %track, "wait for data canceled, waiting again");
                self.wait_for_data(track);
            }
            Err(error) => {
                warn!(track = %track, %error, "failed waiting for data");
                self.report_error(PlaybackError::WaitForData(error));
            }
        }
    }

    fn maybe_finish_wait_for_data(&mut self) {
        let still_waiting = TrackType::ALL
            .into_iter()
            .any(|track| self.has_track(track) && self.tracks.is_waiting(track));
        if still_waiting {
            return;
        }

        if self.is_seeking() {
            self.seek_reader();
            return;
        }
        if self.state.kind() == StateKind::RunningEngine {
            self.emit_next_frame(NextFrameStatus::Available);
        }
        self.running_engine_update(TrackType::Audio);
        self.running_engine_update(TrackType::Video);
    }

    // ========================================================================
    // Seeking
    // ========================================================================

    fn invoke_seek(&mut self, mut job: SeekJob) {
        if self.state.is_shutdown() || self.error.is_some() {
            job.reject(SeekError::Aborted);
            return;
        }
        let target = job.target();
        if !target.is_accurate() || target.video_only {
            warn!(?target, "unsupported seek type");
            job.reject(SeekError::Unsupported);
            return;
        }
        if !self.engine_ready {
            debug!(target_us = target.time.as_micros() as u64, "engine not ready, seek postponed");
            if self.pending_seek.replace(job) {
                self.pending_tasks.push(PendingTask::Seek);
            }
            return;
        }

        self.pending_seek.discard(SeekError::Superseded);
        self.seek(job);
    }

    fn seek(&mut self, mut job: SeekJob) {
        let kind = self.state.kind();
        if !matches!(
            kind,
            StateKind::RunningEngine | StateKind::SeekingData | StateKind::RecoverEngine
        ) {
            warn!(state = %kind, "seek in unexpected state");
            job.reject(SeekError::Aborted);
            return;
        }
        let Some(engine) = self.engine.clone() else {
            job.reject(SeekError::Aborted);
            return;
        };

        let target = job.time();
        info!(target_us = target.as_micros() as u64, state = %kind, "seek");
        if let PlaybackState::SeekingData(seeking) = &mut self.state {
            let mut previous = std::mem::replace(&mut seeking.job, job);
            previous.reject(SeekError::Superseded);
        } else {
            self.change_state(PlaybackState::SeekingData(SeekingData::new(job)));
        }

        self.sent_playback_ended = false;
        self.emit(CoordinatorEvent::SeekStarted { target });
        self.emit_next_frame(NextFrameStatus::UnavailableSeeking);

        engine.seek(target);
        if let Some(seeking) = self.state.seeking_mut() {
            seeking.waiting_engine_seeked = true;
        }
        self.seek_reader();
    }

    fn seek_reader(&mut self) {
        let Some(target) = self.state.seeking().map(|s| s.job.target()) else {
            return;
        };
        self.reset_decode();

        let reader = self.reader.clone();
        let request = self.spawner.spawn(
            async move { reader.seek(target).await },
            |id, result| Message::Completion(Completion::ReaderSeeked { id, result }),
        );
        if let Some(seeking) = self.state.seeking_mut() {
            seeking.waiting_reader_seeked = true;
            seeking.reader_seek = Some(request);
        }
    }

    fn on_reader_seeked(&mut self, id: RequestId, result: Result<Duration, SeekRejection>) {
        let Some(seeking) = self.state.seeking_mut() else {
            return;
        };
        if !seeking.reader_seek.as_ref().is_some_and(|r| r.is(id)) {
            return;
        }
        seeking.reader_seek = None;

        match result {
            Ok(position) => {
                debug!(position_us = position.as_micros() as u64, "reader seeked");
                seeking.waiting_reader_seeked = false;
                for track in self.present_tracks().iter() {
                    self.set_has_enough(track, false);
                    self.request_data(track);
                }
                self.check_if_seek_completed();
            }
            Err(SeekRejection { track, error }) => match error {
                ReaderError::WaitingForData => {
                    debug!(track = %track, "reader seek waiting for data");
                    self.emit_next_frame(NextFrameStatus::UnavailableSeeking);
                    self.wait_for_data(track);
                }
                ReaderError::EndOfStream => {
                    debug!(track = %track, "reader seeked past the end");
                    seeking.waiting_reader_seeked = false;
                    self.end_of_stream(track);
                    self.check_if_seek_completed();
                }
                ReaderError::Canceled => {
                    debug!(track = %track, "reader seek canceled, seeking again");
                    self.seek_reader();
                }
                error => {
                    warn!(track = %track, %error, "reader seek failed");
                    seeking.job.reject(SeekError::Failed(error.to_string()));
                    self.report_error(PlaybackError::Decode(error));
                }
            },
        }
    }

    fn on_engine_seeked(&mut self) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        let Some(seeking) = self.state.seeking_mut() else {
            debug!("engine seeked outside of seeking, ignored");
            return;
        };
        let current = engine.current_position();
        if current < seeking.target_time() {
            debug!(
                current_us = current.as_micros() as u64,
                target_us = seeking.target_time().as_micros() as u64,
                "engine seeked before target"
            );
            return;
        }
        seeking.waiting_engine_seeked = false;
        self.check_if_seek_completed();
    }

    fn check_if_seek_completed(&mut self) {
        let Some(seeking) = self.state.seeking_mut() else {
            return;
        };
        if seeking.waiting_engine_seeked || seeking.waiting_reader_seeked {
            trace!(
                engine = seeking.waiting_engine_seeked,
                reader = seeking.waiting_reader_seeked,
                "seek still in progress"
            );
            return;
        }

        let target = seeking.target_time();
        seeking.job.resolve();
        if self.position != target {
            debug!(
                position_us = self.position.as_micros() as u64,
                target_us = target.as_micros() as u64,
                "force position to seek target"
            );
        }
        self.set_position(target);
        info!(position_us = target.as_micros() as u64, "seek completed");
        self.emit(CoordinatorEvent::SeekCompleted { position: target });
        self.emit_next_frame(NextFrameStatus::Available);
        self.start_running_engine();
    }

    /// Drops outstanding data requests and resets the reader's decoders.
    fn reset_decode(&mut self) {
        let tracks = self.present_tracks();
        if tracks.is_empty() {
            return;
        }
        for track in tracks.iter() {
            self.tracks.disconnect(track);
        }
        self.reader.reset_decode(tracks);
    }

    // ========================================================================
    // Engine Notifications
    // ========================================================================

    fn on_engine_notification(&mut self, generation: u64, notification: EngineNotification) {
        if self.state.is_shutdown() || self.error.is_some() {
            trace!(?notification, "engine notification ignored");
            return;
        }
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                ?notification,
                "notification from a replaced engine ignored"
            );
            return;
        }

        match notification {
            EngineNotification::Event(event) => self.on_engine_event(event),
            EngineNotification::Error(error) => self.on_engine_error(error),
            EngineNotification::HostProcessCrashed => self.recover_from_crash_if_needed(),
            EngineNotification::Resized { width, height } => self.on_resized(width, height),
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        trace!(event = %event, state = %self.state.kind(), "engine event");
        match event {
            EngineEvent::LoadedMetaData => {}
            EngineEvent::LoadedFirstFrame => self.on_loaded_first_frame(),
            EngineEvent::LoadedData => self.on_loaded_data(),
            EngineEvent::Waiting => self.emit_next_frame(NextFrameStatus::UnavailableBuffering),
            EngineEvent::Playing => self.emit_next_frame(NextFrameStatus::Available),
            EngineEvent::Seeked => self.on_engine_seeked(),
            EngineEvent::BufferingStarted => {
                self.emit_next_frame(NextFrameStatus::UnavailableBuffering);
                if self.state.kind() == StateKind::RunningEngine {
                    for track in self.present_tracks().iter() {
                        self.wait_for_data(track);
                    }
                }
            }
            EngineEvent::BufferingEnded => self.emit_next_frame(NextFrameStatus::Available),
            EngineEvent::Timeupdate => self.on_timeupdate(),
            EngineEvent::Ended => self.on_ended(),
            EngineEvent::RequestForAudio | EngineEvent::RequestForVideo => {
                if let Some(track) = event.track() {
                    self.on_request_for(track);
                }
            }
            EngineEvent::AudioEnough | EngineEvent::VideoEnough => {
                if let Some(track) = event.track() {
                    self.set_has_enough(track, true);
                }
            }
        }
    }

    fn on_request_for(&mut self, track: TrackType) {
        self.set_has_enough(track, false);
        if self.should_run_engine_update() {
            self.running_engine_update(track);
        }
    }

    fn on_loaded_first_frame(&mut self) {
        if self.has_track(TrackType::Video) && !self.received_first_video_frame {
            debug!("waiting for the first video sample");
            return;
        }
        if !self.sent_first_frame_loaded {
            self.sent_first_frame_loaded = true;
            info!("first frame loaded");
            self.emit(CoordinatorEvent::FirstFrameLoaded);
        }
        self.emit_next_frame(NextFrameStatus::Available);
    }

    fn on_loaded_data(&mut self) {
        if !self.sent_first_frame_loaded {
            self.on_loaded_first_frame();
            return;
        }
        self.emit_next_frame(NextFrameStatus::Available);
    }

    fn on_timeupdate(&mut self) {
        if self.state.seeking().is_some() {
            return;
        }
        let Some(engine) = &self.engine else {
            return;
        };
        let position = engine.current_position();
        self.set_position(position);
        if let Some(MediaDuration::Finite(duration)) = self.duration {
            if position > duration {
                self.set_duration(MediaDuration::Finite(position));
            }
        }
    }

    fn on_ended(&mut self) {
        if self.sent_playback_ended {
            return;
        }
        self.sent_playback_ended = true;
        info!("playback ended");
        self.emit_next_frame(NextFrameStatus::Unavailable);
        self.emit(CoordinatorEvent::PlaybackEnded);
    }

    fn on_resized(&mut self, width: u32, height: u32) {
        debug!(width, height, "video resized");
        let size = DisplaySize::new(width, height);
        self.update_snapshot(|s| s.display_size = Some(size));
        self.emit(CoordinatorEvent::Resized { width, height });
    }

    fn on_engine_error(&mut self, error: EngineError) {
        match error {
            EngineError::HostProcessCrashed => self.recover_from_crash_if_needed(),
            EngineError::NotSupported(reason) => {
                self.report_error(PlaybackError::EngineNotSupported { reason })
            }
            error if self.state.kind() == StateKind::InitEngine && self.key_system.is_none() => {
                self.report_error(PlaybackError::EngineInitFailed {
                    error,
                    drm_bound: false,
                })
            }
            error => self.report_error(PlaybackError::Engine(error)),
        }
    }

    // ========================================================================
    // Crash Recovery
    // ========================================================================

    fn recover_from_crash_if_needed(&mut self) {
        let kind = self.state.kind();
        if !matches!(
            kind,
            StateKind::InitEngine
                | StateKind::RecoverEngine
                | StateKind::RunningEngine
                | StateKind::SeekingData
        ) {
            return;
        }

        let crashes = self.crash_monitor.notify_crash();
        let drm_bound = self.key_system.is_some();
        if !self.crash_monitor.should_recover(self.config.max_engine_crashes) {
            warn!(
                crashes,
                max = self.config.max_engine_crashes,
                "engine crashed too many times, giving up"
            );
            self.report_error(PlaybackError::CrashBudgetExhausted { crashes, drm_bound });
            return;
        }
        if matches!(kind, StateKind::InitEngine | StateKind::RecoverEngine) {
            warn!(state = %kind, "engine crashed while initializing");
            self.report_error(PlaybackError::CrashedDuringInit { drm_bound });
            return;
        }

        info!(
            crashes,
            position_us = self.position.as_micros() as u64,
            "recovering from engine crash"
        );
        let in_flight = self.state.seeking_mut().map(|seeking| seeking.job.take());
        self.change_state(PlaybackState::RecoverEngine(EngineInit::default()));
        if let Some(job) = in_flight.filter(SeekJob::exists) {
            if self.pending_seek.replace(job) {
                self.pending_tasks.push(PendingTask::Seek);
            }
        }

        self.release_resources();
        self.emit(CoordinatorEvent::EngineRecovering { crashes });
        self.init_engine();
    }

    /// Releases the engine first, then the reader-side decoder resources.
    fn release_resources(&mut self) {
        self.tracks.disconnect_all();
        if let Some(engine) = self.engine.take() {
            engine.shutdown();
        }
        self.engine_ready = false;
        self.reader.release_resources();
    }

    // ========================================================================
    // Owner Commands
    // ========================================================================

    /// Returns the engine if `task` can be applied now, queueing it otherwise.
    fn engine_for(&mut self, task: PendingTask) -> Option<Arc<dyn PlaybackEngine>> {
        if self.state.is_shutdown() || self.error.is_some() {
            return None;
        }
        if !self.engine_ready {
            let name = task.name();
            if self.pending_tasks.push(task) {
                debug!(task = name, "engine not ready, task postponed");
            } else {
                trace!(task = name, "engine not ready, task already postponed");
            }
            return None;
        }
        self.engine.clone()
    }

    fn apply_playback_rate(&mut self) {
        if let Some(engine) = self.engine_for(PendingTask::ApplyPlaybackRate) {
            engine.set_playback_rate(self.playback_rate);
        }
    }

    fn apply_volume(&mut self) {
        if let Some(engine) = self.engine_for(PendingTask::ApplyVolume) {
            engine.set_volume(self.volume);
        }
    }

    fn apply_looping(&mut self) {
        if let Some(engine) = self.engine_for(PendingTask::ApplyLooping) {
            engine.set_looping(self.looping);
        }
    }

    fn apply_preserves_pitch(&mut self) {
        if let Some(engine) = self.engine_for(PendingTask::ApplyPreservesPitch) {
            engine.set_preserves_pitch(self.preserves_pitch);
        }
    }

    fn apply_play_state(&mut self) {
        if let Some(engine) = self.engine_for(PendingTask::ApplyPlayState) {
            match self.play_state {
                PlayState::Playing => engine.play(),
                PlayState::Paused => engine.pause(),
            }
        }
        self.update_audible();
    }

    fn bind_drm(&mut self, proxy: CdmProxy, reply: DrmResponder) {
        if self.state.is_shutdown() {
            let _ = reply.send(Err(DrmError::ShutDown));
            return;
        }
        if self.error.is_some() {
            let _ = reply.send(Err(DrmError::Aborted));
            return;
        }
        if let Err(error) = self.config.is_drm_supported(&proxy) {
            let _ = reply.send(Err(error));
            return;
        }
        if !self.engine_ready {
            debug!(key_system = %proxy.key_system, "engine not ready, DRM binding postponed");
            self.reader.set_encrypted_custom_ident();
            self.pending_tasks.push(PendingTask::BindDrm { proxy, reply });
            return;
        }
        let Some(engine) = self.engine.clone() else {
            let _ = reply.send(Err(DrmError::Aborted));
            return;
        };

        info!(key_system = %proxy.key_system, "binding DRM session");
        self.key_system = Some(proxy.key_system.clone());
        let result = if engine.set_cdm_proxy(&proxy) {
            Ok(())
        } else {
            warn!(key_system = %proxy.key_system, "engine rejected CDM proxy");
            Err(DrmError::Rejected)
        };
        let _ = reply.send(result);
    }

    fn on_buffered_end_updated(&mut self, end: Duration) {
        if self.state.is_shutdown() {
            return;
        }
        let extend = match self.duration {
            None | Some(MediaDuration::Infinite) => true,
            Some(MediaDuration::Finite(duration)) => end > duration,
        };
        if extend {
            self.set_duration(MediaDuration::Finite(end));
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    fn shutdown(&mut self) -> ShutdownFuture {
        if let PlaybackState::ShutdownEngine(state) = &self.state {
            debug!("already shutting down");
            return state.future();
        }
        info!(
            state = %self.state.kind(),
            pending_seek = self.pending_seek.exists(),
            "shutdown"
        );

        let shutdown = ShutdownEngine::new();
        let future = shutdown.future();
        let previous = self.change_state(PlaybackState::ShutdownEngine(shutdown));
        if let PlaybackState::SeekingData(mut seeking) = previous {
            seeking.job.reject(SeekError::Aborted);
        }

        self.reset_decode();
        self.tracks.disconnect_all();
        self.pending_seek.discard(SeekError::Aborted);
        for task in self.pending_tasks.take_all() {
            task.abort();
        }

        if let Some(engine) = self.engine.take() {
            engine.shutdown();
        }
        self.engine_ready = false;

        let reader = self.reader.clone();
        self.spawner.spawn_detached(
            async move { reader.shutdown().await },
            |_, ()| Message::Completion(Completion::ReaderShutdown),
        );
        future
    }

    fn on_reader_shutdown(&mut self) {
        if let PlaybackState::ShutdownEngine(state) = &mut self.state {
            info!("shutdown complete");
            state.complete();
            self.finished = true;
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn change_state(&mut self, next: PlaybackState) -> PlaybackState {
        info!(
            from = %self.state.kind(),
            to = %next.kind(),
            play_state = ?self.play_state,
            "change state"
        );
        let previous = self.state.transition(next);
        let kind = self.state.kind();
        self.update_snapshot(|s| s.state = kind);
        self.update_audible();
        previous
    }

    fn report_error(&mut self, error: PlaybackError) {
        let severity = error.severity();
        let info = self.info.as_ref();
        error!(
            error = error.name(),
            ?severity,
            state = %self.state.kind(),
            audio_codec = info.and_then(|i| i.audio.as_ref()).map(|a| a.mime_type.as_str()),
            video_codec = info.and_then(|i| i.video.as_ref()).map(|v| v.mime_type.as_str()),
            key_system = self.key_system.as_deref(),
            platform_code = error.platform_code(),
            "{}",
            error
        );

        if self.error.is_none() {
            self.error = Some(severity);
            self.update_snapshot(|s| s.error = Some(severity));
        }
        self.emit(CoordinatorEvent::Error {
            severity,
            name: error.name().to_string(),
            message: error.to_string(),
        });
    }

    fn update_audible(&mut self) {
        let audible = self.has_track(TrackType::Audio)
            && self.play_state == PlayState::Playing
            && self.state.kind() == StateKind::RunningEngine;
        if audible == self.audible {
            return;
        }
        self.audible = audible;
        self.update_snapshot(|s| s.audible = audible);
        self.emit(CoordinatorEvent::AudibleChanged { audible });
    }

    fn set_position(&mut self, position: Duration) {
        if self.position == position {
            return;
        }
        self.position = position;
        self.update_snapshot(|s| s.position = position);
        self.emit(CoordinatorEvent::PositionChanged { position });
    }

    fn set_duration(&mut self, duration: MediaDuration) {
        if self.duration == Some(duration) {
            return;
        }
        debug!(?duration, "duration changed");
        self.duration = Some(duration);
        self.update_snapshot(|s| s.duration = Some(duration));
        self.emit(CoordinatorEvent::DurationChanged { duration });
    }

    fn has_track(&self, track: TrackType) -> bool {
        self.info.as_ref().is_some_and(|info| info.has_track(track))
    }

    fn present_tracks(&self) -> TrackSet {
        self.info.as_ref().map_or_else(TrackSet::empty, MediaInfo::tracks)
    }

    fn has_enough(&self, track: TrackType) -> bool {
        match track {
            TrackType::Audio => self.has_enough_audio,
            TrackType::Video => self.has_enough_video,
        }
    }

    fn set_has_enough(&mut self, track: TrackType, enough: bool) {
        match track {
            TrackType::Audio => self.has_enough_audio = enough,
            TrackType::Video => self.has_enough_video = enough,
        }
    }

    /// True while the reader is repositioning for a seek.
    fn is_seeking(&self) -> bool {
        self.state
            .seeking()
            .is_some_and(|seeking| seeking.waiting_reader_seeked)
    }

    fn update_snapshot(&self, update: impl FnOnce(&mut PlaybackSnapshot)) {
        update(&mut self.snapshot.write());
    }

    fn emit_next_frame(&self, status: NextFrameStatus) {
        self.emit(CoordinatorEvent::NextFrameStatus { status });
    }

    fn emit(&self, event: CoordinatorEvent) {
        trace!(event = event.description(), "emit");
        // No subscribers is fine.
        let _ = self.events.emit(event);
    }
}
