//! Offline capture to a WAV file.
//!
//! ```text
//! render thread ──(HeapRb<f32>)──► writer thread ──► hound::WavWriter
//! ```
//!
//! The render thread owns its own [`Mixer`] and clock, reloads the published
//! snapshot every block, and applies the volume automation per frame. The
//! writer drains the queue, finalizes the header and returns the transport
//! to idle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::dsp::to_i16;
use crate::engine::EngineShared;
use crate::error::EngineError;
use crate::mixer::{MixReport, Mixer, MixerSettings};
use crate::transport::{RecordingState, TransportCommand};

const WRITER_CHUNK: usize = 4096;
const IDLE_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderSettings {
    pub mixer: MixerSettings,
    pub block_frames: usize,
    /// Queue capacity in interleaved samples.
    pub queue_samples: usize,
    pub realtime: bool,
}

impl RecorderSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            mixer: cfg.mixer_settings(),
            block_frames: cfg.recording_block_frames.max(1),
            queue_samples: cfg.queue_capacity_samples(),
            realtime: cfg.realtime_recording,
        }
    }
}

/// Outcome of a finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames_written: u64,
    pub duration: f64,
}

/// Handle to a recording in flight.
pub struct Recording {
    path: PathBuf,
    sample_rate: f64,
    total_frames: u64,
    progress: Arc<AtomicU64>,
    render: JoinHandle<()>,
    writer: JoinHandle<Result<u64, EngineError>>,
}

fn wav_spec(sample_rate: f64) -> hound::WavSpec {
    hound::WavSpec {
        channels: 2,
        sample_rate: sample_rate.round() as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

type WavSink = hound::WavWriter<std::io::BufWriter<std::fs::File>>;

fn open_sink(path: &Path, sample_rate: f64) -> Result<WavSink, EngineError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| EngineError::Resource(format!("{}: {e}", dir.display())))?;
    }
    hound::WavWriter::create(path, wav_spec(sample_rate))
        .map_err(|e| EngineError::Resource(format!("{}: {e}", path.display())))
}

impl Recording {
    /// Open the file sink and start capturing `duration` seconds.
    ///
    /// The sink is opened before the transport moves, so a failure leaves
    /// the recording state idle.
    pub fn start(
        shared: Arc<EngineShared>,
        settings: RecorderSettings,
        path: &Path,
        duration: f64,
    ) -> Result<Self, EngineError> {
        let state = shared.transport().recording();
        if state != RecordingState::Idle {
            return Err(EngineError::InvalidTransition {
                command: TransportCommand::StartRecording.name(),
                state: state.name(),
            });
        }

        let sample_rate = settings.mixer.sample_rate;
        let sink = match open_sink(path, sample_rate) {
            Ok(sink) => sink,
            Err(e) => {
                error!("{e}");
                return Err(e);
            }
        };
        shared.transport().apply(TransportCommand::StartRecording)?;

        let total_frames = (duration * sample_rate).round().max(0.0) as u64;
        let ring = HeapRb::<f32>::new(settings.queue_samples.max(2));
        let (producer, consumer) = ring.split();
        let producer_done = Arc::new(AtomicBool::new(false));
        let writer_failed = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(AtomicU64::new(0));

        info!(
            "recording {:.2}s ({} frames) to {}",
            duration,
            total_frames,
            path.display()
        );

        let render = {
            let job = RenderJob {
                shared: Arc::clone(&shared),
                mixer: Mixer::new(settings.mixer),
                producer,
                block_frames: settings.block_frames,
                total_frames,
                realtime: settings.realtime,
                progress: Arc::clone(&progress),
                producer_done: Arc::clone(&producer_done),
                writer_failed: Arc::clone(&writer_failed),
            };
            thread::Builder::new()
                .name("entrainment-render".into())
                .spawn(move || job.run())
                .map_err(|e| EngineError::Resource(format!("spawn render thread: {e}")))
        };
        let render = match render {
            Ok(h) => h,
            Err(e) => {
                rollback(&shared);
                return Err(e);
            }
        };

        let writer = {
            let shared = Arc::clone(&shared);
            let producer_done = Arc::clone(&producer_done);
            let writer_failed = Arc::clone(&writer_failed);
            thread::Builder::new()
                .name("entrainment-writer".into())
                .spawn(move || write_loop(shared, sink, consumer, producer_done, writer_failed))
        };
        let writer = match writer {
            Ok(h) => h,
            Err(e) => {
                writer_failed.store(true, Ordering::Release);
                rollback(&shared);
                let _ = render.join();
                return Err(EngineError::Resource(format!("spawn writer thread: {e}")));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            total_frames,
            progress,
            render,
            writer,
        })
    }

    fn frames_rendered(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Fraction of the requested length rendered so far, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            return 1.0;
        }
        (self.frames_rendered() as f64 / self.total_frames as f64).min(1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.render.is_finished() && self.writer.is_finished()
    }

    /// Wait for both threads and report what reached the file.
    pub fn join(self) -> Result<RecordingSummary, EngineError> {
        if self.render.join().is_err() {
            error!("render thread panicked");
        }
        let frames_written = self
            .writer
            .join()
            .map_err(|_| EngineError::Resource("writer thread panicked".into()))??;
        Ok(RecordingSummary {
            path: self.path,
            frames_written,
            duration: frames_written as f64 / self.sample_rate,
        })
    }
}

fn rollback(shared: &EngineShared) {
    let _ = shared.transport().apply(TransportCommand::StopRecording);
    let _ = shared.transport().apply(TransportCommand::Finalize);
}

struct RenderJob {
    shared: Arc<EngineShared>,
    mixer: Mixer,
    producer: HeapProd<f32>,
    block_frames: usize,
    total_frames: u64,
    realtime: bool,
    progress: Arc<AtomicU64>,
    producer_done: Arc<AtomicBool>,
    writer_failed: Arc<AtomicBool>,
}

impl RenderJob {
    fn run(mut self) {
        debug!("render thread started");
        let sample_rate = self.mixer.settings().sample_rate;
        let block_time = Duration::from_secs_f64(self.block_frames as f64 / sample_rate);
        let mut block = vec![0.0f32; self.block_frames * 2];
        let mut frames_done = 0u64;
        let mut clip_reported = false;
        // Pacing restarts after every pause so the clock never catches up.
        let mut pace_origin = Instant::now();
        let mut paced_frames = 0u64;

        loop {
            match self.shared.transport().recording() {
                RecordingState::Recording => {}
                RecordingState::Paused => {
                    thread::sleep(block_time.min(Duration::from_millis(20)));
                    pace_origin = Instant::now();
                    paced_frames = 0;
                    continue;
                }
                RecordingState::Stopped | RecordingState::Idle => break,
            }
            if self.writer_failed.load(Ordering::Acquire) {
                break;
            }
            if frames_done >= self.total_frames {
                if self
                    .shared
                    .transport()
                    .apply(TransportCommand::StopRecording)
                    .is_ok()
                {
                    info!("recording reached its length");
                }
                break;
            }

            let n = (self.total_frames - frames_done).min(self.block_frames as u64) as usize;
            let out = &mut block[..n * 2];
            let snapshot = self.shared.snapshot();
            self.mixer.render(&snapshot.channels, out);
            for (i, frame) in out.chunks_exact_mut(2).enumerate() {
                let t = (frames_done + i as u64) as f64 / sample_rate;
                let gain = snapshot.automation.level_at(t) as f32;
                frame[0] *= gain;
                frame[1] *= gain;
            }
            drop(snapshot);
            let report = MixReport::from_interleaved(out);
            if report.clipped {
                self.shared.flag_clip();
                if !clip_reported {
                    warn!("recording clipped (peak {:.3})", report.peak);
                    clip_reported = true;
                }
            }

            if !self.push_all(out) {
                break;
            }
            frames_done += n as u64;
            self.progress.store(frames_done, Ordering::Relaxed);

            if self.realtime {
                paced_frames += n as u64;
                let target = Duration::from_secs_f64(paced_frames as f64 / sample_rate);
                let elapsed = pace_origin.elapsed();
                if target > elapsed {
                    thread::sleep(target - elapsed);
                }
            }
        }

        self.producer_done.store(true, Ordering::Release);
        debug!("render thread finished after {frames_done} frames");
    }

    /// Block until every sample is queued; false if the writer gave up.
    fn push_all(&mut self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            offset += self.producer.push_slice(&samples[offset..]);
            if offset < samples.len() {
                if self.writer_failed.load(Ordering::Acquire) {
                    return false;
                }
                thread::sleep(IDLE_POLL);
            }
        }
        true
    }
}

fn write_loop(
    shared: Arc<EngineShared>,
    mut sink: WavSink,
    mut consumer: HeapCons<f32>,
    producer_done: Arc<AtomicBool>,
    writer_failed: Arc<AtomicBool>,
) -> Result<u64, EngineError> {
    debug!("writer thread started");
    let result = drain(&mut sink, &mut consumer, &producer_done).and_then(|samples| {
        sink.finalize()?;
        Ok(samples / 2)
    });

    if let Err(e) = &result {
        error!("recording failed: {e}");
        writer_failed.store(true, Ordering::Release);
    }
    let _ = shared.transport().apply(TransportCommand::StopRecording);
    let _ = shared.transport().apply(TransportCommand::Finalize);
    if let Ok(frames) = result {
        info!("recording finalized, {frames} frames written");
    }
    result
}

fn drain(
    sink: &mut WavSink,
    consumer: &mut HeapCons<f32>,
    producer_done: &AtomicBool,
) -> Result<u64, EngineError> {
    let mut buf = vec![0.0f32; WRITER_CHUNK];
    let mut written = 0u64;
    loop {
        let n = consumer.pop_slice(&mut buf);
        if n == 0 {
            if producer_done.load(Ordering::Acquire) && consumer.is_empty() {
                break;
            }
            thread::sleep(IDLE_POLL);
            continue;
        }
        for &s in &buf[..n] {
            sink.write_sample(to_i16(s))?;
        }
        written += n as u64;
    }
    Ok(written)
}
