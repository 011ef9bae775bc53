//! Live output.
//!
//! [`LiveRenderer`] is the pure "fill the next block" side of playback; a
//! [`LiveSink`] decides who calls it. [`CpalSink`] drives it from the
//! platform audio callback, [`PullSink`] lets the caller pull blocks by hand.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::EngineShared;
use crate::error::EngineError;
use crate::mixer::{Mixer, MixerSettings};

/// Frames rendered per pass when filling a device buffer.
const DEVICE_CHUNK_FRAMES: usize = 512;

/// Renders the live mix from whatever snapshot is currently published.
///
/// Output is silence unless the playback transport is `Playing`. Volume
/// automation is never applied here.
pub struct LiveRenderer {
    shared: Arc<EngineShared>,
    mixer: Mixer,
}

impl LiveRenderer {
    pub fn new(shared: Arc<EngineShared>, settings: MixerSettings) -> Self {
        Self {
            shared,
            mixer: Mixer::new(settings),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.mixer.settings().sample_rate
    }

    /// Same renderer, retuned to the rate the output device actually runs at.
    pub fn with_sample_rate(self, sample_rate: f64) -> Self {
        let settings = MixerSettings {
            sample_rate,
            ..*self.mixer.settings()
        };
        Self::new(self.shared, settings)
    }

    /// Fill `out` with interleaved stereo frames. Never blocks or allocates.
    pub fn render(&mut self, out: &mut [f32]) {
        if !self.shared.transport().is_playing() {
            out.fill(0.0);
            return;
        }
        let whole = out.len() & !1;
        let snapshot = self.shared.snapshot();
        let report = self.mixer.render(&snapshot.channels, &mut out[..whole]);
        out[whole..].fill(0.0);
        if report.clipped {
            self.shared.flag_clip();
        }
    }
}

/// Feeds a device buffer of any channel count and sample type from the
/// stereo mix.
pub(crate) struct DeviceWriter {
    renderer: LiveRenderer,
    channels: usize,
    scratch: Vec<f32>,
}

impl DeviceWriter {
    pub(crate) fn new(renderer: LiveRenderer, channels: u16) -> Self {
        Self {
            renderer,
            channels: usize::from(channels.max(1)),
            scratch: vec![0.0; DEVICE_CHUNK_FRAMES * 2],
        }
    }

    pub(crate) fn fill<T: Copy>(&mut self, out: &mut [T], convert: impl Fn(f32) -> T) {
        for block in out.chunks_mut(DEVICE_CHUNK_FRAMES * self.channels) {
            let frames = block.len() / self.channels;
            let stereo = &mut self.scratch[..frames * 2];
            self.renderer.render(stereo);
            write_frames(stereo, block, self.channels, &convert);
        }
    }
}

/// Spread interleaved stereo over `channels`-wide frames. Mono gets the
/// average of both sides; channels past the second get silence, as does a
/// trailing partial frame.
fn write_frames<T: Copy>(
    stereo: &[f32],
    out: &mut [T],
    channels: usize,
    convert: &impl Fn(f32) -> T,
) {
    let silence = convert(0.0);
    let whole = out.len() / channels * channels;
    for (frame, lr) in out[..whole].chunks_exact_mut(channels).zip(stereo.chunks_exact(2)) {
        if channels == 1 {
            frame[0] = convert(0.5 * (lr[0] + lr[1]));
        } else {
            frame[0] = convert(lr[0]);
            frame[1] = convert(lr[1]);
            frame[2..].fill(silence);
        }
    }
    out[whole..].fill(silence);
}

/// Destination for live playback.
pub trait LiveSink: Send {
    /// Start pulling from `renderer`. A failure leaves the sink closed.
    fn open(&mut self, renderer: LiveRenderer) -> Result<(), EngineError>;
    /// Stop pulling and release the device. Closing a closed sink is a no-op.
    fn close(&mut self);
}

/// Sink without a device: the renderer is parked until someone pulls.
#[derive(Default)]
pub struct PullSink {
    slot: Arc<Mutex<Option<LiveRenderer>>>,
}

/// Caller side of a [`PullSink`].
#[derive(Clone)]
pub struct PullHandle {
    slot: Arc<Mutex<Option<LiveRenderer>>>,
}

impl PullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> PullHandle {
        PullHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl LiveSink for PullSink {
    fn open(&mut self, renderer: LiveRenderer) -> Result<(), EngineError> {
        *self.slot.lock() = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        self.slot.lock().take();
    }
}

impl PullHandle {
    /// Render into `out`; returns false (and leaves `out` alone) while the
    /// sink is closed.
    pub fn pull(&self, out: &mut [f32]) -> bool {
        match self.slot.lock().as_mut() {
            Some(renderer) => {
                renderer.render(out);
                true
            }
            None => false,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::device::CpalSink;

#[cfg(not(target_arch = "wasm32"))]
mod device {
    use std::thread::{self, JoinHandle};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{BufferSize, SampleFormat, StreamConfig};
    use crossbeam::channel::{bounded, Sender};
    use tracing::{debug, error, info};

    use super::{DeviceWriter, LiveRenderer, LiveSink};
    use crate::dsp::{to_i16, to_u16};
    use crate::error::EngineError;

    /// Plays through the host's default output device.
    ///
    /// cpal streams are not `Send` on every platform, so the stream lives on
    /// its own thread and is torn down through a channel.
    pub struct CpalSink {
        block_frames: u32,
        running: Option<(Sender<()>, JoinHandle<()>)>,
    }

    impl CpalSink {
        /// `block_frames == 0` lets the device pick its buffer size.
        pub fn new(block_frames: u32) -> Self {
            Self {
                block_frames,
                running: None,
            }
        }
    }

    fn on_stream_error(err: cpal::StreamError) {
        error!("stream error: {err}");
    }

    /// Open the default device in its own format and retune the renderer
    /// to the device rate.
    fn build_stream(
        renderer: LiveRenderer,
        block_frames: u32,
    ) -> Result<cpal::Stream, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Device("no output device available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::Device(format!("default output config: {e}")))?;
        let format = supported.sample_format();
        let mut config: StreamConfig = supported.into();
        if block_frames > 0 {
            config.buffer_size = BufferSize::Fixed(block_frames);
        }
        let renderer = renderer.with_sample_rate(f64::from(config.sample_rate.0));
        let mut writer = DeviceWriter::new(renderer, config.channels);

        let stream = match format {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| writer.fill(data, |s| s),
                on_stream_error,
                None,
            ),
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| writer.fill(data, to_i16),
                on_stream_error,
                None,
            ),
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| writer.fill(data, to_u16),
                on_stream_error,
                None,
            ),
            other => {
                return Err(EngineError::Device(format!("unsupported sample format {other:?}")));
            }
        }
        .map_err(|e| EngineError::Device(e.to_string()))?;
        stream.play().map_err(|e| EngineError::Device(e.to_string()))?;
        info!(
            "live output on {} at {} Hz, {} channels, {format:?}",
            device.name().unwrap_or_else(|_| "default device".into()),
            config.sample_rate.0,
            config.channels
        );
        Ok(stream)
    }

    impl LiveSink for CpalSink {
        fn open(&mut self, renderer: LiveRenderer) -> Result<(), EngineError> {
            self.close();
            let block_frames = self.block_frames;
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let (ready_tx, ready_rx) = bounded::<Result<(), EngineError>>(1);

            let handle = thread::Builder::new()
                .name("entrainment-live".into())
                .spawn(move || match build_stream(renderer, block_frames) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let _ = stop_rx.recv();
                        drop(stream);
                        debug!("live output closed");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                })
                .map_err(|e| EngineError::Device(e.to_string()))?;

            match ready_rx.recv() {
                Ok(Ok(())) => {
                    self.running = Some((stop_tx, handle));
                    Ok(())
                }
                Ok(Err(e)) => {
                    let _ = handle.join();
                    Err(e)
                }
                Err(_) => {
                    let _ = handle.join();
                    Err(EngineError::Device("live output thread exited".into()))
                }
            }
        }

        fn close(&mut self) {
            if let Some((stop, handle)) = self.running.take() {
                let _ = stop.send(());
                let _ = handle.join();
            }
        }
    }

    impl Drop for CpalSink {
        fn drop(&mut self) {
            self.close();
        }
    }
}
