// THEORY:
// Microphone input via CPAL. A cpal `Stream` cannot leave the thread that built
// it, so the stream lives on a dedicated capture thread for the lifetime of the
// source. The device callback converts every supported sample format to `f32`,
// splits the interleaved buffer into stereo frames and hands them over a bounded
// channel. `drain` empties that channel on the tick. When the tick falls behind,
// whole callback buffers are dropped and counted rather than blocking the audio
// thread.
//
// Stream errors come in two kinds. A lost device is terminal and the source
// reports `Ended` from then on. Anything else (an xrun, a backend hiccup) is only
// logged: the source reads `Stalled` while no buffers arrive and `Ready` again as
// soon as the callback delivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

use super::{AudioSource, SourceStatus};
use crate::core_modules::waveform::{StereoFrame, interleaved_to_stereo};

/// Callback buffers held between ticks before new ones are dropped.
const CHANNEL_CAPACITY: usize = 64;
const STOP_POLL: Duration = Duration::from_millis(20);

pub struct LiveAudioSource {
    name: String,
    sample_rate: u32,
    frames: Receiver<Vec<StereoFrame>>,
    dropped: Arc<AtomicU64>,
    device_lost: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LiveAudioSource {
    /// Opens the default input device.
    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(None)
    }

    /// Opens the named input device, or the default one when `preferred` is `None`.
    pub fn open(preferred: Option<&str>) -> anyhow::Result<Self> {
        let preferred = preferred.map(str::to_owned);
        let (frame_tx, frame_rx) = bounded(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<anyhow::Result<(String, u32)>>(1);
        let dropped = Arc::new(AtomicU64::new(0));
        let device_lost = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let dropped = dropped.clone();
            let device_lost = device_lost.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("lumascope-audio".into())
                .spawn(move || {
                    capture_thread(preferred, frame_tx, ready_tx, dropped, device_lost, stop)
                })
                .context("spawning audio capture thread")?
        };

        let (name, sample_rate) = ready_rx
            .recv()
            .map_err(|_| anyhow!("audio capture thread exited during setup"))??;

        tracing::info!(device = %name, sample_rate, "microphone opened");
        Ok(Self {
            name,
            sample_rate,
            frames: frame_rx,
            dropped,
            device_lost,
            stop,
            worker: Some(worker),
        })
    }

    /// Callback buffers discarded because the consumer fell behind.
    pub fn dropped_buffers(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn capture_thread(
    preferred: Option<String>,
    frames: Sender<Vec<StereoFrame>>,
    ready: Sender<anyhow::Result<(String, u32)>>,
    dropped: Arc<AtomicU64>,
    device_lost: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let stream = match build_stream(preferred.as_deref(), frames, dropped, device_lost) {
        Ok((stream, name, sample_rate)) => {
            let _ = ready.send(Ok((name, sample_rate)));
            stream
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(STOP_POLL);
    }
    if let Err(err) = stream.pause() {
        tracing::debug!(error = %err, "failed to pause input stream");
    }
}

fn build_stream(
    preferred: Option<&str>,
    frames: Sender<Vec<StereoFrame>>,
    dropped: Arc<AtomicU64>,
    device_lost: Arc<AtomicBool>,
) -> anyhow::Result<(cpal::Stream, String, u32)> {
    let host = cpal::default_host();
    let device = match preferred {
        Some(name) => host
            .input_devices()
            .context("no input devices available")?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("input device '{name}' not found"))?,
        None => host
            .default_input_device()
            .context("no default input device available")?,
    };
    let name = device
        .name()
        .unwrap_or_else(|_| "unknown input device".to_string());

    let default_config = device.default_input_config()?;
    let format = default_config.sample_format();
    let config: StreamConfig = default_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = usize::from(config.channels.max(1));
    tracing::debug!(device = %name, ?format, sample_rate, channels, "input stream config");

    let err_fn = move |err: cpal::StreamError| {
        if is_terminal(&err) {
            device_lost.store(true, Ordering::Relaxed);
            tracing::error!(error = %err, "audio input device lost");
        } else {
            tracing::warn!(error = %err, "audio stream error");
        }
    };

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| {
                forward(&frames, &dropped, interleaved_to_stereo(data, channels, |s| s));
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                let stereo = interleaved_to_stereo(data, channels, |s| s as f32 / 32_768.0);
                forward(&frames, &dropped, stereo);
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| {
                let stereo = interleaved_to_stereo(data, channels, |s| {
                    (s as f32 - 32_768.0) / 32_768.0
                });
                forward(&frames, &dropped, stereo);
            },
            err_fn,
            None,
        )?,
        other => return Err(anyhow!("unsupported sample format: {other:?}")),
    };

    stream.play()?;
    Ok((stream, name, sample_rate))
}

fn is_terminal(err: &cpal::StreamError) -> bool {
    matches!(err, cpal::StreamError::DeviceNotAvailable)
}

fn stream_status(device_lost: bool, buffered: bool) -> SourceStatus {
    match (device_lost, buffered) {
        (true, _) => SourceStatus::Ended,
        (false, false) => SourceStatus::Stalled,
        (false, true) => SourceStatus::Ready,
    }
}

fn forward(frames: &Sender<Vec<StereoFrame>>, dropped: &AtomicU64, stereo: Vec<StereoFrame>) {
    if frames.try_send(stereo).is_err() {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

impl AudioSource for LiveAudioSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn status(&self) -> SourceStatus {
        stream_status(
            self.device_lost.load(Ordering::Relaxed),
            !self.frames.is_empty(),
        )
    }

    fn drain(&mut self, out: &mut Vec<StereoFrame>) -> anyhow::Result<()> {
        loop {
            match self.frames.try_recv() {
                Ok(mut chunk) => out.append(&mut chunk),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(anyhow!("audio capture thread has stopped"));
                }
            }
        }
    }
}

impl Drop for LiveAudioSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let dropped = self.dropped_buffers();
        if dropped > 0 {
            tracing::debug!(dropped, "audio buffers dropped while running");
        }
    }
}
