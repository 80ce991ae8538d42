//! Audio Engine - device lifecycle, mixing, bass routing, and the realtime
//! callback.
//!
//! Owns no socket and no [`crate::stream::StreamSession`]: it is reached
//! only through the [`crate::stream::HandleSource`] trait, handing out a
//! fresh [`Handle`] per stream connect and remembering it weakly so the
//! realtime callback can sweep dead streams without the network threads'
//! cooperation. Structured the way the teacher's `AudioEngine` is — a
//! thin controller on the caller's thread, a dedicated `cpal`-owning
//! thread doing the actual realtime work, `crossbeam_channel` bridging
//! the two — generalized from per-app EQ routing to this daemon's
//! mix/bass-split/capture pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use soundd_dsp::{
    fold_mix, mix_pair, to_canonical, BassRange, BassRouterDispatcher, ChannelAssignment,
    ChannelLayout, Sample, TubeDispatcher, WireFormat, SILENCE,
};

use crate::config::SoundConfig;
use crate::device::{self, AudioDevice, DeviceType};
use crate::error::{EngineError, EngineResult};
use crate::handle::{Handle, ReadHandle, TransferReport, WriteHandle};
use crate::message::{EngineCommand, EngineEvent};
use crate::protocol::{Configuration, Direction};
use crate::stream::{engine_pull_canonical, engine_push_canonical, HandleSource};

/// Frames pulled from/pushed to handles per callback sweep, and the window
/// width handed to the bass router. 1024 frames at the base rate is ~23ms,
/// comfortably inside the realtime budget for the FFT sizes involved.
const CALLBACK_WINDOW_FRAMES: usize = 1024;

/// A registered handle remembered only weakly: the owning
/// [`crate::stream::StreamSession`] is the sole strong owner, matching
/// §9's "Audio Engine refers to Handles with non-owning references only".
struct HandleRegistry {
    write_handles: Mutex<Vec<Weak<Handle>>>,
    read_handles: Mutex<Vec<Weak<Handle>>>,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            write_handles: Mutex::new(Vec::new()),
            read_handles: Mutex::new(Vec::new()),
        }
    }
}

impl HandleSource for HandleRegistry {
    fn acquire_handle(&self, configuration: &Configuration) -> Arc<Handle> {
        let format = configuration.sample_spec.format.to_codec_format();
        match configuration.direction {
            Direction::Playback => {
                let handle = Arc::new(Handle::Write(WriteHandle::new(
                    format,
                    configuration.buffer_config.prebuffer as usize,
                )));
                self.write_handles.lock().push(Arc::downgrade(&handle));
                handle
            }
            Direction::Record => {
                let handle = Arc::new(Handle::Read(ReadHandle::new(format)));
                self.read_handles.lock().push(Arc::downgrade(&handle));
                handle
            }
        }
    }
}

/// One outstanding bass-router dispatch: the worker thread fills `output`
/// (interleaved stereo S32LE wire bytes, bass on channel 0, residual on
/// channel 1) and flips `done` exactly once; the audio thread only ever reads.
struct BassJob {
    done: Arc<AtomicBool>,
    output: Arc<Mutex<Vec<u8>>>,
}

struct BassJobRequest {
    window: Vec<Sample>,
    done: Arc<AtomicBool>,
    output: Arc<Mutex<Vec<u8>>>,
}

/// Fixed-size pool of threads draining a non-blocking job queue, per
/// §4.8/§9's supplemented `AsyncDispatchingJob`/`ThreadPool`. The audio
/// thread never waits on a job; it only polls `done`.
struct WorkerPool {
    sender: Sender<BassJobRequest>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(size: usize, range: BassRange, sample_rate: f64) -> Self {
        let (sender, receiver) = unbounded::<BassJobRequest>();
        let threads = (0..size.max(1))
            .map(|i| {
                let receiver: Receiver<BassJobRequest> = receiver.clone();
                thread::Builder::new()
                    .name(format!("soundd-bass-worker-{i}"))
                    .spawn(move || {
                        let mut dispatcher = BassRouterDispatcher::new(range, sample_rate);
                        while let Ok(job) = receiver.recv() {
                            let mut out = vec![0u8; job.window.len() * 2 * 4];
                            let assignment = ChannelAssignment { bass: 0, residual: 1 };
                            if let Err(e) = dispatcher.dispatch(
                                &job.window,
                                &mut out,
                                WireFormat::S32LE,
                                2,
                                assignment,
                            ) {
                                warn!(error = %e, "bass router dispatch failed, leaving window silent");
                            } else {
                                *job.output.lock() = out;
                            }
                            job.done.store(true, Ordering::Release);
                        }
                    })
                    .expect("failed to spawn bass worker thread")
            })
            .collect();

        Self { sender, threads }
    }

    /// Submit `window` for routing, returning the handle the callback polls.
    fn submit(&self, window: Vec<Sample>) -> BassJob {
        let done = Arc::new(AtomicBool::new(false));
        let output = Arc::new(Mutex::new(Vec::new()));
        let request = BassJobRequest {
            window,
            done: Arc::clone(&done),
            output: Arc::clone(&output),
        };
        if self.sender.send(request).is_err() {
            // Pool is gone (shutting down); mark the job done with an
            // empty output so the caller's passthrough path takes over.
            done.store(true, Ordering::Release);
        }
        BassJob { done, output }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; workers exit their `recv`
        // loop on their own once drained.
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

/// The main audio engine controller. Lives on the caller's thread;
/// delegates realtime work to a dedicated `cpal`-owning thread.
pub struct AudioEngine {
    registry: Arc<HandleRegistry>,
    command_sender: Sender<EngineCommand>,
    event_receiver: Receiver<EngineEvent>,
    audio_thread: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    sound_config: SoundConfig,
}

impl AudioEngine {
    pub fn new(sound_config: SoundConfig) -> EngineResult<Self> {
        let registry = Arc::new(HandleRegistry::new());
        let (command_sender, command_receiver) = bounded::<EngineCommand>(8);
        let (event_sender, event_receiver) = unbounded::<EngineEvent>();
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));

        let registry_clone = Arc::clone(&registry);
        let shutdown_clone = Arc::clone(&shutdown_flag);
        let running_clone = Arc::clone(&is_running);
        let config_clone = sound_config.clone();

        let audio_thread = thread::Builder::new()
            .name("soundd-audio".into())
            .spawn(move || {
                Self::audio_thread_main(
                    registry_clone,
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                    config_clone,
                );
            })
            .map_err(|e| EngineError::Device(e.to_string()))?;

        Ok(Self {
            registry,
            command_sender,
            event_receiver,
            audio_thread: Some(audio_thread),
            shutdown_flag,
            is_running,
            sound_config,
        })
    }

    pub fn start(&self) -> EngineResult<()> {
        self.send_command(EngineCommand::Start)
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.send_command(EngineCommand::Stop)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn poll_event(&self) -> Option<EngineEvent> {
        self.event_receiver.try_recv().ok()
    }

    pub fn wait_event(&self) -> Option<EngineEvent> {
        self.event_receiver.recv().ok()
    }

    pub fn list_devices(&self) -> EngineResult<Vec<AudioDevice>> {
        AudioDevice::enumerate_all()
    }

    pub fn sound_config(&self) -> &SoundConfig {
        &self.sound_config
    }

    fn send_command(&self, command: EngineCommand) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::Backpressure)
    }

    fn audio_thread_main(
        registry: Arc<HandleRegistry>,
        command_receiver: Receiver<EngineCommand>,
        event_sender: Sender<EngineEvent>,
        shutdown_flag: Arc<AtomicBool>,
        is_running: Arc<AtomicBool>,
        config: SoundConfig,
    ) {
        info!("audio thread started");

        let mut output_stream: Option<cpal::Stream> = None;
        let mut input_stream: Option<cpal::Stream> = None;
        let worker_pool = Arc::new(WorkerPool::new(
            config.worker_pool_size,
            BassRange {
                lower: config.bass_band.0 as f64,
                higher: config.bass_band.1 as f64,
            },
            config.base_sample_rate as f64,
        ));

        while !shutdown_flag.load(Ordering::SeqCst) {
            match command_receiver.recv_timeout(Duration::from_millis(50)) {
                Ok(EngineCommand::Start) => {
                    if output_stream.is_some() {
                        warn!("engine already running");
                        continue;
                    }
                    match Self::open_streams(&registry, &worker_pool, &config, event_sender.clone()) {
                        Ok((out, input)) => {
                            output_stream = Some(out);
                            input_stream = input;
                            is_running.store(true, Ordering::SeqCst);
                            let _ = event_sender.send(EngineEvent::Started);
                            info!("audio engine started");
                        }
                        Err(e) => {
                            error!(error = %e, "failed to open audio streams");
                            let _ = event_sender.send(EngineEvent::error(e));
                        }
                    }
                }
                Ok(EngineCommand::Stop) => {
                    output_stream = None;
                    input_stream = None;
                    is_running.store(false, Ordering::SeqCst);
                    let _ = event_sender.send(EngineEvent::Stopped);
                    info!("audio engine stopped");
                }
                Ok(EngineCommand::Shutdown) => {
                    shutdown_flag.store(true, Ordering::SeqCst);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("command channel disconnected");
                    break;
                }
            }
        }

        drop(output_stream);
        drop(input_stream);
        is_running.store(false, Ordering::SeqCst);
        info!("audio thread shutting down");
    }

    /// Opens the device-bound streams per §4.8's selection rule: prefer a
    /// device whose name contains the configured substring, else the
    /// backend default, independently for each direction.
    fn open_streams(
        registry: &Arc<HandleRegistry>,
        worker_pool: &Arc<WorkerPool>,
        config: &SoundConfig,
        event_sender: Sender<EngineEvent>,
    ) -> EngineResult<(cpal::Stream, Option<cpal::Stream>)> {
        use cpal::traits::HostTrait;
        let host = cpal::default_host();
        let preferred = config.preferred_backend_substring.as_deref();

        let output_descriptor = device::select_device(DeviceType::Output, preferred)?;
        let output_device = host
            .output_devices()
            .map_err(|e| EngineError::Device(e.to_string()))?
            .find(|d| d.name().map(|n| n == output_descriptor.name).unwrap_or(false))
            .ok_or_else(|| EngineError::Device("selected output device vanished".into()))?;

        let output_config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(config.base_sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let output_stream = Self::build_output_stream(
            &output_device,
            &output_config,
            Arc::clone(registry),
            Arc::clone(worker_pool),
            event_sender.clone(),
        )?;
        output_stream
            .play()
            .map_err(|e| EngineError::Device(e.to_string()))?;

        let input_stream = match device::select_device(DeviceType::Input, preferred) {
            Ok(descriptor) => {
                let input_device = host
                    .input_devices()
                    .map_err(|e| EngineError::Device(e.to_string()))?
                    .find(|d| d.name().map(|n| n == descriptor.name).unwrap_or(false));
                match input_device {
                    Some(input_device) => {
                        let input_config = cpal::StreamConfig {
                            channels: 1,
                            sample_rate: cpal::SampleRate(config.base_sample_rate),
                            buffer_size: cpal::BufferSize::Default,
                        };
                        let stream = Self::build_input_stream(
                            &input_device,
                            &input_config,
                            Arc::clone(registry),
                            event_sender,
                        )?;
                        stream.play().map_err(|e| EngineError::Device(e.to_string()))?;
                        Some(stream)
                    }
                    None => None,
                }
            }
            Err(EngineError::NoDevicesFound) => {
                debug!("no input device available, playback-only mode");
                None
            }
            Err(e) => return Err(e),
        };

        Ok((output_stream, input_stream))
    }

    fn build_output_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        registry: Arc<HandleRegistry>,
        worker_pool: Arc<WorkerPool>,
        event_sender: Sender<EngineEvent>,
    ) -> EngineResult<cpal::Stream> {
        let channels = config.channels as usize;
        let err_sender = event_sender.clone();
        let mut pending_job: Option<BassJob> = None;
        let mut scratch = vec![0 as Sample; CALLBACK_WINDOW_FRAMES];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    let n = frames.min(CALLBACK_WINDOW_FRAMES);
                    let bus = Self::mix_playback_bus(&registry, &mut scratch[..n], &event_sender);

                    let stereo = match pending_job.take() {
                        Some(job) if job.done.load(Ordering::Acquire) => {
                            let wire = job.output.lock().clone();
                            let decoded = decode_stereo_s32le(&wire);
                            pending_job = Some(worker_pool.submit(bus.to_vec()));
                            if decoded.len() == n * 2 {
                                decoded
                            } else {
                                passthrough(bus)
                            }
                        }
                        Some(job) => {
                            let out = passthrough(bus);
                            pending_job = Some(job);
                            out
                        }
                        None => {
                            pending_job = Some(worker_pool.submit(bus.to_vec()));
                            passthrough(bus)
                        }
                    };

                    write_device_frames(data, &stereo, channels);
                },
                move |err| {
                    let _ = err_sender.try_send(EngineEvent::error(err));
                },
                None,
            )
            .map_err(|e| EngineError::Device(e.to_string()))?;

        Ok(stream)
    }

    fn build_input_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        registry: Arc<HandleRegistry>,
        event_sender: Sender<EngineEvent>,
    ) -> EngineResult<cpal::Stream> {
        let channels = config.channels as usize;
        let err_sender = event_sender.clone();

        let stream = device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    Self::push_capture(&registry, data, channels, &event_sender);
                },
                move |err| {
                    let _ = err_sender.try_send(EngineEvent::error(err));
                },
                None,
            )
            .map_err(|e| EngineError::Device(e.to_string()))?;

        Ok(stream)
    }

    /// §4.8 step 1: pull canonical frames from every live Write Handle,
    /// pruning dead weak references, and fold them into one mono bus.
    fn mix_playback_bus<'a>(
        registry: &HandleRegistry,
        scratch: &'a mut [Sample],
        event_sender: &Sender<EngineEvent>,
    ) -> &'a [Sample] {
        scratch.fill(0);
        let mut any_contributed = false;

        let mut handles = registry.write_handles.lock();
        handles.retain(|weak| weak.strong_count() > 0);
        let live: Vec<Arc<Handle>> = handles.iter().filter_map(Weak::upgrade).collect();
        drop(handles);

        let mut per_handle = vec![SILENCE; scratch.len()];
        for handle in &live {
            let Handle::Write(write_handle) = handle.as_ref() else {
                continue;
            };
            match engine_pull_canonical(write_handle, &mut per_handle) {
                Ok(TransferReport { deficit, .. }) => {
                    any_contributed = true;
                    if deficit > 0 {
                        let _ = event_sender.try_send(EngineEvent::Underrun { deficit });
                    }
                    for (bus_slot, sample) in scratch.iter_mut().zip(per_handle.iter()) {
                        *bus_slot = mix_pair(*bus_slot, *sample);
                    }
                }
                Err(crate::handle::HandleError::Stalled) => {}
                Err(crate::handle::HandleError::Dead) => {}
                Err(crate::handle::HandleError::WrongDirection) => {
                    debug_assert!(false, "registry only holds Write handles for playback");
                }
            }
        }

        if !any_contributed {
            scratch.fill(SILENCE);
        }
        scratch
    }

    /// §4.8 step 3: copy the device's input frames into every live Read
    /// Handle, folding multi-channel input down to mono canonical first.
    fn push_capture(
        registry: &HandleRegistry,
        data: &[f32],
        channels: usize,
        event_sender: &Sender<EngineEvent>,
    ) {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        let mut mono = Vec::with_capacity(frames);
        for frame in data.chunks(channels) {
            let sum: f32 = frame.iter().sum();
            let avg = sum / channels as f32;
            mono.push((avg.clamp(-1.0, 1.0) * i32::MAX as f32) as Sample);
        }

        let mut handles = registry.read_handles.lock();
        handles.retain(|weak| weak.strong_count() > 0);
        let live: Vec<Arc<Handle>> = handles.iter().filter_map(Weak::upgrade).collect();
        drop(handles);

        for handle in &live {
            let Handle::Read(read_handle) = handle.as_ref() else {
                continue;
            };
            match engine_push_canonical(read_handle, &mono) {
                Ok(TransferReport { deficit, .. }) if deficit > 0 => {
                    let _ = event_sender.try_send(EngineEvent::Overrun { dropped: deficit });
                }
                _ => {}
            }
        }
    }
}

/// One-to-many broadcast of a mono bus to both device channels, used both
/// as the bass-split fallback and for devices opened with exactly two
/// channels (this engine never opens more than stereo output).
fn passthrough(bus: &[Sample]) -> Vec<Sample> {
    let dispatcher = TubeDispatcher::new(ChannelLayout::Interleaved, WireFormat::S32LE);
    let mut wire = vec![0u8; bus.len() * 2 * 4];
    if dispatcher
        .dispatch_one_to_many(bus, &mut wire, 2, bus.len())
        .is_err()
    {
        return vec![SILENCE; bus.len() * 2];
    }
    decode_stereo_s32le(&wire)
}

/// Decode interleaved stereo S32LE wire bytes back into canonical samples.
fn decode_stereo_s32le(wire: &[u8]) -> Vec<Sample> {
    wire.chunks_exact(4)
        .map(|chunk| to_canonical(WireFormat::S32LE, chunk))
        .collect()
}

fn write_device_frames(data: &mut [f32], canonical_stereo: &[Sample], channels: usize) {
    data.fill(0.0);
    let frames = data.len() / channels.max(1);
    for frame in 0..frames {
        for ch in 0..channels.min(2) {
            let sample = canonical_stereo.get(frame * 2 + ch).copied().unwrap_or(SILENCE);
            let value = if sample == SILENCE { 0 } else { sample };
            data[frame * channels + ch] = value as f32 / i32::MAX as f32;
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        let _ = self.command_sender.send(EngineCommand::Shutdown);
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
    }
}

impl HandleSource for AudioEngine {
    fn acquire_handle(&self, configuration: &Configuration) -> Arc<Handle> {
        self.registry.acquire_handle(configuration)
    }
}
