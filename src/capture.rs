//! Audio capture state machine producing persisted recordings
//!
//! A session moves Idle → Requesting → Capturing → Stopped → Encoding →
//! Ready → Persisted, with Error reachable from Requesting and reset paths
//! back to Idle. The microphone is released on every exit from Capturing,
//! including session teardown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::repo::RecordingRepo;
use crate::types::{NewRecording, Recording, generate_id};

/// Container/codec of an encoded recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Webm,
    Ogg,
    Mp4,
    Wav,
}

impl Codec {
    pub fn mime(&self) -> &'static str {
        match self {
            Codec::Webm => "audio/webm",
            Codec::Ogg => "audio/ogg",
            Codec::Mp4 => "audio/mp4",
            Codec::Wav => "audio/wav",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Webm => "webm",
            Codec::Ogg => "ogg",
            Codec::Mp4 => "mp4",
            Codec::Wav => "wav",
        }
    }
}

/// Negotiation preference, most wanted first
pub const CODEC_PREFERENCE: [Codec; 3] = [Codec::Webm, Codec::Ogg, Codec::Mp4];

/// Turns buffered mono samples into one encoded audio object
pub trait AudioEncoder: Send {
    fn codec(&self) -> Codec;
    fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>>;
}

/// Pick the first encoder matching [`CODEC_PREFERENCE`]; when none of the
/// preferred codecs is available, the first registered encoder wins.
pub fn negotiate_encoder(encoders: &[Box<dyn AudioEncoder>]) -> Option<&dyn AudioEncoder> {
    for codec in CODEC_PREFERENCE {
        if let Some(encoder) = encoders.iter().find(|e| e.codec() == codec) {
            return Some(encoder.as_ref());
        }
    }
    encoders.first().map(|e| e.as_ref())
}

/// Built-in encoder: mono 16-bit PCM WAV
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn codec(&self) -> Codec {
        Codec::Wav
    }

    fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// The microphone seam. Acquisition failure is the permission-denied path.
pub trait CaptureDevice {
    type Handle: CaptureHandle;

    /// Request device access and begin appending mono f32 samples to `sink`
    fn acquire(&mut self, sink: Arc<Mutex<Vec<f32>>>) -> Result<Self::Handle>;
}

/// A live capture; releasing stops the stream and frees the device
pub trait CaptureHandle {
    fn sample_rate(&self) -> u32;
    fn release(&mut self);
}

/// Default-input-device capture via cpal
#[derive(Default)]
pub struct CpalDevice;

impl CpalDevice {
    pub fn new() -> Self {
        Self
    }
}

pub struct CpalHandle {
    stream: Option<Stream>,
    sample_rate: u32,
}

impl CaptureHandle for CpalHandle {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("Capture stream released");
        }
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl CaptureDevice for CpalDevice {
    type Handle = CpalHandle;

    fn acquire(&mut self, sink: Arc<Mutex<Vec<f32>>>) -> Result<CpalHandle> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Permission("no input device available".to_string()))?;

        // note: device.name() is deprecated in cpal 0.17+, but works
        #[allow(deprecated)]
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using input device: {}", device_name);

        let config = device
            .default_input_config()
            .map_err(|e| Error::Permission(format!("input device refused: {e}")))?;
        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;

        let err_fn = |err| warn!("Capture stream error: {}", err);

        let stream = match config.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::I24 => {
                build_stream::<cpal::I24>(&device, &config.into(), channels, sink, err_fn)?
            }
            SampleFormat::I32 => build_stream::<i32>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::U32 => build_stream::<u32>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::I8 => build_stream::<i8>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::U8 => build_stream::<u8>(&device, &config.into(), channels, sink, err_fn)?,
            SampleFormat::F64 => build_stream::<f64>(&device, &config.into(), channels, sink, err_fn)?,
            other => {
                return Err(Error::Audio(format!("unsupported sample format: {other:?}")));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Permission(format!("failed to start stream: {e}")))?;

        Ok(CpalHandle {
            stream: Some(stream),
            sample_rate,
        })
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    sink: Arc<Mutex<Vec<f32>>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream>
where
    T: Sample + SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    sink.lock()
                        .extend(data.iter().map(|sample| sample.to_sample::<f32>()));
                } else {
                    let mut buf = sink.lock();
                    for frame in data.chunks_exact(channels) {
                        let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
                        buf.push(sum / channels as f32);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Permission(format!("failed to build stream: {e}")))
}

/// Where a session currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Capturing,
    Stopped,
    Encoding,
    Ready,
    Persisted,
    Error(String),
}

/// The buffered capture after encoding
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub codec: Codec,
    pub sample_rate: u32,
}

/// One record-preview-send cycle over a capture device
pub struct RecordingSession<D: CaptureDevice> {
    device: D,
    encoders: Vec<Box<dyn AudioEncoder>>,
    state: SessionState,
    sink: Arc<Mutex<Vec<f32>>>,
    handle: Option<D::Handle>,
    sample_rate: u32,
    started_at: Option<Instant>,
    captured_secs: u64,
    encoded: Option<EncodedAudio>,
    preview: Option<PathBuf>,
}

impl RecordingSession<CpalDevice> {
    /// Microphone-backed session with the built-in WAV encoder
    pub fn microphone() -> Self {
        Self::new(CpalDevice::new(), vec![Box::new(WavEncoder)])
    }
}

impl<D: CaptureDevice> RecordingSession<D> {
    pub fn new(device: D, encoders: Vec<Box<dyn AudioEncoder>>) -> Self {
        Self {
            device,
            encoders,
            state: SessionState::Idle,
            sink: Arc::new(Mutex::new(Vec::new())),
            handle: None,
            sample_rate: 0,
            started_at: None,
            captured_secs: 0,
            encoded: None,
            preview: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whole seconds since Capturing was entered, frozen at stop and
    /// cleared on reset
    pub fn elapsed_secs(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(self.captured_secs)
    }

    /// Idle → Requesting → Capturing, or Error when access is denied.
    /// Ignored outside Idle.
    pub fn start(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }
        self.state = SessionState::Requesting;
        self.sink.lock().clear();

        match self.device.acquire(Arc::clone(&self.sink)) {
            Ok(handle) => {
                self.sample_rate = handle.sample_rate();
                self.handle = Some(handle);
                self.captured_secs = 0;
                self.started_at = Some(Instant::now());
                self.state = SessionState::Capturing;
                info!("Capture started at {} Hz", self.sample_rate);
            }
            Err(err) => {
                warn!("Capture request failed: {}", err);
                self.state = SessionState::Error(err.to_string());
            }
        }
    }

    /// Capturing → Stopped; the device is released. Ignored otherwise.
    pub fn stop(&mut self) {
        if self.state != SessionState::Capturing {
            return;
        }
        self.release_device();
        self.captured_secs = self.elapsed_secs();
        self.started_at = None;
        self.state = SessionState::Stopped;
        debug!("Capture stopped with {} buffered samples", self.sink.lock().len());
    }

    /// Stopped → Encoding → Ready: concatenate the buffer into one encoded
    /// object and derive a previewable file from it
    pub fn finish(&mut self) -> Result<()> {
        if self.state != SessionState::Stopped {
            return Err(Error::Capture(format!(
                "cannot encode from {:?}",
                self.state
            )));
        }
        self.state = SessionState::Encoding;
        match self.encode_buffered() {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Error(err.to_string());
                Err(err)
            }
        }
    }

    fn encode_buffered(&mut self) -> Result<()> {
        let samples = std::mem::take(&mut *self.sink.lock());
        let encoder = negotiate_encoder(&self.encoders)
            .ok_or_else(|| Error::Capture("no encoder registered".to_string()))?;
        let bytes = encoder.encode(&samples, self.sample_rate)?;
        let codec = encoder.codec();

        let preview = std::env::temp_dir().join(format!(
            "{}.{}",
            generate_id("preview"),
            codec.extension()
        ));
        std::fs::write(&preview, &bytes)?;
        debug!(
            "Encoded {} samples into {} bytes ({})",
            samples.len(),
            bytes.len(),
            codec.mime()
        );

        self.encoded = Some(EncodedAudio {
            bytes,
            codec,
            sample_rate: self.sample_rate,
        });
        self.preview = Some(preview);
        Ok(())
    }

    /// Locally previewable file for the encoded audio, while Ready
    pub fn preview_path(&self) -> Option<&Path> {
        self.preview.as_deref()
    }

    pub fn encoded(&self) -> Option<&EncodedAudio> {
        self.encoded.as_ref()
    }

    /// Ready → Persisted: hand the encoded audio to the recordings
    /// repository as a self-contained data URL
    pub fn send(
        &mut self,
        recordings: &RecordingRepo,
        username: &str,
        task_id: Option<String>,
    ) -> Result<Recording> {
        let (mime, extension, payload) = match (&self.state, self.encoded.as_ref()) {
            (SessionState::Ready, Some(enc)) => (
                enc.codec.mime(),
                enc.codec.extension(),
                BASE64.encode(&enc.bytes),
            ),
            _ => {
                return Err(Error::Capture(
                    "no encoded audio ready to send".to_string(),
                ));
            }
        };

        let file_name = format!(
            "rec_{}.{}",
            Utc::now().format("%Y-%m-%dT%H-%M-%S"),
            extension
        );
        let recording = recordings.add(NewRecording {
            username: username.to_string(),
            file_name,
            mime: mime.to_string(),
            data_url: format!("data:{mime};base64,{payload}"),
            task_id,
        })?;
        self.state = SessionState::Persisted;
        Ok(recording)
    }

    /// Ready/Stopped/Persisted → Idle: discard the buffer, the encoded
    /// object, and the preview file
    pub fn reset(&mut self) {
        if !matches!(
            self.state,
            SessionState::Ready | SessionState::Stopped | SessionState::Persisted
        ) {
            return;
        }
        self.discard();
        self.state = SessionState::Idle;
    }

    /// Error → Idle once the message has been surfaced
    pub fn acknowledge_error(&mut self) {
        if let SessionState::Error(_) = self.state {
            self.discard();
            self.state = SessionState::Idle;
        }
    }

    fn discard(&mut self) {
        self.sink.lock().clear();
        self.encoded = None;
        self.started_at = None;
        self.captured_secs = 0;
        if let Some(preview) = self.preview.take() {
            let _ = std::fs::remove_file(preview);
        }
    }

    fn release_device(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }
}

impl<D: CaptureDevice> Drop for RecordingSession<D> {
    fn drop(&mut self) {
        // teardown mid-capture must still release the microphone
        self.release_device();
        if let Some(preview) = self.preview.take() {
            let _ = std::fs::remove_file(preview);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::store::Store;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeHandle {
        released: Arc<AtomicBool>,
    }

    impl CaptureHandle for FakeHandle {
        fn sample_rate(&self) -> u32 {
            16000
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct FakeDevice {
        samples: Vec<f32>,
        deny: bool,
        released: Arc<AtomicBool>,
    }

    impl FakeDevice {
        fn with_samples(samples: Vec<f32>) -> Self {
            Self {
                samples,
                deny: false,
                released: Arc::new(AtomicBool::new(false)),
            }
        }

        fn denied() -> Self {
            Self {
                samples: Vec::new(),
                deny: true,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl CaptureDevice for FakeDevice {
        type Handle = FakeHandle;

        fn acquire(&mut self, sink: Arc<Mutex<Vec<f32>>>) -> Result<FakeHandle> {
            if self.deny {
                return Err(Error::Permission("microphone access denied".to_string()));
            }
            sink.lock().extend_from_slice(&self.samples);
            Ok(FakeHandle {
                released: Arc::clone(&self.released),
            })
        }
    }

    struct StubEncoder(Codec);

    impl AudioEncoder for StubEncoder {
        fn codec(&self) -> Codec {
            self.0
        }

        fn encode(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<u8>> {
            Ok(vec![0xAA, 0xBB])
        }
    }

    fn session_with(samples: Vec<f32>) -> (Arc<AtomicBool>, RecordingSession<FakeDevice>) {
        let device = FakeDevice::with_samples(samples);
        let released = Arc::clone(&device.released);
        (
            released,
            RecordingSession::new(device, vec![Box::new(WavEncoder)]),
        )
    }

    fn repo() -> RecordingRepo {
        RecordingRepo::new(Arc::new(Store::in_memory().unwrap()), EventBus::new())
    }

    #[test]
    fn test_happy_path_through_persisted() {
        let (released, mut session) = session_with(vec![0.0, 0.5, -0.5, 0.25]);
        let recordings = repo();

        assert_eq!(*session.state(), SessionState::Idle);
        session.start();
        assert_eq!(*session.state(), SessionState::Capturing);

        session.stop();
        assert_eq!(*session.state(), SessionState::Stopped);
        assert!(released.load(Ordering::SeqCst));

        session.finish().unwrap();
        assert_eq!(*session.state(), SessionState::Ready);
        let encoded = session.encoded().unwrap();
        assert_eq!(encoded.codec, Codec::Wav);
        assert!(!encoded.bytes.is_empty());
        assert!(session.preview_path().unwrap().exists());

        let recording = session
            .send(&recordings, "npm001", Some("task_1".to_string()))
            .unwrap();
        assert_eq!(*session.state(), SessionState::Persisted);
        assert_eq!(recording.username, "npm001");
        assert_eq!(recording.mime, "audio/wav");
        assert!(recording.data_url.starts_with("data:audio/wav;base64,"));
        assert!(recording.file_name.starts_with("rec_"));
        assert!(recording.file_name.ends_with(".wav"));
        assert_eq!(recordings.list().len(), 1);
    }

    #[test]
    fn test_denied_access_surfaces_error_then_idle() {
        let mut session = RecordingSession::new(FakeDevice::denied(), vec![Box::new(WavEncoder)]);

        session.start();
        match session.state() {
            SessionState::Error(message) => assert!(message.contains("denied")),
            other => panic!("expected Error state, got {other:?}"),
        }

        session.acknowledge_error();
        assert_eq!(*session.state(), SessionState::Idle);
    }

    #[test]
    fn test_never_persisted_without_ready() {
        let (_, mut session) = session_with(vec![0.1; 64]);
        let recordings = repo();

        assert!(session.send(&recordings, "npm001", None).is_err());
        session.start();
        assert!(session.send(&recordings, "npm001", None).is_err());
        session.stop();
        assert!(session.send(&recordings, "npm001", None).is_err());
        assert!(recordings.list().is_empty());
    }

    #[test]
    fn test_device_released_on_teardown_mid_capture() {
        let (released, mut session) = session_with(vec![0.1; 8]);
        session.start();
        assert!(!released.load(Ordering::SeqCst));
        drop(session);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reset_discards_buffer_and_preview() {
        let (_, mut session) = session_with(vec![0.1; 8]);
        session.start();
        session.stop();
        session.finish().unwrap();

        let preview = session.preview_path().unwrap().to_path_buf();
        assert!(preview.exists());

        session.reset();
        assert_eq!(*session.state(), SessionState::Idle);
        assert!(session.encoded().is_none());
        assert!(!preview.exists());
    }

    #[test]
    fn test_record_again_after_persist() {
        let (_, mut session) = session_with(vec![0.1; 8]);
        let recordings = repo();

        session.start();
        session.stop();
        session.finish().unwrap();
        session.send(&recordings, "npm001", None).unwrap();

        session.reset();
        assert_eq!(*session.state(), SessionState::Idle);
        session.start();
        assert_eq!(*session.state(), SessionState::Capturing);
    }

    #[test]
    fn test_out_of_state_calls_are_ignored() {
        let (_, mut session) = session_with(vec![0.1; 8]);

        session.stop();
        assert_eq!(*session.state(), SessionState::Idle);
        session.reset();
        assert_eq!(*session.state(), SessionState::Idle);
        assert!(session.finish().is_err());

        session.start();
        let state = session.state().clone();
        session.start();
        assert_eq!(*session.state(), state);
    }

    #[test]
    fn test_negotiation_prefers_webm_then_ogg_then_mp4() {
        let encoders: Vec<Box<dyn AudioEncoder>> =
            vec![Box::new(StubEncoder(Codec::Mp4)), Box::new(StubEncoder(Codec::Ogg))];
        assert_eq!(negotiate_encoder(&encoders).unwrap().codec(), Codec::Ogg);

        let encoders: Vec<Box<dyn AudioEncoder>> = vec![
            Box::new(StubEncoder(Codec::Mp4)),
            Box::new(StubEncoder(Codec::Webm)),
        ];
        assert_eq!(negotiate_encoder(&encoders).unwrap().codec(), Codec::Webm);
    }

    #[test]
    fn test_negotiation_falls_back_to_first_registered() {
        let encoders: Vec<Box<dyn AudioEncoder>> = vec![Box::new(WavEncoder)];
        assert_eq!(negotiate_encoder(&encoders).unwrap().codec(), Codec::Wav);

        let none: Vec<Box<dyn AudioEncoder>> = Vec::new();
        assert!(negotiate_encoder(&none).is_none());
    }

    #[test]
    fn test_wav_encoder_produces_riff_bytes() {
        let bytes = WavEncoder.encode(&[0.0, 0.5, -0.5], 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte header + 3 samples * 2 bytes
        assert_eq!(bytes.len(), 44 + 6);
    }

    #[test]
    fn test_stub_codec_flows_into_recording_mime() {
        let device = FakeDevice::with_samples(vec![0.1; 8]);
        let mut session = RecordingSession::new(device, vec![Box::new(StubEncoder(Codec::Ogg))]);
        let recordings = repo();

        session.start();
        session.stop();
        session.finish().unwrap();
        let recording = session.send(&recordings, "npm001", None).unwrap();

        assert_eq!(recording.mime, "audio/ogg");
        assert!(recording.file_name.ends_with(".ogg"));
        assert!(recording.data_url.starts_with("data:audio/ogg;base64,"));
    }
}
