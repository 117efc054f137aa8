//! Audio-Stub fuer die Tests dieses Crates

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fluesterfon_audio::{AudioError, AudioInterface, Packetizer, SampleFormat};

/// Aufzeichnendes Audio-Interface im A-law-Format (160-Byte-Frames)
pub struct StubAudio {
    frames: Mutex<Vec<(Vec<u8>, i64)>>,
    ringing: AtomicBool,
    recording: AtomicBool,
    packetizer: Mutex<Option<Box<dyn Packetizer>>>,
}

impl StubAudio {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            ringing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            packetizer: Mutex::new(None),
        })
    }

    pub fn gepufferte_frames(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn frame(&self, index: usize) -> (Vec<u8>, i64) {
        self.frames.lock()[index].clone()
    }

    pub fn klingelt(&self) -> bool {
        self.ringing.load(Ordering::SeqCst)
    }

    pub fn nimmt_auf(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn hat_packetizer(&self) -> bool {
        self.packetizer.lock().is_some()
    }
}

impl AudioInterface for StubAudio {
    fn sample_size(&self) -> usize {
        160
    }

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::Alaw
    }

    fn read_with_timestamp(&self, buf: &mut [u8]) -> Result<i64, AudioError> {
        buf.fill(0);
        Ok(0)
    }

    fn write_buffered(&self, buf: &[u8], timestamp_ms: i64) -> Result<(), AudioError> {
        self.frames.lock().push((buf.to_vec(), timestamp_ms));
        Ok(())
    }

    fn write_directly(&self, _buf: &[u8]) {}

    fn start_recording(&self) -> i64 {
        self.recording.store(true, Ordering::SeqCst);
        0
    }

    fn stop_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    fn start_play(&self) {}

    fn stop_play(&self) {}

    fn start_ringing(&self) {
        self.ringing.store(true, Ordering::SeqCst);
    }

    fn stop_ringing(&self) {
        self.ringing.store(false, Ordering::SeqCst);
    }

    fn set_packetizer(&self, packetizer: Option<Box<dyn Packetizer>>) {
        *self.packetizer.lock() = packetizer;
    }

    fn by_format(self: Arc<Self>, _format: SampleFormat) -> Arc<dyn AudioInterface> {
        self
    }

    fn shutdown(&self) {}
}
