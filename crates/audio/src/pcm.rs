//! PCM-Engine: Aufnahme, De-Jitter-Wiedergabe, Rufton, Sende-Takt
//!
//! Herzstueck des Audio-Subsystems. Vier Worker-Threads:
//!
//! - **Aufnahme**: liest Frames vom Eingabegeraet in den Aufnahme-Ring,
//!   stempelt mit der Geraeteuhr und verwirft nicht-monotone Stempel
//!   (Anlauf-Muell nach dem Flush).
//! - **Wiedergabe**: entnimmt dem De-Jitter-Ring fertige Frames, gleicht
//!   den Taktversatz zwischen Quell- und Geraeteuhr aus (Drop/Duplikat)
//!   und verschleiert fehlende Slots aus den Nachbarn.
//! - **Rufton**: zwei ueberlagerte Sinustoene, 40 Frames an / 80 Frames
//!   aus, direkt am Ring vorbei geschrieben.
//! - **Sende-Takt**: ruft alle 20 ms den installierten Paketierer und
//!   passt die Schlafdauer an die Geraeteuhr an, damit sich kein Drift
//!   aufsummiert.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::AudioBuffer;
use crate::codec::CodecAudio;
use crate::device::PcmDevice;
use crate::error::AudioResult;
use crate::interface::{AudioInterface, Packetizer, SampleFormat};

/// Puffertiefe des Aufnahme-Rings in Frames
pub const FRAME_COUNT: usize = 10;

/// Low-Water-Mark fuer das De-Jittering
pub const LLBS: usize = 6;

/// Frame-Intervall in Millisekunden
pub const FRAME_INTERVAL_MS: i64 = 20;

/// Abtastrate in Hz
pub const SAMPLE_RATE: u32 = 8000;

/// Frame-Groesse in Bytes (8 kHz * 2 Byte * 20 ms)
pub const SAMPLE_SIZE: usize =
    (SAMPLE_RATE as usize) * 2 * (FRAME_INTERVAL_MS as usize) / 1000;

/// Bytes eines einzelnen PCM-Samples (mono, 16 bit)
const PCM_FRAME_BYTES: usize = 2;

/// Kapazitaet des De-Jitter-Rings (doppelte Aufnahmetiefe)
const PLAY_RING: usize = 2 * FRAME_COUNT;

/// Entscheidet ob ein fehlender Slot verschleiert oder abgewartet wird
///
/// Verschleiert wird, wenn dem Geraet der Ton ausgeht oder der Ring fast
/// voll ist – und nur wenn ein Vorgaenger-Frame existiert.
fn should_conceal(avail_frames: usize, ring_fill: i64, ring_cap: usize, has_prev: bool) -> bool {
    let mut conceal = false;
    if avail_frames > LLBS - 2 {
        conceal = true;
    }
    if ring_fill >= (ring_cap - 2) as i64 {
        conceal = true;
    }
    if !has_prev {
        conceal = false;
    }
    conceal
}

/// Taktversatz-Korrektur fuer einen Frame
#[derive(Debug, PartialEq, Eq)]
enum SkewAction {
    /// Nichts zu tun
    Keine,
    /// N Bytes am Frame-Anfang abschneiden (Quelle laeuft schneller)
    Kuerzen(usize),
    /// Ein Sample vor dem Frame doppeln (Geraet laeuft schneller)
    Doppeln,
}

/// Bestimmt die Korrektur aus `diff = (slotTs - micTs) - delta0`
fn skew_action(diff: i64) -> SkewAction {
    let max = (LLBS as i64 / 2) * FRAME_INTERVAL_MS;
    if diff > max {
        let bytes = if diff > LLBS as i64 * FRAME_INTERVAL_MS {
            PCM_FRAME_BYTES * 2
        } else {
            PCM_FRAME_BYTES
        };
        return SkewAction::Kuerzen(bytes);
    }
    if diff < -FRAME_INTERVAL_MS {
        return SkewAction::Doppeln;
    }
    SkewAction::Keine
}

/// Die PCM-Engine ueber zwei `PcmDevice`-Seiten
pub struct PcmAudio {
    input: Option<Arc<dyn PcmDevice>>,
    output: Option<Arc<dyn PcmDevice>>,

    // Aufnahme-Ring (Mikrofon -> Sender)
    record_ring: Vec<Mutex<AudioBuffer>>,
    mic_put: AtomicI64,
    mic_get: AtomicI64,
    last_mic_ts: AtomicI64,

    // De-Jitter-Ring (UDP -> Wiedergabe)
    play_ring: Vec<Mutex<AudioBuffer>>,
    jit_put: AtomicI64,
    jit_get: AtomicI64,
    jit_first: AtomicBool,
    player_enabled: AtomicBool,
    delta_player_minus_mic: AtomicI64,
    /// Kumulierter Sample-Versatz aus der Taktkorrektur
    fudge: AtomicI64,
    call_length_ms: AtomicI64,

    // Rufton
    ringing: AtomicBool,
    ring_timer: AtomicI64,
    ring_samples: Vec<u8>,
    silence: Vec<u8>,

    packetizer: Mutex<Option<Box<dyn Packetizer>>>,
    recording: AtomicBool,

    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    self_ref: Mutex<Weak<PcmAudio>>,
}

impl PcmAudio {
    /// Erstellt die Engine ueber den gegebenen Geraeteseiten (ohne Worker)
    pub fn with_devices(
        input: Option<Arc<dyn PcmDevice>>,
        output: Option<Arc<dyn PcmDevice>>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            input,
            output,
            record_ring: (0..FRAME_COUNT)
                .map(|_| Mutex::new(AudioBuffer::new(SAMPLE_SIZE)))
                .collect(),
            mic_put: AtomicI64::new(0),
            mic_get: AtomicI64::new(0),
            last_mic_ts: AtomicI64::new(0),
            play_ring: (0..PLAY_RING)
                .map(|_| Mutex::new(AudioBuffer::new(SAMPLE_SIZE)))
                .collect(),
            jit_put: AtomicI64::new(0),
            jit_get: AtomicI64::new(0),
            jit_first: AtomicBool::new(true),
            player_enabled: AtomicBool::new(false),
            delta_player_minus_mic: AtomicI64::new(0),
            fudge: AtomicI64::new(0),
            call_length_ms: AtomicI64::new(0),
            ringing: AtomicBool::new(false),
            ring_timer: AtomicI64::new(-1),
            ring_samples: generate_ring_samples(),
            silence: vec![0u8; SAMPLE_SIZE],
            packetizer: Mutex::new(None),
            recording: AtomicBool::new(false),
            running: AtomicBool::new(true),
            workers: Mutex::new(Vec::new()),
            self_ref: Mutex::new(Weak::new()),
        });

        *engine.self_ref.lock() = Arc::downgrade(&engine);

        if engine.input.is_none() {
            tracing::warn!("Kein Audio-Eingabegeraet (Mikrofon) verfuegbar");
        }
        if engine.output.is_none() {
            tracing::warn!("Kein Audio-Ausgabegeraet (Lautsprecher) verfuegbar");
        }
        tracing::debug!(
            sample_groesse = SAMPLE_SIZE,
            "8-kHz-16-bit-PCM-Audio-Engine erstellt"
        );

        engine
    }

    /// Startet Wiedergabe-, Rufton- und Sende-Takt-Worker
    pub fn start(&self) {
        let Some(engine) = self.self_ref.lock().upgrade() else {
            return;
        };
        let mut workers = self.workers.lock();

        if self.output.is_some() {
            let worker = Arc::clone(&engine);
            workers.push(std::thread::spawn(move || worker.player_worker()));

            let worker = Arc::clone(&engine);
            workers.push(std::thread::spawn(move || worker.ringer_worker()));
        }

        if self.input.is_some() {
            let worker = Arc::clone(&engine);
            workers.push(std::thread::spawn(move || worker.ticker_worker()));
        }
    }

    /// Kumulierter Sample-Versatz aus der Taktkorrektur
    pub fn sample_skew(&self) -> i64 {
        self.fudge.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Wiedergabe
    // -----------------------------------------------------------------------

    fn player_worker(self: Arc<Self>) {
        tracing::trace!("Wiedergabe-Worker gestartet");
        while self.running.load(Ordering::SeqCst) {
            let mut next = self.write_buffers_to_output();
            if next < 1 {
                next = FRAME_INTERVAL_MS;
            }
            std::thread::sleep(Duration::from_millis(next as u64));
        }
        tracing::trace!("Wiedergabe-Worker beendet");
    }

    /// Ein Durchlauf: entjitterte Frames ans Geraet schreiben
    ///
    /// Gibt die empfohlene Schlafdauer in ms zurueck.
    fn write_buffers_to_output(&self) -> i64 {
        let Some(out) = self.output.as_ref() else {
            return 0;
        };

        let top = self.jit_put.load(Ordering::SeqCst);
        let mut get = self.jit_get.load(Ordering::SeqCst);

        // Zu weit vorausgeeilter Schreiber: Lesezeiger aufholen lassen
        if top - get > self.play_ring.len() as i64 {
            get = if get == 0 {
                top
            } else {
                top - (self.play_ring.len() / 2) as i64
            };
            self.jit_get.store(get, Ordering::SeqCst);
        }

        if !self.player_enabled.load(Ordering::SeqCst) {
            // Anlauf erst bei halb gefuellten Puffern
            if top - get >= ((FRAME_COUNT + LLBS) / 2) as i64 {
                self.start_play();
                self.jit_first.store(true, Ordering::SeqCst);
                get = self.jit_get.load(Ordering::SeqCst);
            } else {
                return FRAME_INTERVAL_MS;
            }
        }

        let mut sz = SAMPLE_SIZE as i64;
        let mut fudge_synch = true;

        while get <= top {
            let slot = &self.play_ring[(get as usize) % self.play_ring.len()];
            let mut ab = slot.lock();
            let frame_len = ab.len();
            sz = frame_len as i64;

            let avail = out.available() / (frame_len + 2);
            if avail == 0 {
                break; // kein Platz im Geraetepuffer
            }

            if !ab.is_written() {
                let conceal = should_conceal(
                    avail,
                    top - get,
                    self.play_ring.len(),
                    get > 0,
                );
                if conceal {
                    drop(ab);
                    self.conceal_slot(get);
                    ab = slot.lock();
                } else {
                    break; // auf fehlende Daten warten
                }
            }

            let mut start = 0usize;
            let mut len = frame_len;

            // Korrektur nur mit Zeitreferenz vom Mikrofon, einmal pro Durchlauf
            let last_mic = self.last_mic_ts.load(Ordering::SeqCst);
            if fudge_synch && last_mic > 0 && last_mic != i64::MAX {
                fudge_synch = false;
                let delta = ab.timestamp() - last_mic;

                if self.jit_first.swap(false, Ordering::SeqCst) {
                    self.delta_player_minus_mic.store(delta, Ordering::SeqCst);
                } else {
                    let diff = delta - self.delta_player_minus_mic.load(Ordering::SeqCst);
                    match skew_action(diff) {
                        SkewAction::Kuerzen(bytes) => {
                            start = bytes;
                            len -= bytes;
                            self.fudge.fetch_sub(
                                (bytes / PCM_FRAME_BYTES) as i64,
                                Ordering::SeqCst,
                            );
                        }
                        SkewAction::Doppeln => {
                            out.write(&ab.data()[..PCM_FRAME_BYTES]);
                            self.fudge.fetch_add(1, Ordering::SeqCst);
                        }
                        SkewAction::Keine => {}
                    }
                }
            }

            out.write(&ab.data()[start..start + len]);
            self.call_length_ms
                .fetch_add(FRAME_INTERVAL_MS, Ordering::SeqCst);
            ab.set_read();
            drop(ab);

            get += 1;
            self.jit_get.store(get, Ordering::SeqCst);
        }

        ((sz * LLBS as i64 / 2) - out.available() as i64) / 8
    }

    /// Verschleiert Slot `n` aus den Nachbar-Frames
    ///
    /// Byte-weise Mittelung (prev>>1 + next>>1); bei 16-bit-Samples trifft
    /// das auch Low-Bytes benachbarter Samples und bleibt hoerbar unsauber.
    fn conceal_slot(&self, n: i64) {
        let len = self.play_ring.len();
        let prev = self.play_ring[((n - 1) as usize) % len].lock();
        let next = self.play_ring[((n + 1) as usize) % len].lock();
        let mut target = self.play_ring[(n as usize) % len].lock();

        for i in 0..target.len() {
            let p = prev.data()[i] as i8;
            let x = next.data()[i] as i8;
            target.data_mut()[i] = ((p >> 1).wrapping_add(x >> 1)) as u8;
        }
        target.set_written();
        tracing::trace!(slot = n, "Fehlenden Frame verschleiert");
    }

    // -----------------------------------------------------------------------
    // Aufnahme
    // -----------------------------------------------------------------------

    fn recorder_worker(self: Arc<Self>) {
        tracing::trace!("Aufnahme-Worker gestartet");
        let mut frame = vec![0u8; SAMPLE_SIZE];

        while self.running.load(Ordering::SeqCst) && self.recording.load(Ordering::SeqCst) {
            let Some(input) = self.input.as_ref() else {
                break;
            };

            if input.read(&mut frame).is_err() {
                continue;
            }
            let stamp = input.clock_ms();
            let last = self.last_mic_ts.load(Ordering::SeqCst);

            if stamp >= last {
                let put = self.mic_put.load(Ordering::SeqCst);
                let slot = &self.record_ring[(put as usize) % self.record_ring.len()];
                let mut ab = slot.lock();
                ab.data_mut().copy_from_slice(&frame);
                ab.set_timestamp(stamp);
                ab.set_written();
                drop(ab);
                self.mic_put.fetch_add(1, Ordering::SeqCst);
            }
            // Nicht-monotone Stempel (Anlauf-Muell) werden verworfen

            self.last_mic_ts.store(stamp, Ordering::SeqCst);
        }
        tracing::trace!("Aufnahme-Worker beendet");
    }

    // -----------------------------------------------------------------------
    // Sende-Takt
    // -----------------------------------------------------------------------

    fn ticker_worker(self: Arc<Self>) {
        tracing::trace!("Sende-Takt gestartet");
        let mut set: i64 = 0;
        let mut point: i64 = 0;
        let mut audio_time = false;

        while self.running.load(Ordering::SeqCst) {
            let Some(input) = self.input.as_ref() else {
                break;
            };

            point += FRAME_INTERVAL_MS;
            let mut delta = point - set + FRAME_INTERVAL_MS;

            if input.is_active() {
                if !audio_time {
                    // Zeitsprung beim Aufnahmestart abfangen
                    audio_time = true;
                    set = input.clock_ms();
                    point = set;
                }
            } else {
                point = 0;
                delta = FRAME_INTERVAL_MS;
                set = wall_clock_ms();
                audio_time = false;
            }

            self.send_audio_frame();

            // Zu spaet -> set > point -> kuerzer schlafen; zu frueh -> laenger
            if delta > 1 {
                std::thread::sleep(Duration::from_millis(delta as u64));
            }

            if audio_time {
                set = input.clock_ms();
            }
        }
        tracing::trace!("Sende-Takt beendet");
    }

    fn send_audio_frame(&self) {
        let mut guard = self.packetizer.lock();
        if let Some(packetizer) = guard.as_mut() {
            if let Err(e) = packetizer.send() {
                tracing::warn!(fehler = %e, "Paketierer-Fehler im Sende-Takt");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Rufton
    // -----------------------------------------------------------------------

    fn ringer_worker(self: Arc<Self>) {
        tracing::trace!("Rufton-Worker gestartet");
        while self.running.load(Ordering::SeqCst) {
            let mut nap: i64 = 100;

            if self.ringing.load(Ordering::SeqCst) {
                nap = 0;
                while nap < FRAME_INTERVAL_MS && self.running.load(Ordering::SeqCst) {
                    let t = self.ring_timer.fetch_add(1, Ordering::SeqCst);
                    let in_ring = t.rem_euclid(120) < 40;
                    let samples = if in_ring {
                        &self.ring_samples
                    } else {
                        &self.silence
                    };
                    nap = self.write_direct_if_avail(samples);
                }
            }

            std::thread::sleep(Duration::from_millis(nap.max(1) as u64));
        }
        tracing::trace!("Rufton-Worker beendet");
    }

    /// Schreibt direkt aufs Geraet, sofern Platz ist
    ///
    /// Gibt zurueck, wie viele Millisekunden bis zum naechsten Schreiben
    /// geschlafen werden soll.
    fn write_direct_if_avail(&self, samples: &[u8]) -> i64 {
        let Some(out) = self.output.as_ref() else {
            return 0;
        };
        if out.available() > samples.len() {
            out.write(samples);
        }
        ((samples.len() * 2) as i64 - out.available() as i64) / 8
    }
}

impl AudioInterface for PcmAudio {
    fn sample_size(&self) -> usize {
        SAMPLE_SIZE
    }

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::Lin16
    }

    fn read_with_timestamp(&self, buf: &mut [u8]) -> AudioResult<i64> {
        let len = self.record_ring.len();
        let get = self.mic_get.load(Ordering::SeqCst);
        let put = self.mic_put.load(Ordering::SeqCst);
        let buf_cap = ((put - get) as usize) % len;

        let slot = &self.record_ring[(get as usize) % len];
        let mut ab = slot.lock();

        if ab.is_written() && (get > 0 || buf_cap >= len / 2) {
            let ts = ab.timestamp();
            resample(ab.data(), buf);
            ab.set_read();
            drop(ab);
            self.mic_get.fetch_add(1, Ordering::SeqCst);
            Ok(ts)
        } else {
            // Kein frischer Frame: Stille liefern, Takt bleibt ehrlich
            buf.fill(0);
            Ok(ab.timestamp())
        }
    }

    fn write_buffered(&self, buf: &[u8], timestamp_ms: i64) -> AudioResult<()> {
        if self.output.is_none() {
            return Ok(());
        }

        let fno = timestamp_ms / FRAME_INTERVAL_MS;
        let slot = &self.play_ring[(fno as usize) % self.play_ring.len()];
        let mut ab = slot.lock();

        let n = ab.len().min(buf.len());
        ab.data_mut()[..n].copy_from_slice(&buf[..n]);
        ab.set_written();
        ab.set_timestamp(timestamp_ms);
        drop(ab);

        self.jit_put.store(fno, Ordering::SeqCst);
        Ok(())
    }

    fn write_directly(&self, buf: &[u8]) {
        if let Some(out) = self.output.as_ref() {
            out.write(buf);
        }
    }

    fn start_recording(&self) -> i64 {
        let Some(input) = self.input.as_ref() else {
            return 0;
        };

        if input.available() > 0 {
            input.flush();
            // Sentinel: verdraengt Altdaten bis zum ersten frischen Stempel
            self.last_mic_ts.store(i64::MAX, Ordering::SeqCst);
        } else {
            self.last_mic_ts.store(0, Ordering::SeqCst);
        }

        input.start();

        self.mic_put.store(0, Ordering::SeqCst);
        self.mic_get.store(0, Ordering::SeqCst);
        for slot in &self.record_ring {
            slot.lock().set_read();
        }

        if !self.recording.swap(true, Ordering::SeqCst) {
            if let Some(engine) = self.self_ref.lock().upgrade() {
                self.workers
                    .lock()
                    .push(std::thread::spawn(move || engine.recorder_worker()));
            }
        }

        tracing::debug!("Aufnahme gestartet");
        input.clock_ms()
    }

    fn stop_recording(&self) {
        let Some(input) = self.input.as_ref() else {
            return;
        };
        input.stop();
        self.recording.store(false, Ordering::SeqCst);
        *self.packetizer.lock() = None;
        tracing::debug!("Aufnahme gestoppt");
    }

    fn start_play(&self) {
        let Some(out) = self.output.as_ref() else {
            return;
        };

        self.jit_put.store(0, Ordering::SeqCst);
        self.jit_get.store(0, Ordering::SeqCst);
        self.fudge.store(0, Ordering::SeqCst);
        self.call_length_ms.store(0, Ordering::SeqCst);

        out.flush();
        out.start();
        self.player_enabled.store(true, Ordering::SeqCst);
        tracing::debug!("Wiedergabe gestartet");
    }

    fn stop_play(&self) {
        self.jit_put.store(0, Ordering::SeqCst);
        self.jit_get.store(0, Ordering::SeqCst);
        self.player_enabled.store(false, Ordering::SeqCst);

        let Some(out) = self.output.as_ref() else {
            return;
        };
        out.stop();

        let fudge = self.fudge.swap(0, Ordering::SeqCst);
        let call_len = self.call_length_ms.load(Ordering::SeqCst);
        if fudge != 0 && call_len > 0 {
            tracing::debug!(
                versatz_samples = fudge,
                prozent = 100.0 * fudge as f64 / (8.0 * call_len as f64),
                "Kumulierter Taktversatz"
            );
        }
        if call_len > 0 {
            tracing::debug!(dauer_ms = call_len, "Anruflaenge");
        }
        out.flush();
    }

    fn start_ringing(&self) {
        let Some(out) = self.output.as_ref() else {
            return;
        };
        out.flush();
        out.start();
        self.ringing.store(true, Ordering::SeqCst);
    }

    fn stop_ringing(&self) {
        let Some(out) = self.output.as_ref() else {
            return;
        };
        if self.ringing.swap(false, Ordering::SeqCst) {
            self.ring_timer.store(-1, Ordering::SeqCst);
            out.stop();
            out.flush();
        }
    }

    fn set_packetizer(&self, packetizer: Option<Box<dyn Packetizer>>) {
        *self.packetizer.lock() = packetizer;
    }

    fn by_format(self: Arc<Self>, format: SampleFormat) -> Arc<dyn AudioInterface> {
        match format {
            SampleFormat::Lin16 => self,
            SampleFormat::Alaw | SampleFormat::Ulaw => Arc::new(CodecAudio::new(self, format)),
        }
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.recording.store(false, Ordering::SeqCst);
        *self.packetizer.lock() = None;

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        if let Some(out) = self.output.as_ref() {
            out.stop();
        }
        if let Some(input) = self.input.as_ref() {
            input.stop();
        }
    }
}

/// Einfacher PCM-Umtaster (dokumentierter Helfer)
///
/// Gleiche Laenge: Kopie. Doppelte Quelle: Stereo, linker Kanal wird
/// uebernommen. Sonst wird eine 44,1-kHz-Quelle per Eimer-Mittelung auf
/// 8 kHz gebracht (ohne Anti-Aliasing).
pub fn resample(src: &[u8], dest: &mut [u8]) {
    if src.len() == dest.len() {
        dest.copy_from_slice(src);
        return;
    }

    if src.len() == dest.len() * 2 {
        for i in 0..dest.len() / 2 {
            dest[i * 2] = src[i * 4];
            dest[i * 2 + 1] = src[i * 4 + 1];
        }
        return;
    }

    let drange = dest.len() / 2;
    if drange == 0 {
        return;
    }

    let mut sums = vec![0f64; drange];
    let mut counts = vec![0f64; drange];

    let ratio = 8000.0 / 44100.0;
    let top = src.len() / 2;
    for eo in 0..top {
        let mut bucket = (eo as f64 * ratio).floor() as usize;
        if bucket >= drange {
            bucket = drange - 1;
        }
        let sample = i16::from_le_bytes([src[eo * 2], src[eo * 2 + 1]]) as f64;
        sums[bucket] += sample;
        counts[bucket] += 1.0;
    }

    let mut value: i16 = 0;
    for (i, (sum, count)) in sums.iter().zip(counts.iter()).enumerate() {
        if *count != 0.0 {
            value = (sum / count) as i16;
        }
        dest[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }
}

/// Erzeugt die Rufton-Samples: 25-Hz-Huellkurve mal 420-Hz-Ton bei -12 dBFS
fn generate_ring_samples() -> Vec<u8> {
    let freq1 = 25.0 / 8000.0;
    let freq2 = 420.0 / 8000.0;
    let mut out = Vec::with_capacity(SAMPLE_SIZE);

    for i in 0..(SAMPLE_SIZE / 2) {
        let i = i as f64;
        let s = (i16::MAX as f64
            * (2.0 * std::f64::consts::PI * freq1 * i).sin()
            * (4.0 * std::f64::consts::PI * freq2 * i).sin()
            / 4.0) as i16;
        out.extend_from_slice(&s.to_le_bytes());
    }

    out
}

fn wall_clock_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::AtomicUsize;

    /// Skriptbares Ausgabegeraet fuer Wiedergabe-Tests
    struct TestDevice {
        available: AtomicUsize,
        clock: AtomicI64,
        written: PlMutex<Vec<Vec<u8>>>,
        active: AtomicBool,
    }

    impl TestDevice {
        fn new(available: usize) -> Arc<Self> {
            Arc::new(Self {
                available: AtomicUsize::new(available),
                clock: AtomicI64::new(0),
                written: PlMutex::new(Vec::new()),
                active: AtomicBool::new(false),
            })
        }

        fn written_frames(&self) -> usize {
            self.written.lock().len()
        }

        fn written_bytes(&self) -> usize {
            self.written.lock().iter().map(|w| w.len()).sum()
        }
    }

    impl PcmDevice for TestDevice {
        fn read(&self, buf: &mut [u8]) -> AudioResult<()> {
            buf.fill(0);
            Ok(())
        }
        fn write(&self, buf: &[u8]) {
            self.written.lock().push(buf.to_vec());
        }
        fn available(&self) -> usize {
            self.available.load(Ordering::SeqCst)
        }
        fn clock_ms(&self) -> i64 {
            self.clock.load(Ordering::SeqCst)
        }
        fn start(&self) {
            self.active.store(true, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.active.store(false, Ordering::SeqCst);
        }
        fn flush(&self) {}
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    fn engine_mit_ausgabe(available: usize) -> (Arc<PcmAudio>, Arc<TestDevice>) {
        let dev = TestDevice::new(available);
        let engine = PcmAudio::with_devices(None, Some(dev.clone()));
        (engine, dev)
    }

    fn frame(wert: u8) -> Vec<u8> {
        vec![wert; SAMPLE_SIZE]
    }

    #[test]
    fn konstanten_konsistent() {
        assert_eq!(SAMPLE_SIZE, 320);
        assert_eq!(PLAY_RING, 20);
        assert_eq!((FRAME_COUNT + LLBS) / 2, 8);
    }

    #[test]
    fn wiedergabe_primt_erst_bei_gefuelltem_ring() {
        let (engine, dev) = engine_mit_ausgabe(10_000);

        // Schreibzeiger bei Slot 7: Fuellstand 7 < Primer-Schwelle 8
        for i in 0..8 {
            engine
                .write_buffered(&frame(1), i * FRAME_INTERVAL_MS)
                .unwrap();
        }
        engine.write_buffers_to_output();
        assert!(!engine.player_enabled.load(Ordering::SeqCst));
        assert_eq!(dev.written_frames(), 0);

        // Schreibzeiger erreicht Slot 8: Primer-Schwelle erfuellt
        engine
            .write_buffered(&frame(1), 8 * FRAME_INTERVAL_MS)
            .unwrap();
        engine.write_buffers_to_output();
        assert!(engine.player_enabled.load(Ordering::SeqCst));
        assert!(dev.written_frames() > 0);
    }

    #[test]
    fn conceal_entscheidung() {
        // Geraet laeuft leer -> verschleiern
        assert!(should_conceal(LLBS - 1, 0, PLAY_RING, true));
        // Ring fast voll -> verschleiern
        assert!(should_conceal(0, (PLAY_RING - 2) as i64, PLAY_RING, true));
        // Weder noch -> warten
        assert!(!should_conceal(LLBS - 2, 0, PLAY_RING, true));
        // Ohne Vorgaenger nie verschleiern
        assert!(!should_conceal(LLBS + 4, (PLAY_RING - 1) as i64, PLAY_RING, false));
    }

    #[test]
    fn skew_grenzwerte() {
        let max = (LLBS as i64 / 2) * FRAME_INTERVAL_MS; // 60
        assert_eq!(skew_action(max), SkewAction::Keine);
        assert_eq!(skew_action(max + 1), SkewAction::Kuerzen(PCM_FRAME_BYTES));
        assert_eq!(
            skew_action(LLBS as i64 * FRAME_INTERVAL_MS + 1),
            SkewAction::Kuerzen(PCM_FRAME_BYTES * 2)
        );
        assert_eq!(skew_action(-FRAME_INTERVAL_MS), SkewAction::Keine);
        assert_eq!(skew_action(-FRAME_INTERVAL_MS - 1), SkewAction::Doppeln);
    }

    /// Fuellt Slots 0..=8, etabliert delta0 = 0 - 1000 = -1000 und spielt ab
    fn skew_vorbereitung(engine: &Arc<PcmAudio>) {
        engine.last_mic_ts.store(1000, Ordering::SeqCst);
        for i in 0..9 {
            engine
                .write_buffered(&frame(2), i * FRAME_INTERVAL_MS)
                .unwrap();
        }
        engine.write_buffers_to_output();
        assert!(engine.player_enabled.load(Ordering::SeqCst));
        assert!(!engine.jit_first.load(Ordering::SeqCst));
    }

    #[test]
    fn skew_kuerzt_einen_frame() {
        let (engine, dev) = engine_mit_ausgabe(10_000);
        skew_vorbereitung(&engine);
        let schon_geschrieben = dev.written_bytes();

        // Slot 9 (ts = 180); Mikrofon-Referenz so, dass diff = max + 1 = 61:
        // diff = (180 - M) - (-1000) = 1180 - M  ->  M = 1119
        engine.last_mic_ts.store(1119, Ordering::SeqCst);
        engine
            .write_buffered(&frame(3), 9 * FRAME_INTERVAL_MS)
            .unwrap();
        engine.write_buffers_to_output();

        let neu = dev.written_bytes() - schon_geschrieben;
        assert_eq!(neu, SAMPLE_SIZE - PCM_FRAME_BYTES, "ein Sample abgeschnitten");
        assert_eq!(engine.sample_skew(), -1);
    }

    #[test]
    fn skew_panik_kuerzt_zwei_samples() {
        let (engine, _dev) = engine_mit_ausgabe(10_000);
        skew_vorbereitung(&engine);

        // diff = LLBS * 20 + 1 = 121  ->  M = 1180 - 121 = 1059
        engine.last_mic_ts.store(1059, Ordering::SeqCst);
        engine
            .write_buffered(&frame(3), 9 * FRAME_INTERVAL_MS)
            .unwrap();
        engine.write_buffers_to_output();

        assert_eq!(engine.sample_skew(), -2);
    }

    #[test]
    fn skew_doppelt_ein_sample() {
        let (engine, dev) = engine_mit_ausgabe(10_000);
        skew_vorbereitung(&engine);
        let schon_geschrieben = dev.written_bytes();

        // diff = -21  ->  M = 1180 + 21 = 1201
        engine.last_mic_ts.store(1201, Ordering::SeqCst);
        engine
            .write_buffered(&frame(3), 9 * FRAME_INTERVAL_MS)
            .unwrap();
        engine.write_buffers_to_output();

        let neu = dev.written_bytes() - schon_geschrieben;
        assert_eq!(neu, SAMPLE_SIZE + PCM_FRAME_BYTES, "ein Sample gedoppelt");
        assert_eq!(engine.sample_skew(), 1);
    }

    #[test]
    fn fehlender_slot_wird_verschleiert() {
        let (engine, dev) = engine_mit_ausgabe(10_000);

        // Primer fuellen, dann Luecke bei Slot 8 lassen und Slot 9 schreiben
        for i in 0..8 {
            engine
                .write_buffered(&frame(4), i * FRAME_INTERVAL_MS)
                .unwrap();
        }
        engine
            .write_buffered(&frame(8), 9 * FRAME_INTERVAL_MS)
            .unwrap();

        // available gross -> Geraet laeuft leer -> Verschleierung statt Warten
        engine.write_buffers_to_output();

        // 10 Frames raus: 8 echte + 1 verschleierter + Slot 9
        assert_eq!(dev.written_frames(), 10);
        // Der verschleierte Frame ist die Byte-Mittelung der Nachbarn (4>>1 + 8>>1 = 6)
        let frames = dev.written.lock();
        assert!(frames[8].iter().all(|&b| b == 6));
    }

    #[test]
    fn fehlender_slot_ohne_druck_wartet() {
        // available klein: weder laeuft das Geraet leer noch ist der Ring voll
        let (engine, dev) = engine_mit_ausgabe((LLBS - 2) * (SAMPLE_SIZE + 2));

        for i in 0..8 {
            engine
                .write_buffered(&frame(4), i * FRAME_INTERVAL_MS)
                .unwrap();
        }
        engine
            .write_buffered(&frame(8), 9 * FRAME_INTERVAL_MS)
            .unwrap();

        engine.write_buffers_to_output();

        // Bei Slot 8 wird gewartet: hoechstens die 8 echten Frames vorher
        assert!(dev.written_frames() <= 8);
    }

    #[test]
    fn write_buffered_platziert_nach_zeitstempel() {
        let (engine, _dev) = engine_mit_ausgabe(10_000);
        engine.write_buffered(&frame(7), 5 * FRAME_INTERVAL_MS).unwrap();

        let slot = engine.play_ring[5].lock();
        assert!(slot.is_written());
        assert_eq!(slot.timestamp(), 5 * FRAME_INTERVAL_MS);
        assert_eq!(engine.jit_put.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn mikrofon_liefert_stille_ohne_frischen_frame() {
        let engine = PcmAudio::with_devices(None, None);
        let mut buf = vec![0xFFu8; SAMPLE_SIZE];
        engine.read_with_timestamp(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn mikrofon_ring_round_trip() {
        let engine = PcmAudio::with_devices(None, None);

        // Haelfte des Rings fuellen (Startbedingung fuer den ersten Read)
        for i in 0..(FRAME_COUNT / 2) {
            let put = engine.mic_put.load(Ordering::SeqCst);
            let slot = &engine.record_ring[(put as usize) % FRAME_COUNT];
            let mut ab = slot.lock();
            ab.data_mut().fill(i as u8 + 1);
            ab.set_timestamp((i as i64 + 1) * FRAME_INTERVAL_MS);
            ab.set_written();
            drop(ab);
            engine.mic_put.fetch_add(1, Ordering::SeqCst);
        }

        let mut buf = vec![0u8; SAMPLE_SIZE];
        let ts = engine.read_with_timestamp(&mut buf).unwrap();
        assert_eq!(ts, FRAME_INTERVAL_MS);
        assert!(buf.iter().all(|&b| b == 1));
    }

    #[test]
    fn rufton_samples_form() {
        let samples = generate_ring_samples();
        assert_eq!(samples.len(), SAMPLE_SIZE);
        // Signal ist nicht still
        assert!(samples.iter().any(|&b| b != 0));
        // Erster Sample ist 0 (sin(0) = 0)
        assert_eq!(i16::from_le_bytes([samples[0], samples[1]]), 0);
    }

    #[test]
    fn resample_gleiche_laenge_kopiert() {
        let src = vec![3u8; 8];
        let mut dest = vec![0u8; 8];
        resample(&src, &mut dest);
        assert_eq!(dest, src);
    }

    #[test]
    fn resample_stereo_nimmt_linken_kanal() {
        // [L0, R0, L1, R1] als 16-bit-LE-Paare
        let mut src = Vec::new();
        for (l, r) in [(100i16, -100i16), (200, -200)] {
            src.extend_from_slice(&l.to_le_bytes());
            src.extend_from_slice(&r.to_le_bytes());
        }
        let mut dest = vec![0u8; 4];
        resample(&src, &mut dest);
        assert_eq!(i16::from_le_bytes([dest[0], dest[1]]), 100);
        assert_eq!(i16::from_le_bytes([dest[2], dest[3]]), 200);
    }

    #[test]
    fn ring_timer_kadenz() {
        // 40 Frames an, 80 aus
        assert!((0i64).rem_euclid(120) < 40);
        assert!((39i64).rem_euclid(120) < 40);
        assert!((40i64).rem_euclid(120) >= 40);
        assert!((119i64).rem_euclid(120) >= 40);
        assert!((120i64).rem_euclid(120) < 40);
    }

    #[test]
    fn shutdown_beendet_worker() {
        let dev = TestDevice::new(10_000);
        let engine = PcmAudio::with_devices(Some(dev.clone()), Some(dev.clone()));
        engine.start();
        std::thread::sleep(Duration::from_millis(30));
        engine.shutdown();
        assert!(engine.workers.lock().is_empty());
    }
}
