//! Optional WAV capture of each audio turn.
//!
//! Input is written at 16 kHz and output at 24 kHz, both mono 16-bit PCM.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use sonicdesk_core::event::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use tracing::{debug, info, warn};

type Writer = hound::WavWriter<BufWriter<File>>;

const RECEIVED_LOG_EVERY: u64 = 100;
const SENT_LOG_EVERY: u64 = 10;

fn spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_pcm(writer: &mut Writer, pcm: &[u8]) -> Result<()> {
    for pair in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
    }
    Ok(())
}

/// Debug WAV files for one connection. Files are opened per audio turn.
pub struct DebugAudioRecorder {
    dir: PathBuf,
    input: Option<Writer>,
    output: Option<Writer>,
    files: Vec<PathBuf>,
    received_chunks: u64,
    sent_chunks: u64,
}

impl DebugAudioRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            input: None,
            output: None,
            files: Vec::new(),
            received_chunks: 0,
            sent_chunks: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some() || self.output.is_some()
    }

    /// Paths of every file opened so far.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn received_chunks(&self) -> u64 {
        self.received_chunks
    }

    pub fn sent_chunks(&self) -> u64 {
        self.sent_chunks
    }

    /// Open `input_<ts>.wav` and `output_<ts>.wav`, closing any previous pair.
    pub fn open(&mut self) -> Result<()> {
        self.close();
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create debug audio dir: {}", self.dir.display()))?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let input_path = self.dir.join(format!("input_{stamp}.wav"));
        let output_path = self.dir.join(format!("output_{stamp}.wav"));
        self.input = Some(create(&input_path, INPUT_SAMPLE_RATE)?);
        self.output = Some(create(&output_path, OUTPUT_SAMPLE_RATE)?);
        info!(input = %input_path.display(), output = %output_path.display(), "Debug audio files opened");
        self.files.push(input_path);
        self.files.push(output_path);
        Ok(())
    }

    pub fn write_input(&mut self, pcm: &[u8]) {
        let Some(writer) = self.input.as_mut() else { return };
        if let Err(e) = write_pcm(writer, pcm) {
            warn!(error = %e, "Failed to write debug input audio");
            return;
        }
        self.received_chunks += 1;
        if self.received_chunks % RECEIVED_LOG_EVERY == 0 {
            info!(chunks = self.received_chunks, "Received audio chunks");
        }
    }

    pub fn write_output(&mut self, pcm: &[u8]) {
        let Some(writer) = self.output.as_mut() else { return };
        if let Err(e) = write_pcm(writer, pcm) {
            warn!(error = %e, "Failed to write debug output audio");
            return;
        }
        self.sent_chunks += 1;
        if self.sent_chunks % SENT_LOG_EVERY == 0 {
            info!(chunks = self.sent_chunks, "Sent response chunks");
        }
    }

    /// Finalize both files. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        for writer in [self.input.take(), self.output.take()].into_iter().flatten() {
            if let Err(e) = writer.finalize() {
                warn!(error = %e, "Failed to finalize debug audio file");
            }
        }
        info!(
            received = self.received_chunks,
            sent = self.sent_chunks,
            "Debug audio files closed"
        );
    }
}

impl Drop for DebugAudioRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

fn create(path: &Path, sample_rate: u32) -> Result<Writer> {
    debug!(path = %path.display(), sample_rate, "Creating debug WAV");
    hound::WavWriter::create(path, spec(sample_rate))
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))
}
