//! Output sinks the playback thread writes to.

use crate::core::{AvOut, Extradata, Result, SubtitleOut, TrackKind, INVALID_PTS};
use log::{debug, info};
use parking_lot::Mutex;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Audio or video elementary stream consumer.
pub trait AvSink: Send {
    fn write(&mut self, out: &AvOut<'_>) -> Result<()>;

    fn clear(&mut self) {}

    fn play(&mut self) {}

    fn pause(&mut self) {}

    /// Current play position (90 kHz), `INVALID_PTS` when unknown.
    fn play_pts(&self) -> i64 {
        INVALID_PTS
    }
}

pub trait SubtitleSink: Send {
    fn write(&mut self, out: &SubtitleOut<'_>) -> Result<()>;

    fn clear(&mut self) {}
}

/// Video, audio and subtitle sinks.
pub struct Output {
    pub video: Box<dyn AvSink>,
    pub audio: Box<dyn AvSink>,
    pub subtitle: Box<dyn SubtitleSink>,
}

pub type SharedOutput = Arc<Mutex<Output>>;

impl Output {
    pub fn new(
        video: Box<dyn AvSink>,
        audio: Box<dyn AvSink>,
        subtitle: Box<dyn SubtitleSink>,
    ) -> Self {
        Self {
            video,
            audio,
            subtitle,
        }
    }

    pub fn null() -> Self {
        Self::new(Box::new(NullSink::new()), Box::new(NullSink::new()), Box::new(NullSink::new()))
    }

    pub fn shared(self) -> SharedOutput {
        Arc::new(Mutex::new(self))
    }

    pub fn clear(&mut self) {
        self.video.clear();
        self.audio.clear();
        self.subtitle.clear();
    }

    pub fn play(&mut self) {
        self.video.play();
        self.audio.play();
    }

    pub fn pause(&mut self) {
        self.video.pause();
        self.audio.pause();
    }

    /// Video position when known, else audio.
    pub fn play_pts(&self) -> i64 {
        let pts = self.video.play_pts();
        if pts != INVALID_PTS {
            pts
        } else {
            self.audio.play_pts()
        }
    }
}

/// Discards everything. The pts of the last write stands in for the play
/// position.
#[derive(Debug, Clone, Copy)]
pub struct NullSink {
    last_pts: i64,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            last_pts: INVALID_PTS,
        }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AvSink for NullSink {
    fn write(&mut self, out: &AvOut<'_>) -> Result<()> {
        if out.pts != INVALID_PTS {
            self.last_pts = out.pts;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.last_pts = INVALID_PTS;
    }

    fn play_pts(&self) -> i64 {
        self.last_pts
    }
}

impl SubtitleSink for NullSink {
    fn write(&mut self, _out: &SubtitleOut<'_>) -> Result<()> {
        Ok(())
    }
}

/// Writes the elementary stream to a file or device node.
///
/// Codec extradata is written in front of the first payload and again
/// whenever it changes.
pub struct EsFileSink {
    kind: TrackKind,
    writer: BufWriter<File>,
    last_extradata: Vec<u8>,
    last_pts: i64,
    bytes_written: u64,
}

impl EsFileSink {
    pub fn create(kind: TrackKind, path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        info!("📝 {} output: {}", kind.as_str(), path.display());
        Ok(Self {
            kind,
            writer: BufWriter::new(file),
            last_extradata: Vec::new(),
            last_pts: INVALID_PTS,
            bytes_written: 0,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }
}

impl AvSink for EsFileSink {
    fn write(&mut self, out: &AvOut<'_>) -> Result<()> {
        if let Extradata::Raw(extra) = out.extradata {
            if !extra.is_empty() && extra != self.last_extradata.as_slice() {
                debug!("{} extradata changed ({} bytes)", self.kind.as_str(), extra.len());
                self.put(extra)?;
                self.last_extradata = extra.to_vec();
            }
        }
        self.put(out.data)?;
        if out.pts != INVALID_PTS {
            self.last_pts = out.pts;
        }
        Ok(())
    }

    fn clear(&mut self) {
        if let Err(e) = self.writer.flush() {
            debug!("{} flush failed: {}", self.kind.as_str(), e);
        }
        self.last_extradata.clear();
        self.last_pts = INVALID_PTS;
    }

    fn play_pts(&self) -> i64 {
        self.last_pts
    }
}

impl Drop for EsFileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Prints subtitles as JSON lines: `{"s_a":{"id":..,"s":..,"e":..,"t":..}}`.
pub struct JsonSubtitleSink<W: Write + Send> {
    writer: W,
}

impl JsonSubtitleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonSubtitleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> SubtitleSink for JsonSubtitleSink<W> {
    fn write(&mut self, out: &SubtitleOut<'_>) -> Result<()> {
        let text = String::from_utf8_lossy(out.data);
        let text = text.trim_end_matches('\0');
        let start = if out.pts == INVALID_PTS { -1 } else { out.pts / 90 };
        let end = if start < 0 { -1 } else { start + out.duration_ms };
        let line = json!({
            "s_a": {
                "id": out.track_id,
                "s": start,
                "e": end,
                "t": text,
            }
        });
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_es_file_sink_writes_extradata_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.es");
        let mut sink = EsFileSink::create(TrackKind::Video, &path).unwrap();

        let mut out = AvOut::audio(b"AAAA", 9000, Extradata::Raw(b"hdr"));
        out.kind = TrackKind::Video;
        sink.write(&out).unwrap();
        out.data = b"BB";
        out.pts = 12000;
        sink.write(&out).unwrap();
        out.extradata = Extradata::Raw(b"new");
        out.data = b"C";
        sink.write(&out).unwrap();
        assert_eq!(sink.play_pts(), 12000);
        assert_eq!(sink.bytes_written(), 13);
        drop(sink);

        assert_eq!(std::fs::read(&path).unwrap(), b"hdrAAAABBnewC");
    }

    #[test]
    fn test_es_file_sink_clear_resets_pts() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = EsFileSink::create(TrackKind::Audio, &dir.path().join("a.es")).unwrap();
        sink.write(&AvOut::audio(b"x", 100, Extradata::None)).unwrap();
        sink.clear();
        assert_eq!(sink.play_pts(), INVALID_PTS);
    }

    #[test]
    fn test_json_subtitle_line() {
        let mut sink = JsonSubtitleSink::new(Vec::new());
        sink.write(&SubtitleOut {
            track_id: 3,
            data: b"Hello\0",
            pts: 180_000,
            duration_ms: 1500,
        })
        .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(v["s_a"]["id"], 3);
        assert_eq!(v["s_a"]["s"], 2000);
        assert_eq!(v["s_a"]["e"], 3500);
        assert_eq!(v["s_a"]["t"], "Hello");
    }

    #[test]
    fn test_null_sink_reports_last_written_pts() {
        let mut sink = NullSink::new();
        assert_eq!(sink.play_pts(), INVALID_PTS);
        sink.write(&AvOut::audio(b"x", 9000, Extradata::None)).unwrap();
        sink.write(&AvOut::audio(b"y", INVALID_PTS, Extradata::None)).unwrap();
        assert_eq!(sink.play_pts(), 9000);
        sink.clear();
        assert_eq!(sink.play_pts(), INVALID_PTS);
    }

    #[test]
    fn test_output_play_pts_prefers_video() {
        let dir = tempfile::tempdir().unwrap();
        let audio = EsFileSink::create(TrackKind::Audio, &dir.path().join("a.es")).unwrap();
        let mut output = Output::new(Box::new(NullSink::new()), Box::new(audio), Box::new(NullSink::new()));
        assert_eq!(output.play_pts(), INVALID_PTS);
        output
            .audio
            .write(&AvOut::audio(b"x", 4500, Extradata::None))
            .unwrap();
        assert_eq!(output.play_pts(), 4500);
    }
}
