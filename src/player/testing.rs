//! Scripted demuxer source and recording sinks for the playback tests.

use crate::core::{AvOut, Extradata, PcmPrivateData, Result, SubtitleOut, Track, TrackKind, INVALID_PTS};
use crate::player::decoder::{PcmChunk, PcmDecoder};
use crate::player::demuxer::{InputInfo, StreamInfo};
use crate::player::demuxer_source::{DemuxerSource, MediaPacket};
use crate::player::encoding::TrackEncoding;
use crate::player::output::{AvSink, SubtitleSink};
use ffmpeg_next::{codec, media, Packet, Rational};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct Pkt {
    pub(crate) stream: usize,
    pub(crate) id: i32,
    pub(crate) data: Vec<u8>,
    pub(crate) pts: i64,
    pub(crate) dts: i64,
    pub(crate) duration: i64,
}

pub(crate) fn pkt(stream: usize, id: i32, data: &[u8], pts: i64) -> Pkt {
    Pkt {
        stream,
        id,
        data: data.to_vec(),
        pts,
        dts: pts,
        duration: 0,
    }
}

#[derive(Default)]
pub(crate) struct Calls {
    pub(crate) time_seeks: Vec<(usize, i64, i64, i64)>,
    pub(crate) byte_seeks: Vec<i64>,
    pub(crate) decoders_opened: usize,
}

pub(crate) struct ScriptedInput {
    pub(crate) info: InputInfo,
    pub(crate) packets: Vec<Pkt>,
    pub(crate) cursor: usize,
}

pub(crate) struct ScriptedSource {
    pub(crate) inputs: Vec<ScriptedInput>,
    pub(crate) calls: Arc<Mutex<Calls>>,
}

impl ScriptedSource {
    pub(crate) fn new(inputs: Vec<(InputInfo, Vec<Pkt>)>) -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let inputs = inputs
            .into_iter()
            .map(|(info, packets)| ScriptedInput { info, packets, cursor: 0 })
            .collect();
        (Self { inputs, calls: calls.clone() }, calls)
    }
}

impl DemuxerSource for ScriptedSource {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn read_packet(&mut self, av_idx: usize) -> Result<Option<MediaPacket>> {
        let input = &mut self.inputs[av_idx];
        let Some(p) = input.packets.get(input.cursor).cloned() else {
            return Ok(None);
        };
        input.cursor += 1;
        let mut packet = Packet::copy(&p.data);
        packet.set_pts(Some(p.pts));
        packet.set_dts(Some(p.dts));
        packet.set_duration(p.duration);
        packet.set_stream(p.stream);
        Ok(Some(MediaPacket {
            packet,
            av_idx,
            stream_index: p.stream,
            stream_id: p.id,
            time_base: Rational::new(1, 90000),
        }))
    }

    fn seek_window(&mut self, av_idx: usize, min: i64, target: i64, max: i64) -> Result<()> {
        self.calls.lock().time_seeks.push((av_idx, min, target, max));
        self.inputs[av_idx].cursor = 0;
        Ok(())
    }

    fn seek_bytes(&mut self, pos: i64) -> Result<()> {
        self.calls.lock().byte_seeks.push(pos);
        self.inputs[0].cursor = 0;
        Ok(())
    }

    fn byte_position(&self) -> i64 {
        self.inputs[0].cursor as i64 * 188
    }

    fn info(&self, av_idx: usize) -> Option<&InputInfo> {
        self.inputs.get(av_idx).map(|i| &i.info)
    }

    fn open_pcm_decoder(&mut self, _track: &Track) -> Result<Box<dyn PcmDecoder>> {
        self.calls.lock().decoders_opened += 1;
        Ok(Box::new(EchoDecoder { restart_pending: true }))
    }

    fn description(&self) -> String {
        "scripted".to_string()
    }
}

/// Added to the packet pts of every chunk, like a decoder with delay.
pub(crate) const ECHO_DELAY: i64 = 450;

/// Hands the packet payload back as one PCM chunk.
pub(crate) struct EchoDecoder {
    pub(crate) restart_pending: bool,
}

impl PcmDecoder for EchoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<PcmChunk>> {
        Ok(vec![PcmChunk {
            data: packet.data().unwrap_or(&[]).to_vec(),
            pts: packet.pts().unwrap_or(0) + ECHO_DELAY,
            params: PcmPrivateData {
                channels: 2,
                bits_per_coded_sample: 16,
                sample_rate: 48000,
                bit_rate: 0,
                codec_id: codec::Id::PCM_S16LE,
                restart_resampling: std::mem::take(&mut self.restart_pending),
            },
        }])
    }

    fn restart(&mut self) {
        self.restart_pending = true;
    }

    fn flush(&mut self) {}
}

#[derive(Debug, Clone)]
pub(crate) struct Written {
    pub(crate) data: Vec<u8>,
    pub(crate) pts: i64,
    pub(crate) extradata: Vec<u8>,
    pub(crate) pcm: Option<PcmPrivateData>,
    pub(crate) info_flags: u32,
}

#[derive(Clone, Default)]
pub(crate) struct Recorder {
    pub(crate) writes: Arc<Mutex<Vec<Written>>>,
    pub(crate) clears: Arc<Mutex<usize>>,
}

impl Recorder {
    pub(crate) fn writes(&self) -> Vec<Written> {
        self.writes.lock().clone()
    }
}

impl AvSink for Recorder {
    fn write(&mut self, out: &AvOut<'_>) -> Result<()> {
        let (extradata, pcm) = match out.extradata {
            Extradata::None => (Vec::new(), None),
            Extradata::Raw(b) => (b.to_vec(), None),
            Extradata::Pcm(p) => (Vec::new(), Some(p)),
        };
        self.writes.lock().push(Written {
            data: out.data.to_vec(),
            pts: out.pts,
            extradata,
            pcm,
            info_flags: out.info_flags,
        });
        Ok(())
    }

    fn clear(&mut self) {
        *self.clears.lock() += 1;
    }

    fn play_pts(&self) -> i64 {
        self.writes.lock().last().map_or(INVALID_PTS, |w| w.pts)
    }
}

#[derive(Clone, Default)]
pub(crate) struct SubRecorder {
    pub(crate) lines: Arc<Mutex<Vec<(i32, Vec<u8>, i64, i64)>>>,
}

impl SubtitleSink for SubRecorder {
    fn write(&mut self, out: &SubtitleOut<'_>) -> Result<()> {
        self.lines
            .lock()
            .push((out.track_id, out.data.to_vec(), out.pts, out.duration_ms));
        Ok(())
    }
}

pub(crate) fn pcm_stream(index: usize) -> StreamInfo {
    let mut s = StreamInfo::new(index, media::Type::Audio, codec::Id::PCM_S16LE);
    s.channels = 2;
    s.sample_rate = 44100;
    s.bits_per_coded_sample = 16;
    s
}

pub(crate) fn ts_input() -> InputInfo {
    let mut info = InputInfo::empty("mpegts");
    info.ts_discont = true;
    info.duration = 10_000_000;
    info.streams = vec![
        StreamInfo::new(0, media::Type::Video, codec::Id::H264),
        StreamInfo::new(1, media::Type::Audio, codec::Id::AAC),
        StreamInfo::new(2, media::Type::Subtitle, codec::Id::SUBRIP),
        pcm_stream(3),
    ];
    info
}

pub(crate) fn track(kind: TrackKind, encoding: TrackEncoding, id: i32, av_idx: usize, stream: usize) -> Track {
    let mut t = Track::new(kind, encoding);
    t.id = id;
    t.av_idx = av_idx;
    t.stream_index = stream;
    t.duration_ms = 10_000;
    t
}
