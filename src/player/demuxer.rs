use crate::config::DecoderOptions;
use crate::core::{
    rescale, ContainerError, MediaSource, Result, StreamProtocol, Track, TrackKind,
};
use crate::player::codec_data::{
    aac_adts_template, aac_has_inband_adts, wma_extradata, wma_format_tag, ADTS_MARKER,
    LATM_MARKER,
};
use crate::player::custom_io::{local_path, CustomIo};
use crate::player::decoder::{FfmpegPcmDecoder, PcmDecoder, PcmOptions};
use crate::player::demuxer_source::{DemuxerSource, MediaPacket};
use crate::player::demuxer_thread::PlaybackState;
use crate::player::encoding::{codec_to_encoding, is_supported_text_subtitle, TrackEncoding};
use crate::player::rtmp::{self, RtmpProtocols};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, ffi, format, media, Rational};
use log::{debug, error, info, warn};
use serde_json::json;
use std::ffi::{c_void, CString};
use std::os::raw::c_int;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Once};

/// Initialise FFmpeg once per process and silence its log.
pub fn ffmpeg_init() -> Result<()> {
    static INIT: Once = Once::new();
    let mut result = Ok(());
    INIT.call_once(|| {
        result = ffmpeg::init().map_err(ContainerError::from);
        unsafe {
            ffi::avformat_network_init();
        }
        ffmpeg::log::set_level(ffmpeg::log::Level::Quiet);
    });
    result
}

/// Codec parameters of one stream, copied out of the format context.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    /// Stream id, the index when the container has none.
    pub id: i32,
    pub medium: media::Type,
    pub codec_id: codec::Id,
    pub extradata: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sample aspect ratio of the stream, then of the codec parameters.
    pub stream_sar: Rational,
    pub codec_sar: Rational,
    pub frame_rate: Rational,
    pub time_base: Rational,
    pub duration: Option<i64>,
    pub language: Option<String>,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_rate: i64,
    pub block_align: u32,
    pub bits_per_coded_sample: u32,
    pub metadata: Vec<(String, String)>,
}

impl StreamInfo {
    /// Neutral defaults, filled in by the snapshot or by tests.
    pub fn new(index: usize, medium: media::Type, codec_id: codec::Id) -> Self {
        Self {
            index,
            id: index as i32,
            medium,
            codec_id,
            extradata: Vec::new(),
            width: 0,
            height: 0,
            stream_sar: Rational::new(0, 1),
            codec_sar: Rational::new(0, 1),
            frame_rate: Rational::new(0, 1),
            time_base: Rational::new(1, 90000),
            duration: None,
            language: None,
            sample_rate: 0,
            channels: 0,
            bit_rate: 0,
            block_align: 0,
            bits_per_coded_sample: 0,
            metadata: Vec::new(),
        }
    }

    fn duration_ms(&self) -> Option<i64> {
        self.duration.map(|d| {
            rescale(
                d,
                self.time_base.numerator() as i64 * 1000,
                self.time_base.denominator() as i64,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub id: i32,
    pub stream_indexes: Vec<usize>,
}

/// Snapshot of an opened input.
#[derive(Debug, Clone)]
pub struct InputInfo {
    pub format_name: String,
    /// Transport stream style container (`AVFMT_TS_DISCONT`).
    pub ts_discont: bool,
    pub bit_rate: i64,
    /// Microseconds.
    pub start_time: Option<i64>,
    /// Microseconds.
    pub duration: i64,
    pub metadata: Vec<(String, String)>,
    pub streams: Vec<StreamInfo>,
    pub programs: Vec<ProgramInfo>,
}

impl InputInfo {
    pub fn empty(format_name: &str) -> Self {
        Self {
            format_name: format_name.to_string(),
            ts_discont: false,
            bit_rate: 0,
            start_time: None,
            duration: 0,
            metadata: Vec::new(),
            streams: Vec::new(),
            programs: Vec::new(),
        }
    }

    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }

    /// Tracks of this input, restricted to the selected program.
    pub fn tracks(&self, av_idx: usize, opts: &DecoderOptions, initial: bool) -> Vec<Track> {
        let selected = select_program(&self.programs, &self.streams, opts.selected_program_id);
        self.streams
            .iter()
            .filter(|s| selected.as_ref().map_or(true, |sel| sel.contains(&s.index)))
            .filter_map(|s| build_track(self, s, av_idx, opts, initial))
            .collect()
    }
}

/// Streams of the program to play, `None` for all streams.
///
/// A positive `selected_id` picks that program, otherwise the first one
/// with a real video stream.
pub fn select_program(
    programs: &[ProgramInfo],
    streams: &[StreamInfo],
    selected_id: i32,
) -> Option<Vec<usize>> {
    for p in programs.iter().filter(|p| !p.stream_indexes.is_empty()) {
        if selected_id > 0 {
            if p.id == selected_id {
                info!("📺 select program id {}", p.id);
                return Some(p.stream_indexes.clone());
            }
            continue;
        }
        let has_video = p.stream_indexes.iter().any(|&i| {
            streams
                .iter()
                .any(|s| s.index == i && s.medium == media::Type::Video && s.width > 0)
        });
        if has_video {
            info!("📺 program id {} has video", p.id);
            return Some(p.stream_indexes.clone());
        }
    }
    None
}

/// Build the track for one stream, `None` when it cannot be played.
pub fn build_track(
    input: &InputInfo,
    s: &StreamInfo,
    av_idx: usize,
    opts: &DecoderOptions,
    initial: bool,
) -> Option<Track> {
    let context_duration_ms = input.duration / 1000;

    match s.medium {
        media::Type::Video => {
            let Some((encoding, version)) = codec_to_encoding(s.codec_id, s.medium, &s.extradata, opts) else {
                warn!("video stream {} with unknown codec {:?}", s.index, s.codec_id);
                return None;
            };
            let mut track = base_track(TrackKind::Video, encoding, s, av_idx);
            track.version = version;
            track.width = s.width;
            track.height = s.height;
            // 0:1 means unset
            let sar = if s.stream_sar.numerator() == 0 || s.stream_sar.denominator() == 0 {
                s.codec_sar
            } else {
                s.stream_sar
            };
            track.aspect_ratio_num = sar.numerator();
            track.aspect_ratio_den = sar.denominator();
            track.extradata = s.extradata.clone();
            if s.frame_rate.denominator() != 0 {
                track.frame_rate = (1000 * s.frame_rate.numerator() as i64
                    / s.frame_rate.denominator() as i64) as u32;
            }
            track.time_scale = if track.frame_rate < 23970 { 1001 } else { 1000 };
            track.duration_ms = match s.duration_ms() {
                Some(d) if !input.format_name.starts_with("dash") => d,
                _ => context_duration_ms,
            };
            Some(track)
        }
        media::Type::Audio => {
            let Some((encoding, _)) = codec_to_encoding(s.codec_id, s.medium, &s.extradata, opts) else {
                warn!("audio stream {} with unknown codec {:?}", s.index, s.codec_id);
                return None;
            };
            let mut track = base_track(TrackKind::Audio, encoding, s, av_idx);
            track.name = s.language.clone().unwrap_or_else(|| "und".to_string());
            track.duration_ms = s.duration_ms().unwrap_or(context_duration_ms);
            track.extradata = s.extradata.clone();

            if encoding.is_injected_pcm() {
                track.inject_as_pcm = true;
            } else if encoding == TrackEncoding::AudioPcm {
                track.inject_raw_pcm = true;
            } else if s.codec_id == codec::Id::AAC_LATM {
                track.aac_header = Some(LATM_MARKER.to_vec());
            } else if s.codec_id == codec::Id::AAC {
                if aac_has_inband_adts(&input.format_name) {
                    track.aac_header = Some(ADTS_MARKER.to_vec());
                } else {
                    let header = aac_adts_template(s.sample_rate, s.channels, &s.extradata);
                    debug!("aac adts template {:02x?}", header);
                    track.aac_header = Some(header.to_vec());
                }
            } else if let Some(tag) = wma_format_tag(s.codec_id) {
                track.aac_header = Some(wma_extradata(
                    tag,
                    s.channels as u16,
                    s.sample_rate,
                    s.bit_rate as u32,
                    s.block_align as u16,
                    s.bits_per_coded_sample as u16,
                    &s.extradata,
                ));
            }
            Some(track)
        }
        media::Type::Subtitle => {
            if !is_supported_text_subtitle(s.codec_id) {
                debug!("subtitle stream {} codec {:?} not supported", s.index, s.codec_id);
                return None;
            }
            if !initial {
                return None;
            }
            let (encoding, _) = codec_to_encoding(s.codec_id, s.medium, &s.extradata, opts)?;
            let mut track = base_track(TrackKind::Subtitle, encoding, s, av_idx);
            track.name = s.language.clone().unwrap_or_else(|| "und".to_string());
            track.duration_ms = s.duration_ms().unwrap_or(context_duration_ms);
            track.extradata = s.extradata.clone();
            Some(track)
        }
        other => {
            debug!("stream {} of type {:?} not handled", s.index, other);
            None
        }
    }
}

fn base_track(kind: TrackKind, encoding: TrackEncoding, s: &StreamInfo, av_idx: usize) -> Track {
    let mut track = Track::new(kind, encoding);
    track.id = s.id;
    track.av_idx = av_idx;
    track.stream_index = s.index;
    track.time_base = s.time_base;
    track
}

unsafe extern "C" fn interrupt_cb(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let state = &*(opaque as *const PlaybackState);
    state.abort.load(Ordering::Relaxed) as c_int
}

/// One open input. The format context is dropped before the custom IO it
/// reads from.
pub struct FfmpegInput {
    input: format::context::Input,
    _io: Option<CustomIo>,
    _state: Arc<PlaybackState>,
    info: InputInfo,
}

impl FfmpegInput {
    pub fn info(&self) -> &InputInfo {
        &self.info
    }
}

fn dictionary(options: &[(String, String)]) -> ffmpeg::Dictionary<'static> {
    let mut dict = ffmpeg::Dictionary::new();
    for (k, v) in options {
        dict.set(k, v);
    }
    dict
}

/// avformat_open_input with our interrupt callback and optional custom IO.
fn try_open(
    url: &str,
    options: &[(String, String)],
    io: Option<&CustomIo>,
    state: &Arc<PlaybackState>,
) -> std::result::Result<*mut ffi::AVFormatContext, c_int> {
    let c_url = CString::new(url).map_err(|_| ffi::AVERROR_INVALIDDATA)?;
    unsafe {
        let mut ctx = ffi::avformat_alloc_context();
        if ctx.is_null() {
            return Err(-(libc::ENOMEM));
        }
        (*ctx).interrupt_callback.callback = Some(interrupt_cb);
        (*ctx).interrupt_callback.opaque = Arc::as_ptr(state) as *mut c_void;
        if let Some(io) = io {
            (*ctx).pb = io.as_ptr();
        }

        let mut opts = dictionary(options).disown();
        // frees ctx on failure
        let ret = ffi::avformat_open_input(&mut ctx, c_url.as_ptr(), ptr::null(), &mut opts);
        let leftover = ffmpeg::Dictionary::own(opts);
        for (k, _) in leftover.iter() {
            debug!("option {} not used", k);
        }
        if ret < 0 {
            return Err(ret);
        }
        Ok(ctx)
    }
}

/// Open `url` as input `av_idx`.
pub fn open_input(
    url: &str,
    av_idx: usize,
    opts: &DecoderOptions,
    state: &Arc<PlaybackState>,
) -> Result<FfmpegInput> {
    ffmpeg_init()?;
    let source = MediaSource::from_url(url);
    info!("🎬 open input {}: {}", av_idx, url);

    let ts_live = state.ts_live.load(Ordering::Relaxed);
    let mut options: Vec<(String, String)> = Vec::new();
    let mut open_url = url.to_string();
    let mut fallback_url = None;
    let mut io = None;

    match &source {
        MediaSource::LocalFile(_) => {
            let path = local_path(url).unwrap_or_else(|| std::path::Path::new(url));
            io = Some(CustomIo::open(path, opts.progressive_playback, state.abort_flag())?);
        }
        MediaSource::NetworkStream { protocol, .. } => {
            if let Some(plan) = rtmp::prepare(url, opts.rtmp_impl, &RtmpProtocols::probe()) {
                info!("🌐 rtmp via {}", if plan.native { "native" } else { "librtmp" });
                open_url = plan.url;
                options.extend(plan.options);
                fallback_url = plan.fallback_url;
            } else if matches!(protocol, StreamProtocol::Http | StreamProtocol::Hls) {
                options.push(("timeout".into(), "20000000".into()));
                options.push(("reconnect".into(), "1".into()));
                if ts_live {
                    options.push(("seekable".into(), "0".into()));
                    options.push(("reconnect_at_eof".into(), "1".into()));
                    options.push(("reconnect_streamed".into(), "1".into()));
                }
            }
            if opts.buffer_size > 0 {
                options.push(("buffer_size".into(), opts.buffer_size.to_string()));
            }
        }
    }
    options.extend(opts.av_options.iter().map(|(k, v)| (k.clone(), v.clone())));

    let ctx = match try_open(&open_url, &options, io.as_ref(), state) {
        Ok(ctx) => ctx,
        Err(code) => {
            let retried = match fallback_url {
                Some(ref url) => {
                    warn!("native rtmp failed ({}), retry with librtmp", code);
                    try_open(url, &options, None, state)
                }
                None => Err(code),
            };
            match retried {
                Ok(ctx) => ctx,
                Err(code) => {
                    let msg = ffmpeg::Error::from(code).to_string();
                    error!("❌ avformat_open_input failed {} ({})", code, open_url);
                    eprintln!("{}", json!({"FF_ERROR": {"msg": msg, "code": code}}));
                    return Err(ContainerError::OpenError(msg));
                }
            }
        }
    };

    unsafe {
        (*ctx).flags |= ffi::AVFMT_FLAG_GENPTS as c_int;
        if state.noprobe.load(Ordering::Relaxed) {
            (*ctx).max_analyze_duration = 1;
        }
        if ffi::avformat_find_stream_info(ctx, ptr::null_mut()) < 0 {
            error!("avformat_find_stream_info failed for {}", url);
        }
    }

    let input = unsafe { format::context::Input::wrap(ctx) };
    let info = snapshot(&input);
    info!(
        "✅ input {}: format={} streams={} duration={}us",
        av_idx,
        info.format_name,
        info.streams.len(),
        info.duration
    );

    Ok(FfmpegInput {
        input,
        _io: io,
        _state: state.clone(),
        info,
    })
}

fn rational(r: ffi::AVRational) -> Rational {
    Rational::new(r.num, r.den)
}

fn snapshot(input: &format::context::Input) -> InputInfo {
    let ptr = unsafe { input.as_ptr() };
    let mut info = InputInfo::empty(input.format().name());
    info.bit_rate = input.bit_rate();
    info.duration = input.duration();
    info.metadata = input
        .metadata()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    unsafe {
        info.ts_discont = ((*(*ptr).iformat).flags & ffi::AVFMT_TS_DISCONT as c_int) != 0;
        if (*ptr).start_time != ffi::AV_NOPTS_VALUE {
            info.start_time = Some((*ptr).start_time);
        }
        for n in 0..(*ptr).nb_programs as usize {
            let p = *(*ptr).programs.add(n);
            let indexes = (0..(*p).nb_stream_indexes as usize)
                .map(|m| *(*p).stream_index.add(m) as usize)
                .collect();
            info.programs.push(ProgramInfo {
                id: (*p).id,
                stream_indexes: indexes,
            });
        }
    }

    for stream in input.streams() {
        let params = stream.parameters();
        let mut s = StreamInfo::new(stream.index(), params.medium(), params.id());
        if stream.id() != 0 {
            s.id = stream.id();
        }
        s.time_base = stream.time_base();
        s.duration = match stream.duration() {
            d if d == ffi::AV_NOPTS_VALUE => None,
            d => Some(d),
        };
        let avg = stream.avg_frame_rate();
        s.frame_rate = if avg.numerator() != 0 && avg.denominator() != 0 {
            avg
        } else {
            stream.rate()
        };
        s.metadata = stream
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        s.language = stream.metadata().get("language").map(str::to_string);

        unsafe {
            let st = stream.as_ptr();
            let par = (*st).codecpar;
            s.stream_sar = rational((*st).sample_aspect_ratio);
            if !par.is_null() {
                if !(*par).extradata.is_null() && (*par).extradata_size > 0 {
                    s.extradata = std::slice::from_raw_parts(
                        (*par).extradata,
                        (*par).extradata_size as usize,
                    )
                    .to_vec();
                }
                s.width = (*par).width.max(0) as u32;
                s.height = (*par).height.max(0) as u32;
                s.codec_sar = rational((*par).sample_aspect_ratio);
                s.sample_rate = (*par).sample_rate.max(0) as u32;
                s.channels = (*par).ch_layout.nb_channels.max(0) as u32;
                s.bit_rate = (*par).bit_rate;
                s.block_align = (*par).block_align.max(0) as u32;
                s.bits_per_coded_sample = (*par).bits_per_coded_sample.max(0) as u32;
            }
        }
        info.streams.push(s);
    }
    info
}

/// 解封装器 - the open inputs of one playback.
pub struct FfmpegDemuxer {
    inputs: Vec<FfmpegInput>,
    pcm_options: PcmOptions,
    description: String,
}

// The inputs move into the playback thread as a whole and are only used
// there afterwards.
unsafe impl Send for FfmpegDemuxer {}

impl FfmpegDemuxer {
    pub fn new(inputs: Vec<FfmpegInput>, opts: &DecoderOptions, description: String) -> Self {
        Self {
            inputs,
            pcm_options: PcmOptions {
                lpcm: opts.insert_pcm_as_lpcm,
                stereo_downmix: opts.stereo_software_decoder,
            },
            description,
        }
    }

    fn input_mut(&mut self, av_idx: usize) -> Result<&mut FfmpegInput> {
        self.inputs
            .get_mut(av_idx)
            .ok_or_else(|| ContainerError::Stream(format!("no input {}", av_idx)))
    }
}

impl DemuxerSource for FfmpegDemuxer {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn read_packet(&mut self, av_idx: usize) -> Result<Option<MediaPacket>> {
        let input = self.input_mut(av_idx)?;
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut input.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let stream_index = packet.stream();
        let (stream_id, time_base) = match input.info.stream(stream_index) {
            Some(s) => (s.id, s.time_base),
            None => (stream_index as i32, Rational::new(1, 90000)),
        };
        Ok(Some(MediaPacket {
            packet,
            av_idx,
            stream_index,
            stream_id,
            time_base,
        }))
    }

    fn seek_window(&mut self, av_idx: usize, min: i64, target: i64, max: i64) -> Result<()> {
        let input = self.input_mut(av_idx)?;
        let ret = unsafe {
            ffi::avformat_seek_file(input.input.as_mut_ptr(), -1, min, target, max, 0)
        };
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret).into());
        }
        Ok(())
    }

    fn seek_bytes(&mut self, pos: i64) -> Result<()> {
        let current = self.byte_position();
        let input = self.input_mut(0)?;
        let mut flags = ffi::AVSEEK_FLAG_BYTE as c_int;
        if current > pos {
            flags |= ffi::AVSEEK_FLAG_BACKWARD as c_int;
        }
        debug!("byte seek {} -> {}", current, pos);
        let ret = unsafe {
            ffi::avformat_seek_file(input.input.as_mut_ptr(), -1, i64::MIN, pos, i64::MAX, flags)
        };
        if ret < 0 {
            error!("❌ byte seek to {} failed", pos);
            return Err(ffmpeg::Error::from(ret).into());
        }
        Ok(())
    }

    fn byte_position(&self) -> i64 {
        let Some(input) = self.inputs.first() else {
            return -1;
        };
        unsafe {
            let pb = (*input.input.as_ptr()).pb;
            if pb.is_null() {
                -1
            } else {
                ffi::avio_seek(pb, 0, libc::SEEK_CUR)
            }
        }
    }

    fn info(&self, av_idx: usize) -> Option<&InputInfo> {
        self.inputs.get(av_idx).map(|i| &i.info)
    }

    fn open_pcm_decoder(&mut self, track: &Track) -> Result<Box<dyn PcmDecoder>> {
        let options = self.pcm_options;
        let input = self.input_mut(track.av_idx)?;
        let start_time = input.info.start_time;
        let stream = input
            .input
            .stream(track.stream_index)
            .ok_or_else(|| ContainerError::Stream(format!("no stream {}", track.stream_index)))?;
        let decoder = FfmpegPcmDecoder::new(stream.parameters(), stream.time_base(), start_time, options)?;
        Ok(Box::new(decoder))
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.description)
    }
}
