//! RTMP implementation selection.
//!
//! FFmpeg may be built with its native RTMP client, with librtmp, or (with a
//! common set-top-box patch) with both, where the native one is registered as
//! `ffrtmp`. librtmp takes its connection parameters appended to the URL
//! (`rtmp://host/app playpath=x live=1`), the native client wants them as
//! AVOptions.

use crate::config::RtmpImpl;
use ffmpeg_next::ffi;
use log::debug;
use std::ffi::CStr;
use std::ptr;

const RTMP_SCHEMES: [&str; 6] = [
    "rtmp://", "rtmpe://", "rtmps://", "rtmpt://", "rtmpte://", "rtmpts://",
];

/// How the native client is exposed by the linked FFmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeRtmp {
    #[default]
    Missing,
    /// Registered as `rtmp`.
    Plain,
    /// Registered as `ffrtmp` next to librtmp's `rtmp`.
    Patched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtmpProtocols {
    pub implementations: u8,
    pub native: NativeRtmp,
}

impl RtmpProtocols {
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut protocols = Self::default();
        for name in names {
            if name == "rtmp" {
                protocols.implementations += 1;
            } else if name == "ffrtmp" {
                protocols.implementations += 1;
                protocols.native = NativeRtmp::Patched;
            } else if name.starts_with("rtmpts") && protocols.native == NativeRtmp::Missing {
                // only the native client registers rtmpts
                protocols.native = NativeRtmp::Plain;
            }
        }
        protocols
    }

    /// Ask the linked FFmpeg which input protocols it has.
    pub fn probe() -> Self {
        let mut names = Vec::new();
        let mut opaque = ptr::null_mut();
        unsafe {
            loop {
                let name = ffi::avio_enum_protocols(&mut opaque, 0);
                if name.is_null() {
                    break;
                }
                names.push(CStr::from_ptr(name).to_string_lossy().into_owned());
            }
        }
        Self::from_names(names.iter().map(String::as_str))
    }
}

/// How to open an RTMP URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpOpen {
    pub url: String,
    pub options: Vec<(String, String)>,
    pub native: bool,
    /// URL to retry with librtmp when the native open fails.
    pub fallback_url: Option<String>,
}

pub fn is_rtmp_url(url: &str) -> bool {
    RTMP_SCHEMES.iter().any(|s| url.starts_with(s))
}

/// Decide how `url` is opened. `None` for anything that is not RTMP.
pub fn prepare(url: &str, configured: RtmpImpl, protocols: &RtmpProtocols) -> Option<RtmpOpen> {
    let mut forced_native = false;
    let url = match url.strip_prefix("ff") {
        Some(rest) if rest.starts_with("rtmp") => {
            forced_native = true;
            rest
        }
        _ => url,
    };
    if !is_rtmp_url(url) {
        return None;
    }

    let mut choice = match configured {
        RtmpImpl::Native => Some(true),
        RtmpImpl::Librtmp => Some(false),
        RtmpImpl::Auto if forced_native => Some(true),
        RtmpImpl::Auto => None,
    };

    let native = if protocols.native == NativeRtmp::Missing {
        false
    } else if protocols.implementations > 1 {
        // prefer native unless the URL uses librtmp-only parameters
        *choice.get_or_insert_with(|| !(url.contains(" token=") || url.contains(" jtv=")))
    } else {
        true
    };
    choice = Some(native);
    debug!("rtmp {:?} -> native={:?}", protocols, choice);

    if !native {
        return Some(RtmpOpen {
            url: url.to_string(),
            options: Vec::new(),
            native: false,
            fallback_url: None,
        });
    }

    let (base, params) = match url.split_once(' ') {
        Some((base, params)) => (base, params),
        None => (url, ""),
    };
    let options = translate_params(params);
    let open_url = if protocols.native == NativeRtmp::Patched {
        format!("ff{}", base)
    } else {
        base.to_string()
    };
    let fallback_url = if configured == RtmpImpl::Auto && protocols.implementations > 1 {
        Some(base.to_string())
    } else {
        None
    };

    Some(RtmpOpen {
        url: open_url,
        options,
        native: true,
        fallback_url,
    })
}

/// Translate librtmp `key=value` connection parameters to FFmpeg options.
pub fn translate_params(params: &str) -> Vec<(String, String)> {
    let mut options = Vec::new();
    let mut conn: Vec<&str> = Vec::new();
    let mut swf_url = "";
    let mut swf_vfy = "";

    for token in params.split(' ').filter(|t| !t.is_empty()) {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let mapped = match key.to_ascii_lowercase().as_str() {
            "app" => Some("rtmp_app"),
            "buffer" => Some("rtmp_buffer"),
            "flashver" => Some("rtmp_flashver"),
            "live" => Some("rtmp_live"),
            "pageurl" => Some("rtmp_pageurl"),
            "playpath" => Some("rtmp_playpath"),
            "subscribe" => Some("rtmp_subscribe"),
            "tcurl" => Some("rtmp_tcurl"),
            "conn" => {
                conn.push(value);
                continue;
            }
            "swfurl" => {
                swf_url = value;
                continue;
            }
            // ffmpeg wants the player url here, librtmp a boolean
            "swfvfy" => {
                swf_vfy = value;
                continue;
            }
            // only meaningful for incoming connections
            "timeout" => continue,
            _ => None,
        };
        let name = mapped.unwrap_or(key);
        options.push((name.to_string(), value.to_string()));
    }

    if !conn.is_empty() {
        options.push(("rtmp_conn".to_string(), conn.join(" ")));
    }
    if !swf_url.is_empty() {
        let verify = swf_vfy.starts_with('1')
            || swf_vfy
                .get(..4)
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let name = if verify { "rtmp_swfverify" } else { "rtmp_swfurl" };
        options.push((name.to_string(), swf_url.to_string()));
    }
    options
}
