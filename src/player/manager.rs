use crate::core::{Track, TrackKind};
use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Summary row for the track list reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackEntry {
    pub id: i32,
    pub e: &'static str,
    pub n: String,
}

struct TrackList {
    tracks: Vec<Track>,
    current: Option<usize>,
    /// Selection remembered across `init_update`.
    wanted: Option<(i32, usize)>,
}

/// 轨道管理器 - one per track kind, shared between the container and the
/// playback thread.
#[derive(Clone)]
pub struct TrackManager {
    kind: TrackKind,
    inner: Arc<RwLock<TrackList>>,
}

impl TrackManager {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            inner: Arc::new(RwLock::new(TrackList {
                tracks: Vec::new(),
                current: None,
                wanted: None,
            })),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Add a track. A track with the same id and input is ignored.
    ///
    /// The first track becomes current, unless the track that was current
    /// before the last `init_update` shows up again.
    pub fn add(&self, track: Track) -> bool {
        let mut list = self.inner.write();
        if list
            .tracks
            .iter()
            .any(|t| t.id == track.id && t.av_idx == track.av_idx)
        {
            debug!("{} track {} already known", self.kind.as_str(), track.id);
            return false;
        }

        info!(
            "➕ {} track id={} {} ({})",
            self.kind.as_str(),
            track.id,
            track.encoding,
            track.name
        );
        let key = (track.id, track.av_idx);
        list.tracks.push(track);
        let idx = list.tracks.len() - 1;
        if list.current.is_none() || list.wanted == Some(key) {
            list.current = Some(idx);
        }
        true
    }

    /// Forget all tracks before the container re-populates them.
    pub fn init_update(&self) {
        let mut list = self.inner.write();
        list.wanted = list
            .current
            .and_then(|i| list.tracks.get(i))
            .map(|t| (t.id, t.av_idx));
        list.tracks.clear();
        list.current = None;
    }

    pub fn current(&self) -> Option<Track> {
        let list = self.inner.read();
        list.current.and_then(|i| list.tracks.get(i)).cloned()
    }

    pub fn has_current(&self) -> bool {
        self.inner.read().current.is_some()
    }

    /// Select the track with `id`. Returns false when there is none.
    pub fn set_current(&self, id: i32) -> bool {
        let mut list = self.inner.write();
        match list.tracks.iter().position(|t| t.id == id) {
            Some(idx) => {
                list.current = Some(idx);
                list.wanted = None;
                info!("🎯 {} track switched to {}", self.kind.as_str(), id);
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<TrackEntry> {
        self.inner
            .read()
            .tracks
            .iter()
            .map(|t| TrackEntry {
                id: t.id,
                e: t.encoding.as_str(),
                n: t.name.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut list = self.inner.write();
        list.tracks.clear();
        list.current = None;
        list.wanted = None;
    }
}

/// Video, audio and subtitle managers.
#[derive(Clone)]
pub struct Managers {
    pub video: TrackManager,
    pub audio: TrackManager,
    pub subtitle: TrackManager,
}

impl Managers {
    pub fn new() -> Self {
        Self {
            video: TrackManager::new(TrackKind::Video),
            audio: TrackManager::new(TrackKind::Audio),
            subtitle: TrackManager::new(TrackKind::Subtitle),
        }
    }
}

impl Default for Managers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::encoding::TrackEncoding;

    fn audio(id: i32, name: &str) -> Track {
        let mut t = Track::new(TrackKind::Audio, TrackEncoding::AudioAc3);
        t.id = id;
        t.name = name.to_string();
        t
    }

    #[test]
    fn test_first_track_is_current() {
        let m = TrackManager::new(TrackKind::Audio);
        assert!(m.current().is_none());
        assert!(m.add(audio(0x101, "deu")));
        assert!(m.add(audio(0x102, "eng")));
        assert!(!m.add(audio(0x101, "deu")));
        assert_eq!(m.len(), 2);
        assert_eq!(m.current().unwrap().id, 0x101);
    }

    #[test]
    fn test_set_current() {
        let m = TrackManager::new(TrackKind::Audio);
        m.add(audio(1, "deu"));
        m.add(audio(2, "eng"));
        assert!(m.set_current(2));
        assert_eq!(m.current().unwrap().name, "eng");
        assert!(!m.set_current(7));
        assert_eq!(m.current().unwrap().id, 2);
    }

    #[test]
    fn test_update_keeps_selection() {
        let m = TrackManager::new(TrackKind::Audio);
        m.add(audio(1, "deu"));
        m.add(audio(2, "eng"));
        m.set_current(2);

        m.init_update();
        assert!(m.is_empty());
        assert!(!m.has_current());
        m.add(audio(1, "deu"));
        m.add(audio(2, "eng"));
        assert_eq!(m.current().unwrap().id, 2);
    }

    #[test]
    fn test_list_entries() {
        let m = TrackManager::new(TrackKind::Audio);
        m.add(audio(1, "deu"));
        assert_eq!(
            m.list(),
            vec![TrackEntry {
                id: 1,
                e: "A_AC3",
                n: "deu".to_string()
            }]
        );
        m.clear();
        assert!(m.list().is_empty());
    }
}
