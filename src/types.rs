use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Translation {
    #[default]
    Sub,
    Dub,
}

impl Translation {
    pub fn as_str(self) -> &'static str {
        match self {
            Translation::Sub => "sub",
            Translation::Dub => "dub",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Translation::Sub => "Sub",
            Translation::Dub => "Dub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowSearchResult {
    pub id: String,
    pub name: String,
    pub episode_count_label: String,
}

/// A decoded provider entry from the episode sources payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCandidate {
    pub provider_name: String,
    pub embed_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Hls,
    Mp4,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Hls => "HLS",
            SourceKind::Mp4 => "MP4",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EpisodeSource {
    pub label: String,
    pub url: String,
    pub kind: SourceKind,
    pub requires_referer: bool,
}

impl EpisodeSource {
    pub fn mp4(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            kind: SourceKind::Mp4,
            requires_referer: true,
        }
    }

    pub fn hls(url: impl Into<String>) -> Self {
        Self {
            label: String::from("HLS"),
            url: url.into(),
            kind: SourceKind::Hls,
            requires_referer: true,
        }
    }

    pub fn display_label(&self) -> String {
        format!("{} ({})", self.label, self.kind.label())
    }
}
