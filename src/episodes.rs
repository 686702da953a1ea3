use std::cmp::Ordering;

/// Direction episode lists are presented in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpisodeOrder {
    #[default]
    Ascending,
    Descending,
}

impl EpisodeOrder {
    pub fn from_descending(descending: bool) -> Self {
        if descending {
            EpisodeOrder::Descending
        } else {
            EpisodeOrder::Ascending
        }
    }

    /// Orders `episodes` numerically, then reverses for descending.
    pub fn apply(self, episodes: Vec<String>) -> Vec<String> {
        let mut sorted = sort_episodes(episodes);
        if self == EpisodeOrder::Descending {
            sorted.reverse();
        }
        sorted
    }
}

/// Numeric value of an episode label; anything unparsable counts as 0.
pub fn parse_episode_key(label: &str) -> f64 {
    label
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

pub fn compare_episode_labels(left: &str, right: &str) -> Ordering {
    parse_episode_key(left).total_cmp(&parse_episode_key(right))
}

/// Stable ascending sort by numeric value, so "2" precedes "10".
pub fn sort_episodes(mut episodes: Vec<String>) -> Vec<String> {
    episodes.sort_by(|a, b| compare_episode_labels(a, b));
    episodes
}
