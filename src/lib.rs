pub mod config;
pub mod episodes;
pub mod providers;
pub mod transport;
pub mod types;

pub use config::Settings;
pub use episodes::{EpisodeOrder, sort_episodes};
pub use providers::AnimeProvider;
pub use providers::allanime::{ALLANIME_REFERER, AllAnimeClient};
pub use providers::mal::{MalClient, MalConfig, MalError};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{EpisodeSource, ShowSearchResult, SourceKind, Translation};
