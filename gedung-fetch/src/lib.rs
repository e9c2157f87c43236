pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod result;

pub use error::FetchError;
pub use fetcher::{DEFAULT_TIMEOUT_SECS, ImageFetcher};
pub use normalize::{UrlNormalizer, normalize};
pub use result::{FetchOutcome, FetchedImage};
