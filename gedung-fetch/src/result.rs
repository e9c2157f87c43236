use crate::error::FetchError;
use image::DynamicImage;
use std::time::Duration;

/// A successfully downloaded and decoded image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub url: String,
    pub image: DynamicImage,
    pub content_length: usize,
    pub response_time: Duration,
}

/// What a single GET produced. Never an `Err`: failures are values so the
/// caller can label the row and move on.
#[derive(Debug)]
pub enum FetchOutcome {
    Image(FetchedImage),
    /// The server answered with something other than 200.
    DownloadError { status: u16 },
    /// Transport failure, timeout, bad URL or undecodable body.
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn is_image(&self) -> bool {
        matches!(self, FetchOutcome::Image(_))
    }

    pub fn into_image(self) -> Option<FetchedImage> {
        match self {
            FetchOutcome::Image(fetched) => Some(fetched),
            _ => None,
        }
    }
}
