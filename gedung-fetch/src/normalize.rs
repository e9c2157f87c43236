// Rewrites storage-bucket URLs into the download API form

/// Download API every image is fetched through.
pub const DOWNLOAD_PREFIX: &str =
    "https://ddd-file-storage-x6ueszs4dq-et.a.run.app/api/v1/download?file=";

/// Public bucket prefix used by older exports.
pub const STORAGE_PREFIX: &str = "https://storage.googleapis.com/ddd-file-storage/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlNormalizer {
    download_prefix: String,
    storage_prefix: String,
}

impl UrlNormalizer {
    pub fn new(download_prefix: impl Into<String>, storage_prefix: impl Into<String>) -> Self {
        Self {
            download_prefix: download_prefix.into(),
            storage_prefix: storage_prefix.into(),
        }
    }

    pub fn download_prefix(&self) -> &str {
        &self.download_prefix
    }

    pub fn storage_prefix(&self) -> &str {
        &self.storage_prefix
    }

    /// Scheme-less part of the download prefix. Matching on this lets
    /// `http://` variants of an already-converted link pass through too.
    fn marker(&self) -> &str {
        self.download_prefix
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.download_prefix)
    }

    pub fn is_canonical(&self, raw: &str) -> bool {
        raw.contains(self.marker())
    }

    /// Returns `raw` untouched when it already points at the download API,
    /// otherwise strips the storage prefix and splices what is left onto the
    /// download prefix. Anything unrecognised is kept as an opaque path.
    pub fn normalize(&self, raw: &str) -> String {
        if self.is_canonical(raw) {
            return raw.to_string();
        }

        let path = raw.replace(&self.storage_prefix, "");
        format!("{}{}", self.download_prefix, path)
    }
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self::new(DOWNLOAD_PREFIX, STORAGE_PREFIX)
    }
}

/// Normalize with the built-in prefixes.
pub fn normalize(raw: &str) -> String {
    UrlNormalizer::default().normalize(raw)
}
