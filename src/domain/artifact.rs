//! Published image artifacts.

use std::path::PathBuf;

use super::fingerprint::Fingerprint;

/// Path segment under which artifacts are exposed.
pub const IMAGE_ROUTE_PREFIX: &str = "/image/";

/// A rendered answer image written to the publish directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub fingerprint: Fingerprint,
    pub file_path: PathBuf,
    pub public_url: String,
}

impl ImageArtifact {
    pub fn new(fingerprint: Fingerprint, file_path: PathBuf, base_url: &str) -> Self {
        let public_url = public_url(base_url, &fingerprint);
        Self {
            fingerprint,
            file_path,
            public_url,
        }
    }
}

/// `<base_url>/image/<fingerprint>.png`; `base_url` must not end with `/`.
pub fn public_url(base_url: &str, fingerprint: &Fingerprint) -> String {
    format!("{base_url}{IMAGE_ROUTE_PREFIX}{}", fingerprint.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_concatenates_base_and_file_name() {
        let fp = Fingerprint::of("hello");
        assert_eq!(
            public_url("http://localhost", &fp),
            "http://localhost/image/5d41402abc4b2a76b9719d911017c592.png"
        );
    }
}
