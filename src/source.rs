use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

static YOUTUBE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+$")
        .expect("static regex is valid")
});

/// A validated source URL. Two refs are equal when their URLs are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    /// Validates `raw` as a YouTube link. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = raw.trim();
        if YOUTUBE_URL.is_match(url) {
            Ok(Self(url.to_string()))
        } else {
            Err(BotError::InvalidSource(url.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourceRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_youtube_links() {
        for url in [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=abc",
            "youtu.be/abc",
            "  https://youtu.be/abc  ",
        ] {
            assert!(SourceRef::parse(url).is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn rejects_everything_else() {
        for url in [
            "",
            "https://vimeo.com/123",
            "https://youtu.be/",
            "ftp://youtube.com/watch?v=abc",
            "not a url",
            "https://evil.example/youtube.com/x",
        ] {
            assert!(
                matches!(SourceRef::parse(url), Err(BotError::InvalidSource(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn equality_is_on_the_trimmed_url() {
        let a = SourceRef::parse("https://youtu.be/X").unwrap();
        let b = SourceRef::parse(" https://youtu.be/X\n").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://youtu.be/X");
    }
}
