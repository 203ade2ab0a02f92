//! Output formats for finished transcripts.

use std::fmt;
use std::str::FromStr;

use unicode_segmentation::UnicodeSegmentation;

use crate::{FormatError, Transcript};

/// Output kinds a transcript can be written as.
///
/// Only plain text is implemented. `json`, `srt` and `vtt` are recognized
/// names but rejected when parsed, so unsupported requests fail before any
/// work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Text,
}

impl OutputKind {
    pub const ALL: [OutputKind; 1] = [Self::Text];

    /// File extension appended to the source path.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
        }
    }

    pub fn format(self, transcript: &Transcript) -> Vec<u8> {
        match self {
            Self::Text => split_sentences(&transcript.text).join("\n\n").into_bytes(),
        }
    }
}

impl FromStr for OutputKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "json" | "srt" | "vtt" => Err(FormatError::Unsupported(s.to_string())),
            _ => Err(FormatError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Split `text` on Unicode sentence boundaries, trimming each sentence and
/// dropping empty ones.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
