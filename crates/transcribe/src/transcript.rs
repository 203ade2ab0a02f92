use serde::{Deserialize, Serialize};

/// Result of one transcription request.
///
/// Plain `json` responses only carry `text`; every other field falls back to
/// its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transcript {
    pub task: String,
    pub language: String,
    /// Audio length in seconds.
    pub duration: f64,
    pub text: String,
    pub words: Vec<Word>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    pub id: i64,
    pub seek: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub tokens: Vec<i64>,
    pub temperature: f64,
    pub avg_logprob: f64,
    pub compression_ratio: f64,
    pub no_speech_prob: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_response() {
        let ts: Transcript = serde_json::from_str(r#"{"text":"Hello world."}"#).unwrap();
        assert_eq!(ts.text, "Hello world.");
        assert!(ts.words.is_empty());
        assert!(ts.segments.is_empty());
        assert_eq!(ts.duration, 0.0);
    }

    #[test]
    fn test_verbose_json_response() {
        let body = r#"{
            "task": "transcribe",
            "language": "english",
            "duration": 8.47,
            "text": "The beach was quiet.",
            "words": [
                {"word": "The", "start": 0.0, "end": 0.24},
                {"word": "beach", "start": 0.24, "end": 0.58}
            ],
            "segments": [{
                "id": 0,
                "seek": 0,
                "start": 0.0,
                "end": 3.32,
                "text": " The beach was quiet.",
                "tokens": [50364, 440, 7534],
                "temperature": 0.0,
                "avg_logprob": -0.286,
                "compression_ratio": 1.23,
                "no_speech_prob": 0.0094
            }]
        }"#;
        let ts: Transcript = serde_json::from_str(body).unwrap();
        assert_eq!(ts.task, "transcribe");
        assert_eq!(ts.words.len(), 2);
        assert_eq!(ts.words[1].word, "beach");
        assert_eq!(ts.segments[0].tokens, vec![50364, 440, 7534]);
        assert!((ts.segments[0].avg_logprob + 0.286).abs() < f64::EPSILON);
    }
}
