use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use pointer_history_protocol::{RawCommitMatch, SearchFrame, SearchRequest};
use reqwest::Client;

const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub type MatchCallback<'a> = dyn FnMut(Vec<RawCommitMatch>) + Send + 'a;

/// A per-repository history search backend.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Streams matches for one repository into `on_matches` as they arrive.
    /// Returns whether the backend stopped because it reached `request.limit`.
    async fn search(&self, request: &SearchRequest, on_matches: &mut MatchCallback<'_>) -> Result<bool>;
}

/// Talks to a backend that answers `POST /search` with newline-delimited
/// JSON frames.
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: String,
}

impl HttpSearchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, request: &SearchRequest, on_matches: &mut MatchCallback<'_>) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.endpoint))?
            .error_for_status()
            .context("search backend rejected request")?;

        let mut body = std::pin::pin!(response.bytes_stream());
        let mut decoder = FrameDecoder::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("failed to read search response")?;
            for frame in decoder.push(&chunk)? {
                if let Some(limit_hit) = apply_frame(frame, on_matches)? {
                    return Ok(limit_hit);
                }
            }
        }

        if let Some(frame) = decoder.finish()? {
            if let Some(limit_hit) = apply_frame(frame, on_matches)? {
                return Ok(limit_hit);
            }
        }
        bail!("search response for {} ended without a done frame", request.repo)
    }
}

// Some(limit_hit) once the stream is complete.
fn apply_frame(frame: SearchFrame, on_matches: &mut MatchCallback<'_>) -> Result<Option<bool>> {
    match frame {
        SearchFrame::Matches(matches) => {
            on_matches(matches);
            Ok(None)
        }
        SearchFrame::Done { limit_hit } => Ok(Some(limit_hit)),
        SearchFrame::Error(message) => bail!("search backend error: {message}"),
    }
}

/// Reassembles newline-delimited frames from arbitrarily split chunks.
#[derive(Debug)]
struct FrameDecoder {
    buf: Vec<u8>,
    // Bytes of `buf` already known to contain no newline.
    scanned: usize,
    max_frame: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame(MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<Vec<SearchFrame>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start + self.scanned..].iter().position(|b| *b == b'\n') {
            let end = start + self.scanned + pos;
            if let Some(frame) = parse_line(&self.buf[start..end])? {
                frames.push(frame);
            }
            start = end + 1;
            self.scanned = 0;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_frame {
            bail!("search response frame exceeds {} bytes", self.max_frame);
        }
        Ok(frames)
    }

    fn finish(&mut self) -> Result<Option<SearchFrame>> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<SearchFrame>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(line)
        .map(Some)
        .context("malformed search response frame")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_frames() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(br#"{"done":{"lim"#).expect("partial").is_empty());
        let frames = decoder
            .push(b"it_hit\":true}}\n\n{\"error\":\"x\"}\n")
            .expect("complete");
        assert_eq!(
            frames,
            vec![
                SearchFrame::Done { limit_hit: true },
                SearchFrame::Error("x".to_string())
            ]
        );
        assert!(decoder.finish().expect("finish").is_none());
    }

    #[test]
    fn decoder_flushes_unterminated_frame() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(br#"{"done":{"limit_hit":false}}"#).expect("push").is_empty());
        assert_eq!(
            decoder.finish().expect("finish"),
            Some(SearchFrame::Done { limit_hit: false })
        );
    }

    #[test]
    fn decoder_reassembles_frame_from_many_small_chunks() {
        let mut decoder = FrameDecoder::default();
        let frame = br#"{"done":{"limit_hit":true}}"#;
        for byte in frame.chunks(1) {
            assert!(decoder.push(byte).expect("partial").is_empty());
        }
        assert_eq!(
            decoder.push(b"\n{\"error\":\"late\"}").expect("newline"),
            vec![SearchFrame::Done { limit_hit: true }]
        );
        assert_eq!(
            decoder.finish().expect("finish"),
            Some(SearchFrame::Error("late".to_string()))
        );
    }

    #[test]
    fn decoder_rejects_oversized_frame() {
        let mut decoder = FrameDecoder::with_max_frame(16);
        assert!(decoder.push(b"{\"error\":\"").expect("under limit").is_empty());
        let err = decoder.push(b"0123456789").expect_err("over limit");
        assert!(err.to_string().contains("exceeds 16 bytes"));

        let mut decoder = FrameDecoder::with_max_frame(16);
        let frames = decoder
            .push(b"{\"error\":\"0123456789\"}\n")
            .expect("complete frames are not capped");
        assert_eq!(frames, vec![SearchFrame::Error("0123456789".to_string())]);
    }

    #[test]
    fn decoder_rejects_garbage() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"not json\n").is_err());
    }

    #[test]
    fn frames_drive_callback_and_completion() {
        let mut seen = 0;
        let mut on_matches = |batch: Vec<RawCommitMatch>| seen += batch.len();
        assert_eq!(
            apply_frame(SearchFrame::Matches(Vec::new()), &mut on_matches).expect("matches"),
            None
        );
        assert_eq!(
            apply_frame(SearchFrame::Done { limit_hit: true }, &mut on_matches).expect("done"),
            Some(true)
        );
        assert!(apply_frame(SearchFrame::Error("bad revision".into()), &mut on_matches).is_err());
        assert_eq!(seen, 0);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = HttpSearchClient::new("http://localhost:3180/", Duration::from_secs(5)).expect("client");
        assert_eq!(client.endpoint, "http://localhost:3180/search");
    }
}
