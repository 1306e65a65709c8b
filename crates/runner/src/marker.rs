//! Log marker synchronization
//!
//! The WAF flushes its log whenever it likes. To find out when a stage's
//! traffic has been logged, a cheap probe request carrying a fresh token in
//! the correlation header is sent until that token shows up in the log. One
//! probe before the stage request and one after bound the lines that belong
//! to the stage.

use tracing::debug;
use uuid::Uuid;
use wafreplay_common::{Destination, Header};

use crate::error::{RunError, RunResult};
use crate::http::{Request, RequestLine, Transport};
use crate::waflog::LogLines;

/// Probes sent before giving up on a marker. The web server should flush
/// much earlier, but its buffering is outside our control.
pub const MARKER_ATTEMPTS: usize = 20;

/// `httpbin`'s status endpoint keeps probe traffic and log noise small
const PROBE_URI: &str = "/status/200";

/// Build the probe request carrying `marker` in `header_name`
pub fn probe_request(header_name: &str, marker: &str) -> Request {
    let headers: Header = [
        ("Accept", "*/*"),
        ("User-Agent", "wafreplay test agent"),
        ("Host", "localhost"),
        (header_name, marker),
    ]
    .into_iter()
    .collect();

    Request::new(RequestLine::new("GET", PROBE_URI, "HTTP/1.1"), headers, None, true)
}

/// Sends marker probes and watches the WAF log for them
pub struct MarkerSync<'a> {
    header_name: &'a str,
    attempts: usize,
}

impl<'a> MarkerSync<'a> {
    pub fn new(header_name: &'a str) -> Self {
        Self {
            header_name,
            attempts: MARKER_ATTEMPTS,
        }
    }

    /// Place a fresh marker in the log and return the log line that holds it
    pub async fn mark_and_flush<T: Transport + ?Sized>(
        &self,
        client: &mut T,
        log_lines: &mut LogLines,
        dest: &Destination,
    ) -> RunResult<Vec<u8>> {
        let marker = Uuid::new_v4().to_string();
        let request = probe_request(self.header_name, &marker);

        for attempt in 1..=self.attempts {
            client
                .connect_or_reuse(dest)
                .await
                .map_err(|source| RunError::Connection {
                    dest: dest.clone(),
                    source,
                })?;

            client.send(&request).await.map_err(|source| RunError::Transport {
                dest: dest.clone(),
                source,
            })?;

            if let Some(line) = log_lines.check_log_for_marker(&marker) {
                debug!("Found marker {} after {} probe(s)", marker, attempt);
                return Ok(line);
            }
        }

        Err(RunError::MarkerNotFound {
            log_file: log_lines.file_name().to_path_buf(),
        })
    }
}
