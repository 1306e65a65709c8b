//! In-memory transport for unit tests
//!
//! Plays the WAF: probe requests have their correlation header written to a
//! log file, stage requests get canned responses and may log extra lines.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use wafreplay_common::{Destination, Header};

use crate::http::{HttpError, HttpResult, Request, Response, Transport};

pub struct MockTransport {
    log: File,
    header_name: String,
    flush_every: usize,
    log_probes: bool,
    reachable: bool,
    pending: Vec<String>,
    responses: VecDeque<HttpResult<Response>>,
    stage_log_lines: Vec<String>,
    connected: Option<Destination>,
    probes: usize,
    requests: usize,
    connects: usize,
}

impl MockTransport {
    pub fn new(log_path: &Path, header_name: &str) -> Self {
        let log = OpenOptions::new()
            .append(true)
            .open(log_path)
            .expect("open mock WAF log");
        Self {
            log,
            header_name: header_name.to_string(),
            flush_every: 1,
            log_probes: true,
            reachable: true,
            pending: Vec::new(),
            responses: VecDeque::new(),
            stage_log_lines: Vec::new(),
            connected: None,
            probes: 0,
            requests: 0,
            connects: 0,
        }
    }

    /// Only write buffered probe lines on every `n`-th probe
    pub fn flush_after(mut self, n: usize) -> Self {
        self.flush_every = n.max(1);
        self
    }

    pub fn never_log(mut self) -> Self {
        self.log_probes = false;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Queue the result of the next stage request
    pub fn respond(mut self, result: HttpResult<Response>) -> Self {
        self.responses.push_back(result);
        self
    }

    /// Lines the "WAF" logs for every stage request
    pub fn log_on_request(mut self, line: &str) -> Self {
        self.stage_log_lines.push(line.to_string());
        self
    }

    pub fn probes_sent(&self) -> usize {
        self.probes
    }

    pub fn requests_sent(&self) -> usize {
        self.requests
    }

    pub fn last_destination(&self) -> Option<&Destination> {
        self.connected.as_ref()
    }

    pub fn network_calls(&self) -> usize {
        self.probes + self.requests + self.connects
    }

    fn write_lines(&mut self, lines: &[String]) {
        for line in lines {
            writeln!(self.log, "{}", line).expect("write mock WAF log");
        }
        self.log.flush().expect("flush mock WAF log");
    }
}

pub fn response(status: u16, body: &str) -> Response {
    Response {
        version: "HTTP/1.1".to_string(),
        status,
        reason: String::new(),
        headers: Header::new(),
        body: body.as_bytes().to_vec(),
    }
}

pub fn refused() -> HttpError {
    HttpError::Connect {
        addr: "127.0.0.1:1".to_string(),
        source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, dest: &Destination) -> HttpResult<()> {
        if !self.reachable {
            return Err(refused());
        }
        self.connects += 1;
        self.connected = Some(dest.clone());
        Ok(())
    }

    async fn connect_or_reuse(&mut self, dest: &Destination) -> HttpResult<()> {
        if self.connected.as_ref() == Some(dest) {
            return Ok(());
        }
        self.connect(dest).await
    }

    async fn send(&mut self, request: &Request) -> HttpResult<Response> {
        if self.connected.is_none() {
            return Err(HttpError::NotConnected);
        }

        let marker = request
            .headers()
            .and_then(|h| h.get(&self.header_name))
            .map(str::to_string);

        match marker {
            Some(marker) => {
                self.probes += 1;
                if self.log_probes {
                    self.pending.push(format!("{}: {}", self.header_name, marker));
                    if self.probes % self.flush_every == 0 {
                        let pending = std::mem::take(&mut self.pending);
                        self.write_lines(&pending);
                    }
                }
                Ok(response(200, ""))
            }
            None => {
                self.requests += 1;
                let lines = self.stage_log_lines.clone();
                self.write_lines(&lines);
                self.responses
                    .pop_front()
                    .unwrap_or_else(|| Ok(response(200, "")))
            }
        }
    }
}
