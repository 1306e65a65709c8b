//! Response parsing

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use wafreplay_common::Header;

use super::{HttpError, HttpResult};

/// A parsed HTTP/1.x response
#[derive(Debug, Clone)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Header,
    pub body: Vec<u8>,
}

impl Response {
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response plus whether the connection can carry another request
pub(crate) struct ParsedResponse {
    pub response: Response,
    pub keep_alive: bool,
}

/// Read one response from `reader`
pub(crate) async fn read_response<R>(reader: &mut R, head_request: bool) -> HttpResult<ParsedResponse>
where
    R: AsyncBufRead + Unpin,
{
    let status_line = read_line(reader).await?.ok_or(HttpError::ConnectionClosed)?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default().to_string();
    if !version.starts_with("HTTP/") {
        return Err(HttpError::MalformedResponse(format!(
            "bad status line: {}",
            status_line
        )));
    }
    let status: u16 = parts
        .next()
        .and_then(|code| code.trim().parse().ok())
        .ok_or_else(|| HttpError::MalformedResponse(format!("bad status code: {}", status_line)))?;
    let reason = parts.next().unwrap_or_default().trim().to_string();

    let mut headers = Header::new();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| HttpError::MalformedResponse("truncated headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => headers.add(name.trim(), value.trim()),
            None => {
                return Err(HttpError::MalformedResponse(format!("bad header line: {}", line)))
            }
        }
    }

    let mut keep_alive = match headers.get("Connection") {
        Some(value) if value.eq_ignore_ascii_case("close") => false,
        Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
        _ => version != "HTTP/1.0",
    };

    let no_body = head_request || (100..200).contains(&status) || status == 204 || status == 304;
    let chunked = headers
        .get("Transfer-Encoding")
        .map(|te| te.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    let body = if no_body {
        Vec::new()
    } else if chunked {
        read_chunked(reader).await?
    } else if let Some(length) = headers.get("Content-Length") {
        let length: usize = length
            .parse()
            .map_err(|_| HttpError::MalformedResponse(format!("bad Content-Length: {}", length)))?;
        read_exact_body(reader, length).await?
    } else {
        // Body delimited by the server closing the connection
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await?;
        keep_alive = false;
        body
    };

    Ok(ParsedResponse {
        response: Response {
            version,
            status,
            reason,
            headers,
            body,
        },
        keep_alive,
    })
}

async fn read_chunked<R>(reader: &mut R) -> HttpResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader)
            .await?
            .ok_or_else(|| HttpError::MalformedResponse("truncated chunk".to_string()))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| HttpError::MalformedResponse(format!("bad chunk size: {}", size_line)))?;

        if size == 0 {
            // Trailers
            while let Some(line) = read_line(reader).await? {
                if line.is_empty() {
                    break;
                }
            }
            return Ok(body);
        }

        body.extend(read_exact_body(reader, size).await?);
        read_line(reader).await?;
    }
}

/// Read exactly `length` body bytes. The buffer grows with the data actually
/// received, so an advertised length never sizes an allocation up front.
async fn read_exact_body<R>(reader: &mut R, length: usize) -> HttpResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    let read = (&mut *reader)
        .take(length as u64)
        .read_to_end(&mut body)
        .await?;
    if read != length {
        return Err(HttpError::MalformedResponse(format!(
            "truncated body: got {} of {} bytes",
            read, length
        )));
    }
    Ok(body)
}

/// Read a line without its terminator; `None` at end of stream
async fn read_line<R>(reader: &mut R) -> HttpResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8], head: bool) -> HttpResult<ParsedResponse> {
        let mut reader = tokio::io::BufReader::new(raw);
        read_response(&mut reader, head).await
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let parsed = parse(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 6\r\n\r\nblockedEXTRA", false)
            .await
            .unwrap();
        assert_eq!(parsed.response.status, 403);
        assert_eq!(parsed.response.reason, "Forbidden");
        assert_eq!(parsed.response.body_as_string(), "blocke");
        assert!(parsed.keep_alive);
    }

    #[tokio::test]
    async fn test_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n";
        let parsed = parse(raw, false).await.unwrap();
        assert_eq!(parsed.response.body_as_string(), "Wikipedia");
    }

    #[tokio::test]
    async fn test_body_until_close() {
        let parsed = parse(b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\nhello", false)
            .await
            .unwrap();
        assert_eq!(parsed.response.body_as_string(), "hello");
        assert!(!parsed.keep_alive);
    }

    #[tokio::test]
    async fn test_head_response_has_no_body() {
        let parsed = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n", true)
            .await
            .unwrap();
        assert!(parsed.response.body.is_empty());
    }

    #[tokio::test]
    async fn test_connection_close_header() {
        let parsed = parse(
            b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
            false,
        )
        .await
        .unwrap();
        assert!(!parsed.keep_alive);
    }

    #[tokio::test]
    async fn test_empty_stream_is_closed_connection() {
        assert!(matches!(parse(b"", false).await, Err(HttpError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_malformed() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 99999999999999999\r\n\r\nhi";
        assert!(matches!(
            parse(raw, false).await,
            Err(HttpError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_chunk_is_malformed() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffff\r\nhi\r\n";
        assert!(matches!(
            parse(raw, false).await,
            Err(HttpError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_status_line() {
        assert!(matches!(
            parse(b"SSH-2.0-OpenSSH\r\n\r\n", false).await,
            Err(HttpError::MalformedResponse(_))
        ));
    }
}
