//! IP webcam client for servers offering HTTP MJPEG streams or JPEG snapshots.

use std::{
    fmt,
    io::{self, prelude::*, BufReader},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use anyhow::{bail, ensure, Context};
use url::{Position, Url};

use crate::config::StreamConfig;
use crate::image::{Image, JpegBackend};
use crate::timer::Timer;

use super::{FrameStream, StreamSource};

/// Largest JPEG frame accepted from a camera.
///
/// Bigger parts are rejected before anything is allocated for them.
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Longest header or chunk size line accepted from a camera.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Opens [`HttpStream`]s to IP cameras.
///
/// Only plain `http://` URLs are supported. The endpoint has to respond with either a
/// `multipart/x-mixed-replace` stream of JPEG images (MJPEG), or with a single `image/jpeg`
/// snapshot, in which case every frame is fetched with a new request.
#[derive(Debug, Clone, Default)]
pub struct HttpCamera {
    timeout: Option<Duration>,
    jpeg_backend: JpegBackend,
}

impl HttpCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            timeout: config.timeout,
            jpeg_backend: config.jpeg_backend,
        }
    }

    /// Sets the connect and read timeout of the camera connection.
    ///
    /// By default, connecting and reading blocks indefinitely.
    pub fn timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    pub fn jpeg_backend(self, jpeg_backend: JpegBackend) -> Self {
        Self {
            jpeg_backend,
            ..self
        }
    }
}

impl StreamSource for HttpCamera {
    type Stream = HttpStream;

    fn open(&mut self, url: &Url) -> anyhow::Result<HttpStream> {
        HttpStream::open(url, self.timeout, self.jpeg_backend)
    }
}

/// A video stream received from an HTTP camera.
///
/// When a frame cannot be read, the connection is dropped and the next call to
/// [`FrameStream::read`] connects again.
pub struct HttpStream {
    endpoint: Endpoint,
    conn: Option<Connection>,
    jpeg_backend: JpegBackend,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl HttpStream {
    fn open(
        url: &Url,
        timeout: Option<Duration>,
        jpeg_backend: JpegBackend,
    ) -> anyhow::Result<Self> {
        let endpoint = Endpoint::new(url, timeout)?;
        let conn = endpoint
            .connect()
            .with_context(|| format!("failed to connect to {url}"))?;
        log::debug!("connected to {endpoint} ({})", conn.mode);

        Ok(Self {
            endpoint,
            conn: Some(conn),
            jpeg_backend,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }
}

impl FrameStream for HttpStream {
    fn read(&mut self) -> anyhow::Result<Image> {
        let jpeg = self
            .t_dequeue
            .time(|| next_jpeg(&self.endpoint, &mut self.conn))?;
        let backend = self.jpeg_backend;
        self.t_decode.time(|| Image::decode_jpeg(&jpeg, backend))
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

fn next_jpeg(endpoint: &Endpoint, conn: &mut Option<Connection>) -> anyhow::Result<Vec<u8>> {
    let mut current = match conn.take() {
        Some(current) => current,
        None => {
            log::trace!("opening new connection to {endpoint}");
            endpoint.connect()?
        }
    };

    let jpeg = current.read_jpeg()?;
    if let Mode::Multipart { .. } = current.mode {
        *conn = Some(current);
    }
    Ok(jpeg)
}

struct Endpoint {
    addrs: Vec<SocketAddr>,
    /// Value of the `Host` header.
    host: String,
    /// Path and query string.
    path: String,
    timeout: Option<Duration>,
}

impl Endpoint {
    fn new(url: &Url, timeout: Option<Duration>) -> anyhow::Result<Self> {
        ensure!(
            url.scheme() == "http",
            "unsupported URL scheme `{}` (only `http` is supported)",
            url.scheme()
        );
        let Some(host) = url.host_str() else {
            bail!("URL '{url}' has no host");
        };
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let addrs = url
            .socket_addrs(|| None)
            .with_context(|| format!("failed to resolve '{host}'"))?;

        Ok(Self {
            addrs,
            host,
            path: url[Position::BeforePath..Position::AfterQuery].to_string(),
            timeout,
        })
    }

    fn connect(&self) -> anyhow::Result<Connection> {
        let stream = self.connect_tcp()?;
        stream.set_read_timeout(self.timeout)?;
        let mut stream = BufReader::new(stream);
        write!(
            stream.get_mut(),
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path,
            self.host,
        )?;

        let mut line = Vec::new();
        read_line_limited(&mut stream, &mut line)?;
        let line = String::from_utf8_lossy(&line);
        log::trace!("response: {}", line.trim());
        let status = line.split_whitespace().nth(1);
        if !line.starts_with("HTTP/1.") || status != Some("200") {
            bail!("received unexpected response: {}", line.trim());
        }

        let headers = read_headers(&mut stream)?;
        let Some(content_type) = headers.content_type else {
            bail!("missing `Content-Type` header");
        };
        // The ESP32 camera server sends its MJPEG stream with chunked transfer encoding.
        let stream: Box<dyn BufRead + Send> = if headers.chunked {
            log::trace!("response body is chunked");
            Box::new(BufReader::new(ChunkedReader::new(stream)))
        } else {
            Box::new(stream)
        };

        Ok(Connection {
            stream,
            mode: Mode::from_content_type(&content_type)?,
            // A chunked body has no meaningful `Content-Length`.
            content_length: headers.content_length.filter(|_| !headers.chunked),
            next: Next::Boundary,
        })
    }

    fn connect_tcp(&self) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in &self.addrs {
            let result = match self.timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match result {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host did not resolve to any address")
        }))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// `multipart/x-mixed-replace` stream; the boundary includes the leading `--`.
    Multipart { boundary: String },
    /// A single `image/jpeg` per request.
    Snapshot,
}

impl Mode {
    fn from_content_type(value: &str) -> anyhow::Result<Self> {
        let mut params = value.split(';');
        let mime = params.next().unwrap_or_default().trim();
        if mime.eq_ignore_ascii_case("image/jpeg") {
            return Ok(Self::Snapshot);
        }
        if !mime.eq_ignore_ascii_case("multipart/x-mixed-replace") {
            bail!("malformed Content-Type header: unexpected mime type {mime}");
        }

        let Some(boundary) = params.find_map(|param| param.trim().strip_prefix("boundary=")) else {
            bail!("malformed Content-Type header (missing boundary)");
        };
        let boundary = boundary.trim().trim_matches('"');
        log::trace!("multipart boundary: {boundary}");
        // Some servers (Droidcam) include the `--` in the boundary parameter.
        let boundary = if boundary.starts_with("--") {
            boundary.to_string()
        } else {
            format!("--{boundary}")
        };
        Ok(Self::Multipart { boundary })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multipart { .. } => f.write_str("MJPEG stream"),
            Self::Snapshot => f.write_str("JPEG snapshots"),
        }
    }
}

/// What comes next in a multipart stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Preamble or the end of the previous part, followed by a boundary line.
    Boundary,
    /// Part headers; the boundary was already consumed.
    Headers,
    /// The closing boundary was consumed.
    End,
}

struct Connection {
    /// Response body, with any transfer encoding already removed.
    stream: Box<dyn BufRead + Send>,
    mode: Mode,
    /// `Content-Length` of the response itself, used in snapshot mode.
    content_length: Option<usize>,
    next: Next,
}

impl Connection {
    fn read_jpeg(&mut self) -> anyhow::Result<Vec<u8>> {
        let boundary = match &self.mode {
            Mode::Snapshot => {
                return match self.content_length {
                    Some(length) => read_body(&mut self.stream, length),
                    None => {
                        let mut buf = Vec::new();
                        let limit = MAX_JPEG_BYTES as u64 + 1;
                        self.stream.by_ref().take(limit).read_to_end(&mut buf)?;
                        ensure!(
                            buf.len() <= MAX_JPEG_BYTES,
                            "snapshot exceeds the frame size limit of {MAX_JPEG_BYTES} bytes"
                        );
                        Ok(buf)
                    }
                };
            }
            Mode::Multipart { boundary } => boundary,
        };

        match self.next {
            Next::Boundary => {
                let (_, closing) = read_until_boundary(&mut self.stream, boundary)?;
                if closing {
                    self.next = Next::End;
                }
            }
            Next::Headers => {}
            Next::End => {}
        }
        if self.next == Next::End {
            bail!("server ended the stream");
        }

        let headers = read_headers(&mut self.stream)?;
        if let Some(ty) = &headers.content_type {
            let mime = ty.split(';').next().unwrap_or_default().trim();
            if !mime.eq_ignore_ascii_case("image/jpeg") {
                bail!("unexpected Content-Type: expected image/jpeg, got {ty}");
            }
        }

        match headers.content_length {
            Some(length) => {
                let buf = read_body(&mut self.stream, length)?;
                self.next = Next::Boundary;
                Ok(buf)
            }
            None => {
                // The part extends to the next boundary.
                let (mut buf, closing) = read_until_boundary(&mut self.stream, boundary)?;
                if buf.ends_with(b"\r\n") {
                    buf.truncate(buf.len() - 2);
                } else if buf.ends_with(b"\n") {
                    buf.truncate(buf.len() - 1);
                }
                self.next = if closing { Next::End } else { Next::Headers };
                Ok(buf)
            }
        }
    }
}

/// Reads a body of `length` bytes, refusing lengths above [`MAX_JPEG_BYTES`].
fn read_body<R: Read>(reader: &mut R, length: usize) -> anyhow::Result<Vec<u8>> {
    ensure!(
        length <= MAX_JPEG_BYTES,
        "Content-Length of {length} bytes exceeds the frame size limit of {MAX_JPEG_BYTES} bytes"
    );
    let mut buf = vec![0; length];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads one line of at most [`MAX_LINE_BYTES`] into `line`, returning the number of bytes read.
fn read_line_limited<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<usize> {
    let n = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', line)?;
    if n == MAX_LINE_BYTES && !line.ends_with(b"\n") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_BYTES} bytes"),
        ));
    }
    Ok(n)
}

#[derive(Debug, Default)]
struct Headers {
    content_type: Option<String>,
    content_length: Option<usize>,
    /// `Transfer-Encoding: chunked`
    chunked: bool,
}

/// Reads header lines up to and including the empty line that terminates them.
fn read_headers<R: BufRead>(reader: &mut R) -> anyhow::Result<Headers> {
    let mut headers = Headers::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        if read_line_limited(reader, &mut line)? == 0 {
            bail!("connection closed while reading headers");
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            return Ok(headers);
        }

        log::trace!("header: {text}");
        let Some((name, value)) = text.split_once(':') else {
            bail!("malformed header line: {text}");
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("Content-Type") {
            headers.content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Content-Length") {
            let length = value
                .parse()
                .with_context(|| format!("invalid Content-Length '{value}'"))?;
            headers.content_length = Some(length);
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
            headers.chunked = value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        }
    }
}

/// Reads lines until a multipart boundary line.
///
/// Returns the bytes preceding the boundary line, and whether it was the closing boundary. Fails
/// once more than [`MAX_JPEG_BYTES`] precede the boundary.
fn read_until_boundary<R: BufRead>(
    reader: &mut R,
    boundary: &str,
) -> anyhow::Result<(Vec<u8>, bool)> {
    let mut skipped = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let budget = (MAX_JPEG_BYTES - skipped.len()) as u64 + 1;
        if reader.by_ref().take(budget).read_until(b'\n', &mut line)? == 0 {
            bail!("stream ended before the next multipart boundary");
        }

        if let Ok(text) = std::str::from_utf8(&line) {
            let text = text.trim();
            if let Some(rest) = text.strip_prefix(boundary) {
                match rest {
                    "" => return Ok((skipped, false)),
                    "--" => return Ok((skipped, true)),
                    _ => {}
                }
            }
        }
        ensure!(
            skipped.len() + line.len() <= MAX_JPEG_BYTES,
            "no multipart boundary within the frame size limit of {MAX_JPEG_BYTES} bytes"
        );
        skipped.extend_from_slice(&line);
    }
}

/// Removes `Transfer-Encoding: chunked` framing from a response body.
///
/// Chunk extensions and trailers are skipped. The last (empty) chunk reads as end of file.
struct ChunkedReader<R> {
    inner: R,
    state: Chunk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    /// A chunk size line comes next.
    Size,
    /// Inside a chunk with this many bytes left.
    Data(u64),
    /// The line break that terminates chunk data comes next.
    DataEnd,
    /// The last chunk and the trailers were read.
    Done,
}

impl<R: BufRead> ChunkedReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            state: Chunk::Size,
        }
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        if read_line_limited(&mut self.inner, &mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    fn read_size(&mut self) -> io::Result<u64> {
        let line = self.read_line()?;
        let digits = line.split(';').next().unwrap_or_default().trim();
        u64::from_str_radix(digits, 16).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid chunk size line '{line}'"),
            )
        })
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.state {
                Chunk::Done => return Ok(0),
                Chunk::Size => {
                    let size = self.read_size()?;
                    if size == 0 {
                        while !self.read_line()?.is_empty() {}
                        self.state = Chunk::Done;
                    } else {
                        self.state = Chunk::Data(size);
                    }
                }
                Chunk::Data(left) => {
                    let max = left.min(buf.len() as u64) as usize;
                    let n = self.inner.read(&mut buf[..max])?;
                    if n == 0 {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    let left = left - n as u64;
                    self.state = if left == 0 {
                        Chunk::DataEnd
                    } else {
                        Chunk::Data(left)
                    };
                    return Ok(n);
                }
                Chunk::DataEnd => {
                    let line = self.read_line()?;
                    if !line.is_empty() {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "chunk data longer than its size",
                        ));
                    }
                    self.state = Chunk::Size;
                }
            }
        }
    }
}
