//! Minimal HTTP/1.1 client framing over a [`Transport`].
//!
//! Only what TR-064 needs: one request at a time on a keep-alive connection,
//! a response head parsed with nom, and a body exposed as a [`ByteSource`] so
//! the streaming extractor can read it without buffering it whole. Bodies may
//! be framed by `Content-Length`, `Transfer-Encoding: chunked` or the end of
//! the connection.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write;

use log::{debug, trace};
use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{hex_digit1, space1},
    multi::many0,
};

use crate::transport::Transport;
use crate::xml::{Byte, ByteSource};

/// Largest response head accepted, in bytes.
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// Size of a single `recv` call.
const RECV_CHUNK: usize = 1024;

/// Errors raised while exchanging a request and response.
#[derive(Debug)]
pub enum HttpError<E> {
    /// The transport failed.
    Transport(E),
    /// The connection closed before a complete response head arrived.
    ConnectionClosed,
    /// No data arrived for the whole idle budget.
    Timeout,
    /// The response head could not be parsed or was too large.
    Malformed,
}

impl<E: fmt::Display> fmt::Display for HttpError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Transport(e) => write!(f, "Transport error: {}", e),
            HttpError::ConnectionClosed => write!(f, "Connection closed"),
            HttpError::Timeout => write!(f, "Timed out waiting for response"),
            HttpError::Malformed => write!(f, "Malformed HTTP response"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug + fmt::Display> std::error::Error for HttpError<E> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub soap_action: Option<&'a str>,
    pub body: &'a str,
}

impl<'a> Request<'a> {
    /// A request without body, sent as GET.
    pub fn get(path: &'a str) -> Self {
        Self { method: Method::Get, path, soap_action: None, body: "" }
    }

    /// A SOAP call. Sent as POST when `body` is non-empty, as GET otherwise.
    pub fn soap(path: &'a str, soap_action: &'a str, body: &'a str) -> Self {
        let method = if body.is_empty() { Method::Get } else { Method::Post };
        Self { method, path, soap_action: Some(soap_action), body }
    }

    /// Serializes the request line, headers and body.
    pub fn encode(&self, host: &str, port: u16) -> Vec<u8> {
        let mut head = String::with_capacity(160 + self.body.len());
        let path = if self.path.is_empty() { "/" } else { self.path };
        let _ = write!(head, "{} {} HTTP/1.1\r\n", self.method.as_str(), path);
        if host.contains(':') {
            let _ = write!(head, "Host: [{host}]:{port}\r\n");
        } else {
            let _ = write!(head, "Host: {host}:{port}\r\n");
        }
        head.push_str("Connection: keep-alive\r\n");
        if let Some(soap_action) = self.soap_action {
            head.push_str("Content-Type: text/xml\r\n");
            let _ = write!(head, "SOAPACTION: {soap_action}\r\n");
        }
        if self.method == Method::Post {
            let _ = write!(head, "Content-Length: {}\r\n", self.body.len());
        }
        head.push_str("\r\n");
        head.push_str(self.body);
        head.into_bytes()
    }
}

/// How the end of a response body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Length(usize),
    Chunked,
    UntilClose,
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Parses a complete head, including the terminating empty line.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (status, reason)) = status_line(input)?;
        let (input, headers) = many0(header_line).parse(input)?;
        let (input, _) = tag(&b"\r\n"[..]).parse(input)?;

        let headers = headers
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(name).into_owned(),
                    String::from_utf8_lossy(value).into_owned(),
                )
            })
            .collect();
        let reason = String::from_utf8_lossy(reason).into_owned();
        Ok((input, Self { status, reason, headers }))
    }

    /// Returns the first header called `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns false if the server asked to close the connection.
    pub fn keep_alive(&self) -> bool {
        !self.header("Connection").is_some_and(|value| value.eq_ignore_ascii_case("close"))
    }

    pub fn framing(&self) -> Framing {
        if (100..200).contains(&self.status) || self.status == 204 || self.status == 304 {
            return Framing::Length(0);
        }
        if self
            .header("Transfer-Encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
        {
            return Framing::Chunked;
        }
        match self.header("Content-Length").map(|value| value.trim().parse::<usize>()) {
            Some(Ok(length)) => Framing::Length(length),
            _ => Framing::UntilClose,
        }
    }
}

fn status_line(input: &[u8]) -> IResult<&[u8], (u16, &[u8])> {
    let (input, _) = tag(&b"HTTP/"[..]).parse(input)?;
    let (input, _) = take_while1(|b: u8| b.is_ascii_digit() || b == b'.').parse(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, status) = nom::character::complete::u16.parse(input)?;
    let (input, reason) = take_till(|b| b == b'\r').parse(input)?;
    let (input, _) = tag(&b"\r\n"[..]).parse(input)?;
    Ok((input, (status, reason.trim_ascii())))
}

fn header_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (input, name) = take_while1(|b: u8| b != b':' && b != b'\r' && b != b'\n').parse(input)?;
    let (input, _) = tag(&b":"[..]).parse(input)?;
    let (input, value) = take_till(|b| b == b'\r').parse(input)?;
    let (input, _) = tag(&b"\r\n"[..]).parse(input)?;
    Ok((input, (name.trim_ascii(), value.trim_ascii())))
}

/// Parses the size at the start of a chunk header line, ignoring extensions.
fn chunk_size(line: &[u8]) -> Option<usize> {
    let parsed: IResult<&[u8], &[u8]> = hex_digit1.parse(line.trim_ascii_start());
    let (_, digits) = parsed.ok()?;
    usize::from_str_radix(core::str::from_utf8(digits).ok()?, 16).ok()
}

/// Sends `request` and reads the response head.
///
/// Connects first if the transport has no open connection. A kept-alive
/// connection the device dropped while idle is detected when it closes or
/// fails before any response byte arrives; the request is then sent once
/// more on a fresh connection. The returned body borrows the transport until
/// it is [finished](HttpBody::finish).
pub fn send<'t, T: Transport>(
    transport: &'t mut T,
    host: &str,
    port: u16,
    request: &Request<'_>,
    max_idle_reads: u32,
) -> Result<(ResponseHead, HttpBody<'t, T>), HttpError<T::Error>> {
    let reused = transport.is_connected();
    if !reused {
        transport.connect(host, port).map_err(HttpError::Transport)?;
    }
    debug!("{} {} ({} byte body)", request.method.as_str(), request.path, request.body.len());
    let encoded = request.encode(host, port);
    transport.send(&encoded).map_err(HttpError::Transport)?;

    let mut buffer = Vec::with_capacity(RECV_CHUNK);
    let head_len = match read_head(transport, &mut buffer, max_idle_reads) {
        Err(HttpError::ConnectionClosed | HttpError::Transport(_)) if reused && buffer.is_empty() => {
            debug!("kept-alive connection to {host}:{port} went stale, reconnecting");
            transport.close();
            transport.connect(host, port).map_err(HttpError::Transport)?;
            transport.send(&encoded).map_err(HttpError::Transport)?;
            read_head(transport, &mut buffer, max_idle_reads)?
        }
        other => other?,
    };

    let (_, head) = ResponseHead::parse(&buffer[..head_len]).map_err(|_| HttpError::Malformed)?;
    debug!("HTTP {} {}", head.status, head.reason);
    let framing = head.framing();
    trace!("response framing {:?}", framing);

    buffer.drain(..head_len);
    let body = HttpBody::new(transport, framing, head.keep_alive(), buffer);
    Ok((head, body))
}

/// Reads into `buffer` until the end of the response head and returns its length.
fn read_head<T: Transport>(
    transport: &mut T,
    buffer: &mut Vec<u8>,
    max_idle_reads: u32,
) -> Result<usize, HttpError<T::Error>> {
    let mut chunk = [0u8; RECV_CHUNK];
    let mut idle = 0;
    loop {
        if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            return Ok(end + 4);
        }
        if buffer.len() > MAX_HEAD_LEN {
            return Err(HttpError::Malformed);
        }
        match transport.recv(&mut chunk) {
            Ok(0) => return Err(HttpError::ConnectionClosed),
            Ok(read) => {
                idle = 0;
                buffer.extend_from_slice(&chunk[..read]);
            }
            Err(error) if transport.is_idle(&error) => {
                idle += 1;
                if idle > max_idle_reads {
                    return Err(HttpError::Timeout);
                }
            }
            Err(error) => return Err(HttpError::Transport(error)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data,
    DataEnd,
    Trailer,
}

enum Raw {
    Byte(u8),
    Idle,
    Closed,
}

/// Response body as a [`ByteSource`].
#[derive(Debug)]
pub struct HttpBody<'t, T: Transport> {
    transport: &'t mut T,
    framing: Framing,
    keep_alive: bool,
    pending: Vec<u8>,
    pos: usize,
    remaining: usize,
    chunk_state: ChunkState,
    line: Vec<u8>,
    done: bool,
}

impl<'t, T: Transport> HttpBody<'t, T> {
    fn new(transport: &'t mut T, framing: Framing, keep_alive: bool, pending: Vec<u8>) -> Self {
        let remaining = match framing {
            Framing::Length(length) => length,
            _ => 0,
        };
        Self {
            transport,
            framing,
            keep_alive,
            pending,
            pos: 0,
            remaining,
            chunk_state: ChunkState::Size,
            line: Vec::new(),
            done: framing == Framing::Length(0),
        }
    }

    /// Returns true once the whole body has been read.
    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Releases the transport, closing the connection unless it can be reused
    /// for the next request.
    pub fn finish(self) {
        if !self.done || !self.keep_alive || self.framing == Framing::UntilClose {
            trace!("closing connection after response");
            self.transport.close();
        }
    }

    fn raw(&mut self) -> Result<Raw, HttpError<T::Error>> {
        if let Some(&byte) = self.pending.get(self.pos) {
            self.pos += 1;
            return Ok(Raw::Byte(byte));
        }
        self.pending.clear();
        self.pending.resize(RECV_CHUNK, 0);
        self.pos = 0;
        let result = self.transport.recv(&mut self.pending);
        match result {
            Ok(0) => {
                self.pending.clear();
                Ok(Raw::Closed)
            }
            Ok(read) => {
                self.pending.truncate(read);
                self.pos = 1;
                Ok(Raw::Byte(self.pending[0]))
            }
            Err(error) => {
                self.pending.clear();
                if self.transport.is_idle(&error) {
                    Ok(Raw::Idle)
                } else {
                    Err(HttpError::Transport(error))
                }
            }
        }
    }

    /// Reads one line into `self.line`. Returns `Some(true)` once the line is
    /// complete, `Some(false)` on an idle read, `None` if the connection closed.
    fn read_line(&mut self) -> Result<Option<bool>, HttpError<T::Error>> {
        loop {
            match self.raw()? {
                Raw::Byte(b'\n') => return Ok(Some(true)),
                Raw::Byte(b'\r') => {}
                Raw::Byte(byte) => {
                    if self.line.len() < RECV_CHUNK {
                        self.line.push(byte);
                    }
                }
                Raw::Idle => return Ok(Some(false)),
                Raw::Closed => return Ok(None),
            }
        }
    }

    fn next_chunked(&mut self) -> Result<Byte, HttpError<T::Error>> {
        loop {
            match self.chunk_state {
                ChunkState::Data if self.remaining > 0 => {
                    return match self.raw()? {
                        Raw::Byte(byte) => {
                            self.remaining -= 1;
                            Ok(Byte::Data(byte))
                        }
                        Raw::Idle => Ok(Byte::Idle),
                        Raw::Closed => self.end_closed(),
                    };
                }
                ChunkState::Data => self.chunk_state = ChunkState::DataEnd,
                ChunkState::Size | ChunkState::DataEnd | ChunkState::Trailer => {
                    match self.read_line()? {
                        Some(true) => {}
                        Some(false) => return Ok(Byte::Idle),
                        None => return self.end_closed(),
                    }
                    let line = core::mem::take(&mut self.line);
                    match self.chunk_state {
                        ChunkState::DataEnd => self.chunk_state = ChunkState::Size,
                        ChunkState::Size => {
                            let size = chunk_size(&line).ok_or(HttpError::Malformed)?;
                            trace!("chunk of {size} bytes");
                            if size == 0 {
                                self.chunk_state = ChunkState::Trailer;
                            } else {
                                self.remaining = size;
                                self.chunk_state = ChunkState::Data;
                            }
                        }
                        _ => {
                            if line.is_empty() {
                                self.done = true;
                                return Ok(Byte::End);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Ends a body whose connection closed before its framing said it should.
    fn end_closed(&mut self) -> Result<Byte, HttpError<T::Error>> {
        debug!("connection closed before the end of the response body");
        self.keep_alive = false;
        Ok(Byte::End)
    }
}

impl<T: Transport> ByteSource for HttpBody<'_, T> {
    type Error = HttpError<T::Error>;

    fn next_byte(&mut self) -> Result<Byte, Self::Error> {
        if self.done {
            return Ok(Byte::End);
        }
        match self.framing {
            Framing::Length(_) => match self.raw()? {
                Raw::Byte(byte) => {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.done = true;
                    }
                    Ok(Byte::Data(byte))
                }
                Raw::Idle => Ok(Byte::Idle),
                Raw::Closed => self.end_closed(),
            },
            Framing::UntilClose => match self.raw()? {
                Raw::Byte(byte) => Ok(Byte::Data(byte)),
                Raw::Idle => Ok(Byte::Idle),
                Raw::Closed => {
                    self.done = true;
                    Ok(Byte::End)
                }
            },
            Framing::Chunked => self.next_chunked(),
        }
    }
}
