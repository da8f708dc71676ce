//! DAP message framing.
//!
//! Outgoing messages are always framed as `Content-Length: N\r\n\r\n<body>`.
//! Incoming frames are split without trusting the announced length: a frame ends
//! where the next `Content-Length:` header starts, or once the buffered text holds a
//! balanced JSON object.

use crate::dap::tracer::FileTracer;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const HEADER: &[u8] = b"Content-Length:";
const READ_CHUNK: usize = 1024;

/// Build a wire frame for `text`. Newlines are sent as `\r\n`, the announced
/// length is the byte length of the normalized body.
pub fn encode_frame(text: &str) -> Vec<u8> {
    let body = text.replace('\n', "\r\n");
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    frame
}

/// Write one framed message to `sink`.
pub fn send_message(text: &str, sink: &mut impl Write) -> io::Result<()> {
    sink.write_all(&encode_frame(text))?;
    sink.flush()
}

/// Accumulates raw bytes and cuts them into message bodies.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
}

impl Framer {
    /// Read until one complete frame is buffered. Returns `None` once the peer
    /// closed the stream and no complete frame is left.
    pub fn read_frame(&mut self, source: &mut impl Read) -> io::Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(Some(frame));
            }
            let n = match source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                if !self.buffer.is_empty() {
                    debug!(target: "dap", "dropping {} bytes of incomplete frame", self.buffer.len());
                }
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_frame(&mut self) -> Option<String> {
        let next_header = self
            .buffer
            .get(1..)
            .and_then(|tail| find(tail, HEADER))
            .map(|idx| idx + 1);

        let raw = match next_header {
            Some(idx) => {
                let rest = self.buffer.split_off(idx);
                std::mem::replace(&mut self.buffer, rest)
            }
            None => {
                let end = self.balanced_end()?;
                let rest = self.buffer.split_off(end);
                std::mem::replace(&mut self.buffer, rest)
            }
        };

        let text = String::from_utf8_lossy(&raw);
        let body = match text.find("\r\n\r\n") {
            Some(idx) => &text[idx + 4..],
            None => text.rsplit('\n').next().unwrap_or_default(),
        };
        Some(body.trim().to_string())
    }

    /// Length of the shortest prefix holding at least one `{` and as many `}`.
    /// Braces inside JSON strings are not counted. Bytes after the prefix belong
    /// to the next frame.
    fn balanced_end(&self) -> Option<usize> {
        let (mut opening, mut closing) = (0usize, 0usize);
        let (mut in_string, mut escaped) = (false, false);
        for (idx, b) in self.buffer.iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' if opening > closing => in_string = true,
                b'{' => opening += 1,
                b'}' => closing += 1,
                _ => continue,
            }
            if opening > 0 && opening == closing {
                return Some(idx + 1);
            }
        }
        None
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Framed JSON channel to a single DAP client.
pub struct DapIo {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    framer: Framer,
    tracer: Option<FileTracer>,
    trace: bool,
}

impl DapIo {
    pub fn new(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        tracer: Option<FileTracer>,
        trace: bool,
    ) -> Self {
        Self {
            reader,
            writer,
            framer: Framer::default(),
            tracer,
            trace,
        }
    }

    pub fn from_tcp(
        stream: TcpStream,
        read_timeout: Option<Duration>,
        tracer: Option<FileTracer>,
        trace: bool,
    ) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(read_timeout)?;
        let reader = stream.try_clone()?;
        Ok(Self::new(Box::new(reader), Box::new(stream), tracer, trace))
    }

    /// Next non-empty message, `None` on end of stream.
    pub fn read_message(&mut self) -> anyhow::Result<Option<Value>> {
        loop {
            let Some(frame) = self.framer.read_frame(&mut self.reader)? else {
                return Ok(None);
            };
            if frame.is_empty() {
                continue;
            }
            self.trace_line("<-", &frame);
            return Ok(Some(serde_json::from_str(&frame)?));
        }
    }

    pub fn write_message<T: Serialize>(&mut self, v: &T) -> anyhow::Result<()> {
        let text = serde_json::to_string(v)?;
        self.trace_line("->", &text);
        send_message(&text, &mut self.writer)?;
        Ok(())
    }

    fn trace_line(&self, direction: &str, text: &str) {
        if !self.trace {
            return;
        }
        if let Some(tracer) = &self.tracer {
            tracer.line(&format!("{direction} {text}"));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    /// Hands out the wrapped bytes in fixed-size pieces.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_encode_frame() {
        struct TestCase {
            text: &'static str,
            expected: &'static str,
        }

        let cases = [
            TestCase {
                text: r#"{"a":1}"#,
                expected: "Content-Length: 7\r\n\r\n{\"a\":1}",
            },
            TestCase {
                text: "{\n\"a\":1\n}",
                expected: "Content-Length: 11\r\n\r\n{\r\n\"a\":1\r\n}",
            },
            TestCase {
                text: r#"{"s":"ψ"}"#,
                expected: "Content-Length: 10\r\n\r\n{\"s\":\"ψ\"}",
            },
        ];

        for tc in cases {
            assert_eq!(String::from_utf8(encode_frame(tc.text)).unwrap(), tc.expected);
        }
    }

    #[test]
    fn test_read_back_to_back_frames() {
        let mut data = encode_frame(r#"{"seq":1}"#);
        data.extend(encode_frame(r#"{"seq":2,"arguments":{"x":{}}}"#));
        let mut source = Cursor::new(data);
        let mut framer = Framer::default();

        assert_eq!(
            framer.read_frame(&mut source).unwrap().as_deref(),
            Some(r#"{"seq":1}"#)
        );
        assert_eq!(
            framer.read_frame(&mut source).unwrap().as_deref(),
            Some(r#"{"seq":2,"arguments":{"x":{}}}"#)
        );
        assert_eq!(framer.read_frame(&mut source).unwrap(), None);
    }

    #[test]
    fn test_read_split_frame() {
        let body = format!(r#"{{"command":"launch","pad":"{}"}}"#, "x".repeat(3000));
        let mut source = Trickle {
            data: encode_frame(&body),
            pos: 0,
            step: 700,
        };
        let mut framer = Framer::default();
        assert_eq!(framer.read_frame(&mut source).unwrap(), Some(body));
        assert_eq!(framer.read_frame(&mut source).unwrap(), None);
    }

    #[test]
    fn test_read_frame_followed_by_partial_header() {
        let first = r#"{"seq":1,"command":"setBreakpoints"}"#;
        let second = r#"{"seq":2,"command":"configurationDone"}"#;
        let mut data = encode_frame(first);
        data.extend(encode_frame(second));
        let head = encode_frame(first).len() + 5;
        let mut source = Trickle {
            data,
            pos: 0,
            step: head,
        };
        let mut framer = Framer::default();

        assert_eq!(framer.read_frame(&mut source).unwrap().as_deref(), Some(first));
        assert_eq!(framer.read_frame(&mut source).unwrap().as_deref(), Some(second));
        assert_eq!(framer.read_frame(&mut source).unwrap(), None);
    }

    #[test]
    fn test_read_braces_inside_strings() {
        let body = r#"{"value":"}{\"}","name":"|0>"}"#;
        let mut data = encode_frame(body);
        data.extend(b"Content-Le");
        let mut source = Cursor::new(data);
        let mut framer = Framer::default();
        assert_eq!(framer.read_frame(&mut source).unwrap().as_deref(), Some(body));
    }

    #[test]
    fn test_read_incomplete_frame() {
        let mut source = Cursor::new(b"Content-Length: 20\r\n\r\n{\"seq\":".to_vec());
        let mut framer = Framer::default();
        assert_eq!(framer.read_frame(&mut source).unwrap(), None);
    }

    #[test]
    fn test_io_roundtrip() {
        let mut data = encode_frame(r#"{"seq":1,"type":"request","command":"threads"}"#);
        data.extend(encode_frame(r#"{"seq":2,"type":"request","command":"terminate"}"#));
        let mut io = DapIo::new(
            Box::new(Cursor::new(data)),
            Box::new(Vec::new()),
            None,
            false,
        );

        let first = io.read_message().unwrap().unwrap();
        assert_eq!(first["command"], "threads");
        let second = io.read_message().unwrap().unwrap();
        assert_eq!(second["seq"], 2);
        assert!(io.read_message().unwrap().is_none());
    }
}
