//! DAP message framing over an arbitrary read/write pair.
//!
//! The server is split in two halves: the read half polls framed requests,
//! the write half lives behind a mutex so that background emitters (the
//! housekeeping heartbeat) can send events while a request is in flight.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::protocol::{Event, Request, Response};
use crate::tracer::FileTracer;

pub struct Server<R: BufRead, W: Write> {
    input: R,
    tracer: Option<FileTracer>,
    pub output: Arc<Mutex<ServerOutput<W>>>,
}

impl<R: BufRead, W: Write> Server<R, W> {
    pub fn new(input: R, output: W, tracer: Option<FileTracer>) -> Server<R, W> {
        Server {
            input,
            tracer: tracer.clone(),
            output: Arc::new(Mutex::new(ServerOutput {
                seq: 0,
                writer: output,
                tracer,
            })),
        }
    }

    /// Read the next framed request. `Ok(None)` means a well-formed message
    /// that is not a request; the transport stays usable.
    pub fn poll_request(&mut self) -> Result<Option<Request>, Error> {
        let message = self.read_message()?;
        if let Some(tracer) = &self.tracer {
            if let Ok(line) = serde_json::to_string(&message) {
                tracer.inbound(&line);
            }
        }

        match Request::parse(message) {
            Ok(req) => Ok(Some(req)),
            Err(Error::UnsupportedMessage(t)) => {
                log::warn!(target: "dap", "ignore inbound message of type `{t}`");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn read_message(&mut self) -> Result<Value, Error> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read_n = self.input.read_line(&mut line)?;
            if read_n == 0 {
                return Err(Error::ConnectionClosed);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or(Error::MissingContentLength)?;
        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        Ok(msg)
    }
}

/// Write half: assigns outbound sequence numbers and flushes per message.
pub struct ServerOutput<W: Write> {
    seq: i64,
    writer: W,
    tracer: Option<FileTracer>,
}

impl<W: Write> ServerOutput<W> {
    pub fn respond(&mut self, mut response: Response) -> Result<(), Error> {
        response.seq = self.next_seq();
        log::debug!(target: "dap", "respond {} `{}`: success={}", response.request_seq, response.command, response.success);
        self.write_message(&response)
    }

    pub fn send_event(&mut self, event: Event) -> Result<(), Error> {
        let message = event.into_message(self.next_seq());
        log::debug!(target: "dap", "event `{}`", message.event);
        self.write_message(&message)
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        if let Some(tracer) = &self.tracer {
            if let Ok(line) = serde_json::to_string(message) {
                tracer.outbound(&line);
            }
        }
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Split a byte stream of framed messages back into JSON values.
#[cfg(test)]
pub(crate) fn parse_frames(mut bytes: &[u8]) -> Vec<Value> {
    let mut messages = vec![];
    while !bytes.is_empty() {
        let text = std::str::from_utf8(bytes).expect("frames must be utf-8");
        let header_end = text.find("\r\n\r\n").expect("incomplete frame header");
        let len: usize = text[..header_end]
            .strip_prefix("Content-Length:")
            .expect("missing Content-Length")
            .trim()
            .parse()
            .expect("bad Content-Length");
        let body_start = header_end + 4;
        let body = &bytes[body_start..body_start + len];
        messages.push(serde_json::from_slice(body).expect("frame body must be json"));
        bytes = &bytes[body_start + len..];
    }
    messages
}

#[cfg(test)]
pub(crate) fn frame(value: &Value) -> Vec<u8> {
    let payload = serde_json::to_vec(value).unwrap();
    let mut out = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
    out.extend(payload);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{Event, OutputCategory};
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_poll_request_roundtrip() {
        let inbound = frame(&json!({
            "seq": 1,
            "type": "request",
            "command": "threads",
        }));
        let mut server = Server::new(Cursor::new(inbound), Vec::<u8>::new(), None);

        let req = server.poll_request().unwrap().expect("request expected");
        assert_eq!(req.seq, 1);
        assert_eq!(req.command, "threads");

        // EOF after the single message.
        assert!(matches!(
            server.poll_request().unwrap_err(),
            Error::ConnectionClosed
        ));
    }

    #[test]
    fn test_non_request_is_skipped() {
        let inbound = frame(&json!({
            "seq": 1,
            "type": "response",
            "command": "threads",
        }));
        let mut server = Server::new(Cursor::new(inbound), Vec::<u8>::new(), None);
        assert!(server.poll_request().unwrap().is_none());
    }

    #[test]
    fn test_outbound_seq_increments() {
        let server = Server::new(Cursor::new(Vec::<u8>::new()), Vec::<u8>::new(), None);
        {
            let mut output = server.output.lock().unwrap();
            output
                .send_event(Event::output(OutputCategory::Stdout, "one\n"))
                .unwrap();
            output.send_event(Event::Terminated).unwrap();
        }

        let output = server.output.lock().unwrap();
        let messages = parse_frames(output.get_ref());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["seq"], 1);
        assert_eq!(messages[1]["seq"], 2);
        assert_eq!(messages[0]["event"], "output");
        assert_eq!(messages[1]["event"], "terminated");
    }
}
