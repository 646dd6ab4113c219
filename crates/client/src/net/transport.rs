use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::wire::{DeleteEvent, HeroSummary, PollResponse, SubmitEvent};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to authority at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("authority connection lost: {source}")]
    ConnectionLost {
        #[source]
        source: io::Error,
    },
    #[error("failed to encode outbound frame: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode poll response: {source}")]
    ResponseDecode {
        #[source]
        source: serde_json::Error,
    },
    #[error("a poll round-trip is already outstanding")]
    PollOutstanding,
}

/// The client's side of the authority protocol. Implementations pump their
/// own I/O from the calling thread; nothing here blocks the frame loop.
pub trait AuthorityTransport {
    fn begin_poll(&mut self, request: &HeroSummary) -> Result<(), TransportError>;

    /// Pumps I/O and returns the completed poll response, or `None` while
    /// the round-trip is still outstanding.
    fn poll_response(&mut self) -> Result<Option<PollResponse>, TransportError>;

    fn submit_event(&mut self, event: &SubmitEvent) -> Result<(), TransportError>;

    fn delete_event(&mut self, delete: &DeleteEvent) -> Result<(), TransportError>;
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum OutboundFrame<'a> {
    Poll { hero: &'a HeroSummary },
    SubmitEvent { event: &'a SubmitEvent },
    DeleteEvent { delete: &'a DeleteEvent },
}

/// Wire form of a poll request line, shared with diagnostic tooling.
pub fn encode_poll_frame(hero: &HeroSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundFrame::Poll { hero })
}

/// Newline-delimited JSON over a nonblocking TCP connection. A lost
/// connection surfaces as an error on the next pump and drops the stream,
/// so a later call reconnects from scratch.
#[derive(Debug)]
pub struct TcpAuthorityClient {
    addr: String,
    stream: Option<TcpStream>,
    read_buf: Vec<u8>,
    outbound: VecDeque<Vec<u8>>,
    write_progress: usize,
    poll_outstanding: bool,
}

impl TcpAuthorityClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
            read_buf: Vec::new(),
            outbound: VecDeque::new(),
            write_progress: 0,
            poll_outstanding: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect_if_needed(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.addr).map_err(|source| TransportError::Connect {
            addr: self.addr.clone(),
            source,
        })?;
        stream
            .set_nonblocking(true)
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        if let Err(error) = stream.set_nodelay(true) {
            warn!(error = %error, "authority_nodelay_failed");
        }
        self.stream = Some(stream);
        Ok(())
    }

    fn enqueue(&mut self, frame: &OutboundFrame<'_>) -> Result<(), TransportError> {
        let mut payload =
            serde_json::to_vec(frame).map_err(|source| TransportError::Encode { source })?;
        payload.push(b'\n');
        self.outbound.push_back(payload);
        Ok(())
    }

    fn pump(&mut self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        match pump_stream(
            &mut stream,
            &mut self.outbound,
            &mut self.write_progress,
            &mut self.read_buf,
        ) {
            Ok(()) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(source) => {
                self.read_buf.clear();
                self.outbound.clear();
                self.write_progress = 0;
                self.poll_outstanding = false;
                Err(TransportError::ConnectionLost { source })
            }
        }
    }
}

impl AuthorityTransport for TcpAuthorityClient {
    fn begin_poll(&mut self, request: &HeroSummary) -> Result<(), TransportError> {
        if self.poll_outstanding {
            return Err(TransportError::PollOutstanding);
        }
        self.connect_if_needed()?;
        self.enqueue(&OutboundFrame::Poll { hero: request })?;
        self.poll_outstanding = true;
        self.pump()
    }

    fn poll_response(&mut self) -> Result<Option<PollResponse>, TransportError> {
        if !self.poll_outstanding {
            return Ok(None);
        }
        self.pump()?;
        let Some(line) = take_line(&mut self.read_buf) else {
            return Ok(None);
        };
        self.poll_outstanding = false;
        serde_json::from_slice(&line)
            .map(Some)
            .map_err(|source| TransportError::ResponseDecode { source })
    }

    fn submit_event(&mut self, event: &SubmitEvent) -> Result<(), TransportError> {
        self.connect_if_needed()?;
        self.enqueue(&OutboundFrame::SubmitEvent { event })?;
        self.pump()
    }

    fn delete_event(&mut self, delete: &DeleteEvent) -> Result<(), TransportError> {
        self.connect_if_needed()?;
        self.enqueue(&OutboundFrame::DeleteEvent { delete })?;
        self.pump()
    }
}

fn pump_stream(
    stream: &mut TcpStream,
    outbound: &mut VecDeque<Vec<u8>>,
    write_progress: &mut usize,
    read_buf: &mut Vec<u8>,
) -> io::Result<()> {
    flush_lines(outbound, write_progress, |payload| stream.write(payload))?;

    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "authority_closed_connection",
                ))
            }
            Ok(bytes_read) => read_buf.extend_from_slice(&chunk[..bytes_read]),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(error) => return Err(error),
        }
    }
}

/// Writes queued frames, resuming partially written ones, until the socket
/// would block or the queue drains.
fn flush_lines<F>(
    outbound: &mut VecDeque<Vec<u8>>,
    write_progress: &mut usize,
    mut write_payload: F,
) -> io::Result<()>
where
    F: FnMut(&[u8]) -> io::Result<usize>,
{
    while let Some(chunk) = outbound.front() {
        let remaining = &chunk[*write_progress..];
        match write_payload(remaining) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "authority_write_zero",
                ))
            }
            Ok(bytes_written) => {
                *write_progress = write_progress.saturating_add(bytes_written);
                if *write_progress >= chunk.len() {
                    outbound.pop_front();
                    *write_progress = 0;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

fn take_line(read_buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let newline_index = read_buf.iter().position(|byte| *byte == b'\n')?;
    let mut line: Vec<u8> = read_buf.drain(..=newline_index).collect();
    line.pop();
    if line.last().copied() == Some(b'\r') {
        line.pop();
    }
    Some(line)
}


#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::net::wire::WirePosition;

    fn request_summary() -> HeroSummary {
        HeroSummary {
            id: 1,
            name: "tester".to_string(),
            position: WirePosition { x: 0.0, y: 0.0 },
            speed: 2.5,
            map: "outskirts".to_string(),
            units: Vec::new(),
        }
    }

    fn sample_response() -> PollResponse {
        PollResponse {
            map: "outskirts".to_string(),
            position: WirePosition { x: 1.0, y: 2.0 },
            heroes: Vec::new(),
            chat: Vec::new(),
            events: Vec::new(),
        }
    }

    fn read_request_line(
        reader: &mut BufReader<std::net::TcpStream>,
        client: &mut TcpAuthorityClient,
    ) -> String {
        let mut line = String::new();
        for _ in 0..100 {
            match reader.read_line(&mut line) {
                Ok(_) if line.ends_with('\n') => return line,
                _ => {
                    let _ = client.poll_response();
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
        panic!("no request line arrived: {line:?}");
    }

    #[test]
    fn poll_round_trips_a_request_and_response_line() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = TcpAuthorityClient::new(addr.to_string());

        client.begin_poll(&request_summary()).expect("begin poll");
        let (mut server, _) = listener.accept().expect("accept");
        server
            .set_read_timeout(Some(Duration::from_millis(50)))
            .expect("read timeout");
        let mut reader = BufReader::new(server.try_clone().expect("clone"));

        let request_line = read_request_line(&mut reader, &mut client);
        assert!(request_line.contains("\"kind\":\"poll\""));
        assert!(request_line.contains("\"name\":\"tester\""));

        let response_json = serde_json::to_string(&sample_response()).expect("encode");
        server
            .write_all(format!("{response_json}\n").as_bytes())
            .expect("write response");
        server.flush().expect("flush");

        for _ in 0..100 {
            match client.poll_response().expect("poll response") {
                Some(response) => {
                    assert_eq!(response.map, "outskirts");
                    assert_eq!(response.position, WirePosition { x: 1.0, y: 2.0 });
                    return;
                }
                None => thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("poll response never arrived");
    }

    #[test]
    fn a_second_begin_poll_while_outstanding_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = TcpAuthorityClient::new(addr.to_string());

        client.begin_poll(&request_summary()).expect("begin poll");
        let error = client
            .begin_poll(&request_summary())
            .expect_err("second poll");
        assert!(matches!(error, TransportError::PollOutstanding));
    }

    #[test]
    fn connection_refused_surfaces_as_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut client = TcpAuthorityClient::new(addr.to_string());
        let error = client.begin_poll(&request_summary()).expect_err("refused");
        assert!(matches!(error, TransportError::Connect { .. }));
        assert!(!client.is_connected());
    }

    #[test]
    fn server_hangup_surfaces_as_connection_lost_and_drops_the_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = TcpAuthorityClient::new(addr.to_string());

        client.begin_poll(&request_summary()).expect("begin poll");
        let (server, _) = listener.accept().expect("accept");
        drop(server);

        for _ in 0..100 {
            match client.poll_response() {
                Err(TransportError::ConnectionLost { .. }) => {
                    assert!(!client.is_connected());
                    return;
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("connection loss never surfaced");
    }

    #[test]
    fn malformed_response_line_is_a_decode_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = TcpAuthorityClient::new(addr.to_string());

        client.begin_poll(&request_summary()).expect("begin poll");
        let (mut server, _) = listener.accept().expect("accept");
        server.write_all(b"{oops\n").expect("write");
        server.flush().expect("flush");

        for _ in 0..100 {
            match client.poll_response() {
                Err(TransportError::ResponseDecode { .. }) => {
                    // The failed round-trip is over; the next poll can start.
                    assert!(client.poll_response().expect("idle").is_none());
                    return;
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("decode error never surfaced");
    }

    #[test]
    fn submitted_events_arrive_as_tagged_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = TcpAuthorityClient::new(addr.to_string());

        let event = crate::net::wire::chat_event(1, "outskirts", 123, "hello");
        client.submit_event(&event).expect("submit");
        let (server, _) = listener.accept().expect("accept");
        server
            .set_read_timeout(Some(Duration::from_millis(50)))
            .expect("read timeout");
        let mut reader = BufReader::new(server);

        let mut line = String::new();
        for _ in 0..100 {
            match reader.read_line(&mut line) {
                Ok(_) if line.ends_with('\n') => break,
                _ => {
                    let _ = client.poll_response();
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
        assert!(line.contains("\"kind\":\"submit-event\""));
        assert!(line.contains("\"event_type\":\"chat\""));
    }
}
