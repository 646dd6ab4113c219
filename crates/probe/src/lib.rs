use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use tilefall_client::net::wire::{EventRecord, HeroSummary, PollResponse, WirePosition};
use tilefall_client::encode_poll_frame;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub addr: String,
    pub timeout_ms: u64,
    pub hero_id: i64,
    pub map: String,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:46801".to_string(),
            timeout_ms: 5000,
            hero_id: -1,
            map: "outskirts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Poll,
    Tail { polls: u32, interval_ms: u64 },
}

pub fn run(
    kind: CommandKind,
    options: ProbeOptions,
    out: &mut impl Write,
) -> Result<(), String> {
    match kind {
        CommandKind::Poll => {
            let response = poll_once(&options)?;
            write_line(out, &render_summary(&response))?;
            for event in &response.events {
                write_line(out, &render_event_line(event))?;
            }
            Ok(())
        }
        CommandKind::Tail { polls, interval_ms } => {
            let mut seen: BTreeSet<i64> = BTreeSet::new();
            for index in 0..polls.max(1) {
                let response = poll_once(&options)?;
                if index == 0 {
                    write_line(out, &render_summary(&response))?;
                }
                for event in &response.events {
                    if seen.insert(event.id) {
                        write_line(out, &render_event_line(event))?;
                    }
                }
                if index + 1 < polls.max(1) {
                    thread::sleep(Duration::from_millis(interval_ms.max(1)));
                }
            }
            Ok(())
        }
    }
}

fn write_line(out: &mut impl Write, line: &str) -> Result<(), String> {
    writeln!(out, "{line}").map_err(|err| format!("write output failed: {err}"))
}

fn poll_once(options: &ProbeOptions) -> Result<PollResponse, String> {
    let addr: SocketAddr = options
        .addr
        .parse()
        .map_err(|_| format!("invalid address '{}'", options.addr))?;
    let timeout = Duration::from_millis(options.timeout_ms.max(1));
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|err| format!("connect to {addr} failed: {err}"))?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|err| format!("set read timeout failed: {err}"))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|err| format!("set write timeout failed: {err}"))?;

    let frame = encode_poll_frame(&observer_summary(options))
        .map_err(|err| format!("encode poll frame failed: {err}"))?;
    let mut writer = stream
        .try_clone()
        .map_err(|err| format!("clone stream failed: {err}"))?;
    writer
        .write_all(format!("{frame}\n").as_bytes())
        .map_err(|err| format!("send poll request failed: {err}"))?;
    writer
        .flush()
        .map_err(|err| format!("send poll request failed: {err}"))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|err| format!("read response failed: {err}"))?;
    if line.trim().is_empty() {
        return Err("authority closed the connection without a response".to_string());
    }
    serde_json::from_str(line.trim_end())
        .map_err(|err| format!("decode response failed: {err}"))
}

/// The probe identifies itself as a unit-less observer with a client-local
/// (negative) hero id, so the authority never mistakes it for a player.
fn observer_summary(options: &ProbeOptions) -> HeroSummary {
    HeroSummary {
        id: options.hero_id,
        name: "probe".to_string(),
        position: WirePosition::default(),
        speed: 0.0,
        map: options.map.clone(),
        units: Vec::new(),
    }
}

pub fn render_summary(response: &PollResponse) -> String {
    let latest_event = response
        .events
        .iter()
        .map(|event| event.id)
        .max()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "map={} heroes={} chat={} events={} latest_event_id={}",
        response.map,
        response.heroes.len(),
        response.chat.len(),
        response.events.len(),
        latest_event
    )
}

pub fn render_event_line(event: &EventRecord) -> String {
    format!(
        "event id={} hero={} type={} map={} at={}",
        event.id, event.hero_id, event.event_type, event.map, event.timestamp_ms
    )
}
