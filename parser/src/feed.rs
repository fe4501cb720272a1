//! Telemetry sources.
//!
//! Producers only ever push raw lines into a [`LineQueue`]. The consumer
//! drains it once per tick and owns all decoded state.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryIter, unbounded};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::FeedError;

/// Default Tacview real-time telemetry port.
pub const DEFAULT_PORT: u16 = 42674;
/// Entry name used by compressed `.zip.acmi` recordings.
pub const ARCHIVE_ENTRY: &str = "acmi.txt";

const STREAM_PROTOCOL: &str = "XtraLib.Stream.0";
const TELEMETRY_PROTOCOL: &str = "Tacview.RealTimeTelemetry.0";

/// Multi-producer FIFO of raw telemetry lines.
#[derive(Clone)]
pub struct LineQueue {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl Default for LineQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LineQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        LineQueue { tx, rx }
    }

    pub fn sender(&self) -> Sender<String> {
        self.tx.clone()
    }

    pub fn push(&self, line: impl Into<String>) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(line.into());
    }

    /// Everything queued right now. Lines pushed while iterating may or may
    /// not be included.
    pub fn drain(&self) -> TryIter<'_, String> {
        self.rx.try_iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Read a recording into lines. Accepts plain text or a zip archive holding
/// an `acmi.txt` entry (or exactly one entry of any name).
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>, FeedError> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let text = if bytes.starts_with(b"PK\x03\x04") {
        debug!("{} is a zip archive", path.display());
        read_archive(bytes)?
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Ok(split_lines(&text))
}

fn read_archive(bytes: Vec<u8>) -> Result<String, FeedError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let index = match archive.index_for_name(ARCHIVE_ENTRY) {
        Some(index) => index,
        None if archive.len() == 1 => 0,
        None if archive.is_empty() => return Err(FeedError::EmptyArchive),
        None => {
            let names = archive.file_names().collect::<Vec<_>>().join(", ");
            return Err(FeedError::UnsupportedFile(names));
        }
    };

    let mut entry = archive.by_index(index)?;
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Split a recording into logical lines. A trailing backslash continues the
/// value on the next physical line.
pub fn split_lines(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = Vec::new();
    let mut pending = String::new();
    for raw in text.lines() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(continued) = raw.strip_suffix('\\') {
            pending.push_str(continued);
            pending.push('\n');
            continue;
        }
        pending.push_str(raw);
        lines.push(std::mem::take(&mut pending));
    }
    if !pending.is_empty() {
        lines.push(pending);
    }
    lines
}

/// Push every line of a recording into `sender` from a background thread.
pub fn spawn_file_reader(
    path: impl AsRef<Path>,
    sender: Sender<String>,
) -> JoinHandle<Result<usize, FeedError>> {
    let path = path.as_ref().to_path_buf();
    thread::spawn(move || {
        let lines = read_lines(&path)?;
        let mut sent = 0;
        for line in lines {
            if sender.send(line).is_err() {
                break;
            }
            sent += 1;
        }
        info!("queued {sent} lines from {}", path.display());
        Ok(sent)
    })
}

/// Connection settings for a Tacview real-time telemetry server.
#[derive(Debug, Clone)]
pub struct RealTimeConfig {
    pub host: String,
    pub port: u16,
    pub client_name: String,
    pub password: String,
    /// Connection attempts made while the server refuses connections
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        RealTimeConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_name: "acmi_mirror".to_string(),
            password: String::new(),
            retries: 5,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// An established telemetry session.
pub struct RealTimeSession<S: Read + Write> {
    server_name: String,
    reader: BufReader<S>,
}

impl RealTimeSession<TcpStream> {
    /// Connect and handshake, retrying while the server refuses.
    pub fn connect(config: &RealTimeConfig) -> Result<Self, FeedError> {
        let address = (config.host.as_str(), config.port);
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match TcpStream::connect(address) {
                Ok(stream) => break stream,
                Err(err)
                    if err.kind() == std::io::ErrorKind::ConnectionRefused
                        && attempt < config.retries =>
                {
                    warn!(
                        "connection refused, retrying in {:?} ({attempt}/{})",
                        config.retry_delay, config.retries
                    );
                    thread::sleep(config.retry_delay);
                }
                Err(err) => return Err(err.into()),
            }
        };
        RealTimeSession::handshake(stream, &config.client_name, &config.password)
    }
}

impl<S: Read + Write> RealTimeSession<S> {
    /// Exchange the stream and telemetry protocol headers over `stream`.
    pub fn handshake(stream: S, client_name: &str, password: &str) -> Result<Self, FeedError> {
        let mut reader = BufReader::new(stream);
        let hello =
            format!("{STREAM_PROTOCOL}\n{TELEMETRY_PROTOCOL}\nClient {client_name}\n{password}\0");
        reader.get_mut().write_all(hello.as_bytes())?;
        reader.get_mut().flush()?;

        let mut raw = Vec::new();
        reader.read_until(b'\0', &mut raw)?;
        if raw.pop() != Some(b'\0') {
            return Err(FeedError::HandshakeClosed);
        }

        let reply = String::from_utf8_lossy(&raw);
        let expected = format!("{STREAM_PROTOCOL}\n{TELEMETRY_PROTOCOL}\n");
        let Some(rest) = reply.strip_prefix(&expected) else {
            return Err(FeedError::HandshakeRejected(reply.into_owned()));
        };
        let server_name = rest.lines().next().unwrap_or_default().to_string();
        info!("connected to telemetry server {server_name:?}");

        Ok(RealTimeSession {
            server_name,
            reader,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Forward lines into `sender` until the server closes the stream or the
    /// receiving side goes away. Returns the number of lines forwarded.
    pub fn pump(mut self, sender: &Sender<String>) -> Result<usize, FeedError> {
        let mut forwarded = 0;
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if self.reader.read_until(b'\n', &mut raw)? == 0 {
                info!("telemetry server closed the stream");
                return Ok(forwarded);
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if sender.send(line.to_string()).is_err() {
                debug!("line queue dropped, stopping reader");
                return Ok(forwarded);
            }
            forwarded += 1;
        }
    }
}

impl<S: Read + Write + Send + 'static> RealTimeSession<S> {
    pub fn spawn(self, sender: Sender<String>) -> JoinHandle<Result<usize, FeedError>> {
        thread::spawn(move || self.pump(&sender))
    }
}
