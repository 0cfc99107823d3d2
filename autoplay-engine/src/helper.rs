//! Optional distributed evaluation. One request carries the current state,
//! one candidate next, and the full futures set; the response is the
//! immediate score plus one total per future. The master treats helpers as
//! pure accelerators: any connect failure, timeout, or malformed frame just
//! means the next is scored locally.

use std::cell::Cell;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use autoplay_core::emulator::EmulatorFactory;
use autoplay_core::objectives::WeightedObjectives;
use tracing::{debug, info, warn};

use crate::evaluate::evaluate_candidate;

pub const REQUEST_MAGIC: [u8; 4] = *b"APRQ";
pub const RESPONSE_MAGIC: [u8; 4] = *b"APRS";

#[derive(Clone, Debug, PartialEq)]
pub struct EvalRequest {
    pub state: Vec<u8>,
    pub next_inputs: Vec<u8>,
    pub futures: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvalResponse {
    pub immediate: f64,
    pub per_future: Vec<f64>,
}

pub fn encode_request(request: &EvalRequest) -> Vec<u8> {
    let mut body = Vec::new();
    write_blob(&mut body, &request.state);
    write_blob(&mut body, &request.next_inputs);
    body.extend_from_slice(&(request.futures.len() as u32).to_le_bytes());
    for future in &request.futures {
        write_blob(&mut body, future);
    }
    frame(REQUEST_MAGIC, &body)
}

pub fn decode_request(body: &[u8]) -> Result<EvalRequest> {
    let mut pos = 0usize;
    let state = read_blob(body, &mut pos).context("request state")?;
    let next_inputs = read_blob(body, &mut pos).context("request next inputs")?;
    let count = read_u32(body, &mut pos).context("request future count")? as usize;
    let mut futures = Vec::with_capacity(count.min(1 << 16));
    for idx in 0..count {
        futures.push(read_blob(body, &mut pos).with_context(|| format!("request future {idx}"))?);
    }
    if pos != body.len() {
        bail!("request has {} trailing bytes", body.len() - pos);
    }
    Ok(EvalRequest {
        state,
        next_inputs,
        futures,
    })
}

pub fn encode_response(response: &EvalResponse) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&response.immediate.to_le_bytes());
    body.extend_from_slice(&(response.per_future.len() as u32).to_le_bytes());
    for value in &response.per_future {
        body.extend_from_slice(&value.to_le_bytes());
    }
    frame(RESPONSE_MAGIC, &body)
}

pub fn decode_response(body: &[u8]) -> Result<EvalResponse> {
    let mut pos = 0usize;
    let immediate = read_f64(body, &mut pos).context("response immediate")?;
    let count = read_u32(body, &mut pos).context("response future count")? as usize;
    let mut per_future = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        per_future.push(read_f64(body, &mut pos).context("response future total")?);
    }
    if pos != body.len() {
        bail!("response has {} trailing bytes", body.len() - pos);
    }
    Ok(EvalResponse {
        immediate,
        per_future,
    })
}

/// A fixed set of helper addresses found by probing a port range once at
/// startup. Used from the main thread only.
pub struct HelperPool {
    addrs: Vec<SocketAddr>,
    connect_timeout: Duration,
    io_timeout: Duration,
    cursor: Cell<usize>,
}

impl HelperPool {
    pub fn probe(
        host: &str,
        ports: impl IntoIterator<Item = u16>,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Self {
        let mut addrs = Vec::new();
        for port in ports {
            let Ok(mut candidates) = (host, port).to_socket_addrs() else {
                continue;
            };
            let Some(addr) = candidates.next() else {
                continue;
            };
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(_) => {
                    info!(%addr, "helper found");
                    addrs.push(addr);
                }
                Err(err) => debug!(%addr, %err, "no helper"),
            }
        }
        if addrs.is_empty() {
            warn!(host, "no helpers found, running evaluation locally");
        }
        Self {
            addrs,
            connect_timeout,
            io_timeout,
            cursor: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// One request/response exchange against the next helper in round-robin
    /// order. `None` means the caller should evaluate locally.
    pub fn evaluate(&self, request: &EvalRequest) -> Option<EvalResponse> {
        if self.addrs.is_empty() {
            return None;
        }
        let addr = self.addrs[self.cursor.get() % self.addrs.len()];
        self.cursor.set(self.cursor.get().wrapping_add(1));

        match self.exchange(addr, request) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(%addr, %err, "helper failed, re-executing locally");
                None
            }
        }
    }

    fn exchange(&self, addr: SocketAddr, request: &EvalRequest) -> Result<EvalResponse> {
        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .with_context(|| format!("connecting to helper {addr}"))?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;

        stream
            .write_all(&encode_request(request))
            .context("sending request")?;
        stream.flush().context("flushing request")?;

        let body = read_frame(&mut stream, RESPONSE_MAGIC).context("reading response")?;
        decode_response(&body)
    }
}

/// Serve evaluation requests until the listener dies. One request per
/// connection; a connection that closes before sending a magic is treated
/// as a probe and ignored.
pub fn serve<F: EmulatorFactory>(
    listener: &TcpListener,
    factory: &F,
    objectives: &WeightedObjectives,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "helper serving");
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        if let Err(err) = handle_connection(&mut stream, factory, objectives) {
            debug!(%err, "connection dropped");
        }
    }
    Ok(())
}

pub fn handle_connection<F: EmulatorFactory>(
    stream: &mut TcpStream,
    factory: &F,
    objectives: &WeightedObjectives,
) -> Result<()> {
    let body = match read_frame(stream, REQUEST_MAGIC) {
        Ok(body) => body,
        // Startup probes connect and immediately hang up.
        Err(_) => return Ok(()),
    };
    let request = decode_request(&body)?;

    let futures: Vec<&[u8]> = request.futures.iter().map(|f| f.as_slice()).collect();
    let (immediate, per_future) = evaluate_candidate(
        factory,
        objectives,
        &request.state,
        &request.next_inputs,
        &futures,
    );

    stream
        .write_all(&encode_response(&EvalResponse {
            immediate,
            per_future,
        }))
        .context("sending response")?;
    stream.flush().context("flushing response")?;
    Ok(())
}

fn frame(magic: [u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&magic);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

// A round's request is state + one next + the futures set; far below this.
const MAX_FRAME_BYTES: usize = 64 << 20;

fn read_frame(stream: &mut TcpStream, magic: [u8; 4]) -> Result<Vec<u8>> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).context("reading frame header")?;
    if header[..4] != magic {
        bail!("unexpected frame magic {:02x?}", &header[..4]);
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_FRAME_BYTES {
        bail!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte cap");
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).context("reading frame body")?;
    Ok(body)
}

fn write_blob(out: &mut Vec<u8>, blob: &[u8]) {
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(blob);
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    if bytes.len() - *pos < 4 {
        bail!("truncated u32 at offset {pos}");
    }
    let value = u32::from_le_bytes([
        bytes[*pos],
        bytes[*pos + 1],
        bytes[*pos + 2],
        bytes[*pos + 3],
    ]);
    *pos += 4;
    Ok(value)
}

fn read_f64(bytes: &[u8], pos: &mut usize) -> Result<f64> {
    if bytes.len() - *pos < 8 {
        bail!("truncated f64 at offset {pos}");
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[*pos..*pos + 8]);
    *pos += 8;
    Ok(f64::from_le_bytes(buf))
}

fn read_blob(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let len = read_u32(bytes, pos)? as usize;
    if bytes.len() - *pos < len {
        bail!("truncated blob at offset {pos}");
    }
    let blob = bytes[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> EvalRequest {
        EvalRequest {
            state: vec![1u8; 16],
            next_inputs: vec![0x80; 10],
            futures: vec![vec![0x80; 30], vec![0x01, 0x02], Vec::new()],
        }
    }

    #[test]
    fn request_round_trips() {
        let request = sample_request();
        let framed = encode_request(&request);
        assert_eq!(framed[..4], REQUEST_MAGIC);
        let decoded = decode_request(&framed[8..]).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_round_trips() {
        let response = EvalResponse {
            immediate: 1.25,
            per_future: vec![0.0, -3.5, f64::MAX],
        };
        let framed = encode_response(&response);
        assert_eq!(framed[..4], RESPONSE_MAGIC);
        let decoded = decode_response(&framed[8..]).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn decode_rejects_truncation_and_trailing_bytes() {
        let framed = encode_request(&sample_request());
        let body = &framed[8..];
        assert!(decode_request(&body[..body.len() - 1]).is_err());

        let mut padded = body.to_vec();
        padded.push(0);
        assert!(decode_request(&padded).is_err());
    }

    #[test]
    fn pool_with_no_helpers_always_falls_back() {
        let pool = HelperPool {
            addrs: Vec::new(),
            connect_timeout: Duration::from_millis(10),
            io_timeout: Duration::from_millis(10),
            cursor: Cell::new(0),
        };
        assert!(pool.evaluate(&sample_request()).is_none());
    }
}
