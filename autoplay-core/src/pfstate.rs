//! The `pfstate` snapshot: everything needed to resume a search
//! deterministically. Binary, little-endian, length-prefixed sections, no
//! version field yet (a u32 version slot after the magic is reserved for the
//! first incompatible revision; current readers reject unknown magics).

use serde::Serialize;

use crate::error::SnapshotError;
use crate::rng::RNG_STATE_LEN;

pub const STATE_MAGIC: [u8; 4] = *b"PFST";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub movenum: i32,
    pub savestate: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PersistentState {
    pub game: String,
    pub watermark: i32,
    pub movie: Vec<u8>,
    pub subtitles: Vec<String>,
    pub memories: Vec<Vec<u8>>,
    pub checkpoint: Checkpoint,
    pub motif_weights: Vec<(f64, Vec<u8>)>,
    pub nfutures: u32,
    pub rng_state: Vec<u8>,
}

/// Metadata view of a snapshot, for inspection tooling.
#[derive(Clone, Debug, Serialize)]
pub struct StateSummary {
    pub game: String,
    pub watermark: i32,
    pub movie_frames: usize,
    pub subtitle_count: usize,
    pub memory_count: usize,
    pub checkpoint_movenum: i32,
    pub savestate_bytes: usize,
    pub motif_count: usize,
    pub nfutures: u32,
}

impl PersistentState {
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            game: self.game.clone(),
            watermark: self.watermark,
            movie_frames: self.movie.len(),
            subtitle_count: self.subtitles.len(),
            memory_count: self.memories.len(),
            checkpoint_movenum: self.checkpoint.movenum,
            savestate_bytes: self.checkpoint.savestate.len(),
            motif_count: self.motif_weights.len(),
            nfutures: self.nfutures,
        }
    }
}

pub fn serialize_state(state: &PersistentState) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&STATE_MAGIC);

    write_blob(&mut out, state.game.as_bytes());
    out.extend_from_slice(&state.watermark.to_le_bytes());
    write_blob(&mut out, &state.movie);

    out.extend_from_slice(&(state.subtitles.len() as u32).to_le_bytes());
    for subtitle in &state.subtitles {
        write_blob(&mut out, subtitle.as_bytes());
    }

    out.extend_from_slice(&(state.memories.len() as u32).to_le_bytes());
    for memory in &state.memories {
        write_blob(&mut out, memory);
    }

    out.extend_from_slice(&state.checkpoint.movenum.to_le_bytes());
    write_blob(&mut out, &state.checkpoint.savestate);

    out.extend_from_slice(&(state.motif_weights.len() as u32).to_le_bytes());
    for (weight, inputs) in &state.motif_weights {
        out.extend_from_slice(&weight.to_le_bytes());
        write_blob(&mut out, inputs);
    }

    out.extend_from_slice(&state.nfutures.to_le_bytes());
    write_blob(&mut out, &state.rng_state);

    out
}

pub fn parse_state(bytes: &[u8]) -> Result<PersistentState, SnapshotError> {
    if bytes.len() < STATE_MAGIC.len() {
        return Err(SnapshotError::TooShort {
            actual: bytes.len(),
            min: STATE_MAGIC.len(),
        });
    }
    if bytes[..4] != STATE_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[..4]);
        return Err(SnapshotError::InvalidMagic { found });
    }

    let mut reader = Reader {
        bytes,
        pos: STATE_MAGIC.len(),
    };

    let game = String::from_utf8_lossy(reader.blob("game string")?).into_owned();
    let watermark = reader.i32("watermark")?;
    let movie = reader.blob("movie")?.to_vec();

    let subtitle_count = reader.u32("subtitle count")? as usize;
    let mut subtitles = Vec::with_capacity(subtitle_count.min(1 << 20));
    for _ in 0..subtitle_count {
        subtitles.push(String::from_utf8_lossy(reader.blob("subtitle")?).into_owned());
    }

    let memory_count = reader.u32("memory count")? as usize;
    let mut memories = Vec::with_capacity(memory_count.min(1 << 20));
    for _ in 0..memory_count {
        memories.push(reader.blob("memory")?.to_vec());
    }

    let movenum = reader.i32("checkpoint movenum")?;
    let savestate = reader.blob("checkpoint savestate")?.to_vec();

    let motif_count = reader.u32("motif count")? as usize;
    let mut motif_weights = Vec::with_capacity(motif_count.min(1 << 20));
    for _ in 0..motif_count {
        let weight = reader.f64("motif weight")?;
        let inputs = reader.blob("motif inputs")?.to_vec();
        motif_weights.push((weight, inputs));
    }

    let nfutures = reader.u32("nfutures")?;
    let rng_state = reader.blob("rng state")?.to_vec();
    if rng_state.len() != RNG_STATE_LEN {
        return Err(SnapshotError::BadRngState {
            len: rng_state.len(),
        });
    }

    if reader.pos != bytes.len() {
        return Err(SnapshotError::TrailingBytes {
            extra: bytes.len() - reader.pos,
        });
    }

    Ok(PersistentState {
        game,
        watermark,
        movie,
        subtitles,
        memories,
        checkpoint: Checkpoint { movenum, savestate },
        motif_weights,
        nfutures,
        rng_state,
    })
}

fn write_blob(out: &mut Vec<u8>, blob: &[u8]) {
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(blob);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, section: &'static str) -> Result<&'a [u8], SnapshotError> {
        if self.bytes.len() - self.pos < n {
            return Err(SnapshotError::Truncated { section });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, section: &'static str) -> Result<u32, SnapshotError> {
        let raw = self.take(4, section)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn i32(&mut self, section: &'static str) -> Result<i32, SnapshotError> {
        Ok(self.u32(section)? as i32)
    }

    fn f64(&mut self, section: &'static str) -> Result<f64, SnapshotError> {
        let raw = self.take(8, section)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(f64::from_le_bytes(buf))
    }

    fn blob(&mut self, section: &'static str) -> Result<&'a [u8], SnapshotError> {
        let len = self.u32(section)? as usize;
        self.take(len, section)
    }
}
