//! Byte-pair match finder.
//!
//! Parses the input once, reporting a sequence of literal runs and
//! back-references whose total encoded bit cost is near-minimal for the
//! packet grammar in [`packet`](crate::packet). Candidates come from three
//! places: a hash of every two-byte window (the offset map), the four most
//! recently used distances (scored as the cheaper SHORTREP/LONGREP
//! packets), and a distance-1 probe inside runs of equal bytes. Every
//! candidate is scored by the bits it saves over spelling the same bytes
//! as literals, using the same cost tables the packet writer encodes with.

use crate::packet::{
    self, LastDistances, LITERAL_BITS, MATCH_TYPE_BITS, MAX_MATCH_LEN, SHORTREP_TYPE_BITS,
};
use crate::{LzaError, LzaResult};

/// A single back-reference chosen by the finder.
///
/// `rep` is `None` for a fresh distance (a MATCH packet) and `Some(slot)`
/// when the distance reuses ring entry `slot`, 0 being the most recent.
/// Length 1 only occurs with `rep == Some(0)` (a SHORTREP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub distance: u32,
    pub length: u32,
    pub rep: Option<u8>,
}

/// Consumer of finder events. Events arrive in input order and cover the
/// whole buffer exactly once.
pub trait EventSink {
    /// A run of raw bytes `buf[start..start + len]`.
    fn literal(&mut self, buf: &[u8], start: usize, len: usize);

    /// A back-reference producing `occurrence.length` bytes at `pos`.
    fn repeat(&mut self, buf: &[u8], pos: usize, occurrence: Occurrence);
}

/// Positions stored per chunk of the offset map.
const CHUNK_POSITIONS: usize = 15;

const INVALID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct LocationChunk {
    positions: [u32; CHUNK_POSITIONS],
    used: u8,
    next: u32,
}

/// Byte-pair hash table: 65536 chain heads into a monotonic arena of
/// fixed-size chunks, newest chunk first. Chains enumerate every stored
/// position of a pair; within a chunk positions are in insertion order.
#[derive(Debug)]
struct OffsetMap {
    pair_heads: Vec<u32>,
    chunks: Vec<LocationChunk>,
}

#[inline]
fn pair_index(buf: &[u8], pos: usize) -> usize {
    buf[pos] as usize | (buf[pos + 1] as usize) << 8
}

impl OffsetMap {
    fn new(input_len: usize) -> LzaResult<Self> {
        let est_chunk_count = ((input_len / CHUNK_POSITIONS) * 2).max(0x10000);

        let mut pair_heads = Vec::new();
        pair_heads
            .try_reserve_exact(1 << 16)
            .map_err(|_| LzaError::AllocationFailure)?;
        pair_heads.resize(1 << 16, INVALID);

        let mut chunks = Vec::new();
        chunks
            .try_reserve_exact(est_chunk_count)
            .map_err(|_| LzaError::AllocationFailure)?;

        Ok(Self { pair_heads, chunks })
    }

    /// Record `pos` as an occurrence of its byte pair.
    ///
    /// Positions whose pair equals the previous position's pair (three
    /// identical bytes in a row) are not stored; runs are found through
    /// the distance-1 probe instead, which keeps chains short on constant
    /// regions.
    fn insert(&mut self, buf: &[u8], pos: usize) {
        debug_assert!(pos + 1 < buf.len());

        let idx = pair_index(buf, pos);

        if pos > 0 && pair_index(buf, pos - 1) == idx {
            return;
        }

        let head = self.pair_heads[idx];

        if head != INVALID {
            let chunk = &mut self.chunks[head as usize];
            if (chunk.used as usize) < CHUNK_POSITIONS {
                chunk.positions[chunk.used as usize] = pos as u32;
                chunk.used += 1;
                return;
            }
        }

        let id = self.chunks.len() as u32;
        let mut positions = [INVALID; CHUNK_POSITIONS];
        positions[0] = pos as u32;
        self.chunks.push(LocationChunk {
            positions,
            used: 1,
            next: head,
        });
        self.pair_heads[idx] = id;
    }
}

/// Length of the common prefix of `buf[left..]` and `buf[right..]`, given
/// that the leading byte pairs already match.
fn common_length(buf: &[u8], left: usize, right: usize) -> usize {
    debug_assert!(left < right);
    debug_assert_eq!(buf[left], buf[right]);
    debug_assert_eq!(buf[left + 1], buf[right + 1]);

    let mut len = 2;
    while right + len < buf.len() && buf[left + len] == buf[right + len] {
        len += 1;
    }
    len
}

/// Bytes at `pos` reproducible by copying from `distance` back; zero when
/// the first byte already differs.
fn rep_length(buf: &[u8], pos: usize, distance: usize) -> usize {
    debug_assert!(distance >= 1 && distance <= pos);

    let mut len = 0;
    while pos + len < buf.len() && buf[pos + len] == buf[pos + len - distance] {
        len += 1;
    }
    len
}

/// A scored candidate. `length` is the full extent; packets longer than
/// [`MAX_MATCH_LEN`] are split when reported.
#[derive(Debug, Clone, Copy)]
struct Scored {
    distance: u32,
    length: usize,
    rep: Option<u8>,
    score: i32,
    chains_shortrep: bool,
}

/// Encoded-bit saving of a candidate versus emitting its bytes as
/// literals. Mirrors the packet writer's cost exactly.
fn score_occurrence(length: usize, distance: u32, rep: Option<u8>) -> i32 {
    let len = length.min(MAX_MATCH_LEN) as u32;
    let packet_bits = match rep {
        None => MATCH_TYPE_BITS + packet::length_bits(len) + packet::distance_bits(distance),
        Some(0) if len == 1 => SHORTREP_TYPE_BITS,
        Some(slot) => packet::longrep_type_bits(slot) + packet::length_bits(len),
    };

    (LITERAL_BITS * len) as i32 - packet_bits as i32
}

fn rep_rank(rep: Option<u8>) -> u8 {
    rep.map_or(u8::MAX, |slot| slot)
}

/// Score a candidate and fold it into the running best.
///
/// Ties go, in order, to the candidate whose following byte matches its
/// source sibling (a subsequent SHORTREP stays viable), to the shorter
/// distance, and to the more recent ring slot.
fn consider(
    best: &mut Option<Scored>,
    buf: &[u8],
    pos: usize,
    distance: u32,
    length: usize,
    rep: Option<u8>,
) {
    if rep.is_none() {
        // Short fresh matches at long range cost more than the literals
        // they replace once the next match's distance field is paid for.
        if length == 3 && distance > (1 << 11) {
            return;
        }
        if length == 4 && distance > (1 << 13) {
            return;
        }
    }

    let score = score_occurrence(length, distance, rep);
    if score <= 0 {
        return;
    }

    let after = pos + length.min(MAX_MATCH_LEN);
    let chains_shortrep =
        after < buf.len() && after >= distance as usize && buf[after] == buf[after - distance as usize];

    let replace = match best {
        None => true,
        Some(b) => {
            score > b.score
                || (score == b.score
                    && ((chains_shortrep && !b.chains_shortrep)
                        || (chains_shortrep == b.chains_shortrep
                            && (distance < b.distance
                                || (distance == b.distance && rep_rank(rep) < rep_rank(b.rep))))))
        }
    };

    if replace {
        *best = Some(Scored {
            distance,
            length,
            rep,
            score,
            chains_shortrep,
        });
    }
}

/// Fold in the repeat candidates at `pos` for each live ring distance.
fn consider_reps(best: &mut Option<Scored>, buf: &[u8], pos: usize, last_dists: &LastDistances) {
    for slot in 0..4u8 {
        let distance = last_dists.get(slot as usize);
        if distance == 0 || distance as usize > pos {
            continue;
        }

        let length = rep_length(buf, pos, distance as usize);
        match length {
            0 => {}
            1 => {
                // A single repeated byte only has a packet at slot 0.
                if slot == 0 {
                    consider(best, buf, pos, distance, 1, Some(0));
                }
            }
            _ => consider(best, buf, pos, distance, length, Some(slot)),
        }
    }
}

/// Best occurrence at `pos`, or `None` when every candidate costs more
/// than the literals it would replace.
fn find_longest_occurrence(
    buf: &[u8],
    pos: usize,
    last_dists: &LastDistances,
    map: &OffsetMap,
) -> Option<Scored> {
    let mut best = None;

    let mut chunk_id = map.pair_heads[pair_index(buf, pos)];
    while chunk_id != INVALID {
        let chunk = &map.chunks[chunk_id as usize];
        for i in 0..chunk.used as usize {
            let old_pos = chunk.positions[i] as usize;
            let length = common_length(buf, old_pos, pos);
            let distance = (pos - old_pos) as u32;
            let rep = last_dists.slot_of(distance).map(|slot| slot as u8);
            consider(&mut best, buf, pos, distance, length, rep);
        }
        chunk_id = chunk.next;
    }

    consider_reps(&mut best, buf, pos, last_dists);

    // Inside a run of equal bytes the map only holds the run's first
    // position; probing distance 1 keeps the reported distance minimal.
    if pos >= 1 && buf[pos - 1] == buf[pos] && buf[pos] == buf[pos + 1] {
        let length = common_length(buf, pos - 1, pos);
        let rep = last_dists.slot_of(1).map(|slot| slot as u8);
        consider(&mut best, buf, pos, 1, length, rep);
    }

    best
}

/// Best repeat-only candidate at `pos`, used by the lazy heuristic.
fn best_rep(buf: &[u8], pos: usize, last_dists: &LastDistances) -> Option<Scored> {
    let mut best = None;
    consider_reps(&mut best, buf, pos, last_dists);
    best
}

/// Flush a pending literal run, downgrading single bytes that repeat at
/// the most recent distance into SHORTREPs.
fn flush_literals(
    buf: &[u8],
    start: usize,
    len: usize,
    last_dist: u32,
    sink: &mut impl EventSink,
) {
    let distance = last_dist as usize;
    let end = start + len;
    let mut lit_start = start;

    for pos in start..end {
        if distance > 0 && pos >= distance && buf[pos] == buf[pos - distance] {
            if pos > lit_start {
                sink.literal(buf, lit_start, pos - lit_start);
            }
            sink.repeat(
                buf,
                pos,
                Occurrence {
                    distance: last_dist,
                    length: 1,
                    rep: Some(0),
                },
            );
            lit_start = pos + 1;
        }
    }

    if end > lit_start {
        sink.literal(buf, lit_start, end - lit_start);
    }
}

/// Parse `buf` into literal and repeat events, reported through `sink`.
///
/// The only recoverable failure is running out of memory for the offset
/// map; everything else is deterministic in the input bytes.
pub fn find_repeats(buf: &[u8], sink: &mut impl EventSink) -> LzaResult<()> {
    if buf.is_empty() {
        return Ok(());
    }
    debug_assert!(buf.len() <= u32::MAX as usize);

    let mut map = OffsetMap::new(buf.len())?;
    let mut last_dists = LastDistances::new();

    let mut pos = 0usize;
    let mut num_literal = 0usize;

    while pos + 1 < buf.len() {
        let best = match find_longest_occurrence(buf, pos, &last_dists, &map) {
            Some(best) => best,
            None => {
                map.insert(buf, pos);
                pos += 1;
                num_literal += 1;
                continue;
            }
        };

        // Lazy step: when a fresh match here blocks an at-least-as-good
        // repeat at the next position, emit this byte as a literal and
        // let the repeat win.
        if best.rep.is_none() {
            if let Some(next) = best_rep(buf, pos + 1, &last_dists) {
                if next.score >= best.score {
                    map.insert(buf, pos);
                    pos += 1;
                    num_literal += 1;
                    continue;
                }
            }
        }

        if num_literal > 0 {
            flush_literals(buf, pos - num_literal, num_literal, last_dists.get(0), sink);
            num_literal = 0;
        }

        // Report, splitting at the packet length cap. After the first
        // piece the distance sits in ring slot 0, so the rest go out as
        // LONGREP0.
        let mut rep = best.rep;
        let mut rel = 0usize;
        while rel < best.length {
            let piece = (best.length - rel).min(MAX_MATCH_LEN);
            sink.repeat(
                buf,
                pos + rel,
                Occurrence {
                    distance: best.distance,
                    length: piece as u32,
                    rep,
                },
            );
            last_dists.push(best.distance);
            rep = Some(0);
            rel += piece;
        }

        // Matched bytes still enter the map so later positions can match
        // into this region.
        for _ in 0..best.length {
            if pos + 1 < buf.len() {
                map.insert(buf, pos);
            }
            pos += 1;
        }
    }

    if pos < buf.len() {
        num_literal += 1;
        pos += 1;
    }

    if num_literal > 0 {
        flush_literals(buf, pos - num_literal, num_literal, last_dists.get(0), sink);
    }

    Ok(())
}
