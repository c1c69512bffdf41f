//! Earthworm TRACEBUF2 packets as returned by `GETSCNLRAW`.
//!
//! Every packet is a 64-byte header followed by `nsamp` samples. The
//! two-character data type names the byte order (`s`/`t` big-endian, `i`/`f`
//! little-endian) and the sample width in bytes.

use super::{SourceError, SourceResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub const HEADER_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct TraceBuf {
    pub pin: i32,
    pub start: f64,
    pub end: f64,
    pub sample_rate: f64,
    pub station: String,
    pub network: String,
    pub channel: String,
    pub location: String,
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Int16,
    Int32,
    Float32,
    Float64,
}

impl Encoding {
    fn width(self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

/// Returns `(big_endian, encoding)` for a data type code such as `s4` or `f8`.
fn data_type(code: &str) -> SourceResult<(bool, Encoding)> {
    let big_endian = match code.chars().next() {
        Some('s' | 't') => true,
        Some('i' | 'f') => false,
        _ => return Err(SourceError::Protocol(format!("unknown data type {code:?}"))),
    };
    let encoding = match code {
        "s2" | "i2" => Encoding::Int16,
        "s4" | "i4" => Encoding::Int32,
        "t4" | "f4" => Encoding::Float32,
        "t8" | "f8" => Encoding::Float64,
        _ => return Err(SourceError::Protocol(format!("unknown data type {code:?}"))),
    };
    Ok((big_endian, encoding))
}

fn text_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

struct Header {
    pin: i32,
    nsamp: i32,
    start: f64,
    end: f64,
    sample_rate: f64,
}

fn read_header<B: ByteOrder>(head: &[u8]) -> Header {
    Header {
        pin: B::read_i32(&head[0..4]),
        nsamp: B::read_i32(&head[4..8]),
        start: B::read_f64(&head[8..16]),
        end: B::read_f64(&head[16..24]),
        sample_rate: B::read_f64(&head[24..32]),
    }
}

fn read_samples<B: ByteOrder>(encoding: Encoding, data: &[u8]) -> Vec<f64> {
    data.chunks_exact(encoding.width())
        .map(|chunk| match encoding {
            Encoding::Int16 => f64::from(B::read_i16(chunk)),
            Encoding::Int32 => f64::from(B::read_i32(chunk)),
            Encoding::Float32 => f64::from(B::read_f32(chunk)),
            Encoding::Float64 => B::read_f64(chunk),
        })
        .collect()
}

impl TraceBuf {
    /// Decodes the packet at the front of `bytes`, returning it with the
    /// number of bytes consumed, or `None` when the packet is truncated.
    pub fn decode(bytes: &[u8]) -> SourceResult<Option<(Self, usize)>> {
        if bytes.len() < HEADER_LEN {
            return Ok(None);
        }
        let head = &bytes[..HEADER_LEN];
        let code = text_field(&head[57..60]);
        let (big_endian, encoding) = data_type(&code)?;
        let header = if big_endian {
            read_header::<BigEndian>(head)
        } else {
            read_header::<LittleEndian>(head)
        };
        let count = usize::try_from(header.nsamp)
            .map_err(|_| SourceError::Protocol(format!("negative sample count {}", header.nsamp)))?;
        let total = HEADER_LEN + count * encoding.width();
        if bytes.len() < total {
            return Ok(None);
        }
        let data = &bytes[HEADER_LEN..total];
        let samples = if big_endian {
            read_samples::<BigEndian>(encoding, data)
        } else {
            read_samples::<LittleEndian>(encoding, data)
        };

        let packet = Self {
            pin: header.pin,
            start: header.start,
            end: header.end,
            sample_rate: header.sample_rate,
            station: text_field(&head[32..39]),
            network: text_field(&head[39..48]),
            channel: text_field(&head[48..52]),
            location: text_field(&head[52..55]),
            samples,
        };
        Ok(Some((packet, total)))
    }
}

/// Decodes consecutive packets, stopping at the first truncated one.
pub fn decode_all(mut bytes: &[u8]) -> SourceResult<Vec<TraceBuf>> {
    let mut packets = Vec::new();
    while let Some((packet, used)) = TraceBuf::decode(bytes)? {
        packets.push(packet);
        bytes = &bytes[used..];
    }
    Ok(packets)
}

/// Encodes a packet as little-endian `i4`.
#[cfg(test)]
pub(crate) fn encode_i4(packet: &TraceBuf) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_LEN + packet.samples.len() * 4];
    LittleEndian::write_i32(&mut bytes[0..4], packet.pin);
    LittleEndian::write_i32(&mut bytes[4..8], packet.samples.len() as i32);
    LittleEndian::write_f64(&mut bytes[8..16], packet.start);
    LittleEndian::write_f64(&mut bytes[16..24], packet.end);
    LittleEndian::write_f64(&mut bytes[24..32], packet.sample_rate);
    write_text(&mut bytes[32..39], &packet.station);
    write_text(&mut bytes[39..48], &packet.network);
    write_text(&mut bytes[48..52], &packet.channel);
    write_text(&mut bytes[52..55], &packet.location);
    write_text(&mut bytes[55..57], "20");
    write_text(&mut bytes[57..60], "i4");
    for (chunk, value) in bytes[HEADER_LEN..].chunks_exact_mut(4).zip(&packet.samples) {
        LittleEndian::write_i32(chunk, *value as i32);
    }
    bytes
}

#[cfg(test)]
fn write_text(slot: &mut [u8], text: &str) {
    let len = text.len().min(slot.len().saturating_sub(1));
    slot[..len].copy_from_slice(&text.as_bytes()[..len]);
}
