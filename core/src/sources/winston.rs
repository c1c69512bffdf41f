//! Blocking client for Winston/Earthworm wave servers.
//!
//! Each request opens its own connection. Wildcard channels are resolved with
//! `MENU`, then every matching channel is fetched with `GETSCNLRAW` and its
//! packets merged into one trace.

use super::tracebuf::{decode_all, TraceBuf};
use super::{SourceError, SourceResult, WaveformSource};
use crate::prelude::{from_epoch_seconds, StationSpec, TimeWindow, WaveformTrace};
use log::debug;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

const REQUEST_ID: &str = "seiscore";
const DEFAULT_LOCATION: &str = "--";

/// One channel advertised by `MENU`.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuEntry {
    pub pin: i32,
    pub station: String,
    pub channel: String,
    pub network: String,
    pub location: String,
    pub start: f64,
    pub end: f64,
    pub data_type: String,
}

#[derive(Debug, Clone)]
pub struct WinstonClient {
    address: String,
}

impl WinstonClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            address: format!("{host}:{port}"),
        }
    }

    fn connect(&self) -> SourceResult<TcpStream> {
        TcpStream::connect(&self.address).map_err(|source| SourceError::Connect {
            address: self.address.clone(),
            source,
        })
    }

    pub fn menu(&self) -> SourceResult<Vec<MenuEntry>> {
        let mut stream = self.connect()?;
        stream.write_all(format!("MENU: {REQUEST_ID} SCNL\n").as_bytes())?;
        let mut reader = BufReader::new(stream);
        let line = read_line(&mut reader)?;
        parse_menu(&line)
    }

    /// Raw packets for one fully specified channel.
    pub fn raw_packets(
        &self,
        station: &StationSpec,
        channel: &str,
        start: f64,
        end: f64,
    ) -> SourceResult<Vec<TraceBuf>> {
        let mut stream = self.connect()?;
        let request = format!(
            "GETSCNLRAW: {REQUEST_ID} {} {} {} {} {:.6} {:.6}\n",
            station.station, channel, station.network, DEFAULT_LOCATION, start, end
        );
        stream.write_all(request.as_bytes())?;
        let mut reader = BufReader::new(stream);
        let line = read_line(&mut reader)?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let flag = tokens
            .get(6)
            .ok_or_else(|| SourceError::Protocol(format!("short GETSCNLRAW header: {line:?}")))?;
        if *flag != "F" {
            debug!("{}.{} returned flag {}", station.station, channel, flag);
            return Ok(Vec::new());
        }
        let length: usize = tokens
            .last()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| SourceError::Protocol(format!("missing byte count: {line:?}")))?;
        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload)?;
        decode_all(&payload)
    }

    fn resolve_channels(&self, station: &StationSpec, pattern: &str) -> SourceResult<Vec<String>> {
        if !is_pattern(pattern) {
            return Ok(vec![pattern.to_string()]);
        }
        let mut channels: Vec<String> = self
            .menu()?
            .into_iter()
            .filter(|entry| {
                entry.station == station.station
                    && entry.network == station.network
                    && entry.location == DEFAULT_LOCATION
                    && matches_pattern(pattern, &entry.channel)
            })
            .map(|entry| entry.channel)
            .collect();
        channels.sort();
        channels.dedup();
        Ok(channels)
    }
}

impl WaveformSource for WinstonClient {
    fn fetch(
        &self,
        station: &StationSpec,
        channel: &str,
        window: &TimeWindow,
    ) -> SourceResult<Vec<WaveformTrace>> {
        let (start, end) = (window.start_seconds(), window.end_seconds());
        let mut traces = Vec::new();
        for code in self.resolve_channels(station, channel)? {
            let packets = self.raw_packets(station, &code, start, end)?;
            debug!("{}.{}: {} packets", station.station, code, packets.len());
            if let Some(trace) = merge_packets(&code, packets, start, end)? {
                traces.push(trace);
            }
        }
        Ok(traces)
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> SourceResult<String> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    Ok(String::from_utf8_lossy(&line).trim().to_string())
}

fn parse_menu(line: &str) -> SourceResult<Vec<MenuEntry>> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() == Some(&REQUEST_ID) {
        tokens.remove(0);
    }
    if matches!(tokens.last(), Some(&("FN" | "FC" | "FU"))) {
        return Ok(Vec::new());
    }
    if tokens.len() % 8 != 0 {
        return Err(SourceError::Protocol(format!(
            "MENU returned {} tokens, not a multiple of 8",
            tokens.len()
        )));
    }
    tokens
        .chunks_exact(8)
        .map(|entry| {
            let number = |token: &str| {
                token
                    .parse::<f64>()
                    .map_err(|_| SourceError::Protocol(format!("bad MENU time {token:?}")))
            };
            Ok(MenuEntry {
                pin: entry[0]
                    .parse()
                    .map_err(|_| SourceError::Protocol(format!("bad MENU pin {:?}", entry[0])))?,
                station: entry[1].into(),
                channel: entry[2].into(),
                network: entry[3].into(),
                location: entry[4].into(),
                start: number(entry[5])?,
                end: number(entry[6])?,
                data_type: entry[7].into(),
            })
        })
        .collect()
}

fn is_pattern(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// Shell-style match supporting `*` and `?`.
fn matches_pattern(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('*', rest)) => (0..=text.len()).any(|skip| inner(rest, &text[skip..])),
            Some(('?', rest)) => !text.is_empty() && inner(rest, &text[1..]),
            Some((head, rest)) => text.first() == Some(head) && inner(rest, &text[1..]),
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    inner(&pattern, &text)
}

/// Joins the packets of one channel in time order and trims to `[start, end]`.
/// Gaps hold the previous sample; overlapping samples are dropped.
fn merge_packets(
    channel: &str,
    mut packets: Vec<TraceBuf>,
    start: f64,
    end: f64,
) -> SourceResult<Option<WaveformTrace>> {
    packets.retain(|packet| !packet.samples.is_empty() && packet.sample_rate > 0.0);
    packets.sort_by(|a, b| a.start.total_cmp(&b.start));
    let Some(first) = packets.first() else {
        return Ok(None);
    };
    let rate = first.sample_rate;
    let origin = first.start;
    let mut samples: Vec<f64> = Vec::new();

    for packet in &packets {
        let expected = origin + samples.len() as f64 / rate;
        let offset = ((packet.start - expected) * rate).round() as i64;
        if offset > 0 {
            let hold = samples.last().copied().unwrap_or(0.0);
            samples.extend(std::iter::repeat(hold).take(offset as usize));
            samples.extend_from_slice(&packet.samples);
        } else {
            let skip = offset.unsigned_abs() as usize;
            if skip < packet.samples.len() {
                samples.extend_from_slice(&packet.samples[skip..]);
            }
        }
    }

    const TOLERANCE: f64 = 1e-6;
    let first_index = ((start - origin) * rate - TOLERANCE).ceil().max(0.0) as usize;
    let last_index = ((end - origin) * rate + TOLERANCE).floor();
    if last_index < 0.0 || first_index >= samples.len() {
        return Ok(None);
    }
    let last_index = (last_index as usize).min(samples.len() - 1);
    if first_index > last_index {
        return Ok(None);
    }

    let trace_start = from_epoch_seconds(origin + first_index as f64 / rate)
        .ok_or_else(|| SourceError::Protocol(format!("invalid start time {origin}")))?;
    Ok(Some(WaveformTrace::new(
        channel,
        samples[first_index..=last_index].to_vec(),
        rate,
        trace_start,
    )))
}
