use super::{FigureError, FigureResult};
use plotters::style::RGBColor;

/// Piecewise-linear colour ramp sampled on `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    stops: Vec<[u8; 3]>,
}

impl ColorTable {
    pub fn new(stops: Vec<[u8; 3]>) -> FigureResult<Self> {
        if stops.len() < 2 {
            return Err(FigureError::Colors(format!(
                "need at least two colours, got {}",
                stops.len()
            )));
        }
        Ok(Self { stops })
    }

    /// Parses `#rrggbb` (or `rrggbb`) codes.
    pub fn from_hex<S: AsRef<str>>(codes: &[S]) -> FigureResult<Self> {
        let stops = codes
            .iter()
            .map(|code| parse_hex(code.as_ref()))
            .collect::<FigureResult<Vec<_>>>()?;
        Self::new(stops)
    }

    pub fn sample(&self, fraction: f64) -> RGBColor {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let position = fraction * (self.stops.len() - 1) as f64;
        let lower = (position.floor() as usize).min(self.stops.len() - 2);
        let weight = position - lower as f64;
        let (a, b) = (self.stops[lower], self.stops[lower + 1]);
        let mix = |i: usize| (f64::from(a[i]) + (f64::from(b[i]) - f64::from(a[i])) * weight).round() as u8;
        RGBColor(mix(0), mix(1), mix(2))
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            stops: vec![
                [0x44, 0x01, 0x54],
                [0x3b, 0x52, 0x8b],
                [0x21, 0x91, 0x8c],
                [0x5e, 0xc9, 0x62],
                [0xfd, 0xe7, 0x25],
            ],
        }
    }
}

fn parse_hex(code: &str) -> FigureResult<[u8; 3]> {
    let digits = code.trim().trim_start_matches('#');
    let invalid = || FigureError::Colors(format!("{code:?} is not a #rrggbb colour"));
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).map_err(|_| invalid());
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Fixed linear mapping from dB values onto the colour table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub min: f64,
    pub max: f64,
}

impl Normalize {
    /// Spectrogram range, chosen empirically so brightness stays comparable
    /// across stations and windows.
    pub const SPECTROGRAM_DB: Self = Self {
        min: -360.0,
        max: -180.0,
    };

    pub fn fraction(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_interpolate_between_stops() {
        let table = ColorTable::from_hex(&["#000000", "#ffffff"]).unwrap();
        assert_eq!(table.sample(0.0), RGBColor(0, 0, 0));
        assert_eq!(table.sample(1.0), RGBColor(255, 255, 255));
        assert_eq!(table.sample(0.5), RGBColor(128, 128, 128));
    }

    #[test]
    fn out_of_range_values_clamp() {
        let table = ColorTable::default();
        assert_eq!(table.sample(-4.0), table.sample(0.0));
        assert_eq!(table.sample(9.0), table.sample(1.0));
        assert_eq!(table.sample(f64::NAN), table.sample(0.0));
        assert_eq!(table.sample(f64::NEG_INFINITY), table.sample(0.0));
    }

    #[test]
    fn malformed_tables_are_rejected() {
        assert!(ColorTable::from_hex(&["#000000"]).is_err());
        assert!(ColorTable::from_hex(&["#00000", "#ffffff"]).is_err());
        assert!(ColorTable::from_hex(&["#gg0000", "#ffffff"]).is_err());
    }

    #[test]
    fn normalisation_is_linear() {
        let norm = Normalize::SPECTROGRAM_DB;
        assert_eq!(norm.fraction(-360.0), 0.0);
        assert_eq!(norm.fraction(-180.0), 1.0);
        assert_eq!(norm.fraction(-270.0), 0.5);
    }
}
