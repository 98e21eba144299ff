//! Segmented bar and numeric readout

use std::fmt;

/// Color band of a bar segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentZone {
    Low,
    Normal,
    High,
    Clip,
}

/// Segmented level indicator
///
/// The level input is normalized, [0, 1] covering the whole bar; anything
/// outside is clamped here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarGraph {
    segments: usize,
}

impl Default for BarGraph {
    fn default() -> Self {
        Self::new(10)
    }
}

impl BarGraph {
    pub fn new(segments: usize) -> Self {
        Self {
            segments: segments.max(1),
        }
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Segment `index` is lit once the level passes its midpoint
    pub fn is_lit(&self, level: f64, index: usize) -> bool {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        level * self.segments as f64 > index as f64 + 0.5
    }

    pub fn lit_segments(&self, level: f64) -> usize {
        (0..self.segments).filter(|&i| self.is_lit(level, i)).count()
    }

    /// Bands in proportion 2 : 4 : 2 : 2 along the bar
    pub fn zone(&self, index: usize) -> SegmentZone {
        match index * 10 / self.segments {
            0..=1 => SegmentZone::Low,
            2..=5 => SegmentZone::Normal,
            6..=7 => SegmentZone::High,
            _ => SegmentZone::Clip,
        }
    }

    /// Each segment's zone and whether it is lit, left to right
    pub fn render(&self, level: f64) -> Vec<(SegmentZone, bool)> {
        (0..self.segments)
            .map(|i| (self.zone(i), self.is_lit(level, i)))
            .collect()
    }
}

/// Level rounded to one decimal, split for a large/small digit display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readout {
    pub negative: bool,
    pub whole: u64,
    pub tenths: u8,
}

impl Readout {
    pub fn from_db(db: f64) -> Self {
        if !db.is_finite() {
            return Self {
                negative: db.is_sign_negative(),
                whole: 0,
                tenths: 0,
            };
        }

        let scaled = (db.abs() * 10.0).round() as u64;
        Self {
            negative: db < 0.0 && scaled != 0,
            whole: scaled / 10,
            tenths: (scaled % 10) as u8,
        }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { "-" } else { "" };
        write!(f, "{}{}.{} dB", sign, self.whole, self.tenths)
    }
}
