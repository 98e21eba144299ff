//! One-line terminal level display

use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use levelmeter_level::{BarGraph, DisplayUpdate, LevelReading, SegmentZone};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const LIT: char = '█';
const UNLIT: char = '·';

fn zone_color(zone: SegmentZone) -> Color {
    match zone {
        SegmentZone::Low => Color::Blue,
        SegmentZone::Normal => Color::Green,
        SegmentZone::High => Color::Yellow,
        SegmentZone::Clip => Color::Red,
    }
}

/// Redraw the current line with the bar and readout
pub fn draw<W: Write>(out: &mut W, bar: &BarGraph, reading: &LevelReading) -> io::Result<()> {
    queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;

    for (zone, lit) in bar.render(reading.display_value) {
        if lit {
            queue!(out, SetForegroundColor(zone_color(zone)), Print(LIT))?;
        } else {
            queue!(out, SetForegroundColor(Color::DarkGrey), Print(UNLIT))?;
        }
    }

    let readout = reading.readout().to_string();
    queue!(out, ResetColor, Print(format!("  {:>9}", readout)))?;
    out.flush()
}

/// Display sink consumer: draws each update, then releases it
pub struct TerminalDisplay {
    bar: BarGraph,
    last_reading: Arc<Mutex<Option<LevelReading>>>,
}

impl TerminalDisplay {
    pub fn new(segments: usize, last_reading: Arc<Mutex<Option<LevelReading>>>) -> Self {
        Self {
            bar: BarGraph::new(segments),
            last_reading,
        }
    }

    /// Runs until every sender is gone
    pub async fn run(self, mut updates: mpsc::Receiver<DisplayUpdate>) {
        let mut stdout = io::stdout();

        while let Some(update) = updates.recv().await {
            *self.last_reading.lock() = Some(update.reading);
            if let Err(e) = draw(&mut stdout, &self.bar, &update.reading) {
                warn!(error = %e, "Failed to draw level");
            }
            update.completion.complete();
        }

        let _ = writeln!(stdout);
        debug!("Display closed");
    }
}
