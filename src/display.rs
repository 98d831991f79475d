use std::fs::File;
use std::io::Write;

use crate::schedule::{Cell, SlotGrid, Summary, TieBreakPrompt, KEEP_ORDER};

/// Formats one grid cell, starring meetings nobody asked for
pub fn format_cell(cell: &Cell, requested: bool) -> String {
    match cell {
        Cell::Empty => "-".to_string(),
        Cell::Blocked => "N/A".to_string(),
        Cell::Assigned(other) if requested => other.clone(),
        Cell::Assigned(other) => format!("{}*", other),
    }
}

/// Writes the grid as one line per participant: id then each slot
pub fn write_grid_to_file(
    grid: &SlotGrid,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::create(filename)?;

    writeln!(file, "** Meeting schedule ({} slots) **", grid.slot_count())?;
    for row in grid.rows() {
        let cells: Vec<String> = row
            .cells
            .iter()
            .zip(&row.requested)
            .map(|(cell, &requested)| format_cell(cell, requested))
            .collect();
        writeln!(file, "{} | {}", row.participant, cells.join(" | "))?;
    }

    Ok(())
}

/// Prints the grid with a header row of slot numbers
pub fn print_grid(grid: &SlotGrid) {
    let width = grid
        .rows()
        .iter()
        .flat_map(|r| {
            std::iter::once(r.participant.len())
                .chain(r.cells.iter().map(|c| c.as_text().len() + 1))
        })
        .max()
        .unwrap_or(4)
        .max(4);

    print!("{:width$}", "", width = width);
    for slot in 1..=grid.slot_count() {
        print!(" {:>width$}", format!("mtg{}", slot), width = width);
    }
    println!();

    for row in grid.rows() {
        print!("{:width$}", row.participant, width = width);
        for (cell, &requested) in row.cells.iter().zip(&row.requested) {
            print!(" {:>width$}", format_cell(cell, requested), width = width);
        }
        println!();
    }
}

pub fn print_prompt(prompt: &TieBreakPrompt) {
    println!(
        "\nTie at score {} (group {}): these meetings compete for the same participants",
        prompt.score, prompt.group
    );
    for row in &prompt.rows {
        println!("  [{}] {} <-> {}", row.id, row.entity1, row.entity2);
    }
    println!(
        "Enter row numbers in priority order, or '{}' to keep this order:",
        KEEP_ORDER
    );
}

pub fn print_summary(summary: &Summary) {
    println!("\n=== Summary ===");
    println!(
        "Scheduled {} of {} candidate meetings",
        summary.scheduled, summary.candidates
    );
    if !summary.unscheduled.is_empty() {
        println!("Unscheduled ({}):", summary.unscheduled.len());
        for c in &summary.unscheduled {
            println!("  - {} <-> {} (score {})", c.entity1, c.entity2, c.score);
        }
    }
    for load in &summary.participants {
        println!(
            "  {}: {} meetings, {} blocked, {} open",
            load.participant, load.meetings, load.blocked, load.open
        );
    }
}
