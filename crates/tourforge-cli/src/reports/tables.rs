use crate::cmd::plan::Plan;
use crate::cmd::solve::SolveReport;
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

fn format_path(path: &[usize]) -> String {
    path.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" → ")
}

fn gap_cell(gap: Option<f64>) -> Cell {
    match gap {
        Some(g) if g <= 0.0 => Cell::new(format!("{:.2}%", g)).fg(Color::Green),
        Some(g) => Cell::new(format!("{:.2}%", g)).fg(Color::Yellow),
        None => Cell::new("n/a"),
    }
}

pub fn solution(r: &SolveReport) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        Cell::new("Instance").add_attribute(Attribute::Bold),
        Cell::new("Algorithm"),
        Cell::new("Cities"),
        Cell::new("Cost").fg(Color::Cyan),
        Cell::new("Optimum"),
        Cell::new("Gap"),
        Cell::new("Gens"),
        Cell::new("Time (ms)"),
    ]);

    for i in 2..=7 {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }

    table.add_row(vec![
        Cell::new(&r.instance).add_attribute(Attribute::Bold),
        Cell::new(r.algorithm),
        Cell::new(r.cities),
        Cell::new(r.cost).fg(Color::Cyan),
        Cell::new(r.optimum),
        gap_cell(r.gap_percent),
        Cell::new(r.generations.map_or("-".to_string(), |g| g.to_string())),
        Cell::new(r.elapsed_ms),
    ]);

    println!("\n{}", table);
    println!("Path: {}", format_path(&r.path));
}

pub fn plan(p: &Plan) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        Cell::new("Task").add_attribute(Attribute::Bold),
        Cell::new("First"),
        Cell::new("Last (incl.)"),
        Cell::new("Permutations"),
    ]);
    for i in 0..=3 {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }

    for (i, range) in p.shown.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(range.first_permutation_index),
            Cell::new(range.last_permutation_index_inclusive),
            Cell::new(range.len()),
        ]);
    }

    let hidden = p.task_count.saturating_sub(p.shown.len() as u64);
    if hidden > 0 {
        table.add_row(vec![
            Cell::new(format!("… {} more", hidden)).fg(Color::DarkGrey),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
        ]);
    }

    println!("\n=== 🗺️  {} ===", p.instance);
    println!("{} permutations in {} tasks", p.space, p.task_count);
    println!("{}", table);
}
