//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::report::RunReport;
use crate::vector::{KernelVariant, LaneType};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Add a row of styled cells.
    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn format_recall(recall: Option<f64>) -> String {
    recall.map_or_else(|| "-".to_string(), |r| format!("{:.2}%", r * 100.0))
}

/// Create a summary table of finished runs.
pub fn create_run_table(reports: &[RunReport]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Components",
        "Metric",
        "Recall target",
        "Time",
        "Comparisons",
        "Selectivity",
        "Recall",
    ]);

    for report in reports {
        let meta = &report.metadata;
        let target = if meta.filter {
            format!("{:.2}", meta.recall)
        } else {
            "-".to_string()
        };
        builder = builder.add_row(vec![
            meta.components.clone(),
            meta.metric.to_string(),
            target,
            format!("{:?}", report.result.elapsed()),
            report.result.comparisons.to_string(),
            format!("{:.4}", report.result.selectivity()),
            format_recall(report.recall),
        ]);
    }

    builder.build()
}

fn availability_cell(variant: KernelVariant, lane: LaneType) -> Cell {
    if variant.is_available(lane) {
        return Cell::new("available").fg(Color::Green);
    }
    let missing: Vec<&str> = variant
        .required_instruction_sets(lane)
        .iter()
        .filter(|set| !set.is_detected())
        .map(|set| set.name())
        .collect();
    Cell::new(format!("missing {}", missing.join(", "))).fg(Color::Yellow)
}

/// Create a table of kernel variants and their availability on this machine.
pub fn create_kernel_table() -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Variant",
        "f32 lanes",
        "i16 lanes",
        "f32 kernels",
        "i16 kernels",
    ]);

    for variant in KernelVariant::ALL {
        builder = builder.add_cells(vec![
            Cell::new(variant.as_str()).add_attribute(Attribute::Bold),
            Cell::new(variant.lanes(LaneType::F32)),
            Cell::new(variant.lanes(LaneType::I16)),
            availability_cell(variant, LaneType::F32),
            availability_cell(variant, LaneType::I16),
        ]);
    }

    builder.build()
}
