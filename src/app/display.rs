//! Tabular output of a demo run

use prettytable::{format, Cell, Row, Table};

use crate::app::demo::DemoReport;
use crate::core::styles::StyleRole;
use crate::messaging::api::{DestinationKind, DestinationStats};

const DESTINATION_HEADERS: [&str; 6] = [
    "Destination",
    "Kind",
    "Subscriptions",
    "Received",
    "Delivered",
    "Pending",
];
const READER_HEADERS: [&str; 3] = ["Subscriber", "Destination", "Messages"];

/// Cell with an optional alignment spec (`r`, `b`, ...) and the role's color
fn styled(text: &str, role: StyleRole, color: bool, spec: &str) -> Cell {
    let mut full = spec.to_string();
    if color {
        if let Some(color_spec) = role.to_prettytable_spec() {
            full.push_str(&color_spec);
        }
    }
    Cell::new(text).style_spec(&full)
}

fn header_row(headers: &[&str], color: bool) -> Row {
    Row::new(
        headers
            .iter()
            .map(|header| styled(header, StyleRole::Header, color, "b"))
            .collect(),
    )
}

fn kind_role(kind: DestinationKind) -> StyleRole {
    match kind {
        DestinationKind::Topic => StyleRole::Topic,
        DestinationKind::Queue => StyleRole::Queue,
    }
}

pub fn destination_table(stats: &[DestinationStats], color: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(header_row(&DESTINATION_HEADERS, color));
    for entry in stats {
        let pending_role = if entry.pending > 0 {
            StyleRole::Warning
        } else {
            StyleRole::Count
        };
        table.add_row(Row::new(vec![
            Cell::new(&entry.identifier.to_string()),
            styled(&entry.kind.to_string(), kind_role(entry.kind), color, ""),
            Cell::new(&entry.subscriptions.to_string()).style_spec("r"),
            Cell::new(&entry.messages_received.to_string()).style_spec("r"),
            Cell::new(&entry.messages_delivered.to_string()).style_spec("r"),
            styled(&entry.pending.to_string(), pending_role, color, "r"),
        ]));
    }
    table
}

pub fn reader_table(report: &DemoReport, color: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(header_row(&READER_HEADERS, color));
    for tally in &report.readers {
        table.add_row(Row::new(vec![
            Cell::new(&tally.subscriber),
            styled(&tally.destination, StyleRole::Dim, color, ""),
            Cell::new(&tally.received.to_string()).style_spec("r"),
        ]));
    }
    table
}

/// Print both tables; colors only reach the terminal when `color` is set
pub fn print_report(report: &DemoReport, color: bool) {
    let destinations = destination_table(&report.destinations, color);
    let readers = reader_table(report, color);
    if color {
        destinations.printstd();
        println!();
        readers.printstd();
    } else {
        print!("{}", destinations);
        println!();
        print!("{}", readers);
    }
    if let Some(entries) = report.transferred_entries {
        println!();
        println!(
            "{}",
            StyleRole::Dim.paint(&format!("Partition transfer moved {} entries", entries), color)
        );
    }
}

pub fn report_json(report: &DemoReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
