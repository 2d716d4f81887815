//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table<T: TableDisplay>(rows: impl IntoIterator<Item = Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(T::headers());
    for row in rows {
        table.add_row(row);
    }
    table
}

fn print_plain<T: TableDisplay>(item: &T) {
    for (header, value) in T::headers().iter().zip(item.row()) {
        println!("{}: {}", header, value);
    }
}

/// Render a value as JSON or YAML
pub fn serialize<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    })
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => println!("{}", table::<T>([item.row()])),
        OutputFormat::Json | OutputFormat::Yaml => println!("{}", serialize(item, format)?),
        OutputFormat::Plain => print_plain(item),
    }
    Ok(())
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table if items.is_empty() => println!("{}", "No items found.".dimmed()),
        OutputFormat::Table => println!("{}", table::<T>(items.iter().map(TableDisplay::row))),
        OutputFormat::Json | OutputFormat::Yaml => println!("{}", serialize(items, format)?),
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                print_plain(item);
            }
        }
    }
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}
