//! `dtview` entry point

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use dt_data::DelimitedTextProvider;
use dt_table::{AttributeTableFilterModel, AttributeTableModel, CellRole, EditableLayer};
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{resolve_column, CliArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    run(CliArgs::parse())
}

fn run(args: CliArgs) -> Result<()> {
    let provider = Arc::new(DelimitedTextProvider::new(&args.uri));
    if !provider.is_valid() {
        bail!("Could not open '{}' as delimited text", args.uri);
    }

    let layer = Arc::new(EditableLayer::new(provider.clone()));
    let mut table = AttributeTableFilterModel::new(AttributeTableModel::new(layer.clone()));

    if let Some(rect) = args.bbox {
        let inside = provider.identify(&rect);
        info!("{} features inside {}", inside.len(), rect);
        layer.select_features(inside.into_iter().map(|f| f.id), true);
        table.set_hide_unselected(true);
    }

    if let Some(column) = &args.sort {
        let position = resolve_column(table.source_model(), column).ok_or_else(|| anyhow!("Unknown column '{}'", column))?;
        table.sort(position, args.sort_order());
    }

    let rows: Vec<usize> = table
        .visible_rows()
        .into_iter()
        .take(args.limit.unwrap_or(usize::MAX))
        .collect();

    if args.json {
        print_json(&args, &provider, table.source_model(), &rows)
    } else {
        print_text(&args, &provider, table.source_model(), &rows);
        Ok(())
    }
}

fn print_text(args: &CliArgs, provider: &DelimitedTextProvider, model: &AttributeTableModel, rows: &[usize]) {
    println!("{} ({})", args.uri, provider.storage_type());
    println!("Features: {}", provider.feature_count());
    match provider.extent() {
        Some(extent) => println!("Extent: {}", extent),
        None => println!("Extent: empty"),
    }

    let fields = provider.fields();
    if args.stats {
        println!();
        for (position, field) in fields.iter().enumerate() {
            println!(
                "{} ({}): min {} max {}",
                field.name,
                field.field_type,
                provider.min_value(position).unwrap_or_else(|| "-".to_string()),
                provider.max_value(position).unwrap_or_else(|| "-".to_string()),
            );
        }
    }

    if args.invalid {
        println!();
        for line in provider.invalid_lines() {
            println!("line {}: {} [{}]", line.line_number, line.reason, line.text);
        }
    }

    println!();
    let header: Vec<String> = (0..model.column_count())
        .filter_map(|column| model.header_label(column))
        .collect();
    println!("{}", header.join("\t"));
    for &row in rows {
        let cells: Vec<String> = (0..model.column_count())
            .map(|column| model.cell_text(row, column, CellRole::Display))
            .collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_json(args: &CliArgs, provider: &DelimitedTextProvider, model: &AttributeTableModel, rows: &[usize]) -> Result<()> {
    let records: Vec<Value> = rows
        .iter()
        .map(|&row| {
            let mut record = Map::new();
            if let Some(id) = model.row_to_id(row) {
                record.insert("id".to_string(), json!(id));
            }
            for column in 0..model.column_count() {
                if let Some(label) = model.header_label(column) {
                    let value = model.cell_value(row, column).unwrap_or_default();
                    record.insert(label, serde_json::to_value(value).unwrap_or(Value::Null));
                }
            }
            Value::Object(record)
        })
        .collect();

    let mut output = json!({
        "source": args.uri,
        "geometry": provider.geometry_type(),
        "features": provider.feature_count(),
        "extent": provider.extent(),
        "fields": provider.fields(),
        "capabilities": provider.capabilities(),
        "rows": records,
    });

    if args.stats {
        let stats: Vec<Value> = provider
            .fields()
            .iter()
            .enumerate()
            .map(|(position, field)| {
                json!({
                    "field": field.name,
                    "min": provider.min_value(position),
                    "max": provider.max_value(position),
                })
            })
            .collect();
        output["statistics"] = Value::Array(stats);
    }

    if args.invalid {
        output["invalid_lines"] = serde_json::to_value(provider.invalid_lines())?;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
