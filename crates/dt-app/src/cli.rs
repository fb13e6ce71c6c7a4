//! Command-line argument parsing for `dtview`

use clap::Parser;
use dt_core::Rect;
use dt_table::{AttributeTableModel, SortOrder};

/// Inspect a delimited text file as a table of point features
#[derive(Parser, Debug)]
#[command(name = "dtview", version, about = "Inspect delimited text point data")]
pub struct CliArgs {
    /// Connection string: path?delimiter=,&xField=..&yField=..&useHeader=yes
    #[arg(value_name = "URI")]
    pub uri: String,

    /// Sort rows by this column (name or 0-based position)
    #[arg(long, value_name = "COL")]
    pub sort: Option<String>,

    /// Sort descending (used with --sort)
    #[arg(long)]
    pub desc: bool,

    /// Only show features inside xmin,ymin,xmax,ymax
    #[arg(long, value_name = "BBOX", allow_hyphen_values = true)]
    pub bbox: Option<Rect>,

    /// Print at most N rows
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Print per-column minimum and maximum values
    #[arg(long)]
    pub stats: bool,

    /// Print the lines that were skipped
    #[arg(long)]
    pub invalid: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl CliArgs {
    pub fn sort_order(&self) -> SortOrder {
        if self.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

/// Resolve a column given by header label or position
pub fn resolve_column(model: &AttributeTableModel, column: &str) -> Option<usize> {
    if let Ok(position) = column.parse::<usize>() {
        return (position < model.column_count()).then_some(position);
    }
    (0..model.column_count()).find(|&c| model.header_label(c).as_deref() == Some(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let args = CliArgs::parse_from(["dtview", "points.csv?delimiter=;", "--sort", "pop", "--desc", "--bbox", "-1,-2,3,4"]);
        assert_eq!(args.uri, "points.csv?delimiter=;");
        assert_eq!(args.sort.as_deref(), Some("pop"));
        assert_eq!(args.sort_order(), SortOrder::Descending);
        assert_eq!(args.bbox, Some(Rect::new(-1.0, -2.0, 3.0, 4.0)));
        assert!(!args.json);
    }

    #[test]
    fn test_bad_bbox_is_rejected() {
        assert!(CliArgs::try_parse_from(["dtview", "a.csv", "--bbox", "1,2,3"]).is_err());
    }
}
