//! Single pass over a delimited file: schema, count, extent and invalid lines

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use csv::StringRecord;
use dt_core::{Field, FieldType, Rect};
use tracing::{debug, warn};

use super::record::{InvalidLine, InvalidReason, RecordLayout};
use crate::config::ProviderConfig;
use crate::schema::{generated_names, unique_names, SchemaDetector};
use crate::DataError;

/// Identity of the file contents at analysis time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn of(path: &Path) -> Result<Self, DataError> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Result of analyzing a file
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub layout: Arc<RecordLayout>,
    pub feature_count: usize,
    pub extent: Option<Rect>,
    pub invalid_lines: Vec<InvalidLine>,
    pub stamp: FileStamp,
}

impl FileAnalysis {
    /// Analyze the file described by `config`
    pub fn run(config: &ProviderConfig) -> Result<Self, DataError> {
        let stamp = FileStamp::of(&config.path)?;
        let mut reader = RecordLayout::reader_builder(config.delimiter).from_path(&config.path)?;

        let mut first = StringRecord::new();
        if !reader.read_record(&mut first)? {
            return Err(DataError::EmptyFile(config.path.display().to_string()));
        }

        let (names, pending) = if config.use_header {
            (unique_names(&first.iter().map(str::to_string).collect::<Vec<_>>()), None)
        } else {
            (generated_names(first.len()), Some(first))
        };

        let (x_index, y_index) = config.resolve_coordinates(&names)?;
        debug!(
            "Using '{}' as X and '{}' as Y in {:?}",
            names[x_index], names[y_index], config.path
        );

        // Types are unknown until the sample is complete; coordinates do not need them.
        let mut layout = RecordLayout {
            fields: names.iter().map(|n| Field::new(n.clone(), FieldType::Text, true)).collect(),
            x_index,
            y_index,
            delimiter: config.delimiter,
            has_header: config.use_header,
            null_config: config.null_config.clone(),
        };

        let mut scan = ScanState {
            detector: SchemaDetector::new().with_sample_size(config.sample_size),
            feature_count: 0,
            extent: None,
            invalid_lines: Vec::new(),
        };

        if let Some(record) = pending {
            scan.observe(&layout, &record, 1);
        }

        let mut record = StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {
                    let line_number = record.position().map(|p| p.line()).unwrap_or(0);
                    scan.observe(&layout, &record, line_number);
                }
                Ok(false) => break,
                Err(err) => match encoding_error_line(&err) {
                    Some(line_number) => scan.invalid_lines.push(InvalidLine {
                        line_number,
                        text: String::new(),
                        reason: InvalidReason::Encoding,
                    }),
                    None => return Err(err.into()),
                },
            }
        }

        let ScanState {
            detector,
            feature_count,
            extent,
            invalid_lines,
        } = scan;

        let schema = detector.finish(&names, &config.field_types);
        layout.fields = schema.fields;

        if !invalid_lines.is_empty() {
            warn!(
                "{} line(s) in {:?} could not be parsed and were skipped",
                invalid_lines.len(),
                config.path
            );
        }

        Ok(Self {
            layout: Arc::new(layout),
            feature_count,
            extent,
            invalid_lines,
            stamp,
        })
    }
}

/// Line of a record that failed UTF-8 validation; other errors are fatal
pub(crate) fn encoding_error_line(err: &csv::Error) -> Option<u64> {
    match err.kind() {
        csv::ErrorKind::Utf8 { pos, .. } => Some(pos.as_ref().map(|p| p.line()).unwrap_or(0)),
        _ => None,
    }
}

/// Accumulators of the analysis pass
struct ScanState {
    detector: SchemaDetector,
    feature_count: usize,
    extent: Option<Rect>,
    invalid_lines: Vec<InvalidLine>,
}

impl ScanState {
    fn observe(&mut self, layout: &RecordLayout, record: &StringRecord, line_number: u64) {
        match layout.point(record) {
            Ok(point) => {
                self.feature_count += 1;
                match self.extent.as_mut() {
                    Some(rect) => rect.include(point),
                    None => self.extent = Some(Rect::from_point(point)),
                }
                self.detector.observe_row(record.iter(), &layout.null_config);
            }
            Err(reason) => self.invalid_lines.push(InvalidLine {
                line_number,
                text: layout.line_text(record),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldRef;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_analysis_with_header() {
        let file = write_file("name,x,y,pop\na,1,2,10\nb,3,-1,\nc,oops,0,5\nd,0,0\n");
        let analysis = FileAnalysis::run(&ProviderConfig::new(file.path())).unwrap();

        assert_eq!(analysis.feature_count, 2);
        assert_eq!(analysis.extent, Some(Rect::new(1.0, -1.0, 3.0, 2.0)));
        assert_eq!(analysis.layout.x_index, 1);
        assert_eq!(analysis.layout.y_index, 2);

        let types: Vec<FieldType> = analysis.layout.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(types, vec![FieldType::Text, FieldType::Integer, FieldType::Integer, FieldType::Integer]);

        assert_eq!(analysis.invalid_lines.len(), 2);
        assert_eq!(analysis.invalid_lines[0].line_number, 4);
        assert_eq!(analysis.invalid_lines[0].reason, InvalidReason::BadX("oops".into()));
        assert_eq!(analysis.invalid_lines[1].line_number, 5);
        assert_eq!(
            analysis.invalid_lines[1].reason,
            InvalidReason::FieldCount { expected: 4, found: 3 }
        );
    }

    #[test]
    fn test_analysis_without_header() {
        let file = write_file("1,a,10\n2,b,5\n3,c,20\n");
        let mut config = ProviderConfig::new(file.path())
            .with_coordinate_fields(FieldRef::Position(0), FieldRef::Position(2));
        config.use_header = false;

        let analysis = FileAnalysis::run(&config).unwrap();
        assert_eq!(analysis.feature_count, 3);
        assert_eq!(analysis.layout.fields[0].name, "field_1");
        assert_eq!(analysis.extent, Some(Rect::new(1.0, 5.0, 3.0, 20.0)));
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let file = write_file("");
        assert!(matches!(
            FileAnalysis::run(&ProviderConfig::new(file.path())),
            Err(DataError::EmptyFile(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let config = ProviderConfig::new("/definitely/not/here.csv");
        assert!(matches!(FileAnalysis::run(&config), Err(DataError::Io(_))));
    }

    #[test]
    fn test_unresolvable_coordinates() {
        let file = write_file("a,b\n1,2\n");
        assert!(matches!(
            FileAnalysis::run(&ProviderConfig::new(file.path())),
            Err(DataError::MissingCoordinateField(_))
        ));
    }
}
