//! End-to-end behavior of the provider, layer and table model together

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dt_core::{AttributeSelection, AttributeValue, Feature, FeatureId, FeatureSource, Field, Rect};
use dt_data::DelimitedTextProvider;
use dt_table::{AttributeTableModel, EditableLayer, SortOrder};
use tempfile::NamedTempFile;

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn provider(file: &NamedTempFile, query: &str) -> Arc<DelimitedTextProvider> {
    Arc::new(DelimitedTextProvider::new(&format!("{}{}", file.path().display(), query)))
}

fn model_over(source: Arc<dyn FeatureSource>) -> (Arc<EditableLayer>, AttributeTableModel) {
    let layer = Arc::new(EditableLayer::new(source));
    let model = AttributeTableModel::new(layer.clone());
    (layer, model)
}

fn first_column(model: &AttributeTableModel) -> Vec<AttributeValue> {
    (0..model.row_count()).filter_map(|row| model.cell_value(row, 0)).collect()
}

/// Counts random-access fetches reaching the source
struct CountingSource {
    inner: Arc<DelimitedTextProvider>,
    fetches: AtomicUsize,
}

impl FeatureSource for CountingSource {
    fn source_name(&self) -> &str {
        self.inner.source_name()
    }

    fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    fn fields(&self) -> Vec<Field> {
        self.inner.fields()
    }

    fn feature_count(&self) -> usize {
        self.inner.feature_count()
    }

    fn extent(&self) -> Option<Rect> {
        self.inner.extent()
    }

    fn select(&self, rect: Option<Rect>, use_intersect: bool) {
        self.inner.select(rect, use_intersect)
    }

    fn rewind(&self) {
        self.inner.rewind()
    }

    fn next_feature(&self, attributes: &AttributeSelection) -> Option<Feature> {
        self.inner.next_feature_with(attributes)
    }

    fn feature_at_id(&self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.feature_at_id(id, attributes)
    }
}

const HEADERLESS: &str = "1,a,10\n2,b,5\n3,c,20\n";
const HEADERLESS_QUERY: &str = "?delimiter=,&useHeader=no&xField=0&yField=2";

#[test]
fn sorting_by_third_column_orders_rows() {
    let file = write_file(HEADERLESS);
    let (_layer, mut model) = model_over(provider(&file, HEADERLESS_QUERY));

    assert!(model.sort(2, SortOrder::Ascending));
    assert_eq!(
        first_column(&model),
        vec![AttributeValue::Integer(2), AttributeValue::Integer(1), AttributeValue::Integer(3)]
    );
    assert_eq!(model.row_ids(), &[1, 0, 2]);
}

#[test]
fn sorting_is_idempotent() {
    let file = write_file(HEADERLESS);
    let (_layer, mut model) = model_over(provider(&file, HEADERLESS_QUERY));

    model.sort(1, SortOrder::Descending);
    let once = model.row_ids().to_vec();
    model.sort(1, SortOrder::Descending);
    assert_eq!(model.row_ids(), once.as_slice());
}

#[test]
fn sorting_is_stable_for_equal_keys() {
    let file = write_file("x,y,group\n0,0,b\n1,1,a\n2,2,b\n3,3,a\n4,4,b\n");
    let (_layer, mut model) = model_over(provider(&file, ""));

    assert!(model.sort(2, SortOrder::Ascending));
    assert_eq!(model.row_ids(), &[1, 3, 0, 2, 4]);

    assert!(model.sort(2, SortOrder::Descending));
    assert_eq!(model.row_ids(), &[0, 2, 4, 1, 3]);
}

#[test]
fn index_round_trips_after_sort() {
    let file = write_file("x,y,v\n0,0,5\n1,1,3\n2,2,9\n3,3,1\n");
    let (_layer, mut model) = model_over(provider(&file, ""));
    model.sort(2, SortOrder::Ascending);

    for row in 0..model.row_count() {
        let id = model.row_to_id(row).unwrap();
        assert_eq!(model.id_to_row(id), Some(row));
    }
    assert_eq!(model.row_to_id(model.row_count()), None);
    assert_eq!(model.id_to_row(99), None);
}

#[test]
fn deleting_a_row_compacts_the_index() {
    let file = write_file("x,y\n0,0\n1,1\n2,2\n3,3\n");
    let (layer, mut model) = model_over(provider(&file, ""));
    layer.start_editing();

    layer.delete_feature(1).unwrap();
    model.process_layer_events();

    assert_eq!(model.row_count(), 3);
    assert_eq!(model.row_ids(), &[0, 3, 2]);
    for row in 0..model.row_count() {
        assert_eq!(model.id_to_row(model.row_to_id(row).unwrap()), Some(row));
    }
}

#[test]
fn filter_excluding_every_point_keeps_count_and_extent() {
    let file = write_file("x,y\n1,1\n2,2\n3,3\n");
    let source = provider(&file, "");
    source.select(Some(Rect::new(-10.0, -10.0, -5.0, -5.0)), false);

    assert!(source.get_next_feature(true).is_none());
    assert_eq!(source.feature_count(), 3);
    assert_eq!(source.extent(), Some(Rect::new(1.0, 1.0, 3.0, 3.0)));
}

#[test]
fn short_line_is_skipped_and_reported() {
    let file = write_file("x,y,name\n1,1,a\n2,2\n3,3,c\n");
    let source = provider(&file, "");

    assert!(source.is_valid());
    assert_eq!(source.feature_count(), 2);
    assert_eq!(source.invalid_lines().len(), 1);

    for id in 0..source.feature_count() as FeatureId {
        assert!(source.get_feature_attributes(id).is_some());
    }

    let (_layer, model) = model_over(source);
    assert_eq!(model.row_count(), 2);
    assert_eq!(model.cell_value(1, 2), Some(AttributeValue::Text("c".into())));
}

#[test]
fn single_row_cache_fetches_once_per_feature() {
    let file = write_file("x,y,name\n1,1,a\n2,2,b\n");
    let counting = Arc::new(CountingSource {
        inner: provider(&file, ""),
        fetches: AtomicUsize::new(0),
    });
    let (_layer, model) = model_over(counting.clone());

    for column in 0..model.column_count() {
        model.cell_value(0, column);
    }
    assert_eq!(counting.fetches.load(Ordering::SeqCst), 1);

    model.cell_value(1, 2);
    model.cell_value(1, 0);
    assert_eq!(counting.fetches.load(Ordering::SeqCst), 2);

    model.cell_value(0, 2);
    assert_eq!(counting.fetches.load(Ordering::SeqCst), 3);
}

#[test]
fn editing_an_uncached_row_reads_back_without_fetching() {
    let file = write_file("x,y,name\n1,1,a\n2,2,b\n");
    let counting = Arc::new(CountingSource {
        inner: provider(&file, ""),
        fetches: AtomicUsize::new(0),
    });
    let (layer, mut model) = model_over(counting.clone());
    layer.start_editing();

    assert_eq!(model.cell_value(0, 2), Some(AttributeValue::Text("a".into())));
    assert!(model.set_cell_value(1, 2, "z".into()));

    let after_write = counting.fetches.load(Ordering::SeqCst);
    assert_eq!(model.cell_value(1, 2), Some(AttributeValue::Text("z".into())));
    assert_eq!(model.cell_value(1, 0), Some(AttributeValue::Integer(2)));
    assert_eq!(counting.fetches.load(Ordering::SeqCst), after_write);
}

#[test]
fn in_memory_model_never_fetches() {
    let file = write_file("x,y,name\n1,1,a\n2,2,b\n");
    let counting = Arc::new(CountingSource {
        inner: provider(&file, ""),
        fetches: AtomicUsize::new(0),
    });
    let layer = Arc::new(EditableLayer::new(counting.clone()));
    let model = AttributeTableModel::in_memory(layer);

    assert_eq!(model.cell_value(1, 2), Some(AttributeValue::Text("b".into())));
    assert_eq!(model.cell_value(0, 2), Some(AttributeValue::Text("a".into())));
    assert_eq!(counting.fetches.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_file_gives_an_empty_table() {
    let (_layer, mut model) = model_over(Arc::new(DelimitedTextProvider::new("/missing/points.csv")));
    assert_eq!(model.row_count(), 0);
    assert_eq!(model.column_count(), 0);
    assert!(!model.sort(0, SortOrder::Ascending));
}
