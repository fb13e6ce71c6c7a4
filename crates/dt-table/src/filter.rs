//! Row filter on top of an attribute table model

use dt_core::AttributeValue;

use crate::model::{AttributeTableModel, SortOrder};

/// Presents a subset of the rows of an [`AttributeTableModel`]
#[derive(Debug)]
pub struct AttributeTableFilterModel {
    model: AttributeTableModel,
    hide_unselected: bool,
}

impl AttributeTableFilterModel {
    pub fn new(model: AttributeTableModel) -> Self {
        Self {
            model,
            hide_unselected: false,
        }
    }

    pub fn source_model(&self) -> &AttributeTableModel {
        &self.model
    }

    pub fn source_model_mut(&mut self) -> &mut AttributeTableModel {
        &mut self.model
    }

    pub fn into_source_model(self) -> AttributeTableModel {
        self.model
    }

    pub fn hide_unselected(&self) -> bool {
        self.hide_unselected
    }

    /// Show only rows whose feature is selected in the layer
    pub fn set_hide_unselected(&mut self, hide: bool) {
        self.hide_unselected = hide;
    }

    /// Whether a source row is visible
    pub fn accepts_row(&self, source_row: usize) -> bool {
        let Some(id) = self.model.row_to_id(source_row) else {
            return false;
        };
        !self.hide_unselected || self.model.layer().selected_feature_ids().contains(&id)
    }

    /// Visible source rows in display order
    pub fn visible_rows(&self) -> Vec<usize> {
        if !self.hide_unselected {
            return (0..self.model.row_count()).collect();
        }
        let selected = self.model.layer().selected_feature_ids();
        self.model
            .row_ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| selected.contains(*id))
            .map(|(row, _)| row)
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.visible_rows().len()
    }

    pub fn column_count(&self) -> usize {
        self.model.column_count()
    }

    /// Source row shown at `row`
    pub fn map_to_source(&self, row: usize) -> Option<usize> {
        self.visible_rows().get(row).copied()
    }

    pub fn cell_value(&self, row: usize, column: usize) -> Option<AttributeValue> {
        self.model.cell_value(self.map_to_source(row)?, column)
    }

    pub fn sort(&mut self, column: usize, order: SortOrder) -> bool {
        self.model.sort(column, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::EditableLayer;
    use dt_data::DelimitedTextProvider;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hide_unselected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"x,y,v\n0,0,c\n1,1,a\n2,2,b\n").unwrap();
        file.flush().unwrap();
        let provider = DelimitedTextProvider::new(&file.path().display().to_string());
        let layer = Arc::new(EditableLayer::new(Arc::new(provider)));
        let mut filter = AttributeTableFilterModel::new(AttributeTableModel::new(layer.clone()));

        assert_eq!(filter.row_count(), 3);

        layer.select_features(vec![0, 2], true);
        filter.set_hide_unselected(true);
        assert_eq!(filter.visible_rows(), vec![0, 2]);
        assert!(!filter.accepts_row(1));
        assert!(!filter.accepts_row(5));

        assert!(filter.sort(2, SortOrder::Ascending));
        // rows are now a(1), b(2), c(0)
        assert_eq!(filter.visible_rows(), vec![1, 2]);
        assert_eq!(filter.cell_value(0, 2), Some(AttributeValue::Text("b".into())));
        assert_eq!(filter.cell_value(2, 2), None);

        filter.set_hide_unselected(false);
        assert_eq!(filter.row_count(), 3);
    }
}
