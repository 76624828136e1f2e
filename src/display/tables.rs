//! Table formatting for CLI output.

use comfy_table::{
    Attribute, Cell, CellAlignment, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::catalog::ProductRecord;
use crate::search::SearchResponse;
use crate::vector::IndexStats;

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
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Right-aligns the numeric columns at `indices`.
    pub fn align_right(mut self, indices: &[usize]) -> Self {
        for &index in indices {
            if let Some(column) = self.table.column_mut(index) {
                column.set_cell_alignment(CellAlignment::Right);
            }
        }
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked results, one row per product.
pub fn results_table(response: &SearchResponse) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "#", "Id", "Title", "Brand", "Price", "Similarity", "Score",
    ]);

    for (rank, result) in response.products.iter().enumerate() {
        let product = &result.product;
        builder = builder.add_row(vec![
            (rank + 1).to_string(),
            product.id.clone(),
            product.title.clone(),
            product.brand.clone(),
            format!("{:.2}", product.price),
            format!("{:.4}", result.similarity_score),
            format!("{:.4}", result.final_score()),
        ]);
    }

    builder.align_right(&[0, 4, 5, 6]).build()
}

/// Attribute listing of one product.
pub fn product_table(product: &ProductRecord) -> String {
    let join = |values: &[String]| values.join(", ");
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("Field").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec!["Id", product.id.as_str()]);
    table.add_row(vec!["Title", product.title.as_str()]);
    table.add_row(vec!["Brand", product.brand.as_str()]);
    table.add_row(vec!["Category", product.category.as_str()]);
    table.add_row(vec!["Price", &format!("{:.2}", product.price)]);
    table.add_row(vec!["Colors", &join(&product.colors)]);
    table.add_row(vec!["Styles", &join(&product.styles)]);
    table.add_row(vec!["Availability", product.availability.as_str()]);
    table.add_row(vec!["Trending score", &format!("{:.2}", product.trending_score)]);
    if let Some(url) = &product.image_url {
        table.add_row(vec!["Image", url.as_str()]);
    }

    table.to_string()
}

pub fn stats_table(stats: &IndexStats) -> String {
    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Live vectors".to_string(), stats.live_vectors.to_string()])
        .add_row(vec!["Tombstones".to_string(), stats.tombstones.to_string()])
        .add_row(vec!["Total slots".to_string(), stats.total_slots.to_string()])
        .add_row(vec!["Dimension".to_string(), stats.dimension.to_string()])
        .add_row(vec!["Epoch".to_string(), stats.epoch.to_string()])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchResult;
    use crate::vector::Slot;

    fn result(id: &str, title: &str, score: f32) -> SearchResult {
        SearchResult {
            product: ProductRecord::new(id).with_title(title),
            similarity_score: score,
            adjusted_score: None,
            slot: Slot::new(0),
        }
    }

    #[test]
    fn test_results_table_lists_products_in_rank_order() {
        let response = SearchResponse {
            products: vec![
                result("p1", "Linen shirt", 0.91),
                result("p2", "Wool coat", 0.42),
            ],
            ..Default::default()
        };
        let rendered = results_table(&response);

        let first = rendered.find("Linen shirt").unwrap();
        let second = rendered.find("Wool coat").unwrap();
        assert!(first < second);
        assert!(rendered.contains("0.9100"));
    }

    #[test]
    fn test_stats_table() {
        let rendered = stats_table(&IndexStats {
            total_slots: 5,
            live_vectors: 3,
            tombstones: 2,
            dimension: 512,
            epoch: 1,
        });
        assert!(rendered.contains("Tombstones"));
        assert!(rendered.contains("512"));
    }
}
