//! Structured search filters applied by the ranking pipeline.

use serde::{Deserialize, Serialize};

use crate::catalog::{Availability, ProductRecord};

/// Optional constraints on product attributes.
///
/// Filters are conjunctive across keys; an absent key leaves the attribute
/// unconstrained. String comparisons are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brands: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,

    /// Matches when any product color is listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,

    /// Matches when any product style is listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    pub fn with_brands<S: Into<String>>(mut self, brands: impl IntoIterator<Item = S>) -> Self {
        self.brands = Some(brands.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_categories<S: Into<String>>(
        mut self,
        categories: impl IntoIterator<Item = S>,
    ) -> Self {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_colors<S: Into<String>>(mut self, colors: impl IntoIterator<Item = S>) -> Self {
        self.colors = Some(colors.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_styles<S: Into<String>>(mut self, styles: impl IntoIterator<Item = S>) -> Self {
        self.styles = Some(styles.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = Some(availability);
        self
    }

    /// Returns `true` when `product` satisfies every provided constraint.
    pub fn matches(&self, product: &ProductRecord) -> bool {
        if let Some(min) = self.price_min
            && product.price < min
        {
            return false;
        }
        if let Some(max) = self.price_max
            && product.price > max
        {
            return false;
        }
        if let Some(brands) = &self.brands
            && !contains_ignore_case(brands, &product.brand)
        {
            return false;
        }
        if let Some(categories) = &self.categories
            && !contains_ignore_case(categories, &product.category)
        {
            return false;
        }
        if let Some(colors) = &self.colors
            && !overlaps_ignore_case(colors, &product.colors)
        {
            return false;
        }
        if let Some(styles) = &self.styles
            && !overlaps_ignore_case(styles, &product.styles)
        {
            return false;
        }
        if let Some(availability) = self.availability
            && product.availability != availability
        {
            return false;
        }
        true
    }
}

/// Unicode-aware lowercase form used for every attribute comparison.
fn fold(value: &str) -> String {
    value.to_lowercase()
}

pub(crate) fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    let needle = fold(needle);
    haystack.iter().any(|item| fold(item) == needle)
}

pub(crate) fn overlaps_ignore_case(wanted: &[String], present: &[String]) -> bool {
    present.iter().any(|p| contains_ignore_case(wanted, p))
}

/// Number of distinct entries of `present` that also appear in `wanted`.
pub(crate) fn overlap_count_ignore_case(wanted: &[String], present: &[String]) -> usize {
    let mut seen: Vec<String> = Vec::new();
    for p in present {
        let lowered = fold(p);
        if contains_ignore_case(wanted, p) && !seen.contains(&lowered) {
            seen.push(lowered);
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(brand: &str, price: f64) -> ProductRecord {
        ProductRecord::new(format!("{brand}-{price}"))
            .with_brand(brand)
            .with_price(price)
            .with_category("dresses")
            .with_colors(["Black", "red"])
            .with_styles(["minimalist"])
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let filters = SearchFilters::default();
        assert!(filters.is_empty());
        assert!(filters.matches(&product("Zara", 10.0)));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let filters = SearchFilters::default()
            .with_price_range(Some(50.0), Some(100.0))
            .with_brands(["Zara"]);

        assert!(filters.matches(&product("zara", 50.0)));
        assert!(filters.matches(&product("ZARA", 100.0)));
        assert!(!filters.matches(&product("Zara", 49.99)));
        assert!(!filters.matches(&product("Zara", 100.01)));
        assert!(!filters.matches(&product("Mango", 75.0)));
    }

    #[test]
    fn test_color_and_style_overlap() {
        let p = product("COS", 80.0);
        assert!(SearchFilters::default().with_colors(["black"]).matches(&p));
        assert!(
            SearchFilters::default()
                .with_colors(["green", "RED"])
                .matches(&p)
        );
        assert!(!SearchFilters::default().with_colors(["green"]).matches(&p));
        assert!(
            !SearchFilters::default()
                .with_styles(["gothic"])
                .matches(&p)
        );
    }

    #[test]
    fn test_category_and_availability() {
        let p = product("COS", 80.0).with_availability(Availability::LowStock);
        assert!(
            SearchFilters::default()
                .with_categories(["Dresses"])
                .matches(&p)
        );
        assert!(
            !SearchFilters::default()
                .with_availability(Availability::InStock)
                .matches(&p)
        );
    }

    #[test]
    fn test_case_folding_covers_non_ascii() {
        let p = ProductRecord::new("x")
            .with_brand("Hermès")
            .with_category("Écharpes")
            .with_colors(["Émeraude"]);

        assert!(SearchFilters::default().with_brands(["HERMÈS"]).matches(&p));
        assert!(
            SearchFilters::default()
                .with_categories(["écharpes"])
                .matches(&p)
        );
        assert!(
            SearchFilters::default()
                .with_colors(["ÉMERAUDE"])
                .matches(&p)
        );
        assert!(!SearchFilters::default().with_brands(["Hermes"]).matches(&p));
    }

    #[test]
    fn test_overlap_count_counts_distinct_matches() {
        let wanted = vec!["casual".to_string(), "vintage".to_string()];
        let present = vec![
            "Casual".to_string(),
            "casual".to_string(),
            "vintage".to_string(),
            "formal".to_string(),
        ];
        assert_eq!(overlap_count_ignore_case(&wanted, &present), 2);
    }
}
