//! Product records stored alongside each vector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stock state of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    InStock,
    LowStock,
    OutOfStock,
}

impl Availability {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::LowStock => "low_stock",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_stock" => Ok(Self::InStock),
            "low_stock" => Ok(Self::LowStock),
            "out_of_stock" => Ok(Self::OutOfStock),
            other => Err(format!(
                "unknown availability '{other}'. Expected one of: in_stock, low_stock, out_of_stock"
            )),
        }
    }
}

/// A catalog item and its structured attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub brand: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub price: f64,

    #[serde(default)]
    pub colors: Vec<String>,

    #[serde(default)]
    pub styles: Vec<String>,

    #[serde(default)]
    pub occasions: Vec<String>,

    #[serde(default)]
    pub materials: Vec<String>,

    #[serde(default)]
    pub sizes: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub rating: f32,

    #[serde(default)]
    pub review_count: u32,

    #[serde(default)]
    pub availability: Availability,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,

    /// Popularity signal in [0, 1]; feeds the catalog trending set.
    #[serde(default)]
    pub trending_score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer_url: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Creates a record with only an id set; every other attribute takes its default.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: String::new(),
            description: String::new(),
            brand: String::new(),
            category: String::new(),
            price: 0.0,
            colors: Vec::new(),
            styles: Vec::new(),
            occasions: Vec::new(),
            materials: Vec::new(),
            sizes: Vec::new(),
            tags: Vec::new(),
            rating: 0.0,
            review_count: 0,
            availability: Availability::InStock,
            gender: None,
            season: None,
            trending_score: 0.0,
            image_url: None,
            retailer_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_colors<S: Into<String>>(mut self, colors: impl IntoIterator<Item = S>) -> Self {
        self.colors = colors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_styles<S: Into<String>>(mut self, styles: impl IntoIterator<Item = S>) -> Self {
        self.styles = styles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_trending_score(mut self, score: f32) -> Self {
        self.trending_score = score;
        self
    }

    /// Text used to embed this product: title, description, brand, category,
    /// colors, styles and tags joined by spaces.
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for part in [
            self.title.as_str(),
            self.description.as_str(),
            self.brand.as_str(),
            self.category.as_str(),
        ] {
            if !part.trim().is_empty() {
                parts.push(part);
            }
        }
        parts.extend(self.colors.iter().map(String::as_str));
        parts.extend(self.styles.iter().map(String::as_str));
        parts.extend(self.tags.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Partial update for a product's metadata.
///
/// Unset fields leave the stored value untouched. The id and the embedding
/// cannot be patched; changing the embedding requires remove + add.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occasions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trending_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer_url: Option<String>,
}

macro_rules! merge_fields {
    ($patch:expr, $record:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                $record.$field = value;
            }
        )+
    };
}

impl ProductPatch {
    /// Returns `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges set fields into `record` and bumps `updated_at`.
    pub fn apply(self, record: &mut ProductRecord) {
        merge_fields!(
            self,
            record,
            title,
            description,
            brand,
            category,
            price,
            colors,
            styles,
            occasions,
            materials,
            sizes,
            tags,
            rating,
            review_count,
            availability,
            trending_score,
        );

        if let Some(gender) = self.gender {
            record.gender = Some(gender);
        }
        if let Some(season) = self.season {
            record.season = Some(season);
        }
        if let Some(image_url) = self.image_url {
            record.image_url = Some(image_url);
        }
        if let Some(retailer_url) = self.retailer_url {
            record.retailer_url = Some(retailer_url);
        }

        record.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_wire_format() {
        let json = serde_json::to_string(&Availability::LowStock).unwrap();
        assert_eq!(json, "\"low_stock\"");
        assert_eq!(
            "OUT_OF_STOCK".parse::<Availability>().unwrap(),
            Availability::OutOfStock
        );
        assert!("sold".parse::<Availability>().is_err());
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record: ProductRecord =
            serde_json::from_str(r#"{"id": "product_1", "brand": "Zara", "price": 49.9}"#).unwrap();
        assert_eq!(record.id, "product_1");
        assert_eq!(record.brand, "Zara");
        assert_eq!(record.availability, Availability::InStock);
        assert!(record.colors.is_empty());
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut record = ProductRecord::new("p1")
            .with_brand("Zara")
            .with_price(40.0)
            .with_styles(["casual"]);
        let before = record.updated_at;

        let patch = ProductPatch {
            price: Some(35.0),
            season: Some("summer".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut record);

        assert_eq!(record.price, 35.0);
        assert_eq!(record.brand, "Zara");
        assert_eq!(record.styles, vec!["casual"]);
        assert_eq!(record.season.as_deref(), Some("summer"));
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result: Result<ProductPatch, _> = serde_json::from_str(r#"{"id": "other"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_embedding_text_skips_empty_parts() {
        let record = ProductRecord::new("p1")
            .with_title("Linen shirt")
            .with_brand("COS")
            .with_colors(["white"]);
        assert_eq!(record.embedding_text(), "Linen shirt COS white");
    }
}
