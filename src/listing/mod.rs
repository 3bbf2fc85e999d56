pub mod confidence;
pub mod features;
pub mod models;

pub use confidence::{Aspect, ConfidenceError, ConfidenceScore};
pub use features::{ImageInsights, ProductFeatures};
pub use models::{
    BuyingMode, ContentSummary, GeneratedContent, ItemCondition, ListingAttribute, ListingType,
    Price, PriceRange, ProductImage, ProviderMetadata, SaleTerm, ShippingInfo,
};
