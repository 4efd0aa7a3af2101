pub mod catalog;
pub mod images;
pub mod propagation;
pub mod quotation;

pub use catalog::{CatalogService, DiamondUpdateOutcome, PriceUpdateOutcome};
pub use images::{BlobImageHost, ImageError, ImageHost};
pub use propagation::{PriceEngine, PropagationError, PropagationFailure, PropagationReport, ALL_QUOTATIONS};
pub use quotation::{ListQuery, QuotationPage, QuotationService, SaveOutcome};
