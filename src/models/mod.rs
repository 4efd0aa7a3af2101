pub mod diamond;
pub mod money;
pub mod price;
pub mod quotation;

pub use diamond::{DiamondInput, DiamondPayload, DiamondVariant, Millimeters, VALID_SHAPES};
pub use money::round2;
pub use price::MetalPriceTable;
pub use quotation::{
    diamond_total, DiamondItem, Identification, MetalItem, MetalSummaryRow, Quotation,
    SaveQuotationRequest, Summary,
};
