pub mod blob;
pub mod catalog;
pub mod document;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod prices;
pub mod quotations;

pub use blob::{BlobError, BlobStore, FileBlobStore, MemoryBlobStore};
pub use catalog::CatalogRepository;
pub use document::{Document, DocumentStore, StoreError, WriteBatch, WriteOp};
pub use memory::MemoryDocumentStore;
pub use pool::create_pool;
pub use postgres::PgDocumentStore;
pub use prices::PriceRepository;
pub use quotations::{Line, QuotationHeader, QuotationRepository, StorageMode};
