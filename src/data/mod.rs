//! Data module - table loading and normalization

mod loader;
mod processor;
mod window;
mod zip_code;

pub use loader::{column_names, ensure_exists, infer_separator, DataLoader, LoaderError};
pub use processor::{
    DataProcessor, DuplicatePolicy, NormalizedPrices, ProcessorError, RentalNormalized,
    SalesColumns, SalesNormalized,
};
pub use window::{TimeWindow, WindowError};
pub use zip_code::{ZipCode, ZipCodeError, ZIP_WIDTH};
