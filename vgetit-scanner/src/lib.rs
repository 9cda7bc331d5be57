pub mod bundle;
pub mod error;
pub mod extractor;

pub use bundle::{Confidence, ContactEntry, Extraction, FactBundle, PhoneEntry};
pub use error::ExtractError;
pub use extractor::{FactExtractor, FallbackExtractor, HttpExtractor};
