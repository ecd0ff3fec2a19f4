//! Provider clients and the studio controller that drives prompt batches,
//! refinements and exports.

pub mod adapter;
pub mod export;
pub mod extract;
mod http;
pub mod observers;
pub mod providers;
pub mod studio;

pub use adapter::{GenerativeProvider, ProviderAdapter, ProviderError, ProviderRoute};
pub use export::{ExportMode, ExportReport};
pub use http::error_chain_text;
pub use observers::{EventLogObserver, StoreObserver, StudioEvent, StudioObserver};
pub use studio::{Activity, BatchReport, RefinementOutcome, Studio, StudioError, StudioSnapshot};
