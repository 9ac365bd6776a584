//! Vendor clients.
//!
//! A `ProviderClient` submits a long-running generation task to a vendor and
//! reports its state on request. Vendor-specific request signing and payload
//! shapes stay inside each client.

mod registry;
mod types;
mod volcengine_tts;

pub use registry::{ProviderRegistry, ResolvedProvider};
pub use types::*;
pub use volcengine_tts::VolcengineTtsClient;
