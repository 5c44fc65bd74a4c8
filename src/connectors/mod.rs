pub mod http;
pub mod registry;
pub mod simulated;

pub use http::HttpProvider;
pub use registry::ProviderRegistry;
pub use simulated::SimulatedProvider;
