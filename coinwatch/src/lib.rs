pub mod api;
pub mod providers;

pub use api::{ApiServer, ApiServerConfig};
pub use providers::{BinanceProvider, CoinGeckoProvider, ProviderSettings};
