//! Market data: bar series, providers, and the parallel loader.

pub mod cache;
pub mod csv_store;
pub mod provider;
pub mod series;
pub mod synthetic;

pub use cache::{ParquetStore, StoreLayout};
pub use csv_store::CsvProvider;
pub use provider::{
    load_market_data, DataError, DataProvider, DataSource, InMemoryProvider, UnsupportedSource,
};
pub use series::{parse_timestamp, BarSeries, MarketData};
pub use synthetic::{business_days, SyntheticProvider};
