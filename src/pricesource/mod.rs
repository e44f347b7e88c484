// Price source: the outbound API the monitor and chat flow read prices from.

pub mod keepa;
pub mod traits;

pub use keepa::KeepaClient;
pub use traits::PriceSource;
