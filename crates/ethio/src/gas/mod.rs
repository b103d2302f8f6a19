//! Gas price estimation from periodic network samples.

mod adjuster;
mod task;

pub use adjuster::GasPriceAdjuster;
pub use task::{gas_price_task, spawn_gas_price_task, GasPriceHandle};
