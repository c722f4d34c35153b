//! Known-merchant reference data.

mod builtin;
mod db;
mod model;

pub use db::MerchantDatabase;
pub(crate) use db::normalize_name;
pub use model::{Merchant, MerchantCategory};
