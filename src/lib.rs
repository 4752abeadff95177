pub mod appraisal;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod ledger;
pub mod records;
pub mod resolver;
pub mod service;
pub mod signature;
pub mod types;
pub mod utils;
