#![deny(clippy::all)]

pub mod config;
pub mod exec;
pub mod interp;
pub mod judger;
pub mod lang;
pub mod store;
pub mod structural;
pub mod value;

pub use self::config::Config;
pub use self::judger::Grader;
pub use self::store::{AttemptRecord, MemoryVerdictStore, VerdictStore};
pub use self::value::Value;
