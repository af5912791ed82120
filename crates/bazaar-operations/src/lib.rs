pub mod install;
pub mod recommend;
pub mod remove;
pub mod search;
pub mod service;
pub mod types;
pub mod update;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
pub(crate) mod test_utils;

pub use recommend::{Reason, Recommendation, Recommender, UserContext};
pub use service::Service;
pub use types::*;
