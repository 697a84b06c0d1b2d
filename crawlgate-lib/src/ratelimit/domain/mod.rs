#![allow(clippy::module_inception)]

mod bucket;
mod domain;
mod key;
mod stats;

pub use bucket::{Reservation, TokenBucket};
pub use domain::Domain;
pub use key::DomainKey;
pub use stats::{StatsAccumulator, StatsMap, StatsSnapshot};
