//! Reference data: ISO countries and canonical city names.

mod countries;
mod geo;

pub use countries::{Country, CountryTable};
pub use geo::{CityRecord, GeoReference, LazyReference, ReferenceStats, prefix_bucket};
