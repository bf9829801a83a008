pub mod accuracy;
pub mod factor;
pub mod forecast;
pub mod fuel;
pub mod region;

pub use accuracy::AccuracyRecord;
pub use factor::{Factor, FactorCategory, FactorObservation};
pub use forecast::{ForecastPath, ForecastPoint};
pub use fuel::{default_fuel_profiles, FuelProfile, FuelType};
pub use region::{default_region_profiles, RegionProfile, NATIONAL_REGION_CODE};
