mod clock;
mod geo;
mod keyed_lock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use geo::{haversine_km, EARTH_RADIUS_KM};
pub use keyed_lock::KeyedLocks;
