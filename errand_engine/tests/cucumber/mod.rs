mod errand_world;
mod setups;
mod steps;

pub use errand_world::ErrandWorld;
