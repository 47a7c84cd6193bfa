pub mod delivery;
pub mod drivers;
pub mod live;
pub mod orders;
