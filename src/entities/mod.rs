pub mod delivery_order;
pub mod driver;
pub mod driver_rejection;
pub mod order_pickup;
pub mod restaurant;
