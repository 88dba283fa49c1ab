pub mod nurse;
pub mod offer;
pub mod order;
