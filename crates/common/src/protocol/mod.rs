mod delivery;
mod result;

pub use delivery::Delivery;
pub use result::DeliveryResult;
