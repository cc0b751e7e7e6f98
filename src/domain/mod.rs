pub mod amounts;
pub mod period;
pub mod validation;
