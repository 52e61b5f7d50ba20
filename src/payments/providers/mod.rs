//! Payment provider implementations
//!
//! Concrete implementations of the PaymentGateway trait for each provider.

pub mod easykash;
pub mod paymob;
pub mod tap;

pub use easykash::EasyKashGateway;
pub use paymob::PaymobGateway;
pub use tap::TapGateway;
