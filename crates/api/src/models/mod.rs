//! Domain models for the API.
//!
//! These types represent validated domain objects separate from database row types.

pub mod order;
pub mod otp;
pub mod session;
pub mod user;

pub use order::{NewOrder, Order, OrderItem, PaymentResult, ShippingAddress, StatusUpdate, Tracking};
pub use otp::{NewOtp, OtpRecord, RegistrationPayload};
pub use session::CurrentUser;
pub use user::{NewUser, User, UserChanges, UserPage, UserQuery};
