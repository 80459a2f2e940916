//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Login, profile and admin account management
//! - `otp` - OTP-gated registration and password reset
//! - `email` - Notification gateway and OTP email rendering
//! - `payment` - Payment callback signature verification
//! - `sweep` - Background purge of expired codes
//! - `clock` - Injectable time source

pub mod auth;
pub mod clock;
pub mod email;
pub mod otp;
pub mod payment;
pub mod sweep;
