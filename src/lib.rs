//! Multi-gateway payment layer for the academy platform
//!
//! One contract over Paymob, EasyKash and Tap: create and verify payments,
//! check and parse webhooks, refund, void and charge saved cards.

pub mod config;
pub mod error;
pub mod payments;
