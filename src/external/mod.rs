//! Outbound HTTP plumbing shared by the messaging transports.

pub mod client;

pub use client::HTTP_CLIENT;
