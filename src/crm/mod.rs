pub mod client;
pub mod envelope;

pub use client::{encode_uri, ApiRequest, CrmClient};
pub use envelope::{ApiEnvelope, ApiFailure};
