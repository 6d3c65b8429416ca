//! Utility functions and helpers.

pub mod preflight;
pub mod settings;

pub use preflight::{check_credentials, CredentialInfo};
pub use settings::{get_credentials, Settings};
