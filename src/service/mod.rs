//! Record services shared by the handlers: validation and input sanitisation.

pub mod sanitize;
pub mod validation;

pub use sanitize::sanitize_record;
pub use validation::{validate_record, ValidationMode};
