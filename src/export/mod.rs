/// JSON records of decoded models
#[cfg(feature = "json")]
pub mod json;
