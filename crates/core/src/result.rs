//! Result type definition and extension traits.
//!
//! Provides combinators for Result types, enabling clean error handling
//! without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for factory operations.
///
/// ```ignore
/// fn decode(body: &str) -> Result<Order> {
///     Order::from_json(body)
/// }
///
/// let order = decode(body).into_option_logged();
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for consuming Results without unwrap.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_ok_into_some() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.into_option_logged(), Some(42));
    }

    #[test]
    fn should_convert_err_into_none() {
        let result: Result<i32> = Err(Error::invalid_record("bad"));
        assert_eq!(result.into_option_logged(), None);
    }
}
