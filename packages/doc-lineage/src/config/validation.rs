//! Configuration validation

use super::error::ConfigResult;

/// Trait for validatable configuration sections
pub trait Validatable {
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Section name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

/// Check `value` lies in `min..=max`
pub(crate) fn check_range(
    field: &str,
    value: u64,
    min: u64,
    max: u64,
    hint: &str,
) -> ConfigResult<()> {
    if value < min || value > max {
        return Err(super::ConfigError::range_with_hint(
            field, value, min, max, hint,
        ));
    }
    Ok(())
}
