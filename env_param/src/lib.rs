//! Global tuning parameters initialized from environment variables.
//!
//! The [`EnvParam`] type couples the name of an environment variable with a
//! default value. It is meant for knobs that are too obscure to deserve a
//! command-line flag but that one still wants to flip when experimenting.
//!
//! ```
//! use env_param::EnvParam;
//! static WIDTH: EnvParam<u32> = EnvParam::new("VELA_WIDTH", "16");
//!
//! fn main() {
//!     // the variable is not set: the default applies
//!     assert_eq!(WIDTH.get(), 16);
//! }
//! ```
//!
//! The value is resolved once, on first access. Setting the environment
//! variable after the first read has no effect. [`EnvParam::set`] forces the
//! value programmatically and panics if the parameter was already resolved.

use std::str::FromStr;

use once_cell::sync::OnceCell;

/// A parameter that reads its value from the environment on first access.
pub struct EnvParam<T> {
    value: OnceCell<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    /// Declares a parameter bound to the environment variable `env`,
    /// with the textual `default` used when the variable is absent.
    pub const fn new(env: &'static str, default: &'static str) -> Self {
        EnvParam {
            value: OnceCell::new(),
            env,
            default,
        }
    }
}

impl<T: FromStr> EnvParam<T>
where
    <T as FromStr>::Err: std::fmt::Debug,
{
    /// Returns the value of the parameter, resolving it if needed.
    ///
    /// # Panics
    ///
    /// Panics if the environment variable is set to a string that does not
    /// parse as a `T`.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.value.get_or_init(|| {
            let source = std::env::var(self.env).unwrap_or_else(|_| self.default.to_string());
            source
                .parse::<T>()
                .unwrap_or_else(|e| panic!("Unreadable value for parameter {}: {:?}", self.env, e))
        })
    }

    /// Forces the value of the parameter.
    ///
    /// # Panics
    ///
    /// Panics if the parameter was already resolved (from a previous `get` or `set`).
    pub fn set(&self, value: T)
    where
        T: std::fmt::Debug,
    {
        if self.value.set(value).is_err() {
            panic!("Parameter {} was already initialized", self.env);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DEFAULTED: EnvParam<i64> = EnvParam::new("VELA_TEST_UNSET_PARAM", "42");
    static FORCED: EnvParam<bool> = EnvParam::new("VELA_TEST_FORCED_PARAM", "false");

    #[test]
    fn default_applies_when_env_is_unset() {
        assert_eq!(DEFAULTED.get(), 42);
    }

    #[test]
    fn set_takes_precedence_over_default() {
        FORCED.set(true);
        assert!(FORCED.get());
    }
}
