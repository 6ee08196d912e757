//! Argument byte budget for a single process invocation.

use crate::constants::{POSIX_ARG_HEADROOM, POSIX_ARG_MAX, WINDOWS_MAX_ARGUMENT_BYTES};
use crate::env::Env;

/// Platform family that determines how the argument limit is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }
}

/// Byte length of a string as passed to the OS (UTF-8).
pub fn size_of(value: &str) -> usize {
    value.len()
}

/// Total size of the environment, counting each entry as `KEY=VALUE`.
pub fn size_of_environment(env: &Env) -> usize {
    env.vars()
        .iter()
        .map(|(key, value)| size_of(key) + 1 + size_of(value))
        .sum()
}

/// Maximum total byte length of one process's argument vector.
///
/// The environment shares the `ARG_MAX` space with argv on POSIX systems,
/// so its size is subtracted. Windows has a flat command-line ceiling.
pub fn max_argument_bytes(platform: Platform, env: &Env) -> usize {
    match platform {
        Platform::Windows => WINDOWS_MAX_ARGUMENT_BYTES,
        Platform::Posix => POSIX_ARG_MAX
            .saturating_sub(POSIX_ARG_HEADROOM)
            .saturating_sub(size_of_environment(env)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_of_counts_utf8_bytes() {
        assert_eq!(size_of("abc"), 3);
        assert_eq!(size_of("é"), 2);
        assert_eq!(size_of("日本"), 6);
    }

    #[test]
    fn environment_size_includes_equals_sign() {
        let env = Env::mock([("A", "1"), ("PATH", "/bin")]);
        assert_eq!(size_of_environment(&env), "A=1".len() + "PATH=/bin".len());
    }

    #[test]
    fn windows_budget_is_fixed() {
        let env = Env::mock([("HUGE", "x".repeat(10_000))]);
        assert_eq!(max_argument_bytes(Platform::Windows, &env), 8_191);
    }

    #[test]
    fn posix_budget_subtracts_environment() {
        let env = Env::mock([("KEY", "VALUE")]);
        assert_eq!(
            max_argument_bytes(Platform::Posix, &env),
            131_072 - 2_048 - "KEY=VALUE".len()
        );
    }

    #[test]
    fn posix_budget_with_empty_environment() {
        let env = Env::mock(Vec::<(&str, &str)>::new());
        assert_eq!(max_argument_bytes(Platform::Posix, &env), 129_024);
    }

    #[test]
    fn posix_budget_saturates_at_zero() {
        let env = Env::mock([("BIG", "x".repeat(200_000))]);
        assert_eq!(max_argument_bytes(Platform::Posix, &env), 0);
    }
}
