//! Namespaced, environment-gated diagnostic logger (§4.13, §4.17).
//!
//! Deliberately not built on `tracing`/`log`: the `DEBUG=ns1,ns2`
//! comma-namespace gate is a documented external contract (callers set
//! `DEBUG`), and swapping in `RUST_LOG`-style filtering would silently
//! change that contract. Two namespaces are used by the engine:
//! `xsd-validator` and `api/validate`.

pub struct Logger {
    namespace: &'static str,
}

/// Construct a logger for `namespace`. Cheap to call repeatedly; the
/// environment is re-read on every log call rather than cached, matching
/// the documented contract that `DEBUG` can change between calls in tests.
pub fn logger(namespace: &'static str) -> Logger {
    Logger { namespace }
}

impl Logger {
    pub fn log(&self, args: std::fmt::Arguments<'_>) {
        if is_enabled(self.namespace) {
            eprintln!("[{}] {}", self.namespace, args);
        }
    }

    pub fn is_enabled(&self) -> bool {
        is_enabled(self.namespace)
    }
}

#[macro_export]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log(format_args!($($arg)*))
    };
}

fn is_enabled(namespace: &str) -> bool {
    let Ok(debug) = std::env::var("DEBUG") else {
        return false;
    };
    if debug.trim() == "*" {
        return true;
    }
    debug.split(',').map(str::trim).any(|ns| ns == namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_enables_everything() {
        unsafe { std::env::set_var("DEBUG", "*") };
        assert!(is_enabled("xsd-validator"));
        assert!(is_enabled("anything"));
        unsafe { std::env::remove_var("DEBUG") };
    }

    #[test]
    fn comma_list_matches_exact_namespace() {
        unsafe { std::env::set_var("DEBUG", "api/validate, other") };
        assert!(is_enabled("api/validate"));
        assert!(is_enabled("other"));
        assert!(!is_enabled("xsd-validator"));
        unsafe { std::env::remove_var("DEBUG") };
    }

    #[test]
    fn unset_disables() {
        unsafe { std::env::remove_var("DEBUG") };
        assert!(!is_enabled("xsd-validator"));
    }
}
