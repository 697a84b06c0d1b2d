//! `test-utils` is used for testing in both `crawlgate-lib` and `crawlgate-bin`.
//! This crate does not depend on `crawlgate-lib` or `crawlgate-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Build a validated `LimitConfig` from a rate and a burst capacity
///
/// # Panic
///
/// This panics if the configuration is invalid, so it should only be used for
/// testing
#[macro_export]
macro_rules! limit {
    ($rate:expr, $burst:expr $(,)?) => {
        LimitConfig::new($rate, $burst).expect("Expected valid limit configuration")
    };
}

/// Assert that a duration lies within `tolerance` of the expected value.
///
/// Both bounds are inclusive. Durations are compared as whole milliseconds
/// in the failure message to keep it readable.
#[macro_export]
macro_rules! assert_duration_near {
    ($actual:expr, $expected:expr, $tolerance:expr $(,)?) => {{
        let actual: std::time::Duration = $actual;
        let expected: std::time::Duration = $expected;
        let tolerance: std::time::Duration = $tolerance;
        let lower = expected.saturating_sub(tolerance);
        let upper = expected + tolerance;
        assert!(
            actual >= lower && actual <= upper,
            "expected {}ms (±{}ms), got {}ms",
            expected.as_millis(),
            tolerance.as_millis(),
            actual.as_millis()
        );
    }};
}

/// Assert that two floating point values are equal within `epsilon`
#[macro_export]
macro_rules! assert_approx {
    ($actual:expr, $expected:expr $(,)?) => {
        $crate::assert_approx!($actual, $expected, 1e-9)
    };
    ($actual:expr, $expected:expr, $epsilon:expr $(,)?) => {{
        let actual: f64 = $actual;
        let expected: f64 = $expected;
        assert!(
            (actual - expected).abs() <= $epsilon,
            "expected {expected} (±{}), got {actual}",
            $epsilon
        );
    }};
}

/// Get the path to the `fixtures` directory.
#[macro_export]
macro_rules! fixtures_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .join("fixtures")
    };
}

/// Loads a fixture from the `fixtures` directory
#[macro_export]
macro_rules! load_fixture {
    ($filename:expr) => {{
        let path = $crate::fixtures_path!().join($filename);
        std::fs::read_to_string(path).unwrap()
    }};
}
