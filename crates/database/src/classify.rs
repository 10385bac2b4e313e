use crate::error::DbError;
use std::collections::HashSet;

/// The retry-relevant severity of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected to resolve on its own; the attempt may be retried.
    Transient,
    /// Will not improve on retry; the operation must abort.
    Fatal,
}

/// PostgreSQL SQLSTATEs that indicate a transient infrastructure condition:
/// serialization failures, deadlocks, resource exhaustion, and connection
/// exceptions. Query cancellation (57014) is deliberately absent.
pub const PG_TRANSIENT_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "53000", // insufficient_resources
    "53100", // disk_full
    "53200", // out_of_memory
    "53300", // too_many_connections
    "55P03", // lock_not_available
    "57P03", // cannot_connect_now
    "08000", // connection_exception
    "08003", // connection_does_not_exist
    "08006", // connection_failure
];

/// Maps database errors to a severity by their vendor error code.
///
/// The transient set is supplied at construction so the same retry executor
/// works across database engines; `Default` carries the PostgreSQL set.
/// Classification is pure and total: a database error whose code is in the
/// set is `Transient`, everything else — other codes, errors without a code,
/// credential failures, malformed connection strings, cancellation — is
/// `Fatal`.
#[derive(Debug, Clone)]
pub struct ExceptionClassifier {
    transient_codes: HashSet<String>,
}

impl ExceptionClassifier {
    pub fn new<I, S>(transient_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transient_codes: transient_codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, error: &DbError) -> Severity {
        match error.vendor_code() {
            Some(code) if self.transient_codes.contains(&code) => Severity::Transient,
            _ => Severity::Fatal,
        }
    }
}

impl Default for ExceptionClassifier {
    fn default() -> Self {
        Self::new(PG_TRANSIENT_CODES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::database_error_with_code;
    use credentials::CredentialError;

    #[test]
    fn a_code_in_the_transient_set_is_transient() {
        let classifier = ExceptionClassifier::default();
        let error = database_error_with_code("40P01");
        assert_eq!(classifier.classify(&error), Severity::Transient);
    }

    #[test]
    fn a_code_outside_the_set_is_fatal() {
        let classifier = ExceptionClassifier::default();
        // 42601 is a syntax error; retrying it is pointless.
        let error = database_error_with_code("42601");
        assert_eq!(classifier.classify(&error), Severity::Fatal);
    }

    #[test]
    fn non_database_errors_are_fatal() {
        let classifier = ExceptionClassifier::default();

        let credential = DbError::Credential(CredentialError::Unavailable("no token".to_string()));
        assert_eq!(classifier.classify(&credential), Severity::Fatal);

        let malformed = DbError::MalformedConnectionString("garbage".to_string());
        assert_eq!(classifier.classify(&malformed), Severity::Fatal);

        assert_eq!(classifier.classify(&DbError::Cancelled), Severity::Fatal);
    }

    #[test]
    fn the_transient_set_is_configurable_per_backend() {
        // A vendor whose only transient condition is code 1205.
        let classifier = ExceptionClassifier::new(["1205"]);
        assert_eq!(
            classifier.classify(&database_error_with_code("1205")),
            Severity::Transient
        );
        assert_eq!(
            classifier.classify(&database_error_with_code("40P01")),
            Severity::Fatal
        );
    }
}
