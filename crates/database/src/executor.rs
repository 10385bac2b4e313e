use crate::authenticator::authenticate;
use crate::classify::{ExceptionClassifier, Severity};
use crate::connection_string::ConnectionSpec;
use crate::error::{DbError, ServiceError};
use configuration::{DatabaseSettings, Settings};
use credentials::CredentialProvider;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection, PgConnection, Postgres};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The attempt budget and backoff parameters for one executor instance.
///
/// `max_retries` counts retries after the original attempt, so the total
/// attempt budget is `max_retries + 1`. Backoff is exponential with jitter;
/// a zero base delay disables the wait entirely.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }

    pub fn with_backoff(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay_ms: settings.retry_base_delay_ms,
            max_delay_ms: settings.retry_max_delay_ms,
        }
    }

    /// Total attempts: the original one plus the configured retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The delay before the attempt that follows failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(multiplier);
        // Jitter up to half the base delay, so synchronized callers spread out.
        let jitter = rand::random::<u64>() % (self.base_delay_ms / 2 + 1);
        Duration::from_millis(delay.saturating_add(jitter).min(self.max_delay_ms))
    }
}

/// A query parameter, kept vendor-neutral so callers never touch sqlx types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Null => query.bind(Option::<String>::None),
    }
}

/// Executes queries against the configured database, wrapping every attempt
/// in authentication, classification, and a bounded retry loop.
///
/// The executor owns an immutable configuration snapshot; nothing is shared
/// across concurrent `execute_with_retry` calls — each call opens its own
/// connection and keeps its own attempt counter, and attempts within a call
/// run strictly sequentially.
pub struct QueryExecutor {
    connection_string: String,
    schema: String,
    scopes: Vec<String>,
    provider: Arc<CredentialProvider>,
    classifier: ExceptionClassifier,
    policy: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(settings: &Settings, provider: Arc<CredentialProvider>) -> Self {
        Self {
            connection_string: settings.database.connection_string.clone(),
            schema: settings.database.schema.clone(),
            scopes: settings.identity.scopes.clone(),
            provider,
            classifier: ExceptionClassifier::default(),
            policy: RetryPolicy::from_settings(&settings.database),
        }
    }

    /// Swaps in the transient-code set of a different database engine.
    pub fn with_classifier(mut self, classifier: ExceptionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs `sql` with the given parameters and hands the fetched rows to
    /// `handler`, retrying transient failures up to the policy's budget.
    ///
    /// Each attempt is complete in itself: parse the connection string,
    /// derive the descriptor, authenticate, open a fresh connection, execute,
    /// materialize. An attempt either fully succeeds or is discarded; no
    /// partial results ever reach the caller.
    pub async fn execute_with_retry<T, F>(
        &self,
        sql: &str,
        params: &[SqlParam],
        handler: F,
        cancel: &CancellationToken,
    ) -> Result<T, ServiceError>
    where
        F: Fn(Vec<PgRow>) -> Result<T, DbError>,
    {
        let handler = &handler;
        self.run_with_retry("query", cancel, || async {
            let rows = self.attempt(sql, params).await?;
            handler(rows)
        })
        .await
    }

    /// The retry state machine: `Attempting(n) -> {Success, Retrying(n+1),
    /// GivingUp}`, starting at attempt 1.
    ///
    /// Logging contract (other tooling scrapes these events, so names and
    /// fields are stable): every failed attempt emits exactly two events —
    /// a warning carrying the attempt number and vendor error code, then
    /// either a warning announcing the retry or an error announcing the
    /// terminal outcome. A success that follows `k >= 1` failures adds one
    /// informational recovery event, for `2k + 1` in total. A first-attempt
    /// success emits nothing.
    pub async fn run_with_retry<T, Op, Fut>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        operation: Op,
    ) -> Result<T, ServiceError>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DbError::Cancelled),
                result = operation() => result,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            "operation succeeded after {} failed attempts",
                            attempt - 1
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let code = error.vendor_code();
                    let severity = self.classifier.classify(&error);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        error_code = code.as_deref().unwrap_or("none"),
                        error = %error,
                        "attempt failed"
                    );

                    match severity {
                        Severity::Fatal => {
                            tracing::error!(
                                operation = operation_name,
                                attempt,
                                "fatal error; aborting without retry"
                            );
                            return Err(ServiceError::internal(
                                format!("{} failed permanently: {}", operation_name, error),
                                error,
                            ));
                        }
                        Severity::Transient if attempt >= max_attempts => {
                            tracing::error!(
                                operation = operation_name,
                                attempts = max_attempts,
                                "retries exhausted; giving up"
                            );
                            return Err(ServiceError::internal(
                                format!(
                                    "{} failed after {} attempts: {}",
                                    operation_name, max_attempts, error
                                ),
                                error,
                            ));
                        }
                        Severity::Transient => {
                            let delay = self.policy.delay_for(attempt);
                            tracing::warn!(
                                operation = operation_name,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying after transient failure"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                    }
                }
            }
        }
    }

    /// One end-to-end attempt: authenticate, connect, execute, fetch.
    async fn attempt(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<PgRow>, DbError> {
        // The descriptor is computed fresh per attempt; a reconfigured
        // snapshot would be picked up by the next executor instance.
        let mut spec = ConnectionSpec::parse(&self.connection_string)?;
        let descriptor = spec.descriptor();
        authenticate(&mut spec, &descriptor, &self.provider, &self.scopes).await?;

        let options = spec
            .to_pg_options()
            .options([("search_path", self.schema.as_str())]);
        let mut conn: PgConnection = options.connect().await?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query.fetch_all(&mut conn).await?;

        conn.close().await.ok();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::database_error_with_code;
    use configuration::{DatabaseSettings, IdentitySettings};
    use credentials::StaticTokenSource;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::SubscriberExt;

    /// Counts every event this crate emits, so the log-multiplicity contract
    /// can be asserted exactly.
    struct CountingLayer {
        events: Arc<AtomicUsize>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CountingLayer {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().target().starts_with("database") {
                self.events.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_events() -> (tracing::subscriber::DefaultGuard, Arc<AtomicUsize>) {
        let events = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountingLayer {
            events: events.clone(),
        });
        (tracing::subscriber::set_default(subscriber), events)
    }

    fn test_executor(max_retries: u32) -> QueryExecutor {
        let settings = Settings {
            database: DatabaseSettings {
                connection_string: "Server=localhost;User Id=app;".to_string(),
                schema: "public".to_string(),
                max_retries,
                retry_base_delay_ms: 0,
                retry_max_delay_ms: 0,
            },
            identity: IdentitySettings {
                scopes: vec![],
                override_access_token: Some("test-token".to_string()),
                metadata_endpoint: String::new(),
            },
        };
        let provider = Arc::new(CredentialProvider::new(
            Some("test-token".to_string()),
            Arc::new(StaticTokenSource::new("test-token")),
        ));
        QueryExecutor::new(&settings, provider)
    }

    #[tokio::test]
    async fn exhausted_retries_make_exactly_max_attempts_and_twelve_events() {
        let (_guard, events) = count_events();
        let executor = test_executor(5);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), ServiceError> = executor
            .run_with_retry("test-op", &cancel, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(database_error_with_code("40001"))
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        assert_eq!(events.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn one_transient_failure_then_success_takes_two_attempts_and_three_events() {
        let (_guard, events) = count_events();
        let executor = test_executor(5);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = executor
            .run_with_retry("test-op", &cancel, || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(database_error_with_code("40P01"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(events.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_fatal_error_aborts_after_one_attempt() {
        let (_guard, events) = count_events();
        let executor = test_executor(5);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), ServiceError> = executor
            .run_with_retry("test-op", &cancel, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    // A syntax error will not improve on retry.
                    Err(database_error_with_code("42601"))
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_first_attempt_success_emits_no_events() {
        let (_guard, events) = count_events();
        let executor = test_executor(5);
        let cancel = CancellationToken::new();

        let result = executor
            .run_with_retry("test-op", &cancel, || async { Ok("done") })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_fails_fast_without_running_the_operation() {
        let executor = test_executor(5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), ServiceError> = executor
            .run_with_retry("test-op", &cancel, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(error.source, Some(DbError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn the_attempt_budget_is_retries_plus_one() {
        assert_eq!(RetryPolicy::new(5).max_attempts(), 6);
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[test]
    fn a_zero_base_delay_disables_backoff() {
        let policy = RetryPolicy::new(3).with_backoff(0, 0);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(10), Duration::ZERO);
    }

    #[test]
    fn backoff_is_clamped_to_the_maximum_delay() {
        let policy = RetryPolicy::new(10).with_backoff(100, 250);
        for attempt in 1..=10 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(250));
        }
    }
}
