//! Delta executor.
//!
//! Runs a compiled script against a [`Connection`], then the delta's execute
//! directives, wrapped by the optional pre/post queries. In dry-run mode
//! nothing is executed: the statements that would run are collected into the
//! result's rendered output instead.

use std::error::Error as StdError;
use std::sync::LazyLock;
use std::time::Instant;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::annotate::{annotate, ApplyFailure};
use crate::compiler::compile;
use crate::config::Config;
use crate::connection::Connection;
use crate::delta::{Condition, Delta, ExecuteDirective};
use crate::dialect::MigrationDialect;
use crate::error::{ConditionError, Result};
use crate::report::{MigrationReport, MigrationResult};
use crate::script::CompiledScript;
use crate::text::undent;

static DDL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CREATE|ALTER|DROP|RENAME)\b").expect("DDL pattern is valid")
});

/// How a run treats the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Execute statements against the connection.
    #[default]
    Apply,
    /// Render statements without executing them.
    DryRun,
}

/// Executes deltas against a database.
pub struct DeltaExecutor<C: Connection, D: MigrationDialect> {
    connection: C,
    dialect: D,
    config: Config,
}

impl<C: Connection, D: MigrationDialect> DeltaExecutor<C, D> {
    /// Creates a new delta executor.
    pub fn new(connection: C, dialect: D, config: Config) -> Self {
        Self {
            connection,
            dialect,
            config,
        }
    }

    /// Returns the connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Returns the connection mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Returns the dialect.
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compiles a delta with this executor's configuration.
    pub fn compile(&self, delta: &Delta) -> Result<CompiledScript> {
        compile(delta, &self.config)
    }

    /// Compiles and runs a delta.
    ///
    /// When `log_file` is configured, a timed [`MigrationReport`] is written
    /// there after a successful run.
    pub async fn migrate(&mut self, delta: &Delta, mode: Mode) -> Result<MigrationResult> {
        let script = self.compile(delta)?;

        let Some(log_file) = self.config.log_file.clone() else {
            return self.run(delta, &script, mode).await;
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.run(delta, &script, mode).await?;

        let report = MigrationReport {
            result: result.clone(),
            elapsed_time: start.elapsed().as_secs_f64(),
            started_at,
        };
        report.write_to(&log_file)?;
        debug!(path = %log_file.display(), "Wrote migration report");

        Ok(result)
    }

    /// Runs an already compiled script and the delta's execute directives.
    ///
    /// Order: pre query, script, directives, post query. A failing script
    /// line comes back as an annotated [`crate::error::DeltaError::Apply`].
    pub async fn run(
        &mut self,
        delta: &Delta,
        script: &CompiledScript,
        mode: Mode,
    ) -> Result<MigrationResult> {
        let mut rendered = Vec::new();

        if let Some(sql) = self.config.pre_query.clone() {
            self.query(&sql, mode, &mut rendered).await?;
        }

        if !script.is_empty() {
            if let Err(failure) = self.apply_script(script, mode, &mut rendered).await {
                let err = annotate(script, failure);
                error!("{}", err);
                return Err(err);
            }
        }

        let executed = self
            .execute_directives(&delta.execute, mode, &mut rendered)
            .await?;

        if let Some(sql) = self.config.post_query.clone() {
            self.query(&sql, mode, &mut rendered).await?;
        }

        let rendered_output = match mode {
            Mode::Apply => None,
            Mode::DryRun => Some(rendered.join("\n").trim().to_string()),
        };

        Ok(MigrationResult {
            migrated: !script.is_empty() || executed > 0,
            rendered_output,
        })
    }

    async fn query(&mut self, sql: &str, mode: Mode, rendered: &mut Vec<String>) -> Result<()> {
        match mode {
            Mode::Apply => {
                info!(sql = %sql, "Executing query");
                self.connection.execute(sql).await
            }
            Mode::DryRun => {
                rendered.push(sql.to_string());
                Ok(())
            }
        }
    }

    /// Generates and runs the SQL of every script statement, in order.
    async fn apply_script(
        &mut self,
        script: &CompiledScript,
        mode: Mode,
        rendered: &mut Vec<String>,
    ) -> std::result::Result<(), ApplyFailure> {
        for (line, script_line, operation) in script.operations() {
            for sql in self.dialect.generate_sql(operation) {
                debug!(line, sql = %sql, "Generated SQL");

                if mode == Mode::DryRun {
                    if DDL.is_match(&sql) {
                        rendered.push(sql);
                    }
                    continue;
                }

                if sql.starts_with("--") {
                    warn!(comment = %sql, "Skipping comment (unsupported operation)");
                    continue;
                }

                info!(line, "{}", script_line.text.trim());
                if let Err(e) = self.connection.execute(&sql).await {
                    return Err(ApplyFailure {
                        line: Some(line),
                        operation: Some(operation.description()),
                        origin: script_line.origin.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs the directives whose condition holds. Returns how many ran.
    async fn execute_directives(
        &mut self,
        directives: &[ExecuteDirective],
        mode: Mode,
        rendered: &mut Vec<String>,
    ) -> Result<usize> {
        let mut executed = 0;

        for directive in directives {
            let sql = undent(&directive.sql);
            let sql = sql.trim_start_matches(['\n', '\r']).trim_end();

            if let Some(ref condition) = directive.condition {
                match self.check(condition).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(sql = %sql, "Condition not met");
                        continue;
                    }
                    Err(e) => {
                        if self.config.debug {
                            warn!("`{}` is not executed: {}{}", sql, e, cause_chain(&e));
                        } else {
                            warn!("`{}` is not executed: {}", sql, e);
                        }
                        continue;
                    }
                }
            }

            match mode {
                Mode::Apply => {
                    info!("Execute {}", sql);
                    self.connection.execute(sql).await?;
                }
                Mode::DryRun => rendered.push(sql.to_string()),
            }
            executed += 1;
        }

        Ok(executed)
    }

    async fn check(&mut self, condition: &Condition) -> std::result::Result<bool, ConditionError> {
        let schema = self
            .connection
            .inspect()
            .await
            .map_err(ConditionError::Inspect)?;
        condition.evaluate(&schema).map_err(ConditionError::Predicate)
    }
}

fn cause_chain(err: &dyn StdError) -> String {
    let mut chain = String::new();
    let mut current = err.source();
    while let Some(cause) = current {
        chain.push_str("; caused by: ");
        chain.push_str(&cause.to_string());
        current = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{AddTable, ChangeTable, ColumnSpec, ColumnType};
    use crate::dialect::SqliteDialect;
    use crate::error::DeltaError;
    use crate::schema::DatabaseSchema;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use tracing_test::traced_test;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn executor(pool: SqlitePool, config: Config) -> DeltaExecutor<SqlitePool, SqliteDialect> {
        DeltaExecutor::new(pool, SqliteDialect::new(), config)
    }

    fn create_users() -> Delta {
        Delta::new().add_table(
            "users",
            AddTable::new()
                .column(
                    "id",
                    ColumnSpec::new(ColumnType::Integer)
                        .option("primary_key", true)
                        .option("auto_increment", true),
                )
                .column("name", ColumnSpec::new(ColumnType::String)),
        )
    }

    /// Records statements instead of running them.
    #[derive(Default)]
    struct Recorder {
        statements: Vec<String>,
        schema: DatabaseSchema,
        fail_inspect: bool,
    }

    impl Connection for Recorder {
        async fn execute(&mut self, sql: &str) -> Result<()> {
            self.statements.push(sql.to_string());
            Ok(())
        }

        async fn inspect(&mut self) -> Result<DatabaseSchema> {
            if self.fail_inspect {
                return Err(DeltaError::Connection("inspection unavailable".into()));
            }
            Ok(self.schema.clone())
        }
    }

    #[tokio::test]
    async fn test_apply_creates_table() {
        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new());

        let result = executor.migrate(&create_users(), Mode::Apply).await.unwrap();
        assert!(result.migrated);
        assert_eq!(result.rendered_output, None);

        let schema = executor.connection_mut().inspect().await.unwrap();
        assert!(schema.has_column("users", "name"));
    }

    #[tokio::test]
    async fn test_dry_run_renders_without_mutating() {
        let pool = create_test_pool().await;
        let config = Config::new()
            .pre_query("SET foo = 1")
            .post_query("SET foo = 0");
        let mut executor = executor(pool, config);

        let result = executor.migrate(&create_users(), Mode::DryRun).await.unwrap();
        assert!(result.migrated);
        assert_eq!(
            result.rendered_output.as_deref(),
            Some(
                "SET foo = 1\n\
                 CREATE TABLE \"users\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" VARCHAR(255))\n\
                 SET foo = 0"
            )
        );

        let schema = executor.connection_mut().inspect().await.unwrap();
        assert!(schema.tables.is_empty());
    }

    #[tokio::test]
    async fn test_empty_delta_is_not_migrated() {
        let mut executor = DeltaExecutor::new(Recorder::default(), SqliteDialect::new(), Config::new());
        let result = executor.migrate(&Delta::new(), Mode::Apply).await.unwrap();
        assert!(!result.migrated);
        assert!(executor.connection().statements.is_empty());

        let result = executor.migrate(&Delta::new(), Mode::DryRun).await.unwrap();
        assert_eq!(result.rendered_output.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_run_order() {
        let config = Config::new().pre_query("PRE").post_query("POST");
        let mut executor = DeltaExecutor::new(Recorder::default(), SqliteDialect::new(), config);

        let delta = Delta::new()
            .drop_table("old")
            .execute(ExecuteDirective::new("UPDATE t SET x = 1"));
        executor.migrate(&delta, Mode::Apply).await.unwrap();

        assert_eq!(
            executor.connection().statements,
            vec!["PRE", "DROP TABLE \"old\"", "UPDATE t SET x = 1", "POST"]
        );
    }

    #[tokio::test]
    async fn test_failing_condition_is_skipped() {
        let mut executor = DeltaExecutor::new(Recorder::default(), SqliteDialect::new(), Config::new().debug(true));

        let delta = Delta::new()
            .execute(
                ExecuteDirective::new("SELECT 'never'")
                    .when(Condition::custom(|_| Err("predicate exploded".into()))),
            )
            .execute(ExecuteDirective::new("SELECT 'skipped'").when(Condition::custom(|_| Ok(false))))
            .execute(ExecuteDirective::new("SELECT 'ran'").when(Condition::custom(|_| Ok(true))));

        let result = executor.migrate(&delta, Mode::Apply).await.unwrap();
        assert!(result.migrated);
        assert_eq!(executor.connection().statements, vec!["SELECT 'ran'"]);
    }

    #[tokio::test]
    async fn test_inspection_failure_skips_directive() {
        let recorder = Recorder {
            fail_inspect: true,
            ..Recorder::default()
        };
        let mut executor = DeltaExecutor::new(recorder, SqliteDialect::new(), Config::new());

        let delta = Delta::new()
            .execute(ExecuteDirective::new("SELECT 1").when(Condition::TableExists("users".into())));
        let result = executor.migrate(&delta, Mode::Apply).await.unwrap();
        assert!(!result.migrated);
        assert!(executor.connection().statements.is_empty());
    }

    fn inspection_gated_delta() -> Delta {
        Delta::new()
            .execute(ExecuteDirective::new("SELECT 1").when(Condition::TableExists("users".into())))
    }

    #[traced_test]
    #[tokio::test]
    async fn test_skip_warning_names_statement_and_reason() {
        let recorder = Recorder {
            fail_inspect: true,
            ..Recorder::default()
        };
        let mut executor = DeltaExecutor::new(recorder, SqliteDialect::new(), Config::new());
        executor.migrate(&inspection_gated_delta(), Mode::Apply).await.unwrap();

        assert!(logs_contain(
            "`SELECT 1` is not executed: inspection failed: Connection error: inspection unavailable"
        ));
        assert!(!logs_contain("caused by:"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_skip_warning_has_cause_chain_in_debug() {
        let recorder = Recorder {
            fail_inspect: true,
            ..Recorder::default()
        };
        let mut executor =
            DeltaExecutor::new(recorder, SqliteDialect::new(), Config::new().debug(true));
        executor.migrate(&inspection_gated_delta(), Mode::Apply).await.unwrap();

        assert!(logs_contain("`SELECT 1` is not executed: inspection failed"));
        assert!(logs_contain("caused by: Connection error: inspection unavailable"));
    }

    #[tokio::test]
    async fn test_directive_condition_on_live_schema() {
        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new());
        executor.migrate(&create_users(), Mode::Apply).await.unwrap();

        let delta = Delta::new()
            .execute(
                ExecuteDirective::new("CREATE INDEX \"idx_name\" ON \"users\" (\"name\")")
                    .when(Condition::IndexAbsent {
                        table: "users".into(),
                        name: "idx_name".into(),
                    }),
            );

        let first = executor.migrate(&delta, Mode::Apply).await.unwrap();
        assert!(first.migrated);
        let second = executor.migrate(&delta, Mode::Apply).await.unwrap();
        assert!(!second.migrated);
    }

    #[tokio::test]
    async fn test_directive_is_undented() {
        let mut executor = DeltaExecutor::new(Recorder::default(), SqliteDialect::new(), Config::new());
        let delta = Delta::new().execute(ExecuteDirective::new(
            "\n    UPDATE users\n      SET active = 1\n",
        ));

        let result = executor.migrate(&delta, Mode::DryRun).await.unwrap();
        assert_eq!(
            result.rendered_output.as_deref(),
            Some("UPDATE users\n  SET active = 1")
        );
        assert!(executor.connection().statements.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_change_is_skipped_in_both_modes() {
        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new());
        executor.migrate(&create_users(), Mode::Apply).await.unwrap();

        let delta = Delta::new().change_table(
            "users",
            ChangeTable::new().change_column("name", ColumnSpec::new(ColumnType::Text)),
        );

        let dry = executor.migrate(&delta, Mode::DryRun).await.unwrap();
        assert_eq!(dry.rendered_output.as_deref(), Some(""));

        let applied = executor.migrate(&delta, Mode::Apply).await.unwrap();
        assert!(applied.migrated);
    }

    #[tokio::test]
    async fn test_failure_is_annotated() {
        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new());
        executor.migrate(&create_users(), Mode::Apply).await.unwrap();

        let delta = Delta::new().change_table(
            "users",
            ChangeTable::new().add_column("name", ColumnSpec::new(ColumnType::String)),
        );
        let err = executor.migrate(&delta, Mode::Apply).await.unwrap_err();

        let DeltaError::Apply { message, line, origin, .. } = err else {
            panic!("expected Apply, got {err:?}");
        };
        assert_eq!(line, 1);
        assert!(message.contains("duplicate column name"));
        assert!(message.contains("* 1: add_column(\"users\", :name, :string, {})"));
        assert_eq!(origin.unwrap().to_string(), "change.users.definition.add.name");
    }

    #[tokio::test]
    async fn test_pre_query_failure_propagates() {
        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new().pre_query("NOT SQL"));
        let err = executor.migrate(&create_users(), Mode::Apply).await.unwrap_err();
        assert!(matches!(err, DeltaError::Database(_)));
    }

    #[tokio::test]
    async fn test_report_written_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new().log_file(&path));
        executor.migrate(&create_users(), Mode::Apply).await.unwrap();

        let report: MigrationReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(report.result.migrated);
        assert!(report.elapsed_time >= 0.0);
    }

    #[tokio::test]
    async fn test_no_report_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let pool = create_test_pool().await;
        let mut executor = executor(pool, Config::new().log_file(&path));
        let delta = Delta::new().drop_table("missing");
        assert!(executor.migrate(&delta, Mode::Apply).await.is_err());
        assert!(!path.exists());
    }
}
