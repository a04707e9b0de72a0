//! SQL Server target pool on tiberius and bb8.

use crate::config::DatabaseConfig;
use crate::ddl::Statement;
use crate::decode::{SqlNullType, SqlValue};
use crate::error::{Result, SyncError};
use crate::target::TargetPool;
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{NaiveDate, NaiveDateTime};
use std::future::Future;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// "There is already an object named ... in the database."
const ERR_OBJECT_EXISTS: u32 = 2714;
/// "The type ... already exists."
const ERR_TYPE_EXISTS: u32 = 219;
/// Violation of PRIMARY KEY constraint.
const ERR_DUPLICATE_KEY: u32 = 2627;

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: DatabaseConfig,
}

impl TiberiusConnectionManager {
    fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> std::result::Result<Config, tiberius::error::Error> {
        if let Some(ado) = &self.config.connection_string {
            return Config::from_ado_string(ado);
        }

        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt_enabled() {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }
        if self.config.trust_server_cert {
            config.trust_cert();
        }

        Ok(config)
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config()?;
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Timeout and retry settings for one round trip.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.query_timeout_secs),
        }
    }
}

/// Run `attempt` under the policy's timeout, retrying transient failures
/// with linear backoff (delay * attempt).
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation: operation.to_string(),
                seconds: policy.timeout.as_secs(),
            }),
        };

        match result {
            Err(e) if e.is_transient() && retries < policy.max_retries => {
                retries += 1;
                warn!(
                    "Transient failure during {}, retry {}/{}: {}",
                    operation, retries, policy.max_retries, e
                );
                tokio::time::sleep(policy.retry_delay * retries).await;
            }
            other => return other,
        }
    }
}

/// SQL Server target pool implementation.
pub struct MssqlTargetPool {
    pool: Pool<TiberiusConnectionManager>,
    policy: RetryPolicy,
}

impl MssqlTargetPool {
    /// Create a new pool and verify that a connection can be opened.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        manager
            .build_config()
            .map_err(|e| SyncError::Config(format!("invalid connection settings: {}", e)))?;

        let policy = RetryPolicy::from_config(config);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(policy.timeout)
            .build(manager)
            .await
            .map_err(|e| SyncError::pool(e, "creating SQL Server pool"))?;

        let target = Self { pool, policy };
        target.ping().await?;

        info!("Connected to SQL Server: {}", config.describe());

        Ok(target)
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting SQL Server connection"))
    }

    async fn exists_once(&self, stmt: &Statement) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let params: Vec<Box<dyn ToSql>> = stmt.params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = conn
            .query(stmt.sql.as_str(), &param_refs)
            .await
            .map_err(|e| classify_error(e, &stmt.sql))?
            .into_first_result()
            .await
            .map_err(|e| classify_error(e, &stmt.sql))?;

        Ok(!rows.is_empty())
    }

    async fn execute_once(&self, stmt: &Statement) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let params: Vec<Box<dyn ToSql>> = stmt.params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let result = conn
            .execute(stmt.sql.as_str(), &param_refs)
            .await
            .map_err(|e| classify_error(e, &stmt.sql))?;

        Ok(result.total())
    }

    async fn ping_once(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await?
            .into_row()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TargetPool for MssqlTargetPool {
    async fn exists(&self, stmt: &Statement) -> Result<bool> {
        debug!("Probe: {}", stmt);
        with_retry(self.policy, "probe", move || self.exists_once(stmt)).await
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64> {
        debug!("Execute: {}", stmt);
        with_retry(self.policy, "execute", move || self.execute_once(stmt)).await
    }

    async fn ping(&self) -> Result<()> {
        with_retry(self.policy, "ping", move || self.ping_once()).await
    }

    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn close(&self) {
        // bb8 handles cleanup automatically
    }
}

/// Map a tiberius error to the error taxonomy.
///
/// Deadlocks and transport failures stay `Connectivity` so they are retried.
fn classify_error(e: tiberius::error::Error, sql: &str) -> SyncError {
    if let tiberius::error::Error::Server(token) = &e {
        if !e.is_deadlock() {
            return server_error(token.code(), token.message(), sql);
        }
    }
    SyncError::Connectivity(e)
}

fn server_error(code: u32, message: &str, sql: &str) -> SyncError {
    match code {
        ERR_OBJECT_EXISTS | ERR_TYPE_EXISTS | ERR_DUPLICATE_KEY => SyncError::Consistency {
            object: statement_head(sql),
            message: message.to_string(),
        },
        _ => SyncError::StatementRejected {
            code,
            message: message.to_string(),
        },
    }
}

/// First line of a statement, shortened for error messages.
fn statement_head(sql: &str) -> String {
    let line = sql.lines().next().unwrap_or_default().trim();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Convert SqlValue to a boxed ToSql trait object for parameterized queries.
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Int => Box::new(Option::<i32>::None),
            SqlNullType::String | SqlNullType::Char => Box::new(Option::<String>::None),
            SqlNullType::Date => Box::new(Option::<NaiveDate>::None),
            SqlNullType::DateTime => Box::new(Option::<NaiveDateTime>::None),
        },
        SqlValue::Int(i) => Box::new(*i),
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Char(c) => Box::new(c.to_string()),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
    }
}
