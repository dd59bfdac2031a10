//! Connection configuration and the validated connection context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// SQL dialect family, selected by the configured prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    CloudMySql,
    Postgres,
    SqlServer,
}

impl Dialect {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::CloudMySql => "cloud-mysql",
            Self::Postgres => "postgres",
            Self::SqlServer => "sqlserver",
        }
    }

    pub fn is_mysql_family(self) -> bool {
        matches!(self, Self::MySql | Self::CloudMySql)
    }

    fn default_port(self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::CloudMySql => None,
            Self::Postgres => Some(5432),
            Self::SqlServer => Some(1433),
        }
    }
}

impl FromStr for Dialect {
    type Err = DbError;

    fn from_str(prefix: &str) -> Result<Self, Self::Err> {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "cloud-mysql" => Ok(Self::CloudMySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlserver" => Ok(Self::SqlServer),
            other => Err(DbError::config(format!(
                "unsupported dialect prefix '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Managed-cloud instance coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInstance {
    pub project: String,
    pub region: String,
    pub instance: String,
}

/// Raw, serializable connection settings as supplied by a caller or carried
/// on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    #[serde(alias = "prefix")]
    pub dialect: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub instance: Option<String>,
    pub show_timing: Option<bool>,
    pub show_logs: Option<bool>,
    pub mute_exceptions: Option<bool>,
}

impl ConnectionConfig {
    pub fn new(
        dialect: impl Into<String>,
        server: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            dialect: dialect.into(),
            server: Some(server.into()),
            database: Some(database.into()),
            ..Self::default()
        }
    }

    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_cloud_instance(
        mut self,
        project: impl Into<String>,
        region: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        self.project = Some(project.into());
        self.region = Some(region.into());
        self.instance = Some(instance.into());
        self
    }

    pub fn validate(self) -> Result<ConnectionContext, DbError> {
        ConnectionContext::try_from(self)
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, DbError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DbError::config(format!("missing required field '{field}'"))),
    }
}

/// Validated connection context. Immutable once built; every remote
/// invocation rebuilds its own from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConnectionConfig", into = "ConnectionConfig")]
pub struct ConnectionContext {
    dialect: Dialect,
    server: String,
    port: Option<u16>,
    database: String,
    credentials: Credentials,
    cloud: Option<CloudInstance>,
    show_timing: bool,
    show_logs: bool,
    mute_exceptions: bool,
}

impl TryFrom<ConnectionConfig> for ConnectionContext {
    type Error = DbError;

    fn try_from(config: ConnectionConfig) -> Result<Self, Self::Error> {
        let dialect: Dialect = config.dialect.parse()?;
        let cloud = if dialect == Dialect::CloudMySql {
            Some(CloudInstance {
                project: required("project", config.project)?,
                region: required("region", config.region)?,
                instance: required("instance", config.instance)?,
            })
        } else {
            None
        };
        let server = if cloud.is_some() {
            config.server.unwrap_or_default()
        } else {
            required("server", config.server)?
        };
        Ok(Self {
            dialect,
            server,
            port: config.port.or(dialect.default_port()),
            database: required("database", config.database)?,
            credentials: Credentials {
                user: config.user.unwrap_or_default(),
                password: config.password.unwrap_or_default(),
            },
            cloud,
            show_timing: config.show_timing.unwrap_or(true),
            show_logs: config.show_logs.unwrap_or(false),
            mute_exceptions: config.mute_exceptions.unwrap_or(false),
        })
    }
}

impl From<ConnectionContext> for ConnectionConfig {
    fn from(context: ConnectionContext) -> Self {
        let (project, region, instance) = match context.cloud {
            Some(cloud) => (Some(cloud.project), Some(cloud.region), Some(cloud.instance)),
            None => (None, None, None),
        };
        Self {
            server: Some(context.server).filter(|server| !server.is_empty()),
            port: context.port,
            database: Some(context.database),
            dialect: context.dialect.prefix().to_string(),
            user: Some(context.credentials.user),
            password: Some(context.credentials.password),
            project,
            region,
            instance,
            show_timing: Some(context.show_timing),
            show_logs: Some(context.show_logs),
            mute_exceptions: Some(context.mute_exceptions),
        }
    }
}

impl ConnectionContext {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The default database, used whenever a call names none.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn cloud(&self) -> Option<&CloudInstance> {
        self.cloud.as_ref()
    }

    pub fn show_timing(&self) -> bool {
        self.show_timing
    }

    pub fn show_logs(&self) -> bool {
        self.show_logs
    }

    pub fn mute_exceptions(&self) -> bool {
        self.mute_exceptions
    }

    pub fn with_show_timing(mut self, enabled: bool) -> Self {
        self.show_timing = enabled;
        self
    }

    pub fn with_show_logs(mut self, enabled: bool) -> Self {
        self.show_logs = enabled;
        self
    }

    pub fn with_mute_exceptions(mut self, enabled: bool) -> Self {
        self.mute_exceptions = enabled;
        self
    }

    /// Driver URL for `database`. Credentials are passed to the driver
    /// separately and never embedded.
    pub fn connection_url(&self, database: &str) -> String {
        let host = match self.port {
            Some(port) => format!("{}:{port}", self.server),
            None => self.server.clone(),
        };
        match (self.dialect, &self.cloud) {
            (Dialect::CloudMySql, Some(cloud)) => format!(
                "mysql://localhost/{database}?socket=/cloudsql/{}:{}:{}",
                cloud.project, cloud.region, cloud.instance
            ),
            (Dialect::MySql | Dialect::CloudMySql, _) => format!("mysql://{host}/{database}"),
            (Dialect::Postgres, _) => format!("postgresql://{host}/{database}"),
            (Dialect::SqlServer, _) => format!("sqlserver://{host};databaseName={database}"),
        }
    }
}
