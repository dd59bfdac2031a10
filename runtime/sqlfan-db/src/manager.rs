//! Single-connection cache keyed by database name.

use std::sync::Arc;

use crate::config::ConnectionContext;
use crate::driver::{Connection, Driver};
use crate::error::DbError;

struct Bound {
    database: String,
    conn: Box<dyn Connection>,
}

/// Owns at most one live connection at a time.
///
/// Asking for a different database than the one currently bound closes the
/// cached connection and opens a new one. The manager is meant for a single
/// execution context: every method takes `&mut self` and nothing is shared.
pub struct ConnectionManager {
    context: ConnectionContext,
    driver: Arc<dyn Driver>,
    bound: Option<Bound>,
    opened: usize,
}

impl ConnectionManager {
    pub fn new(context: ConnectionContext, driver: Arc<dyn Driver>) -> Self {
        Self {
            context,
            driver,
            bound: None,
            opened: 0,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Name of the database the cached connection is bound to, if any.
    pub fn bound_database(&self) -> Option<&str> {
        self.bound.as_ref().map(|bound| bound.database.as_str())
    }

    /// Connections opened over the manager's lifetime, dedicated ones included.
    pub fn opened(&self) -> usize {
        self.opened
    }

    fn resolve<'a>(&'a self, database: Option<&'a str>) -> &'a str {
        database
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.context.database())
    }

    /// Returns the cached connection for `database` (default database when
    /// `None`), reconnecting if the cache is bound elsewhere.
    pub fn connection(&mut self, database: Option<&str>) -> Result<&mut dyn Connection, DbError> {
        let database = self.resolve(database).to_string();
        match self.bound.take() {
            Some(bound) if bound.database == database => {
                let bound = self.bound.insert(bound);
                Ok(bound.conn.as_mut())
            }
            previous => {
                if let Some(previous) = previous {
                    tracing::debug!(
                        from = %previous.database,
                        to = %database,
                        "switching bound database"
                    );
                }
                let conn = self.driver.connect(&self.context, &database)?;
                self.opened += 1;
                let bound = self.bound.insert(Bound { database, conn });
                Ok(bound.conn.as_mut())
            }
        }
    }

    /// Opens a connection outside the cache. The caller owns it and closes
    /// it by dropping it.
    pub fn open_dedicated(
        &mut self,
        database: Option<&str>,
    ) -> Result<Box<dyn Connection>, DbError> {
        let database = self.resolve(database).to_string();
        let conn = self.driver.connect(&self.context, &database)?;
        self.opened += 1;
        Ok(conn)
    }

    /// Drops the cached connection.
    pub fn close(&mut self) {
        self.bound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedDriver, mysql_context};

    #[test]
    fn manager_reuses_connection_for_same_database() {
        let driver = ScriptedDriver::new();
        let mut manager = ConnectionManager::new(mysql_context(), Arc::new(driver.clone()));
        manager.connection(None).expect("first");
        manager.connection(Some("app")).expect("second");
        assert_eq!(manager.opened(), 1);
        assert_eq!(manager.bound_database(), Some("app"));
        assert_eq!(driver.connects(), vec!["app".to_string()]);
    }

    #[test]
    fn manager_rebinds_when_database_changes() {
        let driver = ScriptedDriver::new();
        let mut manager = ConnectionManager::new(mysql_context(), Arc::new(driver.clone()));
        manager.connection(None).expect("default");
        manager.connection(Some("reporting")).expect("reporting");
        assert_eq!(manager.bound_database(), Some("reporting"));
        assert_eq!(driver.open_connections(), 1);
        manager.connection(Some("")).expect("blank falls back to default");
        assert_eq!(manager.bound_database(), Some("app"));
        assert_eq!(manager.opened(), 3);
    }

    #[test]
    fn manager_close_releases_connection() {
        let driver = ScriptedDriver::new();
        let mut manager = ConnectionManager::new(mysql_context(), Arc::new(driver.clone()));
        manager.connection(None).expect("conn");
        manager.close();
        assert_eq!(driver.open_connections(), 0);
        assert_eq!(manager.bound_database(), None);
    }

    #[test]
    fn dedicated_connection_is_not_cached() {
        let driver = ScriptedDriver::new();
        let mut manager = ConnectionManager::new(mysql_context(), Arc::new(driver.clone()));
        let conn = manager.open_dedicated(Some("bulk")).expect("dedicated");
        assert_eq!(manager.bound_database(), None);
        assert_eq!(driver.open_connections(), 1);
        drop(conn);
        assert_eq!(driver.open_connections(), 0);
    }
}
