use chrono::Utc;
use log::{debug, warn};

use super::config::ConnectionConfig;
use super::engine::StorageBackend;
use crate::core::{
    CREATED_FIELD, DbError, ROWID_FIELD, Record, Result, UPDATED_FIELD, Value,
};
use crate::query::Criteria;
use crate::result::QueryResult;
use crate::schema::{Table, normalize_name};

/// Policy layer in front of every backend.
///
/// Each public operation validates its input, connects lazily on first use,
/// and runs the backend call under the recovery protocol: a recoverable
/// failure is handed back to the backend to resolve, and the call is retried
/// exactly once if the backend says it fixed the problem.
pub struct Storage<B: StorageBackend> {
    backend: B,
    config: ConnectionConfig,
}

impl<B: StorageBackend> Storage<B> {
    pub fn new(backend: B, config: ConnectionConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the backend connection now rather than on first use.
    pub fn connect(&mut self) -> Result<bool> {
        self.config.validate()?;
        debug!("Connecting to {}", self.config.to_url());
        let connected = self.backend.connect(&self.config)?;
        if !connected {
            return Err(DbError::Connection(format!(
                "Backend refused connection to {}",
                self.config.to_url()
            )));
        }
        Ok(true)
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    pub fn get(&mut self, table: &Table, criteria: &Criteria) -> Result<QueryResult> {
        let criteria = Self::prepare_criteria(table, criteria)?;
        self.run(table, |backend| backend.get(table, &criteria))
    }

    /// First record on the criteria's current page, if any.
    pub fn get_one(&mut self, table: &Table, criteria: &Criteria) -> Result<Option<Record>> {
        let offset = criteria.get_bounds().offset;
        let single = criteria.clone().limit(1).offset(offset);
        let result = self.get(table, &single)?;
        Ok(result.into_records().into_iter().next())
    }

    pub fn get_count(&mut self, table: &Table, criteria: &Criteria) -> Result<u64> {
        let criteria = Self::prepare_criteria(table, criteria)?;
        self.run(table, |backend| backend.get_count(table, &criteria))
    }

    /// Insert `record` when it has no identifier, update it otherwise.
    pub fn set(&mut self, table: &Table, record: Record) -> Result<Record> {
        Self::validate_table(table)?;
        let is_update = record.id().is_some();
        let record = Self::prepare_record(table, record, is_update)?;

        if is_update {
            self.run(table, |backend| backend.update(table, record.clone()))
        } else {
            self.run(table, |backend| backend.insert(table, record.clone()))
        }
    }

    /// Delete the records matching `criteria`.
    ///
    /// An empty predicate would wipe the table, so it is refused unless
    /// `force` is set.
    pub fn kill(&mut self, table: &Table, criteria: &Criteria, force: bool) -> Result<u64> {
        if !criteria.has_where() && !force {
            return Err(DbError::InvalidArgument(format!(
                "Refusing to delete every record in '{}' without force",
                table.name()
            )));
        }
        let criteria = Self::prepare_criteria(table, criteria)?;
        self.run(table, |backend| backend.kill(table, &criteria))
    }

    // ------------------------------------------------------------------
    // Tables and indexes
    // ------------------------------------------------------------------

    pub fn set_table(&mut self, table: &Table) -> Result<bool> {
        Self::validate_table(table)?;
        self.run(table, |backend| backend.set_table(table))
    }

    pub fn kill_table(&mut self, table: &Table) -> Result<bool> {
        Self::validate_table(table)?;
        self.run(table, |backend| backend.kill_table(table))
    }

    pub fn has_table(&mut self, table: &Table) -> Result<bool> {
        Self::validate_table(table)?;
        self.run(table, |backend| backend.has_table(table))
    }

    /// Create the declared index `name`.
    pub fn set_index(&mut self, table: &Table, name: &str) -> Result<bool> {
        Self::validate_table(table)?;
        let index = table.get_index(name).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "Index '{}' is not declared on '{}'",
                name,
                table.name()
            ))
        })?;
        self.run(table, |backend| backend.set_index(table, index))
    }

    pub fn kill_index(&mut self, table: &Table, name: &str) -> Result<bool> {
        Self::validate_table(table)?;
        let index = table.get_index(name).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "Index '{}' is not declared on '{}'",
                name,
                table.name()
            ))
        })?;
        self.run(table, |backend| backend.kill_index(table, index))
    }

    pub fn get_indexes(&mut self, table: &Table) -> Result<Vec<String>> {
        Self::validate_table(table)?;
        self.run(table, |backend| backend.get_indexes(table))
    }

    // ------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------

    fn run<T>(&mut self, table: &Table, mut op: impl FnMut(&mut B) -> Result<T>) -> Result<T> {
        if !self.backend.is_connected() {
            self.connect()?;
        }

        let err = match op(&mut self.backend) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_recoverable() {
            return Err(err);
        }

        match self.backend.resolve(table, &err) {
            Ok(true) => {
                warn!("Resolved '{}' on '{}', retrying once", err, table.name());
                op(&mut self.backend)
            }
            Ok(false) => Err(err),
            Err(resolve_err) => {
                warn!(
                    "Could not resolve '{}' on '{}': {}",
                    err,
                    table.name(),
                    resolve_err
                );
                Err(err)
            }
        }
    }

    fn validate_table(table: &Table) -> Result<()> {
        if table.name().is_empty() {
            return Err(DbError::InvalidArgument("Table must be named".into()));
        }
        Ok(())
    }

    fn prepare_criteria(table: &Table, criteria: &Criteria) -> Result<Criteria> {
        Self::validate_table(table)?;
        let mut criteria = criteria.clone();
        criteria.normalize(table)?;
        Ok(criteria)
    }

    /// Strip engine-maintained fields, apply defaults, enforce required
    /// fields, coerce declared types and stamp timestamps.
    fn prepare_record(table: &Table, record: Record, is_update: bool) -> Result<Record> {
        let mut prepared = Record::new();
        for (name, value) in record.iter() {
            let name = normalize_name(name);
            if name == ROWID_FIELD || name == CREATED_FIELD || name == UPDATED_FIELD {
                continue;
            }
            prepared.set(name, value.clone());
        }

        for field in table.fields() {
            let present = prepared.get(field.name()).is_some_and(|v| !v.is_null());
            if present || !field.is_required() {
                continue;
            }
            match field.default_value() {
                Some(default) => prepared.set(field.name(), default.clone()),
                None => return Err(DbError::MissingRequired(field.name().to_string())),
            }
        }

        for field in table.fields() {
            if let Some(value) = prepared.remove(field.name()) {
                prepared.set(field.name(), field.normalize(value)?);
            }
        }

        let now = Value::Integer(Utc::now().timestamp());
        if !is_update {
            prepared.set(CREATED_FIELD, now.clone());
        }
        prepared.set(UPDATED_FIELD, now);
        Ok(prepared)
    }
}
