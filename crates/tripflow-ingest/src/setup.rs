//! Infrastructure setup scripts and idempotent teardown

use std::fmt;
use tracing::{debug, info, instrument};
use tripflow_common::types::IngestionUnit;

use crate::error::{IngestError, Result};
use crate::loader::stage_name;
use crate::transform::{execute_script, ResourceLoader};
use crate::warehouse::{quote_literal, StatementContext, TableName, Warehouse};

/// Setup resources, in execution order
pub const SETUP_SCRIPTS: [&str; 4] = [
    "create_role.sql",
    "create_infrastructure.sql",
    "grant_role.sql",
    "create_raw_table.sql",
];

/// Marker replaced by the quoted role password in setup scripts
pub const PASSWORD_MARKER: &str = "{?}";

/// Object kinds the reset step removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Stage,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Table => f.write_str("TABLE"),
            ObjectKind::Stage => f.write_str("STAGE"),
        }
    }
}

/// Result of making sure an object does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    Removed,
    AlreadyAbsent,
}

/// Drop `name` if it exists. A missing object is success, not an error.
pub async fn ensure_absent(warehouse: &dyn Warehouse, kind: ObjectKind, name: &str) -> Result<Absence> {
    let name: TableName = name.parse()?;
    let result = warehouse
        .execute(&format!("DROP {} IF EXISTS {}", kind, name))
        .await?;

    let status = result.first_text().unwrap_or_default().to_ascii_lowercase();
    let absence = if status.contains("already dropped") || status.contains("does not exist") {
        Absence::AlreadyAbsent
    } else {
        Absence::Removed
    };

    debug!(kind = %kind, name = %name, outcome = ?absence, "Ensured absent");
    Ok(absence)
}

/// Run every setup script in order and return the number of statements executed.
///
/// Each script starts from the connection settings; its `USE ROLE` and
/// `USE WAREHOUSE` lines set the role and warehouse its later statements
/// are sent with. `role_password` is required only if a script contains
/// [`PASSWORD_MARKER`].
#[instrument(skip_all)]
pub async fn run_setup(
    warehouse: &dyn Warehouse,
    resources: &dyn ResourceLoader,
    role_password: Option<&str>,
) -> Result<usize> {
    let mut executed = 0;

    for script in SETUP_SCRIPTS {
        let text = resources.load(script)?;
        let text = if text.contains(PASSWORD_MARKER) {
            let password = role_password.ok_or_else(|| {
                IngestError::Config(format!("SNOWFLAKE_ROLE_PASSWORD is required by {}", script))
            })?;
            text.replace(PASSWORD_MARKER, &quote_literal(password))
        } else {
            text
        };

        let mut context = StatementContext::default();
        let sent = execute_script(warehouse, &text, &mut context)
            .await
            .map_err(|e| IngestError::Resource(format!("{} failed: {}", script, e)))?;
        executed += sent;
        info!(script = script, statements = sent, role = ?context.role, "Setup script applied");
    }

    Ok(executed)
}

/// Remove the per-unit stages of `units` and the staging table
#[instrument(skip_all, fields(units = units.len()))]
pub async fn reset(
    warehouse: &dyn Warehouse,
    units: &[IngestionUnit],
    stage_name_prefix: &str,
    staging_table: &TableName,
) -> Result<Vec<(String, Absence)>> {
    let mut outcomes = Vec::with_capacity(units.len() + 1);

    for unit in units {
        let stage = stage_name(stage_name_prefix, unit);
        let absence = ensure_absent(warehouse, ObjectKind::Stage, &stage).await?;
        outcomes.push((stage, absence));
    }

    let absence = ensure_absent(warehouse, ObjectKind::Table, staging_table.as_str()).await?;
    outcomes.push((staging_table.to_string(), absence));

    let removed = outcomes.iter().filter(|(_, a)| *a == Absence::Removed).count();
    info!(removed = removed, already_absent = outcomes.len() - removed, "Reset complete");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_keywords() {
        assert_eq!(ObjectKind::Stage.to_string(), "STAGE");
        assert_eq!(ObjectKind::Table.to_string(), "TABLE");
    }

    #[test]
    fn test_setup_order() {
        assert_eq!(SETUP_SCRIPTS[0], "create_role.sql");
        assert_eq!(SETUP_SCRIPTS[3], "create_raw_table.sql");
    }
}
