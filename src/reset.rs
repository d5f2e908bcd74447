use mysql::prelude::Queryable;
use tracing::{debug, info};

use crate::error::Result;
use crate::opts::ConnOpts;

pub const DATABASE: &str = "test";
pub const TABLE: &str = "tbl";

/// Statements that recreate the benchmark schema from scratch, in order.
pub fn reset_statements() -> [String; 4] {
    [
        format!("DROP DATABASE IF EXISTS {DATABASE}"),
        format!("CREATE DATABASE {DATABASE}"),
        format!("USE {DATABASE}"),
        format!("CREATE TABLE {TABLE} (id INT AUTO_INCREMENT PRIMARY KEY, val INT NULL)"),
    ]
}

/// Drops and recreates the `test` database and its single table.
///
/// Any error is returned to the caller as-is. The benchmark cannot run
/// without a fresh table, so there is no retry.
#[tracing::instrument(skip_all, fields(server = %opts))]
pub fn reset_environment(opts: &ConnOpts) -> Result<()> {
    let mut conn = mysql::Conn::new(opts.to_mysql_opts())?;
    for sql in reset_statements() {
        debug!(%sql, "reset");
        conn.query_drop(sql)?;
    }
    info!("recreated {DATABASE}.{TABLE}");
    Ok(())
}
