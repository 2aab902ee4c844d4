use mysql::prelude::*;
use mysql::*;
use simple_error::bail;
use std::{thread, time};

use crate::FnResult;

const DEADLOCK_ATTEMPTS: u32 = 5;
const DEADLOCK_PAUSE: time::Duration = time::Duration::from_millis(5000);

/// Executes one or more prepared statements for a collected list of parameter
/// sets within a single transaction, so that a whole ingestion batch commits
/// or fails as one.
///
/// The usual setup is an UPDATE statement followed by an INSERT IGNORE
/// statement with identical parameter names, which together upsert one row
/// per parameter set. Call add_parameter_set for each row, then
/// write_to_database once per batch.
pub struct BatchedUpsert {
    name: String,
    conn: PooledConn,
    statements: Vec<Statement>,
    params_vec: Vec<Params>,
}

impl BatchedUpsert {
    pub fn new(name: &str, mut conn: PooledConn, statements: &[&str]) -> FnResult<Self> {
        let mut prepared = Vec::with_capacity(statements.len());
        for statement in statements {
            prepared.push(conn.prep(*statement)?);
        }
        Ok(BatchedUpsert {
            name: String::from(name),
            conn,
            statements: prepared,
            params_vec: Vec::new(),
        })
    }

    pub fn add_parameter_set(&mut self, parameter_set: Params) {
        self.params_vec.push(parameter_set);
    }

    pub fn len(&self) -> usize {
        self.params_vec.len()
    }

    /// Writes all collected parameter sets in one transaction and clears them.
    /// A MySql deadlock rolls the transaction back and starts over after a
    /// pause, a bounded number of times. Any other error aborts the batch.
    pub fn write_to_database(&mut self) -> FnResult<()> {
        let items_to_write: Vec<Params> = self.params_vec.drain(..).collect();
        if items_to_write.is_empty() {
            return Ok(());
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_write(&items_to_write) {
                Ok(()) => return Ok(()),
                Err(Error::MySqlError(mse)) if mse.code == 1213 && attempts < DEADLOCK_ATTEMPTS => {
                    eprintln!(
                        "Caught MySql deadlock error during {}. Will retry shortly…",
                        self.name
                    );
                    thread::sleep(DEADLOCK_PAUSE);
                }
                Err(e) => bail!("Batch {} failed on attempt {}: {}", self.name, attempts, e),
            }
        }
    }

    fn try_write(&mut self, items: &[Params]) -> Result<()> {
        let mut tx = self.conn.start_transaction(TxOpts::default())?;
        for statement in &self.statements {
            tx.exec_batch(statement, items.iter().cloned())?;
        }
        tx.commit()?;
        Ok(())
    }
}
