//! Bulk operations over all program slots

use tracing::{info, warn};

use crate::backup::Backup;
use crate::connection::{Connection, Transport};
use crate::error::Result;
use crate::message::ProgramIndex;

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Slots written to the device
    pub written: Vec<ProgramIndex>,
    /// Slots with no program in the backup
    pub missing: Vec<ProgramIndex>,
}

/// Read the programs of all slots
pub async fn backup<T: Transport>(conn: &Connection<T>) -> Result<Backup> {
    let mut backup = Backup::default();
    for index in ProgramIndex::all() {
        let program = conn.read_program(index).await?;
        backup.programs.insert(index.get(), program);
    }
    info!("Read {} programs", backup.programs.len());
    Ok(backup)
}

/// Write every slot present in `backup` to the device.
///
/// All programs are validated before the first write, so a bad entry
/// leaves the device untouched.
pub fn restore<T: Transport>(conn: &Connection<T>, backup: &Backup) -> Result<RestoreReport> {
    for key in backup.programs.keys() {
        if ProgramIndex::new(*key).is_err() {
            warn!("Ignoring program {} in backup (slots are 1-4)", key);
        }
    }

    let mut report = RestoreReport::default();
    let mut pending = Vec::new();
    for index in ProgramIndex::all() {
        match backup.programs.get(&index.get()) {
            Some(program) => {
                program.validate()?;
                pending.push((index, program));
            }
            None => report.missing.push(index),
        }
    }

    for (index, program) in pending {
        conn.write_program(index, program)?;
        report.written.push(index);
    }
    info!(
        "Restored {} programs ({} missing)",
        report.written.len(),
        report.missing.len()
    );
    Ok(report)
}
