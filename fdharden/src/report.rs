//! Hardening report.
//!
//! Records which functions were compiled into hardened form and persists
//! them one symbol per line, so a follow-up build can tell already-hardened
//! translation units apart from fresh ones.
use std::{fs, io::Write as _, path::Path};

use log::info;

use crate::Error;

#[derive(Debug, Default, Clone)]
pub struct HardenReport {
    compiled: Vec<String>,
}

impl HardenReport {
    pub fn record(&mut self, symbol: impl Into<String>) {
        self.compiled.push(symbol.into());
    }

    pub fn compiled(&self) -> &[String] {
        &self.compiled
    }

    /// Append the recorded symbols to `path`, one per line. Earlier runs'
    /// entries are kept; consumers deduplicate on read.
    pub fn persist(&self, path: &Path) -> Result<(), Error> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        for symbol in &self.compiled {
            writeln!(file, "{symbol}")?;
        }
        info!(
            "recorded {} hardened function(s) to {}",
            self.compiled.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_appends_one_symbol_per_line() {
        let dir = std::env::temp_dir().join("fdharden-report-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("report-{}.txt", uuid::Uuid::new_v4()));

        let mut report = HardenReport::default();
        report.record("main");
        report.record("compute");
        report.persist(&path).unwrap();

        let mut again = HardenReport::default();
        again.record("later");
        again.persist(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), ["main", "compute", "later"]);
        std::fs::remove_file(&path).unwrap();
    }
}
