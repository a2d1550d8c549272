//! Result printing.

use batchmv::RunReport;
use std::io::{self, Write};

/// Print the report to stdout, one value per line or as JSON.
pub fn print_report(report: &RunReport, json: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        report.write_json(&mut out)?;
    } else {
        report.write_lines(&mut out)?;
    }
    out.flush()
}
