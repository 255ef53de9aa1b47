//! Query project files and conversion reports

mod project_file;
mod report;

pub use project_file::{parse_project, parse_project_str, QueryProject, QuerySource};
pub use report::{write_report, QueryReport, ReportSummary};
