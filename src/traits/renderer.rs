use crate::report::SubjectReport;

/// Turns a finished report into a user-facing document.
pub trait ReportRenderer: Send + Sync {
    /// File name written next to the subject's other outputs, e.g. `report.txt`
    fn file_name(&self) -> &'static str;

    fn render(&self, report: &SubjectReport) -> Result<String, String>;
}
