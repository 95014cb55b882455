pub mod launch;
pub mod report;

pub use launch::Launch;
pub use report::{DownloadedReport, PdfReport};
