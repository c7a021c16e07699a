// Domain types shared by the Vigil alert server and its clients.

pub mod category;
pub mod constants;
pub mod error;
pub mod geo;
pub mod report;

pub use category::Category;
pub use error::CategoryError;
pub use geo::{anonymize, neighborhood, zone_topic, AnonymizedLocation};
pub use report::{Report, ReportView};
