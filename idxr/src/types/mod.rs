pub mod constant;
pub mod index;
pub mod options;
pub mod report;
