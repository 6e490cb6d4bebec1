pub mod attributes;
pub mod declarative;
pub mod report;
