//! Type definitions for the hazard pipeline

pub mod alert;
pub mod hazard;
pub mod table;

pub use alert::{AlertedTable, OverallAlert, RiskAssessment, Severity};
pub use hazard::{Hazard, HazardScores, ScoredTable};
pub use table::{FeatureColumn, FeatureTable, ObservationTable};
