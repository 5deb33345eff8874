/// Model-driven app Classic Look opt-out report.
pub mod classic_look;
