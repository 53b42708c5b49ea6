pub mod alerts;
pub mod status;
