pub mod briefing;
pub mod budget;
pub mod calendar;
pub mod cluster;
pub mod digest;
pub mod diversify;
pub mod embedding_input;
pub mod ledger;
pub mod plan;
pub mod profile;
pub mod ranking;
pub mod status;
pub mod text;
