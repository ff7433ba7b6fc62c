pub mod config;
pub mod contracts;
pub mod db;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    DecisionRequest, DecisionResponse, HealthResponse, PaymentsResponse, SubmitMilestoneRequest,
    VerifyMilestoneRequest, VerifyMilestoneResponse,
};
pub use db::connect_database;
pub use redis_bus::{ESCROW_EVENTS_CHANNEL, RedisBus};
