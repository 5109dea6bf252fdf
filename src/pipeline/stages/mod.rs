pub mod authentication;
pub mod authorization;
pub mod correlation;
pub mod rate_limit;

pub use authentication::AuthenticationStage;
pub use authorization::AuthorizationStage;
pub use correlation::CorrelationStage;
pub use rate_limit::RateLimitStage;
