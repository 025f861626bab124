pub mod breaker;
pub mod retry;
pub mod types;

pub use breaker::CircuitBreaker;
pub use retry::RetryExecutor;
pub use types::{BreakerSnapshot, CircuitBreakerConfig, CircuitState, RetryConfig};
