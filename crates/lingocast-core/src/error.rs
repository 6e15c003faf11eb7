use lingocast_util::validation::ValidationError;
use lingocast_ws::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("session channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("player is shut down")]
    Shutdown,
}
