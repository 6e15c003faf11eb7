mod channel;

pub use channel::{
    ChannelConfig, ChannelError, ChannelEvent, CloseReason, SessionChannel, DEFAULT_BACKEND_URL,
};
pub use lingocast_models::ChannelState;
