pub mod event;
pub mod language;
pub mod status;

pub use event::{EventDecodeError, InboundEvent, InitiationMessage};
pub use language::{Language, ParseLanguageError};
pub use status::{ChannelState, PlayerStatus, StatusBus, StreamKind};
