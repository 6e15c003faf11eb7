pub mod audio {
    pub mod decode;
    pub mod fragment;
    pub mod muted;
    pub mod playback;
}

pub use audio::fragment::{
    Completion, Fragment, FragmentId, FragmentPlayer, PlaybackReport, PlaybackTicket,
};
pub use audio::muted::MutedPlayer;
pub use audio::playback::{CpalPlayer, PlaybackError};
