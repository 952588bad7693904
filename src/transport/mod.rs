//! Real-time media room wrapper
//!
//! The media library itself is an external collaborator. It is consumed through
//! [`RoomConnector`] and [`Room`], and everything it reports arrives as a
//! [`TransportEvent`] on a single ordered channel.

mod events;
mod session;

pub use events::{ConnectionQuality, RemoteTrack, TrackKind, TransportEvent};
pub use session::{
    EventReceiver, EventSender, PublishOptions, Room, RoomConnector, RoomOptions, TransportSession,
};
