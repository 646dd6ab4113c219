pub mod transport;
pub mod wire;

pub use transport::{encode_poll_frame, AuthorityTransport, TcpAuthorityClient, TransportError};
pub use wire::{
    decode_event, ChatMessage, DecodeError, DecodedEvent, DeleteEvent, EventId, EventKind,
    EventRecord, HeroSummary, PollResponse, ReconcileAction, SubmitEvent, UnitRecord, WirePosition,
};
