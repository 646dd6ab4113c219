pub mod bootstrap;
pub mod combat;
pub mod net;
pub mod reconcile;
pub mod session;
pub mod world;

pub use bootstrap::{init_tracing, ClientConfig};
pub use combat::{
    effectiveness, AttackOutcome, CombatState, CombatUnit, EquipSlot, Equipment, HeroId, SkillType,
    UnitPreset,
};
pub use net::{
    decode_event, encode_poll_frame, AuthorityTransport, DecodeError, EventKind, EventRecord,
    HeroSummary, PollResponse, SubmitEvent, TcpAuthorityClient, TransportError,
};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use session::{backoff_delay, epoch_millis, PollPolicy, Session, SessionConfig};
pub use world::{topic, BusEvent, HeroProfile, RewardLedger, World};
