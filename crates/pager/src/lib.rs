//! Paging channel: message store, delivery queue, appliance transmitter and
//! the scheduling loop that drives them.

pub mod events;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod transmitter;
pub mod transport;

pub use events::{EventSink, MemoryEventSink, RedisEventSink, TracingEventSink};
pub use policy::DeliveryPolicy;
pub use queue::{DeliveryQueue, QueueError};
pub use scheduler::{DeliveryScheduler, SchedulerIntervals, TickOutcome};
pub use store::{Claim, ConsumerLock, MemoryPagerStore, PagerMessageStore, PgPagerStore};
pub use transmitter::{TapTransmitter, TransmitError, Transmitter};
pub use transport::{PagerSettings, PagerTransport};
