pub mod payloads;
pub mod publisher;
pub mod retry;
pub mod topology;

pub use payloads::{
    PaymentConfirmedEvent, ReservationCreatedEvent, ReservationExpiredEvent, SeatReleasedEvent,
};
pub use publisher::mock;
pub use publisher::{EventPublisher, LapinEventPublisher, MockEventPublisher};
pub use retry::{ReconnectBackoff, RetryPolicy};
pub use topology::declare_topology;
