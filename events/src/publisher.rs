use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel};
use tracing::{instrument, warn};

use crate::payloads::{
    PaymentConfirmedEvent, ReservationCreatedEvent, ReservationExpiredEvent, SeatReleasedEvent,
};
use crate::retry::RetryPolicy;
use crate::topology::{
    EXCHANGE_DLQ, EXCHANGE_EVENTS, EXCHANGE_RETRY, HEADER_LAST_ERROR, HEADER_ORIGINAL_EXCHANGE,
    HEADER_ORIGINAL_ROUTING_KEY, HEADER_RETRY_COUNT, ROUTING_PAYMENT_CONFIRMED,
    ROUTING_RESERVATION_CREATED, ROUTING_RESERVATION_EXPIRED, ROUTING_SEAT_RELEASED,
};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn reservation_created(&self, event: &ReservationCreatedEvent) -> anyhow::Result<()>;
    async fn payment_confirmed(&self, event: &PaymentConfirmedEvent) -> anyhow::Result<()>;
    async fn reservation_expired(&self, event: &ReservationExpiredEvent) -> anyhow::Result<()>;
    async fn seat_released(&self, event: &SeatReleasedEvent) -> anyhow::Result<()>;
}

/// Publishes onto `cinema_events`; the `declare_topology` call at startup
/// also wires the retry/DLQ exchanges described in SPEC_FULL.md §4.3, which
/// a consumer's error handler routes into via [`route_for_retry`] / the DLQ
/// path below. Publishing here is fire-and-forget: a crash between the DB
/// commit and this call can lose the event.
pub struct LapinEventPublisher {
    channel: Channel,
    retry_policy: RetryPolicy,
}

impl LapinEventPublisher {
    pub fn new(channel: Channel) -> Self {
        Self { channel, retry_policy: RetryPolicy::default() }
    }

    pub fn with_retry_policy(channel: Channel, retry_policy: RetryPolicy) -> Self {
        Self { channel, retry_policy }
    }

    #[instrument(skip(self, body), fields(routing_key = %routing_key))]
    async fn publish(&self, routing_key: &str, body: &[u8]) -> anyhow::Result<()> {
        let props = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_content_type("application/json".into());

        self.channel
            .basic_publish(EXCHANGE_EVENTS, routing_key, BasicPublishOptions::default(), body, props)
            .await?
            .await?;
        Ok(())
    }

    /// Re-publishes a failed message onto `cinema_retry` with an
    /// `expiration` computed from its current `x-retry-count`, or diverts it
    /// to `cinema_dlq` once `maxRetries` is exhausted. Headers not owned by
    /// the retry protocol (`contentType`, `correlationId`, `messageId`,
    /// `timestamp`, `type`, `appId`, `contentEncoding`) are carried through
    /// from `original_props` unchanged.
    pub async fn route_for_retry(
        &self,
        original_exchange: &str,
        original_routing_key: &str,
        body: &[u8],
        original_props: &BasicProperties,
        last_error: &str,
    ) -> anyhow::Result<()> {
        let mut headers = original_props
            .headers()
            .clone()
            .unwrap_or_default();

        let retry_count = match headers.inner().get(&lapin::types::ShortString::from(HEADER_RETRY_COUNT)) {
            Some(AMQPValue::LongInt(n)) => (*n).max(0) as u32,
            Some(AMQPValue::ShortInt(n)) => (*n).max(0) as u32,
            _ => 0,
        };
        let next_count = retry_count + 1;

        headers.insert(HEADER_RETRY_COUNT.into(), AMQPValue::LongInt(next_count as i32));
        headers.insert(
            HEADER_ORIGINAL_EXCHANGE.into(),
            AMQPValue::LongString(LongString::from(original_exchange.to_string())),
        );
        headers.insert(
            HEADER_ORIGINAL_ROUTING_KEY.into(),
            AMQPValue::LongString(LongString::from(original_routing_key.to_string())),
        );
        headers.insert(
            HEADER_LAST_ERROR.into(),
            AMQPValue::LongString(LongString::from(last_error.to_string())),
        );

        let props = carry_props(original_props, headers);

        if self.retry_policy.exhausted(retry_count) {
            warn!(retry_count, original_routing_key, "retries exhausted, routing to DLQ");
            self.channel
                .basic_publish(
                    EXCHANGE_DLQ,
                    original_routing_key,
                    BasicPublishOptions::default(),
                    body,
                    props,
                )
                .await?
                .await?;
            return Ok(());
        }

        let delay_ms = self.retry_policy.delay_ms(retry_count);
        let props = props.with_expiration(delay_ms.to_string().into());

        self.channel
            .basic_publish(
                EXCHANGE_RETRY,
                original_routing_key,
                BasicPublishOptions::default(),
                body,
                props,
            )
            .await?
            .await?;
        Ok(())
    }
}

fn carry_props(original: &BasicProperties, headers: FieldTable) -> BasicProperties {
    let mut props = BasicProperties::default().with_delivery_mode(2).with_headers(headers);
    if let Some(v) = original.content_type() {
        props = props.with_content_type(v.clone());
    }
    if let Some(v) = original.content_encoding() {
        props = props.with_content_encoding(v.clone());
    }
    if let Some(v) = original.correlation_id() {
        props = props.with_correlation_id(v.clone());
    }
    if let Some(v) = original.message_id() {
        props = props.with_message_id(v.clone());
    }
    if let Some(v) = original.timestamp() {
        props = props.with_timestamp(*v);
    }
    if let Some(v) = original.kind() {
        props = props.with_kind(v.clone());
    }
    if let Some(v) = original.app_id() {
        props = props.with_app_id(v.clone());
    }
    props
}

#[async_trait]
impl EventPublisher for LapinEventPublisher {
    async fn reservation_created(&self, event: &ReservationCreatedEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;
        self.publish(ROUTING_RESERVATION_CREATED, &body).await
    }

    async fn payment_confirmed(&self, event: &PaymentConfirmedEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;
        self.publish(ROUTING_PAYMENT_CONFIRMED, &body).await
    }

    async fn reservation_expired(&self, event: &ReservationExpiredEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;
        self.publish(ROUTING_RESERVATION_EXPIRED, &body).await
    }

    async fn seat_released(&self, event: &SeatReleasedEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;
        self.publish(ROUTING_SEAT_RELEASED, &body).await
    }
}

/// In-memory recorder for tests — the `actions` crate asserts on the events
/// an action would have emitted without a broker connection.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    pub enum RecordedEvent {
        ReservationCreated(ReservationCreatedEvent),
        PaymentConfirmed(PaymentConfirmedEvent),
        ReservationExpired(ReservationExpiredEvent),
        SeatReleased(SeatReleasedEvent),
    }

    #[derive(Default)]
    pub struct MockEventPublisher {
        pub events: Mutex<Vec<RecordedEvent>>,
    }

    impl MockEventPublisher {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl EventPublisher for MockEventPublisher {
        async fn reservation_created(&self, event: &ReservationCreatedEvent) -> anyhow::Result<()> {
            self.events.lock().push(RecordedEvent::ReservationCreated(event.clone()));
            Ok(())
        }

        async fn payment_confirmed(&self, event: &PaymentConfirmedEvent) -> anyhow::Result<()> {
            self.events.lock().push(RecordedEvent::PaymentConfirmed(event.clone()));
            Ok(())
        }

        async fn reservation_expired(&self, event: &ReservationExpiredEvent) -> anyhow::Result<()> {
            self.events.lock().push(RecordedEvent::ReservationExpired(event.clone()));
            Ok(())
        }

        async fn seat_released(&self, event: &SeatReleasedEvent) -> anyhow::Result<()> {
            self.events.lock().push(RecordedEvent::SeatReleased(event.clone()));
            Ok(())
        }
    }
}

pub use mock::MockEventPublisher;
