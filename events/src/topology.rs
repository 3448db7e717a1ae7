//! AMQP topology for the cinema domain events (SPEC_FULL.md §4.3): a topic
//! exchange for live events, a retry exchange whose queue dead-letters back
//! into it, and a terminal DLQ exchange for messages that exhaust retries.

use lapin::ExchangeKind;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Result as LapinResult};

pub const EXCHANGE_EVENTS: &str = "cinema_events";
pub const EXCHANGE_RETRY: &str = "cinema_retry";
pub const EXCHANGE_DLQ: &str = "cinema_dlq";

pub const QUEUE_RETRY: &str = "cinema_retry_queue";
pub const QUEUE_DLQ: &str = "cinema_dlq_queue";
pub const QUEUE_RESERVATION_CREATED: &str = "reservation_created_queue";
pub const QUEUE_EMAIL_NOTIFICATION: &str = "email_notification_queue";
pub const QUEUE_ANALYTICS: &str = "analytics_queue";
pub const QUEUE_SEAT_RELEASED: &str = "seat_released_queue";

pub const ROUTING_RESERVATION_CREATED: &str = "reservation.created";
pub const ROUTING_PAYMENT_CONFIRMED: &str = "payment.confirmed";
pub const ROUTING_RESERVATION_EXPIRED: &str = "reservation.expired";
pub const ROUTING_SEAT_RELEASED: &str = "seat.released";

pub const HEADER_RETRY_COUNT: &str = "x-retry-count";
pub const HEADER_ORIGINAL_EXCHANGE: &str = "x-original-exchange";
pub const HEADER_ORIGINAL_ROUTING_KEY: &str = "x-original-routing-key";
pub const HEADER_LAST_ERROR: &str = "x-last-error";

pub async fn declare_topology(channel: &Channel) -> LapinResult<()> {
    channel
        .exchange_declare(
            EXCHANGE_EVENTS,
            ExchangeKind::Topic,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            EXCHANGE_RETRY,
            ExchangeKind::Topic,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            EXCHANGE_DLQ,
            ExchangeKind::Topic,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    // Messages land here carrying a per-message `expiration`; once it
    // elapses, RabbitMQ dead-letters them to EXCHANGE_EVENTS under their
    // original routing key, producing a redelivery.
    let mut retry_queue_args = FieldTable::default();
    retry_queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(EXCHANGE_EVENTS.into()),
    );
    channel
        .queue_declare(
            QUEUE_RETRY,
            QueueDeclareOptions { durable: true, ..Default::default() },
            retry_queue_args,
        )
        .await?;
    channel
        .queue_bind(
            QUEUE_RETRY,
            EXCHANGE_RETRY,
            "#",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            QUEUE_DLQ,
            QueueDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            QUEUE_DLQ,
            EXCHANGE_DLQ,
            "#",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    // Single-purpose consumer queues, each bound to the one routing key it cares about.
    for (queue, routing_key) in [
        (QUEUE_RESERVATION_CREATED, ROUTING_RESERVATION_CREATED),
        (QUEUE_SEAT_RELEASED, ROUTING_SEAT_RELEASED),
    ] {
        channel
            .queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await?;
        channel
            .queue_bind(queue, EXCHANGE_EVENTS, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await?;
    }

    // Cross-cutting consumer queues that fan out every event on the exchange.
    for queue in [QUEUE_EMAIL_NOTIFICATION, QUEUE_ANALYTICS] {
        channel
            .queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await?;
        channel
            .queue_bind(queue, EXCHANGE_EVENTS, "#", QueueBindOptions::default(), FieldTable::default())
            .await?;
    }

    Ok(())
}
