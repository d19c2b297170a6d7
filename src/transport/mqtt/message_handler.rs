//! Pure message routing and processing logic for MQTT events
//!
//! This module contains pure functions for classifying event-loop events,
//! building SUBSCRIBE requests and interpreting SUBACK return codes.

use crate::config::TopicSet;
use rumqttc::{Event, Outgoing, Packet, QoS, SubscribeFilter, SubscribeReasonCode};
use std::borrow::Cow;
use tracing::warn;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

/// Routing decision for one event-loop event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to subscribe
    ConnectionAcknowledged { session_present: bool },
    /// Message received on a subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Subscription answered with one return code per requested filter
    SubscriptionAcknowledged {
        packet_id: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// Broker sent DISCONNECT
    Disconnected,
    /// Our own DISCONNECT was written to the socket
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    packet_id: suback.pkid,
                    return_codes: suback.return_codes.clone(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Build one SUBSCRIBE filter per topic, in the topic set's order
    pub fn build_subscribe_filters(topics: &TopicSet) -> Vec<SubscribeFilter> {
        topics
            .iter()
            .map(|(topic, qos)| SubscribeFilter::new(topic.to_string(), qos_from_level(qos)))
            .collect()
    }

    /// Render a payload for logging; invalid UTF-8 is replaced, not rejected
    pub fn format_payload(payload: &[u8]) -> Cow<'_, str> {
        String::from_utf8_lossy(payload)
    }
}

/// Map a validated QoS level (0..=2) to the rumqttc enum
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// Outcome of one SUBSCRIBE, pairing each requested filter with its return code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionAck {
    /// Filters the broker accepted, with the QoS it granted
    pub granted: TopicSet,
    /// Filters the broker refused
    pub rejected: Vec<String>,
}

impl SubscriptionAck {
    /// Pair requested filters with SUBACK return codes.
    ///
    /// Return codes arrive in request order, which is the topic set's order.
    /// Filters without a matching return code are counted as rejected.
    pub fn from_return_codes(requested: &TopicSet, return_codes: &[SubscribeReasonCode]) -> Self {
        if return_codes.len() != requested.len() {
            warn!(
                requested = requested.len(),
                acknowledged = return_codes.len(),
                "SUBACK return code count does not match the request"
            );
        }

        let mut ack = Self::default();
        for (index, (topic, _)) in requested.iter().enumerate() {
            match return_codes.get(index) {
                Some(SubscribeReasonCode::Success(qos)) => {
                    // Levels coming from QoS are always in range
                    let _ = ack.granted.insert(topic, qos_level(*qos));
                }
                _ => ack.rejected.push(topic.to_string()),
            }
        }
        ack
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}
