//! Pure routing of MQTT event loop events
//!
//! Maps raw rumqttc events onto the handful of cases the client acts on and
//! pairs subscription acknowledgements with the topics they answer.

use rumqttc::v5::mqttbytes::v5::{Filter, Packet, SubscribeReasonCode};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::Event;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route an MQTT event to the action the client takes for it
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    outcomes: suback
                        .return_codes
                        .iter()
                        .map(SubscriptionOutcome::from_reason_code)
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Subscription filters for the data and status topics, in order
    pub fn build_subscription_filters(topics: &[String]) -> Vec<Filter> {
        topics
            .iter()
            .map(|topic| Filter::new(topic.clone(), QoS::AtLeastOnce))
            .collect()
    }

    /// Pair each requested topic with the broker's verdict for it
    ///
    /// SubAck reason codes are ordered like the filters in the request. A
    /// topic without a matching code counts as rejected.
    pub fn pair_subscription_outcomes(
        topics: &[String],
        outcomes: &[SubscriptionOutcome],
    ) -> Vec<(String, SubscriptionOutcome)> {
        topics
            .iter()
            .enumerate()
            .map(|(index, topic)| {
                let outcome = outcomes.get(index).cloned().unwrap_or_else(|| {
                    SubscriptionOutcome::Rejected("missing reason code".to_string())
                });
                (topic.clone(), outcome)
            })
            .collect()
    }
}

/// Broker verdict for one subscription filter
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionOutcome {
    Granted,
    Rejected(String),
}

impl SubscriptionOutcome {
    fn from_reason_code(code: &SubscribeReasonCode) -> Self {
        match code {
            SubscribeReasonCode::Success(_) => SubscriptionOutcome::Granted,
            other => SubscriptionOutcome::Rejected(format!("{other:?}")),
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, SubscriptionOutcome::Granted)
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Session established; subscriptions must be (re)issued
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Broker sent Disconnect
    Disconnected,
    /// SubAck with one outcome per requested filter
    SubscriptionConfirmed {
        packet_id: u16,
        outcomes: Vec<SubscriptionOutcome>,
    },
    /// PingResp and friends
    InfrastructureEvent(String),
    OutgoingEvent,
}
