//! Per-topic handler registry.
//!
//! Feature areas (chat, scenario, sheets, wheel) each own one handler; the
//! hub and the replica build their tables once at session start and route
//! every inbound message through exactly one handler. A message whose topic
//! has no handler is dropped, never fatal.

use crate::protocol::{Message, Topic};
use crate::transport::ChannelHandle;
use std::collections::HashMap;

pub type Handler<Ctx> = Box<dyn FnMut(&mut Ctx, &Message, &ChannelHandle) + Send>;

pub struct Registry<Ctx> {
    handlers: HashMap<Topic, Handler<Ctx>>,
}

impl<Ctx> Registry<Ctx> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Claim a topic. At most one handler per topic; registering again
    /// replaces the previous handler.
    pub fn register<F>(&mut self, topic: Topic, handler: F)
    where
        F: FnMut(&mut Ctx, &Message, &ChannelHandle) + Send + 'static,
    {
        if self.handlers.insert(topic, Box::new(handler)).is_some() {
            tracing::debug!("Handler for {:?} replaced", topic);
        }
    }

    /// Route a message to its topic's handler, passing the raw message and
    /// the originating channel
    pub fn dispatch(&mut self, ctx: &mut Ctx, msg: &Message, from: &ChannelHandle) {
        match self.handlers.get_mut(&msg.topic()) {
            Some(handler) => handler(ctx, msg, from),
            None => {
                tracing::debug!("No handler for {:?}, dropping {:?}", msg.topic(), msg);
            }
        }
    }
}

impl<Ctx> Default for Registry<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;

    fn chat(text: &str) -> Message {
        Message::Chat {
            from: "test".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_routes_by_topic() {
        let (conn, _other) = transport::pair("a", "b");
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.register(Topic::Chat, |log, msg, _from| {
            if let Message::Chat { text, .. } = msg {
                log.push(format!("chat:{text}"));
            }
        });
        registry.register(Topic::Wheel, |log, _msg, _from| {
            log.push("wheel".to_string());
        });

        let mut log = Vec::new();
        registry.dispatch(&mut log, &chat("hello"), &conn.handle);
        registry.dispatch(&mut log, &Message::SpinFinal { final_angle: 0.0 }, &conn.handle);
        assert_eq!(log, vec!["chat:hello", "wheel"]);
    }

    #[test]
    fn test_last_registration_wins() {
        let (conn, _other) = transport::pair("a", "b");
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.register(Topic::Chat, |log, _msg, _from| log.push("first".to_string()));
        registry.register(Topic::Chat, |log, _msg, _from| log.push("second".to_string()));

        let mut log = Vec::new();
        registry.dispatch(&mut log, &chat("x"), &conn.handle);
        assert_eq!(log, vec!["second"]);
    }

    #[test]
    fn test_unclaimed_topic_is_dropped() {
        let (conn, _other) = transport::pair("a", "b");
        let mut registry: Registry<Vec<String>> = Registry::new();

        let mut log = Vec::new();
        registry.dispatch(&mut log, &chat("nobody home"), &conn.handle);
        assert!(log.is_empty());
    }
}
