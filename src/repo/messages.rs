//! Messages between the coach and members

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::bus::{EventBus, Topic};
use crate::error::Result;
use crate::store::{KEY_MESSAGES, Store};
use crate::types::{Message, OutgoingMessage, generate_id};

use super::required;

pub struct MessageRepo {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl MessageRepo {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// All messages in send order
    pub fn list(&self) -> Vec<Message> {
        self.store.read(KEY_MESSAGES)
    }

    /// Send a message. With an `id` this edits the existing message in
    /// place (created_at preserved); without one it appends under a fresh
    /// id. An unknown `id` appends under that id so a retried edit is not
    /// lost.
    pub fn send(&self, outgoing: OutgoingMessage) -> Result<Message> {
        let text = required(&outgoing.text, "text")?;
        let to = required(&outgoing.to, "to")?;

        let mut all = self.list();
        let message = match outgoing.id {
            Some(id) => {
                if let Some(existing) = all.iter_mut().find(|m| m.id == id) {
                    existing.to = to;
                    existing.from = outgoing.from;
                    existing.text = text;
                    existing.clone()
                } else {
                    let message = Message {
                        id,
                        to,
                        from: outgoing.from,
                        text,
                        created_at: Utc::now(),
                    };
                    all.push(message.clone());
                    message
                }
            }
            None => {
                let message = Message {
                    id: generate_id("msg"),
                    to,
                    from: outgoing.from,
                    text,
                    created_at: Utc::now(),
                };
                all.push(message.clone());
                message
            }
        };

        self.store.write(KEY_MESSAGES, &all)?;
        self.bus.publish(&Topic::Messages);
        info!("Stored message {} for {}", message.id, message.to);
        Ok(message)
    }

    /// Messages addressed to one member, in send order
    pub fn for_user(&self, npm: &str) -> Vec<Message> {
        self.list().into_iter().filter(|m| m.to == npm).collect()
    }
}
