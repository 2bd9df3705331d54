//! End-to-end tests against a live broker.

mod consumer;
mod protocol;
mod publisher;
