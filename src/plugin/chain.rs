// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Handler-chain contract between the host resolver and the interceptor.
//!
//! The host drives a chain of [`DnsHandler`]s; each handler either answers
//! the request through the [`DnsResponseWriter`] or delegates to the next
//! handler in the chain. The interceptor delegates first and inspects what
//! the downstream wrote by wrapping the writer in a [`RecordingWriter`]:
//! the client still receives the downstream response unchanged.

use anyhow::Result;
use async_trait::async_trait;
use hickory_client::op::{Message, ResponseCode};

/// Sink for the response of a DNS request.
#[async_trait]
pub trait DnsResponseWriter: Send {
    /// Deliver a response message towards the client.
    async fn write_msg(&mut self, response: &Message) -> Result<()>;
}

/// One handler in the resolver chain.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    /// The name the handler registers under.
    fn name(&self) -> &'static str;

    /// Handle a request, writing the response through `writer` and
    /// returning the response code. An error means the handler failed
    /// before producing a meaningful answer.
    async fn serve_dns(
        &self,
        request: &Message,
        writer: &mut dyn DnsResponseWriter,
    ) -> Result<ResponseCode>;
}

/// A writer wrapper that records the response while forwarding it.
pub struct RecordingWriter<'a> {
    inner: &'a mut dyn DnsResponseWriter,
    response: Option<Message>,
}

impl<'a> RecordingWriter<'a> {
    /// Wrap an existing writer.
    pub fn new(inner: &'a mut dyn DnsResponseWriter) -> Self {
        Self {
            inner,
            response: None,
        }
    }

    /// The last response written through this wrapper, if any.
    #[must_use]
    pub fn into_response(self) -> Option<Message> {
        self.response
    }
}

#[async_trait]
impl DnsResponseWriter for RecordingWriter<'_> {
    async fn write_msg(&mut self, response: &Message) -> Result<()> {
        self.response = Some(response.clone());
        self.inner.write_msg(response).await
    }
}

/// A writer that discards responses. Useful as the tail of a test chain and
/// for synthetic requests whose answer nobody reads.
#[derive(Default)]
pub struct NullResponseWriter;

#[async_trait]
impl DnsResponseWriter for NullResponseWriter {
    async fn write_msg(&mut self, _response: &Message) -> Result<()> {
        Ok(())
    }
}
