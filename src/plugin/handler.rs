// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The intercepting DNS handler.
//!
//! Every request is delegated to the next handler in the chain; the
//! downstream response reaches the client unchanged. When the query name is
//! tracked (exactly, or as a subdomain of a tracked wildcard) the observed
//! answer (or rcode) is folded into the status of every covering
//! `DNSNameResolver`, with the regular and wildcard hits and the objects in
//! different namespaces all updating concurrently. The handler returns only
//! once every update has completed, so it is synchronous to its caller.

use crate::dns_names::canonical_fqdn;
use crate::plugin::chain::{DnsHandler, DnsResponseWriter, RecordingWriter};
use crate::plugin::update::{
    update_resolved_names_failure, update_resolved_names_success, IpTtls,
};
use crate::plugin::DnsNameResolverPlugin;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use hickory_client::op::{Message, ResponseCode};
use hickory_client::rr::{RData, RecordType};

#[async_trait]
impl DnsHandler for DnsNameResolverPlugin {
    fn name(&self) -> &'static str {
        crate::constants::PLUGIN_NAME
    }

    async fn serve_dns(
        &self,
        request: &Message,
        writer: &mut dyn DnsResponseWriter,
    ) -> Result<ResponseCode> {
        let Some(query) = request.queries().first().cloned() else {
            return self.forward(request, writer).await;
        };
        let qname = canonical_fqdn(&query.name().to_string());

        let (regular_hit, wildcard_hit) = self.index.lookup(&qname);

        // Untracked name: hand the request straight through.
        if regular_hit.is_none() && wildcard_hit.is_none() {
            return self.forward(request, writer).await;
        }

        // Record the downstream response while still sending it to the client.
        let mut recorder = RecordingWriter::new(writer);
        let outcome = self.forward(request, &mut recorder).await;
        let response = recorder.into_response();

        let rcode = match &outcome {
            Ok(rcode) => *rcode,
            Err(_) => response
                .as_ref()
                .map_or(ResponseCode::ServFail, Message::response_code),
        };

        if rcode != ResponseCode::NoError || outcome.is_err() {
            let mut updates = Vec::new();
            if let Some(objects) = &regular_hit {
                updates.push(update_resolved_names_failure(
                    self.store.as_ref(),
                    objects,
                    &qname,
                    rcode,
                    self.failure_threshold,
                    self.minimum_ttl,
                ));
            }
            if let Some(objects) = &wildcard_hit {
                updates.push(update_resolved_names_failure(
                    self.store.as_ref(),
                    objects,
                    &qname,
                    rcode,
                    self.failure_threshold,
                    self.minimum_ttl,
                ));
            }
            join_all(updates).await;
            return outcome;
        }

        // Only A and AAAA answers feed the status.
        let query_type = query.query_type();
        if query_type != RecordType::A && query_type != RecordType::AAAA {
            return outcome;
        }

        let mut ip_ttls = IpTtls::new();
        if let Some(message) = &response {
            for answer in message.answers() {
                let ip = match (query_type, answer.data()) {
                    (RecordType::A, Some(RData::A(ip))) => ip.to_string(),
                    (RecordType::AAAA, Some(RData::AAAA(ip))) => ip.to_string(),
                    _ => continue,
                };
                let mut ttl = i32::try_from(answer.ttl()).unwrap_or(i32::MAX);
                if ttl == 0 {
                    ttl = self.minimum_ttl;
                }
                ip_ttls.insert(ip, ttl);
            }
        }

        // NoError answers without A/AAAA records carry nothing to publish.
        if ip_ttls.is_empty() {
            return outcome;
        }

        let mut updates = Vec::new();
        if let Some(objects) = &regular_hit {
            updates.push(update_resolved_names_success(
                self.store.as_ref(),
                objects,
                &qname,
                &ip_ttls,
            ));
        }
        if let Some(objects) = &wildcard_hit {
            updates.push(update_resolved_names_success(
                self.store.as_ref(),
                objects,
                &qname,
                &ip_ttls,
            ));
        }
        join_all(updates).await;

        outcome
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod handler_tests;
