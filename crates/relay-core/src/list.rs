//! The resolved media-relay list
//!
//! MRAS hands out relay hostnames; the backend wants addresses. The list
//! tracks one asynchronous A query per relay through the host's resolver
//! and swaps each hostname for its resolved IP in place. A relay whose
//! resolution fails keeps a `None` hostname and is skipped downstream.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Opaque handle of an in-flight DNS query, issued by the host resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsQuery(pub u64);

/// Host capability: asynchronous A-record resolution
///
/// Results come back through [`RelayList::on_resolved`] with the handle
/// returned here. Queries are cancellable until then.
pub trait DnsResolver {
    /// Start an A query for `hostname`
    fn query_a(&mut self, hostname: &str) -> DnsQuery;
    /// Cancel an in-flight query
    fn cancel(&mut self, query: DnsQuery);
}

/// One media relay as advertised by MRAS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRelay {
    /// Hostname until resolution, then the resolved IP; None once
    /// resolution failed
    pub host_name: Option<String>,
    /// UDP allocation port
    pub udp_port: u16,
    /// TCP allocation port
    pub tcp_port: u16,
    /// In-flight resolution, if any
    #[serde(skip)]
    pending: Option<DnsQuery>,
}

impl MediaRelay {
    /// A relay that resolved successfully and can be handed to the backend
    pub fn is_usable(&self) -> bool {
        self.host_name.is_some() && self.pending.is_none()
    }
}

/// The process-wide relay list
#[derive(Debug, Default)]
pub struct RelayList {
    relays: Vec<MediaRelay>,
}

impl RelayList {
    /// Take ownership of a freshly parsed relay list
    pub fn new(relays: Vec<MediaRelay>) -> RelayList {
        RelayList { relays }
    }

    /// All relays, resolved or not
    pub fn relays(&self) -> &[MediaRelay] {
        &self.relays
    }

    /// The relays that resolved and can be given to the backend
    pub fn usable(&self) -> Vec<MediaRelay> {
        self.relays.iter().filter(|r| r.is_usable()).cloned().collect()
    }

    /// True while any query is still in flight
    pub fn resolving(&self) -> bool {
        self.relays.iter().any(|r| r.pending.is_some())
    }

    /// Issue one A query per relay that still holds a hostname
    pub fn resolve_all(&mut self, resolver: &mut dyn DnsResolver) {
        for relay in &mut self.relays {
            if let Some(host) = &relay.host_name {
                if relay.pending.is_none() && host.parse::<IpAddr>().is_err() {
                    relay.pending = Some(resolver.query_a(host));
                }
            }
        }
    }

    /// Deliver a resolution result; returns false when the handle is not ours
    pub fn on_resolved(&mut self, query: DnsQuery, address: Option<IpAddr>) -> bool {
        let Some(relay) = self.relays.iter_mut().find(|r| r.pending == Some(query)) else {
            return false;
        };
        relay.pending = None;
        match address {
            Some(ip) => relay.host_name = Some(ip.to_string()),
            None => {
                tracing::warn!(host = ?relay.host_name, "media relay did not resolve, skipping");
                relay.host_name = None;
            }
        }
        true
    }

    /// Cancel every in-flight query; used when the list is torn down
    pub fn cancel_pending(&mut self, resolver: &mut dyn DnsResolver) {
        for relay in &mut self.relays {
            if let Some(query) = relay.pending.take() {
                resolver.cancel(query);
            }
        }
    }
}
