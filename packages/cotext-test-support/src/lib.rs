#![forbid(unsafe_code)]
//! Simulated hub network for convergence suites.
//!
//! One host runs a [`ConcurrentDocumentServer`], every client a
//! [`ConcurrentDocumentClient`]. Each directed link is a FIFO queue, so any delivery order a
//! test picks is consistent with FIFO-per-sender transport.

use std::collections::{BTreeMap, VecDeque};

use cotext_core::{
    ConcurrentDocumentClient, ConcurrentDocumentServer, Operation, Request, Result, SiteId,
    TextDocument, VectorTime,
};

/// Message travelling from the host to one client.
#[derive(Clone, Debug)]
pub enum Downstream {
    Request(Request),
    Acknowledge(VectorTime),
}

/// A directed link with messages in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Link {
    ToHost(SiteId),
    ToClient(SiteId),
}

struct SimClient {
    engine: ConcurrentDocumentClient,
    doc: TextDocument,
}

pub struct HubSimulation {
    host: SiteId,
    server: ConcurrentDocumentServer,
    host_doc: TextDocument,
    clients: BTreeMap<SiteId, SimClient>,
    upstream: BTreeMap<SiteId, VecDeque<Request>>,
    downstream: BTreeMap<SiteId, VecDeque<Downstream>>,
    acknowledge: bool,
}

impl HubSimulation {
    pub fn new(initial: &str, host: &str, clients: &[&str]) -> Self {
        let host = SiteId::new(host);
        let mut server = ConcurrentDocumentServer::new(host.clone());
        let mut sim_clients = BTreeMap::new();
        let mut upstream = BTreeMap::new();
        let mut downstream = BTreeMap::new();
        for name in clients {
            let site = SiteId::new(*name);
            server.add_client(site.clone());
            sim_clients.insert(
                site.clone(),
                SimClient {
                    engine: ConcurrentDocumentClient::new(site.clone(), host.clone()),
                    doc: TextDocument::new(initial),
                },
            );
            upstream.insert(site.clone(), VecDeque::new());
            downstream.insert(site, VecDeque::new());
        }
        Self {
            host,
            server,
            host_doc: TextDocument::new(initial),
            clients: sim_clients,
            upstream,
            downstream,
            acknowledge: true,
        }
    }

    /// Disables out-of-band acknowledgments from the host; pending queues then shrink only
    /// when the host sends edits.
    pub fn without_acknowledgments(mut self) -> Self {
        self.acknowledge = false;
        self
    }

    pub fn host(&self) -> &SiteId {
        &self.host
    }

    /// All sites, host first.
    pub fn sites(&self) -> Vec<SiteId> {
        std::iter::once(self.host.clone())
            .chain(self.clients.keys().cloned())
            .collect()
    }

    pub fn content(&self, site: &SiteId) -> Option<String> {
        if *site == self.host {
            return Some(self.host_doc.content());
        }
        self.clients.get(site).map(|c| c.doc.content())
    }

    /// Applies an edit at `site` and queues the resulting requests.
    pub fn local_edit(&mut self, site: &SiteId, op: Operation) -> Result<()> {
        if *site == self.host {
            self.host_doc.apply(&op)?;
            for out in self.server.apply_local(op) {
                self.push_downstream(&out.target, Downstream::Request(out.request));
            }
            return Ok(());
        }
        let client = self
            .clients
            .get_mut(site)
            .ok_or_else(|| cotext_core::Error::UnknownSite(site.clone()))?;
        client.doc.apply(&op)?;
        let request = client.engine.apply_local(op);
        if let Some(queue) = self.upstream.get_mut(site) {
            queue.push_back(request);
        }
        Ok(())
    }

    /// Links that currently have messages in flight, in a stable order.
    pub fn busy_links(&self) -> Vec<Link> {
        let up = self
            .upstream
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(site, _)| Link::ToHost(site.clone()));
        let down = self
            .downstream
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(site, _)| Link::ToClient(site.clone()));
        up.chain(down).collect()
    }

    /// Delivers the oldest message on `link`. Returns `false` if the link was idle.
    pub fn deliver(&mut self, link: &Link) -> Result<bool> {
        match link {
            Link::ToHost(sender) => {
                let Some(request) = self.upstream.get_mut(sender).and_then(VecDeque::pop_front)
                else {
                    return Ok(false);
                };
                let relay = self.server.receive(request)?;
                self.host_doc.apply(&relay.operation)?;
                for out in relay.outgoing {
                    self.push_downstream(&out.target, Downstream::Request(out.request));
                }
                if self.acknowledge {
                    self.push_downstream(sender, Downstream::Acknowledge(relay.acknowledgment));
                }
                Ok(true)
            }
            Link::ToClient(target) => {
                let Some(message) = self.downstream.get_mut(target).and_then(VecDeque::pop_front)
                else {
                    return Ok(false);
                };
                let Some(client) = self.clients.get_mut(target) else {
                    return Ok(false);
                };
                match message {
                    Downstream::Request(request) => {
                        let op = client.engine.receive(request)?;
                        client.doc.apply(&op)?;
                    }
                    Downstream::Acknowledge(timestamp) => client.engine.acknowledge(timestamp),
                }
                Ok(true)
            }
        }
    }

    /// Delivers the message on the `choice % busy`-th busy link; `false` once quiet.
    pub fn deliver_nth(&mut self, choice: usize) -> Result<bool> {
        let links = self.busy_links();
        if links.is_empty() {
            return Ok(false);
        }
        let link = links[choice % links.len()].clone();
        self.deliver(&link)
    }

    /// Delivers everything still in flight.
    pub fn flush(&mut self) -> Result<()> {
        while let Some(link) = self.busy_links().into_iter().next() {
            self.deliver(&link)?;
        }
        Ok(())
    }

    /// True when every site holds the same content.
    pub fn converged(&self) -> bool {
        let host = self.host_doc.content();
        self.clients.values().all(|c| c.doc.content() == host)
    }

    pub fn client_pending(&self, site: &SiteId) -> Option<usize> {
        self.clients.get(site).map(|c| c.engine.pending_len())
    }

    fn push_downstream(&mut self, target: &SiteId, message: Downstream) {
        if let Some(queue) = self.downstream.get_mut(target) {
            queue.push_back(message);
        }
    }

    /// Char length of the document at `site`.
    pub fn doc_len(&self, site: &SiteId) -> usize {
        if *site == self.host {
            return self.host_doc.len_chars();
        }
        self.clients
            .get(site)
            .map(|c| c.doc.len_chars())
            .unwrap_or_default()
    }
}

/// Deterministically derives a valid edit for a document of `content`.
///
/// Seeds come from the property-test generator; the same seeds always give the same edit.
pub fn edit_from_seeds(content: &str, insert: bool, position_seed: usize, len_seed: usize) -> Operation {
    let len = content.chars().count();
    if insert || len == 0 {
        let position = position_seed % (len + 1);
        let text: String = (0..(len_seed % 3) + 1)
            .map(|i| char::from(b'a' + ((position_seed + len_seed + i) % 26) as u8))
            .collect();
        Operation::insert(position, text)
    } else {
        let position = position_seed % len;
        let del_len = (len_seed % 4 + 1).min(len - position);
        let text: String = content.chars().skip(position).take(del_len).collect();
        Operation::delete(position, text)
    }
}
