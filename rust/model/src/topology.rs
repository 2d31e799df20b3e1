// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Component topology: ports, nodes and containing assemblies.
//!
//! Components expose schema-declared ports, each carrying one
//! [`StreamKind`] in one [`PortRole`]. Ports point at `OS:Node` records;
//! a node has no stream of its own and takes the stream of the ports that
//! reference it. Walking component → outlet node → next component on one
//! stream gives the flow path of a loop. A component's primary stream is
//! that of its first declared port.
//!
//! An unconnected port is a normal state.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::ReverseLookup;
use crate::error::{Error, Result};
use crate::keys::{Handle, TypeTag};
use crate::model::Model;
use crate::reference::FirstMatch;
use crate::schema::{PortRole, StreamKind, NODE};

/// Live state of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConnection {
    pub field: usize,
    pub stream: StreamKind,
    pub role: PortRole,
    pub node: Option<Handle>,
}

/// Ports of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamNeighbors {
    /// Node on the first declared inlet port.
    pub inlet: Option<Handle>,
    /// Node on the first declared outlet port.
    pub outlet: Option<Handle>,
    /// Every declared port in field order.
    pub ports: Vec<PortConnection>,
}

impl StreamNeighbors {
    /// Ports other than the primary inlet and outlet, e.g. the water side
    /// of an air coil.
    pub fn secondary(&self) -> impl Iterator<Item = &PortConnection> + '_ {
        let primary_in = self.ports.iter().find(|p| p.role == PortRole::Inlet).map(|p| p.field);
        let primary_out = self.ports.iter().find(|p| p.role == PortRole::Outlet).map(|p| p.field);
        self.ports
            .iter()
            .filter(move |p| Some(p.field) != primary_in && Some(p.field) != primary_out)
    }

    /// Node on the first port of this stream and role.
    pub fn node_on(&self, stream: StreamKind, role: PortRole) -> Option<Handle> {
        self.ports
            .iter()
            .find(|p| p.stream == stream && p.role == role)
            .and_then(|p| p.node)
    }
}

impl Model {
    fn port_type(&self, component: Handle, port: usize) -> Result<Option<TypeTag>> {
        let Some(type_tag) = self.type_of(component) else {
            return Ok(None);
        };
        if self.schema().port(&type_tag, port).is_none() {
            return Err(Error::NotAPort { type_tag, field: port });
        }
        Ok(Some(type_tag))
    }

    /// Connects a port to a node.
    ///
    /// `Ok(false)` when the component is absent, the target is not a node,
    /// or the node already carries a different stream. The port is left as
    /// it was in every such case.
    pub fn connect(&self, component: Handle, port: usize, node: Handle) -> Result<bool> {
        if self.port_type(component, port)?.is_none() {
            return Ok(false);
        }
        if self.type_of(node) != Some(NODE) {
            tracing::debug!(%component, port, target = %node, "connection target is not a node");
            return Ok(false);
        }
        self.set_reference(component, port, node)
    }

    /// Clears a port. The node stays in the model.
    ///
    /// When the port was connected, holders registered with
    /// [`remove_on_disconnect`](crate::SchemaBuilder::remove_on_disconnect)
    /// for it are removed as well.
    pub fn disconnect(&self, component: Handle, port: usize) -> Result<bool> {
        let Some(type_tag) = self.port_type(component, port)? else {
            return Ok(false);
        };
        let was_connected = self.resolve(component, port).is_some();
        if !self.clear_reference(component, port) {
            return Ok(false);
        }
        let holder_types = self.schema().disconnect_removals(&type_tag, port);
        if was_connected && !holder_types.is_empty() {
            for holder in self.dependents(component) {
                let is_registered = self.type_of(holder).is_some_and(|t| holder_types.contains(&t));
                if is_registered {
                    let outcome = self.remove(holder);
                    tracing::debug!(%component, port, %holder, removed = outcome.removed().len(), "removed holder of disconnected port");
                }
            }
        }
        Ok(true)
    }

    /// Stream carried by a node: that of the first port referencing it.
    pub fn node_stream_kind(&self, node: Handle) -> Option<StreamKind> {
        self.node_connections(node).first().map(|(_, p)| p.stream)
    }

    /// Every port connected to a node, by component insertion order.
    pub fn node_connections(&self, node: Handle) -> Vec<(Handle, PortConnection)> {
        let store = self.store();
        store
            .referrer_slots(node)
            .into_iter()
            .filter(|(_, slot)| slot.is_top_level())
            .filter_map(|(component, slot)| {
                let type_tag = store.get(component)?.type_tag();
                let (stream, role) = self.schema().port(type_tag, slot.index)?;
                Some((
                    component,
                    PortConnection {
                        field: slot.index,
                        stream,
                        role,
                        node: Some(node),
                    },
                ))
            })
            .collect()
    }

    /// Ports of a component; `None` when it is absent.
    pub fn stream_neighbors(&self, component: Handle) -> Option<StreamNeighbors> {
        let store = self.store();
        let record = store.get(component)?;
        let ports: Vec<PortConnection> = self
            .schema()
            .ports(record.type_tag())
            .into_iter()
            .map(|(field, stream, role)| PortConnection {
                field,
                stream,
                role,
                node: record.pointer(field),
            })
            .collect();
        let first = |role| ports.iter().find(|p| p.role == role).and_then(|p| p.node);
        let inlet = first(PortRole::Inlet);
        let outlet = first(PortRole::Outlet);
        Some(StreamNeighbors { inlet, outlet, ports })
    }

    /// The assembly holding `component` in a sub-component slot.
    ///
    /// Candidate types are tried in the given order, records of each type in
    /// insertion order; the first hit wins.
    pub fn find_containing_assembly(&self, component: Handle, candidates: &[TypeTag]) -> Option<Handle> {
        let store = self.store();
        if !store.contains(component) {
            return None;
        }
        match store.reverse_lookup() {
            ReverseLookup::Scan => candidates.iter().find_map(|type_tag| {
                let fields = self.schema().sub_component_fields(type_tag);
                store
                    .records_of_type(type_tag)
                    .find(|r| fields.iter().any(|f| r.pointer(*f) == Some(component)))
                    .map(|r| r.handle())
            }),
            ReverseLookup::Indexed => {
                let referrers = store.referrer_slots(component);
                candidates.iter().find_map(|type_tag| {
                    let fields = self.schema().sub_component_fields(type_tag);
                    referrers
                        .iter()
                        .find(|(source, slot)| {
                            slot.is_top_level()
                                && fields.contains(&slot.index)
                                && store.get(*source).is_some_and(|r| r.type_tag() == type_tag)
                        })
                        .map(|(source, _)| *source)
                })
            }
        }
    }

    /// Stream of the component's first declared port.
    pub fn primary_stream(&self, component: Handle) -> Option<StreamKind> {
        let type_tag = self.type_of(component)?;
        self.schema().ports(&type_tag).first().map(|(_, stream, _)| *stream)
    }

    /// The component whose inlet sits on this component's outlet node, on
    /// its primary stream.
    pub fn downstream_component(&self, component: Handle) -> Option<FirstMatch> {
        self.downstream_on(component, self.primary_stream(component)?)
    }

    /// The component whose outlet sits on this component's inlet node, on
    /// its primary stream.
    pub fn upstream_component(&self, component: Handle) -> Option<FirstMatch> {
        self.upstream_on(component, self.primary_stream(component)?)
    }

    /// Downstream neighbor through the first outlet carrying `stream`.
    pub fn downstream_on(&self, component: Handle, stream: StreamKind) -> Option<FirstMatch> {
        let outlet = self.stream_neighbors(component)?.node_on(stream, PortRole::Outlet)?;
        let candidates = self.components_on(outlet, PortRole::Inlet);
        self.first_match(component, "downstream component", candidates)
    }

    /// Upstream neighbor through the first inlet carrying `stream`.
    pub fn upstream_on(&self, component: Handle, stream: StreamKind) -> Option<FirstMatch> {
        let inlet = self.stream_neighbors(component)?.node_on(stream, PortRole::Inlet)?;
        let candidates = self.components_on(inlet, PortRole::Outlet);
        self.first_match(component, "upstream component", candidates)
    }

    fn components_on(&self, node: Handle, role: PortRole) -> Vec<Handle> {
        let mut seen = FxHashSet::default();
        self.node_connections(node)
            .into_iter()
            .filter(|(_, p)| p.role == role)
            .map(|(c, _)| c)
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Components in flow order starting at `start`, following outlets of
    /// the start's primary stream.
    pub fn stream_path(&self, start: Handle) -> Vec<Handle> {
        match self.primary_stream(start) {
            Some(stream) => self.stream_path_on(start, stream),
            None if self.contains(start) => vec![start],
            None => Vec::new(),
        }
    }

    /// Components in flow order starting at `start`, following outlets that
    /// carry `stream`.
    ///
    /// Stops at an open outlet, a component without an outlet on `stream`,
    /// or when the walk returns to a component it already visited (a closed
    /// loop).
    pub fn stream_path_on(&self, start: Handle, stream: StreamKind) -> Vec<Handle> {
        if !self.contains(start) {
            return Vec::new();
        }
        let mut path = vec![start];
        let mut visited: FxHashSet<Handle> = [start].into_iter().collect();
        let mut current = start;
        while let Some(next) = self.downstream_on(current, stream) {
            if !visited.insert(next.handle) {
                break;
            }
            path.push(next.handle);
            current = next.handle;
        }
        path
    }

    /// Every component reachable from `start` through shared nodes, in
    /// breadth-first order.
    pub fn connected_components(&self, start: Handle) -> Vec<Handle> {
        if !self.contains(start) {
            return Vec::new();
        }
        let mut visited: FxHashSet<Handle> = [start].into_iter().collect();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(component) = queue.pop_front() {
            order.push(component);
            let Some(neighbors) = self.stream_neighbors(component) else {
                continue;
            };
            for node in neighbors.ports.iter().filter_map(|p| p.node) {
                for (next, _) in self.node_connections(node) {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        order
    }
}
