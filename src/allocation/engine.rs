//! Allocation engine
//!
//! Turns one snapshot plus lifecycle events into the next routing table.
//! Every entry point is a pure, synchronous function of its inputs: two
//! engines with the same settings produce the same table for the same
//! snapshot. When a round changes nothing, the snapshot's own
//! `Arc<RoutingTable>` comes back untouched.

use super::deciders::{default_deciders, AllocationDecider, Decision, DecisionContext};
use crate::cluster::{ClusterSnapshot, NodeSet};
use crate::common::{AllocationSettings, Config, Error, Result};
use crate::routing::{
    AllocationStatus, CopyId, NodeView, RoutingNode, RoutingTable, RoutingTableBuilder, ShardCopy,
    ShardState, UnassignedReason,
};
use std::fmt;
use std::sync::Arc;

/// Output of one engine call
#[derive(Debug, Clone)]
pub struct RoutingAllocationResult {
    /// False iff `routing_table` is the instance the call started from
    pub changed: bool,
    pub routing_table: Arc<RoutingTable>,
}

impl RoutingAllocationResult {
    fn unchanged(routing_table: Arc<RoutingTable>) -> Self {
        Self {
            changed: false,
            routing_table,
        }
    }

    /// Next snapshot carrying this routing table
    pub fn apply_to(&self, snapshot: &ClusterSnapshot) -> ClusterSnapshot {
        snapshot.with_routing_table(Arc::clone(&self.routing_table))
    }
}

/// Counters for one reroute pass, for logging
#[derive(Debug, Default)]
struct RerouteStats {
    deassociated: usize,
    relocations: usize,
    placed: usize,
    unplaced: usize,
}

pub struct AllocationEngine {
    settings: AllocationSettings,
    deciders: Vec<Box<dyn AllocationDecider>>,
}

impl fmt::Debug for AllocationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.deciders.iter().map(|d| d.name()).collect();
        f.debug_struct("AllocationEngine")
            .field("settings", &self.settings)
            .field("deciders", &names)
            .finish()
    }
}

impl Default for AllocationEngine {
    fn default() -> Self {
        Self::new(AllocationSettings::default())
    }
}

impl AllocationEngine {
    pub fn new(settings: AllocationSettings) -> Self {
        Self::with_deciders(settings, default_deciders())
    }

    pub fn with_deciders(
        settings: AllocationSettings,
        deciders: Vec<Box<dyn AllocationDecider>>,
    ) -> Self {
        Self { settings, deciders }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.allocation.validate()?;
        Ok(Self::new(config.allocation.clone()))
    }

    pub fn settings(&self) -> &AllocationSettings {
        &self.settings
    }

    /// Place every UNASSIGNED copy that has an eligible node.
    ///
    /// Also unassigns copies whose node left the cluster and starts moving
    /// copies off draining nodes.
    pub fn reroute(&self, snapshot: &ClusterSnapshot) -> RoutingAllocationResult {
        let original = Arc::clone(snapshot.routing_table());
        let mut builder = RoutingTableBuilder::new(Arc::clone(&original));
        self.reroute_builder(&mut builder, snapshot.nodes());
        self.finish(original, builder)
    }

    /// Mark recovered copies STARTED, then reroute.
    ///
    /// Ids that are unknown or not INITIALIZING/RELOCATING are ignored. If no
    /// id applies, the routing table is returned untouched and no reroute
    /// runs.
    pub fn apply_started(
        &self,
        snapshot: &ClusterSnapshot,
        started: &[CopyId],
    ) -> RoutingAllocationResult {
        let original = Arc::clone(snapshot.routing_table());
        let mut builder = RoutingTableBuilder::new(Arc::clone(&original));

        let mut applied = 0;
        for id in started {
            let Some(copy) = builder.copy(id).cloned() else {
                tracing::debug!("Ignoring started event for unknown copy {}", id);
                continue;
            };
            match copy.state() {
                ShardState::Initializing | ShardState::Relocating => {
                    let next = copy.start();
                    tracing::debug!("{} started on {}", id, next.node_id().unwrap_or("?"));
                    builder.update_copy(next);
                    applied += 1;
                }
                state => tracing::debug!("Ignoring started event for {} in state {}", id, state),
            }
        }

        if applied == 0 {
            return RoutingAllocationResult::unchanged(original);
        }
        tracing::info!("Applied {} started copies", applied);
        self.reroute_builder(&mut builder, snapshot.nodes());
        self.finish(original, builder)
    }

    /// Return failed copies to UNASSIGNED so the next reroute retries them.
    ///
    /// A failed relocation is cancelled and the copy stays STARTED on its
    /// source node. Unknown and UNASSIGNED ids are ignored.
    pub fn apply_failed(
        &self,
        snapshot: &ClusterSnapshot,
        failed: &[CopyId],
    ) -> RoutingAllocationResult {
        let original = Arc::clone(snapshot.routing_table());
        let mut builder = RoutingTableBuilder::new(Arc::clone(&original));

        let mut applied = 0;
        for id in failed {
            let Some(copy) = builder.copy(id).cloned() else {
                tracing::debug!("Ignoring failed event for unknown copy {}", id);
                continue;
            };
            let next = match copy.state() {
                ShardState::Initializing | ShardState::Started => {
                    copy.unassign(UnassignedReason::Failed)
                }
                ShardState::Relocating => copy.cancel_relocation(),
                ShardState::Unassigned => {
                    tracing::debug!("Ignoring failed event for unassigned copy {}", id);
                    continue;
                }
            };
            tracing::warn!("{} failed on {}", id, copy.node_id().unwrap_or("?"));
            builder.update_copy(next);
            applied += 1;
        }

        if applied == 0 {
            return RoutingAllocationResult::unchanged(original);
        }
        tracing::info!("Applied {} failed copies", applied);
        self.finish(original, builder)
    }

    /// Start relocating a STARTED copy to `target`.
    pub fn move_copy(
        &self,
        snapshot: &ClusterSnapshot,
        id: &CopyId,
        target: &str,
    ) -> Result<RoutingAllocationResult> {
        let original = Arc::clone(snapshot.routing_table());
        let copy = original
            .copy(id)
            .cloned()
            .ok_or_else(|| Error::CopyNotFound(id.to_string()))?;
        if copy.state() != ShardState::Started {
            return Err(Error::InvalidMove {
                copy: id.to_string(),
                target: target.to_string(),
                reason: format!("copy is {}", copy.state()),
            });
        }

        let view = snapshot.node_view();
        let node = view
            .node(target)
            .ok_or_else(|| Error::NodeNotFound(target.to_string()))?;
        let ctx = DecisionContext {
            settings: &self.settings,
            primary_active: true,
        };
        match self.decide(&copy, node, &ctx) {
            Decision::Yes => {}
            Decision::Throttle => {
                return Err(Error::MoveThrottled {
                    copy: id.to_string(),
                    target: target.to_string(),
                })
            }
            Decision::No => {
                return Err(Error::InvalidMove {
                    copy: id.to_string(),
                    target: target.to_string(),
                    reason: "target is not eligible".into(),
                })
            }
        }

        tracing::info!("Moving {} from {} to {}", id, copy.node_id().unwrap_or("?"), target);
        let mut builder = RoutingTableBuilder::new(Arc::clone(&original));
        builder.update_copy(copy.relocate(target));
        Ok(self.finish(original, builder))
    }

    fn finish(
        &self,
        original: Arc<RoutingTable>,
        builder: RoutingTableBuilder,
    ) -> RoutingAllocationResult {
        let routing_table = builder.build();
        debug_assert!(
            routing_table.check_invariants().is_empty(),
            "routing invariants violated: {:?}",
            routing_table.check_invariants()
        );
        let changed = !Arc::ptr_eq(&original, &routing_table);
        if changed {
            tracing::debug!("Routing table moved to version {}", routing_table.version());
        }
        RoutingAllocationResult {
            changed,
            routing_table,
        }
    }

    fn reroute_builder(&self, builder: &mut RoutingTableBuilder, nodes: &NodeSet) {
        let mut stats = RerouteStats::default();
        self.deassociate_departed(builder, nodes, &mut stats);

        let mut view = NodeView::from_copies(builder.copies(), nodes);
        self.drain(builder, &mut view, &mut stats);
        self.allocate_unassigned(builder, &mut view, &mut stats);

        if stats.deassociated + stats.relocations + stats.placed > 0 {
            tracing::info!(
                "Reroute: {} placed, {} relocating, {} lost with their node, {} left unassigned",
                stats.placed,
                stats.relocations,
                stats.deassociated,
                stats.unplaced
            );
        }
    }

    /// Unassign copies on nodes that left; cancel moves towards them.
    fn deassociate_departed(
        &self,
        builder: &mut RoutingTableBuilder,
        nodes: &NodeSet,
        stats: &mut RerouteStats,
    ) {
        let gone = |node: &str| {
            nodes
                .get(node)
                .map(|n| !n.state.retains_copies())
                .unwrap_or(true)
        };

        let mut updates = Vec::new();
        for copy in builder.copies() {
            let Some(node) = copy.node_id() else {
                continue;
            };
            if gone(node) {
                tracing::debug!("{} lost with node {}", copy.id(), node);
                updates.push(copy.unassign(UnassignedReason::NodeLeft));
                stats.deassociated += 1;
            } else if copy.relocating_to().map(gone).unwrap_or(false) {
                tracing::debug!("{} relocation target left, staying on {}", copy.id(), node);
                updates.push(copy.cancel_relocation());
            }
        }
        for copy in updates {
            builder.update_copy(copy);
        }
    }

    /// Move STARTED copies off draining nodes where a target exists.
    fn drain(
        &self,
        builder: &mut RoutingTableBuilder,
        view: &mut NodeView,
        stats: &mut RerouteStats,
    ) {
        let mut leaving: Vec<ShardCopy> = view
            .nodes()
            .filter(|n| n.descriptor().state.is_draining())
            .flat_map(|n| n.copies().iter())
            .filter(|c| c.state() == ShardState::Started)
            .cloned()
            .collect();
        leaving.sort_by_key(|c| c.id());

        let ctx = DecisionContext {
            settings: &self.settings,
            primary_active: true,
        };
        for copy in leaving {
            match self.select_node(&copy, view, &ctx) {
                Ok(target) => {
                    let moving = copy.relocate(&target);
                    tracing::debug!("Draining {} to {}", copy.id(), target);
                    builder.update_copy(moving.clone());
                    view.record_relocation(&moving);
                    stats.relocations += 1;
                }
                Err(status) => {
                    tracing::debug!("{} cannot leave draining node yet: {}", copy.id(), status);
                }
            }
        }
    }

    /// Primaries first, then replicas, each in copy id order.
    fn allocate_unassigned(
        &self,
        builder: &mut RoutingTableBuilder,
        view: &mut NodeView,
        stats: &mut RerouteStats,
    ) {
        let mut pending: Vec<ShardCopy> = builder
            .copies()
            .filter(|c| c.is_unassigned())
            .cloned()
            .collect();
        pending.sort_by_key(|c| (!c.is_primary(), c.id()));

        'copies: for copy in pending {
            let primary_active = builder
                .shard(copy.index(), copy.shard_id())
                .map(|group| group.primary().is_active())
                .unwrap_or(false);
            let ctx = DecisionContext {
                settings: &self.settings,
                primary_active,
            };

            for decider in &self.deciders {
                if let Err(status) = decider.can_allocate_copy(&copy, &ctx) {
                    builder.update_copy(copy.with_allocation_status(status));
                    stats.unplaced += 1;
                    continue 'copies;
                }
            }

            match self.select_node(&copy, view, &ctx) {
                Ok(node) => {
                    let placed = copy.initialize(&node);
                    tracing::debug!("Placed {} on {}", copy.id(), node);
                    builder.update_copy(placed.clone());
                    view.record_initializing(&placed);
                    stats.placed += 1;
                }
                Err(status) => {
                    if status == AllocationStatus::NoEligibleNode {
                        tracing::debug!("No eligible node for {}", copy.id());
                    }
                    builder.update_copy(copy.with_allocation_status(status));
                    stats.unplaced += 1;
                }
            }
        }
    }

    /// Least loaded eligible node, ties broken by node id.
    fn select_node(
        &self,
        copy: &ShardCopy,
        view: &NodeView,
        ctx: &DecisionContext<'_>,
    ) -> std::result::Result<String, AllocationStatus> {
        let mut candidates: Vec<_> = view.nodes().collect();
        candidates.sort_by(|a, b| {
            a.assigned_count()
                .cmp(&b.assigned_count())
                .then_with(|| a.node_id().cmp(b.node_id()))
        });

        let mut throttled = false;
        for node in candidates {
            match self.decide(copy, node, ctx) {
                Decision::Yes => return Ok(node.node_id().to_string()),
                Decision::Throttle => throttled = true,
                Decision::No => {}
            }
        }
        Err(if throttled {
            AllocationStatus::Throttled
        } else {
            AllocationStatus::NoEligibleNode
        })
    }

    fn decide(
        &self,
        copy: &ShardCopy,
        node: &RoutingNode,
        ctx: &DecisionContext<'_>,
    ) -> Decision {
        self.deciders
            .iter()
            .map(|d| d.can_allocate(copy, node, ctx))
            .fold(Decision::Yes, Decision::merge)
    }
}
