//! Derived graphs over a block set: relation edges, drive chains and limiters.
//!
//! Everything here is recomputed from scratch on each call.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::block_types::Role;
use super::types::{Block, BlockData, FieldValue, Limiters, Link, RelationEdge};
use crate::{BrewlinkError, Result};

fn visit_links<'a>(value: &'a FieldValue, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a Link)>) {
    match value {
        FieldValue::Link(link) => out.push((path.clone(), link)),
        FieldValue::List(items) => {
            for (idx, item) in items.iter().enumerate() {
                path.push(idx.to_string());
                visit_links(item, path, out);
                path.pop();
            }
        }
        FieldValue::Object(obj) => visit_data_links(obj, path, out),
        FieldValue::Scalar(_) | FieldValue::Quantity(_) => {}
    }
}

fn visit_data_links<'a>(data: &'a BlockData, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a Link)>) {
    for (key, value) in data.iter() {
        path.push(key.to_string());
        visit_links(value, path, out);
        path.pop();
    }
}

/// All links in `data`, depth-first in field order, with their field paths
pub fn collect_links(data: &BlockData) -> Vec<(Vec<String>, &Link)> {
    let mut out = Vec::new();
    visit_data_links(data, &mut Vec::new(), &mut out);
    out
}

pub fn calculate_relations(blocks: &[Block]) -> Vec<RelationEdge> {
    blocks
        .iter()
        .flat_map(|block| {
            collect_links(&block.data)
                .into_iter()
                .filter_map(move |(relation, link)| {
                    link.target().map(|target| RelationEdge {
                        source: block.id.clone(),
                        target: target.to_string(),
                        relation,
                    })
                })
        })
        .collect()
}

struct DriveGraph<'a> {
    // driven id -> ids of the blocks driving it, in collection order
    drivers: HashMap<&'a str, Vec<&'a str>>,
    // driven ids in first-seen order
    driven: Vec<&'a str>,
    is_driver: HashSet<&'a str>,
}

impl<'a> DriveGraph<'a> {
    fn build(blocks: &'a [Block]) -> Self {
        let mut graph = DriveGraph {
            drivers: HashMap::new(),
            driven: Vec::new(),
            is_driver: HashSet::new(),
        };
        for block in blocks {
            for (_, link) in collect_links(&block.data) {
                let Some(target) = link.target().filter(|_| link.driven) else {
                    continue;
                };
                let drivers = graph.drivers.entry(target).or_insert_with(|| {
                    graph.driven.push(target);
                    Vec::new()
                });
                if !drivers.contains(&block.id.as_str()) {
                    drivers.push(block.id.as_str());
                }
                graph.is_driver.insert(block.id.as_str());
            }
        }
        graph
    }

    fn extend(
        &self,
        id: &'a str,
        mut chain: Vec<&'a str>,
        chains: &mut Vec<Vec<&'a str>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        chain.push(id);
        let Some(drivers) = self.drivers.get(id) else {
            chains.push(chain);
            return;
        };
        for driver in drivers {
            match chain.iter().position(|c| c == driver) {
                Some(pos) => {
                    let mut cycle: Vec<String> = chain[pos..].iter().map(|c| c.to_string()).collect();
                    cycle.push(driver.to_string());
                    if !cycles.contains(&cycle) {
                        cycles.push(cycle);
                    }
                    chains.push(chain.clone());
                }
                None => self.extend(*driver, chain.clone(), chains, cycles),
            }
        }
    }

    fn chains(&self) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
        let mut chains = Vec::new();
        let mut cycles = Vec::new();

        for leaf in self.driven.iter().filter(|id| !self.is_driver.contains(*id)) {
            self.extend(*leaf, Vec::new(), &mut chains, &mut cycles);
        }

        // Driven blocks not reached from any leaf sit on a cycle with no exit
        let mut covered: HashSet<&str> = chains.iter().flatten().copied().collect();
        for &id in &self.driven {
            if covered.contains(id) {
                continue;
            }
            let start = chains.len();
            self.extend(id, Vec::new(), &mut chains, &mut cycles);
            covered.extend(chains[start..].iter().flatten().copied());
        }

        let chains = chains
            .into_iter()
            .map(|c| c.into_iter().map(str::to_string).collect())
            .collect();
        (chains, cycles)
    }
}

/// Chains of driven links, each ordered `[driven leaf, ..., root driver]`.
///
/// A chain that runs into a cycle is truncated before the repeated block.
pub fn calculate_drive_chains(blocks: &[Block]) -> Vec<Vec<String>> {
    let (chains, cycles) = DriveGraph::build(blocks).chains();
    for cycle in &cycles {
        warn!(target: "relations", cycle = %cycle.join(" -> "), "Drive chain contains a cycle; truncated");
    }
    chains
}

pub fn find_drive_cycles(blocks: &[Block]) -> Vec<Vec<String>> {
    DriveGraph::build(blocks).chains().1
}

/// Like [`calculate_drive_chains`], but a cycle is an error.
pub fn checked_drive_chains(blocks: &[Block]) -> Result<Vec<Vec<String>>> {
    let (chains, mut cycles) = DriveGraph::build(blocks).chains();
    if cycles.is_empty() {
        Ok(chains)
    } else {
        Err(BrewlinkError::DriveCycle(cycles.swap_remove(0)))
    }
}

/// Ids of the blocks at the head of a drive chain
pub fn driven_block_ids(blocks: &[Block]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for chain in calculate_drive_chains(blocks) {
        if let Some(head) = chain.into_iter().next() {
            if !ids.contains(&head) {
                ids.push(head);
            }
        }
    }
    ids
}

fn limiting_constraints(block: &Block) -> impl Iterator<Item = &FieldValue> {
    block
        .data
        .get("constrainedBy")
        .and_then(FieldValue::as_object)
        .and_then(|c| c.get("constraints"))
        .and_then(FieldValue::as_list)
        .unwrap_or_default()
        .iter()
        .filter(|c| {
            c.as_object()
                .and_then(|o| o.get("limiting"))
                .and_then(FieldValue::as_bool)
                .unwrap_or(false)
        })
}

/// Which constraint blocks are currently limiting which blocks.
///
/// Descriptions for one target follow the collection order of the
/// constraining blocks.
pub fn calculate_limiters(blocks: &[Block]) -> Limiters {
    let mut limited_by: HashMap<&str, Vec<&str>> = HashMap::new();
    for block in blocks {
        for constraint in limiting_constraints(block) {
            let mut links = Vec::new();
            visit_links(constraint, &mut Vec::new(), &mut links);
            for (_, link) in links {
                let Some(target) = link.target() else {
                    continue;
                };
                let limited = limited_by.entry(target).or_default();
                if !limited.contains(&block.id.as_str()) {
                    limited.push(block.id.as_str());
                }
            }
        }
    }

    let mut limiters = Limiters::new();
    for block in blocks {
        let Some(spec) = block.block_type.spec().filter(|s| s.role == Role::Constraint) else {
            continue;
        };
        for limited in limited_by.get(block.id.as_str()).into_iter().flatten() {
            limiters
                .entry(limited.to_string())
                .or_default()
                .push(format!("{} {}", spec.title, block.id));
        }
    }
    limiters
}
