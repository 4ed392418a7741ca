// src/lib.rs

pub mod cli;
pub mod config;
pub mod core;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod planning;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{load_and_validate, save_to_path};
use crate::config::model::NetworkConfig;
use crate::logging::LogHandle;
use crate::planning::{GraphItem, PlanGraph};

pub use crate::core::{Cardinality, CardinalitySpec, SourceData};
pub use crate::errors::{PlanError, Result as PlanResult};
pub use crate::planning::{PlanningSession, Updateable};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - description loading and checking, and its log level
/// - graph construction and the initial update round
/// - the validity report
/// - the optional snapshot
pub fn run(args: CliArgs, log: &LogHandle) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    log.apply_network_level(cfg.network.log_level.as_deref())?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mut graph = cfg.build()?;
    print_report(&graph)?;

    if let Some(path) = &args.snapshot {
        save_to_path(&graph.to_config()?, path)?;
        info!(path = %path, "snapshot written");
    }

    graph.check_ready()?;
    info!(network = %graph.name(), "network is ready");
    Ok(())
}

/// Print nodes, tools and links without building anything.
fn print_dry_run(cfg: &NetworkConfig) {
    println!("plangraph dry-run");
    println!("  network.id = {}", cfg.network.id);
    if let Some(types) = &cfg.network.preferred_types {
        println!("  network.preferred_types = {types:?}");
    }
    println!();

    if !cfg.datatypes.is_empty() {
        println!("datatypes ({}):", cfg.datatypes.len());
        for (name, parent) in &cfg.datatypes {
            println!("  - {name} < {parent}");
        }
    }

    println!("nodes ({}):", cfg.nodes.len());
    for (name, node) in &cfg.nodes {
        println!("  - {name} ({:?})", node.kind);
        if let Some(tool) = &node.tool {
            println!("      tool: {tool}");
        }
        if let Some(datatype) = &node.datatype {
            println!("      datatype: {datatype}");
        }
        if let Some(nodegroup) = &node.nodegroup {
            println!("      nodegroup: {nodegroup}");
        }
    }

    println!("links ({}):", cfg.links.len());
    for link in &cfg.links {
        print!("  - {} -> {}", link.source, link.target);
        if !link.collapse.is_empty() {
            let dims: Vec<String> = link.collapse.iter().map(ToString::to_string).collect();
            print!(" collapse [{}]", dims.join(", "));
        }
        if link.expand {
            print!(" expand");
        }
        println!();
    }

    if !cfg.constants.is_empty() {
        println!("constants ({}):", cfg.constants.len());
        for constant in &cfg.constants {
            println!("  - {}", constant.target);
        }
    }

    debug!("dry-run complete (graph not built)");
}

/// Validity of every node plus the planning cardinality of its outputs.
fn print_report(graph: &PlanGraph) -> crate::errors::Result<()> {
    let order = match graph.topological_order() {
        Ok(order) => order,
        Err(_) => graph.nodes().map(|(id, _)| id).collect(),
    };

    println!("network {}", graph.name());
    for id in order {
        let node = graph.node(id)?;
        let state = if node.valid() { "valid" } else { "INVALID" };
        println!("  - {} [{state}]", node.id());

        for (name, output) in node.outputs() {
            let cardinality = graph
                .output_cardinality(*output, None)?
                .map_or_else(|| "?".to_string(), |c| c.to_string());
            println!("      {name}: {cardinality}");
        }
        for message in node.messages() {
            println!("      ! {message}");
        }
    }

    let invalid_links: Vec<String> = graph
        .links()
        .filter(|(_, link)| !link.valid())
        .map(|(id, _)| graph.fullid(GraphItem::Link(id)))
        .collect();
    for link in invalid_links {
        println!("  link {link} [INVALID]");
    }
    Ok(())
}
