//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::{InitSummary, InventoryReport, SimulationReport};
use crate::adaptor::{ReleaseReport, ResourceInfo, ResourcePoolInfo};
use crate::inventory::InventoryIssue;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    push_row(&mut output, headers.iter().map(|h| h.to_uppercase()), &widths);
    for row in rows {
        push_row(&mut output, row.into_iter(), &widths);
    }
    output
}

fn push_row(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            line.push_str("   ");
        }
        match widths.get(i) {
            Some(width) => line.push_str(&format!("{:width$}", cell, width = width)),
            None => line.push_str(&cell),
        }
    }
    output.push_str(line.trim_end());
    output.push('\n');
}

// ============================================================================
// Inventory display
// ============================================================================

/// Format resource pool counts
pub fn format_resource_pools(pools: &[ResourcePoolInfo]) -> String {
    let headers = &["POOL", "TOTAL", "FREE", "ALLOCATED"];
    let rows = pools
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.total.to_string(),
                p.free.to_string(),
                p.allocated.to_string(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Format catalog nodes with their owners
pub fn format_resources(resources: &[ResourceInfo]) -> String {
    let headers = &["NODE", "POOL", "BMC", "CLOUD", "GROUP"];
    let rows = resources
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.resource_pool_id.clone(),
                r.bmc_address.clone(),
                r.cloud_id.clone().unwrap_or_else(|| "-".to_string()),
                r.group_name.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    format_table(headers, rows)
}

pub fn format_inventory(report: &InventoryReport) -> String {
    let mut output = format_resource_pools(&report.pools);
    output.push('\n');
    output.push_str(&format_resources(&report.resources));
    output
}

/// One free node per line, or a note when the pool is exhausted
pub fn format_free_nodes(pool_id: &str, nodes: &[String]) -> String {
    if nodes.is_empty() {
        return format!("No free nodes in resource pool {}\n", pool_id);
    }

    let mut output = String::new();
    for node in nodes {
        output.push_str(node);
        output.push('\n');
    }
    output
}

pub fn format_issues(issues: &[InventoryIssue]) -> String {
    if issues.is_empty() {
        return "✓ Inventory is consistent\n".to_string();
    }

    let mut output = format!("✗ {} inventory issue(s)\n\n", issues.len());
    for issue in issues {
        output.push_str(&format!("  - {}\n", issue));
    }
    output
}

pub fn format_init_summary(summary: &InitSummary) -> String {
    format!(
        "✓ Initialized {} ({} resource pools, {} nodes)\n",
        summary.path.display(),
        summary.resource_pools,
        summary.nodes
    )
}

pub fn format_release(report: &ReleaseReport) -> String {
    if report.released.is_empty() {
        return format!("Cloud {} has no allocated nodes\n", report.cloud_id);
    }
    format!(
        "Released {} node(s) of cloud {}: {}\n",
        report.released.len(),
        report.cloud_id,
        report.released.join(", ")
    )
}

// ============================================================================
// Reconcile display
// ============================================================================

/// Format an offline reconcile run, one line per invocation
pub fn format_simulation(report: &SimulationReport) -> String {
    let mut output = format!(
        "NodePool {} (cloud {})\n\n",
        report.name, report.cloud_id
    );

    let headers = &["#", "NODES", "CONDITION", "REQUEUE", "MESSAGE"];
    let rows = report
        .steps
        .iter()
        .map(|step| {
            let condition = step
                .condition
                .as_ref()
                .map(|c| format!("{:?}/{}", c.status, c.reason))
                .unwrap_or_else(|| "-".to_string());
            let requeue = step
                .requeue_after
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "-".to_string());
            let message = match (&step.error, &step.condition) {
                (Some(error), _) => error.clone(),
                (None, Some(c)) => c.message.clone(),
                (None, None) => String::new(),
            };
            let nodes = if step.node_names.is_empty() {
                "-".to_string()
            } else {
                step.node_names.join(",")
            };
            vec![
                step.invocation.to_string(),
                nodes,
                condition,
                requeue,
                message,
            ]
        })
        .collect();
    output.push_str(&format_table(headers, rows));
    output.push('\n');

    if report.provisioned {
        output.push_str(&format!(
            "✓ Provisioned: {}\n",
            report.node_names.join(", ")
        ));
    } else {
        output.push_str(&format!(
            "✗ Not provisioned after {} invocation(s)\n",
            report.steps.len()
        ));
    }
    if report.released {
        output.push_str("Nodes released\n");
    }

    output
}
