//! Human-readable tree rendering.
//!
//! Consumes the projector's row sequence and prints one line per object with
//! NAME / READY / STATUS / AGE columns, box-drawing prefixes derived from the
//! rows' last-child flags, and optional namespace, relationship and label
//! columns. JSON and YAML outputs serialize the same rows for scripting.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::graph::{Node, ObjectGraph, Projection, TreeRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Standard,
    Wide,
    Json,
    Yaml,
    Split,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub show_group: bool,
    pub show_labels: bool,
    pub show_namespace: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Standard,
            show_group: false,
            show_labels: false,
            show_namespace: false,
        }
    }
}

#[derive(Serialize)]
struct RowRecord<'a> {
    uid: &'a str,
    group: &'a str,
    kind: &'a str,
    namespace: &'a str,
    name: &'a str,
    depth: u32,
    relationships: Vec<&'static str>,
}

/// Print a projection to `out`.
pub fn render(
    out: &mut dyn Write,
    graph: &ObjectGraph,
    projection: &Projection,
    opts: &RenderOptions,
) -> Result<()> {
    let rows: Vec<(&TreeRow, &Node)> = projection
        .iter()
        .filter_map(|row| graph.get(&row.uid).map(|node| (row, node)))
        .collect();

    match opts.format {
        OutputFormat::Json => {
            let records = row_records(&rows);
            serde_json::to_writer_pretty(&mut *out, &records)?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => {
            let records = row_records(&rows);
            out.write_all(serde_yaml::to_string(&records)?.as_bytes())?;
        }
        OutputFormat::Standard | OutputFormat::Wide => {
            render_table(out, &rows, opts, opts.format == OutputFormat::Wide)?;
        }
        OutputFormat::Split => {
            // One table per namespace, in first-appearance order.
            let mut order: Vec<&str> = Vec::new();
            let mut buckets: HashMap<&str, Vec<(&TreeRow, &Node)>> = HashMap::new();
            for (row, node) in &rows {
                let ns = node.namespace.as_str();
                if !buckets.contains_key(ns) {
                    order.push(ns);
                }
                buckets.entry(ns).or_default().push((*row, *node));
            }
            for (index, ns) in order.iter().enumerate() {
                if index > 0 {
                    writeln!(out)?;
                }
                let label = if ns.is_empty() { "(cluster-scoped)" } else { ns };
                writeln!(out, "NAMESPACE: {}", label)?;
                render_table(out, &buckets[ns], opts, false)?;
            }
        }
    }
    Ok(())
}

fn row_records<'a>(rows: &'a [(&'a TreeRow, &'a Node)]) -> Vec<RowRecord<'a>> {
    rows.iter()
        .map(|(row, node)| RowRecord {
            uid: &node.uid,
            group: &node.group,
            kind: &node.kind,
            namespace: &node.namespace,
            name: &node.name,
            depth: row.depth,
            relationships: row.relationships.iter().map(|r| r.as_str()).collect(),
        })
        .collect()
}

fn render_table(
    out: &mut dyn Write,
    rows: &[(&TreeRow, &Node)],
    opts: &RenderOptions,
    wide: bool,
) -> Result<()> {
    let show_namespace = opts.show_namespace || spans_namespaces(rows);
    let show_group = group_visibility(rows, opts.show_group);
    let now = Utc::now();

    let mut header: Vec<&str> = Vec::new();
    if show_namespace {
        header.push("NAMESPACE");
    }
    header.extend(["NAME", "READY", "STATUS", "AGE"]);
    if wide {
        header.push("RELATIONSHIPS");
    }
    if opts.show_labels {
        header.push("LABELS");
    }

    let mut table: Vec<Vec<String>> = vec![header.iter().map(|h| h.to_string()).collect()];
    // Whether the ancestor at each depth was a last child, for glyph prefixes.
    let mut ancestors_last: Vec<bool> = Vec::new();
    for (row, node) in rows {
        let mut cells = Vec::with_capacity(table[0].len());
        if show_namespace {
            cells.push(if node.namespace.is_empty() {
                "-".to_string()
            } else {
                node.namespace.clone()
            });
        }
        cells.push(name_cell(row, node, &show_group, &mut ancestors_last));
        let (ready, status) = ready_status(node);
        cells.push(non_empty(ready));
        cells.push(non_empty(status));
        cells.push(node.created.map_or_else(
            || "-".to_string(),
            |created| humanize((now - created).num_seconds()),
        ));
        if wide {
            let labels: Vec<&str> = row.relationships.iter().map(|r| r.as_str()).collect();
            cells.push(if labels.is_empty() {
                "-".to_string()
            } else {
                format!("[{}]", labels.join(","))
            });
        }
        if opts.show_labels {
            cells.push(if node.labels.is_empty() {
                "<none>".to_string()
            } else {
                node.labels
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",")
            });
        }
        table.push(cells);
    }

    let columns = table[0].len();
    let mut widths = vec![0usize; columns];
    for row in &table {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.chars().count());
        }
    }
    for row in &table {
        let mut line = String::new();
        for (index, cell) in row.iter().enumerate() {
            if index + 1 == columns {
                line.push_str(cell);
            } else {
                let pad = widths[index] - cell.chars().count() + 3;
                line.push_str(cell);
                line.extend(std::iter::repeat_n(' ', pad));
            }
        }
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

/// Tree glyph prefix plus `Kind[.group]/name`.
fn name_cell(
    row: &TreeRow,
    node: &Node,
    show_group: &dyn Fn(&str) -> bool,
    ancestors_last: &mut Vec<bool>,
) -> String {
    let depth = row.depth as usize;
    ancestors_last.truncate(depth);
    ancestors_last.push(row.last_child);

    let mut prefix = String::new();
    if depth > 0 {
        for last in ancestors_last.iter().take(depth).skip(1) {
            prefix.push_str(if *last { "    " } else { "│   " });
        }
        prefix.push_str(if row.last_child { "└── " } else { "├── " });
    }

    let kind = if show_group(&node.kind) && !node.group.is_empty() {
        format!("{}.{}", node.kind, node.group)
    } else {
        node.kind.clone()
    };
    format!("{}{}/{}", prefix, kind, node.name)
}

/// A kind's group is printed when asked for, or whenever the walk contains
/// the same kind from more than one group.
fn group_visibility(rows: &[(&TreeRow, &Node)], show_group: bool) -> Box<dyn Fn(&str) -> bool> {
    if show_group {
        return Box::new(|_| true);
    }
    let mut kind_groups: HashMap<String, HashSet<String>> = HashMap::new();
    for (_, node) in rows {
        kind_groups
            .entry(node.kind.clone())
            .or_default()
            .insert(node.group.clone());
    }
    Box::new(move |kind| kind_groups.get(kind).is_some_and(|groups| groups.len() > 1))
}

fn spans_namespaces(rows: &[(&TreeRow, &Node)]) -> bool {
    let namespaces: HashSet<&str> = rows
        .iter()
        .map(|(_, node)| node.namespace.as_str())
        .collect();
    namespaces.len() > 1
}

fn non_empty(cell: String) -> String {
    if cell.is_empty() { "-".to_string() } else { cell }
}

/// READY and STATUS cells, by kind.
fn ready_status(node: &Node) -> (String, String) {
    match (node.group.as_str(), node.kind.as_str()) {
        ("", "Pod") => pod_ready_status(node),
        ("apps", "Deployment") | ("apps", "StatefulSet") | ("apps", "ReplicaSet") => {
            let status = node.body.get("status");
            let ready = status
                .and_then(|s| s.get("readyReplicas"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let total = status
                .and_then(|s| s.get("replicas"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            (format!("{}/{}", ready, total), String::new())
        }
        ("apps", "DaemonSet") => {
            let status = node.body.get("status");
            let ready = status
                .and_then(|s| s.get("numberReady"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let desired = status
                .and_then(|s| s.get("desiredNumberScheduled"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            (format!("{}/{}", ready, desired), String::new())
        }
        ("", "Event") => (String::new(), event_status(node, "message")),
        ("events.k8s.io", "Event") => (String::new(), event_status(node, "note")),
        _ => condition_ready_status(node),
    }
}

fn pod_ready_status(node: &Node) -> (String, String) {
    let total = node
        .body
        .get("spec")
        .and_then(|s| s.get("containers"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let status = node.body.get("status");
    let ready = status
        .and_then(|s| s.get("containerStatuses"))
        .and_then(Value::as_array)
        .map_or(0, |statuses| {
            statuses
                .iter()
                .filter(|c| c.get("ready").and_then(Value::as_bool) == Some(true))
                .count()
        });
    let phase = status
        .and_then(|s| s.get("reason"))
        .or_else(|| status.and_then(|s| s.get("phase")))
        .and_then(Value::as_str)
        .unwrap_or_default();
    (format!("{}/{}", ready, total), phase.to_string())
}

fn event_status(node: &Node, message_field: &str) -> String {
    let reason = node
        .body
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = node
        .body
        .get(message_field)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let count = node
        .body
        .get("count")
        .or_else(|| node.body.get("deprecatedCount"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if count > 1 {
        format!("{}: {} (x{})", reason, message, count)
    } else {
        format!("{}: {}", reason, message)
    }
}

/// Generic fallback: the `Ready` (or `Available`) condition's status, with
/// the reason surfaced when the condition is not `True`.
fn condition_ready_status(node: &Node) -> (String, String) {
    let Some(conditions) = node
        .body
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
    else {
        return (String::new(), String::new());
    };
    for wanted in ["Ready", "Available"] {
        if let Some(condition) = conditions
            .iter()
            .find(|c| c.get("type").and_then(Value::as_str) == Some(wanted))
        {
            let status = condition
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let reason = if status != "True" {
                condition
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            } else {
                String::new()
            };
            return (status, reason);
        }
    }
    (String::new(), String::new())
}

/// Compact age cell: `45s`, `12m`, `8h`, `3d`.
fn humanize(seconds: i64) -> String {
    if seconds < 0 {
        return "0s".to_string();
    }
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 60 * 60 {
        format!("{}m", seconds / 60)
    } else if seconds < 24 * 60 * 60 {
        format!("{}h", seconds / (60 * 60))
    } else {
        format!("{}d", seconds / (24 * 60 * 60))
    }
}
