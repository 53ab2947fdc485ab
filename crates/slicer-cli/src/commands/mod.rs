//! CLI commands implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use slicer_core::{Allocation, SliceInventoryRecord, Workload, WorkloadRef};
use std::collections::BTreeMap;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn workload_url(&self, workload: &WorkloadRef) -> String {
        self.url(&format!(
            "/api/v1/workloads/{}/{}",
            workload.namespace, workload.name
        ))
    }
}

/// Inventory record response from API
#[derive(Debug, Deserialize)]
pub struct RecordResponse {
    pub version: u64,
    #[serde(flatten)]
    pub record: SliceInventoryRecord,
}

/// Status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub nodes: usize,
    pub workloads: usize,
    pub allocations: BTreeMap<String, usize>,
}

/// List nodes
pub async fn nodes(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/inventory"))
        .send()
        .await?;

    if response.status().is_success() {
        let records: Vec<RecordResponse> = response.json().await?;

        if records.is_empty() {
            println!("No nodes found");
        } else {
            println!(
                "{:<24} {:<8} {:<10} {:<12} {:<8}",
                "NODE", "DEVICES", "PREPARED", "ALLOCATIONS", "VERSION"
            );
            println!("{}", "-".repeat(66));
            for r in records {
                println!(
                    "{:<24} {:<8} {:<10} {:<12} {:<8}",
                    r.record.node_name,
                    r.record.devices.len(),
                    r.record.prepared.len(),
                    r.record.allocations.len(),
                    r.version
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list nodes: {}", error);
    }

    Ok(())
}

/// List allocations
pub async fn allocations(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/allocations"))
        .send()
        .await?;

    if response.status().is_success() {
        let allocations: Vec<Allocation> = response.json().await?;

        if allocations.is_empty() {
            println!("No allocations found");
        } else {
            println!(
                "{:<32} {:<16} {:<24} {:<10} {:<10}",
                "WORKLOAD", "NODE", "SLICE", "PROFILE", "STATUS"
            );
            println!("{}", "-".repeat(96));
            for a in allocations {
                println!(
                    "{:<32} {:<16} {:<24} {:<10} {:<10}",
                    a.workload_ref().to_string(),
                    a.node_name,
                    a.range().to_string(),
                    a.profile,
                    a.status.to_string()
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list allocations: {}", error);
    }

    Ok(())
}

/// List workloads
pub async fn ps(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/workloads"))
        .send()
        .await?;

    if response.status().is_success() {
        let workloads: Vec<Workload> = response.json().await?;

        if workloads.is_empty() {
            println!("No workloads found");
        } else {
            println!("{:<32} {:<12} {:<8} {:<10}", "WORKLOAD", "PHASE", "GATED", "DELETING");
            println!("{}", "-".repeat(66));
            for w in workloads {
                println!(
                    "{:<32} {:<12} {:<8} {:<10}",
                    w.reference().to_string(),
                    w.phase.to_string(),
                    !w.scheduling_gates.is_empty(),
                    w.is_being_deleted()
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list workloads: {}", error);
    }

    Ok(())
}

/// Submit a workload
pub async fn submit(
    client: &ApiClient,
    workload: WorkloadRef,
    profile: String,
    cpu: Option<String>,
    memory: Option<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct CreateRequest {
        namespace: String,
        name: String,
        profile: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cpu: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        memory: Option<String>,
    }

    let req = CreateRequest {
        namespace: workload.namespace.clone(),
        name: workload.name.clone(),
        profile,
        cpu,
        memory,
    };

    let response = client
        .client
        .post(client.url("/api/v1/workloads"))
        .json(&req)
        .send()
        .await?;

    if response.status().is_success() {
        let created: Workload = response.json().await?;
        println!("Workload '{}' submitted", created.reference());
        println!("  UID: {}", created.uid);
        println!("  Gates: {}", created.scheduling_gates.join(", "));
    } else {
        let error = response.text().await?;
        eprintln!("Failed to submit workload: {}", error);
    }

    Ok(())
}

/// Request deletion of a workload
pub async fn delete(client: &ApiClient, workload: WorkloadRef) -> Result<()> {
    let response = client
        .client
        .delete(client.workload_url(&workload))
        .send()
        .await?;

    match response.status() {
        reqwest::StatusCode::NO_CONTENT => println!("Workload '{}' deleted", workload),
        reqwest::StatusCode::ACCEPTED => {
            println!("Workload '{}' deletion requested, waiting for slice teardown", workload)
        }
        _ => {
            let error = response.text().await?;
            eprintln!("Failed to delete workload: {}", error);
        }
    }

    Ok(())
}

/// Show system status, or a single workload with its allocation
pub async fn status(client: &ApiClient, workload: Option<WorkloadRef>) -> Result<()> {
    match workload {
        Some(workload) => workload_status(client, &workload).await,
        None => system_status(client).await,
    }
}

async fn system_status(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;

        println!("slicer v{}", status.version);
        println!();
        println!("Nodes: {}", status.nodes);
        println!("Workloads: {}", status.workloads);
        if status.allocations.is_empty() {
            println!("Allocations: none");
        } else {
            println!("Allocations:");
            for (state, count) in status.allocations {
                println!("  {:<10} {}", state, count);
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get status: {}", error);
    }

    Ok(())
}

async fn workload_status(client: &ApiClient, workload: &WorkloadRef) -> Result<()> {
    let response = client
        .client
        .get(client.workload_url(workload))
        .send()
        .await?;

    if !response.status().is_success() {
        let error = response.text().await?;
        eprintln!("Workload not found: {}", error);
        return Ok(());
    }

    let w: Workload = response.json().await?;
    println!("Workload: {}", w.reference());
    println!("  UID: {}", w.uid);
    println!("  Phase: {}", w.phase);
    println!("  Gates: {:?}", w.scheduling_gates);
    println!("  Finalizers: {:?}", w.finalizers);
    if let Some(at) = w.deletion_timestamp {
        println!("  Deletion requested: {}", at);
    }

    let allocations: Vec<Allocation> = client
        .client
        .get(client.url("/api/v1/allocations"))
        .send()
        .await?
        .json()
        .await?;

    match allocations.into_iter().find(|a| a.workload_id == w.uid) {
        Some(a) => {
            println!("\nAllocation:");
            println!("  Node: {}", a.node_name);
            println!("  Slice: {} ({})", a.range(), a.profile);
            println!("  Status: {}", a.status);
            println!("  Resource: {}", a.resource_identifier);
        }
        None => println!("\nNo allocation"),
    }

    Ok(())
}
