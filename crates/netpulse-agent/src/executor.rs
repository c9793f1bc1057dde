//! Job execution: expand, sample, chunk, probe, aggregate.

use chrono::Utc;
use netpulse_core::contracts::{
    ChunkResult, ExecutionMetrics, ExecutionMetricsDetails, FinalResult, FinalSummary, IpRange,
    IpResult, OperatorSummary, PingConfig, SubnetJob, SubnetSummary,
};
use netpulse_core::ip;
use netpulse_core::ports::{ProbeEngine, ProbeOutcome, ResultSink};
use netpulse_core::sampling;
use netpulse_core::sim::SimBinding;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// Addresses probed per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Drives one job: per operator, per subnet, per batch probing under a
/// concurrency gate, streaming chunk results and per-subnet metrics
/// through the sink and returning the job-wide aggregate.
pub struct JobExecutor {
    engine: Arc<dyn ProbeEngine>,
    chunk_size: usize,
}

impl JobExecutor {
    pub fn new(engine: Arc<dyn ProbeEngine>) -> Self {
        Self {
            engine,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Execute one job to completion (or until `cancel` flips).
    ///
    /// Operators without a mapping and malformed subnets are skipped, not
    /// errors. Individual probe failures are recorded as data and never
    /// abort the job.
    pub async fn execute(
        &self,
        job: &SubnetJob,
        hwid: &str,
        operator_mappings: &HashMap<String, SimBinding>,
        sink: &dyn ResultSink,
        cancel: watch::Receiver<bool>,
    ) -> FinalResult {
        let mut operators = HashMap::new();
        let mut total_ips_tested = 0u32;
        let mut total_ips_up = 0u32;
        let mut latency_sum = 0u64;
        let mut latency_count = 0u64;
        let mut rng = StdRng::from_entropy();

        info!(
            job_id = %job.job_id,
            subnets = job.subnets.len(),
            operators = job.mobile_operators.len(),
            "Starting job execution"
        );

        'operators: for operator in &job.mobile_operators {
            let Some(binding) = operator_mappings.get(operator) else {
                debug!(operator, "No mapping for operator, skipping");
                continue;
            };
            debug!(operator, sim = %binding.label, "Probing under operator");

            let mut subnets = HashMap::new();
            for subnet in &job.subnets {
                if *cancel.borrow() {
                    operators.insert(operator.clone(), OperatorSummary { subnets });
                    break 'operators;
                }

                let range = match ip::cidr_to_range(subnet) {
                    Ok(range) => range,
                    Err(e) => {
                        warn!(subnet, error = %e, "Skipping malformed subnet");
                        continue;
                    }
                };
                let hosts = ip::expand_range(&range);
                let candidates =
                    sampling::sample(&hosts, job.ping_config.sampling_ratio, &mut rng);
                let batches = sampling::chunk(&candidates, self.chunk_size);

                let mut stats = SubnetStats::new(candidates.len() as u32);
                let gate = Arc::new(Semaphore::new(job.ping_config.concurrency.max(1) as usize));

                let mut cancelled = false;
                for (index, batch) in batches.iter().enumerate() {
                    if *cancel.borrow() {
                        cancelled = true;
                        break;
                    }

                    let outcomes = self.probe_batch(batch, &job.ping_config, &gate).await;
                    let results: Vec<IpResult> = batch
                        .iter()
                        .zip(&outcomes)
                        .map(|(&value, outcome)| {
                            stats.register(value, outcome);
                            IpResult {
                                ip: value,
                                status: if outcome.reachable { "up" } else { "down" }.to_string(),
                                latency: outcome.latency_ms,
                            }
                        })
                        .collect();

                    sink.chunk_result(ChunkResult {
                        job_id: job.job_id.clone(),
                        hwid: hwid.to_string(),
                        operator: operator.clone(),
                        subnet: subnet.clone(),
                        chunk_id: index as u32,
                        range: IpRange {
                            from: batch.first().copied().unwrap_or_default(),
                            to: batch.last().copied().unwrap_or_default(),
                        },
                        results,
                    })
                    .await;
                }

                if cancelled {
                    // Partial subnet: drop it from metrics and summaries.
                    operators.insert(operator.clone(), OperatorSummary { subnets });
                    break 'operators;
                }

                sink.execution_metrics(stats.to_metrics(&job.job_id, hwid, operator, subnet))
                    .await;

                total_ips_tested += stats.ips_tested;
                total_ips_up += stats.ips_up;
                latency_sum += stats.latencies.iter().sum::<u64>();
                latency_count += stats.latencies.len() as u64;

                subnets.insert(
                    subnet.clone(),
                    SubnetSummary {
                        available_hosts: stats
                            .available_hosts
                            .iter()
                            .map(|&host| ip::format_ipv4(host))
                            .collect(),
                        total_available_hosts: stats.available_hosts.len() as u32,
                    },
                );
            }
            operators.insert(operator.clone(), OperatorSummary { subnets });
        }

        let avg_latency_ms = if latency_count > 0 {
            latency_sum as f64 / latency_count as f64
        } else {
            0.0
        };

        info!(
            job_id = %job.job_id,
            ips_tested = total_ips_tested,
            ips_up = total_ips_up,
            "Job execution finished"
        );

        FinalResult {
            job_id: job.job_id.clone(),
            hwid: hwid.to_string(),
            finished_at: Utc::now(),
            summary: FinalSummary {
                total_ips_tested,
                total_ips_up,
                avg_latency_ms,
            },
            operators,
        }
    }

    /// Probe one batch concurrently, bounded by the admission gate.
    /// Outcomes come back in batch order.
    async fn probe_batch(
        &self,
        batch: &[u32],
        config: &PingConfig,
        gate: &Arc<Semaphore>,
    ) -> Vec<ProbeOutcome> {
        let probes = batch.iter().map(|&value| {
            let engine = Arc::clone(&self.engine);
            let gate = Arc::clone(gate);
            let address = ip::format_ipv4(value);
            let timeout_ms = config.timeout_ms;
            let retries = config.retries;
            async move {
                let _permit = match gate.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return ProbeOutcome::down(address, "admission gate closed"),
                };
                engine.probe(&address, timeout_ms, retries).await
            }
        });
        futures::future::join_all(probes).await
    }
}

/// Running per-subnet aggregate.
struct SubnetStats {
    ips_total: u32,
    ips_tested: u32,
    ips_up: u32,
    timeouts: u32,
    errors: u32,
    latencies: Vec<u64>,
    available_hosts: Vec<u32>,
}

impl SubnetStats {
    fn new(ips_total: u32) -> Self {
        Self {
            ips_total,
            ips_tested: 0,
            ips_up: 0,
            timeouts: 0,
            errors: 0,
            latencies: Vec::new(),
            available_hosts: Vec::new(),
        }
    }

    fn register(&mut self, address: u32, outcome: &ProbeOutcome) {
        self.ips_tested += 1;
        if outcome.reachable {
            self.ips_up += 1;
            if let Some(latency) = outcome.latency_ms {
                self.latencies.push(latency);
            }
            self.available_hosts.push(address);
        } else if outcome.is_timeout() {
            self.timeouts += 1;
        } else if outcome.error.is_some() {
            self.errors += 1;
        }
    }

    fn to_metrics(
        &self,
        job_id: &str,
        hwid: &str,
        operator: &str,
        subnet: &str,
    ) -> ExecutionMetrics {
        let avg_latency_ms = if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<u64>() as f64 / self.latencies.len() as f64
        };
        ExecutionMetrics {
            job_id: job_id.to_string(),
            hwid: hwid.to_string(),
            operator: operator.to_string(),
            subnet: subnet.to_string(),
            metrics: ExecutionMetricsDetails {
                ips_total: self.ips_total,
                ips_tested: self.ips_tested,
                ips_up: self.ips_up,
                avg_latency_ms,
                p95_latency_ms: percentile(&self.latencies, 0.95),
                timeouts: self.timeouts,
                errors: self.errors,
            },
            timestamp: Utc::now(),
        }
    }
}

/// Value at rank `ceil(n * quantile)` (1-indexed, clamped to the last
/// index) over the sorted input; 0.0 when empty.
fn percentile(values: &[u64], quantile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64) * quantile).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1] as f64
}
