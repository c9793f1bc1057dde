//! Carrier/SIM descriptors and operator mapping.

use crate::ports::SimProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One SIM/subscription visible to the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimInfo {
    pub subscription_id: i32,
    pub display_name: String,
    pub carrier_name: String,
    pub slot_index: i32,
    pub is_embedded: bool,
}

/// Local network context a carrier's probes are routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimBinding {
    pub subscription_id: i32,
    pub label: String,
}

/// Build the operator-name -> binding table the executor consumes.
///
/// Later SIMs with a duplicate carrier name do not displace earlier ones.
pub fn operator_mappings(sims: &[SimInfo]) -> HashMap<String, SimBinding> {
    let mut mappings = HashMap::new();
    for sim in sims {
        mappings
            .entry(sim.carrier_name.clone())
            .or_insert_with(|| SimBinding {
                subscription_id: sim.subscription_id,
                label: sim.display_name.clone(),
            });
    }
    mappings
}

/// Fixed SIM table, fed from configuration or tests.
pub struct StaticSimProvider {
    sims: Vec<SimInfo>,
}

impl StaticSimProvider {
    pub fn new(sims: Vec<SimInfo>) -> Self {
        Self { sims }
    }
}

impl SimProvider for StaticSimProvider {
    fn sim_cards(&self) -> Vec<SimInfo> {
        self.sims.clone()
    }
}
