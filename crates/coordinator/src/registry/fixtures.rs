use alloy::primitives::{Address, B256, U256};
use shared::models::job::JobRequest;
use shared::models::worker::WorkerRegistration;
use shared::models::{GpuSpec, JobSpecs, Sla, WorkerSpecs};
use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::events::EventBus;
use crate::registry::JobRegistry;
use crate::store::core::StoreContext;

pub(crate) const ONE_ETHER: u64 = 1_000_000_000_000_000_000;

pub(crate) fn registry() -> JobRegistry {
    registry_with(CoordinatorConfig::default())
}

pub(crate) fn registry_with(config: CoordinatorConfig) -> JobRegistry {
    JobRegistry::new(
        &config,
        Arc::new(StoreContext::in_memory()),
        EventBus::new(),
        None,
    )
}

pub(crate) fn client() -> Address {
    Address::repeat_byte(0xc1)
}

pub(crate) fn worker_address(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub(crate) fn output_root() -> B256 {
    B256::repeat_byte(0xab)
}

pub(crate) fn a100_request(max_retries: u32) -> JobRequest {
    JobRequest {
        specs: JobSpecs {
            gpu: "A100".to_string(),
            vram: 40,
            ..Default::default()
        },
        sla: Sla {
            max_latency: 60,
            max_retries,
            timeout: 3600,
            required_uptime: 0.9,
        },
        job_class: None,
        idempotency_key: None,
    }
}

pub(crate) fn a100_specs(count: u32) -> WorkerSpecs {
    WorkerSpecs {
        gpus: vec![GpuSpec {
            model: "A100".to_string(),
            vram: 80,
            count,
        }],
        cpu_cores: 32,
        ram: 256,
        storage: 2000,
        bandwidth: 1000,
        region: "eu-west".to_string(),
    }
}

/// One A100 and one RTX4090.
pub(crate) fn mixed_specs() -> WorkerSpecs {
    let mut specs = a100_specs(1);
    specs.gpus.push(GpuSpec {
        model: "RTX4090".to_string(),
        vram: 24,
        count: 1,
    });
    specs
}

pub(crate) fn register(registry: &JobRegistry, n: u8, stake: U256) -> Address {
    let address = worker_address(n);
    registry
        .register_worker(
            Some(address),
            WorkerRegistration {
                specs: a100_specs(1),
                stake,
                ask_price: None,
            },
        )
        .unwrap();
    address
}
