//! The record preparation pipeline: reference resolution, per-machine
//! admission and transformation, and dispatch into the delivery channel.

use crate::config::{AttributeConfig, Config};
use crate::control_plane::{Reader, VirtualMachine};
use crate::delivery::DeliveryChannel;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

pub mod filter;
pub mod reference;
pub mod transform;

pub use filter::{AdmissionFilter, PassAllFilter};
pub use reference::{Benchmark, ReferenceResolver, ReferenceTables};
pub use transform::RecordTransformer;

/// Orchestrates one export run: builds the reference tables, fans the
/// listed machines out to filter + transformer, feeds the produced records
/// into the delivery channel, and performs the end-of-stream handshake.
///
/// Machines are prepared concurrently, bounded by `max_in_flight`, with the
/// channel's rate limiter as the natural backpressure. No delivery-order
/// guarantee exists across machines. Individual failures are logged with
/// the machine's numeric ID and never abort the run; `finish` runs exactly
/// once regardless.
pub struct PreparationPipeline {
    reader: Arc<dyn Reader>,
    channel: Arc<dyn DeliveryChannel>,
    transformer: Arc<RecordTransformer>,
    filter: Arc<dyn AdmissionFilter>,
    attributes: AttributeConfig,
    max_in_flight: usize,
}

/// Per-run accounting reported back to the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub failed: usize,
}

enum Outcome {
    Delivered,
    Dropped,
    Failed,
}

impl PreparationPipeline {
    pub fn new(reader: Arc<dyn Reader>, channel: Arc<dyn DeliveryChannel>, config: &Config) -> Self {
        Self {
            reader,
            channel,
            transformer: Arc::new(RecordTransformer::new(&config.site)),
            filter: Arc::new(PassAllFilter),
            attributes: config.attributes.clone(),
            max_in_flight: config.delivery.max_in_flight.max(1),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn AdmissionFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub async fn run(&self) -> Result<RunSummary> {
        // The machine listing and the table build are independent; the
        // transformation stage below starts only once both are in.
        let resolver = ReferenceResolver::new(&*self.reader, &self.attributes);
        let (vms, tables) = tokio::join!(self.reader.list_all_virtual_machines(), resolver.build());
        let vms = vms?;
        let tables = Arc::new(tables?);

        info!(machines = vms.len(), "starting record preparation");

        let mut summary = RunSummary {
            total: vms.len(),
            ..RunSummary::default()
        };

        let limit = Arc::new(Semaphore::new(self.max_in_flight));
        let mut units: JoinSet<Outcome> = JoinSet::new();
        for vm in vms {
            let permit = limit
                .clone()
                .acquire_owned()
                .await
                .expect("preparation semaphore closed");
            let tables = tables.clone();
            let channel = self.channel.clone();
            let transformer = self.transformer.clone();
            let filter = self.filter.clone();

            units.spawn(async move {
                let _permit = permit;
                prepare_one(vm, &*filter, &transformer, &tables, &*channel).await
            });
        }

        // Completion barrier: the finish handshake must not start while any
        // preparation unit is outstanding.
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Outcome::Delivered) => summary.delivered += 1,
                Ok(Outcome::Dropped) => summary.dropped += 1,
                Ok(Outcome::Failed) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "preparation unit panicked");
                    summary.failed += 1;
                }
            }
        }

        if let Err(e) = self.channel.send_identifier().await {
            error!(error = %e, "error send identifier");
        }
        self.channel.finish().await;

        info!(
            delivered = summary.delivered,
            dropped = summary.dropped,
            failed = summary.failed,
            "record preparation finished"
        );

        Ok(summary)
    }
}

async fn prepare_one(
    vm: VirtualMachine,
    filter: &dyn AdmissionFilter,
    transformer: &RecordTransformer,
    tables: &ReferenceTables,
    channel: &dyn DeliveryChannel,
) -> Outcome {
    let id = vm.id();

    if !filter.admit(&vm) {
        debug!(vm = ?id, "machine dropped by admission filter");
        return Outcome::Dropped;
    }

    let record = match transformer.transform(&vm, tables) {
        Ok(record) => record,
        Err(e) => {
            error!(vm = ?id, error = %e, "unable to prepare virtual machine record");
            return Outcome::Failed;
        }
    };

    match channel.write(&record).await {
        Ok(()) => Outcome::Delivered,
        Err(e) => {
            error!(vm = ?id, error = %e, "error write virtual machine record");
            Outcome::Failed
        }
    }
}
