//! Analysis runner: inputs and a [`RunConfig`] in, sorted reports out.

use crate::config::RunConfig;
use crate::data::{
    AbundanceTable, CoreReport, GroupMapping, IngestSummary, Partition, SignificanceResult,
};
use crate::error::{CoremicError, Result};
use crate::orchestrate::{BatchStore, FileStore, MemoryStore, Orchestrator, RunOutcome};
use crate::test::{permutation_results, test_exact, PermutationEngine};
use std::borrow::Cow;
use std::path::Path;
use tracing::{info, warn};

/// One analysis request over loaded inputs.
///
/// Produces one report, or two with [`RunConfig::include_out`], the second
/// with interest and out groups swapped.
#[derive(Debug, Clone)]
pub struct Analysis<'a> {
    table: &'a AbundanceTable,
    mapping: &'a GroupMapping,
    config: &'a RunConfig,
    ingest: Option<IngestSummary>,
}

impl<'a> Analysis<'a> {
    pub fn new(table: &'a AbundanceTable, mapping: &'a GroupMapping, config: &'a RunConfig) -> Self {
        Self {
            table,
            mapping,
            config,
            ingest: None,
        }
    }

    /// Attach the ingestion summary shown in report headers.
    pub fn with_ingest(mut self, ingest: IngestSummary) -> Self {
        self.ingest = Some(ingest);
        self
    }

    /// Validate, resolve the design, and run the exact or permutation path.
    ///
    /// Every input check happens before a single trial is submitted.
    pub fn run(&self) -> Result<Vec<CoreReport>> {
        let config = self.config;
        config.validate()?;
        if self.mapping.factor() != config.factor {
            return Err(CoremicError::MissingColumn(config.factor.clone()));
        }
        if config.is_permutation() && self.mapping.n_groups() != 2 {
            return Err(CoremicError::GroupCount(self.mapping.n_groups()));
        }

        let table: Cow<'_, AbundanceTable> = if config.relative_abundance {
            Cow::Owned(self.table.to_relative())
        } else {
            Cow::Borrowed(self.table)
        };
        let partition = Partition::resolve(
            self.mapping,
            table.sample_ids(),
            &config.group,
            &config.out_group,
        )?;
        info!(
            name = %config.name,
            otus = table.n_otus(),
            interest = partition.interest_count(),
            out = partition.out_count(),
            trials = config.trial_count,
            "starting analysis"
        );

        let mut reports = vec![self.report(&table, &partition, config.name.clone())?];
        if config.include_out {
            let swapped = partition.swapped();
            reports.push(self.report(&table, &swapped, format!("{}_out", config.name))?);
        }
        Ok(reports)
    }

    fn report(&self, table: &AbundanceTable, partition: &Partition, name: String) -> Result<CoreReport> {
        let config = self.config;
        let results = if config.is_permutation() {
            run_permutation(table, partition, config)?
        } else {
            test_exact(table, partition, config)?
        };
        info!(report = %name, qualifying = results.len(), "analysis finished");

        let report = CoreReport::new(name, config.p_value_correction, config.trial_count, results);
        Ok(match &self.ingest {
            Some(ingest) => report.with_ingest(*ingest),
            None => report,
        })
    }
}

/// Load both input files and run the analysis.
pub fn analyze_files<P: AsRef<Path>, Q: AsRef<Path>>(
    table_path: P,
    mapping_path: Q,
    config: &RunConfig,
) -> Result<Vec<CoreReport>> {
    config.validate()?;
    let (table, ingest) = AbundanceTable::from_tsv(table_path)?;
    info!(%ingest, samples = table.n_samples(), "abundance table loaded");
    let mapping = GroupMapping::from_tsv(mapping_path, &config.factor)?;
    Analysis::new(&table, &mapping, config).with_ingest(ingest).run()
}

/// Permutation path on the configured checkpoint store.
fn run_permutation(
    table: &AbundanceTable,
    partition: &Partition,
    config: &RunConfig,
) -> Result<Vec<SignificanceResult>> {
    let seed = config.seed.unwrap_or_else(rand::random);
    let engine = PermutationEngine::new(table, partition, config, seed);

    match &config.execution.checkpoint_dir {
        Some(dir) => {
            let store = FileStore::new(dir);
            info!(dir = %store.root().display(), "checkpointing batches to disk");
            let orchestrator = Orchestrator::new(store, &config.execution);
            permute_on(&orchestrator, &engine, table, partition, config)
        }
        None => {
            let orchestrator = Orchestrator::new(MemoryStore::new(), &config.execution);
            permute_on(&orchestrator, &engine, table, partition, config)
        }
    }
}

fn permute_on<S: BatchStore>(
    orchestrator: &Orchestrator<S>,
    engine: &PermutationEngine<'_>,
    table: &AbundanceTable,
    partition: &Partition,
    config: &RunConfig,
) -> Result<Vec<SignificanceResult>> {
    let trials = config.trial_count;
    let handle = orchestrator.submit(trials as u64, engine)?;
    info!(run_id = %handle.run_id, seed = engine.seed(), "permutation run started");

    let outcome = orchestrator.drive(&handle, engine).and_then(|_| {
        orchestrator.join(&handle, |tally| {
            permutation_results(table, partition, config, &tally, trials)
        })
    });
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Err(cleanup) = orchestrator.discard(&handle) {
                warn!(run_id = %handle.run_id, error = %cleanup, "batch records left behind");
            }
            return Err(e);
        }
    };
    match outcome {
        RunOutcome::Completed(results) => Ok(results),
        RunOutcome::Cancelled => Err(CoremicError::Cancelled(handle.run_id)),
    }
}
