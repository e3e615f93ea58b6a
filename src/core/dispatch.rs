use crate::types::{AssetRecord, FloodError, FloodResult, RegionGeometry, SelectionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reference to a mask artifact produced by an external algorithm.
/// Format and storage are the algorithm's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskArtifactRef {
    pub uri: String,
}

/// Pluggable mask-generation strategy. New algorithms implement this;
/// the dispatcher never changes for them.
pub trait MaskAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a mask for one scene over the region
    fn run(&self, record: &AssetRecord, region: &RegionGeometry) -> FloodResult<MaskArtifactRef>;
}

/// Hand-correction feedback from a human reviewer; consumed here,
/// never produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub mask_job_id: String,
    pub corrected_artifact: MaskArtifactRef,
    pub correcting_user: String,
    pub timestamp: DateTime<Utc>,
}

/// One candidate's mask output within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskOutput {
    pub asset_id: String,
    pub artifact: MaskArtifactRef,
}

/// Identifier and summary of one dispatched mask job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskJobHandle {
    pub job_id: String,
    pub event_id: String,
    pub algorithm: String,
    /// Outputs in candidate rank order
    pub outputs: Vec<MaskOutput>,
}

struct MaskJob {
    handle: MaskJobHandle,
    corrections: Vec<CorrectionEvent>,
}

/// Hands ranked candidates to a pluggable mask algorithm and records the
/// review trail. Corrections only ever append; the computed artifacts are
/// never overwritten.
#[derive(Default)]
pub struct MaskPipelineDispatcher {
    jobs: HashMap<String, MaskJob>,
}

impl MaskPipelineDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the strategy over every ranked candidate. The first algorithm
    /// failure aborts the job; nothing partial is registered.
    pub fn dispatch(
        &mut self,
        selection: &SelectionResult,
        region: &RegionGeometry,
        algorithm: &dyn MaskAlgorithm,
    ) -> FloodResult<MaskJobHandle> {
        let job_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Dispatching {} candidate(s) of event {} to '{}' as job {}",
            selection.candidates.len(),
            selection.event_id,
            algorithm.name(),
            job_id
        );

        let mut outputs = Vec::with_capacity(selection.candidates.len());
        for candidate in &selection.candidates {
            let artifact = algorithm.run(&candidate.record, region)?;
            log::debug!(
                "'{}' produced {} for {}",
                algorithm.name(),
                artifact.uri,
                candidate.record.id
            );
            outputs.push(MaskOutput {
                asset_id: candidate.record.id.clone(),
                artifact,
            });
        }

        let handle = MaskJobHandle {
            job_id: job_id.clone(),
            event_id: selection.event_id.clone(),
            algorithm: algorithm.name().to_string(),
            outputs,
        };
        self.jobs.insert(
            job_id,
            MaskJob {
                handle: handle.clone(),
                corrections: Vec::new(),
            },
        );
        Ok(handle)
    }

    /// Sole mutation path once a human has reviewed output: append the
    /// correction to the job's history.
    pub fn apply_correction(
        &mut self,
        job_id: &str,
        correction: CorrectionEvent,
    ) -> FloodResult<()> {
        if correction.mask_job_id != job_id {
            return Err(FloodError::UnknownMaskJob {
                job_id: correction.mask_job_id,
            });
        }
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| FloodError::UnknownMaskJob {
                job_id: job_id.to_string(),
            })?;
        log::info!(
            "Correction by {} recorded for job {}",
            correction.correcting_user,
            job_id
        );
        job.corrections.push(correction);
        Ok(())
    }

    /// Ordered correction history of a job
    pub fn corrections(&self, job_id: &str) -> FloodResult<&[CorrectionEvent]> {
        self.jobs
            .get(job_id)
            .map(|job| job.corrections.as_slice())
            .ok_or_else(|| FloodError::UnknownMaskJob {
                job_id: job_id.to_string(),
            })
    }

    pub fn job(&self, job_id: &str) -> Option<&MaskJobHandle> {
        self.jobs.get(job_id).map(|job| &job.handle)
    }
}
