//! Randomized feeders and collectors for exercising the file blocks.
//!
//! A [`TestPlan`] describes how many chunks of which sizes a
//! [`FeederSource`] generates. The chunks are pushed through the blocks under
//! test and gathered by a [`CollectorSink`], which then checks that what came
//! out matches what went in.

use futures::{pin_mut, Stream, StreamExt};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::buffer::compare::compare_equal;
use crate::buffer::{BufferChunk, Mismatch};
use crate::error::BlockError;
use crate::types::{DType, NativeType, ScalarKind};

fn default_true() -> bool {
    true
}

/// Random chunk plan. JSON keys are camelCase, e.g. `minTrials`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestPlan {
    /// Generate buffers at all; a plan without buffers feeds nothing.
    #[serde(default = "default_true")]
    pub enable_buffers: bool,
    pub min_trials: usize,
    pub max_trials: usize,
    /// Elements per chunk, inclusive bounds.
    pub min_size: usize,
    pub max_size: usize,
    /// Fixed seed for a reproducible plan.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TestPlan {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Generates random chunks of one data type.
pub struct FeederSource {
    dtype: DType,
}

impl FeederSource {
    pub fn new(dtype: DType) -> Self {
        FeederSource { dtype }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Generates the chunks of `plan`. Integer types get random bit
    /// patterns; floating types get finite values in `[-1, 1)` so that the
    /// chunks compare equal to themselves.
    pub fn feed_test_plan(&self, plan: &TestPlan) -> Result<Vec<BufferChunk>, BlockError> {
        if !plan.enable_buffers {
            return Ok(vec![]);
        }
        if plan.min_trials > plan.max_trials || plan.min_size > plan.max_size {
            return Err(BlockError::Configuration {
                block: "FeederSource",
                reason: "test plan minimum exceeds its maximum",
            });
        }
        let seed = plan.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let trials = rng.random_range(plan.min_trials..=plan.max_trials);
        debug!("feeding {trials} {} chunks with seed {seed}", self.dtype);

        let mut chunks = Vec::with_capacity(trials);
        for _ in 0..trials {
            let elements = rng.random_range(plan.min_size..=plan.max_size);
            let mut chunk = BufferChunk::new(self.dtype, elements)?;
            self.fill(&mut rng, chunk.as_bytes_mut());
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// The chunks of `plan` as a stream ready for a sink.
    pub fn feed_stream(
        &self,
        plan: &TestPlan,
    ) -> Result<impl Stream<Item = Result<BufferChunk, BlockError>>, BlockError> {
        let chunks = self.feed_test_plan(plan)?;
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)))
    }

    fn fill(&self, rng: &mut StdRng, bytes: &mut [u8]) {
        match (self.dtype.kind(), self.dtype.bits()) {
            (ScalarKind::Float, 32) => {
                for value in bytes.chunks_exact_mut(4) {
                    value.copy_from_slice(&rng.random_range(-1.0f32..1.0).to_ne_bytes());
                }
            }
            (ScalarKind::Float, _) => {
                for value in bytes.chunks_exact_mut(8) {
                    value.copy_from_slice(&rng.random_range(-1.0f64..1.0).to_ne_bytes());
                }
            }
            _ => rng.fill(bytes),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Mismatch(#[from] Mismatch),
}

/// Gathers every chunk it is handed.
pub struct CollectorSink {
    dtype: DType,
    chunks: Vec<BufferChunk>,
}

impl CollectorSink {
    pub fn new(dtype: DType) -> Self {
        CollectorSink {
            dtype,
            chunks: vec![],
        }
    }

    pub fn push(&mut self, chunk: BufferChunk) -> Result<(), BlockError> {
        if chunk.dtype() != self.dtype {
            return Err(BlockError::TypeMismatch {
                expected: self.dtype,
                actual: chunk.dtype(),
            });
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Drains `chunks` into the collector, stopping at the first error.
    pub async fn collect<S>(&mut self, chunks: S) -> Result<(), BlockError>
    where
        S: Stream<Item = Result<BufferChunk, BlockError>>,
    {
        pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            self.push(chunk?)?;
        }
        Ok(())
    }

    pub fn chunks(&self) -> &[BufferChunk] {
        &self.chunks
    }

    pub fn elements(&self) -> usize {
        self.chunks.iter().map(BufferChunk::elements).sum()
    }

    /// Everything collected so far as one chunk.
    pub fn collected(&self) -> Result<BufferChunk, BlockError> {
        BufferChunk::concat(self.dtype, &self.chunks)
    }

    /// Checks that the collected elements equal the concatenation of
    /// `expected`, regardless of how either side was split into chunks.
    pub fn verify<T: NativeType>(&self, expected: &[BufferChunk]) -> Result<(), VerifyError> {
        let dtype = expected.first().map_or(self.dtype, BufferChunk::dtype);
        let expected = BufferChunk::concat(dtype, expected)?;
        compare_equal::<T>(&expected, &self.collected()?)?;
        Ok(())
    }
}
