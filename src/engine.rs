//! Benchmark engine that turns run settings into a monomorphized scan.
//!
//! The runtime configuration (metric, storage format, kernel variant, filter)
//! is matched once here. Everything below that point is static dispatch:
//! storage, kernel and filter types are fixed for the whole scan.

use tracing::{info, warn};

use crate::config::{RunSettings, UnsupportedPolicy};
use crate::error::BenchResult;
use crate::report::{RunMetadata, RunReport};
use crate::vector::{
    Alignment, CandidateFilter, DEFAULT_NORMALIZATION_TOLERANCE, DistanceKernel, DotProduct,
    Encoding, EncodingKind, Fixed16, Fixed16Unaligned, Float32, Float32Unaligned, KernelVariant,
    Metric, MetricKind, NoFilter, ScanResult, SketchFilter, SquaredEuclidean, StorageFormat,
    VectorBatch, VectorError, VectorStorage, scan, scan_parallel,
};

/// Runs one configured benchmark over caller-provided batches.
#[derive(Debug, Clone)]
pub struct BenchmarkEngine {
    settings: RunSettings,
    normalization_tolerance: f32,
}

impl BenchmarkEngine {
    #[must_use = "The engine does nothing until run() is called"]
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_normalization_tolerance(mut self, tolerance: f32) -> Self {
        self.normalization_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Settings of the exact reference run: same metric, scalar kernel,
    /// aligned `float32` storage, no filter.
    #[must_use]
    pub fn baseline_settings(&self) -> RunSettings {
        RunSettings {
            encoding: EncodingKind::Float32,
            alignment: Alignment::Aligned,
            kernel: KernelVariant::Scalar,
            filter: false,
            ..self.settings.clone()
        }
    }

    /// Runs the configured benchmark.
    ///
    /// The returned metadata names the kernel variant that actually ran,
    /// which differs from the configured one after a fallback.
    pub fn run<B>(&self, data: &B, queries: &B, dataset: &str) -> BenchResult<RunReport>
    where
        B: VectorBatch + ?Sized,
    {
        let mut settings = self.settings.clone();
        let format = settings.storage_format();
        settings.metric.check_encoding(format.kind())?;

        info!(
            metric = %settings.metric,
            storage = %format,
            kernel = %settings.kernel,
            filter = settings.filter,
            parallel = settings.parallel,
            "Starting run"
        );

        let (result, kernel) = match (settings.metric, format) {
            (MetricKind::DotProduct, StorageFormat::Float32) => {
                self.run_with::<Float32, DotProduct, B>(&settings, data, queries)?
            }
            (MetricKind::DotProduct, StorageFormat::Float32Unaligned) => {
                self.run_with::<Float32Unaligned, DotProduct, B>(&settings, data, queries)?
            }
            (MetricKind::DotProduct, StorageFormat::Fixed16) => {
                self.run_with::<Fixed16, DotProduct, B>(&settings, data, queries)?
            }
            (MetricKind::DotProduct, StorageFormat::Fixed16Unaligned) => {
                self.run_with::<Fixed16Unaligned, DotProduct, B>(&settings, data, queries)?
            }
            (MetricKind::Euclidean, StorageFormat::Float32) => {
                self.run_with::<Float32, SquaredEuclidean, B>(&settings, data, queries)?
            }
            (MetricKind::Euclidean, StorageFormat::Float32Unaligned) => {
                self.run_with::<Float32Unaligned, SquaredEuclidean, B>(&settings, data, queries)?
            }
            (MetricKind::Euclidean, StorageFormat::Fixed16 | StorageFormat::Fixed16Unaligned) => {
                return Err(VectorError::UnsupportedCombination {
                    metric: settings.metric.as_str(),
                    encoding: format.kind().as_str(),
                }
                .into());
            }
        };
        settings.kernel = kernel;

        Ok(RunReport {
            metadata: RunMetadata::new(&settings, dataset),
            result,
            recall: None,
        })
    }

    /// Runs the exact baseline, then the configured benchmark, and reports
    /// the recall of the latter against the former.
    pub fn run_with_baseline<B>(
        &self,
        data: &B,
        queries: &B,
        dataset: &str,
    ) -> BenchResult<(RunReport, RunReport)>
    where
        B: VectorBatch + ?Sized,
    {
        let baseline_engine = Self {
            settings: self.baseline_settings(),
            normalization_tolerance: self.normalization_tolerance,
        };
        let mut baseline = baseline_engine.run(data, queries, dataset)?;
        baseline.recall = Some(1.0);

        let mut report = self.run(data, queries, dataset)?;
        report.recall = report.result.recall_against(&baseline.result);
        if let Some(recall) = report.recall {
            info!(recall, components = %report.metadata.components, "Recall against baseline");
        }
        Ok((baseline, report))
    }

    fn resolve_kernel<E, M>(
        &self,
        variant: KernelVariant,
    ) -> BenchResult<DistanceKernel<E::Scalar, M>>
    where
        E: Encoding,
        M: Metric<E::Scalar>,
    {
        match DistanceKernel::for_encoding::<E>(variant) {
            Ok(kernel) => Ok(kernel),
            Err(e @ VectorError::UnsupportedInstructionSet { .. })
                if self.settings.on_unsupported == UnsupportedPolicy::Fallback =>
            {
                warn!(
                    requested = %variant,
                    encoding = E::NAME,
                    "{e}; falling back to the scalar kernel"
                );
                Ok(DistanceKernel::for_encoding::<E>(KernelVariant::Scalar)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn run_with<E, M, B>(
        &self,
        settings: &RunSettings,
        data: &B,
        queries: &B,
    ) -> BenchResult<(ScanResult, KernelVariant)>
    where
        E: Encoding,
        M: Metric<E::Scalar>,
        B: VectorBatch + ?Sized,
    {
        let kernel = self.resolve_kernel::<E, M>(settings.kernel)?;
        let data = VectorStorage::<E>::from_batch(data)?;
        let queries = VectorStorage::<E>::from_batch(queries)?;

        let result = if settings.filter {
            let mut filter = SketchFilter::<E>::new(settings.recall)
                .with_normalization_tolerance(self.normalization_tolerance);
            filter.setup(&data, &queries, settings.seed)?;
            Self::execute(settings, &data, &queries, &kernel, filter)?
        } else {
            Self::execute(settings, &data, &queries, &kernel, NoFilter)?
        };
        Ok((result, kernel.variant()))
    }

    fn execute<E, M, F>(
        settings: &RunSettings,
        data: &VectorStorage<E>,
        queries: &VectorStorage<E>,
        kernel: &DistanceKernel<E::Scalar, M>,
        mut filter: F,
    ) -> BenchResult<ScanResult>
    where
        E: Encoding,
        M: Metric<E::Scalar>,
        F: CandidateFilter<E>,
    {
        if settings.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(settings.threads)
                .build()?;
            Ok(pool.install(|| scan_parallel(data, queries, kernel, &filter))?)
        } else {
            Ok(scan(data, queries, kernel, &mut filter)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::vector::{Recall, RowMajorBatch, SyntheticDataset};

    #[test]
    fn test_run_reports_configuration() {
        let data = RowMajorBatch::from_rows(&[[0.0f32, 0.0], [1.0, 1.0], [5.0, 5.0]]).unwrap();
        let queries = RowMajorBatch::from_rows(&[[0.9f32, 0.9]]).unwrap();
        let engine = BenchmarkEngine::new(RunSettings {
            metric: MetricKind::Euclidean,
            ..RunSettings::default()
        });

        let report = engine.run(&data, &queries, "tiny").unwrap();
        assert_eq!(report.result.nearest, vec![Some(1)]);
        assert_eq!(report.metadata.dataset, "tiny");
        assert_eq!(report.metadata.components, "nofilter_float32_scalar");
        assert_eq!(report.recall, None);
    }

    #[test]
    fn test_euclidean_fixed_point_is_rejected() {
        let data = RowMajorBatch::from_rows(&[[1.0f32, 0.0]]).unwrap();
        let engine = BenchmarkEngine::new(RunSettings {
            metric: MetricKind::Euclidean,
            encoding: EncodingKind::Fixed16,
            ..RunSettings::default()
        });

        let err = engine.run(&data, &data, "tiny").unwrap_err();
        assert!(matches!(
            err,
            BenchError::Vector(VectorError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn test_fallback_runs_scalar() {
        let dataset = SyntheticDataset::generate(30, 4, 16, 0.1, 5).unwrap();
        for variant in [KernelVariant::SimdA, KernelVariant::SimdB] {
            let engine = BenchmarkEngine::new(RunSettings {
                kernel: variant,
                on_unsupported: UnsupportedPolicy::Fallback,
                ..RunSettings::default()
            });
            let report = engine.run(&dataset.data, &dataset.queries, "synthetic").unwrap();
            let expected = if variant.is_available(crate::vector::LaneType::F32) {
                variant
            } else {
                KernelVariant::Scalar
            };
            assert_eq!(report.metadata.kernel, expected);
        }
    }

    #[test]
    fn test_baseline_recall() {
        let dataset = SyntheticDataset::generate(200, 20, 32, 0.05, 8).unwrap();
        let engine = BenchmarkEngine::new(RunSettings {
            encoding: EncodingKind::Fixed16,
            filter: true,
            recall: Recall::new(0.99).unwrap(),
            ..RunSettings::default()
        });

        let (baseline, report) = engine
            .run_with_baseline(&dataset.data, &dataset.queries, "synthetic")
            .unwrap();
        assert_eq!(baseline.metadata.components, "nofilter_float32_scalar");
        assert_eq!(report.metadata.components, "filter_fixed16_scalar");
        let recall = report.recall.unwrap();
        assert!((0.0..=1.0).contains(&recall));
    }

    #[test]
    fn test_parallel_run_matches_sequential() {
        let dataset = SyntheticDataset::generate(100, 16, 24, 0.1, 4).unwrap();
        let sequential = BenchmarkEngine::new(RunSettings::default())
            .run(&dataset.data, &dataset.queries, "synthetic")
            .unwrap();
        let parallel = BenchmarkEngine::new(RunSettings {
            parallel: true,
            threads: 2,
            ..RunSettings::default()
        })
        .run(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();
        assert_eq!(sequential.result.nearest, parallel.result.nearest);
    }
}
