use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::models::{
    AnalysisOutcome, Differences, FieldDiff, FoodAnalysis, FoodAnalysisResult, RawImage,
};
use crate::services::VisionService;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("expected-output file {} is missing", .0.display())]
    MissingExpected(PathBuf),
    #[error("failed to read {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {}", path.display(), source)]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result of checking one fixture case. Mismatches are data, not errors.
#[derive(Debug, PartialEq)]
pub enum CaseReport {
    Pass,
    NoAnalysis,
    Differences(Differences),
}

/// Loads one fixture pair: the image plus the expected analysis stored next
/// to it under the same base name with a `.json` extension.
pub fn load_fixture_case(image_path: &Path) -> Result<(RawImage, FoodAnalysisResult), FixtureError> {
    log::debug!("Loading {}", image_path.display());
    let image = fs::read(image_path).map_err(|source| FixtureError::Io {
        path: image_path.to_path_buf(),
        source,
    })?;

    let json_path = image_path.with_extension("json");
    if !json_path.exists() {
        return Err(FixtureError::MissingExpected(json_path));
    }
    let raw = fs::read_to_string(&json_path).map_err(|source| FixtureError::Io {
        path: json_path.clone(),
        source,
    })?;
    let expected = serde_json::from_str(&raw).map_err(|source| FixtureError::Malformed {
        path: json_path,
        source,
    })?;

    Ok((image, expected))
}

/// Field-by-field comparison of the first analyzed food against the fixture's
/// expected food. Multi-food images are not supported here: only the first
/// entry is checked. fibre_g is outside the comparison set.
pub fn compare_analysis(actual: &FoodAnalysisResult, expected: &FoodAnalysis) -> CaseReport {
    let actual_food = match actual.foods.first() {
        Some(food) => food,
        None => return CaseReport::NoAnalysis,
    };

    let mut differences = Differences::new();

    let numeric_fields: [(&'static str, i64, i64); 6] = [
        ("protein_g", actual_food.protein_g as i64, expected.protein_g as i64),
        ("fat_g", actual_food.fat_g as i64, expected.fat_g as i64),
        (
            "carbohydrate_g",
            actual_food.carbohydrate_g as i64,
            expected.carbohydrate_g as i64,
        ),
        (
            "total_mass_g",
            actual_food.total_mass_g as i64,
            expected.total_mass_g as i64,
        ),
        ("total_kcal", actual_food.total_kcal as i64, expected.total_kcal as i64),
        (
            "total_health_score",
            actual_food.total_health_score as i64,
            expected.total_health_score as i64,
        ),
    ];
    for (name, actual_value, expected_value) in numeric_fields {
        if actual_value != expected_value {
            differences.insert(
                name,
                FieldDiff::Numeric {
                    actual: actual_value,
                    expected: expected_value,
                    difference: actual_value - expected_value,
                },
            );
        }
    }

    if actual_food.readable_name != expected.readable_name {
        differences.insert(
            "readable_name",
            FieldDiff::Text {
                actual: actual_food.readable_name.clone(),
                expected: expected.readable_name.clone(),
            },
        );
    }
    if actual_food.processing_degree != expected.processing_degree {
        differences.insert(
            "processing_degree",
            FieldDiff::Text {
                actual: actual_food.processing_degree.to_string(),
                expected: expected.processing_degree.to_string(),
            },
        );
    }

    // Component lists compare as unordered sets.
    let actual_set: BTreeSet<&str> = actual_food.components.iter().map(String::as_str).collect();
    let expected_set: BTreeSet<&str> = expected.components.iter().map(String::as_str).collect();
    if actual_set != expected_set {
        differences.insert(
            "components",
            FieldDiff::Components {
                actual: actual_set.iter().map(|s| s.to_string()).collect(),
                expected: expected_set.iter().map(|s| s.to_string()).collect(),
                missing: expected_set
                    .difference(&actual_set)
                    .map(|s| s.to_string())
                    .collect(),
                unexpected: actual_set
                    .difference(&expected_set)
                    .map(|s| s.to_string())
                    .collect(),
            },
        );
    }

    if differences.is_empty() {
        CaseReport::Pass
    } else {
        CaseReport::Differences(differences)
    }
}

/// Runs every fixture case in a directory through the vision client and
/// prints a per-case diff report. One bad case never aborts its siblings.
pub struct Validator {
    vision: Arc<dyn VisionService>,
}

impl Validator {
    pub fn new(vision: Arc<dyn VisionService>) -> Self {
        Self { vision }
    }

    pub async fn run(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            println!("Validation directory {} does not exist", dir.display());
            return Ok(());
        }

        let mut image_paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "jpg").unwrap_or(false))
            .collect();
        image_paths.sort();

        if image_paths.is_empty() {
            println!("No fixture images found in {}", dir.display());
            return Ok(());
        }

        for path in image_paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("\nValidating {}", name);

            let (image, expected) = match load_fixture_case(&path) {
                Ok(case) => case,
                Err(err) => {
                    log::warn!("⚠️ Skipping {}: {}", name, err);
                    println!("Error processing {}: {}", name, err);
                    continue;
                }
            };
            let expected_food = match expected.foods.first() {
                Some(food) => food,
                None => {
                    log::warn!("⚠️ Fixture {} lists no foods, skipping", name);
                    println!("Error processing {}: fixture lists no foods", name);
                    continue;
                }
            };

            let outcome = self.vision.analyze(std::slice::from_ref(&image)).await;
            let report = match outcome {
                AnalysisOutcome::Success(result) => compare_analysis(&result, expected_food),
                AnalysisOutcome::Refusal(reason) => {
                    log::info!("🚫 Model refused {}: {}", name, reason);
                    CaseReport::NoAnalysis
                }
                AnalysisOutcome::Failed(err) => {
                    log::error!("❌ Analysis of {} failed: {}", name, err);
                    CaseReport::NoAnalysis
                }
            };

            match report {
                CaseReport::Pass => println!("No differences found - test passed!"),
                CaseReport::NoAnalysis => {
                    println!("{}", serde_json::json!({ "error": "No analysis produced" }))
                }
                CaseReport::Differences(differences) => {
                    println!("Differences found:");
                    println!("{}", serde_json::to_string_pretty(&differences)?);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::ProcessingDegree;

    fn salad() -> FoodAnalysis {
        FoodAnalysis {
            readable_name: "Salad".to_string(),
            protein_g: 10,
            fat_g: 5,
            carbohydrate_g: 20,
            fibre_g: 4,
            total_mass_g: 300,
            total_kcal: 250,
            total_health_score: 8,
            processing_degree: ProcessingDegree::Low,
            components: vec!["lettuce".to_string(), "tomato".to_string()],
        }
    }

    fn result_of(food: FoodAnalysis) -> FoodAnalysisResult {
        FoodAnalysisResult { foods: vec![food] }
    }

    #[test]
    fn test_identical_analysis_passes() {
        let report = compare_analysis(&result_of(salad()), &salad());
        assert_eq!(report, CaseReport::Pass);
    }

    #[test]
    fn test_empty_result_reports_no_analysis() {
        let report = compare_analysis(&FoodAnalysisResult::default(), &salad());
        assert_eq!(report, CaseReport::NoAnalysis);
    }

    #[test]
    fn test_health_score_mismatch_is_the_only_key() {
        let mut actual = salad();
        actual.total_health_score = 6;

        let report = compare_analysis(&result_of(actual), &salad());
        let differences = match report {
            CaseReport::Differences(differences) => differences,
            other => panic!("expected differences, got {:?}", other),
        };

        assert_eq!(
            serde_json::to_value(&differences).unwrap(),
            json!({
                "total_health_score": { "actual": 6, "expected": 8, "difference": -2 }
            })
        );
    }

    #[test]
    fn test_numeric_difference_is_signed() {
        let mut actual = salad();
        actual.total_kcal = 400;

        let report = compare_analysis(&result_of(actual), &salad());
        match report {
            CaseReport::Differences(differences) => {
                assert_eq!(
                    differences["total_kcal"],
                    FieldDiff::Numeric {
                        actual: 400,
                        expected: 250,
                        difference: 150,
                    }
                );
            }
            other => panic!("expected differences, got {:?}", other),
        }
    }

    #[test]
    fn test_fibre_is_not_compared() {
        let mut actual = salad();
        actual.fibre_g = 99;

        let report = compare_analysis(&result_of(actual), &salad());
        assert_eq!(report, CaseReport::Pass);
    }

    #[test]
    fn test_component_sets_ignore_order() {
        let mut actual = salad();
        actual.components = vec!["tomato".to_string(), "lettuce".to_string()];

        let report = compare_analysis(&result_of(actual), &salad());
        assert_eq!(report, CaseReport::Pass);
    }

    #[test]
    fn test_component_missing_and_unexpected_sets() {
        let mut actual = salad();
        actual.components = vec!["lettuce".to_string(), "cucumber".to_string()];

        let report = compare_analysis(&result_of(actual), &salad());
        let differences = match report {
            CaseReport::Differences(differences) => differences,
            other => panic!("expected differences, got {:?}", other),
        };

        assert_eq!(
            differences["components"],
            FieldDiff::Components {
                actual: vec!["cucumber".to_string(), "lettuce".to_string()],
                expected: vec!["lettuce".to_string(), "tomato".to_string()],
                missing: vec!["tomato".to_string()],
                unexpected: vec!["cucumber".to_string()],
            }
        );
    }

    #[test]
    fn test_string_field_mismatch_has_no_difference_metric() {
        let mut actual = salad();
        actual.readable_name = "Caesar Salad".to_string();
        actual.processing_degree = ProcessingDegree::Medium;

        let report = compare_analysis(&result_of(actual), &salad());
        let differences = match report {
            CaseReport::Differences(differences) => differences,
            other => panic!("expected differences, got {:?}", other),
        };

        assert_eq!(
            serde_json::to_value(&differences).unwrap(),
            json!({
                "readable_name": { "actual": "Caesar Salad", "expected": "Salad" },
                "processing_degree": { "actual": "medium", "expected": "low" }
            })
        );
    }

    #[test]
    fn test_only_first_food_is_compared() {
        let mut second = salad();
        second.total_kcal = 999;
        let actual = FoodAnalysisResult {
            foods: vec![salad(), second],
        };

        let report = compare_analysis(&actual, &salad());
        assert_eq!(report, CaseReport::Pass);
    }

    #[test]
    fn test_load_fixture_pair() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("lunch.jpg");
        fs::write(&image_path, [0xff, 0xd8, 0xff]).unwrap();
        fs::write(
            dir.path().join("lunch.json"),
            serde_json::to_string(&result_of(salad())).unwrap(),
        )
        .unwrap();

        let (image, expected) = load_fixture_case(&image_path).unwrap();
        assert_eq!(image, vec![0xff, 0xd8, 0xff]);
        assert_eq!(expected.foods[0], salad());
    }

    #[test]
    fn test_missing_expected_file() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("lunch.jpg");
        fs::write(&image_path, [0xff, 0xd8, 0xff]).unwrap();

        assert!(matches!(
            load_fixture_case(&image_path),
            Err(FixtureError::MissingExpected(_))
        ));
    }

    struct RefusingVision {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionService for RefusingVision {
        async fn analyze(&self, _images: &[RawImage]) -> AnalysisOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AnalysisOutcome::Refusal("no food here".to_string())
        }
    }

    #[tokio::test]
    async fn test_refusal_does_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["breakfast", "lunch"] {
            fs::write(dir.path().join(format!("{}.jpg", name)), [0xff]).unwrap();
            fs::write(
                dir.path().join(format!("{}.json", name)),
                serde_json::to_string(&result_of(salad())).unwrap(),
            )
            .unwrap();
        }

        let vision = Arc::new(RefusingVision {
            calls: AtomicUsize::new(0),
        });
        let validator = Validator::new(vision.clone());
        validator.run(dir.path()).await.unwrap();

        // Both cases analyzed despite the first refusal.
        assert_eq!(vision.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_case_with_missing_json_skips_analysis() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("orphan.jpg"), [0xff]).unwrap();
        fs::write(dir.path().join("lunch.jpg"), [0xff]).unwrap();
        fs::write(
            dir.path().join("lunch.json"),
            serde_json::to_string(&result_of(salad())).unwrap(),
        )
        .unwrap();

        let vision = Arc::new(RefusingVision {
            calls: AtomicUsize::new(0),
        });
        let validator = Validator::new(vision.clone());
        validator.run(dir.path()).await.unwrap();

        // The orphaned image is reported without an analysis call.
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }
}
