use std::sync::Arc;

use anyhow::Result;

use crate::models::{AnalysisOutcome, DateQuery, RawImage};
use crate::services::{ImageFetcher, MediaSource, VisionService};

/// Search -> fetch -> analyze, one batch per run. Fetch failures skip the
/// item; search failures abort the run.
pub struct AnalysisPipeline {
    photos: Arc<dyn MediaSource>,
    fetcher: Arc<dyn ImageFetcher>,
    vision: Arc<dyn VisionService>,
}

impl AnalysisPipeline {
    pub fn new(
        photos: Arc<dyn MediaSource>,
        fetcher: Arc<dyn ImageFetcher>,
        vision: Arc<dyn VisionService>,
    ) -> Self {
        Self {
            photos,
            fetcher,
            vision,
        }
    }

    pub async fn run(&self, category: Option<&str>, date: DateQuery) -> Result<()> {
        match category {
            Some(term) => println!("Searching photos matching {} on {}", term, date),
            None => println!("Searching photos on {}", date),
        }

        let items = self.photos.search(category, Some(date)).await?;
        if items.is_empty() {
            println!("No media items found.");
            return Ok(());
        }

        let mut images: Vec<RawImage> = Vec::new();
        for item in &items {
            println!("Filename: {}", item.filename);
            log::debug!(
                "📷 {} (id {}) created {:?}",
                item.filename,
                item.id,
                item.creation_time()
            );

            match self.fetcher.fetch(&item.download_url()).await {
                Ok(bytes) => images.push(bytes),
                Err(err) => {
                    log::warn!("⚠️ Skipping {}: {}", item.filename, err);
                }
            }
        }

        if images.is_empty() {
            println!("No images downloaded.");
            return Ok(());
        }

        match self.vision.analyze(&images).await {
            AnalysisOutcome::Success(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            AnalysisOutcome::Refusal(reason) => {
                println!("Model declined to analyze: {}", reason);
            }
            AnalysisOutcome::Failed(err) => {
                log::error!("❌ Analysis failed: {}", err);
                println!("Analysis failed: {}", err);
            }
        }

        Ok(())
    }
}
