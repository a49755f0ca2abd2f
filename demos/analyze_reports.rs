use std::path::Path;
use std::sync::Arc;

use annual_report_analyzer::{
    AnalysisService, DataStore, GeminiClient, PipelineConfig, Report,
};
use dotenv::dotenv;
use tokio::fs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = PipelineConfig::from_env()?;
    let client = Arc::new(GeminiClient::from_env(
        config.llm_model.clone(),
        config.llm_timeout,
    )?);
    let store = Arc::new(DataStore::new("./data")?);
    let service = Arc::new(AnalysisService::new(client, store, config)?);

    let doc_dir = Path::new("demos").join("documents");
    if !doc_dir.exists() {
        fs::create_dir_all(&doc_dir).await?;
        println!("Created '{}'. Place annual reports (PDF or text) there and re-run.", doc_dir.display());
        return Ok(());
    }

    let mut dir_stream = fs::read_dir(&doc_dir).await?;
    let mut reports: Vec<(Report, Vec<u8>)> = Vec::new();
    while let Ok(Some(entry)) = dir_stream.next_entry().await {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let bytes = fs::read(&path).await?;
        let report = service.register_report(
            stem,
            None,
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("report"),
            None,
        )?;
        reports.push((report, bytes));
    }
    if reports.is_empty() {
        println!("No documents found in {}.", doc_dir.display());
        return Ok(());
    }

    println!("Extracting {} report(s)...", reports.len());
    let extractions: Vec<_> = reports
        .iter()
        .map(|(report, bytes)| {
            let service = service.clone();
            async move { (report.id, service.extract(report.id, bytes).await) }
        })
        .collect();
    let results = futures::future::join_all(extractions).await;

    for (id, result) in results {
        match result {
            Ok(financial) => {
                println!("\n=== {} ===", financial.company_name);
                if let Some(revenue) = financial.revenue.current_year {
                    println!("Revenue: {:.0}", revenue);
                }

                let predictions = service.get_predictions(id).await?;
                if let Some(growth) = &predictions.growth_rate {
                    println!(
                        "Predicted growth: {:.1}% ({:.1}% to {:.1}%)",
                        growth.predicted, growth.confidence_lower, growth.confidence_upper
                    );
                }
                for forecast in &predictions.sales_forecast {
                    println!(
                        "  {}: {:.0} ({:.0} to {:.0})",
                        forecast.year,
                        forecast.predicted_revenue,
                        forecast.confidence_lower,
                        forecast.confidence_upper
                    );
                }

                let leads = service.generate_leads(id).await?;
                println!("Rating: {:?} - {}", leads.rating, leads.summary);
            }
            Err(e) => println!("report {} failed: {}", id, e),
        }
    }

    Ok(())
}
