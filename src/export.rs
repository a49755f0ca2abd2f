//! Tabular export of extracted figures and forecasts.
//!
//! Renders one CSV per report with a `metric,value,low,high` layout: the
//! verified figures first, then growth and per-year forecast rows when
//! predictions exist. Null figures are omitted, never zero-filled.

use csv::WriterBuilder;

use crate::error::{AnalysisError, Result};
use crate::schema::{FinancialData, Predictions};

pub fn render_csv(financial: &FinancialData, predictions: Option<&Predictions>) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(["metric", "value", "low", "high"])?;

    let figure = |writer: &mut csv::Writer<Vec<u8>>, label: &str, value: Option<f64>| {
        match value {
            Some(v) => writer.write_record([label, format!("{v:.2}").as_str(), "", ""]),
            None => Ok(()),
        }
    };

    writer.write_record(["company", financial.company_name.as_str(), "", ""])?;
    if let Some(year) = financial.report_year {
        writer.write_record(["fiscal_year", year.to_string().as_str(), "", ""])?;
    }
    if let Some(currency) = &financial.revenue.currency {
        writer.write_record(["currency", currency.as_str(), "", ""])?;
    }

    figure(&mut writer, "revenue_current", financial.revenue.current_year)?;
    figure(&mut writer, "revenue_previous", financial.revenue.previous_year)?;
    figure(&mut writer, "net_income_current", financial.net_income.current_year)?;
    figure(&mut writer, "net_income_previous", financial.net_income.previous_year)?;
    figure(&mut writer, "total_assets", financial.total_assets)?;
    figure(&mut writer, "total_liabilities", financial.total_liabilities)?;
    figure(&mut writer, "shareholders_equity", financial.shareholders_equity)?;
    figure(&mut writer, "cash_flow_operating", financial.cash_flow.operating)?;
    figure(&mut writer, "cash_flow_investing", financial.cash_flow.investing)?;
    figure(&mut writer, "cash_flow_financing", financial.cash_flow.financing)?;
    figure(&mut writer, "eps", financial.key_metrics.eps)?;
    figure(&mut writer, "roe_pct", financial.key_metrics.roe)?;
    figure(&mut writer, "debt_to_equity", financial.key_metrics.debt_to_equity)?;

    for segment in &financial.segment_revenue {
        figure(
            &mut writer,
            &format!("segment:{}", segment.segment),
            segment.revenue,
        )?;
    }
    for region in &financial.geographic_revenue {
        figure(
            &mut writer,
            &format!("region:{}", region.region),
            region.revenue,
        )?;
    }

    if let Some(predictions) = predictions.filter(|p| p.success) {
        if let Some(growth) = &predictions.growth_rate {
            writer.write_record([
                "predicted_growth_pct".to_string(),
                format!("{:.2}", growth.predicted),
                format!("{:.2}", growth.confidence_lower),
                format!("{:.2}", growth.confidence_upper),
            ])?;
        }
        for forecast in &predictions.sales_forecast {
            writer.write_record([
                format!("forecast_{}", forecast.year),
                format!("{:.2}", forecast.predicted_revenue),
                format!("{:.2}", forecast.confidence_lower),
                format!("{:.2}", forecast.confidence_upper),
            ])?;
        }
        for segment in &predictions.segment_breakdown {
            writer.write_record([
                format!("forecast_segment:{}", segment.segment),
                format!("{:.2}", segment.predicted_revenue),
                format!("{:.2}", segment.proportion),
                format!("{:.2}", segment.predicted_growth),
            ])?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| AnalysisError::IoError(std::io::Error::other(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GrowthRate, ReportId, RevenueFigures, SalesForecast};
    use chrono::Utc;

    fn financial() -> FinancialData {
        FinancialData {
            company_name: "Acme Corp".to_string(),
            report_year: Some(2023),
            revenue: RevenueFigures {
                current_year: Some(61_858_000_000.0),
                previous_year: Some(51_728_000_000.0),
                currency: Some("USD".to_string()),
            },
            total_assets: Some(120_500_000_000.0),
            ..FinancialData::default()
        }
    }

    fn predictions() -> Predictions {
        Predictions {
            success: true,
            report_id: ReportId(1),
            generated_at: Utc::now(),
            growth_rate: Some(GrowthRate {
                predicted: 12.5,
                confidence_lower: 8.0,
                confidence_upper: 17.0,
                confidence_level: 0.90,
                historical_growth: Some(19.6),
            }),
            sales_forecast: vec![SalesForecast {
                year: 2024,
                predicted_revenue: 69_590_000_000.0,
                confidence_lower: 61_000_000_000.0,
                confidence_upper: 78_000_000_000.0,
                growth_rate: 12.5,
                currency: "USD".to_string(),
            }],
            segment_breakdown: Vec::new(),
            recommendations: Vec::new(),
            risk_metrics: None,
            scenarios: None,
            anomalies: Vec::new(),
            fallback_used: false,
            error: None,
        }
    }

    #[test]
    fn figures_and_forecasts_share_one_sheet() {
        let bytes = render_csv(&financial(), Some(&predictions())).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("metric,value,low,high\n"));
        assert!(text.contains("company,Acme Corp"));
        assert!(text.contains("revenue_current,61858000000.00"));
        assert!(text.contains("predicted_growth_pct,12.50,8.00,17.00"));
        assert!(text.contains("forecast_2024,69590000000.00"));
    }

    #[test]
    fn null_figures_are_omitted() {
        let financial = FinancialData {
            company_name: "Sparse Co".to_string(),
            ..FinancialData::default()
        };
        let text = String::from_utf8(render_csv(&financial, None).unwrap()).unwrap();
        assert!(!text.contains("revenue_current"));
        assert!(!text.contains("total_assets"));
        assert!(!text.contains("predicted_growth_pct"));
    }
}
