//! Plain-text rendering of core results.

use railcast_core::{
    DailyFeatureRow, DisruptionEvent, Forecast, HourlyTable, OutlookReport,
    model::CurrentConditions,
};

pub fn forecast(forecast: &Forecast) -> String {
    let mut out = String::new();
    if let Some(current) = &forecast.current {
        out.push_str(&current_line(current));
        out.push('\n');
    }
    out.push_str(&hourly(&forecast.hourly));
    out
}

fn current_line(current: &CurrentConditions) -> String {
    format!(
        "Now ({}): {:.1} °C, wind {:.1} km/h\n",
        current.time.format("%Y-%m-%d %H:%M"),
        current.temperature,
        current.windspeed
    )
}

pub fn hourly(table: &HourlyTable) -> String {
    let header: String = table
        .features
        .iter()
        .map(|feature| format!(" {:>20}", feature.api_name()))
        .collect();
    let mut out = format!("{:<17}{header}\n", "time");

    for row in &table.rows {
        let cells: String = table
            .features
            .iter()
            .map(|feature| {
                let cell = row.value(*feature).map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
                format!(" {cell:>20}")
            })
            .collect();
        out.push_str(&format!("{:<17}{cells}\n", row.time.format("%Y-%m-%d %H:%M")));
    }

    out
}

const DAILY_HEADER: &str = "date         temp mean  temp min  temp max  rain sum";

fn daily_cells(row: &DailyFeatureRow) -> String {
    format!(
        "{}  {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
        row.date,
        row.temperature_2m_mean,
        row.temperature_2m_min,
        row.temperature_2m_max,
        row.rain_sum
    )
}

pub fn daily(rows: &[DailyFeatureRow]) -> String {
    let mut out = format!("{DAILY_HEADER}\n");
    for row in rows {
        out.push_str(&daily_cells(row));
        out.push('\n');
    }
    out
}

fn headline(report: &OutlookReport) -> String {
    let Some(today) = &report.today else {
        return "No forecast days available to predict from.\n".to_string();
    };

    let mut out = format!(
        "Predicted train disruption minutes for {}: {:.2}  (via {})\n",
        today.features.date, today.prediction.minutes, today.prediction.endpoint
    );
    for failure in &today.prediction.failed_attempts {
        out.push_str(&format!("  skipped {failure}\n"));
    }
    out
}

pub fn report(report: &OutlookReport) -> String {
    let mut out = format!(
        "Disruption outlook for {} at {}\n",
        report.generated_for, report.location
    );
    out.push_str(&headline(report));
    out.push_str(&format!(
        "Observed NS disruption minutes today: {:.2}\n",
        report.observed_minutes_today
    ));

    if let Some(current) = &report.current {
        out.push('\n');
        out.push_str(&current_line(current));
    }

    out.push_str(&format!("\n{DAILY_HEADER}  predicted min\n"));
    for day in &report.days {
        out.push_str(&format!(
            "{}  {:>13.2}\n",
            daily_cells(&day.features),
            day.prediction.minutes
        ));
    }

    out
}

pub fn disruptions(total: f64, listed: Option<&[&DisruptionEvent]>) -> String {
    let mut out = format!("Observed NS disruption minutes today: {total:.2}\n");

    for e in listed.unwrap_or_default() {
        out.push_str(&format!(
            "  {} {}-{} {:>7.1} min  {} ({})\n",
            e.start.format("%Y-%m-%d"),
            e.start.format("%H:%M"),
            e.end.format("%H:%M"),
            e.duration_minutes(),
            e.title,
            e.cause
        ));
    }

    out
}
