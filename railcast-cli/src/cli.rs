use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use inquire::{
    Confirm, CustomType, CustomUserError, Password, PasswordDisplayMode, Text,
    validator::Validation,
};
use railcast_core::{
    Config, Location, Outlook, WeatherFeature,
    disruption::{events_on, observed_minutes_on},
    outlook_from_config,
    predict::{EndpointCandidate, PayloadFormat},
};
use serde_json::json;

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "railcast", version, about = "Weather-based train disruption outlook")]
pub struct Cli {
    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct At {
    /// Latitude; defaults to the configured location.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude; defaults to the configured location.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: Option<f64>,
}

impl At {
    fn resolve(&self, config: &Config) -> anyhow::Result<Location> {
        Ok(Location::new(
            self.lat.unwrap_or(config.latitude),
            self.lon.unwrap_or(config.longitude),
        )?)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the NS key, default location and timeouts interactively.
    Configure,

    /// Current weather and the hourly forecast.
    Forecast {
        #[command(flatten)]
        at: At,

        /// Comma-separated features: temperature, humidity, windspeed, rain.
        #[arg(long, value_delimiter = ',')]
        features: Vec<WeatherFeature>,
    },

    /// Historical hourly weather for a date range.
    History {
        /// First date, YYYY-MM-DD.
        #[arg(long)]
        start: NaiveDate,

        /// Last date (inclusive), YYYY-MM-DD.
        #[arg(long)]
        end: NaiveDate,

        #[command(flatten)]
        at: At,

        #[arg(long, value_delimiter = ',')]
        features: Vec<WeatherFeature>,

        /// Reduce to daily mean/min/max temperature and rain sum.
        #[arg(long)]
        daily: bool,
    },

    /// Predicted disruption minutes per forecast day, next to NS's observed figure.
    Predict {
        #[command(flatten)]
        at: At,

        /// Refresh every N seconds until interrupted.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Disruption minutes NS reported for today.
    Disruptions {
        /// Also list the events that were counted.
        #[arg(long)]
        list: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let json = self.json;

        match self.command {
            Command::Configure => configure()?,
            Command::Forecast { at, features } => {
                let (config, outlook) = load()?;
                let location = at.resolve(&config)?;
                let features = features_or_default(features, &config);
                let forecast = outlook.forecast(location, &features).await?;

                if json {
                    print_json(&forecast)?;
                } else {
                    println!("Forecast for {location}");
                    print!("{}", render::forecast(&forecast));
                }
            }
            Command::History { start, end, at, features, daily } => {
                let (config, outlook) = load()?;
                let location = at.resolve(&config)?;
                let features = features_or_default(features, &config);

                if daily {
                    let rows = outlook.history_daily(location, start, end, &features).await?;
                    if json {
                        print_json(&rows)?;
                    } else {
                        print!("{}", render::daily(&rows));
                    }
                } else {
                    let table = outlook.history(location, start, end, &features).await?;
                    if json {
                        print_json(&table)?;
                    } else {
                        print!("{}", render::hourly(&table));
                    }
                }
            }
            Command::Predict { at, watch } => {
                let (config, outlook) = load()?;
                let location = at.resolve(&config)?;
                predict(&outlook, location, watch, json).await?;
            }
            Command::Disruptions { list } => {
                let (_, outlook) = load()?;
                let today = Local::now().date_naive();
                let events = outlook.disruption_events().await?;
                let total = observed_minutes_on(&events, today);
                let counted = events_on(&events, today);

                if json {
                    print_json(&json!({
                        "date": today,
                        "observed_minutes": total,
                        "events": if list { Some(&counted) } else { None },
                    }))?;
                } else {
                    print!("{}", render::disruptions(total, list.then_some(counted.as_slice())));
                }
            }
        }

        Ok(())
    }
}

fn load() -> anyhow::Result<(Config, Outlook)> {
    let config = Config::load()?;
    let outlook = outlook_from_config(&config)?;
    Ok((config, outlook))
}

fn features_or_default(features: Vec<WeatherFeature>, config: &Config) -> Vec<WeatherFeature> {
    if features.is_empty() {
        config.weather_features.clone()
    } else {
        features
    }
}

async fn predict(
    outlook: &Outlook,
    location: Location,
    watch: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    loop {
        let today = Local::now().date_naive();
        let report = outlook.report(location, today).await?;

        if json {
            print_json(&report)?;
        } else {
            print!("{}", render::report(&report));
        }

        match watch {
            Some(secs) => {
                tokio::time::sleep(Duration::from_secs(secs.max(1))).await;
                println!();
            }
            None => return Ok(()),
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut cfg = Config::load_from(&path)?;

    let key = Password::new("NS subscription key (leave empty to keep current):")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()?;
    if !key.trim().is_empty() {
        cfg.ns_api_key = Some(key.trim().to_string());
    }

    let latitude = CustomType::<f64>::new("Latitude:")
        .with_default(cfg.latitude)
        .with_error_message("Please enter a number")
        .prompt()?;
    let longitude = CustomType::<f64>::new("Longitude:")
        .with_default(cfg.longitude)
        .with_error_message("Please enter a number")
        .prompt()?;
    Location::new(latitude, longitude)?;
    cfg.latitude = latitude;
    cfg.longitude = longitude;

    cfg.timeout_secs = CustomType::<u64>::new("Request timeout (seconds):")
        .with_default(cfg.timeout_secs)
        .with_error_message("Please enter a whole number of seconds")
        .with_validator(at_least_one_second)
        .prompt()?;

    if Confirm::new("Add a hosted model-serving endpoint as a last resort?")
        .with_default(false)
        .prompt()?
    {
        let url = Text::new("Serving endpoint URL (.../invocations):").prompt()?;
        cfg.endpoints.push(EndpointCandidate {
            format: PayloadFormat::DataframeSplit,
            ..EndpointCandidate::flat("serving", url.trim())
        });
        println!("The bearer token is read from DATABRICKS_TOKEN at run time.");
    }

    cfg.save_to(&path)?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}

fn at_least_one_second(secs: &u64) -> Result<Validation, CustomUserError> {
    if *secs == 0 {
        Ok(Validation::Invalid("A zero timeout would fail every request".into()))
    } else {
        Ok(Validation::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_history_with_features() {
        let cli = Cli::try_parse_from([
            "railcast", "history", "--start", "2022-01-01", "--end", "2022-12-30",
            "--features", "temperature,rain", "--daily", "--lat", "-33.9",
        ])
        .unwrap();

        match cli.command {
            Command::History { start, end, at, features, daily } => {
                assert_eq!(start.to_string(), "2022-01-01");
                assert_eq!(end.to_string(), "2022-12-30");
                assert_eq!(features, vec![WeatherFeature::Temperature, WeatherFeature::Rain]);
                assert!(daily);
                assert_eq!(at.lat, Some(-33.9));
                assert_eq!(at.lon, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_feature() {
        let err = Cli::try_parse_from(["railcast", "forecast", "--features", "snow"]).unwrap_err();
        assert!(err.to_string().contains("Unknown weather feature"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["railcast", "predict", "--watch", "30", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Predict { watch: Some(30), .. }));
    }

    #[test]
    fn location_falls_back_to_config() {
        let cfg = Config::default();
        let at = At { lat: None, lon: Some(13.404954) };
        let loc = at.resolve(&cfg).unwrap();
        assert_eq!(loc.latitude, cfg.latitude);
        assert_eq!(loc.longitude, 13.404954);

        let bad = At { lat: Some(95.0), lon: None };
        assert!(bad.resolve(&cfg).is_err());
    }

    #[test]
    fn timeout_prompt_rejects_zero() {
        assert!(matches!(at_least_one_second(&0), Ok(Validation::Invalid(_))));
        assert!(matches!(at_least_one_second(&5), Ok(Validation::Valid)));
    }

    #[test]
    fn empty_features_use_config_defaults() {
        let cfg = Config::default();
        assert_eq!(features_or_default(vec![], &cfg), cfg.weather_features);
        assert_eq!(
            features_or_default(vec![WeatherFeature::Humidity], &cfg),
            vec![WeatherFeature::Humidity]
        );
    }
}
