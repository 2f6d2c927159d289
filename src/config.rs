use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};

use crate::models::DateQuery;

/// Process configuration, read from the environment once at startup and
/// passed into the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials_file: PathBuf,
    pub auth_port: u16,
    pub token_file: PathBuf,
    pub date: DateQuery,
    pub search_term: Option<String>,
    pub openai_api_key: String,
    pub openai_model: String,
    pub max_output_tokens: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let credentials_file = env::var("GOOGLE_CREDENTIALS_FILE")
            .unwrap_or_else(|_| ".secrets/client_secret.json".to_string())
            .into();

        let auth_port = env::var("GOOGLE_AUTH_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("GOOGLE_AUTH_PORT must be a port number")?;

        let token_file = env::var("GOOGLE_TOKEN_FILE")
            .unwrap_or_else(|_| ".secrets/token.json".to_string())
            .into();

        let raw_date = env::var("GOOGLE_PHOTOS_DATE").ok();
        let date = parse_date_query(raw_date.as_deref())?;

        // Empty string disables the content filter entirely.
        let search_term = match env::var("GOOGLE_PHOTOS_SEARCH_TERM") {
            Ok(term) if term.is_empty() => None,
            Ok(term) => Some(term),
            Err(_) => Some("food".to_string()),
        };

        let openai_api_key =
            env::var("FROODS_OPENAI_API_KEY").context("FROODS_OPENAI_API_KEY must be set")?;

        let openai_model =
            env::var("FROODS_OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let max_output_tokens = env::var("FROODS_MAX_OUTPUT_TOKENS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<u32>()
            .context("FROODS_MAX_OUTPUT_TOKENS must be a positive integer")?;

        Ok(Self {
            credentials_file,
            auth_port,
            token_file,
            date,
            search_term,
            openai_api_key,
            openai_model,
            max_output_tokens,
        })
    }
}

/// Parses the target-date setting: `yyyy-mm-dd` for a single day,
/// `yyyy-mm-dd..yyyy-mm-dd` for an inclusive range, absent means yesterday.
pub fn parse_date_query(raw: Option<&str>) -> Result<DateQuery> {
    match raw {
        None => Ok(DateQuery::On(Utc::now().date_naive() - Duration::days(1))),
        Some(s) => match s.split_once("..") {
            Some((start, end)) => {
                let start = parse_day(start)?;
                let end = parse_day(end)?;
                if end < start {
                    anyhow::bail!("date range end {} precedes start {}", end, start);
                }
                Ok(DateQuery::Between(start, end))
            }
            None => Ok(DateQuery::On(parse_day(s)?)),
        },
    }
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected yyyy-mm-dd", s))
}
