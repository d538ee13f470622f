// src/fetch/mod.rs

use reqwest::Client;
use std::collections::BTreeSet;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::UpstreamFetchError;
use crate::panel::{CellKey, IndicatorPanel};

/// Building request URLs for the World Bank indicators API (v2).
pub mod urls {
    use url::Url;

    pub const API_BASE: &str = "https://api.worldbank.org/v2/";
    pub const PER_PAGE: u32 = 20_000;

    /// One page of every economy's observations for `code` over `start..=end`.
    pub fn indicator_page_url(
        code: &str,
        start: i32,
        end: i32,
        page: u32,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(API_BASE)?.join(&format!("country/all/indicator/{}", code))?;
        url.query_pairs_mut()
            .append_pair("date", &format!("{}:{}", start, end))
            .append_pair("format", "json")
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }
}

/// Decoding the API's `[header, observations]` JSON pages.
pub mod pages {
    use serde::Deserialize;
    use serde_json::Value;
    use tracing::warn;

    use crate::error::UpstreamFetchError;

    #[derive(Debug, Deserialize)]
    struct IdValue {
        id: String,
    }

    #[derive(Debug, Deserialize)]
    struct Observation {
        indicator: IdValue,
        country: IdValue,
        date: String,
        value: Option<f64>,
    }

    /// Decoded page: provider region code, year, indicator, value.
    #[derive(Debug, Default, PartialEq)]
    pub struct Page {
        pub pages: u32,
        pub rows: Vec<(String, i32, String, Option<f64>)>,
    }

    // the API is inconsistent about numbers vs. numeric strings in headers
    fn as_u32(v: &Value) -> Option<u32> {
        match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn decode_page(indicator: &str, page: u32, body: &str) -> Result<Page, UpstreamFetchError> {
        let decode_err = |source| UpstreamFetchError::Decode {
            indicator: indicator.to_string(),
            page,
            source,
        };
        let parts: Vec<Value> = serde_json::from_str(body).map_err(decode_err)?;

        let header = parts.first().cloned().unwrap_or(Value::Null);
        if let Some(messages) = header.get("message").and_then(Value::as_array) {
            let message = messages
                .iter()
                .map(|m| {
                    let key = m.get("key").and_then(Value::as_str).unwrap_or("error");
                    let value = m.get("value").and_then(Value::as_str).unwrap_or("");
                    format!("{}: {}", key, value.trim())
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(UpstreamFetchError::Api {
                indicator: indicator.to_string(),
                message,
            });
        }
        let pages = header.get("pages").and_then(as_u32).unwrap_or(0);

        let observations: Vec<Observation> = match parts.get(1) {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value(v.clone()).map_err(decode_err)?,
        };

        let mut rows = Vec::with_capacity(observations.len());
        for obs in observations {
            match obs.date.trim().parse::<i32>() {
                Ok(year) => rows.push((obs.country.id, year, obs.indicator.id, obs.value)),
                Err(_) => warn!(indicator, date = %obs.date, "skipping non-annual observation"),
            }
        }
        Ok(Page { pages, rows })
    }
}

/// Every page of one indicator.
pub async fn fetch_indicator(
    client: &Client,
    code: &str,
    start: i32,
    end: i32,
) -> Result<Vec<(String, i32, String, Option<f64>)>, UpstreamFetchError> {
    let mut rows = Vec::new();
    let mut page = 1;
    loop {
        let url = urls::indicator_page_url(code, start, end, page)?;
        debug!(%url, "requesting page");
        let http_err = |source| UpstreamFetchError::Http {
            indicator: code.to_string(),
            source,
        };
        let body = client
            .get(url)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?
            .text()
            .await
            .map_err(http_err)?;

        let decoded = pages::decode_page(code, page, &body)?;
        rows.extend(decoded.rows);
        if page >= decoded.pages {
            break;
        }
        page += 1;
    }
    info!(indicator = code, observations = rows.len(), "fetched indicator");
    Ok(rows)
}

/// Await every handle in order. On the first failure the remaining tasks
/// are aborted and the error is returned.
async fn join_or_abort<T>(
    handles: Vec<(String, JoinHandle<Result<T, UpstreamFetchError>>)>,
) -> Result<Vec<(String, T)>, UpstreamFetchError> {
    let mut out = Vec::with_capacity(handles.len());
    let mut pending = handles.into_iter();
    while let Some((code, handle)) = pending.next() {
        let result = match handle.await {
            Ok(r) => r,
            Err(e) => Err(UpstreamFetchError::Task {
                indicator: code.clone(),
                reason: e.to_string(),
            }),
        };
        match result {
            Ok(v) => out.push((code, v)),
            Err(e) => {
                let aborted = pending.len();
                for (_, rest) in pending {
                    rest.abort();
                }
                warn!(indicator = %code, aborted, "fetch failed; cancelling remaining requests");
                return Err(e);
            }
        }
    }
    Ok(out)
}

/// Fetch `codes` concurrently and assemble one panel keyed by provider
/// region codes. Fails on the first indicator that fails.
pub async fn fetch_panel(
    client: &Client,
    codes: &BTreeSet<String>,
    start: i32,
    end: i32,
) -> Result<IndicatorPanel, UpstreamFetchError> {
    let mut handles = Vec::with_capacity(codes.len());
    for code in codes {
        let client = client.clone();
        let code = code.clone();
        handles.push((
            code.clone(),
            task::spawn(async move { fetch_indicator(&client, &code, start, end).await }),
        ));
    }

    let mut panel = IndicatorPanel::new();
    for (code, rows) in join_or_abort(handles).await? {
        for (region, year, indicator, value) in rows {
            if indicator != code {
                warn!(requested = %code, got = %indicator, "provider relabelled indicator");
            }
            panel.insert(CellKey::new(region, year, code.as_str()), value);
        }
    }
    Ok(panel)
}
