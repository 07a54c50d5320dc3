//! beets web plugin client used as the local metadata index.

use anyhow::{bail, Context, Result};

use beetbrainz_types::{BeetsItem, BeetsQueryResponse};

use crate::config::BeetsSettings;
use crate::metadata::MetadataIndex;

pub struct BeetsClient {
    base_url: String,
    agent: ureq::Agent,
}

impl BeetsClient {
    pub fn new(settings: &BeetsSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn query_url(&self, title: &str) -> String {
        format!("{}/item/query/title:{}", self.base_url, urlencoding::encode(title))
    }
}

impl MetadataIndex for BeetsClient {
    fn query_title(&self, title: &str) -> Result<Vec<BeetsItem>> {
        let url = self.query_url(title);
        let mut resp = match self.agent.get(&url).call() {
            Ok(resp) => resp,
            Err(err) => bail!("beets request failed (transport) url={url}: {err}"),
        };
        let code = resp.status();
        if code.as_u16() >= 400 {
            let body = resp.body_mut().read_to_string().unwrap_or_default();
            let snippet: String = body.trim().chars().take(300).collect();
            bail!("beets request failed (status {code}) url={url}: {snippet}");
        }
        let body: BeetsQueryResponse = resp
            .body_mut()
            .read_json()
            .context("beets response parse failed")?;
        Ok(body.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(base_url: &str) -> BeetsClient {
        BeetsClient::new(&BeetsSettings {
            base_url: base_url.to_string(),
            timeout: Duration::from_millis(100),
        })
    }

    #[test]
    fn query_url_escapes_title() {
        let beets = client("http://10.0.0.2:8337/");
        assert_eq!(
            beets.query_url("Hello World/Live"),
            "http://10.0.0.2:8337/item/query/title:Hello%20World%2FLive"
        );
    }

    #[test]
    fn unreachable_index_is_an_error() {
        let beets = client("http://127.0.0.1:1");
        let err = beets.query_title("Song").unwrap_err();
        assert!(err.to_string().contains("transport"));
    }
}
