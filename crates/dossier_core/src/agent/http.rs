//! Blocking HTTP client for the external parse/match services.

use crate::agent::{
    AgentError, AgentResult, MatchRequest, MatchResponse, MatchResponseBody, MatchService,
    ParseRequest, ParseResponseBody, ParseService,
};
use crate::config::CoreConfig;
use crate::model::material::Material;
use crate::model::requirement::RequirementItem;
use log::{info, warn};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;

/// JSON-over-HTTP implementation of [`ParseService`] and [`MatchService`].
pub struct HttpAgentClient {
    client: Client,
    parse_url: Option<String>,
    match_url: Option<String>,
}

impl HttpAgentClient {
    pub fn from_config(config: &CoreConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AgentError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            parse_url: config.parse_url.clone(),
            match_url: config.match_url.clone(),
        })
    }

    fn post_json<B, R>(&self, endpoint: &'static str, url: &str, body: &B) -> AgentResult<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let started_at = Instant::now();
        let result = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| AgentError::Transport(err.to_string()))
            .and_then(|response| {
                let status = response.status();
                if !status.is_success() {
                    return Err(AgentError::Status(status.as_u16()));
                }
                response
                    .json::<R>()
                    .map_err(|err| AgentError::Decode(err.to_string()))
            });

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!(
                "event=agent_request module=agent endpoint={endpoint} status=ok duration_ms={duration_ms}"
            ),
            Err(err) => warn!(
                "event=agent_request module=agent endpoint={endpoint} status=error duration_ms={duration_ms} error={err}"
            ),
        }
        result
    }
}

impl ParseService for HttpAgentClient {
    fn parse(&self, text: &str) -> AgentResult<Vec<RequirementItem>> {
        let url = self
            .parse_url
            .as_deref()
            .ok_or(AgentError::NotConfigured("parse"))?;
        let body: ParseResponseBody = self.post_json("parse", url, &ParseRequest { text })?;
        Ok(body.into_items())
    }
}

impl MatchService for HttpAgentClient {
    fn match_items(
        &self,
        items: &[RequirementItem],
        materials: &[Material],
    ) -> AgentResult<MatchResponse> {
        let url = self
            .match_url
            .as_deref()
            .ok_or(AgentError::NotConfigured("match"))?;
        let request = MatchRequest {
            items,
            materials: materials.iter().map(Into::into).collect(),
        };
        let body: MatchResponseBody = self.post_json("match", url, &request)?;
        Ok(body.into())
    }
}
